pub mod aggregator;
pub mod process;
pub mod query;
pub mod rate;

pub use aggregator::{Aggregator, AggregatorConfig, AggregatorState, EventSender, PipelineCounters};
pub use query::{ProcessRow, SortKey, StatsQuery, Totals};

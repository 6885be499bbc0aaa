//! xnettop
//!
//! Per-process network traffic monitor: captured packets are attributed to
//! the owning process through a periodically refreshed socket table, and
//! accumulated into per-process byte counters and sliding-window rates.

pub mod app;
pub mod cli;
pub mod config;
pub mod network;
pub mod stats;
pub mod ui;

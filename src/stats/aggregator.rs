//! Per-process traffic accounting.
//!
//! Packet events flow through a bounded queue into a single consumer thread,
//! which attributes each one against the current connection snapshot and
//! updates exactly one [`ProcessStats`] entry. Producers never block: when the
//! queue is full the event is dropped and counted.

use anyhow::{Result, anyhow};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use crossbeam::select;
use dashmap::DashMap;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::network::connections::ConnectionTable;
use crate::network::correlator;
use crate::network::types::{PacketEvent, ProcessId};
use crate::stats::process::ProcessStats;
use crate::stats::query::StatsQuery;
use crate::stats::rate::{DEFAULT_MAX_SAMPLES, DEFAULT_WINDOW};

/// Configuration for the aggregator
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Capacity of the ingress queue (default: 10000 events)
    pub queue_capacity: usize,
    /// Length of the rate window (default: 5 seconds)
    pub window: Duration,
    /// Maximum samples kept per process and direction (default: 20000)
    pub max_samples: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            window: DEFAULT_WINDOW,
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }
}

/// Lifecycle of the consumer thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    Init,
    Running,
    Stopping,
    Stopped,
}

impl AggregatorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => AggregatorState::Init,
            1 => AggregatorState::Running,
            2 => AggregatorState::Stopping,
            _ => AggregatorState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            AggregatorState::Init => 0,
            AggregatorState::Running => 1,
            AggregatorState::Stopping => 2,
            AggregatorState::Stopped => 3,
        }
    }
}

/// Point-in-time copy of the pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineCounters {
    /// Events attributed and accounted
    pub processed: u64,
    /// Events charged to the unknown bucket
    pub unattributed: u64,
    /// Events rejected because the queue was full or closed
    pub dropped: u64,
    /// Events currently waiting in the queue
    pub queued: usize,
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    unattributed: AtomicU64,
    dropped: AtomicU64,
    /// Events the queue accepted
    accepted: AtomicU64,
    /// Events the consumer took off the queue
    dequeued: AtomicU64,
}

/// State shared between the consumer thread, producers and queries
pub(crate) struct Shared {
    pub(crate) table: Arc<ConnectionTable>,
    pub(crate) stats: DashMap<ProcessId, ProcessStats>,
    config: AggregatorConfig,
    counters: Arc<Counters>,
}

impl Shared {
    /// Attribute one event and update its entry
    fn process_event(&self, event: PacketEvent) {
        let snapshot = self.table.snapshot();
        let attribution = correlator::attribute(&event, &snapshot);

        if attribution.process.is_unknown() {
            self.counters.unattributed.fetch_add(1, Ordering::Relaxed);
        }

        let mut entry = self.stats.entry(attribution.process).or_insert_with(|| {
            debug!(
                "New process entry: {} ({})",
                attribution.name, attribution.process
            );
            ProcessStats::new(
                attribution.process,
                attribution.name,
                self.config.window,
                self.config.max_samples,
            )
        });

        // PIDs get reused; follow the name the OS reports now
        if entry.name != attribution.name {
            entry.name = attribution.name.to_string();
        }
        entry.record(attribution.direction, event.timestamp, event.len);
        drop(entry);

        self.counters.processed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Producer handle for the ingress queue.
///
/// Cheap to clone; every clone feeds the same consumer.
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<PacketEvent>,
    counters: Arc<Counters>,
}

impl EventSender {
    /// Enqueue without blocking. Returns false if the event was dropped.
    pub fn try_enqueue(&self, event: PacketEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                let dropped = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped % 10_000 == 0 {
                    warn!("Ingress queue full, {} events dropped so far", dropped);
                }
                false
            }
        }
    }
}

struct Lifecycle {
    events: Option<Receiver<PacketEvent>>,
    stop_tx: Option<Sender<()>>,
    consumer: Option<JoinHandle<()>>,
}

pub struct Aggregator {
    shared: Arc<Shared>,
    tx: Sender<PacketEvent>,
    state: AtomicU8,
    lifecycle: Mutex<Lifecycle>,
}

impl Aggregator {
    pub fn new(table: Arc<ConnectionTable>, config: AggregatorConfig) -> Self {
        let (tx, rx) = channel::bounded(config.queue_capacity.max(1));
        let shared = Shared {
            table,
            stats: DashMap::new(),
            config,
            counters: Arc::new(Counters::default()),
        };

        Self {
            shared: Arc::new(shared),
            tx,
            state: AtomicU8::new(AggregatorState::Init.as_u8()),
            lifecycle: Mutex::new(Lifecycle {
                events: Some(rx),
                stop_tx: None,
                consumer: None,
            }),
        }
    }

    /// Handle for the capture thread (or anything else producing events)
    pub fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
            counters: Arc::clone(&self.shared.counters),
        }
    }

    /// Read-only view for the display
    pub fn query(&self) -> StatsQuery {
        StatsQuery::new(Arc::clone(&self.shared))
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> AggregatorState {
        AggregatorState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: AggregatorState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Spawn the consumer thread. A second call while running is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle();

        match self.state() {
            AggregatorState::Running => return Ok(()),
            AggregatorState::Stopping | AggregatorState::Stopped => {
                return Err(anyhow!("Aggregator cannot be restarted after stop"));
            }
            AggregatorState::Init => {}
        }

        let events = lifecycle
            .events
            .take()
            .ok_or_else(|| anyhow!("Aggregator event queue already taken"))?;
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let shared = Arc::clone(&self.shared);

        let handle = thread::Builder::new()
            .name("aggregator".to_string())
            .spawn(move || run_consumer(shared, events, stop_rx))?;

        lifecycle.stop_tx = Some(stop_tx);
        lifecycle.consumer = Some(handle);
        self.set_state(AggregatorState::Running);
        info!("Aggregator started");
        Ok(())
    }

    /// Signal the consumer, let it drain queued events, and wait for it
    pub fn stop(&self) {
        let (stop_tx, consumer) = {
            let mut lifecycle = self.lifecycle();
            match self.state() {
                AggregatorState::Init => {
                    lifecycle.events = None;
                    self.set_state(AggregatorState::Stopped);
                    return;
                }
                AggregatorState::Running => self.set_state(AggregatorState::Stopping),
                AggregatorState::Stopping | AggregatorState::Stopped => return,
            }
            (lifecycle.stop_tx.take(), lifecycle.consumer.take())
        };

        // Disconnecting the stop channel wakes the consumer
        drop(stop_tx);
        if let Some(handle) = consumer
            && handle.join().is_err()
        {
            error!("Aggregator consumer thread panicked");
        }

        self.set_state(AggregatorState::Stopped);
        info!("Aggregator stopped");
    }

    /// Zero every entry's counters and windows. Rows are kept.
    pub fn clear(&self) {
        for mut entry in self.shared.stats.iter_mut() {
            entry.reset();
        }
        info!("Cleared statistics for {} processes", self.shared.stats.len());
    }

    pub fn counters(&self) -> PipelineCounters {
        let counters = &self.shared.counters;
        let mut dropped = counters.dropped.load(Ordering::Relaxed);
        let mut queued = self.tx.len();

        // Events accepted after the consumer's final drain were discarded
        // along with the receiver
        if self.state() == AggregatorState::Stopped {
            let accepted = counters.accepted.load(Ordering::Relaxed);
            let dequeued = counters.dequeued.load(Ordering::Relaxed);
            dropped += accepted.saturating_sub(dequeued);
            queued = 0;
        }

        PipelineCounters {
            processed: counters.processed.load(Ordering::Relaxed),
            unattributed: counters.unattributed.load(Ordering::Relaxed),
            dropped,
            queued,
        }
    }

    /// Attribute and account one event on the calling thread
    pub fn process_event(&self, event: PacketEvent) {
        self.shared.process_event(event);
    }
}

impl Drop for Aggregator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_consumer(shared: Arc<Shared>, events: Receiver<PacketEvent>, stop: Receiver<()>) {
    debug!("Aggregator consumer thread started");
    let started = Instant::now();
    let consume = |event| {
        shared.counters.dequeued.fetch_add(1, Ordering::Relaxed);
        shared.process_event(event);
    };

    loop {
        select! {
            recv(events) -> msg => match msg {
                Ok(event) => consume(event),
                Err(_) => break,
            },
            recv(stop) -> _ => break,
        }
    }

    let mut drained = 0usize;
    while let Ok(event) = events.try_recv() {
        consume(event);
        drained += 1;
    }
    // Later enqueues fail as disconnected and count as dropped
    drop(events);
    debug!("Aggregator drained {} queued events before exit", drained);

    debug!(
        "Aggregator consumer thread stopping after {:?}",
        started.elapsed()
    );
}

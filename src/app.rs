use anyhow::{Context, Result};
use crossbeam::channel::{self, Sender};
use log::{error, info};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::config::Config;
use crate::network::capture::{
    self, CaptureConfig, CaptureCounters, CaptureHandle, CaptureStats,
};
use crate::network::connections::{ConnectionTable, RefreshStats};
use crate::network::platform::{self, SocketEnumerator};
use crate::stats::aggregator::{Aggregator, AggregatorState, EventSender, PipelineCounters};
use crate::stats::query::StatsQuery;

/// Counters from every stage, shown in the status bar
#[derive(Debug, Clone, Copy, Default)]
pub struct AppStats {
    pub pipeline: PipelineCounters,
    pub refresh: RefreshStats,
    pub capture: CaptureStats,
}

/// Owns the pipeline: connection table, aggregator, and the background
/// threads feeding them
pub struct App {
    pub config: Config,
    table: Arc<ConnectionTable>,
    aggregator: Aggregator,
    capture: Option<CaptureHandle>,
    capture_counters: Arc<CaptureCounters>,
    interface_name: Option<String>,
    shutdown_tx: Option<Sender<()>>,
    threads: Vec<JoinHandle<()>>,
}

impl App {
    /// Open the capture and load the connection table.
    ///
    /// Fails if capture cannot be opened, the platform has no socket
    /// enumerator, or the first connection table refresh fails.
    pub fn new(config: Config) -> Result<Self> {
        info!("App::new - Starting application initialization");
        config.validate()?;

        let capture_config = CaptureConfig {
            interface: config.interface.clone(),
            filter: config.bpf_filter.clone(),
            ..Default::default()
        };
        let capture = capture::setup_packet_capture(&capture_config)?;

        let mut local_ips: HashSet<IpAddr> = capture::local_addresses();
        local_ips.extend(capture.local_ips.iter().copied());

        let enumerator = platform::create_socket_enumerator()?;
        let mut app = Self::with_enumerator(config, enumerator, local_ips)?;
        app.interface_name = Some(capture.device_name.clone());
        app.capture = Some(capture);

        info!("App::new - Application initialized successfully");
        Ok(app)
    }

    /// Build the pipeline without a packet capture; events are fed through
    /// [`App::sender`]
    pub fn with_enumerator(
        config: Config,
        enumerator: Box<dyn SocketEnumerator>,
        local_ips: HashSet<IpAddr>,
    ) -> Result<Self> {
        config.validate()?;

        let table = Arc::new(ConnectionTable::new(enumerator, local_ips));
        table
            .refresh()
            .context("Initial connection table refresh failed")?;
        info!(
            "Connection table loaded via {} ({} keys)",
            table.detection_method(),
            table.stats().records
        );

        let aggregator = Aggregator::new(Arc::clone(&table), config.aggregator_config());

        Ok(Self {
            config,
            table,
            aggregator,
            capture: None,
            capture_counters: Arc::new(CaptureCounters::default()),
            interface_name: None,
            shutdown_tx: None,
            threads: Vec::new(),
        })
    }

    /// Start the aggregator, the connection refresh loop and, if opened,
    /// the capture thread
    pub fn start(&mut self) -> Result<()> {
        if self.shutdown_tx.is_some() {
            return Ok(());
        }

        self.aggregator.start()?;

        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);

        let refresh = self
            .table
            .spawn_refresh_loop(self.config.connection_refresh_interval(), shutdown_rx.clone())?;
        self.threads.push(refresh);

        if let Some(handle) = self.capture.take() {
            let capture_thread = capture::spawn_capture_thread(
                handle,
                self.aggregator.sender(),
                Arc::clone(&self.capture_counters),
                shutdown_rx,
            )?;
            self.threads.push(capture_thread);
        }

        self.shutdown_tx = Some(shutdown_tx);
        info!("Pipeline started");
        Ok(())
    }

    /// Stop producers first, then let the aggregator drain what they queued
    pub fn stop(&mut self) {
        // Dropping the sender disconnects every shutdown receiver
        drop(self.shutdown_tx.take());

        for handle in self.threads.drain(..) {
            let name = handle.thread().name().unwrap_or("unnamed").to_string();
            if handle.join().is_err() {
                error!("Thread '{}' panicked", name);
            }
        }

        self.aggregator.stop();
        info!("Pipeline stopped");
    }

    pub fn sender(&self) -> EventSender {
        self.aggregator.sender()
    }

    pub fn query(&self) -> StatsQuery {
        self.aggregator.query()
    }

    pub fn clear(&self) {
        self.aggregator.clear();
    }

    pub fn state(&self) -> AggregatorState {
        self.aggregator.state()
    }

    pub fn interface_name(&self) -> Option<&str> {
        self.interface_name.as_deref()
    }

    pub fn detection_method(&self) -> &str {
        self.table.detection_method()
    }

    pub fn stats(&self) -> AppStats {
        AppStats {
            pipeline: self.aggregator.counters(),
            refresh: self.table.stats(),
            capture: self.capture_counters.snapshot(),
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some() || !self.threads.is_empty() {
            self.stop();
        }
    }
}

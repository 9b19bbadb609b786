//! # Service Module
//!
//! Wires the link core together for one end of the link and supervises the
//! resulting tasks.
//!
//! - **Air**: UDP frames in, SBUS serial frames out, gated by link quality
//! - **Ground**: one input producer in, UDP envelopes out
//!
//! Shutdown order matters: the transmit scheduler stops first so no frame is
//! built from a table that producers are tearing down, then producers stop.

pub mod air;
pub mod ground;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channels::ChannelTable;
use crate::config::{Config, Role};
use crate::error::Result;
use crate::link::LinkQualityMonitor;
use crate::scheduler::{TransmitScheduler, TransmitStats};

/// Owns the shutdown signals and join handles of every spawned task
#[derive(Debug)]
pub struct Supervisor {
    scheduler_stop: watch::Sender<bool>,
    producer_stop: watch::Sender<bool>,
    schedulers: Vec<JoinHandle<()>>,
    producers: Vec<(String, JoinHandle<()>)>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        let (scheduler_stop, _) = watch::channel(false);
        let (producer_stop, _) = watch::channel(false);

        Self {
            scheduler_stop,
            producer_stop,
            schedulers: Vec::new(),
            producers: Vec::new(),
        }
    }

    /// Start a transmit scheduler, returning its counters
    pub fn spawn_scheduler(&mut self, scheduler: TransmitScheduler) -> Arc<TransmitStats> {
        let stats = scheduler.stats();
        let shutdown = self.scheduler_stop.subscribe();
        self.schedulers.push(tokio::spawn(scheduler.run(shutdown)));
        stats
    }

    /// Start a producer task
    ///
    /// `task` receives the producer shutdown signal. An error return is
    /// logged; it does not bring down the other tasks.
    pub fn spawn<F, Fut>(&mut self, name: impl Into<String>, task: F)
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        let fut = task(self.producer_stop.subscribe());
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            match fut.await {
                Ok(()) => debug!("{} stopped", task_name),
                Err(e) => error!("{} failed: {}", task_name, e),
            }
        });

        debug!("Spawned {}", name);
        self.producers.push((name, handle));
    }

    /// Number of tasks that have not finished yet
    pub fn running(&self) -> usize {
        let schedulers = self.schedulers.iter().filter(|h| !h.is_finished()).count();
        let producers = self.producers.iter().filter(|(_, h)| !h.is_finished()).count();
        schedulers + producers
    }

    /// Stop schedulers, then producers, and wait for all of them
    pub async fn shutdown(self) {
        let _ = self.scheduler_stop.send(true);
        for handle in self.schedulers {
            if let Err(e) = handle.await {
                warn!("Scheduler task ended abnormally: {}", e);
            }
        }

        let _ = self.producer_stop.send(true);
        for (name, handle) in self.producers {
            if let Err(e) = handle.await {
                warn!("{} ended abnormally: {}", name, e);
            }
        }
    }
}

/// A running air or ground service
#[derive(Debug)]
pub struct Service {
    role: Role,
    table: Arc<ChannelTable>,
    monitor: Option<Arc<LinkQualityMonitor>>,
    stats: Arc<TransmitStats>,
    local_addr: Option<SocketAddr>,
    supervisor: Supervisor,
}

impl Service {
    /// Acquire every configured resource and start the tasks for the role
    ///
    /// # Errors
    ///
    /// Returns error if a configured serial port or socket cannot be opened
    pub async fn start(config: &Config) -> Result<Self> {
        info!("Starting {:?} service", config.service.role);

        match config.service.role {
            Role::Air => air::start(config).await,
            Role::Ground => ground::start(config).await,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Shared channel table
    pub fn table(&self) -> &Arc<ChannelTable> {
        &self.table
    }

    /// Link monitor, air role only
    pub fn monitor(&self) -> Option<&Arc<LinkQualityMonitor>> {
        self.monitor.as_ref()
    }

    /// Transmit counters
    pub fn stats(&self) -> &Arc<TransmitStats> {
        &self.stats
    }

    /// Address the frame receiver is bound to, air role only
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Number of tasks still running
    pub fn running_tasks(&self) -> usize {
        self.supervisor.running()
    }

    pub async fn shutdown(self) {
        info!("Shutting down {:?} service", self.role);
        self.supervisor.shutdown().await;

        let counts = self.stats.counts();
        info!("Service stopped after {} frames", counts.sent);
    }
}

//! Wires the engine together: one scheduler thread plus the session monitor
//! and timeout check on their own tickers, all sharing one process slot.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::WorkerConfig;
use crate::fs::Storage;
use crate::orchestrator::batch::BatchCoordinator;
use crate::orchestrator::executor::AttackExecutor;
use crate::orchestrator::monitor::{SessionMonitor, TranscriptProbe};
use crate::orchestrator::recovery::RecoveryManager;
use crate::orchestrator::runner::JobRunner;
use crate::orchestrator::scheduler::Scheduler;
use crate::orchestrator::ticker::Ticker;
use crate::process::ProcessSlot;
use crate::store::JobStore;

pub struct Worker {
    config: WorkerConfig,
    store: Arc<dyn JobStore>,
    storage: Storage,
    clock: Arc<dyn Clock>,
    slot: ProcessSlot,
    recovery: Arc<RecoveryManager>,
    scheduler: Scheduler,
    shutdown: Arc<AtomicBool>,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
}

/// Cloneable way to stop a running [`Worker`] from another thread or a
/// signal handler.
#[derive(Clone)]
pub struct WorkerHandle {
    shutdown: Arc<AtomicBool>,
    slot: ProcessSlot,
    stop: Sender<()>,
}

impl WorkerHandle {
    /// Stop taking new jobs and kill the tool if one is running. The job in
    /// flight stays `processing` and is reset on the next start. The flag is
    /// raised before the kill so the session monitor ignores the abort.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.stop.send(());
        self.slot.kill_current_process();
    }
}

impl Worker {
    /// Build every component from `config`. Creates the storage areas.
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn JobStore>,
        clock: Arc<dyn Clock>,
    ) -> io::Result<Self> {
        let storage = Storage::from_config(&config);
        storage.ensure()?;

        let slot = ProcessSlot::new(config.kill_grace());
        let recovery = Arc::new(RecoveryManager::new(
            store.clone(),
            slot.clone(),
            config.job_timeout(),
        ));
        let executor = AttackExecutor::new(&config, slot.clone());
        let batch = BatchCoordinator::new(store.clone(), storage.clone());
        let runner = JobRunner::new(
            store.clone(),
            executor,
            batch,
            storage.clone(),
            clock.clone(),
        );
        let shutdown = runner.shutdown_flag();
        let scheduler = Scheduler::new(
            store.clone(),
            runner,
            recovery.clone(),
            clock.clone(),
            config.poll_interval(),
            config.priority_ordering,
        );
        let (stop_tx, stop_rx) = mpsc::channel();

        Ok(Self {
            config,
            store,
            storage,
            clock,
            slot,
            recovery,
            scheduler,
            shutdown,
            stop_tx,
            stop_rx,
        })
    }

    pub fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            shutdown: self.shutdown.clone(),
            slot: self.slot.clone(),
            stop: self.stop_tx.clone(),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn recovery(&self) -> &RecoveryManager {
        &self.recovery
    }

    pub fn slot(&self) -> &ProcessSlot {
        &self.slot
    }

    /// A monitor reading the transcripts this worker's executor writes.
    pub fn session_monitor(&self) -> SessionMonitor {
        SessionMonitor::new(
            self.store.clone(),
            Box::new(TranscriptProbe::new(self.storage.clone())),
            BatchCoordinator::new(self.store.clone(), self.storage.clone()),
            self.slot.clone(),
            self.config.stale_threshold(),
        )
        .with_shutdown_flag(self.shutdown.clone())
    }

    /// Run until [`WorkerHandle::shutdown`] is called.
    pub fn run(&self) -> io::Result<()> {
        let mut monitor = self.session_monitor();
        let clock = self.clock.clone();
        let monitor_ticker = Ticker::spawn(
            "session-monitor",
            self.config.monitor_interval(),
            move || {
                monitor.tick(clock.now());
            },
        )?;

        let recovery = self.recovery.clone();
        let clock = self.clock.clone();
        let timeout_ticker = Ticker::spawn(
            "timeout-check",
            self.config.timeout_check_interval(),
            move || {
                recovery.check_timeouts(clock.now());
            },
        )?;

        self.scheduler.run(&self.stop_rx);

        monitor_ticker.stop();
        timeout_ticker.stop();
        self.slot.kill_current_process();
        Ok(())
    }
}

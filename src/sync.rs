use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::config::SyncConfig;
use crate::events::{EventChannel, GameCompletedPort, Invalidator, SignalSource};
use crate::local_store::{KeyValueStore, read_credential};
use crate::reconcile::{Reconciler, SyncContext};
use crate::state::{Delta, StatsUpdate, SyncCommand, Trigger, trigger_label};

/// Everything the sync needs besides configuration.
pub struct SyncSetup {
    pub user_id: String,
    pub reconciler: Reconciler,
    /// Holds the credential slot; read once per reconciliation.
    pub store: Arc<dyn KeyValueStore>,
    pub channel: Option<Arc<dyn EventChannel>>,
    pub broadcast: Arc<dyn EventChannel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Reconciling,
    Stopped,
}

/// Running sync. Dropping it stops it.
pub struct SyncHandle {
    cmd_tx: Sender<SyncCommand>,
    dispatcher: Option<JoinHandle<()>>,
    invalidator: Invalidator,
    issued: Arc<AtomicU64>,
    in_flight: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
}

impl SyncHandle {
    /// Asks for a reconciliation now. False once stopped.
    pub fn refresh(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self
                .cmd_tx
                .send(SyncCommand::Refresh(Trigger::Manual))
                .is_ok()
    }

    /// Moves the real-time listener to a new channel (reconnect, identity
    /// change) and refreshes, since events may have been missed in between.
    pub fn rebind_channel(&mut self, channel: Option<Arc<dyn EventChannel>>) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        self.invalidator.rebind_channel(channel);
        let _ = self
            .cmd_tx
            .send(SyncCommand::Refresh(Trigger::ChannelRebound));
    }

    pub fn phase(&self) -> SyncPhase {
        if !self.running.load(Ordering::SeqCst) {
            SyncPhase::Stopped
        } else if self.in_flight.load(Ordering::SeqCst) > 0 {
            SyncPhase::Reconciling
        } else {
            SyncPhase::Idle
        }
    }

    /// Number of reconciliations started so far.
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    pub fn has_channel(&self) -> bool {
        self.invalidator.has_channel()
    }

    /// Unregisters both listeners and cancels the poll timer. Reconciliations
    /// already running finish; their results go nowhere if the receiver is gone.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.invalidator.stop();
        let _ = self.cmd_tx.send(SyncCommand::Shutdown);
        if let Some(handle) = self.dispatcher.take()
            && handle.join().is_err()
        {
            tracing::error!("stats dispatcher panicked");
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

pub fn spawn_stats_sync(
    cfg: &SyncConfig,
    setup: SyncSetup,
    tx: Sender<Delta>,
) -> Result<SyncHandle> {
    let (cmd_tx, cmd_rx) = mpsc::channel::<SyncCommand>();
    let issued = Arc::new(AtomicU64::new(0));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let running = Arc::new(AtomicBool::new(true));

    let port_tx = cmd_tx.clone();
    let port = GameCompletedPort::new(move |source: SignalSource| {
        let _ = port_tx.send(SyncCommand::Refresh(Trigger::GameCompleted(source)));
    });
    let invalidator = Invalidator::start(port, setup.channel, setup.broadcast);

    let dispatcher = Dispatcher {
        user_id: setup.user_id,
        reconciler: setup.reconciler,
        store: setup.store,
        pool: build_reconcile_pool(cfg.workers),
        workers: cfg.workers,
        pooled: Arc::new(AtomicUsize::new(0)),
        tx,
        issued: issued.clone(),
        in_flight: in_flight.clone(),
    };
    let poll_interval = cfg.poll_interval;

    let handle = thread::Builder::new()
        .name("stats-sync".to_string())
        .spawn(move || {
            dispatcher.issue(Trigger::Startup);
            let mut next_poll = Instant::now() + poll_interval;
            loop {
                let wait = next_poll.saturating_duration_since(Instant::now());
                match cmd_rx.recv_timeout(wait) {
                    Ok(SyncCommand::Refresh(trigger)) => dispatcher.issue(trigger),
                    Ok(SyncCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {
                        dispatcher.issue(Trigger::Poll);
                        next_poll += poll_interval;
                        let now = Instant::now();
                        if next_poll <= now {
                            next_poll = now + poll_interval;
                        }
                    }
                }
            }
            tracing::debug!("stats dispatcher stopped");
        })
        .context("spawn stats dispatcher")?;

    Ok(SyncHandle {
        cmd_tx,
        dispatcher: Some(handle),
        invalidator,
        issued,
        in_flight,
        running,
    })
}

struct Dispatcher {
    user_id: String,
    reconciler: Reconciler,
    store: Arc<dyn KeyValueStore>,
    pool: Option<rayon::ThreadPool>,
    workers: usize,
    pooled: Arc<AtomicUsize>,
    tx: Sender<Delta>,
    issued: Arc<AtomicU64>,
    in_flight: Arc<AtomicUsize>,
}

impl Dispatcher {
    fn issue(&self, trigger: Trigger) {
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let ctx = SyncContext::new(self.user_id.clone(), read_credential(self.store.as_ref()));
        tracing::debug!(seq, trigger = trigger_label(trigger), "reconciliation issued");
        if matches!(trigger, Trigger::GameCompleted(_) | Trigger::ChannelRebound) {
            let _ = self.tx.send(Delta::Log(format!(
                "[INFO] Stats refresh #{seq}: {}",
                trigger_label(trigger)
            )));
        }

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let reconciler = self.reconciler.clone();
        let tx = self.tx.clone();
        let in_flight = self.in_flight.clone();
        let run = move || {
            let reconciled = reconciler.reconcile(&ctx);
            let _ = tx.send(Delta::SetStats(StatsUpdate {
                seq,
                trigger,
                reconciled,
                finished_at: Utc::now(),
            }));
            in_flight.fetch_sub(1, Ordering::SeqCst);
        };

        // Pool only while a worker is free; overflow gets its own thread.
        if let Some(pool) = self.pool.as_ref()
            && self.pooled.fetch_add(1, Ordering::SeqCst) < self.workers
        {
            let pooled = self.pooled.clone();
            pool.spawn(move || {
                run();
                pooled.fetch_sub(1, Ordering::SeqCst);
            });
            return;
        }
        if self.pool.is_some() {
            self.pooled.fetch_sub(1, Ordering::SeqCst);
        }
        let spawned = thread::Builder::new()
            .name(format!("stats-reconcile-{seq}"))
            .spawn(run);
        if let Err(err) = spawned {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            tracing::error!(seq, error = %err, "failed to start reconciliation");
        }
    }
}

fn build_reconcile_pool(threads: usize) -> Option<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|idx| format!("stats-reconcile-{idx}"))
        .build()
        .ok()
}


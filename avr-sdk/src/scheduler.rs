//! Periodic polling of every device not served by daemon push

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use avr_daemon::DaemonBridge;
use avr_state::RefreshOutcome;
use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::dispatcher::CommandDispatcher;
use crate::registry::DeviceRegistry;

/// Shortest accepted poll interval
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Tally of one poll round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub updated: usize,
    pub offline: usize,
    pub failed: usize,
    /// Devices left to daemon push
    pub skipped: usize,
}

/// Drives a refresh of every polled device at a fixed interval
pub struct PollScheduler {
    registry: Arc<DeviceRegistry>,
    dispatcher: Arc<CommandDispatcher>,
    bridge: Option<Arc<DaemonBridge>>,
    interval: Duration,
    running: AtomicBool,
    stop: Notify,
}

impl PollScheduler {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        dispatcher: Arc<CommandDispatcher>,
        interval: Duration,
    ) -> Self {
        let interval = if interval < MIN_POLL_INTERVAL {
            warn!("poll interval {:?} too short, using {:?}", interval, MIN_POLL_INTERVAL);
            MIN_POLL_INTERVAL
        } else {
            interval
        };
        Self {
            registry,
            dispatcher,
            bridge: None,
            interval,
            running: AtomicBool::new(false),
            stop: Notify::new(),
        }
    }

    /// Skip devices this bridge serves by push
    pub fn with_bridge(mut self, bridge: Arc<DaemonBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Refresh every polled device once. Devices are refreshed
    /// concurrently; each device's own refreshes stay serialized.
    pub async fn poll_once(&self) -> PollSummary {
        let mut summary = PollSummary::default();
        let mut tasks = JoinSet::new();

        for device in self.registry.devices() {
            let served = self
                .bridge
                .as_ref()
                .is_some_and(|bridge| bridge.is_served(&device.config()));
            if served {
                summary.skipped += 1;
                continue;
            }

            let dispatcher = Arc::clone(&self.dispatcher);
            let id = device.id().clone();
            tasks.spawn(async move {
                let outcome = dispatcher.refresh(&id).await;
                (id, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(RefreshOutcome::Offline))) => summary.offline += 1,
                Ok((_, Ok(RefreshOutcome::FetchFailed))) => summary.failed += 1,
                Ok((_, Ok(RefreshOutcome::Updated(_)))) => summary.updated += 1,
                Ok((id, Err(e))) => {
                    debug!("poll of {} skipped: {}", id, e);
                    summary.failed += 1;
                }
                Err(e) => {
                    warn!("poll task failed: {}", e);
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    /// Start polling in the background. The first round runs immediately.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        scheduler.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            let _running = RunningFlag(&scheduler.running);
            info!("polling every {:?}", scheduler.interval);
            let mut ticker = tokio::time::interval(scheduler.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let summary = scheduler.poll_once().await;
                        debug!("poll round: {:?}", summary);
                    }
                    _ = scheduler.stop.notified() => break,
                }
                if !scheduler.is_running() {
                    break;
                }
            }

            info!("polling stopped");
        })
    }

    /// Stop the background loop after the current round
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stop.notify_one();
    }
}

/// Clears the running flag when the poll loop ends, including by panic
struct RunningFlag<'a>(&'a AtomicBool);

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for PollScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollScheduler")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

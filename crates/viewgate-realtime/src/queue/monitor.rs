//! Liveness monitor: a periodic sweep evicting participants whose heartbeats stopped.
//!
//! Transport close events are not guaranteed on crashes or network
//! partitions, so this sweep is what keeps a dead occupant from holding a
//! slot forever. Evictions go through each queue's own mutation point.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use viewgate_core::config::QueueConfig;

use super::registry::QueueRegistry;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Queues touched.
    pub queues_changed: usize,
    /// Participants evicted.
    pub evicted: usize,
    /// Waiters promoted as a result.
    pub promoted: usize,
    /// Empty queues detached.
    pub collected: usize,
}

/// Periodic heartbeat-deadline enforcement across all queues.
#[derive(Debug)]
pub struct LivenessMonitor {
    /// Registry to sweep.
    registry: Arc<QueueRegistry>,
    /// Silence tolerated before eviction.
    timeout: Duration,
    /// Tick between sweeps.
    interval: StdDuration,
}

impl LivenessMonitor {
    /// Creates a monitor from the queue configuration.
    pub fn new(registry: Arc<QueueRegistry>, config: &QueueConfig) -> Self {
        let timeout = Duration::from_std(config.heartbeat_timeout())
            .unwrap_or_else(|_| Duration::seconds(i64::from(u32::MAX)));
        Self {
            registry,
            timeout,
            interval: config.sweep_interval(),
        }
    }

    /// Silence tolerated before eviction.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Evict everyone whose last heartbeat is older than `now - timeout`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let changed = self.registry.sweep(now, self.timeout).await;

        let mut report = SweepReport {
            queues_changed: changed.len(),
            ..SweepReport::default()
        };
        for (_, mutation) in &changed {
            report.evicted += mutation.removed.len();
            report.promoted += mutation.promoted().count();
        }
        report.collected = self.registry.collect_garbage();

        if report.evicted > 0 {
            info!(
                evicted = report.evicted,
                promoted = report.promoted,
                queues = report.queues_changed,
                "Liveness sweep evicted stale participants"
            );
        }
        report
    }

    /// Sweep on every tick until `cancel` flips to `true` or its sender drops.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            timeout_s = self.timeout.num_seconds(),
            "Liveness monitor started"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let report = self.sweep_at(Utc::now()).await;
                    debug!(?report, "Liveness sweep complete");
                }
            }
        }

        info!("Liveness monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use viewgate_core::types::{ParticipantId, ResourceId};

    use super::*;
    use crate::queue::admission::NullSink;

    fn rid(raw: &str) -> ResourceId {
        ResourceId::parse(raw, 64).unwrap()
    }

    fn pid(raw: &str) -> ParticipantId {
        ParticipantId::parse(raw, 64).unwrap()
    }

    fn setup() -> (Arc<QueueRegistry>, LivenessMonitor) {
        let registry = Arc::new(QueueRegistry::new(1, Arc::new(NullSink)));
        let config = QueueConfig {
            heartbeat_interval_seconds: 10,
            heartbeat_timeout_seconds: 30,
            sweep_interval_seconds: 5,
            ..QueueConfig::default()
        };
        let monitor = LivenessMonitor::new(registry.clone(), &config);
        (registry, monitor)
    }

    #[tokio::test]
    async fn test_silent_waiter_evicted_and_followers_shift() {
        let (registry, monitor) = setup();
        let r = rid("lot-1");
        let start = Utc::now();
        for id in ["A", "B", "C"] {
            registry.join(&r, pid(id), start).await.unwrap();
        }

        // A and C keep beating; B falls silent for three intervals.
        for tick in 1..=3 {
            let at = start + Duration::seconds(10 * tick);
            registry.heartbeat(&r, &pid("A"), at).await.unwrap();
            registry.heartbeat(&r, &pid("C"), at).await.unwrap();
        }

        let report = monitor.sweep_at(start + Duration::seconds(31)).await;
        assert_eq!(report.evicted, 1);
        assert_eq!(report.promoted, 0);

        let status = registry.status(&r);
        assert_eq!(status.current_occupant_id, Some(pid("A")));
        assert_eq!(status.waiting_participants, vec![pid("C")]);
    }

    #[tokio::test]
    async fn test_within_deadline_nobody_evicted() {
        let (registry, monitor) = setup();
        let r = rid("lot-1");
        let start = Utc::now();
        registry.join(&r, pid("A"), start).await.unwrap();
        let report = monitor.sweep_at(start + Duration::seconds(30)).await;
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn test_dead_occupant_replaced_in_same_sweep() {
        let (registry, monitor) = setup();
        let r = rid("lot-1");
        let start = Utc::now();
        registry.join(&r, pid("A"), start).await.unwrap();
        registry.join(&r, pid("B"), start).await.unwrap();
        registry
            .heartbeat(&r, &pid("B"), start + Duration::seconds(25))
            .await
            .unwrap();

        let report = monitor.sweep_at(start + Duration::seconds(35)).await;
        assert_eq!(report.evicted, 1);
        assert_eq!(report.promoted, 1);
        assert_eq!(registry.status(&r).current_occupant_id, Some(pid("B")));
    }

    #[tokio::test]
    async fn test_sweep_spans_resources() {
        let (registry, monitor) = setup();
        let start = Utc::now();
        registry.join(&rid("a"), pid("A"), start).await.unwrap();
        registry.join(&rid("b"), pid("B"), start).await.unwrap();
        let report = monitor.sweep_at(start + Duration::seconds(45)).await;
        assert_eq!(report.evicted, 2);
        assert_eq!(report.queues_changed, 2);
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let (_registry, monitor) = setup();
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(async move { monitor.run(rx).await });
        time::sleep(StdDuration::from_secs(12)).await;
        tx.send(true).unwrap();
        time::timeout(StdDuration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}

use crate::application::InFlightSymbols;
use crate::application::ports::SubscriptionReader;
use crate::domain::{PublishTask, TimestampMs};
use crate::infrastructure::{PoolError, WorkerPool};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// What to do when a symbol's previous task is still running at tick time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Skip the symbol this tick; at most one task per symbol is in flight
    #[default]
    SkipInFlight,
    /// Always schedule; slow fetches can pile up across ticks
    Allow,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub symbols: usize,
    pub scheduled: usize,
    pub skipped: usize,
}

/// Issues one publish task per subscribed symbol on a fixed interval
///
/// A tick never waits for its tasks. With [`OverlapPolicy::Allow`], tick N+1
/// may start while tick N is still fetching, and a later tick's frame can
/// overtake an earlier one; clients order by the `timestamp` field.
pub struct BroadcastScheduler {
    subscriptions: Arc<dyn SubscriptionReader>,
    pool: Arc<WorkerPool<PublishTask>>,
    in_flight: Arc<InFlightSymbols>,
    policy: OverlapPolicy,
    interval: Duration,
}

impl BroadcastScheduler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionReader>,
        pool: Arc<WorkerPool<PublishTask>>,
        in_flight: Arc<InFlightSymbols>,
        policy: OverlapPolicy,
        interval: Duration,
    ) -> Self {
        BroadcastScheduler {
            subscriptions,
            pool,
            in_flight,
            policy,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run a single tick: snapshot the subscribed symbols and queue their tasks.
    ///
    /// Fails only when the pool has shut down.
    pub fn tick(&self, tick_at: TimestampMs) -> Result<TickReport, PoolError> {
        let symbols = self.subscriptions.subscribed_symbols();
        let mut report = TickReport {
            symbols: symbols.len(),
            ..TickReport::default()
        };

        for symbol in symbols {
            if self.policy == OverlapPolicy::SkipInFlight && !self.in_flight.try_acquire(&symbol)
            {
                tracing::debug!(symbol = %symbol, "Previous tick still in flight; skipping");
                report.skipped += 1;
                continue;
            }

            if let Err(e) = self.pool.enqueue(PublishTask::new(symbol.clone(), tick_at)) {
                self.in_flight.release(&symbol);
                return Err(e);
            }
            report.scheduled += 1;
        }

        Ok(report)
    }

    /// Tick every `interval` until `shutdown` flips to true or the pool stops.
    ///
    /// The first tick fires immediately.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            policy = ?self.policy,
            "Broadcast scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick(Utc::now().timestamp_millis()) {
                        Ok(report) if report.symbols > 0 => {
                            tracing::debug!(
                                symbols = report.symbols,
                                scheduled = report.scheduled,
                                skipped = report.skipped,
                                "Tick"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::info!(error = %e, "Worker pool closed; scheduler stopping");
                            break;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Broadcast scheduler stopped");
    }
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rollup_common::error::RollupResult;
use rollup_db::transform::models::{JobStatus, Schedule};
use rollup_db::transform::repositories::TransformRepository;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::coordinator::ExecutionCoordinator;
use crate::executor::UnitExecutor;
use crate::slots::ExecutionSlots;

struct Ticker {
    schedule: Schedule,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Keeps one ticker per STARTED job. Each tick holds the job's execution
/// slot, so a retiring and a replacement ticker never overlap.
pub struct Scheduler<R, E> {
    coordinator: Arc<ExecutionCoordinator<R, E>>,
    slots: ExecutionSlots,
    poll_interval: Duration,
}

impl<R, E> Scheduler<R, E>
where
    R: TransformRepository + 'static,
    E: UnitExecutor + 'static,
{
    pub fn new(coordinator: Arc<ExecutionCoordinator<R, E>>, poll_interval: Duration) -> Self {
        Self {
            coordinator,
            slots: ExecutionSlots::new(),
            poll_interval,
        }
    }

    /// Run until `shutdown` turns true or its sender is dropped, then wait
    /// for every ticker to finish its current tick.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> RollupResult<()> {
        let mut tickers: HashMap<String, Ticker> = HashMap::new();
        let mut retired: Vec<JoinHandle<()>> = Vec::new();
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(poll_interval_ms = self.poll_interval.as_millis() as u64, "scheduler started");

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if let Err(e) = self.reconcile(&mut tickers, &mut retired).await {
                        tracing::error!(error = %e, "reconcile failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(tickers = tickers.len(), "scheduler stopping");
        for (_, ticker) in tickers.drain() {
            let _ = ticker.stop.send(true);
            retired.push(ticker.handle);
        }
        for handle in retired {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "ticker task ended abnormally");
            }
        }
        tracing::info!("scheduler stopped");
        Ok(())
    }

    async fn reconcile(
        &self,
        tickers: &mut HashMap<String, Ticker>,
        retired: &mut Vec<JoinHandle<()>>,
    ) -> RollupResult<()> {
        retired.retain(|handle| !handle.is_finished());

        let mut wanted: HashMap<String, Schedule> = HashMap::new();
        for scanned in self.coordinator.repository().scan().await? {
            match scanned {
                Ok(v) if v.job.status == JobStatus::Started => {
                    wanted.insert(v.job.id, v.job.definition.schedule);
                }
                Ok(_) => {}
                Err(bad) => {
                    tracing::error!(job_id = %bad.id, error = %bad.error, "skipping undecodable job document");
                }
            }
        }

        let stale: Vec<String> = tickers
            .iter()
            .filter(|(id, t)| t.handle.is_finished() || wanted.get(*id) != Some(&t.schedule))
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            if let Some(ticker) = tickers.remove(&id) {
                if !ticker.handle.is_finished() {
                    tracing::info!(job_id = %id, "retiring ticker");
                    let _ = ticker.stop.send(true);
                    retired.push(ticker.handle);
                }
            }
        }

        for (id, schedule) in wanted {
            if tickers.contains_key(&id) {
                continue;
            }
            tracing::info!(job_id = %id, schedule = ?schedule, "spawning ticker");
            let (stop, stop_rx) = watch::channel(false);
            let handle = tokio::spawn(run_ticker(
                Arc::clone(&self.coordinator),
                self.slots.clone(),
                id.clone(),
                schedule.clone(),
                stop_rx,
            ));
            tickers.insert(
                id,
                Ticker {
                    schedule,
                    stop,
                    handle,
                },
            );
        }
        Ok(())
    }
}

async fn run_ticker<R, E>(
    coordinator: Arc<ExecutionCoordinator<R, E>>,
    slots: ExecutionSlots,
    id: String,
    schedule: Schedule,
    mut stop: watch::Receiver<bool>,
) where
    R: TransformRepository,
    E: UnitExecutor,
{
    loop {
        let now = Utc::now();
        let Some(next) = schedule.next_fire_after(now) else {
            tracing::warn!(job_id = %id, "schedule has no further fire times");
            return;
        };
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = stop.changed() => {
                tracing::debug!(job_id = %id, "ticker stopped");
                return;
            }
        }

        let Some(_slot) = slots.try_acquire(&id) else {
            tracing::debug!(job_id = %id, "previous tick still in flight, skipping");
            continue;
        };

        match coordinator.tick(&id).await {
            Ok(outcome) if outcome.keeps_ticking() => {
                tracing::debug!(job_id = %id, outcome = ?outcome, "tick done");
            }
            Ok(outcome) => {
                tracing::info!(job_id = %id, outcome = ?outcome, "job no longer runnable, ticker exiting");
                return;
            }
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "tick failed");
            }
        }
    }
}

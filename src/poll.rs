// Copyright 2024 RisingWave Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Poll Scheduler & Streaming Reader (C5, spec.md §4.5).
//!
//! A single timer-driven task with an explicit state machine (Idle,
//! Polling, Draining, Stopped) and a single-writer `lastEmittedTs`, in place
//! of the nested-future/callback topology the original wired together
//! (spec.md §9, "Cyclic and callback graphs in the source").

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::StreamExt;
use thiserror_ext::AsReport;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::dedup::DedupFilter;
use crate::dispatch::EventDispatcher;
use crate::error::TailerError;
use crate::lpts::LptsStore;
use crate::metrics::TailerMetrics;
use crate::row::CommitTimestamp;
use crate::source::StreamingSource;

/// spec.md §4.5, "State machine".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedulerState {
    Idle = 0,
    Polling = 1,
    Draining = 2,
    Stopped = 3,
}

impl SchedulerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SchedulerState::Idle,
            1 => SchedulerState::Polling,
            2 => SchedulerState::Draining,
            _ => SchedulerState::Stopped,
        }
    }
}

pub struct PollScheduler {
    source: Arc<dyn StreamingSource>,
    lpts_store: Arc<dyn LptsStore>,
    dedup: Arc<DedupFilter>,
    dispatcher: Arc<EventDispatcher>,
    metrics: Arc<TailerMetrics>,
    table_name: String,

    poll_interval: Duration,
    record_limit: usize,
    staleness: Duration,
    epoch_default: CommitTimestamp,

    state: AtomicU8,
    /// Re-entrancy guard (spec.md §4.5): incremented at entry; a nonzero
    /// pre-increment value means a cycle is already running, so this one is
    /// skipped and the counter is restored.
    reentrancy: AtomicUsize,
    /// `None` until the first successful cycle adopts the durable LPTS.
    last_emitted_ts: RwLock<Option<CommitTimestamp>>,
}

#[allow(clippy::too_many_arguments)]
impl PollScheduler {
    pub fn new(
        source: Arc<dyn StreamingSource>,
        lpts_store: Arc<dyn LptsStore>,
        dedup: Arc<DedupFilter>,
        dispatcher: Arc<EventDispatcher>,
        metrics: Arc<TailerMetrics>,
        table_name: String,
        poll_interval: Duration,
        record_limit: usize,
        staleness: Duration,
        epoch_default: CommitTimestamp,
    ) -> Self {
        Self {
            source,
            lpts_store,
            dedup,
            dispatcher,
            metrics,
            table_name,
            poll_interval,
            record_limit,
            staleness,
            epoch_default,
            state: AtomicU8::new(SchedulerState::Idle as u8),
            reentrancy: AtomicUsize::new(0),
            last_emitted_ts: RwLock::new(None),
        }
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn last_emitted_ts(&self) -> Option<CommitTimestamp> {
        *self.last_emitted_ts.read().unwrap()
    }

    pub fn dedup(&self) -> &Arc<DedupFilter> {
        &self.dedup
    }

    /// Drives one poll cycle per tick until `shutdown` fires, then drains
    /// and stops (spec.md §4.5 state machine; §5, "Cancellation").
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle_guarded().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.state.store(SchedulerState::Draining as u8, Ordering::SeqCst);
        info!("draining: waiting for in-flight poll cycle to finish");
        // Any poll cycle in flight holds the re-entrancy counter at 1; wait
        // for it to return to 0 (natural completion, spec.md §5).
        while self.reentrancy.load(Ordering::SeqCst) != 0 {
            tokio::task::yield_now().await;
        }
        self.state.store(SchedulerState::Stopped as u8, Ordering::SeqCst);
        info!("stopped");
    }

    /// Enforces "at most one poll cycle runs concurrently per tailer
    /// instance" (spec.md §8, invariant 5).
    async fn run_cycle_guarded(&self) {
        if self.reentrancy.fetch_add(1, Ordering::SeqCst) != 0 {
            self.reentrancy.fetch_sub(1, Ordering::SeqCst);
            warn!("skipping poll tick: previous cycle still running");
            return;
        }

        self.state.store(SchedulerState::Polling as u8, Ordering::SeqCst);
        if let Err(e) = self.run_cycle().await {
            error!(error = %e.as_report(), "poll cycle ended with an error; lastEmittedTs not advanced past the failing row");
        }
        self.state.store(SchedulerState::Idle as u8, Ordering::SeqCst);

        self.reentrancy.fetch_sub(1, Ordering::SeqCst);
    }

    /// Runs exactly one poll cycle without the timer loop or re-entrancy
    /// guard. Exposed for scenario-driven tests; production use goes through
    /// [`PollScheduler::run`].
    pub async fn tick_once(&self) -> Result<(), TailerError> {
        self.run_cycle().await
    }

    async fn run_cycle(&self) -> Result<(), TailerError> {
        let after = self.adopt_or_reuse_watermark().await?;

        let mut stream = self
            .source
            .stream_rows(after, self.record_limit, self.staleness)
            .await?;

        let mut rows_seen = 0usize;
        while let Some(item) = stream.next().await {
            let row = item?;
            rows_seen += 1;

            let watermark = self.last_emitted_ts().unwrap_or(self.epoch_default);
            if row.commit_ts < watermark {
                warn!(
                    row_ts = %row.commit_ts,
                    watermark = %watermark,
                    "observed row older than the current watermark; skipping"
                );
                continue;
            }

            if !self.dedup.is_fresh(&row) {
                self.metrics
                    .rows_suppressed
                    .with_label_values(&[&self.table_name])
                    .inc();
                debug!(pk = ?row.primary_key, ts = %row.commit_ts, "dedup suppressed row");
                continue;
            }

            let advance_to = row.commit_ts;
            self.dispatcher.submit(row).await.map_err(TailerError::Other)?;
            *self.last_emitted_ts.write().unwrap() = Some(advance_to);
        }

        debug!(rows_seen, "poll cycle complete");
        Ok(())
    }

    async fn adopt_or_reuse_watermark(&self) -> Result<CommitTimestamp, TailerError> {
        if let Some(ts) = self.last_emitted_ts() {
            return Ok(ts);
        }
        let adopted = self.lpts_store.read_lpts().await?.unwrap_or(self.epoch_default);
        *self.last_emitted_ts.write().unwrap() = Some(adopted);
        Ok(adopted)
    }
}

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

//! Wires C1–C6 together into a single runnable tailer. This is the one
//! piece of "two overlapping start paths" the original had
//! (spec.md §9); here there is exactly one `Tailer::start`.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::codec::DestinationSchema;
use crate::config::TailerConfig;
use crate::dedup::DedupFilter;
use crate::dispatch::EventDispatcher;
use crate::error::TailerError;
use crate::ledger::Ledger;
use crate::lpts::LptsStore;
use crate::metrics::TailerMetrics;
use crate::poll::{PollScheduler, SchedulerState};
use crate::schema::SchemaSet;
use crate::source::StreamingSource;

/// A running tailer: the poll scheduler plus its dispatch worker pool and a
/// shutdown handle.
pub struct Tailer {
    scheduler: Arc<PollScheduler>,
    scheduler_handle: JoinHandle<()>,
    dispatcher: Arc<EventDispatcher>,
    dispatch_handles: Vec<JoinHandle<()>>,
    vacuum_handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl Tailer {
    /// Builds the destination schema (C2) from a pre-discovered [`SchemaSet`]
    /// (C1), then assembles and starts C3–C6.
    pub fn start(
        config: &TailerConfig,
        schema_set: &SchemaSet,
        source: Arc<dyn StreamingSource>,
        lpts_store: Arc<dyn LptsStore>,
        ledger: Arc<dyn Ledger>,
        metrics: Arc<TailerMetrics>,
    ) -> Result<Self, TailerError> {
        let destination_schema = DestinationSchema::build(schema_set)?;
        let encoder = destination_schema.encoder();

        let dedup = Arc::new(DedupFilter::new(config.max_event_count, config.event_cache_ttl));

        let (dispatcher, dispatch_handles) = EventDispatcher::spawn(
            config.bucket_count,
            config.worker_count,
            config.table.clone(),
            encoder,
            ledger,
            metrics.clone(),
        );

        let scheduler = Arc::new(PollScheduler::new(
            source,
            lpts_store,
            dedup,
            dispatcher.clone(),
            metrics,
            config.table.clone(),
            config.poll_interval,
            config.record_limit,
            config.staleness,
            config.epoch_default(),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler_handle = tokio::spawn(scheduler.clone().run(shutdown_rx));

        // The dedicated vacuum sweep (spec.md §4.4, "Vacuum runs on a fixed
        // schedule") runs independently of the opportunistic over-capacity
        // sweep triggered inline on insert.
        let vacuum_handle = spawn_vacuum_task(scheduler.clone(), config.vacuum_rate);

        Ok(Self {
            scheduler,
            scheduler_handle,
            dispatcher,
            dispatch_handles,
            vacuum_handle,
            shutdown_tx,
        })
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Signals shutdown and waits for the scheduler to drain (spec.md §4.5:
    /// "Any →(shutdown signal)→ Draining →(last in-flight row handed
    /// off)→ Stopped"), then closes the dispatch lanes and waits for every
    /// worker to flush its remaining hand-offs (spec.md §5, "remaining
    /// hand-offs are flushed") instead of aborting them mid-drain.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.scheduler_handle.await;
        self.vacuum_handle.abort();

        self.dispatcher.close_lanes();
        for handle in self.dispatch_handles {
            let _ = handle.await;
        }
    }
}

fn spawn_vacuum_task(scheduler: Arc<PollScheduler>, vacuum_rate: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(vacuum_rate);
        loop {
            ticker.tick().await;
            if let Some(now) = scheduler.last_emitted_ts() {
                scheduler.dedup().vacuum(now);
            }
        }
    })
}

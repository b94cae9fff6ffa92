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

//! Event Dispatcher (C6, spec.md §4.6).
//!
//! Routes each row to one of `bucketCount` FIFO lanes by a jump-consistent
//! hash of its primary key, then a bounded worker pool drains the lanes,
//! encodes via [`crate::codec::Encoder`], and publishes to the downstream
//! [`crate::ledger::Ledger`]. The lane channels are themselves the
//! "fixed-arity hand-off buffer" of spec.md §4.6 — `tokio::sync::mpsc`
//! already gives FIFO-per-channel and blocks the sender when full, which is
//! exactly the back-pressure contract required.

use std::sync::{Arc, Mutex};

use futures::stream::{select_all, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use thiserror_ext::AsReport;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, warn};

use crate::codec::Encoder;
use crate::hash::route_to_bucket;
use crate::ledger::{Ledger, LedgerMessage};
use crate::metrics::TailerMetrics;
use crate::row::RowEvent;

const LANE_CAPACITY: usize = 1024;

pub struct EventDispatcher {
    /// Guarded so [`EventDispatcher::close_lanes`] can drop every sender
    /// (closing the channels) without requiring exclusive ownership of the
    /// dispatcher, which is shared via `Arc` with the poll scheduler.
    lane_senders: Mutex<Vec<mpsc::Sender<RowEvent>>>,
    bucket_count: usize,
    table_name: String,
    metrics: Arc<TailerMetrics>,
}

impl EventDispatcher {
    /// Builds the dispatcher and spawns `worker_count` draining tasks, each
    /// owning a round-robin subset of the `bucket_count` lanes.
    pub fn spawn(
        bucket_count: usize,
        worker_count: usize,
        table_name: String,
        encoder: Encoder,
        ledger: Arc<dyn Ledger>,
        metrics: Arc<TailerMetrics>,
    ) -> (Arc<Self>, Vec<JoinHandle<()>>) {
        assert!(bucket_count > 0 && worker_count > 0);

        let mut lane_senders = Vec::with_capacity(bucket_count);
        let mut lane_receivers: Vec<Option<mpsc::Receiver<RowEvent>>> = Vec::with_capacity(bucket_count);
        for _ in 0..bucket_count {
            let (tx, rx) = mpsc::channel(LANE_CAPACITY);
            lane_senders.push(tx);
            lane_receivers.push(Some(rx));
        }

        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let owned: Vec<_> = lane_receivers
                .iter_mut()
                .enumerate()
                .filter(|(lane, _)| lane % worker_count == worker_id)
                .filter_map(|(_, rx)| rx.take())
                .map(ReceiverStream::new)
                .collect();

            let encoder = encoder.clone();
            let ledger = ledger.clone();
            let metrics = metrics.clone();
            let table_name = table_name.clone();

            handles.push(tokio::spawn(async move {
                drain_lanes(owned, encoder, ledger, metrics, table_name).await;
            }));
        }

        (
            Arc::new(Self {
                lane_senders: Mutex::new(lane_senders),
                bucket_count,
                table_name,
                metrics,
            }),
            handles,
        )
    }

    /// Hands a fresh row off to its lane (spec.md §4.5 step 3/4). Blocks
    /// (applying back-pressure, `DispatchBlocked`) if the lane is full; never
    /// drops a row.
    pub async fn submit(&self, row: RowEvent) -> anyhow::Result<()> {
        let bucket = route_to_bucket(&row.primary_key, self.bucket_count);
        let sender = self
            .lane_senders
            .lock()
            .unwrap()
            .get(bucket)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("dispatch lane {bucket} closed; worker pool has shut down"))?;

        let row = match sender.try_send(row) {
            Ok(()) => return Ok(()),
            Err(mpsc::error::TrySendError::Full(row)) => row,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                anyhow::bail!("dispatch lane {bucket} closed; worker pool has shut down")
            }
        };

        self.metrics
            .dispatch_waits
            .with_label_values(&[&self.table_name])
            .inc();
        sender.send(row).await?;
        Ok(())
    }

    /// Drops every lane sender, closing the channels so each worker's
    /// `select_all` over its `ReceiverStream`s ends once the lanes it owns
    /// have drained (spec.md §5, "remaining hand-offs are flushed"). Called
    /// only after the poll scheduler has fully stopped, so no further
    /// `submit` calls race with this.
    pub fn close_lanes(&self) {
        self.lane_senders.lock().unwrap().clear();
    }
}

async fn drain_lanes(
    lanes: Vec<ReceiverStream<RowEvent>>,
    encoder: Encoder,
    ledger: Arc<dyn Ledger>,
    metrics: Arc<TailerMetrics>,
    table_name: String,
) {
    let mut merged = select_all(lanes);
    while let Some(row) = merged.next().await {
        let commit_timestamp = row.commit_ts.to_rfc3339_nanos();
        match encoder.encode(&row.columns) {
            Ok(payload) => {
                metrics
                    .message_size
                    .with_label_values(&[&table_name])
                    .observe(payload.len() as f64);

                let message = LedgerMessage {
                    payload,
                    table_name: table_name.clone(),
                    commit_timestamp,
                };
                if let Err(e) = ledger.publish(message).await {
                    error!(table = %table_name, error = %e.as_report(), "failed to publish row to downstream ledger");
                    continue;
                }
                metrics.rows_emitted.with_label_values(&[&table_name]).inc();
            }
            Err(e) => {
                // spec.md §7: EncodeError — logged, row skipped, LPTS still
                // advances past it (advanced already at hand-off time by C5).
                warn!(table = %table_name, error = %e.as_report(), "dropping row with type mismatch");
                metrics.encode_errors.with_label_values(&[&table_name]).inc();
            }
        }
    }
}

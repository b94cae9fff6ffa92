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

//! Test fixtures for C3/C5/C6, public (not `#[cfg(test)]`-gated) so both
//! this crate's unit tests and the `tests/scenarios.rs` integration suite
//! can drive the core against fakes instead of live GCP backends.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::error::{LptsError, TransientReadError};
use crate::ledger::{Ledger, LedgerMessage};
use crate::lpts::LptsStore;
use crate::row::{CommitTimestamp, RowEvent};
use crate::source::StreamingSource;

/// A scripted [`StreamingSource`]: each call to `stream_rows` pops and
/// replays the next scripted batch, regardless of the requested `after`
/// bound. Good enough to drive spec.md §8's seed scenarios, which script
/// cycle-by-cycle rather than simulating the underlying table.
pub struct FakeStreamingSource {
    batches: Mutex<VecDeque<Vec<Result<RowEvent, String>>>>,
}

impl FakeStreamingSource {
    pub fn new(batches: Vec<Vec<Result<RowEvent, String>>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
        }
    }

    /// A source with a single batch of rows, all successful, then empty
    /// forever after (S1/S2-style single-cycle scenarios).
    pub fn once(rows: Vec<RowEvent>) -> Self {
        Self::new(vec![rows.into_iter().map(Ok).collect()])
    }
}

#[async_trait]
impl StreamingSource for FakeStreamingSource {
    async fn stream_rows(
        &self,
        _after: CommitTimestamp,
        _limit: usize,
        _staleness: Duration,
    ) -> Result<BoxStream<'static, Result<RowEvent, TransientReadError>>, TransientReadError> {
        let batch = self.batches.lock().unwrap().pop_front().unwrap_or_default();
        let items: Vec<_> = batch
            .into_iter()
            .map(|item| item.map_err(|e| TransientReadError::Stream(anyhow::anyhow!(e))))
            .collect();
        Ok(stream::iter(items).boxed())
    }
}

/// An in-memory [`LptsStore`] seeded with an optional initial value.
pub struct FakeLptsStore {
    value: Mutex<Option<CommitTimestamp>>,
}

impl FakeLptsStore {
    pub fn new(initial: Option<CommitTimestamp>) -> Self {
        Self {
            value: Mutex::new(initial),
        }
    }
}

#[async_trait]
impl LptsStore for FakeLptsStore {
    async fn read_lpts(&self) -> Result<Option<CommitTimestamp>, LptsError> {
        Ok(*self.value.lock().unwrap())
    }

    async fn acknowledge(&self, ts: CommitTimestamp) -> Result<(), LptsError> {
        *self.value.lock().unwrap() = Some(ts);
        Ok(())
    }
}

/// A [`Ledger`] that records every published message instead of calling out
/// to Pub/Sub, so scenario tests can assert on exactly what C6 emitted.
#[derive(Default)]
pub struct RecordingLedger {
    published: Mutex<Vec<LedgerMessage>>,
}

impl RecordingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots published messages as `(table_name, commit_timestamp)`
    /// pairs in publish order; the payload bytes aren't interesting to
    /// assert on directly since Avro encoding is covered by `codec`'s own
    /// tests.
    pub fn published_keys(&self) -> Vec<(String, String)> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|m| (m.table_name.clone(), m.commit_timestamp.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.published.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Ledger for RecordingLedger {
    async fn publish(&self, message: LedgerMessage) -> anyhow::Result<()> {
        self.published.lock().unwrap().push(message);
        Ok(())
    }
}

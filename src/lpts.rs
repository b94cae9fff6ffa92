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

//! LPTS Store Client (C3, spec.md §4.3).

use async_trait::async_trait;

use crate::error::LptsError;
use crate::row::CommitTimestamp;

/// Reads (and optionally acknowledges) the single-row bookkeeping table
/// `(Id=0, CommitTimestamp, LastProcessedTimestamp)` (spec.md §6, "LPTS
/// table contract"). Defined as a trait so the polling state machine is
/// testable without a live database, the same trait-with-concrete-backend
/// split used for the downstream ledger and streaming source.
#[async_trait]
pub trait LptsStore: Send + Sync {
    /// Strong read of the bookkeeping row. `None` if absent (spec.md §4.3).
    async fn read_lpts(&self) -> Result<Option<CommitTimestamp>, LptsError>;

    /// Not strictly required if an external consumer owns writes (spec.md
    /// §4.3); the default no-op reflects that the tailer treats writes as
    /// optional.
    async fn acknowledge(&self, _ts: CommitTimestamp) -> Result<(), LptsError> {
        Ok(())
    }
}

/// Reads the bookkeeping row via a single-row Spanner table keyed by `Id=0`.
pub struct SpannerLptsStore {
    client: google_cloud_spanner::client::Client,
    table: String,
}

impl SpannerLptsStore {
    pub fn new(client: google_cloud_spanner::client::Client, table: String) -> Self {
        Self { client, table }
    }
}

#[async_trait]
impl LptsStore for SpannerLptsStore {
    async fn read_lpts(&self) -> Result<Option<CommitTimestamp>, LptsError> {
        use google_cloud_spanner::key::Key;
        use google_cloud_spanner::statement::ToKind;

        let mut tx = self
            .client
            .single()
            .await
            .map_err(|e| LptsError::Unreachable(anyhow::anyhow!(e)))?;

        let row = tx
            .read(
                &self.table,
                vec!["LastProcessedTimestamp".to_string()],
                vec![Key::new(&0i64.to_kind())],
            )
            .await
            .map_err(|e| LptsError::Unreachable(anyhow::anyhow!(e)))?
            .next()
            .await
            .map_err(|e| LptsError::Unreachable(anyhow::anyhow!(e)))?;

        let Some(row) = row else { return Ok(None) };

        let raw: String = row
            .column_by_index(0)
            .map_err(|e| LptsError::Malformed(e.to_string()))?;

        let ts = CommitTimestamp::parse_rfc3339(&raw)
            .map_err(|e| LptsError::Malformed(format!("`{raw}`: {e}")))?;
        Ok(Some(ts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeLptsStore(Mutex<Option<CommitTimestamp>>);

    #[async_trait]
    impl LptsStore for FakeLptsStore {
        async fn read_lpts(&self) -> Result<Option<CommitTimestamp>, LptsError> {
            Ok(*self.0.lock().unwrap())
        }

        async fn acknowledge(&self, ts: CommitTimestamp) -> Result<(), LptsError> {
            *self.0.lock().unwrap() = Some(ts);
            Ok(())
        }
    }

    #[tokio::test]
    async fn absent_row_reads_as_none() {
        let store = FakeLptsStore(Mutex::new(None));
        assert_eq!(store.read_lpts().await.unwrap(), None);
    }

    #[tokio::test]
    async fn acknowledge_round_trips() {
        let store = FakeLptsStore(Mutex::new(None));
        let ts = CommitTimestamp::parse_rfc3339("2024-01-01T00:00:00Z").unwrap();
        store.acknowledge(ts).await.unwrap();
        assert_eq!(store.read_lpts().await.unwrap(), Some(ts));
    }
}

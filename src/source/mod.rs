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

//! The streaming-read half of C5 (spec.md §4.5), expressed as a trait so the
//! polling state machine can be driven by a fake source in tests, mirroring
//! a similar `SplitReader` trait elsewhere in this codebase.

pub mod spanner;

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::TransientReadError;
use crate::row::{CommitTimestamp, RowEvent};

/// A streamed source of committed rows. Implementations issue the
/// bounded-stale, read-only query described in spec.md §4.5 and yield rows
/// ordered by commit timestamp ascending.
#[async_trait]
pub trait StreamingSource: Send + Sync {
    /// Opens a streaming read of all rows with `ts > after`, ordered by `ts`
    /// ascending, capped at `limit` rows, at the given staleness bound
    /// (spec.md §4.5, "Query shape" / "Consistency" / "Row budget").
    async fn stream_rows(
        &self,
        after: CommitTimestamp,
        limit: usize,
        staleness: Duration,
    ) -> Result<BoxStream<'static, Result<RowEvent, TransientReadError>>, TransientReadError>;
}

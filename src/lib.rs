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

//! Change-data-capture tailer for a commit-timestamp-ordered relational
//! source: discovers the source schema, builds an Avro encoding for it,
//! tracks progress against a durable bookkeeping row, deduplicates rows
//! observed more than once at the poll boundary, and dispatches freshly
//! observed rows to a downstream ledger in per-key FIFO order.

pub mod codec;
pub mod config;
pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod hash;
pub mod ledger;
pub mod lpts;
pub mod metrics;
pub mod poll;
pub mod row;
pub mod schema;
pub mod source;
pub mod tailer;
pub mod testing;

pub use error::{Result, TailerError};
pub use tailer::Tailer;

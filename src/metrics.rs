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

//! Process-level metrics registry (spec.md §6, "Process-level state": "One
//! metrics registry with the view `spez/views/message-size`").

use prometheus::{HistogramVec, IntCounterVec, Opts, Registry};

const MIB: f64 = 1024.0 * 1024.0;

/// Metrics shared by the scheduler (C5) and the event dispatcher (C6).
pub struct TailerMetrics {
    pub registry: Registry,
    /// Distribution of encoded message size, bucket edges `0, 16 MiB, 256
    /// MiB` (spec.md §4.6), labeled by table.
    pub message_size: HistogramVec,
    pub rows_emitted: IntCounterVec,
    pub rows_suppressed: IntCounterVec,
    pub encode_errors: IntCounterVec,
    /// Incremented whenever a hand-off had to wait for a free lane slot
    /// (spec.md §4.6, `DispatchBlocked` — "not an error, applies
    /// back-pressure").
    pub dispatch_waits: IntCounterVec,
}

impl TailerMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let message_size = HistogramVec::new(
            prometheus::HistogramOpts::new("spez_message_size_bytes", "Encoded message size in bytes")
                .buckets(vec![0.0, 16.0 * MIB, 256.0 * MIB]),
            &["table"],
        )?;
        let rows_emitted = IntCounterVec::new(
            Opts::new("spez_rows_emitted_total", "Rows emitted to the downstream ledger"),
            &["table"],
        )?;
        let rows_suppressed = IntCounterVec::new(
            Opts::new("spez_rows_suppressed_total", "Rows suppressed by the dedup filter"),
            &["table"],
        )?;
        let encode_errors = IntCounterVec::new(
            Opts::new("spez_encode_errors_total", "Rows skipped due to a type mismatch"),
            &["table"],
        )?;
        let dispatch_waits = IntCounterVec::new(
            Opts::new("spez_dispatch_waits_total", "Hand-offs that waited for a free lane slot"),
            &["table"],
        )?;

        registry.register(Box::new(message_size.clone()))?;
        registry.register(Box::new(rows_emitted.clone()))?;
        registry.register(Box::new(rows_suppressed.clone()))?;
        registry.register(Box::new(encode_errors.clone()))?;
        registry.register(Box::new(dispatch_waits.clone()))?;

        Ok(Self {
            registry,
            message_size,
            rows_emitted,
            rows_suppressed,
            encode_errors,
            dispatch_waits,
        })
    }
}

impl Default for TailerMetrics {
    fn default() -> Self {
        Self::new().expect("metric registration with fixed, non-conflicting names cannot fail")
    }
}

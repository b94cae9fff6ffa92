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

//! Dedup Filter (C4, spec.md §4.4).
//!
//! A two-level check: a bounded approximate set (`GrowableBloom`) guards the
//! common case, backed by an exact `moka` cache keyed by the 128-bit dedup
//! hash for disambiguation and vacuuming. Mutated only by C5 under its
//! single-writer discipline (spec.md §3, "Ownership").

use std::sync::Mutex;
use std::time::Duration;

use growable_bloom_filter::GrowableBloom;
use moka::sync::Cache;

use crate::hash::dedup_key;
use crate::row::{CommitTimestamp, RowEvent};

/// Target false-positive rate for the approximate set (spec.md §4.4: "≤ 1%").
const TARGET_FALSE_POSITIVE_RATE: f64 = 0.01;

pub struct DedupFilter {
    approximate: Mutex<GrowableBloom>,
    exact: Cache<u128, CommitTimestamp>,
    max_event_count: usize,
    event_cache_ttl: Duration,
}

impl DedupFilter {
    pub fn new(max_event_count: usize, event_cache_ttl: Duration) -> Self {
        Self {
            approximate: Mutex::new(GrowableBloom::new(TARGET_FALSE_POSITIVE_RATE, max_event_count)),
            exact: Cache::builder()
                .max_capacity(max_event_count as u64)
                .time_to_live(event_cache_ttl)
                .build(),
            max_event_count,
            event_cache_ttl,
        }
    }

    /// Returns `true` exactly when the exact map does not contain the
    /// event's hash, and as a side effect inserts the hash into both
    /// structures (spec.md §4.4, "`isFresh(event)`").
    pub fn is_fresh(&self, event: &RowEvent) -> bool {
        let key = dedup_key(&event.primary_key, event.commit_ts);

        // A bloom miss is conclusive: the key has never been inserted. A hit
        // may be a false positive, so it is disambiguated against the exact
        // map (spec.md §4.4: "two-level check").
        let maybe_seen = self.approximate.lock().unwrap().contains(&key);
        if maybe_seen && self.exact.contains_key(&key) {
            return false;
        }

        self.exact.insert(key, event.commit_ts);
        self.approximate.lock().unwrap().insert(&key);

        if self.exact.entry_count() as usize >= self.max_event_count {
            self.vacuum(event.commit_ts);
        }

        true
    }

    /// Removes entries older than `now - eventCacheTTL` and rebuilds the
    /// approximate set from survivors (spec.md §4.4, "vacuum sweep"). `now`
    /// is passed in rather than read from the clock so tests can drive it
    /// deterministically; the production scheduler passes the current
    /// watermark or wall-clock time.
    pub fn vacuum(&self, now: CommitTimestamp) {
        let cutoff = now.as_datetime() - chrono::Duration::from_std(self.event_cache_ttl).unwrap();
        self.exact.run_pending_tasks();

        let mut survivors = Vec::new();
        for (key, ts) in self.exact.iter() {
            if ts.as_datetime() > cutoff {
                survivors.push(*key);
            } else {
                self.exact.invalidate(key.as_ref());
            }
        }

        let mut rebuilt = GrowableBloom::new(TARGET_FALSE_POSITIVE_RATE, self.max_event_count);
        for key in &survivors {
            rebuilt.insert(key);
        }
        *self.approximate.lock().unwrap() = rebuilt;
    }

    pub fn len(&self) -> usize {
        self.exact.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::ColumnValue;

    fn event(pk: &str, ts: &str) -> RowEvent {
        RowEvent::new(
            pk.as_bytes().to_vec(),
            CommitTimestamp::parse_rfc3339(ts).unwrap(),
            vec![("pk".to_string(), ColumnValue::String(pk.to_string()))],
        )
    }

    #[test]
    fn first_sighting_is_fresh_second_is_not() {
        let filter = DedupFilter::new(1_000, Duration::from_secs(600));
        let e = event("A", "2024-01-01T00:00:00Z");
        assert!(filter.is_fresh(&e));
        assert!(!filter.is_fresh(&e));
    }

    #[test]
    fn different_timestamps_are_distinct_events() {
        let filter = DedupFilter::new(1_000, Duration::from_secs(600));
        let e1 = event("A", "2024-01-01T00:00:00Z");
        let e2 = event("A", "2024-01-01T00:00:01Z");
        assert!(filter.is_fresh(&e1));
        assert!(filter.is_fresh(&e2));
    }

    #[test]
    fn vacuum_evicts_entries_older_than_ttl() {
        let filter = DedupFilter::new(1_000, Duration::from_secs(60));
        let old = event("A", "2024-01-01T00:00:00Z");
        let recent = event("B", "2024-01-01T00:05:00Z");
        assert!(filter.is_fresh(&old));
        assert!(filter.is_fresh(&recent));

        let now = CommitTimestamp::parse_rfc3339("2024-01-01T00:05:30Z").unwrap();
        filter.vacuum(now);

        assert_eq!(filter.len(), 1);
        // The evicted key is fresh again since it no longer appears in the
        // exact map (spec.md §8, property 7: "Capacity").
        assert!(filter.is_fresh(&old));
    }
}

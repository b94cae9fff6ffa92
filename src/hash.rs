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

//! Small, self-contained hashing primitives used by the dedup filter (C4)
//! and the event dispatcher (C6). Neither warrants pulling in a dedicated
//! crate: the 128-bit dedup key is one `twox_hash` call, and jump consistent
//! hashing is the same ~10-line algorithm every implementation (Cassandra,
//! the JVM client this tailer succeeds) carries inline.

use twox_hash::XxHash3_128;

use crate::row::CommitTimestamp;

/// 128-bit hash of `(primaryKey, commitTs)` used as the dedup key
/// (spec.md §3, "Dedup key").
pub fn dedup_key(primary_key: &[u8], commit_ts: CommitTimestamp) -> u128 {
    let mut buf = Vec::with_capacity(primary_key.len() + 32);
    buf.extend_from_slice(primary_key);
    buf.extend_from_slice(commit_ts.to_rfc3339_nanos().as_bytes());
    XxHash3_128::oneshot(&buf)
}

/// Lamping & Veach jump consistent hash: maps `key` onto one of
/// `num_buckets` buckets with minimal remapping as `num_buckets` changes.
/// Used by the event dispatcher (C6) to route a primary key to a hand-off
/// lane (spec.md §4.6, "stable jump-style hash").
pub fn jump_consistent_hash(mut key: u64, num_buckets: usize) -> usize {
    assert!(num_buckets > 0, "num_buckets must be > 0");
    let mut b: i64 = -1;
    let mut j: i64 = 0;
    while j < num_buckets as i64 {
        b = j;
        key = key.wrapping_mul(2862933555777941757).wrapping_add(1);
        j = ((b.wrapping_add(1) as f64) * ((1i64 << 31) as f64)
            / (((key >> 33).wrapping_add(1)) as f64)) as i64;
    }
    b as usize
}

/// Routes a primary key to one of `bucket_count` hand-off lanes
/// (spec.md §4.6, "routing bucket").
pub fn route_to_bucket(primary_key: &[u8], bucket_count: usize) -> usize {
    let hash = XxHash3_128::oneshot(primary_key) as u64;
    jump_consistent_hash(hash, bucket_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jump_hash_is_deterministic() {
        let a = jump_consistent_hash(42, 12);
        let b = jump_consistent_hash(42, 12);
        assert_eq!(a, b);
        assert!(a < 12);
    }

    #[test]
    fn jump_hash_distributes_across_buckets() {
        let mut seen = std::collections::HashSet::new();
        for key in 0u64..10_000 {
            seen.insert(jump_consistent_hash(key, 12));
        }
        assert_eq!(seen.len(), 12);
    }

    #[test]
    fn dedup_key_differs_by_timestamp() {
        let pk = b"row-a".to_vec();
        let t1 = CommitTimestamp::parse_rfc3339("2024-01-01T00:00:00Z").unwrap();
        let t2 = CommitTimestamp::parse_rfc3339("2024-01-01T00:00:01Z").unwrap();
        assert_ne!(dedup_key(&pk, t1), dedup_key(&pk, t2));
    }

    #[test]
    fn route_to_bucket_is_stable() {
        let pk = b"some-primary-key".to_vec();
        let a = route_to_bucket(&pk, 12);
        let b = route_to_bucket(&pk, 12);
        assert_eq!(a, b);
        assert!(a < 12);
    }
}

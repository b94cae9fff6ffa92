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

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

/// A commit timestamp: a server-assigned, strictly monotonic time.
///
/// Stored as UTC nanoseconds so ordering is exact and independent of the
/// string representation used on the wire (spec.md §3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommitTimestamp(DateTime<Utc>);

impl CommitTimestamp {
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// ISO-8601 UTC with nanosecond fraction, lexicographically orderable
    /// (spec.md §3, LPTS record).
    pub fn to_rfc3339_nanos(self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    pub fn parse_rfc3339(s: &str) -> anyhow::Result<Self> {
        let dt = DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc);
        Ok(Self(dt))
    }

    /// The configured default start point when no LPTS row exists
    /// (spec.md §6, "Epoch default").
    pub fn epoch_default() -> Self {
        Self::parse_rfc3339("2019-08-08T20:30:39.802644Z")
            .expect("epoch default literal is a valid RFC-3339 timestamp")
    }

    pub fn as_micros_since_epoch(self) -> i64 {
        self.0.timestamp_micros()
    }

    pub fn as_days_since_epoch(self) -> i32 {
        (self.0.timestamp() / 86_400) as i32
    }
}

impl fmt::Display for CommitTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rfc3339_nanos())
    }
}

/// One of the typed database values a column may hold (spec.md §3).
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Int64(i64),
    Float64(f64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    Timestamp(CommitTimestamp),
    Date(chrono::NaiveDate),
    Null,
}

impl ColumnValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnValue::Int64(_) => "int64",
            ColumnValue::Float64(_) => "float64",
            ColumnValue::Bool(_) => "bool",
            ColumnValue::String(_) => "string",
            ColumnValue::Bytes(_) => "bytes",
            ColumnValue::Timestamp(_) => "timestamp",
            ColumnValue::Date(_) => "date",
            ColumnValue::Null => "null",
        }
    }
}

/// A row observed by the streaming reader, ready for dedup and encoding
/// (spec.md §3, "Row event").
#[derive(Debug, Clone)]
pub struct RowEvent {
    pub primary_key: Vec<u8>,
    pub commit_ts: CommitTimestamp,
    pub columns: Vec<(String, ColumnValue)>,
    pub size_bytes: usize,
}

impl RowEvent {
    pub fn new(primary_key: Vec<u8>, commit_ts: CommitTimestamp, columns: Vec<(String, ColumnValue)>) -> Self {
        let size_bytes = primary_key.len()
            + columns
                .iter()
                .map(|(name, value)| name.len() + column_value_size(value))
                .sum::<usize>();
        Self {
            primary_key,
            commit_ts,
            columns,
            size_bytes,
        }
    }
}

fn column_value_size(value: &ColumnValue) -> usize {
    match value {
        ColumnValue::Int64(_) => 8,
        ColumnValue::Float64(_) => 8,
        ColumnValue::Bool(_) => 1,
        ColumnValue::String(s) => s.len(),
        ColumnValue::Bytes(b) => b.len(),
        ColumnValue::Timestamp(_) => 8,
        ColumnValue::Date(_) => 4,
        ColumnValue::Null => 0,
    }
}

/// Serializes a (possibly composite) primary key the way the source table
/// contract requires (spec.md §6): concatenation in key order separated by a
/// byte that cannot appear in any value, or length-prefixed when the key is
/// entirely non-textual.
pub fn encode_primary_key(parts: &[ColumnValue]) -> Vec<u8> {
    const SEPARATOR: u8 = 0x00;
    let all_non_textual = parts
        .iter()
        .all(|v| !matches!(v, ColumnValue::String(_) | ColumnValue::Bytes(_)));

    let mut out = Vec::new();
    if all_non_textual {
        for part in parts {
            let bytes = column_value_raw_bytes(part);
            out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
            out.extend_from_slice(&bytes);
        }
    } else {
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                out.push(SEPARATOR);
            }
            out.extend_from_slice(&column_value_raw_bytes(part));
        }
    }
    out
}

fn column_value_raw_bytes(value: &ColumnValue) -> Vec<u8> {
    match value {
        ColumnValue::Int64(i) => i.to_be_bytes().to_vec(),
        ColumnValue::Float64(f) => f.to_be_bytes().to_vec(),
        ColumnValue::Bool(b) => vec![*b as u8],
        ColumnValue::String(s) => s.as_bytes().to_vec(),
        ColumnValue::Bytes(b) => b.clone(),
        ColumnValue::Timestamp(ts) => ts.as_micros_since_epoch().to_be_bytes().to_vec(),
        ColumnValue::Date(d) => d.to_string().into_bytes(),
        ColumnValue::Null => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_default_matches_configured_literal() {
        assert_eq!(
            CommitTimestamp::epoch_default().to_rfc3339_nanos(),
            "2019-08-08T20:30:39.802644000Z"
        );
    }

    #[test]
    fn ordering_is_strictly_by_time() {
        let a = CommitTimestamp::parse_rfc3339("2024-01-01T00:00:00.000000001Z").unwrap();
        let b = CommitTimestamp::parse_rfc3339("2024-01-01T00:00:00.000000002Z").unwrap();
        assert!(a < b);
    }

    #[test]
    fn composite_key_separates_textual_parts() {
        let key = encode_primary_key(&[
            ColumnValue::String("a".into()),
            ColumnValue::String("b".into()),
        ]);
        assert_eq!(key, vec![b'a', 0x00, b'b']);
    }

    #[test]
    fn all_numeric_key_is_length_prefixed() {
        let key = encode_primary_key(&[ColumnValue::Int64(1), ColumnValue::Int64(2)]);
        // 4-byte length prefix + 8-byte value, twice.
        assert_eq!(key.len(), 2 * (4 + 8));
    }
}

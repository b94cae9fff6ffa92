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

//! Schema Introspector (C1, spec.md §4.1).

pub mod spanner;

use thiserror_ext::AsReport;
use tracing::error;

use crate::error::SchemaError;

/// The database's column semantic type, mapped 1:1 to the wire types of
/// spec.md §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticType {
    Int64,
    Float64,
    Bool,
    String,
    Bytes,
    Timestamp,
    Date,
}

/// One column of the source table, in catalog ordinal order.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDesc {
    pub name: String,
    pub semantic_type: SemanticType,
    pub nullable: bool,
}

/// The immutable descriptor produced once per tailer lifetime (spec.md §3,
/// "Schema set").
#[derive(Debug, Clone)]
pub struct SchemaSet {
    pub namespace: String,
    pub table_name: String,
    pub ts_column: String,
    pub fields: Vec<FieldDesc>,
    /// Ordinal index of `ts_column` within `fields`.
    pub ts_column_index: usize,
    /// Primary key column names, in key order (spec.md §4.1: the
    /// introspector joins a primary-key catalog query alongside columns and
    /// options).
    pub primary_key: Vec<String>,
}

/// Raw rows returned by the three catalog queries the introspector joins
/// (spec.md §4.1): columns, primary key columns, and column options.
pub struct CatalogRows {
    /// `(name, semantic_type, nullable, ordinal_position)`, one per column.
    pub columns: Vec<(String, SemanticType, bool, i64)>,
    /// Primary key column names, in key order.
    pub primary_key: Vec<String>,
    /// `(column_name, allow_commit_timestamp)` pairs.
    pub options: Vec<(String, bool)>,
}

/// Queries the catalog for a table's schema and commit-timestamp column.
///
/// The three catalog queries (columns, primary key, options) are issued
/// concurrently and joined, per spec.md §4.1. The actual catalog access is
/// injected via `fetch`, keeping this function testable without a live
/// database and reusable regardless of which adapter backs it (mirrors the
/// teacher's trait-plus-concrete-backend split, e.g. `SplitReader`).
pub async fn discover<F, Fut>(
    namespace: &str,
    table: &str,
    fetch: F,
) -> Result<SchemaSet, SchemaError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<Option<CatalogRows>, SchemaError>>,
{
    let rows = fetch().await.map_err(|e| {
        error!(table, reason = %e.as_report(), "schema introspection failed");
        e
    })?;
    let rows = rows.ok_or_else(|| SchemaError::TableNotFound(table.to_string())).map_err(|e| {
        error!(table, reason = %e.as_report(), "schema introspection failed");
        e
    })?;

    let mut columns = rows.columns.clone();
    columns.sort_by_key(|(_, _, _, ordinal)| *ordinal);

    let options_by_name: std::collections::HashMap<_, _> = rows.options.into_iter().collect();

    // The commit-timestamp column is the first column (lowest ordinal
    // position) whose `allow_commit_timestamp` option is true (spec.md §4.1).
    let ts_column_index = columns
        .iter()
        .position(|(name, ..)| options_by_name.get(name).copied().unwrap_or(false))
        .ok_or_else(|| SchemaError::NoCommitTimestampColumn(table.to_string()))
        .map_err(|e| {
            error!(table, reason = %e.as_report(), "schema introspection failed");
            e
        })?;

    let fields = columns
        .iter()
        .map(|(name, ty, nullable, _)| FieldDesc {
            name: name.clone(),
            semantic_type: *ty,
            nullable: *nullable,
        })
        .collect::<Vec<_>>();

    let ts_column = fields[ts_column_index].name.clone();

    Ok(SchemaSet {
        namespace: namespace.to_string(),
        table_name: table.to_string(),
        ts_column,
        fields,
        ts_column_index,
        primary_key: rows.primary_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(with_commit_ts: bool, second_commit_ts: bool) -> CatalogRows {
        let mut options = vec![("Id".to_string(), false)];
        options.push(("CommitTs".to_string(), with_commit_ts));
        if second_commit_ts {
            options.push(("OtherTs".to_string(), true));
        }
        CatalogRows {
            columns: vec![
                ("Id".to_string(), SemanticType::Int64, false, 0),
                ("CommitTs".to_string(), SemanticType::Timestamp, false, 1),
                ("OtherTs".to_string(), SemanticType::Timestamp, false, 2),
            ],
            primary_key: vec!["Id".to_string()],
            options,
        }
    }

    #[tokio::test]
    async fn picks_lowest_ordinal_commit_timestamp_column() {
        let schema = discover("ns", "events", || async { Ok(Some(rows(true, true))) })
            .await
            .unwrap();
        assert_eq!(schema.ts_column, "CommitTs");
        assert_eq!(schema.ts_column_index, 1);
    }

    #[tokio::test]
    async fn fails_without_commit_timestamp_column() {
        let err = discover("ns", "events", || async { Ok(Some(rows(false, false))) })
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaError::NoCommitTimestampColumn(_)));
    }

    #[tokio::test]
    async fn fails_when_table_missing() {
        let err = discover("ns", "events", || async { Ok(None) }).await.unwrap_err();
        assert!(matches!(err, SchemaError::TableNotFound(_)));
    }
}

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

//! The concrete `StreamingSource` backend. Isolated here so the rest of the
//! core never names `google-cloud-spanner` directly (spec.md §6, "Source
//! table contract"). `google-cloud-spanner` is the natural sibling of the
//! `google-cloud-bigquery` / `google-cloud-pubsub` crates already in use here
//! (same author, same `google-cloud-gax` / `google-cloud-googleapis`
//! foundation).

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures_async_stream::try_stream;
use google_cloud_spanner::client::Client;
use google_cloud_spanner::reader::AsyncIterator;
use google_cloud_spanner::row::Row as SpannerRow;
use google_cloud_spanner::statement::Statement;
use google_cloud_spanner::transaction::{CallOptions, QueryOptions};
use google_cloud_spanner::transaction_ro::TimestampBound;
use google_cloud_spanner::value::CommitTimestamp as SpannerCommitTimestamp;

use crate::error::TransientReadError;
use crate::row::{encode_primary_key, ColumnValue, CommitTimestamp, RowEvent};
use crate::schema::{FieldDesc, SemanticType};
use crate::source::StreamingSource;

/// Reads a single configured table via bounded-stale streaming queries.
#[derive(Clone)]
pub struct SpannerSource {
    client: Client,
    table: String,
    ts_column: String,
    pk_columns: Vec<String>,
    fields: Vec<FieldDesc>,
}

impl SpannerSource {
    pub fn new(
        client: Client,
        table: String,
        ts_column: String,
        pk_columns: Vec<String>,
        fields: Vec<FieldDesc>,
    ) -> Self {
        Self {
            client,
            table,
            ts_column,
            pk_columns,
            fields,
        }
    }

    fn select_sql(&self) -> String {
        build_select_sql(&self.table, &self.ts_column, &self.fields)
    }
}

fn build_select_sql(table: &str, ts_column: &str, fields: &[FieldDesc]) -> String {
    let columns = fields.iter().map(|f| f.name.as_str()).collect::<Vec<_>>().join(", ");
    format!(
        "SELECT {columns} FROM {table} WHERE {ts_column} > @after ORDER BY {ts_column} ASC LIMIT @limit"
    )
}

#[async_trait]
impl StreamingSource for SpannerSource {
    async fn stream_rows(
        &self,
        after: CommitTimestamp,
        limit: usize,
        staleness: Duration,
    ) -> Result<BoxStream<'static, Result<RowEvent, TransientReadError>>, TransientReadError> {
        let mut stmt = Statement::new(self.select_sql());
        stmt.add_param("after", &after.as_datetime());
        stmt.add_param("limit", &(limit as i64));

        let tx = self
            .client
            .single_with_timestamp_bound(TimestampBound::max_staleness(staleness))
            .await
            .map_err(|e| TransientReadError::Stream(anyhow::anyhow!(e)))?;

        let iter = tx
            .query_with_option(stmt, QueryOptions::default(), CallOptions::default())
            .await
            .map_err(|e| TransientReadError::Stream(anyhow::anyhow!(e)))?;

        Ok(stream_rows_inner(
            iter,
            self.fields.clone(),
            self.ts_column.clone(),
            self.pk_columns.clone(),
        ))
    }
}

#[try_stream(boxed, ok = RowEvent, error = TransientReadError)]
async fn stream_rows_inner<R>(
    mut iter: R,
    fields: Vec<FieldDesc>,
    ts_column: String,
    pk_columns: Vec<String>,
) where
    R: AsyncIterator<Item = SpannerRow> + Send + 'static,
{
    loop {
        let row = iter
            .next()
            .await
            .map_err(|e| TransientReadError::Stream(anyhow::anyhow!(e)))?;
        let Some(row) = row else { break };
        yield row_to_event(&row, &fields, &ts_column, &pk_columns)?;
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::schema::SemanticType;

    fn fields() -> Vec<FieldDesc> {
        vec![
            FieldDesc {
                name: "Id".to_string(),
                semantic_type: SemanticType::String,
                nullable: false,
            },
            FieldDesc {
                name: "CommitTs".to_string(),
                semantic_type: SemanticType::Timestamp,
                nullable: false,
            },
            FieldDesc {
                name: "Amount".to_string(),
                semantic_type: SemanticType::Int64,
                nullable: true,
            },
        ]
    }

    #[test]
    fn select_sql_orders_by_the_commit_timestamp_column() {
        expect![[
            "SELECT Id, CommitTs, Amount FROM Events WHERE CommitTs > @after ORDER BY CommitTs ASC LIMIT @limit"
        ]]
        .assert_eq(&build_select_sql("Events", "CommitTs", &fields()));
    }
}

fn row_to_event(
    row: &SpannerRow,
    fields: &[FieldDesc],
    ts_column: &str,
    pk_columns: &[String],
) -> Result<RowEvent, TransientReadError> {
    let mut columns = Vec::with_capacity(fields.len());
    let mut commit_ts = None;

    for (index, field) in fields.iter().enumerate() {
        let value = spanner_column_to_value(row, index, field)
            .map_err(|e| TransientReadError::Stream(anyhow::anyhow!(e)))?;
        if field.name == ts_column {
            if let ColumnValue::Timestamp(ts) = &value {
                commit_ts = Some(*ts);
            }
        }
        columns.push((field.name.clone(), value));
    }

    let commit_ts = commit_ts.ok_or_else(|| {
        TransientReadError::Stream(anyhow::anyhow!("row missing commit timestamp column"))
    })?;

    let pk_values: Vec<ColumnValue> = pk_columns
        .iter()
        .map(|name| {
            columns
                .iter()
                .find(|(col_name, _)| col_name == name)
                .map(|(_, v)| v.clone())
                .unwrap_or(ColumnValue::Null)
        })
        .collect();
    let primary_key = encode_primary_key(&pk_values);

    Ok(RowEvent::new(primary_key, commit_ts, columns))
}

fn spanner_column_to_value(
    row: &SpannerRow,
    index: usize,
    field: &FieldDesc,
) -> Result<ColumnValue, anyhow::Error> {
    if field.nullable {
        // `column_by_index` returns an error on NULL for non-Option types;
        // nullable columns are always read as `Option<T>`.
        match field.semantic_type {
            SemanticType::Int64 => Ok(row
                .column_by_index::<Option<i64>>(index)?
                .map(ColumnValue::Int64)
                .unwrap_or(ColumnValue::Null)),
            SemanticType::Float64 => Ok(row
                .column_by_index::<Option<f64>>(index)?
                .map(ColumnValue::Float64)
                .unwrap_or(ColumnValue::Null)),
            SemanticType::Bool => Ok(row
                .column_by_index::<Option<bool>>(index)?
                .map(ColumnValue::Bool)
                .unwrap_or(ColumnValue::Null)),
            SemanticType::String => Ok(row
                .column_by_index::<Option<String>>(index)?
                .map(ColumnValue::String)
                .unwrap_or(ColumnValue::Null)),
            SemanticType::Bytes => Ok(row
                .column_by_index::<Option<Vec<u8>>>(index)?
                .map(ColumnValue::Bytes)
                .unwrap_or(ColumnValue::Null)),
            SemanticType::Timestamp => Ok(row
                .column_by_index::<Option<SpannerCommitTimestamp>>(index)?
                .map(|ts| ColumnValue::Timestamp(CommitTimestamp::from_datetime(ts.0)))
                .unwrap_or(ColumnValue::Null)),
            SemanticType::Date => Ok(row
                .column_by_index::<Option<chrono::NaiveDate>>(index)?
                .map(ColumnValue::Date)
                .unwrap_or(ColumnValue::Null)),
        }
    } else {
        match field.semantic_type {
            SemanticType::Int64 => Ok(ColumnValue::Int64(row.column_by_index::<i64>(index)?)),
            SemanticType::Float64 => Ok(ColumnValue::Float64(row.column_by_index::<f64>(index)?)),
            SemanticType::Bool => Ok(ColumnValue::Bool(row.column_by_index::<bool>(index)?)),
            SemanticType::String => Ok(ColumnValue::String(row.column_by_index::<String>(index)?)),
            SemanticType::Bytes => Ok(ColumnValue::Bytes(row.column_by_index::<Vec<u8>>(index)?)),
            SemanticType::Timestamp => {
                let ts = row.column_by_index::<SpannerCommitTimestamp>(index)?;
                Ok(ColumnValue::Timestamp(CommitTimestamp::from_datetime(ts.0)))
            }
            SemanticType::Date => {
                Ok(ColumnValue::Date(row.column_by_index::<chrono::NaiveDate>(index)?))
            }
        }
    }
}

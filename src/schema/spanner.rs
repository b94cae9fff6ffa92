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

//! The concrete catalog backend for [`super::discover`]: three
//! `INFORMATION_SCHEMA` queries issued concurrently and joined (spec.md
//! §4.1).

use futures::try_join;
use google_cloud_spanner::client::Client;
use google_cloud_spanner::statement::Statement;

use crate::error::SchemaError;
use crate::schema::{CatalogRows, SemanticType};

/// Builds a `fetch` closure over a live Spanner client, suitable for passing
/// to [`super::discover`].
pub async fn fetch_catalog_rows(
    client: &Client,
    table: &str,
) -> Result<Option<CatalogRows>, SchemaError> {
    let (columns, primary_key, options) = try_join!(
        fetch_columns(client, table),
        fetch_primary_key(client, table),
        fetch_options(client, table),
    )?;

    if columns.is_empty() {
        return Ok(None);
    }

    Ok(Some(CatalogRows {
        columns,
        primary_key,
        options,
    }))
}

async fn fetch_columns(
    client: &Client,
    table: &str,
) -> Result<Vec<(String, SemanticType, bool, i64)>, SchemaError> {
    let mut stmt = Statement::new(
        "SELECT column_name, spanner_type, is_nullable, ordinal_position \
         FROM information_schema.columns \
         WHERE table_name = @table",
    );
    stmt.add_param("table", &table);

    let mut tx = client
        .single()
        .await
        .map_err(|e| SchemaError::CatalogUnreachable(anyhow::anyhow!(e)))?;
    let mut iter = tx
        .query(stmt)
        .await
        .map_err(|e| SchemaError::CatalogUnreachable(anyhow::anyhow!(e)))?;

    let mut out = Vec::new();
    while let Some(row) = iter
        .next()
        .await
        .map_err(|e| SchemaError::CatalogUnreachable(anyhow::anyhow!(e)))?
    {
        let name: String = row
            .column_by_index(0)
            .map_err(|e| SchemaError::CatalogUnreachable(anyhow::anyhow!(e)))?;
        let spanner_type: String = row
            .column_by_index(1)
            .map_err(|e| SchemaError::CatalogUnreachable(anyhow::anyhow!(e)))?;
        let is_nullable: String = row
            .column_by_index(2)
            .map_err(|e| SchemaError::CatalogUnreachable(anyhow::anyhow!(e)))?;
        let ordinal: i64 = row
            .column_by_index(3)
            .map_err(|e| SchemaError::CatalogUnreachable(anyhow::anyhow!(e)))?;

        out.push((name, semantic_type_from_spanner(&spanner_type), is_nullable == "YES", ordinal));
    }
    Ok(out)
}

async fn fetch_primary_key(client: &Client, table: &str) -> Result<Vec<String>, SchemaError> {
    let mut stmt = Statement::new(
        "SELECT column_name FROM information_schema.index_columns \
         WHERE table_name = @table AND index_name = 'PRIMARY_KEY' \
         ORDER BY ordinal_position",
    );
    stmt.add_param("table", &table);

    let mut tx = client
        .single()
        .await
        .map_err(|e| SchemaError::CatalogUnreachable(anyhow::anyhow!(e)))?;
    let mut iter = tx
        .query(stmt)
        .await
        .map_err(|e| SchemaError::CatalogUnreachable(anyhow::anyhow!(e)))?;

    let mut out = Vec::new();
    while let Some(row) = iter
        .next()
        .await
        .map_err(|e| SchemaError::CatalogUnreachable(anyhow::anyhow!(e)))?
    {
        out.push(
            row.column_by_index(0)
                .map_err(|e| SchemaError::CatalogUnreachable(anyhow::anyhow!(e)))?,
        );
    }
    Ok(out)
}

async fn fetch_options(client: &Client, table: &str) -> Result<Vec<(String, bool)>, SchemaError> {
    let mut stmt = Statement::new(
        "SELECT column_name, option_value FROM information_schema.column_options \
         WHERE table_name = @table AND option_name = 'allow_commit_timestamp'",
    );
    stmt.add_param("table", &table);

    let mut tx = client
        .single()
        .await
        .map_err(|e| SchemaError::CatalogUnreachable(anyhow::anyhow!(e)))?;
    let mut iter = tx
        .query(stmt)
        .await
        .map_err(|e| SchemaError::CatalogUnreachable(anyhow::anyhow!(e)))?;

    let mut out = Vec::new();
    while let Some(row) = iter
        .next()
        .await
        .map_err(|e| SchemaError::CatalogUnreachable(anyhow::anyhow!(e)))?
    {
        let name: String = row
            .column_by_index(0)
            .map_err(|e| SchemaError::CatalogUnreachable(anyhow::anyhow!(e)))?;
        let value: String = row
            .column_by_index(1)
            .map_err(|e| SchemaError::CatalogUnreachable(anyhow::anyhow!(e)))?;
        out.push((name, value.eq_ignore_ascii_case("true")));
    }
    Ok(out)
}

fn semantic_type_from_spanner(spanner_type: &str) -> SemanticType {
    let base = spanner_type.split('(').next().unwrap_or(spanner_type).trim();
    match base.to_ascii_uppercase().as_str() {
        "INT64" => SemanticType::Int64,
        "FLOAT64" => SemanticType::Float64,
        "BOOL" => SemanticType::Bool,
        "BYTES" => SemanticType::Bytes,
        "TIMESTAMP" => SemanticType::Timestamp,
        "DATE" => SemanticType::Date,
        // STRING and any unrecognised type default to the textual wire type;
        // an unexpected semantic mapping surfaces downstream as an
        // `EncodeError::TypeMismatch` rather than aborting discovery.
        _ => SemanticType::String,
    }
}

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

use thiserror::Error;

/// Fatal at startup: an invalid option or a missing credential.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required option `{0}`")]
    Missing(&'static str),
    #[error("option `{option}` must be {constraint}, got `{value}`")]
    Invalid {
        option: &'static str,
        constraint: &'static str,
        value: String,
    },
    #[error("{0} invalid option(s):\n{}", .1.join("\n"))]
    Multiple(usize, Vec<String>),
}

/// Fatal at startup: the catalog is malformed or has no commit-timestamp column.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("table `{0}` does not exist")]
    TableNotFound(String),
    #[error("table `{0}` has no column with `allow_commit_timestamp` enabled")]
    NoCommitTimestampColumn(String),
    #[error("catalog unreachable: {0}")]
    CatalogUnreachable(#[source] anyhow::Error),
}

/// Fatal at startup: the bookkeeping row is malformed.
#[derive(Debug, Error)]
pub enum LptsError {
    #[error("last-processed-timestamp bookkeeping row is malformed: {0}")]
    Malformed(String),
    #[error("lpts store unreachable: {0}")]
    Unreachable(#[source] anyhow::Error),
}

/// A row's runtime type did not match its declared column type.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("column `{column}`: expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("avro encoding failed: {0}")]
    Avro(String),
}

/// Mid-stream read failure. Confined to the current poll cycle; never
/// propagates to the scheduler's timer.
#[derive(Debug, Error)]
pub enum TransientReadError {
    #[error("streaming read failed: {0}")]
    Stream(#[source] anyhow::Error),
}

/// Top-level error type threaded through the core's fallible operations.
#[derive(Debug, Error)]
pub enum TailerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Lpts(#[from] LptsError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    TransientRead(#[from] TransientReadError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T, E = TailerError> = std::result::Result<T, E>;

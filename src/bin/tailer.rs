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

//! Thin entry point: parse configuration, install logging, build the
//! concrete adapters, and run. Deliberately outside the core (spec.md §1
//! Non-goals: "the process entry point, CLI parsing").

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use google_cloud_pubsub::client::{Client as PubsubClient, ClientConfig as PubsubClientConfig};
use google_cloud_spanner::client::{Client as SpannerClient, ClientConfig as SpannerClientConfig};
use tailer_core::config::TailerConfig;
use tailer_core::ledger::PubsubLedger;
use tailer_core::lpts::SpannerLptsStore;
use tailer_core::metrics::TailerMetrics;
use tailer_core::schema::spanner::fetch_catalog_rows;
use tailer_core::source::spanner::SpannerSource;
use tailer_core::Tailer;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tailer", about = "Change-data-capture tailer")]
struct Cli {
    /// Path to a TOML file matching `TailerConfig`.
    #[arg(long, env = "TAILER_CONFIG")]
    config: PathBuf,

    /// Pub/Sub topic encoded rows are published to.
    #[arg(long, env = "TAILER_TOPIC")]
    topic: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let raw = std::fs::read_to_string(&cli.config)?;
    let config = TailerConfig::from_toml_str(&raw)?;

    let spanner_client = SpannerClient::new(
        format!(
            "projects/{}/instances/{}/databases/{}",
            config.project_id, config.instance, config.db
        ),
        SpannerClientConfig::default().with_auth().await?,
    )
    .await?;

    let schema_set = tailer_core::schema::discover(&config.instance, &config.table, || {
        fetch_catalog_rows(&spanner_client, &config.table)
    })
    .await?;

    let source = Arc::new(SpannerSource::new(
        spanner_client.clone(),
        config.table.clone(),
        schema_set.ts_column.clone(),
        schema_set.primary_key.clone(),
        schema_set.fields.clone(),
    ));
    let lpts_store = Arc::new(SpannerLptsStore::new(spanner_client.clone(), config.lpts_table.clone()));

    let pubsub_client = PubsubClient::new(PubsubClientConfig::default().with_auth().await?).await?;
    let ledger = Arc::new(PubsubLedger::new(&pubsub_client, &cli.topic).await?);

    let metrics = Arc::new(TailerMetrics::new()?);

    let tailer = Tailer::start(&config, &schema_set, source, lpts_store, ledger, metrics)?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    tailer.shutdown().await;

    Ok(())
}

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

//! Downstream ledger (spec.md §6): a message-oriented append-only log the
//! event dispatcher (C6) publishes encoded rows to. At-least-once delivery;
//! the tailer neither expects nor requires acknowledgement beyond publish
//! succeeding.

use async_trait::async_trait;
use google_cloud_pubsub::client::Client;
use google_cloud_pubsub::publisher::Publisher;
use google_cloud_googleapis::pubsub::v1::PubsubMessage;
use std::collections::HashMap;

/// One encoded message ready to publish, with the attributes spec.md §6
/// requires: `tableName` and `commitTimestamp` (RFC-3339 nanos).
pub struct LedgerMessage {
    pub payload: Vec<u8>,
    pub table_name: String,
    pub commit_timestamp: String,
}

/// Publishes encoded rows to a single topic. A trait so C6 never names
/// `google-cloud-pubsub` directly, splitting interface from backend the
/// same way the sink trait elsewhere in this codebase does.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn publish(&self, message: LedgerMessage) -> anyhow::Result<()>;
}

pub struct PubsubLedger {
    publisher: Publisher,
}

impl PubsubLedger {
    pub async fn new(client: &Client, topic_id: &str) -> anyhow::Result<Self> {
        let topic = client.topic(topic_id);
        if !topic.exists(None).await? {
            anyhow::bail!("pubsub topic `{topic_id}` does not exist");
        }
        Ok(Self {
            publisher: topic.new_publisher(None),
        })
    }
}

#[async_trait]
impl Ledger for PubsubLedger {
    async fn publish(&self, message: LedgerMessage) -> anyhow::Result<()> {
        let mut attributes = HashMap::new();
        attributes.insert("tableName".to_string(), message.table_name);
        attributes.insert("commitTimestamp".to_string(), message.commit_timestamp);

        let awaiter = self
            .publisher
            .publish(PubsubMessage {
                data: message.payload,
                attributes,
                ..Default::default()
            })
            .await;
        awaiter.get().await?;
        Ok(())
    }
}

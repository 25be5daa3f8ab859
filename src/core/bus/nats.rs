// src/core/bus/nats.rs

//! A [`BusClient`] backed by a NATS-compatible pub/sub transport, matching
//! the original implementation's use of `nats.go`.

use std::time::Duration;

use futures::stream::{BoxStream, StreamExt};
use tracing::warn;

use super::{AgentMessage, BusClient, BusEnvelope, CloudMessage};
use crate::core::errors::CronRunnerError;

/// Production [`BusClient`] implementation over [`async_nats`].
pub struct NatsBusClient {
    client: async_nats::Client,
}

impl NatsBusClient {
    pub async fn connect(url: &str) -> Result<Self, CronRunnerError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| CronRunnerError::Bus(format!("failed to connect to '{url}': {e}")))?;
        Ok(Self { client })
    }

    fn encode(envelope: &BusEnvelope) -> Result<Vec<u8>, CronRunnerError> {
        serde_json::to_vec(envelope)
            .map_err(|e| CronRunnerError::MalformedEnvelope(format!("encode failed: {e}")))
    }

    fn decode_cloud_message(payload: &[u8]) -> Result<CloudMessage, CronRunnerError> {
        match serde_json::from_slice::<BusEnvelope>(payload) {
            Ok(BusEnvelope::CloudToAgent(msg)) => Ok(msg),
            Ok(BusEnvelope::AgentToCloud(_)) => Err(CronRunnerError::MalformedEnvelope(
                "expected a cloud-to-agent envelope, got agent-to-cloud".to_string(),
            )),
            Err(e) => Err(CronRunnerError::MalformedEnvelope(format!(
                "failed to decode envelope: {e}"
            ))),
        }
    }
}

#[async_trait::async_trait]
impl BusClient for NatsBusClient {
    async fn request(
        &self,
        publish_topic: &str,
        reply_topic: &str,
        payload: AgentMessage,
        deadline: Duration,
    ) -> Result<CloudMessage, CronRunnerError> {
        // Subscribe before publishing so that a fast cloud responder can
        // never beat our subscription into existence.
        let mut sub = self
            .client
            .subscribe(reply_topic.to_string())
            .await
            .map_err(|e| CronRunnerError::Bus(format!("subscribe to '{reply_topic}' failed: {e}")))?;

        let envelope = BusEnvelope::AgentToCloud(payload);
        let bytes = Self::encode(&envelope)?;
        self.client
            .publish(publish_topic.to_string(), bytes.into())
            .await
            .map_err(|e| CronRunnerError::Bus(format!("publish to '{publish_topic}' failed: {e}")))?;

        let msg = tokio::time::timeout(deadline, sub.next())
            .await
            .map_err(|_| CronRunnerError::BusTimeout(reply_topic.to_string()))?
            .ok_or_else(|| CronRunnerError::Bus(format!("subscription on '{reply_topic}' closed")))?;

        Self::decode_cloud_message(&msg.payload)
    }

    async fn subscribe(&self, topic: &str) -> Result<BoxStream<'static, CloudMessage>, CronRunnerError> {
        let sub = self
            .client
            .subscribe(topic.to_string())
            .await
            .map_err(|e| CronRunnerError::Bus(format!("subscribe to '{topic}' failed: {e}")))?;

        let decoded = sub.filter_map(|msg| async move {
            match Self::decode_cloud_message(&msg.payload) {
                Ok(cloud_msg) => Some(cloud_msg),
                Err(e) => {
                    warn!("dropping malformed message on update stream: {e}");
                    None
                }
            }
        });
        Ok(Box::pin(decoded))
    }

    async fn publish(&self, topic: &str, payload: AgentMessage) -> Result<(), CronRunnerError> {
        let envelope = BusEnvelope::AgentToCloud(payload);
        let bytes = Self::encode(&envelope)?;
        self.client
            .publish(topic.to_string(), bytes.into())
            .await
            .map_err(|e| CronRunnerError::Bus(format!("publish to '{topic}' failed: {e}")))
    }
}

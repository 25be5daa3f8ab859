// src/core/bus/mod.rs

//! The bus client abstraction: typed request/response over a topic pub/sub
//! transport, plus a subscribe primitive for the live update stream. The
//! wire encoding itself lives elsewhere; every payload is modeled here as a
//! typed-union envelope and handed to callers already decoded.

pub mod nats;

use futures::stream::BoxStream;
use std::time::Duration;

use crate::core::errors::CronRunnerError;
use crate::core::script::{ScriptSet, UpdateEnvelope};

/// Well-known topics. Exact strings are part of the external interface.
pub const CHECKSUM_REQUEST_TOPIC: &str = "CronScriptChecksumRequest";
pub const CHECKSUM_RESPONSE_PREFIX: &str = "CronScriptChecksumResponse";
pub const GET_SCRIPTS_REQUEST_TOPIC: &str = "GetCronScriptsRequest";
pub const GET_SCRIPTS_RESPONSE_PREFIX: &str = "GetCronScriptsResponse";
pub const UPDATE_STREAM_TOPIC: &str = "CronScriptUpdates";
pub const UPDATE_ACK_PREFIX: &str = "CronScriptUpdatesResponse";

/// Every payload is wrapped in a typed-union container carrying a direction
/// tag (agent-to-cloud vs. cloud-to-agent).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "direction")]
pub enum BusEnvelope {
    AgentToCloud(AgentMessage),
    CloudToAgent(CloudMessage),
}

/// Messages the agent sends to cloud.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum AgentMessage {
    ChecksumRequest { topic: String },
    GetScriptsRequest { topic: String },
    UpdatesAck { request_id: String },
}

/// Messages cloud sends to the agent.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum CloudMessage {
    ChecksumResponse { checksum: String },
    GetScriptsResponse { scripts: ScriptSet },
    Update(UpdateEnvelope),
}

/// Bus primitives consumed by the reconciler, update log, and coordinator.
/// A real implementation talks to a NATS-compatible transport
/// ([`nats::NatsBusClient`]); tests substitute an in-memory fake.
#[async_trait::async_trait]
pub trait BusClient: Send + Sync {
    /// Publishes `payload` on `publish_topic`, then awaits exactly one
    /// response on `reply_topic` up to `deadline`. Responses that arrive
    /// after the deadline are silently dropped by the caller never having
    /// registered interest in them past that point.
    async fn request(
        &self,
        publish_topic: &str,
        reply_topic: &str,
        payload: AgentMessage,
        deadline: Duration,
    ) -> Result<CloudMessage, CronRunnerError>;

    /// Subscribes to `topic`. Messages are delivered in arrival order; the
    /// returned stream may be polled from a dedicated task, translating the
    /// original's bus-owned-thread callback model into Rust's async-stream
    /// idiom.
    async fn subscribe(&self, topic: &str) -> Result<BoxStream<'static, CloudMessage>, CronRunnerError>;

    /// Publishes a one-shot, fire-and-forget message on `topic` (used for
    /// update acknowledgements).
    async fn publish(&self, topic: &str, payload: AgentMessage) -> Result<(), CronRunnerError>;
}

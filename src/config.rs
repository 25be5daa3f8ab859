// src/config.rs

//! Loading, resolving, and validating the runner's configuration.

use std::fs;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// The final, validated configuration for the agent process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// This agent's identity, used as the `pod_name` reported alongside
    /// checksum/full-fetch requests for cloud-side observability.
    #[serde(default = "default_agent_id")]
    pub agent_id: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub bus: BusConfig,
    pub cron_store: ServiceEndpoint,
    pub query_exec: ServiceEndpoint,
}

fn default_agent_id() -> String {
    "vizier-cron-runner".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Connection and timing parameters for the message-bus transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// NATS-compatible server URL, e.g. `nats://pl-nats:4222`.
    pub url: String,
    /// Deadline for bus request/response calls (checksum, full fetch).
    #[serde(default = "default_request_deadline_ms", rename = "request_deadline_ms")]
    pub request_deadline_ms: u64,
}

impl BusConfig {
    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms)
    }
}

fn default_request_deadline_ms() -> u64 {
    5_000
}

/// Address of an RPC collaborator (cron store or query-exec service).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub address: String,
}

/// A raw representation of the config file before defaults are resolved.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_agent_id")]
    agent_id: String,
    #[serde(default = "default_log_level")]
    log_level: String,
    bus: BusConfig,
    cron_store: ServiceEndpoint,
    query_exec: ServiceEndpoint,
}

impl Config {
    /// Reads and parses a TOML config file, then validates it.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at '{path}'"))?;
        let raw: RawConfig = toml::from_str(&contents)
            .with_context(|| format!("failed to parse TOML from '{path}'"))?;

        let config = Config {
            agent_id: raw.agent_id,
            log_level: raw.log_level,
            bus: raw.bus,
            cron_store: raw.cron_store,
            query_exec: raw.query_exec,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.agent_id.trim().is_empty() {
            return Err(anyhow!("agent_id cannot be empty"));
        }
        if self.bus.url.trim().is_empty() {
            return Err(anyhow!("bus.url cannot be empty"));
        }
        if self.bus.request_deadline_ms == 0 {
            return Err(anyhow!("bus.request_deadline_ms cannot be 0"));
        }
        if self.cron_store.address.trim().is_empty() {
            return Err(anyhow!("cron_store.address cannot be empty"));
        }
        if self.query_exec.address.trim().is_empty() {
            return Err(anyhow!("query_exec.address cannot be empty"));
        }
        Ok(())
    }
}

// src/core/reconciler.rs

//! Bootstrap compare-and-repair between the persisted script set and
//! cloud's authoritative inventory.

use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::bus::{AgentMessage, BusClient, CloudMessage, CHECKSUM_REQUEST_TOPIC, CHECKSUM_RESPONSE_PREFIX, GET_SCRIPTS_REQUEST_TOPIC, GET_SCRIPTS_RESPONSE_PREFIX};
use crate::core::checksum::checksum;
use crate::core::cron_store::CronStoreClient;
use crate::core::errors::CronRunnerError;
use crate::core::script::ScriptSet;

/// The result of a failed reconciliation. The initial read of the
/// persisted script set is the only step whose failure is fatal to
/// startup; every later step (the checksum request, the full fetch, and
/// the `SetAll` that follows it) can fail without taking the agent down,
/// since the persisted set loaded at the top of `reconcile` is still a
/// valid state to start from.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The persisted script set could not be read at all. Startup aborts.
    #[error("failed to read persisted script set: {0}")]
    Fatal(CronRunnerError),

    /// Cloud could not be reached, or rejected the request. The persisted
    /// snapshot loaded before the failing call is carried along so the
    /// caller can fall back to it instead of aborting.
    #[error("cloud unreachable during reconciliation: {source}")]
    NonFatal {
        persisted: ScriptSet,
        source: CronRunnerError,
    },
}

/// Bootstrap-time convergence between the local cron store and cloud.
pub struct Reconciler {
    bus: std::sync::Arc<dyn BusClient>,
    cron_store: std::sync::Arc<dyn CronStoreClient>,
    deadline: Duration,
}

impl Reconciler {
    pub fn new(
        bus: std::sync::Arc<dyn BusClient>,
        cron_store: std::sync::Arc<dyn CronStoreClient>,
        deadline: Duration,
    ) -> Self {
        Self { bus, cron_store, deadline }
    }

    /// Loads the persisted script set, then compares its checksum with
    /// cloud's; on a mismatch, falls back to a full fetch and replaces the
    /// persisted set wholesale. Returns the snapshot the runner pool should
    /// converge to.
    pub async fn reconcile(&self) -> Result<ScriptSet, ReconcileError> {
        let persisted = self
            .cron_store
            .get_scripts()
            .await
            .map_err(ReconcileError::Fatal)?;

        let reply_sub = Uuid::new_v4().to_string();
        let reply_topic = format!("{CHECKSUM_RESPONSE_PREFIX}:{reply_sub}");
        let response = match self
            .bus
            .request(
                CHECKSUM_REQUEST_TOPIC,
                &reply_topic,
                AgentMessage::ChecksumRequest { topic: reply_sub },
                self.deadline,
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "checksum request to cloud failed; falling back to persisted state");
                return Err(ReconcileError::NonFatal { persisted, source: e });
            }
        };

        let cloud_checksum = match response {
            CloudMessage::ChecksumResponse { checksum } => checksum,
            other => {
                warn!("unexpected response to checksum request; falling back to persisted state");
                return Err(ReconcileError::NonFatal {
                    persisted,
                    source: CronRunnerError::MalformedEnvelope(format!(
                        "expected ChecksumResponse, got {other:?}"
                    )),
                });
            }
        };

        if checksum(&persisted) == cloud_checksum {
            info!("checksum matches cloud; skipping full fetch");
            return Ok(persisted);
        }

        warn!("checksum mismatch with cloud; issuing full fetch");
        self.full_fetch(persisted).await
    }

    async fn full_fetch(&self, persisted: ScriptSet) -> Result<ScriptSet, ReconcileError> {
        let reply_sub = Uuid::new_v4().to_string();
        let reply_topic = format!("{GET_SCRIPTS_RESPONSE_PREFIX}:{reply_sub}");
        let response = match self
            .bus
            .request(
                GET_SCRIPTS_REQUEST_TOPIC,
                &reply_topic,
                AgentMessage::GetScriptsRequest { topic: reply_sub },
                self.deadline,
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "full fetch from cloud failed; falling back to persisted state");
                return Err(ReconcileError::NonFatal { persisted, source: e });
            }
        };

        let cloud_scripts = match response {
            CloudMessage::GetScriptsResponse { scripts } => scripts,
            other => {
                return Err(ReconcileError::NonFatal {
                    persisted,
                    source: CronRunnerError::MalformedEnvelope(format!(
                        "expected GetScriptsResponse, got {other:?}"
                    )),
                })
            }
        };

        // Cloud is authoritative on bootstrap, even if it returns an empty
        // set: the `SetAll` still happens.
        if let Err(e) = self.cron_store.set_scripts(cloud_scripts.clone()).await {
            warn!(error = %e, "failed to persist cloud's full-fetch response; falling back to persisted state");
            return Err(ReconcileError::NonFatal { persisted, source: e });
        }
        Ok(cloud_scripts)
    }
}

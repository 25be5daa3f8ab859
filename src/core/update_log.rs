// src/core/update_log.rs

//! Ordered application of incoming script mutations with duplicate/
//! out-of-order suppression.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::core::bus::{AgentMessage, BusClient, UPDATE_ACK_PREFIX};
use crate::core::cron_store::CronStoreClient;
use crate::core::runner_pool::RunnerPool;
use crate::core::script::{ScriptId, UpdateEnvelope, UpdateOp};
use crate::core::status::{ErrorStatus, ExecutionResult, StatusCode};

/// The default bound on `seen_request_ids`. The original left this unbounded;
/// we cap it to avoid unbounded growth over the agent's lifetime, evicting
/// the least-recently-inserted entry first.
pub const DEFAULT_SEEN_REQUEST_IDS_CAPACITY: usize = 10_000;

struct State {
    last_applied_ts: HashMap<ScriptId, i64>,
    seen_request_ids: LruCache<String, ()>,
}

/// Consumes the update-stream topic and keeps the persisted store and the
/// runner pool converged on the highest-timestamp mutation seen per
/// `ScriptID`.
pub struct UpdateLog {
    state: Mutex<State>,
    cron_store: Arc<dyn CronStoreClient>,
    runner_pool: Arc<RunnerPool>,
    bus: Arc<dyn BusClient>,
}

impl UpdateLog {
    pub fn new(
        cron_store: Arc<dyn CronStoreClient>,
        runner_pool: Arc<RunnerPool>,
        bus: Arc<dyn BusClient>,
    ) -> Self {
        Self::with_capacity(cron_store, runner_pool, bus, DEFAULT_SEEN_REQUEST_IDS_CAPACITY)
    }

    pub fn with_capacity(
        cron_store: Arc<dyn CronStoreClient>,
        runner_pool: Arc<RunnerPool>,
        bus: Arc<dyn BusClient>,
        seen_request_ids_capacity: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(seen_request_ids_capacity)
            .unwrap_or(NonZeroUsize::new(DEFAULT_SEEN_REQUEST_IDS_CAPACITY).unwrap());
        Self {
            state: Mutex::new(State {
                last_applied_ts: HashMap::new(),
                seen_request_ids: LruCache::new(capacity),
            }),
            cron_store,
            runner_pool,
            bus,
        }
    }

    /// Applies a single incoming envelope: dedups by request id, drops
    /// stale mutations by timestamp, then dispatches to the cron store and
    /// runner pool.
    pub async fn apply(&self, envelope: UpdateEnvelope) {
        let target_id = envelope.target_id();

        let accepted = {
            let mut state = self.state.lock();
            if state.seen_request_ids.contains(&envelope.request_id) {
                false
            } else {
                state.seen_request_ids.put(envelope.request_id.clone(), ());
                match state.last_applied_ts.get(&target_id) {
                    Some(&last_ts) if last_ts >= envelope.timestamp => false,
                    _ => {
                        state.last_applied_ts.insert(target_id, envelope.timestamp);
                        true
                    }
                }
            }
        };

        if !accepted {
            return;
        }

        match &envelope.op {
            UpdateOp::Upsert(script) => {
                if let Err(e) = script.validate() {
                    warn!(script_id = %target_id, error = %e, "rejecting invalid script upsert");
                    let result = ExecutionResult::Error(ErrorStatus {
                        code: StatusCode::InvalidArgument,
                        message: e.to_string(),
                        compiler_errors: None,
                    });
                    if let Err(e) = self.cron_store.record_execution_result(target_id, result).await {
                        warn!(script_id = %target_id, error = %e, "failed to record rejected-script result");
                    }
                } else if let Err(e) = self.cron_store.add_or_update_script(script.clone()).await {
                    warn!(script_id = %target_id, error = %e, "cron store rejected upsert");
                } else {
                    info!(script_id = %target_id, timestamp = envelope.timestamp, "applied upsert");
                    self.runner_pool.upsert(script.clone()).await;
                }
            }
            UpdateOp::Delete(id) => {
                if let Err(e) = self.cron_store.delete_script(*id).await {
                    warn!(script_id = %id, error = %e, "cron store rejected delete");
                }
                info!(script_id = %id, timestamp = envelope.timestamp, "applied delete");
                self.runner_pool.delete(*id).await;
            }
        }

        let ack_topic = format!("{UPDATE_ACK_PREFIX}:{}", envelope.request_id);
        if let Err(e) = self
            .bus
            .publish(
                &ack_topic,
                AgentMessage::UpdatesAck {
                    request_id: envelope.request_id.clone(),
                },
            )
            .await
        {
            warn!(request_id = %envelope.request_id, error = %e, "failed to publish update ack");
        }
    }
}

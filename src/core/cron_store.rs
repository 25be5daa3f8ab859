// src/core/cron_store.rs

//! The cron-store RPC facade. The metadata store's own persistence
//! mechanism lives elsewhere; this module only defines the surface the rest
//! of the crate depends on.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::errors::CronRunnerError;
use crate::core::script::{Script, ScriptId, ScriptSet};
use crate::core::status::ExecutionResult;

/// RPC surface exposed by the local metadata store, including
/// `get_all_execution_results`, which is read-side and never called by the
/// reconciler, update log, runner, or coordinator.
#[async_trait::async_trait]
pub trait CronStoreClient: Send + Sync {
    async fn get_scripts(&self) -> Result<ScriptSet, CronRunnerError>;
    async fn add_or_update_script(&self, script: Script) -> Result<(), CronRunnerError>;
    async fn delete_script(&self, id: ScriptId) -> Result<(), CronRunnerError>;
    async fn set_scripts(&self, scripts: ScriptSet) -> Result<(), CronRunnerError>;
    async fn record_execution_result(
        &self,
        script_id: ScriptId,
        result: ExecutionResult,
    ) -> Result<(), CronRunnerError>;
    async fn get_all_execution_results(
        &self,
    ) -> Result<Vec<(ScriptId, ExecutionResult)>, CronRunnerError>;
}

/// A process-local, non-persistent `CronStoreClient`. This crate ships no
/// RPC-backed implementation of the metadata store (its wire format is out
/// of scope); this adapter exists so `main.rs` can run the coordinator
/// standalone against an empty local state. Production deployments should
/// supply a real RPC client behind the same trait.
#[derive(Default)]
pub struct InMemoryCronStore {
    scripts: Mutex<HashMap<ScriptId, Script>>,
    results: Mutex<Vec<(ScriptId, ExecutionResult)>>,
}

impl InMemoryCronStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait::async_trait]
impl CronStoreClient for InMemoryCronStore {
    async fn get_scripts(&self) -> Result<ScriptSet, CronRunnerError> {
        Ok(self.scripts.lock().clone())
    }

    async fn add_or_update_script(&self, script: Script) -> Result<(), CronRunnerError> {
        self.scripts.lock().insert(script.id, script);
        Ok(())
    }

    async fn delete_script(&self, id: ScriptId) -> Result<(), CronRunnerError> {
        self.scripts.lock().remove(&id);
        Ok(())
    }

    async fn set_scripts(&self, scripts: ScriptSet) -> Result<(), CronRunnerError> {
        *self.scripts.lock() = scripts;
        Ok(())
    }

    async fn record_execution_result(
        &self,
        script_id: ScriptId,
        result: ExecutionResult,
    ) -> Result<(), CronRunnerError> {
        self.results.lock().push((script_id, result));
        Ok(())
    }

    async fn get_all_execution_results(
        &self,
    ) -> Result<Vec<(ScriptId, ExecutionResult)>, CronRunnerError> {
        Ok(self.results.lock().clone())
    }
}

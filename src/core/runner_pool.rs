// src/core/runner_pool.rs

//! The `ScriptID -> Runner` lifecycle map. The pool is the sole mutator of
//! runner lifetimes; the reconciler drives it via
//! [`RunnerPool::replace_all`] and the update log via
//! [`RunnerPool::upsert`]/[`RunnerPool::delete`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::core::cron_store::CronStoreClient;
use crate::core::query_exec::QueryExecClient;
use crate::core::runner::Runner;
use crate::core::script::{Script, ScriptId, ScriptSet};

/// Maps live script identity to its running executor. Held behind a single
/// mutex for map mutation only; individual runners are self-synchronized.
pub struct RunnerPool {
    runners: Mutex<HashMap<ScriptId, (Script, Runner)>>,
    query_exec: Arc<dyn QueryExecClient>,
    cron_store: Arc<dyn CronStoreClient>,
}

impl RunnerPool {
    pub fn new(query_exec: Arc<dyn QueryExecClient>, cron_store: Arc<dyn CronStoreClient>) -> Self {
        Self {
            runners: Mutex::new(HashMap::new()),
            query_exec,
            cron_store,
        }
    }

    /// Starts, replaces, or no-ops a single script's runner, depending on
    /// whether it's new, changed, or unchanged.
    pub async fn upsert(&self, script: Script) {
        let stale = {
            let mut runners = self.runners.lock();
            match runners.get(&script.id) {
                Some((existing, _)) if *existing == script => return,
                Some(_) => runners.remove(&script.id).map(|(_, runner)| runner),
                None => None,
            }
        };
        if let Some(runner) = stale {
            runner.stop().await;
        }

        let runner = Runner::start(script.clone(), self.query_exec.clone(), self.cron_store.clone());
        info!(script_id = %script.id, "runner started");
        self.runners.lock().insert(script.id, (script, runner));
    }

    /// Stops and removes a script's runner, if one exists.
    pub async fn delete(&self, id: ScriptId) {
        let removed = self.runners.lock().remove(&id).map(|(_, runner)| runner);
        if let Some(runner) = removed {
            runner.stop().await;
            info!(script_id = %id, "runner stopped");
        }
    }

    /// Converges the pool onto `set`: starts runners for additions, stops
    /// removals, and upserts mutations.
    pub async fn replace_all(&self, set: ScriptSet) {
        let current_ids: Vec<ScriptId> = self.runners.lock().keys().copied().collect();

        for id in &current_ids {
            if !set.contains_key(id) {
                self.delete(*id).await;
            }
        }

        for script in set.into_values() {
            self.upsert(script).await;
        }
    }

    /// Stops every live runner. Idempotent; safe to call once during
    /// coordinator shutdown.
    pub async fn shutdown(&self) {
        let drained: Vec<(ScriptId, Runner)> = self
            .runners
            .lock()
            .drain()
            .map(|(id, (_, runner))| (id, runner))
            .collect();
        for (id, runner) in drained {
            runner.stop().await;
            info!(script_id = %id, "runner stopped for shutdown");
        }
    }

    /// The set of script identities with a live runner. Exposed for tests
    /// and for the coordinator's convergence assertions.
    pub fn script_ids(&self) -> Vec<ScriptId> {
        self.runners.lock().keys().copied().collect()
    }
}

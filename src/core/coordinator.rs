// src/core/coordinator.rs

//! Top-level orchestration (`SyncScripts`): composes the bus, reconciler,
//! runner pool, and update log, and owns shutdown.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::core::bus::{BusClient, CloudMessage, UPDATE_STREAM_TOPIC};
use crate::core::cron_store::CronStoreClient;
use crate::core::errors::CronRunnerError;
use crate::core::query_exec::QueryExecClient;
use crate::core::reconciler::{ReconcileError, Reconciler};
use crate::core::runner_pool::RunnerPool;
use crate::core::script::UpdateEnvelope;
use crate::core::update_log::UpdateLog;

/// How long shutdown waits for in-flight result-recording calls to settle
/// before giving up.
const SHUTDOWN_DRAIN_DEADLINE: Duration = Duration::from_secs(10);

/// Owns the full lifecycle of the synchronized script set: bootstrap
/// reconciliation, live update streaming, and graceful shutdown.
pub struct SyncScripts {
    runner_pool: Arc<RunnerPool>,
    update_log: Arc<UpdateLog>,
    drain_task: JoinHandle<()>,
}

impl SyncScripts {
    /// Runs the startup sequence:
    /// 1. Subscribe to the update stream before anything else, buffering
    ///    envelopes for later replay.
    /// 2. Run the reconciler. A failure to read the persisted script set
    ///    aborts startup; a failure to reach cloud does not, and startup
    ///    proceeds with the persisted state instead.
    /// 3. Hand the reconciled (or persisted, on a reconcile fallback)
    ///    snapshot to the runner pool via `ReplaceAll`.
    /// 4. Begin draining buffered and subsequent envelopes through the
    ///    update log.
    pub async fn start(
        bus: Arc<dyn BusClient>,
        cron_store: Arc<dyn CronStoreClient>,
        query_exec: Arc<dyn QueryExecClient>,
        bus_deadline: Duration,
    ) -> Result<Self, CronRunnerError> {
        let mut live_updates = bus.subscribe(UPDATE_STREAM_TOPIC).await?;

        let (buffer_tx, mut buffer_rx) = mpsc::unbounded_channel::<UpdateEnvelope>();
        let bootstrap_buffer: JoinHandle<()> = tokio::spawn(async move {
            // Buffers updates that arrive while the reconciler is still
            // running, so nothing is lost between subscribing and
            // converging the runner pool.
            while let Some(message) = live_updates.next().await {
                if let CloudMessage::Update(envelope) = message {
                    if buffer_tx.send(envelope).is_err() {
                        return;
                    }
                } else {
                    warn!("dropping non-update message received on update-stream topic");
                }
            }
        });

        let reconciler = Reconciler::new(bus.clone(), cron_store.clone(), bus_deadline);
        let reconciled = match reconciler.reconcile().await {
            Ok(set) => set,
            Err(ReconcileError::Fatal(e)) => return Err(e),
            Err(ReconcileError::NonFatal { persisted, source }) => {
                warn!(error = %source, "reconciliation with cloud failed; starting from persisted state");
                persisted
            }
        };

        let runner_pool = Arc::new(RunnerPool::new(query_exec, cron_store.clone()));
        runner_pool.replace_all(reconciled).await;
        info!("runner pool converged to reconciled snapshot");

        let update_log = Arc::new(UpdateLog::new(cron_store, runner_pool.clone(), bus));

        let drain_log = update_log.clone();
        let drain_task = tokio::spawn(async move {
            // `bootstrap_buffer` keeps feeding `buffer_rx` forever (it never
            // returns except on shutdown), so draining `buffer_rx` also
            // drains every subsequent live update.
            while let Some(envelope) = buffer_rx.recv().await {
                drain_log.apply(envelope).await;
            }
            if let Err(e) = bootstrap_buffer.await {
                error!(error = %e, "update-stream subscription task panicked");
            }
        });

        Ok(Self { runner_pool, update_log, drain_task })
    }

    /// The set of script identities with a live runner, for callers that
    /// want to observe convergence (tests, health checks).
    pub fn runner_pool_script_ids(&self) -> Vec<crate::core::script::ScriptId> {
        self.runner_pool.script_ids()
    }

    /// Cancels the update-stream subscription, stops every runner, and waits
    /// up to a bounded deadline for in-flight result recording to settle.
    pub async fn shutdown(self) {
        self.drain_task.abort();
        let _ = self.drain_task.await;

        match tokio::time::timeout(SHUTDOWN_DRAIN_DEADLINE, self.runner_pool.shutdown()).await {
            Ok(()) => info!("runner pool shut down cleanly"),
            Err(_) => warn!("runner pool shutdown exceeded deadline"),
        }

        drop(self.update_log);
    }
}

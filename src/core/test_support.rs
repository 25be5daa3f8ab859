// src/core/test_support.rs

//! Shared in-memory fakes for the bus, cron store, and query-exec RPC
//! surfaces, used by unit tests across this crate. Mirrors the role of
//! `fakeCronStore` / `fakeVizierServiceClient` in the original Go test
//! suite and `tests/integration/fixtures.rs` in the teacher crate.

#![cfg(test)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::core::bus::{AgentMessage, BusClient, CloudMessage};
use crate::core::cron_store::CronStoreClient;
use crate::core::errors::CronRunnerError;
use crate::core::query_exec::{ExecuteScriptRequest, ExecuteScriptResponse, QueryExecClient};
use crate::core::script::{Script, ScriptId};
use crate::core::status::ExecutionResult;

/// An in-memory cron store. Good enough to observe `add_or_update_script`/
/// `delete_script`/`set_scripts` effects and to capture recorded results.
#[derive(Default)]
pub struct FakeCronStore {
    pub scripts: Mutex<HashMap<ScriptId, Script>>,
    pub results: Mutex<Vec<(ScriptId, ExecutionResult)>>,
}

impl FakeCronStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scripts(scripts: HashMap<ScriptId, Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts),
            results: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CronStoreClient for FakeCronStore {
    async fn get_scripts(&self) -> Result<HashMap<ScriptId, Script>, CronRunnerError> {
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

    async fn set_scripts(&self, scripts: HashMap<ScriptId, Script>) -> Result<(), CronRunnerError> {
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

    async fn get_all_execution_results(&self) -> Result<Vec<(ScriptId, ExecutionResult)>, CronRunnerError> {
        Ok(self.results.lock().clone())
    }
}

/// A [`BusClient`] that only records publishes; requests/subscribes panic if
/// called, since most unit tests never need them.
#[derive(Default)]
pub struct NoopBus {
    pub published: Mutex<Vec<(String, AgentMessage)>>,
}

#[async_trait]
impl BusClient for NoopBus {
    async fn request(
        &self,
        _publish_topic: &str,
        _reply_topic: &str,
        _payload: AgentMessage,
        _deadline: Duration,
    ) -> Result<CloudMessage, CronRunnerError> {
        unimplemented!("NoopBus does not serve requests")
    }

    async fn subscribe(&self, _topic: &str) -> Result<BoxStream<'static, CloudMessage>, CronRunnerError> {
        unimplemented!("NoopBus does not serve subscriptions")
    }

    async fn publish(&self, topic: &str, payload: AgentMessage) -> Result<(), CronRunnerError> {
        self.published.lock().push((topic.to_string(), payload));
        Ok(())
    }
}

/// A [`QueryExecClient`] whose stream of responses (or transport error) for
/// every call is fixed at construction time, mirroring
/// `fakeVizierServiceClient` in the original Go test suite.
pub struct ScriptedQueryExecClient {
    frames: Mutex<Vec<Result<ExecuteScriptResponse, CronRunnerError>>>,
    /// Notified once per call to `execute_script`, so tests can wait for a tick.
    pub call_tx: mpsc::UnboundedSender<ExecuteScriptRequest>,
    call_rx: Mutex<Option<mpsc::UnboundedReceiver<ExecuteScriptRequest>>>,
}

impl ScriptedQueryExecClient {
    pub fn new(frames: Vec<Result<ExecuteScriptResponse, CronRunnerError>>) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            frames: Mutex::new(frames),
            call_tx: tx,
            call_rx: Mutex::new(Some(rx)),
        })
    }

    pub fn take_call_receiver(&self) -> mpsc::UnboundedReceiver<ExecuteScriptRequest> {
        self.call_rx.lock().take().expect("call receiver already taken")
    }
}

#[async_trait]
impl QueryExecClient for ScriptedQueryExecClient {
    async fn execute_script(
        &self,
        request: ExecuteScriptRequest,
    ) -> Result<BoxStream<'static, Result<ExecuteScriptResponse, CronRunnerError>>, CronRunnerError> {
        let _ = self.call_tx.send(request);
        let frames = self.frames.lock().clone();
        let (tx, rx) = mpsc::unbounded_channel();
        for frame in frames {
            let _ = tx.send(frame);
        }
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}

/// A [`QueryExecClient`] whose stream never yields, for tests that need a
/// runner pool with live entries but no actual ticking to observe.
pub struct NeverRespondingExec;

#[async_trait]
impl QueryExecClient for NeverRespondingExec {
    async fn execute_script(
        &self,
        _request: ExecuteScriptRequest,
    ) -> Result<BoxStream<'static, Result<ExecuteScriptResponse, CronRunnerError>>, CronRunnerError> {
        let (_tx, rx) = mpsc::unbounded_channel();
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}

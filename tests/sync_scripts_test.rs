//! End-to-end exercise of the coordinator against in-memory fakes for the
//! bus, cron store, and query-exec client, translating the literal scenarios
//! from the original Go test suite's table-driven cases.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use parking_lot::Mutex;
use uuid::Uuid;

use vizier_cron_runner::core::bus::{AgentMessage, BusClient, CloudMessage};
use vizier_cron_runner::core::cron_store::CronStoreClient;
use vizier_cron_runner::core::query_exec::{ExecuteScriptRequest, ExecuteScriptResponse, QueryExecClient};
use vizier_cron_runner::core::script::UpdateOp;
use vizier_cron_runner::core::status::ExecutionResult;
use vizier_cron_runner::{CronRunnerError, Script, ScriptId, ScriptSet, SyncScripts};

fn script(id: &str, body: &str, configs: &str, freq: i64) -> Script {
    Script {
        id: ScriptId::new(Uuid::parse_str(id).unwrap()).unwrap(),
        body: body.to_string(),
        configs: configs.to_string(),
        frequency_s: freq,
    }
}

#[derive(Default)]
struct FakeCronStore {
    scripts: Mutex<HashMap<ScriptId, Script>>,
    results: Mutex<Vec<(ScriptId, ExecutionResult)>>,
}

impl FakeCronStore {
    fn with_scripts(scripts: ScriptSet) -> Self {
        Self {
            scripts: Mutex::new(scripts),
            results: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl CronStoreClient for FakeCronStore {
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

    async fn get_all_execution_results(&self) -> Result<Vec<(ScriptId, ExecutionResult)>, CronRunnerError> {
        Ok(self.results.lock().clone())
    }
}

/// A scripted bus: serves a fixed checksum/full-fetch response and replays a
/// canned list of update-stream messages once, on the first `subscribe`.
struct FixtureBus {
    checksum: Mutex<Option<String>>,
    full_fetch: Mutex<Option<ScriptSet>>,
    updates: Mutex<Option<Vec<CloudMessage>>>,
    subscribed: AtomicUsize,
}

impl FixtureBus {
    fn checksum_match(checksum: String) -> Self {
        Self {
            checksum: Mutex::new(Some(checksum)),
            full_fetch: Mutex::new(None),
            updates: Mutex::new(Some(vec![])),
            subscribed: AtomicUsize::new(0),
        }
    }

    fn checksum_mismatch(full_fetch: ScriptSet) -> Self {
        Self {
            checksum: Mutex::new(Some("mismatched".to_string())),
            full_fetch: Mutex::new(Some(full_fetch)),
            updates: Mutex::new(Some(vec![])),
            subscribed: AtomicUsize::new(0),
        }
    }

    fn with_updates(checksum: String, updates: Vec<CloudMessage>) -> Self {
        Self {
            checksum: Mutex::new(Some(checksum)),
            full_fetch: Mutex::new(None),
            updates: Mutex::new(Some(updates)),
            subscribed: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl BusClient for FixtureBus {
    async fn request(
        &self,
        publish_topic: &str,
        _reply_topic: &str,
        _payload: AgentMessage,
        _deadline: Duration,
    ) -> Result<CloudMessage, CronRunnerError> {
        if publish_topic == vizier_cron_runner::core::bus::CHECKSUM_REQUEST_TOPIC {
            let checksum = self
                .checksum
                .lock()
                .clone()
                .ok_or_else(|| CronRunnerError::BusTimeout(publish_topic.to_string()))?;
            Ok(CloudMessage::ChecksumResponse { checksum })
        } else {
            let scripts = self
                .full_fetch
                .lock()
                .clone()
                .ok_or_else(|| CronRunnerError::BusTimeout(publish_topic.to_string()))?;
            Ok(CloudMessage::GetScriptsResponse { scripts })
        }
    }

    async fn subscribe(&self, _topic: &str) -> Result<BoxStream<'static, CloudMessage>, CronRunnerError> {
        self.subscribed.fetch_add(1, Ordering::SeqCst);
        let messages = self.updates.lock().take().unwrap_or_default();
        Ok(Box::pin(futures::stream::iter(messages)))
    }

    async fn publish(&self, _topic: &str, _payload: AgentMessage) -> Result<(), CronRunnerError> {
        Ok(())
    }
}

/// A query-exec client whose stream never yields, sufficient for scenarios
/// that only assert on runner-pool membership, not on recorded results.
struct NeverRespondingExec;

#[async_trait::async_trait]
impl QueryExecClient for NeverRespondingExec {
    async fn execute_script(
        &self,
        _request: ExecuteScriptRequest,
    ) -> Result<BoxStream<'static, Result<ExecuteScriptResponse, CronRunnerError>>, CronRunnerError> {
        Ok(Box::pin(futures::stream::empty()))
    }
}

async fn converge_to(coordinator: &SyncScripts, expected_len: usize) -> Vec<ScriptId> {
    for _ in 0..100 {
        if coordinator.runner_pool_script_ids().len() == expected_len {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let mut ids = coordinator.runner_pool_script_ids();
    ids.sort();
    ids
}

#[tokio::test]
async fn bootstrap_match_starts_runners_for_every_persisted_script() {
    let a = script("00000000-0000-0000-0000-000000440000", "px.display()", "config1", 5);
    let b = script("00000000-0000-0000-0000-000000440001", "test", "config2", 22);
    let mut persisted = ScriptSet::new();
    persisted.insert(a.id, a.clone());
    persisted.insert(b.id, b.clone());

    let cron_store = Arc::new(FakeCronStore::with_scripts(persisted.clone()));
    let bus = Arc::new(FixtureBus::checksum_match(
        vizier_cron_runner::core::checksum::checksum(&persisted),
    ));
    let query_exec = Arc::new(NeverRespondingExec);

    let coordinator = SyncScripts::start(bus.clone(), cron_store, query_exec, Duration::from_secs(1))
        .await
        .unwrap();

    let mut ids = coordinator.runner_pool_script_ids();
    ids.sort();
    let mut expected = vec![a.id, b.id];
    expected.sort();
    assert_eq!(ids, expected);
    assert_eq!(bus.subscribed.load(Ordering::SeqCst), 1);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn bootstrap_mismatch_replaces_persisted_set_with_cloud_full_fetch() {
    let a = script("00000000-0000-0000-0000-000000440000", "px.display()", "config1", 5);
    let b = script("00000000-0000-0000-0000-000000440001", "test", "config2", 22);
    let mut persisted = ScriptSet::new();
    persisted.insert(a.id, a.clone());
    persisted.insert(b.id, b.clone());

    let mut cloud = ScriptSet::new();
    cloud.insert(b.id, b.clone());

    let cron_store = Arc::new(FakeCronStore::with_scripts(persisted));
    let bus = Arc::new(FixtureBus::checksum_mismatch(cloud));
    let query_exec = Arc::new(NeverRespondingExec);

    let coordinator = SyncScripts::start(bus, cron_store, query_exec, Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(coordinator.runner_pool_script_ids(), vec![b.id]);
    coordinator.shutdown().await;
}

#[tokio::test]
async fn live_upserts_and_delete_converge_the_runner_pool() {
    let a = script("00000000-0000-0000-0000-000000440000", "px.display()", "config1", 5);
    let b = script("00000000-0000-0000-0000-000000440001", "test", "config2", 22);
    let mut persisted = ScriptSet::new();
    persisted.insert(a.id, a.clone());
    persisted.insert(b.id, b.clone());

    let new_script = script("00000000-0000-0000-0000-000000440002", "px.display()", "c", 9);
    let updates = vec![
        CloudMessage::Update(vizier_cron_runner::core::script::UpdateEnvelope {
            request_id: "req-1".to_string(),
            timestamp: 1,
            op: UpdateOp::Upsert(new_script.clone()),
        }),
        CloudMessage::Update(vizier_cron_runner::core::script::UpdateEnvelope {
            request_id: "req-2".to_string(),
            timestamp: 2,
            op: UpdateOp::Delete(b.id),
        }),
    ];

    let cron_store = Arc::new(FakeCronStore::with_scripts(persisted.clone()));
    let bus = Arc::new(FixtureBus::with_updates(
        vizier_cron_runner::core::checksum::checksum(&persisted),
        updates,
    ));
    let query_exec = Arc::new(NeverRespondingExec);

    let coordinator = SyncScripts::start(bus, cron_store, query_exec, Duration::from_secs(1))
        .await
        .unwrap();

    let ids = converge_to(&coordinator, 2).await;
    let mut expected = vec![a.id, new_script.id];
    expected.sort();
    assert_eq!(ids, expected);

    coordinator.shutdown().await;
}

#[tokio::test]
async fn out_of_order_update_after_a_delete_is_ignored() {
    let target = script("00000000-0000-0000-0000-000000440003", "px.display()", "c", 9);
    let updates = vec![
        CloudMessage::Update(vizier_cron_runner::core::script::UpdateEnvelope {
            request_id: "req-upsert".to_string(),
            timestamp: 2,
            op: UpdateOp::Upsert(target.clone()),
        }),
        CloudMessage::Update(vizier_cron_runner::core::script::UpdateEnvelope {
            request_id: "req-delete".to_string(),
            timestamp: 4,
            op: UpdateOp::Delete(target.id),
        }),
        // A duplicate of the original upsert arrives late, after the delete
        // has already taken effect. It must be ignored: its timestamp (2) is
        // not greater than the last applied timestamp for this id (4).
        CloudMessage::Update(vizier_cron_runner::core::script::UpdateEnvelope {
            request_id: "req-upsert-retry".to_string(),
            timestamp: 2,
            op: UpdateOp::Upsert(target.clone()),
        }),
    ];

    let cron_store = Arc::new(FakeCronStore::with_scripts(ScriptSet::new()));
    let bus = Arc::new(FixtureBus::with_updates(
        vizier_cron_runner::core::checksum::checksum(&ScriptSet::new()),
        updates,
    ));
    let query_exec = Arc::new(NeverRespondingExec);

    let coordinator = SyncScripts::start(bus, cron_store, query_exec, Duration::from_secs(1))
        .await
        .unwrap();

    // Give every buffered update a chance to drain; the pool must remain
    // empty throughout since the only surviving mutation is the delete.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(coordinator.runner_pool_script_ids().is_empty());

    coordinator.shutdown().await;
}

#[tokio::test]
async fn cloud_unreachable_during_reconcile_does_not_abort_startup() {
    let a = script("00000000-0000-0000-0000-000000440000", "px.display()", "config1", 5);
    let mut persisted = ScriptSet::new();
    persisted.insert(a.id, a.clone());

    let cron_store = Arc::new(FakeCronStore::with_scripts(persisted));
    let bus = Arc::new(FixtureBus {
        checksum: Mutex::new(None),
        full_fetch: Mutex::new(None),
        updates: Mutex::new(Some(vec![])),
        subscribed: AtomicUsize::new(0),
    });
    let query_exec = Arc::new(NeverRespondingExec);

    let coordinator = SyncScripts::start(bus, cron_store, query_exec, Duration::from_millis(50))
        .await
        .expect("a cloud timeout during reconcile must not abort startup");

    assert_eq!(coordinator.runner_pool_script_ids(), vec![a.id]);
    coordinator.shutdown().await;
}

#[tokio::test]
async fn persisted_store_read_failure_aborts_startup() {
    struct UnreadableCronStore;

    #[async_trait::async_trait]
    impl CronStoreClient for UnreadableCronStore {
        async fn get_scripts(&self) -> Result<ScriptSet, CronRunnerError> {
            Err(CronRunnerError::CronStore("store unreachable".to_string()))
        }
        async fn add_or_update_script(&self, _script: Script) -> Result<(), CronRunnerError> {
            unimplemented!()
        }
        async fn delete_script(&self, _id: ScriptId) -> Result<(), CronRunnerError> {
            unimplemented!()
        }
        async fn set_scripts(&self, _scripts: ScriptSet) -> Result<(), CronRunnerError> {
            unimplemented!()
        }
        async fn record_execution_result(
            &self,
            _script_id: ScriptId,
            _result: ExecutionResult,
        ) -> Result<(), CronRunnerError> {
            unimplemented!()
        }
        async fn get_all_execution_results(&self) -> Result<Vec<(ScriptId, ExecutionResult)>, CronRunnerError> {
            unimplemented!()
        }
    }

    let cron_store = Arc::new(UnreadableCronStore);
    let bus = Arc::new(FixtureBus::checksum_match(String::new()));
    let query_exec = Arc::new(NeverRespondingExec);

    let result = SyncScripts::start(bus, cron_store, query_exec, Duration::from_millis(50)).await;
    assert!(result.is_err());
}

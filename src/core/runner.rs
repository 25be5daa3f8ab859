// src/core/runner.rs

//! Per-script periodic executor: invokes the query-exec streaming RPC at a
//! fixed period, drains the stream into a single result record, and
//! forwards it to the cron store.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::cron_store::CronStoreClient;
use crate::core::errors::CronRunnerError;
use crate::core::query_exec::{ExecuteScriptRequest, ExecuteScriptResponse, QueryExecClient};
use crate::core::script::Script;
use crate::core::status::{CompilerErrorGroup, ErrorStatus, ExecutionResult, ExecutionStats, StatusCode};

/// Reduces a transport-level error to an [`ErrorStatus`], preserving the
/// original gRPC-style code when the error carried one and falling back to
/// `Unavailable` for opaque transport failures.
fn error_status_from_transport_error(error: CronRunnerError) -> ErrorStatus {
    match error {
        CronRunnerError::QueryExecStatus { code, message } => ErrorStatus {
            code: StatusCode::from_code(code),
            message,
            compiler_errors: None,
        },
        other => ErrorStatus {
            code: StatusCode::Unavailable,
            message: other.to_string(),
            compiler_errors: None,
        },
    }
}

/// A live per-script executor. Dropping the handle does not stop the task;
/// call [`Runner::stop`] explicitly, as the runner pool always does on
/// mutation, deletion, or shutdown.
pub struct Runner {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl Runner {
    /// Spawns the runner's tick loop and returns immediately. The first tick
    /// fires immediately, then every `script.frequency_s` seconds
    /// thereafter.
    pub fn start(
        script: Script,
        query_exec: Arc<dyn QueryExecClient>,
        cron_store: Arc<dyn CronStoreClient>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(run_loop(script, query_exec, cron_store, shutdown_rx));
        Self { shutdown_tx, handle }
    }

    /// Requests cancellation and waits for the tick loop to exit.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.handle.await {
            warn!(error = %e, "runner task panicked during shutdown");
        }
    }
}

async fn run_loop(
    script: Script,
    query_exec: Arc<dyn QueryExecClient>,
    cron_store: Arc<dyn CronStoreClient>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let period = Duration::from_secs(script.frequency_s.max(1) as u64);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let result = execute_once(&script, query_exec.as_ref()).await;
                if let Err(e) = cron_store.record_execution_result(script.id, result).await {
                    warn!(script_id = %script.id, error = %e, "failed to record execution result");
                }
            }
            _ = shutdown_rx.recv() => {
                debug!(script_id = %script.id, "runner stopped");
                return;
            }
        }
    }
}

/// Invokes the query-exec RPC once and reduces the resulting stream (or
/// transport error) to a single [`ExecutionResult`].
async fn execute_once(script: &Script, query_exec: &dyn QueryExecClient) -> ExecutionResult {
    let request = ExecuteScriptRequest {
        script_id: script.id,
        body: script.body.clone(),
        configs: script.configs.clone(),
    };

    let mut stream = match query_exec.execute_script(request).await {
        Ok(stream) => stream,
        Err(e) => return ExecutionResult::Error(error_status_from_transport_error(e)),
    };

    let mut stats: Option<ExecutionStats> = None;
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(ExecuteScriptResponse::Data { execution_stats }) => {
                if execution_stats.is_some() {
                    stats = execution_stats;
                }
            }
            Ok(ExecuteScriptResponse::Status { code, message, compiler_errors }) => {
                let status_code = StatusCode::from_code(code);
                if status_code == StatusCode::Ok {
                    break;
                }
                let compiler_errors = if compiler_errors.is_empty() {
                    None
                } else {
                    Some(CompilerErrorGroup { errors: compiler_errors })
                };
                return ExecutionResult::Error(ErrorStatus {
                    code: status_code,
                    message,
                    compiler_errors,
                });
            }
            Err(e) => return ExecutionResult::Error(error_status_from_transport_error(e)),
        }
    }

    match stats {
        Some(stats) => ExecutionResult::Stats(stats),
        None => ExecutionResult::Error(ErrorStatus {
            code: StatusCode::Internal,
            message: "execution stream ended without reporting stats".to_string(),
            compiler_errors: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::script::ScriptId;
    use crate::core::test_support::{FakeCronStore, ScriptedQueryExecClient};
    use uuid::Uuid;

    fn script(freq: i64) -> Script {
        Script {
            id: ScriptId::new(Uuid::new_v4()).unwrap(),
            body: "px.display()".to_string(),
            configs: "config".to_string(),
            frequency_s: freq,
        }
    }

    #[tokio::test]
    async fn records_stats_from_a_data_frame() {
        let script = script(1);
        let query_exec = ScriptedQueryExecClient::new(vec![Ok(ExecuteScriptResponse::Data {
            execution_stats: Some(ExecutionStats {
                execution_time_ns: 123,
                compilation_time_ns: 456,
                records_processed: 999,
                bytes_processed: 1000,
            }),
        })]);
        let cron_store = Arc::new(FakeCronStore::new());

        let result = execute_once(&script, query_exec.as_ref()).await;
        assert_eq!(
            result,
            ExecutionResult::Stats(ExecutionStats {
                execution_time_ns: 123,
                compilation_time_ns: 456,
                records_processed: 999,
                bytes_processed: 1000,
            })
        );
        let _ = cron_store;
    }

    #[tokio::test]
    async fn promotes_compiler_errors_from_an_invalid_argument_status() {
        let script = script(1);
        let query_exec = ScriptedQueryExecClient::new(vec![Ok(ExecuteScriptResponse::Status {
            code: 3,
            message: "syntax error".to_string(),
            compiler_errors: vec![crate::core::status::CompilerError {
                message: "syntax error".to_string(),
                line: 123,
                column: 456,
            }],
        })]);

        let result = execute_once(&script, query_exec.as_ref()).await;
        match result {
            ExecutionResult::Error(status) => {
                assert_eq!(status.code, StatusCode::InvalidArgument);
                let group = status.compiler_errors.expect("compiler errors present");
                assert_eq!(group.errors.len(), 1);
                assert_eq!(group.errors[0].line, 123);
                assert_eq!(group.errors[0].column, 456);
            }
            other => panic!("expected an error result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mid_stream_transport_error_is_recorded_as_unavailable() {
        let script = script(1);
        let query_exec = ScriptedQueryExecClient::new(vec![Err(
            crate::core::errors::CronRunnerError::QueryExec("connection reset".to_string()),
        )]);

        let result = execute_once(&script, query_exec.as_ref()).await;
        match result {
            ExecutionResult::Error(status) => assert_eq!(status.code, StatusCode::Unavailable),
            other => panic!("expected an error result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_error_with_a_status_code_preserves_code_and_message() {
        let script = script(1);
        let query_exec = ScriptedQueryExecClient::new(vec![Err(
            crate::core::errors::CronRunnerError::QueryExecStatus {
                code: 3,
                message: "Invalid".to_string(),
            },
        )]);

        let result = execute_once(&script, query_exec.as_ref()).await;
        match result {
            ExecutionResult::Error(status) => {
                assert_eq!(status.code, StatusCode::InvalidArgument);
                assert_eq!(status.message, "Invalid");
            }
            other => panic!("expected an error result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stop_terminates_the_tick_loop() {
        let script = script(1);
        let query_exec = ScriptedQueryExecClient::new(vec![Ok(ExecuteScriptResponse::Data {
            execution_stats: Some(ExecutionStats {
                execution_time_ns: 1,
                compilation_time_ns: 1,
                records_processed: 1,
                bytes_processed: 1,
            }),
        })]);
        let cron_store = Arc::new(FakeCronStore::new());
        let runner = Runner::start(script, query_exec, cron_store);
        runner.stop().await;
    }
}

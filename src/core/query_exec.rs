// src/core/query_exec.rs

//! The query-execution streaming RPC surface. The query-exec service's
//! internals live elsewhere; this module only defines the request/response
//! shapes and the client trait a [`Runner`](crate::core::runner::Runner)
//! drains each tick.

use futures::stream::BoxStream;

use crate::core::errors::CronRunnerError;
use crate::core::script::ScriptId;
use crate::core::status::{CompilerError, ExecutionStats};

/// A single invocation of a script against the query-exec service.
#[derive(Debug, Clone)]
pub struct ExecuteScriptRequest {
    pub script_id: ScriptId,
    pub body: String,
    pub configs: String,
}

/// One frame of a query-exec response stream. Matches
/// `vizierpb.ExecuteScriptResponse`'s two-way oneof (`Data` / `Status`).
#[derive(Debug, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum ExecuteScriptResponse {
    /// A data frame; only the execution-stats payload matters to this crate.
    Data {
        execution_stats: Option<ExecutionStats>,
    },
    /// A terminal in-band status. `code == 0` means success (end of stream
    /// with nothing to report); any other code is an execution error.
    Status {
        code: i32,
        message: String,
        compiler_errors: Vec<CompilerError>,
    },
}

/// Streaming RPC client for the query-execution service.
#[async_trait::async_trait]
pub trait QueryExecClient: Send + Sync {
    /// Opens a stream for `request`. The returned stream yields frames until
    /// end-of-stream (the stream simply ends) or an RPC-level transport
    /// error (the stream yields one `Err` and then ends). The initial
    /// `Result` models a failure to even open the stream (e.g. the service
    /// is unreachable). Implementations that talk to a real gRPC-style
    /// transport should report failures as
    /// [`CronRunnerError::QueryExecStatus`] so the runner can preserve the
    /// original status code in the recorded result.
    async fn execute_script(
        &self,
        request: ExecuteScriptRequest,
    ) -> Result<BoxStream<'static, Result<ExecuteScriptResponse, CronRunnerError>>, CronRunnerError>;
}

/// A `QueryExecClient` that reports every call as unreachable. This crate
/// ships no RPC-backed implementation of the query-execution service (its
/// wire format is out of scope); this adapter lets every runner tick
/// produce a recorded, non-fatal error until a real client is wired in by
/// the deploying binary.
pub struct UnavailableQueryExecClient;

#[async_trait::async_trait]
impl QueryExecClient for UnavailableQueryExecClient {
    async fn execute_script(
        &self,
        _request: ExecuteScriptRequest,
    ) -> Result<BoxStream<'static, Result<ExecuteScriptResponse, CronRunnerError>>, CronRunnerError> {
        Err(CronRunnerError::QueryExec(
            "no query-exec transport configured".to_string(),
        ))
    }
}

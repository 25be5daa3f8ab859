// src/core/errors.rs

//! Defines the primary error type for the cron-script runner.

use thiserror::Error;

/// The main error enum, representing all possible failures within the runner.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait
/// implementations, mirroring how the rest of the ambient stack reports failures.
#[derive(Error, Debug, Clone)]
pub enum CronRunnerError {
    /// A bus request/response call did not receive a reply before its deadline.
    #[error("bus request to '{0}' timed out")]
    BusTimeout(String),

    /// The bus transport itself failed (connection lost, publish error, etc.).
    #[error("bus error: {0}")]
    Bus(String),

    /// A cron-store RPC failed.
    #[error("cron store RPC error: {0}")]
    CronStore(String),

    /// A query-exec RPC failed at the transport level.
    #[error("query-exec RPC error: {0}")]
    QueryExec(String),

    /// A query-exec RPC failed at the transport level but carried a
    /// canonical gRPC-style status code (e.g. a `tonic::Status`), which the
    /// runner preserves verbatim in the recorded result.
    #[error("query-exec RPC error [{code}]: {message}")]
    QueryExecStatus { code: i32, message: String },

    /// A message arrived that could not be decoded into the expected envelope shape.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// A script record failed validation (bad id, non-positive frequency, ...).
    #[error("invalid script {id}: {reason}")]
    InvalidScript { id: String, reason: String },

    /// A condition from which startup cannot proceed.
    #[error("fatal startup error: {0}")]
    Fatal(String),
}

// src/core/status.rs

//! Result payloads recorded by a runner after draining a query-exec stream.
//! These mirror `metadatapb.RecordExecutionResultRequest` and
//! `vizierpb.Status`/`compilerpb.CompilerErrorGroup` from the original
//! implementation closely enough that the mapping in `runner.rs` is a
//! straight field-for-field translation.

use serde::{Deserialize, Serialize};

/// Canonical gRPC-style status codes, restricted to the ones the query-exec
/// service is documented to emit. `Other` is a forward-compatible catch-all
/// for any numeric code not enumerated here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum StatusCode {
    Ok,
    InvalidArgument,
    DeadlineExceeded,
    Unavailable,
    Internal,
    Unknown,
    Other(i32),
}

impl StatusCode {
    /// Maps a raw gRPC-style integer code to our enum, per the canonical
    /// code table used by the query-exec service.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => StatusCode::Ok,
            3 => StatusCode::InvalidArgument,
            4 => StatusCode::DeadlineExceeded,
            13 => StatusCode::Internal,
            14 => StatusCode::Unavailable,
            2 => StatusCode::Unknown,
            other => StatusCode::Other(other),
        }
    }
}

/// A single line/column compiler diagnostic, matching
/// `compilerpb.LineColError` (message, line, column; nothing else).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerError {
    pub message: String,
    pub line: i64,
    pub column: i64,
}

/// A group of compiler errors, promoted from a status's `error_details` into
/// a structured context payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerErrorGroup {
    pub errors: Vec<CompilerError>,
}

/// An error status recorded for a script, preserving the code and message
/// verbatim and optionally carrying a promoted compiler-error group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorStatus {
    pub code: StatusCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiler_errors: Option<CompilerErrorGroup>,
}

/// Timing and volume statistics for a single successful execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub execution_time_ns: i64,
    pub compilation_time_ns: i64,
    pub records_processed: i64,
    pub bytes_processed: i64,
}

/// The payload recorded via `RecordExecutionResult`: either the stats of a
/// successful run, or an error describing why it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionResult {
    Stats(ExecutionStats),
    Error(ErrorStatus),
}

// src/lib.rs

pub mod config;
pub mod core;

pub use crate::core::{
    CronRunnerError, InMemoryCronStore, Script, ScriptId, ScriptSet, SyncScripts, UnavailableQueryExecClient,
};

// src/core/script.rs

//! The data model shared by every component: script identity, script records,
//! and the update envelopes that carry live mutations from cloud.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::errors::CronRunnerError;

/// 128-bit universally-unique identifier for a script. The canonical string
/// form is lowercase hyphenated hex, matching the RFC 4122 `uuid` crate's
/// `Display` impl. A nil (all-zero) identifier is never valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptId(pub Uuid);

impl ScriptId {
    pub fn new(id: Uuid) -> Result<Self, CronRunnerError> {
        if id.is_nil() {
            return Err(CronRunnerError::InvalidScript {
                id: id.to_string(),
                reason: "script id is nil".to_string(),
            });
        }
        Ok(Self(id))
    }

    /// Canonical hyphenated-hex string form, used as the map key on the wire
    /// and as the sort key for checksum computation.
    pub fn canonical(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ScriptId {
    type Err = CronRunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::parse_str(s).map_err(|e| CronRunnerError::InvalidScript {
            id: s.to_string(),
            reason: format!("not a valid uuid: {e}"),
        })?;
        ScriptId::new(uuid)
    }
}

/// A scheduled analytical script.
///
/// Equality is structural over all four fields: two records are equal iff
/// id, body, configs, and frequency_s are all equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub id: ScriptId,
    pub body: String,
    pub configs: String,
    pub frequency_s: i64,
}

impl Script {
    /// Validates the record's invariants: the id must not be nil, and the
    /// frequency must be at least one second. `ScriptId::new` rejects a nil
    /// id for ids constructed directly, but `ScriptId` deserializes
    /// transparently over its inner `Uuid`, so a nil id arriving over the
    /// wire bypasses that check and must be caught here instead.
    pub fn validate(&self) -> Result<(), CronRunnerError> {
        if self.id.0.is_nil() {
            return Err(CronRunnerError::InvalidScript {
                id: self.id.canonical(),
                reason: "script id is nil".to_string(),
            });
        }
        if self.frequency_s < 1 {
            return Err(CronRunnerError::InvalidScript {
                id: self.id.canonical(),
                reason: format!("frequency_s must be >= 1, got {}", self.frequency_s),
            });
        }
        Ok(())
    }
}

/// A mapping from script identity to script record. Iteration order carries
/// no semantic meaning; the checksum function is the only place that cares
/// about a stable order, and it re-sorts internally.
pub type ScriptSet = HashMap<ScriptId, Script>;

/// A single incoming mutation from cloud's live update stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEnvelope {
    /// Bus correlation token; also the dedup key for at-most-once application.
    pub request_id: String,
    /// Monotonic sequence number assigned by cloud. Not necessarily wall-clock.
    pub timestamp: i64,
    pub op: UpdateOp,
}

impl UpdateEnvelope {
    /// The `ScriptID` this envelope mutates, regardless of which variant it is.
    pub fn target_id(&self) -> ScriptId {
        match &self.op {
            UpdateOp::Upsert(script) => script.id,
            UpdateOp::Delete(id) => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOp {
    Upsert(Script),
    Delete(ScriptId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_script_id_is_rejected() {
        let err = ScriptId::new(Uuid::nil());
        assert!(err.is_err());
    }

    #[test]
    fn script_id_round_trips_through_canonical_string() {
        let uuid = Uuid::parse_str("223e4567-e89b-12d3-a456-426655440000").unwrap();
        let id = ScriptId::new(uuid).unwrap();
        let parsed: ScriptId = id.canonical().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn zero_frequency_is_rejected() {
        let script = Script {
            id: ScriptId::new(Uuid::new_v4()).unwrap(),
            body: "px.display()".to_string(),
            configs: String::new(),
            frequency_s: 0,
        };
        assert!(script.validate().is_err());
    }

    #[test]
    fn equality_is_structural_over_all_fields() {
        let id = ScriptId::new(Uuid::new_v4()).unwrap();
        let a = Script {
            id,
            body: "a".to_string(),
            configs: "c".to_string(),
            frequency_s: 5,
        };
        let mut b = a.clone();
        assert_eq!(a, b);
        b.configs = "different".to_string();
        assert_ne!(a, b);
    }
}

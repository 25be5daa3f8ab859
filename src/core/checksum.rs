// src/core/checksum.rs

//! Order-independent digest over a script-set snapshot.
//!
//! Two snapshots with identical key-set and identical record contents must
//! produce byte-equal digests regardless of mapping iteration order. We
//! achieve this by sorting entries by the script id's canonical string form
//! before feeding them into the hash, rather than relying on any
//! hash-of-hashes trick that would need to be order-independent itself.

use sha2::{Digest, Sha256};

use crate::core::script::ScriptSet;

/// Computes the checksum of a script-set snapshot as a lowercase hex string.
///
/// Sorts entries by `ScriptID` string form, serializes each as a canonical
/// byte sequence over `(id, body, configs, frequency_s)`, and feeds the
/// result into a collision-resistant hash. A `\0`-delimited encoding is used
/// between fields and between entries so that no combination of field
/// values can alias across an entry boundary.
pub fn checksum(scripts: &ScriptSet) -> String {
    let mut entries: Vec<_> = scripts.values().collect();
    entries.sort_by(|a, b| a.id.canonical().cmp(&b.id.canonical()));

    let mut hasher = Sha256::new();
    for script in entries {
        hasher.update(script.id.canonical().as_bytes());
        hasher.update(b"\0");
        hasher.update(script.body.as_bytes());
        hasher.update(b"\0");
        hasher.update(script.configs.as_bytes());
        hasher.update(b"\0");
        hasher.update(script.frequency_s.to_le_bytes());
        hasher.update(b"\x1e"); // entry separator (ASCII record separator)
    }
    hex::encode(hasher.finalize())
}

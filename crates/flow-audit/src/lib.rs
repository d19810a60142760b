//! flow-audit
//!
//! Append-only audit trail (expansion, §0): one JSON Lines file per process,
//! hash-chained so a reader can detect a truncated or tampered log. Records
//! strategy status transitions and pool admission/eviction events — the
//! operator-visible trace behind the claim-lease and pool invariants spec §3
//! and §4.8 describe but never expose a read path for.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// One audit event. `payload` carries the event-specific fields so the
/// envelope and the hash-chain logic never need to know about individual
/// event shapes; `record_*` helpers on [`AuditWriter`] build the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub strategy_id: Uuid,
    pub ts_utc: DateTime<Utc>,
    pub event_type: String,
    pub payload: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

/// Append-only, optionally hash-chained JSONL audit writer.
pub struct AuditWriter {
    path: PathBuf,
    hash_chain: bool,
    last_hash: Option<String>,
    seq: u64,
}

impl AuditWriter {
    /// Opens (creating parent dirs as needed) the writer at `path`. A fresh
    /// writer starts the hash chain at `None`; resume an existing log with
    /// [`AuditWriter::set_last_hash`] and [`AuditWriter::set_seq`].
    pub fn new(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {parent:?}"))?;
        }

        Ok(Self {
            path,
            hash_chain,
            last_hash: None,
            seq: 0,
        })
    }

    pub fn set_last_hash(&mut self, last_hash: Option<String>) {
        self.last_hash = last_hash;
    }

    pub fn last_hash(&self) -> Option<String> {
        self.last_hash.clone()
    }

    /// Resume an existing log: pass the count of events already written.
    pub fn set_seq(&mut self, seq: u64) {
        self.seq = seq;
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Append one event with an explicit event type and payload.
    pub fn append(&mut self, strategy_id: Uuid, event_type: &str, payload: Value) -> Result<AuditEvent> {
        let ts_utc = Utc::now();
        let event_id = derive_event_id(self.last_hash.as_deref(), &payload, self.seq)?;
        self.seq += 1;

        let mut ev = AuditEvent {
            event_id,
            strategy_id,
            ts_utc,
            event_type: event_type.to_string(),
            payload,
            hash_prev: None,
            hash_self: None,
        };

        if self.hash_chain {
            ev.hash_prev = self.last_hash.clone();
            let self_hash = compute_event_hash(&ev)?;
            ev.hash_self = Some(self_hash.clone());
            self.last_hash = Some(self_hash);
        }

        append_line(&self.path, &canonical_json_line(&ev)?)?;
        Ok(ev)
    }

    /// Record a `strategies.status` transition (spec §3, §7).
    pub fn record_transition(&mut self, strategy_id: Uuid, from: &str, to: &str, reason: Option<&str>) -> Result<AuditEvent> {
        self.append(
            strategy_id,
            "status_transition",
            serde_json::json!({ "from": from, "to": to, "reason": reason }),
        )
    }

    /// Record a Pool Manager admission decision (spec §4.8).
    pub fn record_pool_admission(&mut self, strategy_id: Uuid, admitted: bool, pool_rank: Option<usize>) -> Result<AuditEvent> {
        self.append(
            strategy_id,
            "pool_admission",
            serde_json::json!({ "admitted": admitted, "pool_rank": pool_rank }),
        )
    }

    /// Record a Pool Manager eviction (spec §4.8's displacement rule).
    pub fn record_pool_eviction(&mut self, strategy_id: Uuid, reason: &str) -> Result<AuditEvent> {
        self.append(strategy_id, "pool_eviction", serde_json::json!({ "reason": reason }))
    }
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open audit log {path:?}"))?;
    f.write_all(line.as_bytes()).context("write audit line failed")?;
    f.write_all(b"\n").context("write newline failed")?;
    Ok(())
}

/// Sort object keys recursively so the same event always serializes to the
/// same bytes, regardless of struct field order.
fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize audit event failed")?;
    serde_json::to_string(&sort_keys(&raw)).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Deterministic event id from the chain state, payload, and sequence
/// number — no RNG, so replaying the same inputs reproduces the same id.
fn derive_event_id(last_hash: Option<&str>, payload: &Value, seq: u64) -> Result<Uuid> {
    let material = format!("{}:{}:{seq}", last_hash.unwrap_or(""), payload);
    Ok(Uuid::new_v5(&Uuid::NAMESPACE_OID, material.as_bytes()))
}

/// Hash chain is computed over the event with `hash_self` cleared, so the
/// hash never includes itself.
pub fn compute_event_hash(ev: &AuditEvent) -> Result<String> {
    let mut clone = ev.clone();
    clone.hash_self = None;

    let canonical = canonical_json_line(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Verify the hash chain of an audit log file.
pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let content = fs::read_to_string(path.as_ref()).with_context(|| format!("read audit log {:?}", path.as_ref()))?;
    verify_hash_chain_str(&content)
}

/// Same as [`verify_hash_chain`] but over an in-memory string.
pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    let mut prev_hash: Option<String> = None;
    let mut line_count = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let ev: AuditEvent = serde_json::from_str(trimmed).with_context(|| format!("parse audit event at line {}", i + 1))?;
        line_count += 1;

        if ev.hash_prev != prev_hash {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!("hash_prev mismatch: expected {prev_hash:?}, got {:?}", ev.hash_prev),
            });
        }

        if let Some(ref claimed_hash) = ev.hash_self {
            let recomputed = compute_event_hash(&ev)?;
            if *claimed_hash != recomputed {
                return Ok(VerifyResult::Broken {
                    line: i + 1,
                    reason: format!("hash_self mismatch: claimed {claimed_hash}, recomputed {recomputed}"),
                });
            }
        }

        prev_hash = ev.hash_self.clone();
    }

    Ok(VerifyResult::Valid { lines: line_count })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    Broken { line: usize, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn appended_events_chain_and_verify() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let mut writer = AuditWriter::new(&path, true).unwrap();

        let strategy_id = Uuid::new_v4();
        writer.record_transition(strategy_id, "GENERATED", "VALIDATED", None).unwrap();
        writer.record_pool_admission(strategy_id, true, Some(12)).unwrap();
        writer.record_pool_eviction(strategy_id, "displaced by higher score").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert_eq!(verify_hash_chain_str(&content).unwrap(), VerifyResult::Valid { lines: 3 });
    }

    #[test]
    fn tampering_with_a_line_breaks_the_chain() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let mut writer = AuditWriter::new(&path, true).unwrap();
        let strategy_id = Uuid::new_v4();
        writer.record_transition(strategy_id, "VALIDATED", "ACTIVE", None).unwrap();
        writer.record_transition(strategy_id, "ACTIVE", "LIVE", None).unwrap();

        let mut content = fs::read_to_string(&path).unwrap();
        content = content.replacen("ACTIVE", "RETIRED", 1);

        match verify_hash_chain_str(&content).unwrap() {
            VerifyResult::Broken { .. } => {}
            VerifyResult::Valid { .. } => panic!("expected tampering to be detected"),
        }
    }

    #[test]
    fn resuming_a_log_continues_the_chain() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let strategy_id = Uuid::new_v4();

        let last_hash = {
            let mut writer = AuditWriter::new(&path, true).unwrap();
            let ev = writer.record_transition(strategy_id, "GENERATED", "VALIDATED", None).unwrap();
            ev.hash_self
        };

        let mut resumed = AuditWriter::new(&path, true).unwrap();
        resumed.set_last_hash(last_hash);
        resumed.set_seq(1);
        resumed.record_transition(strategy_id, "VALIDATED", "ACTIVE", None).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(verify_hash_chain_str(&content).unwrap(), VerifyResult::Valid { lines: 2 });
    }
}

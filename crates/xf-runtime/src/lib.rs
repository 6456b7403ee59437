#![forbid(unsafe_code)]

//! Runtime configuration and the duplicate-label guard decision log.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable holding a JSON-encoded [`RuntimePolicy`].
pub const POLICY_ENV_VAR: &str = "XFRAME_RUNTIME_POLICY";

pub const DEFAULT_JOIN_ARENA_BUDGET_BYTES: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimePolicy {
    /// Re-check strict structures for duplicate labels on reads made
    /// through the `*_with_policy` readers.
    pub revalidate_strict_on_read: bool,
    /// Upper bound on the bump arena a merge may allocate for its position
    /// vectors; larger merges fall back to the global allocator.
    pub join_arena_budget_bytes: usize,
    pub record_guard_decisions: bool,
}

impl Default for RuntimePolicy {
    fn default() -> Self {
        Self {
            revalidate_strict_on_read: false,
            join_arena_budget_bytes: DEFAULT_JOIN_ARENA_BUDGET_BYTES,
            record_guard_decisions: true,
        }
    }
}

impl RuntimePolicy {
    /// Parse a policy from JSON. Missing fields take their defaults.
    pub fn from_json_str(input: &str) -> Result<Self, RuntimeError> {
        Ok(serde_json::from_str(input)?)
    }

    /// Policy from [`POLICY_ENV_VAR`], or the default when it is unset.
    pub fn from_env() -> Result<Self, RuntimeError> {
        Self::from_env_value(std::env::var(POLICY_ENV_VAR).ok())
    }

    fn from_env_value(value: Option<String>) -> Result<Self, RuntimeError> {
        match value {
            None => Ok(Self::default()),
            Some(raw) if raw.trim().is_empty() => Ok(Self::default()),
            Some(raw) => Self::from_json_str(&raw).map_err(|err| RuntimeError::EnvPolicy {
                var: POLICY_ENV_VAR,
                reason: err.to_string(),
            }),
        }
    }

    /// Append a guard decision to `ledger` unless recording is disabled.
    pub fn record_guard(
        &self,
        ledger: &mut GuardLedger,
        operation: impl Into<String>,
        strict_inputs: usize,
        total_inputs: usize,
        outcome: GuardOutcome,
    ) {
        if !self.record_guard_decisions {
            return;
        }
        ledger.push(GuardRecord {
            ts_unix_ms: now_unix_ms().unwrap_or_default(),
            operation: operation.into(),
            strict_inputs,
            total_inputs,
            outcome,
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GuardOutcome {
    /// Every input was permissive; nothing to check.
    Permissive,
    /// The output is strict and passed validation.
    StrictValidated,
    Rejected { axis: String, duplicates: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardRecord {
    pub ts_unix_ms: u64,
    pub operation: String,
    pub strict_inputs: usize,
    pub total_inputs: usize,
    pub outcome: GuardOutcome,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardLedger {
    records: Vec<GuardRecord>,
}

impl GuardLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: GuardRecord) {
        self.records.push(record);
    }

    #[must_use]
    pub fn records(&self) -> &[GuardRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn rejections(&self) -> impl Iterator<Item = &GuardRecord> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, GuardOutcome::Rejected { .. }))
    }

    pub fn to_json(&self) -> Result<String, RuntimeError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("system clock is before UNIX_EPOCH")]
    ClockSkew,
    #[error("invalid runtime policy: {0}")]
    InvalidPolicy(#[from] serde_json::Error),
    #[error("invalid runtime policy in ${var}: {reason}")]
    EnvPolicy { var: &'static str, reason: String },
}

fn now_unix_ms() -> Result<u64, RuntimeError> {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| RuntimeError::ClockSkew)?
        .as_millis();
    Ok(u64::try_from(ms).unwrap_or(u64::MAX))
}

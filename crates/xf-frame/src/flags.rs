//! Duplicate-label guard.
//!
//! Every labelled structure carries [`Flags`]. A structure whose
//! `allows_duplicate_labels` is `false` (strict) must never hold a repeated
//! label on any axis. Derivations call [`finalize`]: the output is strict iff
//! any input is strict, and a strict output is validated before it is
//! returned.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use xf_index::{Index, IndexLabel};
use xf_runtime::{GuardLedger, GuardOutcome, RuntimePolicy};

use crate::FrameError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Flags {
    allows_duplicate_labels: bool,
}

impl Default for Flags {
    fn default() -> Self {
        Self::permissive()
    }
}

impl Flags {
    #[must_use]
    pub fn new(allows_duplicate_labels: bool) -> Self {
        Self {
            allows_duplicate_labels,
        }
    }

    #[must_use]
    pub fn permissive() -> Self {
        Self::new(true)
    }

    #[must_use]
    pub fn strict() -> Self {
        Self::new(false)
    }

    #[must_use]
    pub fn allows_duplicate_labels(self) -> bool {
        self.allows_duplicate_labels
    }

    #[must_use]
    pub fn is_strict(self) -> bool {
        !self.allows_duplicate_labels
    }

    /// Strict if any input is strict.
    #[must_use]
    pub fn propagate(inputs: &[Flags]) -> Self {
        Self::new(inputs.iter().all(|f| f.allows_duplicate_labels))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Index,
    Columns,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index => f.write_str("index"),
            Self::Columns => f.write_str("columns"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{axis} has duplicates: [{}]", render_labels(.labels))]
pub struct DuplicateLabelError {
    pub axis: Axis,
    pub labels: Vec<IndexLabel>,
}

fn render_labels(labels: &[IndexLabel]) -> String {
    labels
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Fails with the repeated labels of `index`, if any.
pub fn check_axis(index: &Index, axis: Axis) -> Result<(), DuplicateLabelError> {
    if index.is_unique() {
        return Ok(());
    }
    let err = DuplicateLabelError {
        axis,
        labels: index.duplicate_labels(),
    };
    debug!(axis = %axis, duplicates = err.labels.len(), "duplicate labels rejected");
    Err(err)
}

pub(crate) mod sealed {
    pub trait FlagSlot {
        fn flags_slot(&mut self) -> &mut super::Flags;
    }
}

/// A structure with labelled axes and a duplicate-label flag.
pub trait Guarded: sealed::FlagSlot {
    fn flags(&self) -> Flags;

    fn labelled_axes(&self) -> Vec<(Axis, &Index)>;

    fn allows_duplicate_labels(&self) -> bool {
        self.flags().allows_duplicate_labels()
    }

    fn validate_labels(&self) -> Result<(), DuplicateLabelError> {
        for (axis, index) in self.labelled_axes() {
            check_axis(index, axis)?;
        }
        Ok(())
    }
}

/// Guarded flag update: turning strict on validates every axis first and
/// leaves the flag untouched on failure.
pub(crate) fn set_allows_duplicate_labels<T: Guarded>(target: &mut T, allows: bool) -> Result<(), FrameError> {
    if !allows {
        target.validate_labels()?;
    }
    *target.flags_slot() = Flags::new(allows);
    Ok(())
}

/// Derivation hook: stamps `output` with the flags propagated from `inputs`
/// and validates it when the result is strict.
pub fn finalize<T: Guarded>(output: T, inputs: &[Flags], operation: &str) -> Result<T, FrameError> {
    let mut ledger = GuardLedger::new();
    finalize_with_policy(output, inputs, operation, &RuntimePolicy::default(), &mut ledger)
}

pub fn finalize_with_policy<T: Guarded>(
    mut output: T,
    inputs: &[Flags],
    operation: &str,
    policy: &RuntimePolicy,
    ledger: &mut GuardLedger,
) -> Result<T, FrameError> {
    let flags = Flags::propagate(inputs);
    *output.flags_slot() = flags;
    let strict_inputs = inputs.iter().filter(|f| f.is_strict()).count();

    if flags.allows_duplicate_labels() {
        policy.record_guard(ledger, operation, strict_inputs, inputs.len(), GuardOutcome::Permissive);
        return Ok(output);
    }

    match output.validate_labels() {
        Ok(()) => {
            debug!(operation, strict_inputs, "strict derivation validated");
            policy.record_guard(
                ledger,
                operation,
                strict_inputs,
                inputs.len(),
                GuardOutcome::StrictValidated,
            );
            Ok(output)
        }
        Err(err) => {
            debug!(
                operation,
                axis = %err.axis,
                duplicates = err.labels.len(),
                "strict derivation produced duplicate labels"
            );
            policy.record_guard(
                ledger,
                operation,
                strict_inputs,
                inputs.len(),
                GuardOutcome::Rejected {
                    axis: err.axis.to_string(),
                    duplicates: err.labels.len(),
                },
            );
            Err(err.into())
        }
    }
}

/// Re-check a strict structure on read when the policy asks for it.
pub(crate) fn revalidate_on_read<T: Guarded>(
    target: &T,
    operation: &str,
    policy: &RuntimePolicy,
    ledger: &mut GuardLedger,
) -> Result<(), FrameError> {
    if !policy.revalidate_strict_on_read || target.allows_duplicate_labels() {
        return Ok(());
    }
    match target.validate_labels() {
        Ok(()) => {
            policy.record_guard(ledger, operation, 1, 1, GuardOutcome::StrictValidated);
            Ok(())
        }
        Err(err) => {
            policy.record_guard(
                ledger,
                operation,
                1,
                1,
                GuardOutcome::Rejected {
                    axis: err.axis.to_string(),
                    duplicates: err.labels.len(),
                },
            );
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use xf_index::{Index, IndexLabel};
    use xf_runtime::{GuardLedger, GuardOutcome, RuntimePolicy};

    use super::{Axis, Flags, check_axis, finalize_with_policy};
    use crate::{FrameError, Series};

    #[test]
    fn strictness_is_contagious() {
        assert!(Flags::propagate(&[]).allows_duplicate_labels());
        assert!(Flags::propagate(&[Flags::permissive(), Flags::permissive()]).allows_duplicate_labels());
        assert!(Flags::propagate(&[Flags::permissive(), Flags::strict()]).is_strict());
        assert_eq!(Flags::default(), Flags::permissive());
    }

    #[test]
    fn flags_serialize_for_diagnostics() {
        let json = serde_json::to_string(&Flags::strict()).expect("serialize");
        assert_eq!(json, r#"{"allows_duplicate_labels":false}"#);
        assert_eq!(serde_json::to_string(&Axis::Columns).expect("axis"), r#""columns""#);
    }

    #[test]
    fn check_axis_lists_each_duplicate_once() {
        let index = Index::from_strs(&["b", "a", "b", "a", "b"]);
        let err = check_axis(&index, Axis::Columns).expect_err("duplicates");
        assert_eq!(err.labels, vec![IndexLabel::from("b"), IndexLabel::from("a")]);
        assert_eq!(err.to_string(), "columns has duplicates: [b, a]");
        assert!(check_axis(&Index::range(3), Axis::Index).is_ok());
    }

    #[test]
    fn finalize_stamps_and_records() {
        let dup = Series::from_values(
            "x",
            Index::from_strs(&["a", "a"]).labels().to_vec(),
            vec![1_i64.into(), 2_i64.into()],
        )
        .expect("series");
        let policy = RuntimePolicy::default();
        let mut ledger = GuardLedger::new();

        let loose = finalize_with_policy(dup.clone(), &[Flags::permissive()], "test", &policy, &mut ledger)
            .expect("permissive");
        assert!(loose.allows_duplicate_labels());

        let err = finalize_with_policy(dup, &[Flags::permissive(), Flags::strict()], "test", &policy, &mut ledger)
            .expect_err("strict output");
        assert!(matches!(err, FrameError::DuplicateLabel(_)));

        let outcomes: Vec<&GuardOutcome> = ledger.records().iter().map(|r| &r.outcome).collect();
        assert_eq!(outcomes[0], &GuardOutcome::Permissive);
        assert_eq!(
            outcomes[1],
            &GuardOutcome::Rejected {
                axis: "index".to_owned(),
                duplicates: 1
            }
        );
    }
}

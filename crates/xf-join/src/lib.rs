#![forbid(unsafe_code)]

//! Database-style merges of two frames on their row index or on a shared
//! key column.
//!
//! Row position vectors are built in a `bumpalo` arena when the estimated
//! size fits the configured budget, and in ordinary vectors otherwise. The
//! merged frame goes through the duplicate-label guard: it disallows
//! duplicates when either input does.

use std::{collections::HashMap, mem::size_of};

use bumpalo::{Bump, collections::Vec as BumpVec};
use thiserror::Error;
use tracing::debug;
use xf_array::{ArrayBox, ArrayError, ExtensionArray, concat_arrays};
use xf_frame::{DataFrame, FrameError, finalize_with_policy};
use xf_index::{Index, IndexError, IndexLabel};
use xf_runtime::{DEFAULT_JOIN_ARENA_BUDGET_BYTES, GuardLedger, RuntimePolicy};
use xf_types::Scalar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Outer,
}

/// What rows are matched on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOn {
    /// Row labels of both frames; the result keeps the matched labels.
    Index,
    /// A column present in both frames; the result gets a fresh range index
    /// and a single coalesced key column.
    Column(IndexLabel),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum JoinError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Array(#[from] ArrayError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("merge key {key} not found in {side} frame")]
    MissingKey { side: &'static str, key: IndexLabel },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinExecutionOptions {
    pub use_arena: bool,
    pub arena_budget_bytes: usize,
}

impl Default for JoinExecutionOptions {
    fn default() -> Self {
        Self {
            use_arena: true,
            arena_budget_bytes: DEFAULT_JOIN_ARENA_BUDGET_BYTES,
        }
    }
}

impl From<&RuntimePolicy> for JoinExecutionOptions {
    fn from(policy: &RuntimePolicy) -> Self {
        Self {
            use_arena: true,
            arena_budget_bytes: policy.join_arena_budget_bytes,
        }
    }
}

/// Suffixes applied to non-key columns present on both sides.
pub const DEFAULT_SUFFIXES: (&str, &str) = ("_x", "_y");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct JoinExecutionTrace {
    used_arena: bool,
    output_rows: usize,
    estimated_bytes: usize,
}

pub fn merge_dataframes(
    left: &DataFrame,
    right: &DataFrame,
    on: &MergeOn,
    how: JoinType,
) -> Result<DataFrame, JoinError> {
    let mut ledger = GuardLedger::new();
    merge_dataframes_with_policy(left, right, on, how, &RuntimePolicy::default(), &mut ledger)
}

pub fn merge_dataframes_with_policy(
    left: &DataFrame,
    right: &DataFrame,
    on: &MergeOn,
    how: JoinType,
    policy: &RuntimePolicy,
    ledger: &mut GuardLedger,
) -> Result<DataFrame, JoinError> {
    let (merged, _) = merge_with_trace(left, right, on, how, JoinExecutionOptions::from(policy))?;
    Ok(finalize_with_policy(
        merged,
        &[left.flags(), right.flags()],
        "merge",
        policy,
        ledger,
    )?)
}

/// Same as [`merge_dataframes`] with explicit allocation options.
pub fn merge_dataframes_with_options(
    left: &DataFrame,
    right: &DataFrame,
    on: &MergeOn,
    how: JoinType,
    options: JoinExecutionOptions,
) -> Result<DataFrame, JoinError> {
    let (merged, _) = merge_with_trace(left, right, on, how, options)?;
    let mut ledger = GuardLedger::new();
    Ok(finalize_with_policy(
        merged,
        &[left.flags(), right.flags()],
        "merge",
        &RuntimePolicy::default(),
        &mut ledger,
    )?)
}

// ── Keys ───────────────────────────────────────────────────────────────

/// Matching label of one key value. Integral floats match the equal
/// integer, and every missing marker matches every other one.
fn key_label(value: Scalar) -> IndexLabel {
    match value {
        Scalar::Int64(v) => IndexLabel::Int64(v),
        Scalar::Float64(v) if v.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(&v) => {
            IndexLabel::Int64(v as i64)
        }
        Scalar::Float64(v) => IndexLabel::from(v),
        Scalar::Bool(v) => IndexLabel::Bool(v),
        Scalar::Utf8(v) => IndexLabel::Utf8(v),
        Scalar::Datetime64(v) => IndexLabel::Datetime64(v),
        Scalar::Timedelta64(v) => IndexLabel::Timedelta64(v),
        Scalar::Null(_) => IndexLabel::Null,
    }
}

fn key_array<'a>(
    frame: &'a DataFrame,
    key: &IndexLabel,
    side: &'static str,
) -> Result<&'a dyn ExtensionArray, JoinError> {
    frame
        .columns()
        .position(key)
        .and_then(|position| frame.column_array(position))
        .ok_or_else(|| JoinError::MissingKey { side, key: key.clone() })
}

fn key_labels(frame: &DataFrame, on: &MergeOn, side: &'static str) -> Result<Vec<IndexLabel>, JoinError> {
    match on {
        MergeOn::Index => Ok(frame.index().labels().to_vec()),
        MergeOn::Column(key) => Ok(key_array(frame, key, side)?
            .to_scalars()
            .into_iter()
            .map(key_label)
            .collect()),
    }
}

fn positions_by_key(keys: &[IndexLabel]) -> HashMap<&IndexLabel, Vec<usize>> {
    let mut map = HashMap::<&IndexLabel, Vec<usize>>::new();
    for (pos, label) in keys.iter().enumerate() {
        map.entry(label).or_default().push(pos);
    }
    map
}

// ── Planning ───────────────────────────────────────────────────────────

fn estimate_output_rows(left: &[IndexLabel], right: &[IndexLabel], how: JoinType) -> usize {
    let right_map = positions_by_key(right);
    let left_map = positions_by_key(left);
    let matched: usize = left
        .iter()
        .map(|label| right_map.get(label).map_or(0, Vec::len))
        .sum();
    let left_only = left.iter().filter(|l| !right_map.contains_key(l)).count();
    let right_only = right.iter().filter(|r| !left_map.contains_key(r)).count();
    match how {
        JoinType::Inner => matched,
        JoinType::Left => matched + left_only,
        JoinType::Right => matched + right_only,
        JoinType::Outer => matched + left_only + right_only,
    }
}

fn estimate_intermediate_bytes(output_rows: usize) -> usize {
    output_rows.saturating_mul(
        size_of::<Option<usize>>()
            .saturating_mul(2)
            .saturating_add(size_of::<IndexLabel>()),
    )
}

/// Emit `(left, right)` row pairs in output order. Left-driven joins follow
/// left row order; right joins follow right row order; outer joins append
/// unmatched right rows after the left-driven part.
fn plan_rows(
    left: &[IndexLabel],
    right: &[IndexLabel],
    how: JoinType,
    mut emit: impl FnMut(Option<usize>, Option<usize>),
) {
    if how == JoinType::Right {
        let left_map = positions_by_key(left);
        for (right_pos, label) in right.iter().enumerate() {
            match left_map.get(label) {
                Some(matches) => matches.iter().for_each(|&l| emit(Some(l), Some(right_pos))),
                None => emit(None, Some(right_pos)),
            }
        }
        return;
    }

    let right_map = positions_by_key(right);
    for (left_pos, label) in left.iter().enumerate() {
        match right_map.get(label) {
            Some(matches) => matches.iter().for_each(|&r| emit(Some(left_pos), Some(r))),
            None if matches!(how, JoinType::Left | JoinType::Outer) => emit(Some(left_pos), None),
            None => {}
        }
    }
    if how == JoinType::Outer {
        let left_map = positions_by_key(left);
        for (right_pos, label) in right.iter().enumerate() {
            if !left_map.contains_key(label) {
                emit(None, Some(right_pos));
            }
        }
    }
}

fn merge_with_trace(
    left: &DataFrame,
    right: &DataFrame,
    on: &MergeOn,
    how: JoinType,
    options: JoinExecutionOptions,
) -> Result<(DataFrame, JoinExecutionTrace), JoinError> {
    let left_keys = key_labels(left, on, "left")?;
    let right_keys = key_labels(right, on, "right")?;

    let output_rows = estimate_output_rows(&left_keys, &right_keys, how);
    let estimated_bytes = estimate_intermediate_bytes(output_rows);
    let use_arena = options.use_arena && estimated_bytes <= options.arena_budget_bytes;
    debug!(output_rows, estimated_bytes, use_arena, ?how, "planned merge");

    let merged = if use_arena {
        let arena = Bump::new();
        let mut left_positions = BumpVec::<Option<usize>>::with_capacity_in(output_rows, &arena);
        let mut right_positions = BumpVec::<Option<usize>>::with_capacity_in(output_rows, &arena);
        plan_rows(&left_keys, &right_keys, how, |l, r| {
            left_positions.push(l);
            right_positions.push(r);
        });
        assemble(
            left,
            right,
            on,
            (left_keys.as_slice(), right_keys.as_slice()),
            left_positions.as_slice(),
            right_positions.as_slice(),
        )?
    } else {
        let mut left_positions = Vec::<Option<usize>>::with_capacity(output_rows);
        let mut right_positions = Vec::<Option<usize>>::with_capacity(output_rows);
        plan_rows(&left_keys, &right_keys, how, |l, r| {
            left_positions.push(l);
            right_positions.push(r);
        });
        assemble(
            left,
            right,
            on,
            (left_keys.as_slice(), right_keys.as_slice()),
            &left_positions,
            &right_positions,
        )?
    };

    Ok((
        merged,
        JoinExecutionTrace {
            used_arena: use_arena,
            output_rows,
            estimated_bytes,
        },
    ))
}

// ── Assembly ───────────────────────────────────────────────────────────

fn suffixed(label: &IndexLabel, suffix: &str) -> IndexLabel {
    IndexLabel::Utf8(format!("{label}{suffix}"))
}

fn assemble(
    left: &DataFrame,
    right: &DataFrame,
    on: &MergeOn,
    keys: (&[IndexLabel], &[IndexLabel]),
    left_positions: &[Option<usize>],
    right_positions: &[Option<usize>],
) -> Result<DataFrame, JoinError> {
    let (left_keys, right_keys) = keys;
    let key_column = match on {
        MergeOn::Index => None,
        MergeOn::Column(key) => Some(key),
    };
    let (left_suffix, right_suffix) = DEFAULT_SUFFIXES;

    let mut labels = Vec::with_capacity(left.num_columns() + right.num_columns());
    let mut data: Vec<ArrayBox> = Vec::with_capacity(labels.capacity());

    for (pos, label) in left.columns().labels().iter().enumerate() {
        let Some(array) = left.column_array(pos) else {
            continue;
        };
        if Some(label) == key_column {
            labels.push(label.clone());
            let right_key = key_array(right, label, "right")?;
            data.push(coalesce_key(array, right_key, left_positions, right_positions)?);
            continue;
        }
        let clash = right.columns().contains(label);
        labels.push(if clash { suffixed(label, left_suffix) } else { label.clone() });
        data.push(array.take(left_positions));
    }

    for (pos, label) in right.columns().labels().iter().enumerate() {
        if Some(label) == key_column {
            continue;
        }
        let Some(array) = right.column_array(pos) else {
            continue;
        };
        let clash = left.columns().contains(label);
        labels.push(if clash { suffixed(label, right_suffix) } else { label.clone() });
        data.push(array.take(right_positions));
    }

    let index = match on {
        MergeOn::Index => Index::new(
            left_positions
                .iter()
                .zip(right_positions)
                .map(|(l, r)| match (l, r) {
                    (Some(l), _) => left_keys[*l].clone(),
                    (None, Some(r)) => right_keys[*r].clone(),
                    (None, None) => IndexLabel::Int64(0),
                })
                .collect(),
        ),
        MergeOn::Column(_) => Index::range(left_positions.len()),
    };
    Ok(DataFrame::new(index, Index::new(labels), data)?)
}

/// Left key values, with right key values filling rows only the right side
/// contributed. Those rows widen the column to the common dtype of both keys.
fn coalesce_key(
    left_key: &dyn ExtensionArray,
    right_key: &dyn ExtensionArray,
    left_positions: &[Option<usize>],
    right_positions: &[Option<usize>],
) -> Result<ArrayBox, JoinError> {
    let right_only = left_positions
        .iter()
        .zip(right_positions)
        .any(|pair| matches!(pair, (None, Some(_))));
    if !right_only {
        return Ok(left_key.take(left_positions));
    }

    let offset = left_key.len();
    let combined = concat_arrays(&[left_key, right_key])?;
    let picks: Vec<Option<usize>> = left_positions
        .iter()
        .zip(right_positions)
        .map(|(l, r)| match (l, r) {
            (Some(l), _) => Some(*l),
            (None, Some(r)) => Some(offset + r),
            (None, None) => None,
        })
        .collect();
    Ok(combined.take(&picks))
}

#[cfg(test)]
mod tests {
    use xf_frame::{DataFrame, FrameError};
    use xf_index::{Index, IndexLabel};
    use xf_runtime::{GuardLedger, GuardOutcome, RuntimePolicy};
    use xf_types::{NullKind, Scalar};

    use super::{
        JoinError, JoinExecutionOptions, JoinType, MergeOn, merge_dataframes, merge_dataframes_with_options,
        merge_dataframes_with_policy, merge_with_trace,
    };

    fn frame(index: &[&str], columns: Vec<(&str, Vec<Scalar>)>) -> DataFrame {
        DataFrame::from_columns(
            Index::from_strs(index).labels().to_vec(),
            columns.into_iter().map(|(c, v)| (IndexLabel::from(c), v)).collect(),
        )
        .expect("frame")
    }

    fn ints(values: &[i64]) -> Vec<Scalar> {
        values.iter().copied().map(Scalar::Int64).collect()
    }

    #[test]
    fn index_merge_of_strict_with_duplicated_right_fails() {
        let a = frame(&["a", "b"], vec![("A", ints(&[0, 1]))])
            .with_allows_duplicate_labels(false)
            .expect("strict");
        let b = frame(&["a", "b", "b"], vec![("B", ints(&[0, 1, 2]))]);
        let err = merge_dataframes(&a, &b, &MergeOn::Index, JoinType::Inner).expect_err("duplicates");
        assert!(matches!(err, JoinError::Frame(FrameError::DuplicateLabel(_))));

        let loose = frame(&["a", "b"], vec![("A", ints(&[0, 1]))]);
        let out = merge_dataframes(&loose, &b, &MergeOn::Index, JoinType::Inner).expect("permissive");
        assert_eq!(out.index(), &Index::from_strs(&["a", "b", "b"]));
        assert!(out.allows_duplicate_labels());
    }

    #[test]
    fn strict_unique_merge_stays_strict() {
        let a = frame(&["a", "b"], vec![("A", ints(&[0, 1]))]);
        let b = frame(&["b", "c"], vec![("B", ints(&[5, 6]))])
            .with_allows_duplicate_labels(false)
            .expect("strict");
        let out = merge_dataframes(&a, &b, &MergeOn::Index, JoinType::Outer).expect("outer");
        assert_eq!(out.index(), &Index::from_strs(&["a", "b", "c"]));
        assert!(!out.allows_duplicate_labels());
        assert!(out.get(0, 1).expect("cell").is_missing());
        assert_eq!(out.get(1, 1), Some(Scalar::Int64(5)));
    }

    #[test]
    fn join_types_on_index() {
        let a = frame(&["a", "b"], vec![("A", ints(&[1, 2]))]);
        let b = frame(&["b", "c"], vec![("B", ints(&[3, 4]))]);
        let cases = [
            (JoinType::Inner, vec!["b"]),
            (JoinType::Left, vec!["a", "b"]),
            (JoinType::Right, vec!["b", "c"]),
            (JoinType::Outer, vec!["a", "b", "c"]),
        ];
        for (how, expected) in cases {
            let out = merge_dataframes(&a, &b, &MergeOn::Index, how).expect("merge");
            assert_eq!(out.index(), &Index::from_strs(&expected), "{how:?}");
        }
    }

    #[test]
    fn column_merge_coalesces_key_and_suffixes_overlaps() {
        let a = frame(
            &["r0", "r1"],
            vec![("key", vec!["k1".into(), "k2".into()]), ("v", ints(&[1, 2]))],
        );
        let b = frame(
            &["s0", "s1"],
            vec![("key", vec!["k2".into(), "k3".into()]), ("v", ints(&[20, 30]))],
        );
        let out = merge_dataframes(&a, &b, &MergeOn::Column("key".into()), JoinType::Outer).expect("merge");
        assert_eq!(out.index(), &Index::range(3));
        assert_eq!(out.columns(), &Index::from_strs(&["key", "v_x", "v_y"]));
        assert_eq!(out.get(2, 0), Some(Scalar::from("k3")));
        assert_eq!(out.get(1, 2), Some(Scalar::Int64(20)));
        assert!(out.get(2, 1).expect("cell").is_missing());
    }

    #[test]
    fn missing_key_column_is_reported() {
        let a = frame(&["a"], vec![("A", ints(&[1]))]);
        let err = merge_dataframes(&a, &a, &MergeOn::Column("nope".into()), JoinType::Inner);
        assert_eq!(
            err.expect_err("missing"),
            JoinError::MissingKey {
                side: "left",
                key: "nope".into()
            }
        );
    }

    #[test]
    fn missing_keys_match_each_other() {
        let a = frame(
            &["r0", "r1"],
            vec![("k", vec!["a".into(), Scalar::Null(NullKind::Null)]), ("v", ints(&[1, 2]))],
        );
        let b = frame(
            &["s0", "s1"],
            vec![("k", vec![Scalar::Null(NullKind::Null), "b".into()]), ("w", ints(&[10, 20]))],
        );
        let out = merge_dataframes(&a, &b, &MergeOn::Column("k".into()), JoinType::Inner).expect("merge");
        assert_eq!(out.len(), 1);
        assert!(out.get(0, 0).expect("key").is_missing());
        assert_eq!(out.get(0, 1), Some(Scalar::Int64(2)));
        assert_eq!(out.get(0, 2), Some(Scalar::Int64(10)));
    }

    #[test]
    fn mixed_dtype_keys_widen_the_key_column() {
        let a = frame(&["r0", "r1"], vec![("k", ints(&[1, 2])), ("v", ints(&[1, 2]))]);
        let b = frame(
            &["s0", "s1"],
            vec![("k", vec![Scalar::Float64(2.0), Scalar::Float64(3.5)]), ("w", ints(&[20, 35]))],
        );

        let inner = merge_dataframes(&a, &b, &MergeOn::Column("k".into()), JoinType::Inner).expect("inner");
        assert_eq!(inner.len(), 1);
        assert_eq!(inner.get(0, 0), Some(Scalar::Int64(2)));
        assert_eq!(inner.get(0, 2), Some(Scalar::Int64(20)));

        let outer = merge_dataframes(&a, &b, &MergeOn::Column("k".into()), JoinType::Outer).expect("outer");
        let keys: Vec<Option<Scalar>> = (0..outer.len()).map(|row| outer.get(row, 0)).collect();
        assert_eq!(
            keys,
            vec![
                Some(Scalar::Float64(1.0)),
                Some(Scalar::Float64(2.0)),
                Some(Scalar::Float64(3.5))
            ]
        );

        let text = frame(&["s0"], vec![("k", vec!["x".into()]), ("w", ints(&[9]))]);
        let mixed = merge_dataframes(&a, &text, &MergeOn::Column("k".into()), JoinType::Outer).expect("mixed");
        assert_eq!(mixed.len(), 3);
        assert_eq!(mixed.get(0, 0), Some(Scalar::Int64(1)));
        assert_eq!(mixed.get(2, 0), Some(Scalar::from("x")));
        assert_eq!(mixed.column_array(0).expect("key").dtype().to_string(), "object");
    }

    #[test]
    fn bool_keys_merge() {
        let a = frame(
            &["r0", "r1"],
            vec![("k", vec![Scalar::Bool(true), Scalar::Bool(false)]), ("v", ints(&[1, 2]))],
        );
        let b = frame(&["s0"], vec![("k", vec![Scalar::Bool(false)]), ("w", ints(&[7]))]);
        let out = merge_dataframes(&a, &b, &MergeOn::Column("k".into()), JoinType::Left).expect("merge");
        assert_eq!(out.len(), 2);
        assert!(out.get(0, 2).expect("unmatched").is_missing());
        assert_eq!(out.get(1, 0), Some(Scalar::Bool(false)));
        assert_eq!(out.get(1, 2), Some(Scalar::Int64(7)));
    }

    #[test]
    fn arena_merge_matches_global_allocator() {
        let a = frame(&["k", "k", "x"], vec![("A", ints(&[1, 2, 3]))]);
        let b = frame(&["k", "k"], vec![("B", ints(&[10, 20]))]);
        let global = merge_dataframes_with_options(
            &a,
            &b,
            &MergeOn::Index,
            JoinType::Left,
            JoinExecutionOptions {
                use_arena: false,
                arena_budget_bytes: 0,
            },
        )
        .expect("global");
        let arena = merge_dataframes(&a, &b, &MergeOn::Index, JoinType::Left).expect("arena");
        assert_eq!(arena, global);
        assert_eq!(arena.len(), 5);
    }

    #[test]
    fn arena_falls_back_when_budget_is_too_small() {
        let a = frame(&["a", "b"], vec![("A", ints(&[1, 2]))]);
        let options = JoinExecutionOptions {
            use_arena: true,
            arena_budget_bytes: 1,
        };
        let (_, trace) = merge_with_trace(&a, &a, &MergeOn::Index, JoinType::Inner, options).expect("merge");
        assert!(!trace.used_arena);
        assert_eq!(trace.output_rows, 2);
        assert!(trace.estimated_bytes > options.arena_budget_bytes);
    }

    #[test]
    fn policy_budget_controls_arena_and_ledger_records() {
        let a = frame(&["a"], vec![("A", ints(&[1]))])
            .with_allows_duplicate_labels(false)
            .expect("strict");
        let policy = RuntimePolicy {
            join_arena_budget_bytes: 0,
            ..RuntimePolicy::default()
        };
        let mut ledger = GuardLedger::new();
        merge_dataframes_with_policy(&a, &a, &MergeOn::Index, JoinType::Inner, &policy, &mut ledger)
            .expect("merge");
        assert_eq!(ledger.records()[0].operation, "merge");
        assert_eq!(ledger.records()[0].outcome, GuardOutcome::StrictValidated);
    }
}

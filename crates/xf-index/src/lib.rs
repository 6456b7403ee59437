#![forbid(unsafe_code)]

//! Axis labels for series and frames.
//!
//! An [`Index`] is an ordered, possibly duplicated, list of [`IndexLabel`]s.
//! Duplicate detection is cached per instance since the duplicate-label
//! guard asks for it on every strict derivation.

use std::cell::OnceCell;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A non-NaN float usable as a hashable label. `-0.0` is stored as `0.0`
/// so both spell the same label.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FloatLabel(f64);

impl FloatLabel {
    #[must_use]
    pub fn new(value: f64) -> Option<Self> {
        if value.is_nan() {
            return None;
        }
        Some(Self(if value == 0.0 { 0.0 } else { value }))
    }

    #[must_use]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl PartialEq for FloatLabel {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatLabel {}

impl std::hash::Hash for FloatLabel {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl PartialOrd for FloatLabel {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatLabel {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// One axis label. Each variant is its own label space: `Int64(1)`,
/// `Utf8("1")`, `Bool(true)` and `Float64(1.0)` never compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum IndexLabel {
    Int64(i64),
    Utf8(String),
    Bool(bool),
    Float64(FloatLabel),
    Datetime64(i64),
    Timedelta64(i64),
    /// Missing key of any kind.
    Null,
}

impl IndexLabel {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<i64> for IndexLabel {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<bool> for IndexLabel {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// NaN becomes [`IndexLabel::Null`].
impl From<f64> for IndexLabel {
    fn from(value: f64) -> Self {
        FloatLabel::new(value).map_or(Self::Null, Self::Float64)
    }
}

impl From<&str> for IndexLabel {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for IndexLabel {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl fmt::Display for IndexLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v}"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Float64(v) => write!(f, "{:?}", v.get()),
            Self::Datetime64(v) => write!(f, "datetime64({v}ns)"),
            Self::Timedelta64(v) => write!(f, "timedelta64({v}ns)"),
            Self::Null => f.write_str("NaN"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("alignment vectors must have equal lengths")]
    InvalidAlignmentVectors,
    #[error("label {0} not found in index")]
    LabelNotFound(IndexLabel),
    #[error("position {position} is out of bounds for index of length {len}")]
    OutOfBounds { position: usize, len: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    labels: Vec<IndexLabel>,
    #[serde(skip)]
    duplicate_cache: OnceCell<bool>,
}

impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.labels == other.labels
    }
}

impl Eq for Index {}

impl FromIterator<IndexLabel> for Index {
    fn from_iter<T: IntoIterator<Item = IndexLabel>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

fn detect_duplicates(labels: &[IndexLabel]) -> bool {
    let mut seen = HashMap::<&IndexLabel, ()>::with_capacity(labels.len());
    labels.iter().any(|label| seen.insert(label, ()).is_some())
}

impl Index {
    #[must_use]
    pub fn new(labels: Vec<IndexLabel>) -> Self {
        Self {
            labels,
            duplicate_cache: OnceCell::new(),
        }
    }

    /// Default positional labels `0..len`.
    #[must_use]
    pub fn range(len: usize) -> Self {
        (0..len as i64).map(IndexLabel::Int64).collect()
    }

    #[must_use]
    pub fn from_i64(values: Vec<i64>) -> Self {
        values.into_iter().map(IndexLabel::from).collect()
    }

    #[must_use]
    pub fn from_strs(values: &[&str]) -> Self {
        values.iter().map(|v| IndexLabel::from(*v)).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[must_use]
    pub fn labels(&self) -> &[IndexLabel] {
        &self.labels
    }

    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        *self
            .duplicate_cache
            .get_or_init(|| detect_duplicates(&self.labels))
    }

    #[must_use]
    pub fn is_unique(&self) -> bool {
        !self.has_duplicates()
    }

    /// Every label occurring more than once, in order of first appearance.
    #[must_use]
    pub fn duplicate_labels(&self) -> Vec<IndexLabel> {
        if !self.has_duplicates() {
            return Vec::new();
        }
        let counts = self.label_counts();
        let mut reported = HashMap::<&IndexLabel, ()>::new();
        self.labels
            .iter()
            .filter(|label| counts[label] > 1 && reported.insert(label, ()).is_none())
            .cloned()
            .collect()
    }

    fn label_counts(&self) -> HashMap<&IndexLabel, usize> {
        let mut counts = HashMap::<&IndexLabel, usize>::with_capacity(self.labels.len());
        for label in &self.labels {
            *counts.entry(label).or_insert(0) += 1;
        }
        counts
    }

    fn position_map_first(&self) -> HashMap<&IndexLabel, usize> {
        let mut positions = HashMap::with_capacity(self.labels.len());
        for (idx, label) in self.labels.iter().enumerate() {
            positions.entry(label).or_insert(idx);
        }
        positions
    }

    // ── Lookup ─────────────────────────────────────────────────────────

    /// First position of `needle`.
    #[must_use]
    pub fn position(&self, needle: &IndexLabel) -> Option<usize> {
        self.labels.iter().position(|label| label == needle)
    }

    /// Every position holding `needle`, ascending.
    #[must_use]
    pub fn positions_of(&self, needle: &IndexLabel) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter_map(|(idx, label)| (label == needle).then_some(idx))
            .collect()
    }

    #[must_use]
    pub fn contains(&self, label: &IndexLabel) -> bool {
        self.position(label).is_some()
    }

    /// First-match position in `self` of each label of `target`.
    #[must_use]
    pub fn get_indexer(&self, target: &Index) -> Vec<Option<usize>> {
        let map = self.position_map_first();
        target
            .labels
            .iter()
            .map(|label| map.get(label).copied())
            .collect()
    }

    /// Positions selected by a list of labels, expanding duplicated labels
    /// to all their occurrences.
    pub fn positions_for_labels(&self, wanted: &[IndexLabel]) -> Result<Vec<usize>, IndexError> {
        let mut out = Vec::with_capacity(wanted.len());
        for label in wanted {
            let hits = self.positions_of(label);
            if hits.is_empty() {
                return Err(IndexError::LabelNotFound(label.clone()));
            }
            out.extend(hits);
        }
        Ok(out)
    }

    // ── Derivation ─────────────────────────────────────────────────────

    pub fn take(&self, positions: &[usize]) -> Result<Self, IndexError> {
        positions
            .iter()
            .map(|&idx| {
                self.labels
                    .get(idx)
                    .cloned()
                    .ok_or(IndexError::OutOfBounds {
                        position: idx,
                        len: self.len(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    /// `self` followed by `label`.
    #[must_use]
    pub fn appended(&self, label: IndexLabel) -> Self {
        let mut labels = self.labels.clone();
        labels.push(label);
        Self::new(labels)
    }

    /// Labels of every input, end to end. Duplicates are kept.
    #[must_use]
    pub fn concat(indexes: &[&Index]) -> Self {
        indexes
            .iter()
            .flat_map(|index| index.labels.iter().cloned())
            .collect()
    }

    #[must_use]
    pub fn map_labels(&self, f: impl Fn(&IndexLabel) -> IndexLabel) -> Self {
        self.labels.iter().map(f).collect()
    }

    #[must_use]
    pub fn union_with(&self, other: &Self) -> Self {
        let mut seen = HashMap::<&IndexLabel, ()>::new();
        self.labels
            .iter()
            .chain(other.labels.iter())
            .filter(|l| seen.insert(l, ()).is_none())
            .cloned()
            .collect()
    }
}

// ── Alignment ──────────────────────────────────────────────────────────

/// Output index plus, for each output row, the source row in each input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentPlan {
    pub index: Index,
    pub left_positions: Vec<Option<usize>>,
    pub right_positions: Vec<Option<usize>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignMode {
    Inner,
    Left,
    Right,
    /// Union of both label sets. Arithmetic aligns this way.
    #[default]
    Outer,
}

fn identity_plan(index: &Index) -> AlignmentPlan {
    let positions: Vec<Option<usize>> = (0..index.len()).map(Some).collect();
    AlignmentPlan {
        index: index.clone(),
        left_positions: positions.clone(),
        right_positions: positions,
    }
}

fn position_groups(index: &Index) -> HashMap<&IndexLabel, Vec<usize>> {
    let mut groups: HashMap<&IndexLabel, Vec<usize>> = HashMap::new();
    for (pos, label) in index.labels.iter().enumerate() {
        groups.entry(label).or_default().push(pos);
    }
    groups
}

/// Identical indexes align row for row. Otherwise a label present on both
/// sides yields one output row per pair of occurrences, so a label repeated
/// `l` times on the left and `r` times on the right produces `l * r` rows.
#[must_use]
pub fn align(left: &Index, right: &Index, mode: AlignMode) -> AlignmentPlan {
    if left == right {
        return identity_plan(left);
    }
    match mode {
        AlignMode::Inner => align_driven(left, right, false),
        AlignMode::Left => align_driven(left, right, true),
        AlignMode::Right => {
            let plan = align_driven(right, left, true);
            AlignmentPlan {
                index: plan.index,
                left_positions: plan.right_positions,
                right_positions: plan.left_positions,
            }
        }
        AlignMode::Outer => align_outer(left, right),
    }
}

/// Walk `driver` in order, pairing each row with every matching row of
/// `other`. Unmatched driver rows are kept only when `keep_unmatched`.
fn align_driven(driver: &Index, other: &Index, keep_unmatched: bool) -> AlignmentPlan {
    let other_groups = position_groups(other);
    let mut labels = Vec::new();
    let mut left_positions = Vec::new();
    let mut right_positions = Vec::new();

    for (pos, label) in driver.labels.iter().enumerate() {
        match other_groups.get(label) {
            Some(hits) => {
                for &hit in hits {
                    labels.push(label.clone());
                    left_positions.push(Some(pos));
                    right_positions.push(Some(hit));
                }
            }
            None if keep_unmatched => {
                labels.push(label.clone());
                left_positions.push(Some(pos));
                right_positions.push(None);
            }
            None => {}
        }
    }

    AlignmentPlan {
        index: Index::new(labels),
        left_positions,
        right_positions,
    }
}

/// Labels in left-then-unseen-right order; each label expands to the
/// product of its occurrences on both sides.
fn align_outer(left: &Index, right: &Index) -> AlignmentPlan {
    let left_groups = position_groups(left);
    let right_groups = position_groups(right);
    let order = left.union_with(right);

    let mut labels = Vec::new();
    let mut left_positions = Vec::new();
    let mut right_positions = Vec::new();

    for label in order.labels() {
        let left_hits = left_groups.get(label).map_or(&[][..], Vec::as_slice);
        let right_hits = right_groups.get(label).map_or(&[][..], Vec::as_slice);

        let left_slots: Vec<Option<usize>> = if left_hits.is_empty() {
            vec![None]
        } else {
            left_hits.iter().copied().map(Some).collect()
        };
        let right_slots: Vec<Option<usize>> = if right_hits.is_empty() {
            vec![None]
        } else {
            right_hits.iter().copied().map(Some).collect()
        };

        for &lp in &left_slots {
            for &rp in &right_slots {
                labels.push(label.clone());
                left_positions.push(lp);
                right_positions.push(rp);
            }
        }
    }

    AlignmentPlan {
        index: Index::new(labels),
        left_positions,
        right_positions,
    }
}

pub fn validate_alignment_plan(plan: &AlignmentPlan) -> Result<(), IndexError> {
    if plan.left_positions.len() != plan.right_positions.len()
        || plan.left_positions.len() != plan.index.len()
    {
        return Err(IndexError::InvalidAlignmentVectors);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        AlignMode, FloatLabel, Index, IndexError, IndexLabel, align, validate_alignment_plan,
    };

    #[test]
    fn duplicate_detection_is_cached_and_reported_in_order() {
        let index = Index::from_strs(&["b", "a", "b", "c", "a"]);
        assert!(index.has_duplicates());
        assert!(!index.is_unique());
        assert_eq!(
            index.duplicate_labels(),
            vec![IndexLabel::from("b"), IndexLabel::from("a")]
        );
        assert!(Index::range(3).duplicate_labels().is_empty());
    }

    #[test]
    fn label_lists_expand_duplicates() {
        let index = Index::from_strs(&["a", "b", "a"]);
        assert_eq!(
            index
                .positions_for_labels(&["a".into(), "b".into()])
                .expect("labels"),
            vec![0, 2, 1]
        );
        assert_eq!(
            index.positions_for_labels(&["z".into()]),
            Err(IndexError::LabelNotFound("z".into()))
        );
    }

    #[test]
    fn take_checks_bounds() {
        let index = Index::from_strs(&["a", "b"]);
        assert_eq!(
            index.take(&[1, 1]).expect("take"),
            Index::from_strs(&["b", "b"])
        );
        assert!(index.take(&[2]).is_err());
    }

    #[test]
    fn outer_alignment_keeps_left_rows_then_new_right_labels() {
        let left = Index::from_strs(&["a", "b"]);
        let right = Index::from_strs(&["b", "c"]);
        let plan = align(&left, &right, AlignMode::Outer);
        validate_alignment_plan(&plan).expect("valid");
        assert_eq!(plan.index, Index::from_strs(&["a", "b", "c"]));
        assert_eq!(plan.left_positions, vec![Some(0), Some(1), None]);
        assert_eq!(plan.right_positions, vec![None, Some(0), Some(1)]);
    }

    #[test]
    fn identical_duplicated_indexes_align_row_for_row() {
        let index = Index::from_strs(&["a", "a"]);
        let plan = align(&index, &index.clone(), AlignMode::Outer);
        assert_eq!(plan.left_positions, vec![Some(0), Some(1)]);
        assert_eq!(plan.right_positions, vec![Some(0), Some(1)]);
    }

    #[test]
    fn differing_duplicated_indexes_align_pairwise() {
        let left = Index::from_strs(&["a", "a", "b"]);
        let right = Index::from_strs(&["a", "c"]);
        let plan = align(&left, &right, AlignMode::Outer);
        assert_eq!(plan.index, Index::from_strs(&["a", "a", "b", "c"]));
        assert_eq!(plan.left_positions, vec![Some(0), Some(1), Some(2), None]);
        assert_eq!(plan.right_positions, vec![Some(0), Some(0), None, Some(1)]);
    }

    #[test]
    fn inner_and_right_alignment() {
        let left = Index::from_i64(vec![1, 2, 3]);
        let right = Index::from_i64(vec![3, 4, 1]);

        let inner = align(&left, &right, AlignMode::Inner);
        assert_eq!(inner.index, Index::from_i64(vec![1, 3]));
        assert_eq!(inner.right_positions, vec![Some(2), Some(0)]);

        let right_plan = align(&left, &right, AlignMode::Right);
        assert_eq!(right_plan.index, right);
        assert_eq!(right_plan.left_positions, vec![Some(2), None, Some(0)]);
    }

    #[test]
    fn concat_and_union() {
        let a = Index::from_strs(&["a", "b"]);
        let b = Index::from_strs(&["b", "c"]);
        assert_eq!(Index::concat(&[&a, &b]).len(), 4);
        assert_eq!(a.union_with(&b), Index::from_strs(&["a", "b", "c"]));
        assert_eq!(a.appended("z".into()).labels().last(), Some(&IndexLabel::from("z")));
    }

    #[test]
    fn label_kinds_never_collide() {
        let labels = Index::new(vec![
            IndexLabel::from(1_i64),
            IndexLabel::from("1"),
            IndexLabel::from(1.0),
            IndexLabel::from(true),
            IndexLabel::from("True"),
            IndexLabel::Datetime64(1),
            IndexLabel::Timedelta64(1),
            IndexLabel::Null,
            IndexLabel::from("NaN"),
        ]);
        assert!(labels.is_unique());
        assert_eq!(IndexLabel::from(f64::NAN), IndexLabel::Null);
        assert_eq!(IndexLabel::from(-0.0), IndexLabel::from(0.0));
        assert_eq!(FloatLabel::new(f64::NAN), None);

        let shown: Vec<String> = labels.labels()[2..8].iter().map(ToString::to_string).collect();
        assert_eq!(
            shown,
            ["1.0", "True", "True", "datetime64(1ns)", "timedelta64(1ns)", "NaN"]
        );
    }

    #[test]
    fn labels_serialize_with_their_kind() {
        let json = serde_json::to_string(&vec![IndexLabel::from(2.5), IndexLabel::Bool(false), IndexLabel::Null])
            .expect("serialize");
        assert_eq!(
            json,
            r#"[{"kind":"float64","value":2.5},{"kind":"bool","value":false},{"kind":"null"}]"#
        );
        let back: Vec<IndexLabel> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back[0], IndexLabel::from(2.5));
    }
}

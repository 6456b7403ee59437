#![forbid(unsafe_code)]

//! Group-by reductions over a `Series` keyed by another `Series`, and over
//! the columns of a `DataFrame` keyed by one of its columns.
//!
//! Group labels become the output index, so a result is duplicate-free by
//! construction; it still goes through the duplicate-label guard with the
//! flags of every input.

use std::collections::HashMap;

use bumpalo::{Bump, collections::Vec as BumpVec};
use thiserror::Error;
use tracing::debug;
use xf_array::{ArrayBox, ArrayError, DenseArray, ExtensionArray};
use xf_frame::{DataFrame, FrameError, Series, finalize_with_policy};
use xf_index::{AlignMode, FloatLabel, Index, IndexError, IndexLabel};
use xf_runtime::{DEFAULT_JOIN_ARENA_BUDGET_BYTES, GuardLedger, RuntimePolicy};
use xf_types::{
    Scalar, TypeError, nancount, nanfirst, nanlast, nanmax, nanmean, nanmedian, nanmin, nanstd, nansum, nanvar,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupByOptions {
    /// Drop rows whose key is missing.
    pub dropna: bool,
    /// Order groups by key; otherwise groups keep first-seen order.
    pub sort: bool,
}

impl Default for GroupByOptions {
    fn default() -> Self {
        Self {
            dropna: true,
            sort: true,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GroupByError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Array(#[from] ArrayError),
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error("group key column {0} not found")]
    MissingKey(IndexLabel),
}

/// Reduction applied to each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Sum,
    Mean,
    Count,
    Min,
    Max,
    First,
    Last,
    Std,
    Var,
    Median,
}

impl AggFunc {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Count => "count",
            Self::Min => "min",
            Self::Max => "max",
            Self::First => "first",
            Self::Last => "last",
            Self::Std => "std",
            Self::Var => "var",
            Self::Median => "median",
        }
    }

    /// Count accepts any column; the rest need numeric values.
    fn accepts_any_dtype(self) -> bool {
        self == Self::Count
    }

    /// Reduce the present values of one group. Sum, min and max stay
    /// `int64` over integer groups; first and last return the value as is.
    fn apply(self, vals: &[Scalar]) -> Result<Scalar, TypeError> {
        match self {
            Self::Count => Ok(nancount(vals)),
            Self::Sum => nansum(vals),
            Self::Mean => nanmean(vals),
            Self::Min => nanmin(vals),
            Self::Max => nanmax(vals),
            Self::First => Ok(nanfirst(vals)),
            Self::Last => Ok(nanlast(vals)),
            Self::Std => nanstd(vals, 1),
            Self::Var => nanvar(vals, 1),
            Self::Median => nanmedian(vals),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupByExecutionOptions {
    pub use_arena: bool,
    pub arena_budget_bytes: usize,
}

impl Default for GroupByExecutionOptions {
    fn default() -> Self {
        Self {
            use_arena: true,
            arena_budget_bytes: DEFAULT_JOIN_ARENA_BUDGET_BYTES,
        }
    }
}

impl From<&RuntimePolicy> for GroupByExecutionOptions {
    fn from(policy: &RuntimePolicy) -> Self {
        Self {
            use_arena: true,
            arena_budget_bytes: policy.join_arena_budget_bytes,
        }
    }
}

// ── Keys ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
enum GroupKeyRef<'a> {
    Bool(bool),
    Int64(i64),
    /// Non-NaN float, `-0.0` folded into `0.0`.
    FloatBits(u64),
    Utf8(&'a str),
    Datetime64(i64),
    Timedelta64(i64),
    Missing,
}

impl<'a> GroupKeyRef<'a> {
    fn from_scalar(key: &'a Scalar) -> Self {
        match key {
            Scalar::Bool(v) => Self::Bool(*v),
            Scalar::Int64(v) => Self::Int64(*v),
            Scalar::Float64(v) => FloatLabel::new(*v).map_or(Self::Missing, |f| Self::FloatBits(f.get().to_bits())),
            Scalar::Utf8(v) => Self::Utf8(v.as_str()),
            Scalar::Datetime64(v) => Self::Datetime64(*v),
            Scalar::Timedelta64(v) => Self::Timedelta64(*v),
            Scalar::Null(_) => Self::Missing,
        }
    }

    fn label(self) -> IndexLabel {
        match self {
            Self::Bool(v) => IndexLabel::Bool(v),
            Self::Int64(v) => IndexLabel::Int64(v),
            Self::FloatBits(bits) => IndexLabel::from(f64::from_bits(bits)),
            Self::Utf8(v) => IndexLabel::Utf8(v.to_owned()),
            Self::Datetime64(v) => IndexLabel::Datetime64(v),
            Self::Timedelta64(v) => IndexLabel::Timedelta64(v),
            Self::Missing => IndexLabel::Null,
        }
    }
}

/// Row positions of each group, in output order.
struct Grouping {
    labels: Vec<IndexLabel>,
    members: Vec<Vec<usize>>,
}

fn estimate_intermediate_bytes(rows: usize) -> usize {
    rows.saturating_mul(size_of::<GroupKeyRef<'_>>().saturating_add(size_of::<usize>()))
}

/// Assign each row to a group, pushing every new key to `ordering`. Returns
/// the member rows of each group in first-seen order.
fn scan_keys<'k>(
    keys: &'k [Scalar],
    dropna: bool,
    ordering: &mut impl Extend<GroupKeyRef<'k>>,
) -> Vec<Vec<usize>> {
    let mut slot = HashMap::<GroupKeyRef<'k>, usize>::new();
    let mut members: Vec<Vec<usize>> = Vec::new();
    for (pos, key) in keys.iter().enumerate() {
        let key_id = GroupKeyRef::from_scalar(key);
        if dropna && key_id == GroupKeyRef::Missing {
            continue;
        }
        let group = *slot.entry(key_id).or_insert_with(|| {
            ordering.extend(std::iter::once(key_id));
            members.push(Vec::new());
            members.len() - 1
        });
        members[group].push(pos);
    }
    members
}

fn group_rows(keys: &[Scalar], options: GroupByOptions, exec: GroupByExecutionOptions) -> Grouping {
    let estimated = estimate_intermediate_bytes(keys.len());
    let use_arena = exec.use_arena && estimated <= exec.arena_budget_bytes;
    debug!(rows = keys.len(), estimated, use_arena, "grouping rows");

    let (mut order, members): (Vec<(GroupKeyRef<'_>, usize)>, _) = if use_arena {
        let arena = Bump::new();
        let mut ordering = BumpVec::<GroupKeyRef<'_>>::new_in(&arena);
        let members = scan_keys(keys, options.dropna, &mut ordering);
        (ordering.iter().copied().zip(0..).collect(), members)
    } else {
        let mut ordering = Vec::<GroupKeyRef<'_>>::new();
        let members = scan_keys(keys, options.dropna, &mut ordering);
        (ordering.into_iter().zip(0..).collect(), members)
    };

    if options.sort {
        order.sort_by(|(a, _), (b, _)| compare_keys(a, b));
    }
    let mut taken: Vec<Option<Vec<usize>>> = members.into_iter().map(Some).collect();
    let (labels, members) = order
        .into_iter()
        .map(|(key, group)| (key.label(), taken[group].take().unwrap_or_default()))
        .unzip();
    Grouping { labels, members }
}

/// Numbers before strings, missing last.
fn compare_keys(a: &GroupKeyRef<'_>, b: &GroupKeyRef<'_>) -> std::cmp::Ordering {
    fn rank(key: &GroupKeyRef<'_>) -> (u8, f64) {
        match key {
            GroupKeyRef::Bool(v) => (0, f64::from(u8::from(*v))),
            GroupKeyRef::Int64(v) | GroupKeyRef::Datetime64(v) | GroupKeyRef::Timedelta64(v) => (0, *v as f64),
            GroupKeyRef::FloatBits(bits) => (0, f64::from_bits(*bits)),
            GroupKeyRef::Utf8(_) => (1, 0.0),
            GroupKeyRef::Missing => (2, 0.0),
        }
    }
    let (ra, va) = rank(a);
    let (rb, vb) = rank(b);
    ra.cmp(&rb).then_with(|| match (a, b) {
        (GroupKeyRef::Utf8(x), GroupKeyRef::Utf8(y)) => x.cmp(y),
        _ => va.total_cmp(&vb),
    })
}

// ── Reduction ─────────────────────────────────────────────────────────

fn reduce_array(
    array: &dyn ExtensionArray,
    grouping: &Grouping,
    func: AggFunc,
) -> Result<ArrayBox, GroupByError> {
    let values = array.to_scalars();
    let mut out = Vec::with_capacity(grouping.members.len());
    let mut group = Vec::new();
    for rows in &grouping.members {
        group.clear();
        group.extend(rows.iter().map(|&row| values[row].clone()));
        out.push(func.apply(&group)?);
    }
    Ok(Box::new(DenseArray::from_values(out)?))
}

// ── Series ────────────────────────────────────────────────────────────

/// Reduce `values` within groups formed by `keys`. Both are aligned on their
/// index first (outer join) when they differ. The result is named after the
/// reduction.
pub fn groupby_agg(
    keys: &Series,
    values: &Series,
    func: AggFunc,
    options: GroupByOptions,
) -> Result<Series, GroupByError> {
    let mut ledger = GuardLedger::new();
    groupby_agg_with_policy(keys, values, func, options, &RuntimePolicy::default(), &mut ledger)
}

pub fn groupby_agg_with_policy(
    keys: &Series,
    values: &Series,
    func: AggFunc,
    options: GroupByOptions,
    policy: &RuntimePolicy,
    ledger: &mut GuardLedger,
) -> Result<Series, GroupByError> {
    let aligned;
    let (keys_in, values_in) = if keys.index() == values.index() {
        (keys, values)
    } else {
        aligned = keys.align_with_policy(values, AlignMode::Outer, policy, ledger)?;
        (&aligned.0, &aligned.1)
    };

    if !func.accepts_any_dtype() && !values_in.dtype().is_numeric() {
        return Err(FrameError::Unsupported(format!(
            "groupby {} needs numeric values, got {}",
            func.name(),
            values_in.dtype()
        ))
        .into());
    }

    let grouping = group_rows(&keys_in.values(), options, GroupByExecutionOptions::from(policy));
    let reduced = reduce_array(values_in.array(), &grouping, func)?;
    let out = Series::new(func.name(), Index::new(grouping.labels), reduced)?;
    let operation = format!("groupby.{}", func.name());
    Ok(finalize_with_policy(
        out,
        &[keys.flags(), values.flags()],
        &operation,
        policy,
        ledger,
    )?)
}

pub fn groupby_sum(keys: &Series, values: &Series, options: GroupByOptions) -> Result<Series, GroupByError> {
    groupby_agg(keys, values, AggFunc::Sum, options)
}

pub fn groupby_mean(keys: &Series, values: &Series, options: GroupByOptions) -> Result<Series, GroupByError> {
    groupby_agg(keys, values, AggFunc::Mean, options)
}

pub fn groupby_count(keys: &Series, values: &Series, options: GroupByOptions) -> Result<Series, GroupByError> {
    groupby_agg(keys, values, AggFunc::Count, options)
}

pub fn groupby_min(keys: &Series, values: &Series, options: GroupByOptions) -> Result<Series, GroupByError> {
    groupby_agg(keys, values, AggFunc::Min, options)
}

pub fn groupby_max(keys: &Series, values: &Series, options: GroupByOptions) -> Result<Series, GroupByError> {
    groupby_agg(keys, values, AggFunc::Max, options)
}

// ── DataFrame ─────────────────────────────────────────────────────────

/// Group the rows of `frame` by the column `by` and reduce every other
/// column. Columns the reduction cannot handle are left out, as pandas does
/// with `numeric_only`.
pub fn groupby_frame(
    frame: &DataFrame,
    by: &IndexLabel,
    func: AggFunc,
    options: GroupByOptions,
) -> Result<DataFrame, GroupByError> {
    let mut ledger = GuardLedger::new();
    groupby_frame_with_policy(frame, by, func, options, &RuntimePolicy::default(), &mut ledger)
}

pub fn groupby_frame_with_policy(
    frame: &DataFrame,
    by: &IndexLabel,
    func: AggFunc,
    options: GroupByOptions,
    policy: &RuntimePolicy,
    ledger: &mut GuardLedger,
) -> Result<DataFrame, GroupByError> {
    let key_pos = frame
        .columns()
        .position(by)
        .ok_or_else(|| GroupByError::MissingKey(by.clone()))?;
    let keys = frame
        .column_array(key_pos)
        .ok_or_else(|| GroupByError::MissingKey(by.clone()))?
        .to_scalars();
    let grouping = group_rows(&keys, options, GroupByExecutionOptions::from(policy));

    let mut labels = Vec::new();
    let mut data = Vec::new();
    for (pos, label) in frame.columns().labels().iter().enumerate() {
        if pos == key_pos {
            continue;
        }
        let Some(array) = frame.column_array(pos) else {
            continue;
        };
        if !func.accepts_any_dtype() && !array.dtype().is_numeric() {
            continue;
        }
        labels.push(label.clone());
        data.push(reduce_array(array, &grouping, func)?);
    }

    let out = DataFrame::new(Index::new(grouping.labels), Index::new(labels), data)?;
    let operation = format!("groupby.{}", func.name());
    Ok(finalize_with_policy(out, &[frame.flags()], &operation, policy, ledger)?)
}

#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Physical storage class of a single scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Null,
    Bool,
    Int64,
    Float64,
    Utf8,
    Datetime64,
    Timedelta64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullKind {
    Null,
    NaN,
    NaT,
}

/// A single cell value. Datetimes and timedeltas are nanosecond counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Null(NullKind),
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Datetime64(i64),
    Timedelta64(i64),
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float64(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl From<Option<&str>> for Scalar {
    fn from(value: Option<&str>) -> Self {
        match value {
            Some(v) => Self::Utf8(v.to_owned()),
            None => Self::Null(NullKind::Null),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null(NullKind::Null) => write!(f, "<NA>"),
            Self::Null(NullKind::NaN) => write!(f, "nan"),
            Self::Null(NullKind::NaT) => write!(f, "NaT"),
            Self::Bool(v) => write!(f, "{}", if *v { "True" } else { "False" }),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) if v.is_nan() => write!(f, "nan"),
            Self::Float64(v) => write!(f, "{v:?}"),
            Self::Utf8(v) => write!(f, "'{v}'"),
            Self::Datetime64(v) => write!(f, "datetime64({v}ns)"),
            Self::Timedelta64(v) => write!(f, "timedelta64({v}ns)"),
        }
    }
}

impl Scalar {
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Null(_) => DType::Null,
            Self::Bool(_) => DType::Bool,
            Self::Int64(_) => DType::Int64,
            Self::Float64(_) => DType::Float64,
            Self::Utf8(_) => DType::Utf8,
            Self::Datetime64(_) => DType::Datetime64,
            Self::Timedelta64(_) => DType::Timedelta64,
        }
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null(_) => true,
            Self::Float64(v) => v.is_nan(),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_nan(&self) -> bool {
        matches!(self, Self::Null(NullKind::NaN)) || matches!(self, Self::Float64(v) if v.is_nan())
    }

    #[must_use]
    pub fn missing_for_dtype(dtype: DType) -> Self {
        match dtype {
            DType::Float64 => Self::Null(NullKind::NaN),
            DType::Datetime64 | DType::Timedelta64 => Self::Null(NullKind::NaT),
            DType::Null | DType::Bool | DType::Int64 | DType::Utf8 => Self::Null(NullKind::Null),
        }
    }

    /// Equality where NaN matches NaN. Other missing kinds compare by kind.
    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float64(a), Self::Float64(b)) => (a.is_nan() && b.is_nan()) || (a == b),
            (Self::Null(NullKind::NaN), Self::Float64(v))
            | (Self::Float64(v), Self::Null(NullKind::NaN)) => v.is_nan(),
            _ => self == other,
        }
    }

    /// Equality used for fill values: every missing marker matches every
    /// other one, and integers compare equal to floats of the same value.
    #[must_use]
    pub fn na_aware_eq(&self, other: &Self) -> bool {
        match (self.is_missing(), other.is_missing()) {
            (true, true) => true,
            (true, false) | (false, true) => false,
            (false, false) => match (self, other) {
                (Self::Int64(a), Self::Float64(b)) | (Self::Float64(b), Self::Int64(a)) => {
                    (*a as f64) == *b
                }
                _ => self.semantic_eq(other),
            },
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }

    pub fn to_f64(&self) -> Result<f64, TypeError> {
        match self {
            Self::Bool(v) => Ok(if *v { 1.0 } else { 0.0 }),
            Self::Int64(v) => Ok(*v as f64),
            Self::Float64(v) => Ok(*v),
            Self::Null(kind) => Err(TypeError::ValueIsMissing { kind: *kind }),
            Self::Utf8(v) => Err(TypeError::NonNumericValue {
                value: v.clone(),
                dtype: DType::Utf8,
            }),
            Self::Datetime64(v) | Self::Timedelta64(v) => Err(TypeError::NonNumericValue {
                value: v.to_string(),
                dtype: self.dtype(),
            }),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    #[error("dtype coercion from {left:?} to {right:?} has no compatible common type")]
    IncompatibleDtypes { left: DType, right: DType },
    #[error("cannot cast scalar of dtype {from:?} to {to:?}")]
    InvalidCast { from: DType, to: DType },
    #[error("cannot cast float {value} to int64 without loss")]
    LossyFloatToInt { value: f64 },
    #[error("expected 0/1 for bool cast from int64 but found {value}")]
    InvalidBoolInt { value: i64 },
    #[error("expected 0.0/1.0 for bool cast from float64 but found {value}")]
    InvalidBoolFloat { value: f64 },
    #[error("value {value:?} has non-numeric dtype {dtype:?}")]
    NonNumericValue { value: String, dtype: DType },
    #[error("value is missing ({kind:?})")]
    ValueIsMissing { kind: NullKind },
    #[error("cannot store value {value} in a {target} array; {reason}")]
    InvalidValue {
        value: String,
        target: String,
        reason: String,
    },
    #[error("cannot construct a dtype from '{input}'")]
    UnparseableDtype { input: String },
    #[error("operation '{op}' is not supported for dtype {dtype}")]
    UnsupportedOperation { op: String, dtype: String },
}

impl TypeError {
    /// Rejection of `value` by a container of type `target`.
    #[must_use]
    pub fn invalid_value(value: &Scalar, target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            value: value.to_string(),
            target: target.into(),
            reason: reason.into(),
        }
    }
}

pub fn common_dtype(left: DType, right: DType) -> Result<DType, TypeError> {
    use DType::{Bool, Float64, Int64, Null};

    let out = match (left, right) {
        (a, b) if a == b => a,
        (Null, other) | (other, Null) => other,
        (Bool, Int64) | (Int64, Bool) => Int64,
        (Bool, Float64) | (Float64, Bool) => Float64,
        (Int64, Float64) | (Float64, Int64) => Float64,
        _ => return Err(TypeError::IncompatibleDtypes { left, right }),
    };

    Ok(out)
}

pub fn infer_dtype(values: &[Scalar]) -> Result<DType, TypeError> {
    let mut current = DType::Null;
    for value in values {
        current = common_dtype(current, value.dtype())?;
    }
    Ok(current)
}

/// Cast a scalar to a target dtype, taking ownership so values that already
/// have the target dtype are returned without cloning.
pub fn cast_scalar_owned(value: Scalar, target: DType) -> Result<Scalar, TypeError> {
    let from = value.dtype();
    if matches!(value, Scalar::Null(_)) {
        return Ok(Scalar::missing_for_dtype(target));
    }
    if from == target {
        return Ok(value);
    }

    match target {
        DType::Null => Ok(Scalar::Null(NullKind::Null)),
        DType::Bool => match &value {
            Scalar::Int64(v) => match *v {
                0 => Ok(Scalar::Bool(false)),
                1 => Ok(Scalar::Bool(true)),
                _ => Err(TypeError::InvalidBoolInt { value: *v }),
            },
            Scalar::Float64(v) => {
                if *v == 0.0 {
                    Ok(Scalar::Bool(false))
                } else if *v == 1.0 {
                    Ok(Scalar::Bool(true))
                } else {
                    Err(TypeError::InvalidBoolFloat { value: *v })
                }
            }
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        DType::Int64 => match &value {
            Scalar::Bool(v) => Ok(Scalar::Int64(i64::from(*v))),
            Scalar::Float64(v) => {
                if !v.is_finite() || *v != v.trunc() {
                    return Err(TypeError::LossyFloatToInt { value: *v });
                }
                if *v < i64::MIN as f64 || *v > i64::MAX as f64 {
                    return Err(TypeError::LossyFloatToInt { value: *v });
                }
                Ok(Scalar::Int64(*v as i64))
            }
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        DType::Float64 => match &value {
            Scalar::Bool(v) => Ok(Scalar::Float64(if *v { 1.0 } else { 0.0 })),
            Scalar::Int64(v) => Ok(Scalar::Float64(*v as f64)),
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        DType::Datetime64 => match &value {
            Scalar::Int64(v) => Ok(Scalar::Datetime64(*v)),
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        DType::Timedelta64 => match &value {
            Scalar::Int64(v) => Ok(Scalar::Timedelta64(*v)),
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        DType::Utf8 => Err(TypeError::InvalidCast { from, to: target }),
    }
}

pub fn cast_scalar(value: &Scalar, target: DType) -> Result<Scalar, TypeError> {
    cast_scalar_owned(value.clone(), target)
}

// ── Nanops: null-skipping numeric reductions ───────────────────────────
//
// The `float_*` kernels work on already-filtered floats and return `None`
// when the result is undefined. The scalar `nan*` wrappers skip missing
// values and keep `int64` results when every present value is `int64`.

#[must_use]
pub fn float_mean(nums: &[f64]) -> Option<f64> {
    (!nums.is_empty()).then(|| nums.iter().sum::<f64>() / nums.len() as f64)
}

/// Variance with `ddof` delta degrees of freedom.
#[must_use]
pub fn float_var(nums: &[f64], ddof: usize) -> Option<f64> {
    if nums.len() <= ddof {
        return None;
    }
    let mean = float_mean(nums)?;
    let sum_sq: f64 = nums.iter().map(|x| (x - mean).powi(2)).sum();
    Some(sum_sq / (nums.len() - ddof) as f64)
}

#[must_use]
pub fn float_min(nums: &[f64]) -> Option<f64> {
    nums.iter().copied().reduce(f64::min)
}

#[must_use]
pub fn float_max(nums: &[f64]) -> Option<f64> {
    nums.iter().copied().reduce(f64::max)
}

#[must_use]
pub fn float_median(nums: &[f64]) -> Option<f64> {
    if nums.is_empty() {
        return None;
    }
    let mut sorted = nums.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len().is_multiple_of(2) {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

fn present(values: &[Scalar]) -> impl Iterator<Item = &Scalar> {
    values.iter().filter(|v| !v.is_missing())
}

fn present_f64(values: &[Scalar]) -> Result<Vec<f64>, TypeError> {
    present(values).map(Scalar::to_f64).collect()
}

/// Integer payloads, when at least one value is present and all are `int64`.
fn present_i64(values: &[Scalar]) -> Option<Vec<i64>> {
    let ints: Option<Vec<i64>> = present(values)
        .map(|v| match v {
            Scalar::Int64(i) => Some(*i),
            _ => None,
        })
        .collect();
    ints.filter(|v| !v.is_empty())
}

fn float_or_nan(value: Option<f64>) -> Scalar {
    value.map_or(Scalar::Null(NullKind::NaN), Scalar::Float64)
}

/// Sum of present values; `0.0` when none are present. Integer sums wrap
/// like numpy's.
pub fn nansum(values: &[Scalar]) -> Result<Scalar, TypeError> {
    if let Some(ints) = present_i64(values) {
        return Ok(Scalar::Int64(ints.into_iter().fold(0_i64, i64::wrapping_add)));
    }
    Ok(Scalar::Float64(present_f64(values)?.iter().sum()))
}

pub fn nanmean(values: &[Scalar]) -> Result<Scalar, TypeError> {
    Ok(float_or_nan(float_mean(&present_f64(values)?)))
}

#[must_use]
pub fn nancount(values: &[Scalar]) -> Scalar {
    Scalar::Int64(present(values).count() as i64)
}

pub fn nanmin(values: &[Scalar]) -> Result<Scalar, TypeError> {
    if let Some(ints) = present_i64(values) {
        return Ok(ints.into_iter().min().map_or(Scalar::Null(NullKind::NaN), Scalar::Int64));
    }
    Ok(float_or_nan(float_min(&present_f64(values)?)))
}

pub fn nanmax(values: &[Scalar]) -> Result<Scalar, TypeError> {
    if let Some(ints) = present_i64(values) {
        return Ok(ints.into_iter().max().map_or(Scalar::Null(NullKind::NaN), Scalar::Int64));
    }
    Ok(float_or_nan(float_max(&present_f64(values)?)))
}

/// First present value, unchanged.
#[must_use]
pub fn nanfirst(values: &[Scalar]) -> Scalar {
    present(values).next().cloned().unwrap_or(Scalar::Null(NullKind::NaN))
}

/// Last present value, unchanged.
#[must_use]
pub fn nanlast(values: &[Scalar]) -> Scalar {
    present(values).last().cloned().unwrap_or(Scalar::Null(NullKind::NaN))
}

pub fn nanvar(values: &[Scalar], ddof: usize) -> Result<Scalar, TypeError> {
    Ok(float_or_nan(float_var(&present_f64(values)?, ddof)))
}

pub fn nanstd(values: &[Scalar], ddof: usize) -> Result<Scalar, TypeError> {
    Ok(float_or_nan(float_var(&present_f64(values)?, ddof).map(f64::sqrt)))
}

pub fn nanmedian(values: &[Scalar]) -> Result<Scalar, TypeError> {
    Ok(float_or_nan(float_median(&present_f64(values)?)))
}

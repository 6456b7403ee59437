//! Assignment engine shared by every extension array.
//!
//! `setitem` runs in three phases: resolve the locator to positions, expand
//! the value to one scalar per position, then validate everything before the
//! first write. Nothing is written unless every value validates.

use std::fmt;

use xf_types::Scalar;

use crate::{ArrayBox, ArrayError, ExtensionArray};

/// Python-style slice bounds. Negative bounds count from the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SliceSpec {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl SliceSpec {
    #[must_use]
    pub fn new(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Self {
        Self { start, stop, step }
    }

    #[must_use]
    pub fn full() -> Self {
        Self::default()
    }

    /// Positions selected from a container of length `len`.
    pub fn indices(&self, len: usize) -> Result<Vec<usize>, ArrayError> {
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(ArrayError::ZeroSliceStep);
        }
        let n = i64::try_from(len).unwrap_or(i64::MAX);

        let clamp = |bound: i64, lower: i64, upper: i64| {
            let adjusted = if bound < 0 { bound + n } else { bound };
            adjusted.clamp(lower, upper)
        };

        let mut out = Vec::new();
        if step > 0 {
            let start = self.start.map_or(0, |s| clamp(s, 0, n));
            let stop = self.stop.map_or(n, |s| clamp(s, 0, n));
            let mut i = start;
            while i < stop {
                out.push(i as usize);
                i += step;
            }
        } else {
            let start = self.start.map_or(n - 1, |s| clamp(s, -1, n - 1));
            let stop = self.stop.map_or(-1, |s| clamp(s, -1, n - 1));
            let mut i = start;
            while i > stop {
                out.push(i as usize);
                i += step;
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexerKind {
    ListLike,
    Slice,
}

impl fmt::Display for IndexerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ListLike => f.write_str("list-like"),
            Self::Slice => f.write_str("slice"),
        }
    }
}

/// Which positions of a container an assignment targets.
pub enum Locator<'a> {
    Position(i64),
    Positions(Vec<i64>),
    Mask(Vec<bool>),
    /// Evaluated exactly once against the current values.
    MaskFn(Box<dyn FnOnce(&[Scalar]) -> Vec<bool> + 'a>),
    Slice(SliceSpec),
}

impl fmt::Debug for Locator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Position(p) => f.debug_tuple("Position").field(p).finish(),
            Self::Positions(p) => f.debug_tuple("Positions").field(p).finish(),
            Self::Mask(m) => f.debug_tuple("Mask").field(m).finish(),
            Self::MaskFn(_) => f.write_str("MaskFn(..)"),
            Self::Slice(s) => f.debug_tuple("Slice").field(s).finish(),
        }
    }
}

impl From<i64> for Locator<'_> {
    fn from(value: i64) -> Self {
        Self::Position(value)
    }
}

impl From<Vec<i64>> for Locator<'_> {
    fn from(value: Vec<i64>) -> Self {
        Self::Positions(value)
    }
}

impl From<Vec<bool>> for Locator<'_> {
    fn from(value: Vec<bool>) -> Self {
        Self::Mask(value)
    }
}

impl From<SliceSpec> for Locator<'_> {
    fn from(value: SliceSpec) -> Self {
        Self::Slice(value)
    }
}

/// Right-hand side of an assignment.
#[derive(Debug, Clone)]
pub enum SetValue {
    Scalar(Scalar),
    Sequence(Vec<Scalar>),
    Array(ArrayBox),
}

impl SetValue {
    fn into_scalars(self) -> Vec<Scalar> {
        match self {
            Self::Scalar(v) => vec![v],
            Self::Sequence(v) => v,
            Self::Array(a) => a.to_scalars(),
        }
    }
}

impl From<Scalar> for SetValue {
    fn from(value: Scalar) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<Scalar>> for SetValue {
    fn from(value: Vec<Scalar>) -> Self {
        Self::Sequence(value)
    }
}

impl From<ArrayBox> for SetValue {
    fn from(value: ArrayBox) -> Self {
        Self::Array(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Single,
    ListLike,
    Slice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTargets {
    pub positions: Vec<usize>,
    pub kind: TargetKind,
}

fn normalize_position(position: i64, len: usize) -> Result<usize, ArrayError> {
    let n = i64::try_from(len).unwrap_or(i64::MAX);
    let adjusted = if position < 0 { position + n } else { position };
    if adjusted < 0 || adjusted >= n {
        return Err(ArrayError::OutOfBounds { position, len });
    }
    Ok(adjusted as usize)
}

fn mask_positions(mask: &[bool], len: usize) -> Result<Vec<usize>, ArrayError> {
    if mask.len() != len {
        return Err(ArrayError::MaskLengthMismatch {
            mask: mask.len(),
            len,
        });
    }
    Ok(mask
        .iter()
        .enumerate()
        .filter_map(|(idx, keep)| keep.then_some(idx))
        .collect())
}

pub fn resolve_locator<A: ExtensionArray + ?Sized>(
    array: &A,
    locator: Locator<'_>,
) -> Result<ResolvedTargets, ArrayError> {
    let len = array.len();
    let resolved = match locator {
        Locator::Position(p) => ResolvedTargets {
            positions: vec![normalize_position(p, len)?],
            kind: TargetKind::Single,
        },
        Locator::Positions(ps) => ResolvedTargets {
            positions: ps
                .into_iter()
                .map(|p| normalize_position(p, len))
                .collect::<Result<_, _>>()?,
            kind: TargetKind::ListLike,
        },
        Locator::Mask(mask) => ResolvedTargets {
            positions: mask_positions(&mask, len)?,
            kind: TargetKind::ListLike,
        },
        Locator::MaskFn(f) => {
            let mask = f(&array.to_scalars());
            ResolvedTargets {
                positions: mask_positions(&mask, len)?,
                kind: TargetKind::ListLike,
            }
        }
        Locator::Slice(spec) => ResolvedTargets {
            positions: spec.indices(len)?,
            kind: TargetKind::Slice,
        },
    };
    Ok(resolved)
}

/// One value per target: scalars broadcast, sequences must match in length.
pub fn expand_values(targets: &ResolvedTargets, value: SetValue) -> Result<Vec<Scalar>, ArrayError> {
    let count = targets.positions.len();
    match value {
        SetValue::Scalar(v) => Ok(vec![v; count]),
        other => {
            let values = other.into_scalars();
            match targets.kind {
                TargetKind::Single if values.len() == 1 => Ok(values),
                TargetKind::Single => Err(ArrayError::SequenceIntoScalar { len: values.len() }),
                TargetKind::ListLike | TargetKind::Slice if values.len() == count => Ok(values),
                TargetKind::ListLike => Err(ArrayError::SetLengthMismatch {
                    kind: IndexerKind::ListLike,
                    targets: count,
                    values: values.len(),
                }),
                TargetKind::Slice => Err(ArrayError::SetLengthMismatch {
                    kind: IndexerKind::Slice,
                    targets: count,
                    values: values.len(),
                }),
            }
        }
    }
}

/// Validate all `values` against `array`, then write them at `positions`.
pub fn assign<A: ExtensionArray + ?Sized>(
    array: &mut A,
    positions: &[usize],
    values: &[Scalar],
) -> Result<(), ArrayError> {
    if positions.len() != values.len() {
        return Err(ArrayError::LengthMismatch {
            left: positions.len(),
            right: values.len(),
        });
    }
    let validated = values
        .iter()
        .map(|v| array.validate_scalar(v))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::trace!(
        dtype = %array.dtype(),
        targets = positions.len(),
        "assigning validated values"
    );
    for (&position, value) in positions.iter().zip(validated) {
        array.put(position, value);
    }
    Ok(())
}

pub fn setitem<A: ExtensionArray + ?Sized>(
    array: &mut A,
    locator: Locator<'_>,
    value: SetValue,
) -> Result<(), ArrayError> {
    let targets = resolve_locator(array, locator)?;
    let values = expand_values(&targets, value)?;
    assign(array, &targets.positions, &values)
}

#![forbid(unsafe_code)]

//! Extension arrays: the storage-agnostic value container contract and its
//! dense, nullable-string and sparse backends.
//!
//! Every container implements [`ExtensionArray`]. Writes go through
//! [`setitem`], which resolves a [`Locator`] into target positions, expands a
//! [`SetValue`] to one value per target, validates every value against the
//! container and only then writes. A failed validation leaves the container
//! untouched.

use std::any::Any;
use std::fmt;

use thiserror::Error;
use xf_dtype::Dtype;
use xf_types::{Scalar, TypeError};

mod dense;
mod mask;
mod setitem;
mod sparse;
mod string;

pub use dense::{ArithmeticOp, DenseArray};
pub use mask::ValidityMask;
pub use setitem::{
    IndexerKind, Locator, ResolvedTargets, SetValue, SliceSpec, TargetKind, assign,
    expand_values, resolve_locator, setitem,
};
pub use sparse::SparseArray;
pub use string::StringArray;

pub type ArrayBox = Box<dyn ExtensionArray>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ArrayError {
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error(
        "cannot set using a {kind} indexer with a different length than the value \
         (indexer selects {targets}, value has {values})"
    )]
    SetLengthMismatch {
        kind: IndexerKind,
        targets: usize,
        values: usize,
    },
    #[error("boolean mask of length {mask} does not match array length {len}")]
    MaskLengthMismatch { mask: usize, len: usize },
    #[error("position {position} is out of bounds for length {len}")]
    OutOfBounds { position: i64, len: usize },
    #[error("slice step cannot be zero")]
    ZeroSliceStep,
    #[error("setting an array element with a sequence of length {len}")]
    SequenceIntoScalar { len: usize },
    #[error("array length mismatch: left={left}, right={right}")]
    LengthMismatch { left: usize, right: usize },
}

/// Contract every value container satisfies, whatever its storage.
///
/// Implementations own their storage exclusively. `validate_scalar` must not
/// mutate; `put` must only be called with values `validate_scalar` returned.
pub trait ExtensionArray: fmt::Debug {
    fn dtype(&self) -> Dtype;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `position`; missing slots come back as `Scalar::Null(..)`.
    /// `None` only when `position` is out of bounds.
    fn get(&self, position: usize) -> Option<Scalar>;

    fn is_missing(&self, position: usize) -> bool {
        self.get(position).is_some_and(|v| v.is_missing())
    }

    /// Check `value` against the container's domain and coerce it to the
    /// representation `put` stores.
    fn validate_scalar(&self, value: &Scalar) -> Result<Scalar, TypeError>;

    fn put(&mut self, position: usize, value: Scalar);

    /// Gather by position; `None` yields a missing slot.
    fn take(&self, positions: &[Option<usize>]) -> ArrayBox;

    /// New container of the same dtype holding `values`.
    fn from_scalars_like(&self, values: Vec<Scalar>) -> Result<ArrayBox, ArrayError>;

    fn clone_box(&self) -> ArrayBox;

    fn as_any(&self) -> &dyn Any;

    /// A widened copy able to hold `values`, for backends that upcast
    /// instead of rejecting. Extension backends never widen.
    fn promote_for(&self, _values: &[Scalar]) -> Option<ArrayBox> {
        None
    }

    fn to_scalars(&self) -> Vec<Scalar> {
        (0..self.len()).filter_map(|i| self.get(i)).collect()
    }

    fn equals(&self, other: &dyn ExtensionArray) -> bool {
        self.dtype() == other.dtype()
            && self.len() == other.len()
            && (0..self.len()).all(|i| match (self.get(i), other.get(i)) {
                (Some(a), Some(b)) => a.na_aware_eq(&b),
                _ => false,
            })
    }

    fn set(&mut self, position: usize, value: &Scalar) -> Result<(), ArrayError> {
        let len = self.len();
        if position >= len {
            return Err(ArrayError::OutOfBounds {
                position: i64::try_from(position).unwrap_or(i64::MAX),
                len,
            });
        }
        let validated = self.validate_scalar(value)?;
        self.put(position, validated);
        Ok(())
    }

    fn set_many(&mut self, locator: Locator<'_>, value: SetValue) -> Result<(), ArrayError> {
        setitem(self, locator, value)
    }

    /// `self` followed by `others`, all of which must share its dtype.
    fn concat_same_type(&self, others: &[&dyn ExtensionArray]) -> Result<ArrayBox, ArrayError> {
        let mut values = self.to_scalars();
        for other in others {
            values.extend(other.to_scalars());
        }
        self.from_scalars_like(values)
    }
}

impl Clone for ArrayBox {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl PartialEq for dyn ExtensionArray {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

// Works around rust-lang/rust#31740: without a second impl, `Box<dyn _> ==
// Box<dyn _>` coerces the right-hand side and fails to borrow-check.
impl PartialEq<&Self> for ArrayBox {
    fn eq(&self, other: &&Self) -> bool {
        self.equals(other.as_ref())
    }
}

/// Build a container for `dtype`, or infer a dense dtype when none is given.
pub fn array_from_sequence(values: Vec<Scalar>, dtype: Option<&Dtype>) -> Result<ArrayBox, ArrayError> {
    let array: ArrayBox = match dtype {
        None => Box::new(DenseArray::from_values(values)?),
        Some(Dtype::Numpy(d)) => Box::new(DenseArray::new(*d, values)?),
        Some(Dtype::String(_)) => Box::new(StringArray::from_sequence(values)?),
        Some(Dtype::Sparse(d)) => Box::new(SparseArray::from_sequence(values, Some(d.clone()))?),
    };
    Ok(array)
}

/// Concatenate containers end to end. Same-dtype inputs keep their dtype;
/// mixed inputs fall back to a dense array of the common dtype.
pub fn concat_arrays(arrays: &[&dyn ExtensionArray]) -> Result<ArrayBox, ArrayError> {
    let Some(first) = arrays.first() else {
        return Ok(Box::new(DenseArray::from_values(Vec::new())?));
    };
    let dtype = first.dtype();
    if arrays.iter().all(|a| a.dtype() == dtype) {
        return first.concat_same_type(&arrays[1..]);
    }

    let total: usize = arrays.iter().map(|a| a.len()).sum();
    let mut values = Vec::with_capacity(total);
    for array in arrays {
        values.extend(array.to_scalars());
    }
    Ok(Box::new(DenseArray::from_values(values)?))
}

/// Container of `len` missing slots with the dtype of `like`.
pub fn missing_like(like: &dyn ExtensionArray, len: usize) -> ArrayBox {
    like.take(&vec![None; len])
}

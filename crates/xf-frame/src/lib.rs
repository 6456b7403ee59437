#![forbid(unsafe_code)]

//! Labelled one- and two-dimensional structures over extension arrays.
//!
//! Every derivation routes its output through [`flags::finalize`], so a
//! structure that disallows duplicate labels can only produce outputs that
//! also disallow them and are checked before they are returned.

mod accessor;
mod arith;
mod concat;
pub mod flags;
mod frame;
mod series;
mod window;

use thiserror::Error;
use xf_array::ArrayError;
use xf_index::{IndexError, IndexLabel};
use xf_types::TypeError;

pub use accessor::StringAccessor;
pub use concat::{ConcatAxis, ConcatItem, concat, concat_series, concat_series_with_policy, concat_with_policy};
pub use flags::{Axis, DuplicateLabelError, Flags, Guarded, check_axis, finalize, finalize_with_policy};
pub use frame::DataFrame;
pub use series::Series;
pub use window::{Ewm, Expanding, Rolling};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameError {
    #[error("index length ({index_len}) does not match values length ({values_len})")]
    LengthMismatch { index_len: usize, values_len: usize },
    #[error("{columns} column labels for {data} columns")]
    ColumnCountMismatch { columns: usize, data: usize },
    #[error(transparent)]
    DuplicateLabel(#[from] DuplicateLabelError),
    #[error(transparent)]
    Array(#[from] ArrayError),
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("column {0} not found")]
    ColumnNotFound(IndexLabel),
    #[error("cannot reindex on an axis with duplicate labels")]
    ReindexDuplicates,
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    #[error("invalid window: {0}")]
    InvalidWindow(String),
}

/// Resolve a possibly negative position against `len`.
pub(crate) fn normalize_position(position: i64, len: usize) -> Result<usize, FrameError> {
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let normalized = if position < 0 { len_i + position } else { position };
    if normalized < 0 || normalized >= len_i {
        return Err(ArrayError::OutOfBounds { position, len }.into());
    }
    usize::try_from(normalized).map_err(|_| ArrayError::OutOfBounds { position, len }.into())
}

fn saturating_i64_to_usize(value: i64) -> usize {
    if value < 0 {
        0
    } else {
        usize::try_from(value).unwrap_or(usize::MAX)
    }
}

fn saturating_i64_abs_to_usize(value: i64) -> usize {
    usize::try_from(value.unsigned_abs()).unwrap_or(usize::MAX)
}

pub(crate) fn normalize_head_take(n: i64, len: usize) -> usize {
    if n >= 0 {
        saturating_i64_to_usize(n).min(len)
    } else {
        len.saturating_sub(saturating_i64_abs_to_usize(n))
    }
}

/// First row kept by `tail(n)`.
pub(crate) fn normalize_tail_start(n: i64, len: usize) -> usize {
    if n >= 0 {
        len - saturating_i64_to_usize(n).min(len)
    } else {
        saturating_i64_abs_to_usize(n).min(len)
    }
}

use std::any::Any;

use xf_dtype::{Dtype, NumpyDtype, SparseDtype};
use xf_types::{Scalar, TypeError, cast_scalar_owned, infer_dtype};

use crate::dense::check_integer_bounds;
use crate::{ArrayBox, ArrayError, DenseArray, ExtensionArray};

/// Sparse array: only values that differ from the fill value are stored.
///
/// `sp_index` is strictly increasing and no entry of `sp_values` equals the
/// fill value under missing-aware comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseArray {
    dtype: SparseDtype,
    len: usize,
    sp_index: Vec<usize>,
    sp_values: Vec<Scalar>,
}

fn coerce(value: &Scalar, dtype: &SparseDtype) -> Result<Scalar, TypeError> {
    let subtype = dtype.subtype();
    if value.is_missing() {
        return Ok(subtype.na_value());
    }
    match subtype.physical() {
        None => Ok(value.clone()),
        Some(physical) => {
            let cast = cast_scalar_owned(value.clone(), physical).map_err(|_| {
                TypeError::invalid_value(value, dtype.to_string(), format!("expected {subtype} values"))
            })?;
            check_integer_bounds(cast, subtype, &dtype.to_string())
        }
    }
}

impl SparseArray {
    /// Build from dense values. Without a dtype the subtype is inferred and
    /// the subtype's default fill value is used.
    pub fn from_sequence(values: Vec<Scalar>, dtype: Option<SparseDtype>) -> Result<Self, ArrayError> {
        let dtype = match dtype {
            Some(dtype) => dtype,
            None => {
                let subtype = match infer_dtype(&values) {
                    Ok(physical) => NumpyDtype::from_physical(physical),
                    Err(TypeError::IncompatibleDtypes { .. }) => NumpyDtype::Object,
                    Err(other) => return Err(other.into()),
                };
                SparseDtype::new(subtype, None)
            }
        };

        let len = values.len();
        let mut sp_index = Vec::new();
        let mut sp_values = Vec::new();
        for (idx, value) in values.iter().enumerate() {
            let value = coerce(value, &dtype)?;
            if !value.na_aware_eq(dtype.fill_value()) {
                sp_index.push(idx);
                sp_values.push(value);
            }
        }
        Ok(Self {
            dtype,
            len,
            sp_index,
            sp_values,
        })
    }

    #[must_use]
    pub fn sparse_dtype(&self) -> &SparseDtype {
        &self.dtype
    }

    #[must_use]
    pub fn fill_value(&self) -> &Scalar {
        self.dtype.fill_value()
    }

    #[must_use]
    pub fn sp_index(&self) -> &[usize] {
        &self.sp_index
    }

    #[must_use]
    pub fn sp_values(&self) -> &[Scalar] {
        &self.sp_values
    }

    #[must_use]
    pub fn npoints(&self) -> usize {
        self.sp_index.len()
    }

    #[must_use]
    pub fn density(&self) -> f64 {
        if self.len == 0 {
            return 0.0;
        }
        self.npoints() as f64 / self.len as f64
    }

    pub fn to_dense(&self) -> Result<DenseArray, ArrayError> {
        DenseArray::new(self.dtype.subtype(), self.to_scalars())
    }
}

impl ExtensionArray for SparseArray {
    fn dtype(&self) -> Dtype {
        Dtype::Sparse(self.dtype.clone())
    }

    fn len(&self) -> usize {
        self.len
    }

    fn get(&self, position: usize) -> Option<Scalar> {
        if position >= self.len {
            return None;
        }
        Some(match self.sp_index.binary_search(&position) {
            Ok(slot) => self.sp_values[slot].clone(),
            Err(_) => self.dtype.fill_value().clone(),
        })
    }

    fn validate_scalar(&self, value: &Scalar) -> Result<Scalar, TypeError> {
        coerce(value, &self.dtype)
    }

    fn put(&mut self, position: usize, value: Scalar) {
        if position >= self.len {
            return;
        }
        let is_fill = value.na_aware_eq(self.dtype.fill_value());
        match self.sp_index.binary_search(&position) {
            Ok(slot) if is_fill => {
                self.sp_index.remove(slot);
                self.sp_values.remove(slot);
            }
            Ok(slot) => self.sp_values[slot] = value,
            Err(_) if is_fill => {}
            Err(slot) => {
                self.sp_index.insert(slot, position);
                self.sp_values.insert(slot, value);
            }
        }
    }

    fn take(&self, positions: &[Option<usize>]) -> ArrayBox {
        let na = self.dtype.subtype().na_value();
        let mut sp_index = Vec::new();
        let mut sp_values = Vec::new();
        for (out_idx, slot) in positions.iter().enumerate() {
            let value = slot
                .and_then(|idx| self.get(idx))
                .unwrap_or_else(|| na.clone());
            if !value.na_aware_eq(self.dtype.fill_value()) {
                sp_index.push(out_idx);
                sp_values.push(value);
            }
        }
        Box::new(Self {
            dtype: self.dtype.clone(),
            len: positions.len(),
            sp_index,
            sp_values,
        })
    }

    fn from_scalars_like(&self, values: Vec<Scalar>) -> Result<ArrayBox, ArrayError> {
        Ok(Box::new(Self::from_sequence(values, Some(self.dtype.clone()))?))
    }

    fn clone_box(&self) -> ArrayBox {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

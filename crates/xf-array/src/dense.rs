use std::any::Any;

use xf_dtype::{Dtype, NumpyDtype};
use xf_types::{DType, NullKind, Scalar, TypeError, cast_scalar_owned, common_dtype, infer_dtype};

use crate::{ArrayBox, ArrayError, ExtensionArray, ValidityMask};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithmeticOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }
}

/// Plain numpy-style array. Missing slots are tracked by the validity mask;
/// `object` arrays store any scalar as given.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseArray {
    dtype: NumpyDtype,
    values: Vec<Scalar>,
    validity: ValidityMask,
}

fn coerce(value: Scalar, dtype: NumpyDtype) -> Result<Scalar, TypeError> {
    match dtype.physical() {
        Some(physical) => check_integer_bounds(cast_scalar_owned(value, physical)?, dtype, &dtype.to_string()),
        None if value.is_missing() => Ok(Scalar::Null(NullKind::NaN)),
        None => Ok(value),
    }
}

/// Rejects an already cast integer that does not fit a narrow `dtype`.
pub(crate) fn check_integer_bounds(value: Scalar, dtype: NumpyDtype, target: &str) -> Result<Scalar, TypeError> {
    match (&value, dtype.integer_bounds()) {
        (Scalar::Int64(v), Some((lo, hi))) if !(lo..=hi).contains(v) => Err(TypeError::invalid_value(
            &value,
            target,
            format!("out of bounds for {dtype} [{lo}, {hi}]"),
        )),
        _ => Ok(value),
    }
}

impl DenseArray {
    /// Construct an array, coercing every value to `dtype`.
    pub fn new(dtype: NumpyDtype, values: Vec<Scalar>) -> Result<Self, ArrayError> {
        let coerced = values
            .into_iter()
            .map(|value| coerce(value, dtype))
            .collect::<Result<Vec<_>, _>>()?;
        let validity = ValidityMask::from_values(&coerced);
        Ok(Self {
            dtype,
            values: coerced,
            validity,
        })
    }

    /// Infer the dtype from the values; incompatible mixes become `object`.
    pub fn from_values(values: Vec<Scalar>) -> Result<Self, ArrayError> {
        let dtype = match infer_dtype(&values) {
            Ok(physical) => NumpyDtype::from_physical(physical),
            Err(TypeError::IncompatibleDtypes { .. }) => NumpyDtype::Object,
            Err(other) => return Err(other.into()),
        };
        Self::new(dtype, values)
    }

    pub fn from_sequence(values: Vec<Scalar>, dtype: Option<NumpyDtype>) -> Result<Self, ArrayError> {
        match dtype {
            Some(dtype) => Self::new(dtype, values),
            None => Self::from_values(values),
        }
    }

    #[must_use]
    pub fn numpy_dtype(&self) -> NumpyDtype {
        self.dtype
    }

    #[must_use]
    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    #[must_use]
    pub fn validity(&self) -> &ValidityMask {
        &self.validity
    }

    pub fn astype(&self, dtype: NumpyDtype) -> Result<Self, ArrayError> {
        Self::new(dtype, self.values.clone())
    }

    fn physical_or_object(&self) -> Result<DType, TypeError> {
        self.dtype.physical().ok_or_else(|| TypeError::UnsupportedOperation {
            op: "arithmetic".to_owned(),
            dtype: self.dtype.to_string(),
        })
    }

    pub fn binary_numeric(&self, right: &Self, op: ArithmeticOp) -> Result<Self, ArrayError> {
        if self.len() != right.len() {
            return Err(ArrayError::LengthMismatch {
                left: self.len(),
                right: right.len(),
            });
        }

        let mut out_dtype = common_dtype(self.physical_or_object()?, right.physical_or_object()?)?;
        if matches!(out_dtype, DType::Bool) {
            out_dtype = DType::Int64;
        }
        if matches!(op, ArithmeticOp::Div) {
            out_dtype = DType::Float64;
        }

        let values = self
            .values
            .iter()
            .zip(&right.values)
            .map(|(l, r)| apply_scalar_op(l, r, op, out_dtype))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(NumpyDtype::from_physical(out_dtype), values)
    }

    /// Combine every element with `scalar`; `reversed` puts the scalar on
    /// the left-hand side.
    pub fn binary_scalar(&self, scalar: &Scalar, op: ArithmeticOp, reversed: bool) -> Result<Self, ArrayError> {
        let physical = self.physical_or_object()?;
        let mut out_dtype = if scalar.is_missing() {
            physical
        } else {
            common_dtype(physical, scalar.dtype())?
        };
        if matches!(out_dtype, DType::Bool) {
            out_dtype = DType::Int64;
        }
        if matches!(op, ArithmeticOp::Div) {
            out_dtype = DType::Float64;
        }

        let values = self
            .values
            .iter()
            .map(|v| {
                if reversed {
                    apply_scalar_op(scalar, v, op, out_dtype)
                } else {
                    apply_scalar_op(v, scalar, op, out_dtype)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(NumpyDtype::from_physical(out_dtype), values)
    }

    pub fn abs(&self) -> Result<Self, ArrayError> {
        let physical = self.physical_or_object()?;
        let values = self
            .values
            .iter()
            .map(|v| match v {
                Scalar::Int64(i) => Ok(Scalar::Int64(i.wrapping_abs())),
                Scalar::Float64(f) => Ok(Scalar::Float64(f.abs())),
                Scalar::Bool(b) => Ok(Scalar::Bool(*b)),
                Scalar::Timedelta64(t) => Ok(Scalar::Timedelta64(t.wrapping_abs())),
                other if other.is_missing() => Ok(other.clone()),
                other => Err(TypeError::NonNumericValue {
                    value: other.to_string(),
                    dtype: physical,
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(self.dtype, values)
    }
}

fn apply_scalar_op(left: &Scalar, right: &Scalar, op: ArithmeticOp, out_dtype: DType) -> Result<Scalar, ArrayError> {
    if left.is_missing() || right.is_missing() {
        return Ok(if left.is_nan() || right.is_nan() {
            Scalar::Null(NullKind::NaN)
        } else {
            Scalar::missing_for_dtype(out_dtype)
        });
    }

    if matches!(out_dtype, DType::Int64) {
        let (Ok(Scalar::Int64(l)), Ok(Scalar::Int64(r))) = (
            cast_scalar_owned(left.clone(), DType::Int64),
            cast_scalar_owned(right.clone(), DType::Int64),
        ) else {
            return Err(TypeError::InvalidCast {
                from: left.dtype(),
                to: DType::Int64,
            }
            .into());
        };
        let result = match op {
            ArithmeticOp::Add => l.wrapping_add(r),
            ArithmeticOp::Sub => l.wrapping_sub(r),
            ArithmeticOp::Mul => l.wrapping_mul(r),
            ArithmeticOp::Div => return Ok(Scalar::Float64(l as f64 / r as f64)),
        };
        return Ok(Scalar::Int64(result));
    }

    let lhs = left.to_f64()?;
    let rhs = right.to_f64()?;
    let result = match op {
        ArithmeticOp::Add => lhs + rhs,
        ArithmeticOp::Sub => lhs - rhs,
        ArithmeticOp::Mul => lhs * rhs,
        ArithmeticOp::Div => lhs / rhs,
    };
    Ok(Scalar::Float64(result))
}

impl ExtensionArray for DenseArray {
    fn dtype(&self) -> Dtype {
        Dtype::Numpy(self.dtype)
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn get(&self, position: usize) -> Option<Scalar> {
        self.values.get(position).cloned()
    }

    fn is_missing(&self, position: usize) -> bool {
        position < self.len() && !self.validity.get(position)
    }

    fn validate_scalar(&self, value: &Scalar) -> Result<Scalar, TypeError> {
        coerce(value.clone(), self.dtype)
    }

    fn put(&mut self, position: usize, value: Scalar) {
        if let Some(slot) = self.values.get_mut(position) {
            self.validity.set(position, !value.is_missing());
            *slot = value;
        }
    }

    fn take(&self, positions: &[Option<usize>]) -> ArrayBox {
        let values: Vec<Scalar> = positions
            .iter()
            .map(|slot| {
                slot.and_then(|idx| self.values.get(idx).cloned())
                    .unwrap_or_else(|| self.dtype.na_value())
            })
            .collect();
        let validity = ValidityMask::from_values(&values);
        Box::new(Self {
            dtype: self.dtype,
            values,
            validity,
        })
    }

    fn from_scalars_like(&self, values: Vec<Scalar>) -> Result<ArrayBox, ArrayError> {
        Ok(Box::new(Self::new(self.dtype, values)?))
    }

    fn clone_box(&self) -> ArrayBox {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self as &dyn Any
    }

    fn promote_for(&self, values: &[Scalar]) -> Option<ArrayBox> {
        let current = self.dtype.physical()?;
        let mut widened = current;
        for value in values.iter().filter(|v| !v.is_missing()) {
            widened = match common_dtype(widened, value.dtype()) {
                Ok(dtype) => dtype,
                Err(_) => return self.astype(NumpyDtype::Object).ok().map(|a| Box::new(a) as ArrayBox),
            };
        }
        if widened == current {
            return None;
        }
        self.astype(NumpyDtype::from_physical(widened))
            .ok()
            .map(|a| Box::new(a) as ArrayBox)
    }

    fn to_scalars(&self) -> Vec<Scalar> {
        self.values.clone()
    }
}

#[cfg(test)]
mod tests {
    use xf_dtype::{Dtype, NumpyDtype};
    use xf_types::{NullKind, Scalar};

    use super::{ArithmeticOp, DenseArray};
    use crate::ExtensionArray;

    #[test]
    fn binary_numeric_propagates_missing() {
        let left = DenseArray::from_values(vec![
            Scalar::Int64(1),
            Scalar::Null(NullKind::Null),
            Scalar::Int64(3),
        ])
        .expect("left");
        let right = DenseArray::from_values(vec![
            Scalar::Int64(10),
            Scalar::Int64(20),
            Scalar::Int64(30),
        ])
        .expect("right");

        let out = left.binary_numeric(&right, ArithmeticOp::Add).expect("add");
        assert_eq!(out.numpy_dtype(), NumpyDtype::Int64);
        assert_eq!(
            out.values(),
            &[Scalar::Int64(11), Scalar::Null(NullKind::Null), Scalar::Int64(33)]
        );
    }

    #[test]
    fn narrow_integer_dtypes_check_bounds() {
        let cases = [
            (NumpyDtype::Int8, -128, 127),
            (NumpyDtype::Int16, -32_768, 32_767),
            (NumpyDtype::Int32, i64::from(i32::MIN), i64::from(i32::MAX)),
            (NumpyDtype::UInt8, 0, 255),
            (NumpyDtype::UInt16, 0, 65_535),
            (NumpyDtype::UInt32, 0, i64::from(u32::MAX)),
        ];
        for (dtype, lo, hi) in cases {
            let arr = DenseArray::new(dtype, vec![Scalar::Int64(lo), Scalar::Int64(hi)]).expect("in range");
            assert_eq!(arr.get(1), Some(Scalar::Int64(hi)));
            assert!(DenseArray::new(dtype, vec![Scalar::Int64(lo - 1)]).is_err(), "{dtype} below");
            assert!(DenseArray::new(dtype, vec![Scalar::Int64(hi + 1)]).is_err(), "{dtype} above");
        }
        assert!(DenseArray::new(NumpyDtype::UInt64, vec![Scalar::Int64(-1)]).is_err());
        assert!(DenseArray::new(NumpyDtype::UInt64, vec![Scalar::Int64(i64::MAX)]).is_ok());

        let mut arr = DenseArray::new(NumpyDtype::Int8, vec![Scalar::Int64(1)]).expect("int8");
        let err = arr.set(0, &Scalar::Int64(1000)).expect_err("overflow");
        assert!(err.to_string().contains("1000"));
        assert_eq!(arr.get(0), Some(Scalar::Int64(1)));
        assert!(arr.set(0, &Scalar::Null(NullKind::Null)).is_ok());
    }

    #[test]
    fn division_promotes_to_float() {
        let left = DenseArray::from_values(vec![Scalar::Int64(1), Scalar::Int64(4)]).expect("l");
        let right = DenseArray::from_values(vec![Scalar::Int64(2), Scalar::Int64(2)]).expect("r");
        let out = left.binary_numeric(&right, ArithmeticOp::Div).expect("div");
        assert_eq!(out.values(), &[Scalar::Float64(0.5), Scalar::Float64(2.0)]);
    }

    #[test]
    fn reversed_scalar_subtraction() {
        let arr = DenseArray::from_values(vec![Scalar::Int64(1), Scalar::Int64(2)]).expect("arr");
        let out = arr
            .binary_scalar(&Scalar::Int64(10), ArithmeticOp::Sub, true)
            .expect("rsub");
        assert_eq!(out.values(), &[Scalar::Int64(9), Scalar::Int64(8)]);
    }

    #[test]
    fn promote_widens_int_to_float() {
        let arr = DenseArray::from_values(vec![Scalar::Int64(1)]).expect("arr");
        let widened = arr.promote_for(&[Scalar::Float64(1.5)]).expect("widened");
        assert_eq!(widened.dtype(), Dtype::Numpy(NumpyDtype::Float64));
        assert!(arr.promote_for(&[Scalar::Int64(2)]).is_none());

        let widened = arr.promote_for(&[Scalar::from("x")]).expect("object");
        assert_eq!(widened.dtype(), Dtype::Numpy(NumpyDtype::Object));
    }

    #[test]
    fn object_arrays_hold_mixed_values() {
        let arr = DenseArray::from_values(vec![Scalar::Int64(1), Scalar::from("a")]).expect("arr");
        assert_eq!(arr.numpy_dtype(), NumpyDtype::Object);
        assert_eq!(arr.get(1), Some(Scalar::from("a")));
    }

    #[test]
    fn abs_rejects_text() {
        let arr = DenseArray::from_values(vec![Scalar::Int64(-2), Scalar::Float64(-1.5)]).expect("arr");
        let out = arr.abs().expect("abs");
        assert_eq!(out.values(), &[Scalar::Float64(2.0), Scalar::Float64(1.5)]);

        let text = DenseArray::from_values(vec![Scalar::from("a")]).expect("text");
        assert!(text.abs().is_err());
    }

    #[test]
    fn take_fills_missing_with_dtype_marker() {
        let arr = DenseArray::from_values(vec![Scalar::Float64(1.0)]).expect("arr");
        let out = arr.take(&[Some(0), None]);
        assert!(out.is_missing(1));
        assert_eq!(out.get(1), Some(Scalar::Null(NullKind::NaN)));
    }
}

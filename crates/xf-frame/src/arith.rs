use xf_array::{ArithmeticOp, ArrayBox, DenseArray, ExtensionArray, SparseArray, StringArray};
use xf_dtype::StringDtype;
use xf_types::{Scalar, TypeError};

use crate::FrameError;

/// Dense view of any backend. Sparse arrays keep their subtype.
pub(crate) fn as_dense(array: &dyn ExtensionArray) -> Result<DenseArray, FrameError> {
    if let Some(dense) = array.as_any().downcast_ref::<DenseArray>() {
        return Ok(dense.clone());
    }
    if let Some(sparse) = array.as_any().downcast_ref::<SparseArray>() {
        return Ok(sparse.to_dense()?);
    }
    Ok(DenseArray::from_values(array.to_scalars())?)
}

fn string_fill(fill: Option<&Scalar>) -> Result<Option<&str>, FrameError> {
    match fill {
        None => Ok(None),
        Some(Scalar::Utf8(s)) => Ok(Some(s.as_str())),
        Some(v) if v.is_missing() => Ok(None),
        Some(other) => Err(TypeError::invalid_value(other, StringDtype::NAME, "must provide strings").into()),
    }
}

fn fill_one_sided(left: &DenseArray, right: &DenseArray, fill: &Scalar) -> Result<(DenseArray, DenseArray), FrameError> {
    let mut lv = left.values().to_vec();
    let mut rv = right.values().to_vec();
    for (l, r) in lv.iter_mut().zip(rv.iter_mut()) {
        match (l.is_missing(), r.is_missing()) {
            (true, false) => *l = fill.clone(),
            (false, true) => *r = fill.clone(),
            _ => {}
        }
    }
    Ok((DenseArray::from_values(lv)?, DenseArray::from_values(rv)?))
}

/// Element-wise `left op right` over equal-length arrays. When exactly one
/// operand is missing, `fill` stands in for it. `reversed` computes
/// `right op left`.
pub(crate) fn binary_arrays(
    left: &dyn ExtensionArray,
    right: &dyn ExtensionArray,
    op: ArithmeticOp,
    fill: Option<&Scalar>,
    reversed: bool,
) -> Result<ArrayBox, FrameError> {
    if op == ArithmeticOp::Add
        && let (Some(l), Some(r)) = (
            left.as_any().downcast_ref::<StringArray>(),
            right.as_any().downcast_ref::<StringArray>(),
        )
    {
        return Ok(Box::new(l.concat(r, string_fill(fill)?, reversed)?));
    }

    let mut l = as_dense(left)?;
    let mut r = as_dense(right)?;
    if let Some(fill) = fill.filter(|f| !f.is_missing()) {
        (l, r) = fill_one_sided(&l, &r, fill)?;
    }
    let out = if reversed {
        r.binary_numeric(&l, op)?
    } else {
        l.binary_numeric(&r, op)?
    };
    Ok(Box::new(out))
}

pub(crate) fn scalar_array(
    array: &dyn ExtensionArray,
    scalar: &Scalar,
    op: ArithmeticOp,
    reversed: bool,
) -> Result<ArrayBox, FrameError> {
    if let Some(strings) = array.as_any().downcast_ref::<StringArray>() {
        return match (op, scalar) {
            (ArithmeticOp::Add, Scalar::Utf8(s)) => Ok(Box::new(strings.concat_scalar(s, reversed))),
            (ArithmeticOp::Add, v) if v.is_missing() => Ok(strings.take(&vec![None; strings.len()])),
            _ => Err(TypeError::UnsupportedOperation {
                op: format!("{} {scalar}", op.symbol()),
                dtype: StringDtype::NAME.to_owned(),
            }
            .into()),
        };
    }
    Ok(Box::new(as_dense(array)?.binary_scalar(scalar, op, reversed)?))
}

pub(crate) fn abs_array(array: &dyn ExtensionArray) -> Result<ArrayBox, FrameError> {
    Ok(Box::new(as_dense(array)?.abs()?))
}

/// Numeric view of an array for window reductions; missing slots are `None`.
pub(crate) fn numeric_values(array: &dyn ExtensionArray) -> Result<Vec<Option<f64>>, FrameError> {
    if !array.dtype().is_numeric() {
        return Err(TypeError::UnsupportedOperation {
            op: "numeric reduction".to_owned(),
            dtype: array.dtype().to_string(),
        }
        .into());
    }
    array
        .to_scalars()
        .iter()
        .map(|v| {
            if v.is_missing() {
                Ok(None)
            } else {
                v.to_f64().map(Some).map_err(FrameError::from)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use xf_array::{ArithmeticOp, DenseArray, ExtensionArray, StringArray};
    use xf_types::Scalar;

    use super::{binary_arrays, scalar_array};

    #[test]
    fn numeric_fill_substitutes_one_sided_missing() {
        let left = DenseArray::from_values(vec![Scalar::Float64(1.0), Scalar::Float64(f64::NAN)])
            .expect("left");
        let right = DenseArray::from_values(vec![Scalar::Float64(f64::NAN), Scalar::Float64(f64::NAN)])
            .expect("right");
        let out = binary_arrays(&left, &right, ArithmeticOp::Add, Some(&Scalar::Float64(0.0)), false)
            .expect("add");
        assert_eq!(out.get(0), Some(Scalar::Float64(1.0)));
        assert!(out.is_missing(1));
    }

    #[test]
    fn strings_reject_subtraction() {
        let arr = StringArray::from_strs([Some("a")]);
        assert!(scalar_array(&arr, &Scalar::from("b"), ArithmeticOp::Sub, false).is_err());
        let out = scalar_array(&arr, &Scalar::from("b"), ArithmeticOp::Add, true).expect("radd");
        assert_eq!(out.get(0), Some(Scalar::from("ba")));
    }
}

use std::any::Any;

use xf_dtype::{Dtype, StringDtype};
use xf_types::{NullKind, Scalar, TypeError};

use crate::{ArrayBox, ArrayError, ExtensionArray};

/// Nullable string array. Only strings and missing markers are accepted;
/// missing slots read back as NaN.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StringArray {
    values: Vec<Option<String>>,
}

fn validate_string(value: &Scalar) -> Result<Option<String>, TypeError> {
    match value {
        Scalar::Utf8(s) => Ok(Some(s.clone())),
        v if v.is_missing() => Ok(None),
        other => Err(TypeError::invalid_value(other, StringDtype::NAME, "must provide strings")),
    }
}

impl StringArray {
    pub fn from_sequence(values: Vec<Scalar>) -> Result<Self, ArrayError> {
        let values = values
            .iter()
            .map(validate_string)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { values })
    }

    pub fn from_strs<'a>(values: impl IntoIterator<Item = Option<&'a str>>) -> Self {
        Self {
            values: values.into_iter().map(|v| v.map(str::to_owned)).collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&str>> + '_ {
        self.values.iter().map(Option::as_deref)
    }

    /// Apply `f` to every present value; missing slots stay missing.
    #[must_use]
    pub fn map_str(&self, f: impl Fn(&str) -> String) -> Self {
        Self {
            values: self.values.iter().map(|v| v.as_deref().map(&f)).collect(),
        }
    }

    /// Apply `f` to every present value, producing arbitrary scalars.
    /// Missing slots map to `Scalar::Null(NullKind::NaN)`.
    pub fn map_to_scalars(&self, f: impl Fn(&str) -> Scalar) -> Vec<Scalar> {
        self.values
            .iter()
            .map(|v| match v {
                Some(s) => f(s),
                None => Scalar::Null(NullKind::NaN),
            })
            .collect()
    }

    /// Element-wise concatenation. When exactly one side is missing, `fill`
    /// stands in for it; when both are missing the result is missing.
    pub fn concat(&self, other: &Self, fill: Option<&str>, reversed: bool) -> Result<Self, ArrayError> {
        if self.len() != other.len() {
            return Err(ArrayError::LengthMismatch {
                left: self.len(),
                right: other.len(),
            });
        }
        let values = self
            .iter()
            .zip(other.iter())
            .map(|(l, r)| {
                let (l, r) = match (l, r) {
                    (None, None) => return None,
                    (Some(l), Some(r)) => (l, r),
                    (Some(l), None) => (l, fill?),
                    (None, Some(r)) => (fill?, r),
                };
                Some(if reversed {
                    format!("{r}{l}")
                } else {
                    format!("{l}{r}")
                })
            })
            .collect();
        Ok(Self { values })
    }

    #[must_use]
    pub fn concat_scalar(&self, other: &str, reversed: bool) -> Self {
        self.map_str(|s| {
            if reversed {
                format!("{other}{s}")
            } else {
                format!("{s}{other}")
            }
        })
    }
}

impl ExtensionArray for StringArray {
    fn dtype(&self) -> Dtype {
        Dtype::String(StringDtype)
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn get(&self, position: usize) -> Option<Scalar> {
        self.values.get(position).map(|v| match v {
            Some(s) => Scalar::Utf8(s.clone()),
            None => StringDtype.na_value(),
        })
    }

    fn is_missing(&self, position: usize) -> bool {
        matches!(self.values.get(position), Some(None))
    }

    fn validate_scalar(&self, value: &Scalar) -> Result<Scalar, TypeError> {
        Ok(match validate_string(value)? {
            Some(s) => Scalar::Utf8(s),
            None => StringDtype.na_value(),
        })
    }

    fn put(&mut self, position: usize, value: Scalar) {
        if let Some(slot) = self.values.get_mut(position) {
            *slot = match value {
                Scalar::Utf8(s) => Some(s),
                _ => None,
            };
        }
    }

    fn take(&self, positions: &[Option<usize>]) -> ArrayBox {
        Box::new(Self {
            values: positions
                .iter()
                .map(|slot| slot.and_then(|idx| self.values.get(idx).cloned().flatten()))
                .collect(),
        })
    }

    fn from_scalars_like(&self, values: Vec<Scalar>) -> Result<ArrayBox, ArrayError> {
        Ok(Box::new(Self::from_sequence(values)?))
    }

    fn clone_box(&self) -> ArrayBox {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

use xf_array::{ArrayBox, DenseArray, StringArray};
use xf_dtype::{Dtype, NumpyDtype};
use xf_types::{NullKind, Scalar};

use crate::flags::finalize;
use crate::{FrameError, Series};

/// Vectorised string methods over a series (`s.str()`).
///
/// Works on nullable-string series and on `object` series holding strings.
/// String-valued results of a nullable-string series stay nullable strings;
/// everything else comes back dense. Missing values stay missing.
pub struct StringAccessor<'a> {
    series: &'a Series,
}

enum Source<'a> {
    Strings(&'a StringArray),
    Object(Vec<Scalar>),
}

impl<'a> StringAccessor<'a> {
    pub(crate) fn new(series: &'a Series) -> Self {
        Self { series }
    }

    fn source(&self) -> Result<Source<'a>, FrameError> {
        let array = self.series.array();
        if let Some(strings) = array.as_any().downcast_ref::<StringArray>() {
            return Ok(Source::Strings(strings));
        }
        match array.dtype() {
            Dtype::Numpy(NumpyDtype::Object) => Ok(Source::Object(array.to_scalars())),
            other => Err(FrameError::Unsupported(format!(
                "can only use .str accessor with string values, not {other}"
            ))),
        }
    }

    fn finish(&self, values: ArrayBox, operation: &str) -> Result<Series, FrameError> {
        let out = self.series.with_parts(
            self.series.name().to_owned(),
            self.series.index().clone(),
            values,
        );
        finalize(out, &[self.series.flags()], operation)
    }

    /// String to string transform.
    fn map_str(&self, f: impl Fn(&str) -> String, operation: &str) -> Result<Series, FrameError> {
        let values: ArrayBox = match self.source()? {
            Source::Strings(strings) => Box::new(strings.map_str(f)),
            Source::Object(values) => Box::new(DenseArray::new(
                NumpyDtype::Object,
                object_map(values, |s| Scalar::Utf8(f(s))),
            )?),
        };
        self.finish(values, operation)
    }

    /// String to scalar transform with a dense result.
    fn map_scalar(&self, f: impl Fn(&str) -> Scalar, operation: &str) -> Result<Series, FrameError> {
        let scalars = match self.source()? {
            Source::Strings(strings) => strings.map_to_scalars(f),
            Source::Object(values) => object_map(values, f),
        };
        self.finish(Box::new(DenseArray::from_values(scalars)?), operation)
    }

    pub fn lower(&self) -> Result<Series, FrameError> {
        self.map_str(str::to_lowercase, "str.lower")
    }

    pub fn upper(&self) -> Result<Series, FrameError> {
        self.map_str(str::to_uppercase, "str.upper")
    }

    pub fn strip(&self) -> Result<Series, FrameError> {
        self.map_str(|s| s.trim().to_owned(), "str.strip")
    }

    pub fn lstrip(&self) -> Result<Series, FrameError> {
        self.map_str(|s| s.trim_start().to_owned(), "str.lstrip")
    }

    pub fn rstrip(&self) -> Result<Series, FrameError> {
        self.map_str(|s| s.trim_end().to_owned(), "str.rstrip")
    }

    pub fn capitalize(&self) -> Result<Series, FrameError> {
        self.map_str(
            |s| {
                let mut chars = s.chars();
                match chars.next() {
                    None => String::new(),
                    Some(c) => c.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                }
            },
            "str.capitalize",
        )
    }

    /// Upper-case the first letter of every word, lower-case the rest.
    pub fn title(&self) -> Result<Series, FrameError> {
        self.map_str(
            |s| {
                let mut out = String::with_capacity(s.len());
                let mut at_word_start = true;
                for c in s.chars() {
                    if c.is_alphabetic() {
                        if at_word_start {
                            out.extend(c.to_uppercase());
                        } else {
                            out.extend(c.to_lowercase());
                        }
                        at_word_start = false;
                    } else {
                        out.push(c);
                        at_word_start = true;
                    }
                }
                out
            },
            "str.title",
        )
    }

    pub fn replace(&self, pat: &str, repl: &str) -> Result<Series, FrameError> {
        self.map_str(|s| s.replace(pat, repl), "str.replace")
    }

    pub fn repeat(&self, n: usize) -> Result<Series, FrameError> {
        self.map_str(|s| s.repeat(n), "str.repeat")
    }

    /// Characters `start..end`, clamped to each string.
    pub fn slice(&self, start: usize, end: Option<usize>) -> Result<Series, FrameError> {
        self.map_str(
            |s| {
                let count = s.chars().count();
                let stop = end.unwrap_or(count).min(count);
                s.chars().skip(start).take(stop.saturating_sub(start)).collect()
            },
            "str.slice",
        )
    }

    /// Length in characters.
    pub fn len(&self) -> Result<Series, FrameError> {
        self.map_scalar(|s| Scalar::Int64(s.chars().count() as i64), "str.len")
    }

    pub fn contains(&self, pat: &str) -> Result<Series, FrameError> {
        self.map_scalar(|s| Scalar::Bool(s.contains(pat)), "str.contains")
    }

    pub fn startswith(&self, pat: &str) -> Result<Series, FrameError> {
        self.map_scalar(|s| Scalar::Bool(s.starts_with(pat)), "str.startswith")
    }

    pub fn endswith(&self, pat: &str) -> Result<Series, FrameError> {
        self.map_scalar(|s| Scalar::Bool(s.ends_with(pat)), "str.endswith")
    }
}

/// Apply `f` to the strings of an `object` column; missing and non-string
/// values become missing.
fn object_map(values: Vec<Scalar>, f: impl Fn(&str) -> Scalar) -> Vec<Scalar> {
    values
        .into_iter()
        .map(|v| match v {
            Scalar::Utf8(s) => f(&s),
            _ => Scalar::Null(NullKind::NaN),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use xf_array::{ExtensionArray, StringArray};
    use xf_dtype::{Dtype, NumpyDtype, StringDtype};
    use xf_index::{Index, IndexLabel};
    use xf_types::{NullKind, Scalar};

    use crate::{FrameError, Series};

    fn strings(values: &[Option<&str>], labels: &[&str]) -> Series {
        Series::new(
            "s",
            Index::from_strs(labels),
            Box::new(StringArray::from_strs(values.iter().copied())),
        )
        .expect("series")
    }

    #[test]
    fn string_transforms_keep_string_dtype_and_missing() {
        let s = strings(&[Some(" ab "), None, Some("cD")], &["a", "b", "c"]);
        let upper = s.str().upper().expect("upper");
        assert_eq!(upper.dtype(), Dtype::String(StringDtype));
        assert_eq!(upper.get(0), Some(Scalar::from(" AB ")));
        assert!(upper.array().is_missing(1));

        assert_eq!(s.str().strip().expect("strip").get(0), Some(Scalar::from("ab")));
        assert_eq!(s.str().capitalize().expect("cap").get(2), Some(Scalar::from("Cd")));
    }

    #[test]
    fn predicates_are_dense() {
        let s = strings(&[Some("apple"), Some("banana")], &["a", "b"]);
        let out = s.str().startswith("a").expect("startswith");
        assert_eq!(out.values(), vec![Scalar::Bool(true), Scalar::Bool(false)]);
        let lens = s.str().len().expect("len");
        assert_eq!(lens.dtype(), Dtype::Numpy(NumpyDtype::Int64));
        assert_eq!(lens.get(1), Some(Scalar::Int64(6)));
    }

    #[test]
    fn title_and_slice() {
        let s = strings(&[Some("hello wORLD")], &["a"]);
        assert_eq!(s.str().title().expect("title").get(0), Some(Scalar::from("Hello World")));
        assert_eq!(s.str().slice(1, Some(4)).expect("slice").get(0), Some(Scalar::from("ell")));
        assert_eq!(s.str().repeat(2).expect("repeat").get(0), Some(Scalar::from("hello wORLDhello wORLD")));
    }

    #[test]
    fn object_series_accepted_numeric_rejected() {
        let obj = Series::from_values(
            "o",
            Index::from_strs(&["a", "b"]).labels().to_vec(),
            vec![Scalar::from("x"), Scalar::Int64(1)],
        )
        .expect("object");
        assert_eq!(obj.dtype(), Dtype::Numpy(NumpyDtype::Object));
        let out = obj.str().upper().expect("upper");
        assert_eq!(out.get(0), Some(Scalar::from("X")));
        assert_eq!(out.get(1), Some(Scalar::Null(NullKind::NaN)));

        let nums = Series::from_values("n", vec![IndexLabel::Int64(0)], vec![Scalar::Int64(1)]).expect("ints");
        assert!(matches!(nums.str().lower(), Err(FrameError::Unsupported(_))));
    }

    #[test]
    fn strict_flag_survives_accessor() {
        let s = strings(&[Some("a"), Some("b")], &["x", "y"])
            .with_allows_duplicate_labels(false)
            .expect("strict");
        assert!(!s.str().lower().expect("lower").allows_duplicate_labels());
    }
}

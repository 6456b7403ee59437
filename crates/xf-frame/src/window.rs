//! Rolling, expanding and exponentially weighted reductions over a series.
//!
//! Results are `float64`, keep the source index and name, and go through the
//! duplicate-label guard like any other derivation.

use xf_array::DenseArray;
use xf_dtype::NumpyDtype;
use xf_types::{NullKind, Scalar, float_max, float_mean, float_min, float_var};

use crate::arith::numeric_values;
use crate::flags::finalize;
use crate::{FrameError, Series};

fn to_scalar(value: Option<f64>) -> Scalar {
    match value {
        Some(v) if !v.is_nan() => Scalar::Float64(v),
        _ => Scalar::Null(NullKind::NaN),
    }
}

fn float_result(series: &Series, out: Vec<Option<f64>>, operation: &str) -> Result<Series, FrameError> {
    let values = DenseArray::new(NumpyDtype::Float64, out.into_iter().map(to_scalar).collect())?;
    let result = series.with_parts(series.name().to_owned(), series.index().clone(), Box::new(values));
    finalize(result, &[series.flags()], operation)
}

/// Sample standard deviation (ddof=1).
fn sample_std(nums: &[f64]) -> Option<f64> {
    float_var(nums, 1).map(f64::sqrt)
}

fn sum(nums: &[f64]) -> Option<f64> {
    Some(nums.iter().sum())
}

/// Sliding window of a fixed number of rows, created by [`Series::rolling`].
pub struct Rolling<'a> {
    series: &'a Series,
    window: usize,
    min_periods: usize,
}

impl<'a> Rolling<'a> {
    pub(crate) fn new(series: &'a Series, window: usize, min_periods: usize) -> Self {
        Self {
            series,
            window,
            min_periods,
        }
    }

    fn apply(&self, agg: impl Fn(&[f64]) -> Option<f64>, operation: &str) -> Result<Series, FrameError> {
        if self.window == 0 {
            return Err(FrameError::InvalidWindow("window must be positive".to_owned()));
        }
        if self.min_periods > self.window {
            return Err(FrameError::InvalidWindow(format!(
                "min_periods {} must be <= window {}",
                self.min_periods, self.window
            )));
        }
        let vals = numeric_values(self.series.array())?;
        let out = (0..vals.len())
            .map(|i| {
                let start = (i + 1).saturating_sub(self.window);
                let nums: Vec<f64> = vals[start..=i].iter().flatten().copied().collect();
                (nums.len() >= self.min_periods.max(1)).then(|| agg(&nums)).flatten()
            })
            .collect();
        float_result(self.series, out, operation)
    }

    pub fn sum(&self) -> Result<Series, FrameError> {
        self.apply(sum, "rolling.sum")
    }

    pub fn mean(&self) -> Result<Series, FrameError> {
        self.apply(float_mean, "rolling.mean")
    }

    pub fn min(&self) -> Result<Series, FrameError> {
        self.apply(float_min, "rolling.min")
    }

    pub fn max(&self) -> Result<Series, FrameError> {
        self.apply(float_max, "rolling.max")
    }

    pub fn std(&self) -> Result<Series, FrameError> {
        self.apply(sample_std, "rolling.std")
    }

    /// Non-missing values per window; never missing itself.
    pub fn count(&self) -> Result<Series, FrameError> {
        if self.window == 0 {
            return Err(FrameError::InvalidWindow("window must be positive".to_owned()));
        }
        let vals = numeric_values(self.series.array())?;
        let out = (0..vals.len())
            .map(|i| {
                let start = (i + 1).saturating_sub(self.window);
                Some(vals[start..=i].iter().flatten().count() as f64)
            })
            .collect();
        float_result(self.series, out, "rolling.count")
    }
}

/// Window over every row so far, created by [`Series::expanding`].
pub struct Expanding<'a> {
    series: &'a Series,
    min_periods: usize,
}

impl<'a> Expanding<'a> {
    pub(crate) fn new(series: &'a Series, min_periods: usize) -> Self {
        Self { series, min_periods }
    }

    fn apply(&self, agg: impl Fn(&[f64]) -> Option<f64>, operation: &str) -> Result<Series, FrameError> {
        let vals = numeric_values(self.series.array())?;
        let mut nums = Vec::with_capacity(vals.len());
        let out = vals
            .iter()
            .map(|v| {
                if let Some(v) = v {
                    nums.push(*v);
                }
                (nums.len() >= self.min_periods.max(1)).then(|| agg(&nums)).flatten()
            })
            .collect();
        float_result(self.series, out, operation)
    }

    pub fn sum(&self) -> Result<Series, FrameError> {
        self.apply(sum, "expanding.sum")
    }

    pub fn mean(&self) -> Result<Series, FrameError> {
        self.apply(float_mean, "expanding.mean")
    }

    pub fn min(&self) -> Result<Series, FrameError> {
        self.apply(float_min, "expanding.min")
    }

    pub fn max(&self) -> Result<Series, FrameError> {
        self.apply(float_max, "expanding.max")
    }

    pub fn std(&self) -> Result<Series, FrameError> {
        self.apply(sample_std, "expanding.std")
    }
}

/// Exponentially weighted window, created by [`Series::ewm`].
///
/// With `adjust` the weights are `(1 - alpha)^k` normalised over the
/// observations seen so far; without it the recursive form
/// `y = (1 - alpha) * y_prev + alpha * x` is used. A missing observation
/// carries the previous result forward.
pub struct Ewm<'a> {
    series: &'a Series,
    alpha: f64,
    adjust: bool,
}

impl<'a> Ewm<'a> {
    pub(crate) fn new(series: &'a Series, alpha: f64, adjust: bool) -> Result<Self, FrameError> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(FrameError::InvalidWindow(format!("alpha must satisfy 0 < alpha <= 1, got {alpha}")));
        }
        Ok(Self { series, alpha, adjust })
    }

    pub fn mean(&self) -> Result<Series, FrameError> {
        let vals = numeric_values(self.series.array())?;
        let decay = 1.0 - self.alpha;
        let mut out = Vec::with_capacity(vals.len());

        if self.adjust {
            let (mut num, mut den) = (0.0_f64, 0.0_f64);
            for v in &vals {
                num *= decay;
                den *= decay;
                if let Some(x) = v {
                    num += x;
                    den += 1.0;
                }
                out.push((den > 0.0).then(|| num / den));
            }
        } else {
            let mut state: Option<f64> = None;
            for v in &vals {
                if let Some(x) = v {
                    state = Some(match state {
                        Some(prev) => decay * prev + self.alpha * x,
                        None => *x,
                    });
                }
                out.push(state);
            }
        }
        float_result(self.series, out, "ewm.mean")
    }
}

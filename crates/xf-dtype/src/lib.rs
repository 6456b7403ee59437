#![forbid(unsafe_code)]

//! Type descriptors for extension arrays.
//!
//! A [`Dtype`] identifies the logical type of an array independently of its
//! storage: plain numpy-style dtypes, the nullable `string` dtype, and
//! `Sparse[subtype, fill]`. Descriptors are parsed from strings through a
//! [`DtypeRegistry`]; unknown strings fail closed with
//! [`TypeError::UnparseableDtype`].

use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use xf_types::{DType, NullKind, Scalar, TypeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumpyDtype {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Object,
    Datetime64Ns,
    Timedelta64Ns,
}

impl NumpyDtype {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Object => "object",
            Self::Datetime64Ns => "datetime64[ns]",
            Self::Timedelta64Ns => "timedelta64[ns]",
        }
    }

    /// Parse a numpy dtype name or one of its common aliases.
    pub fn parse(input: &str) -> Result<Self, TypeError> {
        let out = match input.trim() {
            "bool" => Self::Bool,
            "int8" => Self::Int8,
            "int16" => Self::Int16,
            "int32" => Self::Int32,
            "int" | "int64" => Self::Int64,
            "uint8" => Self::UInt8,
            "uint16" => Self::UInt16,
            "uint32" => Self::UInt32,
            "uint" | "uint64" => Self::UInt64,
            "float32" => Self::Float32,
            "float" | "float64" => Self::Float64,
            "object" | "O" | "str" => Self::Object,
            "datetime64[ns]" | "datetime64" | "M8[ns]" => Self::Datetime64Ns,
            "timedelta64[ns]" | "timedelta64" | "m8[ns]" => Self::Timedelta64Ns,
            _ => {
                return Err(TypeError::UnparseableDtype {
                    input: input.to_owned(),
                });
            }
        };
        Ok(out)
    }

    /// Closest numpy dtype for a physical scalar dtype.
    #[must_use]
    pub fn from_physical(dtype: DType) -> Self {
        match dtype {
            DType::Bool => Self::Bool,
            DType::Int64 => Self::Int64,
            DType::Float64 => Self::Float64,
            DType::Utf8 | DType::Null => Self::Object,
            DType::Datetime64 => Self::Datetime64Ns,
            DType::Timedelta64 => Self::Timedelta64Ns,
        }
    }

    /// Physical scalar dtype used to store values; `None` for `object`,
    /// which stores any scalar as given.
    #[must_use]
    pub fn physical(self) -> Option<DType> {
        match self {
            Self::Bool => Some(DType::Bool),
            Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64 => Some(DType::Int64),
            Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64 => Some(DType::Int64),
            Self::Float32 | Self::Float64 => Some(DType::Float64),
            Self::Object => None,
            Self::Datetime64Ns => Some(DType::Datetime64),
            Self::Timedelta64Ns => Some(DType::Timedelta64),
        }
    }

    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::Int16
                | Self::Int32
                | Self::Int64
                | Self::UInt8
                | Self::UInt16
                | Self::UInt32
                | Self::UInt64
        )
    }

    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    #[must_use]
    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float() || matches!(self, Self::Bool)
    }

    #[must_use]
    pub fn is_datetimelike(self) -> bool {
        matches!(self, Self::Datetime64Ns | Self::Timedelta64Ns)
    }

    /// Missing marker for this dtype.
    #[must_use]
    pub fn na_value(self) -> Scalar {
        if self.is_datetimelike() {
            Scalar::Null(NullKind::NaT)
        } else {
            Scalar::Null(NullKind::NaN)
        }
    }

    /// Inclusive range of a narrow integer dtype. Values are stored as
    /// `i64`, so `None` for `int64` and an `i64::MAX` ceiling for `uint64`.
    #[must_use]
    pub fn integer_bounds(self) -> Option<(i64, i64)> {
        match self {
            Self::Int8 => Some((i8::MIN.into(), i8::MAX.into())),
            Self::Int16 => Some((i16::MIN.into(), i16::MAX.into())),
            Self::Int32 => Some((i32::MIN.into(), i32::MAX.into())),
            Self::UInt8 => Some((0, u8::MAX.into())),
            Self::UInt16 => Some((0, u16::MAX.into())),
            Self::UInt32 => Some((0, u32::MAX.into())),
            Self::UInt64 => Some((0, i64::MAX)),
            _ => None,
        }
    }

    /// Fill value a sparse array of this subtype uses when none is given.
    #[must_use]
    pub fn default_fill_value(self) -> Scalar {
        if self.is_integer() {
            Scalar::Int64(0)
        } else if matches!(self, Self::Bool) {
            Scalar::Bool(false)
        } else if self.is_datetimelike() {
            Scalar::Null(NullKind::NaT)
        } else {
            Scalar::Float64(f64::NAN)
        }
    }
}

impl fmt::Display for NumpyDtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Nullable string dtype. Missing slots read back as NaN.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StringDtype;

impl StringDtype {
    pub const NAME: &'static str = "string";

    #[must_use]
    pub fn na_value(self) -> Scalar {
        Scalar::Null(NullKind::NaN)
    }
}

/// Dtype of a sparse array: the dense subtype plus the fill value assumed
/// for every position that is not stored explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseDtype {
    subtype: NumpyDtype,
    fill_value: Scalar,
}

impl SparseDtype {
    #[must_use]
    pub fn new(subtype: NumpyDtype, fill_value: Option<Scalar>) -> Self {
        let fill_value = fill_value.unwrap_or_else(|| subtype.default_fill_value());
        Self {
            subtype,
            fill_value,
        }
    }

    /// Re-wrap an existing sparse dtype, optionally overriding its fill value.
    #[must_use]
    pub fn from_sparse(other: &Self, fill_value: Option<Scalar>) -> Self {
        Self {
            subtype: other.subtype,
            fill_value: fill_value.unwrap_or_else(|| other.fill_value.clone()),
        }
    }

    /// Build from a subtype name such as `"float64"`, `"int"` or `"str"`.
    pub fn from_subtype_name(name: &str, fill_value: Option<Scalar>) -> Result<Self, TypeError> {
        Ok(Self::new(NumpyDtype::parse(name)?, fill_value))
    }

    #[must_use]
    pub fn subtype(&self) -> NumpyDtype {
        self.subtype
    }

    #[must_use]
    pub fn fill_value(&self) -> &Scalar {
        &self.fill_value
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        self.subtype.is_numeric()
    }

    #[must_use]
    pub fn has_default_fill_value(&self) -> bool {
        self.fill_value
            .na_aware_eq(&self.subtype.default_fill_value())
    }

    /// Parse `Sparse`, `Sparse[<subtype>]` or `Sparse[<subtype>, <fill>]`.
    pub fn construct_from_string(input: &str) -> Result<Self, TypeError> {
        parse_sparse(input)?.ok_or_else(|| TypeError::UnparseableDtype {
            input: input.to_owned(),
        })
    }
}

impl PartialEq for SparseDtype {
    fn eq(&self, other: &Self) -> bool {
        self.subtype == other.subtype && self.fill_value.na_aware_eq(&other.fill_value)
    }
}

impl fmt::Display for SparseDtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_default_fill_value() {
            write!(f, "Sparse[{}]", self.subtype)
        } else {
            write!(f, "Sparse[{}, {}]", self.subtype, self.fill_value)
        }
    }
}

/// Logical dtype of an extension array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "snake_case")]
pub enum Dtype {
    Numpy(NumpyDtype),
    String(StringDtype),
    Sparse(SparseDtype),
}

impl Dtype {
    /// Parse a dtype string using the built-in registry.
    pub fn construct_from_string(input: &str) -> Result<Self, TypeError> {
        DtypeRegistry::builtin().find(input)
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        match self {
            Self::Numpy(d) => d.is_numeric(),
            Self::String(_) => false,
            Self::Sparse(d) => d.is_numeric(),
        }
    }

    #[must_use]
    pub fn is_extension(&self) -> bool {
        !matches!(self, Self::Numpy(_))
    }

    #[must_use]
    pub fn na_value(&self) -> Scalar {
        match self {
            Self::Numpy(d) => d.na_value(),
            Self::String(d) => d.na_value(),
            Self::Sparse(d) => d.subtype().na_value(),
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numpy(d) => write!(f, "{d}"),
            Self::String(_) => f.write_str(StringDtype::NAME),
            Self::Sparse(d) => write!(f, "{d}"),
        }
    }
}

impl From<NumpyDtype> for Dtype {
    fn from(value: NumpyDtype) -> Self {
        Self::Numpy(value)
    }
}

impl From<SparseDtype> for Dtype {
    fn from(value: SparseDtype) -> Self {
        Self::Sparse(value)
    }
}

impl From<StringDtype> for Dtype {
    fn from(value: StringDtype) -> Self {
        Self::String(value)
    }
}

// ── Registry ───────────────────────────────────────────────────────────

/// A parser returns `Ok(None)` when the input is not its pattern, and an
/// error when the input is its pattern but malformed.
pub type DtypeParser = fn(&str) -> Result<Option<Dtype>, TypeError>;

#[derive(Debug, Clone, Default)]
pub struct DtypeRegistry {
    parsers: Vec<(&'static str, DtypeParser)>,
}

impl DtypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// Registry with the string, sparse and numpy parsers, in that order.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("string", parse_string_dtype);
        registry.register("sparse", |s| Ok(parse_sparse(s)?.map(Dtype::Sparse)));
        registry.register("numpy", |s| Ok(NumpyDtype::parse(s).ok().map(Dtype::Numpy)));
        registry
    }

    #[must_use]
    pub fn builtin() -> &'static Self {
        static BUILTIN: OnceLock<DtypeRegistry> = OnceLock::new();
        BUILTIN.get_or_init(Self::with_builtins)
    }

    /// Later registrations are consulted after earlier ones.
    pub fn register(&mut self, name: &'static str, parser: DtypeParser) {
        self.parsers.push((name, parser));
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.parsers.iter().map(|(name, _)| *name).collect()
    }

    pub fn find(&self, input: &str) -> Result<Dtype, TypeError> {
        for (_, parser) in &self.parsers {
            if let Some(dtype) = parser(input)? {
                return Ok(dtype);
            }
        }
        Err(TypeError::UnparseableDtype {
            input: input.to_owned(),
        })
    }
}

fn parse_string_dtype(input: &str) -> Result<Option<Dtype>, TypeError> {
    Ok((input.trim() == StringDtype::NAME).then_some(Dtype::String(StringDtype)))
}

fn parse_sparse(input: &str) -> Result<Option<SparseDtype>, TypeError> {
    let trimmed = input.trim();
    if trimmed == "Sparse" {
        return Ok(Some(SparseDtype::new(NumpyDtype::Float64, None)));
    }
    let Some(inner) = trimmed
        .strip_prefix("Sparse[")
        .and_then(|rest| rest.strip_suffix(']'))
    else {
        return Ok(None);
    };

    let malformed = || TypeError::UnparseableDtype {
        input: input.to_owned(),
    };
    let (subtype_text, fill_text) = match inner.split_once(',') {
        Some((subtype, fill)) => (subtype.trim(), Some(fill.trim())),
        None => (inner.trim(), None),
    };
    let subtype = NumpyDtype::parse(subtype_text).map_err(|_| malformed())?;
    let fill_value = match fill_text {
        Some(text) => Some(parse_fill_value(text).ok_or_else(malformed)?),
        None => None,
    };
    Ok(Some(SparseDtype::new(subtype, fill_value)))
}

fn parse_fill_value(text: &str) -> Option<Scalar> {
    match text {
        "nan" | "NaN" => return Some(Scalar::Float64(f64::NAN)),
        "NaT" => return Some(Scalar::Null(NullKind::NaT)),
        "<NA>" | "None" => return Some(Scalar::Null(NullKind::Null)),
        "True" => return Some(Scalar::Bool(true)),
        "False" => return Some(Scalar::Bool(false)),
        _ => {}
    }
    if let Some(quoted) = text
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        return Some(Scalar::Utf8(quoted.to_owned()));
    }
    if let Some(nanos) = text.strip_prefix("datetime64(").and_then(|rest| rest.strip_suffix("ns)")) {
        return nanos.parse().ok().map(Scalar::Datetime64);
    }
    if let Some(nanos) = text.strip_prefix("timedelta64(").and_then(|rest| rest.strip_suffix("ns)")) {
        return nanos.parse().ok().map(Scalar::Timedelta64);
    }
    if let Ok(v) = text.parse::<i64>() {
        return Some(Scalar::Int64(v));
    }
    text.parse::<f64>().ok().map(Scalar::Float64)
}

//! Type registry: the closed set of scalar types a schema may declare, the
//! store-level types they map to, and the conversions between the two.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::path::StorePath;

/// Scalar types a record field or dataset element may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    /// Stored as an 8-bit unsigned integer.
    Bool,
    /// UTF-8, variable length.
    String,
    /// Opaque byte string.
    Bytes,
}

impl ScalarType {
    /// Every registered scalar type.
    pub const ALL: [ScalarType; 13] = [
        ScalarType::I8,
        ScalarType::I16,
        ScalarType::I32,
        ScalarType::I64,
        ScalarType::U8,
        ScalarType::U16,
        ScalarType::U32,
        ScalarType::U64,
        ScalarType::F32,
        ScalarType::F64,
        ScalarType::Bool,
        ScalarType::String,
        ScalarType::Bytes,
    ];

    /// Canonical registry name.
    pub fn name(self) -> &'static str {
        match self {
            ScalarType::I8 => "int8",
            ScalarType::I16 => "int16",
            ScalarType::I32 => "int32",
            ScalarType::I64 => "int64",
            ScalarType::U8 => "uint8",
            ScalarType::U16 => "uint16",
            ScalarType::U32 => "uint32",
            ScalarType::U64 => "uint64",
            ScalarType::F32 => "float32",
            ScalarType::F64 => "float64",
            ScalarType::Bool => "bool",
            ScalarType::String => "str",
            ScalarType::Bytes => "bytes",
        }
    }

    /// Look a scalar type up by its registry name or Rust spelling.
    pub fn from_name(name: &str) -> Result<Self, Error> {
        let ty = match name {
            "int8" | "i8" => ScalarType::I8,
            "int16" | "i16" => ScalarType::I16,
            "int32" | "i32" => ScalarType::I32,
            "int64" | "i64" => ScalarType::I64,
            "uint8" | "u8" => ScalarType::U8,
            "uint16" | "u16" => ScalarType::U16,
            "uint32" | "u32" => ScalarType::U32,
            "uint64" | "u64" => ScalarType::U64,
            "float32" | "f32" => ScalarType::F32,
            "float64" | "f64" | "float" => ScalarType::F64,
            "bool" => ScalarType::Bool,
            "str" | "string" | "String" => ScalarType::String,
            "bytes" => ScalarType::Bytes,
            other => return Err(Error::UnknownType(other.to_string())),
        };
        Ok(ty)
    }

    /// The store-level type values of this scalar type are written as.
    pub fn store_type(self) -> StoreType {
        match self {
            ScalarType::I8 => StoreType::I8,
            ScalarType::I16 => StoreType::I16,
            ScalarType::I32 => StoreType::I32,
            ScalarType::I64 => StoreType::I64,
            ScalarType::U8 | ScalarType::Bool => StoreType::U8,
            ScalarType::U16 => StoreType::U16,
            ScalarType::U32 => StoreType::U32,
            ScalarType::U64 => StoreType::U64,
            ScalarType::F32 => StoreType::F32,
            ScalarType::F64 => StoreType::F64,
            ScalarType::String => StoreType::VarString,
            ScalarType::Bytes => StoreType::Opaque,
        }
    }

    /// Inclusive `(min, max)` bounds of an integer type; `None` otherwise.
    pub fn range(self) -> Option<(i128, i128)> {
        match self {
            ScalarType::I8 => Some((i8::MIN as i128, i8::MAX as i128)),
            ScalarType::I16 => Some((i16::MIN as i128, i16::MAX as i128)),
            ScalarType::I32 => Some((i32::MIN as i128, i32::MAX as i128)),
            ScalarType::I64 => Some((i64::MIN as i128, i64::MAX as i128)),
            ScalarType::U8 => Some((0, u8::MAX as i128)),
            ScalarType::U16 => Some((0, u16::MAX as i128)),
            ScalarType::U32 => Some((0, u32::MAX as i128)),
            ScalarType::U64 => Some((0, u64::MAX as i128)),
            _ => None,
        }
    }

    pub fn is_integer(self) -> bool {
        self.range().is_some()
    }

    /// Build an integer value of this type, if `raw` is within range.
    pub fn integer(self, raw: i128) -> Option<ScalarValue> {
        let value = match self {
            ScalarType::I8 => ScalarValue::I8(i8::try_from(raw).ok()?),
            ScalarType::I16 => ScalarValue::I16(i16::try_from(raw).ok()?),
            ScalarType::I32 => ScalarValue::I32(i32::try_from(raw).ok()?),
            ScalarType::I64 => ScalarValue::I64(i64::try_from(raw).ok()?),
            ScalarType::U8 => ScalarValue::U8(u8::try_from(raw).ok()?),
            ScalarType::U16 => ScalarValue::U16(u16::try_from(raw).ok()?),
            ScalarType::U32 => ScalarValue::U32(u32::try_from(raw).ok()?),
            ScalarType::U64 => ScalarValue::U64(u64::try_from(raw).ok()?),
            _ => return None,
        };
        Some(value)
    }

    /// Convert a field value to its store representation.
    ///
    /// The value's runtime type must be exactly this type; there is no
    /// implicit coercion. Booleans become `uint8`.
    pub fn encode(self, value: ScalarValue, path: &StorePath, field: &str) -> Result<ScalarValue, Error> {
        if value.scalar_type() != self {
            return Err(Error::TypeMismatch {
                path: path.join(field).to_string(),
                expected: self.name().to_string(),
                actual: value.scalar_type().name().to_string(),
            });
        }
        match value {
            ScalarValue::Bool(b) => Ok(ScalarValue::U8(u8::from(b))),
            value if !value.is_storable() => Err(Error::AttributeWrite {
                path: path.to_string(),
                field: field.to_string(),
                value: value.to_string(),
                reason: NUL_IN_STRING,
            }),
            other => Ok(other),
        }
    }

    /// Convert a stored value back to this type.
    ///
    /// Opaque bytes decode into a declared string when they are UTF-8.
    /// Integers of another width are accepted when within this type's range.
    pub fn decode(self, stored: ScalarValue, path: &StorePath, field: &str) -> Result<ScalarValue, Error> {
        let mismatch = |actual: String| Error::TypeMismatch {
            path: path.join(field).to_string(),
            expected: self.name().to_string(),
            actual,
        };
        match (self, stored) {
            (ScalarType::String, ScalarValue::String(s)) => Ok(ScalarValue::String(s)),
            (ScalarType::String, ScalarValue::Bytes(b)) => String::from_utf8(b)
                .map(ScalarValue::String)
                .map_err(|_| mismatch("bytes (not UTF-8)".into())),
            (ScalarType::Bool, ScalarValue::U8(v)) => Ok(ScalarValue::Bool(v != 0)),
            (ScalarType::Bool, ScalarValue::Bool(b)) => Ok(ScalarValue::Bool(b)),
            (ScalarType::Bytes, ScalarValue::Bytes(b)) => Ok(ScalarValue::Bytes(b)),
            (ScalarType::F32, ScalarValue::F32(v)) => Ok(ScalarValue::F32(v)),
            (ScalarType::F64, ScalarValue::F64(v)) => Ok(ScalarValue::F64(v)),
            (ty, stored) if ty.is_integer() => match stored.as_i128() {
                Some(raw) => ty.integer(raw).ok_or_else(|| {
                    mismatch(format!("{} value {raw} out of range", stored.scalar_type()))
                }),
                None => Err(mismatch(stored.scalar_type().name().to_string())),
            },
            (_, stored) => Err(mismatch(stored.scalar_type().name().to_string())),
        }
    }
}

const NUL_IN_STRING: &str = "variable-length strings cannot hold NUL bytes";

/// Reject dataset elements the store cannot hold, as attributes are
/// rejected by [`ScalarType::encode`].
pub(crate) fn check_elements(path: &str, values: &[ScalarValue]) -> Result<(), Error> {
    match values.iter().find(|v| !v.is_storable()) {
        Some(bad) => Err(Error::ElementWrite {
            path: path.to_string(),
            value: bad.to_string(),
            reason: NUL_IN_STRING,
        }),
        None => Ok(()),
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single scalar value, either as a field holds it or as the store does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(#[serde(with = "float_repr::float32")] f32),
    F64(#[serde(with = "float_repr::float64")] f64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
}

impl ScalarValue {
    /// The registry type this value is an instance of.
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            ScalarValue::I8(_) => ScalarType::I8,
            ScalarValue::I16(_) => ScalarType::I16,
            ScalarValue::I32(_) => ScalarType::I32,
            ScalarValue::I64(_) => ScalarType::I64,
            ScalarValue::U8(_) => ScalarType::U8,
            ScalarValue::U16(_) => ScalarType::U16,
            ScalarValue::U32(_) => ScalarType::U32,
            ScalarValue::U64(_) => ScalarType::U64,
            ScalarValue::F32(_) => ScalarType::F32,
            ScalarValue::F64(_) => ScalarType::F64,
            ScalarValue::Bool(_) => ScalarType::Bool,
            ScalarValue::String(_) => ScalarType::String,
            ScalarValue::Bytes(_) => ScalarType::Bytes,
        }
    }

    /// Integer payload widened to `i128`; `None` for non-integers.
    pub fn as_i128(&self) -> Option<i128> {
        match *self {
            ScalarValue::I8(v) => Some(v as i128),
            ScalarValue::I16(v) => Some(v as i128),
            ScalarValue::I32(v) => Some(v as i128),
            ScalarValue::I64(v) => Some(v as i128),
            ScalarValue::U8(v) => Some(v as i128),
            ScalarValue::U16(v) => Some(v as i128),
            ScalarValue::U32(v) => Some(v as i128),
            ScalarValue::U64(v) => Some(v as i128),
            _ => None,
        }
    }

    /// Strings holding NUL cannot be stored; everything else can.
    pub fn is_storable(&self) -> bool {
        !matches!(self, ScalarValue::String(s) if s.contains('\0'))
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::I8(v) => write!(f, "{v}"),
            ScalarValue::I16(v) => write!(f, "{v}"),
            ScalarValue::I32(v) => write!(f, "{v}"),
            ScalarValue::I64(v) => write!(f, "{v}"),
            ScalarValue::U8(v) => write!(f, "{v}"),
            ScalarValue::U16(v) => write!(f, "{v}"),
            ScalarValue::U32(v) => write!(f, "{v}"),
            ScalarValue::U64(v) => write!(f, "{v}"),
            ScalarValue::F32(v) => write!(f, "{v}"),
            ScalarValue::F64(v) => write!(f, "{v}"),
            ScalarValue::Bool(v) => write!(f, "{v}"),
            ScalarValue::String(s) => write!(f, "{s:?}"),
            ScalarValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// Store-level datatype of an attribute or dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    VarString,
    Opaque,
    Compound(Vec<(String, StoreType)>),
    /// Integer enumeration; `members` records the full name → value mapping
    /// so readers without the enum type can still interpret raw values.
    Enum {
        base: Box<StoreType>,
        members: Vec<(String, i64)>,
    },
}

impl StoreType {
    /// Whether a stored element value is representable in this type.
    pub fn accepts(&self, value: &ScalarValue) -> bool {
        match (self, value) {
            (StoreType::I8, ScalarValue::I8(_))
            | (StoreType::I16, ScalarValue::I16(_))
            | (StoreType::I32, ScalarValue::I32(_))
            | (StoreType::I64, ScalarValue::I64(_))
            | (StoreType::U8, ScalarValue::U8(_))
            | (StoreType::U16, ScalarValue::U16(_))
            | (StoreType::U32, ScalarValue::U32(_))
            | (StoreType::U64, ScalarValue::U64(_))
            | (StoreType::F32, ScalarValue::F32(_))
            | (StoreType::F64, ScalarValue::F64(_))
            | (StoreType::VarString, ScalarValue::String(_))
            | (StoreType::Opaque, ScalarValue::Bytes(_))
            | (StoreType::Compound(_), ScalarValue::Bytes(_)) => true,
            (StoreType::Enum { base, .. }, value) => base.accepts(value),
            _ => false,
        }
    }

    /// Compound or opaque: the types a bytes-like declaration accepts as-is.
    pub fn is_opaque_like(&self) -> bool {
        matches!(self, StoreType::Opaque | StoreType::Compound(_))
    }
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreType::I8 => write!(f, "i8"),
            StoreType::I16 => write!(f, "i16"),
            StoreType::I32 => write!(f, "i32"),
            StoreType::I64 => write!(f, "i64"),
            StoreType::U8 => write!(f, "u8"),
            StoreType::U16 => write!(f, "u16"),
            StoreType::U32 => write!(f, "u32"),
            StoreType::U64 => write!(f, "u64"),
            StoreType::F32 => write!(f, "f32"),
            StoreType::F64 => write!(f, "f64"),
            StoreType::VarString => write!(f, "vlen_string"),
            StoreType::Opaque => write!(f, "opaque"),
            StoreType::Compound(fields) => {
                write!(f, "compound{{")?;
                for (i, (name, dt)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {dt}")?;
                }
                write!(f, "}}")
            }
            StoreType::Enum { base, members } => {
                let names: Vec<String> = members.iter().map(|(n, v)| format!("{n}={v}")).collect();
                write!(f, "enum<{base}>[{}]", names.join(", "))
            }
        }
    }
}

/// An attribute as the store holds it: a store type plus one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub dtype: StoreType,
    pub value: ScalarValue,
}

impl Attribute {
    pub fn new(dtype: StoreType, value: ScalarValue) -> Self {
        Self { dtype, value }
    }
}

/// Floats as JSON numbers, with the non-finite values spelled `"NaN"`,
/// `"inf"` and `"-inf"`.
mod float_repr {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    fn non_finite_name(v: f64) -> &'static str {
        if v.is_nan() {
            "NaN"
        } else if v > 0.0 {
            "inf"
        } else {
            "-inf"
        }
    }

    fn parse<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        match Repr::deserialize(d)? {
            Repr::Number(v) => Ok(v),
            Repr::Text(text) => match text.as_str() {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(D::Error::custom(format!("invalid float {other:?}"))),
            },
        }
    }

    pub mod float32 {
        use serde::{Deserializer, Serializer};

        pub fn serialize<S: Serializer>(v: &f32, s: S) -> Result<S::Ok, S::Error> {
            if v.is_finite() {
                s.serialize_f32(*v)
            } else {
                s.serialize_str(super::non_finite_name(f64::from(*v)))
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f32, D::Error> {
            super::parse(d).map(|v| v as f32)
        }
    }

    pub mod float64 {
        use serde::{Deserializer, Serializer};

        pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
            if v.is_finite() {
                s.serialize_f64(*v)
            } else {
                s.serialize_str(super::non_finite_name(*v))
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
            super::parse(d)
        }
    }
}

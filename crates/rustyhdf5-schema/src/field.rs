//! Record and field traits: the glue the derive macros generate against.
//!
//! A record exposes its fields to the dump engine by index
//! ([`RecordObject::field_value`]) and is rebuilt by the load engine from a
//! [`RecordBuilder`] ([`Record::from_fields`]). Field types describe
//! themselves through [`H5Field`].

use std::any::Any;
use std::rc::Rc;

use crate::dataset::{DatasetObject, Element};
use crate::error::{Error, Result, SchemaError};
use crate::schema::{DatasetType, DeclaredType, EnumType, Extent, RecordSchema, RecordType};
use crate::store::DatasetAccess;
use crate::types::{ScalarType, ScalarValue};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Object-safe view of a record instance used by the dump engine.
pub trait RecordObject {
    fn record_type(&self) -> RecordType;

    /// Value of the field at `index` in schema order.
    fn field_value(&mut self, index: usize) -> DumpValue<'_>;
}

/// A record type. Implemented by `#[derive(H5Group)]` and
/// `#[derive(H5Dataset)]`.
pub trait Record: RecordObject + Sized + 'static {
    const NAME: &'static str;

    /// Stored field names with their declared types, in declaration order.
    fn declared_fields() -> Vec<(&'static str, DeclaredType)>;

    /// The cached schema table.
    fn schema() -> std::result::Result<&'static RecordSchema, SchemaError>;

    fn from_fields(builder: RecordBuilder) -> Result<Self>;
}

/// A type usable as a record field.
pub trait H5Field: Sized {
    fn declared_type() -> DeclaredType;

    fn dump_value(&mut self) -> DumpValue<'_>;

    fn from_loaded(value: LoadedValue) -> Result<Self>;
}

/// A record that may appear in a list field. Implemented by
/// `#[derive(H5Group)]`.
///
/// `Vec<T>` is a field type only for list elements, so lists of scalars or
/// enums, and maps, are rejected when the record is compiled:
///
/// ```
/// use rustyhdf5_schema::H5Group;
///
/// #[derive(H5Group)]
/// struct Run {
///     number: u32,
/// }
///
/// #[derive(H5Group)]
/// struct Campaign {
///     runs: Vec<Run>,
/// }
/// ```
///
/// ```compile_fail
/// use std::collections::HashMap;
/// use rustyhdf5_schema::H5Group;
///
/// #[derive(H5Group)]
/// struct Lookup {
///     table: HashMap<String, f64>,
/// }
/// ```
///
/// ```compile_fail
/// use rustyhdf5_schema::{H5Enum, H5Group};
///
/// #[derive(H5Enum, Clone, Copy)]
/// enum Mode {
///     Idle,
///     Scan,
/// }
///
/// #[derive(H5Group)]
/// struct Schedule {
///     modes: Vec<Mode>,
/// }
/// ```
///
/// ```compile_fail
/// use rustyhdf5_schema::H5Group;
///
/// #[derive(H5Group)]
/// struct Series {
///     values: Vec<f64>,
/// }
/// ```
pub trait ListElement: H5Field + RecordObject {}

/// An integer-backed enumeration. Implemented by `#[derive(H5Enum)]`.
pub trait H5Enum: Sized + 'static {
    const NAME: &'static str;
    const BACKING: ScalarType;
    const MEMBERS: &'static [(&'static str, i64)];

    fn to_raw(&self) -> i64;

    fn from_raw(raw: i64) -> Option<Self>;
}

/// A dataset schema: element type, declared shape and attribute fields.
/// Implemented by `#[derive(H5Dataset)]`.
pub trait DatasetSchema: Record {
    const SHAPE: &'static [Extent];
    type Elem: Element;
}

/// One candidate of a dataset union. Implemented for
/// [`Dataset`](crate::Dataset).
pub trait UnionVariant: Sized {
    fn dataset_type() -> DatasetType;

    fn from_dataset(dataset: LoadedDataset) -> Result<Self>;
}

// ---------------------------------------------------------------------------
// Values exchanged with the engines
// ---------------------------------------------------------------------------

/// A field's value as the dump engine sees it.
pub enum DumpValue<'a> {
    Absent,
    Scalar(ScalarValue),
    Enum(i64),
    Record(&'a mut dyn RecordObject),
    List(Vec<&'a mut dyn RecordObject>),
    Dataset(&'a mut dyn DatasetObject),
}

impl DumpValue<'_> {
    pub fn label(&self) -> &'static str {
        match self {
            DumpValue::Absent => "absent",
            DumpValue::Scalar(_) => "scalar",
            DumpValue::Enum(_) => "enum",
            DumpValue::Record(_) => "record",
            DumpValue::List(_) => "list",
            DumpValue::Dataset(_) => "dataset",
        }
    }
}

/// A dataset as the load engine produces it: an open handle plus the
/// dataset's attributes, built into the schema's record type.
pub struct LoadedDataset {
    pub handle: Rc<dyn DatasetAccess>,
    pub attrs: Box<dyn Any>,
}

/// A field's value as the load engine produces it.
pub enum LoadedValue {
    Absent,
    Scalar(ScalarValue),
    Enum(i64),
    Record(Box<dyn Any>),
    List(Vec<LoadedValue>),
    Dataset(LoadedDataset),
    Union { variant: usize, dataset: LoadedDataset },
}

impl LoadedValue {
    pub fn label(&self) -> &'static str {
        match self {
            LoadedValue::Absent => "absent",
            LoadedValue::Scalar(_) => "scalar",
            LoadedValue::Enum(_) => "enum",
            LoadedValue::Record(_) => "record",
            LoadedValue::List(_) => "list",
            LoadedValue::Dataset(_) => "dataset",
            LoadedValue::Union { .. } => "union",
        }
    }

    fn unexpected(self, expected: &'static str) -> Error {
        Error::UnexpectedValue {
            expected,
            found: self.label(),
        }
    }

    /// Unwrap a loaded record of type `R`.
    pub fn into_record<R: Record>(self) -> Result<R> {
        match self {
            LoadedValue::Record(any) => any.downcast::<R>().map(|r| *r).map_err(|_| Error::UnexpectedValue {
                expected: R::NAME,
                found: "record of another type",
            }),
            other => Err(other.unexpected(R::NAME)),
        }
    }

    /// Unwrap a loaded enum value of type `E`.
    pub fn into_enum<E: H5Enum>(self) -> Result<E> {
        match self {
            LoadedValue::Enum(raw) => E::from_raw(raw).ok_or(Error::UnexpectedValue {
                expected: E::NAME,
                found: "value outside the enum",
            }),
            other => Err(other.unexpected(E::NAME)),
        }
    }

    pub fn into_dataset(self) -> Result<LoadedDataset> {
        match self {
            LoadedValue::Dataset(dataset) => Ok(dataset),
            other => Err(other.unexpected("dataset")),
        }
    }
}

// ---------------------------------------------------------------------------
// Incremental builder
// ---------------------------------------------------------------------------

/// Loaded field values of one record, consumed field by field by the
/// generated constructor.
///
/// The first field that fails to convert aborts construction with
/// [`Error::Build`] naming the record and field.
pub struct RecordBuilder {
    record: &'static str,
    values: Vec<(&'static str, LoadedValue)>,
}

impl RecordBuilder {
    pub fn new(record: &'static str) -> Self {
        Self {
            record,
            values: Vec::new(),
        }
    }

    pub fn push(&mut self, field: &'static str, value: LoadedValue) {
        self.values.push((field, value));
    }

    /// Take and convert the value stored under `field`. A field that was
    /// never pushed converts from [`LoadedValue::Absent`].
    pub fn take<T: H5Field>(&mut self, field: &'static str) -> Result<T> {
        let value = match self.values.iter().position(|(name, _)| *name == field) {
            Some(i) => self.values.swap_remove(i).1,
            None => LoadedValue::Absent,
        };
        T::from_loaded(value).map_err(|e| Error::Build {
            record: self.record,
            field,
            source: Box::new(e),
        })
    }
}

// ---------------------------------------------------------------------------
// Field impls
// ---------------------------------------------------------------------------

macro_rules! scalar_field {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl H5Field for $ty {
                fn declared_type() -> DeclaredType {
                    DeclaredType::Scalar(ScalarType::$variant)
                }

                fn dump_value(&mut self) -> DumpValue<'_> {
                    DumpValue::Scalar(ScalarValue::$variant(self.clone()))
                }

                fn from_loaded(value: LoadedValue) -> Result<Self> {
                    match value {
                        LoadedValue::Scalar(ScalarValue::$variant(v)) => Ok(v),
                        other => Err(other.unexpected(ScalarType::$variant.name())),
                    }
                }
            }
        )*
    };
}

scalar_field! {
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    bool => Bool,
    String => String,
}

/// An opaque byte string; the bytes-like declared type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bytes(pub Vec<u8>);

impl From<Vec<u8>> for Bytes {
    fn from(v: Vec<u8>) -> Self {
        Bytes(v)
    }
}

impl H5Field for Bytes {
    fn declared_type() -> DeclaredType {
        DeclaredType::Scalar(ScalarType::Bytes)
    }

    fn dump_value(&mut self) -> DumpValue<'_> {
        DumpValue::Scalar(ScalarValue::Bytes(self.0.clone()))
    }

    fn from_loaded(value: LoadedValue) -> Result<Self> {
        match value {
            LoadedValue::Scalar(ScalarValue::Bytes(b)) => Ok(Bytes(b)),
            other => Err(other.unexpected("bytes")),
        }
    }
}

impl<T: H5Field> H5Field for Option<T> {
    fn declared_type() -> DeclaredType {
        DeclaredType::Optional(Box::new(T::declared_type()))
    }

    fn dump_value(&mut self) -> DumpValue<'_> {
        match self {
            Some(v) => v.dump_value(),
            None => DumpValue::Absent,
        }
    }

    fn from_loaded(value: LoadedValue) -> Result<Self> {
        match value {
            LoadedValue::Absent => Ok(None),
            other => T::from_loaded(other).map(Some),
        }
    }
}

impl<T: ListElement> H5Field for Vec<T> {
    fn declared_type() -> DeclaredType {
        DeclaredType::Sequence(Box::new(T::declared_type()))
    }

    fn dump_value(&mut self) -> DumpValue<'_> {
        DumpValue::List(self.iter_mut().map(|item| item as &mut dyn RecordObject).collect())
    }

    fn from_loaded(value: LoadedValue) -> Result<Self> {
        match value {
            LoadedValue::List(items) => items.into_iter().map(T::from_loaded).collect(),
            other => Err(other.unexpected("list")),
        }
    }
}

/// [`H5Field::declared_type`] for an enum field.
pub fn enum_declared_type<E: H5Enum>() -> DeclaredType {
    DeclaredType::Enum(EnumType::of::<E>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_fields_round_trip_through_values() {
        let mut x = 42i32;
        let DumpValue::Scalar(v) = x.dump_value() else {
            panic!("expected scalar");
        };
        assert_eq!(v, ScalarValue::I32(42));
        assert_eq!(i32::from_loaded(LoadedValue::Scalar(v)).unwrap(), 42);
    }

    #[test]
    fn scalar_from_wrong_variant_fails() {
        let err = String::from_loaded(LoadedValue::Scalar(ScalarValue::I32(1))).unwrap_err();
        assert!(matches!(err, Error::UnexpectedValue { expected: "str", found: "scalar" }));
    }

    #[test]
    fn optional_absent() {
        let mut none: Option<f64> = None;
        assert!(matches!(none.dump_value(), DumpValue::Absent));
        assert_eq!(Option::<f64>::from_loaded(LoadedValue::Absent).unwrap(), None);
        assert_eq!(
            Option::<f64>::from_loaded(LoadedValue::Scalar(ScalarValue::F64(1.5))).unwrap(),
            Some(1.5)
        );
    }

    #[test]
    fn declared_types() {
        assert_eq!(
            Option::<u8>::declared_type(),
            DeclaredType::Optional(Box::new(DeclaredType::Scalar(ScalarType::U8)))
        );
        assert_eq!(Bytes::declared_type(), DeclaredType::Scalar(ScalarType::Bytes));
    }

    #[test]
    fn builder_surfaces_first_failing_field() {
        let mut builder = RecordBuilder::new("Reading");
        builder.push("temp", LoadedValue::Scalar(ScalarValue::String("hot".into())));
        let err = builder.take::<f64>("temp").unwrap_err();
        match err {
            Error::Build { record, field, source } => {
                assert_eq!(record, "Reading");
                assert_eq!(field, "temp");
                assert!(matches!(*source, Error::UnexpectedValue { expected: "float64", .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn builder_missing_field_is_absent() {
        let mut builder = RecordBuilder::new("Reading");
        assert_eq!(builder.take::<Option<i64>>("count").unwrap(), None);
        assert!(builder.take::<i64>("count").is_err());
    }
}

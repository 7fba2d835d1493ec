//! Error types for schema declaration, dump and load.

use thiserror::Error;

use crate::selection::SelectionError;
use crate::store::StoreError;
use crate::types::ScalarType;

/// Errors raised while building a record's schema table.
///
/// These are definition-time errors: they depend only on the declared types,
/// never on an instance or a store, and surface before any store access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A container other than a list of records, in a hand-built field table.
    #[error("{record}.{field}: only lists of records are supported, not `{container}`")]
    UnsupportedContainer {
        record: &'static str,
        field: &'static str,
        container: String,
    },

    /// A list whose elements are an enum.
    #[error("{record}.{field}: lists of enums are not supported (`{enum_name}`)")]
    ListOfEnum {
        record: &'static str,
        field: &'static str,
        enum_name: &'static str,
    },

    /// Two fields map to the same stored name, usually through `rename`.
    #[error("{record}: field `{field}` is declared twice")]
    DuplicateField { record: &'static str, field: &'static str },

    /// Empty names, `.`, `..`, or names containing `/`.
    #[error("{record}: `{field}` is not a valid stored name")]
    InvalidFieldName { record: &'static str, field: &'static str },

    /// `Option<Option<T>>`.
    #[error("{record}.{field}: optional of optional is not supported")]
    NestedOptional { record: &'static str, field: &'static str },

    /// A dataset schema field that is not a scalar or an enum.
    #[error("{record}.{field}: dataset attributes must be scalars or enums, not {kind}")]
    DatasetMember {
        record: &'static str,
        field: &'static str,
        kind: &'static str,
    },

    /// A union without candidates.
    #[error("{record}.{field}: a dataset union needs at least one candidate")]
    EmptyUnion { record: &'static str, field: &'static str },

    /// An enum whose `repr` is not an integer type.
    #[error("enum {enum_name}: backing type {backing} is not an integer type")]
    EnumBacking {
        enum_name: &'static str,
        backing: ScalarType,
    },

    /// A member value outside the backing type's range.
    #[error("enum {enum_name}: member {member}={value} does not fit in {backing}")]
    EnumValueOutOfRange {
        enum_name: &'static str,
        member: &'static str,
        value: i64,
        backing: ScalarType,
    },

    /// Two members share one value.
    #[error("enum {enum_name}: value {value} is used by more than one member")]
    DuplicateEnumValue { enum_name: &'static str, value: i64 },
}

/// Errors that can occur while dumping or loading a record tree.
#[derive(Debug, Error)]
pub enum Error {
    /// The record's schema table could not be built.
    #[error("schema definition error: {0}")]
    Schema(#[from] SchemaError),

    /// A type name not in the registry.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// A value or stored type differs from the declared one.
    #[error("type mismatch at {path}: expected {expected}, got {actual}")]
    TypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// A stored or supplied shape does not match the declared extents.
    #[error("shape mismatch at {path}: expected {expected}, got {actual:?}")]
    ShapeMismatch {
        path: String,
        expected: String,
        actual: Vec<u64>,
    },

    /// An attribute value the store cannot hold.
    #[error("cannot write attribute {field} at {path} with value {value}: {reason}")]
    AttributeWrite {
        path: String,
        field: String,
        value: String,
        reason: &'static str,
    },

    /// A required attribute is absent from the store.
    #[error("missing attribute {name} at {path}")]
    MissingAttribute { path: String, name: String },

    /// A required group or dataset is absent from the store.
    #[error("missing required object at {path}")]
    MissingObject { path: String },

    /// A required record, list or dataset field holds no value on dump.
    #[error("required field {field} at {path} has no value")]
    MissingValue { path: String, field: String },

    /// List children that are not the indices `0..n`.
    #[error("malformed list at {path}: {reason}")]
    MalformedList { path: String, reason: String },

    /// A stored integer that is not a member of the enum.
    #[error("invalid value {value} for enum {enum_name} at {path}")]
    InvalidEnumValue {
        path: String,
        enum_name: &'static str,
        value: i128,
    },

    /// A write to a dataset whose data was supplied at construction.
    #[error("dataset {0} was bound at construction and cannot be modified")]
    ImmutableDataset(String),

    /// A read or write on a dataset with no buffer and no handle.
    #[error("dataset {0} has neither data nor an open store handle")]
    UnboundDataset(String),

    /// A dataset without data whose declared shape has wildcards.
    #[error("dataset at {path} has wildcard shape {shape} and no data to fix it")]
    UnresolvedShape { path: String, shape: String },

    /// A buffer whose length is not the product of its shape.
    #[error("buffer holds {actual} elements, shape requires {expected}")]
    BufferLength { expected: u64, actual: u64 },

    /// A dataset element the store cannot hold.
    #[error("cannot write element {value} to dataset {path}: {reason}")]
    ElementWrite {
        path: String,
        value: String,
        reason: &'static str,
    },

    /// Datasets left unwritten by a strict dump, by qualified name.
    #[error("the following datasets were not written to: {}", .datasets.join(", "))]
    PartialDump { datasets: Vec<String> },

    /// No union candidate accepts the stored shape.
    #[error("no union candidate matches stored shape {actual:?} at {path}")]
    NoMatchingUnionVariant { path: String, actual: Vec<u64> },

    /// Store keys outside the schema, with `deny_unmapped` set.
    #[error("store keys not described by the schema: {}", .0.join(", "))]
    UnmappedKeys(Vec<String>),

    /// A field value whose kind differs from its schema entry.
    #[error("field {field} at {path}: schema declares {expected}, instance holds {found}")]
    KindMismatch {
        path: String,
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A loaded value handed to the wrong field type.
    #[error("expected a {expected} value, found {found}")]
    UnexpectedValue {
        expected: &'static str,
        found: &'static str,
    },

    /// Constructing a record from loaded fields failed at `field`.
    #[error("building {record}: field {field}: {source}")]
    Build {
        record: &'static str,
        field: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// The store rejected an operation.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A selection that does not fit the dataset's shape.
    #[error("selection error: {0}")]
    Selection(#[from] SelectionError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_dump_lists_datasets() {
        let err = Error::PartialDump {
            datasets: vec!["Experiment.manData".into(), "Experiment.other".into()],
        };
        assert_eq!(
            err.to_string(),
            "the following datasets were not written to: Experiment.manData, Experiment.other"
        );
    }

    #[test]
    fn schema_errors_convert() {
        let err: Error = SchemaError::DuplicateField {
            record: "Experiment",
            field: "a",
        }
        .into();
        assert!(matches!(err, Error::Schema(SchemaError::DuplicateField { .. })));
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn build_error_has_source() {
        use std::error::Error as _;
        let err = Error::Build {
            record: "Reading",
            field: "temp",
            source: Box::new(Error::UnexpectedValue {
                expected: "scalar",
                found: "record",
            }),
        };
        assert!(err.source().is_some());
    }
}

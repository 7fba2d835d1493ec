//! Per-record schema tables and the field classifier.
//!
//! Every record type owns one [`RecordSchema`]: its stored field names in
//! declaration order, each classified into a closed [`FieldKind`]. Schemas
//! are built from the [`DeclaredType`]s a derive reports, once per type, and
//! never change afterwards.

use std::any::{Any, TypeId};
use std::collections::HashSet;
use std::fmt;

use crate::dataset::Element;
use crate::error::{Error, SchemaError};
use crate::field::{DatasetSchema, H5Enum, Record, RecordBuilder};
use crate::types::{ScalarType, StoreType};

// ---------------------------------------------------------------------------
// Shapes
// ---------------------------------------------------------------------------

/// One declared dataset extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extent {
    Fixed(u64),
    /// Wildcard: matches any extent.
    Any,
}

impl Extent {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            Extent::Fixed(n) => n == actual,
            Extent::Any => true,
        }
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extent::Fixed(n) => write!(f, "{n}"),
            Extent::Any => f.write_str("*"),
        }
    }
}

/// Equal rank and every non-wildcard extent equal.
pub fn shape_matches(declared: &[Extent], actual: &[u64]) -> bool {
    declared.len() == actual.len() && declared.iter().zip(actual).all(|(d, &a)| d.matches(a))
}

/// The concrete shape of a declaration without wildcards.
pub fn fixed_shape(declared: &[Extent]) -> Option<Vec<u64>> {
    declared
        .iter()
        .map(|e| match e {
            Extent::Fixed(n) => Some(*n),
            Extent::Any => None,
        })
        .collect()
}

/// Render a declared shape as `(3, *)`.
pub fn format_shape(declared: &[Extent]) -> String {
    let parts: Vec<String> = declared.iter().map(Extent::to_string).collect();
    if parts.len() == 1 {
        format!("({},)", parts[0])
    } else {
        format!("({})", parts.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Type descriptors
// ---------------------------------------------------------------------------

/// Descriptor of an enum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumType {
    pub name: &'static str,
    pub backing: ScalarType,
    pub members: &'static [(&'static str, i64)],
}

impl EnumType {
    pub fn of<E: H5Enum>() -> Self {
        Self {
            name: E::NAME,
            backing: E::BACKING,
            members: E::MEMBERS,
        }
    }

    /// Backing integer type tagged with the full name → value mapping.
    pub fn store_type(&self) -> StoreType {
        StoreType::Enum {
            base: Box::new(self.backing.store_type()),
            members: self
                .members
                .iter()
                .map(|&(name, value)| (name.to_string(), value))
                .collect(),
        }
    }

    /// The member value equal to `raw`, if any.
    pub fn member_value(&self, raw: i128) -> Option<i64> {
        self.members
            .iter()
            .map(|&(_, v)| v)
            .find(|&v| v as i128 == raw)
    }

    /// Backing must be an integer type holding every member value, and
    /// values must be distinct.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let Some((min, max)) = self.backing.range() else {
            return Err(SchemaError::EnumBacking {
                enum_name: self.name,
                backing: self.backing,
            });
        };
        let mut seen = HashSet::new();
        for &(member, value) in self.members {
            if (value as i128) < min || (value as i128) > max {
                return Err(SchemaError::EnumValueOutOfRange {
                    enum_name: self.name,
                    member,
                    value,
                    backing: self.backing,
                });
            }
            if !seen.insert(value) {
                return Err(SchemaError::DuplicateEnumValue {
                    enum_name: self.name,
                    value,
                });
            }
        }
        Ok(())
    }
}

/// Descriptor of a record type: its name, schema table and constructor.
#[derive(Clone, Copy)]
pub struct RecordType {
    pub name: &'static str,
    id: TypeId,
    schema: fn() -> Result<&'static RecordSchema, SchemaError>,
    build: fn(RecordBuilder) -> Result<Box<dyn Any>, Error>,
}

fn build_boxed<R: Record>(builder: RecordBuilder) -> Result<Box<dyn Any>, Error> {
    Ok(Box::new(R::from_fields(builder)?))
}

impl RecordType {
    pub fn of<R: Record>() -> Self {
        Self {
            name: R::NAME,
            id: TypeId::of::<R>(),
            schema: R::schema,
            build: build_boxed::<R>,
        }
    }

    pub fn schema(&self) -> Result<&'static RecordSchema, SchemaError> {
        (self.schema)()
    }

    /// Construct an instance from loaded field values.
    pub fn build(&self, builder: RecordBuilder) -> Result<Box<dyn Any>, Error> {
        (self.build)(builder)
    }
}

impl PartialEq for RecordType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RecordType").field(&self.name).finish()
    }
}

/// Descriptor of a dataset schema.
#[derive(Clone, Copy)]
pub struct DatasetType {
    pub name: &'static str,
    pub shape: &'static [Extent],
    pub bytes_like: bool,
    store_type: fn() -> StoreType,
    /// Record type of the dataset's attributes.
    pub attrs: RecordType,
}

impl DatasetType {
    pub fn of<S: DatasetSchema>() -> Self {
        Self {
            name: S::NAME,
            shape: S::SHAPE,
            bytes_like: S::Elem::bytes_like(),
            store_type: S::Elem::store_type,
            attrs: RecordType::of::<S>(),
        }
    }

    /// Store type of the dataset's elements.
    pub fn store_type(&self) -> StoreType {
        (self.store_type)()
    }

    /// Whether a stored element type satisfies this declaration.
    pub fn accepts_dtype(&self, dtype: &StoreType) -> bool {
        *dtype == self.store_type() || (self.bytes_like && dtype.is_opaque_like())
    }
}

impl PartialEq for DatasetType {
    fn eq(&self, other: &Self) -> bool {
        self.attrs == other.attrs
    }
}

impl fmt::Debug for DatasetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetType")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .field("dtype", &self.store_type())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// A field's type as written in the record declaration, before
/// classification.
#[derive(Debug, Clone, PartialEq)]
pub enum DeclaredType {
    Scalar(ScalarType),
    Enum(EnumType),
    Record(RecordType),
    Dataset(DatasetType),
    Union(Vec<DatasetType>),
    Sequence(Box<DeclaredType>),
    Mapping(&'static str),
    Optional(Box<DeclaredType>),
}

impl DeclaredType {
    fn describe(&self) -> String {
        match self {
            DeclaredType::Scalar(ty) => ty.name().to_string(),
            DeclaredType::Enum(e) => format!("enum {}", e.name),
            DeclaredType::Record(r) => r.name.to_string(),
            DeclaredType::Dataset(d) => format!("dataset {}", d.name),
            DeclaredType::Union(_) => "dataset union".to_string(),
            DeclaredType::Sequence(inner) => format!("Vec<{}>", inner.describe()),
            DeclaredType::Mapping(name) => (*name).to_string(),
            DeclaredType::Optional(inner) => format!("Option<{}>", inner.describe()),
        }
    }
}

/// The closed set of field kinds the engines dispatch on.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Scalar(ScalarType),
    Enum(EnumType),
    Record(RecordType),
    List(RecordType),
    Dataset(DatasetType),
    Union(Vec<DatasetType>),
}

impl FieldKind {
    pub fn label(&self) -> &'static str {
        match self {
            FieldKind::Scalar(_) => "scalar attribute",
            FieldKind::Enum(_) => "enum attribute",
            FieldKind::Record(_) => "nested record",
            FieldKind::List(_) => "list of records",
            FieldKind::Dataset(_) => "dataset",
            FieldKind::Union(_) => "dataset union",
        }
    }

    /// Whether the field is stored as an attribute of its owner.
    pub fn is_attribute(&self) -> bool {
        matches!(self, FieldKind::Scalar(_) | FieldKind::Enum(_))
    }
}

/// Classify one declared field type. Returns the kind and whether the field
/// is required.
pub fn classify(
    record: &'static str,
    field: &'static str,
    declared: &DeclaredType,
) -> Result<(FieldKind, bool), SchemaError> {
    match declared {
        DeclaredType::Optional(inner) => Ok((classify_required(record, field, inner)?, false)),
        other => Ok((classify_required(record, field, other)?, true)),
    }
}

fn classify_required(
    record: &'static str,
    field: &'static str,
    declared: &DeclaredType,
) -> Result<FieldKind, SchemaError> {
    let kind = match declared {
        DeclaredType::Sequence(inner) => match inner.as_ref() {
            DeclaredType::Record(rt) => FieldKind::List(*rt),
            DeclaredType::Enum(e) => {
                return Err(SchemaError::ListOfEnum {
                    record,
                    field,
                    enum_name: e.name,
                })
            }
            _ => {
                return Err(SchemaError::UnsupportedContainer {
                    record,
                    field,
                    container: declared.describe(),
                })
            }
        },
        DeclaredType::Mapping(_) => {
            return Err(SchemaError::UnsupportedContainer {
                record,
                field,
                container: declared.describe(),
            })
        }
        DeclaredType::Enum(e) => {
            e.validate()?;
            FieldKind::Enum(*e)
        }
        DeclaredType::Dataset(d) => FieldKind::Dataset(*d),
        DeclaredType::Record(r) => FieldKind::Record(*r),
        DeclaredType::Union(candidates) => {
            if candidates.is_empty() {
                return Err(SchemaError::EmptyUnion { record, field });
            }
            FieldKind::Union(candidates.clone())
        }
        DeclaredType::Scalar(ty) => FieldKind::Scalar(*ty),
        DeclaredType::Optional(_) => return Err(SchemaError::NestedOptional { record, field }),
    };
    Ok(kind)
}

// ---------------------------------------------------------------------------
// Record schemas
// ---------------------------------------------------------------------------

/// What a record's fields are stored on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordRole {
    /// A group: fields may be of any kind.
    Group,
    /// A dataset: fields are attributes of the dataset object.
    DatasetAttributes,
}

/// One classified field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Stored name.
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldDescriptor {
    /// Declared shape of a dataset field; the first candidate's for a union.
    pub fn declared_shape(&self) -> Option<&'static [Extent]> {
        match &self.kind {
            FieldKind::Dataset(d) => Some(d.shape),
            FieldKind::Union(c) => c.first().map(|d| d.shape),
            _ => None,
        }
    }

    pub fn scalar_type(&self) -> Option<ScalarType> {
        match &self.kind {
            FieldKind::Scalar(ty) => Some(*ty),
            FieldKind::Enum(e) => Some(e.backing),
            _ => None,
        }
    }
}

/// The schema table of one record type.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    pub name: &'static str,
    pub role: RecordRole,
    fields: Vec<FieldDescriptor>,
}

impl RecordSchema {
    /// Classify every declared field, rejecting duplicate or unusable names
    /// and unsupported field types.
    pub fn build(
        name: &'static str,
        role: RecordRole,
        declared: Vec<(&'static str, DeclaredType)>,
    ) -> Result<Self, SchemaError> {
        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(declared.len());
        for (field, ty) in declared {
            if field.is_empty() || field.contains('/') || field == "." || field == ".." {
                return Err(SchemaError::InvalidFieldName { record: name, field });
            }
            if !seen.insert(field) {
                return Err(SchemaError::DuplicateField { record: name, field });
            }
            let (kind, required) = classify(name, field, &ty)?;
            if role == RecordRole::DatasetAttributes && !kind.is_attribute() {
                return Err(SchemaError::DatasetMember {
                    record: name,
                    field,
                    kind: kind.label(),
                });
            }
            fields.push(FieldDescriptor {
                name: field,
                kind,
                required,
            });
        }
        Ok(Self { name, role, fields })
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Build and check the schema of every record type reachable from `root`.
pub fn validate_tree(root: RecordType) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    let mut stack = vec![root];
    while let Some(rt) = stack.pop() {
        if !seen.insert(rt.id) {
            continue;
        }
        for field in rt.schema()?.fields() {
            match &field.kind {
                FieldKind::Record(r) | FieldKind::List(r) => stack.push(*r),
                FieldKind::Dataset(d) => stack.push(d.attrs),
                FieldKind::Union(candidates) => stack.extend(candidates.iter().map(|d| d.attrs)),
                FieldKind::Scalar(_) | FieldKind::Enum(_) => {}
            }
        }
    }
    Ok(())
}

//! Load engine: rebuilds a record tree from a store, validating it against
//! the schema on the way.

use std::any::Any;
use std::rc::Rc;

use tracing::{debug, info_span, warn};

use crate::error::{Error, Result};
use crate::field::{LoadedDataset, LoadedValue, RecordBuilder};
use crate::path::StorePath;
use crate::schema::{format_shape, shape_matches, validate_tree, DatasetType, FieldDescriptor, FieldKind, RecordSchema, RecordType};
use crate::store::{AttributeAccess, DatasetAccess, Store};

/// Store keys found during a load that no schema field describes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    unmapped: Vec<String>,
}

impl LoadReport {
    /// Unmapped keys: child objects as their path, attributes as
    /// `owner@name`.
    pub fn unmapped(&self) -> &[String] {
        &self.unmapped
    }

    pub fn is_clean(&self) -> bool {
        self.unmapped.is_empty()
    }
}

/// State of one load walk.
pub(crate) struct LoadContext<'s> {
    store: &'s dyn Store,
    unmapped: Vec<String>,
}

/// Load an instance of `record_type` from `root`.
pub fn load_record(
    store: &dyn Store,
    record_type: RecordType,
    root: &StorePath,
) -> Result<(Box<dyn Any>, LoadReport)> {
    validate_tree(record_type)?;

    let span = info_span!("load", record = record_type.name, root = %root);
    let _enter = span.enter();

    let mut ctx = LoadContext {
        store,
        unmapped: Vec::new(),
    };
    let value = ctx.record(record_type, root)?;
    for key in &ctx.unmapped {
        warn!(key = %key, "store key not described by the schema");
    }
    Ok((value, LoadReport { unmapped: ctx.unmapped }))
}

impl LoadContext<'_> {
    fn record(&mut self, record_type: RecordType, prefix: &StorePath) -> Result<Box<dyn Any>> {
        let schema = record_type.schema()?;
        let group = self.store.open_group(prefix)?;
        debug!(path = %prefix, record = schema.name, "reading group");
        let mut builder = RecordBuilder::new(schema.name);
        for field in schema.fields() {
            let value = self.field(&*group, prefix, field)?;
            builder.push(field.name, value);
        }
        self.note_unmapped_attributes(&*group, prefix, schema)?;
        for child in group.child_names()? {
            let known = schema
                .field(&child)
                .is_some_and(|f| !f.kind.is_attribute());
            if !known {
                self.unmapped.push(prefix.join(&child).to_string());
            }
        }
        record_type.build(builder)
    }

    fn note_unmapped_attributes<A>(&mut self, owner: &A, prefix: &StorePath, schema: &RecordSchema) -> Result<()>
    where
        A: AttributeAccess + ?Sized,
    {
        for key in owner.attribute_keys()? {
            let known = schema.field(&key).is_some_and(|f| f.kind.is_attribute());
            if !known {
                self.unmapped.push(format!("{prefix}@{key}"));
            }
        }
        Ok(())
    }

    /// `Absent` for an optional field, `MissingObject` for a required one.
    fn absent(field: &FieldDescriptor, path: &StorePath) -> Result<LoadedValue> {
        if field.required {
            return Err(Error::MissingObject {
                path: path.to_string(),
            });
        }
        Ok(LoadedValue::Absent)
    }

    fn field<A>(&mut self, owner: &A, prefix: &StorePath, field: &FieldDescriptor) -> Result<LoadedValue>
    where
        A: AttributeAccess + ?Sized,
    {
        if field.kind.is_attribute() {
            return self.attribute(owner, prefix, field);
        }
        let path = prefix.join(field.name);
        if !self.store.exists(&path)? {
            return Self::absent(field, &path);
        }
        match &field.kind {
            FieldKind::Record(rt) => Ok(LoadedValue::Record(self.record(*rt, &path)?)),
            FieldKind::List(rt) => {
                let group = self.store.open_group(&path)?;
                let len = list_len(&path, group.child_names()?)?;
                for key in group.attribute_keys()? {
                    self.unmapped.push(format!("{path}@{key}"));
                }
                debug!(path = %path, len, "reading list");
                let mut items = Vec::with_capacity(len);
                for i in 0..len {
                    items.push(LoadedValue::Record(self.record(*rt, &path.join(&i.to_string()))?));
                }
                Ok(LoadedValue::List(items))
            }
            FieldKind::Dataset(ty) => {
                let handle = self.store.open_dataset(&path)?;
                Ok(LoadedValue::Dataset(self.dataset(ty, handle, &path)?))
            }
            FieldKind::Union(candidates) => {
                let handle = self.store.open_dataset(&path)?;
                let shape = handle.shape()?;
                let Some(variant) = candidates.iter().position(|c| shape_matches(c.shape, &shape)) else {
                    return Err(Error::NoMatchingUnionVariant {
                        path: path.to_string(),
                        actual: shape,
                    });
                };
                debug!(path = %path, variant = candidates[variant].name, "resolved dataset union");
                let dataset = self.dataset(&candidates[variant], handle, &path)?;
                Ok(LoadedValue::Union { variant, dataset })
            }
            FieldKind::Scalar(_) | FieldKind::Enum(_) => self.attribute(owner, prefix, field),
        }
    }

    fn attribute<A>(&mut self, owner: &A, prefix: &StorePath, field: &FieldDescriptor) -> Result<LoadedValue>
    where
        A: AttributeAccess + ?Sized,
    {
        let Some(attr) = owner.attribute(field.name)? else {
            if field.required {
                return Err(Error::MissingAttribute {
                    path: prefix.to_string(),
                    name: field.name.to_string(),
                });
            }
            return Ok(LoadedValue::Absent);
        };
        debug!(path = %prefix, attribute = field.name, value = %attr.value, "read attribute");
        match &field.kind {
            FieldKind::Scalar(ty) => Ok(LoadedValue::Scalar(ty.decode(attr.value, prefix, field.name)?)),
            FieldKind::Enum(e) => {
                let Some(raw) = attr.value.as_i128() else {
                    return Err(Error::TypeMismatch {
                        path: prefix.join(field.name).to_string(),
                        expected: format!("enum {}", e.name),
                        actual: attr.dtype.to_string(),
                    });
                };
                e.member_value(raw)
                    .map(LoadedValue::Enum)
                    .ok_or_else(|| Error::InvalidEnumValue {
                        path: prefix.join(field.name).to_string(),
                        enum_name: e.name,
                        value: raw,
                    })
            }
            other => Err(Error::UnexpectedValue {
                expected: other.label(),
                found: "attribute",
            }),
        }
    }

    /// Validate a stored dataset against `ty` and load its attributes. The
    /// data itself is left in the store.
    fn dataset(&mut self, ty: &DatasetType, handle: Rc<dyn DatasetAccess>, path: &StorePath) -> Result<LoadedDataset> {
        let shape = handle.shape()?;
        if !shape_matches(ty.shape, &shape) {
            return Err(Error::ShapeMismatch {
                path: path.to_string(),
                expected: format_shape(ty.shape),
                actual: shape,
            });
        }
        let dtype = handle.dtype()?;
        if !ty.accepts_dtype(&dtype) {
            return Err(Error::TypeMismatch {
                path: path.to_string(),
                expected: ty.store_type().to_string(),
                actual: dtype.to_string(),
            });
        }
        debug!(path = %path, %dtype, ?shape, "bound dataset");

        let schema = ty.attrs.schema()?;
        let mut builder = RecordBuilder::new(schema.name);
        for field in schema.fields() {
            let value = self.attribute(&*handle, path, field)?;
            builder.push(field.name, value);
        }
        self.note_unmapped_attributes(&*handle, path, schema)?;
        let attrs = ty.attrs.build(builder)?;
        Ok(LoadedDataset { handle, attrs })
    }
}

/// Number of elements of a stored list: child names must be the canonical
/// decimal indices `0..n`.
fn list_len(path: &StorePath, names: Vec<String>) -> Result<usize> {
    let mut indices = Vec::with_capacity(names.len());
    for name in names {
        let index: usize = name.parse().map_err(|_| Error::MalformedList {
            path: path.to_string(),
            reason: format!("child {name:?} is not an integer index"),
        })?;
        if index.to_string() != name {
            return Err(Error::MalformedList {
                path: path.to_string(),
                reason: format!("child {name:?} is not a canonical index"),
            });
        }
        indices.push(index);
    }
    indices.sort_unstable();
    for (expected, &index) in indices.iter().enumerate() {
        if index != expected {
            return Err(Error::MalformedList {
                path: path.to_string(),
                reason: format!("indices are not contiguous: {expected} is missing"),
            });
        }
    }
    Ok(indices.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn list_indices_sorted_numerically() {
        let path = StorePath::parse("/items");
        let len = list_len(&path, names(&["10", "2", "0", "1", "3", "4", "5", "6", "7", "8", "9"])).unwrap();
        assert_eq!(len, 11);
        assert_eq!(list_len(&path, Vec::new()).unwrap(), 0);
    }

    #[test]
    fn list_gap_is_malformed() {
        let err = list_len(&StorePath::parse("/items"), names(&["0", "2"])).unwrap_err();
        assert!(matches!(err, Error::MalformedList { ref reason, .. } if reason.contains("1 is missing")));
    }

    #[test]
    fn list_non_integer_is_malformed() {
        let err = list_len(&StorePath::parse("/items"), names(&["0", "x"])).unwrap_err();
        assert!(matches!(err, Error::MalformedList { .. }));
        let err = list_len(&StorePath::parse("/items"), names(&["00"])).unwrap_err();
        assert!(matches!(err, Error::MalformedList { .. }));
    }
}

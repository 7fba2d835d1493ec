//! Dump engine: writes a record tree into a store.

use tracing::{debug, info_span};

use crate::dataset::DatasetObject;
use crate::error::{Error, Result};
use crate::field::{DumpValue, RecordObject};
use crate::path::StorePath;
use crate::schema::{fixed_shape, format_shape, shape_matches, validate_tree, FieldDescriptor, FieldKind};
use crate::selection::Selection;
use crate::store::{AttributeAccess, Store};
use crate::types::{check_elements, Attribute};

/// State of one dump walk.
pub(crate) struct DumpContext<'s> {
    store: &'s dyn Store,
    unwritten: Vec<StorePath>,
}

/// Dump `record` at `root` and return the paths of datasets left without
/// data.
///
/// The whole schema tree is validated before the store is touched.
pub fn dump_record(
    store: &dyn Store,
    record: &mut dyn RecordObject,
    root: &StorePath,
) -> Result<Vec<StorePath>> {
    let record_type = record.record_type();
    validate_tree(record_type)?;

    let span = info_span!("dump", record = record_type.name, root = %root);
    let _enter = span.enter();

    let mut ctx = DumpContext {
        store,
        unwritten: Vec::new(),
    };
    ctx.record(record, root)?;
    debug!(unwritten = ctx.unwritten.len(), "dump finished");
    Ok(ctx.unwritten)
}

impl DumpContext<'_> {
    fn record(&mut self, record: &mut dyn RecordObject, prefix: &StorePath) -> Result<()> {
        let schema = record.record_type().schema()?;
        let group = self.store.create_or_open_group(prefix)?;
        debug!(path = %prefix, record = schema.name, "writing group");
        for (index, field) in schema.fields().iter().enumerate() {
            let value = record.field_value(index);
            self.field(&*group, prefix, field, value)?;
        }
        Ok(())
    }

    fn field<A>(
        &mut self,
        owner: &A,
        prefix: &StorePath,
        field: &FieldDescriptor,
        value: DumpValue<'_>,
    ) -> Result<()>
    where
        A: AttributeAccess + ?Sized,
    {
        match (&field.kind, value) {
            (_, DumpValue::Absent) if !field.required => Ok(()),
            (FieldKind::Scalar(_) | FieldKind::Enum(_), DumpValue::Absent) => Err(Error::AttributeWrite {
                path: prefix.to_string(),
                field: field.name.to_string(),
                value: "<absent>".to_string(),
                reason: "required attribute has no value",
            }),
            (_, DumpValue::Absent) => Err(Error::MissingValue {
                path: prefix.to_string(),
                field: field.name.to_string(),
            }),
            (FieldKind::Scalar(ty), DumpValue::Scalar(value)) => {
                let stored = ty.encode(value, prefix, field.name)?;
                debug!(path = %prefix, attribute = field.name, value = %stored, "writing attribute");
                owner.set_attribute(field.name, Attribute::new(ty.store_type(), stored))?;
                Ok(())
            }
            (FieldKind::Enum(e), DumpValue::Enum(raw)) => {
                let stored = e.backing.integer(raw as i128).ok_or_else(|| Error::AttributeWrite {
                    path: prefix.to_string(),
                    field: field.name.to_string(),
                    value: raw.to_string(),
                    reason: "enum value does not fit the backing type",
                })?;
                debug!(path = %prefix, attribute = field.name, value = raw, enum_name = e.name, "writing enum attribute");
                owner.set_attribute(field.name, Attribute::new(e.store_type(), stored))?;
                Ok(())
            }
            (FieldKind::Record(_), DumpValue::Record(child)) => {
                self.record(child, &prefix.join(field.name))
            }
            (FieldKind::List(_), DumpValue::List(items)) => {
                let path = prefix.join(field.name);
                self.store.create_or_open_group(&path)?;
                debug!(path = %path, len = items.len(), "writing list");
                for (i, item) in items.into_iter().enumerate() {
                    self.record(item, &path.join(&i.to_string()))?;
                }
                Ok(())
            }
            (FieldKind::Dataset(_) | FieldKind::Union(_), DumpValue::Dataset(dataset)) => {
                self.dataset(dataset, prefix.join(field.name))
            }
            (kind, value) => Err(Error::KindMismatch {
                path: prefix.to_string(),
                field: field.name.to_string(),
                expected: kind.label(),
                found: value.label(),
            }),
        }
    }

    fn dataset(&mut self, dataset: &mut dyn DatasetObject, path: StorePath) -> Result<()> {
        let ty = dataset.dataset_type();
        let contents = dataset.contents()?;
        if let Some((_, values)) = &contents {
            check_elements(&path.to_string(), values)?;
        }
        let shape = match &contents {
            Some((shape, _)) => shape.clone(),
            None => fixed_shape(ty.shape).ok_or_else(|| Error::UnresolvedShape {
                path: path.to_string(),
                shape: format_shape(ty.shape),
            })?,
        };
        if !shape_matches(ty.shape, &shape) {
            return Err(Error::ShapeMismatch {
                path: path.to_string(),
                expected: format_shape(ty.shape),
                actual: shape,
            });
        }

        let dtype = ty.store_type();
        let handle = self.store.create_or_open_dataset(&path, &shape, &dtype)?;

        let attrs = dataset.attributes_mut();
        let schema = attrs.record_type().schema()?;
        for (index, field) in schema.fields().iter().enumerate() {
            let value = attrs.field_value(index);
            self.field(&*handle, &path, field, value)?;
        }

        match contents {
            Some((_, values)) => {
                handle.write_slice(&Selection::All, &values)?;
                debug!(path = %path, %dtype, ?shape, "wrote dataset");
            }
            None => {
                debug!(path = %path, %dtype, ?shape, "dataset left for later writes");
                self.unwritten.push(path);
            }
        }
        dataset.attach(handle);
        Ok(())
    }
}

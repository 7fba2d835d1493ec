//! Partial-dump tracking.
//!
//! A dump may leave datasets without data, to be written through their
//! handles afterwards. [`DumpReport`] names them; a strict dump turns a
//! non-empty report into [`Error::PartialDump`].

use crate::dataset::BindingState;
use crate::error::{Error, Result};
use crate::field::{DumpValue, RecordObject};
use crate::path::StorePath;
use crate::schema::FieldKind;

/// Outcome of one dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpReport {
    root_type: &'static str,
    root: StorePath,
    unwritten: Vec<StorePath>,
}

impl DumpReport {
    pub fn new(root_type: &'static str, root: StorePath, unwritten: Vec<StorePath>) -> Self {
        Self {
            root_type,
            root,
            unwritten,
        }
    }

    /// Store paths of datasets left without data.
    pub fn unwritten(&self) -> &[StorePath] {
        &self.unwritten
    }

    pub fn is_complete(&self) -> bool {
        self.unwritten.is_empty()
    }

    /// Unwritten datasets named from the outermost record type, e.g.
    /// `Experiment.manData`.
    pub fn qualified_unwritten(&self) -> Vec<String> {
        self.unwritten
            .iter()
            .map(|p| p.qualified(self.root_type, &self.root))
            .collect()
    }

    /// Fail with [`Error::PartialDump`] unless every dataset was written or
    /// `partial` is set.
    pub fn check(&self, partial: bool) -> Result<()> {
        if partial || self.is_complete() {
            return Ok(());
        }
        Err(Error::PartialDump {
            datasets: self.qualified_unwritten(),
        })
    }
}

/// Paths of datasets in `record` that are attached to a store but still
/// unwritten, assuming `record` was dumped at `base`.
pub fn pending_datasets(record: &mut dyn RecordObject, base: &StorePath) -> Result<Vec<StorePath>> {
    let mut pending = Vec::new();
    collect_pending(record, base, &mut pending)?;
    Ok(pending)
}

fn collect_pending(record: &mut dyn RecordObject, prefix: &StorePath, out: &mut Vec<StorePath>) -> Result<()> {
    let schema = record.record_type().schema()?;
    for (index, field) in schema.fields().iter().enumerate() {
        let path = prefix.join(field.name);
        match (&field.kind, record.field_value(index)) {
            (FieldKind::Record(_), DumpValue::Record(child)) => collect_pending(child, &path, out)?,
            (FieldKind::List(_), DumpValue::List(items)) => {
                for (i, item) in items.into_iter().enumerate() {
                    collect_pending(item, &path.join(&i.to_string()), out)?;
                }
            }
            (FieldKind::Dataset(_) | FieldKind::Union(_), DumpValue::Dataset(dataset)) => {
                if dataset.state() == BindingState::BoundWritable {
                    out.push(path);
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_report_passes() {
        let report = DumpReport::new("Experiment", StorePath::root(), Vec::new());
        assert!(report.is_complete());
        assert!(report.check(false).is_ok());
    }

    #[test]
    fn strict_check_names_datasets() {
        let report = DumpReport::new(
            "Experiment",
            StorePath::root(),
            vec![StorePath::parse("/manData"), StorePath::parse("/runs/0/trace")],
        );
        assert!(report.check(true).is_ok());
        match report.check(false).unwrap_err() {
            Error::PartialDump { datasets } => {
                assert_eq!(datasets, vec!["Experiment.manData", "Experiment.runs.0.trace"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn qualified_relative_to_root() {
        let report = DumpReport::new(
            "Experiment",
            StorePath::parse("/run1"),
            vec![StorePath::parse("/run1/manData")],
        );
        assert_eq!(report.qualified_unwritten(), vec!["Experiment.manData"]);
    }
}

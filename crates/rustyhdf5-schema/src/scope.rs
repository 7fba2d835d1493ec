//! Top-level dump and load entry points, against an open store or a file
//! path.
//!
//! The file-path forms own the [`H5File`] for the duration of the
//! operation and close it on every exit path. A failed operation returns
//! its own error in preference to a close error.

use std::ops::{Deref, DerefMut};
use std::path::Path;

use tracing::debug;

use crate::dump::dump_record;
use crate::error::{Error, Result};
use crate::field::Record;
use crate::file::H5File;
use crate::load::{load_record, LoadReport};
use crate::partial::{pending_datasets, DumpReport};
use crate::props::{DumpProps, LoadProps};
use crate::schema::RecordType;
use crate::store::Store;

/// Dump `record` into an open store.
///
/// Fails with [`Error::PartialDump`] if datasets were left unwritten and
/// `props.partial` is not set.
pub fn dump<R: Record>(record: &mut R, store: &dyn Store, props: &DumpProps) -> Result<DumpReport> {
    let unwritten = dump_record(store, record, &props.root)?;
    let report = DumpReport::new(R::NAME, props.root.clone(), unwritten);
    report.check(props.partial)?;
    Ok(report)
}

/// Load an `R` from an open store.
pub fn load<R: Record>(store: &dyn Store, props: &LoadProps) -> Result<(R, LoadReport)> {
    let (value, report) = load_record(store, RecordType::of::<R>(), &props.root)?;
    if props.deny_unmapped && !report.is_clean() {
        return Err(Error::UnmappedKeys(report.unmapped().to_vec()));
    }
    let value = value.downcast::<R>().map_err(|_| Error::UnexpectedValue {
        expected: R::NAME,
        found: "record of another type",
    })?;
    Ok((*value, report))
}

/// Run `op`, then close `file`; `op`'s error wins over the close error.
fn with_closed<T>(file: H5File, op: impl FnOnce(&H5File) -> Result<T>) -> Result<T> {
    let result = op(&file);
    let closed = file.close();
    let value = result?;
    closed?;
    Ok(value)
}

/// File-level operations for every record type.
pub trait RecordFile: Record {
    /// Strict dump to a new file at `path`.
    fn dump(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.dump_with(path, &DumpProps::default()).map(|_| ())
    }

    /// Dump to a new file at `path` with explicit properties.
    fn dump_with(&mut self, path: impl AsRef<Path>, props: &DumpProps) -> Result<DumpReport> {
        let file = H5File::create(path)?;
        with_closed(file, |file| dump(self, file, props))
    }

    /// Scoped dump: dump to a new file at `path`, keep it open while `body`
    /// runs, then check that every dataset has been written (unless
    /// `props.partial`) and close the file.
    ///
    /// Datasets dumped without data can be written inside `body` through
    /// [`Dataset::assign`](crate::Dataset::assign).
    fn dumper<T>(
        &mut self,
        path: impl AsRef<Path>,
        props: &DumpProps,
        body: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let file = H5File::create(path)?;
        with_closed(file, |file| {
            let lenient = DumpProps {
                partial: true,
                ..props.clone()
            };
            let report = dump(self, file, &lenient)?;
            debug!(pending = report.unwritten().len(), "running dump scope");
            let value = body(self)?;
            let pending = pending_datasets(self, &props.root)?;
            DumpReport::new(Self::NAME, props.root.clone(), pending).check(props.partial)?;
            Ok(value)
        })
    }

    /// Open the file at `path` read-only and load an instance from it.
    ///
    /// Datasets stay in the file; the returned [`Loaded`] keeps it open.
    fn load_file(path: impl AsRef<Path>) -> Result<Loaded<Self>> {
        Self::load_file_with(path, &LoadProps::default())
    }

    fn load_file_with(path: impl AsRef<Path>, props: &LoadProps) -> Result<Loaded<Self>> {
        let file = H5File::open(path)?;
        match load::<Self>(&file, props) {
            Ok((value, report)) => Ok(Loaded { value, report, file }),
            Err(e) => with_closed(file, |_| Err(e)),
        }
    }
}

impl<R: Record> RecordFile for R {}

/// A loaded record together with the open file its datasets read from.
///
/// Dereferences to the record. Dataset reads fail with a closed-store error
/// once the file is closed.
#[derive(Debug)]
pub struct Loaded<T> {
    value: T,
    report: LoadReport,
    file: H5File,
}

impl<T> Loaded<T> {
    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    pub fn file(&self) -> &H5File {
        &self.file
    }

    /// Close the file.
    pub fn close(self) -> Result<()> {
        self.file.close()?;
        Ok(())
    }
}

impl<T> Deref for Loaded<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Loaded<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

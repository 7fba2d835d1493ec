//! The container-store capability set the engines are written against.
//!
//! A store is a tree of named groups holding attributes, child groups and
//! N-dimensional typed datasets. The engines only ever touch a store through
//! these traits; [`crate::H5File`] is the bundled implementation.

use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::path::StorePath;
use crate::selection::{Selection, SelectionError};
use crate::types::{Attribute, ScalarValue, StoreType};

/// Errors reported by a store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no object at {0}")]
    NotFound(String),

    #[error("not a group: {0}")]
    NotAGroup(String),

    #[error("not a dataset: {0}")]
    NotADataset(String),

    #[error(
        "dataset at {path} already exists as {existing_dtype} {existing_shape:?}, \
         requested {dtype} {shape:?}"
    )]
    DatasetConflict {
        path: String,
        existing_shape: Vec<u64>,
        existing_dtype: StoreType,
        shape: Vec<u64>,
        dtype: StoreType,
    },

    #[error("value {value} cannot be stored in {dtype} dataset at {path}")]
    ElementType {
        path: String,
        dtype: StoreType,
        value: String,
    },

    #[error("{path}: selection covers {expected} elements, {actual} values given")]
    LengthMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },

    #[error("store is read-only: cannot modify {0}")]
    ReadOnly(String),

    #[error("store has been closed")]
    Closed,

    #[error("malformed store document: {0}")]
    Format(String),

    #[error(transparent)]
    Selection(#[from] SelectionError),
}

/// Attribute access shared by groups and datasets.
pub trait AttributeAccess {
    /// Create or overwrite an attribute.
    fn set_attribute(&self, key: &str, attr: Attribute) -> Result<(), StoreError>;

    /// Read an attribute; `Ok(None)` when absent.
    fn attribute(&self, key: &str) -> Result<Option<Attribute>, StoreError>;

    fn attribute_keys(&self) -> Result<Vec<String>, StoreError>;
}

/// An open group.
pub trait GroupAccess: AttributeAccess + fmt::Debug {
    fn path(&self) -> &StorePath;

    /// Names of child groups and datasets, in store order.
    fn child_names(&self) -> Result<Vec<String>, StoreError>;
}

/// An open dataset.
///
/// Handles are shared (`Rc`) so a dataset binding can keep one alive after
/// the dump walk returns.
pub trait DatasetAccess: AttributeAccess + fmt::Debug {
    fn path(&self) -> &StorePath;

    fn shape(&self) -> Result<Vec<u64>, StoreError>;

    fn dtype(&self) -> Result<StoreType, StoreError>;

    fn read_slice(&self, selection: &Selection) -> Result<Vec<ScalarValue>, StoreError>;

    fn write_slice(&self, selection: &Selection, values: &[ScalarValue]) -> Result<(), StoreError>;
}

/// A whole open store.
pub trait Store {
    /// Open the group at `path`, creating it (and missing parents) if needed.
    fn create_or_open_group(&self, path: &StorePath) -> Result<Box<dyn GroupAccess>, StoreError>;

    fn open_group(&self, path: &StorePath) -> Result<Box<dyn GroupAccess>, StoreError>;

    /// Open the dataset at `path`, creating it if needed.
    ///
    /// Idempotent when an identical dataset exists; fails with
    /// [`StoreError::DatasetConflict`] when the existing shape or type differ.
    fn create_or_open_dataset(
        &self,
        path: &StorePath,
        shape: &[u64],
        dtype: &StoreType,
    ) -> Result<Rc<dyn DatasetAccess>, StoreError>;

    fn open_dataset(&self, path: &StorePath) -> Result<Rc<dyn DatasetAccess>, StoreError>;

    fn exists(&self, path: &StorePath) -> Result<bool, StoreError>;
}

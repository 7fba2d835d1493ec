//! [`H5File`]: the bundled store.
//!
//! The whole group/dataset tree lives in memory while the file is open and
//! is written to disk as a single JSON document when a writable file is
//! closed. The document mirrors the HSDS object model: groups carry
//! attributes and named children, datasets carry a type, a shape,
//! attributes and their row-major values.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::path::StorePath;
use crate::selection::{element_count, Selection, SelectionError};
use crate::store::{AttributeAccess, DatasetAccess, GroupAccess, Store, StoreError};
use crate::types::{Attribute, ScalarValue, StoreType};

const FORMAT: &str = "rustyhdf5-schema/1";

/// How a file was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Existing file, no modification allowed.
    ReadOnly,
    /// New or truncated file, written back on close.
    Truncate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Node {
    Group {
        #[serde(default)]
        attrs: BTreeMap<String, Attribute>,
        #[serde(default)]
        children: BTreeMap<String, Node>,
    },
    Dataset {
        dtype: StoreType,
        shape: Vec<u64>,
        #[serde(default)]
        attrs: BTreeMap<String, Attribute>,
        data: Vec<ScalarValue>,
    },
}

impl Node {
    fn empty_group() -> Self {
        Node::Group {
            attrs: BTreeMap::new(),
            children: BTreeMap::new(),
        }
    }

    fn attrs(&self) -> &BTreeMap<String, Attribute> {
        match self {
            Node::Group { attrs, .. } | Node::Dataset { attrs, .. } => attrs,
        }
    }

    fn attrs_mut(&mut self) -> &mut BTreeMap<String, Attribute> {
        match self {
            Node::Group { attrs, .. } | Node::Dataset { attrs, .. } => attrs,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Document {
    format: String,
    root: Node,
}

struct Tree {
    root: Node,
    mode: OpenMode,
    location: Option<PathBuf>,
    closed: bool,
}

impl Tree {
    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn check_writable(&self, path: &StorePath) -> Result<(), StoreError> {
        self.check_open()?;
        if self.mode == OpenMode::ReadOnly {
            return Err(StoreError::ReadOnly(path.to_string()));
        }
        Ok(())
    }

    fn lookup(&self, path: &StorePath) -> Option<&Node> {
        let mut node = &self.root;
        for c in path.components() {
            node = match node {
                Node::Group { children, .. } => children.get(c)?,
                Node::Dataset { .. } => return None,
            };
        }
        Some(node)
    }

    fn node(&self, path: &StorePath) -> Result<&Node, StoreError> {
        self.check_open()?;
        self.lookup(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn node_mut(&mut self, path: &StorePath) -> Result<&mut Node, StoreError> {
        self.check_open()?;
        let mut node = &mut self.root;
        for c in path.components() {
            node = match node {
                Node::Group { children, .. } => children
                    .get_mut(c)
                    .ok_or_else(|| StoreError::NotFound(path.to_string()))?,
                Node::Dataset { .. } => return Err(StoreError::NotAGroup(path.to_string())),
            };
        }
        Ok(node)
    }

    fn ensure_group(&mut self, path: &StorePath) -> Result<&mut Node, StoreError> {
        let mut node = &mut self.root;
        for c in path.components() {
            node = match node {
                Node::Group { children, .. } => {
                    children.entry(c.clone()).or_insert_with(Node::empty_group)
                }
                Node::Dataset { .. } => return Err(StoreError::NotAGroup(path.to_string())),
            };
        }
        if matches!(node, Node::Dataset { .. }) {
            return Err(StoreError::NotAGroup(path.to_string()));
        }
        Ok(node)
    }
}

type Shared = Rc<RefCell<Tree>>;

/// An open store file.
///
/// Handles returned through [`Store`] share the file's tree and fail with
/// [`StoreError::Closed`] once the file has been closed. A writable file is
/// written to disk on [`H5File::close`], or on drop if it was never closed
/// explicitly.
///
/// # Example
///
/// ```no_run
/// use rustyhdf5_schema::{H5File, Store, StorePath};
///
/// let file = H5File::create("run.h5.json").unwrap();
/// file.create_or_open_group(&StorePath::parse("/sensors")).unwrap();
/// file.close().unwrap();
/// ```
pub struct H5File {
    tree: Shared,
}

impl H5File {
    /// A writable store that is never persisted.
    pub fn in_memory() -> Self {
        Self::with_root(Node::empty_group(), OpenMode::Truncate, None)
    }

    /// Create (or truncate) a file at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let location = path.as_ref().to_path_buf();
        let file = Self::with_root(Node::empty_group(), OpenMode::Truncate, Some(location));
        file.flush()?;
        debug!(path = %path.as_ref().display(), "created store file");
        Ok(file)
    }

    /// Open an existing file read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let bytes = std::fs::read(path.as_ref())?;
        let doc: Document = serde_json::from_slice(&bytes)?;
        if doc.format != FORMAT {
            return Err(StoreError::Format(format!(
                "unsupported document format {:?}",
                doc.format
            )));
        }
        if !matches!(doc.root, Node::Group { .. }) {
            return Err(StoreError::Format("root object is not a group".into()));
        }
        debug!(path = %path.as_ref().display(), "opened store file read-only");
        Ok(Self::with_root(
            doc.root,
            OpenMode::ReadOnly,
            Some(path.as_ref().to_path_buf()),
        ))
    }

    fn with_root(root: Node, mode: OpenMode, location: Option<PathBuf>) -> Self {
        Self {
            tree: Rc::new(RefCell::new(Tree {
                root,
                mode,
                location,
                closed: false,
            })),
        }
    }

    pub fn mode(&self) -> OpenMode {
        self.tree.borrow().mode
    }

    pub fn is_closed(&self) -> bool {
        self.tree.borrow().closed
    }

    /// Write a writable file's tree to disk. No-op for read-only and
    /// in-memory files.
    pub fn flush(&self) -> Result<(), StoreError> {
        let tree = self.tree.borrow();
        tree.check_open()?;
        if tree.mode == OpenMode::ReadOnly {
            return Ok(());
        }
        if let Some(location) = &tree.location {
            let doc = Document {
                format: FORMAT.to_string(),
                root: tree.root.clone(),
            };
            let bytes = serde_json::to_vec_pretty(&doc)?;
            std::fs::write(location, bytes)?;
        }
        Ok(())
    }

    /// Flush and close. Every handle obtained from this file becomes invalid.
    pub fn close(self) -> Result<(), StoreError> {
        self.close_inner()
    }

    fn close_inner(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Ok(());
        }
        let flushed = self.flush();
        self.tree.borrow_mut().closed = true;
        flushed
    }
}

impl Drop for H5File {
    fn drop(&mut self) {
        if let Err(e) = self.close_inner() {
            warn!(error = %e, "failed to flush store file on drop");
        }
    }
}

impl fmt::Debug for H5File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tree = self.tree.borrow();
        f.debug_struct("H5File")
            .field("location", &tree.location)
            .field("mode", &tree.mode)
            .field("closed", &tree.closed)
            .finish()
    }
}

impl Store for H5File {
    fn create_or_open_group(&self, path: &StorePath) -> Result<Box<dyn GroupAccess>, StoreError> {
        {
            let mut tree = self.tree.borrow_mut();
            if tree.mode == OpenMode::ReadOnly {
                drop(tree);
                return self.open_group(path);
            }
            tree.check_writable(path)?;
            tree.ensure_group(path)?;
        }
        Ok(Box::new(GroupHandle {
            tree: Rc::clone(&self.tree),
            path: path.clone(),
        }))
    }

    fn open_group(&self, path: &StorePath) -> Result<Box<dyn GroupAccess>, StoreError> {
        let tree = self.tree.borrow();
        match tree.node(path)? {
            Node::Group { .. } => Ok(Box::new(GroupHandle {
                tree: Rc::clone(&self.tree),
                path: path.clone(),
            })),
            Node::Dataset { .. } => Err(StoreError::NotAGroup(path.to_string())),
        }
    }

    fn create_or_open_dataset(
        &self,
        path: &StorePath,
        shape: &[u64],
        dtype: &StoreType,
    ) -> Result<Rc<dyn DatasetAccess>, StoreError> {
        let name = path
            .name()
            .ok_or_else(|| StoreError::NotADataset(path.to_string()))?;
        let parent = path.parent().unwrap_or_default();
        {
            let mut tree = self.tree.borrow_mut();
            tree.check_writable(path)?;
            let Node::Group { children, .. } = tree.ensure_group(&parent)? else {
                return Err(StoreError::NotAGroup(parent.to_string()));
            };
            match children.get(name) {
                Some(Node::Dataset {
                    dtype: existing_dtype,
                    shape: existing_shape,
                    ..
                }) => {
                    if existing_shape.as_slice() != shape || existing_dtype != dtype {
                        return Err(StoreError::DatasetConflict {
                            path: path.to_string(),
                            existing_shape: existing_shape.clone(),
                            existing_dtype: existing_dtype.clone(),
                            shape: shape.to_vec(),
                            dtype: dtype.clone(),
                        });
                    }
                }
                Some(Node::Group { .. }) => return Err(StoreError::NotADataset(path.to_string())),
                None => {
                    let len = element_count(shape)
                        .and_then(|n| usize::try_from(n).ok())
                        .ok_or_else(|| SelectionError::Overflow { dims: shape.to_vec() })?;
                    children.insert(
                        name.to_string(),
                        Node::Dataset {
                            dtype: dtype.clone(),
                            shape: shape.to_vec(),
                            attrs: BTreeMap::new(),
                            data: vec![fill_value(dtype); len],
                        },
                    );
                    debug!(path = %path, %dtype, ?shape, "created dataset");
                }
            }
        }
        Ok(Rc::new(DatasetHandle {
            tree: Rc::clone(&self.tree),
            path: path.clone(),
        }))
    }

    fn open_dataset(&self, path: &StorePath) -> Result<Rc<dyn DatasetAccess>, StoreError> {
        let tree = self.tree.borrow();
        match tree.node(path)? {
            Node::Dataset { .. } => Ok(Rc::new(DatasetHandle {
                tree: Rc::clone(&self.tree),
                path: path.clone(),
            })),
            Node::Group { .. } => Err(StoreError::NotADataset(path.to_string())),
        }
    }

    fn exists(&self, path: &StorePath) -> Result<bool, StoreError> {
        let tree = self.tree.borrow();
        tree.check_open()?;
        Ok(tree.lookup(path).is_some())
    }
}

/// Initial element value of a freshly created dataset.
fn fill_value(dtype: &StoreType) -> ScalarValue {
    match dtype {
        StoreType::I8 => ScalarValue::I8(0),
        StoreType::I16 => ScalarValue::I16(0),
        StoreType::I32 => ScalarValue::I32(0),
        StoreType::I64 => ScalarValue::I64(0),
        StoreType::U8 => ScalarValue::U8(0),
        StoreType::U16 => ScalarValue::U16(0),
        StoreType::U32 => ScalarValue::U32(0),
        StoreType::U64 => ScalarValue::U64(0),
        StoreType::F32 => ScalarValue::F32(0.0),
        StoreType::F64 => ScalarValue::F64(0.0),
        StoreType::VarString => ScalarValue::String(String::new()),
        StoreType::Opaque | StoreType::Compound(_) => ScalarValue::Bytes(Vec::new()),
        StoreType::Enum { base, .. } => fill_value(base),
    }
}

fn set_attr(tree: &Shared, path: &StorePath, key: &str, attr: Attribute) -> Result<(), StoreError> {
    let mut tree = tree.borrow_mut();
    tree.check_writable(path)?;
    if !attr.dtype.accepts(&attr.value) {
        return Err(StoreError::ElementType {
            path: path.join(key).to_string(),
            dtype: attr.dtype,
            value: attr.value.to_string(),
        });
    }
    tree.node_mut(path)?.attrs_mut().insert(key.to_string(), attr);
    Ok(())
}

fn get_attr(tree: &Shared, path: &StorePath, key: &str) -> Result<Option<Attribute>, StoreError> {
    let tree = tree.borrow();
    Ok(tree.node(path)?.attrs().get(key).cloned())
}

fn attr_keys(tree: &Shared, path: &StorePath) -> Result<Vec<String>, StoreError> {
    let tree = tree.borrow();
    Ok(tree.node(path)?.attrs().keys().cloned().collect())
}

struct GroupHandle {
    tree: Shared,
    path: StorePath,
}

impl fmt::Debug for GroupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupHandle").field("path", &self.path).finish()
    }
}

impl AttributeAccess for GroupHandle {
    fn set_attribute(&self, key: &str, attr: Attribute) -> Result<(), StoreError> {
        set_attr(&self.tree, &self.path, key, attr)
    }

    fn attribute(&self, key: &str) -> Result<Option<Attribute>, StoreError> {
        get_attr(&self.tree, &self.path, key)
    }

    fn attribute_keys(&self) -> Result<Vec<String>, StoreError> {
        attr_keys(&self.tree, &self.path)
    }
}

impl GroupAccess for GroupHandle {
    fn path(&self) -> &StorePath {
        &self.path
    }

    fn child_names(&self) -> Result<Vec<String>, StoreError> {
        let tree = self.tree.borrow();
        match tree.node(&self.path)? {
            Node::Group { children, .. } => Ok(children.keys().cloned().collect()),
            Node::Dataset { .. } => Err(StoreError::NotAGroup(self.path.to_string())),
        }
    }
}

struct DatasetHandle {
    tree: Shared,
    path: StorePath,
}

impl fmt::Debug for DatasetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetHandle").field("path", &self.path).finish()
    }
}

impl AttributeAccess for DatasetHandle {
    fn set_attribute(&self, key: &str, attr: Attribute) -> Result<(), StoreError> {
        set_attr(&self.tree, &self.path, key, attr)
    }

    fn attribute(&self, key: &str) -> Result<Option<Attribute>, StoreError> {
        get_attr(&self.tree, &self.path, key)
    }

    fn attribute_keys(&self) -> Result<Vec<String>, StoreError> {
        attr_keys(&self.tree, &self.path)
    }
}

impl DatasetAccess for DatasetHandle {
    fn path(&self) -> &StorePath {
        &self.path
    }

    fn shape(&self) -> Result<Vec<u64>, StoreError> {
        match self.tree.borrow().node(&self.path)? {
            Node::Dataset { shape, .. } => Ok(shape.clone()),
            Node::Group { .. } => Err(StoreError::NotADataset(self.path.to_string())),
        }
    }

    fn dtype(&self) -> Result<StoreType, StoreError> {
        match self.tree.borrow().node(&self.path)? {
            Node::Dataset { dtype, .. } => Ok(dtype.clone()),
            Node::Group { .. } => Err(StoreError::NotADataset(self.path.to_string())),
        }
    }

    fn read_slice(&self, selection: &Selection) -> Result<Vec<ScalarValue>, StoreError> {
        let tree = self.tree.borrow();
        let Node::Dataset { shape, data, .. } = tree.node(&self.path)? else {
            return Err(StoreError::NotADataset(self.path.to_string()));
        };
        let offsets = selection.element_offsets(shape)?;
        offsets
            .into_iter()
            .map(|o| {
                data.get(o as usize)
                    .cloned()
                    .ok_or_else(|| StoreError::Format(format!("{}: data shorter than shape", self.path)))
            })
            .collect()
    }

    fn write_slice(&self, selection: &Selection, values: &[ScalarValue]) -> Result<(), StoreError> {
        let mut tree = self.tree.borrow_mut();
        tree.check_writable(&self.path)?;
        let Node::Dataset {
            shape, dtype, data, ..
        } = tree.node_mut(&self.path)?
        else {
            return Err(StoreError::NotADataset(self.path.to_string()));
        };
        let offsets = selection.element_offsets(shape)?;
        if offsets.len() != values.len() {
            return Err(StoreError::LengthMismatch {
                path: self.path.to_string(),
                expected: offsets.len() as u64,
                actual: values.len() as u64,
            });
        }
        if let Some(bad) = values.iter().find(|v| !dtype.accepts(v)) {
            return Err(StoreError::ElementType {
                path: self.path.to_string(),
                dtype: dtype.clone(),
                value: bad.to_string(),
            });
        }
        for (o, v) in offsets.into_iter().zip(values.iter()) {
            let slot = data
                .get_mut(o as usize)
                .ok_or_else(|| StoreError::Format(format!("{}: data shorter than shape", self.path)))?;
            *slot = v.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> StorePath {
        StorePath::parse(s)
    }

    #[test]
    fn groups_are_created_with_parents() {
        let file = H5File::in_memory();
        file.create_or_open_group(&p("/a/b/c")).unwrap();
        assert!(file.exists(&p("/a")).unwrap());
        assert!(file.exists(&p("/a/b/c")).unwrap());
        let a = file.open_group(&p("/a")).unwrap();
        assert_eq!(a.child_names().unwrap(), vec!["b"]);
    }

    #[test]
    fn attributes_round_trip() {
        let file = H5File::in_memory();
        let root = file.create_or_open_group(&StorePath::root()).unwrap();
        root.set_attribute("version", Attribute::new(StoreType::I64, ScalarValue::I64(2)))
            .unwrap();
        assert_eq!(root.attribute_keys().unwrap(), vec!["version"]);
        assert_eq!(
            root.attribute("version").unwrap().unwrap().value,
            ScalarValue::I64(2)
        );
        assert!(root.attribute("missing").unwrap().is_none());
    }

    #[test]
    fn attribute_type_is_checked() {
        let file = H5File::in_memory();
        let root = file.create_or_open_group(&StorePath::root()).unwrap();
        let err = root
            .set_attribute("x", Attribute::new(StoreType::I32, ScalarValue::F64(1.0)))
            .unwrap_err();
        assert!(matches!(err, StoreError::ElementType { .. }));
    }

    #[test]
    fn dataset_create_is_idempotent() {
        let file = H5File::in_memory();
        let path = p("/data");
        let ds = file.create_or_open_dataset(&path, &[2, 2], &StoreType::I32).unwrap();
        ds.write_slice(&Selection::All, &[1, 2, 3, 4].map(ScalarValue::I32))
            .unwrap();
        let again = file.create_or_open_dataset(&path, &[2, 2], &StoreType::I32).unwrap();
        assert_eq!(
            again.read_slice(&Selection::point(&[1, 0])).unwrap(),
            vec![ScalarValue::I32(3)]
        );
    }

    #[test]
    fn dataset_conflict() {
        let file = H5File::in_memory();
        let path = p("/data");
        file.create_or_open_dataset(&path, &[2, 2], &StoreType::I32).unwrap();
        let err = file
            .create_or_open_dataset(&path, &[3, 2], &StoreType::I32)
            .unwrap_err();
        assert!(matches!(err, StoreError::DatasetConflict { .. }));
        let err = file
            .create_or_open_dataset(&path, &[2, 2], &StoreType::F64)
            .unwrap_err();
        assert!(matches!(err, StoreError::DatasetConflict { .. }));
    }

    #[test]
    fn fresh_dataset_is_zero_filled() {
        let file = H5File::in_memory();
        let ds = file
            .create_or_open_dataset(&p("/z"), &[3], &StoreType::F64)
            .unwrap();
        assert_eq!(ds.read_slice(&Selection::All).unwrap(), vec![ScalarValue::F64(0.0); 3]);
    }

    #[test]
    fn overflowing_dataset_shape() {
        let file = H5File::in_memory();
        let err = file
            .create_or_open_dataset(&p("/huge"), &[u64::MAX, 4], &StoreType::U8)
            .unwrap_err();
        assert!(matches!(err, StoreError::Selection(SelectionError::Overflow { .. })));
        assert!(!file.exists(&p("/huge")).unwrap());
    }

    #[test]
    fn write_length_mismatch() {
        let file = H5File::in_memory();
        let ds = file
            .create_or_open_dataset(&p("/d"), &[2], &StoreType::I32)
            .unwrap();
        let err = ds
            .write_slice(&Selection::All, &[ScalarValue::I32(1)])
            .unwrap_err();
        assert!(matches!(err, StoreError::LengthMismatch { expected: 2, actual: 1, .. }));
    }

    #[test]
    fn handles_fail_after_close() {
        let file = H5File::in_memory();
        let ds = file
            .create_or_open_dataset(&p("/d"), &[1], &StoreType::I32)
            .unwrap();
        file.close().unwrap();
        assert!(matches!(ds.shape().unwrap_err(), StoreError::Closed));
    }

    #[test]
    fn persisted_and_reopened_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let file = H5File::create(&path).unwrap();
        let g = file.create_or_open_group(&p("/sensors")).unwrap();
        g.set_attribute(
            "location",
            Attribute::new(StoreType::VarString, ScalarValue::String("lab".into())),
        )
        .unwrap();
        let ds = file
            .create_or_open_dataset(&p("/sensors/temperature"), &[3], &StoreType::F64)
            .unwrap();
        ds.write_slice(&Selection::All, &[22.5, 23.1, 21.8].map(ScalarValue::F64))
            .unwrap();
        file.close().unwrap();

        let file = H5File::open(&path).unwrap();
        assert_eq!(file.mode(), OpenMode::ReadOnly);
        let ds = file.open_dataset(&p("/sensors/temperature")).unwrap();
        assert_eq!(ds.shape().unwrap(), vec![3]);
        assert_eq!(ds.dtype().unwrap(), StoreType::F64);
        assert_eq!(
            ds.read_slice(&Selection::All).unwrap(),
            vec![ScalarValue::F64(22.5), ScalarValue::F64(23.1), ScalarValue::F64(21.8)]
        );
        let err = ds
            .write_slice(&Selection::point(&[0]), &[ScalarValue::F64(0.0)])
            .unwrap_err();
        assert!(matches!(err, StoreError::ReadOnly(_)));
        let err = file.create_or_open_group(&p("/new")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn open_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = H5File::open(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }

    #[test]
    fn drop_flushes_writable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dropped.json");
        {
            let file = H5File::create(&path).unwrap();
            file.create_or_open_group(&p("/kept")).unwrap();
        }
        let file = H5File::open(&path).unwrap();
        assert!(file.exists(&p("/kept")).unwrap());
    }
}

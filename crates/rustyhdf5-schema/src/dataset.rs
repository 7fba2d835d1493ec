//! Dataset fields and their binding state machine.
//!
//! A [`Dataset<S>`] is a record field holding an N-dimensional buffer whose
//! schema `S` declares the element type, the shape and the dataset's
//! attributes. Its data comes from one of two places:
//!
//! - a buffer supplied at construction ([`Dataset::with_data`]), after which
//!   the dataset is immutable;
//! - an open store handle, attached when the dataset is dumped without data
//!   or when it is loaded, through which reads and writes go directly.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::field::{
    DatasetSchema, DumpValue, H5Field, LoadedDataset, LoadedValue, RecordObject, UnionVariant,
};
use crate::schema::{format_shape, shape_matches, DatasetType, DeclaredType};
use crate::selection::{element_count, Selection};
use crate::store::DatasetAccess;
use crate::types::{check_elements, ScalarType, ScalarValue, StoreType};

// ---------------------------------------------------------------------------
// Elements
// ---------------------------------------------------------------------------

/// A dataset element type.
pub trait Element: Clone + 'static {
    fn store_type() -> StoreType;

    /// Whether compound/opaque stored types are accepted on load.
    fn bytes_like() -> bool {
        false
    }

    /// Store representation of one element.
    fn into_value(self) -> ScalarValue;

    fn from_value(value: ScalarValue) -> Option<Self>;
}

macro_rules! element {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                fn store_type() -> StoreType {
                    ScalarType::$variant.store_type()
                }

                fn into_value(self) -> ScalarValue {
                    ScalarValue::$variant(self)
                }

                fn from_value(value: ScalarValue) -> Option<Self> {
                    match value {
                        ScalarValue::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

element! {
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
    String => String,
}

impl Element for bool {
    fn store_type() -> StoreType {
        ScalarType::Bool.store_type()
    }

    fn into_value(self) -> ScalarValue {
        ScalarValue::U8(u8::from(self))
    }

    fn from_value(value: ScalarValue) -> Option<Self> {
        match value {
            ScalarValue::U8(v) => Some(v != 0),
            ScalarValue::Bool(b) => Some(b),
            _ => None,
        }
    }
}

impl Element for crate::field::Bytes {
    fn store_type() -> StoreType {
        StoreType::Opaque
    }

    fn bytes_like() -> bool {
        true
    }

    fn into_value(self) -> ScalarValue {
        ScalarValue::Bytes(self.0)
    }

    fn from_value(value: ScalarValue) -> Option<Self> {
        match value {
            ScalarValue::Bytes(b) => Some(crate::field::Bytes(b)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Arrays
// ---------------------------------------------------------------------------

/// An owned N-dimensional buffer in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Array<T> {
    shape: Vec<u64>,
    data: Vec<T>,
}

impl<T> Array<T> {
    /// Wrap `data` with `shape`; the element count must equal the shape's
    /// product.
    pub fn new(shape: Vec<u64>, data: Vec<T>) -> Result<Self> {
        let actual = data.len() as u64;
        match element_count(&shape) {
            Some(expected) if expected == actual => {}
            expected => {
                return Err(Error::BufferLength {
                    expected: expected.unwrap_or(u64::MAX),
                    actual,
                })
            }
        }
        Ok(Self { shape, data })
    }

    /// A one-dimensional array.
    pub fn from_vec(data: Vec<T>) -> Self {
        Self {
            shape: vec![data.len() as u64],
            data,
        }
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// Where a dataset's data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// No data and no store handle.
    Unbound,
    /// Data supplied at construction; never modified afterwards.
    BoundAtConstruction,
    /// Attached to a store dataset that has not been written yet.
    BoundWritable,
    /// Attached to a store dataset that holds data.
    Written,
}

/// A dataset-valued record field.
///
/// Dereferences to the schema value, whose fields are the dataset's
/// attributes.
pub struct Dataset<S: DatasetSchema> {
    attrs: S,
    state: BindingState,
    buffer: Option<Array<S::Elem>>,
    handle: Option<Rc<dyn DatasetAccess>>,
}

impl<S: DatasetSchema> Dataset<S> {
    /// A dataset without data, to be written after it is dumped.
    pub fn new(attrs: S) -> Self {
        Self {
            attrs,
            state: BindingState::Unbound,
            buffer: None,
            handle: None,
        }
    }

    /// A dataset with its data fixed at construction.
    pub fn with_data(attrs: S, data: Array<S::Elem>) -> Result<Self> {
        if !shape_matches(S::SHAPE, data.shape()) {
            return Err(Error::ShapeMismatch {
                path: S::NAME.to_string(),
                expected: format_shape(S::SHAPE),
                actual: data.shape().to_vec(),
            });
        }
        Ok(Self {
            attrs,
            state: BindingState::BoundAtConstruction,
            buffer: Some(data),
            handle: None,
        })
    }

    pub fn state(&self) -> BindingState {
        self.state
    }

    pub fn attrs(&self) -> &S {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut S {
        &mut self.attrs
    }

    /// Store path of the attached handle, or the schema name.
    fn label(&self) -> String {
        match &self.handle {
            Some(h) => h.path().to_string(),
            None => S::NAME.to_string(),
        }
    }

    pub fn shape(&self) -> Result<Vec<u64>> {
        if let Some(handle) = &self.handle {
            return Ok(handle.shape()?);
        }
        match &self.buffer {
            Some(buffer) => Ok(buffer.shape().to_vec()),
            None => Err(Error::UnboundDataset(self.label())),
        }
    }

    /// Read the selected elements, from the store if attached, otherwise
    /// from the construction buffer.
    pub fn read(&self, selection: &Selection) -> Result<Vec<S::Elem>> {
        if let Some(handle) = &self.handle {
            let dtype = handle.dtype()?;
            return handle
                .read_slice(selection)?
                .into_iter()
                .map(|v| {
                    let actual = v.scalar_type().name().to_string();
                    S::Elem::from_value(v).ok_or_else(|| Error::TypeMismatch {
                        path: handle.path().to_string(),
                        expected: dtype.to_string(),
                        actual,
                    })
                })
                .collect();
        }
        match &self.buffer {
            Some(buffer) => {
                let offsets = selection.element_offsets(buffer.shape())?;
                Ok(offsets
                    .into_iter()
                    .map(|o| buffer.data[o as usize].clone())
                    .collect())
            }
            None => Err(Error::UnboundDataset(self.label())),
        }
    }

    pub fn read_all(&self) -> Result<Array<S::Elem>> {
        let shape = self.shape()?;
        Array::new(shape, self.read(&Selection::All)?)
    }

    /// Read a single element.
    pub fn get(&self, index: &[u64]) -> Result<S::Elem> {
        self.read(&Selection::point(index))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::UnboundDataset(self.label()))
    }

    /// Write `values` into the selected elements of the attached store
    /// dataset.
    pub fn assign(&mut self, selection: &Selection, values: &[S::Elem]) -> Result<()> {
        match self.state {
            BindingState::BoundAtConstruction => Err(Error::ImmutableDataset(self.label())),
            BindingState::Unbound => Err(Error::UnboundDataset(self.label())),
            BindingState::BoundWritable | BindingState::Written => {
                let handle = self
                    .handle
                    .as_ref()
                    .ok_or_else(|| Error::UnboundDataset(S::NAME.to_string()))?;
                let stored: Vec<ScalarValue> = values.iter().cloned().map(Element::into_value).collect();
                check_elements(&handle.path().to_string(), &stored)?;
                handle.write_slice(selection, &stored)?;
                self.state = BindingState::Written;
                Ok(())
            }
        }
    }

    /// Write a single element.
    pub fn set(&mut self, index: &[u64], value: S::Elem) -> Result<()> {
        self.assign(&Selection::point(index), &[value])
    }
}

impl<S: DatasetSchema + Default> Default for Dataset<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S: DatasetSchema> Deref for Dataset<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.attrs
    }
}

impl<S: DatasetSchema> DerefMut for Dataset<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.attrs
    }
}

impl<S> PartialEq for Dataset<S>
where
    S: DatasetSchema + PartialEq,
    S::Elem: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.attrs == other.attrs && self.read_all().ok() == other.read_all().ok()
    }
}

impl<S: DatasetSchema + fmt::Debug> fmt::Debug for Dataset<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Dataset");
        d.field("attrs", &self.attrs).field("state", &self.state);
        if let Some(handle) = &self.handle {
            d.field("path", &handle.path().to_string());
        }
        d.finish()
    }
}

// ---------------------------------------------------------------------------
// Engine view
// ---------------------------------------------------------------------------

/// Object-safe view of a dataset field used by the dump engine.
pub trait DatasetObject {
    fn dataset_type(&self) -> DatasetType;

    fn state(&self) -> BindingState;

    fn attributes_mut(&mut self) -> &mut dyn RecordObject;

    /// Shape and store values to write, or `None` when the dataset has no
    /// data yet.
    fn contents(&self) -> Result<Option<(Vec<u64>, Vec<ScalarValue>)>>;

    /// Attach a freshly created store dataset.
    fn attach(&mut self, handle: Rc<dyn DatasetAccess>);
}

impl<S: DatasetSchema> DatasetObject for Dataset<S> {
    fn dataset_type(&self) -> DatasetType {
        DatasetType::of::<S>()
    }

    fn state(&self) -> BindingState {
        self.state
    }

    fn attributes_mut(&mut self) -> &mut dyn RecordObject {
        &mut self.attrs
    }

    fn contents(&self) -> Result<Option<(Vec<u64>, Vec<ScalarValue>)>> {
        match self.state {
            BindingState::Unbound | BindingState::BoundWritable => Ok(None),
            BindingState::BoundAtConstruction | BindingState::Written => {
                let array = self.read_all()?;
                let shape = array.shape().to_vec();
                let values = array.into_vec().into_iter().map(Element::into_value).collect();
                Ok(Some((shape, values)))
            }
        }
    }

    fn attach(&mut self, handle: Rc<dyn DatasetAccess>) {
        match self.state {
            BindingState::BoundAtConstruction => {}
            BindingState::Written => self.handle = Some(handle),
            BindingState::Unbound | BindingState::BoundWritable => {
                self.handle = Some(handle);
                self.state = BindingState::BoundWritable;
            }
        }
    }
}

impl<S: DatasetSchema> Dataset<S> {
    fn from_loaded_dataset(dataset: LoadedDataset) -> Result<Self> {
        let attrs = dataset.attrs.downcast::<S>().map_err(|_| Error::UnexpectedValue {
            expected: S::NAME,
            found: "attributes of another dataset",
        })?;
        Ok(Self {
            attrs: *attrs,
            state: BindingState::Written,
            buffer: None,
            handle: Some(dataset.handle),
        })
    }
}

impl<S: DatasetSchema> H5Field for Dataset<S> {
    fn declared_type() -> DeclaredType {
        DeclaredType::Dataset(DatasetType::of::<S>())
    }

    fn dump_value(&mut self) -> DumpValue<'_> {
        DumpValue::Dataset(self)
    }

    fn from_loaded(value: LoadedValue) -> Result<Self> {
        Self::from_loaded_dataset(value.into_dataset()?)
    }
}

impl<S: DatasetSchema> UnionVariant for Dataset<S> {
    fn dataset_type() -> DatasetType {
        DatasetType::of::<S>()
    }

    fn from_dataset(dataset: LoadedDataset) -> Result<Self> {
        Self::from_loaded_dataset(dataset)
    }
}

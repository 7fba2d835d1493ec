//! Declarative mapping between typed record trees and a hierarchical
//! group/attribute/dataset store.
//!
//! A schema is a set of Rust types: records (`#[derive(H5Group)]`) become
//! groups, their scalar and enum fields become attributes, nested records
//! and lists of records become subgroups, and [`Dataset`] fields become
//! N-dimensional typed datasets whose shape and element type are declared
//! by a `#[derive(H5Dataset)]` schema. Dumping and loading are derived from
//! the schema alone, and loading validates stored shapes and types against
//! it.
//!
//! # Dump and load
//!
//! ```no_run
//! use rustyhdf5_schema::{Array, Dataset, H5Dataset, H5Group, RecordFile};
//!
//! #[derive(H5Dataset, Default)]
//! #[h5(shape(3), dtype = f64)]
//! struct Temperatures;
//!
//! #[derive(H5Group)]
//! struct Sensors {
//!     location: String,
//!     temperature: Dataset<Temperatures>,
//! }
//!
//! let mut sensors = Sensors {
//!     location: "lab".into(),
//!     temperature: Dataset::with_data(
//!         Temperatures,
//!         Array::from_vec(vec![22.5, 23.1, 21.8]),
//!     )
//!     .unwrap(),
//! };
//! sensors.dump("sensors.h5.json").unwrap();
//!
//! let loaded = Sensors::load_file("sensors.h5.json").unwrap();
//! assert_eq!(loaded.location, "lab");
//! assert_eq!(loaded.temperature.get(&[1]).unwrap(), 23.1);
//! ```
//!
//! # Writing datasets after the dump
//!
//! ```no_run
//! use rustyhdf5_schema::{Dataset, DumpProps, H5Dataset, H5Group, RecordFile, Selection};
//!
//! #[derive(H5Dataset, Default)]
//! #[h5(shape(2, 2), dtype = i32)]
//! struct Frame;
//!
//! #[derive(H5Group)]
//! struct Experiment {
//!     #[h5(rename = "manData")]
//!     man_data: Dataset<Frame>,
//! }
//!
//! let mut exp = Experiment { man_data: Dataset::default() };
//! exp.dumper("exp.h5.json", &DumpProps::new(), |exp| {
//!     exp.man_data.assign(&Selection::All, &[1, 2, 3, 4])
//! })
//! .unwrap();
//! ```

extern crate self as rustyhdf5_schema;

pub mod dataset;
pub mod dump;
pub mod error;
pub mod field;
pub mod file;
pub mod load;
pub mod partial;
pub mod path;
pub mod props;
pub mod schema;
pub mod scope;
pub mod selection;
pub mod store;
pub mod types;

pub use dataset::{Array, BindingState, Dataset, DatasetObject, Element};
pub use error::{Error, Result, SchemaError};
pub use field::{
    Bytes, DatasetSchema, DumpValue, H5Enum, H5Field, ListElement, LoadedDataset, LoadedValue,
    Record, RecordBuilder, RecordObject, UnionVariant,
};
pub use file::{H5File, OpenMode};
pub use load::LoadReport;
pub use partial::DumpReport;
pub use path::StorePath;
pub use props::{DumpProps, LoadProps};
pub use schema::{
    DatasetType, DeclaredType, EnumType, Extent, FieldDescriptor, FieldKind, RecordRole,
    RecordSchema, RecordType,
};
pub use scope::{dump, load, Loaded, RecordFile};
pub use selection::{Selection, SelectionError};
pub use store::{AttributeAccess, DatasetAccess, GroupAccess, Store, StoreError};
pub use types::{Attribute, ScalarType, ScalarValue, StoreType};

pub use rustyhdf5_schema_derive::{H5Dataset, H5Enum, H5Group, H5Union};

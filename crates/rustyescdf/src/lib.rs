//! Schema-driven attributes and datasets for electronic-structure data.
//!
//! Groups in a container are described by static [`schema`] catalogs. Each
//! catalog entry gives the name, datatype and dimensions of an attribute or
//! dataset; [`AttributeData`] and [`DatasetData`] bind those entries to
//! values and move them to and from storage, checking types, shapes and
//! value ranges on the way.
//!
//! Datasets may be stored out of order along their fastest axis. Such a
//! dataset carries a reordering table, and
//! [`DatasetData::apply_reordering`] maps a physical read back to logical
//! order.
//!
//! # Example
//!
//! ```
//! use rustyescdf::schema::{AttributeSpec, DatasetSpec};
//! use rustyescdf::{AttributeData, DataType, DatasetData, Handle, Value};
//!
//! static N: AttributeSpec = AttributeSpec::scalar(1, "n", DataType::UInt);
//! static X_DIMS: [&AttributeSpec; 1] = [&N];
//! static X: DatasetSpec = DatasetSpec::array(2, "x", DataType::Double, &X_DIMS);
//!
//! let mut handle = Handle::in_memory(None).unwrap();
//! let root = handle.group();
//!
//! let mut n = AttributeData::new(&N, &[]).unwrap();
//! n.set(3u32).unwrap();
//! n.write(handle.file_mut(), root).unwrap();
//!
//! let mut x = DatasetData::new(&X, &[&n]).unwrap();
//! x.create(handle.file_mut(), root).unwrap();
//! x.write(handle.file_mut(), vec![1.5f64, 2.5, 3.5]).unwrap();
//! x.close();
//!
//! let mut back = DatasetData::new(&X, &[&n]).unwrap();
//! back.open(handle.file(), root).unwrap();
//! assert_eq!(back.read(handle.file()).unwrap(), Value::Double(vec![1.5, 2.5, 3.5]));
//! ```

pub mod attribute;
pub mod dataset;
pub mod error;
pub mod handle;
pub mod schema;
pub mod storage;
pub mod types;

pub use attribute::AttributeData;
pub use dataset::DatasetData;
pub use error::{Error, ErrorKind, FirstError, Result};
pub use handle::{Handle, HandleOptions};
pub use schema::{AttributeSpec, Catalog, DatasetSpec};
pub use types::{disk_type, mem_type, size_of, Bounds, DataType, FromValue, Value};

pub use rustyescdf_store as store;

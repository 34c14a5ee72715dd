//! Hierarchical container backend.
//!
//! A container is a tree of groups rooted at [`File::root`]. Groups hold named
//! links to child groups and datasets; groups and datasets both carry named
//! attributes. Every attribute and dataset has a disk-side [`Datatype`] and a
//! [`Dataspace`]; reads and writes name a memory-side datatype and values are
//! converted between the two.
//!
//! Containers are persisted as HDF5 files, readable by other HDF5 tools.
//!
//! # Example
//!
//! ```
//! use rustyescdf_store::{Dataspace, Datatype, Elements, File, Selection};
//!
//! let mut file = File::in_memory();
//! let root = file.root();
//! let ds = file
//!     .create_dataset(root, "x", Datatype::Float64, Dataspace::simple(&[3]))
//!     .unwrap();
//! file.write_dataset(ds, &Selection::All, &Elements::Float64(vec![1.5, 2.5, 3.5]))
//!     .unwrap();
//! let middle = file
//!     .read_dataset(ds, &Selection::slice(&[1..2]), Datatype::Float64)
//!     .unwrap();
//! assert_eq!(middle, Elements::Float64(vec![2.5]));
//! ```

pub mod checksum;
mod format;
pub mod dataspace;
pub mod datatype;
pub mod error;
pub mod file;
pub mod props;
pub mod selection;

pub use dataspace::{Dataspace, DataspaceType};
pub use datatype::{Datatype, Elements};
pub use error::{Result, StoreError};
pub use file::{File, ObjectId, ObjectInfo};
pub use props::FileAccessProps;
pub use selection::Selection;

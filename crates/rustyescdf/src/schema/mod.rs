//! Static schema catalogs.
//!
//! A schema declares every attribute and dataset of a group once, as
//! process-wide constant tables. Array entries name the scalar unsigned
//! attributes that give their extents, in slowest-to-fastest order.
//!
//! Catalogs are built from `static` items so that dimension references are
//! plain `&'static` pointers:
//!
//! ```
//! use rustyescdf::schema::{AttributeSpec, Catalog, DatasetSpec};
//! use rustyescdf::DataType;
//!
//! static N: AttributeSpec = AttributeSpec::scalar(1, "n", DataType::UInt);
//! static X_DIMS: [&AttributeSpec; 1] = [&N];
//! static X: DatasetSpec = DatasetSpec::array(2, "x", DataType::Double, &X_DIMS);
//! static ATTRIBUTES: [&AttributeSpec; 1] = [&N];
//! static DATASETS: [&DatasetSpec; 1] = [&X];
//! static CATALOG: Catalog = Catalog {
//!     name: "demo",
//!     attributes: &ATTRIBUTES,
//!     datasets: &DATASETS,
//! };
//!
//! CATALOG.validate().unwrap();
//! assert_eq!(CATALOG.dataset("x").unwrap().id, 2);
//! ```

pub mod geometry;

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::types::{self, DataType};

/// Schema entry for an attribute.
#[derive(Debug)]
pub struct AttributeSpec {
    /// Identifier, unique within a catalog.
    pub id: u32,
    pub name: &'static str,
    pub datatype: DataType,
    /// Fixed byte length of each element; only meaningful for strings.
    pub string_length: usize,
    /// Dimension attributes, slowest-varying first. Empty for scalars.
    pub dims: &'static [&'static AttributeSpec],
}

impl AttributeSpec {
    pub const fn scalar(id: u32, name: &'static str, datatype: DataType) -> Self {
        Self {
            id,
            name,
            datatype,
            string_length: 0,
            dims: &[],
        }
    }

    pub const fn array(
        id: u32,
        name: &'static str,
        datatype: DataType,
        dims: &'static [&'static AttributeSpec],
    ) -> Self {
        Self {
            id,
            name,
            datatype,
            string_length: 0,
            dims,
        }
    }

    /// A scalar fixed-length string.
    pub const fn string(id: u32, name: &'static str, length: usize) -> Self {
        Self {
            id,
            name,
            datatype: DataType::String,
            string_length: length,
            dims: &[],
        }
    }

    /// Same entry with the string length set.
    pub const fn with_string_length(mut self, length: usize) -> Self {
        self.string_length = length;
        self
    }

    pub fn ndims(&self) -> usize {
        self.dims.len()
    }

    /// Size of one element in bytes.
    pub fn element_size(&self) -> usize {
        types::size_of(self.datatype, self.string_length)
    }

    /// Whether this entry can give the extent of an array.
    pub fn is_dimension(&self) -> bool {
        self.datatype == DataType::UInt && self.dims.is_empty()
    }
}

/// Schema entry for a dataset.
#[derive(Debug)]
pub struct DatasetSpec {
    pub id: u32,
    pub name: &'static str,
    pub datatype: DataType,
    pub string_length: usize,
    pub dims: &'static [&'static AttributeSpec],
    /// Whether on-disk element order may differ from logical order, in
    /// which case a reordering table maps between them.
    pub disordered_storage_allowed: bool,
}

impl DatasetSpec {
    pub const fn array(
        id: u32,
        name: &'static str,
        datatype: DataType,
        dims: &'static [&'static AttributeSpec],
    ) -> Self {
        Self {
            id,
            name,
            datatype,
            string_length: 0,
            dims,
            disordered_storage_allowed: false,
        }
    }

    pub const fn allow_disordered_storage(mut self) -> Self {
        self.disordered_storage_allowed = true;
        self
    }

    pub const fn with_string_length(mut self, length: usize) -> Self {
        self.string_length = length;
        self
    }

    pub fn ndims(&self) -> usize {
        self.dims.len()
    }

    pub fn element_size(&self) -> usize {
        types::size_of(self.datatype, self.string_length)
    }
}

/// The attributes and datasets of one kind of group.
#[derive(Debug)]
pub struct Catalog {
    pub name: &'static str,
    pub attributes: &'static [&'static AttributeSpec],
    pub datasets: &'static [&'static DatasetSpec],
}

impl Catalog {
    pub fn attribute(&self, name: &str) -> Option<&'static AttributeSpec> {
        self.attributes.iter().copied().find(|s| s.name == name)
    }

    pub fn attribute_by_id(&self, id: u32) -> Option<&'static AttributeSpec> {
        self.attributes.iter().copied().find(|s| s.id == id)
    }

    pub fn dataset(&self, name: &str) -> Option<&'static DatasetSpec> {
        self.datasets.iter().copied().find(|s| s.name == name)
    }

    pub fn dataset_by_id(&self, id: u32) -> Option<&'static DatasetSpec> {
        self.datasets.iter().copied().find(|s| s.id == id)
    }

    /// Check the catalog is self-consistent.
    ///
    /// Identifiers and names are unique across attributes and datasets,
    /// every entry has storage, strings have a length, and every dimension
    /// is a scalar unsigned attribute listed in this catalog.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        let entries = self
            .attributes
            .iter()
            .map(|a| (a.id, a.name, a.datatype, a.string_length, a.dims))
            .chain(
                self.datasets
                    .iter()
                    .map(|d| (d.id, d.name, d.datatype, d.string_length, d.dims)),
            );

        for (id, name, datatype, string_length, dims) in entries {
            if !ids.insert(id) {
                return Err(self.invalid(format!("duplicate identifier {id}")));
            }
            if !names.insert(name) {
                return Err(self.invalid(format!("duplicate name {name:?}")));
            }
            if datatype == DataType::None {
                return Err(self.invalid(format!("{name:?} has no datatype")));
            }
            if datatype == DataType::String && string_length == 0 {
                return Err(self.invalid(format!("string {name:?} has no length")));
            }
            for dim in dims {
                if !dim.is_dimension() {
                    return Err(self.invalid(format!(
                        "{name:?} uses {:?} as a dimension but it is not a scalar uint",
                        dim.name
                    )));
                }
                if self.attribute_by_id(dim.id).is_none() {
                    return Err(self.invalid(format!(
                        "{name:?} uses {:?} as a dimension but it is not in the catalog",
                        dim.name
                    )));
                }
            }
        }
        Ok(())
    }

    fn invalid(&self, detail: String) -> Error {
        Error::Argument(format!("catalog {}: {detail}", self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    static N: AttributeSpec = AttributeSpec::scalar(1, "n", DataType::UInt);
    static LABEL: AttributeSpec = AttributeSpec::string(2, "label", 8);
    static BAD_DIM: AttributeSpec = AttributeSpec::scalar(3, "bad", DataType::Int);
    static N_DIMS: [&AttributeSpec; 1] = [&N];
    static BAD_DIMS: [&AttributeSpec; 1] = [&BAD_DIM];
    static X: DatasetSpec = DatasetSpec::array(4, "x", DataType::Double, &N_DIMS);
    static Y: DatasetSpec = DatasetSpec::array(5, "y", DataType::Double, &BAD_DIMS);
    static DUP: DatasetSpec = DatasetSpec::array(1, "dup", DataType::Double, &N_DIMS);

    static GOOD_ATTRS: [&AttributeSpec; 2] = [&N, &LABEL];
    static GOOD_SETS: [&DatasetSpec; 1] = [&X];
    static BAD_ATTRS: [&AttributeSpec; 2] = [&N, &BAD_DIM];
    static BAD_SETS: [&DatasetSpec; 1] = [&Y];
    static DUP_SETS: [&DatasetSpec; 1] = [&DUP];
    static ORPHAN_ATTRS: [&AttributeSpec; 1] = [&LABEL];

    #[test]
    fn lookup() {
        let c = Catalog {
            name: "t",
            attributes: &GOOD_ATTRS,
            datasets: &GOOD_SETS,
        };
        c.validate().unwrap();
        assert_eq!(c.attribute("label").map(|s| s.id), Some(2));
        assert_eq!(c.attribute_by_id(1).map(|s| s.name), Some("n"));
        assert_eq!(c.dataset_by_id(4).map(|s| s.name), Some("x"));
        assert!(c.dataset("missing").is_none());
        assert_eq!(LABEL.element_size(), 8);
        assert_eq!(X.element_size(), 8);
    }

    #[test]
    fn non_uint_dimension_rejected() {
        let c = Catalog {
            name: "t",
            attributes: &BAD_ATTRS,
            datasets: &BAD_SETS,
        };
        assert_eq!(c.validate().unwrap_err().kind(), ErrorKind::Argument);
    }

    #[test]
    fn duplicate_identifier_rejected() {
        let c = Catalog {
            name: "t",
            attributes: &GOOD_ATTRS,
            datasets: &DUP_SETS,
        };
        assert_eq!(c.validate().unwrap_err().kind(), ErrorKind::Argument);
    }

    #[test]
    fn dimension_outside_catalog_rejected() {
        let c = Catalog {
            name: "t",
            attributes: &ORPHAN_ATTRS,
            datasets: &GOOD_SETS,
        };
        assert!(c.validate().is_err());
    }
}

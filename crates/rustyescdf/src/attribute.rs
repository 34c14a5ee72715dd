//! Schema-typed attribute values.
//!
//! An [`AttributeData`] is one attribute declared by an [`AttributeSpec`]. It
//! starts unset, becomes set through [`AttributeData::set`] or a successful
//! read, and is written back to any group or dataset.
//!
//! Arrays borrow the scalar attributes that give their extents. The borrow
//! keeps those dimensions alive and unchanged for as long as the array
//! exists.

use rustyescdf_store::{File, ObjectId};
use tracing::debug;

use crate::error::{Error, Result};
use crate::schema::AttributeSpec;
use crate::storage;
use crate::types::{self, Bounds, FromValue, Value};

/// Resolve the extents given by `dims`, checking each against the
/// dimension spec at the same position.
pub(crate) fn resolve_extents(
    owner: &str,
    specs: &[&'static AttributeSpec],
    dims: &[&AttributeData<'_>],
) -> Result<Vec<u64>> {
    if dims.len() != specs.len() {
        return Err(Error::Argument(format!(
            "{owner} has {} dimensions, {} supplied",
            specs.len(),
            dims.len()
        )));
    }
    specs
        .iter()
        .zip(dims)
        .map(|(spec, dim)| {
            if !spec.is_dimension() {
                return Err(Error::Argument(format!(
                    "{owner}: dimension {:?} is not a scalar uint",
                    spec.name
                )));
            }
            if dim.spec.id != spec.id {
                return Err(Error::Argument(format!(
                    "{owner}: expected dimension {:?}, got {:?}",
                    spec.name, dim.spec.name
                )));
            }
            let extent: u32 = dim.get_as()?;
            Ok(u64::from(extent))
        })
        .collect()
}

/// An attribute instance bound to its spec and, for arrays, to the
/// attributes holding its extents.
#[derive(Debug)]
pub struct AttributeData<'d> {
    spec: &'static AttributeSpec,
    dims: Vec<&'d AttributeData<'d>>,
    extents: Vec<u64>,
    value: Option<Value>,
}

impl<'d> AttributeData<'d> {
    /// Create an unset attribute.
    ///
    /// `dims` must hold one set attribute per dimension of `spec`, each
    /// declared by the dimension spec at that position.
    pub fn new(spec: &'static AttributeSpec, dims: &[&'d AttributeData<'d>]) -> Result<Self> {
        if spec.datatype == types::DataType::None {
            return Err(Error::Argument(format!("{:?} has no datatype", spec.name)));
        }
        let extents = resolve_extents(spec.name, spec.dims, dims)?;
        Ok(Self {
            spec,
            dims: dims.to_vec(),
            extents,
            value: None,
        })
    }

    /// Whether an attribute named after `spec` exists on `loc`.
    pub fn is_present(spec: &AttributeSpec, file: &File, loc: ObjectId) -> bool {
        file.attr_exists(loc, spec.name)
    }

    pub fn spec(&self) -> &'static AttributeSpec {
        self.spec
    }

    pub fn spec_id(&self) -> u32 {
        self.spec.id
    }

    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    /// The attributes this array is bound to.
    pub fn bound_dimensions(&self) -> &[&'d AttributeData<'d>] {
        &self.dims
    }

    /// Resolved extents; empty for scalars.
    pub fn dimensions(&self) -> &[u64] {
        &self.extents
    }

    /// Number of elements.
    pub fn num_elements(&self) -> u64 {
        self.extents.iter().product()
    }

    /// Bytes occupied by the full value.
    pub fn size_of(&self) -> usize {
        self.num_elements() as usize * self.spec.element_size()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// Assign a value. It must have the spec's datatype and exactly
    /// [`num_elements`](Self::num_elements) elements.
    pub fn set(&mut self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if value.datatype() != self.spec.datatype {
            return Err(Error::Argument(format!(
                "{}: {} value for a {} attribute",
                self.spec.name,
                value.datatype(),
                self.spec.datatype
            )));
        }
        if value.len() as u64 != self.num_elements() {
            return Err(Error::Shape(format!(
                "{}: {} elements for extents {:?}",
                self.spec.name,
                value.len(),
                self.extents
            )));
        }
        if let Value::String(strings) = &value {
            for s in strings {
                if let Err(Error::Argument(msg)) =
                    types::check_fixed_string(s, self.spec.string_length)
                {
                    return Err(Error::Argument(format!("{}: {msg}", self.spec.name)));
                }
            }
        }
        self.value = Some(value);
        Ok(())
    }

    /// The current value.
    pub fn get(&self) -> Result<&Value> {
        self.value
            .as_ref()
            .ok_or_else(|| Error::NotSet(self.spec.name.to_string()))
    }

    /// The current value as a Rust type, e.g. `u32` or `Vec<f64>`.
    pub fn get_as<T: FromValue>(&self) -> Result<T> {
        let value = self.get()?;
        T::from_value(value).ok_or_else(|| {
            Error::Argument(format!(
                "{}: cannot extract {} from {} {} elements",
                self.spec.name,
                std::any::type_name::<T>(),
                value.len(),
                value.datatype()
            ))
        })
    }

    /// Read the attribute from `loc`. On failure the previous state is kept.
    pub fn read(&mut self, file: &File, loc: ObjectId) -> Result<()> {
        let value = storage::read_attr(
            file,
            loc,
            self.spec.name,
            self.spec.datatype,
            self.spec.string_length,
            &self.extents,
        )?;
        self.value = Some(value);
        Ok(())
    }

    /// Read the attribute and require every element inside `bounds`.
    /// Nothing is assigned unless the whole value passes.
    pub fn read_in_range(&mut self, file: &File, loc: ObjectId, bounds: Bounds) -> Result<()> {
        let value = storage::read_attr_in_range(
            file,
            loc,
            self.spec.name,
            self.spec.datatype,
            &self.extents,
            bounds,
        )?;
        self.value = Some(value);
        Ok(())
    }

    /// Write the value to `loc`, replacing any attribute of the same name.
    pub fn write(&self, file: &mut File, loc: ObjectId) -> Result<()> {
        let value = self.get()?;
        storage::write_attr(
            file,
            loc,
            self.spec.name,
            value,
            self.spec.string_length,
            &self.extents,
        )?;
        debug!(attribute = self.spec.name, "wrote attribute");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::DataType;

    static DIM1: AttributeSpec = AttributeSpec::scalar(7, "dim1", DataType::UInt);
    static DIM2: AttributeSpec = AttributeSpec::scalar(8, "dim2", DataType::UInt);
    static INT_DIM: AttributeSpec = AttributeSpec::scalar(9, "int_dim", DataType::Int);
    static NONE: AttributeSpec = AttributeSpec::scalar(0, "none", DataType::None);
    static SCALAR_BOOL: AttributeSpec = AttributeSpec::scalar(1, "scalar_bool", DataType::Bool);
    static SCALAR_STRING: AttributeSpec = AttributeSpec::string(5, "scalar_string", 6);
    static ARRAY_DIMS: [&AttributeSpec; 2] = [&DIM1, &DIM2];
    static INT_DIMS: [&AttributeSpec; 1] = [&INT_DIM];
    static ARRAY_UINT: AttributeSpec = AttributeSpec::array(10, "array_uint", DataType::UInt, &ARRAY_DIMS);
    static BAD_ARRAY: AttributeSpec = AttributeSpec::array(11, "bad_array", DataType::UInt, &INT_DIMS);

    fn dim(spec: &'static AttributeSpec, n: u32) -> AttributeData<'static> {
        let mut d = AttributeData::new(spec, &[]).unwrap();
        d.set(n).unwrap();
        d
    }

    #[test]
    fn unset_until_set() {
        let mut a = AttributeData::new(&SCALAR_BOOL, &[]).unwrap();
        assert!(!a.is_set());
        assert_eq!(a.get().unwrap_err().kind(), ErrorKind::NotSet);
        a.set(true).unwrap();
        assert!(a.get_as::<bool>().unwrap());
    }

    #[test]
    fn write_requires_value() {
        let a = AttributeData::new(&SCALAR_BOOL, &[]).unwrap();
        let mut f = File::in_memory();
        let root = f.root();
        assert_eq!(a.write(&mut f, root).unwrap_err().kind(), ErrorKind::NotSet);
        assert!(!AttributeData::is_present(&SCALAR_BOOL, &f, root));
    }

    #[test]
    fn array_extents_and_size() {
        let d1 = dim(&DIM1, 2);
        let d2 = dim(&DIM2, 3);
        let a = AttributeData::new(&ARRAY_UINT, &[&d1, &d2]).unwrap();
        assert_eq!(a.dimensions(), &[2, 3]);
        assert_eq!(a.num_elements(), 6);
        assert_eq!(a.size_of(), 6 * std::mem::size_of::<u32>());
        assert_eq!(a.bound_dimensions().len(), 2);
    }

    #[test]
    fn dimension_binding_checked() {
        let d1 = dim(&DIM1, 2);
        let d2 = dim(&DIM2, 3);
        let unset = AttributeData::new(&DIM2, &[]).unwrap();

        let err = AttributeData::new(&ARRAY_UINT, &[&d1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Argument);
        let err = AttributeData::new(&ARRAY_UINT, &[&d2, &d1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Argument);
        let err = AttributeData::new(&ARRAY_UINT, &[&d1, &unset]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSet);

        let mut int_dim = AttributeData::new(&INT_DIM, &[]).unwrap();
        int_dim.set(2i32).unwrap();
        let err = AttributeData::new(&BAD_ARRAY, &[&int_dim]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Argument);
    }

    #[test]
    fn none_has_no_instance() {
        assert_eq!(
            AttributeData::new(&NONE, &[]).unwrap_err().kind(),
            ErrorKind::Argument
        );
        assert_eq!(NONE.element_size(), 0);
    }

    #[test]
    fn set_validates_type_and_length() {
        let d1 = dim(&DIM1, 2);
        let d2 = dim(&DIM2, 3);
        let mut a = AttributeData::new(&ARRAY_UINT, &[&d1, &d2]).unwrap();
        assert_eq!(a.set(vec![1u32, 2]).unwrap_err().kind(), ErrorKind::Shape);
        assert_eq!(a.set(vec![1i32; 6]).unwrap_err().kind(), ErrorKind::Argument);
        assert!(!a.is_set());
        a.set(vec![1u32, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(a.get_as::<Vec<u32>>().unwrap(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(a.get_as::<u32>().unwrap_err().kind(), ErrorKind::Argument);

        let mut s = AttributeData::new(&SCALAR_STRING, &[]).unwrap();
        assert_eq!(s.set("far too long").unwrap_err().kind(), ErrorKind::Argument);
        s.set("ok").unwrap();
    }

    #[test]
    fn strings_with_nul_rejected_on_set() {
        let mut s = AttributeData::new(&SCALAR_STRING, &[]).unwrap();
        let err = s.set("ok\0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Argument);
        assert!(err.to_string().contains("scalar_string"));
        assert!(!s.is_set());

        // Trailing spaces are kept; only NULs are refused.
        let mut f = File::in_memory();
        let root = f.root();
        s.set("a b ").unwrap();
        s.write(&mut f, root).unwrap();
        let mut back = AttributeData::new(&SCALAR_STRING, &[]).unwrap();
        back.read(&f, root).unwrap();
        assert_eq!(back.get_as::<String>().unwrap(), "a b ");
    }

    #[test]
    fn read_keeps_state_on_failure() {
        let f = File::in_memory();
        let mut a = AttributeData::new(&SCALAR_BOOL, &[]).unwrap();
        a.set(false).unwrap();
        let err = a.read(&f, f.root()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!a.get_as::<bool>().unwrap());
    }
}

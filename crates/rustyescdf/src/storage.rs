//! Typed I/O against the container.
//!
//! Every attribute and dataset operation goes through these helpers: they
//! check presence and stored shape, map schema datatypes to backend types,
//! and build the disk-side selections used for partial dataset I/O.

use rustyescdf_store::{Dataspace, DataspaceType, File, ObjectId, Selection, StoreError};
use tracing::{debug, trace};

use crate::error::{Error, FirstError, Result};
use crate::types::{disk_type, mem_type, Bounds, DataType, Value};

/// Whether `name` is both a link in `loc` and resolves to an object.
/// A dangling link counts as absent.
pub fn check_present(file: &File, loc: ObjectId, name: &str) -> bool {
    file.link_exists(loc, name) && file.object_exists(loc, name)
}

/// Check a stored dataspace against the expected extents.
///
/// A scalar matches `dims == []`. A simple dataspace matches when its
/// extents equal `dims` and its maximum extents are not smaller; a 1-D
/// dataspace of extent 1 also matches `dims == []`.
pub fn check_shape(space: &Dataspace, dims: &[u64]) -> Result<()> {
    match space.space_type {
        DataspaceType::Scalar if dims.is_empty() => Ok(()),
        DataspaceType::Simple if space.dimensions.len() == dims.len() => {
            let max = space.max_dims();
            for (d, &expected) in dims.iter().enumerate() {
                if space.dimensions[d] != expected || max[d] < expected {
                    return Err(Error::Shape(format!(
                        "stored extents {:?}, expected {dims:?}",
                        space.dimensions
                    )));
                }
            }
            Ok(())
        }
        DataspaceType::Simple if dims.is_empty() && space.dimensions == [1] => Ok(()),
        _ => Err(Error::Shape(format!(
            "stored {:?} dataspace with extents {:?}, expected {dims:?}",
            space.space_type, space.dimensions
        ))),
    }
}

fn dataspace_for(dims: &[u64]) -> Dataspace {
    if dims.is_empty() {
        Dataspace::scalar()
    } else {
        Dataspace::simple(dims)
    }
}

fn backend_type(
    map: fn(DataType, usize) -> Option<rustyescdf_store::Datatype>,
    datatype: DataType,
    string_length: usize,
) -> Result<rustyescdf_store::Datatype> {
    map(datatype, string_length)
        .ok_or_else(|| Error::Argument(format!("{datatype} values have no storage")))
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// Read the attribute `name` of `obj`, checking its shape against `dims`.
pub fn read_attr(
    file: &File,
    obj: ObjectId,
    name: &str,
    datatype: DataType,
    string_length: usize,
    dims: &[u64],
) -> Result<Value> {
    if !file.attr_exists(obj, name) {
        return Err(Error::NotFound(name.to_string()));
    }
    let info = file.attr_info(obj, name)?;
    check_shape(&info.dataspace, dims)?;
    let mem = backend_type(mem_type, datatype, string_length)?;
    let value = Value::from_elements(datatype, file.read_attr(obj, name, mem)?)?;
    trace!(attribute = name, elements = value.len(), "read attribute");
    Ok(value)
}

/// [`read_attr`], then reject the value unless every element lies inside
/// `bounds`. Nothing is returned on failure.
pub fn read_attr_in_range(
    file: &File,
    obj: ObjectId,
    name: &str,
    datatype: DataType,
    dims: &[u64],
    bounds: Bounds,
) -> Result<Value> {
    let value = read_attr(file, obj, name, datatype, 0, dims)?;
    bounds.check(&value).map_err(|e| match e {
        Error::OutOfRange(detail) => Error::OutOfRange(format!("{name}: {detail}")),
        other => other,
    })?;
    Ok(value)
}

/// Create (or re-create) the attribute `name` on `obj` with extents `dims`
/// and write `value` into it.
pub fn write_attr(
    file: &mut File,
    obj: ObjectId,
    name: &str,
    value: &Value,
    string_length: usize,
    dims: &[u64],
) -> Result<()> {
    let disk = backend_type(disk_type, value.datatype(), string_length)?;
    let elements = value.to_elements(string_length)?;
    file.create_attr(obj, name, disk, dataspace_for(dims))?;

    // A failed write leaves no zero-filled attribute behind.
    let mut errors = FirstError::new();
    if errors.record(file.write_attr(obj, name, &elements)).is_none() {
        errors.record(file.delete_attr(obj, name));
    }
    errors.finish(())?;
    trace!(attribute = name, elements = value.len(), "wrote attribute");
    Ok(())
}

// ---------------------------------------------------------------------------
// Groups and datasets
// ---------------------------------------------------------------------------

/// Open every group along the `/`-separated `path`, creating the ones that
/// are missing. Returns the last group.
pub fn create_group_path(file: &mut File, loc: ObjectId, path: &str) -> Result<ObjectId> {
    let mut current = if path.starts_with('/') { file.root() } else { loc };
    for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
        current = if check_present(file, current, segment) {
            file.open_group(current, segment)?
        } else {
            let id = file.create_group(current, segment)?;
            debug!(group = segment, "created group on path");
            id
        };
    }
    Ok(current)
}

/// Create a zero-filled dataset with extents `dims`.
pub fn create_dataset(
    file: &mut File,
    loc: ObjectId,
    name: &str,
    datatype: DataType,
    string_length: usize,
    dims: &[u64],
) -> Result<ObjectId> {
    let disk = backend_type(disk_type, datatype, string_length)?;
    Ok(file.create_dataset(loc, name, disk, dataspace_for(dims))?)
}

/// Open the dataset `name`, checking its stored shape against `dims`.
pub fn open_dataset(file: &File, loc: ObjectId, name: &str, dims: &[u64]) -> Result<ObjectId> {
    if !check_present(file, loc, name) {
        return Err(Error::NotFound(name.to_string()));
    }
    let id = file.open_dataset(loc, name)?;
    check_shape(&file.dataset_info(id)?.dataspace, dims)?;
    Ok(id)
}

/// A disk-side selection and the flat memory layout it reads into or
/// writes from.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceSelection {
    pub disk: Selection,
    /// `[n]` for `n` selected elements; null when nothing is selected.
    pub memory: Dataspace,
}

impl SliceSelection {
    fn new(disk: Selection, dims: &[u64]) -> Self {
        match disk.num_elements(dims) {
            0 => Self {
                disk: Selection::None,
                memory: Dataspace::null(),
            },
            n => Self {
                disk,
                memory: Dataspace::simple(&[n]),
            },
        }
    }

    /// Number of selected elements.
    pub fn len(&self) -> u64 {
        self.memory.num_elements()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn selection_error(e: StoreError) -> Error {
    match e {
        StoreError::SelectionOutOfBounds { dims } => {
            Error::Argument(format!("selection outside extents {dims:?}"))
        }
        other => other.into(),
    }
}

/// Select a strided range of `ds`. Without `start` and `count` the whole
/// dataset is selected; a missing `stride` means 1.
pub fn select_slice(
    file: &File,
    ds: ObjectId,
    start: Option<&[u64]>,
    count: Option<&[u64]>,
    stride: Option<&[u64]>,
) -> Result<SliceSelection> {
    let dims = file.dataset_info(ds)?.dataspace.selection_dims();
    let disk = match (start, count) {
        (Some(start), Some(count)) => {
            let rank_ok = start.len() == dims.len()
                && count.len() == dims.len()
                && stride.map_or(true, |s| s.len() == dims.len());
            if !rank_ok {
                return Err(Error::Argument(format!(
                    "slice rank differs from dataset rank {}",
                    dims.len()
                )));
            }
            Selection::strided(start, count, stride)
        }
        _ => Selection::All,
    };
    disk.validate(&dims).map_err(selection_error)?;
    Ok(SliceSelection::new(disk, &dims))
}

/// Select the listed coordinates of `ds`, in list order.
pub fn select_elements(file: &File, ds: ObjectId, coords: &[Vec<u64>]) -> Result<SliceSelection> {
    let dims = file.dataset_info(ds)?.dataspace.selection_dims();
    let disk = Selection::Points(coords.to_vec());
    disk.validate(&dims).map_err(selection_error)?;
    Ok(SliceSelection::new(disk, &dims))
}

/// Read the elements picked by `selection`.
pub fn read_dataset(
    file: &File,
    ds: ObjectId,
    datatype: DataType,
    string_length: usize,
    selection: &SliceSelection,
) -> Result<Value> {
    let mem = backend_type(mem_type, datatype, string_length)?;
    let elements = file.read_dataset(ds, &selection.disk, mem)?;
    Value::from_elements(datatype, elements)
}

/// Write `value` into the elements picked by `selection`.
pub fn write_dataset(
    file: &mut File,
    ds: ObjectId,
    selection: &SliceSelection,
    value: &Value,
    string_length: usize,
) -> Result<()> {
    if value.len() as u64 != selection.len() {
        return Err(Error::Shape(format!(
            "{} values for {} selected elements",
            value.len(),
            selection.len()
        )));
    }
    let elements = value.to_elements(string_length)?;
    file.write_dataset(ds, &selection.disk, &elements)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Schema-typed datasets and their storage order.
//!
//! A [`DatasetData`] is bound to the scalar attributes giving its extents,
//! like an array [`AttributeData`]. It is then created or opened on a group,
//! after which it can be read and written whole, by strided slice, or at
//! scattered coordinates.
//!
//! Datasets whose spec allows disordered storage may be kept on disk in a
//! different order along their fastest axis. Such a dataset carries a
//! reordering table: logical position `i` along that axis is stored at
//! physical position `table[i]`. The flag and the table are attached to the
//! dataset as the attributes `is_ordered` and `reordering_table`.
//!
//! Reads return physical order; [`DatasetData::apply_reordering`] converts a
//! full read to logical order.

use rustyescdf_store::{File, ObjectId};
use tracing::{debug, warn};

use crate::attribute::{resolve_extents, AttributeData};
use crate::error::{Error, FirstError, Result};
use crate::schema::DatasetSpec;
use crate::storage::{self, SliceSelection};
use crate::types::{self, DataType, Value};

/// Name of the attribute holding the ordering flag.
pub const IS_ORDERED: &str = "is_ordered";
/// Name of the attribute holding the reordering table.
pub const REORDERING_TABLE: &str = "reordering_table";

/// A dataset instance: spec, resolved extents, storage order and, once
/// created or opened, the backend handle.
#[derive(Debug)]
pub struct DatasetData<'d> {
    spec: &'static DatasetSpec,
    dims: Vec<&'d AttributeData<'d>>,
    extents: Vec<u64>,
    is_ordered: bool,
    reordering_table: Option<Vec<u32>>,
    id: Option<ObjectId>,
}

impl<'d> DatasetData<'d> {
    /// Bind a dataset to its dimension attributes. The dataset starts
    /// ordered, without a table, and not yet created or opened.
    pub fn new(spec: &'static DatasetSpec, dims: &[&'d AttributeData<'d>]) -> Result<Self> {
        if spec.datatype == DataType::None {
            return Err(Error::Argument(format!("{:?} has no datatype", spec.name)));
        }
        let extents = resolve_extents(spec.name, spec.dims, dims)?;
        Ok(Self {
            spec,
            dims: dims.to_vec(),
            extents,
            is_ordered: true,
            reordering_table: None,
            id: None,
        })
    }

    /// Whether a link named after `spec` in `loc` resolves to an object.
    pub fn is_present(spec: &DatasetSpec, file: &File, loc: ObjectId) -> bool {
        storage::check_present(file, loc, spec.name)
    }

    pub fn spec(&self) -> &'static DatasetSpec {
        self.spec
    }

    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    pub fn bound_dimensions(&self) -> &[&'d AttributeData<'d>] {
        &self.dims
    }

    pub fn number_of_dimensions(&self) -> usize {
        self.extents.len()
    }

    pub fn dimensions(&self) -> &[u64] {
        &self.extents
    }

    pub fn num_elements(&self) -> u64 {
        self.extents.iter().product()
    }

    /// Bytes occupied by the full dataset.
    pub fn size_of(&self) -> usize {
        self.num_elements() as usize * types::size_of(self.spec.datatype, self.spec.string_length)
    }

    pub fn is_disordered_storage_allowed(&self) -> bool {
        self.spec.disordered_storage_allowed
    }

    pub fn is_ordered(&self) -> bool {
        self.is_ordered
    }

    pub fn reordering_table(&self) -> Option<&[u32]> {
        self.reordering_table.as_deref()
    }

    /// Backend handle, once created or opened.
    pub fn id(&self) -> Option<ObjectId> {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.id.is_some()
    }

    /// Extent of the fastest-varying axis.
    fn fastest_extent(&self) -> Result<u64> {
        self.extents.last().copied().ok_or_else(|| {
            Error::Ordering(format!("{}: a scalar dataset has no storage order", self.spec.name))
        })
    }

    /// Set the ordering flag. Marking the dataset ordered drops any
    /// reordering table.
    pub fn set_ordered(&mut self, ordered: bool) -> Result<()> {
        if !ordered && !self.spec.disordered_storage_allowed {
            return Err(self.disorder_forbidden());
        }
        self.is_ordered = ordered;
        if ordered {
            self.reordering_table = None;
        }
        Ok(())
    }

    /// Attach a reordering table and mark the dataset unordered.
    ///
    /// The table must be a permutation of `0..n`, `n` being the extent of
    /// the fastest axis.
    pub fn set_reordering_table(&mut self, table: Vec<u32>) -> Result<()> {
        if !self.spec.disordered_storage_allowed {
            return Err(self.disorder_forbidden());
        }
        validate_permutation(self.spec.name, &table, self.fastest_extent()?)?;
        self.reordering_table = Some(table);
        self.is_ordered = false;
        Ok(())
    }

    fn disorder_forbidden(&self) -> Error {
        Error::Ordering(format!("{} must be stored in order", self.spec.name))
    }

    fn check_readable_order(&self) -> Result<()> {
        if !self.is_ordered && self.reordering_table.is_none() {
            return Err(Error::Ordering(format!(
                "{} is unordered but has no reordering table",
                self.spec.name
            )));
        }
        Ok(())
    }

    fn open_id(&self) -> Result<ObjectId> {
        self.id
            .ok_or_else(|| Error::Generic(format!("{} is not created or opened", self.spec.name)))
    }

    fn ensure_closed(&self) -> Result<()> {
        if self.id.is_some() {
            return Err(Error::Generic(format!("{} is already open", self.spec.name)));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Create the dataset in `loc` along with its ordering metadata.
    ///
    /// An unordered dataset must already carry its reordering table. If the
    /// metadata cannot be written the new dataset is unlinked again.
    pub fn create(&mut self, file: &mut File, loc: ObjectId) -> Result<()> {
        self.ensure_closed()?;
        self.check_readable_order()?;

        let id = storage::create_dataset(
            file,
            loc,
            self.spec.name,
            self.spec.datatype,
            self.spec.string_length,
            &self.extents,
        )?;

        let mut errors = FirstError::new();
        errors.record(storage::write_attr(
            file,
            id,
            IS_ORDERED,
            &Value::Bool(vec![self.is_ordered]),
            1,
            &[],
        ));
        if let Some(table) = &self.reordering_table {
            if !errors.is_err() {
                errors.record(storage::write_attr(
                    file,
                    id,
                    REORDERING_TABLE,
                    &Value::UInt(table.clone()),
                    0,
                    &[table.len() as u64],
                ));
            }
        }
        if errors.is_err() {
            errors.record(file.unlink(loc, self.spec.name));
        }
        errors.finish(())?;

        self.id = Some(id);
        debug!(
            dataset = self.spec.name,
            extents = ?self.extents,
            ordered = self.is_ordered,
            "created dataset"
        );
        Ok(())
    }

    /// Open the dataset in `loc` and load its ordering metadata.
    ///
    /// A stored reordering table is loaded whatever the flag says, and makes
    /// the dataset unordered. A dataset flagged unordered without a table
    /// cannot be opened, and neither can one without the flag.
    pub fn open(&mut self, file: &File, loc: ObjectId) -> Result<()> {
        self.ensure_closed()?;
        let id = storage::open_dataset(file, loc, self.spec.name, &self.extents)?;

        if !file.attr_exists(id, IS_ORDERED) {
            return Err(Error::NotFound(format!(
                "{}: {IS_ORDERED} attribute",
                self.spec.name
            )));
        }
        let flag = storage::read_attr(file, id, IS_ORDERED, DataType::Bool, 1, &[])?;
        let mut is_ordered = matches!(flag, Value::Bool(v) if v.first() == Some(&true));

        let mut table = None;
        if file.attr_exists(id, REORDERING_TABLE) {
            if !self.spec.disordered_storage_allowed {
                return Err(self.disorder_forbidden());
            }
            let n = self.fastest_extent()?;
            let stored = storage::read_attr(file, id, REORDERING_TABLE, DataType::UInt, 0, &[n])?;
            let Value::UInt(stored) = stored else {
                return Err(Error::Generic(format!("{REORDERING_TABLE} is not a uint array")));
            };
            validate_permutation(self.spec.name, &stored, n)
                .map_err(|e| Error::Ordering(format!("stored table invalid: {e}")))?;
            if is_ordered {
                warn!(dataset = self.spec.name, "reordering table stored on an ordered dataset");
                is_ordered = false;
            }
            table = Some(stored);
        } else if !is_ordered {
            return Err(Error::Ordering(format!(
                "{} is stored unordered without a reordering table",
                self.spec.name
            )));
        }

        self.is_ordered = is_ordered;
        self.reordering_table = table;
        self.id = Some(id);
        debug!(dataset = self.spec.name, ordered = is_ordered, "opened dataset");
        Ok(())
    }

    /// Release the backend handle. The ordering state is kept.
    pub fn close(&mut self) {
        self.id = None;
    }

    // -----------------------------------------------------------------------
    // I/O
    // -----------------------------------------------------------------------

    /// Read the whole dataset, in physical order.
    pub fn read(&self, file: &File) -> Result<Value> {
        self.read_slice(file, None, None, None)
    }

    /// Read a strided range, in physical order. Without `start` and `count`
    /// the whole dataset is read.
    pub fn read_slice(
        &self,
        file: &File,
        start: Option<&[u64]>,
        count: Option<&[u64]>,
        stride: Option<&[u64]>,
    ) -> Result<Value> {
        let id = self.open_id()?;
        self.check_readable_order()?;
        let selection = storage::select_slice(file, id, start, count, stride)?;
        self.read_selection(file, id, &selection)
    }

    /// Read the elements at physical coordinates `coords`, in list order.
    pub fn read_at(&self, file: &File, coords: &[Vec<u64>]) -> Result<Value> {
        let id = self.open_id()?;
        self.check_readable_order()?;
        let selection = storage::select_elements(file, id, coords)?;
        self.read_selection(file, id, &selection)
    }

    fn read_selection(&self, file: &File, id: ObjectId, selection: &SliceSelection) -> Result<Value> {
        storage::read_dataset(
            file,
            id,
            self.spec.datatype,
            self.spec.string_length,
            selection,
        )
    }

    /// Write the whole dataset, in physical order.
    pub fn write(&self, file: &mut File, value: impl Into<Value>) -> Result<()> {
        self.write_slice(file, None, None, None, value)
    }

    /// Write a strided range, in physical order.
    pub fn write_slice(
        &self,
        file: &mut File,
        start: Option<&[u64]>,
        count: Option<&[u64]>,
        stride: Option<&[u64]>,
        value: impl Into<Value>,
    ) -> Result<()> {
        let id = self.open_id()?;
        let value = value.into();
        self.check_datatype(&value)?;
        let selection = storage::select_slice(file, id, start, count, stride)?;
        storage::write_dataset(file, id, &selection, &value, self.spec.string_length)
    }

    fn check_datatype(&self, value: &Value) -> Result<()> {
        if value.datatype() != self.spec.datatype {
            return Err(Error::Argument(format!(
                "{}: {} value for a {} dataset",
                self.spec.name,
                value.datatype(),
                self.spec.datatype
            )));
        }
        Ok(())
    }

    /// Check that `value` could be written as the whole dataset: right
    /// datatype (`Argument`) and one element per stored element (`Shape`).
    /// Strings are checked against the declared length when written.
    pub fn check_value(&self, value: &Value) -> Result<()> {
        self.check_datatype(value)?;
        if value.len() as u64 != self.num_elements() {
            return Err(Error::Shape(format!(
                "{}: {} values, dataset holds {}",
                self.spec.name,
                value.len(),
                self.num_elements()
            )));
        }
        Ok(())
    }

    /// Rearrange a full physical-order read into logical order.
    ///
    /// Along the fastest axis, logical element `i` is taken from physical
    /// element `table[i]`. Ordered datasets are returned unchanged.
    pub fn apply_reordering(&self, physical: &Value) -> Result<Value> {
        let Some(table) = &self.reordering_table else {
            return Ok(physical.clone());
        };
        if physical.len() as u64 != self.num_elements() {
            return Err(Error::Shape(format!(
                "{}: {} values, dataset holds {}",
                self.spec.name,
                physical.len(),
                self.num_elements()
            )));
        }
        Ok(match physical {
            Value::Bool(v) => Value::Bool(permute(v, table)),
            Value::UInt(v) => Value::UInt(permute(v, table)),
            Value::Int(v) => Value::Int(permute(v, table)),
            Value::Double(v) => Value::Double(permute(v, table)),
            Value::String(v) => Value::String(permute(v, table)),
        })
    }
}

/// Apply `table` to every row of `values`, rows being `table.len()` long.
fn permute<T: Clone>(values: &[T], table: &[u32]) -> Vec<T> {
    if table.is_empty() {
        return Vec::new();
    }
    values
        .chunks(table.len())
        .flat_map(|row| table.iter().map(move |&p| row[p as usize].clone()))
        .collect()
}

fn validate_permutation(name: &str, table: &[u32], n: u64) -> Result<()> {
    if table.len() as u64 != n {
        return Err(Error::Shape(format!(
            "{name}: reordering table has {} entries, fastest extent is {n}",
            table.len()
        )));
    }
    let mut seen = vec![false; table.len()];
    for &p in table {
        match seen.get_mut(p as usize) {
            Some(slot) if !*slot => *slot = true,
            _ => {
                return Err(Error::Argument(format!(
                    "{name}: reordering table is not a permutation of 0..{n}"
                )))
            }
        }
    }
    Ok(())
}

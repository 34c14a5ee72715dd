//! Geometry groups: the lattice and atomic sites of a system.
//!
//! Geometries live under `geometries/` in a handle's root group, either in
//! that group itself or in a named subgroup.

use rustyescdf_store::{File, ObjectId};
use tracing::debug;

use super::{AttributeSpec, Catalog, DatasetSpec};
use crate::attribute::AttributeData;
use crate::dataset::DatasetData;
use crate::error::{Error, FirstError, Result};
use crate::handle::Handle;
use crate::storage;
use crate::types::{Bounds, DataType, Value};

/// Group holding every geometry.
pub const GEOMETRIES: &str = "geometries";

pub static NUMBER_OF_PHYSICAL_DIMENSIONS: AttributeSpec =
    AttributeSpec::scalar(1, "number_of_physical_dimensions", DataType::UInt);
pub static DIMENSION_TYPES: AttributeSpec =
    AttributeSpec::array(2, "dimension_types", DataType::Int, &PHYSICAL_DIMS);
pub static EMBEDDED_SYSTEM: AttributeSpec = AttributeSpec::string(3, "embedded_system", 3);
pub static NUMBER_OF_SPECIES: AttributeSpec =
    AttributeSpec::scalar(4, "number_of_species", DataType::UInt);
pub static NUMBER_OF_SITES: AttributeSpec =
    AttributeSpec::scalar(5, "number_of_sites", DataType::UInt);
pub static ABSOLUTE_OR_REDUCED_COORDINATES: AttributeSpec =
    AttributeSpec::scalar(6, "absolute_or_reduced_coordinates", DataType::Int);

pub static LATTICE_VECTORS: DatasetSpec =
    DatasetSpec::array(7, "lattice_vectors", DataType::Double, &LATTICE_DIMS);
pub static SITE_POSITIONS: DatasetSpec =
    DatasetSpec::array(8, "site_positions", DataType::Double, &SITE_POSITION_DIMS);
pub static SPECIES_AT_SITES: DatasetSpec =
    DatasetSpec::array(9, "species_at_sites", DataType::UInt, &SITE_DIMS)
        .allow_disordered_storage();
pub static ATOMIC_NUMBERS: DatasetSpec =
    DatasetSpec::array(10, "atomic_numbers", DataType::Double, &SPECIES_DIMS);

static PHYSICAL_DIMS: [&AttributeSpec; 1] = [&NUMBER_OF_PHYSICAL_DIMENSIONS];
static LATTICE_DIMS: [&AttributeSpec; 2] =
    [&NUMBER_OF_PHYSICAL_DIMENSIONS, &NUMBER_OF_PHYSICAL_DIMENSIONS];
static SITE_POSITION_DIMS: [&AttributeSpec; 2] = [&NUMBER_OF_SITES, &NUMBER_OF_PHYSICAL_DIMENSIONS];
static SITE_DIMS: [&AttributeSpec; 1] = [&NUMBER_OF_SITES];
static SPECIES_DIMS: [&AttributeSpec; 1] = [&NUMBER_OF_SPECIES];

static ATTRIBUTES: [&AttributeSpec; 6] = [
    &NUMBER_OF_PHYSICAL_DIMENSIONS,
    &DIMENSION_TYPES,
    &EMBEDDED_SYSTEM,
    &NUMBER_OF_SPECIES,
    &NUMBER_OF_SITES,
    &ABSOLUTE_OR_REDUCED_COORDINATES,
];
static DATASETS: [&DatasetSpec; 4] = [
    &LATTICE_VECTORS,
    &SITE_POSITIONS,
    &SPECIES_AT_SITES,
    &ATOMIC_NUMBERS,
];

/// Every attribute and dataset of a geometry group.
pub static CATALOG: Catalog = Catalog {
    name: "geometry",
    attributes: &ATTRIBUTES,
    datasets: &DATASETS,
};

const PHYSICAL_DIMENSIONS_RANGE: Bounds = Bounds::UInt(1, 3);
const DIMENSION_TYPES_RANGE: Bounds = Bounds::Int(0, 2);
const COUNT_RANGE: Bounds = Bounds::UInt(1, u32::MAX);

/// Metadata of one geometry group. Fields are `None` until set or read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    pub number_of_physical_dimensions: Option<u32>,
    pub dimension_types: Option<Vec<i32>>,
    pub embedded_system: Option<String>,
    pub number_of_species: Option<u32>,
    pub number_of_sites: Option<u32>,
    pub absolute_or_reduced_coordinates: Option<i32>,
    /// Set by [`Geometry::open_group`] and [`Geometry::create_group`].
    pub group: OpenGroup,
}

/// The group a [`Geometry`] is bound to, if any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenGroup(Option<ObjectId>);

fn group_path(path: Option<&str>) -> String {
    match path {
        Some(p) => format!("{GEOMETRIES}/{p}"),
        None => GEOMETRIES.to_string(),
    }
}

impl Geometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.group.0.is_some()
    }

    fn open_group_id(&self) -> Result<ObjectId> {
        self.group
            .0
            .ok_or_else(|| Error::Generic("no geometry group is open".into()))
    }

    fn ensure_closed(&self) -> Result<()> {
        if self.group.0.is_some() {
            return Err(Error::Generic("a geometry group is already open".into()));
        }
        Ok(())
    }

    /// Open `geometries[/path]` under the handle's root group.
    pub fn open_group(&mut self, handle: &Handle, path: Option<&str>) -> Result<()> {
        self.ensure_closed()?;
        let full = group_path(path);
        if !handle.file().object_exists(handle.group(), &full) {
            return Err(Error::NotFound(full));
        }
        self.group = OpenGroup(Some(handle.file().open_group(handle.group(), &full)?));
        debug!(group = %full, "opened geometry group");
        Ok(())
    }

    /// Create `geometries[/path]` under the handle's root group; groups that
    /// already exist are reused.
    pub fn create_group(&mut self, handle: &mut Handle, path: Option<&str>) -> Result<()> {
        self.ensure_closed()?;
        let full = group_path(path);
        let loc = handle.group();
        self.group = OpenGroup(Some(storage::create_group_path(handle.file_mut(), loc, &full)?));
        debug!(group = %full, "created geometry group");
        Ok(())
    }

    /// Forget the open group. Closing a geometry with no open group is a
    /// no-op.
    pub fn close_group(&mut self) {
        self.group = OpenGroup::default();
    }

    /// Read every metadata attribute present in the open group.
    ///
    /// Absent attributes stay `None`. Values outside their bounds fail the
    /// whole read and leave `self` unchanged.
    pub fn read_metadata(&mut self, handle: &Handle) -> Result<()> {
        let loc = self.open_group_id()?;
        let file = handle.file();

        let mut npd = AttributeData::new(&NUMBER_OF_PHYSICAL_DIMENSIONS, &[])?;
        read_optional(&mut npd, file, loc, Some(PHYSICAL_DIMENSIONS_RANGE))?;
        let mut species = AttributeData::new(&NUMBER_OF_SPECIES, &[])?;
        read_optional(&mut species, file, loc, Some(COUNT_RANGE))?;
        let mut sites = AttributeData::new(&NUMBER_OF_SITES, &[])?;
        read_optional(&mut sites, file, loc, Some(COUNT_RANGE))?;
        let mut embedded = AttributeData::new(&EMBEDDED_SYSTEM, &[])?;
        read_optional(&mut embedded, file, loc, None)?;
        let mut coordinates = AttributeData::new(&ABSOLUTE_OR_REDUCED_COORDINATES, &[])?;
        read_optional(&mut coordinates, file, loc, None)?;

        let dimension_types = if AttributeData::is_present(&DIMENSION_TYPES, file, loc) {
            let mut types = AttributeData::new(&DIMENSION_TYPES, &[&npd])?;
            types.read_in_range(file, loc, DIMENSION_TYPES_RANGE)?;
            Some(types.get_as()?)
        } else {
            None
        };

        self.number_of_physical_dimensions = optional(&npd)?;
        self.dimension_types = dimension_types;
        self.embedded_system = optional(&embedded)?;
        self.number_of_species = optional(&species)?;
        self.number_of_sites = optional(&sites)?;
        self.absolute_or_reduced_coordinates = optional(&coordinates)?;
        Ok(())
    }

    /// Write every metadata field that is set to the open group.
    pub fn write_metadata(&self, handle: &mut Handle) -> Result<()> {
        let loc = self.open_group_id()?;
        let file = handle.file_mut();

        let npd = scalar(&NUMBER_OF_PHYSICAL_DIMENSIONS, self.number_of_physical_dimensions)?;
        for attr in [
            &npd,
            &scalar(&EMBEDDED_SYSTEM, self.embedded_system.clone())?,
            &scalar(&NUMBER_OF_SPECIES, self.number_of_species)?,
            &scalar(&NUMBER_OF_SITES, self.number_of_sites)?,
            &scalar(
                &ABSOLUTE_OR_REDUCED_COORDINATES,
                self.absolute_or_reduced_coordinates,
            )?,
        ] {
            if attr.is_set() {
                attr.write(file, loc)?;
            }
        }

        if let Some(types) = &self.dimension_types {
            let mut attr = AttributeData::new(&DIMENSION_TYPES, &[&npd])?;
            attr.set(types.clone())?;
            attr.write(file, loc)?;
        }
        Ok(())
    }

    /// The dimension attribute for `spec`, set from this geometry's fields.
    fn dimension(&self, spec: &'static AttributeSpec) -> Result<AttributeData<'static>> {
        let value = if spec.id == NUMBER_OF_PHYSICAL_DIMENSIONS.id {
            self.number_of_physical_dimensions
        } else if spec.id == NUMBER_OF_SPECIES.id {
            self.number_of_species
        } else if spec.id == NUMBER_OF_SITES.id {
            self.number_of_sites
        } else {
            return Err(Error::Argument(format!(
                "{:?} is not a geometry dimension",
                spec.name
            )));
        };
        scalar(spec, value)
    }

    fn bound_dimensions(&self, spec: &'static DatasetSpec) -> Result<Vec<AttributeData<'static>>> {
        if CATALOG.dataset_by_id(spec.id).is_none() {
            return Err(Error::Argument(format!("{:?} is not a geometry dataset", spec.name)));
        }
        spec.dims.iter().map(|&d| self.dimension(d)).collect()
    }

    /// Read a dataset of the open group, in logical order.
    pub fn read_dataset(&self, handle: &Handle, spec: &'static DatasetSpec) -> Result<Value> {
        let loc = self.open_group_id()?;
        let dims = self.bound_dimensions(spec)?;
        let refs: Vec<&AttributeData<'_>> = dims.iter().collect();
        let mut data = DatasetData::new(spec, &refs)?;
        data.open(handle.file(), loc)?;
        let physical = data.read(handle.file())?;
        data.close();
        data.apply_reordering(&physical)
    }

    /// Write a dataset of the open group. With a reordering table `value`
    /// is taken to be in physical order.
    ///
    /// `value` is checked against the dataset's type and size before
    /// anything is created, and a dataset whose write fails is unlinked
    /// again.
    pub fn write_dataset(
        &self,
        handle: &mut Handle,
        spec: &'static DatasetSpec,
        value: impl Into<Value>,
        reordering_table: Option<Vec<u32>>,
    ) -> Result<()> {
        let loc = self.open_group_id()?;
        let dims = self.bound_dimensions(spec)?;
        let refs: Vec<&AttributeData<'_>> = dims.iter().collect();
        let mut data = DatasetData::new(spec, &refs)?;
        if let Some(table) = reordering_table {
            data.set_reordering_table(table)?;
        }
        let value = value.into();
        data.check_value(&value)?;
        data.create(handle.file_mut(), loc)?;
        if let Err(e) = data.write(handle.file_mut(), value) {
            let mut first = FirstError::new();
            first.record::<(), _>(Err(e));
            data.close();
            first.record(handle.file_mut().unlink(loc, spec.name));
            return first.finish(());
        }
        data.close();
        Ok(())
    }
}

/// A scalar attribute, set when `value` is.
fn scalar<T: Into<Value>>(spec: &'static AttributeSpec, value: Option<T>) -> Result<AttributeData<'static>> {
    let mut attr = AttributeData::new(spec, &[])?;
    if let Some(v) = value {
        attr.set(v)?;
    }
    Ok(attr)
}

fn read_optional(
    attr: &mut AttributeData<'_>,
    file: &File,
    loc: ObjectId,
    bounds: Option<Bounds>,
) -> Result<()> {
    if !AttributeData::is_present(attr.spec(), file, loc) {
        return Ok(());
    }
    match bounds {
        Some(b) => attr.read_in_range(file, loc, b),
        None => attr.read(file, loc),
    }
}

fn optional<T: crate::types::FromValue>(attr: &AttributeData<'_>) -> Result<Option<T>> {
    if attr.is_set() {
        attr.get_as().map(Some)
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn silicon() -> Geometry {
        Geometry {
            number_of_physical_dimensions: Some(3),
            dimension_types: Some(vec![1, 1, 1]),
            embedded_system: Some("no".into()),
            number_of_species: Some(1),
            number_of_sites: Some(2),
            absolute_or_reduced_coordinates: Some(2),
            ..Geometry::default()
        }
    }

    #[test]
    fn catalog_is_consistent() {
        CATALOG.validate().unwrap();
        assert_eq!(CATALOG.attribute("embedded_system").map(|s| s.string_length), Some(3));
        assert!(CATALOG.dataset("species_at_sites").unwrap().disordered_storage_allowed);
    }

    #[test]
    fn close_without_open_is_fine() {
        let mut geo = Geometry::new();
        geo.close_group();
        assert!(!geo.is_open());
    }

    #[test]
    fn open_missing_group() {
        let h = Handle::in_memory(None).unwrap();
        let mut geo = Geometry::new();
        assert_eq!(geo.open_group(&h, None).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn metadata_round_trip() {
        let mut h = Handle::in_memory(None).unwrap();
        let mut geo = silicon();
        geo.create_group(&mut h, Some("Silicon")).unwrap();
        geo.write_metadata(&mut h).unwrap();
        geo.close_group();

        let mut back = Geometry::new();
        back.open_group(&h, Some("Silicon")).unwrap();
        back.read_metadata(&h).unwrap();
        back.close_group();
        assert_eq!(back, silicon());
    }

    #[test]
    fn partial_metadata() {
        let mut h = Handle::in_memory(None).unwrap();
        let mut geo = Geometry {
            number_of_sites: Some(4),
            ..Geometry::default()
        };
        geo.create_group(&mut h, None).unwrap();
        geo.write_metadata(&mut h).unwrap();

        let mut back = Geometry::new();
        back.open_group(&h, None).unwrap();
        back.read_metadata(&h).unwrap();
        assert_eq!(back.number_of_sites, Some(4));
        assert_eq!(back.number_of_physical_dimensions, None);
        assert_eq!(back.dimension_types, None);
    }

    #[test]
    fn out_of_range_metadata_rejected() {
        let mut h = Handle::in_memory(None).unwrap();
        let mut geo = Geometry {
            number_of_physical_dimensions: Some(4),
            ..Geometry::default()
        };
        geo.create_group(&mut h, None).unwrap();
        geo.write_metadata(&mut h).unwrap();

        let mut back = Geometry::new();
        back.open_group(&h, None).unwrap();
        let err = back.read_metadata(&h).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
        assert_eq!(back.number_of_physical_dimensions, None);
    }

    #[test]
    fn dimension_types_need_their_extent() {
        let mut h = Handle::in_memory(None).unwrap();
        let mut geo = Geometry {
            dimension_types: Some(vec![0, 0, 0]),
            ..Geometry::default()
        };
        geo.create_group(&mut h, None).unwrap();
        let err = geo.write_metadata(&mut h).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSet);
    }

    #[test]
    fn datasets_round_trip() {
        let mut h = Handle::in_memory(None).unwrap();
        let mut geo = silicon();
        geo.create_group(&mut h, None).unwrap();
        geo.write_metadata(&mut h).unwrap();

        let lattice = vec![
            5.0964124, 5.0964124, 0.0, 5.0964124, 0.0, 5.0964124, 0.0, 5.0964124, 5.0964124,
        ];
        geo.write_dataset(&mut h, &LATTICE_VECTORS, lattice.clone(), None)
            .unwrap();
        geo.write_dataset(&mut h, &ATOMIC_NUMBERS, vec![14.0f64], None)
            .unwrap();
        // Stored as [site 1, site 0]; logical order is restored on read.
        geo.write_dataset(&mut h, &SPECIES_AT_SITES, vec![7u32, 3], Some(vec![1, 0]))
            .unwrap();

        assert_eq!(
            geo.read_dataset(&h, &LATTICE_VECTORS).unwrap(),
            Value::Double(lattice)
        );
        assert_eq!(
            geo.read_dataset(&h, &SPECIES_AT_SITES).unwrap(),
            Value::UInt(vec![3, 7])
        );
        let err = geo
            .write_dataset(&mut h, &ATOMIC_NUMBERS, vec![1.0f64], Some(vec![0]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Ordering);
    }

    #[test]
    fn failed_dataset_write_leaves_nothing_behind() {
        let mut h = Handle::in_memory(None).unwrap();
        let mut geo = silicon();
        geo.create_group(&mut h, None).unwrap();
        geo.write_metadata(&mut h).unwrap();
        let loc = geo.open_group_id().unwrap();

        let err = geo
            .write_dataset(&mut h, &SPECIES_AT_SITES, vec![1u32, 2, 3], None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Shape);
        let err = geo
            .write_dataset(&mut h, &SPECIES_AT_SITES, vec![1i32, 2], None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Argument);
        assert!(!h.file().object_exists(loc, SPECIES_AT_SITES.name));

        geo.write_dataset(&mut h, &SPECIES_AT_SITES, vec![1u32, 2], None)
            .unwrap();
        assert_eq!(
            geo.read_dataset(&h, &SPECIES_AT_SITES).unwrap(),
            Value::UInt(vec![1, 2])
        );
    }

    #[test]
    fn dataset_needs_dimensions() {
        let mut h = Handle::in_memory(None).unwrap();
        let mut geo = Geometry::new();
        geo.create_group(&mut h, None).unwrap();
        let err = geo
            .write_dataset(&mut h, &SITE_POSITIONS, vec![0.0f64; 6], None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSet);
    }
}

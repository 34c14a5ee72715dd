//! The container: an arena of groups and datasets reachable from a root group.
//!
//! Objects are addressed by [`ObjectId`] handles. Groups hold named links
//! (hard links to child objects, or soft links holding a path); both groups
//! and datasets carry named attributes. The arena is loaded from and
//! flushed to an HDF5 file image.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::dataspace::{Dataspace, DataspaceType};
use crate::datatype::{Datatype, Elements};
use crate::error::{Result, StoreError};
use crate::format;
use crate::props::FileAccessProps;
use crate::selection::Selection;

/// Soft links are followed at most this many times per lookup.
const MAX_SOFT_LINK_DEPTH: usize = 16;

/// Handle to a group or dataset inside a [`File`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

impl ObjectId {
    pub(crate) fn from_index(index: usize) -> Self {
        ObjectId(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a named link inside a group points at.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Link {
    Hard(ObjectId),
    Soft(String),
}

/// Attribute storage: disk datatype, shape and little-endian payload.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StoredAttribute {
    pub datatype: Datatype,
    pub dataspace: Dataspace,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ObjectKind {
    Group {
        links: BTreeMap<String, Link>,
    },
    Dataset {
        datatype: Datatype,
        dataspace: Dataspace,
        data: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Object {
    pub kind: ObjectKind,
    pub attrs: BTreeMap<String, StoredAttribute>,
}

impl Object {
    pub(crate) fn empty_group() -> Self {
        Self {
            kind: ObjectKind::Group {
                links: BTreeMap::new(),
            },
            attrs: BTreeMap::new(),
        }
    }
}

/// Type and shape of an attribute or dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub datatype: Datatype,
    pub dataspace: Dataspace,
}

/// An open container.
///
/// Mutations happen in memory; [`File::flush`] writes the whole container
/// to its path as one HDF5 file.
#[derive(Debug)]
pub struct File {
    objects: Vec<Object>,
    path: Option<PathBuf>,
    props: FileAccessProps,
}

impl File {
    /// A writable container with no backing path.
    pub fn in_memory() -> Self {
        Self {
            objects: vec![Object::empty_group()],
            path: None,
            props: FileAccessProps::default(),
        }
    }

    /// Create (or truncate) a container at `path`.
    pub fn create<P: AsRef<Path>>(path: P, props: FileAccessProps) -> Result<Self> {
        if props.read_only {
            return Err(StoreError::ReadOnly);
        }
        let mut file = Self {
            objects: vec![Object::empty_group()],
            path: Some(path.as_ref().to_path_buf()),
            props,
        };
        file.flush()?;
        debug!(path = %path.as_ref().display(), "created container");
        Ok(file)
    }

    /// Open an existing HDF5 file at `path`.
    pub fn open<P: AsRef<Path>>(path: P, props: FileAccessProps) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let mut file = Self::from_bytes(&bytes, props)?;
        file.path = Some(path.as_ref().to_path_buf());
        debug!(
            path = %path.as_ref().display(),
            objects = file.objects.len(),
            "opened container"
        );
        Ok(file)
    }

    /// Decode a container from an in-memory HDF5 file image.
    pub fn from_bytes(bytes: &[u8], props: FileAccessProps) -> Result<Self> {
        let objects = format::decode(bytes, &props)?;
        Ok(Self {
            objects,
            path: None,
            props,
        })
    }

    /// Encode the objects reachable from the root as an HDF5 file image.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        format::encode(&self.objects)
    }

    /// Persist the container to its path. In-memory and read-only
    /// containers have nothing to flush.
    pub fn flush(&mut self) -> Result<()> {
        if self.props.read_only {
            return Ok(());
        }
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = self.to_bytes()?;
        let mut tmp = path.clone().into_os_string();
        tmp.push(".partial");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), bytes = bytes.len(), "flushed container");
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn props(&self) -> &FileAccessProps {
        &self.props
    }

    /// The root group.
    pub fn root(&self) -> ObjectId {
        ObjectId(0)
    }

    pub fn is_group(&self, id: ObjectId) -> bool {
        matches!(
            self.objects.get(id.index()).map(|o| &o.kind),
            Some(ObjectKind::Group { .. })
        )
    }

    pub fn is_dataset(&self, id: ObjectId) -> bool {
        matches!(
            self.objects.get(id.index()).map(|o| &o.kind),
            Some(ObjectKind::Dataset { .. })
        )
    }

    // -----------------------------------------------------------------------
    // Links and groups
    // -----------------------------------------------------------------------

    /// Whether a link named by the last component of `path` exists.
    /// The link itself may dangle.
    pub fn link_exists(&self, loc: ObjectId, path: &str) -> bool {
        let Some((parent, last)) = self.split_parent(loc, path) else {
            return false;
        };
        match last {
            None => true,
            Some(name) => self
                .links(parent)
                .map(|links| links.contains_key(name))
                .unwrap_or(false),
        }
    }

    /// Whether `path` resolves to an object.
    pub fn object_exists(&self, loc: ObjectId, path: &str) -> bool {
        self.lookup(loc, path).is_ok()
    }

    /// Create a group named `name` inside the group `loc`.
    pub fn create_group(&mut self, loc: ObjectId, name: &str) -> Result<ObjectId> {
        let id = self.insert_child(loc, name, Object::empty_group())?;
        debug!(group = name, "created group");
        Ok(id)
    }

    /// Open the group at `path` relative to `loc`.
    pub fn open_group(&self, loc: ObjectId, path: &str) -> Result<ObjectId> {
        let id = self.lookup(loc, path)?;
        if !self.is_group(id) {
            return Err(StoreError::NotAGroup(path.to_string()));
        }
        Ok(id)
    }

    /// Add a soft link named `name` in `loc` pointing at `target`.
    ///
    /// The target is not checked; a soft link may dangle.
    pub fn create_soft_link(&mut self, loc: ObjectId, name: &str, target: &str) -> Result<()> {
        self.ensure_writable()?;
        validate_name(name)?;
        let links = self.links_mut(loc)?;
        if links.contains_key(name) {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        links.insert(name.to_string(), Link::Soft(target.to_string()));
        Ok(())
    }

    /// Remove the link `name` from `loc`. Objects that become unreachable
    /// are dropped on the next flush.
    pub fn unlink(&mut self, loc: ObjectId, name: &str) -> Result<()> {
        self.ensure_writable()?;
        self.links_mut(loc)?
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    /// Names of the child groups of `loc`, sorted.
    pub fn group_names(&self, loc: ObjectId) -> Result<Vec<String>> {
        self.child_names(loc, |f, id| f.is_group(id))
    }

    /// Names of the child datasets of `loc`, sorted.
    pub fn dataset_names(&self, loc: ObjectId) -> Result<Vec<String>> {
        self.child_names(loc, |f, id| f.is_dataset(id))
    }

    // -----------------------------------------------------------------------
    // Attributes
    // -----------------------------------------------------------------------

    pub fn attr_exists(&self, obj: ObjectId, name: &str) -> bool {
        self.object(obj)
            .map(|o| o.attrs.contains_key(name))
            .unwrap_or(false)
    }

    /// Create an attribute, replacing any existing one of the same name.
    /// The payload starts zero-filled. Attributes live in their object's
    /// header, so one attribute message is limited to 64 KiB.
    pub fn create_attr(
        &mut self,
        obj: ObjectId,
        name: &str,
        datatype: Datatype,
        dataspace: Dataspace,
    ) -> Result<()> {
        self.ensure_writable()?;
        validate_name(name)?;
        validate_datatype(datatype)?;
        let data = vec![0u8; dataspace.num_elements() as usize * datatype.size()];
        let attr = StoredAttribute {
            datatype,
            dataspace,
            data,
        };
        format::check_attribute(name, &attr)?;
        let replaced = self.object_mut(obj)?.attrs.insert(name.to_string(), attr);
        debug!(attribute = name, %datatype, replaced = replaced.is_some(), "created attribute");
        Ok(())
    }

    pub fn delete_attr(&mut self, obj: ObjectId, name: &str) -> Result<()> {
        self.ensure_writable()?;
        self.object_mut(obj)?
            .attrs
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    /// Names of the attributes attached to `obj`, sorted.
    pub fn attr_names(&self, obj: ObjectId) -> Result<Vec<String>> {
        Ok(self.object(obj)?.attrs.keys().cloned().collect())
    }

    pub fn attr_info(&self, obj: ObjectId, name: &str) -> Result<ObjectInfo> {
        let attr = self.attr(obj, name)?;
        Ok(ObjectInfo {
            datatype: attr.datatype,
            dataspace: attr.dataspace.clone(),
        })
    }

    /// Write the whole attribute from `values`, converting to its disk type.
    pub fn write_attr(&mut self, obj: ObjectId, name: &str, values: &Elements) -> Result<()> {
        self.ensure_writable()?;
        values.check()?;
        let attr = self
            .object_mut(obj)?
            .attrs
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        let expected = attr.dataspace.num_elements();
        if values.len() as u64 != expected {
            return Err(StoreError::LengthMismatch {
                expected,
                actual: values.len() as u64,
            });
        }
        attr.data = values.clone().convert(attr.datatype)?.encode();
        trace!(attribute = name, elements = expected, "wrote attribute");
        Ok(())
    }

    /// Read the whole attribute, converted to `mem`.
    pub fn read_attr(&self, obj: ObjectId, name: &str, mem: Datatype) -> Result<Elements> {
        let attr = self.attr(obj, name)?;
        let values = Elements::decode(attr.datatype, &attr.data)?.convert(mem)?;
        trace!(attribute = name, elements = values.len(), "read attribute");
        Ok(values)
    }

    // -----------------------------------------------------------------------
    // Datasets
    // -----------------------------------------------------------------------

    /// Create a zero-filled dataset named `name` inside the group `loc`.
    pub fn create_dataset(
        &mut self,
        loc: ObjectId,
        name: &str,
        datatype: Datatype,
        dataspace: Dataspace,
    ) -> Result<ObjectId> {
        validate_datatype(datatype)?;
        let data = vec![0u8; dataspace.num_elements() as usize * datatype.size()];
        let object = Object {
            kind: ObjectKind::Dataset {
                datatype,
                dataspace,
                data,
            },
            attrs: BTreeMap::new(),
        };
        let id = self.insert_child(loc, name, object)?;
        debug!(dataset = name, %datatype, "created dataset");
        Ok(id)
    }

    /// Open the dataset at `path` relative to `loc`.
    pub fn open_dataset(&self, loc: ObjectId, path: &str) -> Result<ObjectId> {
        let id = self.lookup(loc, path)?;
        if !self.is_dataset(id) {
            return Err(StoreError::NotADataset(path.to_string()));
        }
        Ok(id)
    }

    pub fn dataset_info(&self, ds: ObjectId) -> Result<ObjectInfo> {
        let (datatype, dataspace, _) = self.dataset(ds)?;
        Ok(ObjectInfo {
            datatype,
            dataspace: dataspace.clone(),
        })
    }

    /// Write `values` into the elements picked by `selection`.
    ///
    /// `values` is a flat buffer holding exactly the selected element count,
    /// in selection order.
    pub fn write_dataset(
        &mut self,
        ds: ObjectId,
        selection: &Selection,
        values: &Elements,
    ) -> Result<()> {
        self.ensure_writable()?;
        values.check()?;
        let (datatype, dataspace, _) = self.dataset(ds)?;
        let offsets = selected_offsets(dataspace, selection)?;
        if values.len() != offsets.len() {
            return Err(StoreError::LengthMismatch {
                expected: offsets.len() as u64,
                actual: values.len() as u64,
            });
        }
        let encoded = values.clone().convert(datatype)?.encode();
        let size = datatype.size();
        let ObjectKind::Dataset { data, .. } = &mut self.object_mut(ds)?.kind else {
            return Err(StoreError::InvalidHandle);
        };
        for (i, &off) in offsets.iter().enumerate() {
            data[off * size..(off + 1) * size].copy_from_slice(&encoded[i * size..(i + 1) * size]);
        }
        trace!(elements = offsets.len(), "wrote dataset selection");
        Ok(())
    }

    /// Read the elements picked by `selection`, converted to `mem`.
    pub fn read_dataset(&self, ds: ObjectId, selection: &Selection, mem: Datatype) -> Result<Elements> {
        let (datatype, dataspace, data) = self.dataset(ds)?;
        let offsets = selected_offsets(dataspace, selection)?;
        let size = datatype.size();
        let mut gathered = Vec::with_capacity(offsets.len() * size);
        for &off in &offsets {
            gathered.extend_from_slice(&data[off * size..(off + 1) * size]);
        }
        trace!(elements = offsets.len(), "read dataset selection");
        Elements::decode(datatype, &gathered)?.convert(mem)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn ensure_writable(&self) -> Result<()> {
        if self.props.read_only {
            Err(StoreError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn object(&self, id: ObjectId) -> Result<&Object> {
        self.objects.get(id.index()).ok_or(StoreError::InvalidHandle)
    }

    fn object_mut(&mut self, id: ObjectId) -> Result<&mut Object> {
        self.objects.get_mut(id.index()).ok_or(StoreError::InvalidHandle)
    }

    fn attr(&self, obj: ObjectId, name: &str) -> Result<&StoredAttribute> {
        self.object(obj)?
            .attrs
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn dataset(&self, id: ObjectId) -> Result<(Datatype, &Dataspace, &[u8])> {
        match &self.object(id)?.kind {
            ObjectKind::Dataset {
                datatype,
                dataspace,
                data,
            } => Ok((*datatype, dataspace, data)),
            ObjectKind::Group { .. } => Err(StoreError::NotADataset(format!("{id:?}"))),
        }
    }

    fn links(&self, id: ObjectId) -> Result<&BTreeMap<String, Link>> {
        match &self.object(id)?.kind {
            ObjectKind::Group { links } => Ok(links),
            ObjectKind::Dataset { .. } => Err(StoreError::NotAGroup(format!("{id:?}"))),
        }
    }

    fn links_mut(&mut self, id: ObjectId) -> Result<&mut BTreeMap<String, Link>> {
        match &mut self.object_mut(id)?.kind {
            ObjectKind::Group { links } => Ok(links),
            ObjectKind::Dataset { .. } => Err(StoreError::NotAGroup(format!("{id:?}"))),
        }
    }

    fn insert_child(&mut self, loc: ObjectId, name: &str, object: Object) -> Result<ObjectId> {
        self.ensure_writable()?;
        validate_name(name)?;
        if self.links(loc)?.contains_key(name) {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        let id = ObjectId::from_index(self.objects.len());
        self.objects.push(object);
        self.links_mut(loc)?.insert(name.to_string(), Link::Hard(id));
        Ok(id)
    }

    fn child_names(&self, loc: ObjectId, keep: impl Fn(&File, ObjectId) -> bool) -> Result<Vec<String>> {
        let links = self.links(loc)?;
        Ok(links
            .keys()
            .filter(|name| {
                self.resolve_link(loc, name, 0)
                    .map(|id| keep(self, id))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    /// Resolve every component of `path` but the last. Returns the parent
    /// group and the final component (`None` when the path names `loc`).
    fn split_parent<'p>(&self, loc: ObjectId, path: &'p str) -> Option<(ObjectId, Option<&'p str>)> {
        let start = if path.starts_with('/') { self.root() } else { loc };
        let parts: Vec<&str> = components(path).collect();
        let Some((last, head)) = parts.split_last() else {
            return Some((start, None));
        };
        let mut current = start;
        for part in head {
            current = self.resolve_link(current, part, 0).ok()?;
        }
        Some((current, Some(*last)))
    }

    fn lookup(&self, loc: ObjectId, path: &str) -> Result<ObjectId> {
        self.lookup_depth(loc, path, 0)
    }

    fn lookup_depth(&self, loc: ObjectId, path: &str, depth: usize) -> Result<ObjectId> {
        self.object(loc)?;
        let mut current = if path.starts_with('/') { self.root() } else { loc };
        for part in components(path) {
            current = self.resolve_link(current, part, depth)?;
        }
        Ok(current)
    }

    fn resolve_link(&self, group: ObjectId, name: &str, depth: usize) -> Result<ObjectId> {
        match self.links(group)?.get(name) {
            None => Err(StoreError::NotFound(name.to_string())),
            Some(Link::Hard(id)) => Ok(*id),
            Some(Link::Soft(target)) => {
                if depth >= MAX_SOFT_LINK_DEPTH {
                    return Err(StoreError::DanglingLink(name.to_string()));
                }
                self.lookup_depth(group, target, depth + 1)
                    .map_err(|_| StoreError::DanglingLink(name.to_string()))
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn objects(&self) -> &[Object] {
        &self.objects
    }
}

fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|p| !p.is_empty() && *p != ".")
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name.contains('/') {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn validate_datatype(datatype: Datatype) -> Result<()> {
    if datatype.size() == 0 {
        return Err(StoreError::ZeroWidthString);
    }
    Ok(())
}

fn selected_offsets(space: &Dataspace, selection: &Selection) -> Result<Vec<usize>> {
    if space.space_type == DataspaceType::Null {
        return match selection {
            Selection::All | Selection::None => Ok(Vec::new()),
            _ => Err(StoreError::SelectionOutOfBounds { dims: Vec::new() }),
        };
    }
    let dims = space.selection_dims();
    selection.validate(&dims)?;
    Ok(selection.offsets(&dims))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

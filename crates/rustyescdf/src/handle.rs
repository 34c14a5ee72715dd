//! File handles.
//!
//! A [`Handle`] owns an open container and the group that acts as the root
//! of the data it holds. That group is the container root unless
//! [`HandleOptions::group_path`] names another one.

use std::path::Path;

use rustyescdf_store::{File, FileAccessProps, ObjectId};
use tracing::debug;

use crate::error::{Error, Result};
use crate::storage;

/// Options for [`Handle::create`] and [`Handle::open`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandleOptions {
    /// Group inside the container to use as the root, `/`-separated.
    pub group_path: Option<String>,
    /// Access properties passed to the container.
    pub access: FileAccessProps,
}

impl HandleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the group at `path` as the root.
    pub fn group_path(mut self, path: impl Into<String>) -> Self {
        self.group_path = Some(path.into());
        self
    }

    pub fn access(mut self, access: FileAccessProps) -> Self {
        self.access = access;
        self
    }
}

/// An open container and its root group.
#[derive(Debug)]
pub struct Handle {
    file: File,
    group: ObjectId,
}

impl Handle {
    /// Create a container at `path`, along with the root group path.
    pub fn create<P: AsRef<Path>>(path: P, options: HandleOptions) -> Result<Self> {
        let file = File::create(path.as_ref(), options.access)?;
        let mut handle = Self::with_group_path(file, options.group_path.as_deref())?;
        handle.file.flush()?;
        debug!(path = %path.as_ref().display(), "created handle");
        Ok(handle)
    }

    /// Open an existing container. The root group path must exist.
    pub fn open<P: AsRef<Path>>(path: P, options: HandleOptions) -> Result<Self> {
        let file = File::open(path.as_ref(), options.access)?;
        let root = file.root();
        let group = match options.group_path.as_deref() {
            Some(group_path) => {
                if !file.object_exists(root, group_path) {
                    return Err(Error::NotFound(group_path.to_string()));
                }
                file.open_group(root, group_path)?
            }
            None => root,
        };
        debug!(path = %path.as_ref().display(), "opened handle");
        Ok(Self { file, group })
    }

    /// A handle on a container that is never written to disk.
    pub fn in_memory(group_path: Option<&str>) -> Result<Self> {
        Self::with_group_path(File::in_memory(), group_path)
    }

    fn with_group_path(mut file: File, group_path: Option<&str>) -> Result<Self> {
        let root = file.root();
        let group = match group_path {
            Some(p) => storage::create_group_path(&mut file, root, p)?,
            None => root,
        };
        Ok(Self { file, group })
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    /// The root group of this handle.
    pub fn group(&self) -> ObjectId {
        self.group
    }

    /// Persist pending changes.
    pub fn flush(&mut self) -> Result<()> {
        Ok(self.file.flush()?)
    }

    /// Flush and release the container.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        debug!("closed handle");
        Ok(())
    }
}

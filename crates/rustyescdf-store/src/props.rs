//! Property lists for opening and creating containers.

/// File access properties.
///
/// Controls how a container is opened: whether mutation is allowed and
/// whether metadata checksums are verified on load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAccessProps {
    /// Reject every mutating call with `StoreError::ReadOnly`.
    pub read_only: bool,
    /// Verify superblock and object header checksums when decoding.
    pub verify_checksum: bool,
}

impl Default for FileAccessProps {
    fn default() -> Self {
        Self {
            read_only: false,
            verify_checksum: true,
        }
    }
}

impl FileAccessProps {
    /// Create default file access properties (read-write, checksum verified).
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the container read-only.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Skip checksum verification on load.
    pub fn skip_checksum(mut self) -> Self {
        self.verify_checksum = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let p = FileAccessProps::new();
        assert!(!p.read_only);
        assert!(p.verify_checksum);
    }

    #[test]
    fn builder_chain() {
        let p = FileAccessProps::new().read_only().skip_checksum();
        assert!(p.read_only);
        assert!(!p.verify_checksum);
    }
}

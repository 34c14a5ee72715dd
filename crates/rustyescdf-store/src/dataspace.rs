//! Dataspaces: the shape of an attribute or dataset.

/// Type of dataspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataspaceType {
    /// Scalar (single element).
    Scalar,
    /// Simple (N-dimensional array).
    Simple,
    /// Null (no data).
    Null,
}

/// Shape of stored data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataspace {
    /// The type of this dataspace.
    pub space_type: DataspaceType,
    /// Current dimension sizes (empty for scalar and null).
    pub dimensions: Vec<u64>,
    /// Maximum dimension sizes, if different from the current ones.
    pub max_dimensions: Option<Vec<u64>>,
}

impl Dataspace {
    pub fn scalar() -> Self {
        Self {
            space_type: DataspaceType::Scalar,
            dimensions: Vec::new(),
            max_dimensions: None,
        }
    }

    /// A simple dataspace with fixed extents.
    pub fn simple(dims: &[u64]) -> Self {
        Self {
            space_type: DataspaceType::Simple,
            dimensions: dims.to_vec(),
            max_dimensions: None,
        }
    }

    pub fn null() -> Self {
        Self {
            space_type: DataspaceType::Null,
            dimensions: Vec::new(),
            max_dimensions: None,
        }
    }

    /// Number of dimensions (0 for scalar and null).
    pub fn rank(&self) -> usize {
        self.dimensions.len()
    }

    /// Maximum extents, falling back to the current extents.
    pub fn max_dims(&self) -> &[u64] {
        self.max_dimensions.as_deref().unwrap_or(&self.dimensions)
    }

    /// Total number of elements described by this dataspace.
    pub fn num_elements(&self) -> u64 {
        match self.space_type {
            DataspaceType::Scalar => 1,
            DataspaceType::Null => 0,
            DataspaceType::Simple => self.dimensions.iter().product(),
        }
    }

    /// Extents used for selection arithmetic. A scalar behaves as `[1]`.
    pub fn selection_dims(&self) -> Vec<u64> {
        match self.space_type {
            DataspaceType::Scalar => vec![1],
            DataspaceType::Null => Vec::new(),
            DataspaceType::Simple => self.dimensions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_counts() {
        assert_eq!(Dataspace::scalar().num_elements(), 1);
        assert_eq!(Dataspace::null().num_elements(), 0);
        assert_eq!(Dataspace::simple(&[2, 3]).num_elements(), 6);
        assert_eq!(Dataspace::simple(&[4, 0]).num_elements(), 0);
    }

    #[test]
    fn max_dims_default_to_current() {
        let ds = Dataspace::simple(&[5]);
        assert_eq!(ds.max_dims(), &[5]);
        let grown = Dataspace {
            max_dimensions: Some(vec![u64::MAX]),
            ..Dataspace::simple(&[5])
        };
        assert_eq!(grown.max_dims(), &[u64::MAX]);
    }
}

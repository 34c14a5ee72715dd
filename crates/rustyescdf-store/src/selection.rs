//! Element selections for partial dataset reads and writes.
//!
//! A [`Selection`] picks elements out of a dataset's dataspace, either as a
//! strided rectangular region (a hyperslab) or as a list of coordinates.
//!
//! # Example
//!
//! ```
//! use rustyescdf_store::Selection;
//!
//! // Select rows 2..4, columns 1..3 from a 5x5 dataset
//! let sel = Selection::slice(&[2..4, 1..3]);
//! assert_eq!(sel.num_elements(&[5, 5]), 4);
//! assert_eq!(sel.offsets(&[5, 5]), vec![11, 12, 16, 17]);
//! ```

use core::ops::Range;

use crate::error::{Result, StoreError};

/// Elements of a dataset picked for one read or write.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// The whole dataspace.
    All,

    None,

    /// `count[d]` blocks of `block[d]` consecutive elements along each axis,
    /// the first at `start[d]` and each `stride[d]` after the previous one.
    Hyperslab {
        start: Vec<u64>,
        stride: Vec<u64>,
        count: Vec<u64>,
        block: Vec<u64>,
    },

    /// Select individual points by coordinate, in list order.
    Points(Vec<Vec<u64>>),
}

impl Selection {
    /// A contiguous hyperslab covering one range per axis.
    pub fn slice(ranges: &[Range<u64>]) -> Self {
        let rank = ranges.len();
        let mut start = Vec::with_capacity(rank);
        let mut count = Vec::with_capacity(rank);
        for r in ranges {
            start.push(r.start);
            count.push(r.end.saturating_sub(r.start));
        }
        Selection::Hyperslab {
            start,
            stride: vec![1; rank],
            count,
            block: vec![1; rank],
        }
    }

    /// A strided hyperslab with unit blocks. A missing stride means 1.
    pub fn strided(start: &[u64], count: &[u64], stride: Option<&[u64]>) -> Self {
        let rank = start.len();
        Selection::Hyperslab {
            start: start.to_vec(),
            stride: stride.map_or_else(|| vec![1; rank], <[u64]>::to_vec),
            count: count.to_vec(),
            block: vec![1; rank],
        }
    }

    /// Selected element count within a dataspace of extents `dims`.
    pub fn num_elements(&self, dims: &[u64]) -> u64 {
        match self {
            Selection::All => dims.iter().product(),
            Selection::None => 0,
            Selection::Hyperslab { count, block, .. } => {
                count.iter().zip(block.iter()).map(|(&c, &b)| c * b).product()
            }
            Selection::Points(pts) => pts.len() as u64,
        }
    }

    /// Rank implied by the selection; `None` when it fits any rank.
    pub fn rank(&self) -> Option<usize> {
        match self {
            Selection::All | Selection::None => Option::None,
            Selection::Hyperslab { start, .. } => Some(start.len()),
            Selection::Points(pts) => pts.first().map(|p| p.len()),
        }
    }

    /// Extents of the selected region. Points form a flat list.
    pub fn output_shape(&self, dims: &[u64]) -> Vec<u64> {
        match self {
            Selection::All => dims.to_vec(),
            Selection::None => vec![],
            Selection::Hyperslab { count, block, .. } => {
                count.iter().zip(block.iter()).map(|(&c, &b)| c * b).collect()
            }
            Selection::Points(pts) => vec![pts.len() as u64],
        }
    }

    /// Check that the selection has the dataspace's rank and stays inside it.
    pub fn validate(&self, dims: &[u64]) -> Result<()> {
        let out_of_bounds = || StoreError::SelectionOutOfBounds { dims: dims.to_vec() };
        match self {
            Selection::All | Selection::None => Ok(()),
            Selection::Hyperslab {
                start,
                stride,
                count,
                block,
            } => {
                let rank = dims.len();
                if start.len() != rank
                    || stride.len() != rank
                    || count.len() != rank
                    || block.len() != rank
                {
                    return Err(out_of_bounds());
                }
                if self.num_elements(dims) == 0 {
                    return Ok(());
                }
                for d in 0..rank {
                    if count[d] > 1 && stride[d] == 0 {
                        return Err(out_of_bounds());
                    }
                    let last = (count[d] - 1)
                        .checked_mul(stride[d])
                        .and_then(|v| v.checked_add(start[d]))
                        .and_then(|v| v.checked_add(block[d] - 1))
                        .ok_or_else(out_of_bounds)?;
                    if last >= dims[d] {
                        return Err(out_of_bounds());
                    }
                }
                Ok(())
            }
            Selection::Points(pts) => {
                let inside = pts.iter().all(|pt| {
                    pt.len() == dims.len() && pt.iter().zip(dims).all(|(&p, &d)| p < d)
                });
                if inside {
                    Ok(())
                } else {
                    Err(out_of_bounds())
                }
            }
        }
    }

    /// Row-major linear offsets of the selected elements, in selection order.
    ///
    /// The selection must already be valid for `dims`.
    pub fn offsets(&self, dims: &[u64]) -> Vec<usize> {
        let strides = row_major_strides(dims);
        let linear = |coord: &[u64]| -> usize {
            coord.iter().zip(&strides).map(|(&c, &s)| c * s).sum::<u64>() as usize
        };
        match self {
            Selection::All => (0..dims.iter().product::<u64>() as usize).collect(),
            Selection::None => Vec::new(),
            Selection::Points(pts) => pts.iter().map(|p| linear(p)).collect(),
            Selection::Hyperslab {
                start,
                stride,
                count,
                block,
            } => {
                let extent: Vec<u64> = count.iter().zip(block).map(|(&c, &b)| c * b).collect();
                let total: u64 = extent.iter().product();
                let mut out = Vec::with_capacity(total as usize);
                let mut index = vec![0u64; extent.len()];
                let mut coord = vec![0u64; extent.len()];
                for _ in 0..total {
                    for d in 0..index.len() {
                        let i = index[d];
                        coord[d] = start[d] + (i / block[d]) * stride[d] + i % block[d];
                    }
                    out.push(linear(&coord));
                    // Advance the multi-index, fastest dimension last.
                    for d in (0..index.len()).rev() {
                        index[d] += 1;
                        if index[d] < extent[d] {
                            break;
                        }
                        index[d] = 0;
                    }
                }
                out
            }
        }
    }
}

fn row_major_strides(dims: &[u64]) -> Vec<u64> {
    let mut strides = vec![1u64; dims.len()];
    for d in (0..dims.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * dims[d + 1];
    }
    strides
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_and_none() {
        assert_eq!(Selection::All.num_elements(&[4, 6]), 24);
        assert_eq!(Selection::All.offsets(&[2, 2]), vec![0, 1, 2, 3]);
        assert_eq!(Selection::None.num_elements(&[4, 6]), 0);
        assert!(Selection::None.offsets(&[4, 6]).is_empty());
        assert_eq!(Selection::All.rank(), None);
    }

    #[test]
    fn contiguous_slice() {
        let sel = Selection::slice(&[1..3, 0..4]);
        assert_eq!(sel.num_elements(&[3, 4]), 8);
        assert_eq!(sel.output_shape(&[3, 4]), vec![2, 4]);
        assert_eq!(sel.offsets(&[3, 4]), (4..12).collect::<Vec<_>>());
    }

    #[test]
    fn points_keep_list_order() {
        let sel = Selection::Points(vec![vec![2, 1], vec![0, 3], vec![0, 0]]);
        assert_eq!(sel.rank(), Some(2));
        assert_eq!(sel.output_shape(&[3, 4]), vec![3]);
        assert_eq!(sel.offsets(&[3, 4]), vec![9, 3, 0]);
    }

    #[test]
    fn strided_row() {
        let sel = Selection::strided(&[1], &[3], Some(&[2]));
        assert_eq!(sel.num_elements(&[7]), 3);
        sel.validate(&[7]).unwrap();
        assert_eq!(sel.offsets(&[7]), vec![1, 3, 5]);
    }

    #[test]
    fn blocks_within_stride() {
        let sel = Selection::Hyperslab {
            start: vec![0],
            stride: vec![4],
            count: vec![2],
            block: vec![2],
        };
        assert_eq!(sel.offsets(&[8]), vec![0, 1, 4, 5]);
    }

    #[test]
    fn out_of_bounds() {
        let sel = Selection::strided(&[1], &[4], Some(&[2]));
        assert!(sel.validate(&[7]).is_err());
        assert!(Selection::slice(&[0..2]).validate(&[3, 3]).is_err());
        assert!(Selection::Points(vec![vec![3]]).validate(&[3]).is_err());
    }

    #[test]
    fn empty_hyperslab_is_valid() {
        let sel = Selection::strided(&[9], &[0], None);
        sel.validate(&[3]).unwrap();
        assert!(sel.offsets(&[3]).is_empty());
    }
}

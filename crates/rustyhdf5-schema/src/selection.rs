//! Hyperslab and point selections for dataset slice I/O.
//!
//! A [`Selection`] is the "index" of a dataset read or write. It resolves,
//! against a concrete shape, to the row-major offsets of the selected
//! elements.
//!
//! # Example
//!
//! ```
//! use rustyhdf5_schema::Selection;
//!
//! // Rows 1..3, columns 0..2 of a 4x5 dataset
//! let sel = Selection::slice(&[1..3, 0..2]);
//! assert_eq!(sel.num_elements(&[4, 5]), 4);
//! assert_eq!(sel.element_offsets(&[4, 5]).unwrap(), vec![5, 6, 10, 11]);
//! ```

use core::ops::Range;

use thiserror::Error;

/// Errors resolving a selection against a dataset shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("selection rank {selection} does not match dataset rank {dataset}")]
    RankMismatch { selection: usize, dataset: usize },

    #[error("selection index {index} out of bounds for dimension {dim} of extent {extent}")]
    OutOfBounds { dim: usize, index: u64, extent: u64 },

    #[error("hyperslab stride {stride} is smaller than block {block} in dimension {dim}")]
    OverlappingBlocks { dim: usize, stride: u64, block: u64 },

    #[error("shape {dims:?} holds more elements than can be addressed")]
    Overflow { dims: Vec<u64> },
}

/// Number of elements in a dataset of shape `dims`; `None` on overflow.
pub fn element_count(dims: &[u64]) -> Option<u64> {
    dims.iter().try_fold(1u64, |n, &d| n.checked_mul(d))
}

/// A selection describing which elements of a dataset to access.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Every element.
    All,

    /// No elements.
    None,

    /// A regular hyperslab selection defined by start, stride, count, and block.
    ///
    /// For each dimension:
    /// - `start[d]`: first element index
    /// - `stride[d]`: step between blocks (must be >= block[d])
    /// - `count[d]`: number of blocks
    /// - `block[d]`: number of consecutive elements per block
    Hyperslab {
        start: Vec<u64>,
        stride: Vec<u64>,
        count: Vec<u64>,
        block: Vec<u64>,
    },

    /// Individual points by coordinate.
    Points(Vec<Vec<u64>>),
}

impl Selection {
    /// A contiguous hyperslab from ranges (one per dimension).
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

    /// A single element.
    pub fn point(index: &[u64]) -> Self {
        Selection::Points(vec![index.to_vec()])
    }

    /// Number of selected elements for a given dataspace shape.
    /// Saturates at `u64::MAX`.
    pub fn num_elements(&self, dims: &[u64]) -> u64 {
        match self {
            Selection::All => element_count(dims).unwrap_or(u64::MAX),
            Selection::None => 0,
            Selection::Hyperslab { count, block, .. } => count
                .iter()
                .zip(block.iter())
                .fold(1u64, |n, (&c, &b)| n.saturating_mul(c.saturating_mul(b))),
            Selection::Points(pts) => pts.len() as u64,
        }
    }

    /// Row-major offsets of the selected elements within a dataset of
    /// shape `dims`, in selection order.
    pub fn element_offsets(&self, dims: &[u64]) -> Result<Vec<u64>, SelectionError> {
        let total = element_count(dims).ok_or_else(|| SelectionError::Overflow { dims: dims.to_vec() })?;
        match self {
            Selection::All => Ok((0..total).collect()),
            Selection::None => Ok(Vec::new()),
            Selection::Points(pts) => pts.iter().map(|p| linear_offset(p, dims)).collect(),
            Selection::Hyperslab {
                start,
                stride,
                count,
                block,
            } => {
                for len in [start.len(), stride.len(), count.len(), block.len()] {
                    check_rank(len, dims.len())?;
                }
                let mut per_dim: Vec<Vec<u64>> = Vec::with_capacity(dims.len());
                for d in 0..dims.len() {
                    if count[d] > 1 && stride[d] < block[d] {
                        return Err(SelectionError::OverlappingBlocks {
                            dim: d,
                            stride: stride[d],
                            block: block[d],
                        });
                    }
                    let mut idx = Vec::new();
                    for bi in 0..count[d] {
                        for e in 0..block[d] {
                            let i = bi
                                .checked_mul(stride[d])
                                .and_then(|i| i.checked_add(start[d]))
                                .and_then(|i| i.checked_add(e))
                                .filter(|&i| i < dims[d])
                                .ok_or_else(|| SelectionError::OutOfBounds {
                                    dim: d,
                                    index: start[d]
                                        .saturating_add(bi.saturating_mul(stride[d]))
                                        .saturating_add(e),
                                    extent: dims[d],
                                })?;
                            idx.push(i);
                        }
                    }
                    per_dim.push(idx);
                }
                let mut offsets = Vec::with_capacity(per_dim.iter().map(Vec::len).product());
                let mut coord = vec![0u64; dims.len()];
                cartesian(&per_dim, 0, &mut coord, dims, &mut offsets);
                Ok(offsets)
            }
        }
    }
}

fn check_rank(selection: usize, dataset: usize) -> Result<(), SelectionError> {
    if selection != dataset {
        return Err(SelectionError::RankMismatch { selection, dataset });
    }
    Ok(())
}

fn linear_offset(point: &[u64], dims: &[u64]) -> Result<u64, SelectionError> {
    check_rank(point.len(), dims.len())?;
    let mut offset = 0u64;
    for (d, (&i, &extent)) in point.iter().zip(dims.iter()).enumerate() {
        if i >= extent {
            return Err(SelectionError::OutOfBounds { dim: d, index: i, extent });
        }
        offset = offset * extent + i;
    }
    Ok(offset)
}

fn cartesian(per_dim: &[Vec<u64>], d: usize, coord: &mut [u64], dims: &[u64], out: &mut Vec<u64>) {
    if d == per_dim.len() {
        let offset = coord.iter().zip(dims.iter()).fold(0u64, |acc, (&i, &n)| acc * n + i);
        out.push(offset);
        return;
    }
    for &i in &per_dim[d] {
        coord[d] = i;
        cartesian(per_dim, d + 1, coord, dims, out);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_all_num_elements() {
        let sel = Selection::All;
        assert_eq!(sel.num_elements(&[100, 200]), 20000);
    }

    #[test]
    fn selection_none_num_elements() {
        let sel = Selection::None;
        assert_eq!(sel.num_elements(&[100, 200]), 0);
        assert!(sel.element_offsets(&[2, 2]).unwrap().is_empty());
    }

    #[test]
    fn selection_slice_basic() {
        let sel = Selection::slice(&[20..30, 40..60]);
        assert_eq!(sel.num_elements(&[100, 100]), 200);
    }

    #[test]
    fn selection_points() {
        let sel = Selection::Points(vec![vec![1, 2], vec![3, 4], vec![5, 6]]);
        assert_eq!(sel.num_elements(&[10, 10]), 3);
        assert_eq!(sel.element_offsets(&[10, 10]).unwrap(), vec![12, 34, 56]);
    }

    #[test]
    fn all_offsets_are_row_major() {
        assert_eq!(Selection::All.element_offsets(&[2, 3]).unwrap(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn slice_offsets() {
        let sel = Selection::slice(&[1..2, 1..3]);
        assert_eq!(sel.element_offsets(&[2, 3]).unwrap(), vec![4, 5]);
    }

    #[test]
    fn selection_hyperslab_strided() {
        // Every other element of a 10-element dimension
        let sel = Selection::Hyperslab {
            start: vec![0],
            stride: vec![2],
            count: vec![5],
            block: vec![1],
        };
        assert_eq!(sel.num_elements(&[10]), 5);
        assert_eq!(sel.element_offsets(&[10]).unwrap(), vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn point_out_of_bounds() {
        let err = Selection::point(&[2, 0]).element_offsets(&[2, 2]).unwrap_err();
        assert_eq!(err, SelectionError::OutOfBounds { dim: 0, index: 2, extent: 2 });
    }

    #[test]
    fn rank_mismatch() {
        let err = Selection::point(&[0]).element_offsets(&[2, 2]).unwrap_err();
        assert_eq!(err, SelectionError::RankMismatch { selection: 1, dataset: 2 });
    }

    #[test]
    fn hyperslab_past_end() {
        let err = Selection::slice(&[0..3]).element_offsets(&[2]).unwrap_err();
        assert!(matches!(err, SelectionError::OutOfBounds { index: 2, .. }));
    }

    #[test]
    fn huge_stride_is_out_of_bounds() {
        let sel = Selection::Hyperslab {
            start: vec![u64::MAX - 1],
            stride: vec![u64::MAX],
            count: vec![2],
            block: vec![1],
        };
        let err = sel.element_offsets(&[u64::MAX]).unwrap_err();
        assert!(matches!(err, SelectionError::OutOfBounds { dim: 0, index: u64::MAX, .. }));
    }

    #[test]
    fn overflowing_shape() {
        assert_eq!(element_count(&[u64::MAX, 2]), None);
        assert_eq!(element_count(&[]), Some(1));
        let err = Selection::point(&[0, 0]).element_offsets(&[u64::MAX, 2]).unwrap_err();
        assert_eq!(err, SelectionError::Overflow { dims: vec![u64::MAX, 2] });
        assert_eq!(Selection::All.num_elements(&[u64::MAX, 2]), u64::MAX);
    }
}

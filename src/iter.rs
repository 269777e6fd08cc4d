//! Flat traversal over one or several strided arrays.
//!
//! Iterators walk a fixed row-major order over their traversal shape,
//! maintaining one data pointer per array by incrementally adding the
//! per-dimension stride with carry, fastest-varying (trailing) dimension
//! first. The traversal order is deterministic and identical for identically
//! constructed iterators, but makes no promise of matching physical memory
//! order: non-contiguous and negative-stride views walk their buffers in
//! whatever direction their strides dictate.
//!
//! The canonical driving loop is:
//!
//! ```rust
//! # use ndstride::{ArrayIter, StridedArray};
//! # let a = StridedArray::from_vec(vec![1i32, 2, 3, 4], &[2, 2]).unwrap();
//! let mut it = ArrayIter::new(&a);
//! for _ in 0..it.size() {
//!     let _ptr = it.data_ptr();
//!     it.next();
//! }
//! ```
//!
//! Iterators borrow their arrays and are neither `Send` nor `Sync`; they
//! must not be shared across concurrent callers.

use std::marker::PhantomData;

use crate::broadcast::{broadcast_shapes, broadcast_strides};
use crate::view::StridedArray;
use crate::{ArrayError, Result};

/// Traversal over a single strided array, optionally excluding one axis.
pub struct ArrayIter<'a> {
    shape: Vec<usize>,
    strides: Vec<isize>,
    coords: Vec<usize>,
    base: *mut u8,
    cur: *mut u8,
    index: usize,
    size: usize,
    axis: Option<(usize, isize)>,
    _borrow: PhantomData<&'a StridedArray>,
}

impl<'a> ArrayIter<'a> {
    /// Iterate every element of `array` in row-major index order.
    pub fn new(array: &'a StridedArray) -> ArrayIter<'a> {
        let shape = array.shape().to_vec();
        let strides = array.strides().to_vec();
        Self::from_parts(array, shape, strides, None)
    }

    /// Iterate all axes except `axis`; the caller handles the excluded axis
    /// itself via [`axis_len`](Self::axis_len) and
    /// [`axis_stride`](Self::axis_stride) from each visited position.
    pub fn all_but_axis(array: &'a StridedArray, axis: usize) -> Result<ArrayIter<'a>> {
        if axis >= array.ndim() {
            return Err(ArrayError::InvalidAxis {
                axis: axis as isize,
                rank: array.ndim(),
            });
        }
        let mut shape = array.shape().to_vec();
        let strides = array.strides().to_vec();
        let axis_info = (shape[axis], strides[axis]);
        shape[axis] = 1;
        Ok(Self::from_parts(array, shape, strides, Some(axis_info)))
    }

    fn from_parts(
        array: &'a StridedArray,
        shape: Vec<usize>,
        strides: Vec<isize>,
        axis: Option<(usize, isize)>,
    ) -> ArrayIter<'a> {
        let size = shape.iter().product();
        let base = array.first_ptr();
        ArrayIter {
            coords: vec![0; shape.len()],
            shape,
            strides,
            base,
            cur: base,
            index: 0,
            size,
            axis,
            _borrow: PhantomData,
        }
    }

    /// Total number of traversal steps.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Current step, 0-based.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Pointer to the element at the current position.
    #[inline]
    pub fn data_ptr(&self) -> *mut u8 {
        self.cur
    }

    /// Length of the excluded axis (1 if none was excluded).
    #[inline]
    pub fn axis_len(&self) -> usize {
        self.axis.map_or(1, |(len, _)| len)
    }

    /// Byte stride of the excluded axis (0 if none was excluded).
    #[inline]
    pub fn axis_stride(&self) -> isize {
        self.axis.map_or(0, |(_, stride)| stride)
    }

    /// Return to step 0 without reconstruction.
    pub fn reset(&mut self) {
        self.coords.fill(0);
        self.cur = self.base;
        self.index = 0;
    }

    /// Advance one step. Returns `false` once the final position has been
    /// consumed; the cursor then stays put.
    pub fn next(&mut self) -> bool {
        if self.index + 1 >= self.size {
            self.index = self.size;
            return false;
        }
        self.index += 1;
        for d in (0..self.shape.len()).rev() {
            self.coords[d] += 1;
            self.cur = self.cur.wrapping_offset(self.strides[d]);
            if self.coords[d] < self.shape[d] {
                break;
            }
            // Carry: rewind this dimension and bump the next slower one.
            self.coords[d] = 0;
            self.cur = self
                .cur
                .wrapping_offset(-(self.shape[d] as isize) * self.strides[d]);
        }
        true
    }
}

#[derive(Debug)]
struct Operand {
    base: *mut u8,
    strides: Vec<isize>,
    cur: *mut u8,
}

/// Lock-step traversal over several arrays under one broadcast shape.
///
/// Each operand's per-dimension stride is forced to 0 where its size is 1,
/// so size-1 axes repeat their single element across the broadcast.
#[derive(Debug)]
pub struct MultiIter<'a> {
    shape: Vec<usize>,
    coords: Vec<usize>,
    operands: Vec<Operand>,
    index: usize,
    size: usize,
    _borrow: PhantomData<&'a StridedArray>,
}

impl<'a> MultiIter<'a> {
    /// Broadcast `arrays` against each other and iterate the result shape.
    pub fn new(arrays: &[&'a StridedArray]) -> Result<MultiIter<'a>> {
        Self::with_shape_excluding(arrays, None, None)
    }

    /// Like [`new`](Self::new), but iterate all axes of the broadcast shape
    /// except `axis`.
    pub fn all_but_axis(arrays: &[&'a StridedArray], axis: usize) -> Result<MultiIter<'a>> {
        Self::with_shape_excluding(arrays, None, Some(axis))
    }

    /// Broadcast against an explicitly requested target shape.
    pub fn with_target_shape(
        arrays: &[&'a StridedArray],
        target: &[usize],
    ) -> Result<MultiIter<'a>> {
        Self::with_shape_excluding(arrays, Some(target), None)
    }

    fn with_shape_excluding(
        arrays: &[&'a StridedArray],
        target: Option<&[usize]>,
        excluded: Option<usize>,
    ) -> Result<MultiIter<'a>> {
        if arrays.is_empty() {
            return Err(ArrayError::EmptySequence("iterate"));
        }
        let shapes: Vec<&[usize]> = arrays.iter().map(|a| a.shape()).collect();
        let mut shape = match target {
            Some(t) => {
                // Every operand must still broadcast to the requested shape.
                let implied = broadcast_shapes(&shapes)?;
                broadcast_shapes(&[&implied, t])?;
                t.to_vec()
            }
            None => broadcast_shapes(&shapes)?,
        };

        let operands = arrays
            .iter()
            .map(|array| {
                let strides = broadcast_strides(&shape, array.shape(), array.strides())?;
                let base = array.first_ptr();
                Ok(Operand {
                    base,
                    strides,
                    cur: base,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(axis) = excluded {
            if axis >= shape.len() {
                return Err(ArrayError::InvalidAxis {
                    axis: axis as isize,
                    rank: shape.len(),
                });
            }
            shape[axis] = 1;
        }

        let size = shape.iter().product();
        Ok(MultiIter {
            coords: vec![0; shape.len()],
            shape,
            operands,
            index: 0,
            size,
            _borrow: PhantomData,
        })
    }

    /// The broadcast traversal shape (excluded axis collapsed to 1).
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Total number of traversal steps.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Current step, 0-based.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of participating arrays.
    #[inline]
    pub fn num_operands(&self) -> usize {
        self.operands.len()
    }

    /// Pointer to operand `i`'s element at the current position.
    #[inline]
    pub fn data_ptr(&self, i: usize) -> *mut u8 {
        self.operands[i].cur
    }

    /// The broadcast-adjusted stride of operand `i` along `dim`.
    #[inline]
    pub fn operand_stride(&self, i: usize, dim: usize) -> isize {
        self.operands[i].strides[dim]
    }

    /// Return to step 0 without reconstruction.
    pub fn reset(&mut self) {
        self.coords.fill(0);
        self.index = 0;
        for op in &mut self.operands {
            op.cur = op.base;
        }
    }

    /// Advance one step. Returns `false` once the final position has been
    /// consumed.
    pub fn next(&mut self) -> bool {
        if self.index + 1 >= self.size {
            self.index = self.size;
            return false;
        }
        self.index += 1;
        for d in (0..self.shape.len()).rev() {
            self.coords[d] += 1;
            for op in &mut self.operands {
                op.cur = op.cur.wrapping_offset(op.strides[d]);
            }
            if self.coords[d] < self.shape[d] {
                break;
            }
            self.coords[d] = 0;
            for op in &mut self.operands {
                op.cur = op
                    .cur
                    .wrapping_offset(-(self.shape[d] as isize) * op.strides[d]);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_iter_visits_row_major() {
        let a = StridedArray::from_vec(vec![0i32, 1, 2, 3, 4, 5], &[2, 3]).unwrap();
        let mut it = ArrayIter::new(&a);
        let mut seen = Vec::new();
        for _ in 0..it.size() {
            seen.push(unsafe { (it.data_ptr() as *const i32).read_unaligned() });
            it.next();
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_iter_transposed_view_order() {
        let a = StridedArray::from_vec(vec![0i32, 1, 2, 3, 4, 5], &[2, 3]).unwrap();
        let t = a.transpose(None).unwrap();
        let mut it = ArrayIter::new(&t);
        let mut seen = Vec::new();
        for _ in 0..it.size() {
            seen.push(unsafe { (it.data_ptr() as *const i32).read_unaligned() });
            it.next();
        }
        assert_eq!(seen, vec![0, 3, 1, 4, 2, 5]);
    }

    #[test]
    fn test_reset_restarts() {
        let a = StridedArray::from_vec(vec![7i32, 8, 9], &[3]).unwrap();
        let mut it = ArrayIter::new(&a);
        it.next();
        it.next();
        assert_eq!(it.index(), 2);
        it.reset();
        assert_eq!(it.index(), 0);
        assert_eq!(unsafe { (it.data_ptr() as *const i32).read_unaligned() }, 7);
    }

    #[test]
    fn test_multi_iter_broadcast_size() {
        let a = StridedArray::zeros(&[3, 1, 5], crate::DType::float64()).unwrap();
        let b = StridedArray::zeros(&[1, 4, 5], crate::DType::float64()).unwrap();
        let it = MultiIter::new(&[&a, &b]).unwrap();
        assert_eq!(it.size(), 60);
        assert_eq!(it.shape(), &[3, 4, 5]);

        let c = StridedArray::zeros(&[2, 4, 5], crate::DType::float64()).unwrap();
        let err = MultiIter::new(&[&a, &b, &c]).unwrap_err();
        assert!(matches!(err, ArrayError::NotBroadcastable(..)));
    }

    #[test]
    fn test_multi_iter_broadcast_values() {
        let a = StridedArray::from_vec(vec![1i32, 2, 3, 4, 5, 6], &[2, 3]).unwrap();
        let row = StridedArray::from_vec(vec![10i32, 20, 30], &[3]).unwrap();
        let mut it = MultiIter::new(&[&a, &row]).unwrap();
        let mut sums = Vec::new();
        for _ in 0..it.size() {
            let x = unsafe { (it.data_ptr(0) as *const i32).read_unaligned() };
            let y = unsafe { (it.data_ptr(1) as *const i32).read_unaligned() };
            sums.push(x + y);
            it.next();
        }
        assert_eq!(sums, vec![11, 22, 33, 14, 25, 36]);
    }

    #[test]
    fn test_all_but_axis_complement() {
        let a =
            StridedArray::from_vec((0..24i64).collect::<Vec<_>>(), &[2, 3, 4]).unwrap();
        let it = ArrayIter::all_but_axis(&a, 1).unwrap();
        assert_eq!(it.size(), 8);
        assert_eq!(it.axis_len(), 3);
        assert_eq!(it.axis_stride(), 4 * 8);
    }

    #[test]
    fn test_identical_iterators_yield_identical_addresses() {
        let a = StridedArray::from_vec(vec![1i32, 2, 3, 4, 5, 6], &[3, 2]).unwrap();
        let v = a.flip(0).unwrap();
        let mut it1 = ArrayIter::new(&v);
        let mut it2 = ArrayIter::new(&v);
        for _ in 0..it1.size() {
            assert_eq!(it1.data_ptr(), it2.data_ptr());
            it1.next();
            it2.next();
        }
    }
}

//! Strided arrays over shared byte buffers.
//!
//! A [`StridedArray`] is a handle: shape, signed byte strides, a starting
//! offset and a type descriptor over a reference-counted buffer. Views
//! (transpose, reshape, slice, flip, broadcast) clone the handle with new
//! shape/strides and share the buffer, so a view can never outlive the
//! allocation backing it. The element at multi-index `(i_0..i_{n-1})` lives
//! at `buffer + offset + Σ i_k * strides[k]`; construction validates that
//! every reachable address stays inside the buffer, negative strides
//! included.
//!
//! Mutation goes through raw element pointers handed out by the iterators.
//! The engine is single-threaded per call: two handles over one buffer must
//! not be written concurrently, which is the caller's contract, not this
//! type's.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::broadcast::broadcast_strides;
use crate::dtype::{Element, Kind, Value};
use crate::iter::{ArrayIter, MultiIter};
use crate::promote::{can_cast_type_to, promote_types, Casting};
use crate::{ArrayError, DType, Result};

/// Memory layout of a fresh allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Row-major: strides increase with leading axes.
    C,
    /// Column-major: strides increase with trailing axes.
    F,
}

// ============================================================================
// Buffers
// ============================================================================

pub(crate) struct Buffer {
    ptr: NonNull<u8>,
    len: usize,
    /// `Some` for owned allocations (deallocated on drop), `None` for
    /// zero-sized and foreign buffers.
    layout: Option<Layout>,
}

// The buffer itself is plain bytes; all aliasing discipline lives above.
unsafe impl Send for Buffer {}
unsafe impl Sync for Buffer {}

impl Buffer {
    fn allocate(nbytes: usize, align: usize) -> Result<Arc<Buffer>> {
        let align = align.max(1);
        if nbytes == 0 {
            // Dangling but well-aligned; never dereferenced.
            let ptr = NonNull::new(align as *mut u8).ok_or(ArrayError::AllocFailed(0))?;
            return Ok(Arc::new(Buffer {
                ptr,
                len: 0,
                layout: None,
            }));
        }
        let layout =
            Layout::from_size_align(nbytes, align).map_err(|_| ArrayError::AllocFailed(nbytes))?;
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(ArrayError::AllocFailed(nbytes))?;
        Ok(Arc::new(Buffer {
            ptr,
            len: nbytes,
            layout: Some(layout),
        }))
    }

    /// # Safety
    /// `ptr` must stay valid for reads (and writes, if the array is marked
    /// writeable) of `len` bytes for the lifetime of every handle.
    unsafe fn foreign(ptr: *mut u8, len: usize) -> Result<Arc<Buffer>> {
        let ptr = NonNull::new(ptr).ok_or(ArrayError::AllocFailed(len))?;
        Ok(Arc::new(Buffer {
            ptr,
            len,
            layout: None,
        }))
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(layout) = self.layout {
            unsafe { dealloc(self.ptr.as_ptr(), layout) };
        }
    }
}

/// Layout properties of one array handle.
#[derive(Debug, Clone, Copy)]
pub struct Flags {
    pub c_contiguous: bool,
    pub f_contiguous: bool,
    pub aligned: bool,
    pub writeable: bool,
    pub owns_data: bool,
}

// ============================================================================
// StridedArray
// ============================================================================

/// A typed, strided N-dimensional array over a shared byte buffer.
#[derive(Clone)]
pub struct StridedArray {
    buffer: Arc<Buffer>,
    /// Byte offset of the element at index (0, .., 0).
    offset: usize,
    shape: Vec<usize>,
    strides: Vec<isize>,
    dtype: DType,
    flags: Flags,
}

impl fmt::Debug for StridedArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StridedArray")
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .field("dtype", &self.dtype)
            .finish()
    }
}

/// Left-to-right product of dimension sizes with overflow detection:
/// returns 0 as soon as any dimension is 0, `None` if the running product
/// would exceed the maximum addressable size.
pub(crate) fn overflow_multiply_list(dims: &[usize]) -> Option<usize> {
    let mut prod = 1usize;
    for &d in dims {
        if d == 0 {
            return Some(0);
        }
        prod = prod.checked_mul(d)?;
        if prod > isize::MAX as usize {
            return None;
        }
    }
    Some(prod)
}

fn strides_for(shape: &[usize], elsize: usize, order: Order) -> Vec<isize> {
    let mut strides = vec![0isize; shape.len()];
    let mut running = elsize as isize;
    match order {
        Order::C => {
            for i in (0..shape.len()).rev() {
                strides[i] = running;
                running = running.saturating_mul(shape[i].max(1) as isize);
            }
        }
        Order::F => {
            for i in 0..shape.len() {
                strides[i] = running;
                running = running.saturating_mul(shape[i].max(1) as isize);
            }
        }
    }
    strides
}

fn ensure_storable(dtype: &DType) -> Result<()> {
    if dtype.kind() == Kind::Object {
        return Err(ArrayError::UnsupportedDType("object"));
    }
    if dtype.size() == 0 {
        return Err(ArrayError::UnsupportedDType(dtype.name()));
    }
    Ok(())
}

fn validate_bounds(
    len: usize,
    offset: usize,
    shape: &[usize],
    strides: &[isize],
    elsize: usize,
) -> Result<()> {
    if shape.len() != strides.len() {
        return Err(ArrayError::RankMismatch(shape.len(), strides.len()));
    }
    if shape.contains(&0) {
        // No element is addressable; only the base offset must be sane.
        return if offset <= len {
            Ok(())
        } else {
            Err(ArrayError::ViewOutOfBounds)
        };
    }
    let mut lo = offset as isize;
    let mut hi = offset as isize;
    for (&n, &s) in shape.iter().zip(strides.iter()) {
        let span = s
            .checked_mul(n as isize - 1)
            .ok_or_else(|| ArrayError::DimensionOverflow(shape.to_vec()))?;
        if span >= 0 {
            hi = hi
                .checked_add(span)
                .ok_or_else(|| ArrayError::DimensionOverflow(shape.to_vec()))?;
        } else {
            lo = lo
                .checked_add(span)
                .ok_or_else(|| ArrayError::DimensionOverflow(shape.to_vec()))?;
        }
    }
    if lo < 0 || hi as usize + elsize > len {
        return Err(ArrayError::ViewOutOfBounds);
    }
    Ok(())
}

impl StridedArray {
    fn from_buffer_parts(
        buffer: Arc<Buffer>,
        offset: usize,
        shape: Vec<usize>,
        strides: Vec<isize>,
        dtype: DType,
        writeable: bool,
        owns_data: bool,
    ) -> Result<StridedArray> {
        validate_bounds(buffer.len, offset, &shape, &strides, dtype.size())?;
        let mut array = StridedArray {
            buffer,
            offset,
            shape,
            strides,
            dtype,
            flags: Flags {
                c_contiguous: false,
                f_contiguous: false,
                aligned: false,
                writeable,
                owns_data,
            },
        };
        array.update_layout_flags();
        Ok(array)
    }

    fn update_layout_flags(&mut self) {
        let elsize = self.dtype.size() as isize;

        let mut c_contig = true;
        let mut expected = elsize;
        for (&n, &s) in self.shape.iter().zip(self.strides.iter()).rev() {
            if n <= 1 {
                continue;
            }
            if s != expected {
                c_contig = false;
                break;
            }
            expected = expected.saturating_mul(n as isize);
        }

        let mut f_contig = true;
        expected = elsize;
        for (&n, &s) in self.shape.iter().zip(self.strides.iter()) {
            if n <= 1 {
                continue;
            }
            if s != expected {
                f_contig = false;
                break;
            }
            expected = expected.saturating_mul(n as isize);
        }

        let align = self.dtype.alignment().max(1);
        let base = self.buffer.ptr.as_ptr() as usize + self.offset;
        let aligned =
            base % align == 0 && self.strides.iter().all(|&s| s % align as isize == 0);

        self.flags.c_contiguous = c_contig;
        self.flags.f_contiguous = f_contig;
        self.flags.aligned = aligned;
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Allocate a zero-initialized array with the given memory order.
    pub fn empty_order(shape: &[usize], dtype: DType, order: Order) -> Result<StridedArray> {
        ensure_storable(&dtype)?;
        let count = overflow_multiply_list(shape)
            .ok_or_else(|| ArrayError::DimensionOverflow(shape.to_vec()))?;
        let nbytes = count
            .checked_mul(dtype.size())
            .ok_or_else(|| ArrayError::DimensionOverflow(shape.to_vec()))?;
        let buffer = Buffer::allocate(nbytes, dtype.alignment())?;
        let strides = strides_for(shape, dtype.size(), order);
        StridedArray::from_buffer_parts(buffer, 0, shape.to_vec(), strides, dtype, true, true)
    }

    /// Allocate a zero-initialized C-ordered array.
    pub fn empty(shape: &[usize], dtype: DType) -> Result<StridedArray> {
        StridedArray::empty_order(shape, dtype, Order::C)
    }

    /// Allocate a C-ordered array of zeros.
    pub fn zeros(shape: &[usize], dtype: DType) -> Result<StridedArray> {
        StridedArray::empty(shape, dtype)
    }

    /// Allocate a C-ordered array with every element set to `value`.
    pub fn full(shape: &[usize], value: &Value) -> Result<StridedArray> {
        let dtype = value
            .dtype()
            .ok_or(ArrayError::ScalarConversion("structured"))?;
        let array = StridedArray::empty(shape, dtype)?;
        array.fill(value)?;
        Ok(array)
    }

    /// Build a C-ordered array from a typed vector.
    pub fn from_vec<T: Element>(data: Vec<T>, shape: &[usize]) -> Result<StridedArray> {
        let dtype = DType::from_type_id(T::TYPE_ID);
        let count = overflow_multiply_list(shape)
            .ok_or_else(|| ArrayError::DimensionOverflow(shape.to_vec()))?;
        if count != data.len() {
            return Err(ArrayError::ShapeMismatch(vec![data.len()], shape.to_vec()));
        }
        let array = StridedArray::empty(shape, dtype)?;
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr() as *const u8,
                array.buffer.ptr.as_ptr(),
                count * std::mem::size_of::<T>(),
            );
        }
        Ok(array)
    }

    /// A zero-dimensional array holding one typed element.
    pub fn from_scalar<T: Element>(value: T) -> Result<StridedArray> {
        StridedArray::from_vec(vec![value], &[])
    }

    /// A zero-dimensional array holding one boxed scalar.
    pub fn from_value(value: &Value) -> Result<StridedArray> {
        let array = StridedArray::full(&[], value)?;
        Ok(array)
    }

    /// Adopt a byte vector as a C-ordered array (copied into an allocation
    /// aligned for `dtype`).
    pub fn from_bytes(data: &[u8], shape: &[usize], dtype: DType) -> Result<StridedArray> {
        ensure_storable(&dtype)?;
        let count = overflow_multiply_list(shape)
            .ok_or_else(|| ArrayError::DimensionOverflow(shape.to_vec()))?;
        let nbytes = count
            .checked_mul(dtype.size())
            .ok_or_else(|| ArrayError::DimensionOverflow(shape.to_vec()))?;
        if nbytes != data.len() {
            return Err(ArrayError::ShapeMismatch(vec![data.len()], shape.to_vec()));
        }
        let array = StridedArray::empty(shape, dtype)?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), array.buffer.ptr.as_ptr(), nbytes);
        }
        Ok(array)
    }

    /// Wrap an existing buffer without copying.
    ///
    /// # Safety
    /// `ptr` must stay valid for reads of `len` bytes (and writes when
    /// `writeable`) for as long as any handle over it exists, and must not
    /// be freed by the caller before then. The engine never frees it.
    pub unsafe fn from_raw_parts(
        ptr: *mut u8,
        len: usize,
        shape: &[usize],
        strides: &[isize],
        dtype: DType,
        writeable: bool,
    ) -> Result<StridedArray> {
        ensure_storable(&dtype)?;
        let buffer = Buffer::foreign(ptr, len)?;
        StridedArray::from_buffer_parts(
            buffer,
            0,
            shape.to_vec(),
            strides.to_vec(),
            dtype,
            writeable,
            false,
        )
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements.
    #[inline]
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    #[inline]
    pub fn dtype(&self) -> &DType {
        &self.dtype
    }

    #[inline]
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Byte offset of the first element inside the buffer.
    #[inline]
    pub fn byte_offset(&self) -> usize {
        self.offset
    }

    /// Pointer to the element at index (0, .., 0).
    #[inline]
    pub(crate) fn first_ptr(&self) -> *mut u8 {
        self.buffer.ptr.as_ptr().wrapping_add(self.offset)
    }

    pub(crate) fn ensure_writeable(&self) -> Result<()> {
        if self.flags.writeable {
            Ok(())
        } else {
            Err(ArrayError::NotWriteable)
        }
    }

    /// Whether two handles share one buffer.
    pub fn shares_buffer_with(&self, other: &StridedArray) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }

    // ------------------------------------------------------------------
    // Element access
    // ------------------------------------------------------------------

    fn element_ptr(&self, index: &[usize]) -> Result<*mut u8> {
        if index.len() != self.ndim() {
            return Err(ArrayError::RankMismatch(index.len(), self.ndim()));
        }
        let mut at = self.offset as isize;
        for (axis, (&i, (&n, &s))) in index
            .iter()
            .zip(self.shape.iter().zip(self.strides.iter()))
            .enumerate()
        {
            if i >= n {
                return Err(ArrayError::IndexOutOfBounds {
                    axis,
                    index: i,
                    size: n,
                });
            }
            at += i as isize * s;
        }
        Ok(self.buffer.ptr.as_ptr().wrapping_offset(at))
    }

    /// Lift one element out as a boxed scalar.
    pub fn get(&self, index: &[usize]) -> Result<Value> {
        let ptr = self.element_ptr(index)?;
        let elsize = self.dtype.size();
        if self.dtype.is_native_order() {
            let raw = unsafe { std::slice::from_raw_parts(ptr, elsize) };
            self.dtype.ops().get_item(raw)
        } else {
            let mut scratch = vec![0u8; elsize];
            unsafe {
                self.dtype
                    .ops()
                    .copyswap_n(scratch.as_mut_ptr(), 0, ptr, 0, 1, true);
            }
            self.dtype.ops().get_item(&scratch)
        }
    }

    /// Store one boxed scalar, converting numeric kinds as needed.
    pub fn set(&self, index: &[usize], value: &Value) -> Result<()> {
        self.ensure_writeable()?;
        let ptr = self.element_ptr(index)?;
        let elsize = self.dtype.size();
        let mut scratch = vec![0u8; elsize];
        self.dtype.ops().set_item(value, &mut scratch)?;
        unsafe {
            self.dtype.ops().copyswap_n(
                ptr,
                0,
                scratch.as_ptr(),
                0,
                1,
                !self.dtype.is_native_order(),
            );
        }
        Ok(())
    }

    /// The single element of a one-element array.
    pub fn item(&self) -> Result<Value> {
        if self.size() != 1 {
            return Err(ArrayError::ShapeMismatch(self.shape.clone(), vec![]));
        }
        let index = vec![0usize; self.ndim()];
        self.get(&index)
    }

    /// Set every element to `value`.
    pub fn fill(&self, value: &Value) -> Result<()> {
        self.ensure_writeable()?;
        let elsize = self.dtype.size();
        let mut scratch = vec![0u8; elsize];
        self.dtype.ops().set_item(value, &mut scratch)?;
        let swap = !self.dtype.is_native_order();
        if self.ndim() == 0 {
            unsafe {
                self.dtype
                    .ops()
                    .copyswap_n(self.first_ptr(), 0, scratch.as_ptr(), 0, 1, swap);
            }
            return Ok(());
        }
        let last = self.ndim() - 1;
        let mut it = ArrayIter::all_but_axis(self, last)?;
        let n = self.shape[last];
        let stride = self.strides[last];
        for _ in 0..it.size() {
            unsafe {
                self.dtype
                    .ops()
                    .copyswap_n(it.data_ptr(), stride, scratch.as_ptr(), 0, n, swap);
            }
            it.next();
        }
        Ok(())
    }

    /// Read the whole array out as a typed vector in row-major order.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if self.dtype.type_id() != Some(T::TYPE_ID) || !self.dtype.is_native_order() {
            return Err(ArrayError::ScalarConversion(self.dtype.name()));
        }
        let elsize = self.dtype.size();
        let mut out = Vec::with_capacity(self.size());
        let mut it = ArrayIter::new(self);
        for _ in 0..it.size() {
            let raw = unsafe { std::slice::from_raw_parts(it.data_ptr(), elsize) };
            out.push(T::read_from(raw));
            it.next();
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    fn view_with(
        &self,
        shape: Vec<usize>,
        strides: Vec<isize>,
        offset: usize,
    ) -> Result<StridedArray> {
        StridedArray::from_buffer_parts(
            Arc::clone(&self.buffer),
            offset,
            shape,
            strides,
            self.dtype.clone(),
            self.flags.writeable,
            false,
        )
    }

    /// Permute axes without copying. `None` reverses the axis order.
    pub fn transpose(&self, axes: Option<&[usize]>) -> Result<StridedArray> {
        let nd = self.ndim();
        let perm: Vec<usize> = match axes {
            None => (0..nd).rev().collect(),
            Some(p) => {
                if p.len() != nd {
                    return Err(ArrayError::RankMismatch(p.len(), nd));
                }
                let mut seen = vec![false; nd];
                for &axis in p {
                    if axis >= nd || seen[axis] {
                        return Err(ArrayError::InvalidAxis {
                            axis: axis as isize,
                            rank: nd,
                        });
                    }
                    seen[axis] = true;
                }
                p.to_vec()
            }
        };
        // The permuted layout goes into fresh vectors; nothing shared is
        // touched along the way.
        let shape = perm.iter().map(|&a| self.shape[a]).collect();
        let strides = perm.iter().map(|&a| self.strides[a]).collect();
        self.view_with(shape, strides, self.offset)
    }

    /// Swap two axes without copying.
    pub fn swap_axes(&self, a: usize, b: usize) -> Result<StridedArray> {
        let nd = self.ndim();
        let mut perm: Vec<usize> = (0..nd).collect();
        if a >= nd || b >= nd {
            return Err(ArrayError::InvalidAxis {
                axis: a.max(b) as isize,
                rank: nd,
            });
        }
        perm.swap(a, b);
        self.transpose(Some(&perm))
    }

    /// Reverse one axis without copying (negative-stride view).
    pub fn flip(&self, axis: usize) -> Result<StridedArray> {
        if axis >= self.ndim() {
            return Err(ArrayError::InvalidAxis {
                axis: axis as isize,
                rank: self.ndim(),
            });
        }
        let n = self.shape[axis];
        if n == 0 {
            return Ok(self.clone());
        }
        let mut strides = self.strides.clone();
        let offset = (self.offset as isize + (n as isize - 1) * strides[axis]) as usize;
        strides[axis] = -strides[axis];
        self.view_with(self.shape.clone(), strides, offset)
    }

    /// Select `start..stop` along one axis with a nonzero step. A negative
    /// step visits the same index set in reverse order.
    pub fn slice(&self, axis: usize, start: usize, stop: usize, step: isize) -> Result<StridedArray> {
        if axis >= self.ndim() {
            return Err(ArrayError::InvalidAxis {
                axis: axis as isize,
                rank: self.ndim(),
            });
        }
        let len = self.shape[axis];
        if step == 0 || start > stop || stop > len {
            return Err(ArrayError::InvalidSlice {
                start,
                stop,
                step,
                len,
            });
        }
        let span = stop - start;
        let count = if span == 0 {
            0
        } else {
            (span - 1) / step.unsigned_abs() + 1
        };
        let mut shape = self.shape.clone();
        let mut strides = self.strides.clone();
        let mut offset = self.offset as isize;
        if count > 0 {
            let first = if step > 0 {
                start
            } else {
                start + (count - 1) * step.unsigned_abs()
            };
            offset += first as isize * self.strides[axis];
        }
        shape[axis] = count;
        strides[axis] = self.strides[axis] * step;
        self.view_with(shape, strides, offset as usize)
    }

    /// Reshape to `shape` (one `-1` entry is inferred). Zero-copy when the
    /// array is already contiguous in the requested order, otherwise a copy
    /// in that order is made first.
    pub fn reshape(&self, shape: &[isize], order: Order) -> Result<StridedArray> {
        let count = self.size();
        let mut resolved = Vec::with_capacity(shape.len());
        let mut wildcard = None;
        for (i, &d) in shape.iter().enumerate() {
            match d {
                -1 => {
                    if wildcard.is_some() {
                        return Err(ArrayError::ReshapeMismatch(count, shape.to_vec()));
                    }
                    wildcard = Some(i);
                    resolved.push(1usize);
                }
                d if d < 0 => return Err(ArrayError::ReshapeMismatch(count, shape.to_vec())),
                d => resolved.push(d as usize),
            }
        }
        let known = overflow_multiply_list(&resolved)
            .ok_or_else(|| ArrayError::DimensionOverflow(resolved.clone()))?;
        if let Some(i) = wildcard {
            if known == 0 || count % known != 0 {
                return Err(ArrayError::ReshapeMismatch(count, shape.to_vec()));
            }
            resolved[i] = count / known;
        } else if known != count {
            return Err(ArrayError::ReshapeMismatch(count, shape.to_vec()));
        }

        let contiguous = match order {
            Order::C => self.flags.c_contiguous,
            Order::F => self.flags.f_contiguous,
        };
        if contiguous {
            let strides = strides_for(&resolved, self.dtype.size(), order);
            return self.view_with(resolved, strides, self.offset);
        }
        if crate::trace_enabled() {
            eprintln!(
                "ndstride: reshape {:?} -> {:?} copies (source not contiguous)",
                self.shape, resolved
            );
        }
        let copied = self.copy(order)?;
        let strides = strides_for(&resolved, copied.dtype.size(), order);
        StridedArray::from_buffer_parts(
            Arc::clone(&copied.buffer),
            0,
            resolved,
            strides,
            copied.dtype.clone(),
            true,
            false,
        )
    }

    /// Flatten to one dimension (zero-copy for C-contiguous arrays).
    pub fn ravel(&self) -> Result<StridedArray> {
        self.reshape(&[-1], Order::C)
    }

    /// Read-only view expanded to a broadcast target shape; size-1 axes get
    /// stride 0.
    pub fn broadcast_to(&self, target: &[usize]) -> Result<StridedArray> {
        let strides = broadcast_strides(target, &self.shape, &self.strides)?;
        StridedArray::from_buffer_parts(
            Arc::clone(&self.buffer),
            self.offset,
            target.to_vec(),
            strides,
            self.dtype.clone(),
            false,
            false,
        )
    }

    /// View of the `offset`-th diagonal over a pair of axes: both axes are
    /// removed and the diagonal length is appended as the last dimension.
    pub fn diagonal(&self, offset: isize, axis1: usize, axis2: usize) -> Result<StridedArray> {
        let nd = self.ndim();
        if axis1 >= nd || axis2 >= nd || axis1 == axis2 {
            return Err(ArrayError::InvalidAxis {
                axis: axis2 as isize,
                rank: nd,
            });
        }
        let n1 = self.shape[axis1];
        let n2 = self.shape[axis2];
        let diag_len = if offset >= 0 {
            n1.min(n2.saturating_sub(offset as usize))
        } else {
            n2.min(n1.saturating_sub(offset.unsigned_abs()))
        };
        let mut at = self.offset as isize;
        if offset >= 0 {
            at += offset * self.strides[axis2];
        } else {
            at += -offset * self.strides[axis1];
        }
        let mut shape = Vec::with_capacity(nd - 1);
        let mut strides = Vec::with_capacity(nd - 1);
        for d in 0..nd {
            if d != axis1 && d != axis2 {
                shape.push(self.shape[d]);
                strides.push(self.strides[d]);
            }
        }
        shape.push(diag_len);
        strides.push(self.strides[axis1] + self.strides[axis2]);
        self.view_with(shape, strides, at as usize)
    }

    /// Reinterpret the buffer under a new descriptor without copying.
    ///
    /// Same element size: shape and strides carry over. Different size: the
    /// last axis must be packed (stride equal to the element size) and its
    /// byte length divisible by the new element size; the last dimension is
    /// recomputed.
    pub fn view_as(&self, dtype: DType) -> Result<StridedArray> {
        ensure_storable(&dtype)?;
        let old = self.dtype.size();
        let new = dtype.size();
        if new == old {
            return StridedArray::from_buffer_parts(
                Arc::clone(&self.buffer),
                self.offset,
                self.shape.clone(),
                self.strides.clone(),
                dtype,
                self.flags.writeable,
                false,
            );
        }
        if self.ndim() == 0 {
            return Err(ArrayError::IncompatibleView(dtype.name()));
        }
        let last = self.ndim() - 1;
        if self.strides[last] != old as isize {
            return Err(ArrayError::IncompatibleView(dtype.name()));
        }
        let last_bytes = self.shape[last] * old;
        if last_bytes % new != 0 {
            return Err(ArrayError::IncompatibleView(dtype.name()));
        }
        let mut shape = self.shape.clone();
        let mut strides = self.strides.clone();
        shape[last] = last_bytes / new;
        strides[last] = new as isize;
        StridedArray::from_buffer_parts(
            Arc::clone(&self.buffer),
            self.offset,
            shape,
            strides,
            dtype,
            self.flags.writeable,
            false,
        )
    }

    // ------------------------------------------------------------------
    // Copies and casts
    // ------------------------------------------------------------------

    /// Element-for-element copy into a fresh contiguous allocation, byte
    /// order preserved.
    pub fn copy(&self, order: Order) -> Result<StridedArray> {
        let out = StridedArray::empty_order(&self.shape, self.dtype.clone(), order)?;
        copy_transformed(&out, self, false)?;
        Ok(out)
    }

    /// Copy into native byte order (no-op view clone when already native).
    pub(crate) fn to_native(&self) -> Result<StridedArray> {
        if self.dtype.is_native_order() {
            return Ok(self.clone());
        }
        let out = StridedArray::empty(&self.shape, self.dtype.to_native())?;
        copy_transformed(&out, self, true)?;
        Ok(out)
    }

    /// Elementwise conversion into a new array, gated by a casting rule.
    pub fn cast_to(&self, dtype: &DType, casting: Casting) -> Result<StridedArray> {
        if !can_cast_type_to(&self.dtype, dtype, casting) {
            return Err(ArrayError::CastNotAllowed {
                from: self.dtype.name(),
                to: dtype.name(),
                rule: casting,
            });
        }
        // Unresolved string capacities size themselves to the source.
        let dtype = if dtype.is_flexible() && dtype.size() == 0 {
            promote_types(&self.dtype, dtype)?
        } else {
            dtype.clone()
        };
        ensure_storable(&dtype)?;

        let src = self.to_native()?;
        let out = StridedArray::empty(&src.shape, dtype.to_native())?;
        unsafe {
            if src.ndim() == 0 {
                crate::kernel::cast_strided(
                    &src.dtype,
                    &out.dtype,
                    src.first_ptr(),
                    0,
                    out.first_ptr(),
                    0,
                    1,
                )?;
            } else {
                let last = src.ndim() - 1;
                let n = src.shape[last];
                let sstride = src.strides[last];
                let dstride = out.strides[last];
                let mut it = ArrayIter::all_but_axis(&src, last)?;
                let mut dp = out.first_ptr();
                let row_bytes = (n * out.dtype.size()) as isize;
                for _ in 0..it.size() {
                    crate::kernel::cast_strided(
                        &src.dtype,
                        &out.dtype,
                        it.data_ptr(),
                        sstride,
                        dp,
                        dstride,
                        n,
                    )?;
                    dp = dp.wrapping_offset(row_bytes);
                    it.next();
                }
            }
        }

        if dtype.is_native_order() {
            return Ok(out);
        }
        // Swap the native result into the requested byte order.
        let swapped = StridedArray::empty(&self.shape, dtype)?;
        copy_transformed(&swapped, &out, true)?;
        Ok(swapped)
    }

    /// Convert to another dtype with no casting restrictions.
    pub fn astype(&self, dtype: &DType) -> Result<StridedArray> {
        self.cast_to(dtype, Casting::Unsafe)
    }
}

/// Copy `src` into `dst` (same shape, same element layout family), optionally
/// reversing byte order per element. `dst` may have any layout.
pub(crate) fn copy_transformed(
    dst: &StridedArray,
    src: &StridedArray,
    swap: bool,
) -> Result<()> {
    dst.ensure_writeable()?;
    if dst.shape() != src.shape() {
        return Err(ArrayError::ShapeMismatch(
            dst.shape().to_vec(),
            src.shape().to_vec(),
        ));
    }
    if dst.size() == 0 {
        return Ok(());
    }
    let ops = src.dtype().ops_arc();
    if dst.ndim() == 0 {
        unsafe {
            ops.copyswap_n(dst.first_ptr(), 0, src.first_ptr(), 0, 1, swap);
        }
        return Ok(());
    }
    let last = dst.ndim() - 1;
    let n = dst.shape()[last];
    let mut it = MultiIter::all_but_axis(&[dst, src], last)?;
    let dstride = it.operand_stride(0, last);
    let sstride = it.operand_stride(1, last);
    for _ in 0..it.size() {
        unsafe {
            ops.copyswap_n(it.data_ptr(0), dstride, it.data_ptr(1), sstride, n, swap);
        }
        it.next();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_orders() {
        let c = StridedArray::empty_order(&[2, 3], DType::float64(), Order::C).unwrap();
        assert_eq!(c.strides(), &[24, 8]);
        assert!(c.flags().c_contiguous);
        assert!(!c.flags().f_contiguous);

        let f = StridedArray::empty_order(&[2, 3], DType::float64(), Order::F).unwrap();
        assert_eq!(f.strides(), &[8, 16]);
        assert!(f.flags().f_contiguous);
    }

    #[test]
    fn test_overflow_multiply_list() {
        assert_eq!(overflow_multiply_list(&[2, 3, 4]), Some(24));
        assert_eq!(overflow_multiply_list(&[5, 0, usize::MAX]), Some(0));
        assert_eq!(overflow_multiply_list(&[usize::MAX, 2]), None);
        assert!(matches!(
            StridedArray::empty(&[usize::MAX, 2], DType::uint8()),
            Err(ArrayError::DimensionOverflow(_))
        ));
    }

    #[test]
    fn test_object_arrays_rejected() {
        assert!(matches!(
            StridedArray::empty(&[2], DType::object_()),
            Err(ArrayError::UnsupportedDType("object"))
        ));
    }

    #[test]
    fn test_get_set_roundtrip() {
        let a = StridedArray::zeros(&[2, 2], DType::int32()).unwrap();
        a.set(&[1, 0], &Value::I32(-7)).unwrap();
        assert_eq!(a.get(&[1, 0]).unwrap(), Value::I32(-7));
        assert!(matches!(
            a.get(&[2, 0]),
            Err(ArrayError::IndexOutOfBounds { axis: 0, .. })
        ));
    }

    #[test]
    fn test_transpose_shares_buffer() {
        let a = StridedArray::from_vec(vec![1i32, 2, 3, 4, 5, 6], &[2, 3]).unwrap();
        let t = a.transpose(None).unwrap();
        assert_eq!(t.shape(), &[3, 2]);
        assert!(t.shares_buffer_with(&a));
        assert_eq!(t.get(&[2, 1]).unwrap(), Value::I32(6));
    }

    #[test]
    fn test_reshape_zero_copy_and_copy() {
        let a = StridedArray::from_vec((0..12i64).collect(), &[3, 4]).unwrap();
        let r = a.reshape(&[2, -1], Order::C).unwrap();
        assert_eq!(r.shape(), &[2, 6]);
        assert!(r.shares_buffer_with(&a));

        // A transposed view is not C-contiguous, so this reshape copies.
        let t = a.transpose(None).unwrap();
        let rt = t.reshape(&[12], Order::C).unwrap();
        assert!(!rt.shares_buffer_with(&a));
        assert_eq!(rt.get(&[1]).unwrap(), Value::I64(4));

        assert!(matches!(
            a.reshape(&[5, -1], Order::C),
            Err(ArrayError::ReshapeMismatch(..))
        ));
    }

    #[test]
    fn test_slice_and_flip() {
        let a = StridedArray::from_vec((0..10i32).collect(), &[10]).unwrap();
        let s = a.slice(0, 2, 8, 2).unwrap();
        assert_eq!(s.to_vec::<i32>().unwrap(), vec![2, 4, 6]);

        let r = a.slice(0, 2, 8, -2).unwrap();
        assert_eq!(r.to_vec::<i32>().unwrap(), vec![6, 4, 2]);

        let f = a.flip(0).unwrap();
        assert_eq!(f.get(&[0]).unwrap(), Value::I32(9));
        assert!(f.strides()[0] < 0);
    }

    #[test]
    fn test_broadcast_to_is_read_only() {
        let a = StridedArray::from_vec(vec![1i32, 2, 3], &[3]).unwrap();
        let b = a.broadcast_to(&[4, 3]).unwrap();
        assert_eq!(b.shape(), &[4, 3]);
        assert_eq!(b.strides(), &[0, 4]);
        assert!(matches!(
            b.set(&[0, 0], &Value::I32(9)),
            Err(ArrayError::NotWriteable)
        ));
    }

    #[test]
    fn test_view_as_recomputes_last_axis() {
        let a = StridedArray::from_vec(vec![1u32, 2, 3, 4], &[2, 2]).unwrap();
        let b = a.view_as(DType::uint8()).unwrap();
        assert_eq!(b.shape(), &[2, 8]);
        let c = b.view_as(DType::uint32()).unwrap();
        assert_eq!(c.shape(), &[2, 2]);

        let t = a.transpose(None).unwrap();
        assert!(matches!(
            t.view_as(DType::uint8()),
            Err(ArrayError::IncompatibleView(_))
        ));
    }

    #[test]
    fn test_cast_roundtrip_bit_exact() {
        let original = vec![-3i32, 0, 5, 117];
        let a = StridedArray::from_vec(original.clone(), &[4]).unwrap();
        let wide = a.cast_to(&DType::float64(), Casting::Safe).unwrap();
        let back = wide.cast_to(&DType::int32(), Casting::Unsafe).unwrap();
        assert_eq!(back.to_vec::<i32>().unwrap(), original);
    }

    #[test]
    fn test_cast_respects_rule() {
        let a = StridedArray::from_vec(vec![1.5f64], &[1]).unwrap();
        assert!(matches!(
            a.cast_to(&DType::int32(), Casting::Safe),
            Err(ArrayError::CastNotAllowed { .. })
        ));
        let unsafe_cast = a.cast_to(&DType::int32(), Casting::Unsafe).unwrap();
        assert_eq!(unsafe_cast.to_vec::<i32>().unwrap(), vec![1]);
    }

    #[test]
    fn test_byte_order_views() {
        let a = StridedArray::from_vec(vec![0x0102_0304i32], &[1]).unwrap();
        let foreign_order = if cfg!(target_endian = "little") {
            crate::ByteOrder::Big
        } else {
            crate::ByteOrder::Little
        };
        let swapped_dtype = DType::int32().with_byte_order(foreign_order);
        let b = a.cast_to(&swapped_dtype, Casting::Equiv).unwrap();
        // Raw bytes are reversed, but boxed access sees the same value.
        assert_eq!(b.get(&[0]).unwrap(), Value::I32(0x0102_0304));
        let raw = unsafe { std::slice::from_raw_parts(b.first_ptr(), 4) };
        let native = unsafe { std::slice::from_raw_parts(a.first_ptr(), 4) };
        assert_eq!(raw[0], native[3]);
    }

    #[test]
    fn test_diagonal_view() {
        let a = StridedArray::from_vec((0..9i64).collect(), &[3, 3]).unwrap();
        let d = a.diagonal(0, 0, 1).unwrap();
        assert_eq!(d.to_vec::<i64>().unwrap(), vec![0, 4, 8]);
        let d1 = a.diagonal(1, 0, 1).unwrap();
        assert_eq!(d1.to_vec::<i64>().unwrap(), vec![1, 5]);
        let dm1 = a.diagonal(-1, 0, 1).unwrap();
        assert_eq!(dm1.to_vec::<i64>().unwrap(), vec![3, 7]);
    }

    #[test]
    fn test_foreign_buffer_is_borrowed() {
        let mut storage = vec![1.0f64, 2.0, 3.0];
        let a = unsafe {
            StridedArray::from_raw_parts(
                storage.as_mut_ptr() as *mut u8,
                24,
                &[3],
                &[8],
                DType::float64(),
                true,
            )
        }
        .unwrap();
        assert!(!a.flags().owns_data);
        a.set(&[1], &Value::F64(9.5)).unwrap();
        assert_eq!(storage[1], 9.5);
    }

    #[test]
    fn test_bounds_validation() {
        let mut storage = vec![0u8; 16];
        let err = unsafe {
            StridedArray::from_raw_parts(
                storage.as_mut_ptr(),
                16,
                &[3],
                &[8],
                DType::float64(),
                true,
            )
        };
        assert!(matches!(err, Err(ArrayError::ViewOutOfBounds)));
    }

    #[test]
    fn test_fill_strided_view() {
        let a = StridedArray::zeros(&[4], DType::int16()).unwrap();
        let every_other = a.slice(0, 0, 4, 2).unwrap();
        every_other.fill(&Value::I16(7)).unwrap();
        assert_eq!(a.to_vec::<i16>().unwrap(), vec![7, 0, 7, 0]);
    }
}

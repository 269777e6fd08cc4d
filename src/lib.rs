//! Runtime-typed strided N-dimensional arrays.
//!
//! This crate implements the data model underneath a dynamically typed array
//! runtime: byte buffers described by a shape, signed byte strides and a type
//! descriptor, together with the three pieces of machinery every array
//! operation is built on:
//!
//! - [`DType`]: a runtime type descriptor (kind, size, byte order, alignment,
//!   optional structured fields) carrying a per-type function table
//!   ([`TypeOps`]) of inner-loop kernels.
//! - The promotion/casting engine ([`promote_types`], [`result_type`],
//!   [`can_cast_type_to`]): immutable process-wide lattice tables built once
//!   at startup.
//! - Broadcast iteration ([`ArrayIter`], [`MultiIter`]) and the reduction
//!   engine ([`reduce`]): sum/prod/min/max/mean/std and friends over any
//!   axis of any strided, possibly non-contiguous view.
//!
//! # Core Types
//!
//! - [`StridedArray`]: owns or borrows a byte buffer; views (transpose,
//!   reshape, slice, broadcast) share the buffer with new shape/strides
//! - [`DType`] / [`Value`]: runtime element type and boxed scalar
//!
//! # Example
//!
//! ```rust
//! use ndstride::{reduce, StridedArray};
//!
//! let a = StridedArray::from_vec(vec![1i32, 5, 9, 2, 4, 6], &[2, 3]).unwrap();
//! let row_sums = reduce::sum(&a, Some(1), None, None).unwrap();
//! assert_eq!(row_sums.to_vec::<i64>().unwrap(), vec![15, 12]);
//!
//! // Zero-copy reversed view, same reduction result.
//! let rev = a.flip(1).unwrap();
//! let rev_sums = reduce::sum(&rev, Some(1), None, None).unwrap();
//! assert_eq!(rev_sums.to_vec::<i64>().unwrap(), vec![15, 12]);
//! ```
//!
//! # Broadcasting Example
//!
//! ```rust
//! use ndstride::{DType, MultiIter, StridedArray};
//!
//! let a = StridedArray::zeros(&[3, 1, 5], DType::float64()).unwrap();
//! let b = StridedArray::zeros(&[1, 4, 5], DType::float64()).unwrap();
//! let it = MultiIter::new(&[&a, &b]).unwrap();
//! assert_eq!(it.size(), 60);
//! ```

mod broadcast;
pub mod dtype;
mod iter;
mod kernel;
pub mod ops;
pub mod promote;
pub mod reduce;
mod threading;
pub mod view;

// ============================================================================
// Type descriptors and scalars
// ============================================================================
pub use dtype::{
    dtype_from_id, register_dtype, ByteOrder, DType, Field, Kind, TypeId, TypeOps, Value,
    USER_TYPE_START,
};

// ============================================================================
// Promotion and casting
// ============================================================================
pub use promote::{
    can_cast_safely, can_cast_to, can_cast_type_to, min_scalar_type, promote_types, result_type,
    Casting,
};

// ============================================================================
// Arrays and views
// ============================================================================
pub use view::{Order, StridedArray};

// ============================================================================
// Iteration
// ============================================================================
pub use iter::{ArrayIter, MultiIter};

// ============================================================================
// Elementwise and assembly operations
// ============================================================================
pub use ops::{assign, clip, concatenate, dot, ravel, round};

/// Loops over fewer elements than this stay sequential even when the
/// `parallel` feature is enabled.
pub const MIN_PARALLEL_LENGTH: usize = 1 << 15;

// ============================================================================
// Error types
// ============================================================================

/// Coarse error class, mirroring the taxonomy of the host runtime this engine
/// is designed to sit under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad shapes, axes, empty sequences, invalid arguments.
    Value,
    /// No cast/promotion exists, wrong output buffer, missing kernel.
    Type,
    /// Buffer allocation failure.
    Memory,
    /// Dimension-product overflow detected by the checked multiply.
    Overflow,
}

/// Errors produced by array construction, casting, iteration and reduction.
#[derive(Debug, thiserror::Error)]
pub enum ArrayError {
    /// Array shapes are incompatible for the operation.
    #[error("shape mismatch: {0:?} vs {1:?}")]
    ShapeMismatch(Vec<usize>, Vec<usize>),

    /// Array ranks do not match.
    #[error("rank mismatch: {0} vs {1}")]
    RankMismatch(usize, usize),

    /// Shapes cannot be broadcast against each other.
    #[error("shapes not aligned: {0:?} vs {1:?}")]
    NotBroadcastable(Vec<usize>, Vec<usize>),

    /// Invalid axis index for the given array rank.
    #[error("axis {axis} out of bounds for array of rank {rank}")]
    InvalidAxis { axis: isize, rank: usize },

    /// Empty operand list where at least one array is required.
    #[error("need at least one array to {0}")]
    EmptySequence(&'static str),

    /// Order-dependent reduction over a zero-length axis.
    #[error("attempt to get {0} of an empty sequence")]
    EmptyReduction(&'static str),

    /// Clip called with neither bound.
    #[error("clip requires at least one of min or max")]
    ClipNoBounds,

    /// Slice bounds or step invalid for the dimension.
    #[error("invalid slice {start}..{stop} step {step} for axis of length {len}")]
    InvalidSlice {
        start: usize,
        stop: usize,
        step: isize,
        len: usize,
    },

    /// Element index out of bounds.
    #[error("index {index} out of bounds for axis {axis} with size {size}")]
    IndexOutOfBounds {
        axis: usize,
        index: usize,
        size: usize,
    },

    /// New element count does not match during reshape.
    #[error("cannot reshape array of {0} elements into shape {1:?}")]
    ReshapeMismatch(usize, Vec<isize>),

    /// Shape and strides would address memory outside the buffer.
    #[error("view exceeds the bounds of its buffer")]
    ViewOutOfBounds,

    /// Reinterpreting the buffer under a new descriptor is not possible.
    #[error("new type {0} is not compatible with the array layout")]
    IncompatibleView(&'static str),

    /// Product of dimension sizes exceeds the addressable range.
    #[error("number of elements in shape {0:?} overflows the maximum size")]
    DimensionOverflow(Vec<usize>),

    /// The allocator refused the buffer.
    #[error("unable to allocate {0} bytes for array data")]
    AllocFailed(usize),

    /// No common type exists for the operands.
    #[error("no common type for {0} and {1}")]
    NoCommonType(&'static str, &'static str),

    /// The requested conversion is not permitted under the casting rule.
    #[error("cannot cast {from} to {to} under rule {rule:?}")]
    CastNotAllowed {
        from: &'static str,
        to: &'static str,
        rule: Casting,
    },

    /// Ordered comparison requested on a type without a defined order.
    #[error("type {0} does not support ordered comparison")]
    NotOrderable(&'static str),

    /// The descriptor's function table has no kernel for the operation.
    #[error("type {dtype} has no {op} function registered")]
    MissingTypeOp {
        dtype: &'static str,
        op: &'static str,
    },

    /// The dtype cannot back array storage in this engine.
    #[error("arrays of type {0} are not supported")]
    UnsupportedDType(&'static str),

    /// Caller-provided output array has the wrong shape, dtype or layout.
    #[error("output array mismatch: {0}")]
    OutputMismatch(&'static str),

    /// Failed to coerce a scalar value to the required element type.
    #[error("cannot convert scalar to element type {0}")]
    ScalarConversion(&'static str),

    /// Destination array is not writeable.
    #[error("assignment destination is read-only")]
    NotWriteable,

    /// A user type id is already registered.
    #[error("type id {0} is already registered")]
    DuplicateTypeId(u16),

    /// User type ids must lie at or above [`USER_TYPE_START`].
    #[error("type id {0} is reserved for built-in types")]
    ReservedTypeId(u16),
}

impl ArrayError {
    /// Classify this error into the host-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArrayError::ShapeMismatch(..)
            | ArrayError::RankMismatch(..)
            | ArrayError::NotBroadcastable(..)
            | ArrayError::InvalidAxis { .. }
            | ArrayError::EmptySequence(..)
            | ArrayError::EmptyReduction(..)
            | ArrayError::ClipNoBounds
            | ArrayError::InvalidSlice { .. }
            | ArrayError::IndexOutOfBounds { .. }
            | ArrayError::ReshapeMismatch(..)
            | ArrayError::ViewOutOfBounds
            | ArrayError::IncompatibleView(..)
            | ArrayError::NotWriteable => ErrorKind::Value,
            ArrayError::NoCommonType(..)
            | ArrayError::CastNotAllowed { .. }
            | ArrayError::NotOrderable(..)
            | ArrayError::MissingTypeOp { .. }
            | ArrayError::UnsupportedDType(..)
            | ArrayError::OutputMismatch(..)
            | ArrayError::ScalarConversion(..)
            | ArrayError::DuplicateTypeId(..)
            | ArrayError::ReservedTypeId(..) => ErrorKind::Type,
            ArrayError::AllocFailed(..) => ErrorKind::Memory,
            ArrayError::DimensionOverflow(..) => ErrorKind::Overflow,
        }
    }
}

/// Result type for array operations.
pub type Result<T> = std::result::Result<T, ArrayError>;

#[inline]
pub(crate) fn trace_enabled() -> bool {
    matches!(std::env::var("NDSTRIDE_TRACE"), Ok(ref v) if v == "1")
}

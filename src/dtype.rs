//! Runtime type descriptors and the per-type function table.
//!
//! A [`DType`] describes one element type: its kind, byte size, byte order,
//! alignment and, for structured types, the field layout. Every descriptor
//! carries a function table ([`TypeOps`]) with the inner-loop kernels the
//! iteration and reduction engines dispatch through, so the engines never
//! match on concrete element types themselves.
//!
//! Built-in descriptors are process-wide singletons created on first use;
//! user-defined descriptors register at ids starting from
//! [`USER_TYPE_START`].

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use half::f16;
use num_complex::{Complex32, Complex64};

use crate::{ArrayError, Result};

/// First id available to user-registered types; everything below is reserved
/// for the built-in lattice.
pub const USER_TYPE_START: u16 = 256;

/// Coarse element-type category.
///
/// The derived ordering is the kind ladder used by same-kind casting:
/// bool < unsigned < signed < float < complex < bytes < unicode <
/// structured < object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Kind {
    Bool,
    Unsigned,
    Signed,
    Float,
    Complex,
    Bytes,
    Unicode,
    Structured,
    Object,
}

/// Byte order of stored elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Native,
    Little,
    Big,
    /// Single-byte and structured-opaque types have no meaningful order.
    Irrelevant,
}

impl ByteOrder {
    /// Resolve `Native` to the concrete order of this platform, and collapse
    /// the order of size-`elsize` elements to `Irrelevant` where it cannot
    /// matter.
    pub fn effective(self, elsize: usize) -> ByteOrder {
        if elsize <= 1 {
            return ByteOrder::Irrelevant;
        }
        match self {
            ByteOrder::Native => {
                if cfg!(target_endian = "little") {
                    ByteOrder::Little
                } else {
                    ByteOrder::Big
                }
            }
            other => other,
        }
    }

    /// Whether data of this order can be read directly by native loads.
    pub fn is_native(self, elsize: usize) -> bool {
        match self.effective(elsize) {
            ByteOrder::Irrelevant => true,
            ByteOrder::Little => cfg!(target_endian = "little"),
            ByteOrder::Big => cfg!(target_endian = "big"),
            // `effective` never returns `Native`.
            ByteOrder::Native => true,
        }
    }
}

/// Stable enumerants for the built-in types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TypeId {
    Bool = 0,
    UInt8 = 1,
    UInt16 = 2,
    UInt32 = 3,
    UInt64 = 4,
    Int8 = 5,
    Int16 = 6,
    Int32 = 7,
    Int64 = 8,
    Float16 = 9,
    Float32 = 10,
    Float64 = 11,
    Complex64 = 12,
    Complex128 = 13,
    Bytes = 14,
    Unicode = 15,
    Structured = 16,
    Object = 17,
}

/// Number of built-in type ids; the promotion/casting tables are this square.
pub(crate) const NTYPES: usize = 18;

impl TypeId {
    pub(crate) const ALL: [TypeId; NTYPES] = [
        TypeId::Bool,
        TypeId::UInt8,
        TypeId::UInt16,
        TypeId::UInt32,
        TypeId::UInt64,
        TypeId::Int8,
        TypeId::Int16,
        TypeId::Int32,
        TypeId::Int64,
        TypeId::Float16,
        TypeId::Float32,
        TypeId::Float64,
        TypeId::Complex64,
        TypeId::Complex128,
        TypeId::Bytes,
        TypeId::Unicode,
        TypeId::Structured,
        TypeId::Object,
    ];

    pub fn from_u16(id: u16) -> Option<TypeId> {
        TypeId::ALL.get(id as usize).copied()
    }

    pub fn kind(self) -> Kind {
        match self {
            TypeId::Bool => Kind::Bool,
            TypeId::UInt8 | TypeId::UInt16 | TypeId::UInt32 | TypeId::UInt64 => Kind::Unsigned,
            TypeId::Int8 | TypeId::Int16 | TypeId::Int32 | TypeId::Int64 => Kind::Signed,
            TypeId::Float16 | TypeId::Float32 | TypeId::Float64 => Kind::Float,
            TypeId::Complex64 | TypeId::Complex128 => Kind::Complex,
            TypeId::Bytes => Kind::Bytes,
            TypeId::Unicode => Kind::Unicode,
            TypeId::Structured => Kind::Structured,
            TypeId::Object => Kind::Object,
        }
    }

    /// Element size in bytes; 0 for the flexible and object kinds.
    pub fn size(self) -> usize {
        match self {
            TypeId::Bool | TypeId::UInt8 | TypeId::Int8 => 1,
            TypeId::UInt16 | TypeId::Int16 | TypeId::Float16 => 2,
            TypeId::UInt32 | TypeId::Int32 | TypeId::Float32 => 4,
            TypeId::UInt64 | TypeId::Int64 | TypeId::Float64 | TypeId::Complex64 => 8,
            TypeId::Complex128 => 16,
            TypeId::Bytes | TypeId::Unicode | TypeId::Structured | TypeId::Object => 0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeId::Bool => "bool",
            TypeId::UInt8 => "uint8",
            TypeId::UInt16 => "uint16",
            TypeId::UInt32 => "uint32",
            TypeId::UInt64 => "uint64",
            TypeId::Int8 => "int8",
            TypeId::Int16 => "int16",
            TypeId::Int32 => "int32",
            TypeId::Int64 => "int64",
            TypeId::Float16 => "float16",
            TypeId::Float32 => "float32",
            TypeId::Float64 => "float64",
            TypeId::Complex64 => "complex64",
            TypeId::Complex128 => "complex128",
            TypeId::Bytes => "bytes",
            TypeId::Unicode => "unicode",
            TypeId::Structured => "structured",
            TypeId::Object => "object",
        }
    }
}

// ============================================================================
// Boxed scalars
// ============================================================================

/// A single element lifted out of (or destined for) an array buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F16(f16),
    F32(f32),
    F64(f64),
    C64(Complex32),
    C128(Complex64),
    Bytes(Vec<u8>),
    Str(String),
    /// One record of a structured type: `(field name, field value)` pairs in
    /// declaration order.
    Record(Vec<(String, Value)>),
}

/// Lossless wide representation used for scalar conversions between the
/// numeric built-ins. Narrowing back out follows `as`-cast semantics
/// (truncation for integers, saturation for float-to-int).
#[derive(Debug, Clone, Copy)]
pub(crate) enum Wide {
    Int(i128),
    Float(f64),
    Complex(Complex64),
}

impl Value {
    /// The built-in type id naturally describing this scalar, if any.
    pub fn type_id(&self) -> Option<TypeId> {
        Some(match self {
            Value::Bool(_) => TypeId::Bool,
            Value::U8(_) => TypeId::UInt8,
            Value::U16(_) => TypeId::UInt16,
            Value::U32(_) => TypeId::UInt32,
            Value::U64(_) => TypeId::UInt64,
            Value::I8(_) => TypeId::Int8,
            Value::I16(_) => TypeId::Int16,
            Value::I32(_) => TypeId::Int32,
            Value::I64(_) => TypeId::Int64,
            Value::F16(_) => TypeId::Float16,
            Value::F32(_) => TypeId::Float32,
            Value::F64(_) => TypeId::Float64,
            Value::C64(_) => TypeId::Complex64,
            Value::C128(_) => TypeId::Complex128,
            Value::Bytes(_) => TypeId::Bytes,
            Value::Str(_) => TypeId::Unicode,
            Value::Record(_) => return None,
        })
    }

    /// The descriptor naturally describing this scalar, sized for flexible
    /// kinds. `None` for records, whose layout cannot be inferred.
    pub fn dtype(&self) -> Option<DType> {
        match self {
            Value::Bytes(b) => Some(DType::bytes(b.len())),
            Value::Str(s) => Some(DType::unicode(s.chars().count())),
            Value::Record(_) => None,
            other => other.type_id().map(DType::from_type_id),
        }
    }

    pub(crate) fn to_wide(&self) -> Option<Wide> {
        Some(match self {
            Value::Bool(b) => Wide::Int(*b as i128),
            Value::U8(v) => Wide::Int(*v as i128),
            Value::U16(v) => Wide::Int(*v as i128),
            Value::U32(v) => Wide::Int(*v as i128),
            Value::U64(v) => Wide::Int(*v as i128),
            Value::I8(v) => Wide::Int(*v as i128),
            Value::I16(v) => Wide::Int(*v as i128),
            Value::I32(v) => Wide::Int(*v as i128),
            Value::I64(v) => Wide::Int(*v as i128),
            Value::F16(v) => Wide::Float(v.to_f64()),
            Value::F32(v) => Wide::Float(*v as f64),
            Value::F64(v) => Wide::Float(*v),
            Value::C64(v) => Wide::Complex(Complex64::new(v.re as f64, v.im as f64)),
            Value::C128(v) => Wide::Complex(*v),
            Value::Bytes(_) | Value::Str(_) | Value::Record(_) => return None,
        })
    }

    /// Real part as `f64`, if numeric.
    pub fn to_f64(&self) -> Option<f64> {
        match self.to_wide()? {
            Wide::Int(i) => Some(i as f64),
            Wide::Float(f) => Some(f),
            Wide::Complex(c) => Some(c.re),
        }
    }

    /// Whether this is a numeric scalar strictly below zero.
    pub fn is_negative(&self) -> bool {
        match self.to_wide() {
            Some(Wide::Int(i)) => i < 0,
            Some(Wide::Float(f)) => f < 0.0,
            Some(Wide::Complex(c)) => c.re < 0.0,
            None => false,
        }
    }
}

// ============================================================================
// The function table
// ============================================================================

/// Reduction operator applied along an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Prod,
    Min,
    Max,
    /// Logical or.
    Or,
    /// Logical and.
    And,
}

/// Elementwise binary operator used by the composed clip path and `ptp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Min,
    Max,
    Sub,
}

/// Per-type inner-loop kernels.
///
/// One implementation exists per element type; the engines call through the
/// table on the descriptor instead of matching on element types. All strides
/// are in bytes and may be negative; `n` is the element count of the loop.
///
/// Methods with default bodies report a missing kernel, so flexible and
/// user-defined types implement only the subset that makes sense for them.
///
/// # Safety
/// The pointer-taking methods require that every address
/// `ptr + k * stride` for `k < n` lies inside the underlying allocation,
/// and that source and destination ranges do not overlap.
pub trait TypeOps: Send + Sync {
    /// Name used in error messages.
    fn type_name(&self) -> &'static str;

    /// Ordered comparison of two raw elements.
    fn compare(&self, _a: &[u8], _b: &[u8]) -> Result<Ordering> {
        Err(ArrayError::NotOrderable(self.type_name()))
    }

    /// Copy `n` elements, optionally reversing the byte order of each.
    ///
    /// # Safety
    /// See the trait-level contract.
    unsafe fn copyswap_n(
        &self,
        dst: *mut u8,
        dstride: isize,
        src: *const u8,
        sstride: isize,
        n: usize,
        swap: bool,
    );

    /// Lift one element out of the buffer.
    fn get_item(&self, _bytes: &[u8]) -> Result<Value> {
        Err(ArrayError::MissingTypeOp {
            dtype: self.type_name(),
            op: "getitem",
        })
    }

    /// Store one scalar into the buffer, converting numeric kinds as needed.
    fn set_item(&self, _value: &Value, _bytes: &mut [u8]) -> Result<()> {
        Err(ArrayError::MissingTypeOp {
            dtype: self.type_name(),
            op: "setitem",
        })
    }

    /// Fold `n` elements into `acc` (one element, same type, pre-initialized
    /// by the caller).
    ///
    /// # Safety
    /// See the trait-level contract; `acc` must point at one writable element.
    unsafe fn reduce(
        &self,
        _op: ReduceOp,
        _src: *const u8,
        _sstride: isize,
        _n: usize,
        _acc: *mut u8,
    ) -> Result<()> {
        Err(ArrayError::MissingTypeOp {
            dtype: self.type_name(),
            op: "reduce",
        })
    }

    /// Running fold: `dst[k] = op(dst[k-1], src[k])`, `dst[0] = src[0]`.
    ///
    /// # Safety
    /// See the trait-level contract.
    unsafe fn accumulate(
        &self,
        _op: ReduceOp,
        _src: *const u8,
        _sstride: isize,
        _dst: *mut u8,
        _dstride: isize,
        _n: usize,
    ) -> Result<()> {
        Err(ArrayError::MissingTypeOp {
            dtype: self.type_name(),
            op: "accumulate",
        })
    }

    /// Index of the extremal element; first occurrence wins.
    ///
    /// # Safety
    /// See the trait-level contract; `n` must be at least 1.
    unsafe fn argminmax(
        &self,
        _src: *const u8,
        _sstride: isize,
        _n: usize,
        _want_max: bool,
    ) -> Result<usize> {
        Err(ArrayError::MissingTypeOp {
            dtype: self.type_name(),
            op: "argminmax",
        })
    }

    /// Elementwise binary operator into `dst`.
    ///
    /// # Safety
    /// See the trait-level contract.
    #[allow(clippy::too_many_arguments)]
    unsafe fn binary(
        &self,
        _op: BinOp,
        _a: *const u8,
        _astride: isize,
        _b: *const u8,
        _bstride: isize,
        _dst: *mut u8,
        _dstride: isize,
        _n: usize,
    ) -> Result<()> {
        Err(ArrayError::MissingTypeOp {
            dtype: self.type_name(),
            op: "binary",
        })
    }

    /// Clamp `n` elements between `lo` and `hi` (either may be absent); the
    /// bounds have already been coerced to this element type.
    ///
    /// # Safety
    /// See the trait-level contract.
    #[allow(clippy::too_many_arguments)]
    unsafe fn fast_clip(
        &self,
        _src: *const u8,
        _sstride: isize,
        _lo: Option<&Value>,
        _hi: Option<&Value>,
        _dst: *mut u8,
        _dstride: isize,
        _n: usize,
    ) -> Result<()> {
        Err(ArrayError::MissingTypeOp {
            dtype: self.type_name(),
            op: "clip",
        })
    }

    /// Round to `decimals` decimal places (half-to-even); integer types are
    /// a plain copy.
    ///
    /// # Safety
    /// See the trait-level contract.
    unsafe fn round(
        &self,
        _src: *const u8,
        _sstride: isize,
        _dst: *mut u8,
        _dstride: isize,
        _n: usize,
        _decimals: i32,
    ) -> Result<()> {
        Err(ArrayError::MissingTypeOp {
            dtype: self.type_name(),
            op: "round",
        })
    }

    /// Inner product of two equal-length strided vectors.
    ///
    /// # Safety
    /// See the trait-level contract.
    unsafe fn dot(
        &self,
        _a: *const u8,
        _astride: isize,
        _b: *const u8,
        _bstride: isize,
        _n: usize,
    ) -> Result<Value> {
        Err(ArrayError::MissingTypeOp {
            dtype: self.type_name(),
            op: "dot",
        })
    }

    /// Sum widened into a complex-double accumulator (real types fill the
    /// real component); used by the mean/std engine.
    ///
    /// # Safety
    /// See the trait-level contract.
    unsafe fn sum_wide(&self, _src: *const u8, _sstride: isize, _n: usize) -> Result<Complex64> {
        Err(ArrayError::MissingTypeOp {
            dtype: self.type_name(),
            op: "sum",
        })
    }

    /// Sum of `|x - mean|^2` widened to `f64`; used by the std/var engine.
    ///
    /// # Safety
    /// See the trait-level contract.
    unsafe fn sum_sq_dev(
        &self,
        _src: *const u8,
        _sstride: isize,
        _n: usize,
        _mean: Complex64,
    ) -> Result<f64> {
        Err(ArrayError::MissingTypeOp {
            dtype: self.type_name(),
            op: "variance",
        })
    }

    /// In-place division by an element count; used to turn sums into means.
    ///
    /// # Safety
    /// See the trait-level contract.
    unsafe fn div_count(
        &self,
        _dst: *mut u8,
        _dstride: isize,
        _n: usize,
        _count: usize,
    ) -> Result<()> {
        Err(ArrayError::MissingTypeOp {
            dtype: self.type_name(),
            op: "divide",
        })
    }
}

// ============================================================================
// Descriptors
// ============================================================================

/// One field of a structured type.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub dtype: DType,
    pub offset: usize,
}

/// Fixed-shape nested array element.
#[derive(Debug, Clone)]
pub struct Subarray {
    pub base: DType,
    pub shape: Vec<usize>,
}

struct Inner {
    id: u16,
    name: &'static str,
    kind: Kind,
    size: usize,
    byte_order: ByteOrder,
    alignment: usize,
    fields: Option<Vec<Field>>,
    subarray: Option<Subarray>,
    ops: Arc<dyn TypeOps>,
}

/// A runtime type descriptor. Cheap to clone; immutable after construction.
#[derive(Clone)]
pub struct DType(Arc<Inner>);

impl fmt::Debug for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DType({}", self.0.name)?;
        if self.is_flexible() {
            write!(f, "[{}]", self.0.size)?;
        }
        if !matches!(self.0.byte_order, ByteOrder::Native | ByteOrder::Irrelevant) {
            write!(f, ", {:?}", self.0.byte_order)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

impl PartialEq for DType {
    fn eq(&self, other: &Self) -> bool {
        self.is_equiv(other)
    }
}

macro_rules! builtin_ctor {
    ($($fn_name:ident => $id:expr;)*) => {
        $(
            #[doc = concat!("The `", stringify!($fn_name), "` built-in descriptor.")]
            pub fn $fn_name() -> DType {
                DType::from_type_id($id)
            }
        )*
    };
}

impl DType {
    builtin_ctor! {
        bool_ => TypeId::Bool;
        uint8 => TypeId::UInt8;
        uint16 => TypeId::UInt16;
        uint32 => TypeId::UInt32;
        uint64 => TypeId::UInt64;
        int8 => TypeId::Int8;
        int16 => TypeId::Int16;
        int32 => TypeId::Int32;
        int64 => TypeId::Int64;
        float16 => TypeId::Float16;
        float32 => TypeId::Float32;
        float64 => TypeId::Float64;
        complex64 => TypeId::Complex64;
        complex128 => TypeId::Complex128;
        object_ => TypeId::Object;
    }

    /// The built-in singleton for `id`.
    pub fn from_type_id(id: TypeId) -> DType {
        registry().builtins[id as u16 as usize].clone()
    }

    /// A byte-string descriptor of `size` bytes (0 = capacity not yet
    /// resolved).
    pub fn bytes(size: usize) -> DType {
        DType::from_type_id(TypeId::Bytes).resized(size)
    }

    /// A unicode descriptor of `chars` UCS-4 code points (0 = unresolved).
    pub fn unicode(chars: usize) -> DType {
        DType::from_type_id(TypeId::Unicode).resized(chars * 4)
    }

    /// Resolve a flexible descriptor's capacity. Descriptors are immutable;
    /// this builds the sized descriptor instead of mutating in place.
    pub fn with_size(&self, size: usize) -> Result<DType> {
        if !self.is_flexible() {
            return Err(ArrayError::ScalarConversion(self.0.name));
        }
        Ok(self.resized(size))
    }

    fn resized(&self, size: usize) -> DType {
        // Flexible tables carry their capacity, so they are rebuilt here.
        let ops = match self.type_id() {
            Some(id @ (TypeId::Bytes | TypeId::Unicode)) => crate::kernel::flexible_ops(id, size),
            _ => Arc::clone(&self.0.ops),
        };
        DType(Arc::new(Inner {
            id: self.0.id,
            name: self.0.name,
            kind: self.0.kind,
            size,
            byte_order: self.0.byte_order,
            alignment: self.0.alignment,
            fields: self.0.fields.clone(),
            subarray: self.0.subarray.clone(),
            ops,
        }))
    }

    /// Compose a structured descriptor from `(name, dtype)` pairs, packing
    /// fields back to back at their natural alignment.
    pub fn structured(fields: &[(&str, DType)]) -> Result<DType> {
        if fields.is_empty() {
            return Err(ArrayError::EmptySequence("compose a structured type"));
        }
        let mut packed = Vec::with_capacity(fields.len());
        let mut offset = 0usize;
        let mut alignment = 1usize;
        for (name, dtype) in fields {
            let align = dtype.alignment().max(1);
            offset = offset.div_ceil(align) * align;
            alignment = alignment.max(align);
            packed.push(Field {
                name: (*name).to_string(),
                dtype: dtype.clone(),
                offset,
            });
            offset += dtype.size();
        }
        let size = offset.div_ceil(alignment) * alignment;
        let fields_for_ops = packed.clone();
        Ok(DType(Arc::new(Inner {
            id: TypeId::Structured as u16,
            name: "structured",
            kind: Kind::Structured,
            size,
            byte_order: ByteOrder::Irrelevant,
            alignment,
            fields: Some(packed),
            subarray: None,
            ops: crate::kernel::structured_ops(fields_for_ops, size),
        })))
    }

    /// A fixed-shape nested array element of `base` elements.
    pub fn subarray(base: DType, shape: &[usize]) -> Result<DType> {
        let count = shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d));
        let count = count.ok_or_else(|| ArrayError::DimensionOverflow(shape.to_vec()))?;
        let size = count
            .checked_mul(base.size())
            .ok_or_else(|| ArrayError::DimensionOverflow(shape.to_vec()))?;
        let alignment = base.alignment();
        Ok(DType(Arc::new(Inner {
            id: TypeId::Structured as u16,
            name: "structured",
            kind: Kind::Structured,
            size,
            byte_order: ByteOrder::Irrelevant,
            alignment,
            fields: None,
            subarray: Some(Subarray {
                base,
                shape: shape.to_vec(),
            }),
            ops: crate::kernel::opaque_ops("structured", size),
        })))
    }

    /// Construct a user-defined descriptor with its own function table.
    /// Register it with [`register_dtype`] to make it discoverable by id.
    pub fn user(
        id: u16,
        name: &'static str,
        kind: Kind,
        size: usize,
        alignment: usize,
        ops: Arc<dyn TypeOps>,
    ) -> Result<DType> {
        if id < USER_TYPE_START {
            return Err(ArrayError::ReservedTypeId(id));
        }
        Ok(DType(Arc::new(Inner {
            id,
            name,
            kind,
            size,
            byte_order: ByteOrder::Native,
            alignment,
            fields: None,
            subarray: None,
            ops,
        })))
    }

    pub fn id(&self) -> u16 {
        self.0.id
    }

    /// The built-in enumerant, if this is a built-in descriptor.
    pub fn type_id(&self) -> Option<TypeId> {
        TypeId::from_u16(self.0.id)
    }

    pub fn name(&self) -> &'static str {
        self.0.name
    }

    pub fn kind(&self) -> Kind {
        self.0.kind
    }

    /// Element size in bytes.
    pub fn size(&self) -> usize {
        self.0.size
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.0.byte_order
    }

    pub fn alignment(&self) -> usize {
        self.0.alignment
    }

    pub fn fields(&self) -> Option<&[Field]> {
        self.0.fields.as_deref()
    }

    pub fn subarray_info(&self) -> Option<&Subarray> {
        self.0.subarray.as_ref()
    }

    /// The per-type function table.
    pub fn ops(&self) -> &dyn TypeOps {
        &*self.0.ops
    }

    pub(crate) fn ops_arc(&self) -> Arc<dyn TypeOps> {
        Arc::clone(&self.0.ops)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.0.kind,
            Kind::Bool | Kind::Unsigned | Kind::Signed | Kind::Float | Kind::Complex
        )
    }

    /// Bytes/unicode descriptors whose capacity is part of the type.
    pub fn is_flexible(&self) -> bool {
        matches!(self.0.kind, Kind::Bytes | Kind::Unicode)
    }

    /// Whether stored elements can be read with native-endian loads.
    pub fn is_native_order(&self) -> bool {
        self.0.byte_order.is_native(self.0.size)
    }

    /// The same descriptor with a different stored byte order.
    pub fn with_byte_order(&self, order: ByteOrder) -> DType {
        if self.0.byte_order == order {
            return self.clone();
        }
        let mut inner = Inner {
            id: self.0.id,
            name: self.0.name,
            kind: self.0.kind,
            size: self.0.size,
            byte_order: order,
            alignment: self.0.alignment,
            fields: self.0.fields.clone(),
            subarray: self.0.subarray.clone(),
            ops: Arc::clone(&self.0.ops),
        };
        if self.0.size <= 1 {
            inner.byte_order = ByteOrder::Irrelevant;
        }
        DType(Arc::new(inner))
    }

    /// Native-order version of this descriptor. Descriptors whose stored
    /// order is already native-readable (including order-free kinds) come
    /// back unchanged.
    pub fn to_native(&self) -> DType {
        if self.is_native_order() {
            return self.clone();
        }
        self.with_byte_order(ByteOrder::Native)
    }

    /// Layout equivalence: same id family, same size, same effective byte
    /// order, recursively equivalent fields and subarray.
    pub fn is_equiv(&self, other: &DType) -> bool {
        if self.0.id != other.0.id || self.0.size != other.0.size {
            return false;
        }
        if self.0.byte_order.effective(self.0.size) != other.0.byte_order.effective(other.0.size) {
            return false;
        }
        match (&self.0.fields, &other.0.fields) {
            (Some(a), Some(b)) => {
                if a.len() != b.len() {
                    return false;
                }
                for (fa, fb) in a.iter().zip(b.iter()) {
                    if fa.name != fb.name
                        || fa.offset != fb.offset
                        || !fa.dtype.is_equiv(&fb.dtype)
                    {
                        return false;
                    }
                }
            }
            (None, None) => {}
            _ => return false,
        }
        match (&self.0.subarray, &other.0.subarray) {
            (Some(a), Some(b)) => a.shape == b.shape && a.base.is_equiv(&b.base),
            (None, None) => true,
            _ => false,
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

struct Registry {
    builtins: Vec<DType>,
    user: RwLock<HashMap<u16, DType>>,
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let builtins = TypeId::ALL
            .iter()
            .map(|&id| {
                DType(Arc::new(Inner {
                    id: id as u16,
                    name: id.name(),
                    kind: id.kind(),
                    size: id.size(),
                    // Unicode stores 4-byte code points, so its order
                    // matters even while the capacity is unresolved.
                    byte_order: match id {
                        TypeId::Unicode => ByteOrder::Native,
                        _ if id.size() <= 1 => ByteOrder::Irrelevant,
                        _ => ByteOrder::Native,
                    },
                    alignment: crate::kernel::builtin_alignment(id),
                    fields: None,
                    subarray: None,
                    ops: crate::kernel::builtin_ops(id),
                }))
            })
            .collect();
        Registry {
            builtins,
            user: RwLock::new(HashMap::new()),
        }
    })
}

/// Look up a descriptor by type id: built-ins below [`USER_TYPE_START`],
/// registered user types at or above it.
pub fn dtype_from_id(id: u16) -> Option<DType> {
    if (id as usize) < NTYPES {
        return Some(registry().builtins[id as usize].clone());
    }
    registry().user.read().ok()?.get(&id).cloned()
}

/// Register a user-defined descriptor under its id. Ids below
/// [`USER_TYPE_START`] are rejected, as is re-registering a taken id.
pub fn register_dtype(dtype: DType) -> Result<()> {
    let id = dtype.id();
    if id < USER_TYPE_START {
        return Err(ArrayError::ReservedTypeId(id));
    }
    let mut user = registry()
        .user
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if user.contains_key(&id) {
        return Err(ArrayError::DuplicateTypeId(id));
    }
    user.insert(id, dtype);
    Ok(())
}

// ============================================================================
// Typed element access for the closed built-in set
// ============================================================================

/// Rust element types with a built-in descriptor, usable with the typed
/// construction helpers on `StridedArray`.
pub trait Element: Copy + 'static {
    const TYPE_ID: TypeId;

    fn write_to(self, dst: &mut [u8]);
    fn read_from(src: &[u8]) -> Self;
}

macro_rules! primitive_element {
    ($($t:ty => $id:expr;)*) => {
        $(
            impl Element for $t {
                const TYPE_ID: TypeId = $id;

                #[inline]
                fn write_to(self, dst: &mut [u8]) {
                    dst[..std::mem::size_of::<$t>()].copy_from_slice(&self.to_ne_bytes());
                }

                #[inline]
                fn read_from(src: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(&src[..std::mem::size_of::<$t>()]);
                    <$t>::from_ne_bytes(raw)
                }
            }
        )*
    };
}

primitive_element! {
    u8 => TypeId::UInt8;
    u16 => TypeId::UInt16;
    u32 => TypeId::UInt32;
    u64 => TypeId::UInt64;
    i8 => TypeId::Int8;
    i16 => TypeId::Int16;
    i32 => TypeId::Int32;
    i64 => TypeId::Int64;
    f32 => TypeId::Float32;
    f64 => TypeId::Float64;
}

impl Element for bool {
    const TYPE_ID: TypeId = TypeId::Bool;

    #[inline]
    fn write_to(self, dst: &mut [u8]) {
        dst[0] = self as u8;
    }

    #[inline]
    fn read_from(src: &[u8]) -> Self {
        src[0] != 0
    }
}

impl Element for f16 {
    const TYPE_ID: TypeId = TypeId::Float16;

    #[inline]
    fn write_to(self, dst: &mut [u8]) {
        dst[..2].copy_from_slice(&self.to_bits().to_ne_bytes());
    }

    #[inline]
    fn read_from(src: &[u8]) -> Self {
        f16::from_bits(u16::read_from(src))
    }
}

impl Element for Complex32 {
    const TYPE_ID: TypeId = TypeId::Complex64;

    #[inline]
    fn write_to(self, dst: &mut [u8]) {
        self.re.write_to(&mut dst[..4]);
        self.im.write_to(&mut dst[4..8]);
    }

    #[inline]
    fn read_from(src: &[u8]) -> Self {
        Complex32::new(f32::read_from(&src[..4]), f32::read_from(&src[4..8]))
    }
}

impl Element for Complex64 {
    const TYPE_ID: TypeId = TypeId::Complex128;

    #[inline]
    fn write_to(self, dst: &mut [u8]) {
        self.re.write_to(&mut dst[..8]);
        self.im.write_to(&mut dst[8..16]);
    }

    #[inline]
    fn read_from(src: &[u8]) -> Self {
        Complex64::new(f64::read_from(&src[..8]), f64::read_from(&src[8..16]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_ladder_order() {
        assert!(Kind::Bool < Kind::Unsigned);
        assert!(Kind::Unsigned < Kind::Signed);
        assert!(Kind::Signed < Kind::Float);
        assert!(Kind::Float < Kind::Complex);
        assert!(Kind::Complex < Kind::Bytes);
        assert!(Kind::Unicode < Kind::Structured);
        assert!(Kind::Structured < Kind::Object);
    }

    #[test]
    fn test_builtin_singletons_are_shared() {
        let a = DType::float64();
        let b = DType::float64();
        assert!(Arc::ptr_eq(&a.0, &b.0));
    }

    #[test]
    fn test_equivalence_ignores_native_alias() {
        let native = DType::int32();
        let explicit = native.with_byte_order(if cfg!(target_endian = "little") {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        });
        assert!(native.is_equiv(&explicit));

        let swapped = native.with_byte_order(if cfg!(target_endian = "little") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        });
        assert!(!native.is_equiv(&swapped));
    }

    #[test]
    fn test_single_byte_order_is_irrelevant() {
        let swapped = DType::uint8().with_byte_order(ByteOrder::Big);
        assert!(swapped.is_equiv(&DType::uint8()));
    }

    #[test]
    fn test_structured_layout() {
        let point = DType::structured(&[("x", DType::float64()), ("tag", DType::uint8())]).unwrap();
        assert_eq!(point.kind(), Kind::Structured);
        let fields = point.fields().unwrap();
        assert_eq!(fields[0].offset, 0);
        assert_eq!(fields[1].offset, 8);
        // Padded out to the widest field's alignment.
        assert_eq!(point.size(), 16);

        let same = DType::structured(&[("x", DType::float64()), ("tag", DType::uint8())]).unwrap();
        assert!(point.is_equiv(&same));
        let renamed =
            DType::structured(&[("y", DType::float64()), ("tag", DType::uint8())]).unwrap();
        assert!(!point.is_equiv(&renamed));
    }

    #[test]
    fn test_flexible_resize() {
        let s = DType::bytes(0);
        assert_eq!(s.size(), 0);
        let sized = s.with_size(12).unwrap();
        assert_eq!(sized.size(), 12);
        assert!(DType::int32().with_size(8).is_err());
    }

    #[test]
    fn test_unicode_capacity_in_bytes() {
        assert_eq!(DType::unicode(3).size(), 12);
    }

    #[test]
    fn test_registry_rejects_reserved_and_duplicate_ids() {
        let ops = DType::float64().ops_arc();
        assert!(matches!(
            DType::user(7, "seven", Kind::Float, 8, 8, Arc::clone(&ops)),
            Err(ArrayError::ReservedTypeId(7))
        ));

        let d = DType::user(612, "custom612", Kind::Float, 8, 8, Arc::clone(&ops)).unwrap();
        register_dtype(d.clone()).unwrap();
        assert_eq!(dtype_from_id(612).unwrap().name(), "custom612");
        let again = DType::user(612, "custom612", Kind::Float, 8, 8, ops).unwrap();
        assert!(matches!(
            register_dtype(again),
            Err(ArrayError::DuplicateTypeId(612))
        ));
    }

    #[test]
    fn test_value_wide_roundtrip() {
        assert_eq!(Value::I16(-3).to_f64(), Some(-3.0));
        assert!(Value::I8(-1).is_negative());
        assert!(!Value::U64(u64::MAX).is_negative());
        assert_eq!(Value::Bytes(vec![1, 2]).to_f64(), None);
    }
}

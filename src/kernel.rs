//! Monomorphic inner loops behind the per-type function tables.
//!
//! Every built-in element type gets one [`TypeOps`] implementation,
//! instantiated from generic kernels over a private `Scalar` trait. The
//! engines upstream (iteration, reduction, casting) only ever talk to the
//! table, so adding an element type means adding one `Scalar` impl here.
//!
//! All loops take base pointers plus signed byte strides, following the
//! addressing model of the view layer: negative strides walk buffers
//! backwards, stride 0 repeats one element (broadcasting).

use std::cmp::Ordering;
use std::marker::PhantomData;
use std::sync::Arc;

use half::f16;
use num_complex::{Complex32, Complex64};

use crate::dtype::{BinOp, Field, ReduceOp, TypeId, TypeOps, Value, Wide};
use crate::{ArrayError, Result};

// ============================================================================
// Wide arithmetic
// ============================================================================

impl Wide {
    fn add(self, other: Wide) -> Wide {
        match (self, other) {
            (Wide::Int(a), Wide::Int(b)) => Wide::Int(a.wrapping_add(b)),
            (Wide::Float(a), Wide::Float(b)) => Wide::Float(a + b),
            (Wide::Complex(a), Wide::Complex(b)) => Wide::Complex(a + b),
            // Operands of one kernel always share a type.
            _ => self,
        }
    }

    fn mul(self, other: Wide) -> Wide {
        match (self, other) {
            (Wide::Int(a), Wide::Int(b)) => Wide::Int(a.wrapping_mul(b)),
            (Wide::Float(a), Wide::Float(b)) => Wide::Float(a * b),
            (Wide::Complex(a), Wide::Complex(b)) => Wide::Complex(a * b),
            _ => self,
        }
    }

    fn sub(self, other: Wide) -> Wide {
        match (self, other) {
            (Wide::Int(a), Wide::Int(b)) => Wide::Int(a.wrapping_sub(b)),
            (Wide::Float(a), Wide::Float(b)) => Wide::Float(a - b),
            (Wide::Complex(a), Wide::Complex(b)) => Wide::Complex(a - b),
            _ => self,
        }
    }
}

// ============================================================================
// Element types
// ============================================================================

/// Closed set of element types the numeric kernels are instantiated over.
pub(crate) trait Scalar: Copy + Send + Sync + 'static {
    const ID: TypeId;
    const NAME: &'static str;
    /// Complex types byte-swap each component separately.
    const SWAP_HALVES: bool = false;

    /// # Safety
    /// `p` must be readable for `size_of::<Self>()` bytes; no alignment
    /// requirement.
    unsafe fn load(p: *const u8) -> Self;

    /// # Safety
    /// `p` must be writable for `size_of::<Self>()` bytes; no alignment
    /// requirement.
    unsafe fn store(self, p: *mut u8);

    fn to_wide(self) -> Wide;
    fn from_wide(w: Wide) -> Self;
    fn to_value(self) -> Value;
    fn cmp_partial(self, other: Self) -> Option<Ordering>;

    fn is_nan(self) -> bool {
        false
    }

    /// Decimal rounding, half to even; identity for integer types.
    fn round_decimals(self, _decimals: i32) -> Self {
        self
    }

    fn add(self, other: Self) -> Self {
        Self::from_wide(self.to_wide().add(other.to_wide()))
    }

    fn mul(self, other: Self) -> Self {
        Self::from_wide(self.to_wide().mul(other.to_wide()))
    }

    fn sub(self, other: Self) -> Self {
        Self::from_wide(self.to_wide().sub(other.to_wide()))
    }

    fn div_count(self, count: usize) -> Self {
        match self.to_wide() {
            Wide::Int(i) => Self::from_wide(Wide::Int(i / count as i128)),
            Wide::Float(f) => Self::from_wide(Wide::Float(f / count as f64)),
            Wide::Complex(c) => Self::from_wide(Wide::Complex(c / count as f64)),
        }
    }

    fn zero() -> Self {
        Self::from_wide(Wide::Int(0))
    }

    fn one() -> Self {
        Self::from_wide(Wide::Int(1))
    }

    fn is_truthy(self) -> bool {
        match self.to_wide() {
            Wide::Int(i) => i != 0,
            Wide::Float(f) => f != 0.0,
            Wide::Complex(c) => c.re != 0.0 || c.im != 0.0,
        }
    }

    fn to_c128(self) -> Complex64 {
        match self.to_wide() {
            Wide::Int(i) => Complex64::new(i as f64, 0.0),
            Wide::Float(f) => Complex64::new(f, 0.0),
            Wide::Complex(c) => c,
        }
    }
}

fn round_half_even(x: f64, decimals: i32) -> f64 {
    if decimals == 0 {
        return x.round_ties_even();
    }
    let scale = 10f64.powi(decimals.abs());
    if decimals > 0 {
        (x * scale).round_ties_even() / scale
    } else {
        (x / scale).round_ties_even() * scale
    }
}

macro_rules! int_scalar {
    ($($t:ty => ($id:expr, $name:literal, $variant:ident);)*) => {
        $(
            impl Scalar for $t {
                const ID: TypeId = $id;
                const NAME: &'static str = $name;

                #[inline]
                unsafe fn load(p: *const u8) -> Self {
                    (p as *const $t).read_unaligned()
                }

                #[inline]
                unsafe fn store(self, p: *mut u8) {
                    (p as *mut $t).write_unaligned(self)
                }

                #[inline]
                fn to_wide(self) -> Wide {
                    Wide::Int(self as i128)
                }

                #[inline]
                fn from_wide(w: Wide) -> Self {
                    match w {
                        Wide::Int(i) => i as $t,
                        Wide::Float(f) => f as $t,
                        Wide::Complex(c) => c.re as $t,
                    }
                }

                #[inline]
                fn to_value(self) -> Value {
                    Value::$variant(self)
                }

                #[inline]
                fn cmp_partial(self, other: Self) -> Option<Ordering> {
                    Some(self.cmp(&other))
                }
            }
        )*
    };
}

int_scalar! {
    u8 => (TypeId::UInt8, "uint8", U8);
    u16 => (TypeId::UInt16, "uint16", U16);
    u32 => (TypeId::UInt32, "uint32", U32);
    u64 => (TypeId::UInt64, "uint64", U64);
    i8 => (TypeId::Int8, "int8", I8);
    i16 => (TypeId::Int16, "int16", I16);
    i32 => (TypeId::Int32, "int32", I32);
    i64 => (TypeId::Int64, "int64", I64);
}

macro_rules! float_scalar {
    ($($t:ty => ($id:expr, $name:literal, $variant:ident);)*) => {
        $(
            impl Scalar for $t {
                const ID: TypeId = $id;
                const NAME: &'static str = $name;

                #[inline]
                unsafe fn load(p: *const u8) -> Self {
                    (p as *const $t).read_unaligned()
                }

                #[inline]
                unsafe fn store(self, p: *mut u8) {
                    (p as *mut $t).write_unaligned(self)
                }

                #[inline]
                fn to_wide(self) -> Wide {
                    Wide::Float(self as f64)
                }

                #[inline]
                fn from_wide(w: Wide) -> Self {
                    match w {
                        Wide::Int(i) => i as $t,
                        Wide::Float(f) => f as $t,
                        Wide::Complex(c) => c.re as $t,
                    }
                }

                #[inline]
                fn to_value(self) -> Value {
                    Value::$variant(self)
                }

                #[inline]
                fn cmp_partial(self, other: Self) -> Option<Ordering> {
                    self.partial_cmp(&other)
                }

                #[inline]
                fn is_nan(self) -> bool {
                    <$t>::is_nan(self)
                }

                #[inline]
                fn round_decimals(self, decimals: i32) -> Self {
                    round_half_even(self as f64, decimals) as $t
                }
            }
        )*
    };
}

float_scalar! {
    f32 => (TypeId::Float32, "float32", F32);
    f64 => (TypeId::Float64, "float64", F64);
}

impl Scalar for bool {
    const ID: TypeId = TypeId::Bool;
    const NAME: &'static str = "bool";

    #[inline]
    unsafe fn load(p: *const u8) -> Self {
        p.read() != 0
    }

    #[inline]
    unsafe fn store(self, p: *mut u8) {
        p.write(self as u8)
    }

    #[inline]
    fn to_wide(self) -> Wide {
        Wide::Int(self as i128)
    }

    #[inline]
    fn from_wide(w: Wide) -> Self {
        match w {
            Wide::Int(i) => i != 0,
            Wide::Float(f) => f != 0.0,
            Wide::Complex(c) => c.re != 0.0 || c.im != 0.0,
        }
    }

    #[inline]
    fn to_value(self) -> Value {
        Value::Bool(self)
    }

    #[inline]
    fn cmp_partial(self, other: Self) -> Option<Ordering> {
        Some(self.cmp(&other))
    }
}

impl Scalar for f16 {
    const ID: TypeId = TypeId::Float16;
    const NAME: &'static str = "float16";

    #[inline]
    unsafe fn load(p: *const u8) -> Self {
        f16::from_bits((p as *const u16).read_unaligned())
    }

    #[inline]
    unsafe fn store(self, p: *mut u8) {
        (p as *mut u16).write_unaligned(self.to_bits())
    }

    #[inline]
    fn to_wide(self) -> Wide {
        Wide::Float(self.to_f64())
    }

    #[inline]
    fn from_wide(w: Wide) -> Self {
        match w {
            Wide::Int(i) => f16::from_f64(i as f64),
            Wide::Float(f) => f16::from_f64(f),
            Wide::Complex(c) => f16::from_f64(c.re),
        }
    }

    #[inline]
    fn to_value(self) -> Value {
        Value::F16(self)
    }

    #[inline]
    fn cmp_partial(self, other: Self) -> Option<Ordering> {
        self.to_f32().partial_cmp(&other.to_f32())
    }

    #[inline]
    fn is_nan(self) -> bool {
        f16::is_nan(self)
    }

    #[inline]
    fn round_decimals(self, decimals: i32) -> Self {
        f16::from_f64(round_half_even(self.to_f64(), decimals))
    }
}

macro_rules! complex_scalar {
    ($($t:ty => ($id:expr, $name:literal, $variant:ident, $re:ty);)*) => {
        $(
            impl Scalar for $t {
                const ID: TypeId = $id;
                const NAME: &'static str = $name;
                const SWAP_HALVES: bool = true;

                #[inline]
                unsafe fn load(p: *const u8) -> Self {
                    (p as *const $t).read_unaligned()
                }

                #[inline]
                unsafe fn store(self, p: *mut u8) {
                    (p as *mut $t).write_unaligned(self)
                }

                #[inline]
                fn to_wide(self) -> Wide {
                    Wide::Complex(Complex64::new(self.re as f64, self.im as f64))
                }

                #[inline]
                fn from_wide(w: Wide) -> Self {
                    match w {
                        Wide::Int(i) => Self::new(i as $re, 0.0 as $re),
                        Wide::Float(f) => Self::new(f as $re, 0.0 as $re),
                        Wide::Complex(c) => Self::new(c.re as $re, c.im as $re),
                    }
                }

                #[inline]
                fn to_value(self) -> Value {
                    Value::$variant(self)
                }

                /// Lexicographic: real part first, then imaginary.
                #[inline]
                fn cmp_partial(self, other: Self) -> Option<Ordering> {
                    match self.re.partial_cmp(&other.re) {
                        Some(Ordering::Equal) => self.im.partial_cmp(&other.im),
                        other_ord => other_ord,
                    }
                }

                #[inline]
                fn is_nan(self) -> bool {
                    self.re.is_nan() || self.im.is_nan()
                }

                #[inline]
                fn round_decimals(self, decimals: i32) -> Self {
                    Self::new(
                        round_half_even(self.re as f64, decimals) as $re,
                        round_half_even(self.im as f64, decimals) as $re,
                    )
                }
            }
        )*
    };
}

complex_scalar! {
    Complex32 => (TypeId::Complex64, "complex64", C64, f32);
    Complex64 => (TypeId::Complex128, "complex128", C128, f64);
}

// ============================================================================
// Numeric function table
// ============================================================================

struct NumOps<T>(PhantomData<T>);

impl<T: Scalar> NumOps<T> {
    fn coerce(&self, value: &Value) -> Result<T> {
        let wide = value
            .to_wide()
            .ok_or(ArrayError::ScalarConversion(T::NAME))?;
        Ok(T::from_wide(wide))
    }
}

impl<T: Scalar> TypeOps for NumOps<T> {
    fn type_name(&self) -> &'static str {
        T::NAME
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Result<Ordering> {
        let size = std::mem::size_of::<T>();
        if a.len() < size || b.len() < size {
            return Err(ArrayError::ScalarConversion(T::NAME));
        }
        let (x, y) = unsafe { (T::load(a.as_ptr()), T::load(b.as_ptr())) };
        // Total order for sorting purposes: nan compares greater than
        // everything and equal to itself.
        Ok(match x.cmp_partial(y) {
            Some(ord) => ord,
            None => match (x.is_nan(), y.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                _ => Ordering::Less,
            },
        })
    }

    unsafe fn copyswap_n(
        &self,
        dst: *mut u8,
        dstride: isize,
        src: *const u8,
        sstride: isize,
        n: usize,
        swap: bool,
    ) {
        let size = std::mem::size_of::<T>();
        let mut dp = dst;
        let mut sp = src;
        for _ in 0..n {
            if swap {
                if T::SWAP_HALVES {
                    let half = size / 2;
                    for k in 0..half {
                        dp.add(k).write(sp.add(half - 1 - k).read());
                        dp.add(half + k).write(sp.add(size - 1 - k).read());
                    }
                } else {
                    for k in 0..size {
                        dp.add(k).write(sp.add(size - 1 - k).read());
                    }
                }
            } else {
                std::ptr::copy_nonoverlapping(sp, dp, size);
            }
            dp = dp.offset(dstride);
            sp = sp.offset(sstride);
        }
    }

    fn get_item(&self, bytes: &[u8]) -> Result<Value> {
        if bytes.len() < std::mem::size_of::<T>() {
            return Err(ArrayError::ScalarConversion(T::NAME));
        }
        Ok(unsafe { T::load(bytes.as_ptr()) }.to_value())
    }

    fn set_item(&self, value: &Value, bytes: &mut [u8]) -> Result<()> {
        if bytes.len() < std::mem::size_of::<T>() {
            return Err(ArrayError::ScalarConversion(T::NAME));
        }
        let converted = self.coerce(value)?;
        unsafe { converted.store(bytes.as_mut_ptr()) };
        Ok(())
    }

    unsafe fn reduce(
        &self,
        op: ReduceOp,
        src: *const u8,
        sstride: isize,
        n: usize,
        acc: *mut u8,
    ) -> Result<()> {
        let mut a = T::load(acc);
        let mut sp = src;
        match op {
            ReduceOp::Sum => {
                for _ in 0..n {
                    a = a.add(T::load(sp));
                    sp = sp.offset(sstride);
                }
            }
            ReduceOp::Prod => {
                for _ in 0..n {
                    a = a.mul(T::load(sp));
                    sp = sp.offset(sstride);
                }
            }
            ReduceOp::Min => {
                for _ in 0..n {
                    let x = T::load(sp);
                    if x.is_nan() || matches!(x.cmp_partial(a), Some(Ordering::Less)) {
                        a = x;
                    }
                    sp = sp.offset(sstride);
                }
            }
            ReduceOp::Max => {
                for _ in 0..n {
                    let x = T::load(sp);
                    if x.is_nan() || matches!(x.cmp_partial(a), Some(Ordering::Greater)) {
                        a = x;
                    }
                    sp = sp.offset(sstride);
                }
            }
            ReduceOp::Or => {
                let mut t = a.is_truthy();
                for _ in 0..n {
                    t = t || T::load(sp).is_truthy();
                    sp = sp.offset(sstride);
                }
                a = if t { T::one() } else { T::zero() };
            }
            ReduceOp::And => {
                let mut t = a.is_truthy();
                for _ in 0..n {
                    t = t && T::load(sp).is_truthy();
                    sp = sp.offset(sstride);
                }
                a = if t { T::one() } else { T::zero() };
            }
        }
        a.store(acc);
        Ok(())
    }

    unsafe fn accumulate(
        &self,
        op: ReduceOp,
        src: *const u8,
        sstride: isize,
        dst: *mut u8,
        dstride: isize,
        n: usize,
    ) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        let mut sp = src;
        let mut dp = dst;
        let mut a = T::load(sp);
        a.store(dp);
        for _ in 1..n {
            sp = sp.offset(sstride);
            dp = dp.offset(dstride);
            let x = T::load(sp);
            a = match op {
                ReduceOp::Sum => a.add(x),
                ReduceOp::Prod => a.mul(x),
                _ => {
                    return Err(ArrayError::MissingTypeOp {
                        dtype: T::NAME,
                        op: "accumulate",
                    })
                }
            };
            a.store(dp);
        }
        Ok(())
    }

    unsafe fn argminmax(
        &self,
        src: *const u8,
        sstride: isize,
        n: usize,
        want_max: bool,
    ) -> Result<usize> {
        let mut best = T::load(src);
        let mut best_idx = 0usize;
        let mut sp = src;
        let target = if want_max {
            Ordering::Greater
        } else {
            Ordering::Less
        };
        for k in 1..n {
            sp = sp.offset(sstride);
            let x = T::load(sp);
            // Strict comparison only: a nan never displaces the running
            // extremum unless it came first.
            if matches!(x.cmp_partial(best), Some(ord) if ord == target) {
                best = x;
                best_idx = k;
            }
        }
        Ok(best_idx)
    }

    unsafe fn binary(
        &self,
        op: BinOp,
        a: *const u8,
        astride: isize,
        b: *const u8,
        bstride: isize,
        dst: *mut u8,
        dstride: isize,
        n: usize,
    ) -> Result<()> {
        let mut ap = a;
        let mut bp = b;
        let mut dp = dst;
        for _ in 0..n {
            let x = T::load(ap);
            let y = T::load(bp);
            let r = match op {
                // min/max propagate nan from either side.
                BinOp::Min => {
                    if x.is_nan() {
                        x
                    } else if y.is_nan() || matches!(y.cmp_partial(x), Some(Ordering::Less)) {
                        y
                    } else {
                        x
                    }
                }
                BinOp::Max => {
                    if x.is_nan() {
                        x
                    } else if y.is_nan() || matches!(y.cmp_partial(x), Some(Ordering::Greater)) {
                        y
                    } else {
                        x
                    }
                }
                BinOp::Sub => x.sub(y),
            };
            r.store(dp);
            ap = ap.offset(astride);
            bp = bp.offset(bstride);
            dp = dp.offset(dstride);
        }
        Ok(())
    }

    unsafe fn fast_clip(
        &self,
        src: *const u8,
        sstride: isize,
        lo: Option<&Value>,
        hi: Option<&Value>,
        dst: *mut u8,
        dstride: isize,
        n: usize,
    ) -> Result<()> {
        let lo = lo.map(|v| self.coerce(v)).transpose()?;
        let hi = hi.map(|v| self.coerce(v)).transpose()?;
        let mut sp = src;
        let mut dp = dst;
        for _ in 0..n {
            let mut x = T::load(sp);
            if let Some(lo) = lo {
                if matches!(x.cmp_partial(lo), Some(Ordering::Less)) {
                    x = lo;
                }
            }
            if let Some(hi) = hi {
                if matches!(x.cmp_partial(hi), Some(Ordering::Greater)) {
                    x = hi;
                }
            }
            x.store(dp);
            sp = sp.offset(sstride);
            dp = dp.offset(dstride);
        }
        Ok(())
    }

    unsafe fn round(
        &self,
        src: *const u8,
        sstride: isize,
        dst: *mut u8,
        dstride: isize,
        n: usize,
        decimals: i32,
    ) -> Result<()> {
        let mut sp = src;
        let mut dp = dst;
        for _ in 0..n {
            T::load(sp).round_decimals(decimals).store(dp);
            sp = sp.offset(sstride);
            dp = dp.offset(dstride);
        }
        Ok(())
    }

    unsafe fn dot(
        &self,
        a: *const u8,
        astride: isize,
        b: *const u8,
        bstride: isize,
        n: usize,
    ) -> Result<Value> {
        let mut acc = T::zero();
        let mut ap = a;
        let mut bp = b;
        for _ in 0..n {
            acc = acc.add(T::load(ap).mul(T::load(bp)));
            ap = ap.offset(astride);
            bp = bp.offset(bstride);
        }
        Ok(acc.to_value())
    }

    unsafe fn sum_wide(&self, src: *const u8, sstride: isize, n: usize) -> Result<Complex64> {
        let mut acc = Complex64::new(0.0, 0.0);
        let mut sp = src;
        for _ in 0..n {
            acc += T::load(sp).to_c128();
            sp = sp.offset(sstride);
        }
        Ok(acc)
    }

    unsafe fn sum_sq_dev(
        &self,
        src: *const u8,
        sstride: isize,
        n: usize,
        mean: Complex64,
    ) -> Result<f64> {
        let mut acc = 0.0f64;
        let mut sp = src;
        for _ in 0..n {
            let d = T::load(sp).to_c128() - mean;
            acc += d.norm_sqr();
            sp = sp.offset(sstride);
        }
        Ok(acc)
    }

    unsafe fn div_count(
        &self,
        dst: *mut u8,
        dstride: isize,
        n: usize,
        count: usize,
    ) -> Result<()> {
        let mut dp = dst;
        for _ in 0..n {
            T::load(dp).div_count(count).store(dp);
            dp = dp.offset(dstride);
        }
        Ok(())
    }
}

// ============================================================================
// Flexible and structured function tables
// ============================================================================

/// Min/max fold for flexible elements, driven through the table's own
/// `compare`.
///
/// # Safety
/// Same addressing contract as the `TypeOps` pointer methods.
unsafe fn reduce_minmax_by_compare(
    ops: &dyn TypeOps,
    size: usize,
    op: ReduceOp,
    src: *const u8,
    sstride: isize,
    n: usize,
    acc: *mut u8,
) -> Result<()> {
    let target = match op {
        ReduceOp::Min => Ordering::Less,
        ReduceOp::Max => Ordering::Greater,
        _ => {
            return Err(ArrayError::MissingTypeOp {
                dtype: ops.type_name(),
                op: "reduce",
            })
        }
    };
    let mut sp = src;
    for _ in 0..n {
        let elem = std::slice::from_raw_parts(sp, size);
        let best = std::slice::from_raw_parts(acc as *const u8, size);
        if ops.compare(elem, best)? == target {
            std::ptr::copy_nonoverlapping(sp, acc, size);
        }
        sp = sp.offset(sstride);
    }
    Ok(())
}

/// # Safety
/// Same addressing contract as the `TypeOps` pointer methods; `n >= 1`.
unsafe fn argminmax_by_compare(
    ops: &dyn TypeOps,
    size: usize,
    src: *const u8,
    sstride: isize,
    n: usize,
    want_max: bool,
) -> Result<usize> {
    let target = if want_max {
        Ordering::Greater
    } else {
        Ordering::Less
    };
    let mut best = src;
    let mut best_idx = 0usize;
    let mut sp = src;
    for k in 1..n {
        sp = sp.offset(sstride);
        let elem = std::slice::from_raw_parts(sp, size);
        let current = std::slice::from_raw_parts(best, size);
        if ops.compare(elem, current)? == target {
            best = sp;
            best_idx = k;
        }
    }
    Ok(best_idx)
}

struct BytesOps {
    size: usize,
}

impl TypeOps for BytesOps {
    fn type_name(&self) -> &'static str {
        "bytes"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Result<Ordering> {
        Ok(a[..self.size.min(a.len())].cmp(&b[..self.size.min(b.len())]))
    }

    unsafe fn reduce(
        &self,
        op: ReduceOp,
        src: *const u8,
        sstride: isize,
        n: usize,
        acc: *mut u8,
    ) -> Result<()> {
        reduce_minmax_by_compare(self, self.size, op, src, sstride, n, acc)
    }

    unsafe fn argminmax(
        &self,
        src: *const u8,
        sstride: isize,
        n: usize,
        want_max: bool,
    ) -> Result<usize> {
        argminmax_by_compare(self, self.size, src, sstride, n, want_max)
    }

    unsafe fn copyswap_n(
        &self,
        dst: *mut u8,
        dstride: isize,
        src: *const u8,
        sstride: isize,
        n: usize,
        _swap: bool,
    ) {
        copy_opaque(dst, dstride, src, sstride, n, self.size);
    }

    fn get_item(&self, bytes: &[u8]) -> Result<Value> {
        let raw = &bytes[..self.size.min(bytes.len())];
        let end = raw.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
        Ok(Value::Bytes(raw[..end].to_vec()))
    }

    fn set_item(&self, value: &Value, bytes: &mut [u8]) -> Result<()> {
        let Value::Bytes(data) = value else {
            return Err(ArrayError::ScalarConversion("bytes"));
        };
        if bytes.len() < self.size {
            return Err(ArrayError::ScalarConversion("bytes"));
        }
        let dst = &mut bytes[..self.size];
        let n = data.len().min(self.size);
        dst[..n].copy_from_slice(&data[..n]);
        dst[n..].fill(0);
        Ok(())
    }
}

struct UnicodeOps {
    /// In bytes: 4 per UCS-4 code point.
    size: usize,
}

impl UnicodeOps {
    fn decode(&self, bytes: &[u8]) -> Vec<u32> {
        bytes[..self.size.min(bytes.len())]
            .chunks_exact(4)
            .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }
}

impl TypeOps for UnicodeOps {
    fn type_name(&self) -> &'static str {
        "unicode"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Result<Ordering> {
        Ok(self.decode(a).cmp(&self.decode(b)))
    }

    unsafe fn reduce(
        &self,
        op: ReduceOp,
        src: *const u8,
        sstride: isize,
        n: usize,
        acc: *mut u8,
    ) -> Result<()> {
        reduce_minmax_by_compare(self, self.size, op, src, sstride, n, acc)
    }

    unsafe fn argminmax(
        &self,
        src: *const u8,
        sstride: isize,
        n: usize,
        want_max: bool,
    ) -> Result<usize> {
        argminmax_by_compare(self, self.size, src, sstride, n, want_max)
    }

    unsafe fn copyswap_n(
        &self,
        dst: *mut u8,
        dstride: isize,
        src: *const u8,
        sstride: isize,
        n: usize,
        swap: bool,
    ) {
        if !swap {
            copy_opaque(dst, dstride, src, sstride, n, self.size);
            return;
        }
        // Swap each 4-byte code point.
        let mut dp = dst;
        let mut sp = src;
        for _ in 0..n {
            for c in (0..self.size).step_by(4) {
                for k in 0..4 {
                    dp.add(c + k).write(sp.add(c + 3 - k).read());
                }
            }
            dp = dp.offset(dstride);
            sp = sp.offset(sstride);
        }
    }

    fn get_item(&self, bytes: &[u8]) -> Result<Value> {
        let points = self.decode(bytes);
        let end = points.iter().rposition(|&p| p != 0).map_or(0, |p| p + 1);
        let text: String = points[..end]
            .iter()
            .map(|&p| char::from_u32(p).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();
        Ok(Value::Str(text))
    }

    fn set_item(&self, value: &Value, bytes: &mut [u8]) -> Result<()> {
        let Value::Str(text) = value else {
            return Err(ArrayError::ScalarConversion("unicode"));
        };
        if bytes.len() < self.size {
            return Err(ArrayError::ScalarConversion("unicode"));
        }
        let capacity = self.size / 4;
        let dst = &mut bytes[..self.size];
        dst.fill(0);
        for (slot, ch) in text.chars().take(capacity).enumerate() {
            dst[slot * 4..slot * 4 + 4].copy_from_slice(&(ch as u32).to_ne_bytes());
        }
        Ok(())
    }
}

struct StructOps {
    fields: Vec<Field>,
    size: usize,
}

impl TypeOps for StructOps {
    fn type_name(&self) -> &'static str {
        "structured"
    }

    unsafe fn copyswap_n(
        &self,
        dst: *mut u8,
        dstride: isize,
        src: *const u8,
        sstride: isize,
        n: usize,
        swap: bool,
    ) {
        if !swap {
            copy_opaque(dst, dstride, src, sstride, n, self.size);
            return;
        }
        let mut dp = dst;
        let mut sp = src;
        for _ in 0..n {
            for field in &self.fields {
                field.dtype.ops().copyswap_n(
                    dp.add(field.offset),
                    0,
                    sp.add(field.offset),
                    0,
                    1,
                    true,
                );
            }
            dp = dp.offset(dstride);
            sp = sp.offset(sstride);
        }
    }

    fn get_item(&self, bytes: &[u8]) -> Result<Value> {
        let mut record = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let raw = &bytes[field.offset..field.offset + field.dtype.size()];
            record.push((field.name.clone(), field.dtype.ops().get_item(raw)?));
        }
        Ok(Value::Record(record))
    }

    fn set_item(&self, value: &Value, bytes: &mut [u8]) -> Result<()> {
        let Value::Record(entries) = value else {
            return Err(ArrayError::ScalarConversion("structured"));
        };
        for (name, entry) in entries {
            let field = self
                .fields
                .iter()
                .find(|f| f.name == *name)
                .ok_or(ArrayError::ScalarConversion("structured"))?;
            let raw = &mut bytes[field.offset..field.offset + field.dtype.size()];
            field.dtype.ops().set_item(entry, raw)?;
        }
        Ok(())
    }
}

/// Bit-pattern element with no further semantics (subarray storage).
struct OpaqueOps {
    name: &'static str,
    size: usize,
}

impl TypeOps for OpaqueOps {
    fn type_name(&self) -> &'static str {
        self.name
    }

    unsafe fn copyswap_n(
        &self,
        dst: *mut u8,
        dstride: isize,
        src: *const u8,
        sstride: isize,
        n: usize,
        _swap: bool,
    ) {
        copy_opaque(dst, dstride, src, sstride, n, self.size);
    }
}

/// Lattice-only type: participates in casting/promotion but has no storage.
struct ObjectOps;

impl TypeOps for ObjectOps {
    fn type_name(&self) -> &'static str {
        "object"
    }

    unsafe fn copyswap_n(
        &self,
        _dst: *mut u8,
        _dstride: isize,
        _src: *const u8,
        _sstride: isize,
        _n: usize,
        _swap: bool,
    ) {
        // Object storage cannot be constructed, so there is nothing to copy.
    }
}

unsafe fn copy_opaque(
    dst: *mut u8,
    dstride: isize,
    src: *const u8,
    sstride: isize,
    n: usize,
    size: usize,
) {
    let mut dp = dst;
    let mut sp = src;
    for _ in 0..n {
        std::ptr::copy_nonoverlapping(sp, dp, size);
        dp = dp.offset(dstride);
        sp = sp.offset(sstride);
    }
}

// ============================================================================
// Table construction
// ============================================================================

pub(crate) fn builtin_ops(id: TypeId) -> Arc<dyn TypeOps> {
    match id {
        TypeId::Bool => Arc::new(NumOps::<bool>(PhantomData)),
        TypeId::UInt8 => Arc::new(NumOps::<u8>(PhantomData)),
        TypeId::UInt16 => Arc::new(NumOps::<u16>(PhantomData)),
        TypeId::UInt32 => Arc::new(NumOps::<u32>(PhantomData)),
        TypeId::UInt64 => Arc::new(NumOps::<u64>(PhantomData)),
        TypeId::Int8 => Arc::new(NumOps::<i8>(PhantomData)),
        TypeId::Int16 => Arc::new(NumOps::<i16>(PhantomData)),
        TypeId::Int32 => Arc::new(NumOps::<i32>(PhantomData)),
        TypeId::Int64 => Arc::new(NumOps::<i64>(PhantomData)),
        TypeId::Float16 => Arc::new(NumOps::<f16>(PhantomData)),
        TypeId::Float32 => Arc::new(NumOps::<f32>(PhantomData)),
        TypeId::Float64 => Arc::new(NumOps::<f64>(PhantomData)),
        TypeId::Complex64 => Arc::new(NumOps::<Complex32>(PhantomData)),
        TypeId::Complex128 => Arc::new(NumOps::<Complex64>(PhantomData)),
        TypeId::Bytes => Arc::new(BytesOps { size: 0 }),
        TypeId::Unicode => Arc::new(UnicodeOps { size: 0 }),
        TypeId::Structured => Arc::new(OpaqueOps {
            name: "structured",
            size: 0,
        }),
        TypeId::Object => Arc::new(ObjectOps),
    }
}

pub(crate) fn flexible_ops(id: TypeId, size: usize) -> Arc<dyn TypeOps> {
    match id {
        TypeId::Bytes => Arc::new(BytesOps { size }),
        TypeId::Unicode => Arc::new(UnicodeOps { size }),
        other => builtin_ops(other),
    }
}

pub(crate) fn structured_ops(fields: Vec<Field>, size: usize) -> Arc<dyn TypeOps> {
    Arc::new(StructOps { fields, size })
}

pub(crate) fn opaque_ops(name: &'static str, size: usize) -> Arc<dyn TypeOps> {
    Arc::new(OpaqueOps { name, size })
}

pub(crate) fn builtin_alignment(id: TypeId) -> usize {
    match id {
        TypeId::Bool | TypeId::UInt8 | TypeId::Int8 | TypeId::Bytes => 1,
        TypeId::UInt16 | TypeId::Int16 | TypeId::Float16 => 2,
        TypeId::UInt32 | TypeId::Int32 | TypeId::Float32 | TypeId::Unicode => 4,
        TypeId::UInt64 | TypeId::Int64 | TypeId::Float64 | TypeId::Complex64 => {
            std::mem::align_of::<u64>()
        }
        TypeId::Complex128 => std::mem::align_of::<Complex64>(),
        TypeId::Structured | TypeId::Object => 1,
    }
}

// ============================================================================
// Casting loops
// ============================================================================

macro_rules! dispatch_numeric {
    ($id:expr, $T:ident => $body:expr, $fallback:expr) => {
        match $id {
            TypeId::Bool => {
                type $T = bool;
                $body
            }
            TypeId::UInt8 => {
                type $T = u8;
                $body
            }
            TypeId::UInt16 => {
                type $T = u16;
                $body
            }
            TypeId::UInt32 => {
                type $T = u32;
                $body
            }
            TypeId::UInt64 => {
                type $T = u64;
                $body
            }
            TypeId::Int8 => {
                type $T = i8;
                $body
            }
            TypeId::Int16 => {
                type $T = i16;
                $body
            }
            TypeId::Int32 => {
                type $T = i32;
                $body
            }
            TypeId::Int64 => {
                type $T = i64;
                $body
            }
            TypeId::Float16 => {
                type $T = f16;
                $body
            }
            TypeId::Float32 => {
                type $T = f32;
                $body
            }
            TypeId::Float64 => {
                type $T = f64;
                $body
            }
            TypeId::Complex64 => {
                type $T = Complex32;
                $body
            }
            TypeId::Complex128 => {
                type $T = Complex64;
                $body
            }
            _ => $fallback,
        }
    };
}

unsafe fn cast_numeric_from<S: Scalar>(
    dst_id: TypeId,
    src: *const u8,
    sstride: isize,
    dst: *mut u8,
    dstride: isize,
    n: usize,
) -> Result<()> {
    dispatch_numeric!(dst_id, D => {
        cast_loop::<S, D>(src, sstride, dst, dstride, n);
        Ok(())
    }, Err(ArrayError::CastNotAllowed {
        from: S::NAME,
        to: dst_id.name(),
        rule: crate::Casting::Unsafe,
    }))
}

unsafe fn cast_loop<S: Scalar, D: Scalar>(
    src: *const u8,
    sstride: isize,
    dst: *mut u8,
    dstride: isize,
    n: usize,
) {
    let mut sp = src;
    let mut dp = dst;
    for _ in 0..n {
        D::from_wide(S::load(sp).to_wide()).store(dp);
        sp = sp.offset(sstride);
        dp = dp.offset(dstride);
    }
}

/// Render a numeric scalar the way string-typed destinations store it.
pub(crate) fn format_scalar(value: &Value) -> String {
    match value {
        Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
        Value::U8(v) => v.to_string(),
        Value::U16(v) => v.to_string(),
        Value::U32(v) => v.to_string(),
        Value::U64(v) => v.to_string(),
        Value::I8(v) => v.to_string(),
        Value::I16(v) => v.to_string(),
        Value::I32(v) => v.to_string(),
        Value::I64(v) => v.to_string(),
        Value::F16(v) => format!("{:?}", v.to_f64()),
        Value::F32(v) => format!("{:?}", *v as f64),
        Value::F64(v) => format!("{v:?}"),
        Value::C64(v) => format!("({:?}+{:?}j)", v.re as f64, v.im as f64),
        Value::C128(v) => format!("({:?}+{:?}j)", v.re, v.im),
        Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        Value::Str(s) => s.clone(),
        Value::Record(_) => String::new(),
    }
}

fn parse_scalar(text: &str, dst_id: TypeId) -> Result<Wide> {
    let trimmed = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    let err = || ArrayError::ScalarConversion(dst_id.name());
    match dst_id.kind() {
        crate::dtype::Kind::Bool
        | crate::dtype::Kind::Unsigned
        | crate::dtype::Kind::Signed => {
            if let Ok(i) = trimmed.parse::<i128>() {
                return Ok(Wide::Int(i));
            }
            let f = trimmed.parse::<f64>().map_err(|_| err())?;
            Ok(Wide::Float(f))
        }
        _ => {
            let f = trimmed.parse::<f64>().map_err(|_| err())?;
            Ok(Wide::Float(f))
        }
    }
}

/// Elementwise conversion of `n` elements from `src_dtype` to `dst_dtype`.
///
/// Both buffers must already be native byte order; the view layer swaps
/// non-native sources into scratch before casting.
///
/// # Safety
/// Every address `ptr + k * stride` for `k < n` must be in bounds for its
/// buffer, and source and destination must not overlap.
pub(crate) unsafe fn cast_strided(
    src_dtype: &crate::DType,
    dst_dtype: &crate::DType,
    src: *const u8,
    sstride: isize,
    dst: *mut u8,
    dstride: isize,
    n: usize,
) -> Result<()> {
    let (Some(sid), Some(did)) = (src_dtype.type_id(), dst_dtype.type_id()) else {
        // User-defined types convert only between equivalent layouts.
        if src_dtype.is_equiv(dst_dtype) {
            src_dtype.ops().copyswap_n(dst, dstride, src, sstride, n, false);
            return Ok(());
        }
        return Err(ArrayError::CastNotAllowed {
            from: src_dtype.name(),
            to: dst_dtype.name(),
            rule: crate::Casting::Unsafe,
        });
    };

    if src_dtype.is_numeric() && dst_dtype.is_numeric() {
        if sid == did {
            src_dtype.ops().copyswap_n(dst, dstride, src, sstride, n, false);
            return Ok(());
        }
        if contiguous_pair(src_dtype, dst_dtype, sstride, dstride)
            && n >= crate::MIN_PARALLEL_LENGTH
        {
            return cast_numeric_parallel(sid, did, src, sstride, dst, dstride, n);
        }
        return dispatch_numeric!(sid, S => cast_numeric_from::<S>(did, src, sstride, dst, dstride, n),
            unreachable_cast(src_dtype, dst_dtype));
    }

    match (sid, did) {
        // Within and between the flexible kinds.
        (TypeId::Bytes | TypeId::Unicode, TypeId::Bytes | TypeId::Unicode) => {
            cast_flexible(src_dtype, dst_dtype, src, sstride, dst, dstride, n)
        }
        // Numeric source into a string destination: formatted repr.
        (_, TypeId::Bytes | TypeId::Unicode) if src_dtype.is_numeric() => {
            let elsize = src_dtype.size();
            let mut sp = src;
            let mut dp = dst;
            for _ in 0..n {
                let raw = std::slice::from_raw_parts(sp, elsize);
                let text = format_scalar(&src_dtype.ops().get_item(raw)?);
                let out = std::slice::from_raw_parts_mut(dp, dst_dtype.size());
                let boxed = if did == TypeId::Bytes {
                    Value::Bytes(text.into_bytes())
                } else {
                    Value::Str(text)
                };
                dst_dtype.ops().set_item(&boxed, out)?;
                sp = sp.offset(sstride);
                dp = dp.offset(dstride);
            }
            Ok(())
        }
        // String source into a numeric destination: parsed.
        (TypeId::Bytes | TypeId::Unicode, _) if dst_dtype.is_numeric() => {
            let elsize = src_dtype.size();
            let mut sp = src;
            let mut dp = dst;
            for _ in 0..n {
                let raw = std::slice::from_raw_parts(sp, elsize);
                let text = match src_dtype.ops().get_item(raw)? {
                    Value::Bytes(b) => String::from_utf8_lossy(&b).into_owned(),
                    Value::Str(s) => s,
                    _ => String::new(),
                };
                let wide = parse_scalar(&text, did)?;
                dispatch_numeric!(did, D => {
                    D::from_wide(wide).store(dp);
                }, return unreachable_cast(src_dtype, dst_dtype));
                sp = sp.offset(sstride);
                dp = dp.offset(dstride);
            }
            Ok(())
        }
        // Structured/object only convert to an equivalent layout.
        _ if src_dtype.is_equiv(dst_dtype) => {
            src_dtype.ops().copyswap_n(dst, dstride, src, sstride, n, false);
            Ok(())
        }
        _ => Err(ArrayError::CastNotAllowed {
            from: src_dtype.name(),
            to: dst_dtype.name(),
            rule: crate::Casting::Unsafe,
        }),
    }
}

fn unreachable_cast(src: &crate::DType, dst: &crate::DType) -> Result<()> {
    Err(ArrayError::CastNotAllowed {
        from: src.name(),
        to: dst.name(),
        rule: crate::Casting::Unsafe,
    })
}

fn contiguous_pair(
    src_dtype: &crate::DType,
    dst_dtype: &crate::DType,
    sstride: isize,
    dstride: isize,
) -> bool {
    sstride == src_dtype.size() as isize && dstride == dst_dtype.size() as isize
}

unsafe fn cast_numeric_parallel(
    sid: TypeId,
    did: TypeId,
    src: *const u8,
    sstride: isize,
    dst: *mut u8,
    dstride: isize,
    n: usize,
) -> Result<()> {
    let sp = crate::threading::SendConstPtr(src);
    let dp = crate::threading::SendMutPtr(dst);
    crate::threading::run_split(n, &|start, len| {
        // Capture the whole Send wrappers, not their raw-pointer fields, so the
        // closure stays `Sync` under 2021 disjoint closure captures.
        let (sp, dp) = (sp, dp);
        // Disjoint element ranges: every split task owns its own span.
        unsafe {
            let src_at = sp.0.offset(start as isize * sstride);
            let dst_at = dp.0.offset(start as isize * dstride);
            dispatch_numeric!(sid, S => {
                let _ = cast_numeric_from::<S>(did, src_at, sstride, dst_at, dstride, len);
            }, ());
        }
    });
    Ok(())
}

unsafe fn cast_flexible(
    src_dtype: &crate::DType,
    dst_dtype: &crate::DType,
    src: *const u8,
    sstride: isize,
    dst: *mut u8,
    dstride: isize,
    n: usize,
) -> Result<()> {
    let mut sp = src;
    let mut dp = dst;
    for _ in 0..n {
        let raw = std::slice::from_raw_parts(sp, src_dtype.size());
        let item = src_dtype.ops().get_item(raw)?;
        let out = std::slice::from_raw_parts_mut(dp, dst_dtype.size());
        let converted = match (item, dst_dtype.type_id()) {
            (Value::Bytes(b), Some(TypeId::Unicode)) => {
                Value::Str(b.iter().map(|&c| c as char).collect())
            }
            (Value::Str(s), Some(TypeId::Bytes)) => {
                Value::Bytes(s.chars().map(|c| c as u32 as u8).collect())
            }
            (other, _) => other,
        };
        dst_dtype.ops().set_item(&converted, out)?;
        sp = sp.offset(sstride);
        dp = dp.offset(dstride);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_half_even() {
        assert_eq!(round_half_even(0.5, 0), 0.0);
        assert_eq!(round_half_even(1.5, 0), 2.0);
        assert_eq!(round_half_even(2.5, 0), 2.0);
        assert_eq!(round_half_even(-0.5, 0), 0.0);
        assert_eq!(round_half_even(1.25, 1), 1.2);
        assert_eq!(round_half_even(125.0, -1), 120.0);
        assert_eq!(round_half_even(1.7, 0), 2.0);
    }

    #[test]
    fn test_int_wrap_and_float_saturate() {
        assert_eq!(u8::from_wide(Wide::Int(300)), 44);
        assert_eq!(i8::from_wide(Wide::Int(-200)), 56);
        assert_eq!(u8::from_wide(Wide::Float(1e9)), 255);
        assert_eq!(i16::from_wide(Wide::Float(-1e9)), i16::MIN);
    }

    #[test]
    fn test_bool_sum_is_logical_or() {
        let a = true.add(true);
        assert!(a);
        let b = false.add(false);
        assert!(!b);
    }

    #[test]
    fn test_complex_lexicographic_compare() {
        let a = Complex64::new(1.0, 5.0);
        let b = Complex64::new(1.0, 7.0);
        assert_eq!(a.cmp_partial(b), Some(Ordering::Less));
        let c = Complex64::new(2.0, 0.0);
        assert_eq!(a.cmp_partial(c), Some(Ordering::Less));
    }

    #[test]
    fn test_copyswap_reverses_bytes() {
        let ops = builtin_ops(TypeId::UInt32);
        let src = 0x0102_0304u32.to_ne_bytes();
        let mut dst = [0u8; 4];
        unsafe {
            ops.copyswap_n(dst.as_mut_ptr(), 4, src.as_ptr(), 4, 1, true);
        }
        assert_eq!(u32::from_ne_bytes(dst), 0x0403_0201);
    }

    #[test]
    fn test_complex_copyswap_swaps_halves() {
        let ops = builtin_ops(TypeId::Complex64);
        let mut src = [0u8; 8];
        src[..4].copy_from_slice(&[1, 2, 3, 4]);
        src[4..].copy_from_slice(&[5, 6, 7, 8]);
        let mut dst = [0u8; 8];
        unsafe {
            ops.copyswap_n(dst.as_mut_ptr(), 8, src.as_ptr(), 8, 1, true);
        }
        assert_eq!(&dst[..4], &[4, 3, 2, 1]);
        assert_eq!(&dst[4..], &[8, 7, 6, 5]);
    }

    #[test]
    fn test_cast_strided_int_to_float() {
        let src: Vec<i32> = vec![1, -2, 3];
        let mut dst = vec![0.0f64; 3];
        unsafe {
            cast_strided(
                &crate::DType::int32(),
                &crate::DType::float64(),
                src.as_ptr() as *const u8,
                4,
                dst.as_mut_ptr() as *mut u8,
                8,
                3,
            )
            .unwrap();
        }
        assert_eq!(dst, vec![1.0, -2.0, 3.0]);
    }

    #[test]
    fn test_cast_strided_negative_stride() {
        let src: Vec<i16> = vec![10, 20, 30];
        let mut dst = vec![0i64; 3];
        unsafe {
            // Walk the source backwards from its last element.
            cast_strided(
                &crate::DType::int16(),
                &crate::DType::int64(),
                (src.as_ptr() as *const u8).add(4),
                -2,
                dst.as_mut_ptr() as *mut u8,
                8,
                3,
            )
            .unwrap();
        }
        assert_eq!(dst, vec![30, 20, 10]);
    }

    #[test]
    fn test_string_to_numeric_parse() {
        let d = crate::DType::bytes(4);
        let mut raw = vec![0u8; 4];
        d.ops().set_item(&Value::Bytes(b"42".to_vec()), &mut raw).unwrap();
        let mut out = 0i32;
        unsafe {
            cast_strided(
                &d,
                &crate::DType::int32(),
                raw.as_ptr(),
                4,
                &mut out as *mut i32 as *mut u8,
                4,
                1,
            )
            .unwrap();
        }
        assert_eq!(out, 42);
    }

    #[test]
    fn test_reduce_min_propagates_nan() {
        let ops = builtin_ops(TypeId::Float64);
        let src = [1.0f64, f64::NAN, 3.0];
        let mut acc = src[0];
        unsafe {
            ops.reduce(
                ReduceOp::Min,
                src.as_ptr() as *const u8,
                8,
                3,
                &mut acc as *mut f64 as *mut u8,
            )
            .unwrap();
        }
        assert!(acc.is_nan());
    }

    #[test]
    fn test_argminmax_first_wins() {
        let ops = builtin_ops(TypeId::Int32);
        let src = [3i32, 7, 7, 1, 1];
        unsafe {
            let imax = ops
                .argminmax(src.as_ptr() as *const u8, 4, 5, true)
                .unwrap();
            let imin = ops
                .argminmax(src.as_ptr() as *const u8, 4, 5, false)
                .unwrap();
            assert_eq!(imax, 1);
            assert_eq!(imin, 3);
        }
    }
}

//! Axis reductions.
//!
//! Every entry point takes `(array, axis, [rtype,] out)`. `axis: None`
//! flattens to a single pass over the raveled array; a negative axis counts
//! from the end. The reduction itself drives an all-axes-but-one iterator
//! over the source and applies the descriptor's kernel along the excluded
//! axis, writing one element of the result per outer position, in row-major
//! order.
//!
//! Accumulator defaults follow the usual widening rules: sums and products
//! of bools and sub-64-bit integers accumulate in 64 bits, mean/std of
//! integral input resolve to `float64`. A caller-provided `out` must match
//! the result shape and dtype exactly and be a plain contiguous writeable
//! buffer; anything else is rejected before a single element is written.

use crate::dtype::{BinOp, Kind, ReduceOp, TypeId, Value};
use crate::iter::{ArrayIter, MultiIter};
use crate::view::StridedArray;
use crate::{ArrayError, Casting, DType, Result};

fn normalize_axis(axis: isize, rank: usize) -> Result<usize> {
    let adjusted = if axis < 0 { axis + rank as isize } else { axis };
    if adjusted < 0 || adjusted as usize >= rank {
        return Err(ArrayError::InvalidAxis { axis, rank });
    }
    Ok(adjusted as usize)
}

/// Normalize the axis argument: `None` collapses to one flat pass over the
/// raveled array. The returned array is in native byte order.
fn prepare(a: &StridedArray, axis: Option<isize>) -> Result<(StridedArray, usize)> {
    let work = a.to_native()?;
    match axis {
        None => Ok((work.ravel()?, 0)),
        Some(ax) => {
            let ax = normalize_axis(ax, work.ndim())?;
            Ok((work, ax))
        }
    }
}

fn shape_without(shape: &[usize], axis: usize) -> Vec<usize> {
    shape
        .iter()
        .enumerate()
        .filter(|(d, _)| *d != axis)
        .map(|(_, &n)| n)
        .collect()
}

/// Validate a caller-provided output array, or allocate a fresh one.
fn make_out(
    out: Option<&StridedArray>,
    shape: &[usize],
    dtype: &DType,
) -> Result<StridedArray> {
    match out {
        None => StridedArray::empty(shape, dtype.clone()),
        Some(o) => {
            if o.shape() != shape {
                return Err(ArrayError::OutputMismatch("wrong shape"));
            }
            if !o.dtype().is_equiv(dtype) {
                return Err(ArrayError::OutputMismatch("wrong dtype"));
            }
            if !o.flags().c_contiguous {
                return Err(ArrayError::OutputMismatch("not a contiguous buffer"));
            }
            o.ensure_writeable()?;
            Ok(o.clone())
        }
    }
}

/// Widened accumulator for sums and products.
fn default_accumulator(dtype: &DType) -> DType {
    match dtype.kind() {
        Kind::Bool => DType::int64(),
        Kind::Signed if dtype.size() < 8 => DType::int64(),
        Kind::Unsigned if dtype.size() < 8 => DType::uint64(),
        _ => dtype.clone(),
    }
}

/// Result type for mean/std/var.
fn float_accumulator(dtype: &DType) -> DType {
    match dtype.kind() {
        Kind::Bool | Kind::Unsigned | Kind::Signed => DType::float64(),
        Kind::Complex => match dtype.type_id() {
            Some(TypeId::Complex64) => DType::float32(),
            _ => DType::float64(),
        },
        _ => dtype.clone(),
    }
}

fn identity(op: ReduceOp) -> Option<Value> {
    match op {
        ReduceOp::Sum => Some(Value::I64(0)),
        ReduceOp::Prod => Some(Value::I64(1)),
        ReduceOp::Or => Some(Value::Bool(false)),
        ReduceOp::And => Some(Value::Bool(true)),
        ReduceOp::Min | ReduceOp::Max => None,
    }
}

fn reduce_common(
    a: &StridedArray,
    axis: Option<isize>,
    dtype: DType,
    out: Option<&StridedArray>,
    op: ReduceOp,
    name: &'static str,
) -> Result<StridedArray> {
    // The kernels read native memory; a byte-swapped rtype gains nothing.
    let dtype = dtype.to_native();
    let (work, ax) = prepare(a, axis)?;
    let work = if work.dtype().is_equiv(&dtype) {
        work
    } else {
        work.cast_to(&dtype, Casting::Unsafe)?
    };
    let n = work.shape()[ax];
    let init = identity(op);
    if n == 0 && init.is_none() {
        return Err(ArrayError::EmptyReduction(name));
    }

    let result_shape = shape_without(work.shape(), ax);
    let result = make_out(out, &result_shape, &dtype)?;

    let ops = dtype.ops_arc();
    let elsize = dtype.size();
    let mut it = ArrayIter::all_but_axis(&work, ax)?;
    let stride = it.axis_stride();
    let mut dp = result.first_ptr();
    for _ in 0..it.size() {
        unsafe {
            match &init {
                Some(value) => {
                    let acc = std::slice::from_raw_parts_mut(dp, elsize);
                    ops.set_item(value, acc)?;
                }
                // Order-dependent reductions seed from the first element;
                // folding it back in is idempotent.
                None => ops.copyswap_n(dp, 0, it.data_ptr(), 0, 1, false),
            }
            ops.reduce(op, it.data_ptr(), stride, n, dp)?;
        }
        dp = dp.wrapping_add(elsize);
        it.next();
    }
    Ok(result)
}

/// Sum along an axis (flattened when `axis` is `None`).
pub fn sum(
    a: &StridedArray,
    axis: Option<isize>,
    rtype: Option<&DType>,
    out: Option<&StridedArray>,
) -> Result<StridedArray> {
    let dtype = rtype.cloned().unwrap_or_else(|| default_accumulator(a.dtype()));
    reduce_common(a, axis, dtype, out, ReduceOp::Sum, "sum")
}

/// Product along an axis.
pub fn product(
    a: &StridedArray,
    axis: Option<isize>,
    rtype: Option<&DType>,
    out: Option<&StridedArray>,
) -> Result<StridedArray> {
    let dtype = rtype.cloned().unwrap_or_else(|| default_accumulator(a.dtype()));
    reduce_common(a, axis, dtype, out, ReduceOp::Prod, "product")
}

/// Minimum along an axis; fails on a zero-length reduction axis.
pub fn min(
    a: &StridedArray,
    axis: Option<isize>,
    out: Option<&StridedArray>,
) -> Result<StridedArray> {
    reduce_common(a, axis, a.dtype().to_native(), out, ReduceOp::Min, "minimum")
}

/// Maximum along an axis; fails on a zero-length reduction axis.
pub fn max(
    a: &StridedArray,
    axis: Option<isize>,
    out: Option<&StridedArray>,
) -> Result<StridedArray> {
    reduce_common(a, axis, a.dtype().to_native(), out, ReduceOp::Max, "maximum")
}

/// Logical-or along an axis; result is boolean.
pub fn any(
    a: &StridedArray,
    axis: Option<isize>,
    out: Option<&StridedArray>,
) -> Result<StridedArray> {
    reduce_common(a, axis, DType::bool_(), out, ReduceOp::Or, "any")
}

/// Logical-and along an axis; result is boolean.
pub fn all(
    a: &StridedArray,
    axis: Option<isize>,
    out: Option<&StridedArray>,
) -> Result<StridedArray> {
    reduce_common(a, axis, DType::bool_(), out, ReduceOp::And, "all")
}

fn argminmax(
    a: &StridedArray,
    axis: Option<isize>,
    out: Option<&StridedArray>,
    want_max: bool,
) -> Result<StridedArray> {
    let name = if want_max { "argmax" } else { "argmin" };
    let (work, ax) = prepare(a, axis)?;
    let n = work.shape()[ax];
    if n == 0 {
        return Err(ArrayError::EmptyReduction(name));
    }

    let dtype = DType::int64();
    let result_shape = shape_without(work.shape(), ax);
    let result = make_out(out, &result_shape, &dtype)?;

    let ops = work.dtype().ops_arc();
    let mut it = ArrayIter::all_but_axis(&work, ax)?;
    let stride = it.axis_stride();
    let mut dp = result.first_ptr() as *mut i64;
    for _ in 0..it.size() {
        let idx = unsafe { ops.argminmax(it.data_ptr(), stride, n, want_max)? };
        unsafe { dp.write_unaligned(idx as i64) };
        dp = dp.wrapping_add(1);
        it.next();
    }
    Ok(result)
}

/// Index of the first minimum along an axis.
pub fn argmin(
    a: &StridedArray,
    axis: Option<isize>,
    out: Option<&StridedArray>,
) -> Result<StridedArray> {
    argminmax(a, axis, out, false)
}

/// Index of the first maximum along an axis.
pub fn argmax(
    a: &StridedArray,
    axis: Option<isize>,
    out: Option<&StridedArray>,
) -> Result<StridedArray> {
    argminmax(a, axis, out, true)
}

/// Arithmetic mean along an axis; integral input resolves to `float64`.
pub fn mean(
    a: &StridedArray,
    axis: Option<isize>,
    rtype: Option<&DType>,
    out: Option<&StridedArray>,
) -> Result<StridedArray> {
    let dtype = rtype
        .cloned()
        .unwrap_or_else(|| float_accumulator(a.dtype()))
        .to_native();
    let (_, ax) = prepare(a, axis)?;
    let n = if axis.is_none() {
        a.size()
    } else {
        a.shape()[ax]
    };
    let result = reduce_common(a, axis, dtype.clone(), out, ReduceOp::Sum, "mean")?;
    if n == 0 {
        result.fill(&Value::F64(f64::NAN))?;
        return Ok(result);
    }
    let total = result.size();
    if total > 0 {
        unsafe {
            dtype
                .ops()
                .div_count(result.first_ptr(), dtype.size() as isize, total, n)?;
        }
    }
    Ok(result)
}

fn moments(
    a: &StridedArray,
    axis: Option<isize>,
    ddof: usize,
    rtype: Option<&DType>,
    out: Option<&StridedArray>,
    take_sqrt: bool,
    name: &'static str,
) -> Result<StridedArray> {
    let dtype = rtype
        .cloned()
        .unwrap_or_else(|| float_accumulator(a.dtype()))
        .to_native();
    let (work, ax) = prepare(a, axis)?;
    let n = work.shape()[ax];

    let result_shape = shape_without(work.shape(), ax);
    let result = make_out(out, &result_shape, &dtype)?;

    let src_ops = work.dtype().ops_arc();
    let dst_ops = dtype.ops_arc();
    let elsize = dtype.size();
    let mut it = ArrayIter::all_but_axis(&work, ax)?;
    let stride = it.axis_stride();
    let mut dp = result.first_ptr();
    let divisor = n as isize - ddof as isize;
    for _ in 0..it.size() {
        // Mean of squared deviations from the mean, widened to double
        // precision; a non-positive divisor yields nan rather than failing.
        let value = if n == 0 || divisor <= 0 {
            f64::NAN
        } else {
            unsafe {
                let total = src_ops.sum_wide(it.data_ptr(), stride, n)?;
                let mean = total / n as f64;
                let ssd = src_ops.sum_sq_dev(it.data_ptr(), stride, n, mean)?;
                let var = ssd / divisor as f64;
                if take_sqrt {
                    var.sqrt()
                } else {
                    var
                }
            }
        };
        let slot = unsafe { std::slice::from_raw_parts_mut(dp, elsize) };
        dst_ops
            .set_item(&Value::F64(value), slot)
            .map_err(|_| ArrayError::MissingTypeOp {
                dtype: dtype.name(),
                op: name,
            })?;
        dp = dp.wrapping_add(elsize);
        it.next();
    }
    Ok(result)
}

/// Variance along an axis with divisor `axis_len - ddof`.
pub fn var(
    a: &StridedArray,
    axis: Option<isize>,
    ddof: usize,
    rtype: Option<&DType>,
    out: Option<&StridedArray>,
) -> Result<StridedArray> {
    moments(a, axis, ddof, rtype, out, false, "var")
}

/// Standard deviation along an axis with divisor `axis_len - ddof`.
pub fn std(
    a: &StridedArray,
    axis: Option<isize>,
    ddof: usize,
    rtype: Option<&DType>,
    out: Option<&StridedArray>,
) -> Result<StridedArray> {
    moments(a, axis, ddof, rtype, out, true, "std")
}

/// Peak-to-peak range (max - min) along an axis.
pub fn ptp(
    a: &StridedArray,
    axis: Option<isize>,
    out: Option<&StridedArray>,
) -> Result<StridedArray> {
    let (work, ax) = prepare(a, axis)?;
    let n = work.shape()[ax];
    if n == 0 {
        return Err(ArrayError::EmptyReduction("ptp"));
    }
    let dtype = work.dtype().clone();
    let result_shape = shape_without(work.shape(), ax);
    let result = make_out(out, &result_shape, &dtype)?;

    let ops = dtype.ops_arc();
    let elsize = dtype.size();
    let mut lo = vec![0u8; elsize];
    let mut hi = vec![0u8; elsize];
    let mut it = ArrayIter::all_but_axis(&work, ax)?;
    let stride = it.axis_stride();
    let mut dp = result.first_ptr();
    for _ in 0..it.size() {
        unsafe {
            ops.copyswap_n(lo.as_mut_ptr(), 0, it.data_ptr(), 0, 1, false);
            ops.copyswap_n(hi.as_mut_ptr(), 0, it.data_ptr(), 0, 1, false);
            ops.reduce(ReduceOp::Min, it.data_ptr(), stride, n, lo.as_mut_ptr())?;
            ops.reduce(ReduceOp::Max, it.data_ptr(), stride, n, hi.as_mut_ptr())?;
            ops.binary(BinOp::Sub, hi.as_ptr(), 0, lo.as_ptr(), 0, dp, 0, 1)?;
        }
        dp = dp.wrapping_add(elsize);
        it.next();
    }
    Ok(result)
}

fn accumulate_common(
    a: &StridedArray,
    axis: Option<isize>,
    rtype: Option<&DType>,
    out: Option<&StridedArray>,
    op: ReduceOp,
) -> Result<StridedArray> {
    let dtype = rtype
        .cloned()
        .unwrap_or_else(|| default_accumulator(a.dtype()))
        .to_native();
    let (work, ax) = prepare(a, axis)?;
    let work = if work.dtype().is_equiv(&dtype) {
        work
    } else {
        work.cast_to(&dtype, Casting::Unsafe)?
    };
    let n = work.shape()[ax];
    let result = make_out(out, work.shape(), &dtype)?;
    if result.size() == 0 {
        return Ok(result);
    }

    let ops = dtype.ops_arc();
    let mut it = MultiIter::all_but_axis(&[&result, &work], ax)?;
    let dstride = it.operand_stride(0, ax);
    let sstride = it.operand_stride(1, ax);
    for _ in 0..it.size() {
        unsafe {
            ops.accumulate(op, it.data_ptr(1), sstride, it.data_ptr(0), dstride, n)?;
        }
        it.next();
    }
    Ok(result)
}

/// Running sum along an axis; the result keeps the source shape.
pub fn cumsum(
    a: &StridedArray,
    axis: Option<isize>,
    rtype: Option<&DType>,
    out: Option<&StridedArray>,
) -> Result<StridedArray> {
    accumulate_common(a, axis, rtype, out, ReduceOp::Sum)
}

/// Running product along an axis; the result keeps the source shape.
pub fn cumprod(
    a: &StridedArray,
    axis: Option<isize>,
    rtype: Option<&DType>,
    out: Option<&StridedArray>,
) -> Result<StridedArray> {
    accumulate_common(a, axis, rtype, out, ReduceOp::Prod)
}

/// Sum of the `offset`-th diagonal over a pair of axes.
pub fn trace(
    a: &StridedArray,
    offset: isize,
    axis1: usize,
    axis2: usize,
    rtype: Option<&DType>,
    out: Option<&StridedArray>,
) -> Result<StridedArray> {
    let diag = a.diagonal(offset, axis1, axis2)?;
    sum(&diag, Some(-1), rtype, out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_widens_small_ints() {
        let a = StridedArray::from_vec(vec![120i8, 120, 120], &[3]).unwrap();
        let s = sum(&a, None, None, None).unwrap();
        assert_eq!(s.dtype(), &DType::int64());
        assert_eq!(s.to_vec::<i64>().unwrap(), vec![360]);
    }

    #[test]
    fn test_sum_axis_rows_and_cols() {
        let a = StridedArray::from_vec(vec![1i32, 2, 3, 4, 5, 6], &[2, 3]).unwrap();
        let rows = sum(&a, Some(1), None, None).unwrap();
        assert_eq!(rows.to_vec::<i64>().unwrap(), vec![6, 15]);
        let cols = sum(&a, Some(0), None, None).unwrap();
        assert_eq!(cols.to_vec::<i64>().unwrap(), vec![5, 7, 9]);
        let neg = sum(&a, Some(-1), None, None).unwrap();
        assert_eq!(neg.to_vec::<i64>().unwrap(), vec![6, 15]);
    }

    #[test]
    fn test_axis_out_of_range() {
        let a = StridedArray::zeros(&[2, 3], DType::float32()).unwrap();
        assert!(matches!(
            sum(&a, Some(2), None, None),
            Err(ArrayError::InvalidAxis { axis: 2, rank: 2 })
        ));
        assert!(matches!(
            sum(&a, Some(-3), None, None),
            Err(ArrayError::InvalidAxis { .. })
        ));
    }

    #[test]
    fn test_min_max_and_empty_axis() {
        let a = StridedArray::from_vec(vec![5i32, 1, 9, 3], &[4]).unwrap();
        assert_eq!(min(&a, None, None).unwrap().item().unwrap(), Value::I32(1));
        assert_eq!(max(&a, None, None).unwrap().item().unwrap(), Value::I32(9));

        let empty = StridedArray::zeros(&[3, 0], DType::int32()).unwrap();
        assert!(matches!(
            min(&empty, Some(1), None),
            Err(ArrayError::EmptyReduction("minimum"))
        ));
        // Sums over an empty axis produce identities instead.
        let s = sum(&empty, Some(1), None, None).unwrap();
        assert_eq!(s.to_vec::<i64>().unwrap(), vec![0, 0, 0]);
    }

    #[test]
    fn test_argminmax_results_and_empty_error() {
        let a = StridedArray::from_vec(vec![3i32, 7, 7, 1, 1, 4], &[2, 3]).unwrap();
        let am = argmax(&a, Some(1), None).unwrap();
        assert_eq!(am.to_vec::<i64>().unwrap(), vec![1, 2]);
        let an = argmin(&a, Some(1), None).unwrap();
        assert_eq!(an.to_vec::<i64>().unwrap(), vec![0, 0]);

        let empty = StridedArray::zeros(&[0], DType::float64()).unwrap();
        let err = argmin(&empty, None, None).unwrap_err();
        assert!(matches!(err, ArrayError::EmptyReduction("argmin")));
        assert_eq!(err.kind(), crate::ErrorKind::Value);
    }

    #[test]
    fn test_any_all() {
        let a = StridedArray::from_vec(vec![0i32, 2, 0, 0], &[4]).unwrap();
        assert_eq!(any(&a, None, None).unwrap().item().unwrap(), Value::Bool(true));
        assert_eq!(all(&a, None, None).unwrap().item().unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_mean_integral_is_double() {
        let a = StridedArray::from_vec(vec![1i32, 2, 3, 4], &[4]).unwrap();
        let m = mean(&a, None, None, None).unwrap();
        assert_eq!(m.dtype(), &DType::float64());
        assert_eq!(m.item().unwrap(), Value::F64(2.5));
    }

    #[test]
    fn test_cumsum_shape_preserved() {
        let a = StridedArray::from_vec(vec![1i64, 2, 3, 4, 5, 6], &[2, 3]).unwrap();
        let c = cumsum(&a, Some(1), None, None).unwrap();
        assert_eq!(c.shape(), &[2, 3]);
        assert_eq!(c.to_vec::<i64>().unwrap(), vec![1, 3, 6, 4, 9, 15]);
        let flat = cumsum(&a, None, None, None).unwrap();
        assert_eq!(flat.to_vec::<i64>().unwrap(), vec![1, 3, 6, 10, 15, 21]);
    }

    #[test]
    fn test_output_validation() {
        let a = StridedArray::from_vec(vec![1i32, 2, 3, 4], &[2, 2]).unwrap();
        let bad_shape = StridedArray::zeros(&[3], DType::int64()).unwrap();
        let err = sum(&a, Some(0), None, Some(&bad_shape)).unwrap_err();
        assert!(matches!(err, ArrayError::OutputMismatch("wrong shape")));
        assert_eq!(err.kind(), crate::ErrorKind::Type);

        let bad_dtype = StridedArray::zeros(&[2], DType::int32()).unwrap();
        assert!(matches!(
            sum(&a, Some(0), None, Some(&bad_dtype)),
            Err(ArrayError::OutputMismatch("wrong dtype"))
        ));

        let good = StridedArray::zeros(&[2], DType::int64()).unwrap();
        let r = sum(&a, Some(0), None, Some(&good)).unwrap();
        assert!(r.shares_buffer_with(&good));
        assert_eq!(good.to_vec::<i64>().unwrap(), vec![4, 6]);
    }

    #[test]
    fn test_trace_offsets() {
        let a = StridedArray::from_vec((0..9i64).collect(), &[3, 3]).unwrap();
        assert_eq!(trace(&a, 0, 0, 1, None, None).unwrap().item().unwrap(), Value::I64(12));
        assert_eq!(trace(&a, 1, 0, 1, None, None).unwrap().item().unwrap(), Value::I64(6));
    }

    #[test]
    fn test_string_min_max_use_lexicographic_order() {
        let dtype = DType::bytes(3);
        let mut raw = Vec::new();
        for word in [b"pear", b"figs", b"plum"] {
            raw.extend_from_slice(&word[..3]);
        }
        let a = StridedArray::from_bytes(&raw, &[3], dtype).unwrap();
        let lo = min(&a, None, None).unwrap();
        assert_eq!(lo.item().unwrap(), Value::Bytes(b"fig".to_vec()));
        let hi = argmax(&a, None, None).unwrap();
        assert_eq!(hi.item().unwrap(), Value::I64(2));
    }

    #[test]
    fn test_structured_reduction_is_type_error() {
        let point =
            DType::structured(&[("x", DType::float64()), ("y", DType::float64())]).unwrap();
        let a = StridedArray::zeros(&[4], point).unwrap();
        let err = min(&a, None, None).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Type);
    }

    #[test]
    fn test_ptp() {
        let a = StridedArray::from_vec(vec![4i32, 9, 2, 7], &[4]).unwrap();
        assert_eq!(ptp(&a, None, None).unwrap().item().unwrap(), Value::I32(7));
    }
}

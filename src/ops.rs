//! Elementwise transforms and array assembly.
//!
//! The entry points here sit directly on the iterator and casting layers:
//! broadcasting assignment, the two-branch clip, decimal rounding,
//! concatenation and the 1-D inner product. Each one validates its inputs
//! completely before touching a destination buffer, so a failed call never
//! leaves an output half-written.

use crate::dtype::{BinOp, Kind, Value};
use crate::iter::MultiIter;
use crate::promote::{can_cast_type_to, promote_types, result_type, Casting};
use crate::view::{copy_transformed, StridedArray};
use crate::{ArrayError, DType, Result};

/// Broadcasting, casting elementwise copy of `src` into `dst`.
///
/// `src` is broadcast to `dst`'s shape; the element conversion must be
/// permitted under `casting`. Used by `out=` handling, concatenation and
/// the composed clip path.
pub fn assign(dst: &StridedArray, src: &StridedArray, casting: Casting) -> Result<()> {
    dst.ensure_writeable()?;
    if !can_cast_type_to(src.dtype(), dst.dtype(), casting) {
        return Err(ArrayError::CastNotAllowed {
            from: src.dtype().name(),
            to: dst.dtype().name(),
            rule: casting,
        });
    }
    let src = src.to_native()?;
    let src = src.broadcast_to(dst.shape())?;

    if !dst.dtype().is_native_order() {
        // Cast into a native scratch array, then swap into the destination.
        let native = StridedArray::empty(dst.shape(), dst.dtype().to_native())?;
        assign_native(&native, &src)?;
        return copy_transformed(dst, &native, true);
    }
    assign_native(dst, &src)
}

/// The native-order body of [`assign`]: `src` already broadcast and native.
fn assign_native(dst: &StridedArray, src: &StridedArray) -> Result<()> {
    if dst.size() == 0 {
        return Ok(());
    }
    if dst.ndim() == 0 {
        unsafe {
            return crate::kernel::cast_strided(
                src.dtype(),
                dst.dtype(),
                src.first_ptr(),
                0,
                dst.first_ptr(),
                0,
                1,
            );
        }
    }
    let last = dst.ndim() - 1;
    let n = dst.shape()[last];
    let mut it = MultiIter::all_but_axis(&[dst, src], last)?;
    let dstride = it.operand_stride(0, last);
    let sstride = it.operand_stride(1, last);
    for _ in 0..it.size() {
        unsafe {
            crate::kernel::cast_strided(
                src.dtype(),
                dst.dtype(),
                it.data_ptr(1),
                sstride,
                it.data_ptr(0),
                dstride,
                n,
            )?;
        }
        it.next();
    }
    Ok(())
}

fn validate_elementwise_out(
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

/// Whether a clip bound can take the fast path: its value-based minimal
/// type must cast safely into the array's own element type.
fn bound_fits(bound: &Value, dtype: &DType) -> bool {
    let Some(declared) = bound.dtype() else {
        return false;
    };
    let minimal = crate::promote::min_scalar_value_dtype(&declared, bound);
    can_cast_type_to(&minimal, dtype, Casting::Safe)
}

/// Clamp every element between `min` and `max` (either may be absent, not
/// both).
///
/// Bounds exactly representable in the array's own type run a single fused
/// kernel pass; anything else falls back to the composed elementwise
/// max-then-min in the promoted working type. On unsigned arrays a negative
/// bound clamps to zero before either path runs.
pub fn clip(
    a: &StridedArray,
    min: Option<&Value>,
    max: Option<&Value>,
    out: Option<&StridedArray>,
) -> Result<StridedArray> {
    if min.is_none() && max.is_none() {
        return Err(ArrayError::ClipNoBounds);
    }
    if !a.dtype().is_numeric() {
        return Err(ArrayError::UnsupportedDType(a.dtype().name()));
    }

    // Unsigned storage cannot go below zero, so negative bounds collapse.
    let zero = Value::U64(0);
    let clamp = |bound: Option<&Value>| -> Option<Value> {
        bound.map(|v| {
            if a.dtype().kind() == Kind::Unsigned && v.is_negative() {
                zero.clone()
            } else {
                v.clone()
            }
        })
    };
    let min = clamp(min);
    let max = clamp(max);

    let fast = min.as_ref().map_or(true, |v| bound_fits(v, a.dtype()))
        && max.as_ref().map_or(true, |v| bound_fits(v, a.dtype()));

    if fast {
        let work = a.to_native()?;
        let result = validate_elementwise_out(out, work.shape(), work.dtype())?;
        if result.size() == 0 {
            return Ok(result);
        }
        let ops = work.dtype().ops_arc();
        if work.ndim() == 0 {
            unsafe {
                ops.fast_clip(
                    work.first_ptr(),
                    0,
                    min.as_ref(),
                    max.as_ref(),
                    result.first_ptr(),
                    0,
                    1,
                )?;
            }
            return Ok(result);
        }
        let last = work.ndim() - 1;
        let n = work.shape()[last];
        let mut it = MultiIter::all_but_axis(&[&result, &work], last)?;
        let dstride = it.operand_stride(0, last);
        let sstride = it.operand_stride(1, last);
        for _ in 0..it.size() {
            unsafe {
                ops.fast_clip(
                    it.data_ptr(1),
                    sstride,
                    min.as_ref(),
                    max.as_ref(),
                    it.data_ptr(0),
                    dstride,
                    n,
                )?;
            }
            it.next();
        }
        return Ok(result);
    }

    if crate::trace_enabled() {
        eprintln!("ndstride: clip bounds not representable in {}, composing min/max", a.dtype());
    }
    clip_composed(a, min.as_ref(), max.as_ref(), out)
}

/// The slow clip branch: cast to the promoted working type, then apply
/// elementwise max against the lower bound and min against the upper.
fn clip_composed(
    a: &StridedArray,
    min: Option<&Value>,
    max: Option<&Value>,
    out: Option<&StridedArray>,
) -> Result<StridedArray> {
    let mut scalars = Vec::new();
    for bound in [min, max].into_iter().flatten() {
        scalars.push(StridedArray::from_value(bound)?);
    }
    let mut operands: Vec<&StridedArray> = vec![a];
    operands.extend(scalars.iter());
    let wt = result_type(&operands, &[])?;

    let work = a.cast_to(&wt, Casting::Unsafe)?;
    let result = validate_elementwise_out(out, work.shape(), &wt)?;
    if result.size() == 0 {
        return Ok(result);
    }

    let ops = wt.ops_arc();
    let elsize = wt.size();
    let mut lo_elem = vec![0u8; elsize];
    let mut hi_elem = vec![0u8; elsize];
    if let Some(v) = min {
        wt.ops().set_item(v, &mut lo_elem)?;
    }
    if let Some(v) = max {
        wt.ops().set_item(v, &mut hi_elem)?;
    }

    let apply = |op: BinOp, bound: &[u8], dst: &StridedArray, src: &StridedArray| -> Result<()> {
        if dst.ndim() == 0 {
            unsafe {
                return ops.binary(
                    op,
                    src.first_ptr(),
                    0,
                    bound.as_ptr(),
                    0,
                    dst.first_ptr(),
                    0,
                    1,
                );
            }
        }
        let last = dst.ndim() - 1;
        let n = dst.shape()[last];
        let mut it = MultiIter::all_but_axis(&[dst, src], last)?;
        let dstride = it.operand_stride(0, last);
        let sstride = it.operand_stride(1, last);
        for _ in 0..it.size() {
            unsafe {
                ops.binary(
                    op,
                    it.data_ptr(1),
                    sstride,
                    bound.as_ptr(),
                    0,
                    it.data_ptr(0),
                    dstride,
                    n,
                )?;
            }
            it.next();
        }
        Ok(())
    };

    match (min, max) {
        (Some(_), Some(_)) => {
            apply(BinOp::Max, &lo_elem, &result, &work)?;
            // Second pass runs in place over the result.
            apply(BinOp::Min, &hi_elem, &result, &result)?;
        }
        (Some(_), None) => apply(BinOp::Max, &lo_elem, &result, &work)?,
        (None, Some(_)) => apply(BinOp::Min, &hi_elem, &result, &work)?,
        (None, None) => {}
    }
    Ok(result)
}

/// Round to `decimals` decimal places, half to even.
///
/// Positive `decimals` scales up before rounding and back down after;
/// negative `decimals` inverts the order. Complex elements round their real
/// and imaginary parts independently. Integer arrays are returned unchanged
/// (copied when `out` is given).
pub fn round(
    a: &StridedArray,
    decimals: i32,
    out: Option<&StridedArray>,
) -> Result<StridedArray> {
    if !a.dtype().is_numeric() {
        return Err(ArrayError::UnsupportedDType(a.dtype().name()));
    }
    let work = a.to_native()?;

    if matches!(
        work.dtype().kind(),
        Kind::Bool | Kind::Unsigned | Kind::Signed
    ) {
        // Rounding integers is the identity: hand back the array itself,
        // copying only when the caller supplied an output buffer.
        return match out {
            None => Ok(work),
            Some(o) => {
                let result = validate_elementwise_out(Some(o), work.shape(), work.dtype())?;
                copy_transformed(&result, &work, false)?;
                Ok(result)
            }
        };
    }

    let result = validate_elementwise_out(out, work.shape(), work.dtype())?;
    if result.size() == 0 {
        return Ok(result);
    }
    let ops = work.dtype().ops_arc();
    if work.ndim() == 0 {
        unsafe {
            ops.round(work.first_ptr(), 0, result.first_ptr(), 0, 1, decimals)?;
        }
        return Ok(result);
    }
    let last = work.ndim() - 1;
    let n = work.shape()[last];
    let mut it = MultiIter::all_but_axis(&[&result, &work], last)?;
    let dstride = it.operand_stride(0, last);
    let sstride = it.operand_stride(1, last);
    for _ in 0..it.size() {
        unsafe {
            ops.round(it.data_ptr(1), sstride, it.data_ptr(0), dstride, n, decimals)?;
        }
        it.next();
    }
    Ok(result)
}

/// Join arrays along an existing axis.
///
/// Every input must have the same rank and identical sizes on all non-axis
/// dimensions; the result dtype is the promoted common type and consecutive
/// inputs land back to back along the axis.
pub fn concatenate(arrays: &[&StridedArray], axis: usize) -> Result<StridedArray> {
    if arrays.is_empty() {
        return Err(ArrayError::EmptySequence("concatenate"));
    }
    let first = arrays[0];
    let rank = first.ndim();
    if axis >= rank {
        return Err(ArrayError::InvalidAxis {
            axis: axis as isize,
            rank,
        });
    }
    let mut axis_total = 0usize;
    for array in arrays {
        if array.ndim() != rank {
            return Err(ArrayError::RankMismatch(rank, array.ndim()));
        }
        for d in 0..rank {
            if d != axis && array.shape()[d] != first.shape()[d] {
                return Err(ArrayError::ShapeMismatch(
                    first.shape().to_vec(),
                    array.shape().to_vec(),
                ));
            }
        }
        axis_total += array.shape()[axis];
    }

    let dtype = result_type(arrays, &[])?;
    let mut shape = first.shape().to_vec();
    shape[axis] = axis_total;
    let result = StridedArray::empty(&shape, dtype)?;

    let mut at = 0usize;
    for array in arrays {
        let len = array.shape()[axis];
        let region = result.slice(axis, at, at + len, 1)?;
        assign(&region, array, Casting::Unsafe)?;
        at += len;
    }
    Ok(result)
}

/// Inner product of two 1-D arrays in their promoted common type.
pub fn dot(a: &StridedArray, b: &StridedArray) -> Result<StridedArray> {
    if a.ndim() != 1 || b.ndim() != 1 {
        return Err(ArrayError::RankMismatch(a.ndim(), b.ndim()));
    }
    if a.shape() != b.shape() {
        return Err(ArrayError::ShapeMismatch(
            a.shape().to_vec(),
            b.shape().to_vec(),
        ));
    }
    let dtype = promote_types(a.dtype(), b.dtype())?;
    let lhs = if a.dtype().is_equiv(&dtype) {
        a.to_native()?
    } else {
        a.cast_to(&dtype, Casting::Unsafe)?
    };
    let rhs = if b.dtype().is_equiv(&dtype) {
        b.to_native()?
    } else {
        b.cast_to(&dtype, Casting::Unsafe)?
    };
    let n = lhs.shape()[0];
    let value = unsafe {
        dtype.ops().dot(
            lhs.first_ptr(),
            lhs.strides()[0],
            rhs.first_ptr(),
            rhs.strides()[0],
            n,
        )?
    };
    StridedArray::from_value(&value)
}

/// Flatten to one dimension (zero-copy for C-contiguous arrays).
pub fn ravel(a: &StridedArray) -> Result<StridedArray> {
    a.ravel()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_broadcasts_and_casts() {
        let dst = StridedArray::zeros(&[2, 3], DType::float64()).unwrap();
        let src = StridedArray::from_vec(vec![1i32, 2, 3], &[3]).unwrap();
        assign(&dst, &src, Casting::Safe).unwrap();
        assert_eq!(
            dst.to_vec::<f64>().unwrap(),
            vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0]
        );
    }

    #[test]
    fn test_assign_respects_casting_rule() {
        let dst = StridedArray::zeros(&[3], DType::int32()).unwrap();
        let src = StridedArray::from_vec(vec![1.5f64, 2.5, 3.5], &[3]).unwrap();
        assert!(matches!(
            assign(&dst, &src, Casting::Safe),
            Err(ArrayError::CastNotAllowed { .. })
        ));
        assign(&dst, &src, Casting::Unsafe).unwrap();
        assert_eq!(dst.to_vec::<i32>().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_clip_fast_path() {
        let a = StridedArray::from_vec(vec![1i32, 5, 9], &[3]).unwrap();
        let c = clip(&a, Some(&Value::I32(3)), Some(&Value::I32(7)), None).unwrap();
        assert_eq!(c.dtype(), &DType::int32());
        assert_eq!(c.to_vec::<i32>().unwrap(), vec![3, 5, 7]);
    }

    #[test]
    fn test_clip_single_bound_and_no_bounds() {
        let a = StridedArray::from_vec(vec![1i32, 5, 9], &[3]).unwrap();
        let c = clip(&a, None, Some(&Value::I32(4)), None).unwrap();
        assert_eq!(c.to_vec::<i32>().unwrap(), vec![1, 4, 4]);
        assert!(matches!(clip(&a, None, None, None), Err(ArrayError::ClipNoBounds)));
    }

    #[test]
    fn test_clip_unsigned_clamps_negative_bound() {
        let a = StridedArray::from_vec(vec![3u8, 200, 7], &[3]).unwrap();
        let c = clip(&a, Some(&Value::I64(-5)), Some(&Value::I64(10)), None).unwrap();
        assert_eq!(c.to_vec::<u8>().unwrap(), vec![3, 10, 7]);
    }

    #[test]
    fn test_clip_composed_for_fractional_bounds() {
        let a = StridedArray::from_vec(vec![1i32, 5, 9], &[3]).unwrap();
        let c = clip(&a, Some(&Value::F64(2.5)), Some(&Value::F64(7.5)), None).unwrap();
        // The working type is promoted, so fractional bounds survive.
        assert_eq!(c.dtype().kind(), Kind::Float);
        let v = c.to_vec::<f64>().unwrap();
        assert_eq!(v, vec![2.5, 5.0, 7.5]);
    }

    #[test]
    fn test_round_halves_to_even() {
        let a = StridedArray::from_vec(vec![0.5f64, 1.5, 2.5, -0.5, 2.675], &[5]).unwrap();
        let r = round(&a, 0, None).unwrap();
        assert_eq!(r.to_vec::<f64>().unwrap(), vec![0.0, 2.0, 2.0, 0.0, 3.0]);

        let d2 = round(&a, 2, None).unwrap();
        let v = d2.to_vec::<f64>().unwrap();
        assert!((v[4] - 2.67).abs() < 1e-9 || (v[4] - 2.68).abs() < 1e-9);
    }

    #[test]
    fn test_round_negative_decimals_and_ints() {
        let a = StridedArray::from_vec(vec![1234.0f64, 1250.0], &[2]).unwrap();
        let r = round(&a, -2, None).unwrap();
        assert_eq!(r.to_vec::<f64>().unwrap(), vec![1200.0, 1200.0]);

        let ints = StridedArray::from_vec(vec![11i32, 27], &[2]).unwrap();
        let ri = round(&ints, -1, None).unwrap();
        // Integer input comes back unchanged, no copy made.
        assert_eq!(ri.to_vec::<i32>().unwrap(), vec![11, 27]);
        assert!(ri.shares_buffer_with(&ints));
    }

    #[test]
    fn test_round_complex_parts_independently() {
        use num_complex::Complex64;
        let a =
            StridedArray::from_vec(vec![Complex64::new(1.5, -2.5), Complex64::new(0.4, 0.6)], &[2])
                .unwrap();
        let r = round(&a, 0, None).unwrap();
        let v = r.to_vec::<Complex64>().unwrap();
        assert_eq!(v[0], Complex64::new(2.0, -2.0));
        assert_eq!(v[1], Complex64::new(0.0, 1.0));
    }

    #[test]
    fn test_concatenate_axis0() {
        let a = StridedArray::from_vec((0..6i32).collect(), &[2, 3]).unwrap();
        let b = StridedArray::from_vec((6..12i32).collect(), &[2, 3]).unwrap();
        let c = concatenate(&[&a, &b], 0).unwrap();
        assert_eq!(c.shape(), &[4, 3]);
        assert_eq!(c.to_vec::<i32>().unwrap(), (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn test_concatenate_errors() {
        assert!(matches!(
            concatenate(&[], 0),
            Err(ArrayError::EmptySequence("concatenate"))
        ));
        let a = StridedArray::zeros(&[2, 3], DType::int32()).unwrap();
        let b = StridedArray::zeros(&[2, 4], DType::int32()).unwrap();
        assert!(matches!(
            concatenate(&[&a, &b], 0),
            Err(ArrayError::ShapeMismatch(..))
        ));
    }

    #[test]
    fn test_concatenate_promotes_dtypes() {
        let a = StridedArray::from_vec(vec![1i16, 2], &[2]).unwrap();
        let b = StridedArray::from_vec(vec![0.5f32, 1.5], &[2]).unwrap();
        let c = concatenate(&[&a, &b], 0).unwrap();
        assert_eq!(c.dtype(), &DType::float32());
        assert_eq!(c.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 0.5, 1.5]);
    }

    #[test]
    fn test_dot_promotes() {
        let a = StridedArray::from_vec(vec![1i32, 2, 3], &[3]).unwrap();
        let b = StridedArray::from_vec(vec![0.5f64, 0.5, 0.5], &[3]).unwrap();
        let d = dot(&a, &b).unwrap();
        assert_eq!(d.item().unwrap(), Value::F64(3.0));
    }
}

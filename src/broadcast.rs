//! Broadcast shape computation.
//!
//! Shapes are right-aligned: trailing dimensions are matched first and
//! missing leading dimensions are treated as size 1. Per dimension, every
//! participating size must equal the target or be 1.

use crate::{ArrayError, Result};

/// Compute the common broadcast shape across multiple arrays.
pub(crate) fn broadcast_shapes(shapes: &[&[usize]]) -> Result<Vec<usize>> {
    if shapes.is_empty() {
        return Ok(vec![]);
    }

    let rank = shapes.iter().map(|s| s.len()).max().unwrap_or(0);
    let mut out = vec![1usize; rank];
    for d in 0..rank {
        let mut target = 1usize;
        for shape in shapes {
            // Right-aligned: dimension d of the output lines up with
            // dimension d - (rank - shape.len()) of each operand.
            let Some(offset) = (d + shape.len()).checked_sub(rank) else {
                continue;
            };
            let n = shape[offset];
            if n == 1 {
                continue;
            }
            if target == 1 {
                target = n;
            } else if target != n {
                return Err(ArrayError::NotBroadcastable(
                    shapes[0].to_vec(),
                    shape.to_vec(),
                ));
            }
        }
        out[d] = target;
    }

    Ok(out)
}

/// Expand an array's strides to a broadcast target shape: kept where the
/// sizes match, 0 where the array's dimension has size 1 (or is missing).
pub(crate) fn broadcast_strides(
    target: &[usize],
    shape: &[usize],
    strides: &[isize],
) -> Result<Vec<isize>> {
    if shape.len() != strides.len() {
        return Err(ArrayError::RankMismatch(shape.len(), strides.len()));
    }
    if shape.len() > target.len() {
        return Err(ArrayError::NotBroadcastable(
            shape.to_vec(),
            target.to_vec(),
        ));
    }

    let lead = target.len() - shape.len();
    let mut out = vec![0isize; target.len()];
    for i in 0..shape.len() {
        let sdim = shape[i];
        let tdim = target[lead + i];
        if sdim == tdim {
            out[lead + i] = strides[i];
        } else if sdim == 1 {
            out[lead + i] = 0;
        } else {
            return Err(ArrayError::NotBroadcastable(
                shape.to_vec(),
                target.to_vec(),
            ));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_shapes_basic() {
        let out = broadcast_shapes(&[&[2, 3], &[1, 3]]).unwrap();
        assert_eq!(out, vec![2, 3]);
    }

    #[test]
    fn test_broadcast_shapes_right_aligned() {
        let out = broadcast_shapes(&[&[4, 1, 5], &[3, 1]]).unwrap();
        assert_eq!(out, vec![4, 3, 5]);
    }

    #[test]
    fn test_broadcast_shapes_incompatible() {
        let err = broadcast_shapes(&[&[3, 1, 5], &[1, 4, 5], &[2, 4, 5]]).unwrap_err();
        assert!(matches!(err, ArrayError::NotBroadcastable(..)));
    }

    #[test]
    fn test_broadcast_strides_zeroes_singletons() {
        let out = broadcast_strides(&[2, 3], &[1, 3], &[3, 1]).unwrap();
        assert_eq!(out, vec![0, 1]);
    }

    #[test]
    fn test_broadcast_strides_missing_leading_dims() {
        let out = broadcast_strides(&[4, 2, 3], &[2, 3], &[3, 1]).unwrap();
        assert_eq!(out, vec![0, 3, 1]);
    }
}

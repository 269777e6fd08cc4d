//! Casting permission and type promotion.
//!
//! Two process-wide tables are built once, from declarative kind/size rules:
//! `CAN_CAST[from][to]` (information-preserving casts) and
//! `PROMOTE[a][b]` (smallest common type id). They are never mutated after
//! initialization. Everything size-dependent — flexible string capacities,
//! value-based scalar minimization — is layered on top of the tables.

use std::sync::OnceLock;

use crate::dtype::{Kind, TypeId, Value, NTYPES};
use crate::view::StridedArray;
use crate::{ArrayError, DType, Result};

/// Casting strictness, from most to least restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Casting {
    /// Only equivalent descriptors, byte order included.
    No,
    /// Equivalent descriptors, byte order ignored.
    Equiv,
    /// Only information-preserving conversions.
    Safe,
    /// Safe conversions plus within-kind and kind-ladder-upward ones.
    SameKind,
    /// Anything goes.
    Unsafe,
}

struct Tables {
    can_cast: [[bool; NTYPES]; NTYPES],
    promote: [[Option<TypeId>; NTYPES]; NTYPES],
}

fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(|| {
        let mut can_cast = [[false; NTYPES]; NTYPES];
        let mut promote = [[None; NTYPES]; NTYPES];
        for &from in TypeId::ALL.iter() {
            for &to in TypeId::ALL.iter() {
                can_cast[from as u16 as usize][to as u16 as usize] = can_cast_rule(from, to);
                promote[from as u16 as usize][to as u16 as usize] = promote_rule(from, to);
            }
        }
        Tables { can_cast, promote }
    })
}

/// Declarative safe-cast rule the startup table is built from.
fn can_cast_rule(from: TypeId, to: TypeId) -> bool {
    if from == to {
        return true;
    }
    // Object and structured types accept anything as a sink, and leave only
    // as themselves.
    match to.kind() {
        Kind::Object | Kind::Structured => return true,
        _ => {}
    }
    match from.kind() {
        Kind::Object | Kind::Structured => return false,
        _ => {}
    }
    // Booleans cast to everything; nothing else casts to boolean.
    if from.kind() == Kind::Bool {
        return true;
    }
    if to.kind() == Kind::Bool {
        return false;
    }
    // Any numeric type has a lossless string representation; capacity is
    // checked separately in `can_cast_to`.
    if matches!(to.kind(), Kind::Bytes | Kind::Unicode) {
        return match from.kind() {
            Kind::Bytes => to.kind() == Kind::Unicode || to.kind() == Kind::Bytes,
            Kind::Unicode => to.kind() == Kind::Unicode,
            _ => true,
        };
    }
    if matches!(from.kind(), Kind::Bytes | Kind::Unicode) {
        return false;
    }

    let fs = from.size();
    // An integer of n bytes fits exactly in a float of m bytes when m > n;
    // the widest integers are additionally declared to fit the widest float.
    let int_fits_float = |n: usize, m: usize| m > n || m == 8;
    match (from.kind(), to.kind()) {
        (Kind::Unsigned, Kind::Unsigned) => to.size() >= fs,
        (Kind::Unsigned, Kind::Signed) => to.size() > fs,
        (Kind::Signed, Kind::Signed) => to.size() >= fs,
        (Kind::Signed, Kind::Unsigned) => false,
        (Kind::Unsigned | Kind::Signed, Kind::Float) => int_fits_float(fs, to.size()),
        (Kind::Unsigned | Kind::Signed, Kind::Complex) => int_fits_float(fs, to.size() / 2),
        (Kind::Float, Kind::Float) => to.size() >= fs,
        (Kind::Float, Kind::Complex) => to.size() / 2 >= fs,
        (Kind::Complex, Kind::Complex) => to.size() >= fs,
        _ => false,
    }
}

/// Character count needed to represent any value of a numeric type.
fn repr_chars(id: TypeId) -> usize {
    match id {
        TypeId::Bool => 5,
        TypeId::UInt8 => 3,
        TypeId::Int8 => 4,
        TypeId::UInt16 => 5,
        TypeId::Int16 => 6,
        TypeId::UInt32 => 10,
        TypeId::Int32 => 11,
        TypeId::UInt64 => 20,
        TypeId::Int64 => 21,
        TypeId::Float16 | TypeId::Float32 => 32,
        TypeId::Float64 => 48,
        TypeId::Complex64 => 64,
        TypeId::Complex128 => 96,
        _ => 0,
    }
}

fn signed_of_size(size: usize) -> Option<TypeId> {
    Some(match size {
        1 => TypeId::Int8,
        2 => TypeId::Int16,
        4 => TypeId::Int32,
        8 => TypeId::Int64,
        _ => return None,
    })
}

fn float_of_size(size: usize) -> Option<TypeId> {
    Some(match size {
        2 => TypeId::Float16,
        4 => TypeId::Float32,
        8 => TypeId::Float64,
        _ => return None,
    })
}

fn complex_of_component(size: usize) -> Option<TypeId> {
    Some(match size {
        4 => TypeId::Complex64,
        8 => TypeId::Complex128,
        _ => return None,
    })
}

/// Smallest float size that holds every integer of `n` bytes.
fn float_size_for_int(n: usize) -> usize {
    match n {
        1 => 2,
        2 => 4,
        _ => 8,
    }
}

/// Declarative promotion rule the startup table is built from; symmetric by
/// construction.
fn promote_rule(a: TypeId, b: TypeId) -> Option<TypeId> {
    if a == b {
        return Some(a);
    }
    let (ka, kb) = (a.kind(), b.kind());
    if ka == Kind::Object || kb == Kind::Object {
        return Some(TypeId::Object);
    }
    if ka == Kind::Structured || kb == Kind::Structured {
        // Only identical layouts promote; handled by the descriptor path.
        return None;
    }
    // Strings absorb the other side; unicode absorbs bytes.
    if ka == Kind::Unicode || kb == Kind::Unicode {
        return Some(TypeId::Unicode);
    }
    if ka == Kind::Bytes || kb == Kind::Bytes {
        return Some(TypeId::Bytes);
    }
    if ka == Kind::Bool {
        return Some(b);
    }
    if kb == Kind::Bool {
        return Some(a);
    }

    let (sa, sb) = (a.size(), b.size());
    match (ka, kb) {
        (Kind::Unsigned, Kind::Unsigned)
        | (Kind::Signed, Kind::Signed)
        | (Kind::Float, Kind::Float)
        | (Kind::Complex, Kind::Complex) => Some(if sa >= sb { a } else { b }),
        (Kind::Unsigned, Kind::Signed) | (Kind::Signed, Kind::Unsigned) => {
            let (u, s) = if ka == Kind::Unsigned { (sa, sb) } else { (sb, sa) };
            if s > u {
                signed_of_size(s)
            } else {
                // The smallest signed type strictly wider than the unsigned
                // operand, or the widest float when none exists.
                match u {
                    1 => Some(TypeId::Int16),
                    2 => Some(TypeId::Int32),
                    4 => Some(TypeId::Int64),
                    _ => Some(TypeId::Float64),
                }
            }
        }
        (Kind::Unsigned | Kind::Signed, Kind::Float) => {
            float_of_size(float_size_for_int(sa).max(sb))
        }
        (Kind::Float, Kind::Unsigned | Kind::Signed) => {
            float_of_size(float_size_for_int(sb).max(sa))
        }
        (Kind::Unsigned | Kind::Signed, Kind::Complex) => {
            complex_of_component(float_size_for_int(sa).max(sb / 2))
        }
        (Kind::Complex, Kind::Unsigned | Kind::Signed) => {
            complex_of_component(float_size_for_int(sb).max(sa / 2))
        }
        (Kind::Float, Kind::Complex) => complex_of_component(sa.max(sb / 2)),
        (Kind::Complex, Kind::Float) => complex_of_component(sb.max(sa / 2)),
        _ => None,
    }
}

/// Whether every value of `from` is exactly representable in `to`.
///
/// Built-in pairs use the precomputed table; user-defined descriptors are
/// castable only to equivalent layouts.
pub fn can_cast_safely(from: &DType, to: &DType) -> bool {
    match (from.type_id(), to.type_id()) {
        (Some(f), Some(t)) => tables().can_cast[f as u16 as usize][t as u16 as usize],
        _ => from.is_equiv(to),
    }
}

/// [`can_cast_safely`] plus capacity checks for string destinations: the
/// destination must hold the source's representation (unicode counted at 4
/// bytes per character), with capacity 0 meaning "not yet resolved".
pub fn can_cast_to(from: &DType, to: &DType) -> bool {
    if !can_cast_safely(from, to) {
        return false;
    }
    let required = match to.kind() {
        Kind::Bytes => match from.kind() {
            Kind::Bytes => from.size(),
            _ => repr_chars(match from.type_id() {
                Some(id) => id,
                None => return false,
            }),
        },
        Kind::Unicode => match from.kind() {
            Kind::Unicode => from.size(),
            Kind::Bytes => from.size() * 4,
            _ => {
                4 * repr_chars(match from.type_id() {
                    Some(id) => id,
                    None => return false,
                })
            }
        },
        _ => return true,
    };
    to.size() == 0 || to.size() >= required
}

/// Casting permission under an explicit strictness rule.
pub fn can_cast_type_to(from: &DType, to: &DType, rule: Casting) -> bool {
    match rule {
        Casting::Unsafe => true,
        Casting::No => from.is_equiv(to),
        Casting::Equiv => from.to_native().is_equiv(&to.to_native()),
        Casting::Safe => can_cast_to(from, to),
        Casting::SameKind => {
            if can_cast_to(from, to) {
                return true;
            }
            // Within one kind, or strictly upward on the kind ladder.
            from.is_numeric() && to.is_numeric() && to.kind() >= from.kind()
        }
    }
}

/// The smallest common type of two descriptors.
///
/// Built-in pairs come from the precomputed table, with flexible capacities
/// sized to the wider operand. Anything else falls back to safe-cast checks
/// and then a walk up the scalar-kind ladder.
pub fn promote_types(a: &DType, b: &DType) -> Result<DType> {
    if let (Some(ia), Some(ib)) = (a.type_id(), b.type_id()) {
        let id = tables().promote[ia as u16 as usize][ib as u16 as usize]
            .ok_or(ArrayError::NoCommonType(a.name(), b.name()))?;
        return Ok(match id {
            TypeId::Bytes => DType::bytes(flexible_capacity(a).max(flexible_capacity(b))),
            TypeId::Unicode => {
                let chars = unicode_capacity(a).max(unicode_capacity(b));
                DType::unicode(chars)
            }
            other => {
                if other == ia {
                    a.clone()
                } else if other == ib {
                    b.clone()
                } else {
                    DType::from_type_id(other)
                }
            }
        });
    }

    if a.is_equiv(b) {
        return Ok(a.clone());
    }
    if can_cast_to(a, b) {
        return Ok(b.clone());
    }
    if can_cast_to(b, a) {
        return Ok(a.clone());
    }
    // Walk the scalar-kind ladder for the narrowest type accepting both.
    const LADDER: [TypeId; 14] = [
        TypeId::Bool,
        TypeId::UInt8,
        TypeId::Int8,
        TypeId::UInt16,
        TypeId::Int16,
        TypeId::UInt32,
        TypeId::Int32,
        TypeId::UInt64,
        TypeId::Int64,
        TypeId::Float16,
        TypeId::Float32,
        TypeId::Float64,
        TypeId::Complex64,
        TypeId::Complex128,
    ];
    for id in LADDER {
        let candidate = DType::from_type_id(id);
        if can_cast_to(a, &candidate) && can_cast_to(b, &candidate) {
            return Ok(candidate);
        }
    }
    Err(ArrayError::NoCommonType(a.name(), b.name()))
}

/// Capacity of a descriptor measured in bytes-kind characters.
fn flexible_capacity(d: &DType) -> usize {
    match d.kind() {
        Kind::Bytes => d.size(),
        Kind::Unicode => d.size() / 4,
        _ => d.type_id().map_or(0, repr_chars),
    }
}

/// Capacity of a descriptor measured in unicode characters.
fn unicode_capacity(d: &DType) -> usize {
    match d.kind() {
        Kind::Unicode => d.size() / 4,
        Kind::Bytes => d.size(),
        _ => d.type_id().map_or(0, repr_chars),
    }
}

/// Value-based minimal type of a scalar, plus the "also fits the same-size
/// signed type" marker driving unsigned/signed promotion.
///
/// The float thresholds are deliberately approximate (±65000 for half,
/// ±3.4e38 for single) to reproduce the promotion behavior of the reference
/// numeric stack; they are not exact representable-range predicates.
fn min_scalar_value(dtype: &DType, value: &Value) -> (DType, bool) {
    let own = || (dtype.clone(), false);
    match dtype.kind() {
        Kind::Bool => own(),
        Kind::Unsigned | Kind::Signed => {
            let Some(v) = value.to_wide().and_then(|w| match w {
                crate::dtype::Wide::Int(i) => Some(i),
                _ => None,
            }) else {
                return own();
            };
            if v >= 0 {
                let (id, small) = if v <= u8::MAX as i128 {
                    (TypeId::UInt8, v <= i8::MAX as i128)
                } else if v <= u16::MAX as i128 {
                    (TypeId::UInt16, v <= i16::MAX as i128)
                } else if v <= u32::MAX as i128 {
                    (TypeId::UInt32, v <= i32::MAX as i128)
                } else {
                    (TypeId::UInt64, v <= i64::MAX as i128)
                };
                (DType::from_type_id(id), small)
            } else {
                let id = if v >= i8::MIN as i128 {
                    TypeId::Int8
                } else if v >= i16::MIN as i128 {
                    TypeId::Int16
                } else if v >= i32::MIN as i128 {
                    TypeId::Int32
                } else {
                    TypeId::Int64
                };
                (DType::from_type_id(id), false)
            }
        }
        Kind::Float => {
            let Some(v) = value.to_f64() else { return own() };
            let id = match dtype.type_id() {
                Some(TypeId::Float16) => TypeId::Float16,
                Some(TypeId::Float32) => {
                    if v > -65000.0 && v < 65000.0 {
                        TypeId::Float16
                    } else {
                        TypeId::Float32
                    }
                }
                _ => {
                    if v > -65000.0 && v < 65000.0 {
                        TypeId::Float16
                    } else if v > -3.4e38 && v < 3.4e38 {
                        TypeId::Float32
                    } else {
                        TypeId::Float64
                    }
                }
            };
            (DType::from_type_id(id), false)
        }
        Kind::Complex => {
            let Some(crate::dtype::Wide::Complex(c)) = value.to_wide() else {
                return own();
            };
            if c.im == 0.0 {
                // Pure-real complex scalars minimize through the float path.
                let float_dtype = match dtype.type_id() {
                    Some(TypeId::Complex64) => DType::float32(),
                    _ => DType::float64(),
                };
                return min_scalar_value(&float_dtype, &Value::F64(c.re));
            }
            let id = match dtype.type_id() {
                Some(TypeId::Complex64) => TypeId::Complex64,
                _ => {
                    if c.re > -3.4e38 && c.re < 3.4e38 && c.im > -3.4e38 && c.im < 3.4e38 {
                        TypeId::Complex64
                    } else {
                        TypeId::Complex128
                    }
                }
            };
            (DType::from_type_id(id), false)
        }
        _ => own(),
    }
}

/// Crate-internal access to value-based minimization for boxed scalars.
pub(crate) fn min_scalar_value_dtype(dtype: &DType, value: &Value) -> DType {
    min_scalar_value(dtype, value).0
}

/// Value-based minimal descriptor for zero-dimensional numeric arrays;
/// everything else keeps its declared descriptor.
pub fn min_scalar_type(array: &StridedArray) -> DType {
    if array.ndim() != 0 || !array.dtype().is_numeric() {
        return array.dtype().clone();
    }
    match array.item() {
        Ok(value) => min_scalar_value(array.dtype(), &value).0,
        Err(_) => array.dtype().clone(),
    }
}

/// Kind collapsed for the scalar-vs-array comparison in [`result_type`]:
/// signedness is ignored, non-numeric kinds rank above everything numeric.
fn simplified_kind(kind: Kind) -> u8 {
    match kind {
        Kind::Bool => 0,
        Kind::Unsigned | Kind::Signed => 1,
        Kind::Float => 2,
        Kind::Complex => 3,
        _ => 4,
    }
}

fn promote_pair(a: &DType, a_small: bool, b: &DType, b_small: bool) -> Result<(DType, bool)> {
    // A small unsigned scalar meeting a signed operand combines as the
    // same-size signed type instead of forcing an unsigned promotion.
    let a_adj = if a_small && b.kind() == Kind::Signed {
        signed_of_size(a.size()).map(DType::from_type_id)
    } else {
        None
    };
    let b_adj = if b_small && a.kind() == Kind::Signed {
        signed_of_size(b.size()).map(DType::from_type_id)
    } else {
        None
    };
    let promoted = promote_types(a_adj.as_ref().unwrap_or(a), b_adj.as_ref().unwrap_or(b))?;
    Ok((promoted, a_small && b_small))
}

/// The overall promotion entry point over mixed arrays and explicit dtypes.
///
/// Zero-dimensional operands promote by their minimal value-based type when
/// no higher-kind array operand outranks them, so scalars do not force wide
/// result types onto narrow arrays. Explicitly supplied dtypes always count
/// as full array operands.
pub fn result_type(arrays: &[&StridedArray], dtypes: &[DType]) -> Result<DType> {
    if arrays.is_empty() && dtypes.is_empty() {
        return Err(ArrayError::EmptySequence("compute a result type"));
    }
    if arrays.len() + dtypes.len() == 1 {
        return Ok(arrays
            .first()
            .map(|a| a.dtype().clone())
            .unwrap_or_else(|| dtypes[0].clone()));
    }

    let mut max_scalar_kind: Option<u8> = None;
    let mut max_array_kind: Option<u8> = None;
    for array in arrays {
        let kind = simplified_kind(array.dtype().kind());
        let slot = if array.ndim() == 0 {
            &mut max_scalar_kind
        } else {
            &mut max_array_kind
        };
        *slot = Some(slot.map_or(kind, |k| k.max(kind)));
    }
    for dtype in dtypes {
        let kind = simplified_kind(dtype.kind());
        max_array_kind = Some(max_array_kind.map_or(kind, |k| k.max(kind)));
    }

    let use_min_scalar = match (max_scalar_kind, max_array_kind) {
        (Some(_), None) => true,
        (Some(s), Some(a)) => s <= a,
        _ => false,
    };

    let mut current: Option<(DType, bool)> = None;
    let mut push = |dtype: DType, small: bool, current: &mut Option<(DType, bool)>| -> Result<()> {
        *current = Some(match current.take() {
            None => (dtype, small),
            Some((acc, acc_small)) => promote_pair(&acc, acc_small, &dtype, small)?,
        });
        Ok(())
    };

    for array in arrays {
        let (dtype, small) = if use_min_scalar && array.ndim() == 0 && array.dtype().is_numeric() {
            match array.item() {
                Ok(value) => min_scalar_value(array.dtype(), &value),
                Err(_) => (array.dtype().clone(), false),
            }
        } else {
            (array.dtype().clone(), false)
        };
        push(dtype, small, &mut current)?;
    }
    for dtype in dtypes {
        push(dtype.clone(), false, &mut current)?;
    }

    // Non-empty by the guard above.
    Ok(current
        .map(|(d, _)| d)
        .ok_or(ArrayError::EmptySequence("compute a result type"))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin(id: TypeId) -> DType {
        DType::from_type_id(id)
    }

    #[test]
    fn test_promote_table_commutes_and_absorbs() {
        for &a in TypeId::ALL.iter() {
            for &b in TypeId::ALL.iter() {
                let da = builtin(a);
                let db = builtin(b);
                let ab = promote_types(&da, &db);
                let ba = promote_types(&db, &da);
                match (ab, ba) {
                    (Ok(x), Ok(y)) => {
                        assert_eq!(x.id(), y.id(), "promote({a:?},{b:?}) not commutative");
                        // Skip capacity-dependent flexible results; the
                        // built-in flexible singletons have no size yet.
                        if x.is_numeric() && da.is_numeric() && db.is_numeric() {
                            assert!(
                                can_cast_safely(&da, &x),
                                "{a:?} must cast to promote({a:?},{b:?})={x:?}"
                            );
                            assert!(can_cast_safely(&db, &x));
                        }
                    }
                    (Err(_), Err(_)) => {}
                    _ => panic!("promote({a:?},{b:?}) commutativity of failure"),
                }
            }
        }
    }

    #[test]
    fn test_promote_idempotent() {
        for &a in TypeId::ALL.iter() {
            let d = builtin(a);
            let p = promote_types(&d, &d).unwrap();
            assert_eq!(p.id(), d.id());
            assert!(can_cast_safely(&d, &d));
        }
    }

    #[test]
    fn test_promote_signed_unsigned() {
        assert_eq!(
            promote_types(&DType::uint8(), &DType::int16()).unwrap(),
            DType::int16()
        );
        assert_eq!(
            promote_types(&DType::uint16(), &DType::int16()).unwrap(),
            DType::int32()
        );
        assert_eq!(
            promote_types(&DType::uint64(), &DType::int64()).unwrap(),
            DType::float64()
        );
    }

    #[test]
    fn test_promote_int_float_complex() {
        assert_eq!(
            promote_types(&DType::int8(), &DType::float16()).unwrap(),
            DType::float16()
        );
        assert_eq!(
            promote_types(&DType::int16(), &DType::float16()).unwrap(),
            DType::float32()
        );
        assert_eq!(
            promote_types(&DType::int32(), &DType::float32()).unwrap(),
            DType::float64()
        );
        assert_eq!(
            promote_types(&DType::int64(), &DType::float64()).unwrap(),
            DType::float64()
        );
        assert_eq!(
            promote_types(&DType::int32(), &DType::complex64()).unwrap(),
            DType::complex128()
        );
        assert_eq!(
            promote_types(&DType::float64(), &DType::complex64()).unwrap(),
            DType::complex128()
        );
    }

    #[test]
    fn test_promote_strings_take_larger_capacity() {
        let s5 = DType::bytes(5);
        let s9 = DType::bytes(9);
        assert_eq!(promote_types(&s5, &s9).unwrap().size(), 9);

        let u2 = DType::unicode(2);
        let p = promote_types(&s5, &u2).unwrap();
        assert_eq!(p.kind(), Kind::Unicode);
        // Five byte characters need five unicode slots.
        assert_eq!(p.size(), 20);
    }

    #[test]
    fn test_safe_cast_rules() {
        assert!(can_cast_safely(&DType::bool_(), &DType::complex128()));
        assert!(!can_cast_safely(&DType::uint8(), &DType::bool_()));
        assert!(can_cast_safely(&DType::int64(), &DType::float64()));
        assert!(!can_cast_safely(&DType::int64(), &DType::float32()));
        assert!(!can_cast_safely(&DType::uint32(), &DType::float32()));
        assert!(can_cast_safely(&DType::uint16(), &DType::float32()));
        assert!(!can_cast_safely(&DType::float64(), &DType::int64()));
        assert!(can_cast_safely(&DType::int32(), &DType::object_()));
        assert!(!can_cast_safely(&DType::object_(), &DType::int32()));
    }

    #[test]
    fn test_can_cast_to_checks_string_capacity() {
        assert!(can_cast_to(&DType::bytes(4), &DType::bytes(4)));
        assert!(!can_cast_to(&DType::bytes(5), &DType::bytes(4)));
        // Bytes into unicode need four bytes per character.
        assert!(can_cast_to(&DType::bytes(3), &DType::unicode(3)));
        assert!(!can_cast_to(&DType::bytes(3), &DType::unicode(2)));
        // Unresolved capacity accepts anything.
        assert!(can_cast_to(&DType::int64(), &DType::bytes(0)));
        assert!(!can_cast_to(&DType::int64(), &DType::bytes(5)));
        assert!(can_cast_to(&DType::int64(), &DType::bytes(21)));
    }

    #[test]
    fn test_casting_rules() {
        let native = DType::int32();
        let swapped = native.with_byte_order(if cfg!(target_endian = "little") {
            crate::ByteOrder::Big
        } else {
            crate::ByteOrder::Little
        });
        assert!(can_cast_type_to(&native, &native, Casting::No));
        assert!(!can_cast_type_to(&native, &swapped, Casting::No));
        assert!(can_cast_type_to(&native, &swapped, Casting::Equiv));
        assert!(!can_cast_type_to(&native, &DType::int64(), Casting::Equiv));

        assert!(can_cast_type_to(
            &DType::float64(),
            &DType::float32(),
            Casting::SameKind
        ));
        assert!(!can_cast_type_to(
            &DType::float64(),
            &DType::int64(),
            Casting::SameKind
        ));
        assert!(can_cast_type_to(
            &DType::uint8(),
            &DType::int8(),
            Casting::SameKind
        ));
        assert!(can_cast_type_to(
            &DType::float64(),
            &DType::int64(),
            Casting::Unsafe
        ));
    }

    #[test]
    fn test_min_scalar_value_ladder() {
        let (d, small) = min_scalar_value(&DType::int64(), &Value::I64(5));
        assert_eq!(d, DType::uint8());
        assert!(small);

        let (d, small) = min_scalar_value(&DType::int64(), &Value::I64(200));
        assert_eq!(d, DType::uint8());
        assert!(!small);

        let (d, _) = min_scalar_value(&DType::int64(), &Value::I64(-5));
        assert_eq!(d, DType::int8());

        let (d, _) = min_scalar_value(&DType::float64(), &Value::F64(1e30));
        assert_eq!(d, DType::float32());
        let (d, _) = min_scalar_value(&DType::float64(), &Value::F64(1e300));
        assert_eq!(d, DType::float64());
        let (d, _) = min_scalar_value(&DType::float64(), &Value::F64(12.5));
        assert_eq!(d, DType::float16());
        // The half threshold is the historical 65000, not the exact 65504.
        let (d, _) = min_scalar_value(&DType::float64(), &Value::F64(65100.0));
        assert_eq!(d, DType::float32());
    }
}

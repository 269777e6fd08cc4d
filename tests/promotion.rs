use ndstride::{
    can_cast_safely, can_cast_to, can_cast_type_to, min_scalar_type, promote_types, result_type,
    Casting, DType, ErrorKind, StridedArray, TypeId, Value,
};

fn builtins() -> Vec<DType> {
    (0u16..18)
        .map(|id| DType::from_type_id(TypeId::from_u16(id).unwrap()))
        .collect()
}

#[test]
fn test_promotion_commutes_over_all_builtins() {
    for a in builtins() {
        for b in builtins() {
            let ab = promote_types(&a, &b);
            let ba = promote_types(&b, &a);
            match (ab, ba) {
                (Ok(x), Ok(y)) => assert_eq!(x.id(), y.id(), "{a} vs {b}"),
                (Err(_), Err(_)) => {}
                _ => panic!("promotion of {a} and {b} fails in one direction only"),
            }
        }
    }
}

#[test]
fn test_promoted_type_absorbs_both_operands() {
    for a in builtins() {
        for b in builtins() {
            if !a.is_numeric() || !b.is_numeric() {
                continue;
            }
            let p = promote_types(&a, &b).unwrap();
            assert!(can_cast_safely(&a, &p), "{a} -> promote({a},{b}) = {p}");
            assert!(can_cast_safely(&b, &p), "{b} -> promote({a},{b}) = {p}");
        }
    }
}

#[test]
fn test_identity_cast_and_idempotent_promotion() {
    for d in builtins() {
        assert!(can_cast_safely(&d, &d), "{d} must cast to itself");
        let p = promote_types(&d, &d).unwrap();
        assert_eq!(p.id(), d.id(), "promote({d},{d}) must be {d}");
    }
}

#[test]
fn test_result_type_single_operand_unchanged() {
    // A lone scalar keeps its declared type; no value-based minimization.
    let scalar = StridedArray::from_vec(vec![5i64], &[]).unwrap();
    let r = result_type(&[&scalar], &[]).unwrap();
    assert_eq!(r, DType::int64());

    let r = result_type(&[], &[DType::float16()]).unwrap();
    assert_eq!(r, DType::float16());
}

#[test]
fn test_result_type_weak_scalar_promotion() {
    // A 0-d int8 holding 5 does not widen a 1-d int8 operand.
    let scalar = StridedArray::from_vec(vec![5i8], &[]).unwrap();
    let array = StridedArray::from_vec(vec![1i8, 2], &[2]).unwrap();
    let r = result_type(&[&scalar, &array], &[]).unwrap();
    assert_eq!(r, DType::int8());

    // But against a float array, the float wins.
    let floats = StridedArray::from_vec(vec![1.0f32, 2.0], &[2]).unwrap();
    let r = result_type(&[&scalar, &floats], &[]).unwrap();
    assert_eq!(r, DType::float32());

    // A float scalar against an int array outranks it and promotes fully.
    let fscalar = StridedArray::from_vec(vec![2.5f64], &[]).unwrap();
    let ints = StridedArray::from_vec(vec![1i32, 2], &[2]).unwrap();
    let r = result_type(&[&fscalar, &ints], &[]).unwrap();
    assert_eq!(r, DType::float64());
}

#[test]
fn test_result_type_small_unsigned_combines_signed() {
    // uint16 scalar that fits int16 combines with an int16 array as signed.
    let scalar = StridedArray::from_vec(vec![300u16], &[]).unwrap();
    let array = StridedArray::from_vec(vec![1i16, 2], &[2]).unwrap();
    let r = result_type(&[&scalar, &array], &[]).unwrap();
    assert_eq!(r, DType::int16());

    // Out of the signed range, promotion widens instead.
    let big = StridedArray::from_vec(vec![40000u16], &[]).unwrap();
    let r = result_type(&[&big, &array], &[]).unwrap();
    assert_eq!(r, DType::int32());
}

#[test]
fn test_result_type_explicit_dtypes_are_full_operands() {
    let scalar = StridedArray::from_vec(vec![5i8], &[]).unwrap();
    // The same value as an explicit dtype forces the declared width.
    let r = result_type(&[&scalar], &[DType::int64()]).unwrap();
    assert_eq!(r, DType::int64());
}

#[test]
fn test_result_type_empty_operands_fails() {
    let err = result_type(&[], &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);
}

#[test]
fn test_min_scalar_type_only_affects_zero_dim() {
    let scalar = StridedArray::from_vec(vec![5i64], &[]).unwrap();
    assert_eq!(min_scalar_type(&scalar), DType::uint8());

    let negative = StridedArray::from_vec(vec![-300i64], &[]).unwrap();
    assert_eq!(min_scalar_type(&negative), DType::int16());

    let vector = StridedArray::from_vec(vec![5i64, 6], &[2]).unwrap();
    assert_eq!(min_scalar_type(&vector), DType::int64());

    let half_range = StridedArray::from_vec(vec![1000.0f64], &[]).unwrap();
    assert_eq!(min_scalar_type(&half_range), DType::float16());
}

#[test]
fn test_casting_rule_ladder() {
    let f64_ = DType::float64();
    let f32_ = DType::float32();
    let i64_ = DType::int64();

    assert!(can_cast_type_to(&f32_, &f64_, Casting::Safe));
    assert!(!can_cast_type_to(&f64_, &f32_, Casting::Safe));
    assert!(can_cast_type_to(&f64_, &f32_, Casting::SameKind));
    assert!(!can_cast_type_to(&f64_, &i64_, Casting::SameKind));
    assert!(can_cast_type_to(&i64_, &f64_, Casting::SameKind));
    assert!(can_cast_type_to(&f64_, &i64_, Casting::Unsafe));
    assert!(can_cast_type_to(&f64_, &f64_, Casting::No));
    assert!(!can_cast_type_to(&f64_, &f32_, Casting::No));
}

#[test]
fn test_string_capacity_rules() {
    assert!(can_cast_to(&DType::bytes(6), &DType::bytes(8)));
    assert!(!can_cast_to(&DType::bytes(8), &DType::bytes(6)));
    assert!(can_cast_to(&DType::unicode(2), &DType::unicode(3)));
    assert!(!can_cast_to(&DType::unicode(3), &DType::unicode(2)));
    // Unicode capacity counts four bytes per character.
    assert!(can_cast_to(&DType::bytes(2), &DType::unicode(2)));
    assert_eq!(DType::unicode(2).size(), 8);
}

#[test]
fn test_cast_round_trip_bit_for_bit() {
    let original: Vec<i16> = vec![-32768, -1, 0, 1, 255, 32767];
    let a = StridedArray::from_vec(original.clone(), &[6]).unwrap();
    let through = a.cast_to(&DType::float64(), Casting::Safe).unwrap();
    let back = through.cast_to(&DType::int16(), Casting::Unsafe).unwrap();
    assert_eq!(back.to_vec::<i16>().unwrap(), original);
}

#[test]
fn test_cast_round_trip_through_string() {
    let a = StridedArray::from_vec(vec![42i32, -7], &[2]).unwrap();
    let text = a.cast_to(&DType::bytes(0), Casting::Safe).unwrap();
    assert_eq!(text.get(&[0]).unwrap(), Value::Bytes(b"42".to_vec()));
    let back = text.cast_to(&DType::int32(), Casting::Unsafe).unwrap();
    assert_eq!(back.to_vec::<i32>().unwrap(), vec![42, -7]);
}

#[test]
fn test_object_and_structured_are_sinks_only() {
    let point = DType::structured(&[("x", DType::float32()), ("y", DType::float32())]).unwrap();
    assert!(can_cast_safely(&DType::int32(), &DType::object_()));
    assert!(can_cast_safely(&DType::int32(), &point));
    assert!(!can_cast_safely(&DType::object_(), &DType::int32()));
    assert!(!can_cast_safely(&point, &DType::int32()));

    let err = promote_types(&point, &DType::int32()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
}

//! Duck Typing Integration Tests
//!
//! End-to-end tests for the shape-adapting proxy generator:
//! - Structural-subset round trips across primitive, boxed, and
//!   reference members
//! - Conversion policy agreement between planning and validation
//! - Runtime cast failures at invocation, not construction
//! - Plan caching and cross-thread synthesis convergence
//!
//! # Running Tests
//! ```bash
//! cargo test --test duck_tests
//! ```

use std::sync::Arc;

use weave_engine::convert;
use weave_engine::{
    ClassDesc, MemberDesc, PrimKind, ProxyFactory, RuntimeError, ShapeDescriptor, ShapeMember,
    TypeRegistry, TypeSig, Value,
};

// ===== Fixtures =====

struct Account {
    id: i32,
    owner: String,
    balance: i64,
}

fn i32_sig() -> TypeSig {
    TypeSig::Prim(PrimKind::I32)
}

fn i64_sig() -> TypeSig {
    TypeSig::Prim(PrimKind::I64)
}

fn account_payload(value: &Value) -> Result<&Account, RuntimeError> {
    value
        .as_object()
        .and_then(|o| o.downcast::<Account>())
        .ok_or(RuntimeError::NullReceiver)
}

/// An Account class exposing primitive, string, and parameterized
/// members.
fn register_account(types: &TypeRegistry) -> weave_engine::ClassId {
    let string_sig = TypeSig::Class(types.string_class());
    types
        .register_class(
            ClassDesc::new("Account")
                .with_member(MemberDesc::getter("Id", i32_sig(), |recv, _| {
                    Ok(Value::I32(account_payload(recv.unwrap())?.id))
                }))
                .with_member(MemberDesc::getter("Owner", string_sig, |recv, _| {
                    Ok(Value::string(&account_payload(recv.unwrap())?.owner))
                }))
                .with_member(MemberDesc::method(
                    "WithFee",
                    vec![i64_sig()],
                    i64_sig(),
                    |recv, args| {
                        let account = account_payload(recv.unwrap())?;
                        let fee = args[0]
                            .as_i64()
                            .ok_or_else(|| RuntimeError::TypeError("fee must be i64".into()))?;
                        Ok(Value::I64(account.balance - fee))
                    },
                ))
                .with_member(MemberDesc::static_method(
                    "Kind",
                    vec![],
                    i32_sig(),
                    |_, _| Ok(Value::I32(7)),
                )),
        )
        .unwrap()
}

fn account_value(types: &TypeRegistry) -> Value {
    let class = types.class_by_name("Account").unwrap();
    Value::object(
        class,
        Arc::new(Account {
            id: 12,
            owner: "ada".to_string(),
            balance: 500,
        }),
    )
}

// ===== Round-trip tests =====

#[test]
fn test_structural_subset_round_trip() {
    let types = Arc::new(TypeRegistry::new());
    register_account(&types);
    let factory = ProxyFactory::new(types.clone());

    let shape = types.register_shape(
        ShapeDescriptor::new("IAccount")
            .with_member(ShapeMember::getter("Id", i32_sig()))
            .with_member(ShapeMember::getter(
                "Owner",
                TypeSig::Class(types.string_class()),
            ))
            .with_member(ShapeMember::method("WithFee", vec![i64_sig()], i64_sig()))
            .with_member(ShapeMember::static_method("Kind", vec![], i32_sig())),
    );

    let instance = account_value(&types);
    let handle = factory.adapt(&instance, shape).unwrap();

    // Adapted members agree with direct invocation
    assert_eq!(handle.get("Id").unwrap(), Value::I32(12));
    assert_eq!(handle.get("Owner").unwrap(), Value::string("ada"));
    assert_eq!(
        handle.invoke("WithFee", &[Value::I64(25)]).unwrap(),
        Value::I64(475)
    );
    assert_eq!(handle.invoke("Kind", &[]).unwrap(), Value::I32(7));
}

#[test]
fn test_boxing_member_results() {
    // Concrete `i32 Id()` seen through `object Id()` boxes the result
    let types = Arc::new(TypeRegistry::new());
    register_account(&types);
    let factory = ProxyFactory::new(types.clone());

    let shape = types.register_shape(
        ShapeDescriptor::new("IIdObj").with_member(ShapeMember::getter("Id", TypeSig::Object)),
    );
    let handle = factory.adapt(&account_value(&types), shape).unwrap();

    let boxed = handle.get("Id").unwrap();
    assert_eq!(
        boxed.as_object().unwrap().class(),
        types.box_class(PrimKind::I32)
    );
    assert_eq!(
        convert::unbox_value(&boxed, PrimKind::I32, &types).unwrap(),
        Value::I32(12)
    );
}

#[test]
fn test_reference_member_upcast_to_object() {
    let types = Arc::new(TypeRegistry::new());
    register_account(&types);
    let factory = ProxyFactory::new(types.clone());

    let shape = types.register_shape(
        ShapeDescriptor::new("IOwnerObj")
            .with_member(ShapeMember::getter("Owner", TypeSig::Object)),
    );
    let handle = factory.adapt(&account_value(&types), shape).unwrap();

    // string -> object is a no-op upcast, same value through
    assert_eq!(handle.get("Owner").unwrap(), Value::string("ada"));
}

// ===== Failure tests =====

#[test]
fn test_incompatible_argument_fails_at_invocation() {
    // Shape widens the parameter to object; a runtime argument that is
    // not a boxed i64 fails the checked unbox at the call
    let types = Arc::new(TypeRegistry::new());
    register_account(&types);
    let factory = ProxyFactory::new(types.clone());

    let shape = types.register_shape(
        ShapeDescriptor::new("IFeeObj").with_member(ShapeMember::method(
            "WithFee",
            vec![TypeSig::Object],
            i64_sig(),
        )),
    );
    let handle = factory.adapt(&account_value(&types), shape).unwrap();

    let good = convert::box_value(&Value::I64(100), &types).unwrap();
    assert_eq!(
        handle.invoke("WithFee", &[good]).unwrap(),
        Value::I64(400)
    );

    let bad = convert::box_value(&Value::I32(100), &types).unwrap();
    let err = handle.invoke("WithFee", &[bad]).unwrap_err();
    assert!(matches!(err, RuntimeError::InvalidCast { .. }));
}

#[test]
fn test_shape_mismatch_is_synchronous_and_uncached() {
    let types = Arc::new(TypeRegistry::new());
    register_account(&types);
    let factory = ProxyFactory::new(types.clone());

    let shape = types.register_shape(
        ShapeDescriptor::new("IBalanceNarrow")
            // i64 member seen as i32: distinct value types reject
            .with_member(ShapeMember::method("WithFee", vec![i64_sig()], i32_sig())),
    );

    let err = factory.adapt(&account_value(&types), shape).unwrap_err();
    assert!(err.to_string().contains("WithFee"), "got: {err}");
    assert_eq!(factory.stats().cached_plans, 0);

    // A different concrete type may still succeed later; nothing was
    // poisoned for the shape itself
    let other = types
        .register_class(ClassDesc::new("Flat").with_member(MemberDesc::method(
            "WithFee",
            vec![i64_sig()],
            i32_sig(),
            |_, _| Ok(Value::I32(0)),
        )))
        .unwrap();
    let flat = Value::object(other, Arc::new(()));
    assert!(factory.adapt(&flat, shape).is_ok());
}

// ===== Policy agreement tests =====

#[test]
fn test_policy_decision_matches_validation_across_grid() {
    let types = Arc::new(TypeRegistry::new());
    let iface = types
        .register_class(ClassDesc::interface("Comparable"))
        .unwrap();
    types
        .add_interface(types.box_class(PrimKind::I32), iface)
        .unwrap();
    let base = types.register_class(ClassDesc::new("Base")).unwrap();
    let derived = types
        .register_class(ClassDesc::new("Derived").with_parent(base))
        .unwrap();

    let grid = [
        TypeSig::Unit,
        TypeSig::Object,
        i32_sig(),
        i64_sig(),
        TypeSig::Prim(PrimKind::Bool),
        TypeSig::Prim(PrimKind::F64),
        TypeSig::Class(iface),
        TypeSig::Class(base),
        TypeSig::Class(derived),
        TypeSig::Class(types.string_class()),
        TypeSig::Enum {
            class: base,
            underlying: PrimKind::I32,
        },
    ];

    for actual in &grid {
        for expected in &grid {
            assert_eq!(
                convert::check(actual, expected, &types),
                convert::plan(actual, expected, &types).is_ok(),
                "disagreement on ({actual:?}, {expected:?})"
            );
        }
    }
}

// ===== Caching tests =====

#[test]
fn test_same_pair_shares_generated_logic() {
    let types = Arc::new(TypeRegistry::new());
    register_account(&types);
    let factory = ProxyFactory::new(types.clone());

    let shape = types.register_shape(
        ShapeDescriptor::new("IAccountId").with_member(ShapeMember::getter("Id", i32_sig())),
    );
    // Structurally identical descriptor resolves to the same shape id
    let shape_again = types.register_shape(
        ShapeDescriptor::new("IAccountId").with_member(ShapeMember::getter("Id", i32_sig())),
    );
    assert_eq!(shape, shape_again);

    let a = factory.adapt(&account_value(&types), shape).unwrap();
    let b = factory.adapt(&account_value(&types), shape_again).unwrap();
    assert!(Arc::ptr_eq(a.plan(), b.plan()));
    assert_eq!(factory.stats().cached_plans, 1);
}

#[test]
fn test_concurrent_adapt_synthesizes_once() {
    let types = Arc::new(TypeRegistry::new());
    register_account(&types);
    let factory = Arc::new(ProxyFactory::new(types.clone()));

    let shape = types.register_shape(
        ShapeDescriptor::new("IAccountId").with_member(ShapeMember::getter("Id", i32_sig())),
    );
    let barrier = Arc::new(std::sync::Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let factory = factory.clone();
            let types = types.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                let handle = factory.adapt(&account_value(&types), shape).unwrap();
                assert_eq!(handle.get("Id").unwrap(), Value::I32(12));
                Arc::as_ptr(handle.plan()) as usize
            })
        })
        .collect();

    let plans: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(plans.windows(2).all(|w| w[0] == w[1]), "plans diverged");
    assert_eq!(factory.stats().cached_plans, 1);
}

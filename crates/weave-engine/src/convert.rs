//! Type-conversion policy
//!
//! Pure decision function mapping an actual type and an expected type
//! to a conversion, shared between the emission layer (which turns the
//! decision into ops) and the proxy generator's ahead-of-time
//! validation. `check` is defined directly on top of `plan`, so the
//! emitting and non-emitting variants cannot disagree.
//!
//! Enumeration types are substituted with their underlying primitive
//! before any decision. Distinct primitive kinds never convert, not
//! even widening.

use weave_sdk::{PrimKind, TypeSig, Value};

use crate::types::TypeRegistry;
use crate::{ClassId, RuntimeError};

/// The planned conversion for one value crossing an adapter boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conversion {
    /// Types agree; pass through
    Identity,
    /// Wrap a primitive into its box class
    Box,
    /// Wrap a primitive, then narrow the box to an interface it
    /// implements
    BoxCast(ClassId),
    /// Unwrap a boxed primitive, checking the runtime kind at the point
    /// of use
    UnboxChecked(PrimKind),
    /// Narrow a reference, checking the runtime class at the point of
    /// use
    CastRef(ClassId),
}

/// Policy rejections. Messages carry rendered type names.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConvertError {
    /// Two distinct value types never convert
    #[error("Value type mismatch: {actual} cannot convert to {expected}")]
    ValueTypeMismatch {
        /// Rendered actual type
        actual: String,
        /// Rendered expected type
        expected: String,
    },

    /// A primitive cannot box into the expected reference type
    #[error("{actual} does not box to {expected}")]
    NotBoxable {
        /// Rendered actual type
        actual: String,
        /// Rendered expected type
        expected: String,
    },

    /// The reference type cannot hold the expected primitive
    #[error("{actual} cannot unbox to {expected}")]
    NotUnboxable {
        /// Rendered actual type
        actual: String,
        /// Rendered expected type
        expected: String,
    },

    /// No conversion exists between the pair
    #[error("No conversion from {actual} to {expected}")]
    Incompatible {
        /// Rendered actual type
        actual: String,
        /// Rendered expected type
        expected: String,
    },
}

/// Decide the conversion for a value of type `actual` crossing into a
/// position expecting `expected`.
pub fn plan(
    actual: &TypeSig,
    expected: &TypeSig,
    types: &TypeRegistry,
) -> Result<Conversion, ConvertError> {
    let actual = types.normalize(actual);
    let expected = types.normalize(expected);

    if actual == expected {
        return Ok(Conversion::Identity);
    }

    match (&actual, &expected) {
        // Unit never converts to or from anything else
        (TypeSig::Unit, _) | (_, TypeSig::Unit) => Err(ConvertError::Incompatible {
            actual: types.describe(&actual),
            expected: types.describe(&expected),
        }),

        (TypeSig::Prim(_), TypeSig::Prim(_)) => Err(ConvertError::ValueTypeMismatch {
            actual: types.describe(&actual),
            expected: types.describe(&expected),
        }),

        (TypeSig::Prim(_), TypeSig::Object) => Ok(Conversion::Box),

        (TypeSig::Prim(kind), TypeSig::Class(class)) => {
            if types.assignable(types.box_class(*kind), *class) {
                Ok(Conversion::BoxCast(*class))
            } else {
                Err(ConvertError::NotBoxable {
                    actual: types.describe(&actual),
                    expected: types.describe(&expected),
                })
            }
        }

        (TypeSig::Object, TypeSig::Prim(kind)) => Ok(Conversion::UnboxChecked(*kind)),

        (TypeSig::Class(class), TypeSig::Prim(kind)) => {
            // Legal only when a reference of this class can hold the
            // boxed primitive: the class is the box itself, or a
            // capability the box implements.
            if types.assignable(types.box_class(*kind), *class) {
                Ok(Conversion::UnboxChecked(*kind))
            } else {
                Err(ConvertError::NotUnboxable {
                    actual: types.describe(&actual),
                    expected: types.describe(&expected),
                })
            }
        }

        // Implicit upcast to the universal reference type
        (TypeSig::Class(_), TypeSig::Object) => Ok(Conversion::Identity),

        (TypeSig::Object, TypeSig::Class(class)) => Ok(Conversion::CastRef(*class)),

        (TypeSig::Class(_), TypeSig::Class(class)) => Ok(Conversion::CastRef(*class)),

        _ => Err(ConvertError::Incompatible {
            actual: types.describe(&actual),
            expected: types.describe(&expected),
        }),
    }
}

/// Non-emitting validation variant: same accept/reject decisions as
/// `plan`, by construction.
pub fn check(actual: &TypeSig, expected: &TypeSig, types: &TypeRegistry) -> bool {
    plan(actual, expected, types).is_ok()
}

// ============================================================================
// Runtime application
// ============================================================================

/// Wrap a primitive value into its box class.
pub fn box_value(value: &Value, types: &TypeRegistry) -> Result<Value, RuntimeError> {
    let kind = value.prim_kind().ok_or_else(|| RuntimeError::InvalidCast {
        from: value.kind_name().to_string(),
        to: "boxed primitive".to_string(),
    })?;
    Ok(Value::object(
        types.box_class(kind),
        std::sync::Arc::new(value.clone()),
    ))
}

/// Unwrap a boxed primitive, checking the runtime kind. Fails with a
/// cast error at the point of use when the runtime value is not a box
/// of `expected`.
pub fn unbox_value(
    value: &Value,
    expected: PrimKind,
    types: &TypeRegistry,
) -> Result<Value, RuntimeError> {
    let fail = || RuntimeError::InvalidCast {
        from: value.kind_name().to_string(),
        to: expected.name().to_string(),
    };
    let obj = value.as_object().ok_or_else(fail)?;
    if obj.class() != types.box_class(expected) {
        return Err(RuntimeError::InvalidCast {
            from: types.describe(&TypeSig::Class(obj.class())),
            to: expected.name().to_string(),
        });
    }
    obj.downcast::<Value>().cloned().ok_or_else(fail)
}

/// Narrow a reference to `class`, checking the runtime class. Null
/// passes every reference cast.
pub fn cast_ref(value: &Value, class: ClassId, types: &TypeRegistry) -> Result<Value, RuntimeError> {
    let runtime = match value {
        Value::Null => return Ok(Value::Null),
        Value::Str(_) => types.string_class(),
        Value::Obj(obj) => obj.class(),
        prim => {
            return Err(RuntimeError::InvalidCast {
                from: prim.kind_name().to_string(),
                to: types.describe(&TypeSig::Class(class)),
            })
        }
    };
    if types.assignable(runtime, class) {
        Ok(value.clone())
    } else {
        Err(RuntimeError::InvalidCast {
            from: types.describe(&TypeSig::Class(runtime)),
            to: types.describe(&TypeSig::Class(class)),
        })
    }
}

/// Apply a planned conversion to a runtime value.
pub fn apply(
    conversion: &Conversion,
    value: &Value,
    types: &TypeRegistry,
) -> Result<Value, RuntimeError> {
    match conversion {
        Conversion::Identity => Ok(value.clone()),
        Conversion::Box => box_value(value, types),
        Conversion::BoxCast(class) => {
            let boxed = box_value(value, types)?;
            cast_ref(&boxed, *class, types)
        }
        Conversion::UnboxChecked(kind) => unbox_value(value, *kind, types),
        Conversion::CastRef(class) => cast_ref(value, *class, types),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClassDesc;
    use weave_sdk::ClassId as Id;

    fn i32_sig() -> TypeSig {
        TypeSig::Prim(PrimKind::I32)
    }

    fn i64_sig() -> TypeSig {
        TypeSig::Prim(PrimKind::I64)
    }

    #[test]
    fn test_identity() {
        let types = TypeRegistry::new();
        assert_eq!(
            plan(&i32_sig(), &i32_sig(), &types).unwrap(),
            Conversion::Identity
        );
        assert_eq!(
            plan(&TypeSig::Object, &TypeSig::Object, &types).unwrap(),
            Conversion::Identity
        );
        assert_eq!(
            plan(&TypeSig::Unit, &TypeSig::Unit, &types).unwrap(),
            Conversion::Identity
        );
    }

    #[test]
    fn test_distinct_value_types_reject() {
        let types = TypeRegistry::new();
        // Strict policy: not even widening
        assert!(matches!(
            plan(&i32_sig(), &i64_sig(), &types),
            Err(ConvertError::ValueTypeMismatch { .. })
        ));
        assert!(plan(&i64_sig(), &i32_sig(), &types).is_err());
    }

    #[test]
    fn test_box_to_object() {
        let types = TypeRegistry::new();
        assert_eq!(
            plan(&i32_sig(), &TypeSig::Object, &types).unwrap(),
            Conversion::Box
        );
    }

    #[test]
    fn test_box_cast_requires_capability() {
        let types = TypeRegistry::new();
        let comparable = types
            .register_class(ClassDesc::interface("Comparable"))
            .unwrap();
        let other = types.register_class(ClassDesc::interface("Other")).unwrap();
        types
            .add_interface(types.box_class(PrimKind::I32), comparable)
            .unwrap();

        assert_eq!(
            plan(&i32_sig(), &TypeSig::Class(comparable), &types).unwrap(),
            Conversion::BoxCast(comparable)
        );
        assert!(matches!(
            plan(&i32_sig(), &TypeSig::Class(other), &types),
            Err(ConvertError::NotBoxable { .. })
        ));
    }

    #[test]
    fn test_unbox_from_object_and_capability() {
        let types = TypeRegistry::new();
        let comparable = types
            .register_class(ClassDesc::interface("Comparable"))
            .unwrap();
        let unrelated = types.register_class(ClassDesc::new("Widget")).unwrap();
        types
            .add_interface(types.box_class(PrimKind::I32), comparable)
            .unwrap();

        assert_eq!(
            plan(&TypeSig::Object, &i32_sig(), &types).unwrap(),
            Conversion::UnboxChecked(PrimKind::I32)
        );
        // A Comparable reference may hold a boxed i32
        assert_eq!(
            plan(&TypeSig::Class(comparable), &i32_sig(), &types).unwrap(),
            Conversion::UnboxChecked(PrimKind::I32)
        );
        assert!(matches!(
            plan(&TypeSig::Class(unrelated), &i32_sig(), &types),
            Err(ConvertError::NotUnboxable { .. })
        ));
    }

    #[test]
    fn test_reference_conversions() {
        let types = TypeRegistry::new();
        let base = types.register_class(ClassDesc::new("Base")).unwrap();
        let derived = types
            .register_class(ClassDesc::new("Derived").with_parent(base))
            .unwrap();

        // Upcast to the universal type is a no-op
        assert_eq!(
            plan(&TypeSig::Class(base), &TypeSig::Object, &types).unwrap(),
            Conversion::Identity
        );
        // Any other reference pair gets a checked cast
        assert_eq!(
            plan(&TypeSig::Object, &TypeSig::Class(base), &types).unwrap(),
            Conversion::CastRef(base)
        );
        assert_eq!(
            plan(&TypeSig::Class(derived), &TypeSig::Class(base), &types).unwrap(),
            Conversion::CastRef(base)
        );
        assert_eq!(
            plan(&TypeSig::Class(base), &TypeSig::Class(derived), &types).unwrap(),
            Conversion::CastRef(derived)
        );
    }

    #[test]
    fn test_enum_underlying_substitution() {
        let types = TypeRegistry::new();
        let color = types.register_class(ClassDesc::new("Color")).unwrap();
        let color_enum = TypeSig::Enum {
            class: color,
            underlying: PrimKind::I32,
        };

        assert_eq!(
            plan(&color_enum, &i32_sig(), &types).unwrap(),
            Conversion::Identity
        );
        assert_eq!(
            plan(&color_enum, &TypeSig::Object, &types).unwrap(),
            Conversion::Box
        );
        assert!(plan(&color_enum, &i64_sig(), &types).is_err());
    }

    #[test]
    fn test_unit_rejects_everything_else() {
        let types = TypeRegistry::new();
        assert!(plan(&TypeSig::Unit, &TypeSig::Object, &types).is_err());
        assert!(plan(&i32_sig(), &TypeSig::Unit, &types).is_err());
    }

    #[test]
    fn test_check_agrees_with_plan() {
        let types = TypeRegistry::new();
        let base = types.register_class(ClassDesc::new("Base")).unwrap();
        let grid = [
            TypeSig::Unit,
            TypeSig::Object,
            i32_sig(),
            i64_sig(),
            TypeSig::Prim(PrimKind::Bool),
            TypeSig::Class(base),
            TypeSig::Class(Id(0)),
        ];
        for actual in &grid {
            for expected in &grid {
                assert_eq!(
                    check(actual, expected, &types),
                    plan(actual, expected, &types).is_ok(),
                    "policy/validation disagree on ({actual:?}, {expected:?})"
                );
            }
        }
    }

    #[test]
    fn test_runtime_box_roundtrip() {
        let types = TypeRegistry::new();
        let boxed = box_value(&Value::I32(42), &types).unwrap();
        let obj = boxed.as_object().unwrap();
        assert_eq!(obj.class(), types.box_class(PrimKind::I32));

        let unboxed = unbox_value(&boxed, PrimKind::I32, &types).unwrap();
        assert_eq!(unboxed, Value::I32(42));
    }

    #[test]
    fn test_runtime_unbox_wrong_kind_fails() {
        let types = TypeRegistry::new();
        let boxed = box_value(&Value::I32(42), &types).unwrap();
        let err = unbox_value(&boxed, PrimKind::I64, &types).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidCast { .. }));

        assert!(unbox_value(&Value::Null, PrimKind::I32, &types).is_err());
    }

    #[test]
    fn test_runtime_cast_ref() {
        let types = TypeRegistry::new();
        let base = types.register_class(ClassDesc::new("Base")).unwrap();
        let derived = types
            .register_class(ClassDesc::new("Derived").with_parent(base))
            .unwrap();
        let instance = Value::object(derived, std::sync::Arc::new(()));

        assert!(cast_ref(&instance, base, &types).is_ok());
        assert_eq!(cast_ref(&Value::Null, base, &types).unwrap(), Value::Null);

        let base_instance = Value::object(base, std::sync::Arc::new(()));
        let err = cast_ref(&base_instance, derived, &types).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidCast { .. }));
    }
}

//! Attribute compilation through the builders and the session

use kiln_engine::{
    AttributeError, AttributeExpr, AttributeValue, Body, BuildError, BuildSession, Constant,
    FieldConfig, MethodConfig, Primitive, TypeConfig, TypeRef, Visibility,
};

#[test]
fn test_type_attribute_reaches_realized_type() {
    let session = BuildSession::new();
    let mut asm = session.define_assembly("Tagged");
    {
        let mut tb = asm.define_type("Widget", TypeConfig::public()).unwrap();
        let expr = AttributeExpr::new(
            "SomeAttr",
            vec![AttributeExpr::constant(1), AttributeExpr::constant("x")],
        )
        .init("Flag", AttributeExpr::constant(true));
        tb.apply_attribute(&expr).unwrap();
    }
    asm.finalize().unwrap();

    let widget = session.realized_by_name("Widget").unwrap();
    assert_eq!(widget.custom_attributes.len(), 1);
    let payload = &widget.custom_attributes[0];
    assert_eq!(payload.attribute(), "SomeAttr");
    assert_eq!(
        payload.constructor_args(),
        &[AttributeValue::I32(1), AttributeValue::Str("x".to_string())]
    );
    assert_eq!(payload.property("Flag"), Some(&AttributeValue::Bool(true)));
    assert_eq!(payload.properties().count(), 1);
}

#[test]
fn test_method_attribute_reaches_realized_method() {
    let session = BuildSession::new();
    let mut asm = session.define_assembly("Obsolete");
    let run = {
        let mut tb = asm.define_type("Job", TypeConfig::public()).unwrap();
        let run = tb
            .define_method("Run", MethodConfig::public().no_params(), Body::Minimal)
            .unwrap();
        tb.method(run)
            .unwrap()
            .apply_attribute(&AttributeExpr::new(
                "Obsolete",
                vec![AttributeExpr::constant("use Start")],
            ))
            .unwrap();
        run
    };
    asm.finalize().unwrap();

    let job = session.realized(run.owner).unwrap();
    let method = job.method(run.index).unwrap();
    assert_eq!(method.custom_attributes.len(), 1);
    assert_eq!(
        method.custom_attributes[0].constructor_args(),
        &[AttributeValue::Str("use Start".to_string())]
    );
    assert!(job.custom_attributes.is_empty());
}

#[test]
fn test_method_call_argument_is_rejected() {
    let session = BuildSession::new();
    let mut asm = session.define_assembly("Rejected");
    let mut tb = asm.define_type("Widget", TypeConfig::public()).unwrap();
    let expr = AttributeExpr::new(
        "SomeAttr",
        vec![AttributeExpr::call("Compute", vec![AttributeExpr::constant(2)])],
    );
    assert!(matches!(
        tb.apply_attribute(&expr),
        Err(BuildError::Attribute(AttributeError::Malformed(_)))
    ));
    drop(tb);

    // Nothing was attached
    asm.finalize().unwrap();
    assert!(session.realized_by_name("Widget").unwrap().custom_attributes.is_empty());
}

#[test]
fn test_static_field_of_earlier_unit_is_folded() {
    let session = BuildSession::new();
    let (max, level_high) = {
        let mut asm = session.define_assembly("Settings");
        let max = {
            let mut tb = asm.define_type("Config", TypeConfig::public()).unwrap();
            tb.define_field(
                "Max",
                TypeRef::I32,
                FieldConfig::public().as_static().with_default(Constant::I32(64)),
            )
            .unwrap()
            .unwrap()
        };
        let high = {
            let mut tb = asm.define_enum("Level", Visibility::Public, Primitive::I32).unwrap();
            tb.define_literal("Low", None).unwrap();
            tb.define_literal("High", Some(9)).unwrap()
        };
        asm.finalize().unwrap();
        (max, high)
    };
    assert_eq!(session.find_field(max.owner, "Max").unwrap().handle, max);

    let mut asm = session.define_assembly("Consumers");
    {
        let mut tb = asm.define_type("Cache", TypeConfig::public()).unwrap();
        let expr = AttributeExpr::new(
            "Limit",
            vec![AttributeExpr::static_field(max).convert(TypeRef::I64)],
        )
        .init("Level", AttributeExpr::static_field(level_high));
        tb.apply_attribute(&expr).unwrap();
    }
    asm.finalize().unwrap();

    let cache = session.realized_by_name("Cache").unwrap();
    let payload = &cache.custom_attributes[0];
    assert_eq!(payload.constructor_args(), &[AttributeValue::I64(64)]);
    assert_eq!(payload.property("Level"), Some(&AttributeValue::I32(9)));
}

#[test]
fn test_static_field_of_unfinished_type_is_rejected() {
    let session = BuildSession::new();
    let mut asm = session.define_assembly("Early");
    let mut tb = asm.define_type("Config", TypeConfig::public()).unwrap();
    let max = tb
        .define_field("Max", TypeRef::I32, FieldConfig::public().as_static())
        .unwrap()
        .unwrap();
    let expr = AttributeExpr::new("Limit", vec![AttributeExpr::static_field(max)]);
    assert!(matches!(
        tb.apply_attribute(&expr),
        Err(BuildError::Attribute(AttributeError::Malformed(_)))
    ));
}

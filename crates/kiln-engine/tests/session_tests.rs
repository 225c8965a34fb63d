//! Session lifecycle: finalize, cross-unit resolution, concurrency, body replacement

use std::sync::Arc;
use std::thread;

use kiln_engine::{
    Body, BuildError, BuildSession, FieldConfig, MethodConfig, TypeConfig, TypeHandle, TypeId,
    TypeKind, TypeRef, Value, Vm,
};

fn returning(value: i32) -> Body<'static> {
    Body::with(move |il, _| {
        il.ldc_i4(value).ret();
        Ok(())
    })
}

// ============================================================================
// Finalize
// ============================================================================

#[test]
fn test_finalize_is_idempotent() {
    let session = BuildSession::new();
    let mut asm = session.define_assembly("Once");
    asm.set_module_name("Once.Module");
    let outer = {
        let mut tb = asm.define_type("Outer", TypeConfig::public()).unwrap();
        tb.define_nested_type("Inner", TypeConfig::public()).unwrap();
        tb.handle()
    };
    asm.define_interface("IMarker", TypeConfig::public()).unwrap();

    let first = asm.finalize().unwrap();
    let count = session.type_count();
    let second = asm.finalize().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(session.type_count(), count);
    assert!(asm.is_finalized());

    assert_eq!(first.module_name, "Once.Module");
    assert_eq!(first.len(), 3);
    assert_eq!(first.top_level.len(), 2);
    assert_eq!(first.top_level[0], outer);
    // Nested types are realized before their enclosing type
    let inner = session.resolve_type("Outer+Inner").unwrap();
    let position = |h: TypeHandle| first.types.iter().position(|t| *t == h).unwrap();
    assert!(position(inner) < position(outer));
}

#[test]
fn test_no_changes_after_finalize() {
    let session = BuildSession::new();
    let mut asm = session.define_assembly("Frozen");
    let handle = asm.define_type("Frozen", TypeConfig::public()).unwrap().handle();
    asm.finalize().unwrap();

    assert!(matches!(
        asm.define_type("Late", TypeConfig::public()),
        Err(BuildError::TypeRealized(_))
    ));
    let mut tb = asm.type_builder(handle).unwrap();
    assert_eq!(
        tb.define_method("Late", MethodConfig::public().no_params(), Body::Minimal),
        Err(BuildError::TypeRealized("Frozen".to_string()))
    );
}

#[test]
fn test_failed_finalize_withdraws_and_can_be_retried() {
    let session = BuildSession::new();
    let mut asm = session.define_assembly("Retry");
    let iface = {
        let mut tb = asm.define_interface("IRun", TypeConfig::public()).unwrap();
        tb.define_method("Run", MethodConfig::public().no_params(), Body::Minimal)
            .unwrap();
        tb.type_ref()
    };
    let good = asm.define_type("Good", TypeConfig::public()).unwrap().handle();
    let lazy = asm
        .define_type("Lazy", TypeConfig::public().implements(iface))
        .unwrap()
        .handle();

    assert!(matches!(asm.finalize(), Err(BuildError::InvalidMember { .. })));
    assert!(!asm.is_finalized());
    assert_eq!(session.type_count(), 0);
    assert_eq!(session.resolve_type("IRun"), None);
    assert_eq!(session.resolve_type("Good"), None);
    assert!(!asm.descriptor(good.id).unwrap().is_realized());

    // The unit is still open for changes
    asm.type_builder(lazy)
        .unwrap()
        .define_method("Run", MethodConfig::public().no_params(), Body::Minimal)
        .unwrap();
    let unit = asm.finalize().unwrap();
    assert_eq!(unit.len(), 3);
    assert!(unit.contains(good.id));
    assert!(unit.contains(lazy.id));
    assert_eq!(session.type_count(), 3);
    assert_eq!(session.resolve_type("Good"), Some(good));
}

// ============================================================================
// Body Replacement
// ============================================================================

#[test]
fn test_replace_body_before_and_after_realization() {
    let session = BuildSession::new();
    let mut asm = session.define_assembly("Patch");
    let (ty, answer) = {
        let mut tb = asm.define_type("Oracle", TypeConfig::public()).unwrap();
        let m = tb
            .define_method(
                "Answer",
                MethodConfig::public().as_static().no_params().returns(TypeRef::I32),
                returning(1),
            )
            .unwrap();
        let mut mb = tb.method(m).unwrap();
        mb.replace_body(returning(42)).unwrap();
        assert_eq!(mb.signature().unwrap().return_type, TypeRef::I32);
        (tb.handle(), m)
    };
    asm.finalize().unwrap();

    let mut vm = Vm::new(&session);
    assert_eq!(vm.invoke_static(ty, "Answer", &[]).unwrap(), Value::I32(42));

    let mut tb = asm.type_builder(ty).unwrap();
    let mut mb = tb.method(answer).unwrap();
    assert_eq!(
        mb.replace_body(returning(7)).err(),
        Some(BuildError::TypeRealized("Oracle".to_string()))
    );
    assert_eq!(vm.invoke_static(ty, "Answer", &[]).unwrap(), Value::I32(42));
}

// ============================================================================
// Cross-Unit Resolution
// ============================================================================

#[test]
fn test_later_unit_derives_from_realized_type() {
    let session = BuildSession::new();
    {
        let mut core = session.define_assembly("Core");
        let mut tb = core.define_type("Greeter", TypeConfig::public()).unwrap();
        tb.define_default_constructor().unwrap();
        tb.define_method(
            "Greet",
            MethodConfig::public().as_virtual().no_params().returns(TypeRef::String),
            Body::with(|il, _| {
                il.ldstr("hello").ret();
                Ok(())
            }),
        )
        .unwrap();
        core.finalize().unwrap();
    }

    let greeter = session.type_ref("Greeter").unwrap();
    let mut ext = session.define_assembly("Ext");
    let loud = {
        let mut tb = ext
            .define_type("LoudGreeter", TypeConfig::public().extends(greeter.clone()))
            .unwrap();
        tb.define_default_constructor().unwrap();
        tb.define_method(
            "Greet",
            MethodConfig::public(),
            Body::with(|il, _| {
                il.ldstr("HELLO").ret();
                Ok(())
            }),
        )
        .unwrap();
        tb.handle()
    };
    ext.finalize().unwrap();

    let mut vm = Vm::new(&session);
    let obj = vm.new_object(loud, &[]).unwrap();
    let greet = session
        .find_method(greeter.defined_id().unwrap(), "Greet", None)
        .unwrap()
        .handle;
    assert_eq!(vm.invoke_method_virtual(&obj, greet, &[]).unwrap(), Value::string("HELLO"));
    assert!(vm.is_instance_of(&obj, &greeter));
    assert!(matches!(
        session.define_assembly("Again").define_type("Greeter", TypeConfig::public()),
        Err(BuildError::DuplicateType(_))
    ));
}

#[test]
fn test_unresolvable_lookups() {
    let session = BuildSession::new();
    let mut asm = session.define_assembly("Lookups");
    let ty = asm.define_type("Thing", TypeConfig::public()).unwrap().handle();
    asm.finalize().unwrap();

    assert!(matches!(session.type_ref("Missing"), Err(BuildError::UnresolvableMember { .. })));
    assert!(matches!(
        session.find_method(ty.id, "Nope", None),
        Err(BuildError::UnresolvableMember { .. })
    ));
    assert!(matches!(
        session.find_field(ty.id, "nope"),
        Err(BuildError::UnresolvableMember { .. })
    ));
    assert_eq!(session.find_method(TypeId(9999), "X", None), Err(BuildError::UnknownType(TypeId(9999))));
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_units_share_one_registry() {
    let session = BuildSession::new();
    thread::scope(|scope| {
        for worker in 0..8 {
            let session = session.clone();
            scope.spawn(move || {
                let mut asm = session.define_assembly(&format!("Unit{}", worker));
                let mut tb = asm
                    .define_type(&format!("Worker{}", worker), TypeConfig::public())
                    .unwrap();
                tb.define_method(
                    "Id",
                    MethodConfig::public().as_static().no_params().returns(TypeRef::I32),
                    returning(worker),
                )
                .unwrap();
                asm.finalize().unwrap();
            });
        }
    });

    assert_eq!(session.type_count(), 8);
    let mut vm = Vm::new(&session);
    for worker in 0..8 {
        let handle = session.resolve_type(&format!("Worker{}", worker)).unwrap();
        assert_eq!(vm.invoke_static(handle, "Id", &[]).unwrap(), Value::I32(worker));
    }
}

#[test]
fn test_concurrent_registration_of_one_name() {
    let session = BuildSession::new();
    let successes: usize = thread::scope(|scope| {
        let handles: Vec<_> = (0..8u32)
            .map(|i| {
                let registry = session.registry();
                scope.spawn(move || {
                    registry
                        .register("Shared", TypeHandle::new(TypeId(1000 + i), TypeKind::Class))
                        .is_ok()
                })
            })
            .collect();
        handles.into_iter().map(|h| usize::from(h.join().unwrap())).sum()
    });
    assert_eq!(successes, 1);
    assert!(session.registry().contains("Shared"));
}

#[test]
fn test_vm_shared_objects_across_threads() {
    let session = BuildSession::new();
    let mut asm = session.define_assembly("Shared");
    let point = {
        let mut tb = asm.define_type("Point", TypeConfig::public()).unwrap();
        tb.define_field("x", TypeRef::I32, FieldConfig::public()).unwrap();
        tb.define_default_constructor().unwrap();
        tb.handle()
    };
    asm.finalize().unwrap();

    let mut vm = Vm::new(&session);
    let obj = vm.new_object(point, &[]).unwrap();
    thread::scope(|scope| {
        let obj = &obj;
        let session = &session;
        scope.spawn(move || {
            let mut vm = Vm::new(session);
            vm.set_field(obj, "x", Value::I32(9)).unwrap();
        });
    });
    assert_eq!(vm.get_field(&obj, "x").unwrap(), Value::I32(9));
}

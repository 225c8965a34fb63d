//! Structured exception handling in emitted bodies

use kiln_engine::{
    Body, BuildSession, ConstructorConfig, Constant, FieldConfig, MethodConfig, TypeConfig,
    TypeHandle, TypeRef, Value, Vm, VmError,
};

fn static_method() -> MethodConfig {
    MethodConfig::public().as_static()
}

// ============================================================================
// Catch
// ============================================================================

#[test]
fn test_catch_thrown_string() {
    let session = BuildSession::new();
    let mut asm = session.define_assembly("Catch");
    let guard = {
        let mut tb = asm.define_type("Guard", TypeConfig::public()).unwrap();
        tb.define_method(
            "Run",
            static_method().param("fail", TypeRef::BOOL).returns(TypeRef::I32),
            Body::with(|il, _| {
                let result = il.declare_local(TypeRef::I32);
                let skip = il.define_label();
                il.begin_exception_block();
                il.ldarg_0().brfalse(skip);
                il.ldstr("boom").throw();
                il.mark_label(skip);
                il.ldc_i4(1).stloc(&result);
                il.begin_catch_block(TypeRef::String)?;
                il.pop().ldc_i4(2).stloc(&result);
                il.end_exception_block()?;
                il.ldloc(&result).ret();
                Ok(())
            }),
        )
        .unwrap();
        tb.handle()
    };
    asm.finalize().unwrap();

    let mut vm = Vm::new(&session);
    assert_eq!(vm.invoke_static(guard, "Run", &[Value::Bool(false)]).unwrap(), Value::I32(1));
    assert_eq!(vm.invoke_static(guard, "Run", &[Value::Bool(true)]).unwrap(), Value::I32(2));
}

/// AppError { Code = 500 }, NotFound : AppError { ctor sets Code = 404 }, Other
fn error_types(asm: &mut kiln_engine::AssemblyBuilder) -> (TypeHandle, TypeHandle, TypeHandle) {
    let app_error = {
        let mut tb = asm.define_type("AppError", TypeConfig::public()).unwrap();
        tb.define_field("Code", TypeRef::I32, FieldConfig::public().with_default(Constant::I32(500)))
            .unwrap();
        tb.define_default_constructor().unwrap();
        tb.handle()
    };
    let not_found = {
        let mut tb = asm
            .define_type("NotFound", TypeConfig::public().extends(TypeRef::Defined(app_error)))
            .unwrap();
        tb.define_constructor(
            ConstructorConfig::public(),
            Body::with(|il, ctx| {
                let code = ctx.field("Code")?;
                if let Some(base) = ctx.base_constructor() {
                    il.ldarg_0().call(base);
                }
                il.ldarg_0().ldc_i4(404).stfld(code).ret();
                Ok(())
            }),
        )
        .unwrap();
        tb.handle()
    };
    let other = {
        let mut tb = asm.define_type("Other", TypeConfig::public()).unwrap();
        tb.define_default_constructor().unwrap();
        tb.handle()
    };
    (app_error, not_found, other)
}

#[test]
fn test_catch_clauses_match_in_order_by_type() {
    let session = BuildSession::new();
    let mut asm = session.define_assembly("Errors");
    let (app_error, not_found, other) = error_types(&mut asm);
    let classify = {
        let mut tb = asm.define_type("Classifier", TypeConfig::public()).unwrap();
        tb.define_method(
            "Classify",
            static_method().param("missing", TypeRef::BOOL).returns(TypeRef::I32),
            Body::with(move |il, ctx| {
                let not_found_ctor = ctx.constructor_on(not_found.id, &[])?;
                let other_ctor = ctx.constructor_on(other.id, &[])?;
                let code = ctx.field_on(app_error.id, "Code")?;
                let result = il.declare_local(TypeRef::I32);
                let missing = il.define_label();

                il.begin_exception_block();
                il.ldarg_0().brtrue(missing);
                il.throw_new(other_ctor);
                il.mark_label(missing);
                il.throw_new(not_found_ctor);
                il.begin_catch_block(TypeRef::Defined(app_error))?;
                il.ldfld(code).stloc(&result);
                il.begin_catch_block(TypeRef::Object)?;
                il.pop().ldc_i4(20).stloc(&result);
                il.end_exception_block()?;
                il.ldloc(&result).ret();
                Ok(())
            }),
        )
        .unwrap();
        tb.handle()
    };
    asm.finalize().unwrap();

    let mut vm = Vm::new(&session);
    assert_eq!(vm.invoke_static(classify, "Classify", &[Value::Bool(true)]).unwrap(), Value::I32(404));
    assert_eq!(vm.invoke_static(classify, "Classify", &[Value::Bool(false)]).unwrap(), Value::I32(20));
}

#[test]
fn test_unhandled_exception_reaches_host() {
    let session = BuildSession::new();
    let mut asm = session.define_assembly("Unhandled");
    let (_, not_found, _) = error_types(&mut asm);
    let thrower = {
        let mut tb = asm.define_type("Thrower", TypeConfig::public()).unwrap();
        tb.define_method(
            "Fail",
            static_method().no_params(),
            Body::with(move |il, ctx| {
                let ctor = ctx.constructor_on(not_found.id, &[])?;
                il.throw_new(ctor);
                Ok(())
            }),
        )
        .unwrap();
        tb.define_method(
            "ThrowNull",
            static_method().no_params(),
            Body::with(|il, _| {
                il.ldnull().throw();
                Ok(())
            }),
        )
        .unwrap();
        tb.handle()
    };
    asm.finalize().unwrap();

    let mut vm = Vm::new(&session);
    let Err(VmError::Exception(thrown)) = vm.invoke_static(thrower, "Fail", &[]) else {
        panic!("expected an exception");
    };
    assert_eq!(vm.type_of(&thrown).unwrap().full_name, "NotFound");
    assert_eq!(vm.get_field(&thrown, "Code").unwrap(), Value::I32(404));
    assert_eq!(vm.invoke_static(thrower, "ThrowNull", &[]), Err(VmError::NullReference));
}

// ============================================================================
// Finally and Leave
// ============================================================================

#[test]
fn test_finally_runs_on_both_paths() {
    let session = BuildSession::new();
    let mut asm = session.define_assembly("Finally");
    let tracker = {
        let mut tb = asm.define_type("Tracker", TypeConfig::public()).unwrap();
        tb.define_field("Runs", TypeRef::I32, FieldConfig::public().as_static())
            .unwrap();
        tb.define_method(
            "Run",
            static_method().param("fail", TypeRef::BOOL),
            Body::with(|il, ctx| {
                let runs = ctx.field("Runs")?;
                let ok = il.define_label();
                il.begin_exception_block();
                il.ldarg_0().brfalse(ok);
                il.ldstr("failed").throw();
                il.mark_label(ok);
                il.begin_finally_block()?;
                il.ldsfld(runs).ldc_i4(1).add().stsfld(runs);
                il.end_exception_block()?;
                il.ret();
                Ok(())
            }),
        )
        .unwrap();
        tb.handle()
    };
    asm.finalize().unwrap();

    let mut vm = Vm::new(&session);
    assert_eq!(vm.invoke_static(tracker, "Run", &[Value::Bool(false)]).unwrap(), Value::Null);
    assert_eq!(vm.get_static_field(tracker, "Runs").unwrap(), Value::I32(1));
    assert_eq!(
        vm.invoke_static(tracker, "Run", &[Value::Bool(true)]),
        Err(VmError::Exception(Value::string("failed")))
    );
    assert_eq!(vm.get_static_field(tracker, "Runs").unwrap(), Value::I32(2));
}

#[test]
fn test_leave_runs_every_crossed_finally_innermost_first() {
    let session = BuildSession::new();
    let mut asm = session.define_assembly("Nested");
    let nested = {
        let mut tb = asm.define_type("Nested", TypeConfig::public()).unwrap();
        tb.define_method(
            "Compute",
            static_method().no_params().returns(TypeRef::I32),
            Body::with(|il, _| {
                let x = il.declare_local(TypeRef::I32);
                let outer_end = il.begin_exception_block();
                il.begin_exception_block();
                il.ldc_i4(1).stloc(&x);
                il.leave(outer_end);
                il.begin_finally_block()?;
                il.ldloc(&x).ldc_i4(10).mul().stloc(&x);
                il.end_exception_block()?;
                il.begin_finally_block()?;
                il.ldloc(&x).ldc_i4(3).add().stloc(&x);
                il.end_exception_block()?;
                il.ldloc(&x).ret();
                Ok(())
            }),
        )
        .unwrap();
        tb.handle()
    };
    asm.finalize().unwrap();

    let mut vm = Vm::new(&session);
    // (1 * 10) + 3, not (1 + 3) * 10
    assert_eq!(vm.invoke_static(nested, "Compute", &[]).unwrap(), Value::I32(13));
}

// ============================================================================
// Rethrow and Cross-Frame Propagation
// ============================================================================

#[test]
fn test_rethrow_is_caught_by_caller() {
    let session = BuildSession::new();
    let mut asm = session.define_assembly("Rethrow");
    let frames = {
        let mut tb = asm.define_type("Frames", TypeConfig::public()).unwrap();
        let inner = tb
            .define_method(
                "Inner",
                static_method().no_params(),
                Body::with(|il, _| {
                    il.begin_exception_block();
                    il.ldstr("inner").throw();
                    il.begin_catch_block(TypeRef::String)?;
                    il.pop().rethrow();
                    il.end_exception_block()?;
                    il.ret();
                    Ok(())
                }),
            )
            .unwrap();
        tb.define_method(
            "Outer",
            static_method().no_params().returns(TypeRef::String),
            Body::with(move |il, _| {
                let caught = il.declare_local(TypeRef::String);
                il.begin_exception_block();
                il.call(inner);
                il.begin_catch_block(TypeRef::String)?;
                il.stloc(&caught);
                il.end_exception_block()?;
                il.ldloc(&caught).ret();
                Ok(())
            }),
        )
        .unwrap();
        tb.handle()
    };
    asm.finalize().unwrap();

    let mut vm = Vm::new(&session);
    assert_eq!(vm.invoke_static(frames, "Outer", &[]).unwrap(), Value::string("inner"));
    assert_eq!(
        vm.invoke_static(frames, "Inner", &[]),
        Err(VmError::Exception(Value::string("inner")))
    );
}

#[test]
fn test_runtime_faults_are_not_catchable() {
    let session = BuildSession::new();
    let mut asm = session.define_assembly("Faults");
    let faults = {
        let mut tb = asm.define_type("Faults", TypeConfig::public()).unwrap();
        tb.define_method(
            "Divide",
            static_method()
                .param("a", TypeRef::I32)
                .param("b", TypeRef::I32)
                .returns(TypeRef::I32),
            Body::with(|il, _| {
                let result = il.declare_local(TypeRef::I32);
                il.begin_exception_block();
                il.ldarg_0().ldarg_1().div().stloc(&result);
                il.begin_catch_block(TypeRef::Object)?;
                il.pop().ldc_i4(-1).stloc(&result);
                il.end_exception_block()?;
                il.ldloc(&result).ret();
                Ok(())
            }),
        )
        .unwrap();
        tb.handle()
    };
    asm.finalize().unwrap();

    let mut vm = Vm::new(&session);
    assert_eq!(
        vm.invoke_static(faults, "Divide", &[Value::I32(9), Value::I32(3)]).unwrap(),
        Value::I32(3)
    );
    assert_eq!(
        vm.invoke_static(faults, "Divide", &[Value::I32(1), Value::I32(0)]),
        Err(VmError::DivideByZero)
    );
}

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kiln_engine::{
    Body, BuildSession, InstructionEmitter, MethodConfig, TypeConfig, TypeHandle, TypeRef, Value, Vm,
};

/// Straight-line arithmetic followed by a counted loop
fn emit_stream(il: &mut InstructionEmitter, blocks: usize) {
    let acc = il.declare_local(TypeRef::I32);
    for i in 0..blocks {
        il.ldloc(&acc).ldc_i4(i as i32).add().ldc_i4(3).mul().stloc(&acc);
    }
    let i = il.declare_local(TypeRef::I32);
    let top = il.define_label();
    let done = il.define_label();
    il.mark_label(top);
    il.ldloc(&i).ldc_i4(10).bge(done);
    il.ldloc(&i).ldc_i4(1).add().stloc(&i);
    il.br(top);
    il.mark_label(done);
    il.ldloc(&acc).ret();
}

fn bench_emit_and_seal(c: &mut Criterion) {
    let mut group = c.benchmark_group("emit");

    for blocks in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(blocks as u64 * 6));
        group.bench_with_input(BenchmarkId::new("seal", blocks), &blocks, |b, &blocks| {
            b.iter(|| {
                let mut il = InstructionEmitter::new("Bench");
                emit_stream(&mut il, black_box(blocks));
                il.seal().unwrap()
            });
        });
    }

    group.finish();
}

fn sum_below(session: &BuildSession) -> TypeHandle {
    let mut asm = session.define_assembly("Bench");
    let math = {
        let mut tb = asm.define_type("Math", TypeConfig::public()).unwrap();
        tb.define_method(
            "SumBelow",
            MethodConfig::public().as_static().param("n", TypeRef::I32).returns(TypeRef::I32),
            Body::with(|il, _| {
                let i = il.declare_local(TypeRef::I32);
                let acc = il.declare_local(TypeRef::I32);
                let top = il.define_label();
                let done = il.define_label();
                il.mark_label(top);
                il.ldloc(&i).ldarg_0().bge(done);
                il.ldloc(&acc).ldloc(&i).add().stloc(&acc);
                il.ldloc(&i).ldc_i4(1).add().stloc(&i);
                il.br(top);
                il.mark_label(done);
                il.ldloc(&acc).ret();
                Ok(())
            }),
        )
        .unwrap();
        tb.handle()
    };
    asm.finalize().unwrap();
    math
}

fn bench_define_and_finalize(c: &mut Criterion) {
    c.bench_function("define_and_finalize", |b| {
        b.iter(|| {
            let session = BuildSession::new();
            sum_below(black_box(&session))
        });
    });
}

fn bench_interpret_loop(c: &mut Criterion) {
    let session = BuildSession::new();
    let math = sum_below(&session);
    let mut group = c.benchmark_group("interpret");

    for n in [100i32, 10_000] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("sum_below", n), &n, |b, &n| {
            let mut vm = Vm::new(&session);
            b.iter(|| vm.invoke_static(math, "SumBelow", &[Value::I32(black_box(n))]).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_emit_and_seal, bench_define_and_finalize, bench_interpret_loop);
criterion_main!(benches);

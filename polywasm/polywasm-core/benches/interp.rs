use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use polywasm_core::{compile, instantiate, Imports, Store};
use rand::Rng;

const LOOP: &str = r#"(module
    (memory 1)
    (func (export "sum") (param $n i32) (result i32) (local $acc i32)
        block $done
            loop $top
                local.get $n
                i32.eqz
                br_if $done
                local.get $acc
                local.get $n
                i32.add
                local.set $acc
                local.get $n
                i32.const 1
                i32.sub
                local.set $n
                br $top
            end
        end
        local.get $acc)
    (func (export "mix") (param i32 i32) (result i32)
        local.get 0
        local.get 1
        i32.xor
        i32.const 7
        i32.rotl
        local.get 1
        i32.const 1
        i32.or
        i32.rem_u))"#;

fn bench_compile(c: &mut Criterion) {
    let bytes = wat::parse_str(LOOP).expect("valid text module");
    let mut group = c.benchmark_group("compile");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("decode_and_compile", |b| {
        b.iter(|| black_box(compile(black_box(&bytes)).is_ok()))
    });
    group.finish();
}

fn bench_calls(c: &mut Criterion) {
    let bytes = wat::parse_str(LOOP).expect("valid text module");
    let module = compile(&bytes).expect("module compiles");
    let mut store = Store::new();
    let inst = instantiate(&mut store, &module, &Imports::new()).expect("instantiates");
    let sum = inst.get_func(&store, "sum").expect("sum export");
    let mix = inst.get_func(&store, "mix").expect("mix export");

    let mut group = c.benchmark_group("loop_sum");
    for &n in &[100u32, 1_000, 10_000] {
        group.throughput(Throughput::Elements(u64::from(n)));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| black_box(sum.call(&mut store, &[f64::from(n)])))
        });
    }
    group.finish();

    let mut rng = rand::thread_rng();
    c.bench_function("host_call_1e3", |b| {
        b.iter(|| {
            let mut acc = 0.0;
            for _ in 0..1_000 {
                let x = f64::from(rng.gen::<i32>());
                let y = f64::from(rng.gen::<i32>());
                if let Ok(Some(v)) = mix.call(&mut store, &[x, y]) {
                    acc += v;
                }
            }
            black_box(acc);
        })
    });
}

criterion_group!(benches, bench_compile, bench_calls);
criterion_main!(benches);

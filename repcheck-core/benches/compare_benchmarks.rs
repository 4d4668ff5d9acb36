use criterion::{Criterion, black_box, criterion_group, criterion_main};
use repcheck_core::config::CompareOptions;
use repcheck_core::{Checkpoint, Tensor, Tolerance, Verifier};

fn gpt_like(name: &str, layers: usize, width: usize, offset: f64) -> Checkpoint {
    (0..layers).fold(Checkpoint::new(name, Some(5000)), |ckpt, layer| {
        let values = (0..width * width)
            .map(|i| ((i as f64) * 1e-3).sin() + offset)
            .collect();
        ckpt.with_parameter(
            format!("transformer.h.{layer}.mlp.c_fc.weight"),
            Tensor::from_f64s(values),
        )
    })
}

fn bench_compare(c: &mut Criterion) {
    let a = gpt_like("a", 12, 256, 0.0);
    let b = gpt_like("b", 12, 256, 0.0);
    let drifted = gpt_like("c", 12, 256, 1e-7);

    let exact = Verifier::default();
    c.bench_function("compare_identical_exact", |bench| {
        bench.iter(|| exact.compare(black_box(&a), black_box(&b)))
    });

    let loose = Verifier::new(
        Tolerance {
            absolute: 1e-8,
            relative: 1e-6,
            equal_nan: true,
        },
        CompareOptions::default(),
    )
    .unwrap();
    c.bench_function("compare_drifted_tolerance", |bench| {
        bench.iter(|| loose.compare(black_box(&a), black_box(&drifted)))
    });
}

fn bench_fingerprint(c: &mut Criterion) {
    let a = gpt_like("a", 4, 256, 0.0);
    c.bench_function("fingerprint_4_layers", |bench| {
        bench.iter(|| black_box(&a).fingerprint())
    });
}

criterion_group!(benches, bench_compare, bench_fingerprint);
criterion_main!(benches);

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use half::f16;
use st_interact::{ComputeMode, DotInteraction, Element, InteractionShape, Tensor};

#[track_caller]
fn unwrap_ok<T, E: core::fmt::Debug>(context: &str, result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(error) => panic!("{context}: {error:?}"),
    }
}

struct Inputs<T: Element> {
    dense: Tensor<T>,
    embeddings: Tensor<T>,
    grad_output: Tensor<T>,
}

fn inputs<T: Element>(shape: &InteractionShape) -> Inputs<T> {
    let (rows, dense_cols) = shape.dense_shape();
    let (_, emb_cols) = shape.embedding_shape();
    let (_, out_cols) = shape.output_shape();
    Inputs {
        dense: unwrap_ok("dense", Tensor::random_normal(rows, dense_cols, 0.0, 1.0, Some(1))),
        embeddings: unwrap_ok("embeddings", Tensor::random_normal(rows, emb_cols, 0.0, 1.0, Some(2))),
        grad_output: unwrap_ok("grad", Tensor::random_normal(rows, out_cols, 0.0, 1.0, Some(3))),
    }
}

fn bench_case<T: Element>(c: &mut Criterion, label: &str, n_emb: usize, compute: ComputeMode) {
    let shape = unwrap_ok("shape", InteractionShape::new(512, n_emb, 128));
    let data = inputs::<T>(&shape);
    let mut layer = DotInteraction::<T>::new(label, shape).with_compute_mode(compute);
    let (rows, dense_cols) = shape.dense_shape();
    let (_, emb_cols) = shape.embedding_shape();
    let mut dense_grad = unwrap_ok("dense grad", Tensor::<T>::zeros(rows, dense_cols));
    let mut emb_grad = unwrap_ok("embedding grad", Tensor::<T>::zeros(rows, emb_cols));

    let mut group = c.benchmark_group("dot_interaction");
    group.throughput(Throughput::Elements(rows as u64));
    group.bench_function(BenchmarkId::new("forward", label), |b| {
        b.iter(|| {
            black_box(unwrap_ok(
                "forward failed",
                layer.forward(black_box(&data.dense), black_box(&data.embeddings)),
            ))
        });
    });
    group.bench_function(BenchmarkId::new("forward_backward", label), |b| {
        b.iter(|| {
            unwrap_ok("forward failed", layer.forward(&data.dense, &data.embeddings));
            dense_grad.fill_zero();
            unwrap_ok(
                "backward failed",
                layer.backward(black_box(&data.grad_output), &mut dense_grad, &mut emb_grad),
            );
        });
    });
    group.finish();
}

fn bench_interaction(c: &mut Criterion) {
    bench_case::<f32>(c, "f32_26x128", 26, ComputeMode::Standard);
    bench_case::<f32>(c, "tf32_26x128", 26, ComputeMode::Tf32);
    bench_case::<f16>(c, "f16_33x128", 33, ComputeMode::Standard);
}

criterion_group!(benches, bench_interaction);
criterion_main!(benches);

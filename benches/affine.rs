use affinet::layers::AffineTransform;
use affinet::math::Matrix;
use affinet::optim::{TrainOptions, UpdateRule};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::Rng;

fn bench_affine(c: &mut Criterion) {
    let batch = 128;
    let in_dim = 256;
    let out_dim = 256;
    let mut rng = rand::thread_rng();

    let x_data: Vec<f32> = (0..batch * in_dim).map(|_| rng.gen()).collect();
    let x = Matrix::from_vec(batch, in_dim, x_data);
    let g_data: Vec<f32> = (0..batch * out_dim).map(|_| rng.gen::<f32>() - 0.5).collect();
    let g = Matrix::from_vec(batch, out_dim, g_data);

    let mut layer = AffineTransform::new(in_dim, out_dim);
    let w_data: Vec<f32> = (0..out_dim * in_dim).map(|_| rng.gen::<f32>() - 0.5).collect();
    layer.set_linearity(&Matrix::from_vec(out_dim, in_dim, w_data));

    c.bench_function("affine_propagate", |b| {
        b.iter(|| {
            let out = layer.propagate(black_box(&x));
            black_box(out);
        })
    });

    let opts = TrainOptions {
        learn_rate: 1e-4,
        momentum: 0.9,
    };
    c.bench_function("affine_update_rmsprop", |b| {
        b.iter(|| {
            layer.update(black_box(&x), black_box(&g), UpdateRule::RmsProp, &opts);
        })
    });
}

criterion_group!(benches, bench_affine);
criterion_main!(benches);

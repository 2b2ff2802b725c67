//! Optimizer and resynthesis benchmarks

use std::sync::Arc;

use ac_cloak::{
    initialize, resynthesize, AmplitudeClamp, AttackMode, EuclideanDistance, LossEvaluator,
    Optimizer, OptimizerConfig,
};
use ac_core::{FeatureTensor, Waveform};
use ac_dsp::{FeatureExtractor, FeatureParams};
use ac_model::{LinearModel, SharedModel};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ndarray::Array2;

fn bench_optimize_default_shape(c: &mut Criterion) {
    let shape = [1usize, 128, 44];
    let n: usize = shape.iter().product();
    let weights = Array2::from_shape_fn((4, n), |(k, i)| ((i + k * 7) as f32 * 0.013).sin() * 1e-3);
    let model: SharedModel =
        Arc::new(LinearModel::new("bench", shape.to_vec(), weights, vec![0.0; 4], true).unwrap());

    let features = FeatureTensor::from_elem(&shape, -40.0);
    let mode = AttackMode::Untargeted;
    let initial = initialize(&features, model.as_ref(), &mode, 0.05).unwrap();
    let evaluator = LossEvaluator::new(model, Box::new(EuclideanDistance), mode, 1.0).unwrap();
    let optimizer = Optimizer::new(OptimizerConfig::default().with_max_iterations(20)).unwrap();

    c.bench_function("optimize_128x44_20_iters", |b| {
        b.iter(|| optimizer.optimize(black_box(&initial), &features, &evaluator).unwrap())
    });
}

fn bench_resynthesize_one_second(c: &mut Criterion) {
    let params = FeatureParams::default();
    let samples: Vec<f32> = (0..22050).map(|i| (i as f32 * 0.0627).sin() * 0.5).collect();
    let wave = Waveform::mono(samples, 22050).unwrap();
    let shape = FeatureExtractor::new(params.clone()).unwrap().feature_shape(22050);
    let perturbation = FeatureTensor::from_elem(&shape, -0.5);

    c.bench_function("resynthesize_1s_22050", |b| {
        b.iter(|| resynthesize(black_box(&wave), &perturbation, &params, AmplitudeClamp::On).unwrap())
    });
}

criterion_group!(benches, bench_optimize_default_shape, bench_resynthesize_one_second);
criterion_main!(benches);

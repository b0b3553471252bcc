//! Extraction benchmark: decoded payload → feature vector.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::{json, Map, Value};
use signal_features::{ExtractorConfig, SignalFeatureExtractor};

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn bench_pass_through(c: &mut Criterion) {
    let mut extractor = SignalFeatureExtractor::new(&ExtractorConfig::default());
    let mut payload = Map::new();
    for i in 1..=32 {
        payload.insert(format!("feature_{i}"), json!(0.01 * i as f64));
    }

    c.bench_function("pass_through_32", |b| {
        b.iter(|| extractor.extract(black_box(&payload)))
    });
}

fn bench_dsp_window_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp_by_window");
    for n in [256usize, 1024, 4096] {
        let samples: Vec<f64> = (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * 120.0 * i as f64 / 6400.0).sin())
            .collect();
        let payload = object(json!({
            "fs": 6400,
            "ax": samples,
            "ay": vec![0.5f64; 8],
        }));
        let mut extractor = SignalFeatureExtractor::new(&ExtractorConfig::default());

        group.bench_function(format!("window_{n}").as_str(), |b| {
            b.iter(|| extractor.extract(black_box(&payload)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_pass_through, bench_dsp_window_sizes);
criterion_main!(benches);

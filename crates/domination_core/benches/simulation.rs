//! Simulation benchmarks for domination_core.
//!
//! Run with: `cargo bench -p domination_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use domination_core::prelude::*;

fn noop() -> Arc<dyn AgentFactory> {
    Arc::new(|_: AgentContext| -> Box<dyn Agent> { Box::new(NoOpAgent) })
}

/// Field generation at the default size.
pub fn generation_benchmark(c: &mut Criterion) {
    let config = FieldGeneratorConfig::from_settings(&Settings::default());
    let mut seed = 0;
    c.bench_function("generate_default_field", |b| {
        b.iter(|| {
            seed += 1;
            black_box(generate(&config.clone().with_seed(seed)))
        })
    });
}

/// A short no-op match on a generated field.
pub fn match_benchmark(c: &mut Criterion) {
    let settings = Settings {
        max_steps: 50,
        think_time: 1.0,
        ..Settings::default()
    };
    let Ok(field) = generate(&FieldGeneratorConfig::from_settings(&settings).with_seed(1)) else {
        return;
    };
    let field = Arc::new(field);
    c.bench_function("noop_match_50_steps", |b| {
        b.iter(|| {
            let Ok(mut game) = Game::new(settings.clone(), Arc::clone(&field), noop(), noop()) else {
                return;
            };
            black_box(game.run().map(|s| s.score).ok())
        })
    });
}

criterion_group!(benches, generation_benchmark, match_benchmark);
criterion_main!(benches);

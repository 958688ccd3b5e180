use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use cognitive_battery::assessment::{compose_problem, place_regions, LevelId};
use cognitive_battery::core::config::{BatteryConfig, CanvasConfig};

fn bench_place_regions(c: &mut Criterion) {
    let canvas = CanvasConfig::default();
    let mut rng = StdRng::seed_from_u64(42);

    let mut group = c.benchmark_group("place_regions");
    for box_count in [5usize, 9, 16] {
        group.bench_function(format!("{}_boxes", box_count), |b| {
            b.iter(|| place_regions(black_box(box_count), &canvas, &mut rng))
        });
    }
    group.finish();
}

fn bench_compose_problem(c: &mut Criterion) {
    let config = BatteryConfig::default();
    let mut rng = StdRng::seed_from_u64(7);
    let hardest = config.levels.len() - 1;

    c.bench_function("compose_hardest_level", |b| {
        b.iter(|| compose_problem(LevelId(hardest), &config.levels[hardest], &config.canvas, &mut rng))
    });
}

criterion_group!(benches, bench_place_regions, bench_compose_problem);
criterion_main!(benches);

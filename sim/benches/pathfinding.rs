//! # Pathfinding Benchmark
//!
//! A* on open and walled maps of increasing size.
//!
//! Run with: `cargo bench --package rts_sim`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rts_sim::{find_path, Obstacles, Tile};

/// Vertical walls every 8 columns, each with a gap alternating top and bottom.
fn serpentine(size: i32) -> Obstacles {
    let mut obstacles = Obstacles::new(size, size);
    for (n, x) in (4..size - 1).step_by(8).enumerate() {
        let gap = if n % 2 == 0 { size - 1 } else { 0 };
        for y in 0..size {
            if y != gap {
                obstacles.block(Tile::new(x, y));
            }
        }
    }
    obstacles
}

fn bench_open_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("astar_open");
    for size in [20, 64, 128] {
        let obstacles = Obstacles::new(size, size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                black_box(find_path(
                    Tile::new(0, 0),
                    Tile::new(size - 1, size - 1),
                    &obstacles,
                ))
            });
        });
    }
    group.finish();
}

fn bench_serpentine(c: &mut Criterion) {
    let mut group = c.benchmark_group("astar_serpentine");
    for size in [20, 64] {
        let obstacles = serpentine(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                black_box(find_path(
                    Tile::new(0, size / 2),
                    Tile::new(size - 1, size / 2),
                    &obstacles,
                ))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_open_map, bench_serpentine);
criterion_main!(benches);

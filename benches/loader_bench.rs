use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use shine_loader::{path, PathResolver, Registry, SymbolSchema};

/// Benchmark path pattern expansion
fn bench_path_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("path_resolution");

    let resolver = PathResolver::from_assets("{assets}/Plugins/{name}.so", "/game/Assets");
    group.bench_function("resolve", |b| {
        b.iter(|| resolver.resolve(black_box("shine")));
    });

    group.bench_function("unresolved_macros", |b| {
        b.iter(|| path::unresolved_macros(black_box("/game/{unknown}/{name}.so")));
    });

    group.finish();
}

/// Benchmark registry lookups as the registry grows
fn bench_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry");

    for size in &[1usize, 16, 256] {
        let registry =
            Registry::new(PathResolver::new("/nonexistent/{name}.so", "", "", "")).unwrap();
        for i in 0..*size {
            registry
                .dynamic_library(SymbolSchema::new(format!("lib{i}"), ["entry"]))
                .unwrap();
        }

        group.bench_with_input(BenchmarkId::new("get_or_create", size), size, |b, _| {
            b.iter(|| registry.dynamic_library(SymbolSchema::new(black_box("lib0"), ["entry"])));
        });

        group.bench_with_input(BenchmarkId::new("info", size), size, |b, _| {
            b.iter(|| registry.info());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_path_resolution, bench_registry);
criterion_main!(benches);

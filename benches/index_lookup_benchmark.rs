//! Reference index lookup benchmarks.
//!
//! # Benchmarks
//!
//! - `exact_lookup`: normalized key lookup (binary search over the mapped slot table)
//! - `normalize_and_lookup`: the same, starting from raw extracted text
//! - `fuzzy_scan`: opt-in approximate scan over every key
//! - `cached_resolve`: warm resolver path, cache hit only
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench index_lookup_benchmark
//! ```

use std::hint::black_box;
use std::sync::Arc;

use chemlink_core::{
    ChemicalRecord, IndexBuilder, ReferenceIndex, ResolutionCache, Resolver, normalize_name,
};
use criterion::{Criterion, criterion_group, criterion_main};

const PREFIXES: &[&str] = &["methyl", "ethyl", "propyl", "butyl", "tert-butyl", "isopropyl"];
const CORES: &[&str] = &["aluminum", "zinc", "hafnium", "titanium", "zirconium", "silicon"];
const SUFFIXES: &[&str] = &["oxide", "chloride", "amide", "alkoxide", "hydride"];

/// Synthetic index with a few synonyms per compound.
fn setup_index(size: usize) -> (tempfile::TempDir, ReferenceIndex, Vec<String>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut names = Vec::with_capacity(size);
    let records: Vec<ChemicalRecord> = (0..size)
        .map(|i| {
            let name = format!(
                "{}{} {} {i}",
                PREFIXES[i % PREFIXES.len()],
                CORES[(i / PREFIXES.len()) % CORES.len()],
                SUFFIXES[i % SUFFIXES.len()],
            );
            names.push(name.clone());
            ChemicalRecord::new(format!("CID-{i}"), name.clone())
                .with_synonyms([name.to_uppercase(), format!("compound {i}")])
        })
        .collect();
    let path = dir.path().join("bench.idx");
    IndexBuilder::new()
        .build_from_records(&records, &path)
        .expect("build index");
    let index = ReferenceIndex::open(&path).expect("open index");
    (dir, index, names)
}

fn bench_exact_lookup(c: &mut Criterion) {
    let (_dir, index, names) = setup_index(50_000);
    let keys: Vec<String> = names.iter().map(|name| normalize_name(name)).collect();

    c.bench_function("exact_lookup", |b| {
        let mut i = 0usize;
        b.iter(|| {
            i = (i + 7919) % keys.len();
            black_box(index.lookup(black_box(&keys[i])))
        });
    });

    c.bench_function("normalize_and_lookup", |b| {
        let mut i = 0usize;
        b.iter(|| {
            i = (i + 7919) % names.len();
            let raw = format!("  {}. ", names[i].to_uppercase());
            black_box(index.lookup(&normalize_name(&raw)))
        });
    });
}

fn bench_fuzzy_scan(c: &mut Criterion) {
    let (_dir, index, _) = setup_index(5_000);
    c.bench_function("fuzzy_scan", |b| {
        b.iter(|| black_box(index.fuzzy_candidates(black_box("methylaluminium oxide 42"), 0.85, 8)));
    });
}

fn bench_cached_resolve(c: &mut Criterion) {
    let (_dir, index, names) = setup_index(10_000);
    let resolver = Resolver::builder()
        .index(Arc::new(index))
        .cache(Arc::new(ResolutionCache::in_memory()))
        .build();
    let sample: Vec<&str> = names.iter().take(1_000).map(String::as_str).collect();
    resolver.resolve_many(&sample);

    c.bench_function("cached_resolve", |b| {
        let mut i = 0usize;
        b.iter(|| {
            i = (i + 1) % sample.len();
            black_box(resolver.resolve(black_box(sample[i])))
        });
    });
}

criterion_group!(
    benches,
    bench_exact_lookup,
    bench_fuzzy_scan,
    bench_cached_resolve
);
criterion_main!(benches);

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mtpt_rs::{Entry, TraverseOptionsBuilder};
use std::hint::black_box;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Builds a synthetic tree `width` entries wide and `depth` levels deep,
/// each leaf directory holding a handful of small files.
fn build_tree(root: &Path, width: usize, depth: usize) {
    if depth == 0 {
        for i in 0..4 {
            std::fs::write(root.join(format!("file{i}.txt")), b"hello").unwrap();
        }
        return;
    }
    for i in 0..width {
        let child = root.join(format!("dir{i}"));
        std::fs::create_dir(&child).unwrap();
        build_tree(&child, width, depth - 1);
    }
}

fn count_entries(path: &PathBuf, threads: usize) -> u64 {
    TraverseOptionsBuilder::new(())
        .threads(threads)
        .file(|_user, _path, _metadata| 1u64)
        .dir_exit(|_user, _path, _metadata, _continuation, entries: &mut [Entry<u64>]| {
            1 + entries.iter().map(|e| e.data.unwrap_or(0)).sum::<u64>()
        })
        .build(path)
        .unwrap()
        .unwrap_or(0)
}

fn bench_traverse(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    build_tree(tmp.path(), 4, 4);
    let path = tmp.path().to_path_buf();

    let mut group = c.benchmark_group("traverse");
    group.throughput(Throughput::Elements(count_entries(&path, 1)));

    for threads in [1, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::new("threads", threads), &threads, |b, &threads| {
            b.iter(|| black_box(count_entries(black_box(&path), threads)))
        });
    }

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .sample_size(30)
        .warm_up_time(std::time::Duration::from_millis(500))
        .measurement_time(std::time::Duration::from_secs(3));
    targets = bench_traverse
}
criterion_main!(benches);

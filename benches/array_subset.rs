use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use cloud_asdf::array_subset::SliceRequest;

fn array_subset_copy(c: &mut Criterion) {
    let mut group = c.benchmark_group("array_subset_copy");
    let chunk_shape = [32u64, 32, 32];
    let chunk = vec![0u8; 32 * 32 * 32 * 4];

    for (label, step) in [("contiguous", 1u64), ("strided", 3)] {
        let slice = SliceRequest::new(vec![(0, 128, step), (0, 128, step), (0, 128, step)])
            .unwrap();
        let output_shape = slice.shape();
        let mut output = vec![0u8; slice.num_elements() as usize * 4];
        let selections = slice.chunk_selections(&chunk_shape);
        group.throughput(Throughput::Bytes(output.len() as u64));
        group.bench_function(BenchmarkId::new("copy", label), |b| {
            b.iter(|| {
                for selection in &selections {
                    selection
                        .copy(&chunk, &chunk_shape, 0, 4, &mut output, &output_shape)
                        .unwrap();
                }
            });
        });
    }
}

fn array_subset_chunk_selections(c: &mut Criterion) {
    let mut group = c.benchmark_group("array_subset_chunk_selections");
    for size in [64u64, 256, 1024] {
        let slice = SliceRequest::new(vec![(0, size, 1), (0, size, 1)]).unwrap();
        group.bench_function(BenchmarkId::from_parameter(size), |b| {
            b.iter(|| slice.chunk_selections(&[16, 16]));
        });
    }
}

criterion_group!(benches, array_subset_copy, array_subset_chunk_selections);
criterion_main!(benches);

//! Benchmarks for chunkxfer.
//!
//! Run with:
//!     cargo bench

use std::hint::black_box;

use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use futures_util::{StreamExt, stream};
use tokio::runtime::Runtime;

use chunkxfer::{
    ByteStream, ChunkBuffer, ChunkBufferScheduler, ResumableReadStream, ResumeOptions,
    SchedulerConfig, byte_stream,
};

fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i * 7 + 13) as u8).collect()
}

fn fragments(data: &[u8], piece: usize) -> Vec<Bytes> {
    data.chunks(piece).map(Bytes::copy_from_slice).collect()
}

async fn schedule(parts: Vec<Bytes>, config: SchedulerConfig) -> u64 {
    let input = stream::iter(parts.into_iter().map(Ok::<_, std::io::Error>));
    let mut scheduler = ChunkBufferScheduler::new(input, config, |chunk: ChunkBuffer| async move {
        black_box(chunk.len());
        Ok::<_, std::io::Error>(())
    })
    .unwrap();
    scheduler.run().await.unwrap();
    scheduler.stats().chunks_dispatched
}

fn bench_scheduler(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("scheduler");
    let size = 16 * 1024 * 1024;
    let data = payload(size);
    group.throughput(Throughput::Bytes(size as u64));

    // Fragments larger than, equal to, and much smaller than a buffer.
    for piece in [4 * 1024 * 1024, 1024 * 1024, 16 * 1024] {
        let parts = fragments(&data, piece);
        let config = SchedulerConfig::new(1024 * 1024, 4, 4).unwrap();
        group.bench_with_input(
            BenchmarkId::new("fragment", format!("{}kb", piece / 1024)),
            &parts,
            |b, parts| {
                b.to_async(&runtime)
                    .iter(|| schedule(black_box(parts.clone()), config));
            },
        );
    }

    group.finish();
}

fn bench_resumable(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("resumable");
    let size = 4 * 1024 * 1024;
    let data = Bytes::from(payload(size));
    group.throughput(Throughput::Bytes(size as u64));

    group.bench_function("clean", |b| {
        b.to_async(&runtime).iter(|| {
            let parts = fragments(&data, 64 * 1024);
            async move {
                let initial =
                    byte_stream(stream::iter(parts.into_iter().map(Ok::<_, std::io::Error>)));
                let reader = ResumableReadStream::new(
                    initial,
                    |_at| async { Err::<ByteStream, _>(std::io::Error::other("unused")) },
                    0,
                    size as u64,
                    ResumeOptions::default(),
                )
                .unwrap();
                let total = reader
                    .fold(0usize, |n, chunk| async move { n + chunk.unwrap().len() })
                    .await;
                black_box(total)
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_scheduler, bench_resumable);
criterion_main!(benches);

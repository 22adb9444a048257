use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};

use zone_protocol::core::frame::{self, COMPRESSION_FLOOR};
use zone_protocol::session::SessionBuffer;
use zone_protocol::utils::compression::CompressionKind;

#[allow(clippy::unwrap_used)]
fn bench_frame_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode_decode");
    let payload_sizes = [16usize, 128, 1024, 8192, 60_000];

    for &size in &payload_sizes {
        let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("encode_{size}b"), |b| {
            b.iter_batched(
                || payload.clone(),
                |payload| {
                    frame::encode(&payload, CompressionKind::Lz4, COMPRESSION_FLOOR).unwrap()
                },
                BatchSize::SmallInput,
            )
        });

        let wire = frame::encode(&payload, CompressionKind::Lz4, COMPRESSION_FLOOR).unwrap();
        group.bench_function(format!("decode_{size}b"), |b| {
            b.iter(|| frame::decode(&wire, CompressionKind::Lz4).unwrap())
        });
    }
    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_buffer_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_buffer");

    // A burst of 64 small frames delivered as one chunk.
    let mut burst = Vec::new();
    for i in 0..64u8 {
        burst.extend_from_slice(
            &frame::encode(&[i; 10], CompressionKind::Lz4, COMPRESSION_FLOOR).unwrap(),
        );
    }
    group.throughput(Throughput::Bytes(burst.len() as u64));
    group.bench_function("append_drain_64_frames", |b| {
        b.iter_batched(
            || SessionBuffer::new(CompressionKind::Lz4),
            |mut buf| {
                buf.append(&burst);
                buf.drain()
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(benches, bench_frame_encode_decode, bench_buffer_drain);
criterion_main!(benches);

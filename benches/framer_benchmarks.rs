use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dbframe::wire::{FrameHeader, HEADER_SIZE};
use dbframe::{compress, Transport};
use std::io::IoSlice;
use std::time::Duration;

/// An in-memory transport so the benchmarks measure the framer's own work rather than
/// socket/kernel overhead.
struct MemoryTransport {
    out: Vec<u8>,
}

impl MemoryTransport {
    fn new() -> Self {
        Self { out: Vec::new() }
    }
}

impl Transport for MemoryTransport {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        Ok(0)
    }

    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> std::io::Result<usize> {
        let mut n = 0;
        for buf in bufs {
            self.out.extend_from_slice(buf);
            n += buf.len();
        }
        Ok(n)
    }

    fn set_blocking(&mut self, _blocking: bool) -> std::io::Result<()> {
        Ok(())
    }

    fn is_blocking(&self) -> bool {
        true
    }

    fn set_timeout(
        &mut self,
        _direction: dbframe::Direction,
        _timeout: Option<Duration>,
    ) -> std::io::Result<()> {
        Ok(())
    }

    fn pending(&self) -> std::io::Result<usize> {
        Ok(0)
    }
}

fn bench_header_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("header_codec");
    let header = FrameHeader { length: 0x00AB_CDEF & 0x00FF_FFFF, sequence: 42 };
    group.bench_function("encode", |b| {
        b.iter(|| {
            let mut out = [0u8; HEADER_SIZE];
            black_box(&header).encode_to(&mut out);
            out
        })
    });

    let mut encoded = [0u8; HEADER_SIZE];
    header.encode_to(&mut encoded);
    group.bench_function("decode", |b| b.iter(|| FrameHeader::decode(black_box(&encoded))));
    group.finish();
}

fn bench_enqueue(c: &mut Criterion) {
    use dbframe::{Framer, FramerConfig};

    let mut group = c.benchmark_group("enqueue");
    group.measurement_time(Duration::from_secs(5));

    for &size in &[64usize, 4096, 64 * 1024] {
        let payload = vec![0x5Au8; size];
        group.bench_with_input(BenchmarkId::new("uncompressed", size), &payload, |b, payload| {
            b.iter_batched(
                || Framer::new(MemoryTransport::new(), FramerConfig::default()).unwrap(),
                |mut framer| {
                    framer.enqueue(black_box(payload)).unwrap();
                    framer
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_compression_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("compression");
    group.measurement_time(Duration::from_secs(5));

    for &size in &[1024usize, 16 * 1024, 256 * 1024] {
        let payload = vec![b'a'; size];
        group.bench_with_input(BenchmarkId::new("compress", size), &payload, |b, payload| {
            b.iter(|| compress::compress_payload(black_box(payload)))
        });

        let compressed = compress::compress_payload(&payload);
        group.bench_with_input(BenchmarkId::new("decompress", size), &compressed.bytes, |b, bytes| {
            b.iter(|| {
                compress::decompress_payload(black_box(bytes), compressed.uncompressed_length).unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_header_codec, bench_enqueue, bench_compression_round_trip);
criterion_main!(benches);

//! PDU 코덱 / 체크섬 벤치마크

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use srej::checksum::internet_checksum;
use srej::pdu::{decode, encode};
use srej::Flag;

fn bench_checksum(c: &mut Criterion) {
    let mut group = c.benchmark_group("checksum");
    for size in [64usize, 512, 1407] {
        let data: Vec<u8> = (0..size).map(|i| (i * 31) as u8).collect();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| internet_checksum(black_box(data)))
        });
    }
    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let payload = vec![0x5Au8; 1400];
    let frame = encode(12345, Flag::Data, &payload);

    let mut group = c.benchmark_group("pdu");
    group.throughput(Throughput::Bytes(frame.len() as u64));
    group.bench_function("encode_1400", |b| {
        b.iter(|| encode(black_box(12345), Flag::Data, black_box(&payload)))
    });
    group.bench_function("decode_1400", |b| {
        b.iter(|| decode(black_box(&frame)))
    });
    group.finish();
}

criterion_group!(benches, bench_checksum, bench_codec);
criterion_main!(benches);

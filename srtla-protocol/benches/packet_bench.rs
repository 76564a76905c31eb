use bytes::BufMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use srtla_protocol::{
    build_keepalive, build_srtla_data, classify, parse_srtla_ack, parse_srtla_data,
    srt_nak_sequences, SeqNumber,
};
use std::net::Ipv4Addr;

fn srt_data_packet(seq: u32, payload_len: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + payload_len);
    buf.put_u32(seq & 0x7FFF_FFFF);
    buf.put_u32(0);
    buf.put_u32(0);
    buf.put_u32(0);
    buf.resize(16 + payload_len, 0);
    buf
}

fn nak_packet(words: &[u32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + words.len() * 4);
    buf.put_u32(0x8000_0000 | (3u32 << 16));
    buf.put_u32(0);
    buf.put_u32(0);
    buf.put_u32(0);
    for w in words {
        buf.put_u32(*w);
    }
    buf
}

fn bench_classify(c: &mut Criterion) {
    let data = srt_data_packet(123_456, 1316);
    let keepalive = build_keepalive(42);

    c.bench_function("classify_srt_data", |b| {
        b.iter(|| {
            let kind = classify(black_box(&data));
            black_box(kind);
        });
    });

    c.bench_function("classify_srtla_control", |b| {
        b.iter(|| {
            let kind = classify(black_box(&keepalive));
            black_box(kind);
        });
    });
}

fn bench_nak_expansion(c: &mut Criterion) {
    let singles = nak_packet(&[100, 200, 300, 400, 500]);
    let range = nak_packet(&[1000 | 0x8000_0000, 1063]);

    c.bench_function("nak_parse_singles", |b| {
        b.iter(|| {
            let lost = srt_nak_sequences(black_box(&singles));
            black_box(lost);
        });
    });

    c.bench_function("nak_parse_range_64", |b| {
        b.iter(|| {
            let lost = srt_nak_sequences(black_box(&range));
            black_box(lost);
        });
    });
}

fn bench_srtla_data(c: &mut Criterion) {
    let payload = srt_data_packet(99, 1316);
    let frame = build_srtla_data(Ipv4Addr::new(10, 0, 0, 2), SeqNumber::new(99), &payload);

    c.bench_function("srtla_data_build", |b| {
        b.iter(|| {
            let f = build_srtla_data(
                black_box(Ipv4Addr::new(10, 0, 0, 2)),
                black_box(SeqNumber::new(99)),
                black_box(&payload),
            );
            black_box(f);
        });
    });

    c.bench_function("srtla_data_parse", |b| {
        b.iter(|| {
            let decoded = parse_srtla_data(black_box(&frame)).unwrap();
            black_box(decoded);
        });
    });
}

fn bench_srtla_ack(c: &mut Criterion) {
    let mut frame = Vec::with_capacity(44);
    frame.put_u16(0x9100);
    frame.put_u16(0);
    for i in 0..10u32 {
        frame.put_u32(1000 + i);
    }

    c.bench_function("srtla_ack_parse", |b| {
        b.iter(|| {
            let seqs = parse_srtla_ack(black_box(&frame)).unwrap();
            black_box(seqs);
        });
    });
}

criterion_group!(
    benches,
    bench_classify,
    bench_nak_expansion,
    bench_srtla_data,
    bench_srtla_ack
);
criterion_main!(benches);

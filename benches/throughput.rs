use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use relay_proto::{Envelope, EnvelopeCodec};
use tokio_util::codec::{Decoder, Encoder};

fn publish_envelope() -> Envelope {
    let mut env = Envelope::new("publish");
    env.set("channel", "g1");
    env.set("writer", "user-a");
    env.set("type", "text");
    env.set("message", "hello from the benchmark harness");
    env.set("published_at", 1_700_000_000_123i64);
    env
}

fn encode_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    let env = publish_envelope();
    let mut buf = BytesMut::new();
    EnvelopeCodec.encode(env.clone(), &mut buf).unwrap();
    group.throughput(Throughput::Bytes(buf.len() as u64));

    group.bench_function("encode_publish", |b| {
        b.iter(|| {
            let mut codec = EnvelopeCodec;
            let mut buf = BytesMut::new();
            codec.encode(env.clone(), &mut buf).unwrap();
        })
    });

    group.finish();
}

fn decode_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    let env = publish_envelope();
    let mut encoded = BytesMut::new();
    EnvelopeCodec.encode(env, &mut encoded).unwrap();
    group.throughput(Throughput::Bytes(encoded.len() as u64));

    group.bench_function("decode_publish", |b| {
        b.iter(|| {
            let mut codec = EnvelopeCodec;
            let mut buf = encoded.clone();
            codec.decode(&mut buf).unwrap().unwrap();
        })
    });

    group.finish();
}

criterion_group!(benches, encode_benchmark, decode_benchmark);
criterion_main!(benches);

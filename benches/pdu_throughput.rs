//! PDU codec throughput benchmark.
//!
//! Measures TEXT PDU encode, borrowed decode and pooled pin/unpin using
//! Criterion, plus the async framing used by the collector.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pmapi_core::collector::codec::{read_pdu, write_pdu};
use pmapi_core::lock::LockRegistry;
use pmapi_core::pdu::{Decode, Encode, PduPool, TextPdu};
use pmapi_core::Config;
use std::borrow::Cow;
use std::io::Cursor;
use std::sync::Arc;

const MAX_PDU: u32 = 1024 * 1024;
const TEXT_SIZES: &[usize] = &[0, 64, 1024, 4096, 65536];

fn text_pdu(size: usize) -> Vec<u8> {
    let text = "x".repeat(size);
    let mut buf = Vec::new();
    TextPdu {
        ident: 0x0f00_0001,
        text: Cow::Borrowed(text.as_str()),
    }
    .encode(0, &mut buf);
    buf
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("text_encode");
    for &size in TEXT_SIZES {
        let text = "x".repeat(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &text, |b, t| {
            b.iter(|| {
                let mut buf = Vec::with_capacity(size + 24);
                TextPdu {
                    ident: 1,
                    text: Cow::Borrowed(black_box(t.as_str())),
                }
                .encode(0, &mut buf);
                buf
            });
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("text_decode");
    for &size in TEXT_SIZES {
        let wire = text_pdu(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &wire, |b, w| {
            b.iter(|| TextPdu::decode(black_box(w.as_slice())).unwrap().text.len());
        });
    }
    group.finish();
}

fn bench_pool_pin_cycle(c: &mut Criterion) {
    let registry = Arc::new(LockRegistry::init(&Config::default()));
    let pool = PduPool::new(registry, 8);
    let wire = text_pdu(1024);

    c.bench_function("pool_pin_decode_unpin_1kb", |b| {
        b.iter(|| {
            let pdu = pool.pin_copy(black_box(&wire)).unwrap();
            let text = pdu.decode::<TextPdu<'_>>().unwrap().into_owned();
            pdu.unpin();
            text
        });
    });
}

fn bench_async_round_trip(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let text = "x".repeat(1024);

    c.bench_function("async_round_trip_1kb", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut buf = Vec::with_capacity(1048);
                let body = TextPdu {
                    ident: 1,
                    text: Cow::Borrowed(black_box(text.as_str())),
                };
                write_pdu(&mut buf, 0, &body).await.unwrap();
                let mut cursor = Cursor::new(buf);
                read_pdu(&mut cursor, MAX_PDU).await.unwrap()
            })
        });
    });
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode,
    bench_pool_pin_cycle,
    bench_async_round_trip
);
criterion_main!(benches);

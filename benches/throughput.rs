//! Throughput benchmarks for the store, the streams and the RESP decoder.

use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rivulet::protocol::RespParser;
use rivulet::storage::{Store, StreamId};
use std::sync::Arc;
use std::time::Duration;

fn bench_set(c: &mut Criterion) {
    let store = Store::new();

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i));
            store.set(key, Bytes::from("small_value"), None).unwrap();
            i += 1;
        });
    });

    group.bench_function("set_1kb_with_ttl", |b| {
        let mut i = 0u64;
        let value = Bytes::from("x".repeat(1024));
        b.iter(|| {
            let key = Bytes::from(format!("ttl:{}", i));
            store
                .set(key, value.clone(), Some(Duration::from_secs(3600)))
                .unwrap();
            i += 1;
        });
    });

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let store = Store::new();

    for i in 0..100_000 {
        let key = Bytes::from(format!("key:{}", i));
        let value = Bytes::from(format!("value:{}", i));
        store.set(key, value, None).unwrap();
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(store.get(key.as_bytes()).unwrap());
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("missing:{}", i);
            black_box(store.get(key.as_bytes()).unwrap());
            i += 1;
        });
    });

    group.finish();
}

fn bench_xadd(c: &mut Criterion) {
    let store = Store::new();
    let fields = vec![
        (Bytes::from("temperature"), Bytes::from("21.5")),
        (Bytes::from("humidity"), Bytes::from("40")),
    ];

    let mut group = c.benchmark_group("xadd");
    group.throughput(Throughput::Elements(1));

    group.bench_function("auto_id", |b| {
        b.iter(|| {
            black_box(
                store
                    .xadd(Bytes::from("sensor"), b"*", fields.clone())
                    .unwrap(),
            );
        });
    });

    group.bench_function("partial_auto_id", |b| {
        b.iter(|| {
            black_box(
                store
                    .xadd(Bytes::from("ticks"), b"1-*", fields.clone())
                    .unwrap(),
            );
        });
    });

    group.finish();
}

fn bench_xrange(c: &mut Criterion) {
    let store = Store::new();
    for ms in 1..=100_000u64 {
        let token = format!("{}-0", ms);
        store
            .xadd(
                Bytes::from("log"),
                token.as_bytes(),
                vec![(Bytes::from("n"), Bytes::from(ms.to_string()))],
            )
            .unwrap();
    }

    let mut group = c.benchmark_group("xrange");

    group.bench_function("window_of_100", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let start = StreamId::new(i % 99_900 + 1, 0);
            let end = StreamId::new(start.ms + 99, u64::MAX);
            black_box(store.xrange(b"log", start, end, None).unwrap());
            i += 1;
        });
    });

    group.bench_function("read_after_count_10", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let requests = [(Bytes::from("log"), StreamId::new(i % 99_000, 0))];
            black_box(store.xread(&requests, 10).unwrap());
            i += 1;
        });
    });

    group.finish();
}

fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let store = Arc::new(Store::new());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let store = Arc::clone(&store);
                    thread::spawn(move || {
                        let stream = Bytes::from(format!("stream:{}", t % 2));
                        for i in 0..10_000 {
                            let key = Bytes::from(format!("key:{}:{}", t, i));
                            store.set(key.clone(), Bytes::from("value"), None).unwrap();
                            let _ = store.get(&key);
                            let _ = store.xadd(
                                stream.clone(),
                                b"*",
                                vec![(Bytes::from("i"), Bytes::from("1"))],
                            );
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(store.dbsize());
        });
    });

    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let frame: &[u8] =
        b"*5\r\n$4\r\nXADD\r\n$6\r\nsensor\r\n$1\r\n*\r\n$4\r\ntemp\r\n$4\r\n21.5\r\n";
    let mut pipeline = Vec::new();
    for _ in 0..100 {
        pipeline.extend_from_slice(frame);
    }

    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Bytes(pipeline.len() as u64));

    group.bench_function("pipeline_of_100_xadd", |b| {
        let mut parser = RespParser::new();
        b.iter(|| {
            let mut buf = BytesMut::from(&pipeline[..]);
            while let Some(command) = parser.parse_command(&mut buf).unwrap() {
                black_box(command);
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_xadd,
    bench_xrange,
    bench_concurrent,
    bench_parse,
);

criterion_main!(benches);

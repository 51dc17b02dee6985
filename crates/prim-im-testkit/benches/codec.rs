use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use prim_im_core::{ChannelKey, Msg, MsgType, Timeline};

fn frame(payload_len: usize) -> Msg {
    let mut msg = Msg::build(
        MsgType::Text,
        1,
        2,
        3,
        1_736_870_400_000,
        Bytes::from(vec![b'x'; payload_len]),
        Bytes::from_static(b"ext"),
    )
    .unwrap();
    msg.head.seq_num = 42;
    msg
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame");
    for payload_len in [0usize, 64, 1024, 16_000] {
        let msg = frame(payload_len);
        let bytes = msg.encode().unwrap();

        group.bench_with_input(BenchmarkId::new("encode", payload_len), &msg, |b, msg| {
            b.iter(|| black_box(msg).encode().unwrap())
        });
        group.bench_with_input(BenchmarkId::new("decode", payload_len), &bytes, |b, bytes| {
            b.iter(|| Msg::decode(black_box(bytes)).unwrap())
        });
    }
    group.finish();

    c.bench_function("channel_key", |b| {
        b.iter(|| ChannelKey::new(black_box(9_000_001), black_box(17)))
    });
}

fn bench_timeline(c: &mut Criterion) {
    let messages: Vec<Msg> = (1..=1_000u64)
        .map(|seq| {
            let mut msg = Msg::text(2, 1, 0, 1_000 + seq, "m").unwrap();
            msg.head.seq_num = seq;
            msg
        })
        .collect();

    c.bench_function("timeline/in_order_1000", |b| {
        b.iter(|| {
            let mut timeline = Timeline::new();
            for msg in &messages {
                timeline.insert(msg.clone());
            }
            timeline
        })
    });

    c.bench_function("timeline/reverse_order_1000", |b| {
        b.iter(|| {
            let mut timeline = Timeline::new();
            for msg in messages.iter().rev() {
                timeline.insert(msg.clone());
            }
            timeline
        })
    });
}

criterion_group!(benches, bench_codec, bench_timeline);
criterion_main!(benches);

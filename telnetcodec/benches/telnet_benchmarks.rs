//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Benchmarks for telnetcodec performance

use bytes::{Bytes, BytesMut};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use telmux_telnetcodec::{
    TelnetCodec, TelnetEvent, TelnetFlags, TelnetFrame, TelnetOption, TelnetSupport, TelnetVerb,
    consts,
};
use tokio_util::codec::Encoder;

// ============================================================================
// Send Benchmarks
// ============================================================================

fn bench_send_data_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("send_data_sizes");

    for size in [10, 100, 1000, 10000].iter() {
        group.throughput(Throughput::Bytes(*size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut codec = TelnetCodec::new();
            let data: Vec<u8> = (0..size).map(|i| (i % 256) as u8).collect();
            let mut events: Vec<TelnetEvent> = Vec::with_capacity(1);

            b.iter(|| {
                events.clear();
                codec.send(black_box(&data), &mut events);
            });
        });
    }

    group.finish();
}

fn bench_send_text(c: &mut Criterion) {
    let mut group = c.benchmark_group("send_text");

    for size in [10, 100, 1000].iter() {
        let text = "line\n".repeat(*size / 5 + 1);
        group.throughput(Throughput::Bytes(text.len() as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), &text, |b, text| {
            let mut codec = TelnetCodec::new();
            let mut events: Vec<TelnetEvent> = Vec::with_capacity(1);

            b.iter(|| {
                events.clear();
                codec.send_text(black_box(text.as_bytes()), &mut events);
            });
        });
    }

    group.finish();
}

fn bench_encode_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_frames");

    group.bench_function("negotiate", |b| {
        let mut codec = TelnetCodec::new();
        let mut buffer = BytesMut::with_capacity(64);

        b.iter(|| {
            buffer.clear();
            codec.reset();
            codec
                .encode(
                    black_box(TelnetFrame::Negotiate(TelnetVerb::Will, TelnetOption::Echo)),
                    &mut buffer,
                )
                .unwrap();
        });
    });

    group.bench_function("subnegotiate", |b| {
        let mut codec = TelnetCodec::new();
        let mut buffer = BytesMut::with_capacity(64);
        let payload = Bytes::from_static(&[0, 80, 0, 24]);

        b.iter(|| {
            buffer.clear();
            codec
                .encode(
                    black_box(TelnetFrame::Subnegotiate(TelnetOption::NAWS, payload.clone())),
                    &mut buffer,
                )
                .unwrap();
        });
    });

    group.finish();
}

// ============================================================================
// Receive Benchmarks
// ============================================================================

fn bench_receive_data_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("receive_data_sizes");

    for size in [10, 100, 1000, 10000].iter() {
        group.throughput(Throughput::Bytes(*size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut codec = TelnetCodec::new();
            let data: Vec<u8> = (0..size).map(|i| (i % 255) as u8).collect();
            let mut events: Vec<TelnetEvent> = Vec::with_capacity(4);

            b.iter(|| {
                events.clear();
                codec.receive(black_box(&data), &mut events).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_receive_mixed_content(c: &mut Criterion) {
    let mut group = c.benchmark_group("receive_mixed_content");

    let mut input = Vec::new();
    for _ in 0..32 {
        input.extend_from_slice(b"some output text\r\n");
        input.extend_from_slice(&[consts::IAC, consts::GA]);
        input.extend_from_slice(&[consts::IAC, consts::DO, consts::option::SGA]);
        input.extend_from_slice(&[consts::IAC, consts::SB, consts::option::TTYPE, 1]);
        input.extend_from_slice(&[consts::IAC, consts::SE]);
    }
    group.throughput(Throughput::Bytes(input.len() as u64));

    group.bench_function("nvt_session", |b| {
        let support = [TelnetSupport::new(TelnetOption::SuppressGoAhead, true, true)];
        let mut codec =
            TelnetCodec::with_support(&support, TelnetFlags::default().with_nvt_eol(true));
        let mut events: Vec<TelnetEvent> = Vec::with_capacity(256);

        b.iter(|| {
            events.clear();
            codec.receive(black_box(&input), &mut events).unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    send_benches,
    bench_send_data_sizes,
    bench_send_text,
    bench_encode_frames
);

criterion_group!(
    receive_benches,
    bench_receive_data_sizes,
    bench_receive_mixed_content
);

criterion_main!(send_benches, receive_benches);

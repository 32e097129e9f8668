//! HTTP/2 engine benchmarks
//!
//! Measures the hot paths of the engine:
//! - frame header and body encoding/decoding
//! - HPACK compression/decompression (with and without Huffman)
//! - Huffman coding in isolation
//! - flow control window management
//! - stream state transitions
//!
//! Run with: cargo bench --bench h2_performance

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use h2mux::codec::FrameCodec;
use h2mux::flow_control::FlowControlWindow;
use h2mux::frame::{DataFrame, Frame, FrameFlags, FrameType, HeadersFrame};
use h2mux::hpack::{Decoder, Encoder, HeaderEntry};
use h2mux::huffman::HuffmanCoder;
use h2mux::state::{StreamInput, StreamStateMachine};
use std::time::Duration;

fn request_headers() -> Vec<HeaderEntry> {
    vec![
        HeaderEntry::new(":method", "GET"),
        HeaderEntry::new(":path", "/api/v1/data"),
        HeaderEntry::new(":scheme", "https"),
        HeaderEntry::new(":authority", "api.example.com"),
        HeaderEntry::new("content-type", "application/json"),
        HeaderEntry::new("authorization", "Bearer token123456"),
        HeaderEntry::new("user-agent", "h2mux/0.1"),
    ]
}

// ========== Frame Encoding/Decoding ==========

fn bench_frame_header(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_header");

    group.bench_function("encode", |b| {
        b.iter(|| {
            let header = FrameCodec::encode_header(
                black_box(FrameType::Data),
                black_box(FrameFlags::from_u8(0x01)),
                black_box(1),
                black_box(1024),
            );
            black_box(header);
        });
    });

    let encoded = FrameCodec::encode_header(FrameType::Headers, FrameFlags::from_u8(0x05), 1, 4096);
    group.bench_function("parse", |b| {
        b.iter(|| {
            let shell = FrameCodec::parse_frame_header(black_box(&encoded)).unwrap();
            black_box(shell);
        });
    });

    group.finish();
}

fn bench_data_frame_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("data_frame_encode");

    for size in [256usize, 1024, 4096, 16384].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        let data = Bytes::from(vec![0u8; *size]);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let frame = DataFrame::new(black_box(1), black_box(data.clone()), black_box(false));
                let encoded = FrameCodec::encode_data_frame(black_box(&frame));
                black_box(encoded);
            });
        });
    }

    group.finish();
}

fn bench_frame_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_roundtrip");

    let frame = Frame::Headers(HeadersFrame::new(
        1,
        Bytes::from(vec![0x82u8; 256]),
        false,
        true,
    ));
    group.bench_function("headers", |b| {
        b.iter(|| {
            let wire = FrameCodec::serialize(black_box(&frame));
            let mut header = [0u8; 9];
            header.copy_from_slice(&wire[..9]);
            let shell = FrameCodec::parse_frame_header(&header).unwrap();
            let parsed = FrameCodec::parse_body(shell, wire.slice(9..)).unwrap();
            black_box(parsed);
        });
    });

    group.finish();
}

// ========== HPACK ==========

fn bench_hpack_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("hpack_encode");
    let headers = request_headers();

    group.bench_function("plain_fresh_table", |b| {
        b.iter(|| {
            let mut encoder = Encoder::new();
            let block = encoder.encode(black_box(&headers), false);
            black_box(block);
        });
    });

    group.bench_function("huffman_fresh_table", |b| {
        b.iter(|| {
            let mut encoder = Encoder::new();
            let block = encoder.encode(black_box(&headers), true);
            black_box(block);
        });
    });

    group.bench_function("warm_table", |b| {
        // After the first block the whole list is indexed
        let mut encoder = Encoder::new();
        encoder.encode(&headers, false);
        b.iter(|| {
            let block = encoder.encode(black_box(&headers), false);
            black_box(block);
        });
    });

    group.finish();
}

fn bench_hpack_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("hpack_decode");
    let headers = request_headers();

    let mut encoder = Encoder::new();
    let plain_block = encoder.encode(&headers, false);
    let mut encoder = Encoder::new();
    let huffman_block = encoder.encode(&headers, true);

    group.bench_function("plain", |b| {
        b.iter(|| {
            let mut decoder = Decoder::new();
            let decoded = decoder.decode(black_box(&plain_block)).unwrap();
            black_box(decoded);
        });
    });

    group.bench_function("huffman", |b| {
        b.iter(|| {
            let mut decoder = Decoder::new();
            let decoded = decoder.decode(black_box(&huffman_block)).unwrap();
            black_box(decoded);
        });
    });

    group.finish();
}

// ========== Huffman ==========

fn bench_huffman(c: &mut Criterion) {
    let mut group = c.benchmark_group("huffman");
    let coder = HuffmanCoder::new();
    let input = b"www.example.com/path/to/resource?query=string&flag=1";
    group.throughput(Throughput::Bytes(input.len() as u64));

    group.bench_function("encode", |b| {
        b.iter(|| {
            let encoded = coder.encode(black_box(input));
            black_box(encoded);
        });
    });

    let encoded = coder.encode(input);
    group.bench_function("decode", |b| {
        b.iter(|| {
            let decoded = coder.decode(black_box(&encoded)).unwrap();
            black_box(decoded);
        });
    });

    group.finish();
}

// ========== Flow Control ==========

fn bench_flow_control(c: &mut Criterion) {
    let mut group = c.benchmark_group("flow_control");

    group.bench_function("consume", |b| {
        b.iter(|| {
            let mut window = FlowControlWindow::new();
            let sent = window.consume(black_box(16384));
            black_box(sent);
        });
    });

    group.bench_function("consume_increase_cycle", |b| {
        b.iter(|| {
            let mut window = FlowControlWindow::new();
            for _ in 0..10 {
                window.consume(black_box(1024));
                let _ = window.increase(black_box(1024));
            }
            black_box(window);
        });
    });

    group.finish();
}

// ========== Stream State Machine ==========

fn bench_state_machine(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_state");

    group.bench_function("full_request_lifecycle", |b| {
        b.iter(|| {
            let mut machine = StreamStateMachine::new();
            machine.process_input(black_box(StreamInput::SendHeaders)).unwrap();
            machine.process_input(black_box(StreamInput::SendEndStream)).unwrap();
            machine.process_input(black_box(StreamInput::RecvHeaders)).unwrap();
            machine.process_input(black_box(StreamInput::RecvData)).unwrap();
            machine.process_input(black_box(StreamInput::RecvEndStream)).unwrap();
            black_box(machine);
        });
    });

    group.finish();
}

criterion_group! {
    name = frames;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(1000);
    targets = bench_frame_header, bench_data_frame_sizes, bench_frame_roundtrip
}

criterion_group! {
    name = hpack;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(1000);
    targets = bench_hpack_encode, bench_hpack_decode, bench_huffman
}

criterion_group! {
    name = windows_and_streams;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(1000);
    targets = bench_flow_control, bench_state_machine
}

criterion_main!(frames, hpack, windows_and_streams);

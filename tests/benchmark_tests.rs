//! Performance benchmarks for the wire codec and the relay handlers

use server::relay::RelayState;
use shared::{crc16, FrameDecoder, Message, Vector2, MAX_PAYLOAD_SIZE};
use std::net::SocketAddr;
use std::time::Instant;

/// Benchmarks CRC over a maximum-size payload
#[test]
fn benchmark_crc16() {
    let data = vec![0xA5u8; MAX_PAYLOAD_SIZE];
    let iterations = 10_000;
    let start = Instant::now();

    let mut acc = 0u16;
    for _ in 0..iterations {
        acc ^= crc16(&data);
    }

    let duration = start.elapsed();
    println!(
        "CRC16: {} x {} bytes in {:?} ({:.2} ns/iter), acc {:04x}",
        iterations,
        MAX_PAYLOAD_SIZE,
        duration,
        duration.as_nanos() as f64 / iterations as f64,
        acc
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks decoding a long stream of position updates
#[test]
fn benchmark_frame_decoding() {
    let message = Message::SetPlayerPos {
        client_id: 3,
        position: Vector2::new(20.0, 300.0),
        direction: Vector2::new(0.0, 1.0),
    };
    let frame = message.encode().unwrap();
    let iterations = 100_000;
    let stream: Vec<u8> = frame
        .iter()
        .copied()
        .cycle()
        .take(frame.len() * iterations)
        .collect();

    let mut decoder = FrameDecoder::new();
    let start = Instant::now();

    let mut decoded = 0;
    for chunk in stream.chunks(1400) {
        for frame in decoder.push(chunk) {
            Message::from_frame(&frame).unwrap();
            decoded += 1;
        }
    }

    let duration = start.elapsed();
    println!(
        "Frame decoding: {} frames in {:?} ({:.2} ns/frame)",
        decoded,
        duration,
        duration.as_nanos() as f64 / decoded as f64
    );

    assert_eq!(decoded, iterations);
    assert!(duration.as_millis() < 2000);
}

/// Stress test: many clients pairing up and relaying positions
#[test]
fn stress_test_handler_throughput() {
    let clients = 200;
    let mut state = RelayState::new(clients, clients / 2, 2);
    let now = Instant::now();
    let addr = |i: usize| SocketAddr::from(([127, 0, 0, 1], 10_000 + i as u16));

    for i in 0..clients {
        state.handle(Message::Connect, addr(i), now);
    }
    for pair in 0..clients / 2 {
        let (main, secondary) = ((pair * 2) as u16, (pair * 2 + 1) as u16);
        state.handle(Message::CreateSession { client_id: main }, addr(pair * 2), now);
        state.handle(
            Message::AssignToSession {
                session_id: pair as u16,
                client_id: secondary,
            },
            addr(pair * 2 + 1),
            now,
        );
    }
    assert_eq!(state.open_sessions(), clients / 2);

    let iterations = 20_000;
    let start = Instant::now();

    let mut relayed = 0;
    for i in 0..iterations {
        let sender = i % clients;
        let replies = state.handle(
            Message::SetPlayerPos {
                client_id: sender as u16,
                position: Vector2::new(20.0, i as f32),
                direction: Vector2::new(0.0, 1.0),
            },
            addr(sender),
            now,
        );
        relayed += replies.len();
    }

    let duration = start.elapsed();
    println!(
        "Handler throughput: {} requests in {:?} ({:.2} ns/request)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert_eq!(relayed, iterations);
    // Debug builds re-check every pool invariant after each request
    assert!(duration.as_secs() < 30);
}

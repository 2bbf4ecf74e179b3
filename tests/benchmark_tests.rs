//! Performance benchmarks for the protocol codecs

use shared::{
    decode_offer, encode_offer, frame_message, parse_answer, FrameBuffer, Opcode,
};
use std::time::Instant;

/// Benchmarks offer encoding and decoding
#[test]
fn benchmark_offer_codec() {
    let iterations = 100_000;
    let start = Instant::now();

    for i in 0..iterations {
        let offer = encode_offer("LAN Trivia", (i % 65_535) as u16).unwrap();
        let decoded = decode_offer(&offer).unwrap();
        assert_eq!(decoded.port, (i % 65_535) as u16);
    }

    let duration = start.elapsed();
    println!(
        "Offer codec: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    // Generous bound, debug builds included
    assert!(duration.as_millis() < 2_000);
}

/// Benchmarks reassembly of a long session stream read in small chunks
#[test]
fn benchmark_frame_reassembly() {
    let messages = 20_000;
    let mut stream = Vec::new();
    for i in 0..messages {
        stream.extend(frame_message(
            Opcode::Info,
            &format!("Standings after {} round(s):\nPlayer1 : {}", i, i),
        ));
    }

    let start = Instant::now();
    let mut frames = FrameBuffer::new();
    let mut received = 0;
    for chunk in stream.chunks(61) {
        received += frames.push(chunk).iter().filter(|f| f.is_ok()).count();
    }
    let duration = start.elapsed();

    println!(
        "Frame reassembly: {} messages ({} bytes) in {:?}",
        messages,
        stream.len(),
        duration
    );

    assert_eq!(received, messages);
    assert!(duration.as_millis() < 2_000);
}

/// Benchmarks answer parsing
#[test]
fn benchmark_answer_parsing() {
    let inputs = ["yes", " No ", "TRUE", "f", "1", "maybe", "", "0"];
    let iterations = 100_000;
    let start = Instant::now();

    let mut parsed = 0;
    for i in 0..iterations {
        if parse_answer(inputs[i % inputs.len()]).is_some() {
            parsed += 1;
        }
    }

    let duration = start.elapsed();
    println!(
        "Answer parsing: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert_eq!(parsed, iterations / inputs.len() * 6);
    assert!(duration.as_millis() < 2_000);
}

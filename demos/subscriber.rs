//! Example subscriber (reader side)
//!
//! Polls until the bus segment exists, then drains it continuously and
//! prints a throughput line every second.
//!
//! Usage: subscriber [name]

use aetherbus::{BusError, BusReader, DEFAULT_SEGMENT_NAME};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_SEGMENT_NAME.to_string());

    println!("[Subscriber] Waiting for bus segment '{}'...", name);

    let mut reader = loop {
        match BusReader::connect(&name) {
            Ok(r) => break r,
            Err(BusError::SegmentNotFound { .. }) => {
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(e) => {
                eprintln!("[Subscriber] Failed to connect: {}", e);
                std::process::exit(1);
            }
        }
    };

    println!(
        "[Subscriber] Connected at head {}. Ctrl+C to exit.",
        reader.local_head()
    );

    let mut total_msgs = 0u64;
    let mut window_msgs = 0u64;
    let mut window_bytes = 0u64;
    let mut window_start = Instant::now();

    loop {
        for msg in reader.read() {
            total_msgs += 1;
            window_msgs += 1;
            window_bytes += msg.payload.len() as u64;
        }

        if window_start.elapsed() >= Duration::from_secs(1) {
            if window_msgs > 0 {
                let secs = window_start.elapsed().as_secs_f64();
                println!(
                    "[Subscriber] {} msg/s, {:.1} MB/s, total {} (overruns: {})",
                    (window_msgs as f64 / secs) as u64,
                    window_bytes as f64 / secs / (1024.0 * 1024.0),
                    total_msgs,
                    reader.overruns(),
                );
            }
            window_msgs = 0;
            window_bytes = 0;
            window_start = Instant::now();
        }

        std::thread::sleep(Duration::from_millis(1));
    }
}

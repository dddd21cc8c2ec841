//! Example publisher (writer side)
//!
//! Creates the bus segment, publishes a burst of messages on topic
//! `demo.speed`, then keeps the segment alive long enough for
//! subscribers to drain it.
//!
//! Usage: publisher [name] [count] [payload_bytes]

use aetherbus::{BusConfig, BusWriter, DEFAULT_SEGMENT_NAME};
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
    let count: u64 = std::env::args()
        .nth(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);
    let payload_size: usize = std::env::args()
        .nth(3)
        .and_then(|s| s.parse().ok())
        .unwrap_or(1024);

    println!("[Publisher] Bus segment: {}", name);
    println!(
        "[Publisher] Publishing {} messages of {} bytes on 'demo.speed'",
        count, payload_size
    );

    let mut writer = match BusWriter::create(&name, BusConfig::default()) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("[Publisher] Failed to create bus: {}", e);
            std::process::exit(1);
        }
    };

    // First 8 payload bytes carry the message sequence number
    let mut payload = vec![0xABu8; payload_size.max(8)];
    let start = Instant::now();

    for i in 0..count {
        payload[..8].copy_from_slice(&i.to_le_bytes());
        if let Err(e) = writer.write("demo.speed", &payload) {
            eprintln!("[Publisher] Write failed: {}", e);
            std::process::exit(1);
        }
    }

    let elapsed = start.elapsed();
    let msgs_per_sec = count as f64 / elapsed.as_secs_f64();
    let mb_per_sec =
        (count as usize * payload.len()) as f64 / elapsed.as_secs_f64() / (1024.0 * 1024.0);

    println!();
    println!("╔═══════════════════════════════════════╗");
    println!("║            Publish Results            ║");
    println!("╠═══════════════════════════════════════╣");
    println!("║ Messages:    {:>20}   ║", count);
    println!("║ Total time:  {:>17.2} ms ║", elapsed.as_secs_f64() * 1000.0);
    println!("║ Throughput:  {:>14.0} msg/s ║", msgs_per_sec);
    println!("║ Bandwidth:   {:>15.1} MB/s ║", mb_per_sec);
    println!("╚═══════════════════════════════════════╝");
    println!();
    println!("[Publisher] Final write head: {}", writer.write_head());
    println!("[Publisher] Keeping the segment alive for 10s for subscribers...");

    std::thread::sleep(Duration::from_secs(10));
    writer.close();
    println!("[Publisher] Closed and unlinked");
}

//! Benchmark for offering 100,000 items to each storage engine
//!
//! Measures offer throughput for the ordered (Fjall) and transactional
//! (LMDB) backends in deferred write mode, then drains a sample to check
//! that the items came back in order.

use proven_durable_queue::{DurableQueue, QueueConfig, TransactionalConfig};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::time::Instant;

const NUM_OFFERS: usize = 100_000;
const PROGRESS_INTERVAL: usize = 1_000;
const STATUS_INTERVAL: usize = 10_000;
const SAMPLE_SIZE: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Job {
    Resize {
        image: String,
        width: u32,
        height: u32,
    },
    Thumbnail { image: String },
    Upload { bytes: Vec<u8> },
}

fn job(i: usize) -> Job {
    match i % 3 {
        0 => Job::Resize {
            image: format!("image_{}.png", i),
            width: 1024,
            height: 768,
        },
        1 => Job::Thumbnail {
            image: format!("image_{}.jpg", i),
        },
        _ => Job::Upload {
            bytes: format!("data_{}", i % 1000).into_bytes(),
        },
    }
}

fn run(label: &str, config: QueueConfig) {
    println!("\n--- {} ---", label);

    let queue = DurableQueue::<Job>::open(config).expect("Failed to open queue");

    println!("Starting {} offers...", NUM_OFFERS);
    let start_time = Instant::now();
    let mut last_status_time = start_time;
    let mut last_status_count = 0;

    for i in 0..NUM_OFFERS {
        if let Err(e) = queue.offer(&job(i)) {
            eprintln!("\nError at offer {}: {}", i, e);
            break;
        }

        // Progress indicator
        if (i + 1) % PROGRESS_INTERVAL == 0 {
            eprint!(".");
            io::stderr().flush().unwrap();
        }

        // Status update
        if (i + 1) % STATUS_INTERVAL == 0 {
            let current_time = Instant::now();
            let interval_duration = current_time.duration_since(last_status_time);
            let interval_count = (i + 1) - last_status_count;
            let interval_throughput = interval_count as f64 / interval_duration.as_secs_f64();

            eprintln!(
                "\n[{:7}/{:7}] {:3}% | Interval: {:.0} offers/sec",
                i + 1,
                NUM_OFFERS,
                ((i + 1) * 100) / NUM_OFFERS,
                interval_throughput
            );

            last_status_time = current_time;
            last_status_count = i + 1;
        }
    }

    eprintln!();

    queue.flush().expect("Failed to flush queue");
    let total_seconds = start_time.elapsed().as_secs_f64();
    let throughput = NUM_OFFERS as f64 / total_seconds;

    println!("\nVerifying queue size...");
    if queue.size() == NUM_OFFERS as u64 {
        println!("✓ Queue size is {}", queue.size());
    } else {
        println!("⚠ Expected size {}, got {}", NUM_OFFERS, queue.size());
    }

    println!("\nVerifying sample polls...");
    let mut verified = 0;
    for i in 0..SAMPLE_SIZE {
        match queue.poll() {
            Ok(Some(polled)) if polled == job(i) => verified += 1,
            Ok(other) => println!("⚠ Unexpected item {}: {:?}", i, other),
            Err(e) => println!("⚠ Failed to poll item {}: {}", i, e),
        }
    }
    println!("✓ Verified {}/{} sample polls", verified, SAMPLE_SIZE);

    println!("\n=== {} Results ===", label);
    println!("Total offers:      {}", NUM_OFFERS);
    println!("Total time:        {:.2} seconds", total_seconds);
    println!("Throughput:        {:.0} offers/second", throughput);
    println!(
        "Avg latency:       {:.3} ms/offer",
        (total_seconds * 1000.0) / NUM_OFFERS as f64
    );

    queue.clear().expect("Failed to clear queue");
}

fn main() {
    println!("=== 100K Offer Benchmark ===");

    let dir = tempfile::tempdir().expect("Failed to create temporary directory");

    run(
        "Ordered (Fjall)",
        QueueConfig::ordered(dir.path().join("ordered")),
    );
    run(
        "Transactional (LMDB)",
        QueueConfig::new(
            TransactionalConfig::new(dir.path().join("transactional"))
                .with_map_size(1024 * 1024 * 1024),
        ),
    );

    println!("\n✓ Benchmark complete!");
}

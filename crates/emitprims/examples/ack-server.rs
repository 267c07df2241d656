//! Minimal ack server: answers every `news` event with "received".
//!
//! Run with:
//!   cargo run --example ack-server
//!
//! In another terminal:
//!   cargo run --features cli -- send /tmp/emitprims-news-<pid>/news.sock \
//!     news --json '{"hello":"world"}' --ack

use std::fs;
use std::sync::mpsc;

use emitprims::spark::{Hub, SparkListener};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sock_dir = std::env::temp_dir().join(format!("emitprims-news-{}", std::process::id()));
    fs::create_dir_all(&sock_dir)?;
    let sock_path = sock_dir.join("news.sock");

    let listener = SparkListener::bind(&sock_path)?;
    eprintln!("Listening on {}", sock_path.display());

    let hub = Hub::new();
    let (closed_tx, closed_rx) = mpsc::channel();

    // Serve one spark, then exit once it disconnects.
    let spark = listener.accept_with(|spark| {
        let id = spark.id().to_string();
        let _ = spark.on("news", move |args, reply| {
            eprintln!("{id} sent news: {args:?}");
            if let Some(reply) = reply {
                let _ = reply.ok("received");
            }
        });
        spark.on_close(move |_id| {
            let _ = closed_tx.send(());
        });
        hub.insert(spark.clone());
    })?;
    eprintln!("Spark connected: {}", spark.id());

    let _ = closed_rx.recv();
    eprintln!("Spark disconnected, {} still connected", hub.len());

    drop(listener);
    let _ = fs::remove_dir_all(&sock_dir);
    Ok(())
}

//! Push a burst of `ping` requests through the courier sender and report the
//! batches that went on the wire.
//!
//! # What this does
//!
//! 1. TCP connect to `COURIER_ADDR` (default `127.0.0.1:4430`)
//! 2. Queue `COURIER_PINGS` pings (default 10) from concurrent tasks
//! 3. Flush until the queue is empty, printing each batch
//! 4. Tear the session down, failing whatever is still in flight
//!
//! Nothing is encrypted, so point it at a local listener (`nc -l 4430 | xxd`).
//!
//! # Run
//! ```text
//! COURIER_PINGS=250 COURIER_TRANSPORT=intermediate cargo run -p courier-connect
//! ```

use std::env;
use std::error::Error;

use courier_mtproto::{Message, MtpState, container, tl};
use courier_sender::{AbridgedTransport, IntermediateTransport, PackerConfig, Sender, Transport};
use tokio::net::TcpStream;

const DEFAULT_ADDR: &str = "127.0.0.1:4430";

#[tokio::main]
async fn main() {
    if env::var("RUST_LOG").is_err() {
        unsafe { env::set_var("RUST_LOG", "courier_sender=info,courier_connect=info"); }
    }
    env_logger::init();
    if let Err(e) = run().await {
        eprintln!("✗ {e}");
        std::process::exit(1);
    }
}

fn env_usize(name: &str, default: usize) -> Result<usize, Box<dyn Error>> {
    match env::var(name) {
        Ok(v)  => v.parse().map_err(|e| format!("{name}={v}: {e}").into()),
        Err(_) => Ok(default),
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let addr  = env::var("COURIER_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_owned());
    let pings = env_usize("COURIER_PINGS", 10)?;
    let config = PackerConfig::default()
        .max_batch_count(env_usize("COURIER_MAX_BATCH", PackerConfig::default().max_batch_count)?);

    println!("🔌 Connecting to {addr} …");
    let stream = TcpStream::connect(&addr).await?;

    match env::var("COURIER_TRANSPORT").as_deref() {
        Ok("intermediate") => push(IntermediateTransport::new(stream), config, pings).await,
        _                  => push(AbridgedTransport::new(stream), config, pings).await,
    }
}

async fn push<T: Transport>(mut transport: T, config: PackerConfig, pings: usize) -> Result<(), Box<dyn Error>> {
    let mut sender = Sender::new(MtpState::new(), config);
    let handle = sender.handle();

    let producers: Vec<_> = (0..4)
        .map(|worker| {
            let handle = handle.clone();
            tokio::spawn(async move {
                (worker..pings)
                    .step_by(4)
                    .map(|i| handle.invoke(tl::ping(i as i64)))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut replies = Vec::with_capacity(pings);
    for p in producers {
        replies.extend(p.await?);
    }

    while handle.pending() > 0 {
        let Some(batch) = sender.next_batch().await? else { continue };
        let summary = match batch.container_id() {
            Some(cid) => {
                let (outer, _) = Message::parse(&batch.bytes).ok_or("malformed container")?;
                let members = container::parse(&outer.body)?;
                format!("container {cid} with {} messages", members.len())
            }
            None => format!("single message {}", batch.accepted[0].msg_id().map_or(0, |m| m.0)),
        };
        transport.send(&batch.bytes).await?;
        println!("  → {} bytes: {summary}", batch.bytes.len());
        log::debug!("sent {} requests", batch.len());
        sender.mark_sent(batch);
    }

    let (in_flight, pending) = handle.disconnect("demo finished");
    println!("✓ {} pings framed; {in_flight} in flight and {pending} queued at shutdown", replies.len());
    Ok(())
}

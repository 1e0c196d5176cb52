//! Minimal client that sends one logical packet and prints the echoed reply.
//!
//! ```bash
//! cargo run --example echo_client -- 127.0.0.1:4000 "hello framer"
//! ```

use dbframe::{Framer, FramerConfig, TcpTransport};
use std::env;
use std::net::TcpStream;
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let addr = env::args().nth(1).unwrap_or_else(|| "127.0.0.1:4000".to_string());
    let message = env::args().nth(2).unwrap_or_else(|| "hello framer".to_string());

    let stream = TcpStream::connect(&addr)?;
    let transport = TcpTransport::new(stream)?;
    let mut framer = Framer::new(transport, FramerConfig::default())?;

    framer.enqueue(message.as_bytes())?;
    framer.flush()?;
    info!(%message, "sent");

    let len = framer.read_one_logical_packet()?;
    let reply = String::from_utf8_lossy(framer.payload());
    info!(len, %reply, "received echo");
    println!("{reply}");
    Ok(())
}

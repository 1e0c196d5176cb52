//! Minimal server that reads one logical packet per connection and echoes it back.
//!
//! ```bash
//! cargo run --example echo_server -- 127.0.0.1:4000
//! ```

use dbframe::{Framer, FramerConfig, TcpTransport};
use std::env;
use std::net::TcpListener;
use std::thread;
use tracing::{error, info};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let addr = env::args().nth(1).unwrap_or_else(|| "127.0.0.1:4000".to_string());
    let listener = TcpListener::bind(&addr)?;
    info!(%addr, "listening");

    for stream in listener.incoming() {
        let stream = stream?;
        thread::spawn(move || {
            let peer = stream.peer_addr().ok();
            let transport = match TcpTransport::new(stream) {
                Ok(t) => t,
                Err(e) => {
                    error!(?e, "failed to wrap connection");
                    return;
                }
            };
            let mut framer = match Framer::new(transport, FramerConfig::default()) {
                Ok(f) => f,
                Err(e) => {
                    error!(?e, "failed to initialize framer");
                    return;
                }
            };
            loop {
                match framer.read_one_logical_packet() {
                    Ok(len) => {
                        info!(?peer, len, "echoing packet");
                        let payload = framer.payload().to_vec();
                        if let Err(e) = framer.enqueue(&payload) {
                            error!(?peer, ?e, "write failed");
                            return;
                        }
                        if let Err(e) = framer.flush() {
                            error!(?peer, ?e, "flush failed");
                            return;
                        }
                    }
                    Err(e) => {
                        info!(?peer, ?e, "connection closed");
                        return;
                    }
                }
            }
        });
    }
    Ok(())
}

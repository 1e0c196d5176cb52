//! Packet framing and reassembly for a MySQL-style database wire protocol.
//!
//! A [`Framer`] turns a byte-stream [`Transport`] into a sequence of numbered, length-prefixed
//! logical packets: it splits oversize payloads across multiple frames, reassembles them on
//! the read side, optionally compresses frames, and offers both a blocking API with bounded
//! retry and a cooperative non-blocking API built on explicit, resumable state machines.
//!
//! ```rust,no_run
//! use dbframe::{Framer, FramerConfig, TcpTransport};
//! use std::net::TcpStream;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = TcpStream::connect("127.0.0.1:3306")?;
//! let transport = TcpTransport::new(stream)?;
//! let mut framer = Framer::new(transport, FramerConfig::default())?;
//!
//! framer.enqueue(b"hello")?;
//! framer.flush()?;
//!
//! let len = framer.read_one_logical_packet()?;
//! println!("got {} bytes: {:?}", len, framer.payload());
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod compress;
pub mod config;
pub mod connection;
pub mod error;
pub mod nonblocking;
pub mod reader;
pub mod transport;
pub mod wire;
mod writer;

pub use config::{FramerConfig, FramerConfigBuilder};
pub use connection::Framer;
pub use error::{ErrorKind, FramerError, Result};
pub use nonblocking::Poll;
pub use transport::{Direction, TcpTransport, Transport};

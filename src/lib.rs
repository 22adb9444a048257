//! # zone-protocol
//!
//! Protocol core for network-facing game servers: stream framing, ordered
//! event dispatch, and baseline/delta state replication.
//!
//! ## What it does
//! - **Framing** ([`core`]): reassembles segmented byte streams into
//!   length-prefixed, optionally compressed frames, and routes application
//!   bodies to packet decoders by a CRC type identifier.
//! - **Sessions** ([`session`]): one growable/shrinkable reassembly window
//!   and one dispatch-chain cursor per connection.
//! - **Ordered dispatch** ([`dispatch`]): packets from one connection are
//!   processed in arrival order by asynchronous consumers, without a global
//!   lock on the processing path.
//! - **Replication** ([`replication`]): shared entities publish a baseline
//!   once per observer, then per-slot deltas; versioned view caches resend a
//!   bucket only when its tier version advanced.
//!
//! ## Wire Format
//! ```text
//! [Flags(1)] [EncodedLen(2, LE)] [RawLen(2, LE)] [Body(N)]
//! ```
//! Application bodies carry a 2-byte reserved sub-header and a 4-byte type
//! identifier at offset 2.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use zone_protocol::config::ProtocolConfig;
//! use zone_protocol::core::registry::PacketRegistry;
//! use zone_protocol::dispatch::Dispatcher;
//! use zone_protocol::replication::map::MapLocationsRequest;
//! use zone_protocol::transport::Server;
//!
//! #[tokio::main]
//! async fn main() -> zone_protocol::error::Result<()> {
//!     let registry = Arc::new(PacketRegistry::new());
//!     registry.register(MapLocationsRequest::NAME, MapLocationsRequest::decode)?;
//!
//!     let (dispatcher, events) = Dispatcher::new();
//!     tokio::spawn(zone_protocol::dispatch::run_ordered(events, |event| {
//!         tracing::info!(?event, "event processed");
//!     }));
//!
//!     let server = Server::bind(ProtocolConfig::default(), registry, dispatcher).await?;
//!     server.run().await
//! }
//! ```

pub mod config;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod replication;
pub mod session;
pub mod transport;
pub mod utils;

pub use config::ProtocolConfig;
pub use error::{ProtocolError, Result};

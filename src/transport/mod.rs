//! # Transport Layer
//!
//! TCP plumbing around the protocol core: accept loop, per-connection
//! session wiring, and the client-side framed connector.

pub mod tcp;

pub use tcp::{connect, Server};

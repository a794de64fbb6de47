//! Native Electrum client over TCP or TLS.
//!
//! Implements [`ChainDataConnector`](super::ChainDataConnector) with
//! newline-delimited JSON-RPC, a `server.version` handshake on connect, and
//! a timeout around every network step.

mod client;
mod connection;
mod parsing;
mod protocol;

pub use client::{ElectrumConnector, ElectrumSession};

//! TESS-W 4C reader.
//!
//! A single UDP socket receives JSON datagrams from every TESS-W 4C on the
//! network. Each datagram is resolved against the registry, gated by the
//! night window of the device's site, enriched and dispatched to sinks.

pub mod listener;

pub use listener::{DatagramOutcome, ListenerStats, Tessw4cListener};

/// Default UDP port TESS-W units push to.
pub const DEFAULT_UDP_PORT: u16 = 2255;

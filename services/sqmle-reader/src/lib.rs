//! SQM-LE reader.
//!
//! Each SQM-LE is polled over TCP: one 4-byte command per connection, one
//! comma-separated response line back. Readings taken while the device's
//! site is in its night window are enriched and dispatched to sinks.

pub mod client;
pub mod protocol;
pub mod scheduler;

pub use client::SqmleClient;
pub use protocol::{SqmCommand, SqmResponse};
pub use scheduler::{PollOutcome, PollSchedule, PollStats, SqmlePoller};

//! `ble-gateway` library.
//!
//! The binary (`src/main.rs`) is responsible for signal handling, logging
//! setup and process exit codes. Everything else lives here so it can be
//! tested without a radio: ingest backends feed a bounded queue, the
//! [`pipeline::Pipeline`] decodes each advertisement with the
//! [`dispatcher::Dispatcher`] and the [`router::Router`] forwards the
//! resulting records to the configured [`sink`]s.

pub mod advertisement;
pub mod batch;
pub mod cli;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod mac_address;
pub mod pipeline;
pub mod record;
pub mod router;
pub mod scanner;
pub mod sink;
pub mod throttle;
pub mod transform;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use advertisement::Advertisement;
pub use codec::Codec;
pub use config::{ConfigError, GatewayConfig};
pub use dispatcher::Dispatcher;
pub use mac_address::MacAddress;
pub use pipeline::{Pipeline, RunError, RunSummary, Scanner, State, StopReason};
pub use record::{Record, Value};
pub use router::Router;
pub use scanner::{Backend, IngestItem, ScanError, ScanOptions};
pub use sink::{Destination, Sink, SinkError};
pub use throttle::{IntervalGate, parse_duration};
pub use transform::FieldTransformer;

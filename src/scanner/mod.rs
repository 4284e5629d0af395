//! Advertisement ingest.
//!
//! Every backend runs as its own task and feeds a bounded channel that the
//! pipeline consumes. Radio reception must never stall on a slow consumer,
//! so producers wait at most [`SEND_TIMEOUT`] for queue space and drop the
//! item otherwise.

#[cfg(feature = "bluer")]
pub mod bluer;

#[cfg(feature = "hci")]
pub mod hci;

pub mod simulator;

use crate::advertisement::Advertisement;
use crate::record::Record;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Longest time a producer waits for queue space.
pub const SEND_TIMEOUT: Duration = Duration::from_millis(10);

/// One unit of work for the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestItem {
    /// A raw advertisement, still to be decoded.
    Advertisement(Advertisement),
    /// A record some producer already decoded.
    Decoded(Record),
}

/// Error type for scanner operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
}

/// Available ingest backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// BlueZ D-Bus backend (requires bluetoothd daemon)
    #[cfg(feature = "bluer")]
    Bluer,
    /// Raw HCI socket backend (direct kernel access, no daemon required)
    #[cfg(feature = "hci")]
    Hci,
    /// Synthetic RuuviTag traffic, no radio needed
    Simulator,
}

impl Default for Backend {
    fn default() -> Self {
        #[cfg(feature = "bluer")]
        return Backend::Bluer;
        #[cfg(all(feature = "hci", not(feature = "bluer")))]
        return Backend::Hci;
        #[cfg(not(any(feature = "bluer", feature = "hci")))]
        return Backend::Simulator;
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "bluer")]
            Backend::Bluer => write!(f, "bluer"),
            #[cfg(feature = "hci")]
            Backend::Hci => write!(f, "hci"),
            Backend::Simulator => write!(f, "simulator"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            #[cfg(feature = "bluer")]
            "bluer" | "bluez" => Ok(Backend::Bluer),
            #[cfg(feature = "hci")]
            "hci" | "raw" => Ok(Backend::Hci),
            "simulator" | "sim" => Ok(Backend::Simulator),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

/// What to start and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    pub backend: Backend,
    /// HCI device index (`hciN`).
    pub device: u16,
    /// Ingest channel capacity.
    pub queue_size: usize,
    /// Advertisements the simulator emits before it stops.
    pub simulated: u64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            device: 0,
            queue_size: 100,
            simulated: 0,
        }
    }
}

/// Outcome of [`Producer::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    Sent,
    /// The queue stayed full for [`SEND_TIMEOUT`].
    Dropped,
    /// The consumer is gone; the producer should stop.
    Closed,
}

/// Sending half of the ingest queue with a bounded wait.
#[derive(Debug)]
pub struct Producer {
    tx: mpsc::Sender<IngestItem>,
    dropped: u64,
}

impl Producer {
    pub fn new(tx: mpsc::Sender<IngestItem>) -> Self {
        Self { tx, dropped: 0 }
    }

    pub async fn push(&mut self, item: IngestItem) -> Push {
        match self.tx.send_timeout(item, SEND_TIMEOUT).await {
            Ok(()) => Push::Sent,
            Err(SendTimeoutError::Timeout(_)) => {
                self.dropped += 1;
                debug!(dropped = self.dropped, "ingest queue full, item dropped");
                Push::Dropped
            }
            Err(SendTimeoutError::Closed(_)) => Push::Closed,
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        if self.dropped > 0 {
            warn!(dropped = self.dropped, "items dropped on a full ingest queue");
        }
    }
}

/// A bounded ingest channel. A zero capacity is raised to one.
pub fn channel(queue_size: usize) -> (Producer, mpsc::Receiver<IngestItem>) {
    let (tx, rx) = mpsc::channel(queue_size.max(1));
    (Producer::new(tx), rx)
}

/// Start the selected backend.
///
/// The backend runs until `cancel` fires or, for the simulator, until it
/// has emitted every advertisement; the channel closes when it stops.
pub async fn start_scan(
    options: ScanOptions,
    cancel: CancellationToken,
) -> Result<mpsc::Receiver<IngestItem>, ScanError> {
    match options.backend {
        #[cfg(feature = "bluer")]
        Backend::Bluer => bluer::start_scan(options, cancel).await,
        #[cfg(feature = "hci")]
        Backend::Hci => hci::start_scan(options, cancel).await,
        Backend::Simulator => Ok(simulator::start(options, cancel)),
    }
}

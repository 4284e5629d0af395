//! Delivery targets.
//!
//! A [`Sink`] knows how to write a batch of records somewhere. The generic
//! delivery machinery (throttling, field shaping, batching, failure
//! handling) lives in [`Destination`], which wraps exactly one sink.
//!
//! Sink types are looked up by their configured `type` in a static
//! registration table.

pub mod drop;
pub mod file;
pub mod influxdb;
pub mod scan;
pub mod thingspeak;

use crate::batch::BatchingBuffer;
use crate::config::DestinationConfig;
use crate::record::Record;
use crate::throttle::{IntervalGate, seconds};
use crate::transform::FieldTransformer;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info};

/// Name and type of the built-in discard destination.
pub const DROP: &str = "DROP";

/// Name and type of the built-in inventory destination used in scan mode.
pub const SCAN: &str = "SCAN";

/// `output` parameter value meaning standard output.
pub const STDOUT: &str = "-";

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("unknown destination type '{0}'")]
    UnknownType(String),
    #[error("missing required parameter '{0}'")]
    MissingParam(&'static str),
    #[error("invalid parameter: {0}")]
    InvalidParam(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A concrete delivery target.
pub trait Sink: Send {
    /// Registered type name.
    fn kind(&self) -> &'static str;

    /// Write one batch. Records arrive oldest first and are owned by the sink.
    fn write_batch(&mut self, records: Vec<Record>) -> Result<(), SinkError>;

    /// Flush and release resources. Called at most once.
    fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

type Constructor = fn(&DestinationConfig) -> Result<Box<dyn Sink>, SinkError>;

/// Registration table: `type` value to constructor.
const REGISTRY: &[(&str, Constructor)] = &[
    (file::KIND, file::FileSink::configure),
    (influxdb::KIND, influxdb::InfluxDbSink::configure),
    (thingspeak::KIND, thingspeak::ThingSpeakSink::configure),
    (scan::KIND, scan::ScanSink::configure),
    (drop::KIND, drop::DropSink::configure),
];

/// Registered sink type names.
pub fn kinds() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|(kind, _)| *kind)
}

/// Create the sink described by `config`. Type names are matched
/// case-insensitively.
pub fn configure(config: &DestinationConfig) -> Result<Box<dyn Sink>, SinkError> {
    let kind = config.kind.trim();
    if kind.is_empty() {
        return Err(SinkError::MissingParam("type"));
    }
    REGISTRY
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(kind))
        .map(|(_, make)| make(config))
        .unwrap_or_else(|| Err(SinkError::UnknownType(kind.to_string())))
}

/// Open the `output` parameter: `-` (the default) is stdout, anything else
/// a file opened for appending.
pub fn open_output(config: &DestinationConfig) -> Result<Box<dyn Write + Send>, SinkError> {
    match config.param_str("output").as_deref() {
        None | Some(STDOUT) => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(append(path)?)),
    }
}

pub(crate) fn append(path: &str) -> io::Result<std::fs::File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Delivery counters of one destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DestinationStats {
    /// Records that passed the gate.
    pub accepted: u64,
    /// Records dropped by the interval gate.
    pub throttled: u64,
    /// Records handed to the sink.
    pub written: u64,
}

/// A named sink with its own interval gate, field transformer and batching
/// buffer.
pub struct Destination {
    name: String,
    sink: Box<dyn Sink>,
    gate: IntervalGate,
    interval: Duration,
    transformer: FieldTransformer,
    buffer: BatchingBuffer,
    failed: bool,
    closed: bool,
    stats: DestinationStats,
}

impl Destination {
    /// Configure a destination from its configuration entry.
    pub fn from_config(name: &str, config: &DestinationConfig) -> Result<Self, SinkError> {
        let transformer = config.fields.transformer().map_err(SinkError::InvalidParam)?;
        let sink = configure(config)?;
        Ok(Self::new(name, sink, config.batch, seconds(config.interval), transformer))
    }

    pub fn new(
        name: &str,
        sink: Box<dyn Sink>,
        batch: usize,
        interval: Duration,
        transformer: FieldTransformer,
    ) -> Self {
        Self {
            name: name.to_string(),
            sink,
            gate: IntervalGate::new(),
            interval,
            transformer,
            buffer: BatchingBuffer::new(batch),
            failed: false,
            closed: false,
            stats: DestinationStats::default(),
        }
    }

    /// A built-in destination with no gate, no shaping and no batching.
    pub fn builtin(name: &str, sink: Box<dyn Sink>) -> Self {
        Self::new(name, sink, 0, Duration::ZERO, FieldTransformer::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &'static str {
        self.sink.kind()
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn stats(&self) -> DestinationStats {
        self.stats
    }

    /// Gate, shape, buffer and, when a batch is ready, deliver `record`.
    ///
    /// Returns whether the record was accepted. Failed or closed
    /// destinations accept nothing.
    pub fn send(&mut self, mut record: Record, now: Instant) -> bool {
        if self.failed || self.closed {
            return false;
        }

        let key = record.mac().unwrap_or_default().to_string();
        if !self.gate.is_wait_over(&key, self.interval, now) {
            self.stats.throttled += 1;
            return false;
        }

        self.transformer.apply(&mut record);
        self.buffer.put(record);
        self.stats.accepted += 1;
        self.drain();
        true
    }

    fn drain(&mut self) {
        let batch = self.buffer.take_batch();
        if batch.is_empty() {
            return;
        }
        let count = batch.len() as u64;
        match self.sink.write_batch(batch) {
            Ok(()) => {
                self.stats.written += count;
                debug!(destination = %self.name, count, "batch delivered");
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail(&mut self, e: SinkError) {
        error!(destination = %self.name, error = %e, "destination failed, disabling it");
        self.failed = true;
    }

    /// Deliver whatever is still buffered and close the sink. Safe to call
    /// more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if !self.failed {
            self.buffer.close();
            self.drain();
        }

        // a failed sink still gets to release its resources
        let result = self.sink.close();
        if self.failed {
            if let Err(e) = result {
                debug!(destination = %self.name, error = %e, "close of failed destination");
            }
            return;
        }
        if let Err(e) = result {
            self.fail(e);
            return;
        }
        info!(
            destination = %self.name,
            accepted = self.stats.accepted,
            throttled = self.stats.throttled,
            written = self.stats.written,
            "destination closed"
        );
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::record::{FIELD_MAC, Value};
    use std::sync::{Arc, Mutex};

    /// Sink that records every batch it receives.
    #[derive(Clone, Default)]
    pub(crate) struct CollectSink {
        pub batches: Arc<Mutex<Vec<Vec<Record>>>>,
        pub closed: Arc<Mutex<u32>>,
        pub fail: bool,
    }

    impl CollectSink {
        pub(crate) fn records(&self) -> Vec<Record> {
            self.batches.lock().unwrap().iter().flatten().cloned().collect()
        }
    }

    impl Sink for CollectSink {
        fn kind(&self) -> &'static str {
            "collect"
        }

        fn write_batch(&mut self, records: Vec<Record>) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::Io(io::Error::other("unreachable host")));
            }
            self.batches.lock().unwrap().push(records);
            Ok(())
        }

        fn close(&mut self) -> Result<(), SinkError> {
            *self.closed.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn record(mac: &str, n: i64) -> Record {
        [(FIELD_MAC, Value::from(mac)), ("n", Value::Int(n))]
            .into_iter()
            .collect()
    }

    fn destination(sink: &CollectSink, batch: usize, interval: Duration) -> Destination {
        Destination::new(
            "test",
            Box::new(sink.clone()),
            batch,
            interval,
            FieldTransformer::default(),
        )
    }

    #[test]
    fn test_configure_by_type() {
        let config = DestinationConfig {
            kind: "drop".to_string(),
            ..Default::default()
        };
        assert_eq!(configure(&config).unwrap().kind(), DROP);

        let config = DestinationConfig {
            kind: "carrier-pigeon".to_string(),
            ..Default::default()
        };
        assert!(matches!(configure(&config), Err(SinkError::UnknownType(_))));
        assert!(matches!(
            configure(&DestinationConfig::default()),
            Err(SinkError::MissingParam("type"))
        ));
        assert_eq!(
            kinds().collect::<Vec<_>>(),
            ["file", "influxdb", "thingspeak", "scan", "DROP"]
        );
    }

    #[test]
    fn test_batches_until_threshold_then_flushes_on_close() {
        let sink = CollectSink::default();
        let mut dest = destination(&sink, 2, Duration::ZERO);
        let now = Instant::now();

        assert!(dest.send(record("a", 1), now));
        assert!(sink.records().is_empty());
        assert!(dest.send(record("a", 2), now));
        assert_eq!(sink.batches.lock().unwrap().len(), 1);
        assert!(dest.send(record("a", 3), now));

        dest.close();
        dest.close();
        assert_eq!(sink.records().len(), 3);
        assert_eq!(*sink.closed.lock().unwrap(), 1);
        assert_eq!(dest.stats().written, 3);
        assert!(!dest.send(record("a", 4), now));
    }

    #[test]
    fn test_gate_is_per_source() {
        let sink = CollectSink::default();
        let mut dest = destination(&sink, 0, Duration::from_secs(10));
        let now = Instant::now();

        assert!(dest.send(record("a", 1), now));
        assert!(!dest.send(record("a", 2), now + Duration::from_secs(1)));
        assert!(dest.send(record("b", 3), now + Duration::from_secs(1)));
        assert!(dest.send(record("a", 4), now + Duration::from_secs(10)));
        assert_eq!(dest.stats().throttled, 1);
        assert_eq!(sink.records().len(), 3);
    }

    #[test]
    fn test_transform_applies_per_destination() {
        let sink = CollectSink::default();
        let transformer = FieldTransformer {
            remove: vec!["n".to_string()],
            ..Default::default()
        };
        let mut dest = Destination::new("t", Box::new(sink.clone()), 0, Duration::ZERO, transformer);
        dest.send(record("a", 1), Instant::now());
        assert_eq!(sink.records()[0].keys().collect::<Vec<_>>(), [FIELD_MAC]);
    }

    #[test]
    fn test_failure_disables_destination() {
        let sink = CollectSink {
            fail: true,
            ..Default::default()
        };
        let mut dest = destination(&sink, 0, Duration::ZERO);
        let now = Instant::now();

        assert!(dest.send(record("a", 1), now));
        assert!(dest.is_failed());
        assert!(!dest.send(record("a", 2), now));
        dest.close();
        assert!(dest.is_failed());
        assert_eq!(*sink.closed.lock().unwrap(), 1);
    }

    #[test]
    fn test_close_without_records() {
        let sink = CollectSink::default();
        let mut dest = destination(&sink, 5, Duration::ZERO);
        dest.close();
        assert!(sink.records().is_empty());
        assert_eq!(*sink.closed.lock().unwrap(), 1);
        assert!(!dest.is_failed());
    }

    #[test]
    fn test_from_config_rejects_bad_rules() {
        let mut config = DestinationConfig {
            kind: DROP.to_string(),
            ..Default::default()
        };
        config.fields.fields_rename = crate::config::FieldPairs::List(vec!["broken".to_string()]);
        assert!(matches!(
            Destination::from_config("x", &config),
            Err(SinkError::InvalidParam(_))
        ));
    }
}

//! Core gateway runner.
//!
//! This module is decoupled from CLI parsing and process exit codes so it
//! can be tested deterministically with an injected scanner.
//!
//! A run goes through `Starting -> Running -> Draining -> Stopped`. While
//! running, each ingest item is decoded, enriched, filtered against the
//! allow-list and routed before the next one is read.

use crate::config::{ConfigError, GatewayConfig};
use crate::dispatcher::{self, Dispatcher};
use crate::mac_address::MacAddress;
use crate::record::{FIELD_DECODER, FIELD_MAC, Record};
use crate::router::Router;
use crate::scanner::{IngestItem, ScanError, ScanOptions};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Exit codes for the application
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_ERROR: i32 = 1;

/// Longest wait for in-flight ingest items while draining.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors that prevent a run from starting.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Scanner abstraction to enable deterministic unit tests without Bluetooth hardware.
pub trait Scanner: Send + Sync {
    fn start_scan(
        &self,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<IngestItem>, ScanError>> + Send + '_>>;
}

/// Real scanner implementation that delegates to the compiled-in backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealScanner {
    pub options: ScanOptions,
}

impl Scanner for RealScanner {
    fn start_scan(
        &self,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<IngestItem>, ScanError>> + Send + '_>>
    {
        Box::pin(async move { crate::scanner::start_scan(self.options, cancel).await })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Starting,
    Running,
    Draining,
    Stopped,
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `max_messages` were processed.
    MessageLimit,
    /// The ingest backend closed its channel (simulator done, adapter gone).
    IngestFinished,
    /// Nothing was received for `no_messages_timeout` seconds.
    Timeout,
    /// Stopped from outside (Ctrl-C, SIGTERM).
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::MessageLimit => "message limit reached",
            StopReason::IngestFinished => "ingest finished",
            StopReason::Timeout => "no messages received before timeout",
            StopReason::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub reason: StopReason,
    /// Items read from the ingest queue.
    pub received: u64,
    /// Records at least one destination accepted.
    pub forwarded: u64,
    /// Destinations that failed to configure or to deliver.
    pub failed_sinks: Vec<String>,
}

impl RunSummary {
    /// Process exit code: a liveness timeout or any failed sink is an error.
    pub fn exit_code(&self) -> i32 {
        if self.reason == StopReason::Timeout || !self.failed_sinks.is_empty() {
            EXIT_ERROR
        } else {
            EXIT_SUCCESS
        }
    }
}

#[derive(Debug, Default)]
struct Stats {
    received: u64,
    accepted: u64,
    decoded: u64,
    forwarded: u64,
    busy: Duration,
    slowest: Duration,
}

impl Stats {
    fn time(&mut self, spent: Duration) {
        self.busy += spent;
        self.slowest = self.slowest.max(spent);
    }

    fn log(&self) {
        let average = self
            .busy
            .checked_div(u32::try_from(self.accepted).unwrap_or(u32::MAX))
            .unwrap_or_default();
        info!(
            received = self.received,
            accepted = self.accepted,
            decoded = self.decoded,
            forwarded = self.forwarded,
            avg_us = average.as_micros() as u64,
            max_us = self.slowest.as_micros() as u64,
            "pipeline statistics"
        );
    }
}

pub struct Pipeline<'a> {
    config: &'a GatewayConfig,
    dispatcher: Dispatcher,
    router: Router,
    state: State,
    stats: Stats,
}

impl<'a> Pipeline<'a> {
    /// Bind codecs and build the router and its destinations.
    pub fn new(config: &'a GatewayConfig) -> Result<Self, RunError> {
        let router = Router::new(config)?;
        Ok(Self::with_router(config, router))
    }

    /// Use a prepared router.
    pub fn with_router(config: &'a GatewayConfig, router: Router) -> Self {
        let mode = if config.common.scan { "scan" } else { "gateway" };
        debug!(mode, "pipeline starting");
        Self {
            config,
            dispatcher: Dispatcher::from_config(config),
            router,
            state: State::Starting,
            stats: Stats::default(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    fn transition(&mut self, next: State) {
        debug!(from = ?self.state, to = ?next, "pipeline state");
        self.state = next;
    }

    /// Decode, enrich, filter and route one item.
    ///
    /// Returns whether the item passed the allow-list, which is what
    /// `max_messages` counts.
    pub fn process(&mut self, item: IngestItem, now: Instant) -> bool {
        self.stats.received += 1;
        let started = Instant::now();

        let record = match item {
            IngestItem::Advertisement(adv) => {
                if !self.config.is_allowed(&adv.mac.to_string()) {
                    return false;
                }
                if self.config.common.showraw {
                    info!(mac = %adv.mac, raw = %hex(adv.manufacturer_data.as_deref()), "raw advertisement");
                }
                self.dispatcher.run(&adv)
            }
            IngestItem::Decoded(record) => match self.canonical(record) {
                Some(record) => record,
                None => return false,
            },
        };

        self.stats.accepted += 1;
        if !matches!(record.decoder(), Some(dispatcher::NONE | crate::codec::UNKNOWN) | None) {
            self.stats.decoded += 1;
        }
        if self.router.send(record, now) > 0 {
            self.stats.forwarded += 1;
        }
        self.stats.time(started.elapsed());
        true
    }

    /// Normalize the address of a pre-decoded record and apply the
    /// allow-list.
    fn canonical(&self, mut record: Record) -> Option<Record> {
        let mac = match record.mac().map(str::parse::<MacAddress>) {
            Some(Ok(mac)) => mac.to_string(),
            _ => {
                debug!(%record, "decoded record without a valid address dropped");
                return None;
            }
        };
        if !self.config.is_allowed(&mac) {
            return None;
        }
        record.insert(FIELD_MAC, mac);
        record.insert_missing(FIELD_DECODER, dispatcher::NONE);
        Some(record)
    }

    /// Run until the message limit, the liveness timeout, the end of ingest
    /// or cancellation, then drain and close every destination.
    pub async fn run(
        mut self,
        scanner: &dyn Scanner,
        cancel: CancellationToken,
    ) -> Result<RunSummary, RunError> {
        let ingest = cancel.child_token();
        let mut items = scanner.start_scan(ingest.clone()).await?;

        self.transition(State::Running);
        let limit = self.config.common.max_messages;
        let timeout = self.config.common.liveness_timeout();
        let mut accepted = 0u64;

        let reason = loop {
            let next = async {
                match timeout {
                    Some(timeout) => tokio::time::timeout(timeout, items.recv()).await.ok(),
                    None => Some(items.recv().await),
                }
            };
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => break StopReason::Cancelled,
                received = next => received,
            };

            match received {
                None => break StopReason::Timeout,
                Some(None) => break StopReason::IngestFinished,
                Some(Some(item)) => {
                    let now = tokio::time::Instant::now().into_std();
                    if self.process(item, now) {
                        accepted += 1;
                        if limit > 0 && accepted >= limit {
                            break StopReason::MessageLimit;
                        }
                    }
                }
            }
        };

        match reason {
            StopReason::Timeout => warn!(%reason, "stopping"),
            _ => info!(%reason, "stopping"),
        }

        self.transition(State::Draining);
        ingest.cancel();
        items.close();
        let discarded = tokio::time::timeout(DRAIN_TIMEOUT, async {
            let mut discarded = 0u64;
            while items.recv().await.is_some() {
                discarded += 1;
            }
            discarded
        })
        .await;
        match discarded {
            Ok(0) => {}
            Ok(discarded) => debug!(discarded, "in-flight items discarded"),
            Err(_) => warn!("ingest did not stop in time"),
        }
        self.router.close();
        self.stats.log();
        self.transition(State::Stopped);

        Ok(RunSummary {
            reason,
            received: self.stats.received,
            forwarded: self.stats.forwarded,
            failed_sinks: self.router.failed_sinks(),
        })
    }
}

fn hex(data: Option<&[u8]>) -> String {
    data.unwrap_or_default()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

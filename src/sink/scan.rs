//! Inventory sink for scan mode.
//!
//! Prints every record it receives and remembers the last decoder seen for
//! each address; closing it prints the inventory.

use super::{Sink, SinkError};
use crate::config::DestinationConfig;
use crate::record::Record;
use std::collections::BTreeMap;
use std::io::{self, Write};

pub const KIND: &str = "scan";

pub struct ScanSink {
    /// address -> last decoder
    seen: BTreeMap<String, String>,
    out: Box<dyn Write + Send>,
}

impl ScanSink {
    pub fn configure(_config: &DestinationConfig) -> Result<Box<dyn Sink>, SinkError> {
        Ok(Box::new(Self::new(Box::new(io::stdout()))))
    }

    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            seen: BTreeMap::new(),
            out,
        }
    }

    pub fn inventory(&self) -> &BTreeMap<String, String> {
        &self.seen
    }
}

impl Sink for ScanSink {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn write_batch(&mut self, records: Vec<Record>) -> Result<(), SinkError> {
        for record in records {
            writeln!(self.out, "{record}")?;
            if let Some(mac) = record.mac() {
                let decoder = record.decoder().unwrap_or(crate::codec::UNKNOWN);
                self.seen.insert(mac.to_string(), decoder.to_string());
            }
        }
        self.out.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        writeln!(self.out, "Found {} device(s):", self.seen.len())?;
        for (mac, decoder) in &self.seen {
            writeln!(self.out, "{mac}  {decoder}")?;
        }
        self.out.flush()?;
        Ok(())
    }
}

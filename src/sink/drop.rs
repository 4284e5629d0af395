//! Discard sink.

use super::{DROP, Sink, SinkError};
use crate::config::DestinationConfig;
use crate::record::Record;

pub const KIND: &str = DROP;

#[derive(Debug, Default)]
pub struct DropSink;

impl DropSink {
    pub fn configure(_config: &DestinationConfig) -> Result<Box<dyn Sink>, SinkError> {
        Ok(Box::new(DropSink))
    }
}

impl Sink for DropSink {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn write_batch(&mut self, _records: Vec<Record>) -> Result<(), SinkError> {
        Ok(())
    }
}

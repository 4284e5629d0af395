//! ThingSpeak bulk-update sink.
//!
//! Each batch becomes one bulk-update JSON document:
//!
//! ```text
//! {"write_api_key":"KEY","updates":[{"created_at":"...","field1":24.3,...}]}
//! ```
//!
//! `fields` maps up to eight record fields, in order, to `field1`..`field8`.
//! Documents are written one per line to the `output` (stdout by default);
//! posting them to the ThingSpeak API is left to the consumer.

use super::file::format_time;
use super::{Sink, SinkError, open_output};
use crate::config::DestinationConfig;
use crate::record::{Record, Value};
use serde::Serialize;
use serde_json::{Map, Number};
use std::io::Write;

pub const KIND: &str = "thingspeak";

/// ThingSpeak channels have eight fields.
pub const MAX_FIELDS: usize = 8;

#[derive(Debug, Serialize)]
pub struct BulkUpdate<'a> {
    pub write_api_key: &'a str,
    pub updates: Vec<Map<String, serde_json::Value>>,
}

pub struct ThingSpeakSink {
    api_key: String,
    fields: Vec<String>,
    out: Box<dyn Write + Send>,
}

impl ThingSpeakSink {
    pub fn configure(config: &DestinationConfig) -> Result<Box<dyn Sink>, SinkError> {
        let api_key = config
            .param_str("api_key")
            .ok_or(SinkError::MissingParam("api_key"))?;
        let fields = config.param_list("fields");
        let out = open_output(config)?;
        Ok(Box::new(Self::new(api_key, fields, out)?))
    }

    pub fn new(
        api_key: String,
        fields: Vec<String>,
        out: Box<dyn Write + Send>,
    ) -> Result<Self, SinkError> {
        if fields.is_empty() {
            return Err(SinkError::MissingParam("fields"));
        }
        if fields.len() > MAX_FIELDS {
            return Err(SinkError::InvalidParam(format!(
                "at most {MAX_FIELDS} fields can be mapped, got {}",
                fields.len()
            )));
        }
        Ok(Self {
            api_key,
            fields,
            out,
        })
    }

    fn update(&self, record: &Record) -> Option<Map<String, serde_json::Value>> {
        let mut update = Map::new();
        for (i, name) in self.fields.iter().enumerate() {
            if let Some(value) = record.get(name).and_then(json_value) {
                update.insert(format!("field{}", i + 1), value);
            }
        }
        if update.is_empty() {
            return None;
        }
        if let Some(time) = record.timestamp().and_then(format_time) {
            update.insert("created_at".to_string(), time.into());
        }
        Some(update)
    }

    /// Render one batch as a bulk-update document, or `None` if no record
    /// had a mapped field.
    pub fn render(&self, records: &[Record]) -> Result<Option<String>, SinkError> {
        let updates: Vec<_> = records.iter().filter_map(|r| self.update(r)).collect();
        if updates.is_empty() {
            return Ok(None);
        }
        let document = BulkUpdate {
            write_api_key: &self.api_key,
            updates,
        };
        Ok(Some(serde_json::to_string(&document)?))
    }
}

fn json_value(value: &Value) -> Option<serde_json::Value> {
    match value {
        Value::Int(v) => Some((*v).into()),
        Value::Float(v) => Number::from_f64(*v).map(serde_json::Value::Number),
        Value::Str(s) => Some(s.clone().into()),
        Value::Null => None,
    }
}

impl Sink for ThingSpeakSink {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn write_batch(&mut self, records: Vec<Record>) -> Result<(), SinkError> {
        if let Some(document) = self.render(&records)? {
            writeln!(self.out, "{document}")?;
            self.out.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.out.flush()?;
        Ok(())
    }
}

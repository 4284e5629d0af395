//! InfluxDB line protocol sink.
//!
//! Records are rendered as
//!
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp_ms
//! ```
//!
//! and written to stdout (for Telegraf `execd` and similar collectors) or
//! appended to a file. Tag keys are the configured field names, sorted;
//! every other non-null field becomes a line protocol field.

use super::{Sink, SinkError, open_output};
use crate::config::DestinationConfig;
use crate::record::{FIELD_TIMESTAMP, Record, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::time::SystemTime;
use tracing::debug;

pub const KIND: &str = "influxdb";

pub const DEFAULT_MEASUREMENT: &str = "ble_gateway";

/// Field values for InfluxDB line protocol
#[derive(Debug, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    String(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Float(num) => write!(f, "{num}"),
            FieldValue::Integer(num) => write!(f, "{num}i"),
            FieldValue::String(s) => {
                write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
            }
        }
    }
}

impl FieldValue {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(FieldValue::Integer(*v)),
            Value::Float(v) if v.is_finite() => Some(FieldValue::Float(*v)),
            Value::Str(s) => Some(FieldValue::String(s.clone())),
            Value::Float(_) | Value::Null => None,
        }
    }
}

/// Data point in InfluxDB line protocol
#[derive(Debug)]
pub struct DataPoint {
    pub measurement: String,
    pub tag_set: BTreeMap<String, String>,
    pub field_set: BTreeMap<String, FieldValue>,
    pub timestamp: Option<SystemTime>,
}

/// Escape measurement names: commas and spaces.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Escape tag keys, tag values and field keys: commas, equals signs and
/// spaces.
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

fn fmt_tags(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    for (key, value) in data_point.tag_set.iter() {
        write!(fmt, ",{}={}", escape_key(key), escape_key(value))?;
    }
    Ok(())
}

fn fmt_fields(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    let mut first = true;
    for (key, value) in data_point.field_set.iter() {
        if first {
            first = false;
        } else {
            write!(fmt, ",")?;
        }
        write!(fmt, "{}={}", escape_key(key), value)?;
    }
    Ok(())
}

fn fmt_timestamp(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    let millis = data_point
        .timestamp
        .and_then(|time| time.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|since| since.as_millis());
    if let Some(millis) = millis {
        write!(fmt, " {}", millis)?;
    }
    Ok(())
}

impl fmt::Display for DataPoint {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", escape_measurement(&self.measurement))?;
        fmt_tags(self, fmt)?;
        write!(fmt, " ")?;
        fmt_fields(self, fmt)?;
        fmt_timestamp(self, fmt)
    }
}

/// Builds data points from records.
#[derive(Debug, Clone)]
pub struct LineProtocol {
    measurement: String,
    tags: Vec<String>,
}

impl LineProtocol {
    pub fn new(measurement: impl Into<String>, mut tags: Vec<String>) -> Self {
        tags.sort();
        tags.dedup();
        Self {
            measurement: measurement.into(),
            tags,
        }
    }

    /// Convert a record, or `None` if it has no field values left.
    pub fn to_data_point(&self, record: &Record) -> Option<DataPoint> {
        let mut tag_set = BTreeMap::new();
        let mut field_set = BTreeMap::new();

        for (name, value) in record.iter() {
            if name == FIELD_TIMESTAMP || value.is_null() {
                continue;
            }
            if self.tags.iter().any(|t| t == name) {
                tag_set.insert(name.to_string(), value.to_string());
            } else if let Some(field) = FieldValue::from_value(value) {
                field_set.insert(name.to_string(), field);
            }
        }

        if field_set.is_empty() {
            return None;
        }

        Some(DataPoint {
            measurement: self.measurement.clone(),
            tag_set,
            field_set,
            timestamp: record.timestamp(),
        })
    }
}

pub struct InfluxDbSink {
    protocol: LineProtocol,
    out: Box<dyn Write + Send>,
}

impl InfluxDbSink {
    pub fn configure(config: &DestinationConfig) -> Result<Box<dyn Sink>, SinkError> {
        let measurement = config
            .param_str("measurement")
            .unwrap_or_else(|| DEFAULT_MEASUREMENT.to_string());
        let tags = match config.param("tags") {
            Some(_) => config.param_list("tags"),
            None => vec![crate::record::FIELD_MAC.to_string()],
        };
        let out = open_output(config)?;
        Ok(Box::new(Self::new(LineProtocol::new(measurement, tags), out)))
    }

    pub fn new(protocol: LineProtocol, out: Box<dyn Write + Send>) -> Self {
        Self { protocol, out }
    }
}

impl Sink for InfluxDbSink {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn write_batch(&mut self, records: Vec<Record>) -> Result<(), SinkError> {
        for record in &records {
            match self.protocol.to_data_point(record) {
                Some(point) => writeln!(self.out, "{point}")?,
                None => debug!(mac = record.mac().unwrap_or("?"), "record without fields skipped"),
            }
        }
        self.out.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.out.flush()?;
        Ok(())
    }
}

//! Append-only text file sink.
//!
//! One line per record, `name=value, name=value, ...\r\n`, with the
//! `timestamp` field rendered as RFC 3339 UTC with milliseconds.

use super::{Sink, SinkError, append};
use crate::config::DestinationConfig;
use crate::record::{FIELD_TIMESTAMP, Record};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::Write as _;
use std::io::{BufWriter, Write};
use std::time::{SystemTime, UNIX_EPOCH};

pub const KIND: &str = "file";

pub struct FileSink {
    out: BufWriter<Box<dyn Write + Send>>,
}

impl FileSink {
    pub fn configure(config: &DestinationConfig) -> Result<Box<dyn Sink>, SinkError> {
        let filename = config
            .param_str("filename")
            .ok_or(SinkError::MissingParam("filename"))?;
        let file = append(&filename)?;
        Ok(Box::new(Self::new(Box::new(file))))
    }

    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: BufWriter::new(out),
        }
    }
}

/// Render a record as one line, without the line terminator.
pub fn render_line(record: &Record) -> String {
    let time = record.timestamp().and_then(format_time);
    let mut line = String::new();
    for (i, (name, value)) in record.iter().enumerate() {
        if i > 0 {
            line.push_str(", ");
        }
        match (name, &time) {
            (FIELD_TIMESTAMP, Some(time)) => {
                let _ = write!(line, "{name}={time}");
            }
            _ => {
                let _ = write!(line, "{name}={value}");
            }
        }
    }
    line
}

/// RFC 3339 rendering, or `None` outside the range chrono can represent.
pub fn format_time(time: SystemTime) -> Option<String> {
    let millis = i64::try_from(time.duration_since(UNIX_EPOCH).ok()?.as_millis()).ok()?;
    let time = DateTime::<Utc>::from_timestamp_millis(millis)?;
    Some(time.to_rfc3339_opts(SecondsFormat::Millis, true))
}

impl Sink for FileSink {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn write_batch(&mut self, records: Vec<Record>) -> Result<(), SinkError> {
        for record in &records {
            write!(self.out, "{}\r\n", render_line(record))?;
        }
        self.out.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;
    use crate::test_utils::{FailingWriter, SharedBuf};
    use std::time::{Duration, UNIX_EPOCH};

    fn sample() -> Record {
        let mut record = Record::new();
        record.set_timestamp(UNIX_EPOCH + Duration::from_millis(1_000_000_000_250));
        record.insert("mac", "aa:bb:cc:dd:ee:ff");
        record.insert("temperature", 24.3);
        record.insert("battery", Value::Null);
        record
    }

    #[test]
    fn test_render_line() {
        assert_eq!(
            render_line(&sample()),
            "timestamp=2001-09-09T01:46:40.250Z, mac=aa:bb:cc:dd:ee:ff, temperature=24.3, battery=null"
        );
    }

    #[test]
    fn test_render_line_without_timestamp() {
        let record: Record = [("a", 1)].into_iter().collect();
        assert_eq!(render_line(&record), "a=1");
    }

    #[test]
    fn test_render_line_beyond_calendar_range() {
        let record: Record = [("timestamp", 1e13)].into_iter().collect();
        assert_eq!(render_line(&record), "timestamp=10000000000000");
        assert!(format_time(UNIX_EPOCH + Duration::from_secs(10_000_000_000_000)).is_none());
    }

    #[test]
    fn test_writes_crlf_lines() {
        let buf = SharedBuf::default();
        let mut sink = FileSink::new(Box::new(buf.clone()));
        sink.write_batch(vec![sample(), sample()]).unwrap();
        let out = buf.contents();
        assert_eq!(out.matches("\r\n").count(), 2);
        assert!(out.starts_with("timestamp=2001-09-09T01:46:40.250Z, mac="));
    }

    #[test]
    fn test_configure_appends_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        std::fs::write(&path, "existing\r\n").unwrap();

        let mut config = DestinationConfig {
            kind: KIND.to_string(),
            ..Default::default()
        };
        config.params.insert(
            "filename".into(),
            path.to_str().unwrap().into(),
        );

        let mut sink = FileSink::configure(&config).unwrap();
        sink.write_batch(vec![[("n", 1)].into_iter().collect()]).unwrap();
        sink.close().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "existing\r\nn=1\r\n");
    }

    #[test]
    fn test_configure_requires_filename() {
        let config = DestinationConfig {
            kind: KIND.to_string(),
            ..Default::default()
        };
        assert!(matches!(
            FileSink::configure(&config),
            Err(SinkError::MissingParam("filename"))
        ));
    }

    #[test]
    fn test_configure_fails_on_bad_path() {
        let mut config = DestinationConfig::default();
        config
            .params
            .insert("filename".into(), "/nonexistent/dir/out.txt".into());
        assert!(matches!(FileSink::configure(&config), Err(SinkError::Io(_))));
    }

    #[test]
    fn test_write_error_surfaces() {
        let mut sink = FileSink::new(Box::new(FailingWriter));
        assert!(sink.write_batch(vec![sample()]).is_err());
    }
}

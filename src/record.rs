//! Decoded beacon record.
//!
//! A [`Record`] is a flat, insertion-ordered map from field name to scalar
//! [`Value`]. Codecs create them, enrichment and the field transformer
//! reshape them, and sinks consume owned copies.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Field holding the canonical source address.
pub const FIELD_MAC: &str = "mac";
/// Field naming the codec that produced the record.
pub const FIELD_DECODER: &str = "decoder";
/// Field holding the wall-clock receive time in epoch seconds.
pub const FIELD_TIMESTAMP: &str = "timestamp";
/// Received signal strength in dBm.
pub const FIELD_RSSI: &str = "rssi";
/// Transmit power in dBm.
pub const FIELD_TX_POWER: &str = "tx_power";

/// A scalar field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Null,
}

impl Value {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Null => write!(f, "null"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

macro_rules! int_value {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(i64::from(v))
            }
        })*
    };
}

int_value!(i8, i16, i32, u8, u16, u32);

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// An insertion-ordered set of named fields with unique names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(k, _)| k == name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.position(name).map(|i| &self.fields[i].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Set a field. An existing field is overwritten in place and keeps its
    /// position; a new field is appended.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) => self.fields[i].1 = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Set a field only if it is not present yet.
    pub fn insert_missing(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        if !self.contains(&name) {
            self.fields.push((name, value.into()));
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.position(name).map(|i| self.fields.remove(i).1)
    }

    /// Rename `from` to `to`, keeping the position of `from`.
    ///
    /// A missing `from` is a no-op. An existing `to` is replaced.
    pub fn rename(&mut self, from: &str, to: &str) {
        if from == to {
            return;
        }
        if !self.contains(from) {
            return;
        }
        self.remove(to);
        if let Some(i) = self.position(from) {
            self.fields[i].0 = to.to_string();
        }
    }

    /// Move the named fields to the front, in the given order. Names that are
    /// not present are skipped; all other fields keep their relative order.
    pub fn move_to_front(&mut self, names: &[String]) {
        let mut front = Vec::with_capacity(names.len());
        for name in names {
            if let Some(i) = self.position(name) {
                front.push(self.fields.remove(i));
            }
        }
        front.append(&mut self.fields);
        self.fields = front;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The canonical source address, once enrichment has run.
    pub fn mac(&self) -> Option<&str> {
        self.get(FIELD_MAC).and_then(Value::as_str)
    }

    pub fn decoder(&self) -> Option<&str> {
        self.get(FIELD_DECODER).and_then(Value::as_str)
    }

    /// The receive time stamped by the router, if any.
    pub fn timestamp(&self) -> Option<SystemTime> {
        let secs = self.get(FIELD_TIMESTAMP)?.as_f64()?;
        if secs < 0.0 || !secs.is_finite() {
            return None;
        }
        UNIX_EPOCH.checked_add(Duration::try_from_secs_f64(secs).ok()?)
    }

    pub fn set_timestamp(&mut self, time: SystemTime) {
        let secs = time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        self.insert(FIELD_TIMESTAMP, secs);
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// Human-readable `name=value, name=value` rendering.
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(record: &Record) -> Vec<&str> {
        record.keys().collect()
    }

    #[test]
    fn test_insert_keeps_position_on_overwrite() {
        let mut r = Record::new();
        r.insert("a", 1);
        r.insert("b", 2);
        r.insert("a", 3);
        assert_eq!(keys(&r), ["a", "b"]);
        assert_eq!(r.get("a"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_insert_missing_does_not_overwrite() {
        let mut r = Record::new();
        r.insert("tx_power", 4);
        r.insert_missing("tx_power", -8);
        r.insert_missing("rssi", -70);
        assert_eq!(r.get("tx_power"), Some(&Value::Int(4)));
        assert_eq!(r.get("rssi"), Some(&Value::Int(-70)));
    }

    #[test]
    fn test_rename_keeps_position() {
        let mut r: Record = [("x", 1), ("peer", 2), ("y", 3)].into_iter().collect();
        r.rename("peer", "mac");
        assert_eq!(keys(&r), ["x", "mac", "y"]);
    }

    #[test]
    fn test_rename_onto_existing_field_overwrites() {
        let mut r: Record = [("mac", 1), ("x", 2), ("peer", 3)].into_iter().collect();
        r.rename("peer", "mac");
        assert_eq!(keys(&r), ["x", "mac"]);
        assert_eq!(r.get("mac"), Some(&Value::Int(3)));

        let mut r: Record = [("peer", 3), ("x", 2), ("mac", 1)].into_iter().collect();
        r.rename("peer", "mac");
        assert_eq!(keys(&r), ["mac", "x"]);
        assert_eq!(r.get("mac"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_rename_missing_is_noop() {
        let mut r: Record = [("x", 1)].into_iter().collect();
        r.rename("nope", "x");
        assert_eq!(r.get("x"), Some(&Value::Int(1)));
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn test_move_to_front() {
        let mut r = Record::new();
        r.insert("x", 1);
        r.insert("mac", "aa");
        r.insert("timestamp", 5);
        r.move_to_front(&["timestamp".to_string(), "mac".to_string(), "gone".to_string()]);
        assert_eq!(keys(&r), ["timestamp", "mac", "x"]);
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let mut r = Record::new();
        let t = UNIX_EPOCH + Duration::from_millis(1_700_000_000_250);
        r.set_timestamp(t);
        let back = r.timestamp().unwrap();
        let diff = back
            .duration_since(t)
            .unwrap_or_else(|e| e.duration());
        assert!(diff < Duration::from_millis(1));
    }

    #[test]
    fn test_timestamp_out_of_range() {
        for secs in [1e20, 1e19, f64::INFINITY, -1.0] {
            let r: Record = [("timestamp", secs)].into_iter().collect();
            assert_eq!(r.timestamp(), None, "{secs}");
        }
        let r: Record = [("timestamp", "yesterday")].into_iter().collect();
        assert_eq!(r.timestamp(), None);
    }

    #[test]
    fn test_display() {
        let mut r = Record::new();
        r.insert("mac", "aa:bb:cc:dd:ee:ff");
        r.insert("temperature", 21.5);
        r.insert("battery", Value::Null);
        assert_eq!(
            r.to_string(),
            "mac=aa:bb:cc:dd:ee:ff, temperature=21.5, battery=null"
        );
    }

    #[test]
    fn test_option_into_value() {
        assert_eq!(Value::from(None::<f64>), Value::Null);
        assert_eq!(Value::from(Some(2i64)), Value::Int(2));
    }
}

//! Per-destination record shaping.
//!
//! A [`FieldTransformer`] applies its rules in a fixed order, independent of
//! the order they were configured in:
//!
//! 1. remove fields,
//! 2. rename fields (`old=new`),
//! 3. add literal fields (`name=value`),
//! 4. move selected fields to the front.

use crate::record::{Record, Value};

/// Field-shaping rules for one source or destination.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldTransformer {
    pub remove: Vec<String>,
    pub rename: Vec<(String, String)>,
    pub add: Vec<(String, Value)>,
    pub order: Vec<String>,
}

impl FieldTransformer {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty()
            && self.rename.is_empty()
            && self.add.is_empty()
            && self.order.is_empty()
    }

    /// Reshape `record` in place.
    pub fn apply(&self, record: &mut Record) {
        for name in &self.remove {
            record.remove(name);
        }
        for (from, to) in &self.rename {
            record.rename(from, to);
        }
        for (name, value) in &self.add {
            record.insert(name.as_str(), value.clone());
        }
        if !self.order.is_empty() {
            record.move_to_front(&self.order);
        }
    }
}

/// Split a `name=value` rule. Both sides are trimmed and the name must not
/// be empty.
pub fn parse_pair(src: &str) -> Result<(String, String), String> {
    let (name, value) = src
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{src}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty field name in '{src}'"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Interpret a literal from a `name=value` rule: integers and floats keep
/// their numeric type, anything else is a string.
pub fn parse_literal(src: &str) -> Value {
    if let Ok(v) = src.parse::<i64>() {
        Value::Int(v)
    } else if let Ok(v) = src.parse::<f64>() {
        Value::Float(v)
    } else {
        Value::Str(src.to_string())
    }
}

//! YAML gateway configuration.
//!
//! The document has three sections:
//!
//! ```yaml
//! common:
//!   allowmac: [aa:bb:cc:dd:ee:ff]
//!   no_messages_timeout: 600
//! sources:
//!   DEFAULTS:
//!     destinations: [influx]
//!   "*":
//!     decoders: [all]
//!   AA-BB-CC-DD-EE-FF:
//!     decoders: [ruuviraw]
//!     interval: 10
//! destinations:
//!   influx:
//!     type: influxdb
//!     tags: [mac]
//! ```
//!
//! Keys are case-insensitive and lower-cased on load; values keep their case.
//! Address keys are normalised to `aa:bb:cc:dd:ee:ff`. A `DEFAULTS` entry is
//! merged field by field into every other entry of its section, and `*` in
//! `sources` applies to addresses without their own entry.

use crate::mac_address::{DEFAULTS, MacAddress, WILDCARD, normalize_address};
use crate::record::Value;
use crate::throttle::seconds;
use crate::transform::{FieldTransformer, parse_literal, parse_pair};
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub const SECTION_COMMON: &str = "common";
pub const SECTION_SOURCES: &str = "sources";
pub const SECTION_DESTINATIONS: &str = "destinations";

/// Config path meaning "no file, use the built-in configuration".
pub const NO_FILE: &str = "-";

/// Configuration used when no file is given.
pub const BUILTIN_CONFIG: &str = r#"
common:
  device: 0
  allowmac: []
  interval: 0
  decoders: [all]
  max_messages: 0
  scan: false
  no_messages_timeout: 600
  simulator: 0
  showraw: false
  queue_size: 100
sources:
  DEFAULTS:
    decoders: [all]
    destinations: [DROP]
    fields_order: [timestamp, mac]
  "*": {}
destinations:
  default_file:
    type: file
    filename: ble_gateway.out
"#;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid configuration for '{entry}': {message}")]
    Invalid { entry: String, message: String },
}

impl ConfigError {
    pub fn invalid(entry: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            entry: entry.into(),
            message: message.into(),
        }
    }
}

/// Process-wide options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommonConfig {
    /// HCI device index (`hciN`).
    pub device: u16,
    /// If non-empty, only these addresses are processed.
    pub allowmac: Vec<String>,
    /// Default minimum interval between records of one source, in seconds.
    #[serde(alias = "intervall")]
    pub interval: f64,
    /// Decoders tried in scan mode.
    #[serde(alias = "decode")]
    pub decoders: Vec<String>,
    /// Stop after this many messages; 0 = unlimited.
    #[serde(alias = "max_mesgs")]
    pub max_messages: u64,
    /// Inventory mode instead of forwarding to destinations.
    pub scan: bool,
    /// Stop when nothing is received for this many seconds; 0 = never.
    pub no_messages_timeout: f64,
    /// Number of simulated advertisements; 0 = use the radio.
    pub simulator: u64,
    /// Log raw manufacturer data of each advertisement.
    pub showraw: bool,
    /// Capacity of the ingest queue.
    pub queue_size: usize,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            device: 0,
            allowmac: Vec::new(),
            interval: 0.0,
            decoders: vec![crate::codec::ALL.to_string()],
            max_messages: 0,
            scan: false,
            no_messages_timeout: 600.0,
            simulator: 0,
            showraw: false,
            queue_size: 100,
        }
    }
}

impl CommonConfig {
    pub fn liveness_timeout(&self) -> Option<Duration> {
        let timeout = seconds(self.no_messages_timeout);
        (!timeout.is_zero()).then_some(timeout)
    }
}

/// `old=new` / `name=value` rules, written either as a list of strings or
/// as a mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldPairs {
    List(Vec<String>),
    Map(Mapping),
}

impl Default for FieldPairs {
    fn default() -> Self {
        FieldPairs::List(Vec::new())
    }
}

impl FieldPairs {
    fn is_empty(&self) -> bool {
        match self {
            FieldPairs::List(list) => list.is_empty(),
            FieldPairs::Map(map) => map.is_empty(),
        }
    }

    fn pairs(&self) -> Result<Vec<(String, Value)>, String> {
        match self {
            FieldPairs::List(list) => list
                .iter()
                .map(|item| parse_pair(item).map(|(k, v)| (k, parse_literal(&v))))
                .collect(),
            FieldPairs::Map(map) => map
                .iter()
                .map(|(k, v)| {
                    let name = k.as_str().ok_or_else(|| format!("field name {k:?} is not a string"))?;
                    let value = yaml_scalar(v).ok_or_else(|| format!("{name}: value is not a scalar"))?;
                    Ok((name.to_string(), value))
                })
                .collect(),
        }
    }
}

fn check_seconds(entry: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 && Duration::try_from_secs_f64(value).is_err() {
        return Err(ConfigError::invalid(
            entry,
            format!("{value} seconds is out of range"),
        ));
    }
    Ok(())
}

fn yaml_scalar(value: &serde_yaml::Value) -> Option<Value> {
    match value {
        serde_yaml::Value::Null => Some(Value::Null),
        serde_yaml::Value::Bool(b) => Some(Value::Str(b.to_string())),
        serde_yaml::Value::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float)),
        serde_yaml::Value::String(s) => Some(Value::Str(s.clone())),
        _ => None,
    }
}

/// Field-shaping keys shared by sources and destinations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldRules {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields_remove: Vec<String>,
    #[serde(skip_serializing_if = "FieldPairs::is_empty")]
    pub fields_rename: FieldPairs,
    #[serde(skip_serializing_if = "FieldPairs::is_empty")]
    pub fields_add: FieldPairs,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields_order: Vec<String>,
}

impl FieldRules {
    /// Build the transformer these rules describe.
    pub fn transformer(&self) -> Result<FieldTransformer, String> {
        let rename = self
            .fields_rename
            .pairs()?
            .into_iter()
            .map(|(from, to)| match to {
                Value::Str(to) if !to.is_empty() => Ok((from, to)),
                other => Err(format!("cannot rename {from} to {other}")),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FieldTransformer {
            remove: self.fields_remove.clone(),
            rename,
            add: self.fields_add.pairs()?,
            order: self.fields_order.clone(),
        })
    }
}

/// Per-address settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Codec names tried in order; `all` expands to every codec.
    pub decoders: Vec<String>,
    /// Destination names records are forwarded to.
    pub destinations: Vec<String>,
    /// Minimum interval in seconds; falls back to `common.interval`.
    #[serde(alias = "intervall", skip_serializing_if = "Option::is_none")]
    pub interval: Option<f64>,
    #[serde(flatten)]
    pub fields: FieldRules,
}

/// Per-sink settings. Keys other than the ones below are sink parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationConfig {
    #[serde(rename = "type")]
    pub kind: String,
    /// Records per flush; 0 or 1 flushes every record.
    pub batch: usize,
    /// Minimum interval per source address, in seconds.
    #[serde(alias = "intervall")]
    pub interval: f64,
    #[serde(flatten)]
    pub fields: FieldRules,
    #[serde(flatten)]
    pub params: Mapping,
}

impl DestinationConfig {
    pub fn param(&self, key: &str) -> Option<&serde_yaml::Value> {
        self.params.get(key)
    }

    /// A parameter rendered as a string (numbers and booleans included).
    pub fn param_str(&self, key: &str) -> Option<String> {
        match self.param(key)? {
            serde_yaml::Value::String(s) => Some(s.clone()),
            serde_yaml::Value::Number(n) => Some(n.to_string()),
            serde_yaml::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// A list parameter; a single string counts as a one-element list.
    pub fn param_list(&self, key: &str) -> Vec<String> {
        match self.param(key) {
            Some(serde_yaml::Value::Sequence(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            Some(serde_yaml::Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }
}

/// The complete, immutable gateway configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub common: CommonConfig,
    pub sources: BTreeMap<String, SourceConfig>,
    pub destinations: BTreeMap<String, DestinationConfig>,
}

impl GatewayConfig {
    /// Parse and normalise a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let mut doc: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        if doc.is_null() {
            doc = serde_yaml::Value::Mapping(Mapping::new());
        }
        lowercase_keys(&mut doc);

        if let serde_yaml::Value::Mapping(sections) = &mut doc {
            if let Some(serde_yaml::Value::Mapping(section)) = sections.get_mut(SECTION_SOURCES) {
                normalize_section(section, source_key);
                merge_defaults(section);
            }
            if let Some(serde_yaml::Value::Mapping(section)) = sections.get_mut(SECTION_DESTINATIONS)
            {
                normalize_section(section, destination_key);
                merge_defaults(section);
            }
        }

        let mut config: GatewayConfig = serde_yaml::from_value(doc)?;
        config.common.allowmac = config
            .common
            .allowmac
            .iter()
            .map(|mac| {
                mac.parse::<MacAddress>()
                    .map(|m| m.to_string())
                    .map_err(|e| ConfigError::invalid("common.allowmac", format!("{mac}: {e}")))
            })
            .collect::<Result<_, _>>()?;
        config.check_durations()?;
        Ok(config)
    }

    /// Reject second counts too large for a `Duration`.
    fn check_durations(&self) -> Result<(), ConfigError> {
        check_seconds("common.interval", self.common.interval)?;
        check_seconds("common.no_messages_timeout", self.common.no_messages_timeout)?;
        for (mac, source) in &self.sources {
            if let Some(interval) = source.interval {
                check_seconds(&format!("sources.{mac}.interval"), interval)?;
            }
        }
        for (name, destination) in &self.destinations {
            check_seconds(&format!("destinations.{name}.interval"), destination.interval)?;
        }
        Ok(())
    }

    /// The built-in configuration.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_yaml(BUILTIN_CONFIG)
    }

    /// Load `path`, or the built-in configuration if `path` is `-` or does
    /// not exist.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        if path == NO_FILE {
            return Self::builtin();
        }
        if !Path::new(path).is_file() {
            info!(path, "no configuration file found, using built-in configuration");
            return Self::builtin();
        }

        info!(path, "reading configuration file");
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Render the effective configuration.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Settings for `mac`, falling back to the wildcard entry.
    pub fn source(&self, mac: &str) -> Option<&SourceConfig> {
        self.sources.get(mac).or_else(|| self.sources.get(WILDCARD))
    }

    /// Effective minimum interval of a source entry.
    pub fn source_interval(&self, source: &SourceConfig) -> Duration {
        seconds(source.interval.unwrap_or(self.common.interval))
    }

    pub fn is_allowed(&self, mac: &str) -> bool {
        self.common.allowmac.is_empty() || self.common.allowmac.iter().any(|m| m == mac)
    }
}

fn source_key(key: &str) -> String {
    match key {
        "_defaults_" => DEFAULTS.to_string(),
        "_unknown_" => WILDCARD.to_string(),
        other => normalize_address(other),
    }
}

fn destination_key(key: &str) -> String {
    match key {
        "defaults" | "_defaults_" => DEFAULTS.to_string(),
        other => other.to_string(),
    }
}

fn lowercase_keys(value: &mut serde_yaml::Value) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            let old = std::mem::take(map);
            for (key, mut item) in old {
                lowercase_keys(&mut item);
                let key = match key {
                    serde_yaml::Value::String(s) => serde_yaml::Value::String(s.to_lowercase()),
                    other => other,
                };
                map.insert(key, item);
            }
        }
        serde_yaml::Value::Sequence(items) => items.iter_mut().for_each(lowercase_keys),
        _ => {}
    }
}

/// Rewrite entry names and turn empty entries (`name:` with no body) into
/// empty mappings.
fn normalize_section(section: &mut Mapping, normalize: fn(&str) -> String) {
    let old = std::mem::take(section);
    for (key, item) in old {
        let key = match key.as_str() {
            Some(s) => serde_yaml::Value::String(normalize(s)),
            None => key,
        };
        let item = if item.is_null() {
            serde_yaml::Value::Mapping(Mapping::new())
        } else {
            item
        };
        section.insert(key, item);
    }
}

fn merge_defaults(section: &mut Mapping) {
    let Some(serde_yaml::Value::Mapping(defaults)) = section.remove(DEFAULTS) else {
        return;
    };
    for (_, entry) in section.iter_mut() {
        let mut merged = defaults.clone();
        if let serde_yaml::Value::Mapping(own) = entry {
            for (k, v) in own.iter() {
                merged.insert(k.clone(), v.clone());
            }
        }
        *entry = serde_yaml::Value::Mapping(merged);
    }
}

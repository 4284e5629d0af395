//! Codec selection and record enrichment.
//!
//! The dispatcher decides which codecs to try for an advertisement, runs
//! them in order and merges the first successful decode with the
//! advertisement's own metadata (address, RSSI, TX power).
//!
//! Two binding modes exist and are mutually exclusive: in scan mode one
//! fixed codec list applies to every address, in gateway mode each source
//! entry carries its own list (with `*` as the fallback).

use crate::advertisement::Advertisement;
use crate::codec::{self, Codec};
use crate::config::GatewayConfig;
use crate::mac_address::WILDCARD;
use crate::record::{FIELD_DECODER, FIELD_MAC, FIELD_RSSI, FIELD_TX_POWER, Record};
use std::collections::HashMap;

/// Decoder tag of undecoded records in gateway mode.
pub const NONE: &str = "none";

pub struct Dispatcher {
    per_source: HashMap<String, Vec<Box<dyn Codec>>>,
    default: Vec<Box<dyn Codec>>,
    fallback: &'static str,
}

impl Dispatcher {
    /// One codec list for every address; undecoded records are tagged
    /// `unknown`.
    pub fn fixed(names: &[String]) -> Self {
        Self {
            per_source: HashMap::new(),
            default: codec::resolve(names),
            fallback: codec::UNKNOWN,
        }
    }

    /// Codec lists per source address; undecoded records are tagged `none`.
    pub fn per_source(config: &GatewayConfig) -> Self {
        let mut per_source = HashMap::new();
        let mut default = Vec::new();
        for (mac, source) in &config.sources {
            let codecs = codec::resolve(&source.decoders);
            if mac == WILDCARD {
                default = codecs;
            } else {
                per_source.insert(mac.clone(), codecs);
            }
        }
        Self {
            per_source,
            default,
            fallback: NONE,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        if config.common.scan {
            Self::fixed(&config.common.decoders)
        } else {
            Self::per_source(config)
        }
    }

    /// Codecs tried for `mac`, in order.
    pub fn codecs_for(&self, mac: &str) -> &[Box<dyn Codec>] {
        self.per_source.get(mac).unwrap_or(&self.default)
    }

    /// Decode and enrich one advertisement.
    ///
    /// Never fails: an advertisement no codec understands yields the base
    /// record tagged with the fallback decoder name.
    pub fn run(&self, adv: &Advertisement) -> Record {
        let mac = adv.mac.to_string();
        let decoded = self
            .codecs_for(&mac)
            .iter()
            .find_map(|codec| codec.decode(adv).map(|record| (codec.name(), record)));

        let (decoder, fields) = match decoded {
            Some((name, record)) => (name, Some(record)),
            None => (self.fallback, None),
        };

        let mut record = Record::new();
        record.insert(FIELD_DECODER, decoder);
        record.insert(FIELD_MAC, mac);
        if let Some(rssi) = adv.rssi {
            record.insert(FIELD_RSSI, rssi);
        }
        if let Some(tx_power) = adv.tx_power {
            record.insert(FIELD_TX_POWER, tx_power);
        }
        if let Some(fields) = fields {
            for (name, value) in fields.iter() {
                if name != FIELD_DECODER && name != FIELD_MAC {
                    record.insert(name, value.clone());
                }
            }
        }
        record
    }
}

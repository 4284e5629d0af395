//! Payload codecs and the codec registry.
//!
//! A codec turns one [`Advertisement`] into a flat [`Record`] of named
//! fields. Returning `None` means "not my format" and is ordinary control
//! flow; codecs never fail past their boundary, malformed payloads simply
//! do not match.

pub mod eddystone;
pub mod ruuvi_raw;
pub mod ruuvi_url;

use crate::advertisement::Advertisement;
use crate::record::Record;
use tracing::warn;

/// Decoder-list entry that expands to every registered codec.
pub const ALL: &str = "all";

/// Decoder-list entry kept for compatibility with scan-mode CLI usage.
/// It names no codec; undecoded advertisements are always reported.
pub const UNKNOWN: &str = "unknown";

/// A decoder for one payload format.
pub trait Codec: Send + Sync {
    /// Registry name, also written to the record's `decoder` field.
    fn name(&self) -> &'static str;

    /// Decode an advertisement, or `None` if it is not in this format.
    fn decode(&self, adv: &Advertisement) -> Option<Record>;
}

type Constructor = fn() -> Box<dyn Codec>;

fn make_ruuvi_raw() -> Box<dyn Codec> {
    Box::new(ruuvi_raw::RuuviRaw)
}

fn make_ruuvi_url() -> Box<dyn Codec> {
    Box::new(ruuvi_url::RuuviUrl)
}

fn make_eddystone() -> Box<dyn Codec> {
    Box::new(eddystone::EddystoneUrl)
}

/// Registration table, in registration order.
const REGISTRY: &[(&str, Constructor)] = &[
    (ruuvi_raw::NAME, make_ruuvi_raw),
    (ruuvi_url::NAME, make_ruuvi_url),
    (eddystone::NAME, make_eddystone),
];

/// Names of every registered codec, in registration order.
pub fn names() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|(name, _)| *name)
}

/// Instantiate a codec by name.
pub fn by_name(name: &str) -> Option<Box<dyn Codec>> {
    REGISTRY
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, make)| make())
}

/// Resolve a configured decoder list into codec instances.
///
/// `all` expands to every registered codec in registration order, duplicates
/// are skipped, `unknown` is accepted silently and any other unregistered
/// name is logged and ignored.
pub fn resolve(names: &[String]) -> Vec<Box<dyn Codec>> {
    let mut wanted: Vec<&str> = Vec::new();
    for name in names {
        let name = name.as_str();
        if name == ALL {
            wanted.extend(self::names());
        } else if name == UNKNOWN {
            continue;
        } else if let Some((registered, _)) = REGISTRY.iter().find(|(n, _)| *n == name) {
            wanted.push(registered);
        } else {
            warn!(decoder = %name, "unknown decoder name ignored");
        }
    }

    let mut codecs: Vec<Box<dyn Codec>> = Vec::with_capacity(wanted.len());
    for name in wanted {
        if codecs.iter().any(|c| c.name() == name) {
            continue;
        }
        if let Some(codec) = by_name(name) {
            codecs.push(codec);
        }
    }
    codecs
}

/// Round to `digits` decimal places.
pub(crate) fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

/// Big-endian unsigned 16-bit integer at `at`.
pub(crate) fn be_u16(data: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([data[at], data[at + 1]])
}

/// Big-endian two's-complement 16-bit integer at `at`.
pub(crate) fn be_i16(data: &[u8], at: usize) -> i16 {
    i16::from_be_bytes([data[at], data[at + 1]])
}

/// Sign-magnitude temperature: bit 7 of `int` is the sign, the low 7 bits
/// the whole degrees, `frac` the hundredths.
pub(crate) fn sign_magnitude_temperature(int: u8, frac: u8) -> f64 {
    let magnitude = f64::from(int & 0x7F) + f64::from(frac) / 100.0;
    if int & 0x80 != 0 { -magnitude } else { magnitude }
}

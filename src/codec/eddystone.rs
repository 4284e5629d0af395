//! Eddystone-URL frame decoder.
//!
//! See: https://github.com/google/eddystone/tree/master/eddystone-url

use super::Codec;
use crate::advertisement::Advertisement;
use crate::record::{FIELD_TX_POWER, Record};

pub const NAME: &str = "eddy";

/// 16-bit service UUID assigned to Eddystone.
pub const EDDYSTONE_UUID: u16 = 0xFEAA;

/// Eddystone frame type for URL frames.
const FRAME_TYPE_URL: u8 = 0x10;

const SCHEMES: [&str; 4] = ["http://www.", "https://www.", "http://", "https://"];

const EXPANSIONS: [&str; 14] = [
    ".com/", ".org/", ".edu/", ".net/", ".info/", ".biz/", ".gov/", ".com", ".org", ".edu",
    ".net", ".info", ".biz", ".gov",
];

/// A decoded Eddystone-URL frame.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlFrame {
    /// Calibrated TX power at 0 m, in dBm.
    pub tx_power: i8,
    pub url: String,
}

/// Decode the Eddystone-URL frame of an advertisement, if it carries one.
pub fn decode_url_frame(adv: &Advertisement) -> Option<UrlFrame> {
    let data = adv.service_data(EDDYSTONE_UUID)?;
    let (&frame_type, rest) = data.split_first()?;
    if frame_type != FRAME_TYPE_URL {
        return None;
    }
    let (&tx_power, rest) = rest.split_first()?;
    let (&scheme, encoded) = rest.split_first()?;

    let mut url = SCHEMES.get(usize::from(scheme))?.to_string();
    for &byte in encoded {
        match EXPANSIONS.get(usize::from(byte)) {
            Some(expansion) => url.push_str(expansion),
            None if (0x21..0x7F).contains(&byte) => url.push(char::from(byte)),
            None => return None,
        }
    }

    Some(UrlFrame {
        tx_power: tx_power as i8,
        url,
    })
}

/// Reports the advertised URL of any Eddystone-URL beacon.
#[derive(Debug, Default, Clone, Copy)]
pub struct EddystoneUrl;

impl Codec for EddystoneUrl {
    fn name(&self) -> &'static str {
        NAME
    }

    fn decode(&self, adv: &Advertisement) -> Option<Record> {
        let frame = decode_url_frame(adv)?;
        let mut record = Record::new();
        record.insert("url", frame.url);
        record.insert(FIELD_TX_POWER, frame.tx_power);
        Some(record)
    }
}

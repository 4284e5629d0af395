//! RuuviTag Eddystone-URL decoder (data formats 2, 3 and 4).
//!
//! Older RuuviTag firmware broadcasts measurements as an Eddystone-URL
//! pointing at `ruu.vi/#<token>`, where the token is the measurement packed
//! into URL-safe base64.

use super::eddystone::decode_url_frame;
use super::{Codec, be_u16, round_to, ruuvi_raw, sign_magnitude_temperature};
use crate::advertisement::Advertisement;
use crate::record::Record;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;

pub const NAME: &str = "ruuviurl";

const URL_MARKER: &str = "//ruu.vi/#";

/// Format 4 tokens carry one extra identifier character after the
/// 8-character measurement.
const FORMAT4_TOKEN_LEN: usize = 9;

const SHORT_FORMAT_LEN: usize = 6;

#[derive(Debug, Default, Clone, Copy)]
pub struct RuuviUrl;

impl Codec for RuuviUrl {
    fn name(&self) -> &'static str {
        NAME
    }

    fn decode(&self, adv: &Advertisement) -> Option<Record> {
        let frame = decode_url_frame(adv)?;
        decode_url(&frame.url)
    }
}

/// Decode a `https://ruu.vi/#...` URL. Anything else, or a token that does
/// not decode to a known format, yields `None`.
pub fn decode_url(url: &str) -> Option<Record> {
    let (_, token) = url.split_once(URL_MARKER)?;
    let token = token.trim_end_matches('=');

    let (token, identifier) = if token.len() == FORMAT4_TOKEN_LEN {
        let (measurement, id) = token.split_at(FORMAT4_TOKEN_LEN - 1);
        (measurement, Some(id))
    } else {
        (token, None)
    };

    let mut padded = token.to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    let bytes = URL_SAFE.decode(padded).ok()?;

    match bytes.first()? {
        2 | 4 => {
            let mut record = decode_short(&bytes)?;
            if bytes[0] == 4 {
                record.insert("identifier", identifier.map(str::to_string));
            }
            Some(record)
        }
        3 => ruuvi_raw::decode_payload(&bytes),
        _ => None,
    }
}

/// Formats 2 and 4: humidity, temperature (integer and hundredths bytes)
/// and pressure.
fn decode_short(bytes: &[u8]) -> Option<Record> {
    if bytes.len() < SHORT_FORMAT_LEN {
        return None;
    }

    let mut record = Record::new();
    record.insert("data_format", bytes[0]);
    record.insert("temperature", round_to(sign_magnitude_temperature(bytes[2], bytes[3]), 2));
    record.insert("humidity", round_to(f64::from(bytes[1]) / 2.0, 1));
    record.insert(
        "pressure",
        round_to((f64::from(be_u16(bytes, 4)) + 50_000.0) / 100.0, 2),
    );
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::eddystone::EDDYSTONE_UUID;
    use crate::record::Value;
    use crate::test_utils::{TEST_MAC, df3_payload, eddystone_url_frame};
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    fn ruuvi_url(bytes: &[u8]) -> String {
        format!("https://ruu.vi/#{}", URL_SAFE_NO_PAD.encode(bytes))
    }

    #[test]
    fn test_decode_known_token() {
        // format 4, humidity 32 %, 23 °C, 999 hPa
        let record = decode_url("https://ruu.vi/#BEAXAMLs").unwrap();
        assert_eq!(record.get("data_format"), Some(&Value::Int(4)));
        assert_eq!(record.get("humidity"), Some(&Value::Float(32.0)));
        assert_eq!(record.get("temperature"), Some(&Value::Float(23.0)));
        assert_eq!(record.get("pressure"), Some(&Value::Float(999.0)));
        assert_eq!(record.get("identifier"), Some(&Value::Null));
    }

    #[test]
    fn test_decode_format2_negative_temperature() {
        let url = ruuvi_url(&[2, 101, 0x80 | 7, 0, 0xC8, 0x7D]);
        let record = decode_url(&url).unwrap();
        assert_eq!(record.get("data_format"), Some(&Value::Int(2)));
        assert_eq!(record.get("humidity"), Some(&Value::Float(50.5)));
        assert_eq!(record.get("temperature"), Some(&Value::Float(-7.0)));
        assert_eq!(record.get("pressure"), Some(&Value::Float(1013.25)));
        assert!(!record.contains("identifier"));
    }

    #[test]
    fn test_decode_short_format_fractional_temperature() {
        let record = decode_url(&ruuvi_url(&[2, 101, 0x80 | 7, 25, 0xC8, 0x7D])).unwrap();
        assert_eq!(record.get("temperature"), Some(&Value::Float(-7.25)));

        let record = decode_url(&ruuvi_url(&[4, 80, 20, 5, 0xC8, 0x5D])).unwrap();
        assert_eq!(record.get("temperature"), Some(&Value::Float(20.05)));
    }

    #[test]
    fn test_decode_format4_identifier() {
        let url = format!("{}Q", ruuvi_url(&[4, 80, 20, 0, 0xC8, 0x5D]));
        let record = decode_url(&url).unwrap();
        assert_eq!(record.get("data_format"), Some(&Value::Int(4)));
        assert_eq!(record.get("identifier"), Some(&Value::from("Q")));
        assert_eq!(record.get("temperature"), Some(&Value::Float(20.0)));
    }

    #[test]
    fn test_decode_format3() {
        let url = ruuvi_url(&df3_payload(100, 0x15, 50, 51_325, [0, 0, 1000], 3000));
        let record = decode_url(&url).unwrap();
        assert_eq!(record.get("data_format"), Some(&Value::Int(3)));
        assert_eq!(record.get("temperature"), Some(&Value::Float(21.5)));
        assert_eq!(record.get("battery"), Some(&Value::Float(3.0)));
    }

    #[test]
    fn test_malformed_tokens_fail_closed() {
        assert!(decode_url("https://example.com/#BEAXAMLs").is_none());
        assert!(decode_url("https://ruu.vi/#").is_none());
        assert!(decode_url("https://ruu.vi/#B").is_none());
        assert!(decode_url("https://ruu.vi/#!!!!").is_none());
        // known format, too short
        assert!(decode_url(&ruuvi_url(&[2, 100, 20])).is_none());
        assert!(decode_url(&ruuvi_url(&[3, 100, 20, 0, 0, 0, 0])).is_none());
        // unknown format
        assert!(decode_url(&ruuvi_url(&[7, 100, 20, 0, 0xC8, 0x5D])).is_none());
    }

    #[test]
    fn test_codec_reads_eddystone_service_data() {
        let adv = Advertisement::new(TEST_MAC)
            .with_service_data(EDDYSTONE_UUID, eddystone_url_frame("https://ruu.vi/#BEAXAMLs"));
        let record = RuuviUrl.decode(&adv).unwrap();
        assert_eq!(record.get("humidity"), Some(&Value::Float(32.0)));

        let adv = Advertisement::new(TEST_MAC)
            .with_service_data(EDDYSTONE_UUID, eddystone_url_frame("https://example.com/"));
        assert!(RuuviUrl.decode(&adv).is_none());
    }
}

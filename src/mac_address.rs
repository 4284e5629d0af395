//! Bluetooth device addresses.
//!
//! Beacons are identified by their 6-byte hardware address. Everywhere in the
//! gateway (records, configuration keys, routing tables) the canonical text
//! form is lowercase and colon-separated: `aa:bb:cc:dd:ee:ff`.

use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use thiserror::Error;

/// Configuration key that applies to every address without its own entry.
pub const WILDCARD: &str = "*";

/// Configuration key whose settings are merged into every other entry.
pub const DEFAULTS: &str = "DEFAULTS";

/// A Bluetooth MAC address stored as a compact 6-byte array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Errors returned when parsing a MAC address string.
#[derive(Error, Debug, PartialEq)]
pub enum ParseMacError {
    #[error("invalid MAC address: expected 6 parts, got {0}")]
    InvalidLength(usize),
    #[error("invalid MAC address: part {0} has wrong length")]
    InvalidPartLength(usize),
    #[error("invalid MAC address: '{0}' is not valid hex")]
    InvalidHex(String),
}

impl FromStr for MacAddress {
    type Err = ParseMacError;

    /// Accepts `:`, `-` or `_` as separators, in any letter case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split([':', '-', '_']).collect();
        if parts.len() != 6 {
            return Err(ParseMacError::InvalidLength(parts.len()));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 {
                return Err(ParseMacError::InvalidPartLength(i));
            }
            bytes[i] = u8::from_str_radix(part, 16)
                .map_err(|_| ParseMacError::InvalidHex(part.to_string()))?;
        }

        Ok(MacAddress(bytes))
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

#[cfg(feature = "bluer")]
impl From<bluer::Address> for MacAddress {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}

/// Normalize a configuration key that names a source address.
///
/// Valid addresses are rewritten to canonical form. The special keys
/// [`WILDCARD`] and [`DEFAULTS`] (matched case-insensitively) keep their
/// spelling; anything else is returned trimmed and lower-cased.
pub fn normalize_address(key: &str) -> String {
    let key = key.trim();
    if key == WILDCARD {
        return WILDCARD.to_string();
    }
    if key.eq_ignore_ascii_case(DEFAULTS) {
        return DEFAULTS.to_string();
    }
    match key.parse::<MacAddress>() {
        Ok(mac) => mac.to_string(),
        Err(_) => key.to_lowercase(),
    }
}

/// `clap` value parser for `--allowmac`.
pub fn parse_mac_arg(src: &str) -> Result<String, String> {
    src.parse::<MacAddress>()
        .map(|mac| mac.to_string())
        .map_err(|e| format!("{src} is not a MAC address ({e})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_lowercase() {
        let addr = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        assert_eq!(format!("{}", addr), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn test_display_with_zeros() {
        let addr = MacAddress([0x00, 0x01, 0x02, 0x03, 0x04, 0x05]);
        assert_eq!(format!("{}", addr), "00:01:02:03:04:05");
    }

    #[test]
    fn test_from_str_any_separator() {
        for s in [
            "AA:BB:CC:DD:EE:FF",
            "aa-bb-cc-dd-ee-ff",
            "Aa_bB_cc_DD_ee_FF",
            " aa:bb:cc:dd:ee:ff ",
        ] {
            let addr: MacAddress = s.parse().unwrap();
            assert_eq!(addr.0, [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF], "{s}");
        }
    }

    #[test]
    fn test_from_str_invalid() {
        assert!(matches!(
            "invalid".parse::<MacAddress>(),
            Err(ParseMacError::InvalidLength(1))
        ));
        assert!(matches!(
            "AA:BB:CC".parse::<MacAddress>(),
            Err(ParseMacError::InvalidLength(3))
        ));
        assert!(matches!(
            "AA:BB:CC:DD:EE:GG".parse::<MacAddress>(),
            Err(ParseMacError::InvalidHex(_))
        ));
        assert!(matches!(
            "AAA:BB:CC:DD:EE:F".parse::<MacAddress>(),
            Err(ParseMacError::InvalidPartLength(0))
        ));
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address("DA-B6-F7-69-C3-45"), "da:b6:f7:69:c3:45");
        assert_eq!(normalize_address("*"), "*");
        assert_eq!(normalize_address("defaults"), "DEFAULTS");
        assert_eq!(normalize_address("Kitchen"), "kitchen");
    }

    #[test]
    fn test_parse_mac_arg() {
        assert_eq!(
            parse_mac_arg("AA:BB:CC:DD:EE:FF").unwrap(),
            "aa:bb:cc:dd:ee:ff"
        );
        assert!(parse_mac_arg("nope").is_err());
    }
}

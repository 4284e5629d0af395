//! Parsed BLE advertisement as handed over by an ingest backend.
//!
//! Backends differ in what they see (BlueZ exposes per-device properties,
//! raw HCI sockets expose advertising reports), so both normalize into an
//! [`Advertisement`]: the source address, signal metadata and the raw AD
//! payloads the codecs care about.

use crate::mac_address::MacAddress;

/// AD type: manufacturer specific data.
pub const AD_TYPE_MANUFACTURER_DATA: u8 = 0xFF;
/// AD type: service data with a 16-bit UUID.
pub const AD_TYPE_SERVICE_DATA_16: u8 = 0x16;
/// AD type: TX power level.
pub const AD_TYPE_TX_POWER: u8 = 0x0A;

/// One received advertisement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Advertisement {
    pub mac: MacAddress,
    /// Received signal strength in dBm.
    pub rssi: Option<i16>,
    /// Advertised TX power level in dBm.
    pub tx_power: Option<i16>,
    /// Manufacturer specific data, including the 2-byte little-endian
    /// company identifier prefix.
    pub manufacturer_data: Option<Vec<u8>>,
    /// Service data entries keyed by 16-bit service UUID.
    pub service_data: Vec<(u16, Vec<u8>)>,
}

impl Advertisement {
    pub fn new(mac: MacAddress) -> Self {
        Self {
            mac,
            ..Self::default()
        }
    }

    /// Builder-style setter for manufacturer data.
    pub fn with_manufacturer_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.manufacturer_data = Some(data.into());
        self
    }

    pub fn with_service_data(mut self, uuid: u16, data: impl Into<Vec<u8>>) -> Self {
        self.service_data.push((uuid, data.into()));
        self
    }

    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    /// Build an advertisement from a sequence of AD structures
    /// (`len, type, data...` repeated), as carried in advertising reports.
    ///
    /// Malformed trailing structures are ignored.
    pub fn from_ad_structures(mac: MacAddress, rssi: Option<i16>, ad_data: &[u8]) -> Self {
        let mut adv = Advertisement::new(mac);
        adv.rssi = rssi;

        let mut offset = 0;
        while offset + 2 <= ad_data.len() {
            let len = ad_data[offset] as usize;
            if len == 0 || offset + 1 + len > ad_data.len() {
                break;
            }

            let ad_type = ad_data[offset + 1];
            let body = &ad_data[offset + 2..offset + 1 + len];

            match ad_type {
                AD_TYPE_MANUFACTURER_DATA if body.len() >= 2 => {
                    adv.manufacturer_data = Some(body.to_vec());
                }
                AD_TYPE_SERVICE_DATA_16 if body.len() >= 2 => {
                    let uuid = u16::from_le_bytes([body[0], body[1]]);
                    adv.service_data.push((uuid, body[2..].to_vec()));
                }
                AD_TYPE_TX_POWER if body.len() == 1 => {
                    adv.tx_power = Some(i16::from(body[0] as i8));
                }
                _ => {}
            }

            offset += 1 + len;
        }

        adv
    }

    /// Company identifier of the manufacturer data, if any.
    pub fn company_id(&self) -> Option<u16> {
        match self.manufacturer_data.as_deref() {
            Some([lo, hi, ..]) => Some(u16::from_le_bytes([*lo, *hi])),
            _ => None,
        }
    }

    /// Service data for the given 16-bit UUID.
    pub fn service_data(&self, uuid: u16) -> Option<&[u8]> {
        self.service_data
            .iter()
            .find(|(u, _)| *u == uuid)
            .map(|(_, data)| data.as_slice())
    }
}

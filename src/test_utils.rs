use crate::advertisement::Advertisement;
use crate::codec::eddystone::EDDYSTONE_UUID;
use crate::codec::ruuvi_raw::RUUVI_MANUFACTURER_ID_BYTES;
use crate::mac_address::MacAddress;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// A stable MAC address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

/// A second address, for tests that need two distinct sources.
pub const OTHER_MAC: MacAddress = MacAddress([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);

/// Example RAWv2 (format 5) payload without the manufacturer ID prefix.
pub fn v5_payload() -> Vec<u8> {
    vec![
        0x05, // Format 5
        0x12, 0xFC, // Temperature: 24.30°C (0x12FC = 4860, 4860 * 0.005 = 24.30)
        0x53, 0x94, // Humidity: 53.49% (0x5394 = 21396, 21396 * 0.0025 = 53.49)
        0xC3, 0x7C, // Pressure: 100044 Pa (0xC37C = 50044, 50044 + 50000 = 100044)
        0x00, 0x04, // Acceleration X: 4 mG
        0xFF, 0xFC, // Acceleration Y: -4 mG
        0x04, 0x0C, // Acceleration Z: 1036 mG
        0xAC, 0x36, // Battery: 2977 mV, TX Power: 4 dBm
        0x42, // Movement counter: 66
        0x00, 0xCD, // Sequence: 205
        0xCB, 0xB8, 0x33, 0x4C, 0x88, 0x4F, // MAC address (ignored in decode)
    ]
}

/// Build a RAWv1 (format 3) payload without the manufacturer ID prefix.
pub fn df3_payload(
    humidity: u8,
    temp_int: u8,
    temp_frac: u8,
    pressure: u16,
    accel: [i16; 3],
    battery_mv: u16,
) -> Vec<u8> {
    let mut data = vec![0x03, humidity, temp_int, temp_frac];
    data.extend_from_slice(&pressure.to_be_bytes());
    for axis in accel {
        data.extend_from_slice(&axis.to_be_bytes());
    }
    data.extend_from_slice(&battery_mv.to_be_bytes());
    data
}

/// Advertisement carrying `payload` as Ruuvi manufacturer data.
pub fn ruuvi_advertisement(mac: MacAddress, payload: &[u8]) -> Advertisement {
    let mut data = RUUVI_MANUFACTURER_ID_BYTES.to_vec();
    data.extend_from_slice(payload);
    Advertisement::new(mac).with_manufacturer_data(data)
}

/// Encode `url` as Eddystone-URL service data with a -8 dBm tx power.
///
/// Only the scheme prefix is compressed; the rest is emitted verbatim.
pub fn eddystone_url_frame(url: &str) -> Vec<u8> {
    const SCHEMES: [(&str, u8); 4] = [
        ("https://www.", 0x01),
        ("http://www.", 0x00),
        ("https://", 0x03),
        ("http://", 0x02),
    ];

    let (rest, scheme) = SCHEMES
        .iter()
        .find_map(|(prefix, code)| url.strip_prefix(prefix).map(|rest| (rest, *code)))
        .unwrap_or_else(|| panic!("unsupported scheme in {url}"));

    let mut frame = vec![0x10, 0xF8, scheme];
    frame.extend_from_slice(rest.as_bytes());
    frame
}

/// Advertisement carrying an Eddystone-URL frame for `url`.
pub fn eddystone_advertisement(mac: MacAddress, url: &str) -> Advertisement {
    Advertisement::new(mac).with_service_data(EDDYSTONE_UUID, eddystone_url_frame(url))
}

/// A cloneable in-memory writer for capturing sink output.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A writer that fails every write, for sink failure tests.
pub struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::other("disk on fire"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::other("disk on fire"))
    }
}

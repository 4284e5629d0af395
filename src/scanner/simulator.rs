//! Synthetic RuuviTag traffic.
//!
//! Emits a fixed number of format 5 advertisements from two made-up tags,
//! 50 to 500 ms apart, then closes the channel. Values drift slowly so the
//! output looks like a real room.

use super::{IngestItem, Producer, Push, ScanOptions, channel};
use crate::advertisement::Advertisement;
use crate::codec::ruuvi_raw::RUUVI_MANUFACTURER_ID_BYTES;
use crate::mac_address::MacAddress;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Addresses the simulated tags advertise from.
pub const SIMULATED_MACS: [MacAddress; 2] = [
    MacAddress([0xC0, 0xFF, 0xEE, 0x00, 0x00, 0x01]),
    MacAddress([0xC0, 0xFF, 0xEE, 0x00, 0x00, 0x02]),
];

const MIN_DELAY_MS: u64 = 50;
const MAX_DELAY_MS: u64 = 500;

/// Delay before the `n`th advertisement; spread over 50..=500 ms.
pub fn delay(n: u64) -> Duration {
    let span = MAX_DELAY_MS - MIN_DELAY_MS + 1;
    Duration::from_millis(MIN_DELAY_MS + n.wrapping_mul(7919) % span)
}

/// Format 5 manufacturer data (company id included) for the `n`th
/// advertisement of `mac`.
pub fn manufacturer_data(mac: MacAddress, n: u64) -> Vec<u8> {
    let step = (n % 100) as i16;
    let temperature: i16 = 4400 + step * 4; // 22.0 °C and up, 0.005 °C units
    let humidity: u16 = 18_000 + (n % 200) as u16 * 8; // 45 % and up, 0.0025 % units
    let pressure: u16 = 51_325 - (n % 50) as u16; // around 1013 hPa, Pa - 50000
    let battery_mv: u16 = 3000 - (n % 100) as u16;
    let tx_power_dbm: i16 = 4;
    let power_info = ((battery_mv - 1600) << 5) | ((tx_power_dbm + 40) / 2) as u16;

    let mut data = RUUVI_MANUFACTURER_ID_BYTES.to_vec();
    data.push(5);
    data.extend_from_slice(&temperature.to_be_bytes());
    data.extend_from_slice(&humidity.to_be_bytes());
    data.extend_from_slice(&pressure.to_be_bytes());
    for axis in [12i16, -8, 1000] {
        data.extend_from_slice(&axis.to_be_bytes());
    }
    data.extend_from_slice(&power_info.to_be_bytes());
    data.push((n % 256) as u8);
    data.extend_from_slice(&((n % 65_535) as u16).to_be_bytes());
    data.extend_from_slice(&mac.0);
    data
}

/// The `n`th simulated advertisement.
pub fn advertisement(n: u64) -> Advertisement {
    let mac = SIMULATED_MACS[(n % 2) as usize];
    Advertisement::new(mac)
        .with_manufacturer_data(manufacturer_data(mac, n / 2))
        .with_rssi(-60 - (n % 20) as i16)
}

/// Start emitting `options.simulated` advertisements.
pub fn start(options: ScanOptions, cancel: CancellationToken) -> mpsc::Receiver<IngestItem> {
    let (producer, rx) = channel(options.queue_size);
    info!(count = options.simulated, "starting simulator");
    tokio::spawn(run(producer, options.simulated, cancel));
    rx
}

async fn run(mut producer: Producer, count: u64, cancel: CancellationToken) {
    for n in 0..count {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay(n)) => {}
        }
        if producer.push(IngestItem::Advertisement(advertisement(n))).await == Push::Closed {
            break;
        }
    }
    debug!("simulator finished");
}

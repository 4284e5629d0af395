//! BlueZ D-Bus backend.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.

use super::{IngestItem, Push, ScanError, ScanOptions, channel};
use crate::advertisement::{AD_TYPE_MANUFACTURER_DATA, AD_TYPE_SERVICE_DATA_16, Advertisement};
use crate::codec::eddystone::EDDYSTONE_UUID;
use crate::codec::ruuvi_raw::{RUUVI_COMPANY_ID, RUUVI_MANUFACTURER_ID_BYTES};
use bluer::monitor::{Monitor, MonitorEvent, Pattern};
use bluer::{Adapter, Address, Session, UuidExt};
use futures::StreamExt;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Advertisement monitor patterns: Ruuvi manufacturer data or Eddystone
/// service data. BlueZ reports devices matching any of them.
fn patterns() -> Vec<Pattern> {
    vec![
        Pattern {
            data_type: AD_TYPE_MANUFACTURER_DATA,
            start_position: 0,
            content: RUUVI_MANUFACTURER_ID_BYTES.to_vec(),
        },
        Pattern {
            data_type: AD_TYPE_SERVICE_DATA_16,
            start_position: 0,
            content: EDDYSTONE_UUID.to_le_bytes().to_vec(),
        },
    ]
}

/// Start a passive scan on `hci{options.device}`.
///
/// Discovered devices are turned into [`Advertisement`]s and pushed to the
/// returned channel until `cancel` fires.
pub async fn start_scan(
    options: ScanOptions,
    cancel: CancellationToken,
) -> Result<mpsc::Receiver<IngestItem>, ScanError> {
    let session = Session::new().await?;
    let adapter = session.adapter(&format!("hci{}", options.device))?;
    adapter.set_powered(true).await?;
    info!(adapter = adapter.name(), "scanning via BlueZ");

    let (mut producer, rx) = channel(options.queue_size);

    let monitor_manager = adapter.monitor().await?;
    let mut monitor_handle = monitor_manager
        .register(Monitor {
            patterns: Some(patterns()),
            ..Default::default()
        })
        .await?;

    // Spawn a task that owns all Bluetooth state and runs the event loop
    tokio::spawn(async move {
        // Keep all Bluetooth state alive by moving it into this task
        let _session = session;
        let _monitor_manager = monitor_manager;

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = monitor_handle.next() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            if let MonitorEvent::DeviceFound(device_id) = event {
                match read_device(&adapter, device_id.device).await {
                    Ok(adv) => {
                        if producer.push(IngestItem::Advertisement(adv)).await == Push::Closed {
                            break;
                        }
                    }
                    Err(e) => debug!(error = %e, "failed to read device properties"),
                }
            }
        }
        debug!("BlueZ scan stopped");
    });

    Ok(rx)
}

/// Collect the advertisement data BlueZ cached for a device.
async fn read_device(adapter: &Adapter, address: Address) -> Result<Advertisement, ScanError> {
    let device = adapter.device(address)?;
    let mut adv = Advertisement::new(address.into());
    adv.rssi = device.rssi().await?;
    adv.tx_power = device.tx_power().await?;

    if let Some(data) = device.manufacturer_data().await? {
        adv.manufacturer_data = select_manufacturer_data(&data);
    }
    if let Some(data) = device.service_data().await? {
        adv.service_data = data
            .into_iter()
            .filter_map(|(uuid, body)| uuid.as_u16().map(|short| (short, body)))
            .collect();
        adv.service_data.sort();
    }
    Ok(adv)
}

/// Pick one manufacturer data entry, Ruuvi's first, and restore the
/// company id prefix BlueZ strips off.
fn select_manufacturer_data(data: &HashMap<u16, Vec<u8>>) -> Option<Vec<u8>> {
    let (id, body) = data
        .get_key_value(&RUUVI_COMPANY_ID)
        .or_else(|| data.iter().min_by_key(|(id, _)| **id))?;
    let mut raw = id.to_le_bytes().to_vec();
    raw.extend_from_slice(body);
    Some(raw)
}

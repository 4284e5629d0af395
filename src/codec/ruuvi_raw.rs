//! RuuviTag manufacturer-data decoder (RAWv1 / RAWv2, data formats 3 and 5).
//!
//! See: https://github.com/ruuvi/ruuvi-sensor-protocols
//!
//! Units after decoding: temperature °C, humidity %, pressure hPa,
//! acceleration mG, battery V, tx power dBm.

use super::{Codec, be_i16, be_u16, round_to, sign_magnitude_temperature};
use crate::advertisement::Advertisement;
use crate::record::{FIELD_TX_POWER, Record, Value};

pub const NAME: &str = "ruuviraw";

/// Ruuvi Innovations manufacturer ID as it appears on air (little-endian).
pub const RUUVI_MANUFACTURER_ID_BYTES: [u8; 2] = [0x99, 0x04];

/// Ruuvi Innovations company identifier.
pub const RUUVI_COMPANY_ID: u16 = u16::from_le_bytes(RUUVI_MANUFACTURER_ID_BYTES);

const DF3_LEN: usize = 14;
const DF5_LEN: usize = 18;

#[derive(Debug, Default, Clone, Copy)]
pub struct RuuviRaw;

impl Codec for RuuviRaw {
    fn name(&self) -> &'static str {
        NAME
    }

    fn decode(&self, adv: &Advertisement) -> Option<Record> {
        if adv.company_id()? != RUUVI_COMPANY_ID {
            return None;
        }
        decode_payload(adv.manufacturer_data.as_deref()?.get(2..)?)
    }
}

/// Decode a RuuviTag payload with the manufacturer ID already stripped,
/// i.e. starting at the data format byte.
pub fn decode_payload(data: &[u8]) -> Option<Record> {
    match data.first()? {
        3 => decode_df3(data),
        5 => decode_df5(data),
        _ => None,
    }
}

fn insert_acceleration(record: &mut Record, data: &[u8], at: usize) {
    let x = be_i16(data, at);
    let y = be_i16(data, at + 2);
    let z = be_i16(data, at + 4);
    let (fx, fy, fz) = (f64::from(x), f64::from(y), f64::from(z));
    let magnitude = (fx * fx + fy * fy + fz * fz).sqrt().round() as i64;
    record.insert("acceleration", magnitude);
    record.insert("acceleration_x", x);
    record.insert("acceleration_y", y);
    record.insert("acceleration_z", z);
}

fn pressure_hpa(raw: u16) -> f64 {
    round_to((f64::from(raw) + 50_000.0) / 100.0, 2)
}

fn battery_volts(millivolts: f64) -> f64 {
    round_to(millivolts / 1000.0, 2)
}

fn decode_df3(data: &[u8]) -> Option<Record> {
    if data.len() < DF3_LEN {
        return None;
    }

    let mut record = Record::new();
    record.insert("data_format", 3);
    record.insert(
        "temperature",
        round_to(sign_magnitude_temperature(data[2], data[3]), 2),
    );
    record.insert("humidity", round_to(f64::from(data[1]) / 2.0, 1));
    record.insert("pressure", pressure_hpa(be_u16(data, 4)));
    insert_acceleration(&mut record, data, 6);
    record.insert("battery", battery_volts(f64::from(be_u16(data, 12))));
    Some(record)
}

fn decode_df5(data: &[u8]) -> Option<Record> {
    if data.len() < DF5_LEN {
        return None;
    }

    let mut record = Record::new();
    record.insert("data_format", 5);

    // 0x8000 is the invalid marker in the published format; 0x7FFF is also
    // emitted by some firmware.
    let temperature = match be_u16(data, 1) {
        0x7FFF | 0x8000 => Value::Null,
        _ => Value::Float(round_to(f64::from(be_i16(data, 1)) / 200.0, 2)),
    };
    record.insert("temperature", temperature);

    let humidity = match be_u16(data, 3) {
        0xFFFF => Value::Null,
        raw => Value::Float(round_to(f64::from(raw) / 400.0, 1)),
    };
    record.insert("humidity", humidity);

    let pressure = match be_u16(data, 5) {
        0xFFFF => Value::Null,
        raw => Value::Float(pressure_hpa(raw)),
    };
    record.insert("pressure", pressure);

    insert_acceleration(&mut record, data, 7);

    let power_info = be_u16(data, 13);
    let battery = match power_info >> 5 {
        0b111_1111_1111 => Value::Null,
        raw => Value::Float(battery_volts(f64::from(raw) + 1600.0)),
    };
    let tx_power = match power_info & 0b1_1111 {
        0b1_1111 => Value::Null,
        raw => Value::Int(i64::from(raw) * 2 - 40),
    };
    record.insert("battery", battery);
    record.insert(FIELD_TX_POWER, tx_power);
    record.insert("movement_counter", data[15]);
    record.insert("measurement_sequence_number", be_u16(data, 16));
    Some(record)
}

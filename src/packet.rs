//! Downlink frame representation handed to the JIT queue.

use crate::clock::CounterUs;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static PACKET_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Largest PHY payload a concentrator accepts.
pub const MAX_PAYLOAD_SIZE: usize = 255;

/// How the target time of a downlink was specified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxMode {
    /// Send as soon as possible; the queue picks the time.
    Immediate,
    /// Send when the concentrator counter reaches `target_time_us`.
    Timestamped,
}

/// LoRa channel bandwidth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bandwidth {
    #[serde(rename = "125")]
    Khz125,
    #[serde(rename = "250")]
    Khz250,
    #[serde(rename = "500")]
    Khz500,
}

impl Bandwidth {
    pub const fn hz(self) -> u32 {
        match self {
            Bandwidth::Khz125 => 125_000,
            Bandwidth::Khz250 => 250_000,
            Bandwidth::Khz500 => 500_000,
        }
    }
}

/// LoRa forward error correction rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodingRate {
    #[serde(rename = "4/5")]
    Cr4_5,
    #[serde(rename = "4/6")]
    Cr4_6,
    #[serde(rename = "4/7")]
    Cr4_7,
    #[serde(rename = "4/8")]
    Cr4_8,
}

impl CodingRate {
    /// Extra parity bits per 4 data bits (1 for 4/5 up to 4 for 4/8).
    pub const fn parity_bits(self) -> u32 {
        match self {
            CodingRate::Cr4_5 => 1,
            CodingRate::Cr4_6 => 2,
            CodingRate::Cr4_7 => 3,
            CodingRate::Cr4_8 => 4,
        }
    }
}

/// Modulation settings needed to derive the time on air of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "modulation", rename_all = "snake_case")]
pub enum Modulation {
    Lora {
        spreading_factor: u8,
        bandwidth: Bandwidth,
        coding_rate: CodingRate,
        preamble_symbols: u16,
        implicit_header: bool,
        crc: bool,
    },
    Fsk {
        datarate_bps: u32,
        preamble_bytes: u16,
        crc: bool,
    },
}

impl Modulation {
    /// Downlink defaults: 8 symbol preamble, explicit header, no payload CRC.
    pub const fn lora(spreading_factor: u8, bandwidth: Bandwidth) -> Self {
        Modulation::Lora {
            spreading_factor,
            bandwidth,
            coding_rate: CodingRate::Cr4_5,
            preamble_symbols: 8,
            implicit_header: false,
            crc: false,
        }
    }

    /// Network beacon modulation: implicit header, 10 symbol preamble, no CRC.
    pub const fn beacon(spreading_factor: u8, bandwidth: Bandwidth) -> Self {
        Modulation::Lora {
            spreading_factor,
            bandwidth,
            coding_rate: CodingRate::Cr4_5,
            preamble_symbols: 10,
            implicit_header: true,
            crc: false,
        }
    }

    pub const fn fsk(datarate_bps: u32) -> Self {
        Modulation::Fsk {
            datarate_bps,
            preamble_bytes: 5,
            crc: true,
        }
    }

    /// Whether the settings describe something a concentrator can emit.
    pub fn is_supported(&self) -> bool {
        match *self {
            Modulation::Lora {
                spreading_factor, ..
            } => (7..=12).contains(&spreading_factor),
            Modulation::Fsk { datarate_bps, .. } => (500..=250_000).contains(&datarate_bps),
        }
    }
}

/// A downlink frame plus its transmit parameters.
///
/// `target_time_us` is expressed in concentrator counter time. For [`TxMode::Immediate`] Class C
/// requests the queue overwrites it with the slot found by the ASAP search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownlinkPacket {
    pub id: u64,
    pub target_time_us: CounterUs,
    pub tx_mode: TxMode,
    pub frequency_hz: u32,
    pub rf_power_dbm: i8,
    pub modulation: Modulation,
    payload: Vec<u8>,
}

impl DownlinkPacket {
    /// Frame to be sent at a given counter value.
    pub fn timestamped(
        payload: Vec<u8>,
        target_time_us: CounterUs,
        frequency_hz: u32,
        modulation: Modulation,
    ) -> Self {
        Self::build(payload, target_time_us, TxMode::Timestamped, frequency_hz, modulation)
    }

    /// Frame to be sent as soon as the queue allows (Class C only).
    pub fn immediate(payload: Vec<u8>, frequency_hz: u32, modulation: Modulation) -> Self {
        Self::build(payload, 0, TxMode::Immediate, frequency_hz, modulation)
    }

    fn build(
        payload: Vec<u8>,
        target_time_us: CounterUs,
        tx_mode: TxMode,
        frequency_hz: u32,
        modulation: Modulation,
    ) -> Self {
        DownlinkPacket {
            id: PACKET_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            target_time_us,
            tx_mode,
            frequency_hz,
            rf_power_dbm: 14,
            modulation,
            payload,
        }
    }

    pub fn with_rf_power(mut self, rf_power_dbm: i8) -> Self {
        self.rf_power_dbm = rf_power_dbm;
        self
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Structural checks a queue applies before accepting the frame.
    pub fn is_well_formed(&self) -> bool {
        !self.payload.is_empty()
            && self.payload.len() <= MAX_PAYLOAD_SIZE
            && self.modulation.is_supported()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_mode() {
        let m = Modulation::lora(9, Bandwidth::Khz125);
        let a = DownlinkPacket::timestamped(vec![1, 2, 3], 42, 869_525_000, m);
        let c = DownlinkPacket::immediate(vec![4], 869_525_000, m);
        assert_eq!(a.tx_mode, TxMode::Timestamped);
        assert_eq!(a.target_time_us, 42);
        assert_eq!(a.payload(), &[1, 2, 3]);
        assert_eq!(c.tx_mode, TxMode::Immediate);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn well_formed_rejects_empty_and_oversized() {
        let m = Modulation::lora(7, Bandwidth::Khz125);
        assert!(!DownlinkPacket::timestamped(vec![], 0, 868_100_000, m).is_well_formed());
        assert!(!DownlinkPacket::timestamped(vec![0; 256], 0, 868_100_000, m).is_well_formed());
        assert!(DownlinkPacket::timestamped(vec![0; 255], 0, 868_100_000, m).is_well_formed());
        let bad_sf = Modulation::lora(13, Bandwidth::Khz125);
        assert!(!DownlinkPacket::timestamped(vec![1], 0, 868_100_000, bad_sf).is_well_formed());
    }

    #[test]
    fn modulation_deserializes_from_tagged_json() {
        let json = r#"{"modulation":"lora","spreading_factor":9,"bandwidth":"125",
            "coding_rate":"4/5","preamble_symbols":8,"implicit_header":false,"crc":false}"#;
        let m: Modulation = serde_json::from_str(json).unwrap();
        assert_eq!(m, Modulation::lora(9, Bandwidth::Khz125));
    }
}

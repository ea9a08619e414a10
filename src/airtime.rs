//! Time-on-air models.
//!
//! The queue needs the on-air duration of every data downlink to derive its post-delay. On a real
//! gateway that number comes from the radio HAL; [`SemtechAirtime`] reproduces the concentrator's
//! LoRa and FSK formulas so the queue can run without one.

use crate::packet::{DownlinkPacket, Modulation};

/// Sync word length used by the concentrator FSK modem, in bytes.
pub const FSK_SYNC_WORD_BYTES: u64 = 3;

/// Source of time-on-air figures for queued frames.
pub trait TimeOnAir: Send + Sync {
    /// On-air duration of `packet` in microseconds.
    fn time_on_air_us(&self, packet: &DownlinkPacket) -> u32;
}

/// Closed-form LoRa/FSK airtime as computed by the concentrator HAL.
#[derive(Debug, Clone, Copy, Default)]
pub struct SemtechAirtime;

impl TimeOnAir for SemtechAirtime {
    fn time_on_air_us(&self, packet: &DownlinkPacket) -> u32 {
        modulation_time_on_air_us(&packet.modulation, packet.len())
    }
}

/// Constant airtime, independent of the frame.
#[derive(Debug, Clone, Copy)]
pub struct FixedAirtime(pub u32);

impl TimeOnAir for FixedAirtime {
    fn time_on_air_us(&self, _packet: &DownlinkPacket) -> u32 {
        self.0
    }
}

/// Whether the modem enables low data rate optimisation for these settings.
pub const fn low_data_rate_optimize(spreading_factor: u8, bandwidth_hz: u32) -> bool {
    (spreading_factor >= 11 && bandwidth_hz == 125_000)
        || (spreading_factor == 12 && bandwidth_hz == 250_000)
}

/// On-air duration of a `payload_len` byte frame, rounded up to the next microsecond.
///
/// LoRa follows the modem formula: preamble plus 4.25 sync symbols, then 8 symbols and
/// `ceil((8*PL - 4*SF + 28 + 16*CRC - 20*IH) / (4*(SF - 2*DE)))` coding blocks of `CR + 4`
/// symbols each. FSK counts preamble, sync word, length byte, payload and CRC at the datarate.
///
/// # Arguments
/// * `modulation` - Radio settings of the frame
/// * `payload_len` - Payload size in bytes
///
/// # Returns
/// The duration in microseconds, saturated at `u32::MAX`. Settings the queue would reject
/// (for example a spreading factor outside 7-12) still produce a value instead of panicking.
pub fn modulation_time_on_air_us(modulation: &Modulation, payload_len: usize) -> u32 {
    let micros = match *modulation {
        Modulation::Lora {
            spreading_factor,
            bandwidth,
            coding_rate,
            preamble_symbols,
            implicit_header,
            crc,
        } => {
            let sf = i64::from(spreading_factor);
            let bw = u64::from(bandwidth.hz());
            let de = i64::from(low_data_rate_optimize(spreading_factor, bandwidth.hz()));

            let numerator = 8 * payload_len as i64 - 4 * sf + 28 + 16 * i64::from(crc)
                - 20 * i64::from(implicit_header);
            // SF0 would make this zero; such frames are rejected before being queued.
            let denominator = (4 * (sf - 2 * de)).max(1);
            let blocks = if numerator > 0 {
                (numerator + denominator - 1) / denominator
            } else {
                0
            };
            let payload_symbols = 8 + blocks as u64 * (u64::from(coding_rate.parity_bits()) + 4);

            // Counted in quarter symbols: the preamble carries 4.25 extra symbols of sync.
            let quarter_symbols = 4 * u64::from(preamble_symbols) + 17 + 4 * payload_symbols;
            let chips_per_symbol = 1u64
                .checked_shl(u32::from(spreading_factor))
                .unwrap_or(u64::MAX);
            let numerator_us = quarter_symbols
                .saturating_mul(chips_per_symbol)
                .saturating_mul(1_000_000);
            numerator_us.div_ceil(4 * bw)
        }
        Modulation::Fsk {
            datarate_bps,
            preamble_bytes,
            crc,
        } => {
            let bytes = u64::from(preamble_bytes)
                + FSK_SYNC_WORD_BYTES
                + 1
                + payload_len as u64
                + if crc { 2 } else { 0 };
            (8 * bytes * 1_000_000).div_ceil(u64::from(datarate_bps.max(1)))
        }
    };
    u32::try_from(micros).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Bandwidth, CodingRate};

    fn lora(sf: u8, bw: Bandwidth, crc: bool) -> Modulation {
        Modulation::Lora {
            spreading_factor: sf,
            bandwidth: bw,
            coding_rate: CodingRate::Cr4_5,
            preamble_symbols: 8,
            implicit_header: false,
            crc,
        }
    }

    #[test]
    fn sf7_reference_values() {
        assert_eq!(
            modulation_time_on_air_us(&lora(7, Bandwidth::Khz125, false), 10),
            36_096
        );
        assert_eq!(
            modulation_time_on_air_us(&lora(7, Bandwidth::Khz125, true), 10),
            41_216
        );
    }

    #[test]
    fn airtime_grows_with_spreading_factor_and_payload() {
        let short = modulation_time_on_air_us(&lora(9, Bandwidth::Khz125, false), 10);
        let long = modulation_time_on_air_us(&lora(9, Bandwidth::Khz125, false), 50);
        let slow = modulation_time_on_air_us(&lora(12, Bandwidth::Khz125, false), 10);
        assert!(long > short);
        assert!(slow > short);
    }

    #[test]
    fn wider_bandwidth_is_faster() {
        let narrow = modulation_time_on_air_us(&lora(9, Bandwidth::Khz125, false), 20);
        let wide = modulation_time_on_air_us(&lora(9, Bandwidth::Khz500, false), 20);
        assert!(wide < narrow);
    }

    #[test]
    fn fsk_counts_framing_bytes() {
        // 5 preamble + 3 sync + 1 length + 10 payload + 2 CRC = 21 bytes at 50 kbps
        assert_eq!(modulation_time_on_air_us(&Modulation::fsk(50_000), 10), 3_360);
    }

    #[test]
    fn low_data_rate_optimisation_thresholds() {
        assert!(low_data_rate_optimize(11, 125_000));
        assert!(low_data_rate_optimize(12, 250_000));
        assert!(!low_data_rate_optimize(11, 250_000));
        assert!(!low_data_rate_optimize(10, 125_000));
    }

    #[test]
    fn out_of_range_spreading_factor_is_total() {
        let sf0 = modulation_time_on_air_us(&lora(0, Bandwidth::Khz125, false), 10);
        assert!(sf0 > 0);
        assert_eq!(
            modulation_time_on_air_us(&lora(70, Bandwidth::Khz125, false), 10),
            u32::MAX
        );
    }
}

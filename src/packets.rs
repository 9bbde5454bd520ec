//! Telemetry wire protocol for the remote display link
//!
//! Each packet is a one-byte opcode followed by a fixed-size payload:
//!
//! | Opcode | Payload |
//! |---|---|
//! | 1 | thermal power [W], `u32` big-endian |
//! | 2 | fuel temperature [°C] `u16` big-endian, water temperature [°C] `u8` |
//!
//! Unrecognised bytes between packets are framing noise and are skipped.

use serde::{Deserialize, Serialize};

use crate::reactor::ReactorEngine;

pub const OPCODE_POWER: u8 = 1;
pub const OPCODE_TEMPERATURES: u8 = 2;

pub const MAX_POWER_WATTS: u32 = 999_999;
pub const MAX_FUEL_TEMPERATURE_CELSIUS: u16 = 999;
pub const MAX_WATER_TEMPERATURE_CELSIUS: u8 = 99;

/// Steps between two telemetry frames
pub const TELEMETRY_PERIOD_STEPS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Packet {
    Power(u32),
    Temperatures { fuel_c: u16, water_c: u8 },
}

impl Packet {
    /// Power packet, clamped to the displayable range
    pub fn power(watts: f64) -> Self {
        Packet::Power(watts.clamp(0.0, MAX_POWER_WATTS as f64) as u32)
    }

    /// Temperature packet, clamped to the displayable ranges
    pub fn temperatures(fuel_celsius: f64, water_celsius: f64) -> Self {
        Packet::Temperatures {
            fuel_c: fuel_celsius.clamp(0.0, MAX_FUEL_TEMPERATURE_CELSIUS as f64) as u16,
            water_c: water_celsius.clamp(0.0, MAX_WATER_TEMPERATURE_CELSIUS as f64) as u8,
        }
    }

    pub fn opcode(&self) -> u8 {
        match self {
            Packet::Power(_) => OPCODE_POWER,
            Packet::Temperatures { .. } => OPCODE_TEMPERATURES,
        }
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.opcode());
        match *self {
            Packet::Power(watts) => out.extend_from_slice(&watts.to_be_bytes()),
            Packet::Temperatures { fuel_c, water_c } => {
                out.extend_from_slice(&fuel_c.to_be_bytes());
                out.push(water_c);
            }
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5);
        self.encode_into(&mut out);
        out
    }
}

fn payload_len(opcode: u8) -> Option<usize> {
    match opcode {
        OPCODE_POWER => Some(4),
        OPCODE_TEMPERATURES => Some(3),
        _ => None,
    }
}

/// Byte-at-a-time decoder that resynchronises on the next known opcode
#[derive(Debug, Clone, Default)]
pub struct PacketDecoder {
    opcode: Option<u8>,
    payload: Vec<u8>,
    discarded: u64,
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes skipped as noise so far
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }

    pub fn push(&mut self, byte: u8) -> Option<Packet> {
        let Some(opcode) = self.opcode else {
            if payload_len(byte).is_some() {
                self.opcode = Some(byte);
                self.payload.clear();
            } else {
                self.discarded += 1;
                log::trace!("discarding framing byte {byte:#04x}");
            }
            return None;
        };

        self.payload.push(byte);
        let expected = payload_len(opcode)?;
        if self.payload.len() < expected {
            return None;
        }

        self.opcode = None;
        let p = &self.payload;
        let packet = match opcode {
            OPCODE_POWER => Packet::Power(u32::from_be_bytes([p[0], p[1], p[2], p[3]])),
            _ => Packet::Temperatures {
                fuel_c: u16::from_be_bytes([p[0], p[1]]),
                water_c: p[2],
            },
        };
        Some(packet)
    }

    pub fn decode_all(&mut self, bytes: &[u8]) -> Vec<Packet> {
        bytes.iter().filter_map(|&byte| self.push(byte)).collect()
    }
}

/// What the remote display currently shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayState {
    pub power_watts: u32,
    pub fuel_temperature_celsius: u16,
    pub water_temperature_celsius: u8,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            power_watts: 0,
            fuel_temperature_celsius: 20,
            water_temperature_celsius: 20,
        }
    }
}

impl DisplayState {
    pub fn apply(&mut self, packet: Packet) {
        match packet {
            Packet::Power(watts) => self.power_watts = watts.min(MAX_POWER_WATTS),
            Packet::Temperatures { fuel_c, water_c } => {
                self.fuel_temperature_celsius = fuel_c.min(MAX_FUEL_TEMPERATURE_CELSIUS);
                self.water_temperature_celsius = water_c.min(MAX_WATER_TEMPERATURE_CELSIUS);
            }
        }
    }
}

/// Power and temperature packets for the engine's current state
pub fn telemetry_frame(engine: &ReactorEngine) -> Vec<u8> {
    let mut frame = Vec::with_capacity(9);
    Packet::power(engine.power_watts()).encode_into(&mut frame);
    Packet::temperatures(
        engine.fuel_temperature_celsius(),
        engine.water_temperature_celsius(),
    )
    .encode_into(&mut frame);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_packet_layout() {
        assert_eq!(
            Packet::Power(0x0001_86A0).encode(),
            vec![OPCODE_POWER, 0x00, 0x01, 0x86, 0xA0]
        );
    }

    #[test]
    fn temperature_packet_layout() {
        let packet = Packet::Temperatures {
            fuel_c: 300,
            water_c: 45,
        };
        assert_eq!(packet.encode(), vec![OPCODE_TEMPERATURES, 0x01, 0x2C, 45]);
    }

    #[test]
    fn constructors_clamp_to_display_ranges() {
        assert_eq!(Packet::power(2.5e6), Packet::Power(999_999));
        assert_eq!(Packet::power(-3.0), Packet::Power(0));
        assert_eq!(Packet::power(f64::NAN), Packet::Power(0));
        assert_eq!(
            Packet::temperatures(1500.0, 120.0),
            Packet::Temperatures {
                fuel_c: 999,
                water_c: 99
            }
        );
        assert_eq!(
            Packet::temperatures(-5.0, 20.7),
            Packet::Temperatures {
                fuel_c: 0,
                water_c: 20
            }
        );
    }

    #[test]
    fn decoder_skips_noise_and_resyncs() {
        let mut bytes = vec![0xFF, 0x00, 0x7E];
        Packet::Power(20_001).encode_into(&mut bytes);
        bytes.push(0x42);
        Packet::temperatures(35.0, 21.0).encode_into(&mut bytes);

        let mut decoder = PacketDecoder::new();
        let packets = decoder.decode_all(&bytes);

        assert_eq!(
            packets,
            vec![
                Packet::Power(20_001),
                Packet::Temperatures {
                    fuel_c: 35,
                    water_c: 21
                }
            ]
        );
        assert_eq!(decoder.discarded_bytes(), 4);
    }

    #[test]
    fn decoder_handles_split_delivery() {
        let bytes = Packet::Power(123_456).encode();
        let mut decoder = PacketDecoder::new();

        assert!(decoder.decode_all(&bytes[..2]).is_empty());
        assert_eq!(decoder.decode_all(&bytes[2..]), vec![Packet::Power(123_456)]);
    }

    #[test]
    fn display_state_follows_packets() {
        let mut display = DisplayState::default();
        assert_eq!(display.power_watts, 0);
        assert_eq!(display.fuel_temperature_celsius, 20);

        display.apply(Packet::Power(5_000));
        display.apply(Packet::Temperatures {
            fuel_c: 61,
            water_c: 22,
        });
        assert_eq!(display.power_watts, 5_000);
        assert_eq!(display.fuel_temperature_celsius, 61);
        assert_eq!(display.water_temperature_celsius, 22);
    }

    #[test]
    fn display_clamps_out_of_range_payloads() {
        let bytes = [OPCODE_POWER, 0xFF, 0xFF, 0xFF, 0xFF, OPCODE_TEMPERATURES, 0xFF, 0xFF, 0xFF];
        let mut display = DisplayState::default();
        for packet in PacketDecoder::new().decode_all(&bytes) {
            display.apply(packet);
        }

        assert_eq!(display.power_watts, MAX_POWER_WATTS);
        assert_eq!(display.fuel_temperature_celsius, MAX_FUEL_TEMPERATURE_CELSIUS);
        assert_eq!(display.water_temperature_celsius, MAX_WATER_TEMPERATURE_CELSIUS);
    }

    #[test]
    fn telemetry_frame_carries_both_packets() {
        let engine = ReactorEngine::new();
        let frame = telemetry_frame(&engine);
        assert_eq!(frame.len(), 9);

        let packets = PacketDecoder::new().decode_all(&frame);
        assert_eq!(
            packets,
            vec![
                Packet::Power(0),
                Packet::Temperatures {
                    fuel_c: 20,
                    water_c: 20
                }
            ]
        );
    }
}

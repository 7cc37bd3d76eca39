//! Wire frame shared between the sensor nodes and the gateway.
//!
//! One broadcast = one fixed 16-byte frame, little-endian integers. Anything
//! that is not exactly 16 bytes is assumed to come from an unrelated sender.

use thiserror::Error;

/// Exact size of a frame on the wire.
pub const FRAME_LEN: usize = 16;

pub const VERSION_LEGACY: u8 = 1;
pub const VERSION_CURRENT: u8 = 2;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unexpected frame size {len}, want {FRAME_LEN}")]
pub struct FrameSizeError {
    pub len: usize,
}

/// Layout:
///
/// | offset | field       | type |
/// |--------|-------------|------|
/// | 0      | version     | u8   |
/// | 1      | slave_id    | u8   |
/// | 2..4   | reserved    |      |
/// | 4      | temperature | u32  | value x100, °C
/// | 8      | humidity    | u32  | value x100, percent
/// | 12     | pressure    | u32  | value x100, hPa
///
/// Reserved bytes are ignored on read and zeroed on write. `slave_id` is only
/// meaningful for `version >= 2`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    pub version: u8,
    pub slave_id: u8,
    pub temperature: u32,
    pub humidity: u32,
    pub pressure: u32,
}

impl Packet {
    pub fn decode(raw: &[u8]) -> Result<Self, FrameSizeError> {
        if raw.len() != FRAME_LEN {
            return Err(FrameSizeError { len: raw.len() });
        }

        Ok(Self {
            version: raw[0],
            slave_id: raw[1],
            temperature: u32::from_le_bytes(raw[4..8].try_into().unwrap()),
            humidity: u32::from_le_bytes(raw[8..12].try_into().unwrap()),
            pressure: u32::from_le_bytes(raw[12..16].try_into().unwrap()),
        })
    }

    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut raw = [0u8; FRAME_LEN];
        raw[0] = self.version;
        raw[1] = self.slave_id;
        raw[4..8].copy_from_slice(&self.temperature.to_le_bytes());
        raw[8..12].copy_from_slice(&self.humidity.to_le_bytes());
        raw[12..16].copy_from_slice(&self.pressure.to_le_bytes());
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let p = Packet {
            version: 2,
            slave_id: 5,
            temperature: 2350,
            humidity: 4512,
            pressure: 101325,
        };
        assert_eq!(Packet::decode(&p.encode()), Ok(p));
    }

    #[test]
    fn round_trip_extremes() {
        for p in [
            Packet::default(),
            Packet {
                version: u8::MAX,
                slave_id: u8::MAX,
                temperature: u32::MAX,
                humidity: u32::MAX,
                pressure: u32::MAX,
            },
        ] {
            assert_eq!(Packet::decode(&p.encode()), Ok(p));
        }
    }

    #[test]
    fn rejects_any_other_size() {
        for len in [0usize, 1, 15, 17, 32, 508] {
            let raw = vec![0u8; len];
            assert_eq!(Packet::decode(&raw), Err(FrameSizeError { len }));
        }
        assert!(Packet::decode(&[0u8; FRAME_LEN]).is_ok());
    }

    #[test]
    fn field_offsets() {
        let mut raw = [0u8; FRAME_LEN];
        raw[0] = 2;
        raw[1] = 9;
        raw[4..8].copy_from_slice(&2354u32.to_le_bytes());
        raw[8..12].copy_from_slice(&5000u32.to_le_bytes());
        raw[12..16].copy_from_slice(&100000u32.to_le_bytes());

        let p = Packet::decode(&raw).unwrap();
        assert_eq!(p.version, 2);
        assert_eq!(p.slave_id, 9);
        assert_eq!(p.temperature, 2354);
        assert_eq!(p.humidity, 5000);
        assert_eq!(p.pressure, 100000);
    }

    #[test]
    fn reserved_bytes_ignored_on_read_zero_on_write() {
        let mut raw = [0u8; FRAME_LEN];
        raw[2] = 0xAA;
        raw[3] = 0x55;
        let p = Packet::decode(&raw).unwrap();
        assert_eq!(p.encode()[2..4], [0, 0]);
    }
}

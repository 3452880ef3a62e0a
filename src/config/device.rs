use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::Location;
use crate::lorawan::region::RegionCode;

/// Error returned when an identifier cannot be parsed from text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: expected {len} hex bytes, got {input:?}")]
pub struct ParseIdError {
    kind: &'static str,
    len: usize,
    input: String,
}

fn parse_hex<const N: usize>(kind: &'static str, input: &str) -> Result<[u8; N], ParseIdError> {
    let err = || ParseIdError {
        kind,
        len: N,
        input: input.to_string(),
    };
    let digits: Vec<u8> = input
        .bytes()
        .filter(|b| !matches!(b, b':' | b'-' | b' '))
        .collect();
    if digits.len() != N * 2 {
        return Err(err());
    }
    let mut out = [0u8; N];
    for (i, pair) in digits.chunks(2).enumerate() {
        let pair = core::str::from_utf8(pair).map_err(|_| err())?;
        out[i] = u8::from_str_radix(pair, 16).map_err(|_| err())?;
    }
    Ok(out)
}

macro_rules! hex_id {
    ($name:ident, $len:literal, $kind:literal) => {
        impl $name {
            /// Build from raw bytes
            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Raw bytes in display order
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for b in &self.0 {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_hex::<$len>($kind, s).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

/// EUI-64 (8 bytes), used for gateway MAC addresses and DevEUIs
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Eui64([u8; 8]);
hex_id!(Eui64, 8, "EUI-64");

impl Eui64 {
    /// The all-zero EUI, never a valid gateway address
    pub const ZERO: Eui64 = Eui64([0; 8]);

    /// Whether every byte is zero
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 8]
    }
}

/// Device Address (4 bytes, big-endian display order)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DevAddr([u8; 4]);
hex_id!(DevAddr, 4, "DevAddr");

impl DevAddr {
    /// Bytes in the order they are transmitted (little-endian)
    pub fn wire_bytes(&self) -> [u8; 4] {
        let mut b = self.0;
        b.reverse();
        b
    }

    /// Parse from the transmitted byte order
    pub fn from_wire(bytes: [u8; 4]) -> Self {
        let mut b = bytes;
        b.reverse();
        Self(b)
    }
}

/// AES-128 key (16 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct AesKey([u8; 16]);
hex_id!(AesKey, 16, "AES key");

/// ABP device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    /// Device EUI (unique device identifier)
    pub dev_eui: Eui64,
    /// Device address
    pub dev_addr: DevAddr,
    /// Network session key
    pub nwk_skey: AesKey,
    /// Application session key
    pub app_skey: AesKey,
    /// Regional parameters the device operates under
    pub region: RegionCode,
    /// Initial uplink data rate
    pub data_rate: u8,
    /// RX1 data rate offset
    #[serde(default)]
    pub rx1_dr_offset: u8,
    /// Position of the device
    #[serde(default)]
    pub location: Location,
    /// Coverage radius in meters; gateways within it hear the device
    pub range: f64,
}

impl DeviceConfig {
    /// Create a new ABP device configuration
    pub fn new_abp(
        dev_eui: Eui64,
        dev_addr: DevAddr,
        nwk_skey: AesKey,
        app_skey: AesKey,
        region: RegionCode,
    ) -> Self {
        Self {
            dev_eui,
            dev_addr,
            nwk_skey,
            app_skey,
            region,
            data_rate: 0,
            rx1_dr_offset: 0,
            location: Location::default(),
            range: 10_000.0,
        }
    }
}

/// Session state for an activated device
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Device address
    pub dev_addr: DevAddr,
    /// Network session key
    pub nwk_skey: AesKey,
    /// Application session key
    pub app_skey: AesKey,
    /// Uplink frame counter
    pub fcnt_up: u32,
    /// Next expected downlink frame counter
    pub fcnt_down: u32,
}

impl SessionState {
    /// Create a new session state for ABP activation
    pub fn new_abp(dev_addr: DevAddr, nwk_skey: AesKey, app_skey: AesKey) -> Self {
        Self {
            dev_addr,
            nwk_skey,
            app_skey,
            fcnt_up: 0,
            fcnt_down: 0,
        }
    }

    /// Increment the uplink frame counter
    pub fn increment_fcnt_up(&mut self) {
        self.fcnt_up = self.fcnt_up.wrapping_add(1);
    }

    /// Rebuild a full 32-bit downlink counter from the 16 bits on air
    pub fn expand_fcnt_down(&self, fcnt16: u16) -> u32 {
        let high = self.fcnt_down & 0xFFFF_0000;
        let candidate = high | u32::from(fcnt16);
        if candidate < self.fcnt_down {
            candidate.wrapping_add(0x1_0000)
        } else {
            candidate
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eui_parses_with_and_without_separators() {
        let a: Eui64 = "01:02:03:04:05:06:07:08".parse().unwrap();
        let b: Eui64 = "0102030405060708".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "0102030405060708");
        assert!("01:02".parse::<Eui64>().is_err());
        assert!("zz02030405060708".parse::<Eui64>().is_err());
    }

    #[test]
    fn dev_addr_wire_order_is_reversed() {
        let addr = DevAddr::new([0x26, 0x01, 0x1b, 0xda]);
        assert_eq!(addr.wire_bytes(), [0xda, 0x1b, 0x01, 0x26]);
        assert_eq!(DevAddr::from_wire(addr.wire_bytes()), addr);
    }

    #[test]
    fn downlink_counter_rolls_over() {
        let mut session = SessionState::new_abp(DevAddr::default(), AesKey::default(), AesKey::default());
        session.fcnt_down = 0x0000_FFFE;
        assert_eq!(session.expand_fcnt_down(0xFFFF), 0x0000_FFFF);
        assert_eq!(session.expand_fcnt_down(0x0001), 0x0001_0001);
    }
}

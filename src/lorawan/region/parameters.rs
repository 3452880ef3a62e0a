use core::fmt;

use super::RegionCode;

/// Modulation family of a data rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modulation {
    /// LoRa chirp spread spectrum
    Lora,
    /// Frequency shift keying
    Fsk,
}

impl fmt::Display for Modulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modulation::Lora => f.write_str("LORA"),
            Modulation::Fsk => f.write_str("FSK"),
        }
    }
}

/// Physical parameters behind a data-rate index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRateSpec {
    /// LoRa spreading factor and bandwidth
    Lora {
        /// Spreading factor (5..=12)
        spreading_factor: u8,
        /// Bandwidth in kHz
        bandwidth_khz: u16,
    },
    /// FSK bit rate
    Fsk {
        /// Bits per second
        bitrate: u32,
    },
}

impl DataRateSpec {
    pub(crate) const fn lora(spreading_factor: u8, bandwidth_khz: u16) -> Self {
        DataRateSpec::Lora {
            spreading_factor,
            bandwidth_khz,
        }
    }

    /// Modulation family
    pub fn modulation(&self) -> Modulation {
        match self {
            DataRateSpec::Lora { .. } => Modulation::Lora,
            DataRateSpec::Fsk { .. } => Modulation::Fsk,
        }
    }
}

/// `SF7BW125` for LoRa, the raw bit rate for FSK
impl fmt::Display for DataRateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataRateSpec::Lora {
                spreading_factor,
                bandwidth_khz,
            } => write!(f, "SF{spreading_factor}BW{bandwidth_khz}"),
            DataRateSpec::Fsk { bitrate } => write!(f, "{bitrate}"),
        }
    }
}

/// Uplink dwell-time restriction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DwellTime {
    /// No restriction
    #[default]
    NoLimit,
    /// 400 ms maximum dwell time
    Limit400ms,
}

/// Maximum payload sizes for a data rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PayloadSize {
    /// Maximum MACPayload length
    pub m: u16,
    /// Maximum application payload length (no FOpts)
    pub n: u16,
}

/// Contiguous data-rate range sharing the same payload limits
#[derive(Debug, Clone, Copy)]
pub struct PayloadTier {
    /// First data rate of the tier
    pub min_dr: u8,
    /// Last data rate of the tier
    pub max_dr: u8,
    /// Limits for the tier
    pub size: PayloadSize,
}

impl PayloadTier {
    pub(crate) const fn new(min_dr: u8, max_dr: u8, m: u16, n: u16) -> Self {
        Self {
            min_dr,
            max_dr,
            size: PayloadSize { m, n },
        }
    }
}

/// Template from which default channels are generated
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelGroup {
    /// Whether the generated channels may carry uplinks
    pub enable_uplink: bool,
    /// Frequency of the first channel in Hz
    pub initial_frequency: u32,
    /// Spacing between consecutive channels in Hz
    pub frequency_offset: u32,
    /// Lowest data rate of the generated channels
    pub min_dr: u8,
    /// Highest data rate of the generated channels
    pub max_dr: u8,
    /// Number of channels the group reserves
    pub count: usize,
}

/// Class B beacon and ping-slot parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassBParameters {
    /// Beacon frequency in Hz
    pub beacon_frequency: u32,
    /// Default ping-slot frequency in Hz
    pub ping_slot_frequency: u32,
    /// Beacon data rate
    pub beacon_dr: u8,
    /// Lowest ping-slot data rate
    pub min_ping_dr: u8,
    /// Highest ping-slot data rate
    pub max_ping_dr: u8,
}

impl ClassBParameters {
    /// Fill the Class B block
    pub const fn new(
        beacon_frequency: u32,
        ping_slot_frequency: u32,
        beacon_dr: u8,
        min_ping_dr: u8,
        max_ping_dr: u8,
    ) -> Self {
        Self {
            beacon_frequency,
            ping_slot_frequency,
            beacon_dr,
            min_ping_dr,
            max_ping_dr,
        }
    }
}

/// Constant table of a region
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    /// Region the table belongs to
    pub code: RegionCode,
    /// Lowest carrier frequency in Hz
    pub min_frequency: u32,
    /// Highest carrier frequency in Hz
    pub max_frequency: u32,
    /// RX2 frequency in Hz
    pub rx2_frequency: u32,
    /// RX2 data rate
    pub rx2_dr: u8,
    /// Lowest data rate
    pub min_dr: u8,
    /// Highest data rate
    pub max_dr: u8,
    /// Lowest RX1 data-rate offset
    pub min_rx1_dr_offset: u8,
    /// Highest RX1 data-rate offset
    pub max_rx1_dr_offset: u8,
    /// Highest TX power index
    pub max_tx_power: u8,
    /// Maximum number of channels the plan can define
    pub max_channels: usize,
    /// Default channel templates
    pub groups: Vec<ChannelGroup>,
    /// Class B parameters
    pub class_b: ClassBParameters,
}

impl Parameters {
    /// Total number of default channels across every group
    pub fn reserved_channels(&self) -> usize {
        self.groups.iter().map(|g| g.count).sum()
    }
}

/// Payload limits shared by EU868, EU433, RU864 and EuFsk
pub(crate) const EU_PAYLOAD: &[PayloadTier] = &[
    PayloadTier::new(0, 2, 59, 51),
    PayloadTier::new(3, 3, 123, 115),
    PayloadTier::new(4, 7, 230, 222),
];

/// CN779 payload limits
pub(crate) const CN_PAYLOAD: &[PayloadTier] = &[
    PayloadTier::new(0, 2, 59, 51),
    PayloadTier::new(3, 3, 123, 115),
    PayloadTier::new(4, 7, 250, 242),
];

/// KR920 payload limits
pub(crate) const KR_PAYLOAD: &[PayloadTier] = &[
    PayloadTier::new(0, 2, 59, 51),
    PayloadTier::new(3, 3, 123, 115),
    PayloadTier::new(4, 5, 230, 222),
];

/// Data rates shared by every LoRa/FSK plan except Ql256
pub(crate) fn standard_data_rate(dr: u8) -> Option<DataRateSpec> {
    match dr {
        0..=5 => Some(DataRateSpec::lora(12 - dr, 125)),
        6 => Some(DataRateSpec::lora(7, 250)),
        7 => Some(DataRateSpec::Fsk { bitrate: 50_000 }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_rate_strings() {
        assert_eq!(standard_data_rate(0).map(|d| d.to_string()).as_deref(), Some("SF12BW125"));
        assert_eq!(standard_data_rate(6).map(|d| d.to_string()).as_deref(), Some("SF7BW250"));
        let fsk = standard_data_rate(7).unwrap();
        assert_eq!(fsk.to_string(), "50000");
        assert_eq!(fsk.modulation().to_string(), "FSK");
        assert!(standard_data_rate(8).is_none());
    }
}

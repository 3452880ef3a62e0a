//! Regional parameters
//!
//! Each supported region is a struct holding its constant [`Parameters`]
//! table. The [`RegionalParameters`] trait supplies every derived
//! computation (range checks, channel generation, payload limits, RX1
//! setup, LinkADRReq) as default methods over that table, so a region only
//! states its constants. [`Region`] is the closed set of variants used by
//! the rest of the crate.

use core::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::timing::{ReceiveDelays, ReceiveWindow, ReceiveWindows};

mod adr;
mod as923;
mod channel;
mod cn779;
mod eu433;
mod eu868;
mod eu_fsk;
mod kr920;
mod parameters;
mod ql256;
mod ru864;

pub use adr::{link_adr_req, LinkAdrAns, LinkAdrOutcome, LinkAdrReq, CNTL_ENABLE_ALL, KEEP_CURRENT};
pub use as923::As923;
pub use channel::Channel;
pub use cn779::Cn779;
pub use eu433::Eu433;
pub use eu868::Eu868;
pub use eu_fsk::EuFsk;
pub use kr920::Kr920;
pub use parameters::{
    ChannelGroup, ClassBParameters, DataRateSpec, DwellTime, Modulation, Parameters, PayloadSize,
    PayloadTier,
};
pub use ql256::Ql256;
pub use ru864::Ru864;

/// Region identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RegionCode {
    /// EU 863-870 MHz
    Eu868,
    /// EU 433 MHz
    Eu433,
    /// China 779-787 MHz
    Cn779,
    /// Russia 864-870 MHz
    Ru864,
    /// South Korea 920-923 MHz
    Kr920,
    /// Asia 923 MHz
    As923,
    /// EU 863-870 MHz with FSK
    EuFsk,
    /// Narrowband 256 MHz plan
    Ql256,
}

impl RegionCode {
    /// Every supported region
    pub const ALL: [RegionCode; 8] = [
        RegionCode::Eu868,
        RegionCode::Eu433,
        RegionCode::Cn779,
        RegionCode::Ru864,
        RegionCode::Kr920,
        RegionCode::As923,
        RegionCode::EuFsk,
        RegionCode::Ql256,
    ];
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegionCode::Eu868 => "EU868",
            RegionCode::Eu433 => "EU433",
            RegionCode::Cn779 => "CN779",
            RegionCode::Ru864 => "RU864",
            RegionCode::Kr920 => "KR920",
            RegionCode::As923 => "AS923",
            RegionCode::EuFsk => "EUFSK",
            RegionCode::Ql256 => "QL256",
        };
        f.write_str(name)
    }
}

/// Regional parameter validation failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegionError {
    /// Carrier frequency outside the plan
    #[error("frequency {0} Hz not supported")]
    FrequencyNotSupported(u32),
    /// Data-rate index outside the plan
    #[error("invalid data rate DR{0}")]
    InvalidDataRate(u8),
    /// RX1 data-rate offset outside the plan
    #[error("invalid RX1 data rate offset {0}")]
    InvalidRx1DrOffset(u8),
    /// TX power index outside the plan
    #[error("invalid TX power index {0}")]
    InvalidTxPower(u8),
    /// ChMaskCntl value reserved in this region
    #[error("reserved ChMaskCntl value {0}")]
    ReservedChMaskCntl(u8),
    /// Channel mask enables a channel that is not defined
    #[error("channel {0} is not defined")]
    UndefinedChannel(usize),
    /// Channel mask disables every channel
    #[error("channel mask disables every channel")]
    NoChannelEnabled,
    /// No enabled channel supports the data rate
    #[error("no enabled channel supports DR{0}")]
    DataRateNotAllowed(u8),
}

fn in_range<T: PartialOrd>(value: T, min: T, max: T) -> bool {
    value >= min && value <= max
}

/// Capabilities of a region variant
pub trait RegionalParameters {
    /// (Re)fill the constant table
    fn setup(&mut self);

    /// The constant table
    fn parameters(&self) -> &Parameters;

    /// Payload tiers for the given dwell-time setting
    fn payload_table(&self, dwell_time: DwellTime) -> &'static [PayloadTier];

    /// Region identifier
    fn code(&self) -> RegionCode {
        self.parameters().code
    }

    /// Physical parameters of a data-rate index, `None` when undefined
    fn data_rate(&self, dr: u8) -> Option<DataRateSpec> {
        let p = self.parameters();
        if in_range(dr, p.min_dr, p.max_dr) {
            parameters::standard_data_rate(dr)
        } else {
            None
        }
    }

    /// LoRa coding rate for a data rate; FSK has none
    fn coding_rate(&self, dr: u8) -> Option<&'static str> {
        match self.data_rate(dr)? {
            DataRateSpec::Lora { .. } => Some("4/5"),
            DataRateSpec::Fsk { .. } => None,
        }
    }

    /// Check a carrier frequency against the plan bounds
    fn frequency_supported(&self, frequency: u32) -> Result<(), RegionError> {
        let p = self.parameters();
        if in_range(frequency, p.min_frequency, p.max_frequency) {
            Ok(())
        } else {
            Err(RegionError::FrequencyNotSupported(frequency))
        }
    }

    /// Check a data-rate index against the plan bounds
    fn data_rate_supported(&self, dr: u8) -> Result<(), RegionError> {
        let p = self.parameters();
        if in_range(dr, p.min_dr, p.max_dr) {
            Ok(())
        } else {
            Err(RegionError::InvalidDataRate(dr))
        }
    }

    /// Check an RX1 data-rate offset against the plan bounds
    fn rx1_dr_offset_supported(&self, offset: u8) -> Result<(), RegionError> {
        let p = self.parameters();
        if in_range(offset, p.min_rx1_dr_offset, p.max_rx1_dr_offset) {
            Ok(())
        } else {
            Err(RegionError::InvalidRx1DrOffset(offset))
        }
    }

    /// Check a TX power index against the plan bounds
    fn tx_power_supported(&self, power: u8) -> Result<(), RegionError> {
        if power <= self.parameters().max_tx_power {
            Ok(())
        } else {
            Err(RegionError::InvalidTxPower(power))
        }
    }

    /// Default channel table
    fn channels(&self) -> Vec<Channel> {
        channel::from_groups(&self.parameters().groups)
    }

    /// Payload limits for a data rate, zero when undefined
    fn payload_size(&self, dr: u8, dwell_time: DwellTime) -> PayloadSize {
        self.payload_table(dwell_time)
            .iter()
            .find(|t| in_range(dr, t.min_dr, t.max_dr))
            .map(|t| t.size)
            .unwrap_or_default()
    }

    /// RX1 data rate and channel for an uplink
    fn setup_rx1(
        &self,
        dr: u8,
        rx1_dr_offset: u8,
        channel_index: usize,
        _dwell_time: DwellTime,
    ) -> (u8, usize) {
        (dr.saturating_sub(rx1_dr_offset), channel_index)
    }

    /// Data rate string and channel for an informational uplink
    ///
    /// An index outside the default channels is replaced with a random one.
    fn setup_info_request(&self, channel_index: usize) -> (String, usize) {
        let p = self.parameters();
        let reserved = p.reserved_channels();
        let index = if channel_index >= reserved && reserved > 0 {
            rand::thread_rng().gen_range(0..reserved)
        } else {
            channel_index
        };
        let datarate = p
            .groups
            .first()
            .and_then(|g| self.data_rate(g.max_dr))
            .map(|d| d.to_string())
            .unwrap_or_default();
        (datarate, index)
    }

    /// Class B beacon frequency
    fn frequency_beacon(&self) -> u32 {
        self.parameters().class_b.beacon_frequency
    }

    /// Class B beacon data rate
    fn data_rate_beacon(&self) -> u8 {
        self.parameters().class_b.beacon_dr
    }

    /// Default Class B ping-slot frequency
    fn frequency_ping_slot(&self) -> u32 {
        self.parameters().class_b.ping_slot_frequency
    }

    /// RX1 and RX2 windows following an uplink on `channel_index`
    fn receive_windows(
        &self,
        channels: &[Channel],
        channel_index: usize,
        dr: u8,
        rx1_dr_offset: u8,
        dwell_time: DwellTime,
        delays: &ReceiveDelays,
    ) -> Result<ReceiveWindows, RegionError> {
        let (rx1_dr, rx1_channel) = self.setup_rx1(dr, rx1_dr_offset, channel_index, dwell_time);
        let channel = channels
            .get(rx1_channel)
            .ok_or(RegionError::UndefinedChannel(rx1_channel))?;
        let p = self.parameters();
        Ok(ReceiveWindows {
            rx1: ReceiveWindow {
                frequency: channel.frequency_downlink,
                data_rate: rx1_dr,
                delay: delays.rx1,
            },
            rx2: ReceiveWindow {
                frequency: p.rx2_frequency,
                data_rate: p.rx2_dr,
                delay: delays.rx2,
            },
        })
    }

    /// Evaluate a LinkADRReq, mutating `channels` only if it is accepted
    fn link_adr_req(&self, req: &LinkAdrReq, channels: &mut [Channel]) -> LinkAdrOutcome {
        adr::link_adr_req(self, req, channels)
    }
}

/// One of the supported regions
#[derive(Debug, Clone)]
pub enum Region {
    /// EU 863-870 MHz
    Eu868(Eu868),
    /// EU 433 MHz
    Eu433(Eu433),
    /// China 779-787 MHz
    Cn779(Cn779),
    /// Russia 864-870 MHz
    Ru864(Ru864),
    /// South Korea 920-923 MHz
    Kr920(Kr920),
    /// Asia 923 MHz
    As923(As923),
    /// EU 863-870 MHz with FSK
    EuFsk(EuFsk),
    /// Narrowband 256 MHz plan
    Ql256(Ql256),
}

impl Region {
    /// Build the region for `code` with its table filled
    pub fn new(code: RegionCode) -> Self {
        match code {
            RegionCode::Eu868 => Region::Eu868(Eu868::new()),
            RegionCode::Eu433 => Region::Eu433(Eu433::new()),
            RegionCode::Cn779 => Region::Cn779(Cn779::new()),
            RegionCode::Ru864 => Region::Ru864(Ru864::new()),
            RegionCode::Kr920 => Region::Kr920(Kr920::new()),
            RegionCode::As923 => Region::As923(As923::new()),
            RegionCode::EuFsk => Region::EuFsk(EuFsk::new()),
            RegionCode::Ql256 => Region::Ql256(Ql256::new()),
        }
    }

    fn inner(&self) -> &dyn RegionalParameters {
        match self {
            Region::Eu868(r) => r,
            Region::Eu433(r) => r,
            Region::Cn779(r) => r,
            Region::Ru864(r) => r,
            Region::Kr920(r) => r,
            Region::As923(r) => r,
            Region::EuFsk(r) => r,
            Region::Ql256(r) => r,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn RegionalParameters {
        match self {
            Region::Eu868(r) => r,
            Region::Eu433(r) => r,
            Region::Cn779(r) => r,
            Region::Ru864(r) => r,
            Region::Kr920(r) => r,
            Region::As923(r) => r,
            Region::EuFsk(r) => r,
            Region::Ql256(r) => r,
        }
    }
}

impl From<RegionCode> for Region {
    fn from(code: RegionCode) -> Self {
        Region::new(code)
    }
}

impl RegionalParameters for Region {
    fn setup(&mut self) {
        self.inner_mut().setup()
    }

    fn parameters(&self) -> &Parameters {
        self.inner().parameters()
    }

    fn payload_table(&self, dwell_time: DwellTime) -> &'static [PayloadTier] {
        self.inner().payload_table(dwell_time)
    }

    fn data_rate(&self, dr: u8) -> Option<DataRateSpec> {
        self.inner().data_rate(dr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_code_builds_its_own_table() {
        for code in RegionCode::ALL {
            let region = Region::new(code);
            assert_eq!(region.code(), code);
            let p = region.parameters();
            assert!(p.min_frequency < p.max_frequency);
            assert!(region.frequency_supported(p.rx2_frequency).is_ok(), "{code}");
            for ch in region.channels() {
                assert!(region.frequency_supported(ch.frequency_uplink).is_ok(), "{code}");
                assert!(ch.max_dr <= p.max_dr && ch.min_dr >= p.min_dr, "{code}");
            }
        }
    }

    #[test]
    fn info_request_replaces_out_of_range_index() {
        let region = Region::new(RegionCode::Eu868);
        assert_eq!(region.setup_info_request(1), ("SF7BW125".to_string(), 1));
        let (_, index) = region.setup_info_request(42);
        assert!(index < 3);
    }

    #[test]
    fn code_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&RegionCode::EuFsk).unwrap(), "\"EUFSK\"");
    }
}

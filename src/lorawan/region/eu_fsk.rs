//! EU 863-870 MHz plan exposing the FSK data rate

use super::parameters::{PayloadTier, EU_PAYLOAD};
use super::{ChannelGroup, ClassBParameters, DwellTime, Parameters, RegionCode, RegionalParameters};

/// EU 863-870 MHz with DR7 (FSK 50 kbps) available to devices
#[derive(Debug, Clone, PartialEq)]
pub struct EuFsk {
    params: Parameters,
}

impl EuFsk {
    /// Build the region with its table filled
    pub fn new() -> Self {
        Self {
            params: Self::table(),
        }
    }

    fn table() -> Parameters {
        Parameters {
            code: RegionCode::EuFsk,
            min_frequency: 863_000_000,
            max_frequency: 870_000_000,
            rx2_frequency: 869_525_000,
            rx2_dr: 0,
            min_dr: 0,
            max_dr: 7,
            min_rx1_dr_offset: 0,
            max_rx1_dr_offset: 5,
            max_tx_power: 7,
            max_channels: 16,
            groups: vec![ChannelGroup {
                enable_uplink: true,
                initial_frequency: 868_100_000,
                frequency_offset: 200_000,
                min_dr: 0,
                max_dr: 5,
                count: 3,
            }],
            class_b: ClassBParameters::new(869_525_000, 869_525_000, 3, 0, 7),
        }
    }
}

impl Default for EuFsk {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionalParameters for EuFsk {
    fn setup(&mut self) {
        self.params = Self::table();
    }

    fn parameters(&self) -> &Parameters {
        &self.params
    }

    fn payload_table(&self, _dwell_time: DwellTime) -> &'static [PayloadTier] {
        EU_PAYLOAD
    }
}

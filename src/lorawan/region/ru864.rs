//! Russia 864-870 MHz

use super::parameters::EU_PAYLOAD;
use super::{
    ChannelGroup, ClassBParameters, DwellTime, Parameters, PayloadTier, RegionCode, RegionalParameters,
};

/// Russia 864-870 MHz regional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Ru864 {
    params: Parameters,
}

impl Ru864 {
    /// Build the region with its table filled
    pub fn new() -> Self {
        Self {
            params: Self::table(),
        }
    }

    fn table() -> Parameters {
        Parameters {
            code: RegionCode::Ru864,
            min_frequency: 864_000_000,
            max_frequency: 870_000_000,
            rx2_frequency: 869_100_000,
            rx2_dr: 0,
            min_dr: 0,
            max_dr: 7,
            min_rx1_dr_offset: 0,
            max_rx1_dr_offset: 5,
            max_tx_power: 7,
            max_channels: 16,
            groups: vec![ChannelGroup {
                enable_uplink: true,
                initial_frequency: 868_900_000,
                frequency_offset: 200_000,
                min_dr: 0,
                max_dr: 5,
                count: 2,
            }],
            class_b: ClassBParameters::new(869_100_000, 868_900_000, 3, 0, 7),
        }
    }
}

impl Default for Ru864 {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionalParameters for Ru864 {
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

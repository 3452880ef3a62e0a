//! South Korea 920-923 MHz

use super::parameters::KR_PAYLOAD;
use super::{
    ChannelGroup, ClassBParameters, DwellTime, Parameters, PayloadTier, RegionCode, RegionalParameters,
};

/// South Korea 920-923 MHz regional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Kr920 {
    params: Parameters,
}

impl Kr920 {
    /// Build the region with its table filled
    pub fn new() -> Self {
        Self {
            params: Self::table(),
        }
    }

    fn table() -> Parameters {
        Parameters {
            code: RegionCode::Kr920,
            min_frequency: 920_900_000,
            max_frequency: 923_300_000,
            rx2_frequency: 921_900_000,
            rx2_dr: 0,
            min_dr: 0,
            max_dr: 5,
            min_rx1_dr_offset: 0,
            max_rx1_dr_offset: 5,
            max_tx_power: 7,
            max_channels: 16,
            groups: vec![ChannelGroup {
                enable_uplink: true,
                initial_frequency: 922_100_000,
                frequency_offset: 200_000,
                min_dr: 0,
                max_dr: 5,
                count: 3,
            }],
            class_b: ClassBParameters::new(923_100_000, 923_100_000, 3, 0, 5),
        }
    }
}

impl Default for Kr920 {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionalParameters for Kr920 {
    fn setup(&mut self) {
        self.params = Self::table();
    }

    fn parameters(&self) -> &Parameters {
        &self.params
    }

    fn payload_table(&self, _dwell_time: DwellTime) -> &'static [PayloadTier] {
        KR_PAYLOAD
    }
}

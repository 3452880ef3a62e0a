//! China 779-787 MHz

use super::parameters::CN_PAYLOAD;
use super::{
    ChannelGroup, ClassBParameters, DwellTime, Parameters, PayloadTier, RegionCode, RegionalParameters,
};

/// China 779-787 MHz regional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Cn779 {
    params: Parameters,
}

impl Cn779 {
    /// Build the region with its table filled
    pub fn new() -> Self {
        Self {
            params: Self::table(),
        }
    }

    fn table() -> Parameters {
        Parameters {
            code: RegionCode::Cn779,
            min_frequency: 779_500_000,
            max_frequency: 786_500_000,
            rx2_frequency: 786_000_000,
            rx2_dr: 0,
            min_dr: 0,
            max_dr: 7,
            min_rx1_dr_offset: 0,
            max_rx1_dr_offset: 5,
            max_tx_power: 5,
            max_channels: 16,
            groups: vec![ChannelGroup {
                enable_uplink: true,
                initial_frequency: 779_500_000,
                frequency_offset: 200_000,
                min_dr: 0,
                max_dr: 5,
                count: 3,
            }],
            class_b: ClassBParameters::new(785_000_000, 785_000_000, 3, 0, 7),
        }
    }
}

impl Default for Cn779 {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionalParameters for Cn779 {
    fn setup(&mut self) {
        self.params = Self::table();
    }

    fn parameters(&self) -> &Parameters {
        &self.params
    }

    fn payload_table(&self, _dwell_time: DwellTime) -> &'static [PayloadTier] {
        CN_PAYLOAD
    }
}

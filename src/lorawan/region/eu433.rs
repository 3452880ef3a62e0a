//! EU 433 MHz

use super::parameters::EU_PAYLOAD;
use super::{
    ChannelGroup, ClassBParameters, DwellTime, Parameters, PayloadTier, RegionCode, RegionalParameters,
};

/// EU 433 MHz regional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Eu433 {
    params: Parameters,
}

impl Eu433 {
    /// Build the region with its table filled
    pub fn new() -> Self {
        Self {
            params: Self::table(),
        }
    }

    fn table() -> Parameters {
        Parameters {
            code: RegionCode::Eu433,
            min_frequency: 433_175_000,
            max_frequency: 434_665_000,
            rx2_frequency: 434_665_000,
            rx2_dr: 0,
            min_dr: 0,
            max_dr: 7,
            min_rx1_dr_offset: 0,
            max_rx1_dr_offset: 5,
            max_tx_power: 5,
            max_channels: 16,
            groups: vec![ChannelGroup {
                enable_uplink: true,
                initial_frequency: 433_175_000,
                frequency_offset: 200_000,
                min_dr: 0,
                max_dr: 5,
                count: 3,
            }],
            class_b: ClassBParameters::new(434_665_000, 434_665_000, 3, 0, 7),
        }
    }
}

impl Default for Eu433 {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionalParameters for Eu433 {
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

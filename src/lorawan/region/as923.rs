//! Asia 923 MHz
//!
//! The only plan here with an uplink dwell-time limit: when it is on, the
//! slowest data rates cannot carry a frame and the payload table shrinks.

use super::parameters::PayloadTier;
use super::{ChannelGroup, ClassBParameters, DwellTime, Parameters, RegionCode, RegionalParameters};

const PAYLOAD_NO_DWELL: &[PayloadTier] = &[
    PayloadTier::new(0, 2, 59, 51),
    PayloadTier::new(3, 3, 123, 115),
    PayloadTier::new(4, 7, 250, 242),
];

const PAYLOAD_DWELL_400MS: &[PayloadTier] = &[
    PayloadTier::new(2, 2, 19, 11),
    PayloadTier::new(3, 3, 61, 53),
    PayloadTier::new(4, 4, 133, 125),
    PayloadTier::new(5, 7, 250, 242),
];

/// Asia 923 MHz regional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct As923 {
    params: Parameters,
}

impl As923 {
    /// Build the region with its table filled
    pub fn new() -> Self {
        Self {
            params: Self::table(),
        }
    }

    fn table() -> Parameters {
        Parameters {
            code: RegionCode::As923,
            min_frequency: 915_000_000,
            max_frequency: 928_000_000,
            rx2_frequency: 923_200_000,
            rx2_dr: 2,
            min_dr: 0,
            max_dr: 7,
            min_rx1_dr_offset: 0,
            max_rx1_dr_offset: 5,
            max_tx_power: 7,
            max_channels: 16,
            groups: vec![ChannelGroup {
                enable_uplink: true,
                initial_frequency: 923_200_000,
                frequency_offset: 200_000,
                min_dr: 0,
                max_dr: 5,
                count: 2,
            }],
            class_b: ClassBParameters::new(923_400_000, 923_400_000, 3, 0, 7),
        }
    }
}

impl Default for As923 {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionalParameters for As923 {
    fn setup(&mut self) {
        self.params = Self::table();
    }

    fn parameters(&self) -> &Parameters {
        &self.params
    }

    fn payload_table(&self, dwell_time: DwellTime) -> &'static [PayloadTier] {
        match dwell_time {
            DwellTime::NoLimit => PAYLOAD_NO_DWELL,
            DwellTime::Limit400ms => PAYLOAD_DWELL_400MS,
        }
    }
}

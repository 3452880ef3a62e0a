//! Narrowband 256 MHz plan
//!
//! A single LoRa data rate (DR7, SF5 at 125 kHz) and no RX1 offset.

use super::parameters::{DataRateSpec, PayloadTier};
use super::{ChannelGroup, ClassBParameters, DwellTime, Parameters, RegionCode, RegionalParameters};

const PAYLOAD: &[PayloadTier] = &[PayloadTier::new(7, 7, 230, 222)];

/// Ql256 regional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Ql256 {
    params: Parameters,
}

impl Ql256 {
    /// Build the region with its table filled
    pub fn new() -> Self {
        Self {
            params: Self::table(),
        }
    }

    fn table() -> Parameters {
        Parameters {
            code: RegionCode::Ql256,
            min_frequency: 256_100_000,
            max_frequency: 257_500_000,
            rx2_frequency: 256_700_000,
            rx2_dr: 7,
            min_dr: 7,
            max_dr: 7,
            min_rx1_dr_offset: 0,
            max_rx1_dr_offset: 0,
            max_tx_power: 7,
            max_channels: 16,
            groups: vec![ChannelGroup {
                enable_uplink: true,
                initial_frequency: 256_100_000,
                frequency_offset: 200_000,
                min_dr: 7,
                max_dr: 7,
                count: 3,
            }],
            // DR7 is the only defined rate, so beacons use it instead of the usual DR3
            class_b: ClassBParameters::new(256_700_000, 256_700_000, 7, 7, 7),
        }
    }
}

impl Default for Ql256 {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionalParameters for Ql256 {
    fn setup(&mut self) {
        self.params = Self::table();
    }

    fn parameters(&self) -> &Parameters {
        &self.params
    }

    fn payload_table(&self, _dwell_time: DwellTime) -> &'static [PayloadTier] {
        PAYLOAD
    }

    fn data_rate(&self, dr: u8) -> Option<DataRateSpec> {
        (dr == 7).then_some(DataRateSpec::lora(5, 125))
    }
}

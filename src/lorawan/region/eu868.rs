//! EU 863-870 MHz

use super::parameters::EU_PAYLOAD;
use super::{
    ChannelGroup, ClassBParameters, DwellTime, Parameters, PayloadTier, RegionCode, RegionalParameters,
};

/// EU 863-870 MHz regional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Eu868 {
    params: Parameters,
}

impl Eu868 {
    /// Build the region with its table filled
    pub fn new() -> Self {
        Self {
            params: Self::table(),
        }
    }

    fn table() -> Parameters {
        Parameters {
            code: RegionCode::Eu868,
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

impl Default for Eu868 {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionalParameters for Eu868 {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_bounds_are_inclusive() {
        let region = Eu868::new();
        assert!(region.frequency_supported(862_000_000).is_err());
        assert!(region.frequency_supported(868_100_000).is_ok());
        assert!(region.frequency_supported(863_000_000).is_ok());
        assert!(region.frequency_supported(870_000_000).is_ok());
        assert!(region.frequency_supported(870_000_001).is_err());
    }

    #[test]
    fn default_channels() {
        let freqs: Vec<u32> = Eu868::new().channels().iter().map(|c| c.frequency_uplink).collect();
        assert_eq!(freqs, [868_100_000, 868_300_000, 868_500_000]);
    }
}

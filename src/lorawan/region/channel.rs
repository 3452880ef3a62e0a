use serde::{Deserialize, Serialize};

use super::parameters::ChannelGroup;

/// A device channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    /// Enabled by the current channel mask
    pub active: bool,
    /// May carry uplinks
    pub enable_uplink: bool,
    /// Uplink frequency in Hz
    pub frequency_uplink: u32,
    /// Downlink (RX1) frequency in Hz
    pub frequency_downlink: u32,
    /// Lowest data rate
    pub min_dr: u8,
    /// Highest data rate
    pub max_dr: u8,
}

impl Channel {
    /// Whether `dr` lies in the channel's data-rate range
    pub fn supports(&self, dr: u8) -> bool {
        (self.min_dr..=self.max_dr).contains(&dr)
    }

    /// Whether the slot holds a channel; a zero frequency marks an empty slot
    pub fn is_defined(&self) -> bool {
        self.frequency_uplink != 0
    }

    /// Whether the channel can currently carry an uplink at `dr`
    pub fn usable_for_uplink(&self, dr: u8) -> bool {
        self.active && self.enable_uplink && self.supports(dr)
    }
}

/// Generate the default channel table from group templates
///
/// Channel *i* of a group sits at `initial + offset * i`. Channels start
/// active with identical uplink and downlink frequencies.
pub fn from_groups(groups: &[ChannelGroup]) -> Vec<Channel> {
    groups
        .iter()
        .flat_map(|g| {
            (0..g.count).map(move |i| {
                let frequency = g.initial_frequency + g.frequency_offset * i as u32;
                Channel {
                    active: true,
                    enable_uplink: g.enable_uplink,
                    frequency_uplink: frequency,
                    frequency_downlink: frequency,
                    min_dr: g.min_dr,
                    max_dr: g.max_dr,
                }
            })
        })
        .collect()
}

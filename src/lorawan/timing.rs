//! Receive-window and Class B beacon timing
//!
//! Receive delays follow LoRaWAN 1.0.x defaults. Beacon times are counted in
//! GPS seconds; a beacon is sent every [`BEACON_PERIOD`] seconds, aligned on
//! multiples of the period since the GPS epoch.

use std::time::Duration;

/// Beacon period in seconds
pub const BEACON_PERIOD: u64 = 128;

/// Time reserved for the beacon at the start of each period
pub const BEACON_RESERVED: Duration = Duration::from_millis(2_120);

/// Guard time before the next beacon
pub const BEACON_GUARD: Duration = Duration::from_secs(3);

/// Span available to ping slots within a beacon period
pub const BEACON_WINDOW: Duration = Duration::from_millis(122_880);

/// Seconds between the Unix epoch and the GPS epoch (1980-01-06)
pub const GPS_EPOCH_OFFSET: u64 = 315_964_800;

/// Leap seconds GPS time is ahead of UTC
pub const GPS_LEAP_SECONDS: u64 = 18;

/// Delays between the end of an uplink and the receive windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveDelays {
    /// RX1 delay after a data uplink
    pub rx1: Duration,
    /// RX2 delay after a data uplink
    pub rx2: Duration,
    /// RX1 delay after a join request
    pub join_accept1: Duration,
    /// RX2 delay after a join request
    pub join_accept2: Duration,
}

impl Default for ReceiveDelays {
    fn default() -> Self {
        Self {
            rx1: Duration::from_secs(1),
            rx2: Duration::from_secs(2),
            join_accept1: Duration::from_secs(5),
            join_accept2: Duration::from_secs(6),
        }
    }
}

impl ReceiveDelays {
    /// Delays after an RXTimingSetupReq; a delay of 0 means 1 second
    pub fn with_rx1_delay(self, seconds: u8) -> Self {
        let rx1 = Duration::from_secs(u64::from(seconds.clamp(1, 15)));
        Self {
            rx1,
            rx2: rx1 + Duration::from_secs(1),
            ..self
        }
    }
}

/// One receive window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveWindow {
    /// Frequency in Hz
    pub frequency: u32,
    /// Data rate index
    pub data_rate: u8,
    /// Opening delay after the uplink
    pub delay: Duration,
}

/// Both Class A receive windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveWindows {
    /// First window, derived from the uplink channel
    pub rx1: ReceiveWindow,
    /// Second window, fixed by the region
    pub rx2: ReceiveWindow,
}

/// Convert a Unix timestamp to GPS seconds
pub fn unix_to_gps(unix_seconds: u64) -> u64 {
    unix_seconds.saturating_sub(GPS_EPOCH_OFFSET) + GPS_LEAP_SECONDS
}

/// GPS time of the first beacon strictly after `gps_seconds`
pub fn next_beacon_time(gps_seconds: u64) -> u64 {
    (gps_seconds / BEACON_PERIOD + 1) * BEACON_PERIOD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beacon_alignment() {
        assert_eq!(next_beacon_time(0), 128);
        assert_eq!(next_beacon_time(127), 128);
        assert_eq!(next_beacon_time(128), 256);
        assert_eq!(BEACON_RESERVED + BEACON_WINDOW + BEACON_GUARD, Duration::from_secs(128));
    }

    #[test]
    fn gps_conversion() {
        assert_eq!(unix_to_gps(GPS_EPOCH_OFFSET), GPS_LEAP_SECONDS);
    }

    #[test]
    fn rx_timing_setup() {
        let delays = ReceiveDelays::default().with_rx1_delay(0);
        assert_eq!(delays.rx1, Duration::from_secs(1));
        let delays = ReceiveDelays::default().with_rx1_delay(3);
        assert_eq!(delays.rx2, Duration::from_secs(4));
    }
}

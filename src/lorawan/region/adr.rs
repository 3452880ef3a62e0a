//! LinkADRReq channel-mask algorithm
//!
//! The algorithm is shared by every region: a candidate mask is computed
//! from the current channel table, then validated together with the
//! requested data rate and TX power. The table is only written back when
//! the channel mask, data rate and power are all acknowledged.

use tracing::debug;

use super::{Channel, RegionError, RegionalParameters};

/// `DataRate` / `TXPower` value meaning "keep the current setting"
pub const KEEP_CURRENT: u8 = 0x0F;

/// ChMaskCntl value enabling every defined channel
pub const CNTL_ENABLE_ALL: u8 = 6;

/// Decoded LinkADRReq
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkAdrReq {
    /// Requested data rate, or [`KEEP_CURRENT`]
    pub data_rate: u8,
    /// Requested TX power index, or [`KEEP_CURRENT`]
    pub tx_power: u8,
    /// Channel mask for the block selected by `ch_mask_cntl`
    pub ch_mask: u16,
    /// Channel mask control
    pub ch_mask_cntl: u8,
    /// Number of transmissions per uplink (0 keeps the current value)
    pub nb_trans: u8,
}

/// LinkADRAns status bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkAdrAns {
    /// TX power accepted
    pub power_ack: bool,
    /// Data rate accepted
    pub data_rate_ack: bool,
    /// Channel mask accepted
    pub channel_mask_ack: bool,
}

impl LinkAdrAns {
    /// Whether every field was acknowledged
    pub fn all(&self) -> bool {
        self.power_ack && self.data_rate_ack && self.channel_mask_ack
    }
}

/// Result of evaluating a LinkADRReq against a channel table
#[derive(Debug, Clone, PartialEq)]
pub struct LinkAdrOutcome {
    /// Answer to send back
    pub answer: LinkAdrAns,
    /// One entry per rejected field or channel
    pub errors: Vec<RegionError>,
    /// New data rate when accepted and not "keep current"
    pub data_rate: Option<u8>,
    /// New TX power when accepted and not "keep current"
    pub tx_power: Option<u8>,
    /// New NbTrans when accepted and non-zero
    pub nb_trans: Option<u8>,
}

impl LinkAdrOutcome {
    /// Whether the command was applied
    pub fn accepted(&self) -> bool {
        self.answer.all()
    }
}

/// Evaluate `req` and, if fully acknowledged, apply it to `channels`
pub fn link_adr_req<R>(region: &R, req: &LinkAdrReq, channels: &mut [Channel]) -> LinkAdrOutcome
where
    R: RegionalParameters + ?Sized,
{
    let mut errors = Vec::new();
    let mut answer = LinkAdrAns {
        channel_mask_ack: true,
        ..Default::default()
    };

    let mut mask: Vec<bool> = channels.iter().map(|c| c.active).collect();
    let blocks = region.parameters().max_channels.div_ceil(16) as u8;

    match req.ch_mask_cntl {
        cntl if cntl < blocks => {
            let base = usize::from(cntl) * 16;
            for bit in 0..16 {
                let on = req.ch_mask & (1 << bit) != 0;
                let index = base + bit;
                let defined = channels.get(index).is_some_and(Channel::is_defined);
                match mask.get_mut(index) {
                    Some(slot) if defined => *slot = on,
                    Some(slot) => *slot = false,
                    None => {}
                }
                if on && !defined {
                    errors.push(RegionError::UndefinedChannel(index));
                    answer.channel_mask_ack = false;
                }
            }
        }
        CNTL_ENABLE_ALL => {
            for (slot, channel) in mask.iter_mut().zip(channels.iter()) {
                *slot = channel.is_defined();
            }
        }
        other => {
            errors.push(RegionError::ReservedChMaskCntl(other));
            answer.channel_mask_ack = false;
        }
    }

    let uplink_capable = |c: &Channel| c.is_defined() && c.enable_uplink;
    if answer.channel_mask_ack
        && !channels.iter().zip(&mask).any(|(c, on)| *on && uplink_capable(c))
    {
        errors.push(RegionError::NoChannelEnabled);
        answer.channel_mask_ack = false;
    }

    answer.data_rate_ack = if req.data_rate == KEEP_CURRENT {
        true
    } else if let Err(e) = region.data_rate_supported(req.data_rate) {
        errors.push(e);
        false
    } else if !channels
        .iter()
        .zip(&mask)
        .any(|(c, on)| *on && uplink_capable(c) && c.supports(req.data_rate))
    {
        errors.push(RegionError::DataRateNotAllowed(req.data_rate));
        false
    } else {
        true
    };

    answer.power_ack = if req.tx_power == KEEP_CURRENT {
        true
    } else if let Err(e) = region.tx_power_supported(req.tx_power) {
        errors.push(e);
        false
    } else {
        true
    };

    let accepted = answer.all();
    if accepted {
        for (channel, on) in channels.iter_mut().zip(mask) {
            channel.active = on;
        }
    }
    debug!(?req, ?answer, accepted, "LinkADRReq evaluated");

    LinkAdrOutcome {
        answer,
        errors,
        data_rate: (accepted && req.data_rate != KEEP_CURRENT).then_some(req.data_rate),
        tx_power: (accepted && req.tx_power != KEEP_CURRENT).then_some(req.tx_power),
        nb_trans: (accepted && req.nb_trans != 0).then_some(req.nb_trans),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lorawan::region::{Eu868, RegionalParameters};

    fn req(data_rate: u8, ch_mask: u16, ch_mask_cntl: u8) -> LinkAdrReq {
        LinkAdrReq {
            data_rate,
            tx_power: KEEP_CURRENT,
            ch_mask,
            ch_mask_cntl,
            nb_trans: 0,
        }
    }

    #[test]
    fn mask_selects_channels_in_block() {
        let region = Eu868::new();
        let mut channels = region.channels();
        let outcome = link_adr_req(&region, &req(3, 0b101, 0), &mut channels);
        assert!(outcome.accepted());
        assert_eq!(outcome.data_rate, Some(3));
        let active: Vec<bool> = channels.iter().map(|c| c.active).collect();
        assert_eq!(active, [true, false, true]);
    }

    #[test]
    fn enabling_undefined_channel_is_rejected() {
        let region = Eu868::new();
        let mut channels = region.channels();
        let before = channels.clone();
        let outcome = link_adr_req(&region, &req(KEEP_CURRENT, 0b1000, 0), &mut channels);
        assert!(!outcome.answer.channel_mask_ack);
        assert_eq!(outcome.errors, [RegionError::UndefinedChannel(3)]);
        assert_eq!(channels, before);
    }

    #[test]
    fn reserved_control_value_is_rejected() {
        let region = Eu868::new();
        let mut channels = region.channels();
        let outcome = link_adr_req(&region, &req(KEEP_CURRENT, 0xFFFF, 5), &mut channels);
        assert!(!outcome.accepted());
        assert_eq!(outcome.errors, [RegionError::ReservedChMaskCntl(5)]);
    }

    #[test]
    fn enable_all_reactivates_channels() {
        let region = Eu868::new();
        let mut channels = region.channels();
        channels[1].active = false;
        let outcome = link_adr_req(&region, &req(KEEP_CURRENT, 0, CNTL_ENABLE_ALL), &mut channels);
        assert!(outcome.accepted());
        assert!(channels.iter().all(|c| c.active));
    }

    #[test]
    fn empty_slot_cannot_be_enabled() {
        let region = Eu868::new();
        let mut channels = region.channels();
        channels.push(Channel {
            active: false,
            enable_uplink: false,
            frequency_uplink: 0,
            frequency_downlink: 0,
            min_dr: 0,
            max_dr: 0,
        });
        let before = channels.clone();

        let outcome = link_adr_req(&region, &req(KEEP_CURRENT, 0b1000, 0), &mut channels);
        assert!(!outcome.accepted());
        assert!(outcome.errors.contains(&RegionError::UndefinedChannel(3)));
        assert_eq!(channels, before);

        channels[0].active = false;
        let outcome = link_adr_req(&region, &req(KEEP_CURRENT, 0, CNTL_ENABLE_ALL), &mut channels);
        assert!(outcome.accepted());
        assert!(channels[..3].iter().all(|c| c.active));
        assert!(!channels[3].active);
    }

    #[test]
    fn bad_power_blocks_mask() {
        let region = Eu868::new();
        let mut channels = region.channels();
        let mut request = req(KEEP_CURRENT, 0b001, 0);
        request.tx_power = 9;
        let outcome = link_adr_req(&region, &request, &mut channels);
        assert!(outcome.answer.channel_mask_ack);
        assert!(!outcome.answer.power_ack);
        assert!(channels.iter().all(|c| c.active));
    }
}

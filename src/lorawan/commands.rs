//! MAC command codec
//!
//! Requests and answers share a CID; which one a byte sequence holds
//! depends on the direction of the frame that carried it.

use crate::crypto::Direction;

use super::region::{LinkAdrAns, LinkAdrReq};

/// MAC command identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Cid {
    /// LinkCheckReq / LinkCheckAns
    LinkCheck = 0x02,
    /// LinkADRReq / LinkADRAns
    LinkAdr = 0x03,
    /// DutyCycleReq / DutyCycleAns
    DutyCycle = 0x04,
    /// RXParamSetupReq / RXParamSetupAns
    RxParamSetup = 0x05,
    /// DevStatusReq / DevStatusAns
    DevStatus = 0x06,
    /// NewChannelReq / NewChannelAns
    NewChannel = 0x07,
    /// RXTimingSetupReq / RXTimingSetupAns
    RxTimingSetup = 0x08,
}

impl TryFrom<u8> for Cid {
    type Error = CommandError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x02 => Cid::LinkCheck,
            0x03 => Cid::LinkAdr,
            0x04 => Cid::DutyCycle,
            0x05 => Cid::RxParamSetup,
            0x06 => Cid::DevStatus,
            0x07 => Cid::NewChannel,
            0x08 => Cid::RxTimingSetup,
            cid => return Err(CommandError::UnknownCommand(cid)),
        })
    }
}

/// MAC command decoding failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// CID not known in this direction
    #[error("unknown MAC command 0x{0:02x}")]
    UnknownCommand(u8),
    /// Payload shorter than the command requires
    #[error("truncated MAC command 0x{0:02x}")]
    Truncated(u8),
}

/// MAC command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacCommand {
    /// Link check request
    LinkCheckReq,
    /// Link check answer
    LinkCheckAns {
        /// Demodulation margin in dB
        margin: u8,
        /// Number of gateways that received the request
        gateway_count: u8,
    },
    /// Link ADR request
    LinkAdrReq(LinkAdrReq),
    /// Link ADR answer
    LinkAdrAns(LinkAdrAns),
    /// Duty cycle request
    DutyCycleReq {
        /// Aggregated duty cycle is 1 / 2^max_duty_cycle
        max_duty_cycle: u8,
    },
    /// Duty cycle answer
    DutyCycleAns,
    /// RX parameter setup request
    RxParamSetupReq {
        /// RX1 data rate offset
        rx1_dr_offset: u8,
        /// RX2 data rate
        rx2_data_rate: u8,
        /// RX2 frequency in Hz
        frequency: u32,
    },
    /// RX parameter setup answer
    RxParamSetupAns {
        /// RX1 data rate offset accepted
        rx1_dr_offset_ack: bool,
        /// RX2 data rate accepted
        rx2_data_rate_ack: bool,
        /// Frequency accepted
        channel_ack: bool,
    },
    /// Device status request
    DevStatusReq,
    /// Device status answer
    DevStatusAns {
        /// Battery level (0 = external power, 1-254 = level, 255 = unknown)
        battery: u8,
        /// SNR margin of the last downlink, 6-bit signed
        margin: i8,
    },
    /// New channel request
    NewChannelReq {
        /// Channel index
        ch_index: u8,
        /// Frequency in Hz, 0 disables the channel
        frequency: u32,
        /// Maximum data rate
        max_dr: u8,
        /// Minimum data rate
        min_dr: u8,
    },
    /// New channel answer
    NewChannelAns {
        /// Data rate range accepted
        data_rate_ok: bool,
        /// Frequency accepted
        channel_freq_ok: bool,
    },
    /// RX timing setup request
    RxTimingSetupReq {
        /// RX1 delay in seconds (0 means 1)
        delay: u8,
    },
    /// RX timing setup answer
    RxTimingSetupAns,
}

fn bit(set: bool, n: u8) -> u8 {
    u8::from(set) << n
}

fn freq_to_bytes(hz: u32) -> [u8; 3] {
    let [a, b, c, _] = (hz / 100).to_le_bytes();
    [a, b, c]
}

fn freq_from_bytes(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], 0]) * 100
}

impl MacCommand {
    /// Command identifier
    pub fn cid(&self) -> Cid {
        match self {
            MacCommand::LinkCheckReq | MacCommand::LinkCheckAns { .. } => Cid::LinkCheck,
            MacCommand::LinkAdrReq(_) | MacCommand::LinkAdrAns(_) => Cid::LinkAdr,
            MacCommand::DutyCycleReq { .. } | MacCommand::DutyCycleAns => Cid::DutyCycle,
            MacCommand::RxParamSetupReq { .. } | MacCommand::RxParamSetupAns { .. } => {
                Cid::RxParamSetup
            }
            MacCommand::DevStatusReq | MacCommand::DevStatusAns { .. } => Cid::DevStatus,
            MacCommand::NewChannelReq { .. } | MacCommand::NewChannelAns { .. } => Cid::NewChannel,
            MacCommand::RxTimingSetupReq { .. } | MacCommand::RxTimingSetupAns => Cid::RxTimingSetup,
        }
    }

    /// Payload length in bytes, excluding the CID
    pub fn len(&self) -> usize {
        match self {
            MacCommand::LinkCheckReq
            | MacCommand::DutyCycleAns
            | MacCommand::DevStatusReq
            | MacCommand::RxTimingSetupAns => 0,
            MacCommand::LinkAdrAns(_)
            | MacCommand::DutyCycleReq { .. }
            | MacCommand::RxParamSetupAns { .. }
            | MacCommand::NewChannelAns { .. }
            | MacCommand::RxTimingSetupReq { .. } => 1,
            MacCommand::LinkCheckAns { .. } | MacCommand::DevStatusAns { .. } => 2,
            MacCommand::LinkAdrReq(_) | MacCommand::RxParamSetupReq { .. } => 4,
            MacCommand::NewChannelReq { .. } => 5,
        }
    }

    /// Whether the command carries no payload
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append CID and payload to `out`
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.cid() as u8);
        match self {
            MacCommand::LinkCheckReq
            | MacCommand::DutyCycleAns
            | MacCommand::DevStatusReq
            | MacCommand::RxTimingSetupAns => {}
            MacCommand::LinkCheckAns {
                margin,
                gateway_count,
            } => out.extend_from_slice(&[*margin, *gateway_count]),
            MacCommand::LinkAdrReq(req) => {
                out.push((req.data_rate << 4) | (req.tx_power & 0x0F));
                out.extend_from_slice(&req.ch_mask.to_le_bytes());
                out.push((req.ch_mask_cntl << 4) | (req.nb_trans & 0x0F));
            }
            MacCommand::LinkAdrAns(ans) => out.push(
                bit(ans.power_ack, 2) | bit(ans.data_rate_ack, 1) | bit(ans.channel_mask_ack, 0),
            ),
            MacCommand::DutyCycleReq { max_duty_cycle } => out.push(max_duty_cycle & 0x0F),
            MacCommand::RxParamSetupReq {
                rx1_dr_offset,
                rx2_data_rate,
                frequency,
            } => {
                out.push(((rx1_dr_offset & 0x07) << 4) | (rx2_data_rate & 0x0F));
                out.extend_from_slice(&freq_to_bytes(*frequency));
            }
            MacCommand::RxParamSetupAns {
                rx1_dr_offset_ack,
                rx2_data_rate_ack,
                channel_ack,
            } => out.push(
                bit(*rx1_dr_offset_ack, 2) | bit(*rx2_data_rate_ack, 1) | bit(*channel_ack, 0),
            ),
            MacCommand::DevStatusAns { battery, margin } => {
                out.extend_from_slice(&[*battery, (*margin as u8) & 0x3F])
            }
            MacCommand::NewChannelReq {
                ch_index,
                frequency,
                max_dr,
                min_dr,
            } => {
                out.push(*ch_index);
                out.extend_from_slice(&freq_to_bytes(*frequency));
                out.push((max_dr << 4) | (min_dr & 0x0F));
            }
            MacCommand::NewChannelAns {
                data_rate_ok,
                channel_freq_ok,
            } => out.push(bit(*data_rate_ok, 1) | bit(*channel_freq_ok, 0)),
            MacCommand::RxTimingSetupReq { delay } => out.push(delay & 0x0F),
        }
    }

    /// Decode one command from the start of `bytes`, returning it and the
    /// number of bytes consumed
    pub fn parse(bytes: &[u8], direction: Direction) -> Result<(Self, usize), CommandError> {
        let raw = *bytes.first().ok_or(CommandError::Truncated(0))?;
        let cid = Cid::try_from(raw)?;
        let p = &bytes[1..];
        let need = |n: usize| {
            if p.len() < n {
                Err(CommandError::Truncated(raw))
            } else {
                Ok(())
            }
        };

        let cmd = match (direction, cid) {
            (Direction::Up, Cid::LinkCheck) => MacCommand::LinkCheckReq,
            (Direction::Down, Cid::LinkCheck) => {
                need(2)?;
                MacCommand::LinkCheckAns {
                    margin: p[0],
                    gateway_count: p[1],
                }
            }
            (Direction::Down, Cid::LinkAdr) => {
                need(4)?;
                MacCommand::LinkAdrReq(LinkAdrReq {
                    data_rate: p[0] >> 4,
                    tx_power: p[0] & 0x0F,
                    ch_mask: u16::from_le_bytes([p[1], p[2]]),
                    ch_mask_cntl: (p[3] >> 4) & 0x07,
                    nb_trans: p[3] & 0x0F,
                })
            }
            (Direction::Up, Cid::LinkAdr) => {
                need(1)?;
                MacCommand::LinkAdrAns(LinkAdrAns {
                    power_ack: p[0] & 0x04 != 0,
                    data_rate_ack: p[0] & 0x02 != 0,
                    channel_mask_ack: p[0] & 0x01 != 0,
                })
            }
            (Direction::Down, Cid::DutyCycle) => {
                need(1)?;
                MacCommand::DutyCycleReq {
                    max_duty_cycle: p[0] & 0x0F,
                }
            }
            (Direction::Up, Cid::DutyCycle) => MacCommand::DutyCycleAns,
            (Direction::Down, Cid::RxParamSetup) => {
                need(4)?;
                MacCommand::RxParamSetupReq {
                    rx1_dr_offset: (p[0] >> 4) & 0x07,
                    rx2_data_rate: p[0] & 0x0F,
                    frequency: freq_from_bytes(&p[1..4]),
                }
            }
            (Direction::Up, Cid::RxParamSetup) => {
                need(1)?;
                MacCommand::RxParamSetupAns {
                    rx1_dr_offset_ack: p[0] & 0x04 != 0,
                    rx2_data_rate_ack: p[0] & 0x02 != 0,
                    channel_ack: p[0] & 0x01 != 0,
                }
            }
            (Direction::Down, Cid::DevStatus) => MacCommand::DevStatusReq,
            (Direction::Up, Cid::DevStatus) => {
                need(2)?;
                // sign-extend the 6-bit margin
                let margin = ((p[1] << 2) as i8) >> 2;
                MacCommand::DevStatusAns {
                    battery: p[0],
                    margin,
                }
            }
            (Direction::Down, Cid::NewChannel) => {
                need(5)?;
                MacCommand::NewChannelReq {
                    ch_index: p[0],
                    frequency: freq_from_bytes(&p[1..4]),
                    max_dr: p[4] >> 4,
                    min_dr: p[4] & 0x0F,
                }
            }
            (Direction::Up, Cid::NewChannel) => {
                need(1)?;
                MacCommand::NewChannelAns {
                    data_rate_ok: p[0] & 0x02 != 0,
                    channel_freq_ok: p[0] & 0x01 != 0,
                }
            }
            (Direction::Down, Cid::RxTimingSetup) => {
                need(1)?;
                MacCommand::RxTimingSetupReq { delay: p[0] & 0x0F }
            }
            (Direction::Up, Cid::RxTimingSetup) => MacCommand::RxTimingSetupAns,
        };
        let consumed = 1 + cmd.len();
        Ok((cmd, consumed))
    }

    /// Decode a sequence of commands (FOpts or port-0 FRMPayload)
    pub fn parse_all(mut bytes: &[u8], direction: Direction) -> Result<Vec<Self>, CommandError> {
        let mut commands = Vec::new();
        while !bytes.is_empty() {
            let (cmd, consumed) = Self::parse(bytes, direction)?;
            commands.push(cmd);
            bytes = &bytes[consumed..];
        }
        Ok(commands)
    }

    /// Encode a sequence of commands
    pub fn encode_all(commands: &[MacCommand]) -> Vec<u8> {
        let mut out = Vec::new();
        for cmd in commands {
            cmd.encode(&mut out);
        }
        out
    }
}

//! LoRaWAN data-frame codec
//!
//! `PHYPayload = MHDR | FHDR | [FPort | FRMPayload] | MIC` where
//! `FHDR = DevAddr | FCtrl | FCnt | FOpts`. Sealing encrypts FRMPayload
//! and appends the MIC; opening verifies the MIC and decrypts.

use crate::config::device::{AesKey, DevAddr};
use crate::crypto::{self, Direction, MIC_SIZE};

/// Smallest valid data frame: MHDR, FHDR without FOpts, MIC
pub const MIN_FRAME_SIZE: usize = 1 + 7 + MIC_SIZE;

/// Largest PHYPayload
pub const MAX_FRAME_SIZE: usize = 255;

/// Maximum FOpts length
pub const MAX_FOPTS_LEN: usize = 15;

/// Message type (MHDR bits 7..5)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MType {
    /// Join request
    JoinRequest = 0,
    /// Join accept
    JoinAccept = 1,
    /// Unconfirmed uplink
    UnconfirmedDataUp = 2,
    /// Unconfirmed downlink
    UnconfirmedDataDown = 3,
    /// Confirmed uplink
    ConfirmedDataUp = 4,
    /// Confirmed downlink
    ConfirmedDataDown = 5,
    /// Reserved
    Rfu = 6,
    /// Proprietary
    Proprietary = 7,
}

impl MType {
    fn from_mhdr(mhdr: u8) -> Self {
        match mhdr >> 5 {
            0 => MType::JoinRequest,
            1 => MType::JoinAccept,
            2 => MType::UnconfirmedDataUp,
            3 => MType::UnconfirmedDataDown,
            4 => MType::ConfirmedDataUp,
            5 => MType::ConfirmedDataDown,
            6 => MType::Rfu,
            _ => MType::Proprietary,
        }
    }

    /// MHDR byte for LoRaWAN R1
    pub fn mhdr(self) -> u8 {
        (self as u8) << 5
    }

    /// Direction of a data message, `None` for other types
    pub fn direction(self) -> Option<Direction> {
        match self {
            MType::UnconfirmedDataUp | MType::ConfirmedDataUp => Some(Direction::Up),
            MType::UnconfirmedDataDown | MType::ConfirmedDataDown => Some(Direction::Down),
            _ => None,
        }
    }

    /// Whether the message requires an acknowledgement
    pub fn is_confirmed(self) -> bool {
        matches!(self, MType::ConfirmedDataUp | MType::ConfirmedDataDown)
    }
}

/// Frame control flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FCtrl {
    /// ADR enabled
    pub adr: bool,
    /// ADR acknowledgement request (uplink only)
    pub adr_ack_req: bool,
    /// Acknowledges the last confirmed frame
    pub ack: bool,
    /// More downlink data pending (downlink) / Class B (uplink)
    pub f_pending: bool,
}

impl FCtrl {
    fn to_byte(self, f_opts_len: usize) -> u8 {
        let mut byte = (f_opts_len as u8) & 0x0F;
        if self.adr {
            byte |= 0x80;
        }
        if self.adr_ack_req {
            byte |= 0x40;
        }
        if self.ack {
            byte |= 0x20;
        }
        if self.f_pending {
            byte |= 0x10;
        }
        byte
    }

    fn from_byte(byte: u8) -> Self {
        Self {
            adr: byte & 0x80 != 0,
            adr_ack_req: byte & 0x40 != 0,
            ack: byte & 0x20 != 0,
            f_pending: byte & 0x10 != 0,
        }
    }
}

/// Data-frame codec failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Fewer bytes than a data frame needs
    #[error("frame too short: {0} bytes")]
    TooShort(usize),
    /// Encoded frame exceeds the PHYPayload limit
    #[error("frame too long: {0} bytes")]
    TooLong(usize),
    /// Not a data message
    #[error("not a data frame: {0:?}")]
    NotDataFrame(MType),
    /// FOpts exceeds 15 bytes
    #[error("FOpts too long: {0} bytes")]
    FOptsTooLong(usize),
    /// MAC commands in both FOpts and a port-0 payload
    #[error("MAC commands present in both FOpts and FRMPayload")]
    MacCommandsInBoth,
    /// Payload bytes without an FPort
    #[error("FRMPayload without FPort")]
    MissingPort,
    /// MIC check failed
    #[error("invalid MIC")]
    InvalidMic,
}

/// Fields of a frame readable without keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Message type
    pub mtype: MType,
    /// Device address
    pub dev_addr: DevAddr,
    /// Low 16 bits of the frame counter
    pub fcnt: u16,
}

impl FrameHeader {
    /// Read the header of a data frame
    pub fn peek(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < MIN_FRAME_SIZE {
            return Err(FrameError::TooShort(bytes.len()));
        }
        let mtype = MType::from_mhdr(bytes[0]);
        if mtype.direction().is_none() {
            return Err(FrameError::NotDataFrame(mtype));
        }
        Ok(Self {
            mtype,
            dev_addr: DevAddr::from_wire([bytes[1], bytes[2], bytes[3], bytes[4]]),
            fcnt: u16::from_le_bytes([bytes[6], bytes[7]]),
        })
    }
}

/// Plaintext view of a data frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    /// Message type
    pub mtype: MType,
    /// Device address
    pub dev_addr: DevAddr,
    /// Frame control flags
    pub fctrl: FCtrl,
    /// Full 32-bit frame counter; only the low 16 bits are transmitted
    pub fcnt: u32,
    /// MAC commands piggybacked in the header
    pub fopts: Vec<u8>,
    /// Port, absent when there is no FRMPayload
    pub fport: Option<u8>,
    /// Decrypted FRMPayload
    pub payload: Vec<u8>,
}

impl DataFrame {
    /// Encrypt and sign the frame
    ///
    /// Port 0 payloads are encrypted with the network session key, any other
    /// port with the application session key.
    pub fn seal(&self, nwk_skey: &AesKey, app_skey: &AesKey) -> Result<Vec<u8>, FrameError> {
        let dir = self
            .mtype
            .direction()
            .ok_or(FrameError::NotDataFrame(self.mtype))?;
        if self.fopts.len() > MAX_FOPTS_LEN {
            return Err(FrameError::FOptsTooLong(self.fopts.len()));
        }
        if self.fport == Some(0) && !self.fopts.is_empty() {
            return Err(FrameError::MacCommandsInBoth);
        }
        if self.fport.is_none() && !self.payload.is_empty() {
            return Err(FrameError::MissingPort);
        }

        let mut out = Vec::with_capacity(MIN_FRAME_SIZE + self.fopts.len() + 1 + self.payload.len());
        out.push(self.mtype.mhdr());
        out.extend_from_slice(&self.dev_addr.wire_bytes());
        out.push(self.fctrl.to_byte(self.fopts.len()));
        out.extend_from_slice(&(self.fcnt as u16).to_le_bytes());
        out.extend_from_slice(&self.fopts);
        if let Some(port) = self.fport {
            let key = if port == 0 { nwk_skey } else { app_skey };
            out.push(port);
            out.extend(crypto::encrypt_payload(key, self.dev_addr, self.fcnt, dir, &self.payload));
        }
        let mic = crypto::compute_mic(nwk_skey, &out, self.dev_addr, self.fcnt, dir);
        out.extend_from_slice(&mic);

        if out.len() > MAX_FRAME_SIZE {
            return Err(FrameError::TooLong(out.len()));
        }
        Ok(out)
    }

    /// Verify and decrypt a frame whose full counter is `fcnt`
    pub fn open(
        bytes: &[u8],
        nwk_skey: &AesKey,
        app_skey: &AesKey,
        fcnt: u32,
    ) -> Result<Self, FrameError> {
        let header = FrameHeader::peek(bytes)?;
        // peek guarantees a data frame
        let dir = header
            .mtype
            .direction()
            .ok_or(FrameError::NotDataFrame(header.mtype))?;

        let (body, mic) = bytes.split_at(bytes.len() - MIC_SIZE);
        if crypto::compute_mic(nwk_skey, body, header.dev_addr, fcnt, dir) != mic {
            return Err(FrameError::InvalidMic);
        }

        let fctrl_byte = body[5];
        let fopts_len = usize::from(fctrl_byte & 0x0F);
        let fhdr_end = 8 + fopts_len;
        if body.len() < fhdr_end {
            return Err(FrameError::TooShort(bytes.len()));
        }
        let fopts = body[8..fhdr_end].to_vec();

        let (fport, payload) = match body.get(fhdr_end) {
            Some(&port) => {
                if port == 0 && !fopts.is_empty() {
                    return Err(FrameError::MacCommandsInBoth);
                }
                let key = if port == 0 { nwk_skey } else { app_skey };
                let plain =
                    crypto::encrypt_payload(key, header.dev_addr, fcnt, dir, &body[fhdr_end + 1..]);
                (Some(port), plain)
            }
            None => (None, Vec::new()),
        };

        Ok(Self {
            mtype: header.mtype,
            dev_addr: header.dev_addr,
            fctrl: FCtrl::from_byte(fctrl_byte),
            fcnt,
            fopts,
            fport,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> (AesKey, AesKey) {
        (AesKey::new([0x11; 16]), AesKey::new([0x22; 16]))
    }

    fn uplink() -> DataFrame {
        DataFrame {
            mtype: MType::ConfirmedDataUp,
            dev_addr: DevAddr::new([0x26, 0x01, 0x1b, 0xda]),
            fctrl: FCtrl {
                adr: true,
                ..Default::default()
            },
            fcnt: 0x0001_0002,
            fopts: vec![0x03, 0x07],
            fport: Some(10),
            payload: b"hello".to_vec(),
        }
    }

    #[test]
    fn sealed_frame_layout() {
        let (nwk, app) = keys();
        let bytes = uplink().seal(&nwk, &app).unwrap();
        assert_eq!(bytes[0], 0x80);
        assert_eq!(&bytes[1..5], &[0xda, 0x1b, 0x01, 0x26]);
        assert_eq!(bytes[5], 0x82);
        assert_eq!(&bytes[6..8], &[0x02, 0x00]);
        assert_eq!(bytes.len(), MIN_FRAME_SIZE + 2 + 1 + 5);
        assert_ne!(&bytes[11..16], b"hello");

        let header = FrameHeader::peek(&bytes).unwrap();
        assert_eq!(header.fcnt, 2);
        assert_eq!(DataFrame::open(&bytes, &nwk, &app, 0x0001_0002).unwrap(), uplink());
    }

    #[test]
    fn tampered_frame_fails_mic() {
        let (nwk, app) = keys();
        let mut bytes = uplink().seal(&nwk, &app).unwrap();
        bytes[12] ^= 0x01;
        assert_eq!(
            DataFrame::open(&bytes, &nwk, &app, 0x0001_0002),
            Err(FrameError::InvalidMic)
        );
        // wrong high counter bits also fail
        let bytes = uplink().seal(&nwk, &app).unwrap();
        assert_eq!(DataFrame::open(&bytes, &nwk, &app, 2), Err(FrameError::InvalidMic));
    }

    #[test]
    fn rejects_invalid_layouts() {
        let (nwk, app) = keys();
        let mut frame = uplink();
        frame.fport = Some(0);
        assert_eq!(frame.seal(&nwk, &app), Err(FrameError::MacCommandsInBoth));
        frame.fopts = vec![0; 16];
        frame.fport = Some(1);
        assert_eq!(frame.seal(&nwk, &app), Err(FrameError::FOptsTooLong(16)));
        assert_eq!(FrameHeader::peek(&[0x40; 5]), Err(FrameError::TooShort(5)));
        assert_eq!(
            FrameHeader::peek(&[0x00; 23]),
            Err(FrameError::NotDataFrame(MType::JoinRequest))
        );
    }
}

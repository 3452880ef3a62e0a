//! Semtech UDP packet-forwarder protocol, version 2
//!
//! Every datagram starts with `version | token (2 bytes) | identifier`.
//! PUSH_DATA, PULL_DATA and TX_ACK then carry the gateway EUI; PUSH_DATA,
//! PULL_RESP and TX_ACK end with a JSON object.

use serde::{Deserialize, Serialize};

use crate::config::Eui64;
use crate::forwarder::{Datr, RxPacket};

/// Protocol version spoken
pub const PROTOCOL_VERSION: u8 = 2;

const HEADER_LEN: usize = 4;
const EUI_LEN: usize = 8;

/// Datagram identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Identifier {
    /// Gateway → server: received packets and status
    PushData = 0x00,
    /// Server → gateway: PUSH_DATA acknowledged
    PushAck = 0x01,
    /// Gateway → server: keep-alive, opens the downlink path
    PullData = 0x02,
    /// Server → gateway: packet to transmit
    PullResp = 0x03,
    /// Server → gateway: PULL_DATA acknowledged
    PullAck = 0x04,
    /// Gateway → server: PULL_RESP outcome
    TxAck = 0x05,
}

impl TryFrom<u8> for Identifier {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x00 => Identifier::PushData,
            0x01 => Identifier::PushAck,
            0x02 => Identifier::PullData,
            0x03 => Identifier::PullResp,
            0x04 => Identifier::PullAck,
            0x05 => Identifier::TxAck,
            other => return Err(CodecError::UnknownIdentifier(other)),
        })
    }
}

/// Datagram codec failure
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Datagram shorter than its identifier requires
    #[error("datagram too short: {0} bytes")]
    TooShort(usize),
    /// Version other than 2
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    /// Identifier byte not defined
    #[error("unknown identifier 0x{0:02x}")]
    UnknownIdentifier(u8),
    /// JSON body could not be encoded or decoded
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Gateway status report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    /// UTC system time, `YYYY-MM-DD hh:mm:ss GMT`
    pub time: String,
    /// Latitude in degrees
    pub lati: f64,
    /// Longitude in degrees
    pub long: f64,
    /// Altitude in meters
    pub alti: i32,
    /// Radio packets received
    pub rxnb: u32,
    /// Radio packets received with a valid CRC
    pub rxok: u32,
    /// Radio packets forwarded
    pub rxfw: u32,
    /// Percentage of upstream datagrams acknowledged
    pub ackr: f32,
    /// Downlink datagrams received
    pub dwnb: u32,
    /// Packets emitted
    pub txnb: u32,
}

/// Body of a PUSH_DATA
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PushDataPayload {
    /// Received packets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rxpk: Vec<RxPacket>,
    /// Status report
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat: Option<Stat>,
}

/// Packet the server asks the gateway to transmit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxPacket {
    /// Send immediately, ignoring `tmst`
    #[serde(default)]
    pub imme: bool,
    /// Concentrator time to send at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmst: Option<u32>,
    /// Frequency in MHz
    pub freq: f64,
    /// RF chain
    #[serde(default)]
    pub rfch: u8,
    /// TX power in dBm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub powe: Option<u8>,
    /// `LORA` or `FSK`
    pub modu: String,
    /// Data rate
    pub datr: Datr,
    /// LoRa coding rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codr: Option<String>,
    /// Invert polarity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipol: Option<bool>,
    /// Payload size in bytes
    pub size: u16,
    /// Base64-encoded PHYPayload
    pub data: String,
}

impl TxPacket {
    /// Frequency in Hz
    pub fn frequency_hz(&self) -> u32 {
        (self.freq * 1_000_000.0).round() as u32
    }
}

/// Body of a PULL_RESP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRespPayload {
    /// Packet to transmit
    pub txpk: TxPacket,
}

/// Outcome reported in a TX_ACK
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxAckInfo {
    /// `NONE` on success, otherwise the failure reason
    pub error: String,
}

/// Body of a TX_ACK
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxAckPayload {
    /// Outcome
    pub txpk_ack: TxAckInfo,
}

impl TxAckPayload {
    /// Acknowledge a successful transmission
    pub fn ok() -> Self {
        Self::error("NONE")
    }

    /// Report a failed transmission
    pub fn error(reason: &str) -> Self {
        Self {
            txpk_ack: TxAckInfo {
                error: reason.to_string(),
            },
        }
    }
}

/// A protocol datagram
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Received packets and/or status
    PushData {
        /// Random token echoed by PUSH_ACK
        token: u16,
        /// Sending gateway
        gateway: Eui64,
        /// JSON body
        payload: PushDataPayload,
    },
    /// PUSH_DATA acknowledgement
    PushAck {
        /// Token of the acknowledged PUSH_DATA
        token: u16,
    },
    /// Keep-alive
    PullData {
        /// Random token echoed by PULL_ACK
        token: u16,
        /// Sending gateway
        gateway: Eui64,
    },
    /// Downlink request
    PullResp {
        /// Token echoed by TX_ACK
        token: u16,
        /// JSON body
        payload: PullRespPayload,
    },
    /// PULL_DATA acknowledgement
    PullAck {
        /// Token of the acknowledged PULL_DATA
        token: u16,
    },
    /// Downlink outcome
    TxAck {
        /// Token of the PULL_RESP
        token: u16,
        /// Sending gateway
        gateway: Eui64,
        /// Optional JSON body; absent means success
        payload: Option<TxAckPayload>,
    },
}

impl Packet {
    /// Identifier byte of the datagram
    pub fn identifier(&self) -> Identifier {
        match self {
            Packet::PushData { .. } => Identifier::PushData,
            Packet::PushAck { .. } => Identifier::PushAck,
            Packet::PullData { .. } => Identifier::PullData,
            Packet::PullResp { .. } => Identifier::PullResp,
            Packet::PullAck { .. } => Identifier::PullAck,
            Packet::TxAck { .. } => Identifier::TxAck,
        }
    }

    /// Token carried in the header
    pub fn token(&self) -> u16 {
        match self {
            Packet::PushData { token, .. }
            | Packet::PushAck { token }
            | Packet::PullData { token, .. }
            | Packet::PullResp { token, .. }
            | Packet::PullAck { token }
            | Packet::TxAck { token, .. } => *token,
        }
    }

    /// Serialize to a datagram
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(64);
        out.push(PROTOCOL_VERSION);
        out.extend_from_slice(&self.token().to_be_bytes());
        out.push(self.identifier() as u8);
        match self {
            Packet::PushData {
                gateway, payload, ..
            } => {
                out.extend_from_slice(gateway.as_bytes());
                serde_json::to_writer(&mut out, payload)?;
            }
            Packet::PullData { gateway, .. } => out.extend_from_slice(gateway.as_bytes()),
            Packet::PullResp { payload, .. } => serde_json::to_writer(&mut out, payload)?,
            Packet::TxAck {
                gateway, payload, ..
            } => {
                out.extend_from_slice(gateway.as_bytes());
                if let Some(payload) = payload {
                    serde_json::to_writer(&mut out, payload)?;
                }
            }
            Packet::PushAck { .. } | Packet::PullAck { .. } => {}
        }
        Ok(out)
    }

    /// Parse a datagram
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::TooShort(bytes.len()));
        }
        if bytes[0] != PROTOCOL_VERSION {
            return Err(CodecError::UnsupportedVersion(bytes[0]));
        }
        let token = u16::from_be_bytes([bytes[1], bytes[2]]);
        let identifier = Identifier::try_from(bytes[3])?;
        let body = &bytes[HEADER_LEN..];

        let gateway = || -> Result<Eui64, CodecError> {
            let eui: [u8; EUI_LEN] = body
                .get(..EUI_LEN)
                .and_then(|b| b.try_into().ok())
                .ok_or(CodecError::TooShort(bytes.len()))?;
            Ok(Eui64::new(eui))
        };

        Ok(match identifier {
            Identifier::PushData => Packet::PushData {
                token,
                gateway: gateway()?,
                payload: serde_json::from_slice(&body[EUI_LEN..])?,
            },
            Identifier::PushAck => Packet::PushAck { token },
            Identifier::PullData => Packet::PullData {
                token,
                gateway: gateway()?,
            },
            Identifier::PullResp => Packet::PullResp {
                token,
                payload: serde_json::from_slice(body)?,
            },
            Identifier::PullAck => Packet::PullAck { token },
            Identifier::TxAck => {
                let gateway = gateway()?;
                let json = &body[EUI_LEN..];
                let payload = if json.iter().all(|b| b.is_ascii_whitespace() || *b == 0) {
                    None
                } else {
                    Some(serde_json::from_slice(json)?)
                };
                Packet::TxAck {
                    token,
                    gateway,
                    payload,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pull_data_layout() {
        let gw = Eui64::new([1, 2, 3, 4, 5, 6, 7, 8]);
        let bytes = Packet::PullData {
            token: 0xABCD,
            gateway: gw,
        }
        .encode()
        .unwrap();
        assert_eq!(bytes, [2, 0xAB, 0xCD, 2, 1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(
            Packet::decode(&bytes).unwrap(),
            Packet::PullData {
                token: 0xABCD,
                gateway: gw
            }
        );
    }

    #[test]
    fn pull_resp_from_network_server() {
        let mut bytes = vec![2, 0x00, 0x07, 3];
        bytes.extend_from_slice(
            br#"{"txpk":{"imme":false,"tmst":5000000,"freq":868.1,"rfch":0,"powe":14,"modu":"LORA","datr":"SF7BW125","codr":"4/5","ipol":true,"size":3,"data":"YAEC"}}"#,
        );
        let Packet::PullResp { token, payload } = Packet::decode(&bytes).unwrap() else {
            panic!("expected PULL_RESP");
        };
        assert_eq!(token, 7);
        assert_eq!(payload.txpk.frequency_hz(), 868_100_000);
        assert_eq!(payload.txpk.datr, Datr::Lora("SF7BW125".into()));
    }

    #[test]
    fn tx_ack_body_is_optional() {
        let gw = Eui64::new([1; 8]);
        let bare = Packet::TxAck {
            token: 1,
            gateway: gw,
            payload: None,
        };
        assert_eq!(Packet::decode(&bare.encode().unwrap()).unwrap(), bare);
        let with_body = Packet::TxAck {
            token: 1,
            gateway: gw,
            payload: Some(TxAckPayload::ok()),
        };
        let bytes = with_body.encode().unwrap();
        assert!(bytes.ends_with(br#"{"txpk_ack":{"error":"NONE"}}"#));
    }

    #[test]
    fn rejects_bad_headers() {
        assert!(matches!(Packet::decode(&[2, 0]), Err(CodecError::TooShort(2))));
        assert!(matches!(
            Packet::decode(&[1, 0, 0, 0]),
            Err(CodecError::UnsupportedVersion(1))
        ));
        assert!(matches!(
            Packet::decode(&[2, 0, 0, 9]),
            Err(CodecError::UnknownIdentifier(9))
        ));
        assert!(matches!(
            Packet::decode(&[2, 0, 0, 0, 1, 2]),
            Err(CodecError::TooShort(6))
        ));
    }
}

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Eui64;
use crate::lorawan::region::DataRateSpec;

/// Radio frame as emitted by a simulated device
#[derive(Debug, Clone, PartialEq)]
pub struct UplinkFrame {
    /// PHYPayload bytes
    pub phy_payload: Vec<u8>,
    /// Carrier frequency in Hz
    pub frequency: u32,
    /// Data rate the frame was sent at
    pub data_rate: DataRateSpec,
    /// LoRa coding rate, `None` for FSK
    pub coding_rate: Option<&'static str>,
    /// Concentrator IF channel
    pub channel: u8,
    /// Reported RSSI in dBm
    pub rssi: i16,
    /// Reported SNR in dB
    pub snr: f32,
}

/// Data-rate field of an rxpk/txpk: `"SF7BW125"` for LoRa, bit rate for FSK
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Datr {
    /// LoRa datarate identifier
    Lora(String),
    /// FSK bit rate
    Fsk(u32),
}

impl From<DataRateSpec> for Datr {
    fn from(spec: DataRateSpec) -> Self {
        match spec {
            DataRateSpec::Fsk { bitrate } => Datr::Fsk(bitrate),
            lora => Datr::Lora(lora.to_string()),
        }
    }
}

/// Received packet in packet-forwarder (`rxpk`) format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RxPacket {
    /// UTC receive time, ISO 8601
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// Concentrator microsecond counter
    pub tmst: u32,
    /// IF channel
    pub chan: u8,
    /// RF chain
    pub rfch: u8,
    /// Frequency in MHz
    pub freq: f64,
    /// CRC status (1 = OK)
    pub stat: i8,
    /// `LORA` or `FSK`
    pub modu: String,
    /// Data rate
    pub datr: Datr,
    /// LoRa coding rate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codr: Option<String>,
    /// RSSI in dBm
    pub rssi: i16,
    /// LoRa SNR in dB
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lsnr: Option<f32>,
    /// Payload size in bytes
    pub size: u16,
    /// Base64-encoded PHYPayload
    pub data: String,
}

impl RxPacket {
    /// Build the network-format record of a frame received at `tmst`
    pub fn from_uplink(frame: &UplinkFrame, tmst: u32) -> Self {
        let lora = matches!(frame.data_rate, DataRateSpec::Lora { .. });
        Self {
            time: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
            tmst,
            chan: frame.channel,
            rfch: 0,
            freq: f64::from(frame.frequency) / 1_000_000.0,
            stat: 1,
            modu: frame.data_rate.modulation().to_string(),
            datr: frame.data_rate.into(),
            codr: frame.coding_rate.map(str::to_string),
            rssi: frame.rssi,
            lsnr: lora.then_some(frame.snr),
            size: frame.phy_payload.len() as u16,
            data: STANDARD.encode(&frame.phy_payload),
        }
    }

    /// Decode the `data` field
    pub fn payload(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.data)
    }

    /// Frequency in Hz
    pub fn frequency_hz(&self) -> u32 {
        (self.freq * 1_000_000.0).round() as u32
    }
}

/// Downlink delivered to a device's receive window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownlinkFrame {
    /// PHYPayload bytes
    pub phy_payload: Vec<u8>,
    /// Frequency in Hz
    pub frequency: u32,
    /// Gateway that transmitted it
    pub gateway: Eui64,
}

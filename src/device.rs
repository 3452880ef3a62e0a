//! Simulated ABP end-device
//!
//! A [`Device`] builds real LoRaWAN data frames and hands them to the
//! [`Forwarder`], which copies them into the buffer of every gateway in
//! range. After each uplink the device opens its RX1 and RX2 windows; a
//! downlink transmitted on one of those frequencies by a bound gateway is
//! delivered to the device's channel and decoded by [`Device::receive`].
//!
//! MAC commands found in a downlink are applied immediately and their
//! answers ride in the FOpts of the next uplink.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::config::{DeviceConfig, Eui64, SessionState};
use crate::crypto::Direction;
use crate::forwarder::{DeviceDescriptor, DownlinkFrame, Forwarder, UplinkFrame};
use crate::lorawan::commands::{CommandError, MacCommand};
use crate::lorawan::frame::{DataFrame, FCtrl, FrameError, FrameHeader, MType, MAX_FOPTS_LEN};
use crate::lorawan::region::{Channel, DwellTime, LinkAdrReq, Region, RegionError, RegionalParameters};
use crate::lorawan::timing::{ReceiveDelays, ReceiveWindows};

/// RSSI reported for every simulated uplink, in dBm
pub const UPLINK_RSSI: i16 = -60;

/// SNR reported for every simulated uplink, in dB
pub const UPLINK_SNR: f32 = 7.5;

/// Battery level reported in DevStatusAns: the device cannot measure it
pub const BATTERY_UNKNOWN: u8 = 255;

/// Device operation failure
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Configuration or command rejected by the region
    #[error("region: {0}")]
    Region(#[from] RegionError),
    /// Frame could not be built or opened
    #[error("frame: {0}")]
    Frame(#[from] FrameError),
    /// MAC command block could not be parsed
    #[error("MAC command: {0}")]
    Command(#[from] CommandError),
    /// Application port outside 1..=223
    #[error("invalid application port {0}")]
    InvalidPort(u8),
    /// Payload exceeds what the current data rate carries
    #[error("payload of {len} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge {
        /// Payload length
        len: usize,
        /// Maximum for the data rate
        max: usize,
    },
    /// No enabled uplink channel supports the data rate
    #[error("no enabled channel for DR{0}")]
    NoChannel(u8),
}

/// Result of an uplink
#[derive(Debug, Clone, PartialEq)]
pub struct UplinkReport {
    /// Frame counter used
    pub fcnt: u32,
    /// Channel index used
    pub channel: usize,
    /// Uplink frequency in Hz
    pub frequency: u32,
    /// Number of gateways that received the frame
    pub gateways: usize,
    /// Windows opened after the uplink
    pub windows: ReceiveWindows,
}

/// Decoded downlink addressed to the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downlink {
    /// Full frame counter
    pub fcnt: u32,
    /// Whether the network asked for an acknowledgement
    pub confirmed: bool,
    /// Whether the frame acknowledges the last confirmed uplink
    pub ack: bool,
    /// Application port, `None` for an empty frame
    pub fport: Option<u8>,
    /// Decrypted application payload; empty on port 0
    pub payload: Vec<u8>,
    /// MAC commands carried by the frame
    pub commands: Vec<MacCommand>,
}

/// Last LinkCheckAns received
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkCheck {
    /// Demodulation margin in dB
    pub margin: u8,
    /// Gateways that heard the request
    pub gateway_count: u8,
}

/// A simulated ABP end-device
#[derive(Debug)]
pub struct Device {
    config: DeviceConfig,
    region: Region,
    session: SessionState,
    forwarder: Arc<Forwarder>,
    downlink_tx: UnboundedSender<DownlinkFrame>,
    downlink_rx: UnboundedReceiver<DownlinkFrame>,
    channels: Vec<Channel>,
    next_channel: usize,
    data_rate: u8,
    tx_power: u8,
    nb_trans: u8,
    rx1_dr_offset: u8,
    rx2_frequency: u32,
    rx2_data_rate: u8,
    delays: ReceiveDelays,
    dwell_time: DwellTime,
    max_duty_cycle: u8,
    open_windows: Vec<u32>,
    pending_answers: Vec<MacCommand>,
    ack_pending: bool,
    last_link_check: Option<LinkCheck>,
}

impl Device {
    /// Create a device and register it in `forwarder`
    pub fn new(config: DeviceConfig, forwarder: Arc<Forwarder>) -> Result<Self, DeviceError> {
        let region = Region::new(config.region);
        region.data_rate_supported(config.data_rate)?;
        region.rx1_dr_offset_supported(config.rx1_dr_offset)?;

        let params = region.parameters();
        let (rx2_frequency, rx2_data_rate) = (params.rx2_frequency, params.rx2_dr);
        let (downlink_tx, downlink_rx) = mpsc::unbounded_channel();
        let device = Self {
            session: SessionState::new_abp(config.dev_addr, config.nwk_skey, config.app_skey),
            channels: region.channels(),
            next_channel: 0,
            data_rate: config.data_rate,
            tx_power: 0,
            nb_trans: 1,
            rx1_dr_offset: config.rx1_dr_offset,
            rx2_frequency,
            rx2_data_rate,
            delays: ReceiveDelays::default(),
            dwell_time: DwellTime::NoLimit,
            max_duty_cycle: 0,
            open_windows: Vec::new(),
            pending_answers: Vec::new(),
            ack_pending: false,
            last_link_check: None,
            region,
            forwarder,
            downlink_tx,
            downlink_rx,
            config,
        };
        device.register();
        Ok(device)
    }

    /// Bind the device to every gateway in range
    ///
    /// Needed again after the forwarder was reset.
    pub fn register(&self) -> usize {
        let bound = self.forwarder.add_device(DeviceDescriptor {
            dev_eui: self.config.dev_eui,
            location: self.config.location,
            range: self.config.range,
            downlink: self.downlink_tx.clone(),
        });
        info!(dev_eui = %self.config.dev_eui, gateways = bound, "device registered");
        bound
    }

    /// Remove the device from the forwarder
    pub fn unregister(&mut self) {
        self.open_windows.clear();
        self.forwarder.delete_device(self.config.dev_eui);
    }

    /// Device EUI
    pub fn dev_eui(&self) -> Eui64 {
        self.config.dev_eui
    }

    /// Region the device operates in
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Current channel table
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Current uplink data rate
    pub fn data_rate(&self) -> u8 {
        self.data_rate
    }

    /// Current TX power index
    pub fn tx_power(&self) -> u8 {
        self.tx_power
    }

    /// Transmissions per unconfirmed uplink
    pub fn nb_trans(&self) -> u8 {
        self.nb_trans
    }

    /// Current receive-window delays
    pub fn delays(&self) -> ReceiveDelays {
        self.delays
    }

    /// RX2 frequency and data rate
    pub fn rx2(&self) -> (u32, u8) {
        (self.rx2_frequency, self.rx2_data_rate)
    }

    /// Aggregated duty-cycle exponent last set by the network
    pub fn max_duty_cycle(&self) -> u8 {
        self.max_duty_cycle
    }

    /// Frame counters and keys
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// MAC answers waiting for the next uplink
    pub fn pending_answers(&self) -> &[MacCommand] {
        &self.pending_answers
    }

    /// Last link check answer
    pub fn last_link_check(&self) -> Option<LinkCheck> {
        self.last_link_check
    }

    /// Ask the network for a link check in the next uplink
    pub fn request_link_check(&mut self) {
        self.pending_answers.push(MacCommand::LinkCheckReq);
    }

    fn next_uplink_channel(&mut self) -> Option<usize> {
        let count = self.channels.len();
        let index = (0..count)
            .map(|i| (self.next_channel + i) % count)
            .find(|&i| self.channels[i].usable_for_uplink(self.data_rate))?;
        self.next_channel = (index + 1) % count;
        Some(index)
    }

    fn take_fopts(&mut self) -> Vec<u8> {
        let mut fopts = Vec::new();
        let mut sent = 0;
        for command in &self.pending_answers {
            if fopts.len() + command.len() > MAX_FOPTS_LEN {
                break;
            }
            command.encode(&mut fopts);
            sent += 1;
        }
        self.pending_answers.drain(..sent);
        fopts
    }

    fn close_windows(&mut self) {
        for frequency in self.open_windows.drain(..) {
            self.forwarder
                .close_receive_window(self.config.dev_eui, frequency);
        }
    }

    /// Send an application payload
    pub fn send_uplink(
        &mut self,
        port: u8,
        payload: &[u8],
        confirmed: bool,
    ) -> Result<UplinkReport, DeviceError> {
        if !(1..=223).contains(&port) {
            return Err(DeviceError::InvalidPort(port));
        }
        let max = usize::from(self.region.payload_size(self.data_rate, self.dwell_time).n);
        if payload.len() > max {
            return Err(DeviceError::PayloadTooLarge {
                len: payload.len(),
                max,
            });
        }
        let data_rate = self
            .region
            .data_rate(self.data_rate)
            .ok_or(RegionError::InvalidDataRate(self.data_rate))?;
        let channel = self
            .next_uplink_channel()
            .ok_or(DeviceError::NoChannel(self.data_rate))?;
        let frequency = self.channels[channel].frequency_uplink;

        let fcnt = self.session.fcnt_up;
        let frame = DataFrame {
            mtype: if confirmed {
                MType::ConfirmedDataUp
            } else {
                MType::UnconfirmedDataUp
            },
            dev_addr: self.session.dev_addr,
            fctrl: FCtrl {
                adr: true,
                ack: self.ack_pending,
                ..FCtrl::default()
            },
            fcnt,
            fopts: self.take_fopts(),
            fport: Some(port),
            payload: payload.to_vec(),
        };
        let phy_payload = frame.seal(&self.session.nwk_skey, &self.session.app_skey)?;
        let uplink = UplinkFrame {
            phy_payload,
            frequency,
            data_rate,
            coding_rate: self.region.coding_rate(self.data_rate),
            channel: channel as u8,
            rssi: UPLINK_RSSI,
            snr: UPLINK_SNR,
        };

        let repeats = if confirmed { 1 } else { self.nb_trans.max(1) };
        let mut gateways = 0;
        for _ in 0..repeats {
            gateways = self.forwarder.uplink(&uplink, self.config.dev_eui);
        }
        self.session.increment_fcnt_up();
        self.ack_pending = false;

        self.close_windows();
        let mut windows = self.region.receive_windows(
            &self.channels,
            channel,
            self.data_rate,
            self.rx1_dr_offset,
            self.dwell_time,
            &self.delays,
        )?;
        windows.rx2.frequency = self.rx2_frequency;
        windows.rx2.data_rate = self.rx2_data_rate;
        for frequency in [windows.rx1.frequency, windows.rx2.frequency] {
            if !self.open_windows.contains(&frequency) {
                self.forwarder
                    .open_receive_window(self.config.dev_eui, frequency);
                self.open_windows.push(frequency);
            }
        }

        debug!(
            dev_eui = %self.config.dev_eui,
            fcnt,
            frequency,
            dr = self.data_rate,
            gateways,
            "uplink sent"
        );
        Ok(UplinkReport {
            fcnt,
            channel,
            frequency,
            gateways,
            windows,
        })
    }

    /// Wait for the next downlink addressed to this device
    ///
    /// Frames for other devices are skipped.
    pub async fn receive(&mut self) -> Result<Downlink, DeviceError> {
        loop {
            // the device keeps a sender alive, so the channel never closes
            let Some(frame) = self.downlink_rx.recv().await else {
                continue;
            };
            if let Some(downlink) = self.accept(&frame)? {
                return Ok(downlink);
            }
        }
    }

    /// Process a downlink already delivered, without waiting
    pub fn try_receive(&mut self) -> Result<Option<Downlink>, DeviceError> {
        loop {
            let frame = match self.downlink_rx.try_recv() {
                Ok(frame) => frame,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return Ok(None),
            };
            if let Some(downlink) = self.accept(&frame)? {
                return Ok(Some(downlink));
            }
        }
    }

    fn accept(&mut self, frame: &DownlinkFrame) -> Result<Option<Downlink>, DeviceError> {
        let header = match FrameHeader::peek(&frame.phy_payload) {
            Ok(h) => h,
            Err(e) => {
                debug!(error = %e, "ignoring undecodable downlink");
                return Ok(None);
            }
        };
        if header.dev_addr != self.session.dev_addr
            || header.mtype.direction() != Some(Direction::Down)
        {
            return Ok(None);
        }

        let fcnt = self.session.expand_fcnt_down(header.fcnt);
        let opened = DataFrame::open(
            &frame.phy_payload,
            &self.session.nwk_skey,
            &self.session.app_skey,
            fcnt,
        )?;
        self.session.fcnt_down = fcnt.wrapping_add(1);
        self.close_windows();

        let (commands, payload) = if opened.fport == Some(0) {
            (MacCommand::parse_all(&opened.payload, Direction::Down)?, Vec::new())
        } else {
            (MacCommand::parse_all(&opened.fopts, Direction::Down)?, opened.payload)
        };
        for command in &commands {
            self.apply(command);
        }

        let confirmed = opened.mtype.is_confirmed();
        self.ack_pending = confirmed;
        debug!(
            dev_eui = %self.config.dev_eui,
            fcnt,
            frequency = frame.frequency,
            gateway = %frame.gateway,
            commands = commands.len(),
            "downlink received"
        );
        Ok(Some(Downlink {
            fcnt,
            confirmed,
            ack: opened.fctrl.ack,
            fport: opened.fport,
            payload,
            commands,
        }))
    }

    fn apply(&mut self, command: &MacCommand) {
        let answer = match *command {
            MacCommand::LinkAdrReq(req) => Some(self.link_adr(&req)),
            MacCommand::DutyCycleReq { max_duty_cycle } => {
                self.max_duty_cycle = max_duty_cycle;
                Some(MacCommand::DutyCycleAns)
            }
            MacCommand::RxParamSetupReq {
                rx1_dr_offset,
                rx2_data_rate,
                frequency,
            } => {
                let rx1_dr_offset_ack = self.region.rx1_dr_offset_supported(rx1_dr_offset).is_ok();
                let rx2_data_rate_ack = self.region.data_rate_supported(rx2_data_rate).is_ok();
                let channel_ack = self.region.frequency_supported(frequency).is_ok();
                if rx1_dr_offset_ack && rx2_data_rate_ack && channel_ack {
                    self.rx1_dr_offset = rx1_dr_offset;
                    self.rx2_data_rate = rx2_data_rate;
                    self.rx2_frequency = frequency;
                }
                Some(MacCommand::RxParamSetupAns {
                    rx1_dr_offset_ack,
                    rx2_data_rate_ack,
                    channel_ack,
                })
            }
            MacCommand::DevStatusReq => Some(MacCommand::DevStatusAns {
                battery: BATTERY_UNKNOWN,
                margin: UPLINK_SNR.round().clamp(-32.0, 31.0) as i8,
            }),
            MacCommand::NewChannelReq {
                ch_index,
                frequency,
                max_dr,
                min_dr,
            } => Some(self.new_channel(usize::from(ch_index), frequency, min_dr, max_dr)),
            MacCommand::RxTimingSetupReq { delay } => {
                self.delays = self.delays.with_rx1_delay(delay);
                Some(MacCommand::RxTimingSetupAns)
            }
            MacCommand::LinkCheckAns {
                margin,
                gateway_count,
            } => {
                self.last_link_check = Some(LinkCheck {
                    margin,
                    gateway_count,
                });
                None
            }
            ref other => {
                warn!(cid = ?other.cid(), "unexpected MAC command in downlink");
                None
            }
        };
        if let Some(answer) = answer {
            self.pending_answers.push(answer);
        }
    }

    fn link_adr(&mut self, req: &LinkAdrReq) -> MacCommand {
        let outcome = self.region.link_adr_req(req, &mut self.channels);
        if outcome.accepted() {
            if let Some(dr) = outcome.data_rate {
                self.data_rate = dr;
            }
            if let Some(power) = outcome.tx_power {
                self.tx_power = power;
            }
            if let Some(nb_trans) = outcome.nb_trans {
                self.nb_trans = nb_trans;
            }
        } else {
            debug!(
                dev_eui = %self.config.dev_eui,
                errors = ?outcome.errors,
                "LinkADRReq rejected"
            );
        }
        MacCommand::LinkAdrAns(outcome.answer)
    }

    fn new_channel(&mut self, index: usize, frequency: u32, min_dr: u8, max_dr: u8) -> MacCommand {
        let params = self.region.parameters();
        let index_ok = index >= params.reserved_channels() && index < params.max_channels;
        let channel_freq_ok =
            index_ok && (frequency == 0 || self.region.frequency_supported(frequency).is_ok());
        let data_rate_ok = frequency == 0
            || (min_dr <= max_dr
                && self.region.data_rate_supported(min_dr).is_ok()
                && self.region.data_rate_supported(max_dr).is_ok());

        if channel_freq_ok && data_rate_ok {
            if self.channels.len() <= index {
                self.channels.resize(
                    index + 1,
                    Channel {
                        active: false,
                        enable_uplink: false,
                        frequency_uplink: 0,
                        frequency_downlink: 0,
                        min_dr: 0,
                        max_dr: 0,
                    },
                );
            }
            self.channels[index] = Channel {
                active: frequency != 0,
                enable_uplink: frequency != 0,
                frequency_uplink: frequency,
                frequency_downlink: frequency,
                min_dr,
                max_dr,
            };
        }
        MacCommand::NewChannelAns {
            data_rate_ok,
            channel_freq_ok,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AesKey, DevAddr, GatewayInfo};
    use crate::forwarder::{GatewayDescriptor, UplinkBuffer};
    use crate::lorawan::region::{RegionCode, CNTL_ENABLE_ALL, KEEP_CURRENT};

    const NWK: AesKey = AesKey::new([0x11; 16]);
    const APP: AesKey = AesKey::new([0x22; 16]);
    const ADDR: DevAddr = DevAddr::new([0x26, 0x01, 0x1B, 0xDA]);

    fn setup() -> (Device, Arc<Forwarder>, Arc<UplinkBuffer>) {
        let forwarder = Arc::new(Forwarder::new());
        let buffer = Arc::new(UplinkBuffer::new());
        let gw = GatewayInfo::new(Eui64::new([0xAA; 8]), "gw");
        forwarder.add_gateway(GatewayDescriptor {
            mac: gw.mac_address,
            location: gw.location,
            buffer: Arc::clone(&buffer),
        });
        let config = DeviceConfig::new_abp(Eui64::new([1; 8]), ADDR, NWK, APP, RegionCode::Eu868);
        let device = Device::new(config, Arc::clone(&forwarder)).unwrap();
        (device, forwarder, buffer)
    }

    fn downlink(fcnt: u32, fopts: Vec<u8>) -> Vec<u8> {
        DataFrame {
            mtype: MType::UnconfirmedDataDown,
            dev_addr: ADDR,
            fctrl: FCtrl::default(),
            fcnt,
            fopts,
            fport: None,
            payload: Vec::new(),
        }
        .seal(&NWK, &APP)
        .unwrap()
    }

    #[test]
    fn rejects_bad_configuration() {
        let forwarder = Arc::new(Forwarder::new());
        let mut config = DeviceConfig::new_abp(Eui64::new([1; 8]), ADDR, NWK, APP, RegionCode::Eu868);
        config.data_rate = 9;
        let err = Device::new(config, forwarder).unwrap_err();
        assert!(matches!(err, DeviceError::Region(RegionError::InvalidDataRate(9))));
    }

    #[test]
    fn uplinks_rotate_over_channels() {
        let (mut device, _forwarder, buffer) = setup();
        let first = device.send_uplink(1, b"a", false).unwrap();
        let second = device.send_uplink(1, b"b", false).unwrap();
        assert_eq!(first.channel, 0);
        assert_eq!(second.channel, 1);
        assert_eq!(first.gateways, 1);
        assert_eq!(buffer.len(), 2);
        assert_eq!(device.session().fcnt_up, 2);

        let bytes = buffer.drain()[1].payload().unwrap();
        let frame = DataFrame::open(&bytes, &NWK, &APP, 1).unwrap();
        assert_eq!(frame.payload, b"b");
        assert_eq!(frame.fport, Some(1));
    }

    #[test]
    fn payload_limit_follows_data_rate() {
        let (mut device, _forwarder, _buffer) = setup();
        let err = device.send_uplink(1, &[0; 52], false).unwrap_err();
        assert!(matches!(err, DeviceError::PayloadTooLarge { len: 52, max: 51 }));
        assert!(matches!(
            device.send_uplink(0, b"x", false),
            Err(DeviceError::InvalidPort(0))
        ));
    }

    #[test]
    fn link_adr_req_applies_and_answers_in_next_uplink() {
        let (mut device, forwarder, buffer) = setup();
        let report = device.send_uplink(1, b"hi", false).unwrap();
        buffer.drain();

        let req = MacCommand::LinkAdrReq(LinkAdrReq {
            data_rate: 5,
            tx_power: KEEP_CURRENT,
            ch_mask: 0b011,
            ch_mask_cntl: 0,
            nb_trans: 0,
        });
        let fopts = MacCommand::encode_all(&[req]);
        let delivered = forwarder.downlink(&downlink(0, fopts), report.windows.rx1.frequency, Eui64::new([0xAA; 8]));
        assert_eq!(delivered, 1);

        let received = device.try_receive().unwrap().unwrap();
        assert_eq!(received.commands.len(), 1);
        assert_eq!(device.data_rate(), 5);
        assert!(!device.channels()[2].active);
        assert_eq!(device.pending_answers().len(), 1);

        device.send_uplink(1, b"again", false).unwrap();
        let bytes = buffer.drain()[0].payload().unwrap();
        let frame = DataFrame::open(&bytes, &NWK, &APP, 1).unwrap();
        let answers = MacCommand::parse_all(&frame.fopts, Direction::Up).unwrap();
        assert!(matches!(answers[0], MacCommand::LinkAdrAns(ans) if ans.all()));
        assert!(device.pending_answers().is_empty());
    }

    #[test]
    fn rejected_link_adr_req_keeps_channels() {
        let (mut device, forwarder, _buffer) = setup();
        let report = device.send_uplink(1, b"hi", false).unwrap();
        let req = MacCommand::LinkAdrReq(LinkAdrReq {
            data_rate: 6,
            tx_power: KEEP_CURRENT,
            ch_mask: 0,
            ch_mask_cntl: CNTL_ENABLE_ALL,
            nb_trans: 0,
        });
        let before = device.channels().to_vec();
        forwarder.downlink(
            &downlink(0, MacCommand::encode_all(&[req])),
            report.windows.rx2.frequency,
            Eui64::new([0xAA; 8]),
        );
        device.try_receive().unwrap().unwrap();
        assert_eq!(device.channels(), &before[..]);
        assert_eq!(device.data_rate(), 0);
    }

    #[test]
    fn other_devices_frames_are_ignored() {
        let (mut device, forwarder, _buffer) = setup();
        let report = device.send_uplink(1, b"hi", false).unwrap();
        let foreign = DataFrame {
            mtype: MType::UnconfirmedDataDown,
            dev_addr: DevAddr::new([9, 9, 9, 9]),
            fctrl: FCtrl::default(),
            fcnt: 0,
            fopts: Vec::new(),
            fport: Some(1),
            payload: b"nope".to_vec(),
        }
        .seal(&NWK, &APP)
        .unwrap();
        forwarder.downlink(&foreign, report.windows.rx1.frequency, Eui64::new([0xAA; 8]));
        assert!(device.try_receive().unwrap().is_none());
    }

    #[test]
    fn timing_and_status_commands() {
        let (mut device, forwarder, _buffer) = setup();
        let report = device.send_uplink(1, b"hi", false).unwrap();
        let fopts = MacCommand::encode_all(&[
            MacCommand::RxTimingSetupReq { delay: 3 },
            MacCommand::DevStatusReq,
            MacCommand::DutyCycleReq { max_duty_cycle: 4 },
        ]);
        forwarder.downlink(&downlink(0, fopts), report.windows.rx1.frequency, Eui64::new([0xAA; 8]));
        device.try_receive().unwrap().unwrap();
        assert_eq!(device.delays().rx1, std::time::Duration::from_secs(3));
        assert_eq!(device.max_duty_cycle(), 4);
        assert_eq!(device.pending_answers().len(), 3);
    }

    #[test]
    fn new_channel_req_adds_a_channel() {
        let (mut device, forwarder, _buffer) = setup();
        let report = device.send_uplink(1, b"hi", false).unwrap();
        let fopts = MacCommand::encode_all(&[MacCommand::NewChannelReq {
            ch_index: 3,
            frequency: 867_100_000,
            max_dr: 5,
            min_dr: 0,
        }]);
        forwarder.downlink(&downlink(0, fopts), report.windows.rx1.frequency, Eui64::new([0xAA; 8]));
        device.try_receive().unwrap().unwrap();
        assert_eq!(device.channels()[3].frequency_uplink, 867_100_000);
        assert_eq!(
            device.pending_answers(),
            &[MacCommand::NewChannelAns {
                data_rate_ok: true,
                channel_freq_ok: true
            }]
        );
    }

    #[test]
    fn link_adr_req_cannot_select_a_removed_channel() {
        let (mut device, forwarder, _buffer) = setup();
        let report = device.send_uplink(1, b"hi", false).unwrap();
        let fopts = MacCommand::encode_all(&[
            MacCommand::NewChannelReq {
                ch_index: 3,
                frequency: 0,
                max_dr: 0,
                min_dr: 0,
            },
            MacCommand::LinkAdrReq(LinkAdrReq {
                data_rate: KEEP_CURRENT,
                tx_power: KEEP_CURRENT,
                ch_mask: 0b1000,
                ch_mask_cntl: 0,
                nb_trans: 0,
            }),
        ]);
        forwarder.downlink(&downlink(0, fopts), report.windows.rx1.frequency, Eui64::new([0xAA; 8]));
        device.try_receive().unwrap().unwrap();

        assert_eq!(device.channels().len(), 4);
        assert!(device.channels()[..3].iter().all(|c| c.active));
        assert!(!device.channels()[3].active);
        assert!(matches!(
            device.pending_answers(),
            [
                MacCommand::NewChannelAns { .. },
                MacCommand::LinkAdrAns(ans),
            ] if !ans.channel_mask_ack
        ));
        assert!(device.send_uplink(1, b"still here", false).is_ok());
    }
}

//! Simulated gateways
//!
//! A running gateway is one tokio task. It drains the uplink buffer the
//! forwarder fills, relays packets to the network server (directly, or
//! through the shared bridge) with the Semtech UDP protocol, and injects the
//! downlinks it receives back into the forwarder.
//!
//! Shutdown is cooperative: [`Gateway::request_stop`] flips a
//! [`tokio::sync::watch`] flag that the task checks between datagrams.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, trace, warn, Instrument};

use crate::config::{Eui64, GatewayId, GatewayInfo};
use crate::forwarder::{Forwarder, GatewayDescriptor, UplinkBuffer};
use crate::simulator::SimEvent;

/// Semtech UDP packet-forwarder protocol
pub mod semtech;

use semtech::{Packet, PullRespPayload, PushDataPayload, Stat, TxAckPayload};

const MAX_DATAGRAM: usize = 65_535;

/// Reasons a gateway task cannot start talking to the network
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Relayed gateway started with no bridge configured
    #[error("no bridge address configured")]
    NoBridge,
    /// Destination did not resolve to any address
    #[error("cannot resolve {0}")]
    Unresolved(String),
    /// Socket setup failed
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared resources a gateway task needs
#[derive(Debug, Clone)]
pub struct GatewayLink {
    /// Router shared with devices
    pub forwarder: Arc<Forwarder>,
    /// Bridge `host:port`, used by relayed gateways
    pub bridge_address: String,
    /// Local address to bind the UDP socket to
    pub bind_address: IpAddr,
    /// Event stream for on/off notifications
    pub events: broadcast::Sender<SimEvent>,
}

struct GatewayRuntime {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// A gateway record and, while on, its running task
pub struct Gateway {
    /// Persisted description
    pub info: GatewayInfo,
    runtime: Option<GatewayRuntime>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("info", &self.info)
            .field("on", &self.is_on())
            .finish()
    }
}

impl Gateway {
    /// Wrap a record; the gateway starts off
    pub fn new(info: GatewayInfo) -> Self {
        Self {
            info,
            runtime: None,
        }
    }

    /// Whether the gateway task is alive
    pub fn is_on(&self) -> bool {
        self.runtime
            .as_ref()
            .is_some_and(|rt| !rt.handle.is_finished())
    }

    /// Bind the gateway into the forwarder and spawn its task
    ///
    /// Must be called inside a tokio runtime. Returns `false` if the gateway
    /// was already on.
    pub fn turn_on(&mut self, link: GatewayLink) -> bool {
        if self.is_on() {
            return false;
        }
        let buffer = Arc::new(UplinkBuffer::new());
        link.forwarder.add_gateway(GatewayDescriptor {
            mac: self.info.mac_address,
            location: self.info.location,
            buffer: Arc::clone(&buffer),
        });

        let (shutdown, shutdown_rx) = watch::channel(false);
        let span = info_span!("gateway", id = self.info.id, mac = %self.info.mac_address);
        let task = GatewayTask::new(&self.info, link.clone(), buffer);
        let handle = tokio::spawn(task.run(shutdown_rx).instrument(span));

        let _ = link.events.send(SimEvent::GatewayState {
            id: self.info.id,
            on: true,
        });
        self.runtime = Some(GatewayRuntime { shutdown, handle });
        true
    }

    /// Signal the task to stop and hand back its join handle
    pub fn request_stop(&mut self) -> Option<JoinHandle<()>> {
        let runtime = self.runtime.take()?;
        let _ = runtime.shutdown.send(true);
        Some(runtime.handle)
    }

    /// Signal the task to stop and wait for it to exit
    pub async fn turn_off(&mut self) {
        if let Some(handle) = self.request_stop() {
            if let Err(e) = handle.await {
                warn!(id = self.info.id, error = %e, "gateway task ended abnormally");
            }
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    rxnb: u32,
    rxfw: u32,
    ackn: u32,
    upnb: u32,
    dwnb: u32,
    txnb: u32,
}

struct GatewayTask {
    id: GatewayId,
    mac: Eui64,
    info: GatewayInfo,
    link: GatewayLink,
    buffer: Arc<UplinkBuffer>,
    counters: Counters,
}

impl GatewayTask {
    fn new(info: &GatewayInfo, link: GatewayLink, buffer: Arc<UplinkBuffer>) -> Self {
        Self {
            id: info.id,
            mac: info.mac_address,
            info: info.clone(),
            link,
            buffer,
            counters: Counters::default(),
        }
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        match self.connect().await {
            Ok(socket) => {
                info!(peer = ?socket.peer_addr().ok(), "gateway on");
                self.serve(&socket, &mut shutdown).await;
            }
            Err(e) => warn!(error = %e, "gateway cannot reach network server"),
        }

        self.link.forwarder.delete_gateway(self.mac);
        let _ = self.link.events.send(SimEvent::GatewayState {
            id: self.id,
            on: false,
        });
        info!("gateway off");
    }

    async fn connect(&self) -> Result<UdpSocket, GatewayError> {
        let destination = if self.info.is_native() {
            self.info.native_endpoint()
        } else if self.link.bridge_address.is_empty() {
            return Err(GatewayError::NoBridge);
        } else {
            self.link.bridge_address.clone()
        };
        let peer = tokio::net::lookup_host(destination.as_str())
            .await?
            .next()
            .ok_or_else(|| GatewayError::Unresolved(destination.clone()))?;
        let socket = UdpSocket::bind(SocketAddr::new(self.link.bind_address, 0)).await?;
        socket.connect(peer).await?;
        Ok(socket)
    }

    async fn serve(&mut self, socket: &UdpSocket, shutdown: &mut watch::Receiver<bool>) {
        let period = Duration::from_secs(self.info.keep_alive.max(1));
        let mut keep_alive = tokio::time::interval(period);
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = self.buffer.notified() => self.push_uplinks(socket).await,
                _ = keep_alive.tick() => self.keep_alive(socket).await,
                received = socket.recv(&mut buf) => match received {
                    Ok(n) => self.handle_datagram(socket, &buf[..n]).await,
                    Err(e) => warn!(error = %e, "receive failed"),
                },
            }
        }
    }

    async fn send(&mut self, socket: &UdpSocket, packet: &Packet) {
        let bytes = match packet.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "cannot encode datagram");
                return;
            }
        };
        if let Err(e) = socket.send(&bytes).await {
            warn!(error = %e, kind = ?packet.identifier(), "send failed");
        }
    }

    async fn push_uplinks(&mut self, socket: &UdpSocket) {
        let rxpk = self.buffer.drain();
        if rxpk.is_empty() {
            return;
        }
        let n = rxpk.len() as u32;
        self.counters.rxnb += n;
        self.counters.rxfw += n;
        self.counters.upnb += 1;
        debug!(packets = n, "PUSH_DATA");
        let packet = Packet::PushData {
            token: rand::random(),
            gateway: self.mac,
            payload: PushDataPayload { rxpk, stat: None },
        };
        self.send(socket, &packet).await;
    }

    async fn keep_alive(&mut self, socket: &UdpSocket) {
        let pull = Packet::PullData {
            token: rand::random(),
            gateway: self.mac,
        };
        self.send(socket, &pull).await;

        let stat = self.stat();
        self.counters.upnb += 1;
        let push = Packet::PushData {
            token: rand::random(),
            gateway: self.mac,
            payload: PushDataPayload {
                rxpk: Vec::new(),
                stat: Some(stat),
            },
        };
        self.send(socket, &push).await;
    }

    fn stat(&self) -> Stat {
        let c = &self.counters;
        let ackr = if c.upnb == 0 {
            0.0
        } else {
            100.0 * c.ackn as f32 / c.upnb as f32
        };
        Stat {
            time: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S GMT").to_string(),
            lati: self.info.location.latitude,
            long: self.info.location.longitude,
            alti: self.info.location.altitude,
            rxnb: c.rxnb,
            rxok: c.rxnb,
            rxfw: c.rxfw,
            ackr,
            dwnb: c.dwnb,
            txnb: c.txnb,
        }
    }

    async fn handle_datagram(&mut self, socket: &UdpSocket, datagram: &[u8]) {
        let packet = match Packet::decode(datagram) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "invalid datagram from network server");
                return;
            }
        };
        match packet {
            Packet::PushAck { token } => {
                self.counters.ackn += 1;
                trace!(token, "PUSH_ACK");
            }
            Packet::PullAck { token } => trace!(token, "PULL_ACK"),
            Packet::PullResp { token, payload } => {
                self.counters.dwnb += 1;
                let result = self.inject_downlink(&payload);
                let ack = Packet::TxAck {
                    token,
                    gateway: self.mac,
                    payload: Some(match result {
                        Ok(()) => TxAckPayload::ok(),
                        Err(reason) => TxAckPayload::error(reason),
                    }),
                };
                self.send(socket, &ack).await;
            }
            other => debug!(kind = ?other.identifier(), "unexpected datagram"),
        }
    }

    fn inject_downlink(&mut self, payload: &PullRespPayload) -> Result<(), &'static str> {
        let txpk = &payload.txpk;
        let phy = STANDARD.decode(&txpk.data).map_err(|e| {
            warn!(error = %e, "txpk data is not base64");
            "PACKET_INVALID"
        })?;
        let frequency = txpk.frequency_hz();
        let delivered = self.link.forwarder.downlink(&phy, frequency, self.mac);
        self.counters.txnb += 1;
        debug!(frequency, delivered, "PULL_RESP injected");
        Ok(())
    }
}

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use lorawan_sim::gateway::semtech::Packet;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// How long a test waits for a datagram before failing
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Mock network server / bridge endpoint
///
/// Records the address of the last gateway it heard from so PULL_RESP can
/// be sent back on the same path.
pub struct MockBridge {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
}

impl MockBridge {
    /// Bind to an ephemeral localhost port
    pub async fn bind() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        Self { socket, peer: None }
    }

    /// Port the bridge listens on
    pub fn port(&self) -> u16 {
        self.socket.local_addr().unwrap().port()
    }

    /// `host:port` to hand to gateways
    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port())
    }

    /// Next datagram, decoded
    pub async fn recv(&mut self) -> Packet {
        let mut buf = vec![0u8; 65_535];
        let (n, from) = timeout(RECV_TIMEOUT, self.socket.recv_from(&mut buf))
            .await
            .expect("no datagram from gateway")
            .unwrap();
        self.peer = Some(from);
        Packet::decode(&buf[..n]).unwrap()
    }

    /// Skip datagrams until one satisfies `pred`
    pub async fn recv_matching(&mut self, pred: impl Fn(&Packet) -> bool) -> Packet {
        loop {
            let packet = self.recv().await;
            if pred(&packet) {
                return packet;
            }
        }
    }

    /// Next PUSH_DATA carrying at least one rxpk
    pub async fn recv_uplink(&mut self) -> Packet {
        self.recv_matching(|p| matches!(p, Packet::PushData { payload, .. } if !payload.rxpk.is_empty()))
            .await
    }

    /// Wait for the gateway's first PULL_DATA so downlinks have a route
    pub async fn wait_pull_data(&mut self) -> Packet {
        self.recv_matching(|p| matches!(p, Packet::PullData { .. })).await
    }

    /// Send to the last gateway heard from
    pub async fn send(&self, packet: &Packet) {
        let peer = self.peer.expect("no gateway heard yet");
        self.socket
            .send_to(&packet.encode().unwrap(), peer)
            .await
            .unwrap();
    }
}

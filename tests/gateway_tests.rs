use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use lorawan_sim::{
    config::{AesKey, DevAddr, DeviceConfig, Eui64, GatewayInfo, SimulatorConfig},
    crypto::Direction,
    device::Device,
    forwarder::Datr,
    gateway::semtech::{Packet, PullRespPayload, TxPacket},
    lorawan::{
        commands::MacCommand,
        frame::{DataFrame, FCtrl, MType},
        region::{LinkAdrReq, KEEP_CURRENT},
        RegionCode,
    },
    simulator::{BridgeAddress, MemoryStore, SimEvent, Simulator},
};
use tokio::time::timeout;

mod mock;
use mock::{MockBridge, RECV_TIMEOUT};

const NWK: AesKey = AesKey::new([0x2B; 16]);
const APP: AesKey = AesKey::new([0x3C; 16]);
const ADDR: DevAddr = DevAddr::new([0x26, 0x01, 0x1B, 0xDA]);
const GW_MAC: Eui64 = Eui64::new([0xB8, 0x27, 0xEB, 0xFF, 0xFE, 0x00, 0x00, 0x01]);

fn simulator() -> Simulator {
    Simulator::new(SimulatorConfig::default(), Arc::new(MemoryStore::new())).unwrap()
}

async fn relayed_setup(bridge: &MockBridge) -> Simulator {
    let sim = simulator();
    sim.save_bridge_address(BridgeAddress::new("127.0.0.1", bridge.port()))
        .await
        .unwrap();
    let mut info = GatewayInfo::new(GW_MAC, "relayed");
    info.active = true;
    sim.add_gateway(info).await.unwrap();
    sim.run().await.unwrap();
    sim
}

fn device(sim: &Simulator) -> Device {
    let config = DeviceConfig::new_abp(Eui64::new([0x70; 8]), ADDR, NWK, APP, RegionCode::Eu868);
    Device::new(config, sim.forwarder()).unwrap()
}

#[test_log::test(tokio::test)]
async fn relayed_uplink_reaches_bridge() {
    let mut bridge = MockBridge::bind().await;
    let sim = relayed_setup(&bridge).await;
    let mut dev = device(&sim);

    let report = dev.send_uplink(10, b"temperature=21", false).unwrap();
    assert_eq!(report.gateways, 1);

    let Packet::PushData { gateway, payload, .. } = bridge.recv_uplink().await else {
        unreachable!()
    };
    assert_eq!(gateway, GW_MAC);
    let rxpk = &payload.rxpk[0];
    assert_eq!(rxpk.frequency_hz(), report.frequency);
    assert_eq!(rxpk.datr, Datr::Lora("SF12BW125".into()));

    let phy = rxpk.payload().unwrap();
    let frame = DataFrame::open(&phy, &NWK, &APP, 0).unwrap();
    assert_eq!(frame.dev_addr, ADDR);
    assert_eq!(frame.fport, Some(10));
    assert_eq!(frame.payload, b"temperature=21");

    sim.stop().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn pull_resp_link_adr_is_answered_in_next_uplink() {
    let mut bridge = MockBridge::bind().await;
    let sim = relayed_setup(&bridge).await;
    bridge.wait_pull_data().await;
    let mut dev = device(&sim);

    let report = dev.send_uplink(1, b"ping", false).unwrap();
    bridge.recv_uplink().await;

    let downlink = DataFrame {
        mtype: MType::UnconfirmedDataDown,
        dev_addr: ADDR,
        fctrl: FCtrl::default(),
        fcnt: 0,
        fopts: MacCommand::encode_all(&[MacCommand::LinkAdrReq(LinkAdrReq {
            data_rate: 3,
            tx_power: KEEP_CURRENT,
            ch_mask: 0b101,
            ch_mask_cntl: 0,
            nb_trans: 1,
        })]),
        fport: None,
        payload: Vec::new(),
    }
    .seal(&NWK, &APP)
    .unwrap();
    let txpk = TxPacket {
        imme: true,
        tmst: None,
        freq: f64::from(report.windows.rx1.frequency) / 1_000_000.0,
        rfch: 0,
        powe: Some(14),
        modu: "LORA".into(),
        datr: Datr::Lora("SF12BW125".into()),
        codr: Some("4/5".into()),
        ipol: Some(true),
        size: downlink.len() as u16,
        data: STANDARD.encode(&downlink),
    };
    bridge
        .send(&Packet::PullResp {
            token: 0x1234,
            payload: PullRespPayload { txpk },
        })
        .await;

    let ack = bridge
        .recv_matching(|p| matches!(p, Packet::TxAck { .. }))
        .await;
    assert_eq!(ack.token(), 0x1234);

    let received = timeout(RECV_TIMEOUT, dev.receive()).await.unwrap().unwrap();
    assert_eq!(received.commands.len(), 1);
    assert_eq!(dev.data_rate(), 3);
    let active: Vec<bool> = dev.channels().iter().map(|c| c.active).collect();
    assert_eq!(active, [true, false, true]);

    dev.send_uplink(1, b"pong", false).unwrap();
    let Packet::PushData { payload, .. } = bridge.recv_uplink().await else {
        unreachable!()
    };
    let phy = payload.rxpk[0].payload().unwrap();
    let frame = DataFrame::open(&phy, &NWK, &APP, 1).unwrap();
    let answers = MacCommand::parse_all(&frame.fopts, Direction::Up).unwrap();
    assert!(matches!(answers.as_slice(), [MacCommand::LinkAdrAns(ans)] if ans.all()));

    sim.stop().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn native_gateway_talks_directly() {
    let mut server = MockBridge::bind().await;
    let sim = simulator();
    let mut info = GatewayInfo::new(Eui64::new([1, 2, 3, 4, 5, 6, 7, 8]), "native");
    info.type_gateway = true;
    info.address = "127.0.0.1".into();
    info.port = server.port();
    info.active = true;
    sim.add_gateway(info).await.unwrap();

    let mut events = sim.subscribe();
    sim.run().await.unwrap();
    let Packet::PullData { gateway, .. } = server.wait_pull_data().await else {
        unreachable!()
    };
    assert_eq!(gateway, Eui64::new([1, 2, 3, 4, 5, 6, 7, 8]));

    sim.stop().await.unwrap();
    assert!(!sim.status().await);
    assert!(sim.get_gateways().await.iter().all(|g| !g.running));

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen.contains(&SimEvent::GatewayState { id: 0, on: true }));
    assert!(seen.contains(&SimEvent::GatewayState { id: 0, on: false }));
}

#[test_log::test(tokio::test)]
async fn toggled_off_gateway_stops_forwarding() {
    let mut bridge = MockBridge::bind().await;
    let sim = relayed_setup(&bridge).await;
    bridge.wait_pull_data().await;

    assert!(!sim.toggle_state_gateway(0).await.unwrap());
    let forwarder = sim.forwarder();
    assert!(!forwarder.has_gateway(GW_MAC));

    let mut dev = device(&sim);
    let report = dev.send_uplink(1, b"lost", false).unwrap();
    assert_eq!(report.gateways, 0);

    assert!(sim.toggle_state_gateway(0).await.unwrap());
    assert!(forwarder.has_gateway(GW_MAC));
    sim.stop().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn gateway_added_while_running_starts_and_stop_waits_for_all() {
    let mut bridge = MockBridge::bind().await;
    let sim = relayed_setup(&bridge).await;
    bridge.wait_pull_data().await;

    let late_mac = Eui64::new([0xB8, 0x27, 0xEB, 0xFF, 0xFE, 0x00, 0x00, 0x02]);
    let mut late = GatewayInfo::new(late_mac, "late");
    late.active = true;
    let id = sim.add_gateway(late).await.unwrap();
    assert_eq!(id, 1);

    let forwarder = sim.forwarder();
    assert!(forwarder.has_gateway(late_mac));
    let Packet::PullData { gateway, .. } = bridge
        .recv_matching(|p| matches!(p, Packet::PullData { gateway, .. } if *gateway == late_mac))
        .await
    else {
        unreachable!()
    };
    assert_eq!(gateway, late_mac);

    let running = sim.get_gateways().await;
    assert_eq!(running.len(), 2);
    assert!(running.iter().all(|g| g.running));

    sim.stop().await.unwrap();
    assert!(!sim.status().await);
    assert!(sim.get_gateways().await.iter().all(|g| !g.running));
    assert!(!forwarder.has_gateway(GW_MAC));
    assert!(!forwarder.has_gateway(late_mac));
}

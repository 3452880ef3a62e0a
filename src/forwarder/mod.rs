//! In-memory routing between simulated devices and gateways
//!
//! The forwarder keeps two routing tables:
//! - device EUI → gateway MAC → uplink buffer of that gateway
//! - frequency → gateway MAC → device EUI → downlink channel of that device
//!
//! A device is bound to every registered gateway located within the
//! device's range. Uplinks are broadcast to all bound gateways; a downlink
//! sent by a gateway on a frequency reaches every device with a receive
//! window open there.
//!
//! All tables sit behind one [`parking_lot::Mutex`]. Pushes done under the
//! lock never block, and the lock is never held across an `.await`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

use crate::config::{Eui64, Location};

/// Per-gateway uplink queue
pub mod buffer;

/// Packets exchanged through the forwarder
pub mod packet;

pub use buffer::UplinkBuffer;
pub use packet::{Datr, DownlinkFrame, RxPacket, UplinkFrame};

/// A running gateway as seen by the forwarder
#[derive(Debug, Clone)]
pub struct GatewayDescriptor {
    /// Gateway EUI
    pub mac: Eui64,
    /// Position used for coverage
    pub location: Location,
    /// Queue the gateway task drains
    pub buffer: Arc<UplinkBuffer>,
}

/// A device as seen by the forwarder
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    /// Device EUI
    pub dev_eui: Eui64,
    /// Position used for coverage
    pub location: Location,
    /// Coverage radius in meters
    pub range: f64,
    /// Where downlinks for the device are delivered
    pub downlink: UnboundedSender<DownlinkFrame>,
}

impl DeviceDescriptor {
    fn covers(&self, gateway: &GatewayDescriptor) -> bool {
        self.location.distance_to(&gateway.location) <= self.range
    }
}

type DownlinkRoutes = HashMap<u32, HashMap<Eui64, HashMap<Eui64, UnboundedSender<DownlinkFrame>>>>;

#[derive(Debug, Default)]
struct RoutingTables {
    dev_to_gw: HashMap<Eui64, HashMap<Eui64, Arc<UplinkBuffer>>>,
    gw_to_dev: DownlinkRoutes,
    gateways: HashMap<Eui64, GatewayDescriptor>,
    devices: HashMap<Eui64, DeviceDescriptor>,
}

impl RoutingTables {
    fn prune_downlinks(&mut self) {
        for by_gw in self.gw_to_dev.values_mut() {
            by_gw.retain(|_, devs| !devs.is_empty());
        }
        self.gw_to_dev.retain(|_, by_gw| !by_gw.is_empty());
    }
}

/// Message router shared by the simulator, gateways and devices
#[derive(Debug)]
pub struct Forwarder {
    tables: Mutex<RoutingTables>,
    started: Instant,
}

impl Default for Forwarder {
    fn default() -> Self {
        Self::new()
    }
}

impl Forwarder {
    /// Create a forwarder with empty tables
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(RoutingTables::default()),
            started: Instant::now(),
        }
    }

    /// Register a gateway and bind it to every device in range
    ///
    /// Re-registering a MAC replaces the previous descriptor.
    pub fn add_gateway(&self, gateway: GatewayDescriptor) {
        let mut t = self.tables.lock();
        let covering: Vec<Eui64> = t
            .devices
            .values()
            .filter(|d| d.covers(&gateway))
            .map(|d| d.dev_eui)
            .collect();
        let bound = covering.len();
        for eui in covering {
            t.dev_to_gw
                .entry(eui)
                .or_default()
                .insert(gateway.mac, Arc::clone(&gateway.buffer));
        }
        debug!(mac = %gateway.mac, devices = bound, "gateway registered");
        t.gateways.insert(gateway.mac, gateway);
    }

    /// Remove a gateway and every route through it
    pub fn delete_gateway(&self, mac: Eui64) -> bool {
        let mut t = self.tables.lock();
        let existed = t.gateways.remove(&mac).is_some();
        for by_gw in t.dev_to_gw.values_mut() {
            by_gw.remove(&mac);
        }
        for by_gw in t.gw_to_dev.values_mut() {
            by_gw.remove(&mac);
        }
        t.prune_downlinks();
        debug!(mac = %mac, existed, "gateway deregistered");
        existed
    }

    /// Register a device and bind it to every gateway in range
    ///
    /// Returns the number of gateways the device is bound to.
    pub fn add_device(&self, device: DeviceDescriptor) -> usize {
        let mut t = self.tables.lock();
        let bindings: HashMap<Eui64, Arc<UplinkBuffer>> = t
            .gateways
            .values()
            .filter(|g| device.covers(g))
            .map(|g| (g.mac, Arc::clone(&g.buffer)))
            .collect();
        let bound = bindings.len();
        debug!(dev_eui = %device.dev_eui, gateways = bound, "device registered");
        t.dev_to_gw.insert(device.dev_eui, bindings);
        t.devices.insert(device.dev_eui, device);
        bound
    }

    /// Remove every routing entry of a device
    pub fn delete_device(&self, dev_eui: Eui64) -> bool {
        let mut t = self.tables.lock();
        let existed = t.devices.remove(&dev_eui).is_some();
        t.dev_to_gw.remove(&dev_eui);
        for by_gw in t.gw_to_dev.values_mut() {
            for devs in by_gw.values_mut() {
                devs.remove(&dev_eui);
            }
        }
        t.prune_downlinks();
        existed
    }

    /// Listen for downlinks on `frequency` through every bound gateway
    ///
    /// Returns the number of gateways the window was opened on.
    pub fn open_receive_window(&self, dev_eui: Eui64, frequency: u32) -> usize {
        let mut t = self.tables.lock();
        let Some(sender) = t.devices.get(&dev_eui).map(|d| d.downlink.clone()) else {
            return 0;
        };
        let gateways: Vec<Eui64> = t
            .dev_to_gw
            .get(&dev_eui)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default();
        let by_gw = t.gw_to_dev.entry(frequency).or_default();
        for mac in &gateways {
            by_gw
                .entry(*mac)
                .or_default()
                .insert(dev_eui, sender.clone());
        }
        trace!(dev_eui = %dev_eui, frequency, gateways = gateways.len(), "receive window opened");
        gateways.len()
    }

    /// Stop listening on `frequency`
    pub fn close_receive_window(&self, dev_eui: Eui64, frequency: u32) {
        let mut t = self.tables.lock();
        if let Some(by_gw) = t.gw_to_dev.get_mut(&frequency) {
            for devs in by_gw.values_mut() {
                devs.remove(&dev_eui);
            }
        }
        t.prune_downlinks();
    }

    /// Gateways a device is currently bound to
    pub fn bound_gateways(&self, dev_eui: Eui64) -> Vec<Eui64> {
        let t = self.tables.lock();
        let mut macs: Vec<Eui64> = t
            .dev_to_gw
            .get(&dev_eui)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default();
        macs.sort();
        macs
    }

    /// Whether a gateway is registered
    pub fn has_gateway(&self, mac: Eui64) -> bool {
        self.tables.lock().gateways.contains_key(&mac)
    }

    /// Broadcast a device's frame to every bound gateway
    ///
    /// Returns how many gateway buffers received a copy.
    pub fn uplink(&self, frame: &UplinkFrame, dev_eui: Eui64) -> usize {
        let tmst = self.started.elapsed().as_micros() as u32;
        let packet = RxPacket::from_uplink(frame, tmst);
        let t = self.tables.lock();
        let Some(buffers) = t.dev_to_gw.get(&dev_eui) else {
            debug!(dev_eui = %dev_eui, "uplink from unbound device");
            return 0;
        };
        for buffer in buffers.values() {
            buffer.push(packet.clone());
        }
        debug!(dev_eui = %dev_eui, frequency = frame.frequency, fanout = buffers.len(), "uplink forwarded");
        buffers.len()
    }

    /// Deliver a gateway's transmission to every device listening on
    /// (`frequency`, `gateway`)
    pub fn downlink(&self, phy_payload: &[u8], frequency: u32, gateway: Eui64) -> usize {
        let t = self.tables.lock();
        let Some(devices) = t.gw_to_dev.get(&frequency).and_then(|m| m.get(&gateway)) else {
            debug!(mac = %gateway, frequency, "downlink with no open receive window");
            return 0;
        };
        let frame = DownlinkFrame {
            phy_payload: phy_payload.to_vec(),
            frequency,
            gateway,
        };
        let delivered = devices
            .values()
            .filter(|tx| tx.send(frame.clone()).is_ok())
            .count();
        debug!(mac = %gateway, frequency, delivered, "downlink forwarded");
        delivered
    }

    /// Clear every table in place
    ///
    /// All holders of this forwarder observe the cleared state.
    pub fn reset(&self) {
        *self.tables.lock() = RoutingTables::default();
        debug!("forwarder reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lorawan::region::DataRateSpec;
    use tokio::sync::mpsc;

    fn gateway(n: u8, location: Location) -> GatewayDescriptor {
        GatewayDescriptor {
            mac: Eui64::new([n; 8]),
            location,
            buffer: Arc::new(UplinkBuffer::new()),
        }
    }

    fn frame() -> UplinkFrame {
        UplinkFrame {
            phy_payload: vec![0x40; 12],
            frequency: 868_100_000,
            data_rate: DataRateSpec::Lora {
                spreading_factor: 12,
                bandwidth_khz: 125,
            },
            coding_rate: Some("4/5"),
            channel: 0,
            rssi: -80,
            snr: 5.0,
        }
    }

    #[test]
    fn uplink_reaches_only_gateways_in_range() {
        let fwd = Forwarder::new();
        let near = gateway(1, Location::new(45.0, 9.0, 0));
        let far = gateway(2, Location::new(46.0, 9.0, 0));
        fwd.add_gateway(near.clone());
        fwd.add_gateway(far.clone());

        let (tx, _rx) = mpsc::unbounded_channel();
        let bound = fwd.add_device(DeviceDescriptor {
            dev_eui: Eui64::new([9; 8]),
            location: Location::new(45.001, 9.0, 0),
            range: 1_000.0,
            downlink: tx,
        });
        assert_eq!(bound, 1);
        assert_eq!(fwd.uplink(&frame(), Eui64::new([9; 8])), 1);
        assert_eq!(near.buffer.len(), 1);
        assert_eq!(far.buffer.len(), 0);
    }

    #[test]
    fn downlink_needs_open_window() {
        let fwd = Forwarder::new();
        let gw = gateway(1, Location::default());
        fwd.add_gateway(gw.clone());
        let eui = Eui64::new([9; 8]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        fwd.add_device(DeviceDescriptor {
            dev_eui: eui,
            location: Location::default(),
            range: 10.0,
            downlink: tx,
        });

        assert_eq!(fwd.downlink(&[1, 2, 3], 869_525_000, gw.mac), 0);
        assert_eq!(fwd.open_receive_window(eui, 869_525_000), 1);
        assert_eq!(fwd.downlink(&[1, 2, 3], 869_525_000, gw.mac), 1);
        assert_eq!(rx.try_recv().unwrap().phy_payload, [1, 2, 3]);
        assert_eq!(fwd.downlink(&[1], 868_100_000, gw.mac), 0);

        fwd.close_receive_window(eui, 869_525_000);
        assert_eq!(fwd.downlink(&[1, 2, 3], 869_525_000, gw.mac), 0);
    }

    #[test]
    fn reset_is_visible_through_every_handle() {
        let fwd = Arc::new(Forwarder::new());
        let other = Arc::clone(&fwd);
        fwd.add_gateway(gateway(1, Location::default()));
        other.reset();
        assert!(!fwd.has_gateway(Eui64::new([1; 8])));
    }

    #[test]
    fn deleting_gateway_unbinds_devices() {
        let fwd = Forwarder::new();
        let gw = gateway(1, Location::default());
        let eui = Eui64::new([9; 8]);
        let (tx, _rx) = mpsc::unbounded_channel();
        fwd.add_device(DeviceDescriptor {
            dev_eui: eui,
            location: Location::default(),
            range: 10.0,
            downlink: tx,
        });
        fwd.add_gateway(gw.clone());
        assert_eq!(fwd.bound_gateways(eui), [gw.mac]);
        assert!(fwd.delete_gateway(gw.mac));
        assert_eq!(fwd.uplink(&frame(), eui), 0);
        assert!(fwd.delete_device(eui));
        assert!(!fwd.delete_device(eui));
    }
}

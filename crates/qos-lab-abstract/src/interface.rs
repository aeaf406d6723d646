use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flow::{FiveTuple, FlowCounters, FlowKey};
use crate::policy::VariantPolicy;
use crate::topology::{NodeId, NodePlacement};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeSet(pub Vec<NodeId>);

impl NodeSet {
    pub fn get(&self, index: usize) -> Option<NodeId> {
        self.0.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.0.iter().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceHandle {
    pub node: NodeId,
    /// Engine-wide device index.
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceSet(pub Vec<DeviceHandle>);

impl DeviceSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceHandle> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AddressSet(pub Vec<Ipv4Addr>);

impl AddressSet {
    pub fn get(&self, index: usize) -> Option<Ipv4Addr> {
        self.0.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Subnet {
    pub base: Ipv4Addr,
    pub prefix_len: u8,
}

impl Subnet {
    pub const fn new(base: Ipv4Addr, prefix_len: u8) -> Self {
        Self { base, prefix_len }
    }

    fn mask(&self) -> u32 {
        match self.prefix_len {
            0 => 0,
            len => u32::MAX << (32 - u32::from(len.min(32))),
        }
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let mask = self.mask();
        u32::from(addr) & mask == u32::from(self.base) & mask
    }

    /// The `n`th host address (1-based); `None` once the subnet is exhausted.
    pub fn host(&self, n: u32) -> Option<Ipv4Addr> {
        let capacity = (!self.mask()).saturating_sub(1);
        if n == 0 || n > capacity {
            return None;
        }
        Some(Ipv4Addr::from((u32::from(self.base) & self.mask()) + n))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MacRole {
    AccessPoint,
    Station,
}

/// Link-layer parameters; engines interpret what they support and reject the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediumParams {
    Wifi {
        standard: String,
        ssid: String,
        role: MacRole,
        beacon_jitter: bool,
    },
    Csma {
        data_rate_mbps: f64,
        delay_ms: u64,
    },
}

/// A receiving application bound to `port` on `node`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkApp {
    pub node: NodeId,
    pub port: u16,
    pub start_ms: u64,
    pub stop_ms: u64,
}

/// A constant-bit-rate sender. Counters for its packets are reported under `flow`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceApp {
    pub flow: FlowKey,
    pub node: NodeId,
    pub remote: Ipv4Addr,
    pub port: u16,
    pub packet_size: u32,
    pub interval_ms: u64,
    pub start_ms: u64,
    pub stop_ms: u64,
    pub max_packets: Option<u64>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("unknown device {0}")]
    UnknownDevice(u32),
    #[error("unsupported rate mode '{0}'")]
    UnsupportedRateMode(String),
    #[error("no address assigned to node {0}")]
    MissingAddress(NodeId),
    #[error("address pool {0} exhausted")]
    AddressPoolExhausted(Ipv4Addr),
    #[error("port {port} already bound on node {node}")]
    PortInUse { node: NodeId, port: u16 },
    #[error("invalid medium parameters: {0}")]
    InvalidMedium(String),
    #[error("session has already run")]
    AlreadyRun,
}

/// An external packet-delivery engine.
pub trait SimulationEngine {
    /// Open a session scoped to one variant's run.
    /// The policy is owned by the session; nothing outlives it.
    fn open(&mut self, policy: VariantPolicy) -> Result<Box<dyn EngineSession + '_>, EngineError>;
}

/// One variant's run. Build the topology, run once, read counters, destroy.
pub trait EngineSession {
    /// Create `count` nodes; ids are returned in creation order.
    fn create_nodes(&mut self, count: usize) -> Result<NodeSet, EngineError>;

    /// Attach placements (and motion policies) to already-created nodes.
    fn install_mobility(&mut self, placements: &[NodePlacement]) -> Result<(), EngineError>;

    /// Install one device per node on a shared medium.
    fn install_link_layer(
        &mut self,
        nodes: &NodeSet,
        medium: &MediumParams,
    ) -> Result<DeviceSet, EngineError>;

    /// Assign addresses from `subnet`, in device order.
    /// Successive calls on the same subnet continue numbering.
    fn assign_addresses(
        &mut self,
        devices: &DeviceSet,
        subnet: Subnet,
    ) -> Result<AddressSet, EngineError>;

    fn install_traffic_sink(&mut self, sink: SinkApp) -> Result<(), EngineError>;

    fn install_traffic_source(&mut self, source: SourceApp) -> Result<(), EngineError>;

    /// Advance simulated time until `stop_ms`.
    fn run(&mut self, stop_ms: u64) -> Result<(), EngineError>;

    /// Counters for every flow that sent at least one packet.
    fn collect_flow_counters(&self) -> BTreeMap<FlowKey, FlowCounters>;

    /// The classification tuple for a flow, if the engine knows it.
    fn classify(&self, _key: FlowKey) -> Option<FiveTuple> {
        None
    }

    /// Release the session.
    fn destroy(self: Box<Self>);
}

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::topology::NodeId;

/// Opaque flow identity, carried from a descriptor into the engine and back
/// out on the counters it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowKey(pub u32);

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Station to server.
    Forward,
    /// Server back to station.
    Return,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowDescriptor {
    pub key: FlowKey,
    pub source: NodeId,
    pub destination: NodeId,
    pub direction: Direction,
    pub packet_size: u32,
    pub interval_ms: u64,
    pub start_ms: u64,
    pub stop_ms: u64,
    /// Listening port at the destination; unique across a scenario.
    pub port: u16,
    pub sink_start_ms: u64,
    /// Stop sending after this many packets even if `stop_ms` is not reached.
    #[serde(default)]
    pub max_packets: Option<u64>,
}

/// Raw per-flow counters as reported by an engine after a run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FlowCounters {
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub lost_packets: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub delay_sum_ms: f64,
    pub jitter_sum_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiveTuple {
    pub source: Ipv4Addr,
    pub source_port: u16,
    pub destination: Ipv4Addr,
    pub destination_port: u16,
    pub protocol: u8,
}

impl fmt::Display for FiveTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.source, self.source_port, self.destination, self.destination_port
        )
    }
}

use serde::{Deserialize, Serialize};

/// Node identifier, unique within one run.
pub type NodeId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    /// Wireless station originating forward traffic.
    Source,
    /// Wired server terminating forward traffic.
    Sink,
    /// Relay between the wireless and wired segments.
    AccessPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MotionPolicy {
    Fixed,
    /// Pick a new random direction every `change_every_ms` and keep moving at `speed_mps`.
    RandomWalk2d {
        change_every_ms: u64,
        speed_mps: f64,
        bounds: Bounds,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePlacement {
    pub id: NodeId,
    pub role: NodeRole,
    /// Initial position; moving nodes start here.
    pub position: Position,
    pub motion: MotionPolicy,
}

use std::f64::consts::PI;

use qos_lab_abstract::{
    Bounds, Direction, FlowDescriptor, FlowKey, MotionPolicy, NodeId, NodePlacement, NodeRole,
    Position, ScenarioParams, VariantPolicy,
};
use tracing::debug;

use crate::error::GenerateError;
use crate::policy::Variant;

pub const SERVER_POSITION: Position = Position {
    x: 30.0,
    y: 0.0,
    z: 0.0,
};

const FIRST_PORT: u16 = 5000;
/// Destination ports available from `FIRST_PORT` up to 65535.
const PORT_BUDGET: u64 = (u16::MAX - FIRST_PORT) as u64 + 1;

const FORWARD_INTERVAL_STEP_MS: u64 = 10;
const FORWARD_START_MS: u64 = 5_000;
const FORWARD_START_STEP_MS: u64 = 2_000;
const FORWARD_SINK_START_MS: u64 = 1_000;

const RETURN_INTERVAL_EXTRA_MS: u64 = 20;
const RETURN_START_MS: u64 = 10_000;
const RETURN_START_STEP_MS: u64 = 2_000;
const RETURN_SINK_START_MS: u64 = 2_000;

/// Random walk applied to every station.
const STATION_MOTION: MotionPolicy = MotionPolicy::RandomWalk2d {
    change_every_ms: 5_000,
    speed_mps: 0.5,
    bounds: Bounds {
        x_min: -100.0,
        x_max: 100.0,
        y_min: -100.0,
        y_max: 100.0,
    },
};

/// Everything one variant's run needs: where nodes sit, what they send, and under which policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub station_count: u32,
    pub placements: Vec<NodePlacement>,
    pub flows: Vec<FlowDescriptor>,
    pub policy: VariantPolicy,
}

impl Scenario {
    pub fn access_point(&self) -> NodeId {
        self.station_count
    }

    pub fn server(&self) -> NodeId {
        self.station_count + 1
    }

    pub fn node_count(&self) -> usize {
        self.placements.len()
    }
}

/// Build the scenario for `variant`. Pure: identical inputs give identical scenarios,
/// and only the policy depends on the variant.
pub fn generate(params: &ScenarioParams, variant: &str) -> Result<Scenario, GenerateError> {
    let variant: Variant = variant.parse()?;
    validate(params)?;

    let placements = place_nodes(params.station_count, params.radius_m);
    let flows = schedule_flows(params)?;
    debug!(
        "Generated {} placements and {} flows for {}",
        placements.len(),
        flows.len(),
        variant
    );

    Ok(Scenario {
        station_count: params.station_count,
        placements,
        flows,
        policy: variant.policy(),
    })
}

fn validate(params: &ScenarioParams) -> Result<(), GenerateError> {
    if !(params.radius_m.is_finite() && params.radius_m > 0.0) {
        return Err(invalid("radius_m", params.radius_m));
    }
    if params.base_interval_ms == 0 {
        return Err(invalid("base_interval_ms", params.base_interval_ms));
    }
    if params.packet_size == 0 {
        return Err(invalid("packet_size", params.packet_size));
    }
    if params.duration_ms == 0 {
        return Err(invalid("duration_ms", params.duration_ms));
    }
    // Two ports per station, checked before anything is allocated.
    if 2 * u64::from(params.station_count) > PORT_BUDGET {
        return Err(invalid("station_count", params.station_count));
    }
    Ok(())
}

pub(crate) fn invalid(name: &'static str, value: impl ToString) -> GenerateError {
    GenerateError::InvalidParameter {
        name,
        value: value.to_string(),
    }
}

/// Stations evenly spread on a circle around the access point, then the access point,
/// then the wired server.
fn place_nodes(station_count: u32, radius: f64) -> Vec<NodePlacement> {
    let mut placements: Vec<NodePlacement> = (0..station_count)
        .map(|i| {
            let angle = f64::from(i) * 2.0 * PI / f64::from(station_count);
            NodePlacement {
                id: i,
                role: NodeRole::Source,
                position: Position::new(radius * angle.cos(), radius * angle.sin(), 0.0),
                motion: STATION_MOTION,
            }
        })
        .collect();

    placements.push(NodePlacement {
        id: station_count,
        role: NodeRole::AccessPoint,
        position: Position::default(),
        motion: MotionPolicy::Fixed,
    });
    placements.push(NodePlacement {
        id: station_count + 1,
        role: NodeRole::Sink,
        position: SERVER_POSITION,
        motion: MotionPolicy::Fixed,
    });
    placements
}

fn schedule_flows(params: &ScenarioParams) -> Result<Vec<FlowDescriptor>, GenerateError> {
    let n = params.station_count;
    let server = n + 1;
    // In range: `validate` caps `2 * n` at the port budget.
    let port = |k: u32| FIRST_PORT + k as u16;
    let interval = |extra: u64| {
        params
            .base_interval_ms
            .checked_add(extra)
            .ok_or_else(|| invalid("base_interval_ms", params.base_interval_ms))
    };
    let mut flows = Vec::with_capacity(2 * n as usize);

    for i in 0..n {
        let step = u64::from(i);
        flows.push(FlowDescriptor {
            key: FlowKey(i),
            source: i,
            destination: server,
            direction: Direction::Forward,
            packet_size: params.packet_size,
            interval_ms: interval(FORWARD_INTERVAL_STEP_MS * step)?,
            start_ms: FORWARD_START_MS + FORWARD_START_STEP_MS * step,
            stop_ms: params.duration_ms,
            port: port(i),
            sink_start_ms: FORWARD_SINK_START_MS,
            max_packets: None,
        });
    }

    for i in 0..n {
        let step = u64::from(i);
        flows.push(FlowDescriptor {
            key: FlowKey(n + i),
            source: server,
            destination: i,
            direction: Direction::Return,
            packet_size: params.packet_size,
            interval_ms: interval(RETURN_INTERVAL_EXTRA_MS)?,
            start_ms: RETURN_START_MS + RETURN_START_STEP_MS * step,
            stop_ms: params.duration_ms,
            port: port(n + i),
            sink_start_ms: RETURN_SINK_START_MS,
            max_packets: None,
        });
    }

    for flow in &flows {
        check_window(flow, params.duration_ms)?;
    }
    Ok(flows)
}

pub(crate) fn check_window(flow: &FlowDescriptor, duration_ms: u64) -> Result<(), GenerateError> {
    let fits = |start: u64| start < flow.stop_ms && flow.stop_ms <= duration_ms;
    if fits(flow.start_ms) && fits(flow.sink_start_ms) {
        return Ok(());
    }
    let station = match flow.direction {
        Direction::Forward => flow.source,
        Direction::Return => flow.destination,
    };
    Err(GenerateError::InvalidSchedule {
        flow: format!("{:?} flow of station {}", flow.direction, station).to_lowercase(),
        start_ms: flow.start_ms,
        stop_ms: flow.stop_ms,
        duration_ms,
    })
}

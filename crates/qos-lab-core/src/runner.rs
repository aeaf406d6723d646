use std::net::Ipv4Addr;

use qos_lab_abstract::{
    AddressSet, Direction, EngineError, EngineSession, FiveTuple, FlowCounters, FlowDescriptor,
    MacRole, MediumParams, NodeId, NodePlacement, NodeSet, PolicyOverride, ScenarioParams,
    SimulationEngine, SinkApp, SourceApp, Subnet, VariantPolicy,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregate::{FlowMetrics, VariantSummary, summarize};
use crate::error::RunError;
use crate::generator::{Scenario, generate};

pub const WIFI_SUBNET: Subnet = Subnet::new(Ipv4Addr::new(10, 1, 1, 0), 24);
pub const BACKHAUL_SUBNET: Subnet = Subnet::new(Ipv4Addr::new(10, 1, 2, 0), 24);
pub const SSID: &str = "voip-qos";
pub const WIFI_STANDARD: &str = "802.11ac";
pub const BACKHAUL_RATE_MBPS: f64 = 100.0;
pub const BACKHAUL_DELAY_MS: u64 = 2;

/// A variant to run, with optional experiment-level tweaks to its preset policy.
#[derive(Debug, Clone, Default)]
pub struct VariantRequest {
    pub name: String,
    pub overrides: PolicyOverride,
}

impl VariantRequest {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overrides: PolicyOverride::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowReport {
    pub descriptor: FlowDescriptor,
    pub tuple: Option<FiveTuple>,
    pub counters: FlowCounters,
    pub metrics: FlowMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct VariantReport {
    pub summary: VariantSummary,
    pub policy: VariantPolicy,
    /// Flows that transmitted during the run, in descriptor order.
    pub flows: Vec<FlowReport>,
}

pub type VariantOutcome = Result<VariantReport, RunError>;

/// Run each variant to completion before starting the next. A failed variant is
/// reported in its slot and does not stop the ones after it.
pub fn run_variants(
    engine: &mut dyn SimulationEngine,
    params: &ScenarioParams,
    requests: &[VariantRequest],
) -> Vec<VariantOutcome> {
    requests
        .iter()
        .map(|request| {
            let outcome = run_variant(engine, params, request);
            if let Err(e) = &outcome {
                warn!("{e}");
            }
            outcome
        })
        .collect()
}

pub fn run_variant(
    engine: &mut dyn SimulationEngine,
    params: &ScenarioParams,
    request: &VariantRequest,
) -> VariantOutcome {
    let engine_failure = |source: EngineError| RunError::Engine {
        variant: request.name.clone(),
        source,
    };

    let scenario = generate(params, &request.name).map_err(|source| RunError::Generate {
        variant: request.name.clone(),
        source,
    })?;
    let mut policy = scenario.policy.clone();
    request.overrides.apply_to(&mut policy);

    info!(
        "Running variant {} with {} stations, {} flows, {} ms",
        policy.name,
        scenario.station_count,
        scenario.flows.len(),
        params.duration_ms
    );

    let mut session = engine.open(policy.clone()).map_err(engine_failure)?;
    let built = build_and_run(session.as_mut(), &scenario, params.duration_ms);
    let report =
        built.map(|()| harvest(session.as_ref(), &scenario, policy, params.duration_ms));
    session.destroy();

    let report = report.map_err(engine_failure)?;
    info!(
        "Variant {} finished: {:.2} Mbps, {:.3} ms delay, {:.2}% loss",
        report.summary.variant,
        report.summary.avg_throughput_mbps,
        report.summary.avg_delay_ms,
        report.summary.loss_rate_percent
    );
    Ok(report)
}

/// Engine ids for the scenario's nodes, looked up by scenario node id.
struct NodeMap<'a> {
    nodes: &'a NodeSet,
}

impl NodeMap<'_> {
    fn engine_id(&self, id: NodeId) -> Result<NodeId, EngineError> {
        self.nodes
            .get(id as usize)
            .ok_or(EngineError::UnknownNode(id))
    }

    fn subset(&self, ids: impl IntoIterator<Item = NodeId>) -> Result<NodeSet, EngineError> {
        ids.into_iter()
            .map(|id| self.engine_id(id))
            .collect::<Result<Vec<_>, _>>()
            .map(NodeSet)
    }
}

fn build_and_run(
    session: &mut dyn EngineSession,
    scenario: &Scenario,
    duration_ms: u64,
) -> Result<(), EngineError> {
    let nodes = session.create_nodes(scenario.node_count())?;
    let map = NodeMap { nodes: &nodes };

    let placements = scenario
        .placements
        .iter()
        .map(|p| {
            map.engine_id(p.id)
                .map(|id| NodePlacement { id, ..p.clone() })
        })
        .collect::<Result<Vec<_>, EngineError>>()?;
    session.install_mobility(&placements)?;

    let access_point = map.subset([scenario.access_point()])?;
    let stations = map.subset(0..scenario.station_count)?;
    let wired = map.subset([scenario.access_point(), scenario.server()])?;

    let wifi = |role| MediumParams::Wifi {
        standard: WIFI_STANDARD.to_string(),
        ssid: SSID.to_string(),
        role,
        beacon_jitter: false,
    };
    let ap_devices = session.install_link_layer(&access_point, &wifi(MacRole::AccessPoint))?;
    let sta_devices = session.install_link_layer(&stations, &wifi(MacRole::Station))?;
    let wired_devices = session.install_link_layer(
        &wired,
        &MediumParams::Csma {
            data_rate_mbps: BACKHAUL_RATE_MBPS,
            delay_ms: BACKHAUL_DELAY_MS,
        },
    )?;

    let sta_addresses = session.assign_addresses(&sta_devices, WIFI_SUBNET)?;
    session.assign_addresses(&ap_devices, WIFI_SUBNET)?;
    let wired_addresses = session.assign_addresses(&wired_devices, BACKHAUL_SUBNET)?;

    let destination_address = |flow: &FlowDescriptor| -> Result<Ipv4Addr, EngineError> {
        let found = match flow.direction {
            Direction::Forward => wired_addresses.get(1),
            Direction::Return => address_at(&sta_addresses, flow.destination),
        };
        found.ok_or(EngineError::MissingAddress(flow.destination))
    };

    for flow in &scenario.flows {
        session.install_traffic_sink(SinkApp {
            node: map.engine_id(flow.destination)?,
            port: flow.port,
            start_ms: flow.sink_start_ms,
            stop_ms: flow.stop_ms,
        })?;
    }
    for flow in &scenario.flows {
        session.install_traffic_source(SourceApp {
            flow: flow.key,
            node: map.engine_id(flow.source)?,
            remote: destination_address(flow)?,
            port: flow.port,
            packet_size: flow.packet_size,
            interval_ms: flow.interval_ms,
            start_ms: flow.start_ms,
            stop_ms: flow.stop_ms,
            max_packets: flow.max_packets,
        })?;
    }

    session.run(duration_ms)
}

fn address_at(addresses: &AddressSet, station: NodeId) -> Option<Ipv4Addr> {
    addresses.get(station as usize)
}

pub(crate) fn harvest(
    session: &dyn EngineSession,
    scenario: &Scenario,
    policy: VariantPolicy,
    duration_ms: u64,
) -> VariantReport {
    let counters = session.collect_flow_counters();
    let summary = summarize(&policy.name, &counters, duration_ms);
    let flows = scenario
        .flows
        .iter()
        .filter_map(|descriptor| {
            let counters = *counters.get(&descriptor.key)?;
            Some(FlowReport {
                descriptor: descriptor.clone(),
                tuple: session.classify(descriptor.key),
                counters,
                metrics: FlowMetrics::from_counters(&counters, duration_ms),
            })
        })
        .collect();
    VariantReport {
        summary,
        policy,
        flows,
    }
}

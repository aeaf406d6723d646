use std::net::Ipv4Addr;

use qos_lab_abstract::{
    Direction, EngineError, EngineSession, FlowDescriptor, FlowKey, MediumParams, MotionPolicy,
    NodePlacement, NodeRole, PointToPointParams, Position, SimulationEngine, SinkApp, SourceApp,
    Subnet,
};
use tracing::{info, warn};

use crate::error::{GenerateError, RunError};
use crate::generator::{Scenario, check_window, invalid};
use crate::policy::Variant;
use crate::runner::{VariantOutcome, VariantRequest, harvest};

pub const LINK_SUBNET: Subnet = Subnet::new(Ipv4Addr::new(10, 1, 1, 0), 24);

const SENDER: u32 = 0;
const RECEIVER: u32 = 1;

/// Sender and receiver on one wired link, carrying a single forward flow.
pub fn point_to_point_scenario(
    params: &PointToPointParams,
    variant: &str,
) -> Result<Scenario, GenerateError> {
    let variant: Variant = variant.parse()?;
    if !(params.data_rate_mbps.is_finite() && params.data_rate_mbps > 0.0) {
        return Err(invalid("data_rate_mbps", params.data_rate_mbps));
    }
    if params.packet_size == 0 {
        return Err(invalid("packet_size", params.packet_size));
    }
    if params.interval_ms == 0 {
        return Err(invalid("interval_ms", params.interval_ms));
    }
    if params.max_packets == Some(0) {
        return Err(invalid("max_packets", 0));
    }

    let flow = FlowDescriptor {
        key: FlowKey(0),
        source: SENDER,
        destination: RECEIVER,
        direction: Direction::Forward,
        packet_size: params.packet_size,
        interval_ms: params.interval_ms,
        start_ms: params.source_start_ms,
        stop_ms: params.duration_ms,
        port: params.port,
        sink_start_ms: params.sink_start_ms,
        max_packets: params.max_packets,
    };
    check_window(&flow, params.duration_ms)?;

    let fixed = |id, role, x| NodePlacement {
        id,
        role,
        position: Position::new(x, 20.0, 0.0),
        motion: MotionPolicy::Fixed,
    };
    Ok(Scenario {
        station_count: 0,
        placements: vec![
            fixed(SENDER, NodeRole::Source, 10.0),
            fixed(RECEIVER, NodeRole::Sink, 50.0),
        ],
        flows: vec![flow],
        policy: variant.policy(),
    })
}

/// Run one variant on the wired pair. The link has no MAC queue policy, so
/// variants differ only in name; it mostly serves as an engine baseline.
pub fn run_point_to_point(
    engine: &mut dyn SimulationEngine,
    params: &PointToPointParams,
    request: &VariantRequest,
) -> VariantOutcome {
    let engine_failure = |source: EngineError| RunError::Engine {
        variant: request.name.clone(),
        source,
    };
    let scenario =
        point_to_point_scenario(params, &request.name).map_err(|source| RunError::Generate {
            variant: request.name.clone(),
            source,
        })?;
    let mut policy = scenario.policy.clone();
    request.overrides.apply_to(&mut policy);

    let span_m = match scenario.placements.as_slice() {
        [a, b] => a.position.distance_to(&b.position),
        _ => 0.0,
    };
    info!(
        "Running variant {} on a {} Mbps point-to-point link ({:.0} m), {} ms",
        policy.name, params.data_rate_mbps, span_m, params.duration_ms
    );
    let mut session = engine.open(policy.clone()).map_err(engine_failure)?;
    let built = build_and_run(session.as_mut(), &scenario, params);
    let report = built.map(|()| harvest(session.as_ref(), &scenario, policy, params.duration_ms));
    session.destroy();
    report.map_err(engine_failure)
}

pub fn run_point_to_point_variants(
    engine: &mut dyn SimulationEngine,
    params: &PointToPointParams,
    requests: &[VariantRequest],
) -> Vec<VariantOutcome> {
    requests
        .iter()
        .map(|request| {
            let outcome = run_point_to_point(engine, params, request);
            if let Err(e) = &outcome {
                warn!("{e}");
            }
            outcome
        })
        .collect()
}

fn build_and_run(
    session: &mut dyn EngineSession,
    scenario: &Scenario,
    params: &PointToPointParams,
) -> Result<(), EngineError> {
    let nodes = session.create_nodes(scenario.node_count())?;
    let engine_id = |id: u32| nodes.get(id as usize).ok_or(EngineError::UnknownNode(id));

    let placements = scenario
        .placements
        .iter()
        .map(|p| engine_id(p.id).map(|id| NodePlacement { id, ..p.clone() }))
        .collect::<Result<Vec<_>, EngineError>>()?;
    session.install_mobility(&placements)?;

    let devices = session.install_link_layer(
        &nodes,
        &MediumParams::Csma {
            data_rate_mbps: params.data_rate_mbps,
            delay_ms: params.delay_ms,
        },
    )?;
    let addresses = session.assign_addresses(&devices, LINK_SUBNET)?;
    let remote = addresses
        .get(RECEIVER as usize)
        .ok_or(EngineError::MissingAddress(RECEIVER))?;

    for flow in &scenario.flows {
        session.install_traffic_sink(SinkApp {
            node: engine_id(flow.destination)?,
            port: flow.port,
            start_ms: flow.sink_start_ms,
            stop_ms: flow.stop_ms,
        })?;
        session.install_traffic_source(SourceApp {
            flow: flow.key,
            node: engine_id(flow.source)?,
            remote,
            port: flow.port,
            packet_size: flow.packet_size,
            interval_ms: flow.interval_ms,
            start_ms: flow.start_ms,
            stop_ms: flow.stop_ms,
            max_packets: flow.max_packets,
        })?;
    }
    session.run(params.duration_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_link_is_one_capped_flow() {
        let scenario = point_to_point_scenario(&PointToPointParams::default(), "EDCA").unwrap();
        assert_eq!(scenario.node_count(), 2);
        assert_eq!(scenario.flows.len(), 1);
        let flow = &scenario.flows[0];
        assert_eq!((flow.source, flow.destination), (0, 1));
        assert_eq!(flow.packet_size, 160);
        assert_eq!(flow.interval_ms, 20);
        assert_eq!(flow.max_packets, Some(1000));
        assert_eq!((flow.start_ms, flow.stop_ms), (2_000, 10_000));
        assert_eq!(flow.sink_start_ms, 1_000);
        assert!(
            scenario
                .placements
                .iter()
                .all(|p| p.motion == MotionPolicy::Fixed)
        );
    }

    #[test]
    fn link_parameters_are_validated() {
        let base = PointToPointParams::default();
        let cases = [
            PointToPointParams {
                data_rate_mbps: 0.0,
                ..base.clone()
            },
            PointToPointParams {
                interval_ms: 0,
                ..base.clone()
            },
            PointToPointParams {
                max_packets: Some(0),
                ..base.clone()
            },
        ];
        for case in cases {
            assert!(matches!(
                point_to_point_scenario(&case, "EDCA"),
                Err(GenerateError::InvalidParameter { .. })
            ));
        }
        let late = PointToPointParams {
            source_start_ms: 10_000,
            ..base.clone()
        };
        assert!(matches!(
            point_to_point_scenario(&late, "EDCA"),
            Err(GenerateError::InvalidSchedule { .. })
        ));
        assert!(matches!(
            point_to_point_scenario(&base, "DCF"),
            Err(GenerateError::InvalidVariant(_))
        ));
    }
}

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap, VecDeque};
use std::net::Ipv4Addr;

use qos_lab_abstract::{
    AddressSet, ChannelConfig, DeviceHandle, DeviceSet, EngineError, EngineSession, FiveTuple,
    FlowCounters, FlowKey, MediumParams, NodeId, NodePlacement, NodeSet, RateAdaptation,
    SimulationEngine, SinkApp, SourceApp, Subnet, VariantPolicy,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::rate::{RateController, parse_vht_mode};

/// IPv4 + UDP header bytes carried on top of every payload.
const HEADER_BYTES: u64 = 28;
/// Fixed PHY preamble per wireless frame.
const PREAMBLE_US: u64 = 40;
/// Drop-tail depth of wired devices.
const WIRED_QUEUE_PACKETS: usize = 100;
const FIRST_EPHEMERAL_PORT: u16 = 49153;
const UDP: u8 = 17;

#[derive(Debug, Clone)]
pub struct Packet {
    flow: usize,
    dst: Ipv4Addr,
    dst_port: u16,
    wire_bytes: u64,
    sent_at_us: u64,
}

#[derive(Debug)]
pub enum EventType {
    /// A source emits its next packet.
    Generate { flow: usize },
    /// A device may start its next transmission.
    TxReady { device: usize },
    PacketArrival { node: NodeId, packet: Packet },
}

#[derive(Debug)]
struct Event {
    time: u64,
    event_type: EventType,
    id: u64, // insertion order, breaks ties
}

// Reversed so `BinaryHeap` pops the earliest (time, id) first
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.id == other.id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Why packets were discarded during a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DropStats {
    pub queue_full: u64,
    pub queue_timeout: u64,
    pub frame_error: u64,
    pub no_route: u64,
    pub no_sink: u64,
}

impl DropStats {
    pub fn total(&self) -> u64 {
        self.queue_full + self.queue_timeout + self.frame_error + self.no_route + self.no_sink
    }
}

#[derive(Debug, Clone, Copy)]
enum DropReason {
    QueueFull,
    QueueTimeout,
    FrameError,
    NoRoute,
    NoSink,
}

/// What a destroyed session leaves behind for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub variant: String,
    pub events_processed: u64,
    pub final_time_ms: u64,
    pub drops: DropStats,
}

/// In-process reference engine: a shared wireless medium, a wired backhaul, and
/// flow-monitor style counters.
pub struct BuiltinEngine {
    channel: ChannelConfig,
    history: Vec<SessionRecord>,
}

impl BuiltinEngine {
    pub fn new(channel: ChannelConfig) -> Self {
        Self {
            channel,
            history: Vec::new(),
        }
    }

    /// One record per destroyed session, oldest first.
    pub fn history(&self) -> &[SessionRecord] {
        &self.history
    }
}

impl SimulationEngine for BuiltinEngine {
    fn open(&mut self, policy: VariantPolicy) -> Result<Box<dyn EngineSession + '_>, EngineError> {
        let rate = match &policy.rate_adaptation {
            RateAdaptation::ConstantRate {
                data_mode,
                control_mode,
            } => {
                parse_vht_mode(control_mode)
                    .ok_or_else(|| EngineError::UnsupportedRateMode(control_mode.clone()))?;
                let mcs = parse_vht_mode(data_mode)
                    .ok_or_else(|| EngineError::UnsupportedRateMode(data_mode.clone()))?;
                RateController::constant(mcs)
            }
            RateAdaptation::MinstrelHt => RateController::minstrel(),
        };
        info!(
            "Opening session for {} ({})",
            policy.name,
            policy.rate_adaptation.manager_name()
        );
        Ok(Box::new(Session::new(
            self.channel.clone(),
            policy,
            rate,
            &mut self.history,
        )))
    }
}

/// Devices installed together share a segment. Wireless segments are found again by SSID.
#[derive(Debug)]
struct Segment {
    ssid: Option<String>,
    /// The wireless medium is shared: nobody transmits before this time.
    free_at_us: u64,
}

enum DeviceKind {
    Wireless(RateController),
    Wired { rate_mbps: f64, delay_us: u64 },
}

#[derive(Debug)]
struct Queued {
    packet: Packet,
    next_node: NodeId,
    enqueued_at_us: u64,
}

struct Device {
    node: NodeId,
    segment: usize,
    address: Option<(Ipv4Addr, Subnet)>,
    queue: VecDeque<Queued>,
    busy: bool,
    kind: DeviceKind,
}

#[derive(Default)]
struct Node {
    placement: Option<NodePlacement>,
    devices: Vec<usize>,
    next_port: u16,
}

struct FlowState {
    app: SourceApp,
    tuple: FiveTuple,
    last_delay_us: Option<u64>,
    sent: u64,
}

struct Session<'a> {
    time: u64,
    event_queue: BinaryHeap<Event>,
    event_id_counter: u64,
    events_processed: u64,

    channel: ChannelConfig,
    policy: VariantPolicy,
    rate_template: RateController,
    rng: StdRng,

    nodes: Vec<Node>,
    devices: Vec<Device>,
    segments: Vec<Segment>,
    hosts_used: HashMap<Subnet, u32>,
    sinks: HashMap<(NodeId, u16), SinkApp>,
    flows: Vec<FlowState>,
    counters: BTreeMap<FlowKey, FlowCounters>,
    drops: DropStats,
    has_run: bool,

    history: &'a mut Vec<SessionRecord>,
}

fn ms_to_us(ms: u64) -> u64 {
    ms.saturating_mul(1000)
}

impl<'a> Session<'a> {
    fn new(
        channel: ChannelConfig,
        policy: VariantPolicy,
        rate_template: RateController,
        history: &'a mut Vec<SessionRecord>,
    ) -> Self {
        let rng = StdRng::seed_from_u64(channel.seed);
        Self {
            time: 0,
            event_queue: BinaryHeap::new(),
            event_id_counter: 0,
            events_processed: 0,
            channel,
            policy,
            rate_template,
            rng,
            nodes: Vec::new(),
            devices: Vec::new(),
            segments: Vec::new(),
            hosts_used: HashMap::new(),
            sinks: HashMap::new(),
            flows: Vec::new(),
            counters: BTreeMap::new(),
            drops: DropStats::default(),
            has_run: false,
            history,
        }
    }

    fn push_event(&mut self, time: u64, event_type: EventType) {
        self.event_queue.push(Event {
            time,
            event_type,
            id: self.event_id_counter,
        });
        self.event_id_counter += 1;
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, EngineError> {
        self.nodes
            .get_mut(id as usize)
            .ok_or(EngineError::UnknownNode(id))
    }

    fn wifi_segment(&mut self, ssid: &str) -> usize {
        let existing = self
            .segments
            .iter()
            .position(|s| s.ssid.as_deref() == Some(ssid));
        existing.unwrap_or_else(|| self.new_segment(Some(ssid.to_string())))
    }

    fn new_segment(&mut self, ssid: Option<String>) -> usize {
        self.segments.push(Segment {
            ssid,
            free_at_us: 0,
        });
        self.segments.len() - 1
    }

    fn owner_of(&self, addr: Ipv4Addr) -> Option<&Device> {
        self.devices
            .iter()
            .find(|d| d.address.map(|(a, _)| a) == Some(addr))
    }

    /// Next hop towards `dst`: directly on a shared subnet, otherwise through a
    /// neighbour that is attached to the destination subnet.
    fn route(&self, from: NodeId, dst: Ipv4Addr) -> Option<(usize, NodeId)> {
        let local = &self.nodes.get(from as usize)?.devices;
        let owner = self.owner_of(dst)?;

        for &dev in local {
            let device = &self.devices[dev];
            if let Some((_, subnet)) = device.address
                && subnet.contains(dst)
                && owner.segment == device.segment
            {
                return Some((dev, owner.node));
            }
        }

        for &dev in local {
            let device = &self.devices[dev];
            let gateway = self.devices.iter().find(|peer| {
                peer.segment == device.segment
                    && peer.node != from
                    && self.nodes[peer.node as usize].devices.iter().any(|&d| {
                        self.devices[d]
                            .address
                            .is_some_and(|(_, subnet)| subnet.contains(dst))
                    })
            });
            if let Some(gateway) = gateway {
                return Some((dev, gateway.node));
            }
        }
        None
    }

    fn drop_packet(&mut self, packet: &Packet, reason: DropReason) {
        let slot = match reason {
            DropReason::QueueFull => &mut self.drops.queue_full,
            DropReason::QueueTimeout => &mut self.drops.queue_timeout,
            DropReason::FrameError => &mut self.drops.frame_error,
            DropReason::NoRoute => &mut self.drops.no_route,
            DropReason::NoSink => &mut self.drops.no_sink,
        };
        *slot += 1;
        let key = self.flows[packet.flow].app.flow;
        self.counters.entry(key).or_default().lost_packets += 1;
        match reason {
            DropReason::NoRoute => {
                warn!("[{}] no route for flow {} to {}", self.time, key, packet.dst)
            }
            _ => debug!("[{}] drop flow {} ({:?})", self.time, key, reason),
        }
    }

    fn send_from(&mut self, node: NodeId, packet: Packet) {
        match self.route(node, packet.dst) {
            Some((device, next_node)) => self.enqueue(device, next_node, packet),
            None => self.drop_packet(&packet, DropReason::NoRoute),
        }
    }

    fn enqueue(&mut self, device: usize, next_node: NodeId, packet: Packet) {
        let capacity = match self.devices[device].kind {
            DeviceKind::Wireless(_) => self.policy.queue_capacity_packets as usize,
            DeviceKind::Wired { .. } => WIRED_QUEUE_PACKETS,
        };
        if self.devices[device].queue.len() >= capacity {
            self.drop_packet(&packet, DropReason::QueueFull);
            return;
        }
        let now = self.time;
        let dev = &mut self.devices[device];
        dev.queue.push_back(Queued {
            packet,
            next_node,
            enqueued_at_us: now,
        });
        if !dev.busy {
            dev.busy = true;
            self.push_event(now, EventType::TxReady { device });
        }
    }

    fn transmit_next(&mut self, device: usize) {
        let wireless = matches!(self.devices[device].kind, DeviceKind::Wireless(_));
        let max_wait = ms_to_us(self.policy.max_queue_delay_ms);

        let queued = loop {
            match self.devices[device].queue.pop_front() {
                Some(q) if wireless && self.time - q.enqueued_at_us > max_wait => {
                    self.drop_packet(&q.packet, DropReason::QueueTimeout);
                }
                Some(q) => break q,
                None => {
                    self.devices[device].busy = false;
                    return;
                }
            }
        };

        let now = self.time;
        let bytes = queued.packet.wire_bytes;
        let segment = self.devices[device].segment;
        let (done_at, delivered_at) = match &mut self.devices[device].kind {
            DeviceKind::Wired {
                rate_mbps,
                delay_us,
            } => {
                let done = now + airtime_us(bytes, *rate_mbps);
                (done, Some(done + *delay_us))
            }
            DeviceKind::Wireless(rate) => {
                let lo = self.channel.min_access_delay_us;
                let hi = self.channel.max_access_delay_us.max(lo);
                let access = self.rng.random_range(lo..=hi);
                let medium = &mut self.segments[segment];
                let start = now.max(medium.free_at_us) + access;

                let mcs = rate.select(&mut self.rng, now);
                let tx_us = PREAMBLE_US + airtime_us(bytes, mcs.rate_mbps());
                let error_p = (self.channel.loss_rate * (1.0 + mcs.index() as f64)).clamp(0.0, 1.0);
                let ok = self.rng.random::<f64>() >= error_p;
                rate.report(mcs, ok);

                let done = start + tx_us;
                medium.free_at_us = done;
                (done, ok.then_some(done))
            }
        };

        match delivered_at {
            Some(at) => self.push_event(
                at,
                EventType::PacketArrival {
                    node: queued.next_node,
                    packet: queued.packet,
                },
            ),
            None => self.drop_packet(&queued.packet, DropReason::FrameError),
        }
        self.push_event(done_at, EventType::TxReady { device });
    }

    fn generate(&mut self, flow: usize) {
        let now = self.time;
        let state = &mut self.flows[flow];
        let stop = ms_to_us(state.app.stop_ms);
        if now >= stop || state.app.max_packets.is_some_and(|max| state.sent >= max) {
            return;
        }
        state.sent += 1;
        let more = state.app.max_packets.is_none_or(|max| state.sent < max);
        let (key, node, interval) = (
            state.app.flow,
            state.app.node,
            ms_to_us(state.app.interval_ms),
        );
        let packet = Packet {
            flow,
            dst: state.app.remote,
            dst_port: state.app.port,
            wire_bytes: u64::from(state.app.packet_size) + HEADER_BYTES,
            sent_at_us: now,
        };

        let counters = self.counters.entry(key).or_default();
        counters.tx_packets += 1;
        counters.tx_bytes += packet.wire_bytes;
        debug!(
            "[{}] TX flow {} node {} -> {}:{} ({} bytes)",
            now, key, node, packet.dst, packet.dst_port, packet.wire_bytes
        );

        self.send_from(node, packet);
        if more && now + interval < stop {
            self.push_event(now + interval, EventType::Generate { flow });
        }
    }

    fn arrive(&mut self, node: NodeId, packet: Packet) {
        let is_local = self.owner_of(packet.dst).map(|d| d.node) == Some(node);
        if !is_local {
            self.send_from(node, packet);
            return;
        }

        let now = self.time;
        let listening = self.sinks.get(&(node, packet.dst_port)).is_some_and(|sink| {
            ms_to_us(sink.start_ms) <= now && now <= ms_to_us(sink.stop_ms)
        });
        if !listening {
            self.drop_packet(&packet, DropReason::NoSink);
            return;
        }

        let delay_us = now - packet.sent_at_us;
        let state = &mut self.flows[packet.flow];
        let jitter_us = state.last_delay_us.map(|last| last.abs_diff(delay_us));
        state.last_delay_us = Some(delay_us);

        let counters = self.counters.entry(state.app.flow).or_default();
        counters.rx_packets += 1;
        counters.rx_bytes += packet.wire_bytes;
        counters.delay_sum_ms += delay_us as f64 / 1000.0;
        if let Some(jitter) = jitter_us {
            counters.jitter_sum_ms += jitter as f64 / 1000.0;
        }
    }

    /// Process the next event. Returns true if an event was processed, false if queue is empty.
    fn step(&mut self) -> bool {
        let event = match self.event_queue.pop() {
            Some(e) => e,
            None => return false,
        };
        self.time = event.time;
        self.events_processed += 1;

        match event.event_type {
            EventType::Generate { flow } => self.generate(flow),
            EventType::TxReady { device } => self.transmit_next(device),
            EventType::PacketArrival { node, packet } => self.arrive(node, packet),
        }
        true
    }
}

/// Transmission time of `bytes` at `rate_mbps`, rounded up to whole microseconds.
fn airtime_us(bytes: u64, rate_mbps: f64) -> u64 {
    (bytes as f64 * 8.0 / rate_mbps).ceil() as u64
}

impl EngineSession for Session<'_> {
    fn create_nodes(&mut self, count: usize) -> Result<NodeSet, EngineError> {
        let first = self.nodes.len() as NodeId;
        self.nodes.extend((0..count).map(|_| Node {
            next_port: FIRST_EPHEMERAL_PORT,
            ..Default::default()
        }));
        Ok(NodeSet((first..self.nodes.len() as NodeId).collect()))
    }

    fn install_mobility(&mut self, placements: &[NodePlacement]) -> Result<(), EngineError> {
        for placement in placements {
            self.node_mut(placement.id)?.placement = Some(placement.clone());
        }
        Ok(())
    }

    fn install_link_layer(
        &mut self,
        nodes: &NodeSet,
        medium: &MediumParams,
    ) -> Result<DeviceSet, EngineError> {
        let (segment, wired) = match medium {
            MediumParams::Wifi { standard, ssid, .. } => {
                if !standard.starts_with("802.11") {
                    return Err(EngineError::InvalidMedium(format!(
                        "unsupported wifi standard '{standard}'"
                    )));
                }
                (self.wifi_segment(ssid), None)
            }
            MediumParams::Csma {
                data_rate_mbps,
                delay_ms,
            } => {
                if !(data_rate_mbps.is_finite() && *data_rate_mbps > 0.0) {
                    return Err(EngineError::InvalidMedium(format!(
                        "data rate {data_rate_mbps} Mbps"
                    )));
                }
                let link = (*data_rate_mbps, ms_to_us(*delay_ms));
                (self.new_segment(None), Some(link))
            }
        };

        let mut handles = Vec::with_capacity(nodes.len());
        for node in nodes.iter() {
            let index = self.devices.len();
            self.node_mut(node)?.devices.push(index);
            let kind = match wired {
                Some((rate_mbps, delay_us)) => DeviceKind::Wired {
                    rate_mbps,
                    delay_us,
                },
                None => DeviceKind::Wireless(self.rate_template.clone()),
            };
            self.devices.push(Device {
                node,
                segment,
                address: None,
                queue: VecDeque::new(),
                busy: false,
                kind,
            });
            handles.push(DeviceHandle {
                node,
                index: index as u32,
            });
        }
        Ok(DeviceSet(handles))
    }

    fn assign_addresses(
        &mut self,
        devices: &DeviceSet,
        subnet: Subnet,
    ) -> Result<AddressSet, EngineError> {
        let mut assigned = Vec::with_capacity(devices.len());
        for handle in devices.iter() {
            let used = self.hosts_used.entry(subnet).or_insert(0);
            let addr = subnet
                .host(*used + 1)
                .ok_or(EngineError::AddressPoolExhausted(subnet.base))?;
            let device = self
                .devices
                .get_mut(handle.index as usize)
                .ok_or(EngineError::UnknownDevice(handle.index))?;
            *used += 1;
            device.address = Some((addr, subnet));
            assigned.push(addr);
        }
        Ok(AddressSet(assigned))
    }

    fn install_traffic_sink(&mut self, sink: SinkApp) -> Result<(), EngineError> {
        self.node_mut(sink.node)?;
        let key = (sink.node, sink.port);
        if self.sinks.contains_key(&key) {
            return Err(EngineError::PortInUse {
                node: sink.node,
                port: sink.port,
            });
        }
        self.sinks.insert(key, sink);
        Ok(())
    }

    fn install_traffic_source(&mut self, source: SourceApp) -> Result<(), EngineError> {
        let node = self.node_mut(source.node)?;
        let source_port = node.next_port;
        node.next_port = node.next_port.wrapping_add(1).max(FIRST_EPHEMERAL_PORT);

        let source_addr = self
            .route(source.node, source.remote)
            .and_then(|(dev, _)| self.devices[dev].address)
            .map_or(Ipv4Addr::UNSPECIFIED, |(addr, _)| addr);
        let tuple = FiveTuple {
            source: source_addr,
            source_port,
            destination: source.remote,
            destination_port: source.port,
            protocol: UDP,
        };

        let flow = self.flows.len();
        let (start, stop) = (ms_to_us(source.start_ms), ms_to_us(source.stop_ms));
        self.flows.push(FlowState {
            app: source,
            tuple,
            last_delay_us: None,
            sent: 0,
        });
        if start < stop {
            self.push_event(start, EventType::Generate { flow });
        }
        Ok(())
    }

    fn run(&mut self, stop_ms: u64) -> Result<(), EngineError> {
        if self.has_run {
            return Err(EngineError::AlreadyRun);
        }
        self.has_run = true;

        let stop = ms_to_us(stop_ms);
        info!(
            "Simulating {} flows over {} devices until {} ms",
            self.flows.len(),
            self.devices.len(),
            stop_ms
        );
        while self.event_queue.peek().is_some_and(|e| e.time <= stop) {
            self.step();
        }
        self.time = stop;
        info!(
            "Simulation complete: {} events, {} drops",
            self.events_processed,
            self.drops.total()
        );
        Ok(())
    }

    fn collect_flow_counters(&self) -> BTreeMap<FlowKey, FlowCounters> {
        self.counters.clone()
    }

    fn classify(&self, key: FlowKey) -> Option<FiveTuple> {
        self.flows
            .iter()
            .find(|f| f.app.flow == key)
            .map(|f| f.tuple)
    }

    fn destroy(mut self: Box<Self>) {
        let placed = self.nodes.iter().filter(|n| n.placement.is_some()).count();
        debug!("Destroying session {} ({} placed nodes)", self.policy.name, placed);
        self.history.push(SessionRecord {
            variant: self.policy.name.clone(),
            events_processed: self.events_processed,
            final_time_ms: self.time / 1000,
            drops: self.drops,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qos_lab_abstract::{MacRole, PolicyOverride, ScenarioParams};
    use qos_lab_core::{VariantRequest, run_variant};

    fn lossless() -> ChannelConfig {
        ChannelConfig {
            loss_rate: 0.0,
            ..Default::default()
        }
    }

    fn small_params() -> ScenarioParams {
        ScenarioParams {
            station_count: 2,
            duration_ms: 20_000,
            ..Default::default()
        }
    }

    fn edca_policy() -> VariantPolicy {
        qos_lab_core::Variant::Edca.policy()
    }

    /// Two nodes on a 100 Mbps wire with 2 ms delay, one flow from 0 to 1.
    fn wired_pair(
        session: &mut dyn EngineSession,
        sink_start_ms: u64,
        max_packets: Option<u64>,
    ) -> Ipv4Addr {
        let nodes = session.create_nodes(2).unwrap();
        let devices = session
            .install_link_layer(
                &nodes,
                &MediumParams::Csma {
                    data_rate_mbps: 100.0,
                    delay_ms: 2,
                },
            )
            .unwrap();
        let addrs = session
            .assign_addresses(&devices, Subnet::new(Ipv4Addr::new(10, 9, 0, 0), 24))
            .unwrap();
        let remote = addrs.get(1).unwrap();
        session
            .install_traffic_sink(SinkApp {
                node: 1,
                port: 7000,
                start_ms: sink_start_ms,
                stop_ms: 1_000,
            })
            .unwrap();
        session
            .install_traffic_source(SourceApp {
                flow: FlowKey(3),
                node: 0,
                remote,
                port: 7000,
                packet_size: 1000,
                interval_ms: 10,
                start_ms: 0,
                stop_ms: 1_000,
                max_packets,
            })
            .unwrap();
        remote
    }

    #[test]
    fn wired_flow_has_exact_delay_and_no_jitter() {
        let mut engine = BuiltinEngine::new(lossless());
        let mut session = engine.open(edca_policy()).unwrap();
        let remote = wired_pair(session.as_mut(), 0, None);
        session.run(1_000).unwrap();

        let counters = session.collect_flow_counters()[&FlowKey(3)];
        assert_eq!(counters.tx_packets, 100);
        assert_eq!(counters.rx_packets, 100);
        assert_eq!(counters.lost_packets, 0);
        assert_eq!(counters.rx_bytes, 100 * 1028);
        // 1028 bytes at 100 Mbps rounds up to 83 us, plus 2 ms of propagation.
        assert!((counters.delay_sum_ms - 100.0 * 2.083).abs() < 1e-6);
        assert_eq!(counters.jitter_sum_ms, 0.0);

        let tuple = session.classify(FlowKey(3)).unwrap();
        assert_eq!(tuple.source, Ipv4Addr::new(10, 9, 0, 1));
        assert_eq!(tuple.destination, remote);
        assert_eq!(tuple.source_port, FIRST_EPHEMERAL_PORT);
        assert_eq!(tuple.protocol, UDP);
        session.destroy();

        assert_eq!(engine.history().len(), 1);
        assert_eq!(engine.history()[0].drops, DropStats::default());
    }

    #[test]
    fn sources_stop_at_their_packet_cap() {
        let mut engine = BuiltinEngine::new(lossless());
        let mut session = engine.open(edca_policy()).unwrap();
        wired_pair(session.as_mut(), 0, Some(10));
        session.run(1_000).unwrap();
        let counters = session.collect_flow_counters()[&FlowKey(3)];
        assert_eq!(counters.tx_packets, 10);
        assert_eq!(counters.rx_packets, 10);
        session.destroy();
    }

    #[test]
    fn packets_before_the_sink_starts_are_lost() {
        let mut engine = BuiltinEngine::new(lossless());
        let mut session = engine.open(edca_policy()).unwrap();
        wired_pair(session.as_mut(), 500, None);
        session.run(1_000).unwrap();
        let counters = session.collect_flow_counters()[&FlowKey(3)];
        // Packets sent at 0..=490 ms arrive before 500 ms.
        assert_eq!(counters.lost_packets, 50);
        assert_eq!(counters.rx_packets, 50);
        session.destroy();
        assert_eq!(engine.history()[0].drops.no_sink, 50);
    }

    #[test]
    fn a_session_runs_once_and_ports_bind_once() {
        let mut engine = BuiltinEngine::new(lossless());
        let mut session = engine.open(edca_policy()).unwrap();
        wired_pair(session.as_mut(), 0, None);
        let dup = session.install_traffic_sink(SinkApp {
            node: 1,
            port: 7000,
            start_ms: 0,
            stop_ms: 10,
        });
        assert_eq!(dup, Err(EngineError::PortInUse { node: 1, port: 7000 }));
        session.run(100).unwrap();
        assert_eq!(session.run(100), Err(EngineError::AlreadyRun));
        session.destroy();
    }

    #[test]
    fn unknown_nodes_and_media_are_rejected() {
        let mut engine = BuiltinEngine::new(lossless());
        let mut session = engine.open(edca_policy()).unwrap();
        let ghost = NodeSet(vec![4]);
        let wifi = MediumParams::Wifi {
            standard: "802.11ac".to_string(),
            ssid: "x".to_string(),
            role: MacRole::Station,
            beacon_jitter: false,
        };
        assert_eq!(
            session.install_link_layer(&ghost, &wifi),
            Err(EngineError::UnknownNode(4))
        );
        let nodes = session.create_nodes(1).unwrap();
        let bad = MediumParams::Csma {
            data_rate_mbps: 0.0,
            delay_ms: 1,
        };
        assert!(matches!(
            session.install_link_layer(&nodes, &bad),
            Err(EngineError::InvalidMedium(_))
        ));
        session.destroy();
    }

    #[test]
    fn unsupported_rate_mode_fails_to_open() {
        let mut engine = BuiltinEngine::new(lossless());
        let mut policy = edca_policy();
        policy.rate_adaptation = RateAdaptation::ConstantRate {
            data_mode: "VhtMcs12".to_string(),
            control_mode: "VhtMcs0".to_string(),
        };
        assert_eq!(
            engine.open(policy).err(),
            Some(EngineError::UnsupportedRateMode("VhtMcs12".to_string()))
        );
    }

    #[test]
    fn light_lossless_load_delivers_everything_sent() {
        let mut engine = BuiltinEngine::new(lossless());
        let report =
            run_variant(&mut engine, &small_params(), &VariantRequest::named("EDCA")).unwrap();
        assert_eq!(report.flows.len(), 4);
        assert_eq!(report.summary.lost_packets, 0);
        assert!(report.summary.rx_packets > 0);
        // Only packets still in flight at the stop time may be missing.
        assert!(report.summary.tx_packets - report.summary.rx_packets <= 4);
        for flow in &report.flows {
            assert!(flow.metrics.mean_delay_ms > 2.0, "{:?}", flow.descriptor.key);
            assert_ne!(flow.tuple.unwrap().source, Ipv4Addr::UNSPECIFIED);
        }
    }

    #[test]
    fn identical_seeds_give_identical_counters() {
        let run = |variant: &str| {
            let mut engine = BuiltinEngine::new(ChannelConfig {
                loss_rate: 0.02,
                ..Default::default()
            });
            run_variant(&mut engine, &small_params(), &VariantRequest::named(variant))
                .unwrap()
                .flows
                .into_iter()
                .map(|f| f.counters)
                .collect::<Vec<_>>()
        };
        assert_eq!(run("WMM"), run("WMM"));
        assert_eq!(run("EDCA"), run("EDCA"));
    }

    #[test]
    fn saturated_medium_overflows_a_tiny_queue() {
        let mut engine = BuiltinEngine::new(lossless());
        let params = ScenarioParams {
            station_count: 3,
            packet_size: 4000,
            base_interval_ms: 1,
            duration_ms: 20_000,
            ..Default::default()
        };
        let request = VariantRequest {
            name: "EDCA".to_string(),
            overrides: PolicyOverride {
                queue_capacity_packets: Some(1),
                rate_adaptation: Some(RateAdaptation::ConstantRate {
                    data_mode: "VhtMcs0".to_string(),
                    control_mode: "VhtMcs0".to_string(),
                }),
                ..Default::default()
            },
        };
        let report = run_variant(&mut engine, &params, &request).unwrap();
        assert!(report.summary.lost_packets > 0);
        assert!(report.summary.loss_rate_percent > 0.0);
        let drops = engine.history()[0].drops;
        assert!(drops.queue_full > 0);
        assert_eq!(drops.frame_error, 0);
        assert_eq!(drops.total(), report.summary.lost_packets);
    }
}

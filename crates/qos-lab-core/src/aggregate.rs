use std::collections::BTreeMap;

use qos_lab_abstract::{FlowCounters, FlowKey};
use serde::Serialize;

/// Per-flow values derived from raw counters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FlowMetrics {
    pub throughput_mbps: f64,
    pub mean_delay_ms: f64,
    pub mean_jitter_ms: f64,
}

impl FlowMetrics {
    pub fn from_counters(counters: &FlowCounters, duration_ms: u64) -> Self {
        let duration_s = duration_ms as f64 / 1000.0;
        let throughput_mbps = if duration_s > 0.0 {
            counters.rx_bytes as f64 * 8.0 / (duration_s * 1_000_000.0)
        } else {
            0.0
        };
        let mean_delay_ms = if counters.rx_packets > 0 {
            sanitize(counters.delay_sum_ms) / counters.rx_packets as f64
        } else {
            0.0
        };
        let mean_jitter_ms = if counters.rx_packets > 1 {
            sanitize(counters.jitter_sum_ms) / (counters.rx_packets - 1) as f64
        } else {
            0.0
        };
        Self {
            throughput_mbps,
            mean_delay_ms,
            mean_jitter_ms,
        }
    }
}

/// Counter sums must be finite and non-negative for the summary to be.
fn sanitize(sum: f64) -> f64 {
    if sum.is_finite() && sum > 0.0 { sum } else { 0.0 }
}

/// The comparable result of one variant's run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantSummary {
    pub variant: String,
    pub flow_count: usize,
    pub avg_throughput_mbps: f64,
    pub avg_delay_ms: f64,
    pub avg_jitter_ms: f64,
    pub loss_rate_percent: f64,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub lost_packets: u64,
}

impl VariantSummary {
    pub fn empty(variant: &str) -> Self {
        Self {
            variant: variant.to_string(),
            flow_count: 0,
            avg_throughput_mbps: 0.0,
            avg_delay_ms: 0.0,
            avg_jitter_ms: 0.0,
            loss_rate_percent: 0.0,
            tx_packets: 0,
            rx_packets: 0,
            lost_packets: 0,
        }
    }
}

/// Reduce a run's counters to one summary.
///
/// Throughput, delay and jitter are unweighted means over flows: a flow with ten
/// packets counts as much as one with ten thousand. Loss is aggregated over packets.
pub fn summarize(
    variant: &str,
    counters: &BTreeMap<FlowKey, FlowCounters>,
    duration_ms: u64,
) -> VariantSummary {
    let mut summary = VariantSummary::empty(variant);
    if counters.is_empty() {
        return summary;
    }

    let (mut throughput, mut delay, mut jitter) = (0.0, 0.0, 0.0);
    for flow in counters.values() {
        let metrics = FlowMetrics::from_counters(flow, duration_ms);
        throughput += metrics.throughput_mbps;
        delay += metrics.mean_delay_ms;
        jitter += metrics.mean_jitter_ms;

        summary.tx_packets += flow.tx_packets;
        summary.rx_packets += flow.rx_packets;
        summary.lost_packets += flow.lost_packets;
    }

    let flows = counters.len() as f64;
    summary.flow_count = counters.len();
    summary.avg_throughput_mbps = throughput / flows;
    summary.avg_delay_ms = delay / flows;
    summary.avg_jitter_ms = jitter / flows;
    summary.loss_rate_percent = if summary.tx_packets > 0 {
        100.0 * summary.lost_packets as f64 / summary.tx_packets as f64
    } else {
        0.0
    };
    summary
}

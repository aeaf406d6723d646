use std::cmp::Ordering;
use std::fmt::Write;

use qos_lab_abstract::Metric;
use serde::Serialize;

use crate::aggregate::VariantSummary;
use crate::runner::VariantReport;

/// Render summaries as a fixed-width table, one row per variant in input order.
pub fn render_summary_table(summaries: &[VariantSummary]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<10} {:>12} {:>11} {:>11} {:>8} {:>9} {:>9} {:>9}",
        "Variant", "Tput (Mbps)", "Delay (ms)", "Jitter (ms)", "Loss (%)", "Tx", "Rx", "Lost"
    );
    let _ = writeln!(out, "{}", "-".repeat(86));
    for s in summaries {
        let _ = writeln!(
            out,
            "{:<10} {:>12.2} {:>11.3} {:>11.3} {:>8.2} {:>9} {:>9} {:>9}",
            s.variant,
            s.avg_throughput_mbps,
            s.avg_delay_ms,
            s.avg_jitter_ms,
            s.loss_rate_percent,
            s.tx_packets,
            s.rx_packets,
            s.lost_packets
        );
    }
    out
}

/// One line per flow: identity, endpoints and derived metrics.
pub fn render_flow_listing(report: &VariantReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Flow information ({}):", report.summary.variant);
    for flow in &report.flows {
        let endpoints = flow.tuple.map(|t| t.to_string()).unwrap_or_else(|| {
            format!(
                "node {} -> node {}",
                flow.descriptor.source, flow.descriptor.destination
            )
        });
        let _ = writeln!(
            out,
            "  Flow {} ({}) {:?}: tx={} rx={} lost={} tput={:.3} Mbps delay={:.3} ms jitter={:.3} ms",
            flow.descriptor.key,
            endpoints,
            flow.descriptor.direction,
            flow.counters.tx_packets,
            flow.counters.rx_packets,
            flow.counters.lost_packets,
            flow.metrics.throughput_mbps,
            flow.metrics.mean_delay_ms,
            flow.metrics.mean_jitter_ms
        );
    }
    out
}

/// The best variant for one metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricLeader {
    pub metric: Metric,
    pub variant: String,
    pub value: f64,
}

pub fn metric_value(summary: &VariantSummary, metric: Metric) -> f64 {
    match metric {
        Metric::Throughput => summary.avg_throughput_mbps,
        Metric::Delay => summary.avg_delay_ms,
        Metric::Jitter => summary.avg_jitter_ms,
        Metric::Loss => summary.loss_rate_percent,
    }
}

/// Whether `a` is strictly better than `b` on `metric`.
pub fn outperforms(a: &VariantSummary, b: &VariantSummary, metric: Metric) -> bool {
    let (va, vb) = (metric_value(a, metric), metric_value(b, metric));
    if metric.higher_is_better() {
        va > vb
    } else {
        va < vb
    }
}

/// Name the strictly best variant per metric. Metrics where the best value is shared
/// by more than one variant get no leader.
pub fn compare(summaries: &[VariantSummary]) -> Vec<MetricLeader> {
    Metric::ALL
        .into_iter()
        .filter_map(|metric| {
            let ranked = |a: &&VariantSummary, b: &&VariantSummary| {
                let ord = metric_value(a, metric).total_cmp(&metric_value(b, metric));
                if metric.higher_is_better() {
                    ord
                } else {
                    ord.reverse()
                }
            };
            let best = summaries.iter().max_by(ranked)?;
            let ties = summaries
                .iter()
                .filter(|s| ranked(s, &best) == Ordering::Equal)
                .count();
            (ties == 1).then(|| MetricLeader {
                metric,
                variant: best.variant.clone(),
                value: metric_value(best, metric),
            })
        })
        .collect()
}

pub fn render_comparison(leaders: &[MetricLeader]) -> String {
    let mut out = String::new();
    if leaders.is_empty() {
        out.push_str("No variant leads on any metric.\n");
        return out;
    }
    for leader in leaders {
        let _ = writeln!(
            out,
            "Best {:<10} {} ({:.3})",
            leader.metric.to_string(),
            leader.variant,
            leader.value
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(name: &str, tput: f64, delay: f64, jitter: f64, loss: f64) -> VariantSummary {
        VariantSummary {
            variant: name.to_string(),
            flow_count: 6,
            avg_throughput_mbps: tput,
            avg_delay_ms: delay,
            avg_jitter_ms: jitter,
            loss_rate_percent: loss,
            tx_packets: 1000,
            rx_packets: 950,
            lost_packets: 50,
        }
    }

    #[test]
    fn table_has_one_row_per_variant_with_two_decimal_throughput() {
        let table = render_summary_table(&[
            summary("EDCA", 0.076, 10.0, 0.99, 5.0),
            summary("WMM", 0.1234, 8.5, 0.5, 1.0),
        ]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Variant"));
        assert!(lines[2].starts_with("EDCA"));
        assert!(lines[2].contains(" 0.08 "));
        assert!(lines[2].contains("10.000"));
        assert!(lines[2].contains("5.00"));
        assert!(lines[3].starts_with("WMM"));
        assert!(lines[3].contains(" 0.12 "));
    }

    #[test]
    fn compare_picks_direction_per_metric() {
        let leaders = compare(&[
            summary("EDCA", 2.0, 10.0, 1.0, 5.0),
            summary("WMM", 1.0, 8.0, 1.0, 7.0),
        ]);
        let by_metric = |m: Metric| {
            leaders
                .iter()
                .find(|l| l.metric == m)
                .map(|l| l.variant.as_str())
        };
        assert_eq!(by_metric(Metric::Throughput), Some("EDCA"));
        assert_eq!(by_metric(Metric::Delay), Some("WMM"));
        assert_eq!(by_metric(Metric::Loss), Some("EDCA"));
        // Equal jitter: nobody leads.
        assert_eq!(by_metric(Metric::Jitter), None);
    }

    #[test]
    fn compare_handles_empty_and_single() {
        assert!(compare(&[]).is_empty());
        let single = compare(&[summary("EDCA", 1.0, 1.0, 1.0, 1.0)]);
        assert_eq!(single.len(), 4);
    }

    #[test]
    fn outperforms_respects_metric_direction() {
        let fast = summary("A", 3.0, 5.0, 0.2, 0.0);
        let slow = summary("B", 1.0, 9.0, 0.4, 2.0);
        for metric in Metric::ALL {
            assert!(outperforms(&fast, &slow, metric), "{metric}");
            assert!(!outperforms(&slow, &fast, metric), "{metric}");
        }
        assert!(!outperforms(&fast, &fast, Metric::Delay));
    }
}

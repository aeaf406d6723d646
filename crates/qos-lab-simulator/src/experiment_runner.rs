use std::fs;
use std::path::Path;

use anyhow::{Context, anyhow};
use qos_lab_abstract::{
    ChannelConfig, Expectation, Experiment, PointToPointParams, ScenarioParams, Topology,
};
use qos_lab_core::{
    Variant, VariantRequest, VariantSummary, outperforms, run_point_to_point_variants, run_variants,
};
use tracing::info;

use crate::engine::BuiltinEngine;
use crate::trace::ExperimentReport;

pub fn load_experiment(path: &Path) -> anyhow::Result<Experiment> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read experiment file {}", path.display()))?;
    parse_experiment(&content)
}

pub fn parse_experiment(content: &str) -> anyhow::Result<Experiment> {
    toml::from_str(content).context("Failed to parse experiment file")
}

/// Fully resolved inputs of one experiment run.
#[derive(Debug, Clone)]
pub struct ExperimentPlan {
    pub name: String,
    pub topology: Topology,
    pub params: ScenarioParams,
    pub link: PointToPointParams,
    pub channel: ChannelConfig,
    pub requests: Vec<VariantRequest>,
    pub expectations: Vec<Expectation>,
}

impl Default for ExperimentPlan {
    fn default() -> Self {
        Self {
            name: "voip-qos".to_string(),
            topology: Topology::default(),
            params: ScenarioParams::default(),
            link: PointToPointParams::default(),
            channel: ChannelConfig::default(),
            requests: Variant::ALL
                .iter()
                .map(|v| VariantRequest::named(v.name()))
                .collect(),
            expectations: Vec::new(),
        }
    }
}

impl ExperimentPlan {
    pub fn from_experiment(experiment: &Experiment) -> Self {
        let mut plan = Self {
            name: experiment.name.clone(),
            topology: experiment.topology,
            expectations: experiment.expectations.clone(),
            ..Self::default()
        };
        experiment.params.apply_to(&mut plan.params);
        experiment.link.apply_to(&mut plan.link);
        experiment.channel.apply_to(&mut plan.channel);
        if !experiment.variants.is_empty() {
            plan.set_variants(&experiment.variants);
        }
        for request in &mut plan.requests {
            if let Some(overrides) = experiment.overrides.get(&request.name) {
                request.overrides = overrides.clone();
            }
        }
        plan
    }

    /// Replace the variant list, keeping overrides of variants that stay.
    pub fn set_variants(&mut self, names: &[String]) {
        let previous = std::mem::take(&mut self.requests);
        self.requests = names
            .iter()
            .map(|name| {
                previous
                    .iter()
                    .find(|r| &r.name == name)
                    .cloned()
                    .unwrap_or_else(|| VariantRequest::named(name.clone()))
            })
            .collect();
    }
}

/// Run every variant of the plan on a fresh built-in engine.
pub fn run_plan(plan: &ExperimentPlan) -> ExperimentReport {
    info!(
        "Running experiment {} ({} variants)",
        plan.name,
        plan.requests.len()
    );
    let mut engine = BuiltinEngine::new(plan.channel.clone());
    let (outcomes, link) = match plan.topology {
        Topology::WifiVoip => (run_variants(&mut engine, &plan.params, &plan.requests), None),
        Topology::PointToPoint => (
            run_point_to_point_variants(&mut engine, &plan.link, &plan.requests),
            Some(plan.link.clone()),
        ),
    };
    let mut report = ExperimentReport::new(
        &plan.name,
        plan.params.clone(),
        plan.channel.clone(),
        outcomes,
        engine.history().to_vec(),
    );
    report.topology = plan.topology;
    report.link = link;
    report
}

fn lookup<'a>(report: &'a ExperimentReport, variant: &str) -> anyhow::Result<&'a VariantSummary> {
    if let Some(summary) = report.summary(variant) {
        return Ok(summary);
    }
    match report.failure(variant) {
        Some(failure) => Err(anyhow!(
            "Assertion Failed: variant {} did not run: {}",
            variant,
            failure.error
        )),
        None => Err(anyhow!(
            "Assertion Failed: variant {} is not part of the experiment",
            variant
        )),
    }
}

/// Check expectations in order; the first violation is returned.
pub fn check_expectations(
    report: &ExperimentReport,
    expectations: &[Expectation],
) -> anyhow::Result<()> {
    for expectation in expectations {
        match expectation {
            Expectation::MinThroughput { variant, mbps } => {
                let s = lookup(report, variant)?;
                if s.avg_throughput_mbps < *mbps {
                    return Err(anyhow!(
                        "Assertion Failed: {} throughput {:.3} Mbps < expected min {} Mbps",
                        variant,
                        s.avg_throughput_mbps,
                        mbps
                    ));
                }
            }
            Expectation::MaxLossRate { variant, percent } => {
                let s = lookup(report, variant)?;
                if s.loss_rate_percent > *percent {
                    return Err(anyhow!(
                        "Assertion Failed: {} loss {:.2}% > expected max {}%",
                        variant,
                        s.loss_rate_percent,
                        percent
                    ));
                }
            }
            Expectation::MaxDelay { variant, ms } => {
                let s = lookup(report, variant)?;
                if s.avg_delay_ms > *ms {
                    return Err(anyhow!(
                        "Assertion Failed: {} delay {:.3} ms > expected max {} ms",
                        variant,
                        s.avg_delay_ms,
                        ms
                    ));
                }
            }
            Expectation::Outperforms {
                better,
                worse,
                metric,
            } => {
                let (a, b) = (lookup(report, better)?, lookup(report, worse)?);
                if !outperforms(a, b, *metric) {
                    return Err(anyhow!(
                        "Assertion Failed: {} does not beat {} on {}",
                        better,
                        worse,
                        metric
                    ));
                }
            }
        }
    }
    info!("All {} expectations hold", expectations.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qos_lab_abstract::{Metric, RateAdaptation};

    const SAMPLE: &str = include_str!("../../../scenarios/voip-qos.toml");
    const RTP_SAMPLE: &str = include_str!("../../../scenarios/rtp-point-to-point.toml");

    fn quick_plan(expectations: Vec<Expectation>) -> ExperimentPlan {
        let mut plan = ExperimentPlan::default();
        plan.params.station_count = 2;
        plan.params.duration_ms = 20_000;
        plan.expectations = expectations;
        plan
    }

    #[test]
    fn sample_experiment_parses_and_resolves() {
        let experiment = parse_experiment(SAMPLE).unwrap();
        assert_eq!(experiment.variants, vec!["EDCA", "WMM"]);
        assert!(!experiment.expectations.is_empty());

        let plan = ExperimentPlan::from_experiment(&experiment);
        assert_eq!(plan.name, experiment.name);
        assert_eq!(plan.params.station_count, 3);
        assert_eq!(plan.params.duration_ms, 100_000);
        assert_eq!(plan.requests.len(), 2);
        assert_eq!(plan.requests[0].name, "EDCA");
        assert_eq!(plan.expectations.len(), experiment.expectations.len());
    }

    #[test]
    fn overrides_follow_their_variant() {
        let experiment = parse_experiment(
            r#"
            name = "custom"
            variants = ["WMM", "EDCA"]

            [params]
            station_count = 5

            [channel]
            seed = 7

            [overrides.WMM]
            queue_capacity_packets = 64
            rate_adaptation = { type = "constant_rate", data_mode = "VhtMcs3", control_mode = "VhtMcs0" }
            "#,
        )
        .unwrap();
        let mut plan = ExperimentPlan::from_experiment(&experiment);
        assert_eq!(plan.params.station_count, 5);
        assert_eq!(plan.params.radius_m, 40.0);
        assert_eq!(plan.channel.seed, 7);
        assert_eq!(plan.channel.loss_rate, 0.005);
        assert_eq!(plan.requests[0].name, "WMM");
        assert_eq!(plan.requests[0].overrides.queue_capacity_packets, Some(64));
        assert!(matches!(
            plan.requests[0].overrides.rate_adaptation,
            Some(RateAdaptation::ConstantRate { .. })
        ));
        assert_eq!(plan.requests[1].overrides.queue_capacity_packets, None);

        plan.set_variants(&["EDCA".to_string()]);
        assert_eq!(plan.requests.len(), 1);
        assert_eq!(plan.requests[0].name, "EDCA");
    }

    #[test]
    fn malformed_experiment_is_an_error() {
        let err = parse_experiment("name = 3").unwrap_err();
        assert!(err.to_string().contains("Failed to parse experiment file"));
        assert!(load_experiment(Path::new("/nonexistent/run.toml")).is_err());
    }

    #[test]
    fn run_plan_reports_every_variant_and_session() {
        let report = run_plan(&quick_plan(Vec::new()));
        assert_eq!(report.variants.len(), 2);
        assert!(report.failures.is_empty());
        assert_eq!(report.sessions.len(), 2);
        assert_eq!(report.sessions[0].variant, "EDCA");
        assert_eq!(report.sessions[1].variant, "WMM");
        assert!(report.summary("edca").is_some());
        assert!(report.variants.iter().all(|v| v.summary.flow_count == 4));
    }

    #[test]
    fn expectations_pass_and_fail() {
        let report = run_plan(&quick_plan(Vec::new()));
        let edca = report.summary("EDCA").unwrap().clone();

        let holds = vec![
            Expectation::MinThroughput {
                variant: "EDCA".to_string(),
                mbps: 0.0,
            },
            Expectation::MaxLossRate {
                variant: "WMM".to_string(),
                percent: 100.0,
            },
            Expectation::MaxDelay {
                variant: "EDCA".to_string(),
                ms: edca.avg_delay_ms,
            },
        ];
        check_expectations(&report, &holds).unwrap();

        let too_fast = [Expectation::MinThroughput {
            variant: "EDCA".to_string(),
            mbps: 1_000.0,
        }];
        let err = check_expectations(&report, &too_fast).unwrap_err();
        assert!(err.to_string().starts_with("Assertion Failed: EDCA throughput"));

        let self_beat = [Expectation::Outperforms {
            better: "EDCA".to_string(),
            worse: "EDCA".to_string(),
            metric: Metric::Delay,
        }];
        assert!(check_expectations(&report, &self_beat).is_err());

        let missing = [Expectation::MaxDelay {
            variant: "DCF".to_string(),
            ms: 10.0,
        }];
        let err = check_expectations(&report, &missing).unwrap_err();
        assert!(err.to_string().contains("not part of the experiment"));
    }

    #[test]
    fn failed_variant_fails_the_expectations_naming_it() {
        let mut plan = quick_plan(Vec::new());
        plan.set_variants(&["EDCA".to_string(), "HCCA".to_string()]);
        let report = run_plan(&plan);
        assert_eq!(report.variants.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].variant, "HCCA");
        // An invalid variant never opens a session.
        assert_eq!(report.sessions.len(), 1);

        let leaders = &report.leaders;
        assert!(leaders.iter().all(|l| l.variant == "EDCA"));

        let err = check_expectations(
            &report,
            &[Expectation::MinThroughput {
                variant: "HCCA".to_string(),
                mbps: 0.0,
            }],
        )
        .unwrap_err();
        assert!(err.to_string().contains("did not run"));
    }

    #[test]
    fn rtp_pair_runs_over_the_wired_link() {
        let experiment = parse_experiment(RTP_SAMPLE).unwrap();
        let plan = ExperimentPlan::from_experiment(&experiment);
        assert_eq!(plan.topology, Topology::PointToPoint);
        assert_eq!(plan.link.max_packets, Some(1000));

        let report = run_plan(&plan);
        assert_eq!(report.topology, Topology::PointToPoint);
        assert_eq!(report.link.as_ref(), Some(&plan.link));
        assert_eq!(report.variants.len(), 1);
        let flow = &report.variants[0].flows[0];
        // 8 s of sending every 20 ms; the cap of 1000 is never reached.
        assert_eq!(flow.counters.tx_packets, 400);
        assert_eq!(flow.counters.rx_packets, 400);
        assert_eq!(flow.counters.rx_bytes, 400 * 188);
        // 188 bytes at 10 Mbps takes 151 us, plus 2 ms on the wire.
        assert!((flow.metrics.mean_delay_ms - 2.151).abs() < 1e-9);
        assert_eq!(flow.tuple.map(|t| t.destination_port), Some(5000));
        check_expectations(&report, &plan.expectations).unwrap();
    }

    #[test]
    fn rtp_packet_cap_ends_the_stream_early() {
        let mut plan = ExperimentPlan {
            topology: Topology::PointToPoint,
            ..ExperimentPlan::default()
        };
        plan.link.max_packets = Some(100);
        plan.set_variants(&["WMM".to_string()]);
        let report = run_plan(&plan);
        let summary = report.summary("WMM").unwrap();
        assert_eq!(summary.tx_packets, 100);
        assert_eq!(summary.rx_packets, 100);
        assert_eq!(summary.lost_packets, 0);
    }
}

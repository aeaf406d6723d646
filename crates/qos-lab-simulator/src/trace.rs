use qos_lab_abstract::{ChannelConfig, PointToPointParams, ScenarioParams, Topology};
use qos_lab_core::{MetricLeader, VariantOutcome, VariantReport, VariantSummary, compare};
use serde::Serialize;

use crate::engine::SessionRecord;

#[derive(Debug, Clone, Serialize)]
pub struct VariantFailure {
    pub variant: String,
    pub error: String,
}

/// Everything one experiment produced, in a form suitable for `--trace-out`.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentReport {
    pub name: String,
    pub topology: Topology,
    pub params: ScenarioParams,
    /// Set for point-to-point runs.
    pub link: Option<PointToPointParams>,
    pub channel: ChannelConfig,
    pub variants: Vec<VariantReport>,
    pub failures: Vec<VariantFailure>,
    pub leaders: Vec<MetricLeader>,
    pub sessions: Vec<SessionRecord>,
}

impl ExperimentReport {
    pub fn new(
        name: &str,
        params: ScenarioParams,
        channel: ChannelConfig,
        outcomes: Vec<VariantOutcome>,
        sessions: Vec<SessionRecord>,
    ) -> Self {
        let mut variants = Vec::new();
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(report) => variants.push(report),
                Err(e) => failures.push(VariantFailure {
                    variant: e.variant().to_string(),
                    error: e.to_string(),
                }),
            }
        }
        let summaries = variants.iter().map(|r| r.summary.clone()).collect::<Vec<_>>();
        Self {
            name: name.to_string(),
            topology: Topology::default(),
            params,
            link: None,
            channel,
            leaders: compare(&summaries),
            variants,
            failures,
            sessions,
        }
    }

    pub fn summaries(&self) -> Vec<VariantSummary> {
        self.variants.iter().map(|r| r.summary.clone()).collect()
    }

    /// Case-insensitive lookup by variant name.
    pub fn summary(&self, variant: &str) -> Option<&VariantSummary> {
        self.variants
            .iter()
            .map(|r| &r.summary)
            .find(|s| s.variant.eq_ignore_ascii_case(variant))
    }

    pub fn failure(&self, variant: &str) -> Option<&VariantFailure> {
        self.failures
            .iter()
            .find(|f| f.variant.eq_ignore_ascii_case(variant))
    }
}

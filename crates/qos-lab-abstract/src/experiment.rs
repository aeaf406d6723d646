use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::{ChannelConfigOverride, PointToPointParamsOverride, ScenarioParamsOverride};
use crate::policy::PolicyOverride;

/// An experiment file: one scenario, several variants, optional expectations.
#[derive(Deserialize, Debug, Clone)]
pub struct Experiment {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub variants: Vec<String>,
    #[serde(default)]
    pub topology: Topology,
    #[serde(default)]
    pub params: ScenarioParamsOverride,
    /// Used by the point-to-point topology only.
    #[serde(default)]
    pub link: PointToPointParamsOverride,
    #[serde(default)]
    pub channel: ChannelConfigOverride,
    /// Per-variant policy overrides, keyed by variant name.
    #[serde(default)]
    pub overrides: BTreeMap<String, PolicyOverride>,
    #[serde(default)]
    pub expectations: Vec<Expectation>,
}

/// Which network the variants run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    /// Stations around an access point with a wired server behind it.
    #[default]
    WifiVoip,
    /// One sender and one receiver on a single wired link.
    PointToPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Throughput,
    Delay,
    Jitter,
    Loss,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Throughput,
        Metric::Delay,
        Metric::Jitter,
        Metric::Loss,
    ];

    /// Throughput is better when larger; everything else when smaller.
    pub fn higher_is_better(&self) -> bool {
        matches!(self, Metric::Throughput)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Throughput => "throughput",
            Metric::Delay => "delay",
            Metric::Jitter => "jitter",
            Metric::Loss => "loss",
        };
        f.write_str(name)
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "throughput" => Ok(Metric::Throughput),
            "delay" => Ok(Metric::Delay),
            "jitter" => Ok(Metric::Jitter),
            "loss" => Ok(Metric::Loss),
            other => Err(format!(
                "unknown metric '{other}' (expected throughput, delay, jitter or loss)"
            )),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expectation {
    /// Average throughput of `variant` is at least `mbps`
    MinThroughput { variant: String, mbps: f64 },
    /// Loss rate of `variant` is at most `percent`
    MaxLossRate { variant: String, percent: f64 },
    /// Average delay of `variant` is at most `ms`
    MaxDelay { variant: String, ms: f64 },
    /// `better` beats `worse` on `metric`
    Outperforms {
        better: String,
        worse: String,
        metric: Metric,
    },
}

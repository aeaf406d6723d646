use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RateAdaptation {
    /// Fixed transmit modes, e.g. `VhtMcs9` for data and `VhtMcs0` for control frames.
    ConstantRate {
        data_mode: String,
        control_mode: String,
    },
    /// Sampling-based adaptation that tracks per-mode delivery probability.
    MinstrelHt,
}

impl RateAdaptation {
    pub fn manager_name(&self) -> &'static str {
        match self {
            RateAdaptation::ConstantRate { .. } => "ConstantRateWifiManager",
            RateAdaptation::MinstrelHt => "MinstrelHtWifiManager",
        }
    }
}

/// Configuration applied to exactly one engine session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantPolicy {
    pub name: String,
    pub queue_capacity_packets: u32,
    pub max_queue_delay_ms: u64,
    pub rate_adaptation: RateAdaptation,
    /// Extra engine attributes passed through untouched.
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
}

impl VariantPolicy {
    /// Flatten the policy into key/value attributes for engines configured that way.
    pub fn attributes(&self) -> Vec<(String, String)> {
        let mut attrs = vec![
            (
                "WifiMacQueue::MaxSize".to_string(),
                format!("{}p", self.queue_capacity_packets),
            ),
            (
                "WifiMacQueue::MaxDelay".to_string(),
                format!("{}ms", self.max_queue_delay_ms),
            ),
            (
                "RemoteStationManager".to_string(),
                self.rate_adaptation.manager_name().to_string(),
            ),
        ];
        if let RateAdaptation::ConstantRate {
            data_mode,
            control_mode,
        } = &self.rate_adaptation
        {
            attrs.push(("DataMode".to_string(), data_mode.clone()));
            attrs.push(("ControlMode".to_string(), control_mode.clone()));
        }
        attrs.extend(self.overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        attrs
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct PolicyOverride {
    pub queue_capacity_packets: Option<u32>,
    pub max_queue_delay_ms: Option<u64>,
    pub rate_adaptation: Option<RateAdaptation>,
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
}

impl PolicyOverride {
    pub fn apply_to(&self, policy: &mut VariantPolicy) {
        if let Some(v) = self.queue_capacity_packets {
            policy.queue_capacity_packets = v;
        }
        if let Some(v) = self.max_queue_delay_ms {
            policy.max_queue_delay_ms = v;
        }
        if let Some(v) = &self.rate_adaptation {
            policy.rate_adaptation = v.clone();
        }
        for (k, v) in &self.overrides {
            policy.overrides.insert(k.clone(), v.clone());
        }
    }
}

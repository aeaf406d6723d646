use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use qos_lab_abstract::{RateAdaptation, VariantPolicy};

use crate::error::GenerateError;

/// The closed set of configuration presets a scenario can run under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Edca,
    Wmm,
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::Edca, Variant::Wmm];

    pub fn name(&self) -> &'static str {
        match self {
            Variant::Edca => "EDCA",
            Variant::Wmm => "WMM",
        }
    }

    pub fn policy(&self) -> VariantPolicy {
        match self {
            Variant::Edca => VariantPolicy {
                name: self.name().to_string(),
                queue_capacity_packets: 500,
                max_queue_delay_ms: 100,
                rate_adaptation: RateAdaptation::ConstantRate {
                    data_mode: "VhtMcs9".to_string(),
                    control_mode: "VhtMcs0".to_string(),
                },
                overrides: BTreeMap::new(),
            },
            Variant::Wmm => VariantPolicy {
                name: self.name().to_string(),
                queue_capacity_packets: 800,
                max_queue_delay_ms: 50,
                rate_adaptation: RateAdaptation::MinstrelHt,
                overrides: BTreeMap::new(),
            },
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Variant {
    type Err = GenerateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Variant::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| GenerateError::InvalidVariant(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_names_case_insensitively() {
        assert_eq!("EDCA".parse::<Variant>(), Ok(Variant::Edca));
        assert_eq!("wmm".parse::<Variant>(), Ok(Variant::Wmm));
        assert_eq!(
            "HCCA".parse::<Variant>(),
            Err(GenerateError::InvalidVariant("HCCA".to_string()))
        );
    }

    #[test]
    fn presets_differ_in_queue_and_rate_control() {
        let edca = Variant::Edca.policy();
        let wmm = Variant::Wmm.policy();
        assert_eq!(edca.queue_capacity_packets, 500);
        assert_eq!(edca.max_queue_delay_ms, 100);
        assert_eq!(wmm.queue_capacity_packets, 800);
        assert_eq!(wmm.max_queue_delay_ms, 50);
        assert_eq!(wmm.rate_adaptation, RateAdaptation::MinstrelHt);
        assert_ne!(edca.rate_adaptation, wmm.rate_adaptation);
    }
}

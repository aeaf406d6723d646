use serde::{Deserialize, Serialize};

/// The closed parameter set a scenario is generated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioParams {
    pub station_count: u32,
    pub radius_m: f64,
    pub packet_size: u32,
    pub base_interval_ms: u64,
    pub duration_ms: u64,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            station_count: 3,
            radius_m: 40.0,
            packet_size: 1000,
            base_interval_ms: 50,
            duration_ms: 100_000,
        }
    }
}

impl ScenarioParams {
    pub fn duration_secs(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct ScenarioParamsOverride {
    pub station_count: Option<u32>,
    pub radius_m: Option<f64>,
    pub packet_size: Option<u32>,
    pub base_interval_ms: Option<u64>,
    pub duration_ms: Option<u64>,
}

impl ScenarioParamsOverride {
    pub fn apply_to(&self, params: &mut ScenarioParams) {
        if let Some(v) = self.station_count {
            params.station_count = v;
        }
        if let Some(v) = self.radius_m {
            params.radius_m = v;
        }
        if let Some(v) = self.packet_size {
            params.packet_size = v;
        }
        if let Some(v) = self.base_interval_ms {
            params.base_interval_ms = v;
        }
        if let Some(v) = self.duration_ms {
            params.duration_ms = v;
        }
    }
}

/// Channel settings understood by the built-in engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Base frame error probability, scaled up by the MCS index of the rate in use.
    pub loss_rate: f64,
    /// Bounds of the random channel access delay added before each wireless frame.
    pub min_access_delay_us: u64,
    pub max_access_delay_us: u64,
    pub seed: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.005,
            min_access_delay_us: 0,
            max_access_delay_us: 200,
            seed: 42,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct ChannelConfigOverride {
    pub loss_rate: Option<f64>,
    pub min_access_delay_us: Option<u64>,
    pub max_access_delay_us: Option<u64>,
    pub seed: Option<u64>,
}

impl ChannelConfigOverride {
    pub fn apply_to(&self, config: &mut ChannelConfig) {
        if let Some(v) = self.loss_rate {
            config.loss_rate = v;
        }
        if let Some(v) = self.min_access_delay_us {
            config.min_access_delay_us = v;
        }
        if let Some(v) = self.max_access_delay_us {
            config.max_access_delay_us = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
    }
}

/// A single wired link between one sender and one receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointToPointParams {
    pub data_rate_mbps: f64,
    pub delay_ms: u64,
    pub packet_size: u32,
    pub interval_ms: u64,
    /// `None` sends until `duration_ms`.
    pub max_packets: Option<u64>,
    pub port: u16,
    pub sink_start_ms: u64,
    pub source_start_ms: u64,
    pub duration_ms: u64,
}

impl Default for PointToPointParams {
    fn default() -> Self {
        Self {
            data_rate_mbps: 10.0,
            delay_ms: 2,
            packet_size: 160,
            interval_ms: 20,
            max_packets: Some(1000),
            port: 5000,
            sink_start_ms: 1_000,
            source_start_ms: 2_000,
            duration_ms: 10_000,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct PointToPointParamsOverride {
    pub data_rate_mbps: Option<f64>,
    pub delay_ms: Option<u64>,
    pub packet_size: Option<u32>,
    pub interval_ms: Option<u64>,
    pub max_packets: Option<u64>,
    pub port: Option<u16>,
    pub sink_start_ms: Option<u64>,
    pub source_start_ms: Option<u64>,
    pub duration_ms: Option<u64>,
}

impl PointToPointParamsOverride {
    pub fn apply_to(&self, params: &mut PointToPointParams) {
        if let Some(v) = self.data_rate_mbps {
            params.data_rate_mbps = v;
        }
        if let Some(v) = self.delay_ms {
            params.delay_ms = v;
        }
        if let Some(v) = self.packet_size {
            params.packet_size = v;
        }
        if let Some(v) = self.interval_ms {
            params.interval_ms = v;
        }
        if let Some(v) = self.max_packets {
            params.max_packets = Some(v);
        }
        if let Some(v) = self.port {
            params.port = v;
        }
        if let Some(v) = self.sink_start_ms {
            params.sink_start_ms = v;
        }
        if let Some(v) = self.source_start_ms {
            params.source_start_ms = v;
        }
        if let Some(v) = self.duration_ms {
            params.duration_ms = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_only_touches_set_fields() {
        let mut params = ScenarioParams::default();
        let patch = ScenarioParamsOverride {
            station_count: Some(5),
            duration_ms: Some(30_000),
            ..Default::default()
        };
        patch.apply_to(&mut params);
        assert_eq!(params.station_count, 5);
        assert_eq!(params.duration_ms, 30_000);
        assert_eq!(params.radius_m, 40.0);
        assert_eq!(params.base_interval_ms, 50);
        assert_eq!(params.duration_secs(), 30.0);
    }

    #[test]
    fn channel_override_keeps_defaults() {
        let mut channel = ChannelConfig::default();
        ChannelConfigOverride {
            seed: Some(7),
            ..Default::default()
        }
        .apply_to(&mut channel);
        assert_eq!(channel.seed, 7);
        assert_eq!(channel.loss_rate, 0.005);
    }

    #[test]
    fn link_override_sets_a_packet_cap() {
        let mut link = PointToPointParams::default();
        assert_eq!(link.max_packets, Some(1000));
        PointToPointParamsOverride {
            max_packets: Some(50),
            interval_ms: Some(10),
            ..Default::default()
        }
        .apply_to(&mut link);
        assert_eq!(link.max_packets, Some(50));
        assert_eq!(link.interval_ms, 10);
        assert_eq!(link.packet_size, 160);
    }
}

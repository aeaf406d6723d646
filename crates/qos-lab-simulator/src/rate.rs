//! 802.11ac single-stream rate selection: fixed modes and a Minstrel-style
//! adaptive controller.

use rand::Rng;
use rand::rngs::StdRng;

/// VhtMcs0..=9 PHY rates, 80 MHz, one spatial stream, long guard interval.
const VHT_RATES_MBPS: [f64; 10] = [
    29.3, 58.5, 87.8, 117.0, 175.5, 234.0, 263.3, 292.5, 351.0, 390.0,
];

const EWMA_WEIGHT: f64 = 0.25;
const UPDATE_INTERVAL_US: u64 = 100_000;
/// Every Nth frame goes out on a random mode to keep statistics fresh.
const SAMPLE_EVERY: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mcs(usize);

impl Mcs {
    pub fn index(self) -> usize {
        self.0
    }

    pub fn rate_mbps(self) -> f64 {
        VHT_RATES_MBPS[self.0]
    }
}

/// Parse a mode name such as `VhtMcs7`.
pub fn parse_vht_mode(name: &str) -> Option<Mcs> {
    let index: usize = name.strip_prefix("VhtMcs")?.parse().ok()?;
    (index < VHT_RATES_MBPS.len()).then_some(Mcs(index))
}

#[derive(Debug, Clone)]
pub struct Minstrel {
    ewma: [f64; 10],
    attempts: [u32; 10],
    successes: [u32; 10],
    frames: u64,
    last_update_us: u64,
}

impl Minstrel {
    fn new() -> Self {
        Self {
            ewma: [1.0; 10],
            attempts: [0; 10],
            successes: [0; 10],
            frames: 0,
            last_update_us: 0,
        }
    }

    /// Fold the current window into the success estimates.
    fn update(&mut self, now_us: u64) {
        for i in 0..VHT_RATES_MBPS.len() {
            if self.attempts[i] > 0 {
                let p = f64::from(self.successes[i]) / f64::from(self.attempts[i]);
                self.ewma[i] = (1.0 - EWMA_WEIGHT) * self.ewma[i] + EWMA_WEIGHT * p;
            }
        }
        self.attempts = [0; 10];
        self.successes = [0; 10];
        self.last_update_us = now_us;
    }

    /// Highest expected throughput; ties go to the lower mode.
    fn best(&self) -> Mcs {
        let mut best = 0;
        for i in 1..VHT_RATES_MBPS.len() {
            if VHT_RATES_MBPS[i] * self.ewma[i] > VHT_RATES_MBPS[best] * self.ewma[best] {
                best = i;
            }
        }
        Mcs(best)
    }
}

#[derive(Debug, Clone)]
pub enum RateController {
    Constant(Mcs),
    Minstrel(Minstrel),
}

impl RateController {
    pub fn constant(mcs: Mcs) -> Self {
        RateController::Constant(mcs)
    }

    pub fn minstrel() -> Self {
        RateController::Minstrel(Minstrel::new())
    }

    pub fn select(&mut self, rng: &mut StdRng, now_us: u64) -> Mcs {
        match self {
            RateController::Constant(mcs) => *mcs,
            RateController::Minstrel(m) => {
                if now_us.saturating_sub(m.last_update_us) >= UPDATE_INTERVAL_US {
                    m.update(now_us);
                }
                m.frames += 1;
                if m.frames % SAMPLE_EVERY == 0 {
                    Mcs(rng.random_range(0..VHT_RATES_MBPS.len()))
                } else {
                    m.best()
                }
            }
        }
    }

    pub fn report(&mut self, mcs: Mcs, success: bool) {
        if let RateController::Minstrel(m) = self {
            m.attempts[mcs.0] += 1;
            if success {
                m.successes[mcs.0] += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn parses_vht_modes() {
        assert_eq!(parse_vht_mode("VhtMcs0"), Some(Mcs(0)));
        assert_eq!(parse_vht_mode("VhtMcs9").map(Mcs::rate_mbps), Some(390.0));
        assert_eq!(parse_vht_mode("VhtMcs10"), None);
        assert_eq!(parse_vht_mode("HtMcs7"), None);
        assert_eq!(parse_vht_mode("VhtMcs"), None);
    }

    #[test]
    fn constant_never_moves() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut rate = RateController::constant(Mcs(4));
        for t in 0..50 {
            rate.report(Mcs(4), false);
            assert_eq!(rate.select(&mut rng, t * 200_000), Mcs(4));
        }
    }

    #[test]
    fn minstrel_starts_high_and_backs_off_failing_modes() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut rate = RateController::minstrel();
        assert_eq!(rate.select(&mut rng, 0), Mcs(9));

        let RateController::Minstrel(m) = &mut rate else {
            unreachable!()
        };
        for round in 1..=20 {
            for i in 0..10 {
                m.attempts[i] += 4;
                if i <= 3 {
                    m.successes[i] += 4;
                }
            }
            m.update(round * UPDATE_INTERVAL_US);
        }
        assert_eq!(m.best(), Mcs(3));
    }

    #[test]
    fn minstrel_samples_every_tenth_frame() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut rate = RateController::minstrel();
        let picks: Vec<Mcs> = (0..9).map(|_| rate.select(&mut rng, 0)).collect();
        assert!(picks.iter().all(|&m| m == Mcs(9)));
        let RateController::Minstrel(m) = &rate else {
            unreachable!()
        };
        assert_eq!(m.frames, 9);
    }
}

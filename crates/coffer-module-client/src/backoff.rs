// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Exponential backoff for connection attempts.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

/// Configuration for the backoff applied between connection attempts.
///
/// The delay before attempt `n` is `base_delay * multiplier^n`, capped at `max_delay`,
/// with a uniformly random jitter of up to `jitter` of the delay added or subtracted.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExponentialBackoffConfig {
    /// The delay before the first retry.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "base_delay_millis", default = "defaults::base_delay")]
    pub base_delay: Duration,
    /// Factor applied to the delay after every failed attempt.
    #[serde(default = "defaults::multiplier")]
    pub multiplier: f64,
    /// Fraction of the delay used as the jitter bound.
    #[serde(default = "defaults::jitter")]
    pub jitter: f64,
    /// Upper bound on the delay between attempts, before jitter.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "max_delay_millis", default = "defaults::max_delay")]
    pub max_delay: Duration,
}

impl Default for ExponentialBackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: defaults::base_delay(),
            multiplier: defaults::multiplier(),
            jitter: defaults::jitter(),
            max_delay: defaults::max_delay(),
        }
    }
}

impl ExponentialBackoffConfig {
    /// The jittered delay to sleep before retry number `attempt` (0-based).
    pub fn delay_for_attempt(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let exponential =
            self.base_delay.as_secs_f64() * self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let capped = exponential.min(self.max_delay.as_secs_f64());
        let jittered = capped * (1.0 + self.jitter * rng.gen_range(-1.0..=1.0));
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Backoff default values.
mod defaults {
    use std::time::Duration;

    pub(super) fn base_delay() -> Duration {
        Duration::from_millis(500)
    }

    pub(super) fn multiplier() -> f64 {
        1.5
    }

    pub(super) fn jitter() -> f64 {
        0.2
    }

    pub(super) fn max_delay() -> Duration {
        Duration::from_secs(5)
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    #[test]
    fn delays_grow_exponentially_and_cap() {
        let config = ExponentialBackoffConfig {
            jitter: 0.0,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(42);
        assert_eq!(
            config.delay_for_attempt(0, &mut rng),
            Duration::from_millis(500)
        );
        assert_eq!(
            config.delay_for_attempt(1, &mut rng),
            Duration::from_millis(750)
        );
        assert_eq!(
            config.delay_for_attempt(2, &mut rng),
            Duration::from_millis(1125)
        );
        // Far enough out, the cap takes over.
        assert_eq!(config.delay_for_attempt(30, &mut rng), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_the_configured_fraction() {
        let config = ExponentialBackoffConfig::default();
        let mut rng = StdRng::seed_from_u64(42);
        for attempt in 0..8 {
            let unjittered = ExponentialBackoffConfig {
                jitter: 0.0,
                ..config.clone()
            }
            .delay_for_attempt(attempt, &mut rng)
            .as_secs_f64();
            let jittered = config.delay_for_attempt(attempt, &mut rng).as_secs_f64();
            assert!(jittered >= unjittered * (1.0 - config.jitter) - f64::EPSILON);
            assert!(jittered <= unjittered * (1.0 + config.jitter) + f64::EPSILON);
        }
    }
}

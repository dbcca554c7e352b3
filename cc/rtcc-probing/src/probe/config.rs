// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{bandwidth::Bandwidth, probe::Error};
use core::time::Duration;
use num_rational::Ratio;
use num_traits::{One, Zero};

const DEFAULT_FIRST_EXPONENTIAL_PROBE_SCALE: Ratio<u64> = Ratio::new_raw(3, 1);
const DEFAULT_SECOND_EXPONENTIAL_PROBE_SCALE: Ratio<u64> = Ratio::new_raw(6, 1);
const DEFAULT_FURTHER_EXPONENTIAL_PROBE_SCALE: Ratio<u64> = Ratio::new_raw(2, 1);
const DEFAULT_FURTHER_PROBE_THRESHOLD: Ratio<u64> = Ratio::new_raw(7, 10);
const DEFAULT_ALR_PROBING_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_ALR_PROBE_SCALE: Ratio<u64> = Ratio::new_raw(2, 1);
const DEFAULT_NETWORK_STATE_PROBE_SCALE: Ratio<u64> = Ratio::new_raw(1, 1);
const DEFAULT_FIRST_ALLOCATION_PROBE_SCALE: Ratio<u64> = Ratio::new_raw(1, 1);
const DEFAULT_SECOND_ALLOCATION_PROBE_SCALE: Ratio<u64> = Ratio::new_raw(2, 1);
const DEFAULT_PROBE_DURATION: Duration = Duration::from_millis(15);
const DEFAULT_MIN_PROBE_PACKETS_SENT: u32 = 5;

/// Tunables for the probe controller
///
/// The struct carries already-parsed values; mapping an external
/// key/value representation onto it is the embedding's concern. Optional
/// fields switch the corresponding probing regime off entirely when
/// `None`. Out-of-range values do not fail construction: the controller
/// sanitizes them back to the defaults below (see [`Config::sanitized`]).
#[derive(Clone, Debug)]
pub struct Config {
    /// Multiplier on the start bitrate for the first initial probe
    pub first_exponential_probe_scale: Ratio<u64>,
    /// Multiplier on the start bitrate for the second initial probe; when
    /// absent only one initial probe is issued
    pub second_exponential_probe_scale: Option<Ratio<u64>>,
    /// Multiplier on the newest estimate for follow-up exponential probes
    pub further_exponential_probe_scale: Ratio<u64>,
    /// Fraction of the last probe's target the new estimate must reach to
    /// trigger a follow-up probe
    pub further_probe_threshold: Ratio<u64>,
    /// Minimum wall-time gap between ALR probes
    pub alr_probing_interval: Duration,
    /// Multiplier on the current estimate for ALR probes
    pub alr_probe_scale: Ratio<u64>,
    /// Minimum wall-time gap between network-state-driven probes; when
    /// absent periodic network-state probing is disabled
    pub network_state_estimate_probing_interval: Option<Duration>,
    /// Ratio of new/old network-state link capacity at or above which to
    /// probe on the next process tick
    pub network_state_estimate_fast_rampup_rate: Option<Ratio<u64>>,
    /// Ratio of new/old network-state link capacity at or below which to
    /// probe on the next process tick (detecting a rebound after a drop)
    pub network_state_estimate_drop_down_rate: Option<Ratio<u64>>,
    /// Multiplier applied to min(estimate, link capacity) for
    /// network-state probes
    pub network_state_probe_scale: Ratio<u64>,
    /// Cluster duration while network-state probing is active
    pub network_state_probe_duration: Duration,
    /// Multiplier on a newly reported max allocated bitrate for the first
    /// allocation probe; when absent allocation probing is disabled
    pub first_allocation_probe_scale: Option<Ratio<u64>>,
    /// Multiplier for the second allocation probe
    pub second_allocation_probe_scale: Option<Ratio<u64>>,
    /// Allow follow-up exponential probing after allocation probes
    pub allocation_allow_further_probing: bool,
    /// Absolute cap on allocation-probe target rates
    pub allocation_probe_max: Bandwidth,
    /// Minimum packet count written into each emitted cluster
    pub min_probe_packets_sent: u32,
    /// Minimum duration written into each emitted cluster
    pub min_probe_duration: Duration,
    /// Clamp probe targets to the current estimate while the estimator
    /// reports loss-limited state
    pub limit_probe_target_rate_to_loss_bwe: bool,
    /// Suppress all probes once min(estimate, link capacity) reaches this
    /// fraction of the max bitrate
    pub skip_if_estimate_larger_than_fraction_of_max: Option<Ratio<u64>>,
    /// Probe aggressively after a detected large drop even outside ALR
    pub rapid_recovery_experiment: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            first_exponential_probe_scale: DEFAULT_FIRST_EXPONENTIAL_PROBE_SCALE,
            second_exponential_probe_scale: Some(DEFAULT_SECOND_EXPONENTIAL_PROBE_SCALE),
            further_exponential_probe_scale: DEFAULT_FURTHER_EXPONENTIAL_PROBE_SCALE,
            further_probe_threshold: DEFAULT_FURTHER_PROBE_THRESHOLD,
            alr_probing_interval: DEFAULT_ALR_PROBING_INTERVAL,
            alr_probe_scale: DEFAULT_ALR_PROBE_SCALE,
            network_state_estimate_probing_interval: None,
            network_state_estimate_fast_rampup_rate: None,
            network_state_estimate_drop_down_rate: None,
            network_state_probe_scale: DEFAULT_NETWORK_STATE_PROBE_SCALE,
            network_state_probe_duration: DEFAULT_PROBE_DURATION,
            first_allocation_probe_scale: Some(DEFAULT_FIRST_ALLOCATION_PROBE_SCALE),
            second_allocation_probe_scale: Some(DEFAULT_SECOND_ALLOCATION_PROBE_SCALE),
            allocation_allow_further_probing: false,
            allocation_probe_max: Bandwidth::INFINITY,
            min_probe_packets_sent: DEFAULT_MIN_PROBE_PACKETS_SENT,
            min_probe_duration: DEFAULT_PROBE_DURATION,
            limit_probe_target_rate_to_loss_bwe: false,
            skip_if_estimate_larger_than_fraction_of_max: None,
            rapid_recovery_experiment: false,
        }
    }
}

impl Config {
    /// Checks every field against its documented range
    ///
    /// Scales and thresholds must be positive, intervals and cluster
    /// floors non-zero, the fast-rampup rate above one and the drop-down
    /// rate below one.
    pub fn validate(&self) -> Result<(), Error> {
        let valid = !self.first_exponential_probe_scale.is_zero()
            && self.second_exponential_probe_scale.map_or(true, |scale| !scale.is_zero())
            && !self.further_exponential_probe_scale.is_zero()
            && !self.further_probe_threshold.is_zero()
            && !self.alr_probing_interval.is_zero()
            && !self.alr_probe_scale.is_zero()
            && self
                .network_state_estimate_probing_interval
                .map_or(true, |interval| !interval.is_zero())
            && self
                .network_state_estimate_fast_rampup_rate
                .map_or(true, |rate| rate > Ratio::one())
            && self
                .network_state_estimate_drop_down_rate
                .map_or(true, |rate| !rate.is_zero() && rate < Ratio::one())
            && !self.network_state_probe_scale.is_zero()
            && !self.network_state_probe_duration.is_zero()
            && self.first_allocation_probe_scale.map_or(true, |scale| !scale.is_zero())
            && self.second_allocation_probe_scale.map_or(true, |scale| !scale.is_zero())
            && self.min_probe_packets_sent > 0
            && !self.min_probe_duration.is_zero()
            && self
                .skip_if_estimate_larger_than_fraction_of_max
                .map_or(true, |fraction| !fraction.is_zero());

        if valid {
            Ok(())
        } else {
            Err(Error::ConfigOutOfRange)
        }
    }

    /// Returns the config with every out-of-range field replaced by its
    /// default
    ///
    /// Out-of-range optional rates fall back to `None`, switching the
    /// regime off rather than running it with a nonsensical parameter.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();

        fn ratio_or(value: Ratio<u64>, default: Ratio<u64>) -> Ratio<u64> {
            if value.is_zero() {
                default
            } else {
                value
            }
        }

        Self {
            first_exponential_probe_scale: ratio_or(
                self.first_exponential_probe_scale,
                defaults.first_exponential_probe_scale,
            ),
            second_exponential_probe_scale: self
                .second_exponential_probe_scale
                .map(|scale| ratio_or(scale, DEFAULT_SECOND_EXPONENTIAL_PROBE_SCALE)),
            further_exponential_probe_scale: ratio_or(
                self.further_exponential_probe_scale,
                defaults.further_exponential_probe_scale,
            ),
            further_probe_threshold: ratio_or(
                self.further_probe_threshold,
                defaults.further_probe_threshold,
            ),
            alr_probing_interval: if self.alr_probing_interval.is_zero() {
                defaults.alr_probing_interval
            } else {
                self.alr_probing_interval
            },
            alr_probe_scale: ratio_or(self.alr_probe_scale, defaults.alr_probe_scale),
            network_state_estimate_probing_interval: self
                .network_state_estimate_probing_interval
                .filter(|interval| !interval.is_zero()),
            network_state_estimate_fast_rampup_rate: self
                .network_state_estimate_fast_rampup_rate
                .filter(|rate| *rate > Ratio::one()),
            network_state_estimate_drop_down_rate: self
                .network_state_estimate_drop_down_rate
                .filter(|rate| !rate.is_zero() && *rate < Ratio::one()),
            network_state_probe_scale: ratio_or(
                self.network_state_probe_scale,
                defaults.network_state_probe_scale,
            ),
            network_state_probe_duration: if self.network_state_probe_duration.is_zero() {
                defaults.network_state_probe_duration
            } else {
                self.network_state_probe_duration
            },
            first_allocation_probe_scale: self
                .first_allocation_probe_scale
                .map(|scale| ratio_or(scale, DEFAULT_FIRST_ALLOCATION_PROBE_SCALE)),
            second_allocation_probe_scale: self
                .second_allocation_probe_scale
                .map(|scale| ratio_or(scale, DEFAULT_SECOND_ALLOCATION_PROBE_SCALE)),
            min_probe_packets_sent: if self.min_probe_packets_sent == 0 {
                defaults.min_probe_packets_sent
            } else {
                self.min_probe_packets_sent
            },
            min_probe_duration: if self.min_probe_duration.is_zero() {
                defaults.min_probe_duration
            } else {
                self.min_probe_duration
            },
            skip_if_estimate_larger_than_fraction_of_max: self
                .skip_if_estimate_larger_than_fraction_of_max
                .filter(|fraction| !fraction.is_zero()),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn zero_scale_is_rejected() {
        let config = Config {
            further_probe_threshold: Ratio::new_raw(0, 1),
            ..Default::default()
        };
        assert_eq!(Err(Error::ConfigOutOfRange), config.validate());
    }

    #[test]
    fn sanitize_restores_defaults() {
        let config = Config {
            further_probe_threshold: Ratio::new_raw(0, 1),
            first_exponential_probe_scale: Ratio::new_raw(0, 5),
            min_probe_packets_sent: 0,
            min_probe_duration: Duration::ZERO,
            ..Default::default()
        }
        .sanitized();

        assert_eq!(DEFAULT_FURTHER_PROBE_THRESHOLD, config.further_probe_threshold);
        assert_eq!(
            DEFAULT_FIRST_EXPONENTIAL_PROBE_SCALE,
            config.first_exponential_probe_scale
        );
        assert_eq!(DEFAULT_MIN_PROBE_PACKETS_SENT, config.min_probe_packets_sent);
        assert_eq!(DEFAULT_PROBE_DURATION, config.min_probe_duration);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sanitize_disables_nonsensical_rates() {
        // A fast-rampup rate at or below one would fire on every estimate
        // and a drop-down rate at or above one would never detect a drop
        let config = Config {
            network_state_estimate_fast_rampup_rate: Some(Ratio::new_raw(1, 1)),
            network_state_estimate_drop_down_rate: Some(Ratio::new_raw(3, 2)),
            skip_if_estimate_larger_than_fraction_of_max: Some(Ratio::new_raw(0, 1)),
            network_state_estimate_probing_interval: Some(Duration::ZERO),
            ..Default::default()
        }
        .sanitized();

        assert_eq!(None, config.network_state_estimate_fast_rampup_rate);
        assert_eq!(None, config.network_state_estimate_drop_down_rate);
        assert_eq!(None, config.skip_if_estimate_larger_than_fraction_of_max);
        assert_eq!(None, config.network_state_estimate_probing_interval);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sanitize_keeps_valid_values() {
        let config = Config {
            alr_probe_scale: Ratio::new_raw(3, 2),
            network_state_estimate_fast_rampup_rate: Some(Ratio::new_raw(11, 10)),
            ..Default::default()
        }
        .sanitized();

        assert_eq!(Ratio::new_raw(3, 2), config.alr_probe_scale);
        assert_eq!(
            Some(Ratio::new_raw(11, 10)),
            config.network_state_estimate_fast_rampup_rate
        );
    }
}

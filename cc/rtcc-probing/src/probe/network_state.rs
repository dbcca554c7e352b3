// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Probing driven by an external network-state estimate
//!
//! A network-state predictor supplies an upper bound on path capacity.
//! Sudden movement of that bound schedules a probe for the next process
//! tick; optionally the controller also re-probes against the bound at a
//! fixed interval.

use crate::{bandwidth::Bandwidth, probe::ProbeController, time::Timestamp};

/// An externally supplied path-capacity prediction
///
/// Only the upper bound participates in probing decisions; the estimate is
/// otherwise treated as opaque.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkStateEstimate {
    /// Upper bound on the currently estimated path capacity
    pub link_capacity_upper: Bandwidth,
}

impl ProbeController {
    /// Stores a new network-state estimate
    ///
    /// A capacity bound that moved past the configured fast-rampup or
    /// drop-down ratio relative to the previous one schedules a probe for
    /// the next process tick.
    pub fn set_network_state_estimate(&mut self, estimate: NetworkStateEstimate) {
        if let Some(prior) = self.network_estimate {
            if let Some(fast_rampup_rate) = self.config.network_state_estimate_fast_rampup_rate {
                if estimate.link_capacity_upper >= prior.link_capacity_upper * fast_rampup_rate {
                    self.send_probe_on_next_process_interval = true;
                }
            }
            if let Some(drop_down_rate) = self.config.network_state_estimate_drop_down_rate {
                // A bound collapsing this far usually rebounds; probing
                // early re-discovers the capacity without waiting for the
                // estimator to ramp
                if estimate.link_capacity_upper <= prior.link_capacity_upper * drop_down_rate {
                    self.send_probe_on_next_process_interval = true;
                }
            }
        }
        self.network_estimate = Some(estimate);
    }

    /// True if a periodic network-state probe is due at `at_time`
    pub(super) fn time_for_network_state_probe(&self, at_time: Timestamp) -> bool {
        let Some(interval) = self.config.network_state_estimate_probing_interval else {
            return false;
        };
        if self.network_estimate.is_none() {
            return false;
        }
        self.time_last_probing_initiated.map_or(true, |last| {
            at_time.saturating_duration_since(last) >= interval
        })
    }

    /// Target rate for a network-state probe, bounded by both the estimate
    /// and the predicted capacity
    pub(super) fn network_state_probe_rate(&self) -> Option<Bandwidth> {
        let estimate = self.network_estimate?;
        Some(
            self.estimated_bitrate.min(estimate.link_capacity_upper)
                * self.config.network_state_probe_scale,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::NetworkStateEstimate;
    use crate::{
        bandwidth::Bandwidth,
        probe::{Config, ProbeController},
        time::Timestamp,
    };
    use core::time::Duration;
    use num_rational::Ratio;

    fn estimate(kilobits: u64) -> NetworkStateEstimate {
        NetworkStateEstimate {
            link_capacity_upper: Bandwidth::kilobits_per_second(kilobits),
        }
    }

    #[test]
    fn fast_rampup_schedules_probe() {
        let mut controller = ProbeController::new(Config {
            network_state_estimate_fast_rampup_rate: Some(Ratio::new_raw(5, 4)),
            ..Default::default()
        });

        // The first estimate has nothing to be compared against
        controller.set_network_state_estimate(estimate(1_000));
        assert!(!controller.send_probe_on_next_process_interval);

        controller.set_network_state_estimate(estimate(1_200));
        assert!(!controller.send_probe_on_next_process_interval);

        controller.set_network_state_estimate(estimate(1_500));
        assert!(controller.send_probe_on_next_process_interval);
    }

    #[test]
    fn drop_down_schedules_probe() {
        let mut controller = ProbeController::new(Config {
            network_state_estimate_drop_down_rate: Some(Ratio::new_raw(1, 2)),
            ..Default::default()
        });

        controller.set_network_state_estimate(estimate(2_000));
        controller.set_network_state_estimate(estimate(1_100));
        assert!(!controller.send_probe_on_next_process_interval);

        controller.set_network_state_estimate(estimate(2_000));
        controller.set_network_state_estimate(estimate(900));
        assert!(controller.send_probe_on_next_process_interval);
    }

    #[test]
    fn periodic_probe_requires_interval_and_estimate() {
        let mut controller = ProbeController::new(Config::default());
        controller.set_network_state_estimate(estimate(1_000));
        // The regime is off without a configured interval
        assert!(!controller.time_for_network_state_probe(Timestamp::from_millis(60_000)));

        let mut controller = ProbeController::new(Config {
            network_state_estimate_probing_interval: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        assert!(!controller.time_for_network_state_probe(Timestamp::from_millis(60_000)));

        controller.set_network_state_estimate(estimate(1_000));
        assert!(controller.time_for_network_state_probe(Timestamp::from_millis(60_000)));

        controller.time_last_probing_initiated = Some(Timestamp::from_millis(58_000));
        assert!(!controller.time_for_network_state_probe(Timestamp::from_millis(60_000)));
        assert!(controller.time_for_network_state_probe(Timestamp::from_millis(63_000)));
    }

    #[test]
    fn probe_rate_bounded_by_estimate_and_capacity() {
        let mut controller = ProbeController::new(Config::default());
        assert_eq!(None, controller.network_state_probe_rate());

        controller.estimated_bitrate = Bandwidth::kilobits_per_second(1_000);
        controller.set_network_state_estimate(estimate(600));
        assert_eq!(
            Some(Bandwidth::kilobits_per_second(600)),
            controller.network_state_probe_rate()
        );

        controller.set_network_state_estimate(estimate(4_000));
        assert_eq!(
            Some(Bandwidth::kilobits_per_second(1_000)),
            controller.network_state_probe_rate()
        );
    }
}

// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Probing to recover from large estimate drops
//!
//! When the estimate collapses, a competing flow or a transient outage are
//! indistinguishable from genuinely lost capacity. The controller records
//! the pre-drop rate and, where it is safe to do so (inside ALR, or under
//! the rapid-recovery experiment), probes just below that rate: if the
//! capacity is still there the estimator recovers in one round trip instead
//! of ramping up from the collapsed value.

use crate::{
    bandwidth::Bandwidth,
    event::Publisher,
    probe::{
        ProbeClusterConfig, ProbeController, DROP_PROBE_FRACTION, LARGE_DROP_THRESHOLD,
        MIN_TIME_BETWEEN_LARGE_DROPS,
    },
    time::Timestamp,
};
use alloc::vec::Vec;

impl ProbeController {
    /// Caller-initiated probe after a perceived bandwidth drop
    ///
    /// Only honored while probing is not already in flight and the sender
    /// is (or was until recently) application limited; the probe targets
    /// just below the smaller of the current estimate and the pre-drop
    /// rate.
    pub fn request_probe<Pub: Publisher>(
        &mut self,
        at_time: Timestamp,
        publisher: &mut Pub,
    ) -> Vec<ProbeClusterConfig> {
        let at_time = self.align_time(at_time);

        let alr_ended_recently = self.alr_end_time.map_or(false, |end| {
            at_time.saturating_duration_since(end) < self.config.alr_probing_interval
        });
        if !(self.is_in_alr() || alr_ended_recently) {
            return Vec::new();
        }
        if !self.network_available
            || self.state.is_waiting_for_probing_result()
            || self.estimated_bitrate.is_zero()
            || self.estimated_bitrate >= self.max_bitrate
            || self.bitrate_before_last_large_drop.is_zero()
        {
            return Vec::new();
        }
        // One drop probe per ALR probing interval
        let recently_probed_for_drop = self.last_bwe_drop_probing_time.map_or(false, |last| {
            at_time.saturating_duration_since(last) < self.config.alr_probing_interval
        });
        if recently_probed_for_drop {
            return Vec::new();
        }

        let rate = self
            .estimated_bitrate
            .min(self.bitrate_before_last_large_drop)
            * DROP_PROBE_FRACTION;
        let pending_probes = self.initiate_probing(at_time, &[rate], false, publisher);
        if !pending_probes.is_empty() {
            self.last_bwe_drop_probing_time = Some(at_time);
        }
        pending_probes
    }

    /// Large-drop bookkeeping for an estimate that did not continue the
    /// exponential chain
    ///
    /// `bitrate` is the incoming estimate; `self.estimated_bitrate` still
    /// holds the previous one.
    pub(super) fn on_estimate_drop<Pub: Publisher>(
        &mut self,
        bitrate: Bandwidth,
        at_time: Timestamp,
        publisher: &mut Pub,
    ) -> Vec<ProbeClusterConfig> {
        if bitrate >= self.estimated_bitrate * LARGE_DROP_THRESHOLD {
            return Vec::new();
        }

        // Collapse bursts of shrinking estimates into one recorded drop
        let distinct_drop = self.time_of_last_large_drop.map_or(true, |last| {
            at_time.saturating_duration_since(last) > MIN_TIME_BETWEEN_LARGE_DROPS
        });
        if !distinct_drop {
            return Vec::new();
        }

        self.time_of_last_large_drop = Some(at_time);
        self.bitrate_before_last_large_drop = self.estimated_bitrate;

        if self.in_rapid_recovery_experiment || self.is_in_alr() {
            let rate = self.bitrate_before_last_large_drop * DROP_PROBE_FRACTION;
            return self.initiate_probing(at_time, &[rate], false, publisher);
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        bandwidth::Bandwidth,
        event::testing::Publisher,
        probe::{Config, ProbeController, State},
        time::Timestamp,
    };

    fn kbps(kilobits: u64) -> Bandwidth {
        Bandwidth::kilobits_per_second(kilobits)
    }

    fn controller_with_estimate(config: Config, estimate_kbps: u64) -> ProbeController {
        let mut controller = ProbeController::new(config);
        controller.network_available = true;
        controller.state = State::ProbingComplete;
        controller.estimated_bitrate = kbps(estimate_kbps);
        controller.max_bitrate = kbps(5_000);
        controller
    }

    #[test]
    fn drop_is_recorded_without_probing_outside_alr() {
        let mut controller = controller_with_estimate(Config::default(), 2_000);
        let mut publisher = Publisher::new();

        let probes = controller.set_estimated_bitrate(
            kbps(900),
            false,
            Timestamp::from_millis(10_000),
            &mut publisher,
        );

        assert!(probes.is_empty());
        assert_eq!(kbps(2_000), controller.bitrate_before_last_large_drop);
        assert_eq!(
            Some(Timestamp::from_millis(10_000)),
            controller.time_of_last_large_drop
        );
    }

    #[test]
    fn drops_within_a_second_are_collapsed() {
        let mut controller = controller_with_estimate(Config::default(), 2_000);
        let mut publisher = Publisher::new();

        controller.set_estimated_bitrate(kbps(900), false, Timestamp::from_millis(10_000), &mut publisher);
        // 400 is less than half of 900, but the first drop is still fresh
        controller.set_estimated_bitrate(kbps(400), false, Timestamp::from_millis(10_500), &mut publisher);

        assert_eq!(kbps(2_000), controller.bitrate_before_last_large_drop);
        assert_eq!(
            Some(Timestamp::from_millis(10_000)),
            controller.time_of_last_large_drop
        );
    }

    #[test]
    fn rapid_recovery_probes_after_drop() {
        let config = Config {
            rapid_recovery_experiment: true,
            ..Default::default()
        };
        let mut controller = controller_with_estimate(config, 2_000);
        let mut publisher = Publisher::new();

        let probes = controller.set_estimated_bitrate(
            kbps(900),
            false,
            Timestamp::from_millis(10_000),
            &mut publisher,
        );

        // 85% of the pre-drop rate
        assert_eq!(1, probes.len());
        assert_eq!(kbps(1_700), probes[0].target_rate);
    }

    #[test]
    fn request_probe_targets_below_the_drop() {
        let mut controller = controller_with_estimate(Config::default(), 2_000);
        let mut publisher = Publisher::new();

        controller.set_estimated_bitrate(kbps(900), false, Timestamp::from_millis(10_000), &mut publisher);
        controller.set_alr_start_time(Some(Timestamp::from_millis(11_000)));

        let probes = controller.request_probe(Timestamp::from_millis(12_000), &mut publisher);
        assert_eq!(1, probes.len());
        // min(estimate, pre-drop rate) * 85%
        assert_eq!(kbps(765), probes[0].target_rate);

        // A second request inside the probing interval is suppressed
        let probes = controller.request_probe(Timestamp::from_millis(13_000), &mut publisher);
        assert!(probes.is_empty());
    }

    #[test]
    fn request_probe_requires_alr() {
        let mut controller = controller_with_estimate(Config::default(), 2_000);
        let mut publisher = Publisher::new();

        controller.set_estimated_bitrate(kbps(900), false, Timestamp::from_millis(10_000), &mut publisher);
        assert!(controller
            .request_probe(Timestamp::from_millis(12_000), &mut publisher)
            .is_empty());

        // Recently exited ALR still qualifies
        controller.set_alr_ended_time(Timestamp::from_millis(11_000));
        let probes = controller.request_probe(Timestamp::from_millis(12_000), &mut publisher);
        assert_eq!(1, probes.len());
    }
}

// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Periodic probing inside the application-limited region
//!
//! While the application produces less data than the link could carry, the
//! estimate stops growing on its own. With periodic ALR probing enabled the
//! controller re-probes at a fixed interval so capacity regained during the
//! quiet period is discovered before the application ramps back up.

use crate::{probe::ProbeController, time::Timestamp};

impl ProbeController {
    /// Enables or disables periodic probing while in ALR
    ///
    /// The flag survives [`reset`](Self::reset).
    pub fn enable_periodic_alr_probing(&mut self, enable: bool) {
        self.enable_periodic_alr_probing = enable;
    }

    /// Records the start of an application-limited region, or clears it
    pub fn set_alr_start_time(&mut self, alr_start_time: Option<Timestamp>) {
        self.alr_start_time = alr_start_time;
    }

    /// Records the end of the most recent application-limited region
    pub fn set_alr_ended_time(&mut self, alr_end_time: Timestamp) {
        self.alr_end_time = Some(alr_end_time);
    }

    /// True while the sender is inside an application-limited region
    pub(super) fn is_in_alr(&self) -> bool {
        match (self.alr_start_time, self.alr_end_time) {
            (Some(start), Some(end)) => end < start,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// True if an ALR probe is due at `at_time`
    pub(super) fn time_for_alr_probe(&self, at_time: Timestamp) -> bool {
        if !self.enable_periodic_alr_probing || !self.is_in_alr() {
            return false;
        }
        if self.estimated_bitrate >= self.max_bitrate {
            return false;
        }
        self.time_last_probing_initiated
            .map_or(true, |last| {
                at_time.saturating_duration_since(last) >= self.config.alr_probing_interval
            })
    }
}

// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Decides when and how large active bandwidth probes should be
//!
//! The probe controller is the policy half of active bandwidth probing: it
//! ingests rate signals (configured limits, estimator feedback, ALR
//! intervals, network-state estimates) and emits [`ProbeClusterConfig`]
//! values for the pacer to act on. It owns no clock and performs no I/O;
//! every event carries its own timestamp and the caller invokes events in
//! timestamp order.
//!
//! ```text
//!  Init ---[bitrates set + network available]---> WaitingForProbingResult
//!            (emits the initial exponential probes)
//!
//!  WaitingForProbingResult ---[estimate >= threshold]---> WaitingForProbingResult
//!            (emits a follow-up probe, raising the threshold)
//!  WaitingForProbingResult ---[estimate < threshold]----> ProbingComplete
//!  WaitingForProbingResult ---[cluster timeout]---------> ProbingComplete
//!
//!  ProbingComplete ---[ALR/network-state tick, max raise,
//!                      allocation raise]----------------> WaitingForProbingResult
//!            (emits the corresponding probe)
//!
//!  (any) ---[reset]---> Init
//! ```

use crate::{
    bandwidth::Bandwidth,
    event::{ProbeState, Publisher},
    time::Timestamp,
};
use alloc::{vec, vec::Vec};
use core::{fmt, time::Duration};
use num_rational::Ratio;

mod alr;
mod cluster;
mod config;
mod network_state;
mod recovery;

pub use cluster::{ProbeClusterConfig, ProbeClusterId};
pub use config::Config;
pub use network_state::NetworkStateEstimate;

/// How long emitted probes may remain unanswered before the controller
/// stops waiting for the estimator and resumes periodic probing
pub const PROBE_CLUSTER_TIMEOUT: Duration = Duration::from_secs(5);

/// An estimate below this fraction of the previous one counts as a large
/// drop and starts rapid-recovery tracking
const LARGE_DROP_THRESHOLD: Ratio<u64> = Ratio::new_raw(1, 2);

/// Fraction of the pre-drop rate targeted when probing to recover from a
/// large drop
const DROP_PROBE_FRACTION: Ratio<u64> = Ratio::new_raw(85, 100);

/// Minimum spacing between two recorded large drops
const MIN_TIME_BETWEEN_LARGE_DROPS: Duration = Duration::from_secs(1);

/// Network availability signal from the transport
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkAvailability {
    pub at_time: Timestamp,
    pub network_available: bool,
}

/// Probe controller errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A rate update violated `min <= start <= max`; the event was ignored
    InvalidRange,
    /// A config field was outside its documented range
    ConfigOutOfRange,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidRange => write!(f, "bitrate range violates min <= start <= max"),
            Error::ConfigOutOfRange => write!(f, "config value out of range"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// No probing has been initiated yet
    Init,
    /// Probes are in flight; `min_bitrate_to_probe_further` is the
    /// estimate at which the exponential chain continues
    WaitingForProbingResult {
        since: Timestamp,
        min_bitrate_to_probe_further: Bandwidth,
    },
    /// The last probing round has concluded
    ProbingComplete,
}

impl State {
    fn is_init(&self) -> bool {
        matches!(self, State::Init)
    }

    fn is_waiting_for_probing_result(&self) -> bool {
        matches!(self, State::WaitingForProbingResult { .. })
    }

    fn is_probing_complete(&self) -> bool {
        matches!(self, State::ProbingComplete)
    }

    /// Transition to the given `new_state`
    ///
    /// `Init` is only re-entered through [`ProbeController::reset`], which
    /// assigns the state directly.
    fn transition_to<Pub: Publisher>(&mut self, new_state: State, publisher: &mut Pub) {
        if cfg!(debug_assertions) {
            assert!(
                !new_state.is_init(),
                "Init is only entered through reset"
            );
        }

        if ProbeState::from(&new_state) != ProbeState::from(&*self) {
            publisher.on_probe_controller_state_changed(ProbeState::from(&new_state));
        }

        *self = new_state;
    }
}

impl From<&State> for ProbeState {
    fn from(state: &State) -> Self {
        match state {
            State::Init => ProbeState::Init,
            State::WaitingForProbingResult { .. } => ProbeState::WaitingForProbingResult,
            State::ProbingComplete => ProbeState::ProbingComplete,
        }
    }
}

/// The probe controller
///
/// One instance exists per sending session. All methods execute to
/// completion on the caller's thread and return their emissions
/// synchronously; thread safety is the embedding's concern.
#[derive(Clone, Debug)]
pub struct ProbeController {
    config: Config,
    state: State,
    network_available: bool,
    bwe_limited_due_to_packet_loss: bool,
    estimated_bitrate: Bandwidth,
    start_bitrate: Bandwidth,
    max_bitrate: Bandwidth,
    max_total_allocated_bitrate: Bandwidth,
    network_estimate: Option<NetworkStateEstimate>,
    send_probe_on_next_process_interval: bool,
    alr_start_time: Option<Timestamp>,
    alr_end_time: Option<Timestamp>,
    enable_periodic_alr_probing: bool,
    time_last_probing_initiated: Option<Timestamp>,
    time_of_last_large_drop: Option<Timestamp>,
    bitrate_before_last_large_drop: Bandwidth,
    last_bwe_drop_probing_time: Option<Timestamp>,
    in_rapid_recovery_experiment: bool,
    next_cluster_id: u32,
    /// The most recent event time, used to keep supplied timestamps
    /// non-decreasing
    last_event_time: Option<Timestamp>,
}

impl Default for ProbeController {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl ProbeController {
    /// Constructs a new controller from the given config
    ///
    /// Out-of-range config fields are replaced by their defaults; use
    /// [`Config::validate`] first to detect them.
    pub fn new(config: Config) -> Self {
        let config = config.sanitized();
        let in_rapid_recovery_experiment = config.rapid_recovery_experiment;
        Self {
            config,
            state: State::Init,
            network_available: false,
            bwe_limited_due_to_packet_loss: false,
            estimated_bitrate: Bandwidth::ZERO,
            start_bitrate: Bandwidth::ZERO,
            max_bitrate: Bandwidth::INFINITY,
            max_total_allocated_bitrate: Bandwidth::ZERO,
            network_estimate: None,
            send_probe_on_next_process_interval: false,
            alr_start_time: None,
            alr_end_time: None,
            enable_periodic_alr_probing: false,
            time_last_probing_initiated: None,
            time_of_last_large_drop: None,
            bitrate_before_last_large_drop: Bandwidth::ZERO,
            last_bwe_drop_probing_time: None,
            in_rapid_recovery_experiment,
            next_cluster_id: 1,
            last_event_time: None,
        }
    }

    /// Updates the configured min/start/max bitrates
    ///
    /// Rejects ranges violating `min <= start <= max` without touching any
    /// state. In `Init` with the network available this kicks off initial
    /// exponential probing; once probing has completed, raising the max
    /// re-probes toward it while the estimate still has headroom.
    pub fn set_bitrates<Pub: Publisher>(
        &mut self,
        min_bitrate: Bandwidth,
        start_bitrate: Bandwidth,
        max_bitrate: Bandwidth,
        at_time: Timestamp,
        publisher: &mut Pub,
    ) -> Result<Vec<ProbeClusterConfig>, Error> {
        if min_bitrate > start_bitrate || start_bitrate > max_bitrate {
            return Err(Error::InvalidRange);
        }
        let at_time = self.align_time(at_time);

        let old_max_bitrate = self.max_bitrate;
        self.start_bitrate = start_bitrate;
        self.max_bitrate = max_bitrate;

        match self.state {
            State::Init => {
                if self.network_available && !self.start_bitrate.is_zero() {
                    return Ok(self.initiate_exponential_probing(at_time, publisher));
                }
            }
            State::WaitingForProbingResult { .. } => {}
            State::ProbingComplete => {
                // Re-probe toward a raised ceiling while the estimate is
                // still below it
                if max_bitrate > old_max_bitrate
                    && !self.estimated_bitrate.is_zero()
                    && self.estimated_bitrate < max_bitrate
                {
                    let rate = self.estimated_bitrate * self.config.further_exponential_probe_scale;
                    return Ok(self.initiate_probing(at_time, &[rate], false, publisher));
                }
            }
        }
        Ok(Vec::new())
    }

    /// Updates the configured max bitrate without re-probing
    pub fn set_max_bitrate(&mut self, max_bitrate: Bandwidth) {
        self.max_bitrate = max_bitrate;
    }

    /// Reports the total bitrate allocated across all media streams
    ///
    /// A raised allocation while probing is complete and the estimate has
    /// headroom emits up to two probes scaled from the new allocation.
    pub fn on_max_total_allocated_bitrate<Pub: Publisher>(
        &mut self,
        max_total_allocated_bitrate: Bandwidth,
        at_time: Timestamp,
        publisher: &mut Pub,
    ) -> Vec<ProbeClusterConfig> {
        let at_time = self.align_time(at_time);

        let mut pending_probes = Vec::new();
        if max_total_allocated_bitrate > self.max_total_allocated_bitrate
            && self.state.is_probing_complete()
            && self.estimated_bitrate < self.max_bitrate
        {
            if let Some(first_scale) = self.config.first_allocation_probe_scale {
                let mut rates = vec![(max_total_allocated_bitrate * first_scale)
                    .min(self.config.allocation_probe_max)];
                if let Some(second_scale) = self.config.second_allocation_probe_scale {
                    rates.push(
                        (max_total_allocated_bitrate * second_scale)
                            .min(self.config.allocation_probe_max),
                    );
                }
                pending_probes = self.initiate_probing(
                    at_time,
                    &rates,
                    self.config.allocation_allow_further_probing,
                    publisher,
                );
            }
        }
        self.max_total_allocated_bitrate = max_total_allocated_bitrate;
        pending_probes
    }

    /// Signals whether the network is available for sending
    ///
    /// Nothing is emitted while the network is unavailable. Becoming
    /// available in `Init` with a known start bitrate kicks off initial
    /// exponential probing.
    pub fn on_network_availability<Pub: Publisher>(
        &mut self,
        msg: NetworkAvailability,
        publisher: &mut Pub,
    ) -> Vec<ProbeClusterConfig> {
        let at_time = self.align_time(msg.at_time);
        self.network_available = msg.network_available;

        if !self.network_available && self.state.is_waiting_for_probing_result() {
            // Outstanding probes cannot be answered on a dead network
            self.state.transition_to(State::ProbingComplete, publisher);
        }
        if self.network_available && self.state.is_init() && !self.start_bitrate.is_zero() {
            return self.initiate_exponential_probing(at_time, publisher);
        }
        Vec::new()
    }

    /// Feeds back the estimator's current bandwidth estimate
    ///
    /// While waiting for a probing result, an estimate at or above the
    /// follow-up threshold continues the exponential chain; one below it
    /// concludes the round. Outside the chain, a halving of the estimate
    /// is recorded as a large drop and, in ALR or under the rapid-recovery
    /// experiment, answered with a recovery probe near the pre-drop rate.
    pub fn set_estimated_bitrate<Pub: Publisher>(
        &mut self,
        bitrate: Bandwidth,
        bwe_limited_due_to_packet_loss: bool,
        at_time: Timestamp,
        publisher: &mut Pub,
    ) -> Vec<ProbeClusterConfig> {
        let at_time = self.align_time(at_time);
        self.bwe_limited_due_to_packet_loss = bwe_limited_due_to_packet_loss;

        let pending_probes = match self.state {
            State::WaitingForProbingResult {
                min_bitrate_to_probe_further,
                ..
            } if bitrate >= min_bitrate_to_probe_further => {
                let rate = bitrate * self.config.further_exponential_probe_scale;
                self.initiate_probing(at_time, &[rate], true, publisher)
            }
            _ => {
                if self.state.is_waiting_for_probing_result() {
                    // The estimate settled below the follow-up threshold
                    self.state.transition_to(State::ProbingComplete, publisher);
                }
                self.on_estimate_drop(bitrate, at_time, publisher)
            }
        };

        self.estimated_bitrate = bitrate;
        pending_probes
    }

    /// Resets the controller to its initial state
    ///
    /// The config, periodic-ALR flag and cluster-id counter survive;
    /// cluster ids stay strictly increasing across resets.
    pub fn reset<Pub: Publisher>(&mut self, at_time: Timestamp, publisher: &mut Pub) {
        let _ = self.align_time(at_time);

        if !self.state.is_init() {
            publisher.on_probe_controller_state_changed(ProbeState::Init);
        }
        self.state = State::Init;
        self.network_available = false;
        self.bwe_limited_due_to_packet_loss = false;
        self.estimated_bitrate = Bandwidth::ZERO;
        self.start_bitrate = Bandwidth::ZERO;
        self.max_bitrate = Bandwidth::INFINITY;
        self.max_total_allocated_bitrate = Bandwidth::ZERO;
        self.network_estimate = None;
        self.send_probe_on_next_process_interval = false;
        self.alr_start_time = None;
        self.alr_end_time = None;
        self.time_last_probing_initiated = None;
        self.time_of_last_large_drop = None;
        self.bitrate_before_last_large_drop = Bandwidth::ZERO;
        self.last_bwe_drop_probing_time = None;
    }

    /// Periodic tick
    ///
    /// Concludes timed-out probing rounds, then emits at most one probe:
    /// a pending network-state probe takes priority over an overdue ALR
    /// probe, which takes priority over a periodic network-state probe.
    pub fn process<Pub: Publisher>(
        &mut self,
        at_time: Timestamp,
        publisher: &mut Pub,
    ) -> Vec<ProbeClusterConfig> {
        let at_time = self.align_time(at_time);

        if let State::WaitingForProbingResult { since, .. } = self.state {
            if at_time.saturating_duration_since(since) > PROBE_CLUSTER_TIMEOUT {
                self.state.transition_to(State::ProbingComplete, publisher);
            }
        }

        if !self.network_available
            || self.estimated_bitrate.is_zero()
            || !self.state.is_probing_complete()
        {
            return Vec::new();
        }

        if self.send_probe_on_next_process_interval {
            if let Some(rate) = self.network_state_probe_rate() {
                self.send_probe_on_next_process_interval = false;
                return self.initiate_probing(at_time, &[rate], true, publisher);
            }
        }

        if self.time_for_alr_probe(at_time) {
            let rate = self.estimated_bitrate * self.config.alr_probe_scale;
            return self.initiate_probing(at_time, &[rate], true, publisher);
        }

        if self.time_for_network_state_probe(at_time) {
            if let Some(rate) = self.network_state_probe_rate() {
                return self.initiate_probing(at_time, &[rate], true, publisher);
            }
        }

        Vec::new()
    }

    /// Emits the one or two clusters of the initial exponential ramp-up
    fn initiate_exponential_probing<Pub: Publisher>(
        &mut self,
        at_time: Timestamp,
        publisher: &mut Pub,
    ) -> Vec<ProbeClusterConfig> {
        debug_assert!(self.network_available);
        debug_assert!(self.state.is_init());
        debug_assert!(!self.start_bitrate.is_zero());

        let first = self.start_bitrate * self.config.first_exponential_probe_scale;
        if let Some(second_scale) = self.config.second_exponential_probe_scale {
            let second = self.start_bitrate * second_scale;
            self.initiate_probing(at_time, &[first, second], true, publisher)
        } else {
            self.initiate_probing(at_time, &[first], true, publisher)
        }
    }

    /// The single emission point
    ///
    /// Applies the loss-limited ceiling, the high-estimate skip rule and
    /// the max-bitrate clamp, stamps cluster ids and advances the state
    /// machine. `probe_further` keeps the exponential chain alive; it is
    /// cleared when a target had to be clamped to the ceiling, since a
    /// probe at the ceiling cannot reveal headroom above it.
    fn initiate_probing<Pub: Publisher>(
        &mut self,
        at_time: Timestamp,
        rates: &[Bandwidth],
        mut probe_further: bool,
        publisher: &mut Pub,
    ) -> Vec<ProbeClusterConfig> {
        if !self.network_available {
            return Vec::new();
        }

        let mut max_probe_rate = self.max_bitrate;
        if self.config.limit_probe_target_rate_to_loss_bwe && self.bwe_limited_due_to_packet_loss {
            max_probe_rate = max_probe_rate.min(self.estimated_bitrate);
        }
        if max_probe_rate.is_zero() {
            return Vec::new();
        }

        if let Some(fraction) = self.config.skip_if_estimate_larger_than_fraction_of_max {
            let network_estimate = self
                .network_estimate
                .map_or(Bandwidth::INFINITY, |estimate| estimate.link_capacity_upper);
            if self.estimated_bitrate.min(network_estimate) >= self.max_bitrate * fraction {
                self.state.transition_to(State::ProbingComplete, publisher);
                return Vec::new();
            }
        }

        let target_duration = if self.network_estimate.is_some()
            && self.config.network_state_estimate_probing_interval.is_some()
        {
            self.config.network_state_probe_duration
        } else {
            self.config.min_probe_duration
        };

        let mut pending_probes = Vec::with_capacity(rates.len());
        let mut last_rate = Bandwidth::ZERO;
        for &rate in rates {
            debug_assert!(!rate.is_zero(), "probe targets must be positive");
            if rate.is_zero() {
                continue;
            }
            let mut rate = rate;
            if rate > max_probe_rate {
                rate = max_probe_rate;
                probe_further = false;
            }

            let probe_cluster = ProbeClusterConfig {
                at_time,
                target_rate: rate,
                target_duration,
                target_probe_count: self.config.min_probe_packets_sent,
                id: ProbeClusterId::new(self.next_cluster_id),
            };
            self.next_cluster_id += 1;
            publisher.on_probe_cluster_created(&probe_cluster);
            last_rate = rate;
            pending_probes.push(probe_cluster);
        }

        if pending_probes.is_empty() {
            return pending_probes;
        }

        self.time_last_probing_initiated = Some(at_time);
        if probe_further {
            let min_bitrate_to_probe_further = last_rate * self.config.further_probe_threshold;
            self.state.transition_to(
                State::WaitingForProbingResult {
                    since: at_time,
                    min_bitrate_to_probe_further,
                },
                publisher,
            );
        } else {
            self.state.transition_to(State::ProbingComplete, publisher);
        }
        pending_probes
    }

    /// Clamps the supplied event time so timestamps never flow backwards
    ///
    /// Non-monotonic input is a caller bug: rejected in debug builds,
    /// clamped to the previous event time in release builds.
    fn align_time(&mut self, at_time: Timestamp) -> Timestamp {
        if let Some(last) = self.last_event_time {
            debug_assert!(
                at_time >= last,
                "event timestamps must be non-decreasing"
            );
            if at_time < last {
                return last;
            }
        }
        self.last_event_time = Some(at_time);
        at_time
    }
}

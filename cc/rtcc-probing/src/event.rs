// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Event publishing for the probe controller
//!
//! One record is published per emitted probe cluster, plus a record each
//! time the controller state changes. Embeddings that do not care about
//! the log pass a [`NoopPublisher`].

use crate::probe::ProbeClusterConfig;

/// Target of probe controller event records
pub trait Publisher {
    /// Invoked once for every probe cluster handed to the pacer
    fn on_probe_cluster_created(&mut self, probe_cluster: &ProbeClusterConfig);
    /// Invoked when the probe controller state changes
    fn on_probe_controller_state_changed(&mut self, state: ProbeState);
}

/// The externally visible probe controller state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeState {
    /// No probing has been initiated yet
    Init,
    /// Probes are in flight and the controller is waiting for the
    /// estimator to report back
    WaitingForProbingResult,
    /// The last probing round has concluded
    ProbingComplete,
}

/// A publisher that discards every record
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPublisher;

impl Publisher for NoopPublisher {
    #[inline]
    fn on_probe_cluster_created(&mut self, _probe_cluster: &ProbeClusterConfig) {}

    #[inline]
    fn on_probe_controller_state_changed(&mut self, _state: ProbeState) {}
}

#[cfg(feature = "event-tracing")]
pub mod tracing {
    //! Event integration with [`tracing`](https://docs.rs/tracing)

    use super::ProbeState;
    use crate::probe::ProbeClusterConfig;

    /// Emits probe controller records with [`tracing`](https://docs.rs/tracing)
    #[derive(Clone, Copy, Debug, Default)]
    pub struct Publisher;

    impl super::Publisher for Publisher {
        #[inline]
        fn on_probe_cluster_created(&mut self, probe_cluster: &ProbeClusterConfig) {
            tracing::event!(
                target: "probe_cluster_created",
                tracing::Level::DEBUG,
                {
                    id = %probe_cluster.id,
                    at_time = %probe_cluster.at_time,
                    target_rate = %probe_cluster.target_rate,
                    target_duration = ?probe_cluster.target_duration,
                    target_probe_count = probe_cluster.target_probe_count,
                }
            );
        }

        #[inline]
        fn on_probe_controller_state_changed(&mut self, state: ProbeState) {
            tracing::event!(
                target: "probe_controller_state_changed",
                tracing::Level::DEBUG,
                { state = tracing::field::debug(state) }
            );
        }
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::ProbeState;
    use crate::probe::ProbeClusterConfig;
    use alloc::vec::Vec;

    /// A publisher that records everything it is handed
    #[derive(Clone, Debug, Default)]
    pub struct Publisher {
        pub probe_clusters: Vec<ProbeClusterConfig>,
        pub state_changes: Vec<ProbeState>,
    }

    impl Publisher {
        pub fn new() -> Self {
            Self::default()
        }

        /// The most recently published state, if any changed
        pub fn current_state(&self) -> Option<ProbeState> {
            self.state_changes.last().copied()
        }
    }

    impl super::Publisher for Publisher {
        fn on_probe_cluster_created(&mut self, probe_cluster: &ProbeClusterConfig) {
            self.probe_clusters.push(*probe_cluster);
        }

        fn on_probe_controller_state_changed(&mut self, state: ProbeState) {
            self.state_changes.push(state);
        }
    }
}

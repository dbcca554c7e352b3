// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{bandwidth::Bandwidth, time::Timestamp};
use core::{fmt, time::Duration};

/// Identifies a probe cluster across the controller, pacer and estimator
///
/// Ids start at 1 and strictly increase for the lifetime of a sending
/// session, including across controller resets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProbeClusterId(u32);

impl ProbeClusterId {
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProbeClusterId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A probe cluster to be emitted by the pacer
///
/// Describes one burst: the pacer sends at least `target_probe_count`
/// packets at `target_rate` for at least `target_duration`, all tagged with
/// `id` so the estimator can attribute the resulting feedback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProbeClusterConfig {
    /// The time the cluster was requested
    pub at_time: Timestamp,
    /// The rate the pacer should send at while the cluster is active
    pub target_rate: Bandwidth,
    /// The minimum amount of time the cluster should stay active
    pub target_duration: Duration,
    /// The minimum number of probe packets the cluster should contain
    pub target_probe_count: u32,
    pub id: ProbeClusterId,
}

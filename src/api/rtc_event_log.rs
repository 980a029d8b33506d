/*
 *  Copyright (c) 2017 The WebRTC project authors. All Rights Reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

use super::transport::BandwidthUsage;
use super::units::{DataRate, Timestamp};

/// Recorded whenever the delay based estimate or the detector state changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RtcEventBweUpdateDelayBased {
    /// Wall clock time the event was produced, in ms since the unix epoch.
    pub wall_time_ms: i64,
    /// Feedback clock time the decision was taken at.
    pub at_time: Timestamp,
    pub detector_state: BandwidthUsage,
    pub previous_bitrate: DataRate,
    pub bitrate: DataRate,
    pub updated: bool,
    pub probe: bool,
}

/// Sink for structured estimator events.
///
/// Implementations must not feed back into the estimator; the estimator calls
/// `log` while it is in the middle of processing feedback.
pub trait RtcEventLog: Send {
    fn log(&mut self, event: RtcEventBweUpdateDelayBased);
}

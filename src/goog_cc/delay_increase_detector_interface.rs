/*
 *  Copyright (c) 2018 The WebRTC project authors. All Rights Reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

use crate::api::transport::BandwidthUsage;
use crate::api::units::{DataSize, Timestamp};

use super::DeltaGroup;

/// Classifies the one way delay trend of a packet stream.
pub trait DelayIncreaseDetectorInterface {
    /// Update the detector with a new packet. `deltas` is set when the packet
    /// completed a send time group, see [InterArrivalDelta](super::InterArrivalDelta).
    fn update(
        &mut self,
        deltas: Option<&DeltaGroup>,
        send_time: Timestamp,
        arrival_time: Timestamp,
        packet_size: DataSize,
    );

    fn state(&self) -> BandwidthUsage;
}

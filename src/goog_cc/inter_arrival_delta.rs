/*
 *  Copyright (c) 2020 The WebRTC project authors. All Rights Reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

use crate::api::units::{DataSize, TimeDelta, Timestamp};

/// Deltas between two consecutive send time groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaGroup {
    pub send_delta: TimeDelta,
    pub recv_delta: TimeDelta,
    /// Difference in accumulated bytes, current group minus previous group.
    pub size_delta: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SendTimeGroup {
    size: DataSize,
    first_send_time: Timestamp,
    send_time: Timestamp,
    first_arrival: Timestamp,
    complete_time: Timestamp,
    last_system_time: Timestamp,
}

impl Default for SendTimeGroup {
    fn default() -> Self {
        Self {
            size: DataSize::zero(),
            first_send_time: Timestamp::minus_infinity(),
            send_time: Timestamp::minus_infinity(),
            first_arrival: Timestamp::minus_infinity(),
            complete_time: Timestamp::minus_infinity(),
            last_system_time: Timestamp::minus_infinity(),
        }
    }
}

impl SendTimeGroup {
    fn is_first_packet(&self) -> bool {
        self.complete_time.is_infinite()
    }
}

/// Computes the inter-arrival time delta and the size delta between two send
/// bursts, grouping packets that were sent within `send_time_group_length` of
/// each other.
#[derive(Debug, Clone)]
pub struct InterArrivalDelta {
    send_time_group_length: TimeDelta,
    current_timestamp_group: SendTimeGroup,
    prev_timestamp_group: SendTimeGroup,
    num_consecutive_reordered_packets: i64,
}

impl InterArrivalDelta {
    const REORDERED_RESET_THRESHOLD: i64 = 3;
    const ARRIVAL_TIME_OFFSET_THRESHOLD: TimeDelta = TimeDelta::from_seconds(3);
    const BURST_DELTA_THRESHOLD: TimeDelta = TimeDelta::from_millis(5);
    const MAX_BURST_DURATION: TimeDelta = TimeDelta::from_millis(100);

    pub fn new(send_time_group_length: TimeDelta) -> Self {
        Self {
            send_time_group_length,
            current_timestamp_group: SendTimeGroup::default(),
            prev_timestamp_group: SendTimeGroup::default(),
            num_consecutive_reordered_packets: 0,
        }
    }

    /// Feeds one packet and returns the deltas between the two most recently
    /// completed groups, if this packet completed one.
    ///
    /// `system_time` is the local time the feedback was processed at, used to
    /// detect jumps in the remote arrival clock.
    ///
    /// Returns `None` while the current group is still incomplete, when only one
    /// group has been completed, and for reordered packets.
    pub fn compute_deltas(
        &mut self,
        send_time: Timestamp,
        arrival_time: Timestamp,
        system_time: Timestamp,
        packet_size: DataSize,
    ) -> Option<DeltaGroup> {
        let mut deltas = None;
        if self.current_timestamp_group.is_first_packet() {
            // We don't have enough data to update the filter, so we store it until we
            // have two frames of data to process.
            self.current_timestamp_group.send_time = send_time;
            self.current_timestamp_group.first_send_time = send_time;
            self.current_timestamp_group.first_arrival = arrival_time;
        } else if self.current_timestamp_group.first_send_time > send_time {
            // Reordered packet.
            return None;
        } else if self.new_timestamp_group(arrival_time, send_time) {
            // First packet of a later send burst, the previous packets sample is ready.
            if self.prev_timestamp_group.complete_time.is_finite() {
                let send_delta =
                    self.current_timestamp_group.send_time - self.prev_timestamp_group.send_time;
                let recv_delta = self.current_timestamp_group.complete_time
                    - self.prev_timestamp_group.complete_time;
                let system_time_delta = self.current_timestamp_group.last_system_time
                    - self.prev_timestamp_group.last_system_time;

                if recv_delta - system_time_delta >= Self::ARRIVAL_TIME_OFFSET_THRESHOLD {
                    tracing::warn!(
                        "The arrival time clock offset has changed (diff = {} ms), resetting.",
                        recv_delta.ms() - system_time_delta.ms()
                    );
                    self.reset();
                    return None;
                }
                if recv_delta < TimeDelta::zero() {
                    // The group of packets has been reordered since receiving its local
                    // arrival timestamp.
                    self.num_consecutive_reordered_packets += 1;
                    if self.num_consecutive_reordered_packets >= Self::REORDERED_RESET_THRESHOLD {
                        tracing::warn!(
                            recv_delta_ms = recv_delta.ms(),
                            send_delta_ms = send_delta.ms(),
                            "Packets between send burst arrived out of order, resetting."
                        );
                        self.reset();
                    }
                    return None;
                }
                self.num_consecutive_reordered_packets = 0;
                deltas = Some(DeltaGroup {
                    send_delta,
                    recv_delta,
                    size_delta: self.current_timestamp_group.size.bytes()
                        - self.prev_timestamp_group.size.bytes(),
                });
            }
            self.prev_timestamp_group = self.current_timestamp_group;
            // The new timestamp is now the current frame.
            self.current_timestamp_group.first_send_time = send_time;
            self.current_timestamp_group.send_time = send_time;
            self.current_timestamp_group.first_arrival = arrival_time;
            self.current_timestamp_group.size = DataSize::zero();
        } else {
            self.current_timestamp_group.send_time =
                self.current_timestamp_group.send_time.max(send_time);
        }
        // Accumulate the frame size.
        self.current_timestamp_group.size += packet_size;
        self.current_timestamp_group.complete_time = arrival_time;
        self.current_timestamp_group.last_system_time = system_time;

        deltas
    }

    // Returns true if the last packet was the end of the current batch and the
    // packet with `send_time` is the first of a new batch.
    fn new_timestamp_group(&self, arrival_time: Timestamp, send_time: Timestamp) -> bool {
        if self.current_timestamp_group.is_first_packet()
            || self.belongs_to_burst(arrival_time, send_time)
        {
            false
        } else {
            send_time - self.current_timestamp_group.first_send_time > self.send_time_group_length
        }
    }

    fn belongs_to_burst(&self, arrival_time: Timestamp, send_time: Timestamp) -> bool {
        debug_assert!(self.current_timestamp_group.complete_time.is_finite());
        let arrival_time_delta = arrival_time - self.current_timestamp_group.complete_time;
        let send_time_delta = send_time - self.current_timestamp_group.send_time;
        if send_time_delta.is_zero() {
            return true;
        }
        let propagation_delta = arrival_time_delta - send_time_delta;
        propagation_delta < TimeDelta::zero()
            && arrival_time_delta <= Self::BURST_DELTA_THRESHOLD
            && arrival_time - self.current_timestamp_group.first_arrival < Self::MAX_BURST_DURATION
    }

    fn reset(&mut self) {
        self.num_consecutive_reordered_packets = 0;
        self.current_timestamp_group = SendTimeGroup::default();
        self.prev_timestamp_group = SendTimeGroup::default();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const GROUP_LENGTH: TimeDelta = TimeDelta::from_millis(5);
    const PACKET_SIZE: DataSize = DataSize::from_bytes(100);

    fn feed(
        inter_arrival: &mut InterArrivalDelta,
        send_ms: i64,
        arrival_ms: i64,
        system_ms: i64,
    ) -> Option<DeltaGroup> {
        inter_arrival.compute_deltas(
            Timestamp::from_millis(send_ms),
            Timestamp::from_millis(arrival_ms),
            Timestamp::from_millis(system_ms),
            PACKET_SIZE,
        )
    }

    #[test]
    fn first_two_groups_produce_no_delta() {
        let mut inter_arrival = InterArrivalDelta::new(GROUP_LENGTH);
        assert_eq!(feed(&mut inter_arrival, 0, 100, 100), None);
        // Same group: sent within 5 ms.
        assert_eq!(feed(&mut inter_arrival, 3, 104, 104), None);
        // Completes the first group, but there is nothing to compare it with.
        assert_eq!(feed(&mut inter_arrival, 20, 120, 120), None);
    }

    #[test]
    fn delta_between_completed_groups() {
        let mut inter_arrival = InterArrivalDelta::new(GROUP_LENGTH);
        feed(&mut inter_arrival, 0, 100, 100);
        feed(&mut inter_arrival, 3, 104, 104);
        feed(&mut inter_arrival, 20, 122, 122);

        let deltas = feed(&mut inter_arrival, 40, 142, 142);
        assert_eq!(
            deltas,
            Some(DeltaGroup {
                send_delta: TimeDelta::from_millis(17),
                recv_delta: TimeDelta::from_millis(18),
                size_delta: -100,
            })
        );
    }

    #[test]
    fn burst_joins_current_group() {
        let mut inter_arrival = InterArrivalDelta::new(GROUP_LENGTH);
        feed(&mut inter_arrival, 0, 100, 100);
        // Sent 20 ms later but arrived 2 ms later: a burst.
        assert_eq!(feed(&mut inter_arrival, 20, 102, 102), None);
        assert_eq!(feed(&mut inter_arrival, 40, 160, 160), None);

        let deltas = feed(&mut inter_arrival, 60, 180, 180);
        assert_eq!(
            deltas,
            Some(DeltaGroup {
                send_delta: TimeDelta::from_millis(20),
                recv_delta: TimeDelta::from_millis(58),
                size_delta: -100,
            })
        );
    }

    #[test]
    fn reordered_send_time_is_ignored() {
        let mut inter_arrival = InterArrivalDelta::new(GROUP_LENGTH);
        feed(&mut inter_arrival, 100, 200, 200);
        feed(&mut inter_arrival, 120, 220, 220);
        assert_eq!(feed(&mut inter_arrival, 90, 225, 225), None);

        let deltas = feed(&mut inter_arrival, 140, 240, 240);
        assert_eq!(
            deltas,
            Some(DeltaGroup {
                send_delta: TimeDelta::from_millis(20),
                recv_delta: TimeDelta::from_millis(20),
                size_delta: 0,
            })
        );
    }

    #[test]
    fn arrival_clock_jump_resets() {
        let mut inter_arrival = InterArrivalDelta::new(GROUP_LENGTH);
        feed(&mut inter_arrival, 0, 0, 0);
        feed(&mut inter_arrival, 20, 20, 20);
        // The remote clock jumps four seconds ahead of the local clock.
        assert!(feed(&mut inter_arrival, 40, 4020, 40).is_some());
        assert_eq!(feed(&mut inter_arrival, 60, 4040, 60), None);

        // Starting over: two more groups are needed before the next delta.
        assert_eq!(feed(&mut inter_arrival, 80, 4060, 80), None);
        assert_eq!(feed(&mut inter_arrival, 100, 4080, 100), None);
        assert!(feed(&mut inter_arrival, 120, 4100, 120).is_some());
    }
}

/*
 *  Copyright (c) 2018 The WebRTC project authors. All Rights Reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

use std::cmp::Ordering;

use crate::api::units::{DataRate, DataSize, Timestamp};

#[derive(Debug, Clone, Copy)]
pub struct SentPacket {
    pub send_time: Timestamp,
    /// Size of packet with overhead up to IP layer.
    pub size: DataSize,
    /// True if the packet is an audio packet, false for video, padding, RTX etc.
    pub audio: bool,
    /// Transport independent sequence number, any tracked packet should have a
    /// sequence number that is unique over the whole call and increasing by 1 for
    /// each packet.
    pub sequence_number: i64,
}

impl Default for SentPacket {
    fn default() -> Self {
        Self {
            send_time: Timestamp::plus_infinity(),
            size: DataSize::zero(),
            audio: false,
            sequence_number: 0,
        }
    }
}

/// Feedback for a single acknowledged (or lost) packet.
#[derive(Debug, Clone, Copy)]
pub struct PacketResult {
    pub sent_packet: SentPacket,
    pub receive_time: Timestamp,
}

impl PacketResult {
    pub const fn is_received(&self) -> bool {
        !self.receive_time.is_plus_infinity()
    }
}

impl Default for PacketResult {
    fn default() -> Self {
        Self {
            sent_packet: SentPacket::default(),
            receive_time: Timestamp::plus_infinity(),
        }
    }
}

impl PartialOrd for PacketResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.receive_time != other.receive_time {
            return Some(self.receive_time.cmp(&other.receive_time));
        }

        if self.sent_packet.send_time != other.sent_packet.send_time {
            return Some(self.sent_packet.send_time.cmp(&other.sent_packet.send_time));
        }

        Some(
            self.sent_packet
                .sequence_number
                .cmp(&other.sent_packet.sequence_number),
        )
    }
}

impl PartialEq for PacketResult {
    fn eq(&self, other: &Self) -> bool {
        self.receive_time == other.receive_time
            && self.sent_packet.send_time == other.sent_packet.send_time
            && self.sent_packet.sequence_number == other.sent_packet.sequence_number
    }
}

#[derive(Debug, Clone)]
pub struct TransportPacketsFeedback {
    pub feedback_time: Timestamp,
    pub packet_feedbacks: Vec<PacketResult>,
}

impl Default for TransportPacketsFeedback {
    fn default() -> Self {
        Self {
            feedback_time: Timestamp::plus_infinity(),
            packet_feedbacks: Vec::new(),
        }
    }
}

impl TransportPacketsFeedback {
    pub fn received_with_send_info(&self) -> impl Iterator<Item = &PacketResult> {
        self.packet_feedbacks.iter().filter(|fb| fb.is_received())
    }

    /// Received packets, ordered by arrival. Ties keep their feedback order.
    pub fn sorted_by_receive_time(&self) -> Vec<PacketResult> {
        let mut res: Vec<PacketResult> = self.received_with_send_info().cloned().collect();
        res.sort_by(|a, b| a.receive_time.cmp(&b.receive_time));
        res
    }
}

/// An externally supplied estimate of the network path.
#[derive(Debug, Clone, Copy)]
pub struct NetworkStateEstimate {
    // The time the estimate was received/calculated.
    pub update_time: Timestamp,

    // Total estimated link capacity.
    pub link_capacity: DataRate,
    // Used as a safe measure of available capacity.
    pub link_capacity_lower: DataRate,
    // Used as limit for increasing bitrate.
    pub link_capacity_upper: DataRate,
}

impl Default for NetworkStateEstimate {
    fn default() -> Self {
        Self {
            update_time: Timestamp::minus_infinity(),
            link_capacity: DataRate::minus_infinity(),
            link_capacity_lower: DataRate::minus_infinity(),
            link_capacity_upper: DataRate::minus_infinity(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn received(send_ms: i64, receive_ms: i64, sequence_number: i64) -> PacketResult {
        PacketResult {
            sent_packet: SentPacket {
                send_time: Timestamp::from_millis(send_ms),
                size: DataSize::from_bytes(1200),
                sequence_number,
                ..Default::default()
            },
            receive_time: Timestamp::from_millis(receive_ms),
        }
    }

    #[test]
    fn sorted_by_receive_time_skips_lost_packets() {
        let lost = PacketResult {
            sent_packet: SentPacket {
                send_time: Timestamp::from_millis(5),
                ..Default::default()
            },
            ..Default::default()
        };
        let feedback = TransportPacketsFeedback {
            feedback_time: Timestamp::from_millis(100),
            packet_feedbacks: vec![received(10, 60, 2), lost, received(0, 50, 1)],
        };

        let sorted = feedback.sorted_by_receive_time();
        assert_eq!(sorted.len(), 2);
        assert_eq!(sorted[0].sent_packet.sequence_number, 1);
        assert_eq!(sorted[1].sent_packet.sequence_number, 2);
    }

    #[test]
    fn packet_results_order_by_receive_then_send_time() {
        assert!(received(0, 10, 1) < received(0, 11, 2));
        assert!(received(0, 10, 2) < received(1, 10, 1));
        assert!(received(1, 10, 1) < received(1, 10, 2));
    }
}

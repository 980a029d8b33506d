/*
 *  Copyright (c) 2016 The WebRTC project authors. All Rights Reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

use crossbeam_channel::Receiver;

use crate::{
    api::{
        rtc_event_log::{RtcEventBweUpdateDelayBased, RtcEventLog},
        transport::{BandwidthUsage, NetworkStateEstimate, PacketResult, TransportPacketsFeedback},
        units::{DataRate, TimeDelta, Timestamp},
    },
    experiments::FieldTrials,
    goog_cc::{
        CellularRatioPacket, DelayIncreaseDetectorInterface, InterArrivalDelta,
        TrendlineEstimator, TrendlineEstimatorSettings,
    },
    remote_bitrate_estimator::{AimdRateControl, RateControlInput, StrategyInfo},
    rtc::time_utils,
};

// WebRTC-Bwe-SeparateAudioPackets
#[derive(Clone, Debug, PartialEq)]
pub struct BweSeparateAudioPacketsSettings {
    pub enabled: bool,
    pub packet_threshold: i64,
    pub time_threshold: TimeDelta,
}

impl Default for BweSeparateAudioPacketsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            packet_threshold: 10,
            time_threshold: TimeDelta::from_seconds(1),
        }
    }
}

/// Outcome of one feedback batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayBasedBweResult {
    pub updated: bool,
    pub probe: bool,
    pub target_bitrate: DataRate,
    pub recovered_from_overuse: bool,
    pub delay_detector_state: BandwidthUsage,
}

impl Default for DelayBasedBweResult {
    fn default() -> Self {
        Self {
            updated: false,
            probe: false,
            target_bitrate: DataRate::zero(),
            recovered_from_overuse: false,
            delay_detector_state: BandwidthUsage::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DelayDetector {
    Video,
    Audio,
}

/// Delay based bandwidth estimator.
///
/// Feeds transport feedback through the inter-arrival grouping and the delay
/// detector, then drives [AimdRateControl] with the detector state. Not thread
/// safe: every call, including [DelayBasedBwe::process_cellular_ratio_updates],
/// must come from the same thread.
pub struct DelayBasedBwe {
    // Alternatively, run two separate overuse detectors for audio and video,
    // and fall back to the audio one if we haven't seen a video packet in a
    // while.
    separate_audio: BweSeparateAudioPacketsSettings,
    audio_packets_since_last_video: i64,
    last_video_packet_recv_time: Timestamp,

    trendline_settings: TrendlineEstimatorSettings,
    video_inter_arrival_delta: InterArrivalDelta,
    video_delay_detector: TrendlineEstimator,
    audio_inter_arrival_delta: InterArrivalDelta,
    audio_delay_detector: TrendlineEstimator,
    active_delay_detector_type: DelayDetector,

    last_seen_packet: Timestamp,
    rate_control: AimdRateControl,
    prev_bitrate: DataRate,
    prev_state: BandwidthUsage,
    event_log: Option<Box<dyn RtcEventLog>>,
}

impl DelayBasedBwe {
    const STREAM_TIME_OUT: TimeDelta = TimeDelta::from_seconds(2);
    const SEND_TIME_GROUP_LENGTH: TimeDelta = TimeDelta::from_millis(5);

    pub fn new(field_trials: &FieldTrials) -> Self {
        tracing::info!(
            "Initialized DelayBasedBwe with separate audio overuse detection: {:?}",
            field_trials.separate_audio
        );
        let trendline_settings = field_trials.trendline_estimator_settings.clone();
        Self {
            separate_audio: field_trials.separate_audio.clone(),
            audio_packets_since_last_video: 0,
            last_video_packet_recv_time: Timestamp::minus_infinity(),
            video_inter_arrival_delta: InterArrivalDelta::new(Self::SEND_TIME_GROUP_LENGTH),
            video_delay_detector: TrendlineEstimator::new(trendline_settings.clone()),
            audio_inter_arrival_delta: InterArrivalDelta::new(Self::SEND_TIME_GROUP_LENGTH),
            audio_delay_detector: TrendlineEstimator::new(trendline_settings.clone()),
            trendline_settings,
            active_delay_detector_type: DelayDetector::Video,
            last_seen_packet: Timestamp::minus_infinity(),
            rate_control: AimdRateControl::new(field_trials, true), // send_side
            prev_bitrate: DataRate::zero(),
            prev_state: BandwidthUsage::Normal,
            event_log: None,
        }
    }

    /// Injects the sink for [RtcEventBweUpdateDelayBased] events.
    pub fn set_event_log(&mut self, event_log: Box<dyn RtcEventLog>) {
        self.event_log = Some(event_log);
    }

    fn active_delay_detector_state(&self) -> BandwidthUsage {
        match self.active_delay_detector_type {
            DelayDetector::Audio => self.audio_delay_detector.state(),
            DelayDetector::Video => self.video_delay_detector.state(),
        }
    }

    pub fn incoming_packet_feedback_vector(
        &mut self,
        msg: &TransportPacketsFeedback,
        acked_bitrate: Option<DataRate>,
        probe_bitrate: Option<DataRate>,
        network_estimate: Option<NetworkStateEstimate>,
        in_alr: bool,
    ) -> DelayBasedBweResult {
        let packet_feedback_vector = msg.sorted_by_receive_time();
        // TODO(holmer): An empty feedback vector here likely means that
        // all acks were too late and that the send time history had
        // timed out. We should reduce the rate when this occurs.
        if packet_feedback_vector.is_empty() {
            tracing::warn!("Very late feedback received.");
            return DelayBasedBweResult::default();
        }

        let mut recovered_from_overuse = false;
        let mut prev_detector_state = self.active_delay_detector_state();
        for packet_feedback in &packet_feedback_vector {
            self.incoming_packet_feedback(packet_feedback, msg.feedback_time);
            if prev_detector_state == BandwidthUsage::Underusing
                && self.active_delay_detector_state() == BandwidthUsage::Normal
            {
                recovered_from_overuse = true;
            }
            prev_detector_state = self.active_delay_detector_state();
        }

        self.rate_control.set_in_application_limited_region(in_alr);
        self.rate_control.set_network_state_estimate(network_estimate);
        self.maybe_update_estimate(
            acked_bitrate,
            probe_bitrate,
            recovered_from_overuse,
            msg.feedback_time,
        )
    }

    pub fn on_rtt_update(&mut self, avg_rtt: TimeDelta) {
        self.rate_control.set_rtt(avg_rtt);
    }

    /// The current estimate, if one has been established.
    pub fn latest_estimate(&self) -> Option<DataRate> {
        self.rate_control
            .valid_estimate()
            .then(|| self.rate_control.latest_estimate())
    }

    pub fn set_start_bitrate(&mut self, start_bitrate: DataRate) {
        tracing::info!("BWE Setting start bitrate to: {:?}", start_bitrate);
        self.rate_control.set_start_bitrate(start_bitrate);
    }
    pub fn set_min_bitrate(&mut self, min_bitrate: DataRate) {
        self.rate_control.set_min_bitrate(min_bitrate);
    }

    pub fn get_expected_bwe_period(&self) -> TimeDelta {
        self.rate_control.get_expected_bandwidth_period()
    }
    pub fn trigger_overuse(
        &mut self,
        at_time: Timestamp,
        link_capacity: Option<DataRate>,
    ) -> DataRate {
        let input = RateControlInput::new(BandwidthUsage::Overusing, link_capacity);
        self.rate_control.update(input, at_time)
    }
    pub fn last_estimate(&self) -> DataRate {
        self.prev_bitrate
    }
    pub fn last_state(&self) -> BandwidthUsage {
        self.prev_state
    }
    pub fn last_strategy_info(&self) -> &StrategyInfo {
        self.rate_control.last_strategy_info()
    }
    pub fn rate_control(&self) -> &AimdRateControl {
        &self.rate_control
    }

    /// Forwards one cellular resource ratio sample to the rate controller.
    pub fn update_cellular_resource_ratio(&mut self, ratio: f64, at_time: Timestamp) {
        self.rate_control.update_cellular_resource_ratio(ratio, at_time);
    }

    /// Applies every queued cellular sample in arrival order and returns how
    /// many were applied. Never blocks.
    pub fn process_cellular_ratio_updates(
        &mut self,
        updates: &Receiver<CellularRatioPacket>,
    ) -> usize {
        let mut processed = 0;
        for packet in updates.try_iter() {
            self.update_cellular_resource_ratio(packet.ratio, packet.timestamp());
            processed += 1;
        }
        if processed > 0 {
            tracing::trace!(processed, "Applied cellular ratio updates");
        }
        processed
    }

    fn reset_detectors(&mut self) {
        self.video_inter_arrival_delta = InterArrivalDelta::new(Self::SEND_TIME_GROUP_LENGTH);
        self.audio_inter_arrival_delta = InterArrivalDelta::new(Self::SEND_TIME_GROUP_LENGTH);

        self.video_delay_detector = TrendlineEstimator::new(self.trendline_settings.clone());
        self.audio_delay_detector = TrendlineEstimator::new(self.trendline_settings.clone());
        self.active_delay_detector_type = DelayDetector::Video;
    }

    fn incoming_packet_feedback(&mut self, packet_feedback: &PacketResult, at_time: Timestamp) {
        // Reset if the stream has timed out.
        if self.last_seen_packet.is_infinite() {
            self.reset_detectors();
        } else if at_time - self.last_seen_packet > Self::STREAM_TIME_OUT {
            tracing::debug!(
                idle_ms = (at_time - self.last_seen_packet).ms(),
                "Stream timed out, resetting delay detectors"
            );
            self.reset_detectors();
        }
        self.last_seen_packet = at_time;

        // As an alternative to ignoring small packets, we can separate audio and
        // video packets for overuse detection.
        let mut delay_detector_for_packet = DelayDetector::Video;
        if self.separate_audio.enabled {
            if packet_feedback.sent_packet.audio {
                delay_detector_for_packet = DelayDetector::Audio;
                self.audio_packets_since_last_video += 1;
                if self.audio_packets_since_last_video > self.separate_audio.packet_threshold
                    && packet_feedback.receive_time - self.last_video_packet_recv_time
                        > self.separate_audio.time_threshold
                {
                    self.active_delay_detector_type = DelayDetector::Audio;
                }
            } else {
                self.audio_packets_since_last_video = 0;
                self.last_video_packet_recv_time = std::cmp::max(
                    self.last_video_packet_recv_time,
                    packet_feedback.receive_time,
                );
                self.active_delay_detector_type = DelayDetector::Video;
            }
        }

        let sent_packet = &packet_feedback.sent_packet;
        let inter_arrival_for_packet = match delay_detector_for_packet {
            DelayDetector::Audio => &mut self.audio_inter_arrival_delta,
            DelayDetector::Video => &mut self.video_inter_arrival_delta,
        };
        let deltas = inter_arrival_for_packet.compute_deltas(
            sent_packet.send_time,
            packet_feedback.receive_time,
            at_time,
            sent_packet.size,
        );

        let delay_detector = match delay_detector_for_packet {
            DelayDetector::Audio => &mut self.audio_delay_detector,
            DelayDetector::Video => &mut self.video_delay_detector,
        };
        delay_detector.update(
            deltas.as_ref(),
            sent_packet.send_time,
            packet_feedback.receive_time,
            sent_packet.size,
        );
    }

    fn maybe_update_estimate(
        &mut self,
        acked_bitrate: Option<DataRate>,
        probe_bitrate: Option<DataRate>,
        recovered_from_overuse: bool,
        at_time: Timestamp,
    ) -> DelayBasedBweResult {
        let mut result = DelayBasedBweResult::default();

        // Currently overusing the bandwidth.
        if self.active_delay_detector_state() == BandwidthUsage::Overusing {
            if let Some(acked_bitrate) = acked_bitrate {
                if self
                    .rate_control
                    .time_to_reduce_further(at_time, acked_bitrate)
                {
                    result.updated = self.update_estimate(
                        at_time,
                        Some(acked_bitrate),
                        &mut result.target_bitrate,
                    );
                }
            } else if self.rate_control.valid_estimate()
                && self.rate_control.initial_time_to_reduce_further(at_time)
            {
                // Overusing before we have a measured acknowledged bitrate. Reduce send
                // rate by 50% every 200 ms.
                self.rate_control
                    .set_estimate(self.rate_control.latest_estimate() / 2, at_time);
                result.updated = true;
                result.probe = false;
                result.target_bitrate = self.rate_control.latest_estimate();
            }
        } else if let Some(probe_bitrate) = probe_bitrate {
            result.probe = true;
            result.updated = true;
            self.rate_control.set_estimate(probe_bitrate, at_time);
            result.target_bitrate = self.rate_control.latest_estimate();
        } else {
            result.updated =
                self.update_estimate(at_time, acked_bitrate, &mut result.target_bitrate);
            result.recovered_from_overuse = recovered_from_overuse;
        }

        let detector_state = self.active_delay_detector_state();
        let strategy_info = self.rate_control.last_strategy_info();
        tracing::info!(
            target_bps = result.target_bitrate.bps(),
            state = %detector_state,
            updated = result.updated,
            probe = result.probe,
            recovered = result.recovered_from_overuse,
            strategy = %strategy_info.strategy,
            parameters = %strategy_info.parameters,
            "Delay based estimate"
        );

        if (result.updated && self.prev_bitrate != result.target_bitrate)
            || detector_state != self.prev_state
        {
            let bitrate = if result.updated {
                result.target_bitrate
            } else {
                self.prev_bitrate
            };
            self.log_decision(RtcEventBweUpdateDelayBased {
                wall_time_ms: time_utils::time_utc_millis(),
                at_time,
                detector_state,
                previous_bitrate: self.prev_bitrate,
                bitrate,
                updated: result.updated,
                probe: result.probe,
            });

            self.prev_bitrate = bitrate;
            self.prev_state = detector_state;
        }

        result.delay_detector_state = detector_state;
        result
    }

    fn log_decision(&mut self, event: RtcEventBweUpdateDelayBased) {
        tracing::info!(
            wall_time_ms = event.wall_time_ms,
            at_ms = event.at_time.ms(),
            state = %event.detector_state,
            previous_bps = event.previous_bitrate.bps(),
            bitrate_bps = event.bitrate.bps(),
            updated = event.updated,
            probe = event.probe,
            "BWE decision"
        );
        if let Some(event_log) = self.event_log.as_mut() {
            event_log.log(event);
        }
    }

    // Updates the current remote rate estimate and returns true if a valid
    // estimate exists.
    fn update_estimate(
        &mut self,
        at_time: Timestamp,
        acked_bitrate: Option<DataRate>,
        target_rate: &mut DataRate,
    ) -> bool {
        let input = RateControlInput::new(self.active_delay_detector_state(), acked_bitrate);
        *target_rate = self.rate_control.update(input, at_time);
        self.rate_control.valid_estimate()
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use approx::assert_relative_eq;
    use test_trace::test;

    use crate::api::{transport::SentPacket, units::DataSize};
    use crate::remote_bitrate_estimator::RateControlState;

    use super::*;

    const PACKET_SIZE: DataSize = DataSize::from_bytes(1200);

    #[derive(Clone, Default)]
    struct EventRecorder(Arc<Mutex<Vec<RtcEventBweUpdateDelayBased>>>);

    impl RtcEventLog for EventRecorder {
        fn log(&mut self, event: RtcEventBweUpdateDelayBased) {
            self.0.lock().unwrap().push(event);
        }
    }

    /// Drives a [DelayBasedBwe] with synthetic feedback. Send and receive
    /// clocks advance independently so queueing delay can be shaped.
    struct DelayBasedBweTest {
        send_time: Timestamp,
        receive_time: Timestamp,
        next_sequence_number: i64,
        pending: Vec<PacketResult>,
        bitrate_estimator: DelayBasedBwe,
    }

    impl DelayBasedBweTest {
        fn new(field_trials: &FieldTrials) -> Self {
            Self {
                send_time: Timestamp::from_seconds(1),
                receive_time: Timestamp::from_seconds(100),
                next_sequence_number: 0,
                pending: Vec::new(),
                bitrate_estimator: DelayBasedBwe::new(field_trials),
            }
        }

        // Queues one packet, advancing both clocks first.
        fn add_packet(&mut self, send_interval_ms: i64, recv_interval_ms: i64, audio: bool) {
            self.send_time += TimeDelta::from_millis(send_interval_ms);
            self.receive_time += TimeDelta::from_millis(recv_interval_ms);
            self.pending.push(PacketResult {
                sent_packet: SentPacket {
                    send_time: self.send_time,
                    size: PACKET_SIZE,
                    audio,
                    sequence_number: self.next_sequence_number,
                },
                receive_time: self.receive_time,
            });
            self.next_sequence_number += 1;
        }

        // Delivers all queued packets as one feedback at the current receive time.
        fn deliver(
            &mut self,
            acked_bitrate: Option<DataRate>,
            probe_bitrate: Option<DataRate>,
            network_estimate: Option<NetworkStateEstimate>,
        ) -> DelayBasedBweResult {
            let msg = TransportPacketsFeedback {
                feedback_time: self.receive_time,
                packet_feedbacks: std::mem::take(&mut self.pending),
            };
            self.bitrate_estimator.incoming_packet_feedback_vector(
                &msg,
                acked_bitrate,
                probe_bitrate,
                network_estimate,
                false,
            )
        }

        // One packet per feedback.
        fn run(
            &mut self,
            send_interval_ms: i64,
            recv_interval_ms: i64,
            packets: usize,
        ) -> Vec<DelayBasedBweResult> {
            (0..packets)
                .map(|_| {
                    self.add_packet(send_interval_ms, recv_interval_ms, false);
                    self.deliver(None, None, None)
                })
                .collect()
        }
    }

    #[test]
    fn empty_feedback_is_not_an_update() {
        let mut test = DelayBasedBweTest::new(&FieldTrials::default());
        test.bitrate_estimator
            .set_start_bitrate(DataRate::from_kilobits_per_sec(300));

        let result = test.deliver(None, None, None);
        assert_eq!(result, DelayBasedBweResult::default());
        assert_eq!(test.bitrate_estimator.last_estimate(), DataRate::zero());
    }

    #[test]
    fn no_estimate_before_start_bitrate() {
        let test = DelayBasedBweTest::new(&FieldTrials::default());
        assert_eq!(test.bitrate_estimator.latest_estimate(), None);
    }

    #[test]
    fn probe_sets_estimate() {
        let mut test = DelayBasedBweTest::new(&FieldTrials::default());
        test.add_packet(20, 20, false);
        let result = test.deliver(None, Some(DataRate::from_kilobits_per_sec(500)), None);

        assert!(result.updated);
        assert!(result.probe);
        assert_eq!(result.target_bitrate, DataRate::from_kilobits_per_sec(500));
        assert_eq!(result.delay_detector_state, BandwidthUsage::Normal);
        assert_eq!(
            test.bitrate_estimator.latest_estimate(),
            Some(DataRate::from_kilobits_per_sec(500))
        );
        assert_eq!(
            test.bitrate_estimator.last_estimate(),
            DataRate::from_kilobits_per_sec(500)
        );
    }

    #[test]
    fn probe_limited_by_network_estimate() {
        let mut test = DelayBasedBweTest::new(&FieldTrials::default());
        test.bitrate_estimator
            .set_start_bitrate(DataRate::from_kilobits_per_sec(300));
        let network_estimate = NetworkStateEstimate {
            link_capacity_upper: DataRate::from_kilobits_per_sec(400),
            ..Default::default()
        };

        test.add_packet(20, 20, false);
        let result = test.deliver(
            None,
            Some(DataRate::from_kilobits_per_sec(800)),
            Some(network_estimate),
        );
        assert!(result.probe);
        assert_eq!(result.target_bitrate, DataRate::from_kilobits_per_sec(400));
    }

    #[test]
    fn steady_delay_increases_estimate() {
        let mut test = DelayBasedBweTest::new(&FieldTrials::default());
        test.bitrate_estimator
            .set_start_bitrate(DataRate::from_kilobits_per_sec(300));

        let results = test.run(20, 20, 50);
        assert!(results.iter().all(|result| result.updated));
        assert!(results
            .iter()
            .all(|result| result.delay_detector_state == BandwidthUsage::Normal));
        assert!(results[49].target_bitrate > DataRate::from_kilobits_per_sec(300));
        assert_eq!(
            test.bitrate_estimator.rate_control().rate_control_state(),
            RateControlState::Increase
        );
    }

    #[test]
    fn overuse_without_acked_bitrate_halves_estimate() {
        let mut test = DelayBasedBweTest::new(&FieldTrials::default());
        test.bitrate_estimator
            .set_start_bitrate(DataRate::from_kilobits_per_sec(300));

        // Every packet spends 2 ms longer in the queue than the previous one.
        let results = test.run(20, 22, 100);
        let first_overuse = results
            .iter()
            .position(|result| result.delay_detector_state == BandwidthUsage::Overusing)
            .expect("queue build up is detected");
        assert!(first_overuse > 0);

        let before = results[first_overuse - 1];
        let overuse = results[first_overuse];
        assert!(overuse.updated);
        assert!(!overuse.probe);
        assert_eq!(overuse.target_bitrate, before.target_bitrate / 2);
        assert_eq!(test.bitrate_estimator.last_state(), BandwidthUsage::Overusing);
    }

    #[test]
    fn overuse_with_acked_bitrate_backs_off() {
        let mut test = DelayBasedBweTest::new(&FieldTrials::default());
        test.bitrate_estimator
            .set_start_bitrate(DataRate::from_kilobits_per_sec(300));
        // Short enough that every feedback may reduce further.
        test.bitrate_estimator.on_rtt_update(TimeDelta::from_millis(10));

        let acked = DataRate::from_kilobits_per_sec(200);
        let mut overuse = None;
        for _ in 0..100 {
            test.add_packet(20, 22, false);
            let result = test.deliver(Some(acked), None, None);
            if result.delay_detector_state == BandwidthUsage::Overusing {
                overuse = Some(result);
                break;
            }
        }

        let overuse = overuse.expect("queue build up is detected");
        assert!(overuse.updated);
        // 0.85 * 200 kbps - 5 kbps
        assert_eq!(overuse.target_bitrate, DataRate::from_kilobits_per_sec(165));
        assert_eq!(
            test.bitrate_estimator.rate_control().rate_control_state(),
            RateControlState::Hold
        );
    }

    #[test]
    fn recovery_from_underuse_is_reported() {
        let mut test = DelayBasedBweTest::new(&FieldTrials::default());
        test.bitrate_estimator
            .set_start_bitrate(DataRate::from_kilobits_per_sec(300));

        // The queue drains by 3 ms per packet.
        let draining = test.run(20, 17, 60);
        assert!(draining
            .iter()
            .any(|result| result.delay_detector_state == BandwidthUsage::Underusing));

        // Then the delay is steady again, reported five packets at a time.
        let mut recovered = false;
        for _ in 0..30 {
            for _ in 0..5 {
                test.add_packet(20, 20, false);
            }
            let result = test.deliver(None, None, None);
            recovered |= result.recovered_from_overuse;
        }
        assert!(recovered);
        assert_eq!(test.bitrate_estimator.last_state(), BandwidthUsage::Normal);
    }

    #[test]
    fn stream_timeout_resets_detector() {
        let mut test = DelayBasedBweTest::new(&FieldTrials::default());
        test.bitrate_estimator
            .set_start_bitrate(DataRate::from_kilobits_per_sec(300));

        let results = test.run(20, 22, 100);
        assert!(results
            .iter()
            .any(|result| result.delay_detector_state == BandwidthUsage::Overusing));

        // Nothing for three seconds.
        test.add_packet(3000, 3000, false);
        let result = test.deliver(None, None, None);
        assert_eq!(result.delay_detector_state, BandwidthUsage::Normal);
    }

    #[test]
    fn separate_audio_detector_takes_over_after_threshold() {
        let mut field_trials = FieldTrials::default();
        field_trials.separate_audio.enabled = true;
        let mut test = DelayBasedBweTest::new(&field_trials);

        test.add_packet(20, 20, false);
        test.deliver(None, None, None);
        assert_eq!(
            test.bitrate_estimator.active_delay_detector_type,
            DelayDetector::Video
        );

        // Ten audio packets are not enough.
        for _ in 0..10 {
            test.add_packet(100, 100, true);
            test.deliver(None, None, None);
        }
        assert_eq!(
            test.bitrate_estimator.active_delay_detector_type,
            DelayDetector::Video
        );

        // The 11th arrives 1.1 s after the last video packet.
        test.add_packet(100, 100, true);
        test.deliver(None, None, None);
        assert_eq!(
            test.bitrate_estimator.active_delay_detector_type,
            DelayDetector::Audio
        );

        test.add_packet(20, 20, false);
        test.deliver(None, None, None);
        assert_eq!(
            test.bitrate_estimator.active_delay_detector_type,
            DelayDetector::Video
        );
    }

    #[test]
    fn audio_shares_detector_without_separation() {
        let mut test = DelayBasedBweTest::new(&FieldTrials::default());
        for _ in 0..20 {
            test.add_packet(100, 100, true);
            test.deliver(None, None, None);
        }
        assert_eq!(
            test.bitrate_estimator.active_delay_detector_type,
            DelayDetector::Video
        );
    }

    #[test]
    fn decisions_are_logged_once_per_change() {
        let recorder = EventRecorder::default();
        let mut test = DelayBasedBweTest::new(&FieldTrials::default());
        test.bitrate_estimator
            .set_event_log(Box::new(recorder.clone()));

        let probe = DataRate::from_kilobits_per_sec(500);
        test.add_packet(20, 20, false);
        test.deliver(None, Some(probe), None);
        // Same rate and state: nothing new to log.
        test.add_packet(20, 20, false);
        test.deliver(None, Some(probe), None);

        let events = recorder.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        let event = events[0];
        assert_eq!(event.previous_bitrate, DataRate::zero());
        assert_eq!(event.bitrate, probe);
        assert_eq!(event.detector_state, BandwidthUsage::Normal);
        assert!(event.updated);
        assert!(event.probe);
        assert!(event.wall_time_ms > 0);
    }

    #[test]
    fn trigger_overuse_backs_off_from_link_capacity() {
        let mut test = DelayBasedBweTest::new(&FieldTrials::default());
        test.bitrate_estimator
            .set_start_bitrate(DataRate::from_kilobits_per_sec(300));

        let target = test.bitrate_estimator.trigger_overuse(
            Timestamp::from_seconds(10),
            Some(DataRate::from_kilobits_per_sec(200)),
        );
        assert_eq!(target, DataRate::from_kilobits_per_sec(165));
    }

    #[test]
    fn expected_bwe_period_recovers_faster_with_lower_rtt() {
        let expected_period = |rtt: TimeDelta| {
            let mut test = DelayBasedBweTest::new(&FieldTrials::default());
            test.bitrate_estimator
                .set_start_bitrate(DataRate::from_kilobits_per_sec(300));
            test.bitrate_estimator.on_rtt_update(rtt);
            assert_eq!(
                test.bitrate_estimator.get_expected_bwe_period(),
                TimeDelta::from_seconds(3)
            );
            test.bitrate_estimator.trigger_overuse(
                Timestamp::from_seconds(10),
                Some(DataRate::from_kilobits_per_sec(200)),
            );
            test.bitrate_estimator.get_expected_bwe_period()
        };

        let slow = expected_period(TimeDelta::from_millis(200));
        let fast = expected_period(TimeDelta::from_millis(100));
        assert!(fast < slow);
        assert!(fast >= TimeDelta::from_seconds(2));
        assert!(slow <= TimeDelta::from_seconds(50));
    }

    #[test]
    fn queued_cellular_samples_are_applied_in_order() {
        let mut test = DelayBasedBweTest::new(&FieldTrials::default());
        let (sender, receiver) = crossbeam_channel::unbounded();
        sender
            .send(CellularRatioPacket {
                timestamp_ms: 1_000,
                ratio: 0.5,
                sequence_number: 1,
            })
            .unwrap();
        sender
            .send(CellularRatioPacket {
                timestamp_ms: 1_100,
                ratio: 0.8,
                sequence_number: 2,
            })
            .unwrap();

        assert_eq!(
            test.bitrate_estimator
                .process_cellular_ratio_updates(&receiver),
            2
        );
        let smoothed = test
            .bitrate_estimator
            .rate_control()
            .smoothed_cellular_ratio()
            .unwrap();
        assert_relative_eq!(smoothed, 0.3 * 0.8 + 0.7 * 0.5);
        assert_eq!(
            test.bitrate_estimator
                .process_cellular_ratio_updates(&receiver),
            0
        );
    }

    #[test]
    fn low_cellular_ratio_holds_estimate() {
        let mut test = DelayBasedBweTest::new(&FieldTrials::default());
        let start = DataRate::from_kilobits_per_sec(300);
        test.bitrate_estimator.set_start_bitrate(start);

        let results = test.run(20, 20, 5);
        let before = results[4].target_bitrate;
        assert!(before > start);

        let at_time = test.receive_time;
        test.bitrate_estimator
            .update_cellular_resource_ratio(0.2, at_time);
        let results = test.run(20, 20, 5);
        for result in results {
            assert!(result.updated);
            assert_eq!(result.target_bitrate, before);
        }
        assert_eq!(
            test.bitrate_estimator.rate_control().rate_control_state(),
            RateControlState::Hold
        );
        assert_eq!(
            test.bitrate_estimator.last_strategy_info().parameters,
            format!("Bitrate={}bps", before.bps())
        );
    }
}

/*
 *  Copyright (c) 2016 The WebRTC project authors. All Rights Reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

use std::collections::VecDeque;

use crate::api::transport::BandwidthUsage;
use crate::api::units::{DataSize, Timestamp};

use super::{DelayIncreaseDetectorInterface, DeltaGroup};

// WebRTC-Bwe-TrendlineEstimatorSettings
#[derive(Debug, Clone, PartialEq)]
pub struct TrendlineEstimatorSettings {
    // Sort the packets in the window. Should be redundant,
    // but then almost no cost.
    pub enable_sort: bool,

    // Cap the trendline slope based on the minimum delay seen
    // in the beginning_packets and end_packets respectively.
    pub enable_cap: bool,
    pub beginning_packets: usize,
    pub end_packets: usize,
    pub cap_uncertainty: f64,

    // Size (in packets) of the window.
    pub window_size: usize,
}

impl TrendlineEstimatorSettings {
    const DEFAULT_TRENDLINE_WINDOW_SIZE: usize = 20;

    pub fn validate(&mut self) {
        if self.window_size < 10 || 200 < self.window_size {
            tracing::warn!("Window size must be between 10 and 200 packets");
            self.window_size = Self::DEFAULT_TRENDLINE_WINDOW_SIZE;
        }
        if self.enable_cap {
            if self.beginning_packets < 1
                || self.end_packets < 1
                || self.beginning_packets > self.window_size
                || self.end_packets > self.window_size
            {
                tracing::warn!(
                    "Size of beginning and end must be between 1 and {}",
                    self.window_size
                );
                self.disable_cap();
            }
            if self.beginning_packets + self.end_packets > self.window_size {
                tracing::warn!("Size of beginning plus end can't exceed the window size");
                self.disable_cap();
            }
            if self.cap_uncertainty < 0.0 || 0.025 < self.cap_uncertainty {
                tracing::warn!("Cap uncertainty must be between 0 and 0.025");
                self.cap_uncertainty = 0.0;
            }
        }
    }

    fn disable_cap(&mut self) {
        self.enable_cap = false;
        self.beginning_packets = 0;
        self.end_packets = 0;
        self.cap_uncertainty = 0.0;
    }
}

impl Default for TrendlineEstimatorSettings {
    fn default() -> Self {
        Self {
            enable_sort: false,
            enable_cap: false,
            beginning_packets: 7,
            end_packets: 7,
            cap_uncertainty: 0.0,
            window_size: Self::DEFAULT_TRENDLINE_WINDOW_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PacketTiming {
    arrival_time_ms: f64,
    smoothed_delay_ms: f64,
    raw_delay_ms: f64,
}

/// Delay increase detector fitting a line to the smoothed accumulated delay
/// over a sliding window of packet groups.
#[derive(Debug, Clone)]
pub struct TrendlineEstimator {
    // Parameters.
    settings: TrendlineEstimatorSettings,
    smoothing_coef: f64,
    threshold_gain: f64,
    // Used by the existing threshold.
    num_of_deltas: i64,
    // Keep the arrival times small by using the change from the first packet.
    first_arrival_time_ms: Option<i64>,
    // Exponential backoff filtering.
    accumulated_delay: f64,
    smoothed_delay: f64,
    // Linear least squares regression.
    delay_hist: VecDeque<PacketTiming>,

    k_up: f64,
    k_down: f64,
    overusing_time_threshold: f64,
    threshold: f64,
    last_update_ms: Option<i64>,
    prev_trend: f64,
    time_over_using: Option<f64>,
    overuse_counter: i64,
    hypothesis: BandwidthUsage,
}

impl Default for TrendlineEstimator {
    fn default() -> Self {
        Self::new(TrendlineEstimatorSettings::default())
    }
}

impl DelayIncreaseDetectorInterface for TrendlineEstimator {
    fn update(
        &mut self,
        deltas: Option<&DeltaGroup>,
        _send_time: Timestamp,
        arrival_time: Timestamp,
        _packet_size: DataSize,
    ) {
        if let Some(deltas) = deltas {
            self.update_trendline(
                deltas.recv_delta.ms_float(),
                deltas.send_delta.ms_float(),
                arrival_time.ms(),
            );
        }
    }

    fn state(&self) -> BandwidthUsage {
        self.hypothesis
    }
}

fn linear_fit_slope(packets: &VecDeque<PacketTiming>) -> Option<f64> {
    debug_assert!(packets.len() >= 2);
    // Compute the "center of mass".
    let count = packets.len() as f64;
    let x_avg = packets.iter().map(|p| p.arrival_time_ms).sum::<f64>() / count;
    let y_avg = packets.iter().map(|p| p.smoothed_delay_ms).sum::<f64>() / count;
    // Compute the slope k = \sum (x_i-x_avg)(y_i-y_avg) / \sum (x_i-x_avg)^2
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for packet in packets {
        let x = packet.arrival_time_ms;
        let y = packet.smoothed_delay_ms;
        numerator += (x - x_avg) * (y - y_avg);
        denominator += (x - x_avg) * (x - x_avg);
    }
    if denominator == 0.0 {
        return None;
    }
    Some(numerator / denominator)
}

fn compute_slope_cap(
    packets: &VecDeque<PacketTiming>,
    settings: &TrendlineEstimatorSettings,
) -> Option<f64> {
    debug_assert!(1 <= settings.beginning_packets && settings.beginning_packets < packets.len());
    debug_assert!(1 <= settings.end_packets && settings.end_packets < packets.len());
    debug_assert!(settings.beginning_packets + settings.end_packets <= packets.len());

    let lowest = |a: &PacketTiming, b: &PacketTiming| a.raw_delay_ms.total_cmp(&b.raw_delay_ms);
    let early = packets
        .iter()
        .take(settings.beginning_packets)
        .min_by(|a, b| lowest(a, b))?;
    let late = packets
        .iter()
        .skip(packets.len() - settings.end_packets)
        .min_by(|a, b| lowest(a, b))?;
    if late.arrival_time_ms - early.arrival_time_ms < 1.0 {
        return None;
    }
    Some(
        (late.raw_delay_ms - early.raw_delay_ms) / (late.arrival_time_ms - early.arrival_time_ms)
            + settings.cap_uncertainty,
    )
}

impl TrendlineEstimator {
    const DEFAULT_TRENDLINE_SMOOTHING_COEFF: f64 = 0.9;
    const DEFAULT_TRENDLINE_THRESHOLD_GAIN: f64 = 4.0;
    const MAX_ADAPT_OFFSET_MS: f64 = 15.0;
    const OVER_USING_TIME_THRESHOLD: f64 = 10.0;
    const MIN_NUM_DELTAS: i64 = 60;
    const DELTA_COUNTER_MAX: i64 = 1000;
    const MAX_TIME_DELTA_MS: i64 = 100;

    pub fn new(mut settings: TrendlineEstimatorSettings) -> Self {
        settings.validate();
        tracing::debug!(?settings, "Using Trendline filter for delay change estimation");

        Self {
            settings,
            smoothing_coef: Self::DEFAULT_TRENDLINE_SMOOTHING_COEFF,
            threshold_gain: Self::DEFAULT_TRENDLINE_THRESHOLD_GAIN,
            num_of_deltas: 0,
            first_arrival_time_ms: None,
            accumulated_delay: 0.0,
            smoothed_delay: 0.0,
            delay_hist: VecDeque::new(),
            k_up: 0.0087,
            k_down: 0.039,
            overusing_time_threshold: Self::OVER_USING_TIME_THRESHOLD,
            threshold: 12.5,
            last_update_ms: None,
            prev_trend: 0.0,
            time_over_using: None,
            overuse_counter: 0,
            hypothesis: BandwidthUsage::Normal,
        }
    }

    fn update_trendline(&mut self, recv_delta_ms: f64, send_delta_ms: f64, arrival_time_ms: i64) {
        let delta_ms = recv_delta_ms - send_delta_ms;
        self.num_of_deltas = (self.num_of_deltas + 1).min(Self::DELTA_COUNTER_MAX);
        let first_arrival_time_ms = *self.first_arrival_time_ms.get_or_insert(arrival_time_ms);

        // Exponential backoff filter.
        self.accumulated_delay += delta_ms;
        self.smoothed_delay = self.smoothing_coef * self.smoothed_delay
            + (1.0 - self.smoothing_coef) * self.accumulated_delay;

        // Maintain packet window
        self.delay_hist.push_back(PacketTiming {
            arrival_time_ms: (arrival_time_ms - first_arrival_time_ms) as f64,
            smoothed_delay_ms: self.smoothed_delay,
            raw_delay_ms: self.accumulated_delay,
        });
        if self.settings.enable_sort {
            let mut i = self.delay_hist.len() - 1;
            while i > 0
                && self.delay_hist[i].arrival_time_ms < self.delay_hist[i - 1].arrival_time_ms
            {
                self.delay_hist.swap(i, i - 1);
                i -= 1;
            }
        }
        if self.delay_hist.len() > self.settings.window_size {
            self.delay_hist.pop_front();
        }

        // Simple linear regression.
        let mut trend = self.prev_trend;
        if self.delay_hist.len() == self.settings.window_size {
            // Update trend if it is possible to fit a line to the data. The delay
            // trend can be seen as an estimate of (send_rate - capacity)/capacity.
            // 0 < trend < 1   .  the delay increases, queues are filling up
            //   trend == 0    .  the delay does not change
            //   trend < 0     .  the delay decreases, queues are being emptied
            trend = linear_fit_slope(&self.delay_hist).unwrap_or(trend);
            if self.settings.enable_cap {
                // We only use the cap to filter out overuse detections, not
                // to detect additional underuses.
                if let Some(cap) = compute_slope_cap(&self.delay_hist, &self.settings) {
                    if trend >= 0.0 && trend > cap {
                        trend = cap;
                    }
                }
            }
        }
        self.detect(trend, send_delta_ms, arrival_time_ms);
    }

    fn detect(&mut self, trend: f64, ts_delta: f64, now_ms: i64) {
        if self.num_of_deltas < 2 {
            self.hypothesis = BandwidthUsage::Normal;
            return;
        }
        let modified_trend =
            self.num_of_deltas.min(Self::MIN_NUM_DELTAS) as f64 * trend * self.threshold_gain;
        if modified_trend > self.threshold {
            let time_over_using = match self.time_over_using {
                // Increment timer
                Some(time_over_using) => time_over_using + ts_delta,
                // Initialize the timer. Assume that we've been
                // over-using half of the time since the previous
                // sample.
                None => ts_delta / 2.0,
            };
            self.time_over_using = Some(time_over_using);
            self.overuse_counter += 1;
            if time_over_using > self.overusing_time_threshold
                && self.overuse_counter > 1
                && trend >= self.prev_trend
            {
                self.time_over_using = Some(0.0);
                self.overuse_counter = 0;
                self.hypothesis = BandwidthUsage::Overusing;
            }
        } else if modified_trend < -self.threshold {
            self.time_over_using = None;
            self.overuse_counter = 0;
            self.hypothesis = BandwidthUsage::Underusing;
        } else {
            self.time_over_using = None;
            self.overuse_counter = 0;
            self.hypothesis = BandwidthUsage::Normal;
        }
        self.prev_trend = trend;
        self.update_threshold(modified_trend, now_ms);
    }

    fn update_threshold(&mut self, modified_trend: f64, now_ms: i64) {
        let last_update_ms = *self.last_update_ms.get_or_insert(now_ms);

        if modified_trend.abs() > self.threshold + Self::MAX_ADAPT_OFFSET_MS {
            // Avoid adapting the threshold to big latency spikes, caused e.g.,
            // by a sudden capacity drop.
            self.last_update_ms = Some(now_ms);
            return;
        }

        let k = if modified_trend.abs() < self.threshold {
            self.k_down
        } else {
            self.k_up
        };
        let time_delta_ms = (now_ms - last_update_ms).min(Self::MAX_TIME_DELTA_MS);
        self.threshold += k * (modified_trend.abs() - self.threshold) * time_delta_ms as f64;
        self.threshold = self.threshold.clamp(6.0, 600.0);
        self.last_update_ms = Some(now_ms);
    }
}

/*
 *  Copyright (c) 2014 The WebRTC project authors. All Rights Reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

use std::fmt;

use crate::{
    api::{
        transport::{BandwidthUsage, NetworkStateEstimate},
        units::{DataRate, DataSize, TimeDelta, Timestamp},
    },
    experiments::FieldTrials,
    goog_cc::LinkCapacityEstimator,
};

use super::{RateControlInput, BITRATE_WINDOW, CONGESTION_CONTROLLER_MIN_BITRATE};

// WebRTC-BweBackOffFactor
#[derive(Debug, Clone)]
pub struct BweBackOffFactor {
    pub backoff_factor: f64, // Enabled-*
}

impl Default for BweBackOffFactor {
    fn default() -> Self {
        Self {
            backoff_factor: Self::DEFAULT_BACKOFF_FACTOR,
        }
    }
}

impl BweBackOffFactor {
    const DEFAULT_BACKOFF_FACTOR: f64 = 0.85;

    pub fn validate(&mut self) {
        if self.backoff_factor >= 1.0 {
            tracing::warn!("Back-off factor must be less than 1.");
        } else if self.backoff_factor <= 0.0 {
            tracing::warn!("Back-off factor must be greater than 0.");
        } else if self.backoff_factor.is_nan() {
            tracing::warn!("Back-off factor must be a number.");
        } else {
            return;
        }

        tracing::warn!("Failed to parse parameters for AimdRateControl experiment from field trial string. Using default.");
        self.backoff_factor = Self::DEFAULT_BACKOFF_FACTOR
    }
}

// WebRTC-Bwe-EstimateBoundedIncrease
#[derive(Debug, Clone)]
pub struct EstimateBoundedIncrease {
    pub disable_estimate_bounded_increase: bool,    // Disabled
    pub use_current_estimate_as_min_upper_bound: bool, // c_upper
}

impl Default for EstimateBoundedIncrease {
    fn default() -> Self {
        Self {
            disable_estimate_bounded_increase: false,
            use_current_estimate_as_min_upper_bound: true,
        }
    }
}

/// Thresholds for biasing the rate controller with the cellular resource
/// ratio, the share of requested uplink resources the modem was granted.
///
/// WebRTC-Bwe-CellularResourceRatio
#[derive(Debug, Clone, PartialEq)]
pub struct CellularRatioSettings {
    /// Cleared by the `Disabled` flag. Samples are ignored while disabled.
    pub enabled: bool,
    /// Below this smoothed ratio an increase is turned into a hold. (hold)
    pub hold_threshold: f64,
    /// Below this smoothed ratio increases are additive only. (limit)
    pub limit_threshold: f64,
    /// A falling ratio below this ceiling also limits increases to additive.
    pub limit_trend_ceiling: f64,
    /// Change between consecutive smoothed samples counted as falling. (trend)
    pub negative_trend_threshold: f64,
    /// Smoothed ratio considered sustained headroom. (growth)
    pub multiplicative_growth_threshold: f64,
    /// Consecutive samples at or above the growth threshold before
    /// multiplicative increase is forced. (growth_count)
    pub consecutive_high_ratio_threshold: u32,
    /// EWMA weight of a new sample. (alpha)
    pub smoothing_alpha: f64,
    /// Samples older than this no longer influence decisions. (freshness)
    pub freshness_window: TimeDelta,
    /// Raw samples are clamped to `[0, max_ratio]`.
    pub max_ratio: f64,
}

impl Default for CellularRatioSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            hold_threshold: 0.7,
            limit_threshold: 0.9,
            limit_trend_ceiling: 1.0,
            negative_trend_threshold: -0.02,
            multiplicative_growth_threshold: 1.5,
            consecutive_high_ratio_threshold: 5,
            smoothing_alpha: 0.3,
            freshness_window: TimeDelta::from_seconds(1),
            max_ratio: 2.0,
        }
    }
}

impl CellularRatioSettings {
    pub fn validate(&mut self) {
        let defaults = Self::default();
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            tracing::warn!(
                "Cellular ratio smoothing factor must be in (0, 1], got {}. Using default.",
                self.smoothing_alpha
            );
            self.smoothing_alpha = defaults.smoothing_alpha;
        }
        if !(self.hold_threshold <= self.limit_threshold) {
            tracing::warn!(
                "Cellular ratio hold threshold {} must not exceed limit threshold {}. Using defaults.",
                self.hold_threshold,
                self.limit_threshold
            );
            self.hold_threshold = defaults.hold_threshold;
            self.limit_threshold = defaults.limit_threshold;
        }
        if self.consecutive_high_ratio_threshold == 0 {
            tracing::warn!("Cellular ratio growth count must be positive. Using default.");
            self.consecutive_high_ratio_threshold = defaults.consecutive_high_ratio_threshold;
        }
        if self.freshness_window <= TimeDelta::zero() || self.freshness_window.is_infinite() {
            tracing::warn!(
                "Cellular ratio freshness window must be positive and finite, got {:?}. Using default.",
                self.freshness_window
            );
            self.freshness_window = defaults.freshness_window;
        }
        if !(self.max_ratio > 0.0 && self.max_ratio.is_finite()) {
            tracing::warn!("Cellular ratio upper clamp must be positive. Using default.");
            self.max_ratio = defaults.max_ratio;
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RateControlState {
    Hold,
    Increase,
    Decrease,
}

/// The branch taken by the most recent bitrate update.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum RateControlStrategy {
    #[default]
    Hold,
    AdditiveIncrease,
    MultiplicativeIncrease,
    MultiplicativeDecrease,
}

impl RateControlStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hold => "Hold",
            Self::AdditiveIncrease => "Additive-Increase",
            Self::MultiplicativeIncrease => "Multiplicative-Increase",
            Self::MultiplicativeDecrease => "Multiplicative-Decrease",
        }
    }
}

impl fmt::Display for RateControlStrategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Diagnostic record of the last update. Only used for logging.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StrategyInfo {
    pub strategy: RateControlStrategy,
    pub parameters: String,
}

impl StrategyInfo {
    fn new(strategy: RateControlStrategy, parameters: String) -> Self {
        Self {
            strategy,
            parameters,
        }
    }
}

// A rate control implementation based on additive increases of
// bitrate when no over-use is detected and multiplicative decreases when
// over-uses are detected. When we think the available bandwidth has changes or
// is unknown, we will switch to a "slow-start mode" where we increase
// multiplicatively.
//
// The cellular resource ratio biases the increase path only: a low ratio holds
// or slows the increase, a sustained high ratio forces a multiplicative ramp.
// Decreases are still driven by over-use detection alone.
#[derive(Debug)]
pub struct AimdRateControl {
    min_configured_bitrate: DataRate,
    current_bitrate: DataRate,
    latest_estimated_throughput: DataRate,
    link_capacity: LinkCapacityEstimator,
    network_estimate: Option<NetworkStateEstimate>,
    rate_control_state: RateControlState,
    time_last_bitrate_change: Timestamp,
    time_last_bitrate_decrease: Timestamp,
    time_first_throughput_estimate: Timestamp,
    time_last_update: Timestamp,
    bitrate_is_initialized: bool,
    beta: f64,
    in_alr: bool,
    rtt: TimeDelta,
    send_side: bool,
    // Allow the delay based estimate to only increase as long as application
    // limited region (alr) is not detected.
    no_bitrate_increase_in_alr: bool,
    last_decrease: Option<DataRate>,
    last_strategy_info: StrategyInfo,

    // Cellular resource ratio
    cellular: CellularRatioSettings,
    cellular_resource_ratio: f64,
    smoothed_cellular_ratio: Option<f64>,
    previous_cellular_ratio: f64,
    time_last_cellular_update: Timestamp,
    consecutive_high_ratio_count: u32,

    // Field trials
    disable_estimate_bounded_increase: bool,
    use_current_estimate_as_min_upper_bound: bool,
}

impl Default for AimdRateControl {
    fn default() -> Self {
        let max_configured_bitrate = DataRate::from_kilobits_per_sec(30000);
        Self {
            min_configured_bitrate: CONGESTION_CONTROLLER_MIN_BITRATE,
            current_bitrate: max_configured_bitrate,
            latest_estimated_throughput: max_configured_bitrate,
            link_capacity: LinkCapacityEstimator::new(),
            rate_control_state: RateControlState::Hold,
            time_last_bitrate_change: Timestamp::minus_infinity(),
            time_last_bitrate_decrease: Timestamp::minus_infinity(),
            time_first_throughput_estimate: Timestamp::minus_infinity(),
            time_last_update: Timestamp::minus_infinity(),
            bitrate_is_initialized: false,
            beta: Self::DEFAULT_BACKOFF_FACTOR,
            in_alr: false,
            rtt: Self::DEFAULT_RTT,
            send_side: false,
            no_bitrate_increase_in_alr: false,
            network_estimate: None,
            last_decrease: None,
            last_strategy_info: StrategyInfo::default(),
            cellular: CellularRatioSettings::default(),
            cellular_resource_ratio: 0.0,
            smoothed_cellular_ratio: None,
            previous_cellular_ratio: 0.0,
            time_last_cellular_update: Timestamp::minus_infinity(),
            consecutive_high_ratio_count: 0,
            disable_estimate_bounded_increase: false,
            use_current_estimate_as_min_upper_bound: true,
        }
    }
}

impl AimdRateControl {
    const DEFAULT_RTT: TimeDelta = TimeDelta::from_millis(200);
    const DEFAULT_BACKOFF_FACTOR: f64 = 0.85;

    pub fn new(field_trials: &FieldTrials, send_side: bool) -> Self {
        tracing::info!(
            "Using aimd rate control with back off factor {}",
            field_trials.bwe_back_off_factor.backoff_factor
        );

        Self {
            send_side,
            beta: field_trials.bwe_back_off_factor.backoff_factor,
            no_bitrate_increase_in_alr: field_trials.no_bitrate_increase_in_alr,
            use_current_estimate_as_min_upper_bound: field_trials
                .estimate_bounded_increase
                .use_current_estimate_as_min_upper_bound,
            disable_estimate_bounded_increase: field_trials
                .estimate_bounded_increase
                .disable_estimate_bounded_increase,
            cellular: field_trials.cellular_ratio.clone(),
            ..Default::default()
        }
    }

    // Returns true if the target bitrate has been initialized. This happens
    // either if it has been explicitly set via SetStartBitrate/SetEstimate, or if
    // we have measured a throughput.
    pub fn valid_estimate(&self) -> bool {
        self.bitrate_is_initialized
    }
    pub fn set_start_bitrate(&mut self, start_bitrate: DataRate) {
        self.current_bitrate = start_bitrate;
        self.latest_estimated_throughput = self.current_bitrate;
        self.bitrate_is_initialized = true;
    }
    pub fn set_min_bitrate(&mut self, min_bitrate: DataRate) {
        self.min_configured_bitrate = min_bitrate;
        self.current_bitrate = self.current_bitrate.max(min_bitrate);
    }
    pub fn get_feedback_interval(&self) -> TimeDelta {
        // Estimate how often we can send RTCP if we allocate up to 5% of bandwidth
        // to feedback.
        const RTCP_SIZE: DataSize = DataSize::from_bytes(80);
        let rtcp_bitrate: DataRate = self.current_bitrate * 0.05;
        let interval: TimeDelta = RTCP_SIZE / rtcp_bitrate;
        const MIN_FEEDBACK_INTERVAL: TimeDelta = TimeDelta::from_millis(200);
        const MAX_FEEDBACK_INTERVAL: TimeDelta = TimeDelta::from_millis(1000);
        interval.clamped(MIN_FEEDBACK_INTERVAL, MAX_FEEDBACK_INTERVAL)
    }

    // Returns true if the bitrate estimate hasn't been changed for more than
    // an RTT, or if the estimated_throughput is less than half of the current
    // estimate. Should be used to decide if we should reduce the rate further
    // when over-using.
    pub fn time_to_reduce_further(
        &self,
        at_time: Timestamp,
        estimated_throughput: DataRate,
    ) -> bool {
        let bitrate_reduction_interval: TimeDelta = self
            .rtt
            .clamped(TimeDelta::from_millis(10), TimeDelta::from_millis(200));
        if at_time - self.time_last_bitrate_change >= bitrate_reduction_interval {
            return true;
        }
        if self.valid_estimate() {
            // TODO(terelius/holmer): Investigate consequences of increasing
            // the threshold to 0.95 * LatestEstimate().
            let threshold: DataRate = 0.5 * self.latest_estimate();
            return estimated_throughput < threshold;
        }
        false
    }
    // As above. To be used if overusing before we have measured a throughput.
    pub fn initial_time_to_reduce_further(&self, at_time: Timestamp) -> bool {
        self.valid_estimate()
            && self.time_to_reduce_further(
                at_time,
                self.latest_estimate() / 2 - DataRate::from_bits_per_sec(1),
            )
    }

    pub fn latest_estimate(&self) -> DataRate {
        self.current_bitrate
    }
    pub fn rate_control_state(&self) -> RateControlState {
        self.rate_control_state
    }
    pub fn last_strategy_info(&self) -> &StrategyInfo {
        &self.last_strategy_info
    }
    pub fn set_rtt(&mut self, rtt: TimeDelta) {
        self.rtt = rtt;
    }
    pub fn update(&mut self, input: RateControlInput, at_time: Timestamp) -> DataRate {
        debug_assert!(at_time.is_finite(), "update requires a finite time");

        // Set the initial bit rate value to what we're receiving the first half
        // second.
        // TODO(bugs.webrtc.org/9379): The comment above doesn't match to the code.
        if !self.bitrate_is_initialized {
            const INITIALIZATION_TIME: TimeDelta = TimeDelta::from_seconds(5);
            assert!(BITRATE_WINDOW <= INITIALIZATION_TIME);

            if let Some(estimated_throughput) = input.estimated_throughput {
                if self.time_first_throughput_estimate.is_infinite() {
                    self.time_first_throughput_estimate = at_time;
                } else if at_time - self.time_first_throughput_estimate > INITIALIZATION_TIME {
                    self.current_bitrate = estimated_throughput;
                    self.bitrate_is_initialized = true;
                }
            }
        }

        let old_bitrate = self.current_bitrate;
        let old_state = self.rate_control_state;
        self.change_bitrate(input, at_time);
        self.time_last_update = at_time;

        if self.current_bitrate != old_bitrate || self.rate_control_state != old_state {
            tracing::debug!(
                state = ?self.rate_control_state,
                old_bitrate_bps = old_bitrate.bps(),
                new_bitrate_bps = self.current_bitrate.bps(),
                strategy = %self.last_strategy_info.strategy,
                "Rate control changed"
            );
        }
        self.current_bitrate
    }

    pub fn set_in_application_limited_region(&mut self, in_alr: bool) {
        self.in_alr = in_alr;
    }
    pub fn set_estimate(&mut self, bitrate: DataRate, at_time: Timestamp) {
        self.bitrate_is_initialized = true;
        let prev_bitrate: DataRate = self.current_bitrate;
        self.current_bitrate = self.clamp_bitrate(bitrate);
        self.time_last_bitrate_change = at_time;
        if self.current_bitrate < prev_bitrate {
            self.time_last_bitrate_decrease = at_time;
        }
    }
    pub fn set_network_state_estimate(&mut self, estimate: Option<NetworkStateEstimate>) {
        self.network_estimate = estimate;
    }

    /// Feeds one cellular resource ratio sample, taken at `at_time`.
    ///
    /// The ratio is clamped to `[0, max_ratio]` and smoothed with an EWMA. The
    /// first sample seeds the smoothed value directly.
    pub fn update_cellular_resource_ratio(&mut self, ratio: f64, at_time: Timestamp) {
        if !self.cellular.enabled {
            tracing::trace!(ratio, "Cellular ratio biasing disabled, ignoring sample");
            return;
        }
        if ratio.is_nan() {
            tracing::warn!("Ignoring cellular ratio sample that is not a number");
            return;
        }

        let ratio = ratio.clamp(0.0, self.cellular.max_ratio);
        let alpha = self.cellular.smoothing_alpha;
        let smoothed = match self.smoothed_cellular_ratio {
            Some(smoothed) => {
                self.previous_cellular_ratio = smoothed;
                alpha * ratio + (1.0 - alpha) * smoothed
            }
            None => {
                self.previous_cellular_ratio = ratio;
                ratio
            }
        };
        self.smoothed_cellular_ratio = Some(smoothed);
        self.cellular_resource_ratio = ratio;
        self.time_last_cellular_update = at_time;

        if smoothed >= self.cellular.multiplicative_growth_threshold {
            self.consecutive_high_ratio_count = self.consecutive_high_ratio_count.saturating_add(1);
        } else {
            self.consecutive_high_ratio_count = 0;
        }

        tracing::debug!(
            raw = self.cellular_resource_ratio,
            smoothed,
            trend = self.cellular_ratio_trend(),
            high_count = self.consecutive_high_ratio_count,
            at_ms = at_time.ms(),
            "Cellular resource ratio updated"
        );
    }

    pub fn has_fresh_cellular_data(&self, at_time: Timestamp) -> bool {
        self.cellular.enabled
            && self.time_last_cellular_update.is_finite()
            && at_time >= self.time_last_cellular_update
            && at_time - self.time_last_cellular_update < self.cellular.freshness_window
    }

    pub fn should_force_hold(&self) -> bool {
        self.smoothed_cellular_ratio
            .is_some_and(|ratio| ratio < self.cellular.hold_threshold)
    }

    pub fn should_limit_increase(&self) -> bool {
        let trend = self.cellular_ratio_trend();
        self.smoothed_cellular_ratio.is_some_and(|ratio| {
            ratio < self.cellular.limit_threshold
                || (ratio < self.cellular.limit_trend_ceiling
                    && trend < self.cellular.negative_trend_threshold)
        })
    }

    pub fn should_force_multiplicative_growth(&self) -> bool {
        self.consecutive_high_ratio_count >= self.cellular.consecutive_high_ratio_threshold
    }

    /// `None` until the first sample arrives.
    pub fn smoothed_cellular_ratio(&self) -> Option<f64> {
        self.smoothed_cellular_ratio
    }

    /// Change of the smoothed ratio over the last sample.
    pub fn cellular_ratio_trend(&self) -> f64 {
        self.smoothed_cellular_ratio
            .map_or(0.0, |smoothed| smoothed - self.previous_cellular_ratio)
    }

    // Returns the increase rate when used bandwidth is near the link capacity.
    pub fn get_near_max_increase_rate_bps_per_second(&self) -> f64 {
        const MIN_INCREASE_RATE_BPS_PER_SECOND: f64 = 4000.0;
        if self.current_bitrate.is_zero() {
            return MIN_INCREASE_RATE_BPS_PER_SECOND;
        }
        let frame_interval: TimeDelta = TimeDelta::from_seconds_float(1.0 / 30.0);
        let frame_size: DataSize = self.current_bitrate * frame_interval;
        const PACKET_SIZE: DataSize = DataSize::from_bytes(1200);
        let packets_per_frame: f64 = (frame_size / PACKET_SIZE).ceil();
        let avg_packet_size: DataSize = frame_size / packets_per_frame;

        // Approximate the over-use estimator delay to 100 ms.
        let mut response_time: TimeDelta = self.rtt + TimeDelta::from_millis(100);

        response_time *= 2;
        let increase_rate_bps_per_second: f64 = (avg_packet_size / response_time).bps_float();
        increase_rate_bps_per_second.max(MIN_INCREASE_RATE_BPS_PER_SECOND)
    }
    // Returns the expected time between overuse signals (assuming steady state).
    pub fn get_expected_bandwidth_period(&self) -> TimeDelta {
        const MIN_PERIOD: TimeDelta = TimeDelta::from_seconds(2);
        const DEFAULT_PERIOD: TimeDelta = TimeDelta::from_seconds(3);
        const MAX_PERIOD: TimeDelta = TimeDelta::from_seconds(50);

        let increase_rate_bps_per_second: f64 = self.get_near_max_increase_rate_bps_per_second();
        if let Some(last_decrease) = self.last_decrease {
            let time_to_recover_decrease_seconds: f64 =
                last_decrease.bps_float() / increase_rate_bps_per_second;
            let period: TimeDelta = TimeDelta::from_seconds_float(time_to_recover_decrease_seconds);
            period.clamped(MIN_PERIOD, MAX_PERIOD)
        } else {
            DEFAULT_PERIOD
        }
    }

    // Update the target bitrate based on, among other things, the current rate
    // control state, the current target bitrate and the estimated throughput.
    // When in the "increase" state the bitrate will be increased either
    // additively or multiplicatively depending on the rate control region. When
    // in the "decrease" state the bitrate will be decreased to slightly below the
    // current throughput. When in the "hold" state the bitrate will be kept
    // constant to allow built up queues to drain.
    fn change_bitrate(&mut self, input: RateControlInput, at_time: Timestamp) {
        let mut new_bitrate: Option<DataRate> = None;
        let estimated_throughput: DataRate = input
            .estimated_throughput
            .unwrap_or(self.latest_estimated_throughput);
        if let Some(estimated_throughput) = input.estimated_throughput {
            self.latest_estimated_throughput = estimated_throughput;
        }

        // An over-use should always trigger us to reduce the bitrate, even though
        // we have not yet established our first estimate. By acting on the over-use,
        // we will end up with a valid estimate.
        if !self.bitrate_is_initialized && input.bw_state != BandwidthUsage::Overusing {
            self.last_strategy_info = self.hold_info();
            return;
        }

        self.change_state(input, at_time);

        match self.rate_control_state {
            RateControlState::Hold => {
                self.last_strategy_info = self.hold_info();
            }
            RateControlState::Increase => {
                if estimated_throughput > self.link_capacity.upper_bound() {
                    self.link_capacity.reset();
                }

                // We limit the new bitrate based on the troughput to avoid unlimited
                // bitrate increases. We allow a bit more lag at very low rates to not too
                // easily get stuck if the encoder produces uneven outputs.
                let mut increase_limit: DataRate =
                    1.5 * estimated_throughput + DataRate::from_kilobits_per_sec(10);
                if self.send_side && self.in_alr && self.no_bitrate_increase_in_alr {
                    // Do not increase the delay based estimate in alr since the estimator
                    // will not be able to get transport feedback necessary to detect if
                    // the new estimate is correct.
                    // If we have previously increased above the limit (for instance due to
                    // probing), we don't allow further changes.
                    increase_limit = self.current_bitrate;
                }

                if self.current_bitrate < increase_limit {
                    let increased_bitrate = self.increased_bitrate(at_time);
                    new_bitrate = Some(increased_bitrate.min(increase_limit));
                } else {
                    self.last_strategy_info = self.hold_info();
                }
                self.time_last_bitrate_change = at_time;
            }
            RateControlState::Decrease => {
                // Set bit rate to something slightly lower than the measured throughput
                // to get rid of any self-induced delay.
                let mut decreased_bitrate: DataRate = estimated_throughput * self.beta;
                if decreased_bitrate > DataRate::from_kilobits_per_sec(5) {
                    decreased_bitrate -= DataRate::from_kilobits_per_sec(5);
                }

                if decreased_bitrate > self.current_bitrate {
                    // TODO(terelius): The link_capacity estimate may be based on old
                    // throughput measurements. Relying on them may lead to unnecessary
                    // BWE drops.
                    if self.link_capacity.has_estimate() {
                        decreased_bitrate = self.beta * self.link_capacity.estimate();
                    }
                }
                // Avoid increasing the rate when over-using.
                if decreased_bitrate < self.current_bitrate {
                    new_bitrate = Some(decreased_bitrate);
                    self.last_strategy_info = StrategyInfo::new(
                        RateControlStrategy::MultiplicativeDecrease,
                        format!(
                            "Beta={},Throughput={}bps,Reduction={}bps",
                            self.beta,
                            estimated_throughput.bps(),
                            self.current_bitrate.bps() - decreased_bitrate.bps()
                        ),
                    );
                } else {
                    tracing::debug!(
                        candidate_bps = decreased_bitrate.bps(),
                        current_bps = self.current_bitrate.bps(),
                        "No decrease applied"
                    );
                    self.last_strategy_info = StrategyInfo::new(
                        RateControlStrategy::Hold,
                        format!("Reason=NoDecrease,Bitrate={}bps", self.current_bitrate.bps()),
                    );
                }

                if self.bitrate_is_initialized && estimated_throughput < self.current_bitrate {
                    if let Some(new_bitrate) = new_bitrate {
                        self.last_decrease = Some(self.current_bitrate - new_bitrate);
                    } else {
                        self.last_decrease = Some(DataRate::zero());
                    }
                }
                if estimated_throughput < self.link_capacity.lower_bound() {
                    // The current throughput is far from the estimated link capacity. Clear
                    // the estimate to allow an immediate update in OnOveruseDetected.
                    self.link_capacity.reset();
                }

                self.bitrate_is_initialized = true;
                self.link_capacity.on_overuse_detected(estimated_throughput);
                // Stay on hold until the pipes are cleared.
                self.rate_control_state = RateControlState::Hold;
                self.time_last_bitrate_change = at_time;
                self.time_last_bitrate_decrease = at_time;
            }
        };

        self.current_bitrate = self.clamp_bitrate(new_bitrate.unwrap_or(self.current_bitrate));
    }

    // Picks the increase strategy and returns the unlimited increased bitrate.
    fn increased_bitrate(&mut self, at_time: Timestamp) -> DataRate {
        let mut force_additive = false;
        let mut force_multiplicative = false;
        if self.has_fresh_cellular_data(at_time) {
            if self.should_force_multiplicative_growth() {
                force_multiplicative = true;
                // Without a link capacity estimate the default rule falls back to
                // the multiplicative ramp.
                self.link_capacity.reset();
                tracing::info!(
                    ratio = ?self.smoothed_cellular_ratio,
                    consecutive = self.consecutive_high_ratio_count,
                    "Cellular ratio forcing multiplicative increase"
                );
            } else if self.should_limit_increase() {
                force_additive = true;
                tracing::info!(
                    ratio = ?self.smoothed_cellular_ratio,
                    trend = self.cellular_ratio_trend(),
                    "Cellular ratio limiting to additive increase"
                );
            }
        }

        // Zero elapsed time since the last update never adds to the estimate.
        let repeated = at_time == self.time_last_update;
        let time_delta_ms = (at_time - self.time_last_bitrate_change).ms_or(0);

        if (self.link_capacity.has_estimate() || force_additive) && !force_multiplicative {
            // The link_capacity estimate is reset if the measured throughput
            // is too far from the estimate. We can therefore assume that our
            // target rate is reasonably close to link capacity and use additive
            // increase.
            let additive_increase: DataRate = if repeated {
                DataRate::zero()
            } else {
                self.additive_rate_increase(at_time, self.time_last_bitrate_change)
            };
            let rate_bps_per_second = self.get_near_max_increase_rate_bps_per_second() as i64;
            let parameters = if force_additive {
                format!("Rate={rate_bps_per_second}bps/s,Delta={time_delta_ms}ms,Cellular-forced")
            } else {
                format!(
                    "Rate={rate_bps_per_second}bps/s,Delta={time_delta_ms}ms,LinkCap={}bps",
                    self.link_capacity.estimate().bps()
                )
            };
            self.last_strategy_info =
                StrategyInfo::new(RateControlStrategy::AdditiveIncrease, parameters);
            self.current_bitrate + additive_increase
        } else {
            // If we don't have an estimate of the link capacity, use faster ramp
            // up to discover the capacity.
            let multiplicative_increase: DataRate = if repeated {
                DataRate::zero()
            } else {
                self.multiplicative_rate_increase(
                    at_time,
                    self.time_last_bitrate_change,
                    self.current_bitrate,
                )
            };
            let alpha = 1.0
                + multiplicative_increase.bps_float() / self.current_bitrate.bps_float().max(1.0);
            let mut parameters = format!("Alpha={alpha:.4},Delta={time_delta_ms}ms");
            if force_multiplicative {
                parameters.push_str(",Cellular-L4-forced");
            }
            self.last_strategy_info =
                StrategyInfo::new(RateControlStrategy::MultiplicativeIncrease, parameters);
            self.current_bitrate + multiplicative_increase
        }
    }

    fn hold_info(&self) -> StrategyInfo {
        StrategyInfo::new(
            RateControlStrategy::Hold,
            format!("Bitrate={}bps", self.current_bitrate.bps()),
        )
    }

    fn clamp_bitrate(&self, mut new_bitrate: DataRate) -> DataRate {
        if let Some(network_estimate) = self.network_estimate.as_ref() {
            if !self.disable_estimate_bounded_increase
                && network_estimate.link_capacity_upper.is_finite()
            {
                let upper_bound: DataRate = if self.use_current_estimate_as_min_upper_bound {
                    network_estimate
                        .link_capacity_upper
                        .max(self.current_bitrate)
                } else {
                    network_estimate.link_capacity_upper
                };
                new_bitrate = upper_bound.min(new_bitrate);
            }
            if network_estimate.link_capacity_lower.is_finite()
                && new_bitrate < self.current_bitrate
            {
                new_bitrate = self
                    .current_bitrate
                    .min(new_bitrate.max(network_estimate.link_capacity_lower * self.beta));
            }
        }
        new_bitrate.max(self.min_configured_bitrate)
    }

    fn multiplicative_rate_increase(
        &self,
        at_time: Timestamp,
        last_time: Timestamp,
        current_bitrate: DataRate,
    ) -> DataRate {
        let mut alpha: f64 = 1.08;
        if last_time.is_finite() {
            let time_since_last_update = at_time - last_time;
            alpha = alpha.powf(time_since_last_update.seconds_float().min(1.0));
        }
        (current_bitrate * (alpha - 1.0)).max(DataRate::from_bits_per_sec(1000))
    }
    fn additive_rate_increase(&self, at_time: Timestamp, last_time: Timestamp) -> DataRate {
        let time_period_seconds: f64 = (at_time - last_time).seconds_float();
        let data_rate_increase_bps: f64 =
            self.get_near_max_increase_rate_bps_per_second() * time_period_seconds;
        DataRate::from_bits_per_sec_float(data_rate_increase_bps)
    }
    fn change_state(&mut self, input: RateControlInput, at_time: Timestamp) {
        match input.bw_state {
            BandwidthUsage::Normal => {
                if self.rate_control_state == RateControlState::Hold {
                    self.time_last_bitrate_change = at_time;
                    self.rate_control_state = RateControlState::Increase;
                }
            }
            BandwidthUsage::Overusing => {
                if self.rate_control_state != RateControlState::Decrease {
                    self.rate_control_state = RateControlState::Decrease;
                }
            }
            BandwidthUsage::Underusing => {
                self.rate_control_state = RateControlState::Hold;
            }
        }

        // Preventive only: a low ratio may stop an increase but never forces a
        // decrease.
        if self.rate_control_state == RateControlState::Increase
            && self.has_fresh_cellular_data(at_time)
            && self.should_force_hold()
        {
            tracing::info!(
                ratio = ?self.smoothed_cellular_ratio,
                "Cellular ratio holding instead of increasing"
            );
            self.rate_control_state = RateControlState::Hold;
        }
    }
}

use std::str::FromStr;

use crate::{
    api::units::TimeDelta,
    goog_cc::{BweSeparateAudioPacketsSettings, TrendlineEstimatorSettings},
    remote_bitrate_estimator::{BweBackOffFactor, CellularRatioSettings, EstimateBoundedIncrease},
};

/// Field trials for WebRTC that impact the delay based estimate.
///
/// Everything is type safe, so the struct can be filled in directly. [FieldTrials::parse]
/// accepts the usual `Name/Group/` field trial string for compatibility with WebRTC configs.
#[derive(Clone, Debug, Default)]
pub struct FieldTrials {
    /// WebRTC-Bwe-SeparateAudioPackets
    pub separate_audio: BweSeparateAudioPacketsSettings,

    /// WebRTC-Bwe-TrendlineEstimatorSettings
    pub trendline_estimator_settings: TrendlineEstimatorSettings,

    /// WebRTC-BweBackOffFactor
    pub bwe_back_off_factor: BweBackOffFactor,

    /// WebRTC-DontIncreaseDelayBasedBweInAlr
    pub no_bitrate_increase_in_alr: bool,

    /// WebRTC-Bwe-EstimateBoundedIncrease
    pub estimate_bounded_increase: EstimateBoundedIncrease,

    /// WebRTC-Bwe-CellularResourceRatio
    pub cellular_ratio: CellularRatioSettings,
}

impl FieldTrials {
    /// Parses a field trial string such as
    /// `WebRTC-BweBackOffFactor/Enabled-0.9/WebRTC-Bwe-CellularResourceRatio/hold:0.6/`.
    ///
    /// Unknown trials and keys are ignored. Malformed values keep their default.
    pub fn parse(trials: &str) -> Self {
        let mut field_trials = Self::default();

        let mut parts = trials.split('/');
        while let Some(name) = parts.next() {
            if name.is_empty() {
                continue;
            }
            let Some(group) = parts.next() else {
                tracing::warn!("Field trial {} has no group", name);
                break;
            };
            field_trials.apply(name, group);
        }

        field_trials.validate();
        field_trials
    }

    /// Repairs out of range values, logging a warning for each.
    pub fn validate(&mut self) {
        self.bwe_back_off_factor.validate();
        self.trendline_estimator_settings.validate();
        self.cellular_ratio.validate();
    }

    fn apply(&mut self, name: &str, group: &str) {
        match name {
            "WebRTC-BweBackOffFactor" => match group.strip_prefix("Enabled-") {
                Some(factor) => parse_into(
                    name,
                    "Enabled",
                    Some(factor),
                    &mut self.bwe_back_off_factor.backoff_factor,
                ),
                None => tracing::debug!("{} not enabled", name),
            },
            "WebRTC-DontIncreaseDelayBasedBweInAlr" => {
                self.no_bitrate_increase_in_alr = group.starts_with("Enabled");
            }
            "WebRTC-Bwe-EstimateBoundedIncrease" => {
                let settings = &mut self.estimate_bounded_increase;
                for (key, value) in parameters(group) {
                    match key {
                        "Disabled" => settings.disable_estimate_bounded_increase = true,
                        "c_upper" => parse_bool_into(
                            name,
                            key,
                            value,
                            &mut settings.use_current_estimate_as_min_upper_bound,
                        ),
                        _ => unknown_key(name, key),
                    }
                }
            }
            "WebRTC-Bwe-SeparateAudioPackets" => {
                let settings = &mut self.separate_audio;
                for (key, value) in parameters(group) {
                    match key {
                        "enabled" => parse_bool_into(name, key, value, &mut settings.enabled),
                        "packet_threshold" => parse_into(
                            name,
                            key,
                            value,
                            &mut settings.packet_threshold,
                        ),
                        "time_threshold" => parse_duration_into(
                            name,
                            key,
                            value,
                            &mut settings.time_threshold,
                        ),
                        _ => unknown_key(name, key),
                    }
                }
            }
            "WebRTC-Bwe-TrendlineEstimatorSettings" => {
                let settings = &mut self.trendline_estimator_settings;
                for (key, value) in parameters(group) {
                    match key {
                        "sort" => parse_bool_into(name, key, value, &mut settings.enable_sort),
                        "cap" => parse_bool_into(name, key, value, &mut settings.enable_cap),
                        "beginning_packets" => parse_into(
                            name,
                            key,
                            value,
                            &mut settings.beginning_packets,
                        ),
                        "end_packets" => parse_into(name, key, value, &mut settings.end_packets),
                        "cap_uncertainty" => parse_into(
                            name,
                            key,
                            value,
                            &mut settings.cap_uncertainty,
                        ),
                        "window_size" => parse_into(name, key, value, &mut settings.window_size),
                        _ => unknown_key(name, key),
                    }
                }
            }
            "WebRTC-Bwe-CellularResourceRatio" => {
                let settings = &mut self.cellular_ratio;
                for (key, value) in parameters(group) {
                    match key {
                        "Disabled" => settings.enabled = false,
                        "Enabled" => settings.enabled = true,
                        "hold" => parse_into(name, key, value, &mut settings.hold_threshold),
                        "limit" => parse_into(name, key, value, &mut settings.limit_threshold),
                        "trend" => parse_into(
                            name,
                            key,
                            value,
                            &mut settings.negative_trend_threshold,
                        ),
                        "growth" => parse_into(
                            name,
                            key,
                            value,
                            &mut settings.multiplicative_growth_threshold,
                        ),
                        "growth_count" => parse_into(
                            name,
                            key,
                            value,
                            &mut settings.consecutive_high_ratio_threshold,
                        ),
                        "alpha" => parse_into(name, key, value, &mut settings.smoothing_alpha),
                        "freshness" => parse_duration_into(
                            name,
                            key,
                            value,
                            &mut settings.freshness_window,
                        ),
                        _ => unknown_key(name, key),
                    }
                }
            }
            _ => tracing::trace!("Ignoring field trial {}", name),
        }
    }
}

// Splits `key:value,flag` into pairs. Bare flags have no value.
fn parameters(group: &str) -> impl Iterator<Item = (&str, Option<&str>)> {
    group
        .split(',')
        .map(str::trim)
        .filter(|parameter| !parameter.is_empty())
        .map(|parameter| match parameter.split_once(':') {
            Some((key, value)) => (key.trim(), Some(value.trim())),
            None => (parameter, None),
        })
}

fn unknown_key(trial: &str, key: &str) {
    tracing::debug!("Ignoring unknown key {} in {}", key, trial);
}

fn parse_into<T: FromStr>(trial: &str, key: &str, value: Option<&str>, target: &mut T) {
    match value.map(str::parse::<T>) {
        Some(Ok(parsed)) => *target = parsed,
        Some(Err(_)) | None => {
            tracing::warn!("Failed to parse {} in {}: {:?}. Using default.", key, trial, value)
        }
    }
}

// A bare flag means true.
fn parse_bool_into(trial: &str, key: &str, value: Option<&str>, target: &mut bool) {
    match value {
        None | Some("true") | Some("1") => *target = true,
        Some("false") | Some("0") => *target = false,
        Some(other) => {
            tracing::warn!("Failed to parse {} in {}: {}. Using default.", key, trial, other)
        }
    }
}

fn parse_duration_into(trial: &str, key: &str, value: Option<&str>, target: &mut TimeDelta) {
    match value.and_then(parse_duration) {
        Some(duration) => *target = duration,
        None => {
            tracing::warn!("Failed to parse {} in {}: {:?}. Using default.", key, trial, value)
        }
    }
}

// Accepts `s`, `ms` and `us` suffixes. A bare number is in milliseconds.
fn parse_duration(value: &str) -> Option<TimeDelta> {
    let (number, micros_per_unit) = if let Some(number) = value.strip_suffix("us") {
        (number, 1.0)
    } else if let Some(number) = value.strip_suffix("ms") {
        (number, 1_000.0)
    } else if let Some(number) = value.strip_suffix('s') {
        (number, 1_000_000.0)
    } else {
        (value, 1_000.0)
    };

    let number: f64 = number.trim().parse().ok()?;
    if !number.is_finite() {
        return None;
    }
    Some(TimeDelta::from_micros((number * micros_per_unit).round() as i64))
}

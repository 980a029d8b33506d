/*
 *  Copyright 2018 The WebRTC project authors. All Rights Reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

use crate::api::units::DataRate;

/// Running estimate of the link capacity, tracked in kbps, with bounds derived
/// from a normalized variance.
#[derive(Debug, Clone)]
pub struct LinkCapacityEstimator {
    estimate_kbps: Option<f64>,
    deviation_kbps: f64,
}

impl Default for LinkCapacityEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkCapacityEstimator {
    pub fn new() -> Self {
        Self {
            estimate_kbps: None,
            deviation_kbps: 0.4,
        }
    }

    pub fn upper_bound(&self) -> DataRate {
        match self.estimate_kbps {
            Some(estimate_kbps) => DataRate::from_kilobits_per_sec_float(
                estimate_kbps + 3.0 * self.deviation_estimate_kbps(estimate_kbps),
            ),
            None => DataRate::infinity(),
        }
    }

    pub fn lower_bound(&self) -> DataRate {
        match self.estimate_kbps {
            Some(estimate_kbps) => DataRate::from_kilobits_per_sec_float(
                (estimate_kbps - 3.0 * self.deviation_estimate_kbps(estimate_kbps)).max(0.0),
            ),
            None => DataRate::zero(),
        }
    }

    pub fn reset(&mut self) {
        self.estimate_kbps = None;
    }

    pub fn on_overuse_detected(&mut self, acknowledged_rate: DataRate) {
        self.update(acknowledged_rate, 0.05);
    }

    pub fn on_probe_rate(&mut self, probe_rate: DataRate) {
        self.update(probe_rate, 0.5);
    }

    pub fn has_estimate(&self) -> bool {
        self.estimate_kbps.is_some()
    }

    pub fn estimate(&self) -> DataRate {
        DataRate::from_kilobits_per_sec_float(self.estimate_kbps.unwrap_or_default())
    }

    fn update(&mut self, capacity_sample: DataRate, alpha: f64) {
        let sample_kbps = capacity_sample.kbps_float();
        let estimate_kbps = match self.estimate_kbps {
            Some(estimate_kbps) => (1.0 - alpha) * estimate_kbps + alpha * sample_kbps,
            None => sample_kbps,
        };

        // Estimate the variance of the link capacity estimate and normalize the
        // variance with the link capacity estimate.
        let norm = estimate_kbps.max(1.0);
        let error_kbps = estimate_kbps - sample_kbps;
        self.deviation_kbps =
            (1.0 - alpha) * self.deviation_kbps + alpha * error_kbps * error_kbps / norm;
        // 0.4 ~= 14 kbit/s at 500 kbit/s
        // 2.5 ~= 35 kbit/s at 500 kbit/s
        self.deviation_kbps = self.deviation_kbps.clamp(0.4, 2.5);
        self.estimate_kbps = Some(estimate_kbps);
    }

    // Max bitrate std dev given the normalized variance and the current
    // throughput.
    fn deviation_estimate_kbps(&self, estimate_kbps: f64) -> f64 {
        (self.deviation_kbps * estimate_kbps).sqrt()
    }
}

#[cfg(test)]
mod test {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn unbounded_without_estimate() {
        let estimator = LinkCapacityEstimator::new();
        assert!(!estimator.has_estimate());
        assert_eq!(estimator.upper_bound(), DataRate::infinity());
        assert_eq!(estimator.lower_bound(), DataRate::zero());
        assert_eq!(estimator.estimate(), DataRate::zero());
    }

    #[test]
    fn first_sample_seeds_estimate() {
        let mut estimator = LinkCapacityEstimator::new();
        estimator.on_overuse_detected(DataRate::from_kilobits_per_sec(500));
        assert!(estimator.has_estimate());
        assert_eq!(estimator.estimate(), DataRate::from_kilobits_per_sec(500));

        // The deviation stays at its 0.4 floor, so the bounds are
        // 500 +- 3 * sqrt(0.4 * 500).
        let spread = 3.0 * (0.4_f64 * 500.0).sqrt();
        assert_relative_eq!(
            estimator.upper_bound().kbps_float(),
            500.0 + spread,
            epsilon = 0.001
        );
        assert_relative_eq!(
            estimator.lower_bound().kbps_float(),
            500.0 - spread,
            epsilon = 0.001
        );
    }

    #[test]
    fn probe_rate_moves_estimate_faster_than_overuse() {
        let mut overuse = LinkCapacityEstimator::new();
        let mut probe = LinkCapacityEstimator::new();
        overuse.on_overuse_detected(DataRate::from_kilobits_per_sec(500));
        probe.on_overuse_detected(DataRate::from_kilobits_per_sec(500));

        overuse.on_overuse_detected(DataRate::from_kilobits_per_sec(1000));
        probe.on_probe_rate(DataRate::from_kilobits_per_sec(1000));

        assert_relative_eq!(overuse.estimate().kbps_float(), 525.0, epsilon = 0.01);
        assert_eq!(probe.estimate(), DataRate::from_kilobits_per_sec(750));
    }

    #[test]
    fn reset_clears_estimate() {
        let mut estimator = LinkCapacityEstimator::new();
        estimator.on_probe_rate(DataRate::from_kilobits_per_sec(300));
        estimator.reset();
        assert!(!estimator.has_estimate());
        assert_eq!(estimator.upper_bound(), DataRate::infinity());
    }
}

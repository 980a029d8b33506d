/*
 *  Copyright (c) 2018 The WebRTC project authors. All Rights Reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

use std::fmt;

// TimeDelta represents the difference between two timestamps. Commonly this can
// be a duration. However since two Timestamps are not guaranteed to have the
// same epoch (they might come from different computers, making exact
// synchronisation infeasible), the duration covered by a TimeDelta can be
// undefined. To simplify usage, it can be constructed and converted to
// different units, specifically seconds (s), milliseconds (ms) and
// microseconds (us).
super::relative_unit!(TimeDelta);

impl TimeDelta {
    const ONE_SIDED: bool = false;

    pub const fn from_seconds(value: i64) -> Self {
        Self::from_fraction(1_000_000, value)
    }

    pub fn from_seconds_float(value: f64) -> Self {
        Self::from_fraction_float(1_000_000.0, value)
    }

    pub const fn from_millis(value: i64) -> Self {
        Self::from_fraction(1_000, value)
    }

    pub fn from_millis_float(value: f64) -> Self {
        Self::from_fraction_float(1_000.0, value)
    }

    pub const fn from_micros(value: i64) -> Self {
        Self::from_value(value)
    }

    pub const fn seconds(&self) -> i64 {
        self.to_fraction(1_000_000)
    }

    pub fn seconds_float(&self) -> f64 {
        self.to_fraction_float(1_000_000.0)
    }

    pub const fn ms(&self) -> i64 {
        self.to_fraction(1_000)
    }

    pub fn ms_float(&self) -> f64 {
        self.to_fraction_float(1_000.0)
    }

    pub const fn us(&self) -> i64 {
        self.to_value()
    }

    pub const fn us_float(&self) -> f64 {
        self.to_value_float()
    }

    pub const fn ns(&self) -> i64 {
        self.to_multiple(1000)
    }

    pub const fn ms_or(&self, fallback_value: i64) -> i64 {
        self.to_fraction_or(1_000, fallback_value)
    }

    pub const fn us_or(&self, fallback_value: i64) -> i64 {
        self.to_value_or(fallback_value)
    }

    pub const fn abs(&self) -> Self {
        if self.us() < 0 {
            Self::from_micros(-self.us())
        } else {
            *self
        }
    }
}

impl fmt::Debug for TimeDelta {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_plus_infinity() {
            write!(f, "+inf ms")
        } else if self.is_minus_infinity() {
            write!(f, "-inf ms")
        } else if self.us() == 0 || (self.us() % 1000) != 0 {
            write!(f, "{} us", self.us())
        } else if self.ms() % 1000 != 0 {
            write!(f, "{} ms", self.ms())
        } else {
            write!(f, "{} s", self.seconds())
        }
    }
}

#[cfg(test)]
mod test {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn const_expr() {
        const VALUE: i64 = -12345;
        const TIME_DELTA_ZERO: TimeDelta = TimeDelta::zero();
        const TIME_DELTA_PLUS_INF: TimeDelta = TimeDelta::plus_infinity();
        const TIME_DELTA_MINUS_INF: TimeDelta = TimeDelta::minus_infinity();
        assert!(TIME_DELTA_ZERO.is_zero());
        assert!(TIME_DELTA_PLUS_INF.is_plus_infinity());
        assert!(TIME_DELTA_MINUS_INF.is_minus_infinity());
        assert_eq!(TIME_DELTA_PLUS_INF.ms_or(-1), -1);
        assert!(TIME_DELTA_PLUS_INF > TIME_DELTA_ZERO);

        const TIME_DELTA_SECONDS: TimeDelta = TimeDelta::from_seconds(VALUE);
        const TIME_DELTA_MS: TimeDelta = TimeDelta::from_millis(VALUE);
        const TIME_DELTA_US: TimeDelta = TimeDelta::from_micros(VALUE);
        assert_eq!(TIME_DELTA_SECONDS.seconds(), VALUE);
        assert_eq!(TIME_DELTA_MS.ms_or(0), VALUE);
        assert_eq!(TIME_DELTA_US.us_or(0), VALUE);
    }

    #[test]
    fn get_different_prefix() {
        const VALUE: i64 = 3000000;
        assert_eq!(TimeDelta::from_micros(VALUE).seconds(), VALUE / 1000000);
        assert_eq!(TimeDelta::from_millis(VALUE).seconds(), VALUE / 1000);
        assert_eq!(TimeDelta::from_micros(VALUE).ms(), VALUE / 1000);
        assert_eq!(TimeDelta::from_millis(VALUE).us(), VALUE * 1000);
        assert_eq!(TimeDelta::from_micros(VALUE).ns(), VALUE * 1000);
    }

    #[test]
    fn converts_to_and_from_double() {
        const MICROS: i64 = 17017;
        assert_relative_eq!(TimeDelta::from_micros(MICROS).seconds_float(), 0.017017);
        assert_relative_eq!(TimeDelta::from_micros(MICROS).ms_float(), 17.017);
        assert_eq!(TimeDelta::from_seconds_float(0.5).us(), 500_000);
        assert_eq!(TimeDelta::from_millis_float(2.5).us(), 2_500);
        assert_eq!(TimeDelta::from_micros(MICROS).us_float(), MICROS as f64);

        assert_eq!(TimeDelta::plus_infinity().seconds_float(), f64::INFINITY);
        assert_eq!(TimeDelta::minus_infinity().ms_float(), f64::NEG_INFINITY);
        assert!(TimeDelta::from_seconds_float(f64::INFINITY).is_plus_infinity());
    }

    #[test]
    fn math_operations() {
        const VALUE_A: i64 = 267;
        const VALUE_B: i64 = 450;
        let delta_a = TimeDelta::from_seconds(VALUE_A);
        let delta_b = TimeDelta::from_seconds(VALUE_B);
        assert_eq!((delta_a + delta_b).seconds(), VALUE_A + VALUE_B);
        assert_eq!((delta_a - delta_b).seconds(), VALUE_A - VALUE_B);
        assert_eq!((delta_b / 10).seconds(), VALUE_B / 10);
        assert_eq!(delta_b / delta_a, VALUE_B as f64 / VALUE_A as f64);
        assert_eq!(TimeDelta::from_micros(-VALUE_A).abs().us(), VALUE_A);
        assert_eq!(TimeDelta::from_micros(VALUE_A).abs().us(), VALUE_A);

        let mut mutable_delta = TimeDelta::from_millis(300);
        mutable_delta *= 2;
        assert_eq!(mutable_delta, TimeDelta::from_millis(600));
        let rtt_bounds = (TimeDelta::from_millis(10), TimeDelta::from_millis(200));
        assert_eq!(
            TimeDelta::from_millis(250).clamped(rtt_bounds.0, rtt_bounds.1),
            TimeDelta::from_millis(200)
        );
    }

    #[test]
    fn infinity_operations() {
        let finite = TimeDelta::from_millis(100);
        assert!((TimeDelta::plus_infinity() + finite).is_plus_infinity());
        assert!((TimeDelta::plus_infinity() - finite).is_plus_infinity());
        assert!((TimeDelta::minus_infinity() + finite).is_minus_infinity());
        assert!((finite - TimeDelta::plus_infinity()).is_minus_infinity());
    }
}

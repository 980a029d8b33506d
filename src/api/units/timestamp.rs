/*
 *  Copyright (c) 2018 The WebRTC project authors. All Rights Reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

//! Timestamp represents the time that has passed since some unspecified epoch.
//! The epoch is assumed to be before any represented timestamps, this means that
//! negative values are not valid. The most notable feature is that the
//! difference of two Timestamps results in a TimeDelta.
super::unit_base!(Timestamp);

use std::fmt;
use std::ops::*;

use super::TimeDelta;

impl Timestamp {
    const ONE_SIDED: bool = false;

    pub const fn from_seconds(value: i64) -> Self {
        Self::from_fraction(1_000_000, value)
    }

    pub const fn from_millis(value: i64) -> Self {
        Self::from_fraction(1_000, value)
    }

    pub const fn from_micros(value: i64) -> Self {
        Self::from_value(value)
    }

    pub const fn seconds(&self) -> i64 {
        self.to_fraction(1_000_000)
    }

    pub const fn ms(&self) -> i64 {
        self.to_fraction(1_000)
    }

    pub const fn us(&self) -> i64 {
        self.to_value()
    }
}

impl Add<TimeDelta> for Timestamp {
    type Output = Self;

    fn add(self, delta: TimeDelta) -> Self {
        if self.is_plus_infinity() || delta.is_plus_infinity() {
            assert!(!self.is_minus_infinity());
            assert!(!delta.is_minus_infinity());
            return Self::plus_infinity();
        } else if self.is_minus_infinity() || delta.is_minus_infinity() {
            assert!(!self.is_plus_infinity());
            assert!(!delta.is_plus_infinity());
            return Self::minus_infinity();
        }
        Timestamp::from_micros(self.us() + delta.us())
    }
}

impl Sub<TimeDelta> for Timestamp {
    type Output = Self;

    fn sub(self, delta: TimeDelta) -> Self {
        if self.is_plus_infinity() || delta.is_minus_infinity() {
            assert!(!self.is_minus_infinity());
            assert!(!delta.is_plus_infinity());
            return Self::plus_infinity();
        } else if self.is_minus_infinity() || delta.is_plus_infinity() {
            assert!(!self.is_plus_infinity());
            assert!(!delta.is_minus_infinity());
            return Self::minus_infinity();
        }
        Timestamp::from_micros(self.us() - delta.us())
    }
}

impl Sub for Timestamp {
    type Output = TimeDelta;

    fn sub(self, other: Self) -> TimeDelta {
        if self.is_plus_infinity() || other.is_minus_infinity() {
            assert!(!self.is_minus_infinity());
            assert!(!other.is_plus_infinity());
            return TimeDelta::plus_infinity();
        } else if self.is_minus_infinity() || other.is_plus_infinity() {
            assert!(!self.is_plus_infinity());
            assert!(!other.is_minus_infinity());
            return TimeDelta::minus_infinity();
        }
        TimeDelta::from_micros(self.us() - other.us())
    }
}

impl AddAssign<TimeDelta> for Timestamp {
    fn add_assign(&mut self, delta: TimeDelta) {
        *self = *self + delta;
    }
}

impl SubAssign<TimeDelta> for Timestamp {
    fn sub_assign(&mut self, delta: TimeDelta) {
        *self = *self - delta;
    }
}

impl fmt::Debug for Timestamp {
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
    use super::*;

    #[test]
    fn unit_conversions() {
        const VALUE: i64 = 3_000_000;
        assert_eq!(Timestamp::from_millis(499).ms(), 499);
        assert_eq!(Timestamp::from_micros(VALUE).seconds(), 3);
        assert_eq!(Timestamp::from_micros(VALUE).ms(), 3_000);
        assert_eq!(Timestamp::from_seconds(7).us(), 7_000_000);
        // Rounds to nearest.
        assert_eq!(Timestamp::from_micros(1_500).ms(), 2);
        assert_eq!(Timestamp::from_micros(1_499).ms(), 1);
    }

    #[test]
    fn finite_and_infinite() {
        assert!(Timestamp::plus_infinity().is_plus_infinity());
        assert!(Timestamp::minus_infinity().is_minus_infinity());
        assert!(!Timestamp::minus_infinity().is_finite());
        assert!(Timestamp::from_millis(3000).is_finite());
        assert!(Timestamp::plus_infinity() > Timestamp::from_seconds(1_000_000));
        assert!(Timestamp::minus_infinity() < Timestamp::zero());
        assert!(Timestamp::from_millis(450) < Timestamp::from_millis(451));
    }

    #[test]
    fn difference_is_time_delta() {
        let feedback = Timestamp::from_millis(1_450);
        let last_update = Timestamp::from_millis(1_267);
        assert_eq!(feedback - last_update, TimeDelta::from_millis(183));
        assert_eq!(last_update - feedback, TimeDelta::from_millis(-183));

        let mut at = last_update;
        at += TimeDelta::from_millis(183);
        assert_eq!(at, feedback);
        at -= TimeDelta::from_seconds(1);
        assert_eq!(at, Timestamp::from_millis(450));
    }

    #[test]
    fn never_updated_time_saturates() {
        let never = Timestamp::minus_infinity();
        let now = Timestamp::from_seconds(10);
        assert!((now - never).is_plus_infinity());
        assert!((never - now).is_minus_infinity());
        assert!((never + TimeDelta::from_seconds(5)).is_minus_infinity());
        assert!((now + TimeDelta::plus_infinity()).is_plus_infinity());
    }

    #[test]
    fn debug_picks_coarsest_exact_unit() {
        assert_eq!(format!("{:?}", Timestamp::from_seconds(2)), "2 s");
        assert_eq!(format!("{:?}", Timestamp::from_millis(1_250)), "1250 ms");
        assert_eq!(format!("{:?}", Timestamp::from_micros(17)), "17 us");
        assert_eq!(format!("{:?}", Timestamp::plus_infinity()), "+inf ms");
    }
}

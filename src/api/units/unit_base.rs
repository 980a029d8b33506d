/*
 *  Copyright (c) 2018 The WebRTC project authors. All Rights Reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

// Unit types share their storage and infinity handling through these macros,
// as traits can't provide const constructors.
//
// Each user must define `const ONE_SIDED: bool`; one sided units reject
// negative values.
macro_rules! unit_base {
    ($ty:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $ty(i64);

        #[allow(dead_code)]
        impl $ty {
            pub const fn zero() -> Self {
                Self(0)
            }

            pub const fn plus_infinity() -> Self {
                Self(i64::MAX)
            }

            pub const fn minus_infinity() -> Self {
                Self(i64::MIN)
            }

            pub const fn is_zero(&self) -> bool {
                self.0 == 0
            }

            pub const fn is_finite(&self) -> bool {
                !self.is_infinite()
            }

            pub const fn is_infinite(&self) -> bool {
                self.0 == i64::MAX || self.0 == i64::MIN
            }

            pub const fn is_plus_infinity(&self) -> bool {
                self.0 == i64::MAX
            }

            pub const fn is_minus_infinity(&self) -> bool {
                self.0 == i64::MIN
            }

            const fn from_fraction(denominator: i64, value: i64) -> Self {
                assert!(denominator >= 0);
                Self::from_value(value * denominator)
            }

            fn from_fraction_float(denominator: f64, value: f64) -> Self {
                Self::from_value_float(value * denominator)
            }

            const fn to_fraction(&self, denominator: i64) -> i64 {
                self.divide_round_to_nearest(denominator)
            }

            const fn divide_round_to_nearest(&self, d: i64) -> i64 {
                assert!(d > 0);
                let v = self.to_value();
                let mut result = v / d;
                let remainder = v % d;
                if remainder.abs() * 2 >= d {
                    if v < 0 {
                        result -= 1;
                    } else {
                        result += 1;
                    }
                }
                result
            }

            fn to_fraction_float(&self, denominator: f64) -> f64 {
                assert!(denominator > 0.0);
                self.to_value_float() / denominator
            }

            const fn to_fraction_or(&self, denominator: i64, fallback_value: i64) -> i64 {
                if self.is_finite() {
                    self.divide_round_to_nearest(denominator)
                } else {
                    fallback_value
                }
            }

            const fn to_multiple(&self, factor: i64) -> i64 {
                assert!(factor >= 0);
                self.to_value() * factor
            }

            fn to_multiple_float(&self, factor: f64) -> f64 {
                assert!(factor >= 0.0);
                self.to_value_float() * factor
            }

            const fn from_value(value: i64) -> Self {
                assert!(value != i64::MAX && value != i64::MIN);
                if Self::ONE_SIDED {
                    assert!(value >= 0);
                }
                Self(value)
            }

            fn from_value_float(value: f64) -> Self {
                assert!(!value.is_nan());
                if value == f64::INFINITY {
                    return Self::plus_infinity();
                }
                if Self::ONE_SIDED {
                    assert!(value >= 0.0);
                }
                if value == f64::NEG_INFINITY {
                    Self::minus_infinity()
                } else {
                    Self(value as i64)
                }
            }

            const fn to_value(&self) -> i64 {
                assert!(self.is_finite());
                self.0
            }

            const fn to_value_or(&self, fallback_value: i64) -> i64 {
                if self.is_finite() {
                    self.0
                } else {
                    fallback_value
                }
            }

            const fn to_value_float(&self) -> f64 {
                if self.is_plus_infinity() {
                    f64::INFINITY
                } else if self.is_minus_infinity() {
                    f64::NEG_INFINITY
                } else {
                    self.0 as f64
                }
            }
        }
    };
}

// A unit that can be added, subtracted and scaled, as opposed to Timestamp.
macro_rules! relative_unit {
    ($ty:ident) => {
        crate::api::units::unit_base!($ty);

        #[allow(dead_code)]
        impl $ty {
            pub fn clamped(&self, min_value: Self, max_value: Self) -> Self {
                Self(self.0.max(min_value.0).min(max_value.0))
            }
        }

        impl ::std::ops::Add for $ty {
            type Output = Self;

            fn add(self, rhs: Self) -> Self {
                if self.is_plus_infinity() || rhs.is_plus_infinity() {
                    assert!(!self.is_minus_infinity());
                    assert!(!rhs.is_minus_infinity());
                    return Self::plus_infinity();
                } else if self.is_minus_infinity() || rhs.is_minus_infinity() {
                    assert!(!self.is_plus_infinity());
                    assert!(!rhs.is_plus_infinity());
                    return Self::minus_infinity();
                }
                Self::from_value(self.to_value() + rhs.to_value())
            }
        }

        impl ::std::ops::Sub for $ty {
            type Output = Self;

            fn sub(self, rhs: Self) -> Self {
                if self.is_plus_infinity() || rhs.is_minus_infinity() {
                    assert!(!self.is_minus_infinity());
                    assert!(!rhs.is_plus_infinity());
                    return Self::plus_infinity();
                } else if self.is_minus_infinity() || rhs.is_plus_infinity() {
                    assert!(!self.is_plus_infinity());
                    assert!(!rhs.is_minus_infinity());
                    return Self::minus_infinity();
                }
                Self::from_value(self.to_value() - rhs.to_value())
            }
        }

        impl ::std::ops::AddAssign for $ty {
            fn add_assign(&mut self, rhs: Self) {
                *self = *self + rhs;
            }
        }

        impl ::std::ops::SubAssign for $ty {
            fn sub_assign(&mut self, rhs: Self) {
                *self = *self - rhs;
            }
        }

        impl ::std::ops::Div for $ty {
            type Output = f64;

            fn div(self, rhs: Self) -> f64 {
                self.to_value_float() / rhs.to_value_float()
            }
        }

        impl ::std::ops::Div<f64> for $ty {
            type Output = Self;

            fn div(self, rhs: f64) -> Self {
                Self::from_value_float((self.to_value_float() / rhs).round())
            }
        }

        impl ::std::ops::Div<i64> for $ty {
            type Output = Self;

            fn div(self, rhs: i64) -> Self {
                Self::from_value(self.to_value() / rhs)
            }
        }

        impl ::std::ops::Mul<f64> for $ty {
            type Output = Self;

            fn mul(self, rhs: f64) -> Self {
                Self::from_value_float((self.to_value_float() * rhs).round())
            }
        }

        impl ::std::ops::Mul<i64> for $ty {
            type Output = Self;

            fn mul(self, rhs: i64) -> Self {
                Self::from_value(self.to_value() * rhs)
            }
        }

        impl ::std::ops::MulAssign<i64> for $ty {
            fn mul_assign(&mut self, rhs: i64) {
                *self = *self * rhs;
            }
        }

        impl ::std::ops::Neg for $ty {
            type Output = Self;

            fn neg(self) -> Self {
                if self.is_plus_infinity() {
                    Self::minus_infinity()
                } else if self.is_minus_infinity() {
                    Self::plus_infinity()
                } else {
                    Self::from_value(-self.to_value())
                }
            }
        }

        impl ::std::ops::Mul<$ty> for i64 {
            type Output = $ty;

            fn mul(self, rhs: $ty) -> $ty {
                rhs * self
            }
        }

        impl ::std::ops::Mul<$ty> for f64 {
            type Output = $ty;

            fn mul(self, rhs: $ty) -> $ty {
                rhs * self
            }
        }
    };
}

pub(crate) use relative_unit;
pub(crate) use unit_base;

#[cfg(test)]
mod test {
    use std::fmt;

    use approx::assert_relative_eq;

    relative_unit!(TestUnit);

    impl TestUnit {
        const ONE_SIDED: bool = false;

        const fn from_kilo(kilo: i64) -> Self {
            Self::from_fraction(1000, kilo)
        }

        fn from_kilo_float(kilo: f64) -> Self {
            Self::from_fraction_float(1000.0, kilo)
        }

        const fn kilo(&self) -> i64 {
            self.to_fraction(1000)
        }

        fn kilo_float(&self) -> f64 {
            self.to_fraction_float(1000.0)
        }

        fn milli_float(&self) -> f64 {
            self.to_multiple_float(1000.0)
        }
    }

    impl fmt::Debug for TestUnit {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "{}", self.to_value_float())
        }
    }

    #[test]
    fn const_expr() {
        const VALUE: i64 = -12345;
        const ZERO: TestUnit = TestUnit::zero();
        const PLUS_INF: TestUnit = TestUnit::plus_infinity();
        const KILO: TestUnit = TestUnit::from_kilo(VALUE);

        assert!(ZERO.is_zero());
        assert!(PLUS_INF.is_plus_infinity());
        assert_eq!(PLUS_INF.to_fraction_or(1000, -1), -1);
        assert!(PLUS_INF > ZERO);
        assert_eq!(KILO.kilo(), VALUE);
        assert_eq!(TestUnit::from_value(500) / 2, TestUnit::from_value(250));
    }

    #[test]
    fn rounds_to_nearest_when_converting_to_fractions() {
        assert_eq!(TestUnit::from_value(1499).kilo(), 1);
        assert_eq!(TestUnit::from_value(1500).kilo(), 2);
        assert_eq!(TestUnit::from_value(-1500).kilo(), -2);
        assert_eq!(TestUnit::from_value(-1499).kilo(), -1);
    }

    #[test]
    fn converts_to_and_from_double() {
        const VALUE: i64 = 17017;
        assert_eq!(TestUnit::from_value(VALUE).kilo_float(), VALUE as f64 * 1e-3);
        assert_eq!(TestUnit::from_kilo_float(VALUE as f64 * 1e-3).to_value(), VALUE);
        assert_relative_eq!(
            TestUnit::from_value(VALUE).milli_float(),
            VALUE as f64 * 1e3,
            epsilon = 1.0
        );
        assert_eq!(TestUnit::plus_infinity().kilo_float(), f64::INFINITY);
        assert_eq!(TestUnit::minus_infinity().kilo_float(), f64::NEG_INFINITY);
        assert!(TestUnit::from_kilo_float(f64::INFINITY).is_plus_infinity());
        assert!(TestUnit::from_kilo_float(f64::NEG_INFINITY).is_minus_infinity());
    }

    #[test]
    #[should_panic]
    fn crashes_when_created_from_nan() {
        TestUnit::from_value_float(f64::NAN);
    }

    #[test]
    fn clamping() {
        let lower = TestUnit::from_value(100);
        let upper = TestUnit::from_value(800);
        assert_eq!(TestUnit::from_value(50).clamped(lower, upper), lower);
        assert_eq!(TestUnit::from_value(500).clamped(lower, upper), TestUnit::from_value(500));

        assert_eq!(TestUnit::from_value(1000).clamped(lower, upper), upper);
        assert_eq!(TestUnit::plus_infinity().clamped(lower, upper), upper);
        assert_eq!(TestUnit::minus_infinity().clamped(lower, upper), lower);
    }

    #[test]
    fn math_operations() {
        let a = TestUnit::from_kilo(267);
        let b = TestUnit::from_kilo(450);
        assert_eq!((a + b).kilo(), 717);
        assert_eq!((a - b).kilo(), -183);
        assert_eq!((TestUnit::from_value(267) * 450).to_value(), 267 * 450);
        assert_eq!((TestUnit::from_value(267) * 1.5).to_value(), 401);
        assert_eq!(b / a, 450.0 / 267.0);

        let mut value = a;
        value += b;
        assert_eq!(value, TestUnit::from_kilo(717));
        value -= b;
        assert_eq!(value, a);
        value *= 2;
        assert_eq!(value, TestUnit::from_kilo(534));

        // Integer division rounds towards zero.
        assert_eq!(TestUnit::from_value(789) / 10, TestUnit::from_value(78));
        assert_eq!(TestUnit::from_value(-789) / 10, TestUnit::from_value(-78));
    }

    #[test]
    fn infinity_operations() {
        let finite = TestUnit::from_value(267);
        assert!((TestUnit::plus_infinity() + finite).is_plus_infinity());
        assert!((finite - TestUnit::minus_infinity()).is_plus_infinity());
        assert!((TestUnit::minus_infinity() + finite).is_minus_infinity());
        assert!((finite - TestUnit::plus_infinity()).is_minus_infinity());
        assert_eq!(-TestUnit::plus_infinity(), TestUnit::minus_infinity());
    }
}

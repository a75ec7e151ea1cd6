use crate::eval::Choice;

/// Stores a range, with conservative calculations to guarantee that it always
/// contains the actual value.
///
/// # Warning
/// This implementation does not set rounding modes, so it may not be _perfect_.
#[derive(Copy, Clone, PartialEq)]
#[repr(C)]
pub struct Interval {
    lower: f32,
    upper: f32,
}

impl std::fmt::Debug for Interval {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> Result<(), std::fmt::Error> {
        f.debug_tuple("")
            .field(&self.lower)
            .field(&self.upper)
            .finish()
    }
}

impl Interval {
    /// Builds a new interval
    ///
    /// There are two kinds of valid interval:
    /// - `[lower, upper]` where `lower <= upper`
    /// - `[NaN, NaN]`
    ///
    /// # Panics
    /// Panics if the resulting interval would be invalid
    #[inline]
    pub fn new(lower: f32, upper: f32) -> Self {
        assert!(
            upper >= lower || (lower.is_nan() && upper.is_nan()),
            "invalid interval [{lower}, {upper}]"
        );
        Self { lower, upper }
    }

    /// Builds an interval from bounds that may have picked up a `NaN`
    ///
    /// Arithmetic on infinite bounds (e.g. `inf - inf`) can poison a single
    /// bound; the result is then widened to the `NaN` interval.
    #[inline]
    fn from_bounds(lower: f32, upper: f32) -> Self {
        if lower.is_nan() || upper.is_nan() {
            f32::NAN.into()
        } else {
            Interval::new(lower, upper)
        }
    }

    /// Returns the lower bound of the interval
    #[inline]
    pub fn lower(&self) -> f32 {
        self.lower
    }
    /// Returns the upper bound of the interval
    #[inline]
    pub fn upper(&self) -> f32 {
        self.upper
    }
    /// Returns `true` if either bound of the interval is `NaN`
    pub fn has_nan(&self) -> bool {
        self.lower.is_nan() || self.upper.is_nan()
    }
    /// Calculates the absolute value of the interval
    pub fn abs(self) -> Self {
        if self.lower < 0.0 {
            if self.upper > 0.0 {
                Interval::new(0.0, self.upper.max(-self.lower))
            } else {
                Interval::new(-self.upper, -self.lower)
            }
        } else {
            self
        }
    }
    /// Squares the interval
    ///
    /// Note that this has tighter bounds than multiplication, because we know
    /// that both sides of the multiplication are the same value.
    pub fn square(self) -> Self {
        if self.upper < 0.0 {
            Interval::new(self.upper.powi(2), self.lower.powi(2))
        } else if self.lower > 0.0 {
            Interval::new(self.lower.powi(2), self.upper.powi(2))
        } else if self.has_nan() {
            f32::NAN.into()
        } else {
            Interval::new(0.0, self.lower.abs().max(self.upper.abs()).powi(2))
        }
    }
    /// Computes the sine of the interval
    ///
    /// Right now, this always returns the maximum range of `[-1, 1]`
    pub fn sin(self) -> Self {
        if self.has_nan() {
            f32::NAN.into()
        } else {
            Interval::new(-1.0, 1.0)
        }
    }
    /// Computes the cosine of the interval
    ///
    /// Right now, this always returns the maximum range of `[-1, 1]`
    pub fn cos(self) -> Self {
        if self.has_nan() {
            f32::NAN.into()
        } else {
            Interval::new(-1.0, 1.0)
        }
    }
    /// Computes the arcsine of the interval
    ///
    /// Returns the `NAN` interval if the input is invalid
    pub fn asin(self) -> Self {
        if self.lower < -1.0 || self.upper > 1.0 {
            f32::NAN.into()
        } else {
            Interval::from_bounds(self.lower.asin(), self.upper.asin())
        }
    }
    /// Computes the arccosine of the interval
    ///
    /// Returns the `NAN` interval if the input is invalid
    pub fn acos(self) -> Self {
        if self.lower < -1.0 || self.upper > 1.0 {
            f32::NAN.into()
        } else {
            Interval::from_bounds(self.upper.acos(), self.lower.acos())
        }
    }
    /// Computes the arctangent of the interval
    pub fn atan(self) -> Self {
        Interval::from_bounds(self.lower.atan(), self.upper.atan())
    }
    /// Computes the exponent function applied to the interval
    pub fn exp(self) -> Self {
        Interval::from_bounds(self.lower.exp(), self.upper.exp())
    }
    /// Computes the natural log of the input interval
    ///
    /// Returns the `NAN` interval if the input contains zero
    pub fn ln(self) -> Self {
        if self.lower <= 0.0 || self.has_nan() {
            f32::NAN.into()
        } else {
            Interval::new(self.lower.ln(), self.upper.ln())
        }
    }
    /// Calculates the square root of the interval
    ///
    /// If the interval contains values below 0, returns a `NAN` interval.
    pub fn sqrt(self) -> Self {
        if self.lower < 0.0 || self.has_nan() {
            f32::NAN.into()
        } else {
            Interval::new(self.lower.sqrt(), self.upper.sqrt())
        }
    }
    /// Calculates the minimum of two intervals
    ///
    /// Returns both the result and a [`Choice`] indicating whether one side is
    /// always less than the other.
    ///
    /// If either side is `NAN`, returns the `NAN` interval and `Choice::Both`.
    pub fn min_choice(self, rhs: Self) -> (Self, Choice) {
        if self.has_nan() || rhs.has_nan() {
            return (f32::NAN.into(), Choice::Both);
        }
        let choice = if self.upper < rhs.lower {
            Choice::Left
        } else if rhs.upper < self.lower {
            Choice::Right
        } else {
            Choice::Both
        };
        (
            Interval::new(self.lower.min(rhs.lower), self.upper.min(rhs.upper)),
            choice,
        )
    }
    /// Calculates the maximum of two intervals
    ///
    /// Returns both the result and a [`Choice`] indicating whether one side is
    /// always greater than the other.
    ///
    /// If either side is `NAN`, returns the `NAN` interval and `Choice::Both`.
    pub fn max_choice(self, rhs: Self) -> (Self, Choice) {
        if self.has_nan() || rhs.has_nan() {
            return (f32::NAN.into(), Choice::Both);
        }
        let choice = if self.lower > rhs.upper {
            Choice::Left
        } else if rhs.lower > self.upper {
            Choice::Right
        } else {
            Choice::Both
        };
        (
            Interval::new(self.lower.max(rhs.lower), self.upper.max(rhs.upper)),
            choice,
        )
    }

    /// Linear interpolation from `lower` to `upper`
    ///
    /// ```
    /// # use mpr::types::Interval;
    /// let a = Interval::new(0.0, 2.0);
    /// assert_eq!(a.lerp(0.5), 1.0);
    /// assert_eq!(a.lerp(0.75), 1.5);
    /// ```
    pub fn lerp(self, frac: f32) -> f32 {
        self.lower * (1.0 - frac) + self.upper * frac
    }

    /// Calculates the width of the interval
    ///
    /// ```
    /// # use mpr::types::Interval;
    /// let a = Interval::new(2.0, 5.0);
    /// assert_eq!(a.width(), 3.0);
    /// ```
    pub fn width(self) -> f32 {
        self.upper - self.lower
    }

    /// Finds the min and max of four candidate bounds
    fn hull(out: [f32; 4]) -> Self {
        let mut lower = out[0];
        let mut upper = out[0];
        for &v in &out[1..] {
            lower = lower.min(v);
            upper = upper.max(v);
        }
        Interval::from_bounds(lower, upper)
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.lower, self.upper)
    }
}

impl From<[f32; 2]> for Interval {
    fn from(i: [f32; 2]) -> Interval {
        Interval::new(i[0], i[1])
    }
}

impl From<f32> for Interval {
    fn from(f: f32) -> Self {
        Interval::new(f, f)
    }
}

impl std::ops::Add<Interval> for Interval {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Interval::from_bounds(self.lower + rhs.lower, self.upper + rhs.upper)
    }
}

impl std::ops::Mul<Interval> for Interval {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        if self.has_nan() || rhs.has_nan() {
            return f32::NAN.into();
        }
        let mut out = [0.0; 4];
        let mut k = 0;
        for i in [self.lower, self.upper] {
            for j in [rhs.lower, rhs.upper] {
                out[k] = i * j;
                k += 1;
            }
        }
        Interval::hull(out)
    }
}

impl std::ops::Mul<f32> for Interval {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        if self.has_nan() || rhs.is_nan() {
            f32::NAN.into()
        } else if rhs < 0.0 {
            Interval::from_bounds(self.upper * rhs, self.lower * rhs)
        } else {
            Interval::from_bounds(self.lower * rhs, self.upper * rhs)
        }
    }
}

impl std::ops::Div<Interval> for Interval {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        if self.has_nan() {
            return f32::NAN.into();
        }
        if rhs.lower > 0.0 || rhs.upper < 0.0 {
            let mut out = [0.0; 4];
            let mut k = 0;
            for i in [self.lower, self.upper] {
                for j in [rhs.lower, rhs.upper] {
                    out[k] = i / j;
                    k += 1;
                }
            }
            Interval::hull(out)
        } else {
            f32::NAN.into()
        }
    }
}

impl std::ops::Sub<Interval> for Interval {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Interval::from_bounds(self.lower - rhs.upper, self.upper - rhs.lower)
    }
}

impl std::ops::Neg for Interval {
    type Output = Self;
    fn neg(self) -> Self {
        Interval::new(-self.upper, -self.lower)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_interval() {
        let a = Interval::new(0.0, 1.0);
        let b = Interval::new(0.5, 1.5);
        let (v, c) = a.min_choice(b);
        assert_eq!(v, [0.0, 1.0].into());
        assert_eq!(c, Choice::Both);
    }

    #[test]
    fn test_min_max_choice() {
        let a = Interval::new(-2.0, -1.0);
        let b = Interval::new(1.0, 3.0);
        assert_eq!(a.min_choice(b), ([-2.0, -1.0].into(), Choice::Left));
        assert_eq!(b.min_choice(a), ([-2.0, -1.0].into(), Choice::Right));
        assert_eq!(a.max_choice(b), ([1.0, 3.0].into(), Choice::Right));
        assert_eq!(b.max_choice(a), ([1.0, 3.0].into(), Choice::Left));

        // Touching intervals are ambiguous
        let c = Interval::new(-1.0, 0.0);
        assert_eq!(a.min_choice(c).1, Choice::Both);

        let (v, c) = a.min_choice(f32::NAN.into());
        assert!(v.has_nan());
        assert_eq!(c, Choice::Both);
    }

    #[test]
    fn test_infinite_bounds() {
        let a = Interval::new(f32::NEG_INFINITY, 0.0);
        let b = Interval::new(f32::INFINITY, f32::INFINITY);
        assert!((a + b).has_nan());
        assert!((b - b).has_nan());
        let z = Interval::new(0.0, 0.0);
        let v = z * b;
        assert!(v.has_nan());
    }

    #[test]
    fn test_square_abs() {
        let a = Interval::new(-2.0, 1.0);
        assert_eq!(a.square(), [0.0, 4.0].into());
        assert_eq!(a.abs(), [0.0, 2.0].into());
        let b = Interval::new(-3.0, -2.0);
        assert_eq!(b.square(), [4.0, 9.0].into());
        assert_eq!(b.abs(), [2.0, 3.0].into());
    }

    #[test]
    fn test_div() {
        let a = Interval::new(1.0, 2.0);
        let b = Interval::new(-1.0, 1.0);
        assert!((a / b).has_nan());
        let c = Interval::new(2.0, 4.0);
        assert_eq!(a / c, [0.25, 1.0].into());
    }
}

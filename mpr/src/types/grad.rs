/// A point in space with associated partial derivatives.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[repr(C)]
pub struct Grad {
    /// Value of the distance field at this point
    pub v: f32,
    /// Partial derivative with respect to `x`
    pub dx: f32,
    /// Partial derivative with respect to `y`
    pub dy: f32,
    /// Partial derivative with respect to `z`
    pub dz: f32,
}

impl std::fmt::Display for Grad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {}, {})", self.v, self.dx, self.dy, self.dz)
    }
}

impl Grad {
    /// Constructs a new gradient
    pub fn new(v: f32, dx: f32, dy: f32, dz: f32) -> Self {
        Self { v, dx, dy, dz }
    }

    /// Returns the vector of partial derivatives
    pub fn partials(&self) -> nalgebra::Vector3<f32> {
        nalgebra::Vector3::new(self.dx, self.dy, self.dz)
    }

    /// Returns the normalized gradient, or `None` if it is zero or invalid
    pub fn normalized(&self) -> Option<nalgebra::Vector3<f32>> {
        let n = self.partials();
        let s = n.norm();
        if s > 0.0 && s.is_finite() {
            Some(n / s)
        } else {
            None
        }
    }

    /// Applies a unary function by the chain rule
    ///
    /// `v` is the function's value at `self.v` and `d` is its derivative
    /// there; every partial is scaled by `d`.
    #[inline]
    fn chain(self, v: f32, d: f32) -> Self {
        Grad {
            v,
            dx: self.dx * d,
            dy: self.dy * d,
            dz: self.dz * d,
        }
    }

    /// Absolute value
    pub fn abs(self) -> Self {
        if self.v < 0.0 { self.chain(-self.v, -1.0) } else { self }
    }

    /// Square
    pub fn square(self) -> Self {
        self.chain(self.v * self.v, 2.0 * self.v)
    }

    /// Square root
    pub fn sqrt(self) -> Self {
        let v = self.v.sqrt();
        self.chain(v, 0.5 / v)
    }

    /// Sine
    pub fn sin(self) -> Self {
        self.chain(self.v.sin(), self.v.cos())
    }

    /// Cosine
    pub fn cos(self) -> Self {
        self.chain(self.v.cos(), -self.v.sin())
    }

    /// Arcsine; the partials are infinite at `±1`
    pub fn asin(self) -> Self {
        let r = (1.0 - self.v * self.v).sqrt();
        self.chain(self.v.asin(), 1.0 / r)
    }

    /// Arccosine; the partials are infinite at `±1`
    pub fn acos(self) -> Self {
        let r = (1.0 - self.v * self.v).sqrt();
        self.chain(self.v.acos(), -1.0 / r)
    }

    /// Arctangent
    pub fn atan(self) -> Self {
        self.chain(self.v.atan(), 1.0 / (self.v * self.v + 1.0))
    }

    /// Exponential
    pub fn exp(self) -> Self {
        let v = self.v.exp();
        self.chain(v, v)
    }

    /// Natural log
    pub fn ln(self) -> Self {
        self.chain(self.v.ln(), 1.0 / self.v)
    }

    /// Minimum of two values
    pub fn min(self, rhs: Self) -> Self {
        if self.v < rhs.v { self } else { rhs }
    }

    /// Maximum of two values
    pub fn max(self, rhs: Self) -> Self {
        if self.v > rhs.v { self } else { rhs }
    }

    /// Checks that the two values are roughly equal, panicking otherwise
    #[cfg(test)]
    pub(crate) fn compare_eq(&self, other: Self) {
        let d = (self.v - other.v)
            .abs()
            .max((self.dx - other.dx).abs())
            .max((self.dy - other.dy).abs())
            .max((self.dz - other.dz).abs());
        if d >= 1e-6 {
            panic!("lhs != rhs ({self:?} != {other:?})");
        }
    }
}

impl From<f32> for Grad {
    fn from(v: f32) -> Self {
        Grad {
            v,
            dx: 0.0,
            dy: 0.0,
            dz: 0.0,
        }
    }
}

impl std::ops::Add<Grad> for Grad {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Grad {
            v: self.v + rhs.v,
            dx: self.dx + rhs.dx,
            dy: self.dy + rhs.dy,
            dz: self.dz + rhs.dz,
        }
    }
}

impl std::ops::Mul<Grad> for Grad {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self {
            v: self.v * rhs.v,
            dx: self.v * rhs.dx + rhs.v * self.dx,
            dy: self.v * rhs.dy + rhs.v * self.dy,
            dz: self.v * rhs.dz + rhs.v * self.dz,
        }
    }
}

impl std::ops::Div<Grad> for Grad {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let d = rhs.v.powi(2);
        Self {
            v: self.v / rhs.v,
            dx: (rhs.v * self.dx - self.v * rhs.dx) / d,
            dy: (rhs.v * self.dy - self.v * rhs.dy) / d,
            dz: (rhs.v * self.dz - self.v * rhs.dz) / d,
        }
    }
}

impl std::ops::Sub<Grad> for Grad {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            v: self.v - rhs.v,
            dx: self.dx - rhs.dx,
            dy: self.dy - rhs.dy,
            dz: self.dz - rhs.dz,
        }
    }
}

impl std::ops::Neg for Grad {
    type Output = Self;
    fn neg(self) -> Self {
        self.chain(-self.v, -1.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_grad_chain() {
        // d/dx (x^2 + 1) at x = 3
        let x = Grad::new(3.0, 1.0, 0.0, 0.0);
        let v = x.square() + Grad::from(1.0);
        v.compare_eq(Grad::new(10.0, 6.0, 0.0, 0.0));

        // d/dy (y * y) / y == 1
        let y = Grad::new(2.0, 0.0, 1.0, 0.0);
        let v = (y * y) / y;
        v.compare_eq(Grad::new(2.0, 0.0, 1.0, 0.0));
    }

    #[test]
    fn test_grad_unary() {
        let x = Grad::new(0.5, 1.0, 0.0, 0.0);
        x.sin().compare_eq(Grad::new(0.5f32.sin(), 0.5f32.cos(), 0.0, 0.0));
        x.exp().compare_eq(Grad::new(0.5f32.exp(), 0.5f32.exp(), 0.0, 0.0));
        x.ln().compare_eq(Grad::new(0.5f32.ln(), 2.0, 0.0, 0.0));
        x.atan().compare_eq(Grad::new(0.5f32.atan(), 0.8, 0.0, 0.0));
        (-x).abs().compare_eq(x);

        // Scaling by the chain rule leaves the direction unchanged
        let y = Grad::new(4.0, 0.0, 2.0, 1.0);
        let s = y.sqrt();
        s.compare_eq(Grad::new(2.0, 0.0, 0.5, 0.25));
        approx::assert_relative_eq!(
            s.normalized().unwrap(),
            y.normalized().unwrap()
        );
        assert_eq!(y.partials(), nalgebra::Vector3::new(0.0, 2.0, 1.0));
    }

    #[test]
    fn test_grad_min_max() {
        let a = Grad::new(1.0, 1.0, 0.0, 0.0);
        let b = Grad::new(2.0, 0.0, 1.0, 0.0);
        assert_eq!(a.min(b), a);
        assert_eq!(a.max(b), b);
    }

    #[test]
    fn test_normalized() {
        let g = Grad::new(0.0, 3.0, 0.0, 4.0);
        let n = g.normalized().unwrap();
        approx::assert_relative_eq!(n.x, 0.6);
        approx::assert_relative_eq!(n.z, 0.8);
        assert!(Grad::from(1.0).normalized().is_none());
        assert!(Grad::new(0.0, f32::NAN, 0.0, 0.0).normalized().is_none());
    }
}

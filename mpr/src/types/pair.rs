/// Two independent `f32` samples evaluated in lockstep
///
/// The voxel stage evaluates voxels in pairs along the Z axis, so that each
/// pass through the tape does twice as much work per instruction dispatch.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Pair(pub [f32; 2]);

impl Pair {
    /// Builds a new pair
    pub fn new(a: f32, b: f32) -> Self {
        Self([a, b])
    }

    /// Applies a function to both lanes
    #[inline]
    pub fn map<F: Fn(f32) -> f32>(self, f: F) -> Self {
        Self([f(self.0[0]), f(self.0[1])])
    }

    /// Applies a binary function to matching lanes
    #[inline]
    pub fn zip<F: Fn(f32, f32) -> f32>(self, rhs: Self, f: F) -> Self {
        Self([f(self.0[0], rhs.0[0]), f(self.0[1], rhs.0[1])])
    }
}

impl From<f32> for Pair {
    fn from(v: f32) -> Self {
        Self([v; 2])
    }
}

impl std::ops::Index<usize> for Pair {
    type Output = f32;
    fn index(&self, i: usize) -> &f32 {
        &self.0[i]
    }
}

macro_rules! impl_pair_binary {
    ($op:ident, $fn:ident) => {
        impl std::ops::$op<Pair> for Pair {
            type Output = Self;
            #[inline]
            fn $fn(self, rhs: Self) -> Self {
                self.zip(rhs, |a, b| std::ops::$op::$fn(a, b))
            }
        }
    };
}

impl_pair_binary!(Add, add);
impl_pair_binary!(Sub, sub);
impl_pair_binary!(Mul, mul);
impl_pair_binary!(Div, div);

impl std::ops::Neg for Pair {
    type Output = Self;
    fn neg(self) -> Self {
        self.map(|v| -v)
    }
}

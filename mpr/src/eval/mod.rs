//! Tape interpreter, generic over the value type
//!
//! The same interpreter runs the interval stage (with [`Interval`]), the
//! voxel stage (with [`Pair`]), and the normal stage (with [`Grad`]); single
//! points can be evaluated with `f32`.
use crate::{
    Error,
    tape::{Op, SLOT_COUNT, TapeData, data::jump},
    types::{Grad, Interval, Pair},
};

/// Represents a single choice made at a min/max node
///
/// `Left` and `Right` mean that the corresponding operand always wins;
/// `Both` means that either may win, so the instruction must be kept.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[repr(u8)]
pub enum Choice {
    #[default]
    Both = 0,
    Left = 1,
    Right = 2,
}

/// Value type which can be pushed through the interpreter
pub trait EvalValue:
    Copy
    + From<f32>
    + std::ops::Add<Output = Self>
    + std::ops::Sub<Output = Self>
    + std::ops::Mul<Output = Self>
    + std::ops::Div<Output = Self>
    + std::ops::Neg<Output = Self>
{
    /// Whether the interpreter should record choices for this type
    const TRACK_CHOICES: bool = false;

    #[allow(missing_docs)]
    fn abs(self) -> Self;
    #[allow(missing_docs)]
    fn square(self) -> Self;
    #[allow(missing_docs)]
    fn sqrt(self) -> Self;
    #[allow(missing_docs)]
    fn sin(self) -> Self;
    #[allow(missing_docs)]
    fn cos(self) -> Self;
    #[allow(missing_docs)]
    fn asin(self) -> Self;
    #[allow(missing_docs)]
    fn acos(self) -> Self;
    #[allow(missing_docs)]
    fn atan(self) -> Self;
    #[allow(missing_docs)]
    fn exp(self) -> Self;
    #[allow(missing_docs)]
    fn ln(self) -> Self;

    /// Minimum of two values, with the operand that won
    fn min_choice(self, rhs: Self) -> (Self, Choice);
    /// Maximum of two values, with the operand that won
    fn max_choice(self, rhs: Self) -> (Self, Choice);
}

impl EvalValue for Interval {
    const TRACK_CHOICES: bool = true;

    fn abs(self) -> Self {
        Interval::abs(self)
    }
    fn square(self) -> Self {
        Interval::square(self)
    }
    fn sqrt(self) -> Self {
        Interval::sqrt(self)
    }
    fn sin(self) -> Self {
        Interval::sin(self)
    }
    fn cos(self) -> Self {
        Interval::cos(self)
    }
    fn asin(self) -> Self {
        Interval::asin(self)
    }
    fn acos(self) -> Self {
        Interval::acos(self)
    }
    fn atan(self) -> Self {
        Interval::atan(self)
    }
    fn exp(self) -> Self {
        Interval::exp(self)
    }
    fn ln(self) -> Self {
        Interval::ln(self)
    }
    fn min_choice(self, rhs: Self) -> (Self, Choice) {
        Interval::min_choice(self, rhs)
    }
    fn max_choice(self, rhs: Self) -> (Self, Choice) {
        Interval::max_choice(self, rhs)
    }
}

/// `NaN`-propagating minimum
fn min_f32(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else {
        a.min(b)
    }
}

/// `NaN`-propagating maximum
fn max_f32(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else {
        a.max(b)
    }
}

impl EvalValue for f32 {
    fn abs(self) -> Self {
        f32::abs(self)
    }
    fn square(self) -> Self {
        self * self
    }
    fn sqrt(self) -> Self {
        f32::sqrt(self)
    }
    fn sin(self) -> Self {
        f32::sin(self)
    }
    fn cos(self) -> Self {
        f32::cos(self)
    }
    fn asin(self) -> Self {
        f32::asin(self)
    }
    fn acos(self) -> Self {
        f32::acos(self)
    }
    fn atan(self) -> Self {
        f32::atan(self)
    }
    fn exp(self) -> Self {
        f32::exp(self)
    }
    fn ln(self) -> Self {
        f32::ln(self)
    }
    fn min_choice(self, rhs: Self) -> (Self, Choice) {
        (min_f32(self, rhs), Choice::Both)
    }
    fn max_choice(self, rhs: Self) -> (Self, Choice) {
        (max_f32(self, rhs), Choice::Both)
    }
}

impl EvalValue for Pair {
    fn abs(self) -> Self {
        self.map(f32::abs)
    }
    fn square(self) -> Self {
        self.map(|v| v * v)
    }
    fn sqrt(self) -> Self {
        self.map(f32::sqrt)
    }
    fn sin(self) -> Self {
        self.map(f32::sin)
    }
    fn cos(self) -> Self {
        self.map(f32::cos)
    }
    fn asin(self) -> Self {
        self.map(f32::asin)
    }
    fn acos(self) -> Self {
        self.map(f32::acos)
    }
    fn atan(self) -> Self {
        self.map(f32::atan)
    }
    fn exp(self) -> Self {
        self.map(f32::exp)
    }
    fn ln(self) -> Self {
        self.map(f32::ln)
    }
    fn min_choice(self, rhs: Self) -> (Self, Choice) {
        (self.zip(rhs, min_f32), Choice::Both)
    }
    fn max_choice(self, rhs: Self) -> (Self, Choice) {
        (self.zip(rhs, max_f32), Choice::Both)
    }
}

impl EvalValue for Grad {
    fn abs(self) -> Self {
        Grad::abs(self)
    }
    fn square(self) -> Self {
        Grad::square(self)
    }
    fn sqrt(self) -> Self {
        Grad::sqrt(self)
    }
    fn sin(self) -> Self {
        Grad::sin(self)
    }
    fn cos(self) -> Self {
        Grad::cos(self)
    }
    fn asin(self) -> Self {
        Grad::asin(self)
    }
    fn acos(self) -> Self {
        Grad::acos(self)
    }
    fn atan(self) -> Self {
        Grad::atan(self)
    }
    fn exp(self) -> Self {
        Grad::exp(self)
    }
    fn ln(self) -> Self {
        Grad::ln(self)
    }
    fn min_choice(self, rhs: Self) -> (Self, Choice) {
        (self.min(rhs), Choice::Both)
    }
    fn max_choice(self, rhs: Self) -> (Self, Choice) {
        (self.max(rhs), Choice::Both)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Helper struct to reduce boilerplate conversions
struct SlotArray<'a, T>(&'a mut [T]);
impl<T> std::ops::Index<u8> for SlotArray<'_, T> {
    type Output = T;
    fn index(&self, i: u8) -> &Self::Output {
        &self.0[i as usize]
    }
}
impl<T> std::ops::IndexMut<u8> for SlotArray<'_, T> {
    fn index_mut(&mut self, i: u8) -> &mut T {
        &mut self.0[i as usize]
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Result of a single tape evaluation
#[derive(Copy, Clone, Debug)]
pub struct Evaluation<T> {
    /// Value in the tape's output slot
    pub value: T,
    /// Position of the tape's `End` instruction in the arena
    pub end: usize,
    /// Whether any min/max instruction picked a single side
    pub has_choice: bool,
}

/// Tape interpreter with a private register file
///
/// Each worker thread should own its own interpreter, since evaluation
/// mutates the register file and choice list.
pub struct Interpreter<T> {
    slots: Vec<T>,
    choices: Vec<Choice>,
}

impl<T: EvalValue> Default for Interpreter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: EvalValue> Interpreter<T> {
    /// Builds a new interpreter
    pub fn new() -> Self {
        Self {
            slots: vec![T::from(f32::NAN); SLOT_COUNT],
            choices: vec![],
        }
    }

    /// Choices recorded by the most recent evaluation, in evaluation order
    ///
    /// This is only populated for value types which track choices.
    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }

    /// Evaluates the tape which begins at `start`
    ///
    /// Jumps are followed until the tape's `End` is reached; running for more
    /// steps than the arena has words is an [`Error::UnterminatedTape`].
    pub fn eval(
        &mut self,
        data: &TapeData,
        start: usize,
        x: T,
        y: T,
        z: T,
    ) -> Result<Evaluation<T>, Error> {
        let choices = &mut self.choices;
        choices.clear();
        let mut v = SlotArray(&mut self.slots);
        v[0] = x;
        v[1] = y;
        v[2] = z;

        macro_rules! record {
            ($choice:expr) => {
                if T::TRACK_CHOICES {
                    choices.push($choice);
                }
            };
        }

        let mut pos = start;
        for _ in 0..data.len() {
            match data.fetch(pos)? {
                Op::End(out) => {
                    return Ok(Evaluation {
                        value: v[out],
                        end: pos,
                        has_choice: choices.iter().any(|c| *c != Choice::Both),
                    });
                }
                Op::Jump(offset) => {
                    pos = jump(pos, offset)?;
                    continue;
                }
                Op::CopyImm(out, imm) => v[out] = imm.into(),
                Op::CopyReg(out, arg) => v[out] = v[arg],
                Op::NegReg(out, arg) => v[out] = -v[arg],
                Op::AbsReg(out, arg) => v[out] = v[arg].abs(),
                Op::SquareReg(out, arg) => v[out] = v[arg].square(),
                Op::SqrtReg(out, arg) => v[out] = v[arg].sqrt(),
                Op::SinReg(out, arg) => v[out] = v[arg].sin(),
                Op::CosReg(out, arg) => v[out] = v[arg].cos(),
                Op::AsinReg(out, arg) => v[out] = v[arg].asin(),
                Op::AcosReg(out, arg) => v[out] = v[arg].acos(),
                Op::AtanReg(out, arg) => v[out] = v[arg].atan(),
                Op::ExpReg(out, arg) => v[out] = v[arg].exp(),
                Op::LnReg(out, arg) => v[out] = v[arg].ln(),

                Op::AddRegReg(out, lhs, rhs) => v[out] = v[lhs] + v[rhs],
                Op::SubRegReg(out, lhs, rhs) => v[out] = v[lhs] - v[rhs],
                Op::MulRegReg(out, lhs, rhs) => v[out] = v[lhs] * v[rhs],
                Op::DivRegReg(out, lhs, rhs) => v[out] = v[lhs] / v[rhs],
                Op::MinRegReg(out, lhs, rhs) => {
                    let (value, choice) = v[lhs].min_choice(v[rhs]);
                    v[out] = value;
                    record!(choice);
                }
                Op::MaxRegReg(out, lhs, rhs) => {
                    let (value, choice) = v[lhs].max_choice(v[rhs]);
                    v[out] = value;
                    record!(choice);
                }

                Op::AddRegImm(out, arg, imm) => v[out] = v[arg] + imm.into(),
                Op::SubRegImm(out, arg, imm) => v[out] = v[arg] - imm.into(),
                Op::MulRegImm(out, arg, imm) => v[out] = v[arg] * imm.into(),
                Op::DivRegImm(out, arg, imm) => v[out] = v[arg] / imm.into(),
                Op::SubImmReg(out, arg, imm) => v[out] = T::from(imm) - v[arg],
                Op::DivImmReg(out, arg, imm) => v[out] = T::from(imm) / v[arg],
                Op::MinRegImm(out, arg, imm) => {
                    let (value, choice) = v[arg].min_choice(imm.into());
                    v[out] = value;
                    record!(choice);
                }
                Op::MaxRegImm(out, arg, imm) => {
                    let (value, choice) = v[arg].max_choice(imm.into());
                    v[out] = value;
                    record!(choice);
                }
            }
            pos += 1;
        }
        Err(Error::UnterminatedTape(start))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        tape::{Tape, TapeWriter},
        tree::Tree,
    };
    use rand::{Rng, SeedableRng};

    fn arena(tape: &Tape) -> TapeData {
        let mut data = TapeData::new(tape, 64, 1 << 16).unwrap();
        data.reserve(1 << 12);
        data
    }

    fn gnarly() -> Tree {
        let (x, y, z) = Tree::axes();
        let sphere = (x.square() + y.square() + z.square()).sqrt() - 0.7;
        let wobble = (x.clone() * 3.0).sin() * (y.clone() * 2.0).cos() * 0.2;
        let blob = (x.clone() - 0.3).abs().max(y.clone() + 0.1) - z.atan();
        sphere.min(blob) + wobble - (x * 0.5).exp() / (y.square() + 1.0)
    }

    #[test]
    fn point_eval() {
        let (x, y, _z) = Tree::axes();
        let t = Tape::new(&(x + 1.0).min(y)).unwrap();
        let data = arena(&t);
        let mut eval = Interpreter::<f32>::new();
        let e = |eval: &mut Interpreter<f32>, x, y| {
            eval.eval(&data, 0, x, y, 0.0).unwrap().value
        };
        assert_eq!(e(&mut eval, 1.0, 2.0), 2.0);
        assert_eq!(e(&mut eval, 1.0, 3.0), 2.0);
        assert_eq!(e(&mut eval, 3.0, 3.5), 3.5);
        assert!(eval.choices().is_empty());
    }

    #[test]
    fn interval_choices() {
        let (x, y, _z) = Tree::axes();
        let t = Tape::new(&x.min(y).max(0.5)).unwrap();
        let data = arena(&t);
        let mut eval = Interpreter::<Interval>::new();

        let r = eval
            .eval(
                &data,
                0,
                Interval::new(-1.0, 0.0),
                Interval::new(1.0, 2.0),
                Interval::from(0.0),
            )
            .unwrap();
        assert_eq!(eval.choices(), &[Choice::Left, Choice::Right]);
        assert!(r.has_choice);
        assert_eq!(r.value, Interval::from(0.5));
        assert_eq!(r.end, t.len() - 1);

        let r = eval
            .eval(
                &data,
                0,
                Interval::new(-1.0, 2.0),
                Interval::new(1.0, 2.0),
                Interval::from(0.0),
            )
            .unwrap();
        assert_eq!(eval.choices(), &[Choice::Both, Choice::Both]);
        assert!(!r.has_choice);
    }

    #[test]
    fn interval_soundness() {
        let t = Tape::new(&gnarly()).unwrap();
        let data = arena(&t);
        let mut ieval = Interpreter::<Interval>::new();
        let mut feval = Interpreter::<f32>::new();
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);

        for _ in 0..200 {
            let mut bounds = [Interval::from(0.0); 3];
            for b in &mut bounds {
                let a: f32 = rng.gen_range(-1.5..1.5);
                let w: f32 = rng.gen_range(0.0..0.5);
                *b = Interval::new(a, a + w);
            }
            let [x, y, z] = bounds;
            let i = ieval.eval(&data, 0, x, y, z).unwrap().value;
            for _ in 0..32 {
                let p = bounds.map(|b| b.lerp(rng.r#gen()));
                let v = feval.eval(&data, 0, p[0], p[1], p[2]).unwrap().value;
                if i.has_nan() || v.is_nan() {
                    continue;
                }
                let eps = 1e-4 * (1.0 + v.abs());
                assert!(
                    i.lower() - eps <= v && v <= i.upper() + eps,
                    "{v} is not in {i} at {p:?}"
                );
            }
        }
    }

    #[test]
    fn value_types_agree() {
        let t = Tape::new(&gnarly()).unwrap();
        let data = arena(&t);
        let mut feval = Interpreter::<f32>::new();
        let mut peval = Interpreter::<Pair>::new();
        let mut geval = Interpreter::<Grad>::new();
        let mut rng = rand::rngs::StdRng::seed_from_u64(123);

        for _ in 0..100 {
            let a: [f32; 3] = std::array::from_fn(|_| rng.gen_range(-1.0..1.0));
            let b: [f32; 3] = std::array::from_fn(|_| rng.gen_range(-1.0..1.0));
            let fa = feval.eval(&data, 0, a[0], a[1], a[2]).unwrap().value;
            let fb = feval.eval(&data, 0, b[0], b[1], b[2]).unwrap().value;

            let p = |i: usize| Pair::new(a[i], b[i]);
            let pv = peval.eval(&data, 0, p(0), p(1), p(2)).unwrap().value;
            assert_eq!(pv[0].to_bits(), fa.to_bits());
            assert_eq!(pv[1].to_bits(), fb.to_bits());

            let g = geval
                .eval(
                    &data,
                    0,
                    Grad::new(a[0], 1.0, 0.0, 0.0),
                    Grad::new(a[1], 0.0, 1.0, 0.0),
                    Grad::new(a[2], 0.0, 0.0, 1.0),
                )
                .unwrap()
                .value;
            approx::assert_relative_eq!(g.v, fa, epsilon = 1e-6);
        }
    }

    #[test]
    fn gradient() {
        let (x, y, z) = Tree::axes();
        let t = Tape::new(&(x.square() + y * 3.0 - z)).unwrap();
        let data = arena(&t);
        let mut eval = Interpreter::<Grad>::new();
        let g = eval
            .eval(
                &data,
                0,
                Grad::new(2.0, 1.0, 0.0, 0.0),
                Grad::new(1.0, 0.0, 1.0, 0.0),
                Grad::new(0.5, 0.0, 0.0, 1.0),
            )
            .unwrap()
            .value;
        g.compare_eq(Grad::new(6.5, 4.0, 3.0, -1.0));
    }

    #[test]
    fn follows_jumps() {
        let t = Tape::from_ops(vec![Op::CopyReg(3, 0), Op::End(3)]).unwrap();
        let data = arena(&t);
        let mut w = TapeWriter::new(&data, 4).unwrap();
        w.push(Op::AddRegImm(4, 3, 1.0)).unwrap();
        w.push(Op::MulRegImm(3, 0, 2.0)).unwrap();
        let start = w.finish().unwrap();
        let mut eval = Interpreter::<f32>::new();
        let r = eval.eval(&data, start, 5.0, 0.0, 0.0).unwrap();
        assert_eq!(r.value, 11.0);
        assert_eq!(r.end, 2 + 63);
    }

    #[test]
    fn unterminated() {
        let t = Tape::from_ops(vec![Op::CopyReg(3, 0), Op::End(3)]).unwrap();
        let data = arena(&t);
        let pos = data.claim_chunk().unwrap();
        data.write(pos, Op::Jump(0)).unwrap();
        let mut eval = Interpreter::<f32>::new();
        assert!(matches!(
            eval.eval(&data, pos, 0.0, 0.0, 0.0),
            Err(Error::UnterminatedTape(p)) if p == pos
        ));
    }
}

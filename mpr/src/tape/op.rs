//! Instruction set and packed instruction words
//!
//! Each instruction is stored in the tape arena as a single `u64`:
//!
//! ```text
//! | 63 ........... 32 | 31 .. 24 | 23 .. 16 | 15 ... 8 | 7 .... 0 |
//! |  imm / jump offs  |   rhs    |   lhs    |   out    |  opcode  |
//! ```
//!
//! Immediates are stored as raw `f32` bits; jump offsets are `i32` values
//! relative to the position of the jump itself.  Unused fields are zero, so
//! the all-zero word decodes to `End(0)`.
use crate::Error;

/// Number of slots in the register file used by every evaluator
pub const SLOT_COUNT: usize = 128;

/// Number of slots reserved for the `X`, `Y`, `Z` inputs (slots 0, 1, 2)
pub const AXIS_COUNT: usize = 3;

/// Raw opcode, stored in the low byte of an instruction word
#[derive(Copy, Clone, Debug, Eq, PartialEq, strum::FromRepr, strum::IntoStaticStr)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Opcode {
    /// Terminal sentinel, naming the output slot
    End = 0,
    /// Relative jump to another position in the arena
    Jump,
    CopyImm,
    CopyReg,
    NegReg,
    AbsReg,
    SquareReg,
    SqrtReg,
    SinReg,
    CosReg,
    AsinReg,
    AcosReg,
    AtanReg,
    ExpReg,
    LnReg,
    AddRegReg,
    SubRegReg,
    MulRegReg,
    DivRegReg,
    MinRegReg,
    MaxRegReg,
    AddRegImm,
    SubRegImm,
    MulRegImm,
    DivRegImm,
    MinRegImm,
    MaxRegImm,
    SubImmReg,
    DivImmReg,
}

/// Decoded instruction
///
/// Arguments, in order, are
/// - Output slot
/// - LHS slot
/// - RHS slot (or immediate for `*Imm`)
///
/// `SubImmReg` and `DivImmReg` compute `imm - arg` and `imm / arg`.
#[derive(Copy, Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub enum Op {
    /// Ends the tape, returning the value in the given slot
    End(u8),
    /// Continues evaluation at `position + offset`
    Jump(i32),

    CopyImm(u8, f32),
    CopyReg(u8, u8),

    NegReg(u8, u8),
    AbsReg(u8, u8),
    SquareReg(u8, u8),
    SqrtReg(u8, u8),
    SinReg(u8, u8),
    CosReg(u8, u8),
    AsinReg(u8, u8),
    AcosReg(u8, u8),
    AtanReg(u8, u8),
    ExpReg(u8, u8),
    LnReg(u8, u8),

    AddRegReg(u8, u8, u8),
    SubRegReg(u8, u8, u8),
    MulRegReg(u8, u8, u8),
    DivRegReg(u8, u8, u8),
    MinRegReg(u8, u8, u8),
    MaxRegReg(u8, u8, u8),

    AddRegImm(u8, u8, f32),
    SubRegImm(u8, u8, f32),
    MulRegImm(u8, u8, f32),
    DivRegImm(u8, u8, f32),
    MinRegImm(u8, u8, f32),
    MaxRegImm(u8, u8, f32),
    SubImmReg(u8, u8, f32),
    DivImmReg(u8, u8, f32),
}

static_assertions::const_assert_eq!(std::mem::size_of::<Op>(), 8);

/// Packs raw fields into an instruction word
#[inline]
fn pack(op: Opcode, out: u8, lhs: u8, rhs: u8, imm: u32) -> u64 {
    (op as u64)
        | ((out as u64) << 8)
        | ((lhs as u64) << 16)
        | ((rhs as u64) << 24)
        | ((imm as u64) << 32)
}

impl Op {
    /// Returns the raw opcode of this instruction
    pub fn opcode(&self) -> Opcode {
        match self {
            Op::End(..) => Opcode::End,
            Op::Jump(..) => Opcode::Jump,
            Op::CopyImm(..) => Opcode::CopyImm,
            Op::CopyReg(..) => Opcode::CopyReg,
            Op::NegReg(..) => Opcode::NegReg,
            Op::AbsReg(..) => Opcode::AbsReg,
            Op::SquareReg(..) => Opcode::SquareReg,
            Op::SqrtReg(..) => Opcode::SqrtReg,
            Op::SinReg(..) => Opcode::SinReg,
            Op::CosReg(..) => Opcode::CosReg,
            Op::AsinReg(..) => Opcode::AsinReg,
            Op::AcosReg(..) => Opcode::AcosReg,
            Op::AtanReg(..) => Opcode::AtanReg,
            Op::ExpReg(..) => Opcode::ExpReg,
            Op::LnReg(..) => Opcode::LnReg,
            Op::AddRegReg(..) => Opcode::AddRegReg,
            Op::SubRegReg(..) => Opcode::SubRegReg,
            Op::MulRegReg(..) => Opcode::MulRegReg,
            Op::DivRegReg(..) => Opcode::DivRegReg,
            Op::MinRegReg(..) => Opcode::MinRegReg,
            Op::MaxRegReg(..) => Opcode::MaxRegReg,
            Op::AddRegImm(..) => Opcode::AddRegImm,
            Op::SubRegImm(..) => Opcode::SubRegImm,
            Op::MulRegImm(..) => Opcode::MulRegImm,
            Op::DivRegImm(..) => Opcode::DivRegImm,
            Op::MinRegImm(..) => Opcode::MinRegImm,
            Op::MaxRegImm(..) => Opcode::MaxRegImm,
            Op::SubImmReg(..) => Opcode::SubImmReg,
            Op::DivImmReg(..) => Opcode::DivImmReg,
        }
    }

    /// Packs this instruction into a 64-bit word
    pub fn encode(&self) -> u64 {
        let code = self.opcode();
        match *self {
            Op::End(out) => pack(code, out, 0, 0, 0),
            Op::Jump(offset) => pack(code, 0, 0, 0, offset as u32),
            Op::CopyImm(out, imm) => pack(code, out, 0, 0, imm.to_bits()),
            Op::CopyReg(out, arg)
            | Op::NegReg(out, arg)
            | Op::AbsReg(out, arg)
            | Op::SquareReg(out, arg)
            | Op::SqrtReg(out, arg)
            | Op::SinReg(out, arg)
            | Op::CosReg(out, arg)
            | Op::AsinReg(out, arg)
            | Op::AcosReg(out, arg)
            | Op::AtanReg(out, arg)
            | Op::ExpReg(out, arg)
            | Op::LnReg(out, arg) => pack(code, out, arg, 0, 0),
            Op::AddRegReg(out, lhs, rhs)
            | Op::SubRegReg(out, lhs, rhs)
            | Op::MulRegReg(out, lhs, rhs)
            | Op::DivRegReg(out, lhs, rhs)
            | Op::MinRegReg(out, lhs, rhs)
            | Op::MaxRegReg(out, lhs, rhs) => pack(code, out, lhs, rhs, 0),
            Op::AddRegImm(out, arg, imm)
            | Op::SubRegImm(out, arg, imm)
            | Op::MulRegImm(out, arg, imm)
            | Op::DivRegImm(out, arg, imm)
            | Op::MinRegImm(out, arg, imm)
            | Op::MaxRegImm(out, arg, imm)
            | Op::SubImmReg(out, arg, imm)
            | Op::DivImmReg(out, arg, imm) => {
                pack(code, out, arg, 0, imm.to_bits())
            }
        }
    }

    /// Unpacks an instruction word
    ///
    /// Returns [`Error::BadOpcode`] if the low byte is not a known opcode, or
    /// [`Error::SlotOverflow`] if a slot field is past the register file.
    pub fn decode(word: u64) -> Result<Self, Error> {
        let byte = word as u8;
        let code = Opcode::from_repr(byte).ok_or(Error::BadOpcode(byte))?;
        let out = (word >> 8) as u8;
        let lhs = (word >> 16) as u8;
        let rhs = (word >> 24) as u8;
        if let Some(s) = [out, lhs, rhs]
            .into_iter()
            .find(|s| *s as usize >= SLOT_COUNT)
        {
            return Err(Error::SlotOverflow(s as usize, SLOT_COUNT));
        }
        let hi = (word >> 32) as u32;
        let imm = f32::from_bits(hi);

        let op = match code {
            Opcode::End => Op::End(out),
            Opcode::Jump => Op::Jump(hi as i32),
            Opcode::CopyImm => Op::CopyImm(out, imm),
            Opcode::CopyReg => Op::CopyReg(out, lhs),
            Opcode::NegReg => Op::NegReg(out, lhs),
            Opcode::AbsReg => Op::AbsReg(out, lhs),
            Opcode::SquareReg => Op::SquareReg(out, lhs),
            Opcode::SqrtReg => Op::SqrtReg(out, lhs),
            Opcode::SinReg => Op::SinReg(out, lhs),
            Opcode::CosReg => Op::CosReg(out, lhs),
            Opcode::AsinReg => Op::AsinReg(out, lhs),
            Opcode::AcosReg => Op::AcosReg(out, lhs),
            Opcode::AtanReg => Op::AtanReg(out, lhs),
            Opcode::ExpReg => Op::ExpReg(out, lhs),
            Opcode::LnReg => Op::LnReg(out, lhs),
            Opcode::AddRegReg => Op::AddRegReg(out, lhs, rhs),
            Opcode::SubRegReg => Op::SubRegReg(out, lhs, rhs),
            Opcode::MulRegReg => Op::MulRegReg(out, lhs, rhs),
            Opcode::DivRegReg => Op::DivRegReg(out, lhs, rhs),
            Opcode::MinRegReg => Op::MinRegReg(out, lhs, rhs),
            Opcode::MaxRegReg => Op::MaxRegReg(out, lhs, rhs),
            Opcode::AddRegImm => Op::AddRegImm(out, lhs, imm),
            Opcode::SubRegImm => Op::SubRegImm(out, lhs, imm),
            Opcode::MulRegImm => Op::MulRegImm(out, lhs, imm),
            Opcode::DivRegImm => Op::DivRegImm(out, lhs, imm),
            Opcode::MinRegImm => Op::MinRegImm(out, lhs, imm),
            Opcode::MaxRegImm => Op::MaxRegImm(out, lhs, imm),
            Opcode::SubImmReg => Op::SubImmReg(out, lhs, imm),
            Opcode::DivImmReg => Op::DivImmReg(out, lhs, imm),
        };
        Ok(op)
    }

    /// Returns the output slot written by this instruction
    ///
    /// `End` and `Jump` don't write to a slot and return `None`
    pub fn output(&self) -> Option<u8> {
        match self {
            Op::End(..) | Op::Jump(..) => None,
            Op::CopyImm(out, ..)
            | Op::CopyReg(out, ..)
            | Op::NegReg(out, ..)
            | Op::AbsReg(out, ..)
            | Op::SquareReg(out, ..)
            | Op::SqrtReg(out, ..)
            | Op::SinReg(out, ..)
            | Op::CosReg(out, ..)
            | Op::AsinReg(out, ..)
            | Op::AcosReg(out, ..)
            | Op::AtanReg(out, ..)
            | Op::ExpReg(out, ..)
            | Op::LnReg(out, ..)
            | Op::AddRegReg(out, ..)
            | Op::SubRegReg(out, ..)
            | Op::MulRegReg(out, ..)
            | Op::DivRegReg(out, ..)
            | Op::MinRegReg(out, ..)
            | Op::MaxRegReg(out, ..)
            | Op::AddRegImm(out, ..)
            | Op::SubRegImm(out, ..)
            | Op::MulRegImm(out, ..)
            | Op::DivRegImm(out, ..)
            | Op::MinRegImm(out, ..)
            | Op::MaxRegImm(out, ..)
            | Op::SubImmReg(out, ..)
            | Op::DivImmReg(out, ..) => Some(*out),
        }
    }

    /// Returns the slots read by this instruction
    ///
    /// `End` reads its output slot; `Jump` and `CopyImm` read nothing.
    pub fn inputs(&self) -> [Option<u8>; 2] {
        match *self {
            Op::End(arg) => [Some(arg), None],
            Op::Jump(..) | Op::CopyImm(..) => [None, None],
            Op::CopyReg(_, arg)
            | Op::NegReg(_, arg)
            | Op::AbsReg(_, arg)
            | Op::SquareReg(_, arg)
            | Op::SqrtReg(_, arg)
            | Op::SinReg(_, arg)
            | Op::CosReg(_, arg)
            | Op::AsinReg(_, arg)
            | Op::AcosReg(_, arg)
            | Op::AtanReg(_, arg)
            | Op::ExpReg(_, arg)
            | Op::LnReg(_, arg)
            | Op::AddRegImm(_, arg, _)
            | Op::SubRegImm(_, arg, _)
            | Op::MulRegImm(_, arg, _)
            | Op::DivRegImm(_, arg, _)
            | Op::MinRegImm(_, arg, _)
            | Op::MaxRegImm(_, arg, _)
            | Op::SubImmReg(_, arg, _)
            | Op::DivImmReg(_, arg, _) => [Some(arg), None],
            Op::AddRegReg(_, lhs, rhs)
            | Op::SubRegReg(_, lhs, rhs)
            | Op::MulRegReg(_, lhs, rhs)
            | Op::DivRegReg(_, lhs, rhs)
            | Op::MinRegReg(_, lhs, rhs)
            | Op::MaxRegReg(_, lhs, rhs) => [Some(lhs), Some(rhs)],
        }
    }

    /// Checks whether this is a `min` / `max` instruction
    ///
    /// These instructions record a [`Choice`](crate::eval::Choice) during
    /// interval evaluation.
    pub fn has_choice(&self) -> bool {
        matches!(
            self,
            Op::MinRegReg(..)
                | Op::MaxRegReg(..)
                | Op::MinRegImm(..)
                | Op::MaxRegImm(..)
        )
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name: &'static str = self.opcode().into();
        match *self {
            Op::End(out) => write!(f, "{name} ${out}"),
            Op::Jump(offset) => write!(f, "{name} {offset:+}"),
            Op::CopyImm(out, imm) => write!(f, "${out} = {name} {imm}"),
            Op::AddRegImm(out, arg, imm)
            | Op::SubRegImm(out, arg, imm)
            | Op::MulRegImm(out, arg, imm)
            | Op::DivRegImm(out, arg, imm)
            | Op::MinRegImm(out, arg, imm)
            | Op::MaxRegImm(out, arg, imm)
            | Op::SubImmReg(out, arg, imm)
            | Op::DivImmReg(out, arg, imm) => {
                write!(f, "${out} = {name} ${arg} {imm}")
            }
            op => {
                let out = op.output().unwrap_or(0);
                match op.inputs() {
                    [Some(a), Some(b)] => write!(f, "${out} = {name} ${a} ${b}"),
                    [Some(a), None] => write!(f, "${out} = {name} ${a}"),
                    _ => write!(f, "${out} = {name}"),
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_op_size() {
        assert_eq!(std::mem::size_of::<Op>(), 8);
    }

    #[test]
    fn test_zero_word_is_end() {
        assert_eq!(Op::decode(0).unwrap(), Op::End(0));
    }

    #[test]
    fn test_encode_layout() {
        let w = Op::AddRegImm(5, 3, 1.5).encode();
        assert_eq!(w & 0xFF, Opcode::AddRegImm as u64);
        assert_eq!((w >> 8) & 0xFF, 5);
        assert_eq!((w >> 16) & 0xFF, 3);
        assert_eq!((w >> 32) as u32, 1.5f32.to_bits());

        let w = Op::Jump(-7).encode();
        assert_eq!(Op::decode(w).unwrap(), Op::Jump(-7));
    }

    #[test]
    fn test_bad_opcode() {
        let r = Op::decode(0xFF);
        assert!(matches!(r, Err(Error::BadOpcode(0xFF))));

        let r = Op::decode(Opcode::CopyReg as u64 | (200 << 8));
        assert!(matches!(r, Err(Error::SlotOverflow(200, SLOT_COUNT))));
    }

    #[test]
    fn test_choice_ops() {
        assert!(Op::MinRegReg(3, 0, 1).has_choice());
        assert!(Op::MaxRegImm(3, 0, 1.0).has_choice());
        assert!(!Op::AddRegReg(3, 0, 1).has_choice());
        assert_eq!(Op::MinRegImm(4, 2, 0.0).inputs(), [Some(2), None]);
        assert_eq!(Op::End(7).output(), None);
    }
}

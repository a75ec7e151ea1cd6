//! Instruction tapes
//!
//! A [`Tape`] is the immutable, contiguous program produced by compiling a
//! [`Tree`].  During rendering it is copied into a [`TapeData`] arena, where
//! per-tile shrunk tapes are written alongside it.
use crate::{Error, tree::Tree};

mod builder;
pub(crate) mod data;
pub mod op;

pub use data::{TapeData, TapeWriter};
pub use op::{AXIS_COUNT, Op, Opcode, SLOT_COUNT};

/// A flattened math expression, ready for evaluation
///
/// The tape is stored in evaluation order and always ends with a single
/// [`Op::End`], which names the output slot.  Slots 0, 1, and 2 are the `X`,
/// `Y`, and `Z` inputs.
#[derive(Clone, Debug)]
pub struct Tape {
    ops: Vec<Op>,
    slot_count: usize,
    choice_count: usize,
}

impl Tape {
    /// Compiles a tree into a tape
    pub fn new(tree: &Tree) -> Result<Self, Error> {
        let ops = builder::build(tree)?;
        Self::from_ops(ops)
    }

    /// Parses a `.vm` text file and compiles it into a tape
    pub fn from_text<R: std::io::Read>(r: R) -> Result<Self, Error> {
        let tree = Tree::from_text(r)?;
        Self::new(&tree)
    }

    /// Builds a tape from a hand-written list of instructions
    ///
    /// The list must contain at least one instruction followed by exactly one
    /// `End`, must not contain jumps, and must only use slots within the
    /// register file.
    pub fn from_ops(ops: Vec<Op>) -> Result<Self, Error> {
        let Some((last, body)) = ops.split_last() else {
            return Err(Error::EmptyTape);
        };
        if !matches!(last, Op::End(..)) {
            return Err(Error::BadTapeEnd);
        } else if body.is_empty() {
            return Err(Error::EmptyTape);
        }

        let mut slot_count = AXIS_COUNT;
        let mut choice_count = 0;
        for (i, op) in ops.iter().enumerate() {
            match op {
                Op::Jump(..) => return Err(Error::UnexpectedJump(i)),
                Op::End(..) if i != body.len() => {
                    return Err(Error::BadTapeEnd);
                }
                _ => (),
            }
            let [a, b] = op.inputs();
            for s in [op.output(), a, b].into_iter().flatten() {
                let s = s as usize;
                if s >= SLOT_COUNT {
                    return Err(Error::SlotOverflow(s, SLOT_COUNT));
                }
                slot_count = slot_count.max(s + 1);
            }
            if op.has_choice() {
                choice_count += 1;
            }
        }
        Ok(Self {
            ops,
            slot_count,
            choice_count,
        })
    }

    /// Returns the number of instructions, including the final `End`
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Checks whether the tape is empty (which is never true)
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Iterates over instructions in evaluation order
    pub fn iter(&self) -> impl Iterator<Item = &Op> + '_ {
        self.ops.iter()
    }

    /// Returns the slot holding the tape's result
    pub fn output(&self) -> u8 {
        match self.ops.last() {
            Some(Op::End(out)) => *out,
            _ => unreachable!("tape must end with `End`"),
        }
    }

    /// Returns the number of slots used (including the three inputs)
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Returns the number of choice (min/max) instructions in the tape
    pub fn choice_count(&self) -> usize {
        self.choice_count
    }

    /// Iterates over packed instruction words, in evaluation order
    pub fn words(&self) -> impl Iterator<Item = u64> + '_ {
        self.ops.iter().map(Op::encode)
    }
}

impl std::fmt::Display for Tape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for op in &self.ops {
            writeln!(f, "{op}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tape_validation() {
        assert!(matches!(Tape::from_ops(vec![]), Err(Error::EmptyTape)));
        assert!(matches!(
            Tape::from_ops(vec![Op::End(0)]),
            Err(Error::EmptyTape)
        ));
        assert!(matches!(
            Tape::from_ops(vec![Op::CopyReg(3, 0)]),
            Err(Error::BadTapeEnd)
        ));
        assert!(matches!(
            Tape::from_ops(vec![Op::End(0), Op::CopyReg(3, 0), Op::End(3)]),
            Err(Error::BadTapeEnd)
        ));
        assert!(matches!(
            Tape::from_ops(vec![Op::CopyReg(3, 0), Op::Jump(1), Op::End(3)]),
            Err(Error::UnexpectedJump(1))
        ));
        assert!(matches!(
            Tape::from_ops(vec![Op::CopyReg(200, 0), Op::End(200)]),
            Err(Error::SlotOverflow(200, SLOT_COUNT))
        ));
    }

    #[test]
    fn tape_counts() {
        let t = Tape::from_ops(vec![
            Op::MinRegReg(3, 0, 1),
            Op::MaxRegImm(4, 3, 0.5),
            Op::End(4),
        ])
        .unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.output(), 4);
        assert_eq!(t.slot_count(), 5);
        assert_eq!(t.choice_count(), 2);
        assert_eq!(t.words().count(), 3);
        assert_eq!(
            t.to_string(),
            "$3 = MinRegReg $0 $1\n$4 = MaxRegImm $3 0.5\nEnd $4\n"
        );
    }
}

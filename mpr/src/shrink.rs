//! Tape shrinking
//!
//! After interval evaluation over a tile, each min/max instruction has a
//! recorded [`Choice`].  Shrinking walks the tape backward from its `End`,
//! tracking which slots are live, and writes out only the instructions which
//! can still affect the result within that tile.
use crate::{
    Error,
    eval::Choice,
    tape::{Op, TapeData, TapeWriter, data::jump},
};

/// Bitset of live slots
#[derive(Copy, Clone, Debug, Default)]
struct Liveness(u128);

impl Liveness {
    fn get(&self, slot: u8) -> bool {
        self.0 & (1 << slot) != 0
    }
    fn set(&mut self, slot: u8) {
        self.0 |= 1 << slot;
    }
    fn clear(&mut self, slot: u8) {
        self.0 &= !(1 << slot);
    }
}

/// Rewrites a choice instruction given the side that always wins
///
/// Returns `None` if the instruction can be dropped entirely, because the
/// winning value is already in the output slot.
fn pick(op: Op, choice: Choice) -> Option<Op> {
    match (op, choice) {
        (op, Choice::Both) => Some(op),
        (
            Op::MinRegReg(out, arg, _)
            | Op::MaxRegReg(out, arg, _)
            | Op::MinRegImm(out, arg, _)
            | Op::MaxRegImm(out, arg, _),
            Choice::Left,
        )
        | (
            Op::MinRegReg(out, _, arg) | Op::MaxRegReg(out, _, arg),
            Choice::Right,
        ) => (arg != out).then_some(Op::CopyReg(out, arg)),
        (
            Op::MinRegImm(out, _, imm) | Op::MaxRegImm(out, _, imm),
            Choice::Right,
        ) => Some(Op::CopyImm(out, imm)),
        (op, _) => unreachable!("{op} is not a choice instruction"),
    }
}

/// Shrinks the tape spanning `start..=end` into fresh arena chunks
///
/// `end` must be the position of the tape's `End` instruction (as returned
/// by the interpreter), and `choices` must hold one choice per min/max
/// instruction, in evaluation order.
///
/// Returns the start position of the new tape.
pub fn shrink(
    data: &TapeData,
    start: usize,
    end: usize,
    choices: &[Choice],
) -> Result<usize, Error> {
    let Op::End(out) = data.fetch(end)? else {
        return Err(Error::BadTapeEnd);
    };
    let mut live = Liveness::default();
    live.set(out);

    let mut writer = TapeWriter::new(data, out)?;
    let mut choice_iter = choices.iter().rev();
    let mut used = 0;

    let mut pos = end;
    for _ in 0..data.len() {
        if pos == start {
            if used != choices.len() {
                return Err(Error::BadChoiceSlice(choices.len(), used));
            }
            return writer.finish();
        }
        pos = pos.checked_sub(1).ok_or(Error::UnterminatedTape(start))?;
        let mut op = data.fetch(pos)?;
        if let Op::Jump(offset) = op {
            pos = jump(pos, offset)?;
            op = data.fetch(pos)?;
        }
        let Some(index) = op.output() else {
            return Err(match op {
                Op::Jump(..) => Error::UnexpectedJump(pos),
                _ => Error::BadTapeEnd,
            });
        };

        // Choices are consumed even for dead instructions, to stay aligned
        let choice = if op.has_choice() {
            used += 1;
            *choice_iter
                .next()
                .ok_or(Error::BadChoiceSlice(choices.len(), used))?
        } else {
            Choice::Both
        };

        if !live.get(index) {
            continue;
        }
        if let Some(op) = pick(op, choice) {
            live.clear(index);
            for i in op.inputs().into_iter().flatten() {
                live.set(i);
            }
            writer.push(op)?;
        }
    }
    Err(Error::UnterminatedTape(start))
}

//! Shared tape arena
//!
//! The arena holds the base tape at offset 0, followed by scratch space for
//! shrunk tapes.  Scratch space is handed out in fixed-size chunks by an
//! atomic cursor, so many workers can write tapes at the same time without
//! coordinating beyond a single `fetch_add` per chunk.
//!
//! Shrunk tapes are written back-to-front, since the shrinker discovers
//! instructions in reverse order.  Within a chunk of size `C`:
//!
//! - word `C - 1` holds either the tape's `End` (first chunk) or a forward
//!   `Jump` to the first instruction of the previously-filled chunk
//! - words `1..C-1` hold instructions, filled from the top down
//! - word `0` holds a backward `Jump` to the last instruction of the chunk
//!   claimed after it (if any)
//!
//! Forward evaluation only meets forward jumps; a backward walk from `End`
//! only meets backward jumps.
use crate::{
    Error,
    tape::{Op, Tape},
};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Arena of packed instruction words
pub struct TapeData {
    words: Vec<AtomicU64>,
    base_len: usize,
    cursor: AtomicUsize,
    chunk_size: usize,
    limit: usize,
}

impl TapeData {
    /// Builds a new arena, copying the base tape to offset 0
    ///
    /// `chunk_size` must be at least 3 words; `limit` is the maximum number
    /// of words that the arena may ever grow to.  Jumps are stored as `i32`
    /// offsets, so the limit may not exceed `i32::MAX`.
    pub fn new(
        tape: &Tape,
        chunk_size: usize,
        limit: usize,
    ) -> Result<Self, Error> {
        if chunk_size < 3 {
            return Err(Error::BadChunkSize(chunk_size));
        }
        if limit < tape.len() || limit > i32::MAX as usize {
            return Err(Error::BadArenaLimit(limit));
        }
        let words: Vec<AtomicU64> = tape.words().map(AtomicU64::new).collect();
        let base_len = words.len();
        Ok(Self {
            words,
            base_len,
            cursor: AtomicUsize::new(base_len),
            chunk_size,
            limit,
        })
    }

    /// Returns the length of the base tape (including its `End`)
    pub fn base_len(&self) -> usize {
        self.base_len
    }

    /// Returns the position of the base tape's `End`
    pub fn base_end(&self) -> usize {
        self.base_len - 1
    }

    /// Returns the chunk size, in words
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Returns the current capacity, in words
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Checks whether the arena is empty (which is never true)
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Returns the number of words claimed so far (including the base tape)
    pub fn used(&self) -> usize {
        self.cursor.load(Ordering::Relaxed).min(self.words.len())
    }

    /// Returns the number of words needed to store one shrunk copy of the
    /// base tape, in the worst case
    pub fn words_per_tape(&self) -> usize {
        let per_chunk = self.chunk_size - 2;
        self.base_len.div_ceil(per_chunk).max(1) * self.chunk_size
    }

    /// Claims a fresh chunk, returning its start position
    pub fn claim_chunk(&self) -> Result<usize, Error> {
        let start = self.cursor.fetch_add(self.chunk_size, Ordering::Relaxed);
        let end = start + self.chunk_size;
        if end > self.words.len() {
            Err(Error::TapeArenaExhausted(end, self.words.len()))
        } else {
            Ok(start)
        }
    }

    /// Writes an instruction to the given position
    pub fn write(&self, pos: usize, op: Op) -> Result<(), Error> {
        self.word(pos)?.store(op.encode(), Ordering::Relaxed);
        Ok(())
    }

    /// Reads the instruction at the given position
    #[inline]
    pub fn fetch(&self, pos: usize) -> Result<Op, Error> {
        Op::decode(self.word(pos)?.load(Ordering::Relaxed))
    }

    fn word(&self, pos: usize) -> Result<&AtomicU64, Error> {
        self.words
            .get(pos)
            .ok_or(Error::TapeIndexOutOfBounds(pos, self.words.len()))
    }

    /// Grows the arena so that `extra` more words can be claimed
    ///
    /// Capacity never exceeds the arena's limit; claims past the limit fail
    /// with [`Error::TapeArenaExhausted`].
    pub fn reserve(&mut self, extra: usize) {
        let used = self.used();
        let target = used.saturating_add(extra).min(self.limit);
        if target > self.words.len() {
            log::trace!(
                "growing tape arena from {} to {target} words",
                self.words.len()
            );
            self.words.resize_with(target, || AtomicU64::new(0));
        }
    }

    /// Releases every shrunk tape, keeping the base tape and capacity
    pub fn reset(&mut self) {
        *self.cursor.get_mut() = self.base_len;
    }

    /// Walks a tape forward from `start`, following jumps
    ///
    /// Returns every non-jump instruction, ending with `End`.
    pub fn walk(&self, start: usize) -> Result<Vec<Op>, Error> {
        let mut out = vec![];
        let mut pos = start;
        for _ in 0..self.words.len() {
            match self.fetch(pos)? {
                Op::Jump(offset) => pos = jump(pos, offset)?,
                op => {
                    out.push(op);
                    if matches!(op, Op::End(..)) {
                        return Ok(out);
                    }
                    pos += 1;
                }
            }
        }
        Err(Error::UnterminatedTape(start))
    }
}

/// Applies a relative jump
#[inline]
pub(crate) fn jump(pos: usize, offset: i32) -> Result<usize, Error> {
    pos.checked_add_signed(offset as isize)
        .ok_or(Error::TapeIndexOutOfBounds(pos, usize::MAX))
}

/// Computes the offset of a jump from `from` to `to`
fn offset(from: usize, to: usize) -> i32 {
    // Both positions are below the arena limit, which fits in an `i32`
    (to as i64 - from as i64) as i32
}

/// Writer for a single tape, filling chunks back-to-front
pub struct TapeWriter<'a> {
    data: &'a TapeData,
    out: u8,
    /// Start of the chunk currently being filled
    chunk: usize,
    /// Position of the most recently written word
    pos: usize,
    count: usize,
}

impl<'a> TapeWriter<'a> {
    /// Claims a chunk and writes the terminal `End` for the given slot
    pub fn new(data: &'a TapeData, out: u8) -> Result<Self, Error> {
        let chunk = data.claim_chunk()?;
        let pos = chunk + data.chunk_size - 1;
        data.write(pos, Op::End(out))?;
        Ok(Self {
            data,
            out,
            chunk,
            pos,
            count: 0,
        })
    }

    /// Prepends an instruction to the tape
    pub fn push(&mut self, op: Op) -> Result<(), Error> {
        if self.pos == self.chunk + 1 {
            let next = self.data.claim_chunk()?;
            let last = next + self.data.chunk_size - 1;
            self.data.write(last, Op::Jump(offset(last, self.pos)))?;
            self.data
                .write(self.chunk, Op::Jump(offset(self.chunk, last - 1)))?;
            self.chunk = next;
            self.pos = last;
        }
        self.pos -= 1;
        self.count += 1;
        self.data.write(self.pos, op)
    }

    /// Finishes the tape, returning its start position
    ///
    /// A tape with no instructions gets a trivial copy, so that every tape
    /// has at least one instruction before its `End`.
    pub fn finish(mut self) -> Result<usize, Error> {
        if self.count == 0 {
            self.push(Op::CopyReg(self.out, self.out))?;
        }
        Ok(self.pos)
    }
}

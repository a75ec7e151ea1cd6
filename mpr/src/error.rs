//! Module containing the universal error type
use thiserror::Error;

/// Universal error type for `mpr`
///
/// Every variant is fatal for the operation that produced it: a render which
/// returns an error has no usable output.
#[derive(Error, Debug)]
pub enum Error {
    /// Unknown opcode in a text file
    #[error("unknown opcode {0}")]
    UnknownOpcode(String),

    /// Unknown opcode byte in a packed instruction word
    #[error("unknown opcode byte {0:#04x}")]
    BadOpcode(u8),

    /// A line of a text file could not be parsed
    #[error("malformed clause on line {0}")]
    MalformedLine(usize),

    /// Empty file
    #[error("empty file")]
    EmptyFile,

    /// IO error; see inner code for details
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// Tape has no instructions before its terminal `End`
    #[error("tape must contain at least one instruction")]
    EmptyTape,

    /// Tape does not end with exactly one `End` instruction
    #[error("tape must end with a single `End` instruction")]
    BadTapeEnd,

    /// Base tapes are contiguous and may not contain jumps
    #[error("jump instruction at index {0} of a base tape")]
    UnexpectedJump(usize),

    /// Slot index exceeds the register file
    #[error("slot {0} exceeds the register file size ({1})")]
    SlotOverflow(usize, usize),

    /// The tape arena has no room for another chunk
    #[error("tape arena exhausted (needed {0} words, capacity is {1})")]
    TapeArenaExhausted(usize, usize),

    /// Tape index is past the end of the arena
    #[error("tape index {0} is out of bounds (arena length is {1})")]
    TapeIndexOutOfBounds(usize, usize),

    /// Walking a tape never reached its `End` instruction
    #[error("tape starting at index {0} never reaches its end")]
    UnterminatedTape(usize),

    /// Choice slice length does not match choice count
    #[error("choice slice length ({0}) does not match choice count ({1})")]
    BadChoiceSlice(usize, usize),

    /// Chunks must hold a jump, an instruction and an end / jump word
    #[error("bad chunk size {0}; must be at least 3")]
    BadChunkSize(usize),

    /// Arena limit is too small for the base tape or too large for jumps
    #[error("bad arena limit {0}")]
    BadArenaLimit(usize),

    /// Tile destination index is past the end of the next stage's array
    #[error("tile index {0} is out of bounds (tile array length is {1})")]
    TileOverflow(usize, usize),

    /// Image must have a non-zero size on every axis
    #[error("image size must be non-zero on every axis")]
    EmptyImage,

    /// Tile size list must not be empty
    #[error("tile size list must not be empty")]
    EmptyTileSizes,

    /// Tile size list must be in descending order
    #[error("bad tile order; {0} is not larger than {1}")]
    BadTileOrder(usize, usize),

    /// Each tile must be divisible by subsequent tiles
    #[error("bad tile sizes; {0} is not divisible by {1}")]
    BadTileSize(usize, usize),

    /// Leaf tiles are evaluated in pairs of voxels along Z
    #[error("bad leaf tile size {0}; must be even")]
    BadLeafTileSize(usize),

    /// A custom thread pool could not be built
    #[error("could not build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

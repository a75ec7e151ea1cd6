//! Custom types used during evaluation
mod grad;
mod interval;
mod pair;

pub use grad::Grad;
pub use interval::Interval;
pub use pair::Pair;

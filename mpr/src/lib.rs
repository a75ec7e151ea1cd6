//! `mpr` is a library for massively parallel rendering of complex closed-form
//! implicit surfaces.
//!
//! An **implicit surface** is a function `f(x, y, z)`, where `x`, `y`, and `z`
//! represent a position in 3D space.  By convention, if `f(x, y, z) < 0`, then
//! that position is **inside** the shape; if it's `> 0`, then that position is
//! **outside** the shape; otherwise, it's on the boundary of the shape.
//!
//! # Shape construction
//! Shapes are built as [`Tree`](crate::tree::Tree) expressions, either with
//! operator overloading or by parsing a `.vm` text file:
//! ```
//! use mpr::{tape::Tape, tree::Tree};
//!
//! let (x, y, z) = Tree::axes();
//! let sphere = (x.square() + y.square() + z.square()).sqrt() - 1.0;
//! let tape = Tape::new(&sphere)?;
//! assert_eq!(tape.choice_count(), 0);
//!
//! let text = "_0 var-x\n_1 var-y\n_2 min _0 _1\n";
//! let tape = Tape::from_text(text.as_bytes())?;
//! assert_eq!(tape.choice_count(), 1);
//! # Ok::<(), mpr::Error>(())
//! ```
//!
//! # Evaluation
//! A tree is compiled into a [`Tape`](crate::tape::Tape), which is a flat
//! list of instructions for a simple register machine.  Slots 0, 1, and 2
//! hold the `x`, `y`, and `z` inputs.
//!
//! For rendering, the tape is copied into a shared [`TapeData`] arena.  The
//! same [`Interpreter`](crate::eval::Interpreter) evaluates it with different
//! value types:
//!
//! - [`Interval`](crate::types::Interval) evaluation conservatively proves
//!   large regions of space to be empty or full, and records which branch of
//!   each `min` / `max` was taken.
//! - [`Pair`](crate::types::Pair) evaluation computes occupancy of two voxels
//!   at a time.
//! - [`Grad`](crate::types::Grad) evaluation computes partial derivatives,
//!   which become surface normals.
//!
//! After interval evaluation, the tape can be [`shrink`](crate::shrink)-ed:
//! branches which are never taken in a region of space are pruned, along with
//! any instructions that only fed into them.
//! ```
//! use mpr::{eval::Interpreter, shrink::shrink, tape::{Tape, TapeData}};
//! use mpr::{tree::Tree, types::Interval};
//!
//! let (x, y, _z) = Tree::axes();
//! let tape = Tape::new(&x.min(y))?;
//! let mut data = TapeData::new(&tape, 64, 1024)?;
//! data.reserve(128);
//!
//! let mut eval = Interpreter::<Interval>::new();
//! let r = eval.eval(
//!     &data,
//!     0,
//!     Interval::new(-1.0, 1.0),
//!     Interval::new(2.0, 3.0),
//!     Interval::new(0.0, 1.0),
//! )?;
//! assert!(r.has_choice);
//!
//! let start = shrink(&data, 0, r.end, eval.choices())?;
//! assert_eq!(data.walk(start)?.len(), 2); // copy x, then end
//! # Ok::<(), mpr::Error>(())
//! ```
//!
//! # Rendering
//! Rendering is hierarchical: tiles are evaluated with interval arithmetic,
//! ambiguous tiles are subdivided with their shrunk tapes, and the smallest
//! tiles are evaluated voxel-by-voxel.  Every stage runs as a flat parallel
//! pass (using [`rayon`]), with atomic depth maps used to skip work that is
//! hidden behind filled geometry.
//! ```
//! use mpr::{render::{RenderConfig, VoxelSize}, tape::Tape, tree::Tree};
//!
//! let (x, y, z) = Tree::axes();
//! let tape = Tape::new(&(x.square() + y.square() + z.square() - 0.5))?;
//! let cfg = RenderConfig {
//!     image_size: VoxelSize::cube(64)?,
//!     ..Default::default()
//! };
//! let (depth, normals) = cfg.run(&tape)?;
//! assert_eq!(depth.len(), 64 * 64);
//! assert!(depth[(32, 32)] > 32);
//! assert_eq!(depth[(0, 0)], 0);
//! assert_eq!(normals[(0, 0)], [0; 4]);
//! # Ok::<(), mpr::Error>(())
//! ```
//!
//!
//! The same tile hierarchy renders the `z = 0` plane into a filled / empty
//! mask, splitting tiles only along X and Y:
//! ```
//! use mpr::{render::{ImageRenderConfig, ImageSize}, tape::Tape, tree::Tree};
//!
//! let (x, y, _z) = Tree::axes();
//! let tape = Tape::new(&(x.square() + y.square() - 0.5))?;
//! let cfg = ImageRenderConfig {
//!     image_size: ImageSize::square(64)?,
//!     ..Default::default()
//! };
//! let mask = cfg.run(&tape)?;
//! assert!(mask[(32, 32)]);
//! assert!(!mask[(0, 0)]);
//! # Ok::<(), mpr::Error>(())
//! ```
//!
//! [`TapeData`]: crate::tape::TapeData
pub mod eval;
pub mod render;
pub mod shrink;
pub mod tape;
pub mod tree;
pub mod types;

mod error;

pub use error::Error;

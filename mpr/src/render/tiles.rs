//! Tile lists and subdivision
use crate::Error;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Number of tiles which share a single atomic increment in
/// [`assign_indices`]
const GROUP_SIZE: usize = 64;

/// Classification of a tile after interval evaluation
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum TileClass {
    /// Not yet evaluated, or the surface may pass through the tile
    #[default]
    Ambiguous,
    /// The tile is entirely outside the shape
    Empty,
    /// The tile is entirely inside the shape
    Filled,
    /// The tile is hidden behind filled geometry
    Occluded,
}

/// A square or cubic region of the render volume
///
/// In 2D, every tile has a Z corner of 0 and spans a single slice.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Tile {
    /// Lowest corner of the tile, in voxel coordinates
    pub corner: [u32; 3],
    /// Start of the tape which is valid within this tile
    pub tape: u32,
    /// Result of the most recent evaluation
    pub class: TileClass,
    /// Position of this tile's children in the next stage's tile list
    ///
    /// Only ambiguous tiles have children; for subdivision into `N` children,
    /// they are stored at `next * N .. (next + 1) * N`, ordered as in
    /// [`child_offset`].
    pub next: Option<u32>,
}

impl Tile {
    /// Builds a new (unevaluated) tile
    pub fn new(corner: [u32; 3], tape: u32) -> Self {
        Self {
            corner,
            tape,
            ..Self::default()
        }
    }
}

/// Builds the root tile grid, ordered with X varying fastest
pub(crate) fn root_tiles(grid: [usize; 3], size: u32, tape: u32) -> Vec<Tile> {
    let [nx, ny, nz] = grid;
    let mut out = Vec::with_capacity(nx * ny * nz);
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                let corner = [x, y, z].map(|i| i as u32 * size);
                out.push(Tile::new(corner, tape));
            }
        }
    }
    out
}

/// Returns the offset of a child within its parent's block of children
///
/// `pos` is a voxel position relative to the parent's corner, `size` is the
/// child tile size, and `n` is the number of children along each axis.
#[inline]
pub(crate) fn child_offset(pos: [u32; 3], size: u32, n: usize) -> usize {
    let [x, y, z] = pos.map(|p| (p / size) as usize);
    x + n * (y + n * z)
}

/// Assigns a dense index to every ambiguous tile, clearing the rest
///
/// Tiles are processed in groups, with a single atomic increment per group
/// claiming a contiguous range of indices.  Returns the number of ambiguous
/// tiles.
pub(crate) fn assign_indices(tiles: &mut [Tile]) -> usize {
    let counter = AtomicUsize::new(0);
    tiles.par_chunks_mut(GROUP_SIZE).for_each(|group| {
        let count = group
            .iter()
            .filter(|t| t.class == TileClass::Ambiguous)
            .count();
        let mut next = if count > 0 {
            counter.fetch_add(count, Ordering::Relaxed)
        } else {
            0
        };
        for t in group.iter_mut() {
            t.next = if t.class == TileClass::Ambiguous {
                next += 1;
                Some((next - 1) as u32)
            } else {
                None
            };
        }
    });
    counter.into_inner()
}

/// Builds the map from destination index to source tile
fn inverse(tiles: &[Tile], count: usize) -> Result<Vec<usize>, Error> {
    let mut order = vec![usize::MAX; count];
    for (i, t) in tiles.iter().enumerate() {
        if let Some(next) = t.next {
            let next = next as usize;
            *order
                .get_mut(next)
                .ok_or(Error::TileOverflow(next, count))? = i;
        }
    }
    if let Some(i) = order.iter().position(|o| *o == usize::MAX) {
        return Err(Error::TileOverflow(i, tiles.len()));
    }
    Ok(order)
}

/// Returns the number of children for a split of `n` along `dim` axes
#[inline]
pub(crate) fn children(n: usize, dim: u32) -> usize {
    n.pow(dim)
}

/// Subdivides every tile with a destination index into `n^dim` children
///
/// `count` is the number of destination indices (as returned by
/// [`assign_indices`]) and `size` is the child tile size.  With `dim = 2`,
/// tiles are only split along X and Y.  Children inherit their parent's
/// tape.
pub(crate) fn expand(
    tiles: &[Tile],
    count: usize,
    size: u32,
    n: usize,
    dim: u32,
) -> Result<Vec<Tile>, Error> {
    let order = inverse(tiles, count)?;
    let per = children(n, dim);
    let mut out = vec![Tile::default(); count * per];
    out.par_chunks_mut(per)
        .zip(order.par_iter())
        .for_each(|(children, &i)| {
            let parent = &tiles[i];
            for (j, c) in children.iter_mut().enumerate() {
                let offset = [j % n, (j / n) % n, j / (n * n)];
                let corner = std::array::from_fn(|a| {
                    parent.corner[a] + offset[a] as u32 * size
                });
                *c = Tile::new(corner, parent.tape);
            }
        });
    Ok(out)
}

/// Copies every tile with a destination index into a dense list
pub(crate) fn compact(
    tiles: &[Tile],
    count: usize,
) -> Result<Vec<Tile>, Error> {
    let order = inverse(tiles, count)?;
    Ok(order
        .par_iter()
        .map(|&i| Tile::new(tiles[i].corner, tiles[i].tape))
        .collect())
}

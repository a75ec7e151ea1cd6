//! Hierarchical 2D and 3D rendering
//!
//! Rendering runs as a series of stages, each of which is a flat parallel
//! pass over a list of tiles:
//!
//! - Interval stages evaluate each tile's tape over the tile's bounding box,
//!   classifying it as empty, filled, occluded, or ambiguous.  Ambiguous tiles
//!   get a shrunk tape and are subdivided into the next stage.
//! - The voxel stage evaluates pairs of voxels within each leaf tile (or, in
//!   2D, the pixel stage evaluates pairs of pixels).
//! - Depth maps from every stage are merged into a single image.
//! - In 3D, the normal stage evaluates partial derivatives at each visible
//!   voxel.
//!
//! To render something, build a [`RenderConfig`] (or [`ImageRenderConfig`])
//! then call its `run` method, or build a [`Renderer`] (or
//! [`ImageRenderer`]) to reuse its buffers.
use crate::{
    Error,
    eval::Interpreter,
    shrink::shrink,
    tape::TapeData,
    types::Interval,
};
use nalgebra::{Matrix4, Point3};
use rayon::prelude::*;

mod config;
mod image;
mod render2d;
mod render3d;
mod tiles;
mod view;

pub use config::{
    ImageRenderConfig, ImageSize, RenderConfig, ThreadPool, TileSizes,
    VoxelSize,
};
pub use image::{DepthImage, Image, MaskImage, NormalImage};
pub use render2d::ImageRenderer;
pub use render3d::Renderer;
pub use tiles::{Tile, TileClass};
pub use view::View3;

use image::DepthMap;

/// Statistics from a single interval stage
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct StageStats {
    /// Tile size for this stage, in voxels
    pub tile_size: usize,
    /// Total number of tiles
    pub tiles: usize,
    /// Tiles found to be entirely outside the shape
    pub empty: usize,
    /// Tiles found to be entirely inside the shape
    pub filled: usize,
    /// Tiles hidden behind filled geometry
    pub occluded: usize,
    /// Tiles which are subdivided (or passed to the voxel stage)
    pub ambiguous: usize,
    /// Ambiguous tiles which received a shrunk tape
    pub shrunk: usize,
    /// Words used in the tape arena at the end of the stage
    pub arena_words: usize,
}

/// Statistics from the voxel (or pixel) stage
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct VoxelStats {
    /// Total number of voxel-pair lanes
    pub lanes: usize,
    /// Lanes which were evaluated
    pub evaluated: usize,
    /// Lanes which were skipped, because they were occluded or outside the
    /// render volume
    pub skipped: usize,
}

/// Statistics from a complete render
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RenderStats {
    /// Per-stage statistics, largest tiles first
    pub stages: Vec<StageStats>,
    /// Voxel (or pixel) stage statistics
    pub voxels: VoxelStats,
}

/// Converts a position in voxel coordinates into model coordinates
#[inline]
fn to_model(mat: &Matrix4<f32>, x: f32, y: f32, z: f32) -> Point3<f32> {
    mat.transform_point(&Point3::new(x, y, z))
}

/// Projects a tile's bounding box into model coordinates
///
/// If the matrix has a perspective term, each affine row is divided by the
/// interval `w` row.
fn tile_box(mat: &Matrix4<f32>, corner: [u32; 3], size: u32) -> [Interval; 3] {
    let b = corner.map(|c| Interval::new(c as f32, (c + size) as f32));
    let row = |r: usize| {
        b[0] * mat[(r, 0)]
            + b[1] * mat[(r, 1)]
            + b[2] * mat[(r, 2)]
            + Interval::from(mat[(r, 3)])
    };
    let out = [row(0), row(1), row(2)];
    let affine = mat[(3, 0)] == 0.0
        && mat[(3, 1)] == 0.0
        && mat[(3, 2)] == 0.0
        && mat[(3, 3)] == 1.0;
    if affine {
        out
    } else {
        let w = row(3);
        out.map(|v| v / w)
    }
}

/// Shared state for one interval stage
struct IntervalStage<'a> {
    data: &'a TapeData,
    mat: &'a Matrix4<f32>,
    dims: [u32; 3],
    size: u32,
    /// Depth maps for this stage and every coarser stage
    levels: &'a [DepthMap],
}

impl IntervalStage<'_> {
    /// Evaluates and classifies a single tile
    ///
    /// Returns `true` if the tile was given a shrunk tape.
    fn run(
        &self,
        eval: &mut Interpreter<Interval>,
        tile: &mut Tile,
    ) -> Result<bool, Error> {
        let c = tile.corner;
        if (0..3).any(|i| c[i] >= self.dims[i]) {
            tile.class = TileClass::Empty;
            return Ok(false);
        }
        let top = (c[2] + self.size).min(self.dims[2]);
        let [x, y, z] = tile_box(self.mat, c, self.size);
        let r = eval.eval(self.data, tile.tape as usize, x, y, z)?;

        let (x, y) = (c[0] as usize, c[1] as usize);
        let mut shrunk = false;
        tile.class = if r.value.lower() > 0.0 {
            TileClass::Empty
        } else if self.levels.iter().any(|l| l.get(x, y) >= top) {
            TileClass::Occluded
        } else if r.value.upper() < 0.0 {
            if let Some(level) = self.levels.last() {
                level.fetch_max(x, y, top);
            }
            TileClass::Filled
        } else {
            if r.has_choice {
                let start = tile.tape as usize;
                tile.tape = shrink(self.data, start, r.end, eval.choices())?
                    as u32;
                shrunk = true;
            }
            TileClass::Ambiguous
        };
        Ok(shrunk)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Tile hierarchy shared by the 2D and 3D renderers
///
/// This owns the tape arena, per-stage tile lists, and per-stage depth maps.
/// A 2D render is a volume one voxel deep whose tiles are only split along X
/// and Y; its transform ignores Z.
struct Hierarchy<'a> {
    data: TapeData,
    mat: Matrix4<f32>,
    /// Requested size along each axis, in voxels
    dims: [u32; 3],
    /// Number of axes along which tiles are split (2 or 3)
    dim: u32,
    tile_sizes: TileSizes,
    threads: &'a ThreadPool,

    /// Number of root tiles along each axis
    grid: [usize; 3],
    /// Tile list for each interval stage
    tiles: Vec<Vec<Tile>>,
    /// Ambiguous tiles from the last interval stage
    leaves: Vec<Tile>,
    /// Depth map for each interval stage, with one cell per tile column
    levels: Vec<DepthMap>,

    stats: RenderStats,
}

impl<'a> Hierarchy<'a> {
    fn new(
        data: TapeData,
        mat: Matrix4<f32>,
        dims: [u32; 3],
        dim: u32,
        tile_sizes: &TileSizes,
        threads: &'a ThreadPool,
    ) -> Self {
        let root = tile_sizes.root();
        let grid = dims.map(|v| (v as usize).div_ceil(root));
        let levels = tile_sizes
            .iter()
            .map(|&t| {
                DepthMap::new(grid[0] * root / t, grid[1] * root / t, t)
            })
            .collect();
        Self {
            data,
            mat,
            dims,
            dim,
            tile_sizes: tile_sizes.clone(),
            threads,
            grid,
            tiles: vec![],
            leaves: vec![],
            levels,
            stats: RenderStats::default(),
        }
    }

    /// Width and height of the image (and the leaf-level pixel map)
    fn padded_size(&self) -> (usize, usize) {
        let root = self.tile_sizes.root();
        (self.grid[0] * root, self.grid[1] * root)
    }

    /// Resets the arena, tile lists, and depth maps
    fn reset(&mut self) {
        self.data.reset();
        for l in &mut self.levels {
            l.reset();
        }
        self.tiles = vec![tiles::root_tiles(
            self.grid,
            self.tile_sizes.root() as u32,
            0,
        )];
        self.leaves.clear();
        self.stats = RenderStats::default();
    }

    /// Runs every interval stage in order
    fn run_stages(&mut self) -> Result<(), Error> {
        for i in 0..self.tile_sizes.len() {
            self.run_stage(i)?;
        }
        Ok(())
    }

    /// Runs a single interval stage, then subdivides its ambiguous tiles
    fn run_stage(&mut self, i: usize) -> Result<(), Error> {
        let size = self.tile_sizes[i];
        let list = &mut self.tiles[i];
        self.data.reserve(list.len() * self.data.words_per_tape());

        let ctx = IntervalStage {
            data: &self.data,
            mat: &self.mat,
            dims: self.dims,
            size: size as u32,
            levels: &self.levels[..=i],
        };
        let shrunk = self.threads.run(|| {
            list.par_iter_mut()
                .map_init(Interpreter::new, |eval, tile| {
                    ctx.run(eval, tile).map(usize::from)
                })
                .try_reduce(|| 0, |a, b| Ok(a + b))
        })?;

        let mut stats = StageStats {
            tile_size: size,
            tiles: list.len(),
            shrunk,
            ..StageStats::default()
        };
        for t in list.iter() {
            match t.class {
                TileClass::Empty => stats.empty += 1,
                TileClass::Filled => stats.filled += 1,
                TileClass::Occluded => stats.occluded += 1,
                TileClass::Ambiguous => stats.ambiguous += 1,
            }
        }

        let count = self.threads.run(|| tiles::assign_indices(list));
        if i + 1 < self.tile_sizes.len() {
            let next_size = self.tile_sizes[i + 1] as u32;
            let n = self.tile_sizes.split(i);
            let dim = self.dim;
            let next = self
                .threads
                .run(|| tiles::expand(list, count, next_size, n, dim))?;
            self.tiles.push(next);
        } else {
            self.leaves = self.threads.run(|| tiles::compact(list, count))?;
        }

        stats.arena_words = self.data.used();
        log::debug!(
            "stage {i} (size {size}): {} tiles, {} empty, {} filled, \
             {} occluded, {} ambiguous ({} shrunk); arena at {} words",
            stats.tiles,
            stats.empty,
            stats.filled,
            stats.occluded,
            stats.ambiguous,
            stats.shrunk,
            stats.arena_words,
        );
        self.stats.stages.push(stats);
        Ok(())
    }

    /// Records and logs statistics from the voxel (or pixel) stage
    fn finish_lanes(&mut self, kind: &str, lanes: usize, evaluated: usize) {
        let stats = VoxelStats {
            lanes,
            evaluated,
            skipped: lanes - evaluated,
        };
        log::debug!(
            "{kind}: {} leaf tiles, {} lanes, {} evaluated, {} skipped",
            self.leaves.len(),
            stats.lanes,
            stats.evaluated,
            stats.skipped
        );
        self.stats.voxels = stats;
    }

    /// Finds the tape for the deepest tile containing the given voxel
    fn find_tape(&self, pos: [u32; 3]) -> Result<usize, Error> {
        let root = self.tile_sizes.root() as u32;
        let [gx, gy, _] = self.grid;
        let [x, y, z] = pos.map(|p| (p / root) as usize);
        let index = x + gx * (y + gy * z);
        let mut tile = self.tiles[0]
            .get(index)
            .ok_or(Error::TileOverflow(index, self.tiles[0].len()))?;

        let stages = self.tile_sizes.len();
        for i in 0..stages {
            let Some(next) = tile.next else {
                break;
            };
            let next = next as usize;
            if i + 1 == stages {
                tile = self
                    .leaves
                    .get(next)
                    .ok_or(Error::TileOverflow(next, self.leaves.len()))?;
                break;
            }
            let n = self.tile_sizes.split(i);
            let size = self.tile_sizes[i + 1] as u32;
            let rel = std::array::from_fn(|a| pos[a] - tile.corner[a]);
            let j = next * tiles::children(n, self.dim)
                + tiles::child_offset(rel, size, n);
            let list = &self.tiles[i + 1];
            tile = list.get(j).ok_or(Error::TileOverflow(j, list.len()))?;
        }
        Ok(tile.tape as usize)
    }
}

//! Volumetric rendering into depth and normal images
use super::{
    DepthImage, DepthMap, Hierarchy, Image, NormalImage, RenderConfig,
    RenderStats, Tile, to_model,
};
use crate::{
    Error,
    eval::Interpreter,
    tape::{Tape, TapeData},
    types::{Grad, Pair},
};
use nalgebra::Matrix4;
use rayon::prelude::*;

/// Shared state for the voxel stage
struct VoxelStage<'a> {
    data: &'a TapeData,
    mat: &'a Matrix4<f32>,
    dims: [usize; 3],
    size: usize,
    leaves: &'a [Tile],
    levels: &'a [DepthMap],
    voxels: &'a DepthMap,
}

impl VoxelStage<'_> {
    /// Number of lanes within each leaf tile
    fn lanes_per_tile(&self) -> usize {
        self.size * self.size * self.size / 2
    }

    /// Evaluates a single pair of voxels
    ///
    /// Lanes are ordered by tile, then column, then Z (from the top of the
    /// column down).  Returns `true` if the lane was evaluated.
    fn run(
        &self,
        eval: &mut Interpreter<Pair>,
        lane: usize,
    ) -> Result<bool, Error> {
        let pairs = self.size / 2;
        let tile = &self.leaves[lane / self.lanes_per_tile()];
        let rem = lane % self.lanes_per_tile();
        let (col, pair) = (rem / pairs, rem % pairs);

        let [w, h, d] = self.dims;
        let x = tile.corner[0] as usize + col % self.size;
        let y = tile.corner[1] as usize + col / self.size;
        let z1 = tile.corner[2] as usize + self.size - 1 - 2 * pair;
        let z0 = z1 - 1;
        if x >= w || y >= h || z0 >= d {
            return Ok(false);
        }
        let top = (if z1 < d { z1 + 1 } else { z0 + 1 }) as u32;
        if self.voxels.get(x, y) >= top
            || self.levels.iter().any(|l| l.get(x, y) >= top)
        {
            return Ok(false);
        }

        let [p0, p1] = [z0, z1].map(|z| {
            to_model(self.mat, x as f32 + 0.5, y as f32 + 0.5, z as f32 + 0.5)
        });
        let r = eval.eval(
            self.data,
            tile.tape as usize,
            Pair::new(p0.x, p1.x),
            Pair::new(p0.y, p1.y),
            Pair::new(p0.z, p1.z),
        )?;
        if z1 < d && r.value[1] < 0.0 {
            self.voxels.fetch_max(x, y, z1 as u32 + 1);
        } else if r.value[0] < 0.0 {
            self.voxels.fetch_max(x, y, z0 as u32 + 1);
        }
        Ok(true)
    }
}

/// Packs a gradient into an RGBA color
fn pack_normal(g: Grad) -> [u8; 4] {
    match g.normalized() {
        Some(n) => {
            let [r, g, b] =
                [n.x, n.y, n.z].map(|v| ((v * 0.5 + 0.5) * 255.0) as u8);
            [r, g, b, 255]
        }
        None => [0, 0, 0, 255],
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Hierarchical 3D renderer
///
/// The renderer owns the tape arena, tile lists, and depth maps for a single
/// tape and configuration.  It may be run multiple times; each run starts
/// from a freshly reset state and produces identical images.
pub struct Renderer<'a> {
    hier: Hierarchy<'a>,
    /// Per-pixel depth map, written by the voxel stage
    voxels: DepthMap,
}

impl<'a> Renderer<'a> {
    /// Builds a new renderer, copying the tape into a fresh arena
    pub fn new(tape: &Tape, config: &RenderConfig<'a>) -> Result<Self, Error> {
        let data = TapeData::new(tape, config.chunk_size, config.arena_limit)?;
        let size = config.image_size;
        let hier = Hierarchy::new(
            data,
            config.mat(),
            [size.width(), size.height(), size.depth()],
            3,
            &config.tile_sizes,
            config.threads,
        );
        let (w, h) = hier.padded_size();
        Ok(Self {
            hier,
            voxels: DepthMap::new(w, h, 1),
        })
    }

    /// Renders the tape, returning depth and normal images
    ///
    /// In the depth image, `0` means that the column is empty; otherwise, a
    /// value of `z + 1` means that voxel `z` is the nearest filled voxel.
    /// Empty pixels in the normal image are `[0, 0, 0, 0]`.
    pub fn run(&mut self) -> Result<(DepthImage, NormalImage), Error> {
        self.reset();
        self.hier.run_stages()?;
        self.run_voxels()?;
        let depth = self.merge();
        let normals = self.normals(&depth)?;
        Ok((depth, normals))
    }

    /// Returns statistics from the most recent run
    pub fn stats(&self) -> &RenderStats {
        &self.hier.stats
    }

    /// Returns the tile list for a given stage of the most recent run
    pub fn tiles(&self, stage: usize) -> Option<&[Tile]> {
        self.hier.tiles.get(stage).map(|t| t.as_slice())
    }

    /// Resets the arena, tile lists, and depth maps
    fn reset(&mut self) {
        self.hier.reset();
        self.voxels.reset();
    }

    /// Evaluates every voxel in the leaf tiles, in Z-adjacent pairs
    fn run_voxels(&mut self) -> Result<(), Error> {
        let h = &self.hier;
        let ctx = VoxelStage {
            data: &h.data,
            mat: &h.mat,
            dims: h.dims.map(|d| d as usize),
            size: h.tile_sizes.last(),
            leaves: &h.leaves,
            levels: &h.levels,
            voxels: &self.voxels,
        };
        let lanes = h.leaves.len() * ctx.lanes_per_tile();
        let column = ctx.size / 2;
        let evaluated = h.threads.run(|| {
            (0..lanes)
                .into_par_iter()
                .with_min_len(column)
                .map_init(Interpreter::new, |eval, lane| {
                    ctx.run(eval, lane).map(usize::from)
                })
                .try_reduce(|| 0, |a, b| Ok(a + b))
        })?;
        self.hier.finish_lanes("voxels", lanes, evaluated);
        Ok(())
    }

    /// Merges every depth map into a single image
    fn merge(&self) -> DepthImage {
        let h = &self.hier;
        let width = h.dims[0] as usize;
        let height = h.dims[1] as usize;
        let data: Vec<u32> = h.threads.run(|| {
            (0..width * height)
                .into_par_iter()
                .map(|i| {
                    let (x, y) = (i % width, i / width);
                    h.levels
                        .iter()
                        .map(|l| l.get(x, y))
                        .fold(self.voxels.get(x, y), u32::max)
                })
                .collect()
        });
        Image::from_data(data, width, height)
    }

    /// Evaluates normals for every non-empty pixel
    fn normals(&self, depth: &DepthImage) -> Result<NormalImage, Error> {
        let h = &self.hier;
        let width = depth.width();
        let data = h.threads.run(|| {
            (0..depth.len())
                .into_par_iter()
                .map_init(Interpreter::<Grad>::new, |eval, i| {
                    let d = depth[i];
                    if d == 0 {
                        return Ok([0; 4]);
                    }
                    let x = (i % width) as u32;
                    let y = (i / width) as u32;
                    let z = d - 1;
                    let tape = h.find_tape([x, y, z])?;
                    let p = to_model(
                        &h.mat,
                        x as f32 + 0.5,
                        y as f32 + 0.5,
                        z as f32 + 0.5,
                    );
                    let r = eval.eval(
                        &h.data,
                        tape,
                        Grad::new(p.x, 1.0, 0.0, 0.0),
                        Grad::new(p.y, 0.0, 1.0, 0.0),
                        Grad::new(p.z, 0.0, 0.0, 1.0),
                    )?;
                    Ok::<_, Error>(pack_normal(r.value))
                })
                .collect::<Result<Vec<[u8; 4]>, Error>>()
        })?;
        Ok(Image::from_data(data, width, depth.height()))
    }
}

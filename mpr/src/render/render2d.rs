//! Rendering of the `z = 0` plane into a filled / empty mask
use super::{
    DepthMap, Hierarchy, Image, ImageRenderConfig, MaskImage, RenderStats,
    Tile, to_model,
};
use crate::{
    Error,
    eval::Interpreter,
    tape::{Tape, TapeData},
    types::Pair,
};
use nalgebra::{Matrix3, Matrix4};
use rayon::prelude::*;

/// Embeds a 2D homogeneous transform into a 3D one that ignores Z
///
/// The model-space Z coordinate is always 0.
fn embed(m: &Matrix3<f32>) -> Matrix4<f32> {
    Matrix4::new(
        m[(0, 0)],
        m[(0, 1)],
        0.0,
        m[(0, 2)],
        m[(1, 0)],
        m[(1, 1)],
        0.0,
        m[(1, 2)],
        0.0,
        0.0,
        0.0,
        0.0,
        m[(2, 0)],
        m[(2, 1)],
        0.0,
        m[(2, 2)],
    )
}

/// Shared state for the pixel stage
struct PixelStage<'a> {
    data: &'a TapeData,
    mat: &'a Matrix4<f32>,
    dims: [usize; 2],
    size: usize,
    leaves: &'a [Tile],
    pixels: &'a DepthMap,
}

impl PixelStage<'_> {
    /// Number of lanes within each leaf tile
    fn lanes_per_tile(&self) -> usize {
        self.size * self.size / 2
    }

    /// Evaluates a pair of X-adjacent pixels
    ///
    /// Lanes are ordered by tile, then row, then X.  Returns `true` if the
    /// lane was evaluated.
    fn run(
        &self,
        eval: &mut Interpreter<Pair>,
        lane: usize,
    ) -> Result<bool, Error> {
        let pairs = self.size / 2;
        let tile = &self.leaves[lane / self.lanes_per_tile()];
        let rem = lane % self.lanes_per_tile();
        let (row, pair) = (rem / pairs, rem % pairs);

        let [w, h] = self.dims;
        let x0 = tile.corner[0] as usize + 2 * pair;
        let x1 = x0 + 1;
        let y = tile.corner[1] as usize + row;
        if x0 >= w || y >= h {
            return Ok(false);
        }

        let [p0, p1] = [x0, x1]
            .map(|x| to_model(self.mat, x as f32 + 0.5, y as f32 + 0.5, 0.0));
        let r = eval.eval(
            self.data,
            tile.tape as usize,
            Pair::new(p0.x, p1.x),
            Pair::new(p0.y, p1.y),
            Pair::new(p0.z, p1.z),
        )?;
        if r.value[0] < 0.0 {
            self.pixels.fetch_max(x0, y, 1);
        }
        if x1 < w && r.value[1] < 0.0 {
            self.pixels.fetch_max(x1, y, 1);
        }
        Ok(true)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Hierarchical 2D renderer
///
/// Tiles are squares in the image plane, split into `n²` children at each
/// stage; the leaf stage evaluates pairs of pixels.  Like [`Renderer`], it
/// may be run multiple times.
///
/// [`Renderer`]: crate::render::Renderer
pub struct ImageRenderer<'a> {
    hier: Hierarchy<'a>,
    /// Per-pixel map written by the pixel stage, with `1` for filled pixels
    pixels: DepthMap,
}

impl<'a> ImageRenderer<'a> {
    /// Builds a new renderer, copying the tape into a fresh arena
    pub fn new(
        tape: &Tape,
        config: &ImageRenderConfig<'a>,
    ) -> Result<Self, Error> {
        let data = TapeData::new(tape, config.chunk_size, config.arena_limit)?;
        let size = config.image_size;
        let hier = Hierarchy::new(
            data,
            embed(&config.mat()),
            [size.width(), size.height(), 1],
            2,
            &config.tile_sizes,
            config.threads,
        );
        let (w, h) = hier.padded_size();
        Ok(Self {
            hier,
            pixels: DepthMap::new(w, h, 1),
        })
    }

    /// Renders the tape, returning an image which is `true` inside the shape
    pub fn run(&mut self) -> Result<MaskImage, Error> {
        self.hier.reset();
        self.pixels.reset();
        self.hier.run_stages()?;
        self.run_pixels()?;
        Ok(self.merge())
    }

    /// Returns statistics from the most recent run
    pub fn stats(&self) -> &RenderStats {
        &self.hier.stats
    }

    /// Returns the tile list for a given stage of the most recent run
    pub fn tiles(&self, stage: usize) -> Option<&[Tile]> {
        self.hier.tiles.get(stage).map(|t| t.as_slice())
    }

    fn run_pixels(&mut self) -> Result<(), Error> {
        let h = &self.hier;
        let ctx = PixelStage {
            data: &h.data,
            mat: &h.mat,
            dims: [h.dims[0] as usize, h.dims[1] as usize],
            size: h.tile_sizes.last(),
            leaves: &h.leaves,
            pixels: &self.pixels,
        };
        let lanes = h.leaves.len() * ctx.lanes_per_tile();
        let row = ctx.size / 2;
        let evaluated = h.threads.run(|| {
            (0..lanes)
                .into_par_iter()
                .with_min_len(row)
                .map_init(Interpreter::new, |eval, lane| {
                    ctx.run(eval, lane).map(usize::from)
                })
                .try_reduce(|| 0, |a, b| Ok(a + b))
        })?;
        self.hier.finish_lanes("pixels", lanes, evaluated);
        Ok(())
    }

    /// Merges filled tiles from every stage with the pixel map
    fn merge(&self) -> MaskImage {
        let h = &self.hier;
        let width = h.dims[0] as usize;
        let height = h.dims[1] as usize;
        let data: Vec<bool> = h.threads.run(|| {
            (0..width * height)
                .into_par_iter()
                .map(|i| {
                    let (x, y) = (i % width, i / width);
                    self.pixels.get(x, y) > 0
                        || h.levels.iter().any(|l| l.get(x, y) > 0)
                })
                .collect()
        });
        Image::from_data(data, width, height)
    }
}

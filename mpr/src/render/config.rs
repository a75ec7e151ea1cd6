//! Render configuration
use crate::{
    Error,
    render::{DepthImage, ImageRenderer, MaskImage, NormalImage, Renderer},
    tape::Tape,
};
use nalgebra::{Matrix3, Matrix4};
use std::num::NonZeroUsize;

/// Pool in which every render stage runs its parallel passes
///
/// Stages are `rayon` parallel iterators; they run on the global pool unless
/// a custom pool is given.
pub enum ThreadPool {
    /// Dedicated pool, built with [`ThreadPool::with_threads`]
    Custom(rayon::ThreadPool),
    /// Global Rayon pool
    Global,
}

impl ThreadPool {
    /// Builds a pool with the given number of worker threads
    ///
    /// `None` selects the global pool.
    pub fn with_threads(threads: Option<NonZeroUsize>) -> Result<Self, Error> {
        let Some(n) = threads else {
            return Ok(ThreadPool::Global);
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n.get())
            .thread_name(|i| format!("mpr-worker-{i}"))
            .build()?;
        Ok(ThreadPool::Custom(pool))
    }

    /// Runs a stage (or any other parallel job) within the pool
    pub fn run<F: FnOnce() -> V + Send, V: Send>(&self, f: F) -> V {
        match self {
            ThreadPool::Custom(p) => p.install(f),
            ThreadPool::Global => f(),
        }
    }

    /// Returns the number of worker threads
    pub fn thread_count(&self) -> usize {
        match self {
            ThreadPool::Custom(p) => p.current_num_threads(),
            ThreadPool::Global => rayon::current_num_threads(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Size of a 2D image, in pixels
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ImageSize {
    width: u32,
    height: u32,
}

impl ImageSize {
    /// Builds a new image size, which must be non-zero on both axes
    pub fn new(width: u32, height: u32) -> Result<Self, Error> {
        if width == 0 || height == 0 {
            Err(Error::EmptyImage)
        } else {
            Ok(Self { width, height })
        }
    }

    /// Builds a square image
    pub fn square(size: u32) -> Result<Self, Error> {
        Self::new(size, size)
    }

    /// Returns the width (number of columns), in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height (number of rows), in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the screen-to-world transform
    ///
    /// The larger dimension spans `[-1, 1]` in world space, matching
    /// [`VoxelSize::screen_to_world`] on the X and Y axes.
    pub fn screen_to_world(&self) -> Matrix3<f32> {
        let s = self.width.max(self.height) as f32;
        let (w, h) = (self.width as f32, self.height as f32);
        Matrix3::new(
            2.0 / s,
            0.0,
            -w / s,
            0.0,
            -2.0 / s,
            h / s,
            0.0,
            0.0,
            1.0,
        )
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Size of a render volume, in voxels
///
/// The image has `width` columns and `height` rows; `depth` is the number of
/// voxels evaluated in each column, with larger Z closer to the viewer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VoxelSize {
    width: u32,
    height: u32,
    depth: u32,
}

impl VoxelSize {
    /// Builds a new volume size, which must be non-zero on every axis
    pub fn new(width: u32, height: u32, depth: u32) -> Result<Self, Error> {
        if width == 0 || height == 0 || depth == 0 {
            Err(Error::EmptyImage)
        } else {
            Ok(Self {
                width,
                height,
                depth,
            })
        }
    }

    /// Builds a cube with the same size on every axis
    pub fn cube(size: u32) -> Result<Self, Error> {
        Self::new(size, size, size)
    }

    /// Returns the width (number of columns), in voxels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height (number of rows), in voxels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the depth, in voxels
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Returns the largest dimension
    fn scale(&self) -> u32 {
        self.width.max(self.height).max(self.depth)
    }

    /// Returns the screen-to-world transform
    ///
    /// The largest dimension of the volume spans the range `[-1, 1]` in world
    /// space, and the volume is centered on the origin.  Row 0 is at the top
    /// of the image, so the Y axis is flipped.
    pub fn screen_to_world(&self) -> Matrix4<f32> {
        let s = self.scale() as f32;
        let (w, h, d) =
            (self.width as f32, self.height as f32, self.depth as f32);
        Matrix4::new(
            2.0 / s,
            0.0,
            0.0,
            -w / s,
            0.0,
            -2.0 / s,
            0.0,
            h / s,
            0.0,
            0.0,
            2.0 / s,
            -d / s,
            0.0,
            0.0,
            0.0,
            1.0,
        )
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Tile sizes for each stage of hierarchical evaluation
///
/// Sizes are in voxels (or pixels), largest first.  Each size must evenly
/// divide the one before it, and the last (leaf) size must be even, since
/// leaf tiles are evaluated in pairs of voxels along Z (or pixels along X).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TileSizes(Vec<usize>);

impl std::ops::Index<usize> for TileSizes {
    type Output = usize;

    fn index(&self, i: usize) -> &Self::Output {
        &self.0[i]
    }
}

impl TileSizes {
    /// Builds a new tile size list, checking invariants
    pub fn new(sizes: &[usize]) -> Result<Self, Error> {
        let Some(&last) = sizes.last() else {
            return Err(Error::EmptyTileSizes);
        };
        for i in 1..sizes.len() {
            if sizes[i - 1] <= sizes[i] {
                return Err(Error::BadTileOrder(sizes[i - 1], sizes[i]));
            } else if sizes[i - 1] % sizes[i] != 0 {
                return Err(Error::BadTileSize(sizes[i - 1], sizes[i]));
            }
        }
        if last == 0 || last % 2 != 0 {
            return Err(Error::BadLeafTileSize(last));
        }
        Ok(Self(sizes.to_vec()))
    }

    /// Returns the number of stages
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Checks whether the list is empty (which is never true)
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the first (largest) tile size
    pub fn root(&self) -> usize {
        self.0[0]
    }

    /// Returns the last (smallest) tile size
    pub fn last(&self) -> usize {
        self.0[self.0.len() - 1]
    }

    /// Gets a tile size by index
    pub fn get(&self, i: usize) -> Option<usize> {
        self.0.get(i).copied()
    }

    /// Iterates over tile sizes, largest first
    pub fn iter(&self) -> impl Iterator<Item = &usize> + '_ {
        self.0.iter()
    }

    /// Returns the number of children along each axis when a tile at stage
    /// `i` is subdivided into stage `i + 1`
    pub fn split(&self, i: usize) -> usize {
        self.0[i] / self.0[i + 1]
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Settings for 3D rendering
pub struct RenderConfig<'a> {
    /// Render size
    ///
    /// The resulting image will have the given width and height; depth sets
    /// the number of voxels to evaluate within each pixel of the image
    /// (stacked into a column going into the screen).
    pub image_size: VoxelSize,

    /// World-to-model transform
    ///
    /// This may include a perspective term in its bottom row.
    pub world_to_model: Matrix4<f32>,

    /// Tile sizes to use during evaluation
    pub tile_sizes: TileSizes,

    /// Size of each tape arena chunk, in words
    pub chunk_size: usize,

    /// Maximum size of the tape arena, in words
    pub arena_limit: usize,

    /// Thread pool to use for rendering
    pub threads: &'a ThreadPool,
}

impl Default for RenderConfig<'_> {
    fn default() -> Self {
        Self {
            image_size: VoxelSize {
                width: 512,
                height: 512,
                depth: 512,
            },
            world_to_model: Matrix4::identity(),
            tile_sizes: TileSizes(vec![64, 16, 4]),
            chunk_size: 64,
            arena_limit: 1 << 24,
            threads: &ThreadPool::Global,
        }
    }
}

impl RenderConfig<'_> {
    /// Renders a tape using this configuration
    ///
    /// Returns a depth image and a normal image, both with the configured
    /// width and height.
    pub fn run(&self, tape: &Tape) -> Result<(DepthImage, NormalImage), Error> {
        Renderer::new(tape, self)?.run()
    }

    /// Returns the combined screen-to-model transform matrix
    pub fn mat(&self) -> Matrix4<f32> {
        self.world_to_model * self.image_size.screen_to_world()
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Settings for 2D rendering
pub struct ImageRenderConfig<'a> {
    /// Render size
    pub image_size: ImageSize,

    /// World-to-model transform
    ///
    /// This may include a perspective term in its bottom row.
    pub world_to_model: Matrix3<f32>,

    /// Tile sizes to use during evaluation
    pub tile_sizes: TileSizes,

    /// Size of each tape arena chunk, in words
    pub chunk_size: usize,

    /// Maximum size of the tape arena, in words
    pub arena_limit: usize,

    /// Thread pool to use for rendering
    pub threads: &'a ThreadPool,
}

impl Default for ImageRenderConfig<'_> {
    fn default() -> Self {
        Self {
            image_size: ImageSize {
                width: 512,
                height: 512,
            },
            world_to_model: Matrix3::identity(),
            tile_sizes: TileSizes(vec![64, 8]),
            chunk_size: 64,
            arena_limit: 1 << 24,
            threads: &ThreadPool::Global,
        }
    }
}

impl ImageRenderConfig<'_> {
    /// Renders a tape in the `z = 0` plane, returning a filled / empty mask
    pub fn run(&self, tape: &Tape) -> Result<MaskImage, Error> {
        ImageRenderer::new(tape, self)?.run()
    }

    /// Returns the combined screen-to-model transform matrix
    pub fn mat(&self) -> Matrix3<f32> {
        self.world_to_model * self.image_size.screen_to_world()
    }
}

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::info;

use mpr::render::{
    DepthImage, ImageRenderConfig, ImageRenderer, ImageSize, MaskImage,
    NormalImage, RenderConfig, RenderStats, Renderer, ThreadPool, TileSizes,
    View3, VoxelSize,
};
use mpr::tape::Tape;

/// Massively parallel implicit surface renderer
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    cmd: Command,

    /// Input file, in `.vm` text format
    #[clap(short, long)]
    input: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Renders a depth or normal image
    Render3d {
        #[clap(flatten)]
        settings: ImageSettings,

        /// Output image mode
        #[clap(short, long, value_enum, default_value_t = Mode::Depth)]
        mode: Mode,
    },

    /// Renders the `z = 0` slice as a black-and-white image
    Render2d {
        #[clap(flatten)]
        settings: ImageSettings,
    },
}

#[derive(ValueEnum, Copy, Clone, strum::Display)]
#[strum(serialize_all = "lowercase")]
enum Mode {
    /// Greyscale depth, brighter is closer
    Depth,
    /// Surface normals packed into RGB
    Normals,
}

#[derive(Parser)]
struct ImageSettings {
    /// Name of a `.png` file to write
    #[clap(short, long)]
    out: Option<PathBuf>,

    /// Number of threads to use
    #[clap(short, long)]
    threads: Option<NonZeroUsize>,

    /// Number of times to render (for benchmarking)
    #[clap(short = 'N', default_value_t = 1)]
    n: usize,

    /// Image size (width and height)
    #[clap(short, long, default_value_t = 256)]
    size: u32,

    /// Image depth (defaults to the image size; 3D only)
    #[clap(short, long)]
    depth: Option<u32>,

    /// Tile sizes, from largest to smallest
    #[clap(long, value_delimiter = ',', default_values_t = [64, 16, 4])]
    tile_sizes: Vec<usize>,

    /// Strength of the perspective effect (0 is orthographic; 3D only)
    #[clap(short, long, default_value_t = 0.0)]
    perspective: f32,

    /// Half-size of the view volume, in model units
    #[clap(long, default_value_t = 1.0)]
    scale: f32,
}

////////////////////////////////////////////////////////////////////////////////

fn make_pool(settings: &ImageSettings) -> Result<ThreadPool> {
    let pool = ThreadPool::with_threads(settings.threads)?;
    info!("Rendering with {} threads", pool.thread_count());
    Ok(pool)
}

/// Logs per-stage statistics from the most recent render
fn log_stats(stats: &RenderStats, lane: &str) {
    for s in &stats.stages {
        info!(
            "  {:>3}-{lane} tiles: {} total, {} ambiguous, {} shrunk",
            s.tile_size, s.tiles, s.ambiguous, s.shrunk
        );
    }
    info!(
        "  {lane} lanes: {} evaluated, {} skipped",
        stats.voxels.evaluated, stats.voxels.skipped
    );
}

fn run2d(tape: &Tape, settings: &ImageSettings) -> Result<MaskImage> {
    let pool = make_pool(settings)?;
    let cfg = ImageRenderConfig {
        image_size: ImageSize::square(settings.size)?,
        world_to_model: nalgebra::Matrix3::new_scaling(settings.scale),
        tile_sizes: TileSizes::new(&settings.tile_sizes)?,
        threads: &pool,
        ..Default::default()
    };

    let mut renderer = ImageRenderer::new(tape, &cfg)?;
    let mut out = None;
    for _ in 0..settings.n {
        out = Some(renderer.run()?);
    }
    log_stats(renderer.stats(), "pixel");
    out.context("no render was performed (is -N zero?)")
}

fn run3d(
    tape: &Tape,
    settings: &ImageSettings,
) -> Result<(DepthImage, NormalImage)> {
    let pool = make_pool(settings)?;

    let mut view = View3::from_center_and_scale(
        nalgebra::Vector3::zeros(),
        settings.scale,
    );
    view.set_perspective(settings.perspective);

    let depth = settings.depth.unwrap_or(settings.size);
    let cfg = RenderConfig {
        image_size: VoxelSize::new(settings.size, settings.size, depth)?,
        world_to_model: view.world_to_model(),
        tile_sizes: TileSizes::new(&settings.tile_sizes)?,
        threads: &pool,
        ..Default::default()
    };

    let mut renderer = Renderer::new(tape, &cfg)?;
    let mut out = None;
    for _ in 0..settings.n {
        out = Some(renderer.run()?);
    }

    log_stats(renderer.stats(), "voxel");
    out.context("no render was performed (is -N zero?)")
}

/// Converts a rendered image pair into RGBA bytes
fn to_rgba(depth: &DepthImage, normals: &NormalImage, mode: Mode) -> Vec<u8> {
    match mode {
        Mode::Depth => {
            let z_max = depth.iter().max().cloned().unwrap_or(1).max(1);
            depth
                .iter()
                .flat_map(|&p| {
                    if p > 0 {
                        let z = (p as u64 * 255 / z_max as u64) as u8;
                        [z, z, z, 255]
                    } else {
                        [0, 0, 0, 0]
                    }
                })
                .collect()
        }
        Mode::Normals => depth
            .iter()
            .zip(normals)
            .flat_map(|(&d, p)| {
                if d > 0 {
                    [p[0], p[1], p[2], 255]
                } else {
                    [0, 0, 0, 0]
                }
            })
            .collect(),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .init();

    let now = Instant::now();
    let args = Args::parse();
    let file = std::fs::File::open(&args.input)
        .with_context(|| format!("could not open {:?}", args.input))?;
    let tape = Tape::from_text(std::io::BufReader::new(file))?;
    info!(
        "Loaded file in {:?} ({} instructions, {} choices)",
        now.elapsed(),
        tape.len(),
        tape.choice_count()
    );

    match args.cmd {
        Command::Render2d { settings } => {
            let start = Instant::now();
            let mask = run2d(&tape, &settings)?;
            info!(
                "Rendered {}x at {:?} ms/frame",
                settings.n,
                start.elapsed().as_micros() as f64
                    / 1000.0
                    / (settings.n as f64)
            );

            if let Some(out) = settings.out {
                info!("Writing image to {out:?}");
                let buffer: Vec<u8> = mask
                    .iter()
                    .flat_map(|&p| {
                        if p { [255; 4] } else { [0, 0, 0, 255] }
                    })
                    .collect();
                image::save_buffer(
                    out,
                    &buffer,
                    mask.width() as u32,
                    mask.height() as u32,
                    image::ColorType::Rgba8,
                )?;
            }
        }
        Command::Render3d { settings, mode } => {
            let start = Instant::now();
            let (depth, normals) = run3d(&tape, &settings)?;
            info!(
                "Rendered {}x at {:?} ms/frame",
                settings.n,
                start.elapsed().as_micros() as f64
                    / 1000.0
                    / (settings.n as f64)
            );

            if let Some(out) = settings.out {
                info!("Writing {mode} image to {out:?}");
                let buffer = to_rgba(&depth, &normals, mode);
                image::save_buffer(
                    out,
                    &buffer,
                    depth.width() as u32,
                    depth.height() as u32,
                    image::ColorType::Rgba8,
                )?;
            }
        }
    }
    Ok(())
}

//! Integration tests for hierarchical 3D rendering
use mpr::{
    Error,
    eval::Interpreter,
    render::{
        RenderConfig, Renderer, ThreadPool, TileClass, TileSizes, View3,
        VoxelSize,
    },
    shrink::shrink,
    tape::{Op, Tape, TapeData},
    tree::Tree,
    types::Interval,
};
use nalgebra::{Point3, Vector3};
use std::num::NonZeroUsize;

const SPHERE: &str = include_str!("../../models/sphere.vm");
const BLOBS: &str = include_str!("../../models/blobs.vm");

fn sphere(r: f64) -> Tape {
    let (x, y, z) = Tree::axes();
    Tape::new(&((x.square() + y.square() + z.square()).sqrt() - r)).unwrap()
}

#[test]
fn sphere_silhouette() {
    let size = 32;
    for scale in [1.0, 0.5] {
        let cfg = RenderConfig {
            image_size: VoxelSize::cube(size).unwrap(),
            world_to_model: View3::from_center_and_scale(
                Vector3::zeros(),
                scale,
            )
            .world_to_model(),
            tile_sizes: TileSizes::new(&[8, 2]).unwrap(),
            ..Default::default()
        };
        let m = cfg.image_size.screen_to_world();

        for r in [0.5, 0.75] {
            let (depth, normals) = cfg.run(&sphere(r)).unwrap();

            // ±1 is split into `size` voxels; allow an error of one voxel
            // along each axis, scaled into model units.
            let epsilon = 2.0 / size as f32 * 2.0 * scale;
            for y in 0..size as usize {
                for x in 0..size as usize {
                    let p = depth[(y, x)];
                    if p == size {
                        continue;
                    }
                    let pos = m.transform_point(&Point3::new(
                        x as f32 + 0.5,
                        y as f32 + 0.5,
                        p as f32,
                    )) * scale;
                    if p == 0 {
                        let v = (pos.x.powi(2) + pos.y.powi(2)).sqrt();
                        assert!(
                            v + epsilon > r as f32,
                            "got z = 0 inside the sphere at ({x}, {y}); \
                             radius is {v}"
                        );
                        assert_eq!(normals[(y, x)], [0; 4]);
                    } else {
                        let v = (pos.x.powi(2)
                            + pos.y.powi(2)
                            + pos.z.powi(2))
                        .sqrt();
                        let err = (r as f32 - v).abs();
                        assert!(
                            err < epsilon,
                            "too much error {err} at ({x}, {y}, {p}) \
                             (scale = {scale}); radius is {v}, expected {r}"
                        );
                        assert_eq!(normals[(y, x)][3], 255);
                    }
                }
            }
        }
    }
}

#[test]
fn sphere_normals() {
    let cfg = RenderConfig {
        image_size: VoxelSize::cube(64).unwrap(),
        ..Default::default()
    };
    let (depth, normals) = cfg.run(&sphere(0.8)).unwrap();

    // The center of the sphere faces the viewer (+Z)
    assert!(depth[(32, 32)] > 32);
    let [r, g, b, a] = normals[(32, 32)];
    assert_eq!(a, 255);
    assert!(r.abs_diff(128) < 8, "bad X normal {r}");
    assert!(g.abs_diff(128) < 8, "bad Y normal {g}");
    assert!(b > 245, "bad Z normal {b}");

    // The right-hand edge faces +X
    let edge = (0..64).rev().find(|&x| depth[(32, x)] > 0).unwrap();
    let [r, _, _, _] = normals[(32, edge)];
    assert!(r > 200, "bad X normal {r} at the right edge");
}

#[test]
fn sphere_model_file() {
    let tape = Tape::from_text(SPHERE.as_bytes()).unwrap();
    let cfg = RenderConfig {
        image_size: VoxelSize::cube(32).unwrap(),
        tile_sizes: TileSizes::new(&[4, 2]).unwrap(),
        ..Default::default()
    };
    let mut r = Renderer::new(&tape, &cfg).unwrap();
    let (depth, _normals) = r.run().unwrap();

    // Stage 0 is an 8×8×8 grid; its corners are all outside the sphere
    let tiles = r.tiles(0).unwrap();
    assert_eq!(tiles.len(), 512);
    for t in tiles {
        let corner = t.corner.map(|c| c == 0 || c == 28);
        if corner.iter().all(|c| *c) {
            assert_eq!(t.class, TileClass::Empty, "{t:?}");
        }
    }

    // The silhouette is a circle of radius 16 voxels
    for y in 0..32 {
        for x in 0..32 {
            let dx = x as f32 + 0.5 - 16.0;
            let dy = y as f32 + 0.5 - 16.0;
            let d = (dx * dx + dy * dy).sqrt();
            if d < 15.0 {
                assert!(depth[(y, x)] > 0, "missing surface at ({x}, {y})");
            } else if d > 17.0 {
                assert_eq!(depth[(y, x)], 0, "extra surface at ({x}, {y})");
            }
        }
    }
}

#[test]
fn blobs_rerender() {
    let tape = Tape::from_text(BLOBS.as_bytes()).unwrap();
    assert!(tape.choice_count() > 0);

    let pool = ThreadPool::with_threads(NonZeroUsize::new(3)).unwrap();
    let cfg = RenderConfig {
        image_size: VoxelSize::new(96, 64, 80).unwrap(),
        tile_sizes: TileSizes::new(&[32, 8, 2]).unwrap(),
        threads: &pool,
        ..Default::default()
    };
    let mut r = Renderer::new(&tape, &cfg).unwrap();
    let (d1, n1) = r.run().unwrap();
    let s1 = r.stats().clone();
    let (d2, n2) = r.run().unwrap();
    assert_eq!(d1, d2);
    assert_eq!(n1, n2);
    assert_eq!((d1.width(), d1.height()), (96, 64));
    assert!(d1.iter().all(|d| *d <= 80));

    // Rendering on the global pool gives the same images
    let (d3, n3) = RenderConfig {
        threads: &ThreadPool::Global,
        ..cfg
    }
    .run(&tape)
    .unwrap();
    assert_eq!(d1, d3);
    assert_eq!(n1, n3);

    // The floor is visible in every column
    assert!(d1.iter().all(|d| *d > 0));

    // Classification counts may differ between runs (occlusion races with
    // filling), but the stage structure does not
    let s2 = r.stats();
    assert_eq!(s1.stages.len(), 3);
    assert_eq!(s2.stages.len(), 3);
    assert_eq!(s1.stages[0].tiles, 3 * 2 * 3);
    assert_eq!(s2.stages[0], s1.stages[0]);
    assert!(s2.stages.iter().any(|s| s.shrunk > 0));
    assert!(s2.stages.iter().any(|s| s.filled > 0));
    for s in &s2.stages {
        assert_eq!(s.empty + s.filled + s.occluded + s.ambiguous, s.tiles);
    }
}

#[test]
fn min_shrink() {
    let (x, y, _z) = Tree::axes();
    let tape = Tape::new(&x.min(y)).unwrap();
    let mut data = TapeData::new(&tape, 16, 256).unwrap();
    data.reserve(64);

    // A tile straddling x = 0 with y > 0 everywhere
    let (ix, iy, iz) = (
        Interval::new(-0.5, 0.5),
        Interval::new(1.0, 2.0),
        Interval::new(-1.0, 1.0),
    );
    let mut eval = Interpreter::<Interval>::new();
    let r = eval.eval(&data, 0, ix, iy, iz).unwrap();
    assert!(r.has_choice);
    assert_eq!(r.value, ix);

    let start = shrink(&data, 0, r.end, eval.choices()).unwrap();
    let ops = data.walk(start).unwrap();
    assert_eq!(ops.len(), 2);
    assert!(matches!(ops[0], Op::CopyReg(_, 0)));
    assert!(matches!(ops[1], Op::End(_)));
    for op in &ops {
        assert!(!op.inputs().contains(&Some(1)), "y is still live: {op:?}");
    }

    let mut eval = Interpreter::<f32>::new();
    for (px, py) in [(-0.5, 1.0), (0.0, 1.5), (0.25, 2.0)] {
        let full = eval.eval(&data, 0, px, py, 0.0).unwrap().value;
        let short = eval.eval(&data, start, px, py, 0.0).unwrap().value;
        assert_eq!(full, short);
    }
}

#[test]
fn render_errors() {
    assert!(matches!(VoxelSize::new(0, 4, 4), Err(Error::EmptyImage)));
    assert!(matches!(TileSizes::new(&[]), Err(Error::EmptyTileSizes)));

    // An arena barely larger than the base tape cannot hold shrunk tapes
    let tape = Tape::from_text(BLOBS.as_bytes()).unwrap();
    let cfg = RenderConfig {
        image_size: VoxelSize::cube(64).unwrap(),
        tile_sizes: TileSizes::new(&[16, 4, 2]).unwrap(),
        arena_limit: tape.len() + 64,
        ..Default::default()
    };
    assert!(matches!(cfg.run(&tape), Err(Error::TapeArenaExhausted(..))));
}

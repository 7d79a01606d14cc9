//! Renders a 10×10 grid of spheres three ways (placed directly, as one
//! instance group, as nested groups) and writes one PNG per layout.
//!
//! Usage: strata [OUTPUT_DIR] [--layout none|single|multi|all] [--mode flat|two_level]
//!               [--width W] [--height H] [--options render.json]

use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use serde_json::json;
use strata_core::{Mesh, NodeId};
use strata_math::{Mat4, Vec3};
use strata_renderer::{AccelMode, BuildOptions, RenderOptions, Session};

const GRID: usize = 10;
const SPACING: f32 = 2.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Layout {
    /// Every sphere is its own primitive under the root
    NoInstancing,
    /// One group holding the sphere, referenced once per cell
    SingleLevel,
    /// A row of references to the sphere group, referenced once per row
    MultiLevel,
}

impl Layout {
    const ALL: [Layout; 3] = [Layout::NoInstancing, Layout::SingleLevel, Layout::MultiLevel];

    fn name(self) -> &'static str {
        match self {
            Layout::NoInstancing => "no_instancing",
            Layout::SingleLevel => "single_level",
            Layout::MultiLevel => "multi_level",
        }
    }

    fn parse(s: &str) -> Result<Vec<Layout>> {
        Ok(match s {
            "none" => vec![Layout::NoInstancing],
            "single" => vec![Layout::SingleLevel],
            "multi" => vec![Layout::MultiLevel],
            "all" => Layout::ALL.to_vec(),
            other => bail!("unknown layout '{}'", other),
        })
    }
}

struct Args {
    output: PathBuf,
    layouts: Vec<Layout>,
    mode: AccelMode,
    width: u32,
    height: u32,
    options: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        output: PathBuf::from("."),
        layouts: Layout::ALL.to_vec(),
        mode: AccelMode::TwoLevel,
        width: 1920,
        height: 1080,
        options: None,
    };

    let mut it = env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = || it.next().with_context(|| format!("{} needs a value", arg));
        match arg.as_str() {
            "--layout" => args.layouts = Layout::parse(&value()?)?,
            "--mode" => {
                args.mode = match value()?.as_str() {
                    "flat" => AccelMode::Flat,
                    "two_level" => AccelMode::TwoLevel,
                    other => bail!("unknown mode '{}'", other),
                }
            }
            "--width" => args.width = value()?.parse().context("--width")?,
            "--height" => args.height = value()?.parse().context("--height")?,
            "--options" => args.options = Some(PathBuf::from(value()?)),
            flag if flag.starts_with("--") => bail!("unknown flag '{}'", flag),
            _ => args.output = PathBuf::from(&arg),
        }
    }
    Ok(args)
}

fn offset(i: usize) -> f32 {
    (i as f32 - (GRID as f32 - 1.0) / 2.0) * SPACING
}

/// Place `group` under `parent` at `translation`.
fn place(session: &mut Session, parent: NodeId, group: NodeId, translation: Vec3) -> Result<()> {
    let t = session.transform_node(Mat4::from_translation(translation));
    session.add_child(t, group)?;
    session.add_child(parent, t)?;
    Ok(())
}

fn build_scene(session: &mut Session, layout: Layout) -> Result<()> {
    let sphere = session.insert_asset("mesh_sphere", Mesh::uv_sphere(1.0, 32, 64))?;
    let material = session.asset("mat_white", "material::diffuse", &json!({"Kd": [1.0, 1.0, 1.0]}))?;
    let root = session.root_node();

    if layout == Layout::NoInstancing {
        for j in 0..GRID {
            for i in 0..GRID {
                let at = Mat4::from_translation(Vec3::new(offset(i), offset(j), 0.0));
                session.primitive(at, sphere, material)?;
            }
        }
        return Ok(());
    }

    let group = session.instance_group_node();
    let p = session.primitive_node(sphere, material)?;
    session.add_child(group, p)?;

    match layout {
        Layout::SingleLevel => {
            for j in 0..GRID {
                for i in 0..GRID {
                    place(session, root, group, Vec3::new(offset(i), offset(j), 0.0))?;
                }
            }
        }
        _ => {
            let row = session.instance_group_node();
            for i in 0..GRID {
                place(session, row, group, Vec3::new(offset(i), 0.0, 0.0))?;
            }
            for j in 0..GRID {
                place(session, root, row, Vec3::new(0.0, offset(j), 0.0))?;
            }
        }
    }
    Ok(())
}

fn render_options(args: &Args) -> Result<RenderOptions> {
    match &args.options {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
        }
        None => Ok(RenderOptions {
            visualize_normal: true,
            bg_color: Vec3::ONE,
            ..Default::default()
        }),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = parse_args()?;
    let options = render_options(&args)?;
    fs::create_dir_all(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;

    let mut session = Session::new();
    for &layout in &args.layouts {
        session.reset();
        build_scene(&mut session, layout)?;

        let camera = session.asset(
            "camera",
            "camera::pinhole",
            &json!({
                "position": [0.0, 0.0, 50.0],
                "center": [0.0, 0.0, 0.0],
                "up": [0.0, 1.0, 0.0],
                "vfov": 30.0
            }),
        )?;
        let film = session.asset("film", "film::bitmap", &json!({"w": args.width, "h": args.height}))?;

        let start = Instant::now();
        let accel = session.build(&BuildOptions {
            mode: args.mode,
            ..Default::default()
        })?;
        log::info!(
            "{}: built in {:.2}s, {:?}",
            layout.name(),
            start.elapsed().as_secs_f64(),
            session.accel(accel)?.stats()
        );

        session.render(accel, camera, film, &options)?;
        let path = args.output.join(format!("{}.png", layout.name()));
        session.save(film, &path)?;
    }

    Ok(())
}

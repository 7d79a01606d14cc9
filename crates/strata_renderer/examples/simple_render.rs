//! Simple raycast example.
//!
//! Builds a small scene through the JSON asset API (a raw quad and an
//! instanced sphere pair) and saves the shaded image as PNG.

use serde_json::json;
use strata_core::{Mesh, SceneResult};
use strata_renderer::{BuildOptions, RenderOptions, Session, Vec3};
use strata_math::Mat4;

fn main() -> SceneResult<()> {
    env_logger::init();

    let mut session = Session::new();

    // Ground quad from raw arrays: 4 positions, 2 triangles
    let quad = session.asset(
        "quad",
        "mesh::raw",
        &json!({
            "ps": [-5.0, 0.0, -5.0,  5.0, 0.0, -5.0,  5.0, 0.0, 5.0,  -5.0, 0.0, 5.0],
            "fs": { "p": [0, 2, 1,  0, 3, 2] }
        }),
    )?;
    let sphere = session.insert_asset("sphere", Mesh::uv_sphere(1.0, 24, 48))?;
    let grey = session.asset("grey", "material::diffuse", &json!({"Kd": [0.5, 0.5, 0.5]}))?;
    let orange = session.asset("orange", "material::diffuse", &json!({"Kd": [0.9, 0.4, 0.1]}))?;

    session.primitive(Mat4::IDENTITY, quad, grey)?;

    // One group, two placements
    let group = session.instance_group_node();
    let p = session.primitive_node(sphere, orange)?;
    session.add_child(group, p)?;
    for x in [-1.5, 1.5] {
        let t = session.transform_node(Mat4::from_translation(Vec3::new(x, 1.0, 0.0)));
        session.add_child(t, group)?;
        session.add_child(session.root_node(), t)?;
    }

    let camera = session.asset(
        "camera",
        "camera::pinhole",
        &json!({
            "position": [0.0, 4.0, 12.0],
            "center": [0.0, 0.5, 0.0],
            "up": [0.0, 1.0, 0.0],
            "vfov": 35.0
        }),
    )?;
    let film = session.asset("film", "film::bitmap", &json!({"w": 640, "h": 360}))?;

    let accel = session.build(&BuildOptions::default())?;
    let options = RenderOptions {
        samples_per_pixel: 4,
        bg_color: Vec3::new(0.5, 0.7, 1.0),
        ..Default::default()
    };
    session.render(accel, camera, film, &options)?;
    session.save(film, "simple_render.png")?;

    Ok(())
}

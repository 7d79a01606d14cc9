//! Shared bottom-level structures are built once, however many threads ask.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use strata_core::{Material, Mesh, Scene, SceneError};
use strata_math::{Interval, Mat4, Ray, Vec3};
use strata_renderer::{AccelerationBuilder, Blas, BoxedHittable, BuildCache, BuildOptions, Placement};

const OUTER: usize = 8;

/// `OUTER` outer groups, each holding two references to one shared inner
/// group, each outer group placed once under the root.
fn shared_inner_scene() -> Scene {
    let mut scene = Scene::new();
    let mesh = scene
        .insert_asset("sphere", Mesh::uv_sphere(1.0, 8, 16))
        .unwrap();
    let material = scene.insert_asset("grey", Material::default()).unwrap();

    let inner = scene.create_instance_group();
    let p = scene.create_primitive(mesh, material).unwrap();
    scene.add_child(inner, p).unwrap();

    for k in 0..OUTER {
        let outer = scene.create_instance_group();
        for dy in [-1.5, 1.5] {
            let t = scene.create_transform(Mat4::from_translation(Vec3::new(0.0, dy, 0.0)));
            scene.add_child(t, inner).unwrap();
            scene.add_child(outer, t).unwrap();
        }
        let t = scene.create_transform(Mat4::from_translation(Vec3::new(4.0 * k as f32, 0.0, 0.0)));
        scene.add_child(t, outer).unwrap();
        scene.add_child(scene.root(), t).unwrap();
    }
    scene
}

#[test]
fn test_parallel_build_shares_inner_group() {
    let _ = env_logger::builder().is_test(true).try_init();
    let scene = shared_inner_scene();

    let parallel = AccelerationBuilder::build(&scene, &BuildOptions::default()).unwrap();
    let sequential = AccelerationBuilder::build(
        &scene,
        &BuildOptions {
            parallel: false,
            ..Default::default()
        },
    )
    .unwrap();

    // inner + every outer + root content
    assert_eq!(parallel.stats().bottom_level_builds, 1 + OUTER + 1);
    assert_eq!(parallel.stats(), sequential.stats());

    let ray = Ray::new(Vec3::new(4.0 * 5.0, 1.5, 50.0), Vec3::new(0.0, 0.0, -1.0));
    let a = parallel.intersect(&ray, Interval::from_min(1e-4)).unwrap();
    let b = sequential.intersect(&ray, Interval::from_min(1e-4)).unwrap();
    assert_eq!(a.t, b.t);
    assert_eq!(a.primitive, b.primitive);
    assert!((a.t - 49.0).abs() < 1e-3);
}

#[test]
fn test_many_requesters_one_build() {
    let mut scene = Scene::new();
    let mesh = scene
        .insert_asset("sphere", Mesh::uv_sphere(1.0, 16, 32))
        .unwrap();
    let material = scene.insert_asset("grey", Material::default()).unwrap();
    let group = scene.create_instance_group();
    let p = scene.create_primitive(mesh, material).unwrap();
    scene.add_child(group, p).unwrap();

    let cache: BuildCache<_, Blas> = BuildCache::new();
    let runs = AtomicUsize::new(0);
    let mesh = Arc::clone(scene.assets().mesh(mesh).unwrap());

    let results: Vec<_> = (0..64)
        .into_par_iter()
        .map(|_| {
            cache
                .get_or_build(group, || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    let placement = Arc::new(Placement::new(p, Arc::clone(&mesh), material, Mat4::IDENTITY)?);
                    let triangles = placement
                        .triangles()
                        .map(|t| Box::new(t) as BoxedHittable)
                        .collect();
                    Ok(Blas::new(Some(group), triangles, Vec::new()))
                })
                .unwrap()
        })
        .collect();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(cache.builds(), 1);
    assert!(results.iter().all(|b| Arc::ptr_eq(b, &results[0])));
    assert_eq!(results[0].group(), Some(group));
}

#[test]
fn test_failed_group_build_fails_every_requester() {
    let cache: BuildCache<u32, Blas> = BuildCache::new();
    let runs = AtomicUsize::new(0);

    let failures = (0..32)
        .into_par_iter()
        .filter(|_| {
            cache
                .get_or_build(1, || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Err(SceneError::build("degenerate group"))
                })
                .is_err()
        })
        .count();

    assert_eq!(failures, 32);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

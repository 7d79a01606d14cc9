//! Bucket raycaster.
//!
//! One primary ray (or a few jittered ones) per pixel against a built
//! [`Accel`]; no secondary bounces. Buckets render in parallel on the rayon
//! pool and are written to the film as they finish.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strata_core::{AssetTable, Camera, Film, Material, SceneError, SceneResult};
use strata_math::{Interval, Ray, Vec3};

use crate::accel::Accel;
use crate::bucket::{generate_buckets, Bucket, BucketResult, DEFAULT_BUCKET_SIZE};
use crate::hittable::HitRecord;
use crate::progress::{ProgressMode, ProgressSink};

/// Render configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Write `|normal|` instead of shaded color
    pub visualize_normal: bool,
    /// Color written where the primary ray misses
    pub bg_color: Vec3,
    /// Jittered primary rays per pixel; 1 shoots through the pixel center
    pub samples_per_pixel: u32,
    /// Seed for the per-pixel jitter
    pub seed: u64,
    pub bucket_size: u32,
    /// Nearest accepted hit distance
    pub t_min: f32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            visualize_normal: false,
            bg_color: Vec3::ZERO,
            samples_per_pixel: 1,
            seed: 0,
            bucket_size: DEFAULT_BUCKET_SIZE,
            t_min: 1e-4,
        }
    }
}

/// Render `accel` through `camera` into `film`.
///
/// `assets` resolves the material handles stored in hits; it must be the
/// table of the scene generation `accel` was built from.
pub fn render(
    accel: &Accel,
    assets: &AssetTable,
    camera: &Camera,
    film: &Film,
    options: &RenderOptions,
    progress: &dyn ProgressSink,
) -> SceneResult<()> {
    if accel.generation() != assets.generation() {
        return Err(SceneError::build(format!(
            "acceleration structure is from scene generation {}, current is {}",
            accel.generation(),
            assets.generation()
        )));
    }
    if options.samples_per_pixel == 0 {
        return Err(SceneError::invalid_params(
            "render",
            "samples_per_pixel must be at least 1",
        ));
    }

    let (width, height) = film.size();
    if width == 0 || height == 0 {
        return Err(SceneError::invalid_params("render", "film has no pixels"));
    }

    let buckets = generate_buckets(width, height, options.bucket_size);
    let total = u64::from(width) * u64::from(height);
    let done = AtomicU64::new(0);

    log::info!(
        "Rendering {}x{} in {} buckets ({} spp)",
        width,
        height,
        buckets.len(),
        options.samples_per_pixel
    );
    let start = Instant::now();
    progress.start(ProgressMode::Samples, total, 0.0);

    buckets.par_iter().for_each(|bucket| {
        let result = render_bucket(bucket, accel, assets, camera, film, options);
        film.write_block(bucket.x, bucket.y, bucket.width, &result.pixels);

        let processed = done.fetch_add(u64::from(bucket.pixel_count()), Ordering::Relaxed)
            + u64::from(bucket.pixel_count());
        progress.update(processed);
    });

    progress.end();
    log::info!("Render finished in {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}

/// Render a single bucket. Pixels are in row-major order within the bucket.
pub fn render_bucket(
    bucket: &Bucket,
    accel: &Accel,
    assets: &AssetTable,
    camera: &Camera,
    film: &Film,
    options: &RenderOptions,
) -> BucketResult {
    let pixels = bucket
        .pixels()
        .map(|(x, y)| render_pixel(accel, assets, camera, film, x, y, options))
        .collect();
    BucketResult::new(*bucket, pixels)
}

/// Color of pixel `(x, y)`, row 0 at the top of the image.
pub fn render_pixel(
    accel: &Accel,
    assets: &AssetTable,
    camera: &Camera,
    film: &Film,
    x: u32,
    y: u32,
    options: &RenderOptions,
) -> Vec3 {
    let (width, height) = film.size();
    let aspect = film.aspect();
    let ray_at = |jx: f32, jy: f32| {
        let rx = (x as f32 + jx) / width as f32;
        let ry = 1.0 - (y as f32 + jy) / height as f32;
        camera.primary_ray(rx, ry, aspect)
    };

    if options.samples_per_pixel <= 1 {
        return ray_color(&ray_at(0.5, 0.5), accel, assets, options);
    }

    let mut rng = pixel_rng(options.seed, x, y);
    let mut color = Vec3::ZERO;
    for _ in 0..options.samples_per_pixel {
        let ray = ray_at(rng.gen(), rng.gen());
        color += ray_color(&ray, accel, assets, options);
    }
    color / options.samples_per_pixel as f32
}

/// Color seen along a primary ray.
pub fn ray_color(ray: &Ray, accel: &Accel, assets: &AssetTable, options: &RenderOptions) -> Vec3 {
    match accel.intersect(ray, Interval::from_min(options.t_min)) {
        Some(hit) => shade(ray, &hit, assets, options),
        None => options.bg_color,
    }
}

fn shade(ray: &Ray, hit: &HitRecord, assets: &AssetTable, options: &RenderOptions) -> Vec3 {
    if options.visualize_normal {
        return hit.normal.abs();
    }

    let diffuse = hit
        .material
        .and_then(|m| assets.material(m).ok())
        .map(|m| m.diffuse_color)
        .unwrap_or_else(|| Material::default().diffuse_color);
    let cosine = hit.normal.dot(ray.direction.normalize_or_zero()).abs();
    diffuse * cosine
}

/// Jitter generator for one pixel; the same seed gives the same rays no
/// matter which bucket or thread renders the pixel.
fn pixel_rng(seed: u64, x: u32, y: u32) -> StdRng {
    let pixel = (u64::from(y) << 32) | u64::from(x);
    StdRng::seed_from_u64(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ pixel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::{AccelerationBuilder, BuildOptions};
    use crate::progress::NullProgress;
    use strata_core::{Mesh, Scene};
    use strata_math::Mat4;

    fn sphere_scene() -> Scene {
        let mut scene = Scene::new();
        let mesh = scene
            .insert_asset("sphere", Mesh::uv_sphere(1.0, 16, 32))
            .unwrap();
        let material = scene
            .insert_asset("red", Material::new(Vec3::new(1.0, 0.0, 0.0)))
            .unwrap();
        scene.primitive(Mat4::IDENTITY, mesh, material).unwrap();
        scene
    }

    fn camera() -> Camera {
        Camera::new(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y, 30.0)
    }

    #[test]
    fn test_render_sphere() {
        let scene = sphere_scene();
        let accel = AccelerationBuilder::build(&scene, &BuildOptions::default()).unwrap();
        let film = Film::new(32, 32);
        let options = RenderOptions {
            bg_color: Vec3::new(0.0, 0.0, 1.0),
            bucket_size: 8,
            ..Default::default()
        };

        render(&accel, scene.assets(), &camera(), &film, &options, &NullProgress).unwrap();

        // Center sees the sphere head on: full red
        let center = film.pixel(16, 16);
        assert!(center.x > 0.95 && center.y == 0.0 && center.z == 0.0);
        // Corners miss
        assert_eq!(film.pixel(0, 0), options.bg_color);
        assert_eq!(film.pixel(31, 31), options.bg_color);
    }

    #[test]
    fn test_visualize_normal() {
        let scene = sphere_scene();
        let accel = AccelerationBuilder::build(&scene, &BuildOptions::default()).unwrap();
        let film = Film::new(16, 16);
        let options = RenderOptions {
            visualize_normal: true,
            bg_color: Vec3::ONE,
            ..Default::default()
        };

        render(&accel, scene.assets(), &camera(), &film, &options, &NullProgress).unwrap();

        let center = film.pixel(8, 8);
        assert!(center.z > 0.95);
    }

    #[test]
    fn test_top_row_is_up() {
        let mut scene = Scene::new();
        let mesh = scene
            .insert_asset("sphere", Mesh::uv_sphere(1.0, 16, 32))
            .unwrap();
        let material = scene.insert_asset("grey", Material::default()).unwrap();
        scene
            .primitive(Mat4::from_translation(Vec3::new(0.0, 1.5, 0.0)), mesh, material)
            .unwrap();
        let accel = AccelerationBuilder::build(&scene, &BuildOptions::default()).unwrap();

        let film = Film::new(32, 32);
        render(
            &accel,
            scene.assets(),
            &camera(),
            &film,
            &RenderOptions::default(),
            &NullProgress,
        )
        .unwrap();

        // Sphere above the axis lands in the upper half of the image
        assert!(film.pixel(16, 8).length() > 0.0);
        assert_eq!(film.pixel(16, 24), Vec3::ZERO);
    }

    #[test]
    fn test_jitter_is_deterministic() {
        let scene = sphere_scene();
        let accel = AccelerationBuilder::build(&scene, &BuildOptions::default()).unwrap();
        let options = RenderOptions {
            samples_per_pixel: 4,
            seed: 7,
            ..Default::default()
        };

        let a = Film::new(16, 16);
        let b = Film::new(16, 16);
        for film in [&a, &b] {
            render(&accel, scene.assets(), &camera(), film, &options, &NullProgress).unwrap();
        }
        assert_eq!(a.buffer(), b.buffer());
    }

    #[test]
    fn test_rejects_zero_samples() {
        let scene = sphere_scene();
        let accel = AccelerationBuilder::build(&scene, &BuildOptions::default()).unwrap();
        let options = RenderOptions {
            samples_per_pixel: 0,
            ..Default::default()
        };
        let result = render(
            &accel,
            scene.assets(),
            &camera(),
            &Film::new(4, 4),
            &options,
            &NullProgress,
        );
        assert!(matches!(result, Err(SceneError::InvalidParams { .. })));
    }

    #[test]
    fn test_options_from_json() {
        let options: RenderOptions =
            serde_json::from_str(r#"{"visualize_normal": true, "bg_color": [1.0, 1.0, 1.0]}"#).unwrap();
        assert!(options.visualize_normal);
        assert_eq!(options.bg_color, Vec3::ONE);
        assert_eq!(options.samples_per_pixel, 1);
    }
}

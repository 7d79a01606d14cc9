//! Acceleration structure construction.
//!
//! Two modes:
//!
//! - **Flat**: the scene is fully expanded and every placed triangle is
//!   transformed into world space inside a single structure. Geometry is
//!   duplicated once per placement.
//! - **Two-level**: one bottom-level structure per distinct instance group,
//!   built once and shared by every reference, plus one for the primitives
//!   that sit under the root outside any group. The top level holds only
//!   instances (structure reference + world transform).
//!
//! Bottom-level builds of different groups run on the rayon pool; the
//! [`BuildCache`] keyed by group id guarantees at most one build per group
//! even when an outer group and the pool ask for the same inner group at
//! the same time.

use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strata_core::{FlattenedInstance, Flattener, NodeId, Scene, SceneResult};
use strata_math::{Aabb, Interval, Mat4, Ray};

use crate::bvh::{BoxedHittable, BvhNode};
use crate::cache::BuildCache;
use crate::hittable::{HitRecord, Hittable};
use crate::instance::{Blas, InstanceRef};
use crate::triangle::Placement;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccelMode {
    /// Expand every instance group; one world-space structure.
    Flat,
    /// Share one bottom-level structure per instance group.
    #[default]
    TwoLevel,
}

/// Options for [`AccelerationBuilder::build`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    pub mode: AccelMode,
    /// Build independent bottom-level structures on the rayon pool
    pub parallel: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            mode: AccelMode::TwoLevel,
            parallel: true,
        }
    }
}

impl BuildOptions {
    pub fn flat() -> Self {
        Self {
            mode: AccelMode::Flat,
            ..Default::default()
        }
    }
}

/// Counters describing a finished build.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AccelStats {
    pub mode: AccelMode,
    /// Bottom-level builds that actually ran
    pub bottom_level_builds: usize,
    /// Distinct bottom-level structures kept
    pub bottom_level_structures: usize,
    /// Instances in the top-level structure
    pub top_level_instances: usize,
    /// Triangles stored across all bottom-level structures
    pub triangles: usize,
}

/// A built, read-only acceleration structure.
pub struct Accel {
    /// Scene generation the structure was built from
    generation: u32,
    tlas: BvhNode,
    stats: AccelStats,
}

impl Accel {
    /// Closest hit along `ray` within `ray_t`, or `None` on a miss.
    pub fn intersect(&self, ray: &Ray, ray_t: Interval) -> Option<HitRecord> {
        let mut rec = HitRecord::default();
        self.tlas.hit(ray, ray_t, &mut rec).then_some(rec)
    }

    pub fn stats(&self) -> &AccelStats {
        &self.stats
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// World-space bounds of everything in the structure.
    pub fn bounds(&self) -> Aabb {
        self.tlas.bounding_box()
    }
}

/// Builds [`Accel`] structures from a scene.
pub struct AccelerationBuilder<'a> {
    scene: &'a Scene,
    flattener: Flattener<'a>,
    cache: BuildCache<NodeId, Blas>,
}

impl<'a> AccelerationBuilder<'a> {
    pub fn new(scene: &'a Scene) -> Self {
        Self {
            scene,
            flattener: Flattener::new(scene),
            cache: BuildCache::new(),
        }
    }

    /// Build the scene reachable from its root.
    ///
    /// Any error (stale handle, cycle, singular transform) aborts the whole
    /// build; nothing partial is returned.
    pub fn build(scene: &'a Scene, options: &BuildOptions) -> SceneResult<Accel> {
        let builder = Self::new(scene);
        match options.mode {
            AccelMode::Flat => builder.build_flat(),
            AccelMode::TwoLevel => builder.build_two_level(options.parallel),
        }
    }

    fn build_flat(&self) -> SceneResult<Accel> {
        log::info!("Flattening scene");
        let instances = self.flattener.flatten()?;
        let triangles = self.triangles(&instances)?;
        let triangle_count = triangles.len();

        log::info!(
            "Building flat structure: {} placements, {} triangles",
            instances.len(),
            triangle_count
        );
        let blas = Arc::new(Blas::new(None, triangles, Vec::new()));
        let top = InstanceRef::new(blas, Mat4::IDENTITY)?;

        let stats = AccelStats {
            mode: AccelMode::Flat,
            bottom_level_builds: 1,
            bottom_level_structures: 1,
            top_level_instances: 1,
            triangles: triangle_count,
        };
        Ok(self.finish(vec![top], stats))
    }

    fn build_two_level(&self, parallel: bool) -> SceneResult<Accel> {
        let root = self.scene.root();
        let order = self.flattener.group_build_order(root)?;
        log::info!("Building {} instance group structures", order.len());

        if parallel {
            order
                .par_iter()
                .try_for_each(|&group| self.group_blas(group).map(drop))?;
        } else {
            for &group in &order {
                self.group_blas(group)?;
            }
        }

        // Ungrouped content under the root gets its own structure, placed at
        // the identity like any other instance
        let content = self.flattener.flatten_instanced(root)?;
        let mut instances = Vec::with_capacity(content.groups.len() + 1);
        let root_blas = Arc::new(self.blas(None, &content.primitives, &[])?);
        let root_triangles = root_blas.triangle_count();
        if !root_blas.is_empty() {
            instances.push(InstanceRef::new(root_blas, Mat4::IDENTITY)?);
        }
        for reference in &content.groups {
            let blas = self.group_blas(reference.group)?;
            instances.push(InstanceRef::new(blas, reference.transform)?);
        }

        log::info!("Building top-level structure over {} instances", instances.len());
        let stats = AccelStats {
            mode: AccelMode::TwoLevel,
            bottom_level_builds: self.cache.builds() + 1,
            bottom_level_structures: self.cache.len() + 1,
            top_level_instances: instances.len(),
            triangles: root_triangles
                + self
                    .cache
                    .values()
                    .iter()
                    .map(|b| b.triangle_count())
                    .sum::<usize>(),
        };
        Ok(self.finish(instances, stats))
    }

    /// Shared bottom-level structure of `group`, building it (and the groups
    /// it contains) on first request.
    fn group_blas(&self, group: NodeId) -> SceneResult<Arc<Blas>> {
        self.cache.get_or_build(group, || {
            log::debug!("Building bottom-level structure for group {}", group);
            let content = self.flattener.flatten_instanced(group)?;
            let nested = content
                .groups
                .iter()
                .map(|r| Ok((self.group_blas(r.group)?, r.transform)))
                .collect::<SceneResult<Vec<_>>>()?;
            self.blas(Some(group), &content.primitives, &nested)
        })
    }

    fn blas(
        &self,
        group: Option<NodeId>,
        primitives: &[FlattenedInstance],
        nested: &[(Arc<Blas>, Mat4)],
    ) -> SceneResult<Blas> {
        let triangles = self.triangles(primitives)?;
        let instances = nested
            .iter()
            .map(|(blas, transform)| InstanceRef::new(Arc::clone(blas), *transform))
            .collect::<SceneResult<Vec<_>>>()?;
        Ok(Blas::new(group, triangles, instances))
    }

    /// Triangles of every placement, transformed into the placement frame.
    fn triangles(&self, primitives: &[FlattenedInstance]) -> SceneResult<Vec<BoxedHittable>> {
        let mut triangles = Vec::new();
        for instance in primitives {
            let mesh = Arc::clone(self.scene.assets().mesh(instance.mesh)?);
            let placement = Arc::new(Placement::new(
                instance.node,
                mesh,
                instance.material,
                instance.transform,
            )?);
            triangles.extend(
                placement
                    .triangles()
                    .map(|t| Box::new(t) as BoxedHittable),
            );
        }
        Ok(triangles)
    }

    fn finish(&self, instances: Vec<InstanceRef>, stats: AccelStats) -> Accel {
        let tlas = BvhNode::new(
            instances
                .into_iter()
                .map(|i| Box::new(i) as BoxedHittable)
                .collect(),
        );
        log::info!("Acceleration structure ready: {:?}", stats);
        Accel {
            generation: self.scene.generation(),
            tlas,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{Material, Mesh, SceneError};
    use strata_math::Vec3;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn sphere_scene() -> (Scene, strata_core::AssetHandle, strata_core::AssetHandle) {
        let mut scene = Scene::new();
        let mesh = scene
            .insert_asset("sphere", Mesh::uv_sphere(1.0, 10, 20))
            .unwrap();
        let material = scene.insert_asset("white", Material::new(Vec3::ONE)).unwrap();
        (scene, mesh, material)
    }

    fn down_z(x: f32, y: f32) -> Ray {
        Ray::new(Vec3::new(x, y, 50.0), Vec3::new(0.0, 0.0, -1.0))
    }

    #[test]
    fn test_empty_scene_never_hits() {
        let scene = Scene::new();
        for options in [BuildOptions::default(), BuildOptions::flat()] {
            let accel = AccelerationBuilder::build(&scene, &options).unwrap();
            assert!(accel.intersect(&down_z(0.0, 0.0), Interval::from_min(1e-4)).is_none());
            assert_eq!(accel.stats().triangles, 0);
        }
    }

    #[test]
    fn test_single_sphere_hit() {
        init_logger();
        let (mut scene, mesh, material) = sphere_scene();
        let node = scene.primitive(Mat4::IDENTITY, mesh, material).unwrap();

        for options in [BuildOptions::default(), BuildOptions::flat()] {
            let accel = AccelerationBuilder::build(&scene, &options).unwrap();
            let hit = accel
                .intersect(&down_z(0.0, 0.0), Interval::from_min(1e-4))
                .unwrap();

            assert!((hit.t - 49.0).abs() < 1e-3);
            assert!(hit.normal.dot(Vec3::Z) > 0.99);
            assert_eq!(hit.primitive, Some(node));
            assert_eq!(hit.material, Some(material));
            assert!(hit.front_face);
        }
    }

    #[test]
    fn test_group_is_built_once() {
        let (mut scene, mesh, material) = sphere_scene();
        let group = scene.create_instance_group();
        let p = scene.create_primitive(mesh, material).unwrap();
        scene.add_child(group, p).unwrap();
        for i in 0..25 {
            let t = scene.create_transform(Mat4::from_translation(Vec3::X * 3.0 * i as f32));
            scene.add_child(t, group).unwrap();
            scene.add_child(scene.root(), t).unwrap();
        }
        let sphere_triangles = scene.assets().mesh(mesh).unwrap().triangle_count();

        let accel = AccelerationBuilder::build(&scene, &BuildOptions::default()).unwrap();
        let stats = accel.stats();
        assert_eq!(stats.mode, AccelMode::TwoLevel);
        assert_eq!(stats.bottom_level_builds, 2);
        assert_eq!(stats.top_level_instances, 25);
        assert_eq!(stats.triangles, sphere_triangles);

        let flat = AccelerationBuilder::build(&scene, &BuildOptions::flat()).unwrap();
        assert_eq!(flat.stats().triangles, 25 * sphere_triangles);

        let hit = accel
            .intersect(&down_z(12.0, 0.0), Interval::from_min(1e-4))
            .unwrap();
        assert_eq!(hit.primitive, Some(p));
        assert!((hit.p - Vec3::new(12.0, 0.0, 1.0)).length() < 1e-3);
    }

    #[test]
    fn test_singular_transform_fails_build() {
        let (mut scene, mesh, material) = sphere_scene();
        let group = scene.create_instance_group();
        let p = scene.create_primitive(mesh, material).unwrap();
        scene.add_child(group, p).unwrap();
        let t = scene.create_transform(Mat4::from_scale(Vec3::new(1.0, 1.0, 0.0)));
        scene.add_child(t, group).unwrap();
        scene.add_child(scene.root(), t).unwrap();

        for options in [BuildOptions::default(), BuildOptions::flat()] {
            let result = AccelerationBuilder::build(&scene, &options);
            assert!(matches!(result, Err(SceneError::Build(_))));
        }
    }

    #[test]
    fn test_nested_small_scales_build_in_both_modes() {
        let (mut scene, mesh, material) = sphere_scene();
        let mut group = scene.create_instance_group();
        let p = scene.create_primitive(mesh, material).unwrap();
        scene.add_child(group, p).unwrap();
        for _ in 0..3 {
            let outer = scene.create_instance_group();
            let t = scene.create_transform(Mat4::from_scale(Vec3::splat(0.05)));
            scene.add_child(t, group).unwrap();
            scene.add_child(outer, t).unwrap();
            group = outer;
        }
        let t = scene.create_transform(Mat4::from_scale(Vec3::splat(0.05)));
        scene.add_child(t, group).unwrap();
        scene.add_child(scene.root(), t).unwrap();

        let radius = 0.05f32.powi(4);
        let ray = Ray::new(Vec3::new(0.3 * radius, 0.0, 1e-3), Vec3::new(0.0, 0.0, -1.0));
        let hits: Vec<_> = [BuildOptions::default(), BuildOptions::flat()]
            .iter()
            .map(|options| {
                let accel = AccelerationBuilder::build(&scene, options).unwrap();
                accel.intersect(&ray, Interval::from_min(1e-7)).unwrap()
            })
            .collect();

        for hit in &hits {
            assert_eq!(hit.primitive, Some(p));
            assert!((hit.t - (1e-3 - radius)).abs() < 0.1 * radius);
            assert!((hit.normal.length() - 1.0).abs() < 1e-4);
            assert!(hit.normal.dot(Vec3::Z) > 0.9);
        }
        assert!((hits[0].t - hits[1].t).abs() < 1e-2 * radius);
        assert!((hits[0].normal - hits[1].normal).length() < 1e-3);
    }

    #[test]
    fn test_tiny_uniform_scale_builds() {
        let (mut scene, mesh, material) = sphere_scene();
        scene
            .primitive(Mat4::from_scale(Vec3::splat(1e-4)), mesh, material)
            .unwrap();

        for options in [BuildOptions::default(), BuildOptions::flat()] {
            let accel = AccelerationBuilder::build(&scene, &options).unwrap();
            let ray = Ray::new(Vec3::new(0.0, 0.0, 1e-2), Vec3::new(0.0, 0.0, -1.0));
            let hit = accel.intersect(&ray, Interval::from_min(1e-7)).unwrap();
            assert!((hit.t - (1e-2 - 1e-4)).abs() < 1e-6);
            assert!(hit.normal.dot(Vec3::Z) > 0.99);
        }
    }

    #[test]
    fn test_options_from_json() {
        let options: BuildOptions = serde_json::from_str(r#"{"mode": "flat"}"#).unwrap();
        assert_eq!(options.mode, AccelMode::Flat);
        assert!(options.parallel);

        let options: BuildOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, BuildOptions::default());
    }
}

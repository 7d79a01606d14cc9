// Re-export glam for convenience
pub use glam::*;

// Strata math types
mod aabb;
mod interval;
mod ray;
mod transform;

pub use aabb::Aabb;
pub use interval::Interval;
pub use ray::Ray;
pub use transform::Mat4Ext;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_vector_convention() {
        // world_point = accumulated * local_point: the right-most matrix applies first
        let scale = Mat4::from_scale(Vec3::splat(2.0));
        let translate = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let composed = translate * scale;

        assert_eq!(composed.transform_point3(Vec3::X), Vec3::new(3.0, 0.0, 0.0));
    }
}

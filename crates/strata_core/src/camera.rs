//! Pinhole camera used to generate primary rays.

use strata_math::{Ray, Vec3};

/// Pinhole camera.
///
/// Positioned by `position`, looking toward `center`, with `up` fixing the
/// roll. `vfov` is the vertical field of view in degrees. When `aspect` is
/// `None` the film's aspect ratio is used.
#[derive(Clone, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub center: Vec3,
    pub up: Vec3,
    pub vfov: f32,
    pub aspect: Option<f32>,

    // Orthonormal basis and half screen height at unit distance
    u: Vec3,
    v: Vec3,
    w: Vec3,
    tf: f32,
}

impl Camera {
    pub fn new(position: Vec3, center: Vec3, up: Vec3, vfov: f32) -> Self {
        let w = (position - center).normalize();
        let u = up.cross(w).normalize();
        let v = w.cross(u);
        Self {
            position,
            center,
            up,
            vfov,
            aspect: None,
            u,
            v,
            w,
            tf: (vfov.to_radians() * 0.5).tan(),
        }
    }

    pub fn with_aspect(mut self, aspect: f32) -> Self {
        self.aspect = Some(aspect);
        self
    }

    /// True when the basis is well defined (position != center, up not
    /// parallel to the view direction).
    pub fn is_valid(&self) -> bool {
        self.u.is_finite() && self.v.is_finite() && self.w.is_finite() && self.tf.is_finite()
    }

    /// Primary ray through raster position `(rx, ry)` in `[0, 1]^2`, with
    /// `(0, 0)` the lower-left corner of the image.
    pub fn primary_ray(&self, rx: f32, ry: f32, film_aspect: f32) -> Ray {
        let aspect = self.aspect.unwrap_or(film_aspect);
        let x = (2.0 * rx - 1.0) * self.tf * aspect;
        let y = (2.0 * ry - 1.0) * self.tf;
        let direction = (self.u * x + self.v * y - self.w).normalize();
        Ray::new(self.position, direction)
    }
}

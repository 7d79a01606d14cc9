//! Strata Renderer - instanced acceleration structures and a bucket raycaster.
//!
//! Builds flat or two-level acceleration structures from a
//! [`strata_core::Scene`] and renders them one primary ray per sample.
//! Instance groups get one shared bottom-level structure each; the top level
//! only stores placements.

mod accel;
mod bucket;
mod bvh;
mod cache;
mod hittable;
mod instance;
mod progress;
mod renderer;
mod session;
mod triangle;

pub use accel::{Accel, AccelMode, AccelStats, AccelerationBuilder, BuildOptions};
pub use bucket::{generate_buckets, Bucket, BucketResult, DEFAULT_BUCKET_SIZE};
pub use bvh::{BoxedHittable, BvhNode};
pub use cache::BuildCache;
pub use hittable::{HitRecord, Hittable};
pub use instance::{Blas, InstanceRef};
pub use progress::{DelayProgress, LogProgress, MuxProgress, NullProgress, ProgressMode, ProgressSink};
pub use renderer::{ray_color, render, render_bucket, render_pixel, RenderOptions};
pub use session::{AccelHandle, Session};
pub use triangle::{MeshTriangle, Placement};

/// Re-export common math types from strata_math
pub use strata_math::{Aabb, Interval, Ray, Vec3};

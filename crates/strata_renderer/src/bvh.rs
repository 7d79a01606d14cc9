//! Bounding Volume Hierarchy (BVH) acceleration structure.
//!
//! Binary tree over boxed hittables. The same node type serves both levels:
//! a bottom-level structure holds triangles (and references to nested
//! groups), the top-level structure holds instances.

use strata_math::{Aabb, Interval, Ray};

use crate::hittable::{HitRecord, Hittable};

/// Maximum primitives per leaf node before splitting.
const LEAF_MAX_SIZE: usize = 4;

pub type BoxedHittable = Box<dyn Hittable>;

/// BVH node - either a branch with two children or a leaf with primitives.
pub enum BvhNode {
    /// Internal node with two children.
    Branch {
        left: Box<BvhNode>,
        right: Box<BvhNode>,
        bbox: Aabb,
    },
    /// Leaf node with a small number of primitives.
    Leaf {
        objects: Vec<BoxedHittable>,
        bbox: Aabb,
    },
    /// Empty node (for edge cases).
    Empty,
}

/// An object paired with its cached bounds for construction.
struct Item {
    bbox: Aabb,
    object: BoxedHittable,
}

impl BvhNode {
    /// Create a BVH from a list of hittable objects.
    pub fn new(objects: Vec<BoxedHittable>) -> Self {
        let items: Vec<Item> = objects
            .into_iter()
            .map(|object| Item {
                bbox: object.bounding_box(),
                object,
            })
            .filter(|item| !item.bbox.is_empty())
            .collect();

        if items.is_empty() {
            return BvhNode::Empty;
        }
        Self::build(items)
    }

    /// Recursive BVH construction.
    ///
    /// Simple median-split approach: sort objects by centroid on longest axis,
    /// split in half, recurse.
    fn build(mut items: Vec<Item>) -> Self {
        let n = items.len();

        let bounds = items
            .iter()
            .fold(Aabb::EMPTY, |acc, item| Aabb::surrounding(&acc, &item.bbox));

        // Create leaf for small sets
        if n <= LEAF_MAX_SIZE {
            return BvhNode::Leaf {
                objects: items.into_iter().map(|item| item.object).collect(),
                bbox: bounds,
            };
        }

        // Choose split axis based on centroid spread
        let centroid_bounds = items.iter().fold(Aabb::EMPTY, |acc, item| {
            let c = item.bbox.centroid();
            Aabb::surrounding(&acc, &Aabb::from_points(c, c))
        });
        let axis = centroid_bounds.longest_axis();

        items.sort_unstable_by(|a, b| {
            let a_val = a.bbox.centroid()[axis];
            let b_val = b.bbox.centroid()[axis];
            a_val.total_cmp(&b_val)
        });

        // Split at midpoint
        let right_items = items.split_off(n / 2);
        let left = Self::build(items);
        let right = Self::build(right_items);

        BvhNode::Branch {
            left: Box::new(left),
            right: Box::new(right),
            bbox: bounds,
        }
    }

    /// Number of objects stored in leaves.
    pub fn len(&self) -> usize {
        match self {
            BvhNode::Empty => 0,
            BvhNode::Leaf { objects, .. } => objects.len(),
            BvhNode::Branch { left, right, .. } => left.len() + right.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, BvhNode::Empty)
    }
}

impl Hittable for BvhNode {
    fn hit(&self, ray: &Ray, ray_t: Interval, rec: &mut HitRecord) -> bool {
        match self {
            BvhNode::Empty => false,

            BvhNode::Leaf { objects, bbox } => {
                if !bbox.hit(ray, ray_t) {
                    return false;
                }

                let mut hit_anything = false;
                let mut closest = ray_t.max;

                for obj in objects {
                    if obj.hit(ray, ray_t.with_max(closest), rec) {
                        hit_anything = true;
                        closest = rec.t;
                    }
                }
                hit_anything
            }

            BvhNode::Branch { left, right, bbox } => {
                if !bbox.hit(ray, ray_t) {
                    return false;
                }

                let hit_left = left.hit(ray, ray_t, rec);

                // Only check right up to closest hit
                let right_t = if hit_left { ray_t.with_max(rec.t) } else { ray_t };
                let hit_right = right.hit(ray, right_t, rec);

                hit_left || hit_right
            }
        }
    }

    fn bounding_box(&self) -> Aabb {
        match self {
            BvhNode::Empty => Aabb::EMPTY,
            BvhNode::Leaf { bbox, .. } => *bbox,
            BvhNode::Branch { bbox, .. } => *bbox,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_math::Vec3;

    /// Axis-aligned unit box standing in for a primitive.
    struct UnitBox {
        center: Vec3,
    }

    impl Hittable for UnitBox {
        fn hit(&self, ray: &Ray, ray_t: Interval, rec: &mut HitRecord) -> bool {
            // Report the near face along -Z rays only
            let t = (ray.origin.z - (self.center.z + 0.5)) / -ray.direction.z;
            let p = ray.at(t);
            if !ray_t.surrounds(t) || (p - self.center).abs().max_element() > 0.5 + 1e-4 {
                return false;
            }
            rec.t = t;
            rec.p = p;
            rec.normal = Vec3::Z;
            true
        }

        fn bounding_box(&self) -> Aabb {
            Aabb::from_points(self.center - 0.5, self.center + 0.5)
        }
    }

    fn boxes(centers: impl IntoIterator<Item = Vec3>) -> Vec<BoxedHittable> {
        centers
            .into_iter()
            .map(|center| Box::new(UnitBox { center }) as BoxedHittable)
            .collect()
    }

    #[test]
    fn test_bvh_empty() {
        let bvh = BvhNode::new(vec![]);
        assert!(matches!(bvh, BvhNode::Empty));
        assert!(bvh.bounding_box().is_empty());
    }

    #[test]
    fn test_bvh_single_object() {
        let bvh = BvhNode::new(boxes([Vec3::new(0.0, 0.0, -5.0)]));

        // Should create a leaf
        assert!(matches!(bvh, BvhNode::Leaf { .. }));

        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0));
        let mut rec = HitRecord::default();
        assert!(bvh.hit(&ray, Interval::new(0.001, f32::INFINITY), &mut rec));
        assert!((rec.t - 4.5).abs() < 1e-5);
    }

    #[test]
    fn test_bvh_finds_closest_of_many() {
        // A row along X plus a column along Z behind x = 5
        let centers = (0..10)
            .map(|i| Vec3::new(i as f32 * 2.0, 0.0, -5.0))
            .chain((1..4).map(|i| Vec3::new(10.0, 0.0, -5.0 - 3.0 * i as f32)));
        let bvh = BvhNode::new(boxes(centers));
        assert_eq!(bvh.len(), 13);
        assert!(matches!(bvh, BvhNode::Branch { .. }));

        let ray = Ray::new(Vec3::new(10.0, 0.0, 0.0), Vec3::new(0.0, 0.0, -1.0));
        let mut rec = HitRecord::default();
        assert!(bvh.hit(&ray, Interval::new(0.001, f32::INFINITY), &mut rec));
        assert!((rec.p.z - (-4.5)).abs() < 0.01);

        // Between two boxes of the row
        let ray = Ray::new(Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(!bvh.hit(&ray, Interval::new(0.001, f32::INFINITY), &mut rec));
    }
}

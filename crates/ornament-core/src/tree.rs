//! Tree geometry: cone-surface scatter, the decorative set, and ray picking
//!
//! The tree is an upright cone (Y up). Ornaments are scattered on a slightly
//! larger cone so markers sit just outside the mesh instead of inside it:
//! a height is drawn uniformly, the radius shrinks linearly towards the apex,
//! and an angle is drawn over a full turn.

use glam::Vec3;
use rand::Rng;
use std::f32::consts::TAU;

use crate::ornament::{Ornament, COUNTRIES};

/// Number of decorative ornaments generated per session
pub const DECORATIVE_COUNT: usize = 200;

/// Distance a picked point is pushed out along the surface normal
pub const PICK_SURFACE_OFFSET: f32 = 0.25;

/// Radius of a rendered ornament marker
pub const MARKER_RADIUS: f32 = 0.12;

/// Radius of the pending placement preview marker
pub const PREVIEW_RADIUS: f32 = 0.15;

/// Vertical offset applied to decorative ornament heights
pub const DECORATIVE_HEIGHT_OFFSET: f32 = -2.7;

/// Vertical offset applied to randomly placed user ornaments
pub const RANDOM_PLACEMENT_HEIGHT_OFFSET: f32 = -0.6;

const EPSILON: f32 = 1e-6;

/// Dimensions of the tree cone and of the scatter cone around it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeShape {
    /// Center of the cone's bounding box (the mesh origin)
    pub center: Vec3,
    pub base_radius: f32,
    pub height: f32,
    /// Extra radius added when scattering so markers clear the surface
    pub scatter_offset: f32,
}

impl Default for TreeShape {
    fn default() -> Self {
        Self {
            center: Vec3::new(0.0, 0.4, 0.0),
            base_radius: 2.5,
            height: 6.0,
            scatter_offset: 0.2,
        }
    }
}

impl TreeShape {
    /// Cone radius at a height measured from the base (0) to the apex (`height`)
    pub fn radius_at(&self, h: f32) -> f32 {
        self.base_radius * (1.0 - h / self.height)
    }

    /// Expected distance from the vertical axis of a scattered point at height `h`
    pub fn taper_bound(&self, h: f32) -> f32 {
        self.radius_at(h) + self.scatter_offset
    }

    /// Sample a position on the scatter cone, shifted vertically by `height_offset`
    pub fn scatter<R: Rng + ?Sized>(&self, rng: &mut R, height_offset: f32) -> Vec3 {
        let h = rng.gen_range(0.0..self.height);
        let theta = rng.gen_range(0.0..TAU);
        let r = self.taper_bound(h);
        Vec3::new(theta.cos() * r, h + height_offset, theta.sin() * r)
    }

    /// Random placement for a user ornament submitted without a pick
    pub fn random_placement<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec3 {
        self.scatter(rng, RANDOM_PLACEMENT_HEIGHT_OFFSET)
    }

    /// Intersect a ray with the tree cone (lateral surface and base disc).
    ///
    /// Returns the nearest hit in front of the ray origin together with the
    /// outward surface normal there.
    pub fn intersect_ray(&self, origin: Vec3, direction: Vec3) -> Option<TreeHit> {
        let dir = direction.normalize_or_zero();
        if dir == Vec3::ZERO {
            return None;
        }

        let half = self.height / 2.0;
        let local = origin - self.center;
        let k2 = (self.base_radius / self.height).powi(2);

        let mut best: Option<(f32, TreeHit)> = None;
        let mut consider = |t: f32, hit: TreeHit| {
            if t > EPSILON && best.as_ref().map_or(true, |(bt, _)| t < *bt) {
                best = Some((t, hit));
            }
        };

        // Lateral surface, solved relative to the apex: x² + z² = k² y², -H <= y <= 0
        let q = local - Vec3::new(0.0, half, 0.0);
        let a = dir.x * dir.x + dir.z * dir.z - k2 * dir.y * dir.y;
        let b = 2.0 * (q.x * dir.x + q.z * dir.z - k2 * q.y * dir.y);
        let c = q.x * q.x + q.z * q.z - k2 * q.y * q.y;

        let mut roots = Vec::with_capacity(2);
        if a.abs() < EPSILON {
            if b.abs() > EPSILON {
                roots.push(-c / b);
            }
        } else {
            let disc = b * b - 4.0 * a * c;
            if disc >= 0.0 {
                let sqrt = disc.sqrt();
                roots.push((-b - sqrt) / (2.0 * a));
                roots.push((-b + sqrt) / (2.0 * a));
            }
        }

        for t in roots {
            let p = q + dir * t;
            if p.y <= 0.0 && p.y >= -self.height {
                let normal = Vec3::new(p.x, -k2 * p.y, p.z).normalize_or(Vec3::Y);
                consider(t, TreeHit {
                    point: origin + dir * t,
                    normal,
                });
            }
        }

        // Base disc
        if dir.y.abs() > EPSILON {
            let t = (-half - local.y) / dir.y;
            let p = local + dir * t;
            if p.x * p.x + p.z * p.z <= self.base_radius * self.base_radius {
                consider(t, TreeHit {
                    point: origin + dir * t,
                    normal: Vec3::NEG_Y,
                });
            }
        }

        best.map(|(_, hit)| hit)
    }
}

/// Point where a ray meets the tree, with the outward surface normal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeHit {
    pub point: Vec3,
    pub normal: Vec3,
}

impl TreeHit {
    /// Placement for an ornament picked at this hit, pushed off the surface
    pub fn placement(&self) -> Vec3 {
        self.point + self.normal * PICK_SURFACE_OFFSET
    }
}

/// Distance along a ray to the point closest to a marker, if the ray passes
/// within `radius` of it and the marker is in front of the origin.
pub fn marker_hit_distance(origin: Vec3, direction: Vec3, center: Vec3, radius: f32) -> Option<f32> {
    let dir = direction.normalize_or_zero();
    let t = (center - origin).dot(dir);
    if t < 0.0 {
        return None;
    }
    let closest = origin + dir * t;
    (closest.distance_squared(center) <= radius * radius).then_some(t)
}

/// Generate the decorative ornament set.
///
/// Always [`DECORATIVE_COUNT`] entries; messages are numbered by generation order.
pub fn generate_decorative<R: Rng + ?Sized>(shape: &TreeShape, rng: &mut R) -> Vec<Ornament> {
    (0..DECORATIVE_COUNT)
        .map(|i| {
            let position = shape.scatter(rng, DECORATIVE_HEIGHT_OFFSET);
            let country = COUNTRIES[rng.gen_range(0..COUNTRIES.len())];
            Ornament::new(position, country, format!("Happy Holidays {}!", i + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn axis_distance(p: Vec3) -> f32 {
        (p.x * p.x + p.z * p.z).sqrt()
    }

    #[test]
    fn test_decorative_set_size_and_messages() {
        let mut rng = StdRng::seed_from_u64(42);
        let set = generate_decorative(&TreeShape::default(), &mut rng);

        assert_eq!(set.len(), DECORATIVE_COUNT);
        assert_eq!(set[0].message, "Happy Holidays 1!");
        assert_eq!(set[199].message, "Happy Holidays 200!");
        assert!(set.iter().all(|o| o.id.is_none()));
        assert!(set.iter().all(|o| COUNTRIES.contains(&o.country.as_str())));
    }

    #[test]
    fn test_decorative_set_follows_taper() {
        let shape = TreeShape::default();
        let mut rng = StdRng::seed_from_u64(9);

        for ornament in generate_decorative(&shape, &mut rng) {
            let h = ornament.position.y - DECORATIVE_HEIGHT_OFFSET;
            assert!((0.0..=shape.height).contains(&h), "height {h} out of range");
            let expected = shape.taper_bound(h);
            assert!(
                (axis_distance(ornament.position) - expected).abs() < 1e-3,
                "ornament at {:?} off the taper bound {expected}",
                ornament.position
            );
        }
    }

    #[test]
    fn test_random_placement_follows_taper() {
        let shape = TreeShape::default();
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..500 {
            let p = shape.random_placement(&mut rng);
            let h = p.y - RANDOM_PLACEMENT_HEIGHT_OFFSET;
            assert!((0.0..=shape.height).contains(&h));
            assert!((axis_distance(p) - shape.taper_bound(h)).abs() < 1e-3);
        }
    }

    #[test]
    fn test_radius_reaches_zero_at_apex() {
        let shape = TreeShape::default();
        assert_eq!(shape.radius_at(0.0), 2.5);
        assert!(shape.radius_at(6.0).abs() < 1e-6);
        assert!(shape.radius_at(3.0) < shape.radius_at(1.0));
    }

    #[test]
    fn test_ray_hits_lateral_surface() {
        let shape = TreeShape::default();
        // Horizontal ray towards the axis at the cone's mid height (y = 0.4)
        let hit = shape
            .intersect_ray(Vec3::new(10.0, 0.4, 0.0), Vec3::NEG_X)
            .expect("ray should hit the tree");

        // Half way up, the radius is 1.25
        assert!((hit.point.x - 1.25).abs() < 1e-4);
        assert!((hit.point.y - 0.4).abs() < 1e-4);
        assert!(hit.normal.x > 0.0 && hit.normal.y > 0.0);
        assert!((hit.normal.length() - 1.0).abs() < 1e-5);

        let placed = hit.placement();
        assert!((placed.distance(hit.point) - PICK_SURFACE_OFFSET).abs() < 1e-5);
        assert!(placed.x > hit.point.x);
    }

    #[test]
    fn test_ray_hits_base_from_below() {
        let shape = TreeShape::default();
        let hit = shape
            .intersect_ray(Vec3::new(0.5, -10.0, 0.0), Vec3::Y)
            .expect("ray should hit the base");
        assert!((hit.point.y - -2.6).abs() < 1e-4);
        assert_eq!(hit.normal, Vec3::NEG_Y);
    }

    #[test]
    fn test_ray_misses_tree() {
        let shape = TreeShape::default();
        assert!(shape.intersect_ray(Vec3::new(10.0, 0.4, 0.0), Vec3::X).is_none());
        assert!(shape.intersect_ray(Vec3::new(10.0, 5.0, 0.0), Vec3::NEG_X).is_none());
        assert!(shape.intersect_ray(Vec3::new(10.0, 0.4, 0.0), Vec3::ZERO).is_none());
    }

    #[test]
    fn test_ray_from_camera_hits_front_face() {
        let shape = TreeShape::default();
        let origin = Vec3::new(0.0, 10.0, 10.0);
        let hit = shape
            .intersect_ray(origin, shape.center - origin)
            .expect("camera looking at the tree should hit it");
        // The nearest hit faces the camera
        assert!(hit.point.z > 0.0);
        assert!(hit.normal.dot(origin - hit.point) > 0.0);
    }

    #[test]
    fn test_marker_hit_distance() {
        let origin = Vec3::new(0.0, 0.0, 10.0);
        let t = marker_hit_distance(origin, Vec3::NEG_Z, Vec3::new(0.05, 0.0, 0.0), MARKER_RADIUS);
        assert!((t.unwrap() - 10.0).abs() < 1e-5);

        assert!(marker_hit_distance(origin, Vec3::NEG_Z, Vec3::new(1.0, 0.0, 0.0), MARKER_RADIUS).is_none());
        assert!(marker_hit_distance(origin, Vec3::Z, Vec3::ZERO, MARKER_RADIUS).is_none());
    }
}

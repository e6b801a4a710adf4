//! Geometric primitives for layout and scene placement.
//!
//! # Overview
//!
//! - [`Point`] - A 2D coordinate produced by the DAG layout engines
//! - [`Bounds3`] - An axis-aligned box in scene space, used for layer
//!   backgrounds and camera framing
//!
//! Scene positions themselves are [`glam::Vec3`], re-exported here as [`Vec3`].
//!
//! # Coordinate System
//!
//! Layouts flow along +X (upstream to downstream), sibling nodes of a same
//! layout layer are stacked along Y, and nested layers sit at increasing Z.

pub use glam::Vec3;

/// A 2D point in layout space.
///
/// # Examples
///
/// ```
/// # use strata_core::geometry::Point;
/// let p1 = Point::new(10.0, 20.0);
/// let p2 = Point::new(5.0, 5.0);
///
/// let sum = p1.add_point(p2);
/// assert_eq!(sum.x(), 15.0);
/// assert_eq!(sum.y(), 25.0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    x: f32,
    y: f32,
}

impl Point {
    /// Creates a new point with the specified coordinates
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Returns the x-coordinate of the point
    pub fn x(self) -> f32 {
        self.x
    }

    /// Returns the y-coordinate of the point
    pub fn y(self) -> f32 {
        self.y
    }

    /// Adds another point to this point, returning a new point
    pub fn add_point(self, other: Point) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    /// Subtracts another point from this point, returning a new point
    pub fn sub_point(self, other: Point) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }

    /// Multiplies both coordinates by `factor`
    pub fn scale(self, factor: f32) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
        }
    }

    /// Lifts the point into scene space at depth `z`
    pub fn to_vec3(self, z: f32) -> Vec3 {
        Vec3::new(self.x, self.y, z)
    }

    /// Returns the centroid of `points`, or `None` when there are none.
    ///
    /// ```
    /// # use strata_core::geometry::Point;
    /// let centroid = Point::centroid([Point::new(0.0, 0.0), Point::new(4.0, 2.0)]);
    /// assert_eq!(centroid, Some(Point::new(2.0, 1.0)));
    /// assert_eq!(Point::centroid(std::iter::empty()), None);
    /// ```
    pub fn centroid(points: impl IntoIterator<Item = Point>) -> Option<Point> {
        let (sum, count) = points
            .into_iter()
            .fold((Point::default(), 0usize), |(sum, count), p| {
                (sum.add_point(p), count + 1)
            });
        (count > 0).then(|| sum.scale(1.0 / count as f32))
    }
}

/// An axis-aligned bounding box in scene space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds3 {
    min: Vec3,
    max: Vec3,
}

impl Bounds3 {
    /// Creates a box from two opposite corners.
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Creates a box centered on `center` with the given half extents.
    pub fn from_center(center: Vec3, half_extents: Vec3) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    /// Smallest box containing every point, or `None` for an empty input.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        points.into_iter().fold(None, |acc: Option<Self>, p| match acc {
            Some(bounds) => Some(bounds.include(p)),
            None => Some(Self::new(p, p)),
        })
    }

    pub fn min(self) -> Vec3 {
        self.min
    }

    pub fn max(self) -> Vec3 {
        self.max
    }

    pub fn center(self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(self) -> Vec3 {
        self.max - self.min
    }

    /// Grows the box so that it contains `point`.
    pub fn include(self, point: Vec3) -> Self {
        Self {
            min: self.min.min(point),
            max: self.max.max(point),
        }
    }

    /// Smallest box containing both boxes.
    pub fn merge(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Maps both corners through `scale` then `offset`.
    pub fn transform(self, scale: f32, offset: Vec3) -> Self {
        Self::new(self.min * scale + offset, self.max * scale + offset)
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_point_arithmetic() {
        let p = Point::new(3.0, 4.0);
        assert_eq!(p.sub_point(Point::new(1.0, 1.0)), Point::new(2.0, 3.0));
        assert_eq!(p.scale(2.0), Point::new(6.0, 8.0));
        assert_eq!(p.to_vec3(100.0), Vec3::new(3.0, 4.0, 100.0));
    }

    #[test]
    fn test_bounds_from_points() {
        let bounds = Bounds3::from_points([
            Vec3::new(1.0, -2.0, 0.0),
            Vec3::new(-3.0, 4.0, 1.0),
            Vec3::new(0.0, 0.0, -1.0),
        ])
        .expect("non-empty input");

        assert_eq!(bounds.min(), Vec3::new(-3.0, -2.0, -1.0));
        assert_eq!(bounds.max(), Vec3::new(1.0, 4.0, 1.0));
        assert_eq!(bounds.center(), Vec3::new(-1.0, 1.0, 0.0));
        assert_eq!(bounds.size(), Vec3::new(4.0, 6.0, 2.0));
    }

    #[test]
    fn test_bounds_empty() {
        assert!(Bounds3::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn test_bounds_merge_and_transform() {
        let a = Bounds3::new(Vec3::ZERO, Vec3::ONE);
        let b = Bounds3::new(Vec3::splat(2.0), Vec3::splat(3.0));
        let merged = a.merge(b);
        assert_eq!(merged.min(), Vec3::ZERO);
        assert_eq!(merged.max(), Vec3::splat(3.0));

        let moved = a.transform(2.0, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(moved.min(), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(moved.max(), Vec3::new(3.0, 2.0, 2.0));
    }

    proptest! {
        #[test]
        fn prop_centroid_of_recentered_points_is_origin(
            coords in prop::collection::vec((-1000.0f32..1000.0, -1000.0f32..1000.0), 1..50)
        ) {
            let points: Vec<Point> = coords.iter().map(|&(x, y)| Point::new(x, y)).collect();
            let centroid = Point::centroid(points.iter().copied()).expect("non-empty");
            let moved = Point::centroid(points.iter().map(|p| p.sub_point(centroid))).expect("non-empty");
            prop_assert!(approx_eq!(f32, moved.x(), 0.0, epsilon = 5e-2));
            prop_assert!(approx_eq!(f32, moved.y(), 0.0, epsilon = 5e-2));
        }
    }
}

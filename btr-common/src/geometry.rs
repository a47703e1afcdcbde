//! Geometry and matching helpers
//!
//! Pure functions over [`DrawingObject`] positions used by the diff engine.

use std::cmp::Ordering;

use crate::drawing::{DrawingObject, DrawingVersion};

/// Default maximum center-to-center distance for "near" matches
pub const DEFAULT_NEARBY_THRESHOLD: f64 = 5.0;

/// 2D point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Center of an object's bounding box: `(x + width/2, y + height/2)`
pub fn center(object: &DrawingObject) -> Point {
    Point::new(object.x + object.width / 2.0, object.y + object.height / 2.0)
}

/// Center-to-center Euclidean distance between two objects
pub fn distance(a: &DrawingObject, b: &DrawingObject) -> f64 {
    center(a).distance_to(&center(b))
}

/// Nearest other object in `version` strictly closer than `threshold`
///
/// `object` itself (matched by id) is never a candidate. Candidates are ordered
/// by `(distance, id)` so equal distances resolve to the smallest id.
pub fn nearest_within<'a>(
    object: &DrawingObject,
    version: &'a DrawingVersion,
    threshold: f64,
) -> Option<&'a DrawingObject> {
    let mut candidates: Vec<(f64, &DrawingObject)> = version
        .objects()
        .filter(|other| other.id != object.id)
        .map(|other| (distance(object, other), other))
        .filter(|(d, _)| *d < threshold)
        .collect();

    candidates.sort_by(|(da, a), (db, b)| {
        da.partial_cmp(db)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });

    candidates.into_iter().next().map(|(_, other)| other)
}

/// Compass label for a displacement
///
/// `"south"`/`"north"` from the sign of `dy`, followed by `"east"`/`"west"`
/// from the sign of `dx`, concatenated without a separator. Empty only when
/// both components are zero.
pub fn direction_label(dx: f64, dy: f64) -> String {
    let mut label = String::new();
    if dy < 0.0 {
        label.push_str("south");
    }
    if dy > 0.0 {
        label.push_str("north");
    }
    if dx > 0.0 {
        label.push_str("east");
    }
    if dx < 0.0 {
        label.push_str("west");
    }
    label
}

//! Drawing diff engine
//!
//! Compares two [`DrawingVersion`]s and renders a [`ChangeReport`] meant to be
//! read directly by a reviewer. All output lists follow ascending id order.
//!
//! Entry formats:
//! - added: `"{id} ({type} near {other_id})"` or `"{id} ({type} at {x},{y})"`
//! - removed: `"{id} ({type} at {x},{y})"`
//! - moved: `"{id} moved {distance:.1} units {direction}"`

use tracing::debug;

use crate::drawing::{ChangeReport, DrawingObject, DrawingVersion};
use crate::geometry::{self, DEFAULT_NEARBY_THRESHOLD};
use crate::{Error, Result};

/// Summary used when no entries were produced
pub const NO_CHANGES_SUMMARY: &str = "No changes detected.";

/// Diff engine
///
/// Stateless apart from its configuration; safe to share across threads.
#[derive(Debug, Clone, Copy)]
pub struct DiffEngine {
    /// Maximum center distance (exclusive) for describing an addition as
    /// "near" another object
    nearby_threshold: f64,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DiffEngine {
    /// Create engine with the default nearby threshold (5 units)
    pub fn new() -> Self {
        Self {
            nearby_threshold: DEFAULT_NEARBY_THRESHOLD,
        }
    }

    /// Set the nearby-match threshold
    pub fn with_nearby_threshold(mut self, threshold: f64) -> Result<Self> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(Error::InvalidInput(format!(
                "Nearby threshold must be a finite, non-negative number (got {})",
                threshold
            )));
        }
        self.nearby_threshold = threshold;
        Ok(self)
    }

    pub fn nearby_threshold(&self) -> f64 {
        self.nearby_threshold
    }

    /// Compare version `a` (before) with version `b` (after)
    pub fn diff(&self, a: &DrawingVersion, b: &DrawingVersion) -> ChangeReport {
        let added: Vec<String> = b
            .objects()
            .filter(|o| !a.contains(&o.id))
            .map(|o| self.describe_added(o, b))
            .collect();

        let removed: Vec<String> = a
            .objects()
            .filter(|o| !b.contains(&o.id))
            .map(describe_at)
            .collect();

        let moved: Vec<String> = a
            .objects()
            .filter_map(|old| b.get(&old.id).and_then(|new| describe_move(old, new)))
            .collect();

        let summary = summarize(&added, &removed, &moved);
        debug!(
            added = added.len(),
            removed = removed.len(),
            moved = moved.len(),
            "Diff computed"
        );

        ChangeReport {
            added,
            removed,
            moved,
            summary,
        }
    }

    fn describe_added(&self, object: &DrawingObject, version: &DrawingVersion) -> String {
        match geometry::nearest_within(object, version, self.nearby_threshold) {
            Some(other) => format!("{} ({} near {})", object.id, object.kind, other.id),
            None => describe_at(object),
        }
    }
}

/// Compare two versions using the default engine configuration
pub fn diff(a: &DrawingVersion, b: &DrawingVersion) -> ChangeReport {
    DiffEngine::new().diff(a, b)
}

fn describe_at(object: &DrawingObject) -> String {
    format!("{} ({} at {},{})", object.id, object.kind, object.x, object.y)
}

/// Moved entry for a common id, `None` when the position is unchanged
fn describe_move(old: &DrawingObject, new: &DrawingObject) -> Option<String> {
    if old.x == new.x && old.y == new.y {
        return None;
    }
    let dx = new.x - old.x;
    let dy = new.y - old.y;
    let distance = (dx * dx + dy * dy).sqrt();
    Some(format!(
        "{} moved {:.1} units {}",
        new.id,
        distance,
        geometry::direction_label(dx, dy)
    ))
}

/// Moved, then added, then removed; `"; "`-joined with a trailing period
fn summarize(added: &[String], removed: &[String], moved: &[String]) -> String {
    let parts: Vec<String> = moved
        .iter()
        .cloned()
        .chain(added.iter().map(|entry| format!("{} added", entry)))
        .chain(removed.iter().map(|entry| format!("{} removed", entry)))
        .collect();

    if parts.is_empty() {
        NO_CHANGES_SUMMARY.to_string()
    } else {
        format!("{}.", parts.join("; "))
    }
}

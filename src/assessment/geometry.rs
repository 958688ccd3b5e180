//! Placement of non-overlapping square regions on the stimulus canvas

use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::config::CanvasConfig;
use crate::core::error::BatteryError;

/// A square clickable area on the canvas
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Region {
    /// Identifier, assigned in placement order starting at 0
    pub id: usize,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Region {
    /// Axis-aligned overlap test. Regions that share an edge count as overlapping.
    pub fn overlaps(&self, other: &Region) -> bool {
        !(self.x2 < other.x1 || self.x1 > other.x2 || self.y2 < other.y1 || self.y1 > other.y2)
    }

    /// Whether the region lies fully inside the canvas
    pub fn within(&self, canvas: &CanvasConfig) -> bool {
        self.x1 >= 0.0 && self.y1 >= 0.0 && self.x2 <= canvas.width && self.y2 <= canvas.height
    }
}

/// Place `box_count` non-overlapping squares of `canvas.box_size` on the canvas.
///
/// Candidates are drawn uniformly and rejected on overlap. The total number of
/// draws is capped by `canvas.max_placement_attempts`; exhausting it means the
/// configuration is too dense and yields a `ConfigurationError`.
pub fn place_regions<R: Rng + ?Sized>(
    box_count: usize,
    canvas: &CanvasConfig,
    rng: &mut R,
) -> Result<Vec<Region>, BatteryError> {
    let max_x = canvas.width - canvas.box_size;
    let max_y = canvas.height - canvas.box_size;
    if !(canvas.box_size > 0.0) || max_x < 0.0 || max_y < 0.0 {
        return Err(BatteryError::ConfigurationError(format!(
            "box size {} does not fit a {}x{} canvas",
            canvas.box_size, canvas.width, canvas.height
        )));
    }

    let mut regions: Vec<Region> = Vec::with_capacity(box_count);
    let mut attempts: u32 = 0;

    while regions.len() < box_count {
        if attempts >= canvas.max_placement_attempts {
            return Err(BatteryError::ConfigurationError(format!(
                "placed only {} of {} regions after {} attempts",
                regions.len(),
                box_count,
                attempts
            )));
        }
        attempts += 1;

        let x1 = rng.gen_range(0.0..=max_x);
        let y1 = rng.gen_range(0.0..=max_y);
        let candidate = Region {
            id: regions.len(),
            x1,
            y1,
            x2: x1 + canvas.box_size,
            y2: y1 + canvas.box_size,
        };

        if regions.iter().all(|placed| !placed.overlaps(&candidate)) {
            regions.push(candidate);
        }
    }

    debug!("Placed {} regions in {} attempts", box_count, attempts);
    Ok(regions)
}

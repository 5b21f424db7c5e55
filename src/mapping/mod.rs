//! LED index to draw position mapping
//!
//! The fixture is modelled as LEDs placed on a circle or an arc. From a
//! [`PositionConfig`] the mapper computes, once, a set of flat buffers:
//! interleaved `(x, y)` coordinates, the angle of each LED, its distance from
//! the layout center and the index of its mirror partner. The resulting
//! [`PositionBuffers`] never change after construction, so one instance can
//! be shared (behind an `Arc`) by every consumer.
//!
//! # Mirror symmetry
//!
//! The physical strip is folded at a seam, so LED `i` pairs with LED
//! `n - 1 - i`. The relation is its own inverse and both partners sit at the
//! same distance from the center; [`PositionBuffers::validate_mirror_symmetry`]
//! checks both properties and reports where they break.
//!
//! # Queries
//!
//! Index lookups are O(1). Reverse lookups ([`PositionBuffers::pos_to_index`])
//! scan every LED; fixtures have a few hundred LEDs at most, so a spatial
//! index would cost more than it saves.

pub mod symmetry;
pub mod transform;

pub use symmetry::{SymmetryReport, DEFAULT_SYMMETRY_TOLERANCE};
pub use transform::Affine;

use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;
use thiserror::Error;

/// Default number of LEDs on the fixture
pub const DEFAULT_LED_COUNT: usize = 180;

/// Default layout radius in layout units
pub const DEFAULT_RADIUS: f32 = 200.0;

/// Errors raised while computing a layout
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappingError {
    #[error("radius must be finite and non-negative, got {0}")]
    InvalidRadius(f32),

    #[error("arc span must be in (0, 2π], got {0}")]
    InvalidArcSpan(f32),

    #[error("custom spacing lists {actual} angles for {expected} LEDs")]
    CustomAngleCount { expected: usize, actual: usize },

    #[error("custom angle at index {index} is not finite")]
    NonFiniteAngle { index: usize },

    #[error("{0} LEDs exceeds the supported maximum")]
    TooManyLeds(usize),
}

/// How LEDs are distributed along the arc
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Spacing {
    /// Equal angular steps over the arc span
    #[default]
    Uniform,
    /// Caller-supplied angle (radians, relative to `angle_offset`) per LED
    Custom(Vec<f32>),
}

/// Layout parameters for the fixture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    pub led_count: usize,
    pub radius: f32,
    pub center_x: f32,
    pub center_y: f32,
    /// Angle of LED 0 in radians (0 = positive x axis)
    pub angle_offset: f32,
    /// Increasing index moves clockwise on screen (y axis pointing down)
    pub clockwise: bool,
    /// Angular extent in radians; `2π` is a full circle
    pub arc_span: f32,
    pub spacing: Spacing,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            led_count: DEFAULT_LED_COUNT,
            radius: DEFAULT_RADIUS,
            center_x: 0.0,
            center_y: 0.0,
            angle_offset: 0.0,
            clockwise: true,
            arc_span: TAU,
            spacing: Spacing::Uniform,
        }
    }
}

impl PositionConfig {
    /// Config for `led_count` LEDs with every other field defaulted
    pub fn with_led_count(led_count: usize) -> Self {
        Self {
            led_count,
            ..Self::default()
        }
    }

    fn is_full_circle(&self) -> bool {
        (self.arc_span - TAU).abs() < 1e-6
    }

    fn validate(&self) -> Result<(), MappingError> {
        if !self.radius.is_finite() || self.radius < 0.0 {
            return Err(MappingError::InvalidRadius(self.radius));
        }
        if !self.arc_span.is_finite() || self.arc_span <= 0.0 || self.arc_span > TAU + 1e-6 {
            return Err(MappingError::InvalidArcSpan(self.arc_span));
        }
        if u32::try_from(self.led_count).is_err() {
            return Err(MappingError::TooManyLeds(self.led_count));
        }
        if let Spacing::Custom(angles) = &self.spacing {
            if angles.len() != self.led_count {
                return Err(MappingError::CustomAngleCount {
                    expected: self.led_count,
                    actual: angles.len(),
                });
            }
            if let Some(index) = angles.iter().position(|a| !a.is_finite()) {
                return Err(MappingError::NonFiniteAngle { index });
            }
        }
        Ok(())
    }

    /// Angle of LED `i` relative to `angle_offset`, before direction is applied
    fn relative_angle(&self, i: usize) -> f64 {
        match &self.spacing {
            Spacing::Custom(angles) => angles[i] as f64,
            Spacing::Uniform => {
                let n = self.led_count;
                let step = if self.is_full_circle() {
                    self.arc_span as f64 / n as f64
                } else if n > 1 {
                    self.arc_span as f64 / (n - 1) as f64
                } else {
                    0.0
                };
                i as f64 * step
            }
        }
    }
}

/// Everything known about one LED's placement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedPosition {
    pub index: usize,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub distance: f32,
    pub mirror_index: usize,
}

/// Axis-aligned bounding box of a layout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Bounds {
    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.min_x + self.max_x) * 0.5,
            (self.min_y + self.max_y) * 0.5,
        )
    }
}

/// Precomputed, read-only layout of the fixture
#[derive(Debug, Clone)]
pub struct PositionBuffers {
    positions: Box<[f32]>,
    angles: Box<[f32]>,
    distances: Box<[f32]>,
    mirror: Box<[u32]>,
    config: PositionConfig,
}

/// Compute the layout described by `config`.
///
/// Deterministic: the same config always yields bit-identical buffers.
pub fn compute_positions(config: &PositionConfig) -> Result<PositionBuffers, MappingError> {
    config.validate()?;

    let n = config.led_count;
    let direction = if config.clockwise { 1.0 } else { -1.0 };
    let (cx, cy) = (config.center_x as f64, config.center_y as f64);
    let radius = config.radius as f64;

    let mut positions = Vec::with_capacity(n * 2);
    let mut angles = Vec::with_capacity(n);
    let mut distances = Vec::with_capacity(n);
    let mut mirror = Vec::with_capacity(n);

    for i in 0..n {
        let theta = config.angle_offset as f64 + direction * config.relative_angle(i);
        let x = cx + radius * theta.cos();
        let y = cy + radius * theta.sin();
        positions.push(x as f32);
        positions.push(y as f32);
        angles.push(theta.rem_euclid(std::f64::consts::TAU) as f32);
        distances.push(((x - cx).powi(2) + (y - cy).powi(2)).sqrt() as f32);
        // n fits in u32 (checked by validate)
        mirror.push((n - 1 - i) as u32);
    }

    tracing::debug!(
        led_count = n,
        radius = config.radius,
        arc_span = config.arc_span,
        "Computed LED positions"
    );

    Ok(PositionBuffers {
        positions: positions.into_boxed_slice(),
        angles: angles.into_boxed_slice(),
        distances: distances.into_boxed_slice(),
        mirror: mirror.into_boxed_slice(),
        config: config.clone(),
    })
}

impl PositionBuffers {
    /// Number of LEDs in the layout
    pub fn len(&self) -> usize {
        self.angles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }

    /// Interleaved `(x, y)` coordinates, two floats per LED
    pub fn positions(&self) -> &[f32] {
        &self.positions
    }

    /// Angle of each LED in radians, normalized to `[0, 2π)`
    pub fn angles(&self) -> &[f32] {
        &self.angles
    }

    /// Distance of each LED from the layout center
    pub fn distances(&self) -> &[f32] {
        &self.distances
    }

    /// Mirror partner of each LED
    pub fn mirror_indices(&self) -> &[u32] {
        &self.mirror
    }

    /// The config these buffers were computed from
    pub fn config(&self) -> &PositionConfig {
        &self.config
    }

    fn check_index(&self, index: usize) {
        assert!(
            index < self.len(),
            "LED index {} out of range for a layout of {} LEDs",
            index,
            self.len()
        );
    }

    /// Position of LED `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn index_to_pos(&self, index: usize) -> (f32, f32) {
        self.check_index(index);
        (self.positions[index * 2], self.positions[index * 2 + 1])
    }

    /// Mirror partner of LED `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn mirror(&self, index: usize) -> usize {
        self.check_index(index);
        self.mirror[index] as usize
    }

    /// Distance of LED `index` from the layout center.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn distance(&self, index: usize) -> f32 {
        self.check_index(index);
        self.distances[index]
    }

    /// Full placement record of LED `index`, or `None` if out of range
    pub fn get_led_position(&self, index: usize) -> Option<LedPosition> {
        if index >= self.len() {
            return None;
        }
        Some(LedPosition {
            index,
            x: self.positions[index * 2],
            y: self.positions[index * 2 + 1],
            angle: self.angles[index],
            distance: self.distances[index],
            mirror_index: self.mirror[index] as usize,
        })
    }

    /// Index of the LED nearest to `(x, y)`, or `None` for an empty layout
    pub fn pos_to_index(&self, x: f32, y: f32) -> Option<usize> {
        self.positions
            .chunks_exact(2)
            .enumerate()
            .map(|(i, p)| (i, (p[0] - x).powi(2) + (p[1] - y).powi(2)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    /// Bounding box of all LED centers, or `None` for an empty layout
    pub fn bounds(&self) -> Option<Bounds> {
        let mut points = self.positions.chunks_exact(2);
        let first = points.next()?;
        let init = Bounds {
            min_x: first[0],
            min_y: first[1],
            max_x: first[0],
            max_y: first[1],
        };
        Some(points.fold(init, |b, p| Bounds {
            min_x: b.min_x.min(p[0]),
            min_y: b.min_y.min(p[1]),
            max_x: b.max_x.max(p[0]),
            max_y: b.max_y.max(p[1]),
        }))
    }

    /// Apply `affine` to a copy of the positions; the canonical buffer is untouched
    pub fn transform_positions(&self, affine: &Affine) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.positions.len());
        affine.apply_into(&self.positions, &mut out);
        out
    }

    /// Check the mirror relation with the given distance tolerance
    pub fn validate_mirror_symmetry(&self, tolerance: f32) -> SymmetryReport {
        symmetry::validate(&self.mirror, &self.distances, tolerance)
    }
}

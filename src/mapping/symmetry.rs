//! Mirror-symmetry diagnostics

/// Distance tolerance used when none is specified
pub const DEFAULT_SYMMETRY_TOLERANCE: f32 = 1e-3;

/// Outcome of a mirror-symmetry check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymmetryReport {
    /// True when every LED passed both checks
    pub valid: bool,
    /// First LED whose mirror is not involutive or whose distance diverges
    pub first_divergent_index: Option<usize>,
    /// Largest distance difference between mirror partners
    pub max_error: f32,
    /// Number of LEDs checked
    pub checked: usize,
}

pub(crate) fn validate(mirror: &[u32], distances: &[f32], tolerance: f32) -> SymmetryReport {
    let n = mirror.len();
    let mut first_divergent_index = None;
    let mut max_error = 0.0f32;

    for (i, &m) in mirror.iter().enumerate() {
        let m = m as usize;
        let involutive = m < n && mirror[m] as usize == i;
        let error = if m < n {
            (distances[i] - distances[m]).abs()
        } else {
            f32::INFINITY
        };
        max_error = max_error.max(error);

        if first_divergent_index.is_none() && (!involutive || error > tolerance) {
            first_divergent_index = Some(i);
        }
    }

    if let Some(index) = first_divergent_index {
        tracing::warn!(
            index,
            max_error,
            "Mirror symmetry check failed"
        );
    }

    SymmetryReport {
        valid: first_divergent_index.is_none(),
        first_divergent_index,
        max_error,
        checked: n,
    }
}

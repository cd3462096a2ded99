// ==============================================================================
// curve.rs — PIECEWISE-LINEAR LOOKUP
// ------------------------------------------------------------------------------
// Shared by the engine torque curve (normalized rpm -> normalized torque) and the
// tire friction curves (slip -> friction coefficient). Outside the first/last
// breakpoint the end value is held.
// ==============================================================================

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearCurve {
    /// (x, y) breakpoints, strictly increasing in x.
    pub points: Vec<(f32, f32)>,
}

impl LinearCurve {
    pub fn new(points: Vec<(f32, f32)>) -> Self {
        Self { points }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.points.is_empty() {
            return Err(ConfigError::Curve { reason: "no breakpoints" });
        }
        if self
            .points
            .iter()
            .any(|(x, y)| !x.is_finite() || !y.is_finite())
        {
            return Err(ConfigError::Curve { reason: "non-finite breakpoint" });
        }
        if self.points.windows(2).any(|w| w[1].0 <= w[0].0) {
            return Err(ConfigError::Curve {
                reason: "breakpoints must be strictly increasing",
            });
        }
        Ok(())
    }

    /// Interpolated value at `x`. An empty curve reads as zero.
    pub fn sample(&self, x: f32) -> f32 {
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return 0.0;
        };
        if !x.is_finite() {
            return 0.0;
        }
        if x <= first.0 {
            return first.1;
        }
        if x >= last.0 {
            return last.1;
        }

        // first index whose x is past the query
        let hi = self.points.partition_point(|p| p.0 <= x);
        let (x0, y0) = self.points[hi - 1];
        let (x1, y1) = self.points[hi];
        let t = (x - x0) / (x1 - x0);
        y0 + (y1 - y0) * t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn interpolates_between_breakpoints() {
        let c = LinearCurve::new(vec![(0.0, 0.0), (1.0, 2.0), (3.0, 0.0)]);
        assert_relative_eq!(c.sample(0.5), 1.0);
        assert_relative_eq!(c.sample(2.0), 1.0);
        assert_relative_eq!(c.sample(1.0), 2.0);
    }

    #[test]
    fn holds_end_values() {
        let c = LinearCurve::new(vec![(0.0, 0.8), (1.0, 0.6)]);
        assert_relative_eq!(c.sample(-4.0), 0.8);
        assert_relative_eq!(c.sample(9.0), 0.6);
        assert_eq!(c.sample(f32::NAN), 0.0);
    }

    #[test]
    fn rejects_unsorted_points() {
        let c = LinearCurve::new(vec![(0.0, 0.0), (0.0, 1.0)]);
        assert!(matches!(c.validate(), Err(ConfigError::Curve { .. })));
        assert!(LinearCurve::new(Vec::new()).validate().is_err());
    }
}

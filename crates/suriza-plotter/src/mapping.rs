//! Board intersections to plotter coordinates.
//!
//! ```text
//! x = origin_x + edge_length × column
//! y = origin_y − edge_length × row
//! ```
//!
//! The Y axis flips because board rows grow downwards while plotter Y
//! grows upwards.

use crate::types::{LogicalPoint, PlotterPoint};

/// Stateless affine map from [`LogicalPoint`] to [`PlotterPoint`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathMapper {
    origin_x: f64,
    origin_y: f64,
    edge_length: f64,
}

impl PathMapper {
    /// `origin` is where intersection `(0, 0)` sits on the bed and
    /// `edge_length` the distance between neighbouring intersections.
    #[must_use]
    pub const fn new(origin_x: f64, origin_y: f64, edge_length: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            edge_length,
        }
    }

    #[must_use]
    pub fn map_point(&self, point: LogicalPoint) -> PlotterPoint {
        PlotterPoint::new(
            self.edge_length.mul_add(f64::from(point.column), self.origin_x),
            (-self.edge_length).mul_add(f64::from(point.row), self.origin_y),
        )
    }

    /// Map every point, keeping order and length.
    #[must_use]
    pub fn map_path(&self, path: &[LogicalPoint]) -> Vec<PlotterPoint> {
        path.iter().map(|&p| self.map_point(p)).collect()
    }
}

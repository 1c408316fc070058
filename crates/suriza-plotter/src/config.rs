//! Physical layout and timing of the plotter.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::grbl::GcodeDialect;
use crate::mapping::PathMapper;
use crate::sequencer::SequenceTiming;
use crate::types::PlotterPoint;

/// Serde support for `std::time::Duration` as fractional seconds.
// Mirrors `suriza_vision::diagnostics::duration_serde`; suriza-plotter does not depend on suriza-vision.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// A plotter setting outside its valid range.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid plotter configuration: {0}")]
pub struct InvalidPlotterConfig(pub String);

/// Where the board sits on the bed and how the drawing sequence runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotterConfig {
    /// Bed X of board intersection `(0, 0)`, in mm.
    pub origin_x: f64,
    /// Bed Y of board intersection `(0, 0)`, in mm.
    pub origin_y: f64,
    /// Distance between neighbouring intersections, in mm.
    pub edge_length: f64,
    /// Park position X, in mm.
    pub home_x: f64,
    /// Park position Y, in mm.
    pub home_y: f64,
    /// Pause after the start seek (seconds).
    #[serde(with = "duration_serde")]
    pub settle: Duration,
    /// Pause after parking (seconds).
    #[serde(with = "duration_serde")]
    pub dwell: Duration,
    /// Drawing feed rate, in mm/min.
    pub feed_rate: u32,
    /// G-code that lowers the pen.
    pub pen_down_command: String,
    /// G-code that raises the pen.
    pub pen_up_command: String,
}

impl Default for PlotterConfig {
    fn default() -> Self {
        let dialect = GcodeDialect::default();
        Self {
            origin_x: 55.0,
            origin_y: 131.0,
            edge_length: 6.5,
            home_x: 0.0,
            home_y: 0.0,
            settle: Duration::from_secs(1),
            dwell: Duration::from_secs(5),
            feed_rate: dialect.feed_rate,
            pen_down_command: dialect.pen_down,
            pen_up_command: dialect.pen_up,
        }
    }
}

impl PlotterConfig {
    /// Check every field for a usable value.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPlotterConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<(), InvalidPlotterConfig> {
        let coordinates = [
            ("origin_x", self.origin_x),
            ("origin_y", self.origin_y),
            ("home_x", self.home_x),
            ("home_y", self.home_y),
        ];
        if let Some((name, value)) = coordinates.iter().find(|(_, v)| !v.is_finite()) {
            return Err(InvalidPlotterConfig(format!("{name} must be finite, got {value}")));
        }
        if !(self.edge_length.is_finite() && self.edge_length > 0.0) {
            return Err(InvalidPlotterConfig(format!(
                "edge_length must be positive, got {}",
                self.edge_length
            )));
        }
        if self.feed_rate == 0 {
            return Err(InvalidPlotterConfig("feed_rate must be positive".to_string()));
        }
        for (name, command) in [
            ("pen_down_command", &self.pen_down_command),
            ("pen_up_command", &self.pen_up_command),
        ] {
            if command.trim().is_empty() || command.contains(['\r', '\n']) {
                return Err(InvalidPlotterConfig(format!(
                    "{name} must be a single non-empty line, got {command:?}"
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub const fn mapper(&self) -> PathMapper {
        PathMapper::new(self.origin_x, self.origin_y, self.edge_length)
    }

    #[must_use]
    pub const fn timing(&self) -> SequenceTiming {
        SequenceTiming {
            home: PlotterPoint::new(self.home_x, self.home_y),
            settle: self.settle,
            dwell: self.dwell,
        }
    }

    #[must_use]
    pub fn dialect(&self) -> GcodeDialect {
        GcodeDialect {
            feed_rate: self.feed_rate,
            pen_down: self.pen_down_command.clone(),
            pen_up: self.pen_up_command.clone(),
        }
    }
}

//! Pipeline diagnostics: timing and counts for each recognition stage.
//!
//! Collected by [`detect_with_diagnostics`](crate::detect_with_diagnostics)
//! and intended for tuning the threshold and marker parameters against
//! real lighting.
//!
//! Timing goes through the [`Clock`] trait so this crate never reads
//! the system clock itself; the binary supplies a [`std::time::Instant`]
//! backed implementation.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{BoardCorners, Dimensions};

/// Source of timestamps for stage timing.
pub trait Clock {
    /// Opaque timestamp type.
    type Instant;

    /// The current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Serde support for `std::time::Duration` as fractional seconds.
pub mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    ///
    /// # Errors
    ///
    /// Fails on negative, non-finite, or overflowing values.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single recognition run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionDiagnostics {
    /// Stage 1: fisheye lens correction.
    pub rectify: StageDiagnostics,
    /// Stage 2: crop, threshold, marker extraction, corner selection.
    pub localize: StageDiagnostics,
    /// Stage 3: homography and warp.
    pub normalize: StageDiagnostics,
    /// Stage 4: per-cell recognition.
    pub decode: StageDiagnostics,
    /// Total wall-clock duration of the whole pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    Rectify {
        /// Frame size.
        resolution: Dimensions,
    },
    Localize {
        /// Hole contours that passed the area filter.
        marker_count: usize,
        /// Markers needed for corner selection.
        required: usize,
        /// Fraction of ROI pixels that thresholded to ink.
        ink_ratio: f64,
        /// Selected corners in ROI pixels.
        corners: BoardCorners,
    },
    Normalize {
        /// Side of the canonical square.
        target_size: u32,
    },
    Decode {
        /// Cells decoded.
        cell_count: usize,
        /// Cells with no ink.
        blank_count: usize,
        /// Inked cells the recognizer could not read.
        unknown_count: usize,
    },
}

impl VisionDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Vision Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration)
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<16} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let stages = [
            ("Rectify", &self.rectify),
            ("Localize", &self.localize),
            ("Normalize", &self.normalize),
            ("Decode", &self.decode),
        ];
        for (name, diag) in stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<16} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Rectify { resolution } => format!("{resolution}"),
        StageMetrics::Localize {
            marker_count,
            required,
            ink_ratio,
            corners,
        } => format!(
            "{marker_count} markers (need {required}), ink {:.1}%, TL={} TR={} BL={} BR={}",
            ink_ratio * 100.0,
            corners.top_left,
            corners.top_right,
            corners.bottom_left,
            corners.bottom_right,
        ),
        StageMetrics::Normalize { target_size } => format!("{target_size}x{target_size}"),
        StageMetrics::Decode {
            cell_count,
            blank_count,
            unknown_count,
        } => format!("{cell_count} cells, {blank_count} blank, {unknown_count} unknown"),
    }
}

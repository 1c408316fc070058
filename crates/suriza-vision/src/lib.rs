//! suriza-vision: board recognition from a single camera frame (sans-IO).
//!
//! Turns a raw fisheye frame of the printed puzzle board into a `C × C`
//! grid of digits through:
//! lens correction -> crop + adaptive threshold -> intersection marker
//! extraction -> corner selection -> perspective normalization ->
//! per-cell recognition.
//!
//! This crate has **no I/O dependencies**: frames arrive as in-memory
//! images and the character recognizer is injected through
//! [`GlyphRecognizer`]. Cameras, OCR engines and files live in
//! `suriza-io`.

pub mod decode;
pub mod diagnostics;
pub mod lens;
pub mod localize;
pub mod normalize;
pub mod pipeline;
pub mod threshold;
pub mod types;

pub use decode::{CellDecoder, GlyphRecognizer, RecognitionError};
pub use diagnostics::{Clock, StageDiagnostics, StageMetrics, VisionDiagnostics};
pub use lens::{CalibrationModel, LensCorrector};
pub use localize::MarkerBox;
pub use normalize::{Homography, PerspectiveNormalizer};
pub use pipeline::{Pipeline, VisionResult};
pub use types::{
    BoardCorners, CellIndex, CornerName, Degeneracy, Digit, Dimensions, Frame, GrayImage, Grid,
    GridGeometry, Point, RgbImage, Roi, ThresholdConfig, VisionConfig, VisionError,
};

/// Run every recognition stage on one frame.
///
/// The returned grid may contain [`Digit::Unknown`] cells; callers that
/// act on the grid should check [`Grid::ensure_recognized`].
///
/// # Errors
///
/// Returns the first [`VisionError`] raised by any stage.
pub fn detect(
    frame: Frame,
    config: &VisionConfig,
    corrector: &LensCorrector,
    recognizer: &dyn GlyphRecognizer,
) -> Result<VisionResult, VisionError> {
    let result = Pipeline::new(frame, config.clone())
        .rectify(corrector)?
        .localize()?
        .normalize()?
        .decode(recognizer)?
        .into_result();
    tracing::info!(
        blank = result.grid.blank_count(),
        unknown = result.grid.unknown_cells().len(),
        "board recognized"
    );
    Ok(result)
}

/// Like [`detect`], additionally timing each stage with `clock`.
///
/// # Errors
///
/// Returns the first [`VisionError`] raised by any stage.
pub fn detect_with_diagnostics<C: Clock>(
    frame: Frame,
    config: &VisionConfig,
    corrector: &LensCorrector,
    recognizer: &dyn GlyphRecognizer,
    clock: &C,
) -> Result<(VisionResult, VisionDiagnostics), VisionError> {
    let start = clock.now();
    let resolution = Dimensions::of(&frame);

    let t = clock.now();
    let rectified = Pipeline::new(frame, config.clone()).rectify(corrector)?;
    let rectify = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Rectify { resolution },
    };

    let t = clock.now();
    let located = rectified.localize()?;
    let localize = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Localize {
            marker_count: located.markers().len(),
            required: 2 * config.grid.intersection_count(),
            ink_ratio: located.ink_ratio(),
            corners: *located.corners(),
        },
    };

    let t = clock.now();
    let warped = located.normalize()?;
    let normalize = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Normalize {
            target_size: warped.homography().target_size(),
        },
    };

    let t = clock.now();
    let decoded = warped.decode(recognizer)?;
    let grid = decoded.grid();
    let decode = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Decode {
            cell_count: grid.size() * grid.size(),
            blank_count: grid.blank_count(),
            unknown_count: grid.unknown_cells().len(),
        },
    };

    let diagnostics = VisionDiagnostics {
        rectify,
        localize,
        normalize,
        decode,
        total_duration: clock.elapsed(&start),
    };
    Ok((decoded.into_result(), diagnostics))
}

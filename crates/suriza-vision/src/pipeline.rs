//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! ```rust,no_run
//! # use suriza_vision::{GlyphRecognizer, LensCorrector, Pipeline, VisionConfig, VisionError};
//! # fn run(frame: suriza_vision::Frame, recognizer: &dyn GlyphRecognizer) -> Result<(), VisionError> {
//! let config = VisionConfig::default();
//! let corrector = LensCorrector::new(&config.calibration)?;
//! let result = Pipeline::new(frame, config)
//!     .rectify(&corrector)?
//!     .localize()?
//!     .normalize()?
//!     .decode(recognizer)?
//!     .into_result();
//! println!("{}", result.grid);
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next pipeline state,
//! carrying forward the intermediates later stages and callers need.
//! The raw frame is dropped once rectified.

use crate::decode::{CellDecoder, GlyphRecognizer};
use crate::lens::LensCorrector;
use crate::localize::MarkerBox;
use crate::normalize::{Homography, PerspectiveNormalizer};
use crate::threshold::ink_ratio;
use crate::types::{BoardCorners, Frame, GrayImage, Grid, VisionConfig, VisionError};

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
#[must_use = "pipeline stages are consumed by advancing, call .rectify() to continue"]
pub struct Pending {
    config: VisionConfig,
    frame: Frame,
}

impl Pending {
    /// The raw camera frame.
    #[must_use]
    pub const fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Remove lens distortion and advance to the [`Rectified`] stage.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::FrameSizeMismatch`] if the frame does not
    /// have the corrector's resolution.
    pub fn rectify(self, corrector: &LensCorrector) -> Result<Rectified, VisionError> {
        let rectified = corrector.correct(&self.frame)?;
        Ok(Rectified {
            config: self.config,
            rectified,
        })
    }
}

// ───────────────────────── Stage 1: Rectified ────────────────────────

/// Pipeline state after lens correction.
#[must_use = "pipeline stages are consumed by advancing, call .localize() to continue"]
pub struct Rectified {
    config: VisionConfig,
    rectified: Frame,
}

impl Rectified {
    /// The undistorted frame.
    #[must_use]
    pub const fn rectified(&self) -> &Frame {
        &self.rectified
    }

    /// Find the board corners and advance to the [`Located`] stage.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::RoiOutOfBounds`] or
    /// [`VisionError::MarkerCount`].
    pub fn localize(self) -> Result<Located, VisionError> {
        let localized = crate::localize::locate(&self.rectified, &self.config)?;
        Ok(Located {
            config: self.config,
            rectified: self.rectified,
            binary: localized.binary,
            markers: localized.markers,
            corners: localized.corners,
        })
    }
}

// ───────────────────────── Stage 2: Located ──────────────────────────

/// Pipeline state after board localization.
#[must_use = "pipeline stages are consumed by advancing, call .normalize() to continue"]
pub struct Located {
    config: VisionConfig,
    rectified: Frame,
    binary: GrayImage,
    markers: Vec<MarkerBox>,
    corners: BoardCorners,
}

impl Located {
    /// The binarized region of interest.
    #[must_use]
    pub const fn binary(&self) -> &GrayImage {
        &self.binary
    }

    /// Every intersection marker that survived filtering.
    #[must_use]
    pub fn markers(&self) -> &[MarkerBox] {
        &self.markers
    }

    /// The four outer corners, in ROI pixels.
    #[must_use]
    pub const fn corners(&self) -> &BoardCorners {
        &self.corners
    }

    /// Fraction of the binarized ROI that is ink.
    #[must_use]
    pub fn ink_ratio(&self) -> f64 {
        ink_ratio(&self.binary)
    }

    /// Warp the board onto the canonical square and advance to the
    /// [`Warped`] stage.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::DegenerateCorners`] if the corners cannot
    /// define a perspective transform.
    pub fn normalize(self) -> Result<Warped, VisionError> {
        let normalizer =
            PerspectiveNormalizer::new(self.config.grid, self.config.min_corner_separation);
        let normalized = normalizer.normalize(&self.binary, &self.corners)?;
        Ok(Warped {
            config: self.config,
            rectified: self.rectified,
            markers: self.markers,
            corners: self.corners,
            homography: normalized.homography,
            canonical: normalized.canonical,
        })
    }
}

// ───────────────────────── Stage 3: Warped ───────────────────────────

/// Pipeline state after perspective normalization.
#[must_use = "pipeline stages are consumed by advancing, call .decode() to continue"]
pub struct Warped {
    config: VisionConfig,
    rectified: Frame,
    markers: Vec<MarkerBox>,
    corners: BoardCorners,
    homography: Homography,
    canonical: GrayImage,
}

impl Warped {
    /// The transform from ROI pixels to canonical pixels.
    #[must_use]
    pub const fn homography(&self) -> &Homography {
        &self.homography
    }

    /// The canonical board image.
    #[must_use]
    pub const fn canonical(&self) -> &GrayImage {
        &self.canonical
    }

    /// Recognize every cell and advance to the [`Decoded`] stage.
    ///
    /// Cells the recognizer cannot read are kept as
    /// [`Digit::Unknown`](crate::Digit::Unknown); use
    /// [`Grid::ensure_recognized`] to reject them.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::CanonicalSize`] or
    /// [`VisionError::Recognition`].
    pub fn decode(self, recognizer: &dyn GlyphRecognizer) -> Result<Decoded, VisionError> {
        let decoder = CellDecoder::new(
            self.config.grid,
            self.config.blank_ink_ratio,
            self.config.whitelist.as_str(),
        );
        let grid = decoder.decode(&self.canonical, recognizer)?;
        Ok(Decoded {
            rectified: self.rectified,
            markers: self.markers,
            corners: self.corners,
            canonical: self.canonical,
            grid,
        })
    }
}

// ───────────────────────── Stage 4: Decoded ──────────────────────────

/// Pipeline state after cell decoding, the final stage.
#[must_use = "call .into_result() to extract the VisionResult"]
pub struct Decoded {
    rectified: Frame,
    markers: Vec<MarkerBox>,
    corners: BoardCorners,
    canonical: GrayImage,
    grid: Grid,
}

impl Decoded {
    /// The decoded grid.
    #[must_use]
    pub const fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Extract every retained intermediate.
    #[must_use]
    pub fn into_result(self) -> VisionResult {
        VisionResult {
            grid: self.grid,
            corners: self.corners,
            markers: self.markers,
            rectified: self.rectified,
            canonical: self.canonical,
        }
    }
}

/// Everything one recognition run produced.
#[derive(Debug, Clone)]
pub struct VisionResult {
    /// The decoded `C × C` grid, possibly containing unknown cells.
    pub grid: Grid,
    /// Board corners in ROI pixels.
    pub corners: BoardCorners,
    /// Every marker found during localization.
    pub markers: Vec<MarkerBox>,
    /// The lens-corrected frame.
    pub rectified: Frame,
    /// The canonical board image the cells were read from.
    pub canonical: GrayImage,
}

/// Entry point for the staged pipeline.
pub struct Pipeline;

impl Pipeline {
    /// Create a new pipeline from a raw frame and config.
    ///
    /// No processing is performed until [`.rectify()`](Pending::rectify)
    /// is called.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(frame: Frame, config: VisionConfig) -> Pending {
        Pending { config, frame }
    }
}

//! Fisheye lens correction.
//!
//! [`LensCorrector`] precomputes a per-pixel remapping from a
//! [`CalibrationModel`] once and reuses it for every frame of that
//! resolution. Remapping uses the equidistant fisheye model with an
//! identity rectification and the camera matrix as the new projection:
//!
//! ```text
//! x = (u - cx) / fx          y = (v - cy) / fy
//! r = sqrt(x² + y²)          θ = atan(r)
//! θd = θ (1 + k1 θ² + k2 θ⁴ + k3 θ⁶ + k4 θ⁸)
//! map(u, v) = (fx · x · θd/r + cx, fy · y · θd/r + cy)
//! ```
//!
//! Sources within half a pixel of the frame edge are clamped onto it and
//! sources within 1e-4 of a pixel centre are snapped to it, so an
//! identity model reproduces the frame exactly. Output pixels whose
//! source falls further outside the raw frame are filled with black.

use image::Rgb;
use image::imageops::interpolate_bilinear;
use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, Frame, VisionError};

/// Fixed lens parameters of the camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationModel {
    /// Camera matrix `K` (row-major).
    pub intrinsics: [[f64; 3]; 3],
    /// Fisheye coefficients `k1..k4`.
    pub distortion: [f64; 4],
    /// Frame size the model was calibrated for.
    pub resolution: Dimensions,
}

impl CalibrationModel {
    /// A model whose remap is the identity within sub-pixel tolerance.
    ///
    /// The distortion coefficients are the Taylor series of `tan θ / θ`,
    /// which cancels the equidistant projection for the small field
    /// angles produced by a long focal length.
    #[must_use]
    pub fn identity(resolution: Dimensions) -> Self {
        let focal = 2.0 * f64::from(resolution.width.max(resolution.height));
        Self {
            intrinsics: [
                [focal, 0.0, f64::from(resolution.width) / 2.0],
                [0.0, focal, f64::from(resolution.height) / 2.0],
                [0.0, 0.0, 1.0],
            ],
            distortion: [1.0 / 3.0, 2.0 / 15.0, 17.0 / 315.0, 62.0 / 2835.0],
            resolution,
        }
    }

    const fn fx(&self) -> f64 {
        self.intrinsics[0][0]
    }

    const fn fy(&self) -> f64 {
        self.intrinsics[1][1]
    }

    const fn cx(&self) -> f64 {
        self.intrinsics[0][2]
    }

    const fn cy(&self) -> f64 {
        self.intrinsics[1][2]
    }

    /// Check that the model can produce a remap.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::InvalidCalibration`] naming the first
    /// quantity that is non-finite or out of range.
    pub fn validate(&self) -> Result<(), VisionError> {
        let invalid = |quantity: &'static str, value: f64| {
            Err(VisionError::InvalidCalibration { quantity, value })
        };
        if !(self.fx().is_finite() && self.fx() > 0.0) {
            return invalid("fx", self.fx());
        }
        if !(self.fy().is_finite() && self.fy() > 0.0) {
            return invalid("fy", self.fy());
        }
        if !self.cx().is_finite() {
            return invalid("cx", self.cx());
        }
        if !self.cy().is_finite() {
            return invalid("cy", self.cy());
        }
        for (name, &k) in ["k1", "k2", "k3", "k4"].into_iter().zip(&self.distortion) {
            if !k.is_finite() {
                return invalid(name, k);
            }
        }
        if self.resolution.width == 0 {
            return invalid("resolution.width", 0.0);
        }
        if self.resolution.height == 0 {
            return invalid("resolution.height", 0.0);
        }
        Ok(())
    }

    /// Source position in the raw frame for the rectified pixel `(u, v)`.
    #[must_use]
    pub fn distort(&self, u: f64, v: f64) -> (f64, f64) {
        let x = (u - self.cx()) / self.fx();
        let y = (v - self.cy()) / self.fy();
        let r = x.hypot(y);
        let scale = if r < 1e-12 {
            1.0
        } else {
            let theta = r.atan();
            let t2 = theta * theta;
            let [k1, k2, k3, k4] = self.distortion;
            let poly = k4.mul_add(t2, k3).mul_add(t2, k2).mul_add(t2, k1).mul_add(t2, 1.0);
            theta * poly / r
        };
        (
            self.fx().mul_add(x * scale, self.cx()),
            self.fy().mul_add(y * scale, self.cy()),
        )
    }
}

impl Default for CalibrationModel {
    fn default() -> Self {
        Self {
            intrinsics: [
                [897.816_122_979_901_1, 0.0, 528.226_498_490_363_4],
                [0.0, 900.047_977_869_816_8, 384.073_821_031_844_3],
                [0.0, 0.0, 1.0],
            ],
            distortion: [
                -0.144_020_533_075_504_66,
                0.601_071_475_717_074_1,
                -3.287_858_742_663_824,
                5.940_476_372_000_673,
            ],
            resolution: Dimensions::new(1024, 768),
        }
    }
}

/// Removes fisheye distortion using a remap computed once per model.
#[derive(Debug, Clone)]
pub struct LensCorrector {
    resolution: Dimensions,
    /// Source position per output pixel, row-major; `None` when the
    /// source lies outside the raw frame.
    map: Vec<Option<(f32, f32)>>,
}

impl LensCorrector {
    /// Validate `model` and precompute its remap.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::InvalidCalibration`] if the model is
    /// malformed. This is a startup-time configuration failure.
    pub fn new(model: &CalibrationModel) -> Result<Self, VisionError> {
        model.validate()?;
        let Dimensions { width, height } = model.resolution;
        let mut map = Vec::with_capacity(width as usize * height as usize);
        for v in 0..height {
            for u in 0..width {
                let (x, y) = model.distort(f64::from(u), f64::from(v));
                map.push(source_coordinate(x, width).zip(source_coordinate(y, height)));
            }
        }
        tracing::debug!(resolution = %model.resolution, "precomputed lens remap");
        Ok(Self {
            resolution: model.resolution,
            map,
        })
    }

    /// Resolution the remap was computed for.
    #[must_use]
    pub const fn resolution(&self) -> Dimensions {
        self.resolution
    }

    /// Produce a rectified copy of `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::FrameSizeMismatch`] if `frame` does not
    /// have the calibrated resolution.
    pub fn correct(&self, frame: &Frame) -> Result<Frame, VisionError> {
        let actual = Dimensions::of(frame);
        if actual != self.resolution {
            return Err(VisionError::FrameSizeMismatch {
                expected: self.resolution,
                actual,
            });
        }
        let Dimensions { width, height } = self.resolution;
        let mut rectified = Frame::from_pixel(width, height, FILL);
        for (pixel, source) in rectified.pixels_mut().zip(&self.map) {
            if let Some((x, y)) = *source
                && let Some(sample) = interpolate_bilinear(frame, x, y)
            {
                *pixel = sample;
            }
        }
        Ok(rectified)
    }
}

/// Colour of rectified pixels with no source in the raw frame.
const FILL: Rgb<u8> = Rgb([0, 0, 0]);

/// Distance from an integer below which a source coordinate is taken to
/// hit that pixel centre exactly.
const SNAP_TOLERANCE: f64 = 1e-4;

/// Map one axis of a source position into `[0, extent - 1]`.
///
/// Positions within half a pixel of the outermost centres still fall on
/// the frame and are clamped onto it; anything further out has no
/// source.
#[allow(clippy::cast_possible_truncation)]
fn source_coordinate(c: f64, extent: u32) -> Option<f32> {
    let last = f64::from(extent) - 1.0;
    if !(-0.5..=last + 0.5).contains(&c) {
        return None;
    }
    let nearest = c.round();
    let c = if (c - nearest).abs() < SNAP_TOLERANCE {
        nearest
    } else {
        c
    };
    Some(c.clamp(0.0, last) as f32)
}

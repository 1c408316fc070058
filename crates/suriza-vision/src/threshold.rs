//! Grayscale conversion and Gaussian adaptive thresholding.
//!
//! Binarizes the board crop under uneven lighting: each pixel is
//! compared against the Gaussian-weighted mean of its neighbourhood
//! minus a fixed bias.
//!
//! ```text
//! T(x, y)   = gaussian_blur(src, σ)(x, y) − bias
//! dst(x, y) = 255 if src(x, y) > T(x, y) else 0
//! ```
//!
//! Paper comes out white (255); ink, grid dots and digits come out
//! black (0).

use image::{GrayImage, Luma};

use crate::types::{Frame, ThresholdConfig};

/// Convert a color frame to grayscale using the standard luminance
/// weights.
#[must_use = "returns the grayscale image"]
pub fn to_grayscale(frame: &Frame) -> GrayImage {
    image::imageops::grayscale(frame)
}

/// Binarize `image` against its local Gaussian-weighted mean.
///
/// The blur is computed in `f32` by `imageproc`; the comparison keeps
/// the fractional part of the mean so a uniform region stays white
/// whenever `bias > 0`.
#[must_use = "returns the binary image"]
pub fn adaptive_threshold(image: &GrayImage, config: &ThresholdConfig) -> GrayImage {
    let mean = imageproc::filter::gaussian_blur_f32(image, config.sigma());
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let src = f32::from(image.get_pixel(x, y).0[0]);
        let local = f32::from(mean.get_pixel(x, y).0[0]);
        if src > local - config.bias {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Fraction of pixels in `image` that are black (ink).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn ink_ratio(image: &GrayImage) -> f64 {
    let total = u64::from(image.width()) * u64::from(image.height());
    if total == 0 {
        return 0.0;
    }
    let dark = image.pixels().filter(|p| p.0[0] == 0).count();
    dark as f64 / total as f64
}

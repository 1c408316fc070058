//! Perspective normalization: board corners to a canonical square.
//!
//! The four located corners are mapped onto the corners of a
//! `target × target` square, where
//!
//! ```text
//! target = C × (intersection_size + cell_size)
//! ```
//!
//! in the fixed correspondence order
//!
//! ```text
//! top-left     → (0, 0)         top-right    → (target, 0)
//! bottom-left  → (0, target)    bottom-right → (target, target)
//! ```
//!
//! The transform is a full projective homography: a tilted camera does
//! not see the board through an affine map. Corner configurations that
//! cannot define one (coincident or collinear points) are reported as
//! [`Degeneracy`] before any solve is attempted.

use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};

use crate::types::{BoardCorners, Degeneracy, GridGeometry, Point, VisionError};

/// A projective transform from ROI pixels to canonical pixels.
///
/// Only meaningful for the frame whose corners it was computed from.
#[derive(Debug, Clone, Copy)]
pub struct Homography {
    projection: Projection,
    target: u32,
}

impl Homography {
    /// Solve the transform taking `corners` onto a `target`-sided square.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::DegenerateCorners`] if two corners are
    /// closer than `min_separation`, if any three corners lie within
    /// `min_separation` of a common line, or if the solve is singular.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn from_corners(
        corners: &BoardCorners,
        target: u32,
        min_separation: f64,
    ) -> Result<Self, VisionError> {
        check_degeneracy(corners, min_separation)?;

        let t = target as f32;
        let from = corners.named().map(|(_, p)| (p.x as f32, p.y as f32));
        let to = [(0.0, 0.0), (t, 0.0), (0.0, t), (t, t)];
        let projection =
            Projection::from_control_points(from, to).ok_or(Degeneracy::SingularHomography)?;

        Ok(Self { projection, target })
    }

    /// Side of the canonical square.
    #[must_use]
    pub const fn target_size(&self) -> u32 {
        self.target
    }

    /// Map a ROI point into canonical coordinates.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn apply(&self, point: Point) -> Point {
        let (x, y) = self.projection * (point.x as f32, point.y as f32);
        Point::new(f64::from(x), f64::from(y))
    }

    /// Warp a binary ROI image into the canonical square.
    ///
    /// Canonical pixels with no source are filled white so they never
    /// read as ink.
    #[must_use]
    pub fn warp(&self, image: &GrayImage) -> GrayImage {
        let mut canonical = GrayImage::new(self.target, self.target);
        warp_into(
            image,
            &self.projection,
            Interpolation::Bilinear,
            Luma([255]),
            &mut canonical,
        );
        canonical
    }
}

/// Output of perspective normalization.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub homography: Homography,
    /// The `target × target` canonical board image.
    pub canonical: GrayImage,
}

/// Maps the binarized board onto the canonical square.
#[derive(Debug, Clone, Copy)]
pub struct PerspectiveNormalizer {
    geometry: GridGeometry,
    min_separation: f64,
}

impl PerspectiveNormalizer {
    /// Create a normalizer for the given layout.
    #[must_use]
    pub const fn new(geometry: GridGeometry, min_separation: f64) -> Self {
        Self {
            geometry,
            min_separation,
        }
    }

    /// Compute the homography for `corners` and warp `binary` with it.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::DegenerateCorners`] if the corners cannot
    /// define a perspective transform.
    pub fn normalize(
        &self,
        binary: &GrayImage,
        corners: &BoardCorners,
    ) -> Result<Normalized, VisionError> {
        let homography =
            Homography::from_corners(corners, self.geometry.target_size(), self.min_separation)?;
        let canonical = homography.warp(binary);
        tracing::debug!(target_size = homography.target_size(), "normalized board perspective");
        Ok(Normalized {
            homography,
            canonical,
        })
    }
}

/// Index triples into [`BoardCorners::named`] covering every choice of
/// three corners.
const CORNER_TRIPLES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];

fn check_degeneracy(corners: &BoardCorners, min_separation: f64) -> Result<(), Degeneracy> {
    let named = corners.named();

    for (i, &(first, a)) in named.iter().enumerate() {
        for &(second, b) in &named[i + 1..] {
            let distance = a.distance(b);
            if distance.is_nan() || distance < min_separation {
                return Err(Degeneracy::CoincidentCorners {
                    first,
                    second,
                    distance,
                });
            }
        }
    }

    for [i, j, k] in CORNER_TRIPLES {
        let (first, a) = named[i];
        let (second, b) = named[j];
        let (third, c) = named[k];
        let area = triangle_area(a, b, c);
        let longest = a.distance(b).max(b.distance(c)).max(a.distance(c));
        // Height of the triangle over its longest side.
        if 2.0 * area / longest < min_separation {
            return Err(Degeneracy::CollinearCorners {
                first,
                second,
                third,
                area,
            });
        }
    }
    Ok(())
}

fn triangle_area(a: Point, b: Point, c: Point) -> f64 {
    let cross = (b.x - a.x).mul_add(c.y - a.y, -((c.x - a.x) * (b.y - a.y)));
    cross.abs() / 2.0
}

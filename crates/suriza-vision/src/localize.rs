//! Board localization: find the four outer intersection markers.
//!
//! The board is printed with a small dot at every grid-line crossing.
//! After adaptive thresholding the dots are dark holes inside the white
//! paper region, so they show up as *hole* borders in Suzuki-Abe border
//! following. Hole borders that enclose less than
//! [`VisionConfig::marker_max_area`] are kept as markers; everything
//! else (digit glyphs with large enclosed areas, shadows, the outer
//! paper border) is discarded.
//!
//! Corner selection is a pure filter-then-sort over the marker boxes:
//! the `C+1` topmost markers form the top row, the `C+1` bottommost form
//! the bottom row, and the horizontal extremes of each row are the
//! corners.

use image::GrayImage;
use imageproc::contours::{BorderType, Contour, find_contours};
use serde::{Deserialize, Serialize};

use crate::threshold::{adaptive_threshold, to_grayscale};
use crate::types::{BoardCorners, Dimensions, Frame, Point, VisionConfig, VisionError};

/// Axis-aligned bounding box of one intersection marker, in ROI pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl MarkerBox {
    /// Top-left corner of the box; the reference point used for the
    /// homography.
    #[must_use]
    pub fn origin(&self) -> Point {
        Point::new(f64::from(self.x), f64::from(self.y))
    }
}

/// Output of board localization.
#[derive(Debug, Clone)]
pub struct Localized {
    /// Binarized region of interest.
    pub binary: GrayImage,
    /// Every marker that survived filtering, in detection order.
    pub markers: Vec<MarkerBox>,
    /// The four outer markers.
    pub corners: BoardCorners,
}

/// Crop, binarize, and locate the board in a rectified frame.
///
/// # Errors
///
/// Returns [`VisionError::RoiOutOfBounds`] if the configured region does
/// not fit in `rectified`, and [`VisionError::MarkerCount`] if fewer than
/// `2 * (C + 1)` markers are found.
pub fn locate(rectified: &Frame, config: &VisionConfig) -> Result<Localized, VisionError> {
    let frame = Dimensions::of(rectified);
    let roi = config.roi;
    if !roi.fits_within(frame) {
        return Err(VisionError::RoiOutOfBounds { roi, frame });
    }

    let excerpt = image::imageops::crop_imm(rectified, roi.x, roi.y, roi.width, roi.height).to_image();
    let binary = adaptive_threshold(&to_grayscale(&excerpt), &config.threshold);
    let markers = find_markers(&binary, config.marker_max_area);
    tracing::debug!(markers = markers.len(), %roi, "extracted intersection markers");

    let corners = select_corners(&markers, config.grid.intersection_count())?;
    tracing::debug!(
        top_left = %corners.top_left,
        top_right = %corners.top_right,
        bottom_left = %corners.bottom_left,
        bottom_right = %corners.bottom_right,
        "located board corners",
    );

    Ok(Localized {
        binary,
        markers,
        corners,
    })
}

/// Bounding boxes of small hole contours in a binary image.
#[must_use]
pub fn find_markers(binary: &GrayImage, max_area: f64) -> Vec<MarkerBox> {
    let contours: Vec<Contour<u32>> = find_contours(binary);
    contours
        .iter()
        .filter(|c| c.border_type == BorderType::Hole)
        .filter(|c| polygon_area(c) < max_area)
        .filter_map(bounding_box)
        .collect()
}

/// Pick the four outer corners from the marker boxes.
///
/// # Errors
///
/// Returns [`VisionError::MarkerCount`] if fewer than
/// `2 * intersection_count` markers are supplied.
pub fn select_corners(
    markers: &[MarkerBox],
    intersection_count: usize,
) -> Result<BoardCorners, VisionError> {
    let required = 2 * intersection_count;
    if intersection_count == 0 || markers.len() < required {
        return Err(VisionError::MarkerCount {
            found: markers.len(),
            required,
        });
    }

    let mut by_row = markers.to_vec();
    by_row.sort_by_key(|m| (m.y, m.x));

    let (top_left, top_right) = row_extremes(&by_row[..intersection_count]);
    let (bottom_left, bottom_right) = row_extremes(&by_row[by_row.len() - intersection_count..]);

    Ok(BoardCorners {
        top_left,
        top_right,
        bottom_left,
        bottom_right,
    })
}

/// Leftmost and rightmost marker of a non-empty row.
fn row_extremes(row: &[MarkerBox]) -> (Point, Point) {
    let mut sorted = row.to_vec();
    sorted.sort_by_key(|m| (m.x, m.y));
    let left = sorted.first().map_or(Point::new(0.0, 0.0), MarkerBox::origin);
    let right = sorted.last().map_or(Point::new(0.0, 0.0), MarkerBox::origin);
    (left, right)
}

/// Enclosed area of a contour polygon (shoelace formula).
fn polygon_area(contour: &Contour<u32>) -> f64 {
    let points = &contour.points;
    if points.len() < 3 {
        return 0.0;
    }
    let twice: f64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| f64::from(a.x).mul_add(f64::from(b.y), -(f64::from(b.x) * f64::from(a.y))))
        .sum();
    twice.abs() / 2.0
}

fn bounding_box(contour: &Contour<u32>) -> Option<MarkerBox> {
    let min_x = contour.points.iter().map(|p| p.x).min()?;
    let max_x = contour.points.iter().map(|p| p.x).max()?;
    let min_y = contour.points.iter().map(|p| p.y).min()?;
    let max_y = contour.points.iter().map(|p| p.y).max()?;
    Some(MarkerBox {
        x: min_x,
        y: min_y,
        width: max_x - min_x + 1,
        height: max_y - min_y + 1,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{Luma, Rgb};

    use super::*;
    use crate::types::Roi;

    fn marker(x: u32, y: u32) -> MarkerBox {
        MarkerBox {
            x,
            y,
            width: 5,
            height: 5,
        }
    }

    /// Deterministic jitter in `0..=4`.
    fn jitter(i: u32, j: u32) -> u32 {
        (i * 7 + j * 3) % 5
    }

    fn jittered_grid(n: u32, rows: &[u32]) -> Vec<MarkerBox> {
        rows.iter()
            .flat_map(|&j| (0..n).map(move |i| marker(20 + i * 40 + jitter(i, j), 10 + j * 40 + jitter(j, i))))
            .collect()
    }

    #[test]
    fn selects_extremal_markers_from_jittered_grid() {
        // Exactly 2 * (C + 1) markers: the top and bottom rows of a 7x7 board.
        let mut markers = jittered_grid(8, &[0, 7]);
        markers.reverse();
        let corners = select_corners(&markers, 8).unwrap();

        assert_eq!(corners.top_left, marker(20 + jitter(0, 0), 10 + jitter(0, 0)).origin());
        assert_eq!(corners.top_right, marker(20 + 7 * 40 + jitter(7, 0), 10 + jitter(0, 7)).origin());
        assert_eq!(corners.bottom_left, marker(20 + jitter(0, 7), 10 + 7 * 40 + jitter(7, 0)).origin());
        assert_eq!(
            corners.bottom_right,
            marker(20 + 7 * 40 + jitter(7, 7), 10 + 7 * 40 + jitter(7, 7)).origin()
        );
    }

    #[test]
    fn full_grid_yields_same_corners_as_edge_rows() {
        let all_rows: Vec<u32> = (0..8).collect();
        let full = select_corners(&jittered_grid(8, &all_rows), 8).unwrap();
        let edges = select_corners(&jittered_grid(8, &[0, 7]), 8).unwrap();
        assert_eq!(full, edges);
    }

    #[test]
    fn too_few_markers_is_a_marker_count_error() {
        let mut markers = jittered_grid(8, &[0, 7]);
        markers.pop();
        let err = select_corners(&markers, 8).unwrap_err();
        assert!(
            matches!(err, VisionError::MarkerCount { found: 15, required: 16 }),
            "got {err:?}"
        );
    }

    #[test]
    fn no_markers_is_a_marker_count_error() {
        assert!(matches!(
            select_corners(&[], 8),
            Err(VisionError::MarkerCount { found: 0, required: 16 })
        ));
    }

    fn paper_with_dots(dots: &[(u32, u32)], size: u32) -> GrayImage {
        GrayImage::from_fn(60, 60, |x, y| {
            let inked = dots
                .iter()
                .any(|&(dx, dy)| (dx..dx + size).contains(&x) && (dy..dy + size).contains(&y));
            if inked { Luma([0]) } else { Luma([255]) }
        })
    }

    #[test]
    fn small_holes_become_markers() {
        let binary = paper_with_dots(&[(10, 10), (40, 12)], 4);
        let mut markers = find_markers(&binary, 100.0);
        markers.sort_by_key(|m| m.x);
        assert_eq!(markers.len(), 2);
        assert!(markers[0].x.abs_diff(10) <= 1 && markers[0].y.abs_diff(10) <= 1);
        assert!(markers[1].x.abs_diff(40) <= 1 && markers[1].y.abs_diff(12) <= 1);
    }

    #[test]
    fn large_holes_are_filtered_by_area() {
        let binary = paper_with_dots(&[(10, 10)], 20);
        assert!(find_markers(&binary, 100.0).is_empty());
        assert_eq!(find_markers(&binary, 1000.0).len(), 1);
    }

    #[test]
    fn blank_paper_has_no_markers() {
        let binary = GrayImage::from_pixel(30, 30, Luma([255]));
        assert!(find_markers(&binary, 100.0).is_empty());
    }

    #[test]
    fn polygon_area_of_square() {
        let contour = Contour {
            points: vec![
                imageproc::point::Point::new(0, 0),
                imageproc::point::Point::new(4, 0),
                imageproc::point::Point::new(4, 4),
                imageproc::point::Point::new(0, 4),
            ],
            border_type: BorderType::Hole,
            parent: Some(0),
        };
        assert!((polygon_area(&contour) - 16.0).abs() < f64::EPSILON);
    }

    #[test]
    fn locate_finds_corners_of_dotted_board() {
        // 3x3 board: 4x4 intersection dots every 30 px starting at (20, 15).
        let frame = Frame::from_fn(160, 130, |x, y| {
            let on_dot = |origin: u32, v: u32| v >= origin && (v - origin) % 30 < 4 && (v - origin) / 30 < 4;
            if on_dot(20, x) && on_dot(15, y) {
                Rgb([30, 30, 30])
            } else {
                Rgb([230, 230, 225])
            }
        });
        let config = VisionConfig {
            roi: Roi {
                x: 0,
                y: 0,
                width: 160,
                height: 130,
            },
            grid: crate::types::GridGeometry {
                cell_count: 3,
                ..crate::types::GridGeometry::default()
            },
            ..VisionConfig::default()
        };

        let localized = locate(&frame, &config).unwrap();
        assert_eq!(localized.markers.len(), 16);
        let c = localized.corners;
        assert!((c.top_left.x - 20.0).abs() <= 1.0 && (c.top_left.y - 15.0).abs() <= 1.0);
        assert!((c.top_right.x - 110.0).abs() <= 1.0 && (c.top_right.y - 15.0).abs() <= 1.0);
        assert!((c.bottom_left.x - 20.0).abs() <= 1.0 && (c.bottom_left.y - 105.0).abs() <= 1.0);
        assert!((c.bottom_right.x - 110.0).abs() <= 1.0 && (c.bottom_right.y - 105.0).abs() <= 1.0);
    }

    #[test]
    fn roi_outside_frame_is_rejected() {
        let frame = Frame::new(100, 100);
        let err = locate(&frame, &VisionConfig::default()).unwrap_err();
        assert!(matches!(err, VisionError::RoiOutOfBounds { .. }));
    }
}

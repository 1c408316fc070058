//! Shared types for the suriza board recognition pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::decode::RecognitionError;
use crate::lens::CalibrationModel;

/// Re-export `GrayImage` so downstream crates can reference
/// intermediate raster data without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` so downstream crates can hand camera frames
/// to the pipeline without depending on `image` directly.
pub use image::RgbImage;

/// A raw or rectified camera frame.
///
/// Every stage produces a new frame; none mutates its input.
pub type Frame = RgbImage;

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.hypot(dy)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create new dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions of an image buffer.
    #[must_use]
    pub fn of<P: image::Pixel>(image: &image::ImageBuffer<P, Vec<P::Subpixel>>) -> Self {
        Self::new(image.width(), image.height())
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Rectangular crop applied to the rectified frame before localization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    /// Left edge in pixels.
    pub x: u32,
    /// Top edge in pixels.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Roi {
    /// Whether the region lies entirely inside an image of `frame` size.
    #[must_use]
    pub fn fits_within(&self, frame: Dimensions) -> bool {
        self.width > 0
            && self.height > 0
            && u64::from(self.x) + u64::from(self.width) <= u64::from(frame.width)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(frame.height)
    }
}

impl Default for Roi {
    fn default() -> Self {
        Self {
            x: 200,
            y: 215,
            width: 600,
            height: 310,
        }
    }
}

impl fmt::Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}+{}+{}",
            self.width, self.height, self.x, self.y
        )
    }
}

/// Names one of the four board corners in error messages and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CornerName {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl fmt::Display for CornerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TopLeft => "top-left",
            Self::TopRight => "top-right",
            Self::BottomLeft => "bottom-left",
            Self::BottomRight => "bottom-right",
        };
        f.write_str(name)
    }
}

/// The four outer intersection markers of the board, in ROI pixel
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoardCorners {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_left: Point,
    pub bottom_right: Point,
}

impl BoardCorners {
    /// Corners paired with their names, in homography correspondence
    /// order (TL, TR, BL, BR).
    #[must_use]
    pub const fn named(&self) -> [(CornerName, Point); 4] {
        [
            (CornerName::TopLeft, self.top_left),
            (CornerName::TopRight, self.top_right),
            (CornerName::BottomLeft, self.bottom_left),
            (CornerName::BottomRight, self.bottom_right),
        ]
    }
}

/// Recognized content of one puzzle cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Digit {
    Zero,
    One,
    Two,
    Three,
    /// The cell carries no ink: an unconstrained puzzle cell.
    Blank,
    /// The cell carries ink but recognition returned nothing usable.
    Unknown,
}

impl Digit {
    /// Map a recognized character onto a digit, `None` for anything
    /// outside `0..=3`.
    #[must_use]
    pub const fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(Self::Zero),
            '1' => Some(Self::One),
            '2' => Some(Self::Two),
            '3' => Some(Self::Three),
            _ => None,
        }
    }

    /// Numeric value of a recognized digit.
    #[must_use]
    pub const fn value(self) -> Option<u8> {
        match self {
            Self::Zero => Some(0),
            Self::One => Some(1),
            Self::Two => Some(2),
            Self::Three => Some(3),
            Self::Blank | Self::Unknown => None,
        }
    }

    /// Single-character rendering used in reports.
    #[must_use]
    pub const fn symbol(self) -> char {
        match self {
            Self::Zero => '0',
            Self::One => '1',
            Self::Two => '2',
            Self::Three => '3',
            Self::Blank => '.',
            Self::Unknown => '?',
        }
    }
}

/// Position of a cell within the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellIndex {
    pub row: usize,
    pub column: usize,
}

impl fmt::Display for CellIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(row {}, column {})", self.row, self.column)
    }
}

/// Square matrix of recognized cells, row-major.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    rows: Vec<Vec<Digit>>,
}

impl Grid {
    /// Build a grid from rows. Returns `None` unless the rows form a
    /// non-empty square.
    #[must_use]
    pub fn from_rows(rows: Vec<Vec<Digit>>) -> Option<Self> {
        let size = rows.len();
        if size == 0 || rows.iter().any(|row| row.len() != size) {
            return None;
        }
        Some(Self { rows })
    }

    /// Number of cells along each side.
    #[must_use]
    pub fn size(&self) -> usize {
        self.rows.len()
    }

    /// The digit at `index`, if it lies inside the grid.
    #[must_use]
    pub fn get(&self, index: CellIndex) -> Option<Digit> {
        self.rows.get(index.row)?.get(index.column).copied()
    }

    /// Rows of the grid.
    #[must_use]
    pub fn rows(&self) -> &[Vec<Digit>] {
        &self.rows
    }

    /// Every cell whose recognition was ambiguous, in row-major order.
    #[must_use]
    pub fn unknown_cells(&self) -> Vec<CellIndex> {
        self.cells()
            .filter(|&(_, digit)| digit == Digit::Unknown)
            .map(|(index, _)| index)
            .collect()
    }

    /// Number of cells with no ink.
    #[must_use]
    pub fn blank_count(&self) -> usize {
        self.cells().filter(|&(_, d)| d == Digit::Blank).count()
    }

    /// Fail when any cell is [`Digit::Unknown`].
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::RecognitionAmbiguity`] listing every
    /// unrecognized cell.
    pub fn ensure_recognized(&self) -> Result<(), VisionError> {
        let cells = self.unknown_cells();
        if cells.is_empty() {
            Ok(())
        } else {
            Err(VisionError::RecognitionAmbiguity { cells })
        }
    }

    fn cells(&self) -> impl Iterator<Item = (CellIndex, Digit)> + '_ {
        self.rows.iter().enumerate().flat_map(|(row, digits)| {
            digits
                .iter()
                .enumerate()
                .map(move |(column, &digit)| (CellIndex { row, column }, digit))
        })
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let line: Vec<String> = row.iter().map(|d| d.symbol().to_string()).collect();
            f.write_str(&line.join(" "))?;
        }
        Ok(())
    }
}

/// Fixed pixel layout of the canonical board image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridGeometry {
    /// Cells along each side of the board.
    pub cell_count: u32,
    /// Side of the band around each grid line, in canonical pixels.
    pub intersection_size: u32,
    /// Side of one cell's glyph area, in canonical pixels.
    pub cell_size: u32,
}

impl GridGeometry {
    /// Side of the canonical square image.
    #[must_use]
    pub const fn target_size(&self) -> u32 {
        self.cell_count * self.pitch()
    }

    /// Distance between consecutive cell origins.
    #[must_use]
    pub const fn pitch(&self) -> u32 {
        self.intersection_size + self.cell_size
    }

    /// Markers along one edge of the board.
    #[must_use]
    pub const fn intersection_count(&self) -> usize {
        self.cell_count as usize + 1
    }

    /// Offset of the glyph area for the cell at position `k` along an axis.
    #[must_use]
    pub const fn cell_origin(&self, k: u32) -> u32 {
        self.intersection_size + k * self.pitch()
    }
}

impl Default for GridGeometry {
    fn default() -> Self {
        Self {
            cell_count: 7,
            intersection_size: 32,
            cell_size: 96,
        }
    }
}

/// Gaussian adaptive threshold tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Odd neighbourhood size in pixels (at least 3).
    pub window: u32,
    /// Subtracted from the local weighted mean before comparison.
    pub bias: f32,
}

impl ThresholdConfig {
    /// Gaussian sigma equivalent to a `window`-sized kernel.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn sigma(&self) -> f32 {
        0.3f32.mul_add((self.window as f32 - 1.0) * 0.5 - 1.0, 0.8)
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            window: 11,
            bias: 10.0,
        }
    }
}

/// Configuration for the board recognition pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Lens model used to rectify raw frames.
    pub calibration: CalibrationModel,
    /// Crop of the rectified frame that contains the board.
    pub roi: Roi,
    /// Canonical board layout.
    pub grid: GridGeometry,
    /// Binarization tunables.
    pub threshold: ThresholdConfig,
    /// Largest hole-contour area (px²) still considered a marker dot.
    pub marker_max_area: f64,
    /// Minimum pixel distance between two board corners.
    pub min_corner_separation: f64,
    /// Dark-pixel fraction at or below which a cell counts as blank.
    pub blank_ink_ratio: f64,
    /// Characters accepted from the recognizer.
    pub whitelist: String,
}

impl VisionConfig {
    /// Check invariants the pipeline relies on.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::InvalidCalibration`] for a malformed lens
    /// model and [`VisionError::InvalidConfig`] for any other
    /// out-of-range tunable.
    pub fn validate(&self) -> Result<(), VisionError> {
        self.calibration.validate()?;
        if self.grid.cell_count == 0 || self.grid.cell_size == 0 {
            return Err(VisionError::InvalidConfig(format!(
                "grid needs at least one cell of non-zero size, got cell_count={} cell_size={}",
                self.grid.cell_count, self.grid.cell_size
            )));
        }
        if self.threshold.window < 3 || self.threshold.window % 2 == 0 {
            return Err(VisionError::InvalidConfig(format!(
                "threshold window must be odd and at least 3, got {}",
                self.threshold.window
            )));
        }
        if !self.threshold.bias.is_finite() {
            return Err(VisionError::InvalidConfig(format!(
                "threshold bias must be finite, got {}",
                self.threshold.bias
            )));
        }
        if self.marker_max_area.is_nan() || self.marker_max_area <= 0.0 {
            return Err(VisionError::InvalidConfig(format!(
                "marker_max_area must be positive, got {}",
                self.marker_max_area
            )));
        }
        if !(self.min_corner_separation.is_finite() && self.min_corner_separation > 0.0) {
            return Err(VisionError::InvalidConfig(format!(
                "min_corner_separation must be finite and positive, got {}",
                self.min_corner_separation
            )));
        }
        if !(0.0..1.0).contains(&self.blank_ink_ratio) {
            return Err(VisionError::InvalidConfig(format!(
                "blank_ink_ratio must be in [0, 1), got {}",
                self.blank_ink_ratio
            )));
        }
        if self.whitelist.is_empty() {
            return Err(VisionError::InvalidConfig(
                "digit whitelist is empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            calibration: CalibrationModel::default(),
            roi: Roi::default(),
            grid: GridGeometry::default(),
            threshold: ThresholdConfig::default(),
            marker_max_area: 100.0,
            min_corner_separation: 1.0,
            blank_ink_ratio: 0.02,
            whitelist: "0123".to_string(),
        }
    }
}

/// Why four corners cannot define a perspective transform.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Degeneracy {
    /// Two corners are closer than the configured minimum separation.
    #[error("{first} and {second} corners coincide (distance {distance:.3} px)")]
    CoincidentCorners {
        first: CornerName,
        second: CornerName,
        distance: f64,
    },

    /// Three corners lie on one line.
    #[error("{first}, {second} and {third} corners are collinear (triangle area {area:.3} px²)")]
    CollinearCorners {
        first: CornerName,
        second: CornerName,
        third: CornerName,
        area: f64,
    },

    /// The projective solve itself had no solution.
    #[error("no projective transform maps the corners onto the canonical square")]
    SingularHomography,
}

/// Errors that can occur during board recognition.
///
/// Every message names the stage and the quantity that failed its check.
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    /// The lens model is malformed.
    #[error("lens correction: invalid calibration, {quantity} = {value}")]
    InvalidCalibration { quantity: &'static str, value: f64 },

    /// A frame does not match the calibration resolution.
    #[error("lens correction: frame is {actual} but calibration expects {expected}")]
    FrameSizeMismatch {
        expected: Dimensions,
        actual: Dimensions,
    },

    /// Pipeline configuration is invalid.
    #[error("invalid vision configuration: {0}")]
    InvalidConfig(String),

    /// The region of interest does not fit inside the frame.
    #[error("board localization: region of interest {roi} exceeds frame {frame}")]
    RoiOutOfBounds { roi: Roi, frame: Dimensions },

    /// Too few intersection markers survived filtering.
    #[error(
        "board localization: found {found} intersection markers, need at least {required} \
         (board not fully visible or threshold unsuited to the lighting)"
    )]
    MarkerCount { found: usize, required: usize },

    /// The located corners cannot define a perspective transform.
    #[error("perspective normalization: {0}")]
    DegenerateCorners(#[from] Degeneracy),

    /// The canonical image is too small for the grid layout.
    #[error("cell decoding: canonical image is {actual}, need at least {required}x{required}")]
    CanonicalSize { actual: Dimensions, required: u32 },

    /// The recognition engine itself failed.
    #[error("cell decoding: recognition failed at {cell}")]
    Recognition {
        cell: CellIndex,
        #[source]
        source: RecognitionError,
    },

    /// Some cells carry ink that could not be read as a digit.
    #[error("cell decoding: {} cell(s) unrecognized: {}", .cells.len(), join_cells(.cells))]
    RecognitionAmbiguity { cells: Vec<CellIndex> },
}

fn join_cells(cells: &[CellIndex]) -> String {
    cells
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance(b) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn roi_fits_within_frame() {
        let frame = Dimensions::new(1024, 768);
        assert!(Roi::default().fits_within(frame));
        let wide = Roi {
            x: 900,
            ..Roi::default()
        };
        assert!(!wide.fits_within(frame));
        let empty = Roi {
            width: 0,
            ..Roi::default()
        };
        assert!(!empty.fits_within(frame));
    }

    #[test]
    fn geometry_defaults_give_896_pixel_canvas() {
        let g = GridGeometry::default();
        assert_eq!(g.target_size(), 896);
        assert_eq!(g.intersection_count(), 8);
        assert_eq!(g.cell_origin(0), 32);
        assert_eq!(g.cell_origin(2), 32 + 2 * 128);
    }

    #[test]
    fn threshold_sigma_matches_window_11() {
        let t = ThresholdConfig::default();
        assert!((t.sigma() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn digit_from_char_rejects_outside_domain() {
        assert_eq!(Digit::from_char('2'), Some(Digit::Two));
        assert_eq!(Digit::from_char('4'), None);
        assert_eq!(Digit::from_char('x'), None);
    }

    #[test]
    fn grid_requires_square_rows() {
        assert!(Grid::from_rows(vec![]).is_none());
        assert!(Grid::from_rows(vec![vec![Digit::One, Digit::Two], vec![Digit::One]]).is_none());
        let grid = Grid::from_rows(vec![vec![Digit::One; 2]; 2]).unwrap();
        assert_eq!(grid.size(), 2);
    }

    #[test]
    fn unknown_cells_listed_in_row_major_order() {
        let grid = Grid::from_rows(vec![
            vec![Digit::Unknown, Digit::One],
            vec![Digit::Blank, Digit::Unknown],
        ])
        .unwrap();
        assert_eq!(
            grid.unknown_cells(),
            vec![
                CellIndex { row: 0, column: 0 },
                CellIndex { row: 1, column: 1 }
            ]
        );
        assert_eq!(grid.blank_count(), 1);
    }

    #[test]
    fn ensure_recognized_names_every_ambiguous_cell() {
        let grid = Grid::from_rows(vec![
            vec![Digit::Three, Digit::Unknown],
            vec![Digit::Zero, Digit::Two],
        ])
        .unwrap();
        let err = grid.ensure_recognized().unwrap_err();
        assert_eq!(
            err.to_string(),
            "cell decoding: 1 cell(s) unrecognized: (row 0, column 1)"
        );
    }

    #[test]
    fn grid_display_uses_symbols() {
        let grid = Grid::from_rows(vec![
            vec![Digit::Three, Digit::Blank],
            vec![Digit::Unknown, Digit::Zero],
        ])
        .unwrap();
        assert_eq!(grid.to_string(), "3 .\n? 0");
    }

    #[test]
    fn marker_count_error_names_both_quantities() {
        let err = VisionError::MarkerCount {
            found: 9,
            required: 16,
        };
        let msg = err.to_string();
        assert!(msg.contains("found 9"));
        assert!(msg.contains("at least 16"));
    }

    #[test]
    fn config_rejects_even_threshold_window() {
        let config = VisionConfig {
            threshold: ThresholdConfig {
                window: 10,
                bias: 10.0,
            },
            ..VisionConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(VisionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn config_rejects_unusable_corner_separation() {
        for separation in [f64::NAN, -1.0, 0.0, f64::INFINITY] {
            let config = VisionConfig {
                min_corner_separation: separation,
                ..VisionConfig::default()
            };
            let err = config.validate().unwrap_err();
            assert!(
                err.to_string().contains("min_corner_separation"),
                "{separation}: {err}"
            );
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(VisionConfig::default().validate().is_ok());
    }

    #[test]
    fn vision_config_serde_round_trip() {
        let config = VisionConfig {
            roi: Roi {
                x: 10,
                y: 20,
                width: 300,
                height: 200,
            },
            marker_max_area: 80.0,
            ..VisionConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: VisionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn vision_config_fills_missing_fields_with_defaults() {
        let config: VisionConfig = serde_json::from_str(r#"{"marker_max_area": 50.0}"#).unwrap();
        assert!((config.marker_max_area - 50.0).abs() < f64::EPSILON);
        assert_eq!(config.grid, GridGeometry::default());
    }
}

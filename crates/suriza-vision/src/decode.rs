//! Cell decoding: read one digit out of every cell of the canonical board.
//!
//! Cell `(row, column)` occupies the square
//!
//! ```text
//! x = intersection + column × (intersection + cell)
//! y = intersection + row    × (intersection + cell)
//! side = cell
//! ```
//!
//! which sits strictly inside the grid lines, so the recognizer only
//! ever sees the glyph.
//!
//! Cells whose ink ratio is at or below
//! [`VisionConfig::blank_ink_ratio`](crate::VisionConfig::blank_ink_ratio)
//! are [`Digit::Blank`] and never reach the recognizer. Every other cell
//! is handed to a [`GlyphRecognizer`]; an empty or off-whitelist answer
//! becomes [`Digit::Unknown`], never a guessed digit.
//!
//! Cells are decoded independently and in parallel.

use image::GrayImage;
use rayon::prelude::*;

use crate::threshold::ink_ratio;
use crate::types::{CellIndex, Digit, Dimensions, Grid, GridGeometry, VisionError};

/// Failure inside a recognition engine.
#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    /// Talking to the engine failed.
    #[error("recognizer I/O failed")]
    Io(#[from] std::io::Error),

    /// The cell image could not be encoded for the engine.
    #[error("failed to encode cell image")]
    Encode(#[from] image::ImageError),

    /// The engine ran but reported failure.
    #[error("recognizer exited with status {code:?}: {stderr}")]
    Engine { code: Option<i32>, stderr: String },
}

/// Single-character glyph recognition.
///
/// Implementations are configured for single-character mode restricted
/// to the digit whitelist. They must be callable from several threads at
/// once; decoding fans cells out across the rayon pool.
pub trait GlyphRecognizer: Sync {
    /// Recognize the glyph in a binary cell image.
    ///
    /// Returns `Ok(None)` when the engine produced no character.
    ///
    /// # Errors
    ///
    /// Returns [`RecognitionError`] when the engine itself failed, as
    /// opposed to running and finding nothing.
    fn recognize(&self, cell: &GrayImage) -> Result<Option<char>, RecognitionError>;
}

/// Splits the canonical board into cells and decodes each one.
#[derive(Debug, Clone)]
pub struct CellDecoder {
    geometry: GridGeometry,
    blank_ink_ratio: f64,
    whitelist: String,
}

impl CellDecoder {
    /// Create a decoder for the given layout.
    #[must_use]
    pub fn new(geometry: GridGeometry, blank_ink_ratio: f64, whitelist: impl Into<String>) -> Self {
        Self {
            geometry,
            blank_ink_ratio,
            whitelist: whitelist.into(),
        }
    }

    /// Decode a `C × C` grid from the canonical board image.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::CanonicalSize`] if `canonical` is smaller
    /// than the layout's target size, and [`VisionError::Recognition`]
    /// naming the cell whose recognizer call failed.
    pub fn decode(
        &self,
        canonical: &GrayImage,
        recognizer: &dyn GlyphRecognizer,
    ) -> Result<Grid, VisionError> {
        let required = self.geometry.target_size();
        if canonical.width() < required || canonical.height() < required {
            return Err(VisionError::CanonicalSize {
                actual: Dimensions::of(canonical),
                required,
            });
        }

        let size = self.geometry.cell_count as usize;
        let indices: Vec<CellIndex> = (0..size)
            .flat_map(|row| (0..size).map(move |column| CellIndex { row, column }))
            .collect();

        let digits = indices
            .par_iter()
            .map(|&index| self.decode_cell(canonical, index, recognizer))
            .collect::<Result<Vec<Digit>, VisionError>>()?;

        let rows: Vec<Vec<Digit>> = digits.chunks(size).map(<[Digit]>::to_vec).collect();
        let grid = Grid::from_rows(rows).ok_or_else(|| {
            VisionError::InvalidConfig(format!("grid needs at least one cell, got {size}"))
        })?;

        tracing::debug!(
            cells = size * size,
            blank = grid.blank_count(),
            unknown = grid.unknown_cells().len(),
            "decoded cells",
        );
        Ok(grid)
    }

    /// Crop the glyph area of one cell.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn cell_image(&self, canonical: &GrayImage, index: CellIndex) -> GrayImage {
        let x = self.geometry.cell_origin(index.column as u32);
        let y = self.geometry.cell_origin(index.row as u32);
        let side = self.geometry.cell_size;
        image::imageops::crop_imm(canonical, x, y, side, side).to_image()
    }

    fn decode_cell(
        &self,
        canonical: &GrayImage,
        index: CellIndex,
        recognizer: &dyn GlyphRecognizer,
    ) -> Result<Digit, VisionError> {
        let cell = self.cell_image(canonical, index);
        if ink_ratio(&cell) <= self.blank_ink_ratio {
            return Ok(Digit::Blank);
        }

        let recognized = recognizer
            .recognize(&cell)
            .map_err(|source| VisionError::Recognition { cell: index, source })?;

        let digit = recognized
            .filter(|c| self.whitelist.contains(*c))
            .and_then(Digit::from_char)
            .unwrap_or(Digit::Unknown);
        if digit == Digit::Unknown {
            tracing::debug!(%index, ?recognized, "cell not recognized as a digit");
        }
        Ok(digit)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use image::Luma;

    use super::*;

    /// Recognizes a glyph by how many dark pixels it has.
    struct InkCountRecognizer {
        table: HashMap<usize, char>,
        calls: AtomicUsize,
    }

    impl InkCountRecognizer {
        fn new(entries: &[(usize, char)]) -> Self {
            Self {
                table: entries.iter().copied().collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl GlyphRecognizer for InkCountRecognizer {
        fn recognize(&self, cell: &GrayImage) -> Result<Option<char>, RecognitionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let dark = cell.pixels().filter(|p| p.0[0] == 0).count();
            Ok(self.table.get(&dark).copied())
        }
    }

    struct BrokenRecognizer;

    impl GlyphRecognizer for BrokenRecognizer {
        fn recognize(&self, _cell: &GrayImage) -> Result<Option<char>, RecognitionError> {
            Err(RecognitionError::Engine {
                code: Some(1),
                stderr: "engine crashed".to_string(),
            })
        }
    }

    const GEOMETRY: GridGeometry = GridGeometry {
        cell_count: 2,
        intersection_size: 4,
        cell_size: 12,
    };

    /// Square block of `side` pixels: 3 → '1', 4 → '2', 5 → off-table,
    /// 6 → '7' (off-whitelist).
    fn recognizer() -> InkCountRecognizer {
        InkCountRecognizer::new(&[(9, '1'), (16, '2'), (36, '7')])
    }

    /// White canonical image with a dark block of `side` pixels in each
    /// listed cell, plus dark grid lines that must never be seen.
    fn canonical(geometry: GridGeometry, blocks: &[(usize, usize, u32)]) -> GrayImage {
        let target = geometry.target_size();
        let mut image = GrayImage::from_fn(target, target, |x, y| {
            let on_line = |v: u32| v % geometry.pitch() < geometry.intersection_size;
            if on_line(x) || on_line(y) { Luma([0]) } else { Luma([255]) }
        });
        for &(row, column, side) in blocks {
            let x0 = geometry.cell_origin(column as u32) + 2;
            let y0 = geometry.cell_origin(row as u32) + 2;
            for y in y0..y0 + side {
                for x in x0..x0 + side {
                    image.put_pixel(x, y, Luma([0]));
                }
            }
        }
        image
    }

    #[test]
    fn decodes_digits_blanks_and_unknowns() {
        let image = canonical(GEOMETRY, &[(0, 0, 3), (1, 0, 4), (1, 1, 5)]);
        let decoder = CellDecoder::new(GEOMETRY, 0.02, "0123");
        let grid = decoder.decode(&image, &recognizer()).unwrap();
        assert_eq!(
            grid.rows(),
            &[
                vec![Digit::One, Digit::Blank],
                vec![Digit::Two, Digit::Unknown]
            ]
        );
        assert_eq!(grid.unknown_cells(), vec![CellIndex { row: 1, column: 1 }]);
    }

    #[test]
    fn off_whitelist_character_is_unknown() {
        let image = canonical(GEOMETRY, &[(0, 1, 6)]);
        let decoder = CellDecoder::new(GEOMETRY, 0.02, "0123");
        let grid = decoder.decode(&image, &recognizer()).unwrap();
        assert_eq!(grid.get(CellIndex { row: 0, column: 1 }), Some(Digit::Unknown));
    }

    #[test]
    fn narrower_whitelist_rejects_recognized_digit() {
        let image = canonical(GEOMETRY, &[(0, 0, 4)]);
        let decoder = CellDecoder::new(GEOMETRY, 0.02, "01");
        let grid = decoder.decode(&image, &recognizer()).unwrap();
        assert_eq!(grid.get(CellIndex { row: 0, column: 0 }), Some(Digit::Unknown));
    }

    #[test]
    fn blank_cells_never_reach_the_recognizer() {
        let image = canonical(GEOMETRY, &[(0, 0, 3), (1, 1, 4)]);
        let recognizer = recognizer();
        let grid = CellDecoder::new(GEOMETRY, 0.02, "0123")
            .decode(&image, &recognizer)
            .unwrap();
        assert_eq!(grid.blank_count(), 2);
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cell_image_excludes_grid_lines() {
        let image = canonical(GEOMETRY, &[]);
        let decoder = CellDecoder::new(GEOMETRY, 0.02, "0123");
        for row in 0..2 {
            for column in 0..2 {
                let cell = decoder.cell_image(&image, CellIndex { row, column });
                assert_eq!(cell.dimensions(), (12, 12));
                assert!(cell.pixels().all(|p| p.0[0] == 255), "({row}, {column})");
            }
        }
    }

    #[test]
    fn decoding_twice_yields_identical_grid() {
        let geometry = GridGeometry {
            cell_count: 7,
            intersection_size: 4,
            cell_size: 12,
        };
        let blocks: Vec<(usize, usize, u32)> = (0..7)
            .flat_map(|row| (0..7).map(move |column| (row, column)))
            .filter_map(|(row, column)| match (row * 7 + column) % 4 {
                0 => None,
                1 => Some((row, column, 3)),
                2 => Some((row, column, 4)),
                _ => Some((row, column, 5)),
            })
            .collect();
        let image = canonical(geometry, &blocks);
        let decoder = CellDecoder::new(geometry, 0.02, "0123");
        let recognizer = recognizer();

        let first = decoder.decode(&image, &recognizer).unwrap();
        let second = decoder.decode(&image, &recognizer).unwrap();
        assert_eq!(first, second);

        // Same answer as visiting the cells one at a time in row-major order.
        for row in 0..7 {
            for column in 0..7 {
                let index = CellIndex { row, column };
                let sequential = decoder.decode_cell(&image, index, &recognizer).unwrap();
                assert_eq!(first.get(index), Some(sequential), "{index}");
            }
        }
    }

    #[test]
    fn undersized_canonical_image_is_rejected() {
        let image = GrayImage::new(20, 32);
        let err = CellDecoder::new(GEOMETRY, 0.02, "0123")
            .decode(&image, &recognizer())
            .unwrap_err();
        assert!(
            matches!(err, VisionError::CanonicalSize { required: 32, .. }),
            "got {err:?}"
        );
    }

    #[test]
    fn engine_failure_names_the_cell() {
        let image = canonical(GEOMETRY, &[(1, 0, 3)]);
        let err = CellDecoder::new(GEOMETRY, 0.02, "0123")
            .decode(&image, &BrokenRecognizer)
            .unwrap_err();
        assert!(
            matches!(
                err,
                VisionError::Recognition {
                    cell: CellIndex { row: 1, column: 0 },
                    ..
                }
            ),
            "got {err:?}"
        );
    }
}

//! Single-glyph recognition through the `tesseract` command-line tool.

use std::io::{Cursor, ErrorKind, Write};
use std::process::{Command, Stdio};

use suriza_vision::{GlyphRecognizer, GrayImage, RecognitionError};

/// Page segmentation mode that treats the image as one character.
const PSM_SINGLE_CHAR: &str = "10";

/// Runs `tesseract` once per cell image.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    program: String,
    whitelist: String,
}

impl TesseractRecognizer {
    #[must_use]
    pub fn new(program: impl Into<String>, whitelist: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            whitelist: whitelist.into(),
        }
    }

    /// Command-line arguments: PNG on stdin, text on stdout.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        vec![
            "stdin".to_string(),
            "stdout".to_string(),
            "--psm".to_string(),
            PSM_SINGLE_CHAR.to_string(),
            "-c".to_string(),
            format!("tessedit_char_whitelist={}", self.whitelist),
        ]
    }
}

impl GlyphRecognizer for TesseractRecognizer {
    fn recognize(&self, cell: &GrayImage) -> Result<Option<char>, RecognitionError> {
        let mut png = Vec::new();
        cell.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)?;

        let mut child = Command::new(&self.program)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            // An engine that exits early closes the pipe; its status says why.
            if let Err(e) = stdin.write_all(&png)
                && e.kind() != ErrorKind::BrokenPipe
            {
                return Err(e.into());
            }
        }
        let output = child.wait_with_output()?;

        if !output.status.success() {
            return Err(RecognitionError::Engine {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(parse_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// First non-whitespace character of the engine output.
///
/// Tesseract terminates its text with a newline and a form feed; an
/// empty page means nothing was recognized.
#[must_use]
pub fn parse_output(text: &str) -> Option<char> {
    text.chars().find(|c| !c.is_whitespace())
}

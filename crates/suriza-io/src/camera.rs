//! Frame acquisition.
//!
//! A [`Camera`] may fail to deliver a frame on any given attempt (the
//! device is still warming up, a capture was dropped). [`FrameAcquirer`]
//! polls it a bounded number of times before giving up.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use suriza_plotter::Delay;
use suriza_vision::diagnostics::duration_serde;
use suriza_vision::{Dimensions, RgbImage};

/// Errors raised while acquiring a frame.
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    /// Every polling attempt came back empty.
    #[error("camera produced no frame after {attempts} attempt(s)")]
    Exhausted { attempts: u32 },

    /// The capture program could not be started.
    #[error("failed to run capture program `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// An image file could not be read or decoded.
    #[error("failed to load frame from {}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The camera delivered a frame of the wrong size.
    #[error("frame is {actual} but the calibration expects {expected}")]
    FrameSize {
        expected: Dimensions,
        actual: Dimensions,
    },
}

/// A source of camera frames.
pub trait Camera {
    /// Try to capture one frame.
    ///
    /// `Ok(None)` means no frame was available this time and the caller
    /// may retry.
    ///
    /// # Errors
    ///
    /// Returns [`AcquisitionError`] for failures that retrying cannot fix.
    fn try_frame(&mut self) -> Result<Option<RgbImage>, AcquisitionError>;
}

/// Camera device settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Index `N` of `/dev/videoN`.
    pub device_index: u32,
    /// Capture program, invoked with ffmpeg-compatible arguments.
    pub program: String,
    /// Captures tried before giving up.
    pub max_attempts: u32,
    /// Pause between captures (seconds).
    #[serde(with = "duration_serde")]
    pub poll_interval: Duration,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            program: "ffmpeg".to_string(),
            max_attempts: 20,
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Bounded polling over a [`Camera`].
#[derive(Debug, Clone, Copy)]
pub struct FrameAcquirer {
    max_attempts: u32,
    poll_interval: Duration,
}

impl FrameAcquirer {
    #[must_use]
    pub const fn new(max_attempts: u32, poll_interval: Duration) -> Self {
        Self {
            max_attempts,
            poll_interval,
        }
    }

    #[must_use]
    pub const fn from_config(config: &CameraConfig) -> Self {
        Self::new(config.max_attempts, config.poll_interval)
    }

    /// Poll `camera` until it yields a frame.
    ///
    /// # Errors
    ///
    /// Returns [`AcquisitionError::Exhausted`] after `max_attempts` empty
    /// captures, or the first non-retryable error from the camera.
    pub fn acquire(
        &self,
        camera: &mut dyn Camera,
        delay: &mut dyn Delay,
    ) -> Result<RgbImage, AcquisitionError> {
        for attempt in 1..=self.max_attempts {
            if let Some(frame) = camera.try_frame()? {
                tracing::info!(attempt, width = frame.width(), height = frame.height(), "frame acquired");
                return Ok(frame);
            }
            tracing::debug!(attempt, max_attempts = self.max_attempts, "no frame yet");
            if attempt < self.max_attempts {
                delay.pause(self.poll_interval);
            }
        }
        Err(AcquisitionError::Exhausted {
            attempts: self.max_attempts,
        })
    }
}

/// Serves a still image from disk, for offline runs.
#[derive(Debug, Clone)]
pub struct ImageFileCamera {
    path: PathBuf,
    expected: Dimensions,
}

impl ImageFileCamera {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, expected: Dimensions) -> Self {
        Self {
            path: path.into(),
            expected,
        }
    }
}

impl Camera for ImageFileCamera {
    fn try_frame(&mut self) -> Result<Option<RgbImage>, AcquisitionError> {
        let frame = image::open(&self.path)
            .map_err(|source| AcquisitionError::Load {
                path: self.path.clone(),
                source,
            })?
            .to_rgb8();
        check_size(&frame, self.expected)?;
        Ok(Some(frame))
    }
}

/// Captures single frames from a V4L2 device through `ffmpeg`.
#[derive(Debug, Clone)]
pub struct CommandCamera {
    program: String,
    device_index: u32,
    resolution: Dimensions,
}

impl CommandCamera {
    #[must_use]
    pub fn new(config: &CameraConfig, resolution: Dimensions) -> Self {
        Self {
            program: config.program.clone(),
            device_index: config.device_index,
            resolution,
        }
    }

    /// Arguments for one PNG frame of the configured size on stdout.
    #[must_use]
    pub fn capture_args(&self) -> Vec<String> {
        [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "v4l2",
            "-video_size",
            &self.resolution.to_string(),
            "-i",
            &format!("/dev/video{}", self.device_index),
            "-frames:v",
            "1",
            "-f",
            "image2pipe",
            "-vcodec",
            "png",
            "-",
        ]
        .into_iter()
        .map(str::to_string)
        .collect()
    }
}

impl Camera for CommandCamera {
    fn try_frame(&mut self) -> Result<Option<RgbImage>, AcquisitionError> {
        let output = Command::new(&self.program)
            .args(self.capture_args())
            .stdin(Stdio::null())
            .output()
            .map_err(|source| AcquisitionError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() || output.stdout.is_empty() {
            tracing::debug!(
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "capture produced no frame",
            );
            return Ok(None);
        }

        let frame = match image::load_from_memory_with_format(&output.stdout, image::ImageFormat::Png) {
            Ok(image) => image.to_rgb8(),
            Err(e) => {
                tracing::warn!(error = %e, "discarding undecodable capture");
                return Ok(None);
            }
        };
        check_size(&frame, self.resolution)?;
        Ok(Some(frame))
    }
}

fn check_size(frame: &RgbImage, expected: Dimensions) -> Result<(), AcquisitionError> {
    let actual = Dimensions::of(frame);
    if actual == expected {
        Ok(())
    } else {
        Err(AcquisitionError::FrameSize { expected, actual })
    }
}

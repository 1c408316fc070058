//! The robot's configuration file.
//!
//! A single JSON document with three sections. Every field has a default
//! matching the production rig, so an empty object `{}` is a valid file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use suriza_plotter::{InvalidPlotterConfig, PlotterConfig};
use suriza_vision::{VisionConfig, VisionError};

use crate::camera::CameraConfig;
use crate::serial::SerialConfig;

/// Errors raised while loading or checking the configuration. All of
/// them are fatal at start-up.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("failed to read configuration file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed configuration file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Vision(#[from] VisionError),

    #[error(transparent)]
    Plotter(#[from] InvalidPlotterConfig),

    /// A required external program or device is not configured.
    #[error("no {0} configured")]
    MissingDevice(&'static str),
}

/// External programs and devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub serial: SerialConfig,
    pub camera: CameraConfig,
    /// Path or name of the `tesseract` executable.
    pub tesseract_program: String,
    /// Path or name of the puzzle solver executable.
    pub solver_program: String,
    /// Extra arguments passed to the solver.
    pub solver_args: Vec<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            camera: CameraConfig::default(),
            tesseract_program: "tesseract".to_string(),
            solver_program: "suriza-solver".to_string(),
            solver_args: Vec::new(),
        }
    }
}

/// Everything the robot needs to know about its hardware.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub vision: VisionConfig,
    pub plotter: PlotterConfig,
    pub devices: DeviceConfig,
}

impl RobotConfig {
    /// Read and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] if the file cannot be read, is not
    /// valid JSON for this schema, or fails [`RobotConfig::validate`].
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&text).map_err(|source| ConfigurationError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Load `path` when given, otherwise validate the defaults.
    ///
    /// # Errors
    ///
    /// See [`RobotConfig::load`].
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Check every section.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.vision.validate()?;
        self.plotter.validate()?;
        let devices = &self.devices;
        for (name, value) in [
            ("serial port", &devices.serial.path),
            ("camera program", &devices.camera.program),
            ("tesseract program", &devices.tesseract_program),
            ("solver program", &devices.solver_program),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigurationError::MissingDevice(name));
            }
        }
        if devices.serial.baud_rate == 0 {
            return Err(ConfigurationError::MissingDevice("serial baud rate"));
        }
        if devices.camera.max_attempts == 0 {
            return Err(ConfigurationError::MissingDevice("camera attempt budget"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use super::*;

    fn write_config(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn empty_object_yields_defaults() {
        let file = write_config("{}");
        let config = RobotConfig::load(file.path()).unwrap();
        assert_eq!(config, RobotConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let file = write_config(
            r#"{
                "plotter": { "origin_x": 60.0, "dwell": 0.5 },
                "devices": { "serial": { "path": "/dev/ttyUSB0" }, "camera": { "device_index": 1 } }
            }"#,
        );
        let config = RobotConfig::load(file.path()).unwrap();
        assert!((config.plotter.origin_x - 60.0).abs() < f64::EPSILON);
        assert!((config.plotter.origin_y - 131.0).abs() < f64::EPSILON);
        assert_eq!(config.plotter.dwell, Duration::from_millis(500));
        assert_eq!(config.devices.serial.path, "/dev/ttyUSB0");
        assert_eq!(config.devices.serial.baud_rate, 115_200);
        assert_eq!(config.devices.camera.device_index, 1);
        assert_eq!(config.vision, VisionConfig::default());
    }

    #[test]
    fn defaults_survive_a_json_round_trip() {
        let json = serde_json::to_string_pretty(&RobotConfig::default()).unwrap();
        let file = write_config(&json);
        assert_eq!(RobotConfig::load(file.path()).unwrap(), RobotConfig::default());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = RobotConfig::load(Path::new("/nonexistent/suriza.json")).unwrap_err();
        assert!(matches!(err, ConfigurationError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/suriza.json"));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let file = write_config(r#"{ "plotter": { "origin_x": "left" } }"#);
        assert!(matches!(
            RobotConfig::load(file.path()),
            Err(ConfigurationError::Parse { .. })
        ));
    }

    #[test]
    fn invalid_calibration_is_fatal() {
        let file = write_config(
            r#"{ "vision": { "calibration": { "intrinsics": [[0,0,512],[0,0,384],[0,0,1]] } } }"#,
        );
        let err = RobotConfig::load(file.path()).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::Vision(VisionError::InvalidCalibration { .. })
        ));
    }

    #[test]
    fn empty_serial_path_is_a_missing_device() {
        let mut config = RobotConfig::default();
        config.devices.serial.path = String::new();
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "no serial port configured");
    }

    #[test]
    fn invalid_plotter_section_is_reported() {
        let mut config = RobotConfig::default();
        config.plotter.feed_rate = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::Plotter(_))
        ));
    }
}

//! Serial link to the GRBL controller.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use suriza_plotter::{GcodeDialect, Grbl, PlotterError};
use suriza_vision::diagnostics::duration_serde;

/// A GRBL controller reached through the serial port.
pub type SerialGrbl = Grbl<Box<dyn SerialPort>>;

/// Errors raised while bringing up the plotter.
#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("failed to open serial port {path}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error("plotter did not complete its start-up sequence")]
    Plotter(#[from] PlotterError),
}

/// Serial port settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device node of the controller's USB serial adapter.
    pub path: String,
    pub baud_rate: u32,
    /// Longest wait for any single reply (seconds). Homing is the
    /// slowest command.
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: "/dev/serial/by-id/usb-1a86_USB2.0-Serial-if00-port0".to_string(),
            baud_rate: 115_200,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Open the serial port and run the controller's start-up sequence.
///
/// # Errors
///
/// Returns [`SerialError::Open`] if the port cannot be opened and
/// [`SerialError::Plotter`] if the controller rejects or never answers
/// its initialization.
pub fn open_grbl(
    config: &SerialConfig,
    dialect: GcodeDialect,
) -> Result<SerialGrbl, SerialError> {
    let port = serialport::new(&config.path, config.baud_rate)
        .timeout(config.timeout)
        .open()
        .map_err(|source| SerialError::Open {
            path: config.path.clone(),
            source,
        })?;
    tracing::info!(path = %config.path, baud_rate = config.baud_rate, "serial port open");

    let mut grbl = Grbl::new(port, dialect);
    grbl.initialize()?;
    Ok(grbl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_controller() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn missing_port_names_the_path() {
        let config = SerialConfig {
            path: "/nonexistent/ttyUSB9".to_string(),
            ..SerialConfig::default()
        };
        let Err(err) = open_grbl(&config, GcodeDialect::default()) else {
            unreachable!("opened a nonexistent port");
        };
        assert!(matches!(err, SerialError::Open { .. }));
        assert_eq!(err.to_string(), "failed to open serial port /nonexistent/ttyUSB9");
    }
}

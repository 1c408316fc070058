//! suriza-io: everything that touches the outside world.
//!
//! The pure crates describe what to do with a frame and a route; this
//! crate supplies the configuration file, the camera, the Tesseract
//! recognizer, the external solver and the serial link they run
//! against.

pub mod camera;
pub mod config;
pub mod logging;
pub mod serial;
pub mod solver;
pub mod tesseract;

pub use camera::{AcquisitionError, Camera, CameraConfig, CommandCamera, FrameAcquirer, ImageFileCamera};
pub use config::{ConfigurationError, DeviceConfig, RobotConfig};
pub use serial::{SerialConfig, SerialError, SerialGrbl, open_grbl};
pub use solver::{CommandSolver, Solver, SolverError};
pub use tesseract::TesseractRecognizer;

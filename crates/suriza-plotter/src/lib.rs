//! suriza-plotter: turning a solved route into pen plotter motion (sans-IO).
//!
//! Board intersections are mapped onto the plotter bed by
//! [`PathMapper`], then drawn by [`MotionSequencer`] through any
//! [`Plotter`]. [`Grbl`] drives a GRBL controller over an arbitrary
//! byte stream; opening the serial port itself is left to `suriza-io`.

pub mod config;
pub mod grbl;
pub mod mapping;
pub mod sequencer;
pub mod types;

pub use config::{InvalidPlotterConfig, PlotterConfig};
pub use grbl::{GcodeDialect, GcodeWriter, Grbl, PlotterError};
pub use mapping::PathMapper;
pub use sequencer::{Delay, MotionError, MotionSequencer, Plotter, SequenceTiming, Step, ThreadDelay};
pub use types::{LogicalPoint, Path, PenState, Phase, PlotterPoint, PlotterState};

//! Shared types for plotter motion.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A grid intersection on the board, as returned by the solver.
///
/// Both coordinates run from `0` to `C` inclusive; `row` grows
/// downwards on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicalPoint {
    pub column: u32,
    pub row: u32,
}

impl LogicalPoint {
    #[must_use]
    pub const fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }
}

impl fmt::Display for LogicalPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.column, self.row)
    }
}

/// Ordered route over grid intersections.
pub type Path = Vec<LogicalPoint>;

/// A position on the plotter bed, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlotterPoint {
    pub x: f64,
    pub y: f64,
}

impl PlotterPoint {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for PlotterPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}

/// Last pen position confirmed by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PenState {
    /// No pen command has succeeded yet, or the last one failed.
    #[default]
    Unknown,
    Up,
    Down,
}

/// What the sequencer is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Idle,
    /// Travelling with the pen up.
    Seeking,
    /// Tracing the path with the pen down.
    Drawing,
}

/// Physical state of the plotter as far as the sequencer knows it.
///
/// Only successful commands change this; nothing is inferred.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlotterState {
    pub position: Option<PlotterPoint>,
    pub pen: PenState,
    pub phase: Phase,
}

//! G-code for GRBL motion controllers.
//!
//! [`Grbl`] speaks GRBL's line protocol over any byte stream: every
//! command is one newline-terminated line and the controller answers
//! each with `ok`, `error:N`, or an `ALARM:N`. Informational lines
//! (`[MSG:...]`, `<Idle|...>` status reports) may arrive before the
//! answer and are skipped.
//!
//! [`GcodeWriter`] produces the same commands without a controller, for
//! dry runs.

use std::io::{self, BufRead, BufReader, Read, Write};

use serde::{Deserialize, Serialize};

use crate::sequencer::Plotter;
use crate::types::PlotterPoint;

/// The greeting line after which GRBL accepts commands.
const UNLOCK_BANNER: &str = "['$H'|'$X' to unlock]";

/// Errors talking to the motion controller.
#[derive(Debug, thiserror::Error)]
pub enum PlotterError {
    /// The controller answered a command with an error or alarm.
    #[error("controller rejected `{command}`: {response}")]
    Rejected { command: String, response: String },

    /// The stream ended before the expected line arrived.
    #[error("controller disconnected while waiting for {awaiting}")]
    Disconnected { awaiting: String },

    /// Reading or writing the stream failed.
    #[error("controller I/O failed")]
    Io(#[from] io::Error),
}

/// Controller-specific command strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcodeDialect {
    /// Feed rate for `G1` moves, in mm/min.
    pub feed_rate: u32,
    /// Command that puts the pen on the paper.
    pub pen_down: String,
    /// Command that lifts the pen.
    pub pen_up: String,
}

impl Default for GcodeDialect {
    fn default() -> Self {
        Self {
            feed_rate: 2000,
            pen_down: "M5".to_string(),
            pen_up: "M3S30".to_string(),
        }
    }
}

impl GcodeDialect {
    /// Homing, millimetre units, absolute positioning, feed rate.
    #[must_use]
    pub fn preamble(&self) -> [String; 4] {
        [
            "$H".to_string(),
            "G21".to_string(),
            "G90".to_string(),
            format!("F{}", self.feed_rate),
        ]
    }

    #[must_use]
    pub fn rapid(point: PlotterPoint) -> String {
        format!("G0 X{:.3} Y{:.3}", point.x, point.y)
    }

    #[must_use]
    pub fn linear(point: PlotterPoint) -> String {
        format!("G1 X{:.3} Y{:.3}", point.x, point.y)
    }
}

/// A GRBL controller on the other end of `port`.
pub struct Grbl<T> {
    port: BufReader<T>,
    dialect: GcodeDialect,
}

impl<T: Read + Write> Grbl<T> {
    #[must_use]
    pub fn new(port: T, dialect: GcodeDialect) -> Self {
        Self {
            port: BufReader::new(port),
            dialect,
        }
    }

    /// Wait for the controller's unlock banner, then home it and set
    /// units, positioning mode and feed rate.
    ///
    /// # Errors
    ///
    /// Returns [`PlotterError::Disconnected`] if the banner never
    /// arrives, or the first failing preamble command.
    pub fn initialize(&mut self) -> Result<(), PlotterError> {
        loop {
            let line = self.read_line(UNLOCK_BANNER)?;
            if line == UNLOCK_BANNER {
                break;
            }
            tracing::debug!(%line, "controller greeting");
        }
        for command in self.dialect.preamble() {
            self.exchange(&command)?;
        }
        tracing::info!(feed_rate = self.dialect.feed_rate, "controller homed and configured");
        Ok(())
    }

    /// Send one command and wait for its acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`PlotterError::Rejected`] for an `error:` or `ALARM:`
    /// answer, [`PlotterError::Disconnected`] at end of stream.
    pub fn exchange(&mut self, command: &str) -> Result<(), PlotterError> {
        let port = self.port.get_mut();
        port.write_all(command.as_bytes())?;
        port.write_all(b"\n")?;
        port.flush()?;
        tracing::trace!(command, "sent");

        let awaiting = format!("reply to `{command}`");
        loop {
            let line = self.read_line(&awaiting)?;
            if line == "ok" {
                return Ok(());
            }
            if line.starts_with("error:") || line.starts_with("ALARM:") {
                return Err(PlotterError::Rejected {
                    command: command.to_string(),
                    response: line,
                });
            }
            tracing::debug!(%line, command, "controller message");
        }
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> T {
        self.port.into_inner()
    }

    /// Next line with its `\r\n` stripped.
    fn read_line(&mut self, awaiting: &str) -> Result<String, PlotterError> {
        let mut line = String::new();
        if self.port.read_line(&mut line)? == 0 {
            return Err(PlotterError::Disconnected {
                awaiting: awaiting.to_string(),
            });
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

impl<T: Read + Write> Plotter for Grbl<T> {
    fn seek_to(&mut self, point: PlotterPoint) -> Result<(), PlotterError> {
        self.exchange(&GcodeDialect::rapid(point))
    }

    fn move_to(&mut self, point: PlotterPoint) -> Result<(), PlotterError> {
        self.exchange(&GcodeDialect::linear(point))
    }

    fn lower_pen(&mut self) -> Result<(), PlotterError> {
        let command = self.dialect.pen_down.clone();
        self.exchange(&command)
    }

    fn raise_pen(&mut self) -> Result<(), PlotterError> {
        let command = self.dialect.pen_up.clone();
        self.exchange(&command)
    }
}

/// Writes G-code lines instead of driving a controller.
pub struct GcodeWriter<W> {
    out: W,
    dialect: GcodeDialect,
}

impl<W: Write> GcodeWriter<W> {
    #[must_use]
    pub const fn new(out: W, dialect: GcodeDialect) -> Self {
        Self { out, dialect }
    }

    /// Write the same preamble [`Grbl::initialize`] sends.
    ///
    /// # Errors
    ///
    /// Returns [`PlotterError::Io`] if writing fails.
    pub fn write_preamble(&mut self) -> Result<(), PlotterError> {
        for command in self.dialect.preamble() {
            self.line(&command)?;
        }
        Ok(())
    }

    /// Flush and give back the writer.
    ///
    /// # Errors
    ///
    /// Returns [`PlotterError::Io`] if flushing fails.
    pub fn finish(mut self) -> Result<W, PlotterError> {
        self.out.flush()?;
        Ok(self.out)
    }

    fn line(&mut self, command: &str) -> Result<(), PlotterError> {
        writeln!(self.out, "{command}")?;
        Ok(())
    }
}

impl<W: Write> Plotter for GcodeWriter<W> {
    fn seek_to(&mut self, point: PlotterPoint) -> Result<(), PlotterError> {
        self.line(&GcodeDialect::rapid(point))
    }

    fn move_to(&mut self, point: PlotterPoint) -> Result<(), PlotterError> {
        self.line(&GcodeDialect::linear(point))
    }

    fn lower_pen(&mut self) -> Result<(), PlotterError> {
        let command = self.dialect.pen_down.clone();
        self.line(&command)
    }

    fn raise_pen(&mut self) -> Result<(), PlotterError> {
        let command = self.dialect.pen_up.clone();
        self.line(&command)
    }
}

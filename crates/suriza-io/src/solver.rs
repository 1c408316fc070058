//! Hand-off to the external puzzle solver.
//!
//! The solver is a separate program. It reads the grid as a JSON array of
//! rows on stdin, each cell a one-character string (`""` for a blank
//! cell), and prints the closed route as a JSON array of
//! `[column, row]` intersections on stdout.

use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};

use suriza_plotter::{LogicalPoint, Path};
use suriza_vision::{Digit, Grid, VisionError};

/// Errors raised while solving a grid.
#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    /// The grid still holds unrecognized cells.
    #[error("refusing to solve an incompletely recognized grid")]
    Ambiguous(#[source] VisionError),

    /// The solver program could not be started.
    #[error("failed to run solver `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Talking to the solver failed.
    #[error("solver I/O failed")]
    Io(#[from] std::io::Error),

    /// The solver exited unsuccessfully.
    #[error("solver exited with {}: {stderr}", exit_description(.code))]
    Failed { code: Option<i32>, stderr: String },

    /// The solver output is not a list of `[column, row]` pairs.
    #[error("solver output is not a route")]
    Parse(#[from] serde_json::Error),

    /// A route point lies outside the board.
    #[error("route point {index} is {point}, outside the board (max {max})")]
    OutOfRange {
        index: usize,
        point: LogicalPoint,
        max: u32,
    },
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn exit_description(code: &Option<i32>) -> String {
    code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}"))
}

/// Something that turns a recognized grid into a closed route.
pub trait Solver {
    /// Solve `grid`.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError`] when the grid cannot be solved or the
    /// route is malformed.
    fn solve(&mut self, grid: &Grid) -> Result<Path, SolverError>;
}

/// Runs an external solver program once per grid.
#[derive(Debug, Clone)]
pub struct CommandSolver {
    program: String,
    args: Vec<String>,
}

impl CommandSolver {
    #[must_use]
    pub const fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }
}

impl Solver for CommandSolver {
    fn solve(&mut self, grid: &Grid) -> Result<Path, SolverError> {
        grid.ensure_recognized().map_err(SolverError::Ambiguous)?;
        let input = encode_grid(grid)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SolverError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if let Some(mut stdin) = child.stdin.take()
            && let Err(e) = stdin.write_all(&input)
            && e.kind() != ErrorKind::BrokenPipe
        {
            return Err(e.into());
        }
        let output = child.wait_with_output()?;

        if !output.status.success() {
            return Err(SolverError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let cells = u32::try_from(grid.size()).unwrap_or(u32::MAX);
        let path = decode_route(&output.stdout, cells)?;
        tracing::info!(points = path.len(), "route solved");
        Ok(path)
    }
}

/// Serialize `grid` as rows of one-character strings.
///
/// # Errors
///
/// Returns [`SolverError::Parse`] if serialization fails.
pub fn encode_grid(grid: &Grid) -> Result<Vec<u8>, SolverError> {
    let rows: Vec<Vec<String>> = grid
        .rows()
        .iter()
        .map(|row| {
            row.iter()
                .map(|digit| match digit {
                    Digit::Blank => String::new(),
                    other => other.symbol().to_string(),
                })
                .collect()
        })
        .collect();
    Ok(serde_json::to_vec(&rows)?)
}

/// Parse a route and check every point lies on a board of `cells` cells.
///
/// # Errors
///
/// Returns [`SolverError::Parse`] for malformed JSON and
/// [`SolverError::OutOfRange`] for the first point beyond the board.
pub fn decode_route(bytes: &[u8], cells: u32) -> Result<Path, SolverError> {
    let pairs: Vec<[u32; 2]> = serde_json::from_slice(bytes)?;
    let max = cells;
    pairs
        .into_iter()
        .enumerate()
        .map(|(index, [column, row])| {
            let point = LogicalPoint::new(column, row);
            if column > max || row > max {
                Err(SolverError::OutOfRange { index, point, max })
            } else {
                Ok(point)
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn grid() -> Grid {
        Grid::from_rows(vec![
            vec![Digit::Three, Digit::Blank],
            vec![Digit::Blank, Digit::Zero],
        ])
        .unwrap()
    }

    fn script(body: &str) -> CommandSolver {
        CommandSolver::new(
            "sh".to_string(),
            vec!["-c".to_string(), body.to_string()],
        )
    }

    #[test]
    fn grid_is_encoded_as_rows_of_strings() {
        let json = String::from_utf8(encode_grid(&grid()).unwrap()).unwrap();
        assert_eq!(json, r#"[["3",""],["","0"]]"#);
    }

    #[test]
    fn route_is_decoded_in_order() {
        let path = decode_route(b"[[0,0],[2,0],[2,2],[0,2],[0,0]]", 2).unwrap();
        assert_eq!(
            path,
            vec![
                LogicalPoint::new(0, 0),
                LogicalPoint::new(2, 0),
                LogicalPoint::new(2, 2),
                LogicalPoint::new(0, 2),
                LogicalPoint::new(0, 0),
            ]
        );
    }

    #[test]
    fn point_beyond_the_board_is_rejected() {
        let err = decode_route(b"[[0,0],[3,1]]", 2).unwrap_err();
        assert!(matches!(err, SolverError::OutOfRange { index: 1, max: 2, .. }));
        assert_eq!(
            err.to_string(),
            "route point 1 is [3, 1], outside the board (max 2)"
        );
    }

    #[test]
    fn malformed_route_is_a_parse_error() {
        assert!(matches!(
            decode_route(b"[[0,0],[1]]", 2),
            Err(SolverError::Parse(_))
        ));
    }

    #[test]
    fn solver_receives_the_grid_and_returns_a_route() {
        // Echo back a route only if the grid arrived intact.
        let mut solver = script(
            r#"read grid; [ "$grid" = '[["3",""],["","0"]]' ] && echo '[[0,0],[1,0],[1,1],[0,0]]'"#,
        );
        let path = solver.solve(&grid()).unwrap();
        assert_eq!(path.len(), 4);
        assert_eq!(path[2], LogicalPoint::new(1, 1));
    }

    #[test]
    fn failing_solver_reports_stderr() {
        let mut solver = script("echo unsolvable >&2; exit 3");
        let err = solver.solve(&grid()).unwrap_err();
        assert_eq!(err.to_string(), "solver exited with status 3: unsolvable");
    }

    #[test]
    fn unknown_cells_are_never_sent() {
        let grid = Grid::from_rows(vec![
            vec![Digit::Unknown, Digit::Blank],
            vec![Digit::Blank, Digit::Zero],
        ])
        .unwrap();
        let mut solver = CommandSolver::new("/nonexistent/solver".to_string(), Vec::new());
        assert!(matches!(
            solver.solve(&grid),
            Err(SolverError::Ambiguous(VisionError::RecognitionAmbiguity { .. }))
        ));
    }

    #[test]
    fn missing_solver_names_the_program() {
        let mut solver = CommandSolver::new("/nonexistent/solver".to_string(), Vec::new());
        let err = solver.solve(&grid()).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/solver"));
    }
}

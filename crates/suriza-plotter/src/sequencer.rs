//! Drawing a mapped path with the pen plotter.
//!
//! [`MotionSequencer::draw`] runs the fixed sequence
//!
//! ```text
//! raise (unless known up) -> seek start -> settle -> lower ->
//! move to every point -> raise -> seek home -> lower (park) -> dwell
//! ```
//!
//! The pen is up for every seek and down for every drawn segment. Any
//! command failure after the pen went down is followed by a best-effort
//! raise before the error is returned.

use std::fmt;
use std::time::Duration;

use crate::grbl::PlotterError;
use crate::types::{PenState, Phase, PlotterPoint, PlotterState};

/// Motion primitives of a pen plotter.
///
/// Each call blocks until the controller has accepted the command.
pub trait Plotter {
    /// Travel to `point` without drawing.
    ///
    /// # Errors
    ///
    /// Returns [`PlotterError`] if the controller did not accept the move.
    fn seek_to(&mut self, point: PlotterPoint) -> Result<(), PlotterError>;

    /// Travel to `point` along a straight line at feed rate.
    ///
    /// # Errors
    ///
    /// Returns [`PlotterError`] if the controller did not accept the move.
    fn move_to(&mut self, point: PlotterPoint) -> Result<(), PlotterError>;

    /// Put the pen on the paper.
    ///
    /// # Errors
    ///
    /// Returns [`PlotterError`] if the controller did not accept the command.
    fn lower_pen(&mut self) -> Result<(), PlotterError>;

    /// Lift the pen off the paper.
    ///
    /// # Errors
    ///
    /// Returns [`PlotterError`] if the controller did not accept the command.
    fn raise_pen(&mut self) -> Result<(), PlotterError>;
}

impl<P: Plotter + ?Sized> Plotter for &mut P {
    fn seek_to(&mut self, point: PlotterPoint) -> Result<(), PlotterError> {
        (**self).seek_to(point)
    }

    fn move_to(&mut self, point: PlotterPoint) -> Result<(), PlotterError> {
        (**self).move_to(point)
    }

    fn lower_pen(&mut self) -> Result<(), PlotterError> {
        (**self).lower_pen()
    }

    fn raise_pen(&mut self) -> Result<(), PlotterError> {
        (**self).raise_pen()
    }
}

/// Waits out mechanical settle and dwell times.
pub trait Delay {
    fn pause(&mut self, duration: Duration);
}

/// [`Delay`] backed by [`std::thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn pause(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Fixed positions and pauses of the drawing sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceTiming {
    /// Where the pen is parked after drawing.
    pub home: PlotterPoint,
    /// Pause after the start seek, before the pen goes down.
    pub settle: Duration,
    /// Pause after parking, before control is released.
    pub dwell: Duration,
}

/// One step of the drawing sequence, named in errors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// Raising a pen of unknown position before the start seek.
    Prepare,
    SeekStart(PlotterPoint),
    LowerPen,
    /// Drawing the segment to path point `index`.
    Draw { index: usize, point: PlotterPoint },
    RaisePen,
    SeekHome(PlotterPoint),
    Park,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prepare => f.write_str("raising pen before start"),
            Self::SeekStart(p) => write!(f, "seeking start {p}"),
            Self::LowerPen => f.write_str("lowering pen"),
            Self::Draw { index, point } => write!(f, "drawing to path point {index} at {point}"),
            Self::RaisePen => f.write_str("raising pen after drawing"),
            Self::SeekHome(p) => write!(f, "seeking home {p}"),
            Self::Park => f.write_str("parking pen"),
        }
    }
}

/// A drawing sequence that stopped part-way.
#[derive(Debug, thiserror::Error)]
pub enum MotionError {
    #[error("motion failed while {step} (pen {})", pen_note(.pen_safe))]
    Command {
        step: Step,
        #[source]
        source: PlotterError,
        /// Whether the pen is known to be up after the failure.
        pen_safe: bool,
    },
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn pen_note(pen_safe: &bool) -> &'static str {
    if *pen_safe { "up" } else { "possibly down" }
}

/// Owns the plotter and its [`PlotterState`] for the drawing sequence.
pub struct MotionSequencer<P, D> {
    plotter: P,
    delay: D,
    timing: SequenceTiming,
    state: PlotterState,
}

impl<P: Plotter, D: Delay> MotionSequencer<P, D> {
    /// Start with every state field unknown.
    #[must_use]
    pub fn new(plotter: P, delay: D, timing: SequenceTiming) -> Self {
        Self {
            plotter,
            delay,
            timing,
            state: PlotterState::default(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> PlotterState {
        self.state
    }

    /// Give back the plotter.
    pub fn into_inner(self) -> P {
        self.plotter
    }

    /// Draw `path` as one continuous stroke and park at home.
    ///
    /// An empty path issues no commands.
    ///
    /// # Errors
    ///
    /// Returns [`MotionError::Command`] naming the failed step. If the
    /// pen might be down at that point, a raise has already been
    /// attempted; `pen_safe` reports whether it succeeded.
    pub fn draw(&mut self, path: &[PlotterPoint]) -> Result<(), MotionError> {
        let Some(&start) = path.first() else {
            tracing::warn!("empty path, nothing to draw");
            return Ok(());
        };
        tracing::info!(points = path.len(), %start, "drawing path");

        if self.state.pen != PenState::Up {
            self.run(Step::Prepare)?;
        }

        self.state.phase = Phase::Seeking;
        self.run(Step::SeekStart(start))?;
        self.delay.pause(self.timing.settle);
        self.run(Step::LowerPen)?;

        self.state.phase = Phase::Drawing;
        for (index, &point) in path.iter().enumerate() {
            self.run(Step::Draw { index, point })?;
        }
        self.run(Step::RaisePen)?;

        self.state.phase = Phase::Seeking;
        self.run(Step::SeekHome(self.timing.home))?;
        self.run(Step::Park)?;
        self.delay.pause(self.timing.dwell);

        self.state.phase = Phase::Idle;
        tracing::info!(home = %self.timing.home, "path drawn, pen parked");
        Ok(())
    }

    fn run(&mut self, step: Step) -> Result<(), MotionError> {
        let result = match step {
            Step::Prepare | Step::RaisePen => self.plotter.raise_pen(),
            Step::LowerPen | Step::Park => self.plotter.lower_pen(),
            Step::SeekStart(p) | Step::SeekHome(p) => {
                debug_assert_eq!(self.state.pen, PenState::Up, "seek with pen not up");
                self.plotter.seek_to(p)
            }
            Step::Draw { point, .. } => self.plotter.move_to(point),
        };

        match result {
            Ok(()) => {
                match step {
                    Step::Prepare | Step::RaisePen => self.state.pen = PenState::Up,
                    Step::LowerPen | Step::Park => self.state.pen = PenState::Down,
                    Step::SeekStart(p) | Step::SeekHome(p) | Step::Draw { point: p, .. } => {
                        self.state.position = Some(p);
                    }
                }
                Ok(())
            }
            Err(source) => {
                match step {
                    Step::Prepare | Step::RaisePen | Step::LowerPen | Step::Park => {
                        self.state.pen = PenState::Unknown;
                    }
                    // The carriage may have stopped anywhere along the move.
                    Step::SeekStart(_) | Step::SeekHome(_) | Step::Draw { .. } => {
                        self.state.position = None;
                    }
                }
                let pen_safe = self.make_pen_safe(step);
                self.state.phase = Phase::Idle;
                Err(MotionError::Command {
                    step,
                    source,
                    pen_safe,
                })
            }
        }
    }

    /// Raise the pen unless it is known to be up already.
    fn make_pen_safe(&mut self, failed: Step) -> bool {
        if self.state.pen == PenState::Up {
            return true;
        }
        match self.plotter.raise_pen() {
            Ok(()) => {
                self.state.pen = PenState::Up;
                tracing::warn!(step = %failed, "raised pen after failed step");
                true
            }
            Err(e) => {
                self.state.pen = PenState::Unknown;
                tracing::warn!(step = %failed, error = %e, "safety pen raise failed");
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Call {
        Seek(PlotterPoint),
        Move(PlotterPoint),
        Lower,
        Raise,
    }

    /// Records every call; fails the `fail_at`-th call (0-based) and,
    /// when `fail_after` is set, every call after it as well.
    #[derive(Default)]
    struct RecordingPlotter {
        calls: Vec<Call>,
        fail_at: Option<usize>,
        fail_after: bool,
    }

    impl RecordingPlotter {
        fn failing_at(call: usize) -> Self {
            Self {
                fail_at: Some(call),
                ..Self::default()
            }
        }

        fn record(&mut self, call: Call) -> Result<(), PlotterError> {
            let n = self.calls.len();
            self.calls.push(call);
            match self.fail_at {
                Some(k) if n == k || (self.fail_after && n > k) => Err(PlotterError::Rejected {
                    command: format!("{call:?}"),
                    response: "error:9".to_string(),
                }),
                _ => Ok(()),
            }
        }
    }

    impl Plotter for RecordingPlotter {
        fn seek_to(&mut self, point: PlotterPoint) -> Result<(), PlotterError> {
            self.record(Call::Seek(point))
        }

        fn move_to(&mut self, point: PlotterPoint) -> Result<(), PlotterError> {
            self.record(Call::Move(point))
        }

        fn lower_pen(&mut self) -> Result<(), PlotterError> {
            self.record(Call::Lower)
        }

        fn raise_pen(&mut self) -> Result<(), PlotterError> {
            self.record(Call::Raise)
        }
    }

    #[derive(Default)]
    struct RecordingDelay(Vec<Duration>);

    impl Delay for RecordingDelay {
        fn pause(&mut self, duration: Duration) {
            self.0.push(duration);
        }
    }

    const HOME: PlotterPoint = PlotterPoint::new(0.0, 0.0);

    fn timing() -> SequenceTiming {
        SequenceTiming {
            home: HOME,
            settle: Duration::from_secs(1),
            dwell: Duration::from_secs(5),
        }
    }

    fn square() -> Vec<PlotterPoint> {
        vec![
            PlotterPoint::new(55.0, 131.0),
            PlotterPoint::new(61.5, 131.0),
            PlotterPoint::new(61.5, 124.5),
            PlotterPoint::new(55.0, 124.5),
            PlotterPoint::new(55.0, 131.0),
        ]
    }

    fn sequencer(plotter: RecordingPlotter) -> MotionSequencer<RecordingPlotter, RecordingDelay> {
        MotionSequencer::new(plotter, RecordingDelay::default(), timing())
    }

    #[test]
    fn full_sequence_for_a_closed_path() {
        let mut seq = sequencer(RecordingPlotter::default());
        seq.draw(&square()).unwrap();

        let path = square();
        let mut expected = vec![Call::Raise, Call::Seek(path[0]), Call::Lower];
        expected.extend(path.iter().map(|&p| Call::Move(p)));
        expected.extend([Call::Raise, Call::Seek(HOME), Call::Lower]);
        assert_eq!(seq.plotter.calls, expected);
        assert_eq!(seq.delay.0, vec![Duration::from_secs(1), Duration::from_secs(5)]);
    }

    #[test]
    fn pen_lowered_once_and_raised_once_around_drawing() {
        let paths = [
            vec![PlotterPoint::new(3.0, 4.0)],
            square(),
            (0..20)
                .map(|i| PlotterPoint::new(f64::from(i), f64::from(i % 3)))
                .collect(),
        ];
        for path in paths {
            let mut seq = sequencer(RecordingPlotter::default());
            seq.draw(&path).unwrap();
            let calls = &seq.plotter.calls;

            let first = calls.iter().position(|c| matches!(c, Call::Move(_))).unwrap();
            let last = calls.iter().rposition(|c| matches!(c, Call::Move(_))).unwrap();
            assert_eq!(last - first + 1, path.len());

            // Exactly one lower before the first segment since the last raise.
            let before = &calls[..first];
            let last_raise = before.iter().rposition(|c| *c == Call::Raise).unwrap();
            let lowers = before[last_raise..].iter().filter(|c| **c == Call::Lower).count();
            assert_eq!(lowers, 1);
            assert_eq!(before.last(), Some(&Call::Lower));

            // No pen change while drawing, and a raise right after.
            assert!(calls[first..=last].iter().all(|c| matches!(c, Call::Move(_))));
            assert_eq!(calls[last + 1], Call::Raise);

            // Every seek happens with the pen up.
            let mut pen_down = false;
            for call in calls {
                match call {
                    Call::Lower => pen_down = true,
                    Call::Raise => pen_down = false,
                    Call::Seek(_) => assert!(!pen_down, "seek with pen down in {calls:?}"),
                    Call::Move(_) => assert!(pen_down, "move with pen up in {calls:?}"),
                }
            }
        }
    }

    #[test]
    fn state_after_success_is_parked_at_home() {
        let mut seq = sequencer(RecordingPlotter::default());
        seq.draw(&square()).unwrap();
        assert_eq!(
            seq.state(),
            PlotterState {
                position: Some(HOME),
                pen: PenState::Down,
                phase: Phase::Idle,
            }
        );
    }

    #[test]
    fn empty_path_issues_no_commands() {
        let mut seq = sequencer(RecordingPlotter::default());
        seq.draw(&[]).unwrap();
        assert!(seq.plotter.calls.is_empty());
        assert!(seq.delay.0.is_empty());
        assert_eq!(seq.state(), PlotterState::default());
    }

    #[test]
    fn failure_while_drawing_raises_pen_before_returning() {
        // Calls: raise, seek, lower, move 0, move 1 (fails).
        let mut seq = sequencer(RecordingPlotter::failing_at(4));
        let err = seq.draw(&square()).unwrap_err();

        let MotionError::Command { step, pen_safe, .. } = err;
        assert_eq!(
            step,
            Step::Draw {
                index: 1,
                point: square()[1]
            }
        );
        assert!(pen_safe);
        assert_eq!(seq.plotter.calls.last(), Some(&Call::Raise));
        assert_eq!(seq.plotter.calls.len(), 6);
        assert_eq!(seq.state().pen, PenState::Up);
        assert_eq!(seq.state().phase, Phase::Idle);
        assert_eq!(seq.state().position, None);
    }

    #[test]
    fn failed_safety_raise_is_reported() {
        let mut plotter = RecordingPlotter::failing_at(3);
        plotter.fail_after = true;
        let mut seq = sequencer(plotter);
        let err = seq.draw(&square()).unwrap_err();

        assert!(matches!(
            err,
            MotionError::Command {
                step: Step::Draw { index: 0, .. },
                pen_safe: false,
                ..
            }
        ));
        assert!(err.to_string().ends_with("(pen possibly down)"));
        assert_eq!(seq.state().pen, PenState::Unknown);
    }

    #[test]
    fn failed_start_seek_needs_no_safety_raise() {
        let mut seq = sequencer(RecordingPlotter::failing_at(1));
        let err = seq.draw(&square()).unwrap_err();
        assert!(matches!(
            err,
            MotionError::Command {
                step: Step::SeekStart(_),
                pen_safe: true,
                ..
            }
        ));
        assert_eq!(seq.plotter.calls, vec![Call::Raise, Call::Seek(square()[0])]);
    }

    #[test]
    fn failed_lower_is_followed_by_raise() {
        let mut seq = sequencer(RecordingPlotter::failing_at(2));
        let err = seq.draw(&square()).unwrap_err();
        assert!(matches!(
            err,
            MotionError::Command {
                step: Step::LowerPen,
                pen_safe: true,
                ..
            }
        ));
        assert_eq!(seq.plotter.calls[2..], [Call::Lower, Call::Raise]);
        assert!(seq.delay.0.len() == 1, "settle only");
    }

    #[test]
    fn known_up_pen_is_not_raised_again() {
        // First draw fails mid-path and the safety raise succeeds.
        let mut seq = sequencer(RecordingPlotter::failing_at(3));
        seq.draw(&square()).unwrap_err();
        seq.plotter.fail_at = None;
        seq.plotter.calls.clear();

        seq.draw(&square()).unwrap();
        assert_eq!(seq.plotter.calls[0], Call::Seek(square()[0]));
    }

    #[test]
    fn sequencer_drives_a_borrowed_plotter() {
        let mut plotter = RecordingPlotter::default();
        let mut seq = MotionSequencer::new(&mut plotter, RecordingDelay::default(), timing());
        seq.draw(&[PlotterPoint::new(1.0, 1.0)]).unwrap();
        drop(seq);
        assert_eq!(plotter.calls.len(), 7);
    }
}

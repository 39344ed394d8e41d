//! Pipeline stages and the run-state record threaded between them

use std::fmt;

use crate::error::{PipelineError, Result};

/// A pipeline stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Extract,
    Transform,
    Cluster,
    Regress,
    Evaluate,
    Compare,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Extract,
        Stage::Transform,
        Stage::Cluster,
        Stage::Regress,
        Stage::Evaluate,
        Stage::Compare,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Transform => "transform",
            Stage::Cluster => "cluster",
            Stage::Regress => "regress",
            Stage::Evaluate => "evaluate",
            Stage::Compare => "compare",
        }
    }

    /// State reached once this stage succeeds
    pub fn completed_state(self) -> PipelineState {
        match self {
            Stage::Extract => PipelineState::Extracted,
            Stage::Transform => PipelineState::Transformed,
            Stage::Cluster => PipelineState::Clustered,
            Stage::Regress => PipelineState::Regressed,
            Stage::Evaluate => PipelineState::Evaluated,
            Stage::Compare => PipelineState::Compared,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Start,
    Extracted,
    Transformed,
    Clustered,
    Regressed,
    Evaluated,
    Compared,
    Done,
    Failed(Stage),
}

impl PipelineState {
    /// The single successful successor of this state, if any
    fn successor(self) -> Option<PipelineState> {
        use PipelineState::*;
        match self {
            Start => Some(Extracted),
            Extracted => Some(Transformed),
            Transformed => Some(Clustered),
            Clustered => Some(Regressed),
            Regressed => Some(Evaluated),
            Evaluated => Some(Compared),
            Compared => Some(Done),
            Done | Failed(_) => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed(_))
    }

    /// Stage that runs from this state
    pub fn next_stage(self) -> Option<Stage> {
        use PipelineState::*;
        match self {
            Start => Some(Stage::Extract),
            Extracted => Some(Stage::Transform),
            Transformed => Some(Stage::Cluster),
            Clustered => Some(Stage::Regress),
            Regressed => Some(Stage::Evaluate),
            Evaluated => Some(Stage::Compare),
            Compared | Done | Failed(_) => None,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Start => f.write_str("start"),
            PipelineState::Extracted => f.write_str("extracted"),
            PipelineState::Transformed => f.write_str("transformed"),
            PipelineState::Clustered => f.write_str("clustered"),
            PipelineState::Regressed => f.write_str("regressed"),
            PipelineState::Evaluated => f.write_str("evaluated"),
            PipelineState::Compared => f.write_str("compared"),
            PipelineState::Done => f.write_str("done"),
            PipelineState::Failed(stage) => write!(f, "failed({stage})"),
        }
    }
}

/// Immutable record of where a run is and how it got there.
///
/// Every transition consumes the record and returns a new one, so stage
/// functions never share mutable pipeline status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    current: PipelineState,
    history: Vec<PipelineState>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            current: PipelineState::Start,
            history: vec![PipelineState::Start],
        }
    }

    pub fn current(&self) -> PipelineState {
        self.current
    }

    /// Every state visited so far, starting with `Start`
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    /// Move to `to`, rejecting anything but the next state or a failure
    pub fn advance(self, to: PipelineState) -> Result<Self> {
        let legal = match to {
            PipelineState::Failed(_) => !self.current.is_terminal(),
            next => self.current.successor() == Some(next),
        };
        if !legal {
            return Err(PipelineError::InvalidTransition {
                from: self.current,
                to,
            });
        }

        let mut history = self.history;
        history.push(to);
        Ok(Self { current: to, history })
    }

    /// Record that `stage` finished successfully
    pub fn complete(self, stage: Stage) -> Result<Self> {
        self.advance(stage.completed_state())
    }

    /// Record that `stage` failed
    pub fn fail(self, stage: Stage) -> Result<Self> {
        self.advance(PipelineState::Failed(stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_successful_run() {
        let mut run = RunState::new();
        for stage in Stage::ALL {
            assert_eq!(run.current().next_stage(), Some(stage));
            run = run.complete(stage).unwrap();
        }
        let run = run.advance(PipelineState::Done).unwrap();

        assert_eq!(run.current(), PipelineState::Done);
        assert_eq!(run.history().len(), 8);
        assert!(run.current().is_terminal());
    }

    #[test]
    fn test_skipping_a_stage_is_rejected() {
        let run = RunState::new().complete(Stage::Extract).unwrap();
        let err = run.complete(Stage::Cluster).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidTransition {
                from: PipelineState::Extracted,
                to: PipelineState::Clustered,
            }
        ));
    }

    #[test]
    fn test_failed_is_terminal() {
        let run = RunState::new().fail(Stage::Extract).unwrap();
        assert_eq!(run.current(), PipelineState::Failed(Stage::Extract));
        assert!(run.clone().complete(Stage::Transform).is_err());
        assert!(run.fail(Stage::Transform).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Stage::Regress.to_string(), "regress");
        assert_eq!(
            PipelineState::Failed(Stage::Compare).to_string(),
            "failed(compare)"
        );
    }
}

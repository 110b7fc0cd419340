use stackrun_core::RunState;
use tracing::debug;

use crate::error::{OrchestratorError, Result};

/// Tracks a single command invocation through its states.
#[derive(Debug, Clone)]
pub struct RunStateMachine {
    state: RunState,
    history: Vec<RunState>,
}

impl Default for RunStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStateMachine {
    pub fn new() -> Self {
        Self {
            state: RunState::Idle,
            history: vec![RunState::Idle],
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Every state visited so far, starting with `Idle`.
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    pub fn advance(&mut self, to: RunState) -> Result<()> {
        Self::validate_transition(&self.state, &to)?;
        debug!(from = %self.state.as_str(), to = %to.as_str(), "Run state transition");
        self.state = to;
        self.history.push(to);
        Ok(())
    }

    pub fn fail(&mut self) -> Result<()> {
        self.advance(RunState::Failed)
    }

    pub fn validate_transition(from: &RunState, to: &RunState) -> Result<()> {
        if Self::allowed_transitions(from).contains(to) {
            Ok(())
        } else {
            Err(OrchestratorError::invalid_transition(*from, *to))
        }
    }

    pub fn can_transition(from: &RunState, to: &RunState) -> bool {
        Self::validate_transition(from, to).is_ok()
    }

    fn allowed_transitions(from: &RunState) -> Vec<RunState> {
        match from {
            RunState::Idle => vec![RunState::Parsed, RunState::Failed],
            RunState::Parsed => vec![RunState::ModuleLoaded, RunState::Failed],
            RunState::ModuleLoaded => vec![RunState::Validated, RunState::Failed],
            RunState::Validated => vec![RunState::SessionConstructed, RunState::Failed],
            RunState::SessionConstructed => vec![
                RunState::Refreshed,
                RunState::CommandExecuted,
                RunState::Failed,
            ],
            RunState::Refreshed => vec![RunState::CommandExecuted, RunState::Failed],
            RunState::CommandExecuted => vec![],
            RunState::Failed => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(RunStateMachine::can_transition(
            &RunState::Idle,
            &RunState::Parsed
        ));
        assert!(RunStateMachine::can_transition(
            &RunState::SessionConstructed,
            &RunState::CommandExecuted
        ));
        assert!(RunStateMachine::can_transition(
            &RunState::Refreshed,
            &RunState::CommandExecuted
        ));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!RunStateMachine::can_transition(
            &RunState::Idle,
            &RunState::Validated
        ));
        assert!(!RunStateMachine::can_transition(
            &RunState::CommandExecuted,
            &RunState::Refreshed
        ));
        assert!(!RunStateMachine::can_transition(
            &RunState::Failed,
            &RunState::Idle
        ));
    }

    #[test]
    fn test_any_live_state_can_fail() {
        for state in [
            RunState::Idle,
            RunState::Parsed,
            RunState::ModuleLoaded,
            RunState::Validated,
            RunState::SessionConstructed,
            RunState::Refreshed,
        ] {
            assert!(RunStateMachine::can_transition(&state, &RunState::Failed));
        }
    }

    #[test]
    fn test_advance_records_history() {
        let mut machine = RunStateMachine::new();
        machine.advance(RunState::Parsed).unwrap();
        machine.fail().unwrap();

        assert_eq!(machine.state(), RunState::Failed);
        assert_eq!(
            machine.history(),
            &[RunState::Idle, RunState::Parsed, RunState::Failed]
        );
        assert!(machine.advance(RunState::ModuleLoaded).is_err());
    }
}

use serde::{Deserialize, Serialize};

/// Progress of a single command invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Parsed,
    ModuleLoaded,
    Validated,
    SessionConstructed,
    Refreshed,
    CommandExecuted,
    /// Terminal state reached from any step that reported an error.
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Parsed => "parsed",
            Self::ModuleLoaded => "module_loaded",
            Self::Validated => "validated",
            Self::SessionConstructed => "session_constructed",
            Self::Refreshed => "refreshed",
            Self::CommandExecuted => "command_executed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::CommandExecuted | Self::Failed)
    }
}

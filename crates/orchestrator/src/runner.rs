//! Command runner: one (stack, environment, command) invocation from
//! positional arguments to a reported outcome.

use engine::{OutputSink, ProvisioningEngine};
use stackrun_core::{Command, ProviderCache, RunState, StackDefinition};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::registry::StackRegistry;
use crate::stack::StackOrchestrator;
use crate::state_machine::RunStateMachine;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// `<stack> <env> <command>`, any of them possibly missing.
    pub positionals: Vec<String>,
    pub refresh: bool,
}

impl Invocation {
    pub fn new<I, S>(positionals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            positionals: positionals.into_iter().map(Into::into).collect(),
            refresh: false,
        }
    }

    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    fn positional(&self, index: usize) -> Option<&str> {
        self.positionals.get(index).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    MissingArguments,
    UnknownStack { path: String },
    /// Environment or command rejected; carries the usage text.
    Usage { message: String },
    ConstructionFailed { message: String },
    ExecutionFailed { message: String },
    Completed(Command),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// The line reported for a failed run.
    pub fn message(&self) -> Option<String> {
        match self {
            Self::MissingArguments => Some("stack argument is required".to_string()),
            Self::UnknownStack { path } => Some(format!("Stack not found: {}", path)),
            Self::Usage { message }
            | Self::ConstructionFailed { message }
            | Self::ExecutionFailed { message } => Some(message.clone()),
            Self::Completed(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub state: RunState,
    pub history: Vec<RunState>,
}

/// Usage text for a stack.
pub fn usage(stack: &dyn StackDefinition) -> String {
    let commands: Vec<&str> = Command::ALL.iter().map(|c| c.as_str()).collect();
    format!(
        "Usage: stackrun {} <{}> <{}> [options]\n  options:\n    -r, --refresh: refresh the stack before running the command",
        stack.name(),
        stack.envs().join("|"),
        commands.join("|")
    )
}

pub fn construction_failure(err: &OrchestratorError) -> String {
    format!(
        "Failed to configure stack. Check that you can access the Pulumi state backend. ({})",
        err.diagnostic()
    )
}

pub fn execution_failure(err: &OrchestratorError) -> String {
    format!(
        "Failed to run stack. Check the Pulumi logs. ({})",
        err.diagnostic()
    )
}

pub struct CommandRunner {
    registry: StackRegistry,
    engine: Arc<dyn ProvisioningEngine>,
    config: OrchestratorConfig,
    providers: Arc<ProviderCache>,
    sink: Option<OutputSink>,
}

impl CommandRunner {
    pub fn new(registry: StackRegistry, engine: Arc<dyn ProvisioningEngine>) -> Self {
        Self {
            registry,
            engine,
            config: OrchestratorConfig::default(),
            providers: Arc::new(ProviderCache::new()),
            sink: None,
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_output(mut self, sink: OutputSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn providers(&self) -> &Arc<ProviderCache> {
        &self.providers
    }

    /// Run one invocation. Every failure is logged and reported in the
    /// outcome; nothing is retried.
    pub async fn run(&self, invocation: Invocation) -> RunReport {
        let mut machine = RunStateMachine::new();
        let outcome = self.drive(&invocation, &mut machine).await;
        if !outcome.is_success() {
            // Terminal states reject further transitions; only live runs fail.
            if !machine.state().is_terminal() {
                let _ = machine.fail();
            }
        }
        RunReport {
            outcome,
            state: machine.state(),
            history: machine.history().to_vec(),
        }
    }

    async fn drive(&self, invocation: &Invocation, machine: &mut RunStateMachine) -> RunOutcome {
        let Some(path) = invocation.positional(0) else {
            error!("stack argument is required");
            return RunOutcome::MissingArguments;
        };
        let env = invocation.positional(1);
        let command = invocation.positional(2);
        advance(machine, RunState::Parsed);

        let stack = match self.registry.get(path) {
            Ok(stack) => stack,
            Err(err) => {
                error!(known = ?self.registry.names(), "{}", err);
                return RunOutcome::UnknownStack {
                    path: path.to_string(),
                };
            }
        };
        advance(machine, RunState::ModuleLoaded);

        let env = match env {
            Some(env) if stack.allows_env(env) => env,
            other => {
                error!("Invalid env: {}", other.unwrap_or("<none>"));
                return self.usage(stack.as_ref());
            }
        };
        let command = match command.and_then(Command::parse) {
            Some(command) => command,
            None => {
                error!("Invalid command: {}", command.unwrap_or("<none>"));
                return self.usage(stack.as_ref());
            }
        };
        advance(machine, RunState::Validated);

        let orchestrator = match StackOrchestrator::create(
            self.engine.as_ref(),
            stack.name(),
            Arc::clone(&stack),
            env,
            &self.config,
            Arc::clone(&self.providers),
        )
        .await
        {
            Ok(orchestrator) => orchestrator,
            Err(err) => {
                let message = construction_failure(&err);
                error!("{}", message);
                return RunOutcome::ConstructionFailed { message };
            }
        };
        let orchestrator = match &self.sink {
            Some(sink) => orchestrator.with_output(Arc::clone(sink)),
            None => orchestrator,
        };
        advance(machine, RunState::SessionConstructed);

        if invocation.refresh {
            info!("refresh stack");
            if let Err(err) = orchestrator.refresh().await {
                let message = execution_failure(&err);
                error!("{}", message);
                return RunOutcome::ExecutionFailed { message };
            }
            advance(machine, RunState::Refreshed);
        }

        info!("{} stack", command);
        match orchestrator.run(command).await {
            Ok(summary) => {
                info!(
                    session = %orchestrator.key(),
                    duration_ms = summary.duration_ms(),
                    "{} stack finished",
                    command
                );
                advance(machine, RunState::CommandExecuted);
                RunOutcome::Completed(command)
            }
            Err(err) => {
                let message = execution_failure(&err);
                error!("{}", message);
                RunOutcome::ExecutionFailed { message }
            }
        }
    }

    fn usage(&self, stack: &dyn StackDefinition) -> RunOutcome {
        let message = usage(stack);
        error!("{}", message);
        RunOutcome::Usage { message }
    }
}

/// The runner only takes forward edges, so a rejected transition is a bug.
fn advance(machine: &mut RunStateMachine, to: RunState) {
    if let Err(err) = machine.advance(to) {
        error!(error = %err, "Run state machine rejected transition");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_builder() {
        let invocation = Invocation::new(["stacks/network", "dev", "up"]).with_refresh(true);
        assert_eq!(invocation.positional(0), Some("stacks/network"));
        assert_eq!(invocation.positional(3), None);
        assert!(invocation.refresh);
    }

    #[test]
    fn test_outcome_messages() {
        assert!(RunOutcome::Completed(Command::Up).is_success());
        assert_eq!(RunOutcome::Completed(Command::Up).message(), None);
        assert!(!RunOutcome::MissingArguments.is_success());
        assert_eq!(
            RunOutcome::UnknownStack {
                path: "stacks/nope".to_string()
            }
            .message()
            .as_deref(),
            Some("Stack not found: stacks/nope")
        );
    }

    #[test]
    fn test_failure_messages() {
        let err = OrchestratorError::from(engine::EngineError::Payload(serde_json::json!("boom")));
        assert_eq!(
            construction_failure(&err),
            "Failed to configure stack. Check that you can access the Pulumi state backend. (\"boom\")"
        );
        assert_eq!(
            execution_failure(&err),
            "Failed to run stack. Check the Pulumi logs. (\"boom\")"
        );
    }
}

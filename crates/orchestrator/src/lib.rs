pub mod config;
pub mod error;
pub mod registry;
pub mod runner;
pub mod sink;
pub mod stack;
pub mod state_machine;

pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, Result};
pub use registry::StackRegistry;
pub use runner::{CommandRunner, Invocation, RunOutcome, RunReport};
pub use sink::stdout_sink;
pub use stack::{StackOrchestrator, REGION_CONFIG_KEY};
pub use state_machine::RunStateMachine;

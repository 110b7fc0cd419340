use async_trait::async_trait;
use serde_json::Value;

use crate::naming::ProgramArgs;
use crate::program::{Outputs, ProgramContext};

/// The config loader and program of a stack.
#[async_trait]
pub trait StackProgram: Send + Sync {
    /// Load the configuration for `env`.
    async fn config(&self, env: &str) -> anyhow::Result<Value>;

    /// Declare the stack's resources and return its outputs.
    async fn program(
        &self,
        args: &ProgramArgs,
        config: Value,
        ctx: &ProgramContext,
    ) -> anyhow::Result<Outputs>;
}

/// A named stack and the environments it may be deployed to.
pub trait StackDefinition: StackProgram {
    fn name(&self) -> &str;

    /// Allowed environments, in display order.
    fn envs(&self) -> &[&str];

    fn allows_env(&self, env: &str) -> bool {
        self.envs().contains(&env)
    }
}

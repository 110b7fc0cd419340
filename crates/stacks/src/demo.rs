//! Scaffold for a new stack: no configuration, no resources beyond the
//! default provider, no outputs.

use async_trait::async_trait;
use serde_json::{json, Value};
use stackrun_core::{
    Outputs, ProgramArgs, ProgramContext, ProviderArgs, StackDefinition, StackProgram,
};
use tracing::debug;

pub const NAME: &str = "demo";
pub const ENVS: &[&str] = &["common"];

#[derive(Debug, Default)]
pub struct DemoStack;

#[async_trait]
impl StackProgram for DemoStack {
    async fn config(&self, _env: &str) -> anyhow::Result<Value> {
        Ok(json!({}))
    }

    async fn program(
        &self,
        args: &ProgramArgs,
        _config: Value,
        ctx: &ProgramContext,
    ) -> anyhow::Result<Outputs> {
        let provider = ctx.provider(ProviderArgs::default());
        debug!(name = %args.name, provider = %provider.name(), "demo program evaluated");
        Ok(Outputs::new())
    }
}

impl StackDefinition for DemoStack {
    fn name(&self) -> &str {
        NAME
    }

    fn envs(&self) -> &[&str] {
        ENVS
    }
}

//! Lifecycle of one provisioning session.

use engine::{
    ColorMode, ConfigValue, EngineSession, LifecycleOptions, LifecycleSummary, OutputSink,
    ProgramRunner, ProjectSettings, ProvisioningEngine, SessionRequest, SessionSettings,
};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use stackrun_core::{
    resolve, Command, LifecyclePhase, Outputs, ProgramContext, ProviderCache, SessionKey, StackProgram,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};

pub const REGION_CONFIG_KEY: &str = "aws:region";

/// Wraps an engine session and drives its lifecycle operations.
pub struct StackOrchestrator {
    session: Box<dyn EngineSession>,
    color: ColorMode,
    sink: Option<OutputSink>,
}

impl StackOrchestrator {
    /// Open or attach to the session for `name` in `env` and prepare it for
    /// lifecycle operations.
    pub async fn create<P>(
        engine: &dyn ProvisioningEngine,
        name: &str,
        program: Arc<P>,
        env: &str,
        config: &OrchestratorConfig,
        providers: Arc<ProviderCache>,
    ) -> Result<Self>
    where
        P: StackProgram + ?Sized + 'static,
    {
        let request = SessionRequest {
            project_name: name.to_string(),
            session_name: env.to_string(),
            program: program_runner(name, env, program, providers),
            project_settings: ProjectSettings::new(name),
        };
        let session = engine.create_or_select_session(request).await?;
        info!(session = %session.key(), engine = engine.name(), "Session ready");

        // Recreated inline sessions do not load the secrets key from the
        // backend. It has to be in the environment settings before any
        // config value is written, or secret config will not round-trip.
        let deployment = session.export_state().await?;
        let encrypted_key = deployment
            .encrypted_key()
            .filter(|key| !key.is_empty())
            .map(str::to_string);
        match encrypted_key {
            Some(_) => debug!(session = %session.key(), "Recovered secrets encryption key"),
            None if config.require_encryption_key => {
                return Err(OrchestratorError::MissingEncryptionKey(session.key().clone()));
            }
            None => warn!(
                session = %session.key(),
                "No secrets encryption key in exported state; secret config will be unavailable"
            ),
        }
        session
            .save_settings(env, &SessionSettings::with_encrypted_key(encrypted_key))
            .await?;

        let defaults = BTreeMap::from([(
            REGION_CONFIG_KEY.to_string(),
            ConfigValue::plain(config.default_region.clone()),
        )]);
        session.set_all_config(&defaults).await?;

        Ok(Self {
            session,
            color: config.color,
            sink: None,
        })
    }

    pub fn with_output(mut self, sink: OutputSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn key(&self) -> &SessionKey {
        self.session.key()
    }

    fn options(&self, diff: bool) -> LifecycleOptions {
        let options = LifecycleOptions::new(self.color).with_diff(diff);
        match &self.sink {
            Some(sink) => options.with_output(Arc::clone(sink)),
            None => options,
        }
    }

    pub async fn refresh(&self) -> Result<LifecycleSummary> {
        Ok(self.session.refresh(&self.options(false)).await?)
    }

    pub async fn preview(&self) -> Result<LifecycleSummary> {
        Ok(self.session.preview(&self.options(true)).await?)
    }

    pub async fn up(&self) -> Result<LifecycleSummary> {
        Ok(self.session.up(&self.options(false)).await?)
    }

    pub async fn down(&self) -> Result<LifecycleSummary> {
        Ok(self.session.destroy(&self.options(false)).await?)
    }

    /// Run the operation a command names.
    pub async fn run(&self, command: Command) -> Result<LifecycleSummary> {
        match command.phase() {
            LifecyclePhase::Refresh => self.refresh().await,
            LifecyclePhase::Preview => self.preview().await,
            LifecyclePhase::Up => self.up().await,
            LifecyclePhase::Destroy => self.down().await,
        }
    }

    /// Output values, secret or not, without their secret flags.
    pub async fn outputs(&self) -> Result<Outputs> {
        Ok(self
            .session
            .outputs()
            .await?
            .into_iter()
            .map(|(name, output)| (name, output.value))
            .collect())
    }

    /// Outputs deserialized into the shape the program declares.
    pub async fn outputs_as<T: DeserializeOwned>(&self) -> Result<T> {
        let outputs = self.outputs().await?;
        Ok(serde_json::from_value(Value::Object(outputs.into_iter().collect()))?)
    }
}

/// Build the closure the engine calls to evaluate the program.
fn program_runner<P>(
    name: &str,
    env: &str,
    program: Arc<P>,
    providers: Arc<ProviderCache>,
) -> ProgramRunner
where
    P: StackProgram + ?Sized + 'static,
{
    let name = name.to_string();
    let env = env.to_string();
    Arc::new(move || {
        let name = name.clone();
        let env = env.clone();
        let program = Arc::clone(&program);
        let providers = Arc::clone(&providers);
        async move {
            let args = resolve(&name, &env);
            let config = program.config(&env).await?;
            let ctx = ProgramContext::new(&name, &env, providers);
            let outputs = program.program(&args, config, &ctx).await?;
            Ok::<_, anyhow::Error>(ctx.into_document(outputs))
        }
        .boxed()
    })
}

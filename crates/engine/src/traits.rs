use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use stackrun_core::{LifecyclePhase, ProgramDocument, SessionKey};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;

/// Deferred program invocation. The engine calls it whenever it needs the
/// desired state of the session.
pub type ProgramRunner =
    Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<ProgramDocument>> + Send + Sync>;

/// Receives streamed engine output, one chunk at a time.
pub type OutputSink = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSettings {
    pub name: String,
    pub runtime: String,
}

impl ProjectSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            runtime: "yaml".to_string(),
        }
    }
}

/// Per-environment settings persisted next to the project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(
        rename = "encryptedkey",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub encrypted_key: Option<String>,
}

impl SessionSettings {
    pub fn with_encrypted_key(key: Option<String>) -> Self {
        Self { encrypted_key: key }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigValue {
    pub value: String,
    #[serde(default)]
    pub secret: bool,
}

impl ConfigValue {
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            secret: false,
        }
    }

    pub fn secret(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            secret: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputValue {
    pub value: Value,
    #[serde(default)]
    pub secret: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretsProviderState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryptedkey: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretsProviders {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<SecretsProviderState>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets_providers: Option<SecretsProviders>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Exported state of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub deployment: DeploymentBody,
}

impl Deployment {
    /// Deployment whose secrets provider holds `key`.
    pub fn with_encrypted_key(key: impl Into<String>) -> Self {
        Self {
            version: 3,
            deployment: DeploymentBody {
                secrets_providers: Some(SecretsProviders {
                    kind: Some("cloud".to_string()),
                    state: Some(SecretsProviderState {
                        encryptedkey: Some(key.into()),
                        extra: Map::new(),
                    }),
                }),
                extra: Map::new(),
            },
        }
    }

    /// The secrets-encryption key, if the backend recorded one.
    pub fn encrypted_key(&self) -> Option<&str> {
        self.deployment
            .secrets_providers
            .as_ref()?
            .state
            .as_ref()?
            .encryptedkey
            .as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    #[default]
    Always,
    Never,
    Auto,
    Raw,
}

impl ColorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Never => "never",
            Self::Auto => "auto",
            Self::Raw => "raw",
        }
    }
}

/// Options shared by every lifecycle operation.
#[derive(Clone, Default)]
pub struct LifecycleOptions {
    pub color: ColorMode,
    /// Show detailed diffs (preview only).
    pub diff: bool,
    pub on_output: Option<OutputSink>,
}

impl LifecycleOptions {
    pub fn new(color: ColorMode) -> Self {
        Self {
            color,
            diff: false,
            on_output: None,
        }
    }

    pub fn with_diff(mut self, diff: bool) -> Self {
        self.diff = diff;
        self
    }

    pub fn with_output(mut self, sink: OutputSink) -> Self {
        self.on_output = Some(sink);
        self
    }

    pub fn emit(&self, chunk: &str) {
        if let Some(sink) = &self.on_output {
            sink(chunk);
        }
    }
}

impl fmt::Debug for LifecycleOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleOptions")
            .field("color", &self.color)
            .field("diff", &self.diff)
            .field("on_output", &self.on_output.is_some())
            .finish()
    }
}

/// Successful completion of a lifecycle operation.
#[derive(Debug, Clone)]
pub struct LifecycleSummary {
    pub phase: LifecyclePhase,
    pub stdout: String,
    pub stderr: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl LifecycleSummary {
    pub fn new(phase: LifecyclePhase, started_at: DateTime<Utc>) -> Self {
        Self {
            phase,
            stdout: String::new(),
            stderr: String::new(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn with_output(mut self, stdout: String, stderr: String) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Request to open or attach to a session.
#[derive(Clone)]
pub struct SessionRequest {
    pub project_name: String,
    pub session_name: String,
    pub program: ProgramRunner,
    pub project_settings: ProjectSettings,
}

impl SessionRequest {
    pub fn key(&self) -> SessionKey {
        SessionKey::new(&self.project_name, &self.session_name)
    }
}

impl fmt::Debug for SessionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRequest")
            .field("project_name", &self.project_name)
            .field("session_name", &self.session_name)
            .field("project_settings", &self.project_settings)
            .finish_non_exhaustive()
    }
}

/// A declarative provisioning engine.
#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    /// Get the name of the engine backend
    fn name(&self) -> &'static str;

    /// Create the session if it does not exist yet, otherwise attach to it
    async fn create_or_select_session(
        &self,
        request: SessionRequest,
    ) -> Result<Box<dyn EngineSession>>;
}

/// One open provisioning session.
#[async_trait]
pub trait EngineSession: Send + Sync {
    fn key(&self) -> &SessionKey;

    /// Export the full deployment record
    async fn export_state(&self) -> Result<Deployment>;

    /// Overwrite the settings stored for `environment`
    async fn save_settings(&self, environment: &str, settings: &SessionSettings) -> Result<()>;

    /// Set several configuration values at once
    async fn set_all_config(&self, config: &BTreeMap<String, ConfigValue>) -> Result<()>;

    async fn refresh(&self, options: &LifecycleOptions) -> Result<LifecycleSummary>;

    async fn preview(&self, options: &LifecycleOptions) -> Result<LifecycleSummary>;

    async fn up(&self, options: &LifecycleOptions) -> Result<LifecycleSummary>;

    async fn destroy(&self, options: &LifecycleOptions) -> Result<LifecycleSummary>;

    /// Current outputs with their secret flags
    async fn outputs(&self) -> Result<BTreeMap<String, OutputValue>>;
}

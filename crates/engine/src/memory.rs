//! In-process engine.
//!
//! Keeps session state in memory, runs programs to compute outputs and
//! records every call it receives. Useful for dry runs of stack programs
//! and for exercising the orchestrator without a backend.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use stackrun_core::{LifecyclePhase, ProgramDocument, SessionKey};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::traits::{
    ConfigValue, Deployment, EngineSession, LifecycleOptions, LifecycleSummary, OutputValue,
    ProgramRunner, ProjectSettings, ProvisioningEngine, SessionRequest, SessionSettings,
};

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateOrSelect,
    ExportState,
    SaveSettings,
    SetAllConfig,
    Lifecycle(LifecyclePhase),
    Outputs,
}

/// A failure to inject.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Fails with a readable message.
    Rejected(String),
    /// Fails with an arbitrary payload.
    Payload(Value),
}

impl Fault {
    fn to_error(&self) -> EngineError {
        match self {
            Fault::Rejected(message) => EngineError::Rejected(message.clone()),
            Fault::Payload(value) => EngineError::Payload(value.clone()),
        }
    }
}

/// A call received by the engine, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    CreateOrSelect {
        project_name: String,
        session_name: String,
        project_settings: ProjectSettings,
    },
    ExportState,
    SaveSettings {
        environment: String,
        settings: SessionSettings,
    },
    SetAllConfig {
        config: BTreeMap<String, ConfigValue>,
    },
    Lifecycle {
        phase: LifecyclePhase,
        diff: bool,
    },
    Outputs,
}

#[derive(Default)]
struct StoredSession {
    settings: HashMap<String, SessionSettings>,
    config: BTreeMap<String, ConfigValue>,
    deployment: Deployment,
    document: Option<ProgramDocument>,
}

#[derive(Default)]
struct MemoryState {
    sessions: HashMap<SessionKey, StoredSession>,
    calls: Vec<EngineCall>,
    faults: HashMap<Operation, Fault>,
    keys: HashMap<SessionKey, String>,
    secret_outputs: BTreeSet<String>,
}

#[derive(Clone, Default)]
pub struct InMemoryEngine {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend the backend holds `key` for the given session.
    pub fn with_encrypted_key(self, key: SessionKey, encrypted_key: impl Into<String>) -> Self {
        self.state
            .lock()
            .unwrap()
            .keys
            .insert(key, encrypted_key.into());
        self
    }

    pub fn with_secret_output(self, name: impl Into<String>) -> Self {
        self.state
            .lock()
            .unwrap()
            .secret_outputs
            .insert(name.into());
        self
    }

    pub fn fail_on(&self, operation: Operation, fault: Fault) {
        self.state.lock().unwrap().faults.insert(operation, fault);
    }

    pub fn clear_faults(&self) {
        self.state.lock().unwrap().faults.clear();
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of times `phase` ran.
    pub fn lifecycle_count(&self, phase: LifecyclePhase) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, EngineCall::Lifecycle { phase: p, .. } if *p == phase))
            .count()
    }

    pub fn settings(&self, key: &SessionKey, environment: &str) -> Option<SessionSettings> {
        let state = self.state.lock().unwrap();
        state.sessions.get(key)?.settings.get(environment).cloned()
    }

    pub fn config(&self, key: &SessionKey) -> BTreeMap<String, ConfigValue> {
        let state = self.state.lock().unwrap();
        state
            .sessions
            .get(key)
            .map(|s| s.config.clone())
            .unwrap_or_default()
    }

    /// The document deployed by the last `up`, if any.
    pub fn deployed(&self, key: &SessionKey) -> Option<ProgramDocument> {
        let state = self.state.lock().unwrap();
        state.sessions.get(key)?.document.clone()
    }

    /// Record `call` and return the injected fault for `operation`, if any.
    fn enter(&self, operation: Operation, call: EngineCall) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        match state.faults.get(&operation) {
            Some(fault) => Err(fault.to_error()),
            None => Ok(()),
        }
    }

    fn with_session<T>(&self, key: &SessionKey, f: impl FnOnce(&mut StoredSession) -> T) -> Result<T> {
        let mut state = self.state.lock().unwrap();
        let session = state
            .sessions
            .get_mut(key)
            .ok_or_else(|| EngineError::SessionNotFound(key.to_string()))?;
        Ok(f(session))
    }
}

#[async_trait]
impl ProvisioningEngine for InMemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create_or_select_session(
        &self,
        request: SessionRequest,
    ) -> Result<Box<dyn EngineSession>> {
        self.enter(
            Operation::CreateOrSelect,
            EngineCall::CreateOrSelect {
                project_name: request.project_name.clone(),
                session_name: request.session_name.clone(),
                project_settings: request.project_settings.clone(),
            },
        )?;

        let key = request.key();
        {
            let mut state = self.state.lock().unwrap();
            let deployment = state
                .keys
                .get(&key)
                .map(|k| Deployment::with_encrypted_key(k.clone()))
                .unwrap_or_default();
            state
                .sessions
                .entry(key.clone())
                .or_insert_with(|| StoredSession {
                    deployment,
                    ..Default::default()
                });
        }

        debug!(session = %key, "In-memory session ready");
        Ok(Box::new(MemorySession {
            key,
            program: request.program,
            engine: self.clone(),
        }))
    }
}

pub struct MemorySession {
    key: SessionKey,
    program: ProgramRunner,
    engine: InMemoryEngine,
}

impl MemorySession {
    async fn run_program(&self) -> Result<ProgramDocument> {
        (self.program)().await.map_err(EngineError::Program)
    }

    async fn lifecycle(
        &self,
        phase: LifecyclePhase,
        options: &LifecycleOptions,
    ) -> Result<LifecycleSummary> {
        let started_at = Utc::now();
        self.engine.enter(
            Operation::Lifecycle(phase),
            EngineCall::Lifecycle {
                phase,
                diff: options.diff,
            },
        )?;

        let mut lines = Vec::new();
        match phase {
            LifecyclePhase::Refresh => {
                let count = self.engine.with_session(&self.key, |s| {
                    s.document.as_ref().map_or(0, |d| d.resources.len())
                })?;
                lines.push(format!("~ refreshed {} resources", count));
            }
            LifecyclePhase::Preview => {
                let document = self.run_program().await?;
                let current = self.engine.with_session(&self.key, |s| s.document.clone())?;
                for resource in &document.resources {
                    let exists = current
                        .as_ref()
                        .is_some_and(|c| c.resource(&resource.name).is_some());
                    let (sign, verb) = if exists { ("=", "same") } else { ("+", "create") };
                    lines.push(format!("{} {} {} {}", sign, resource.type_token, resource.name, verb));
                }
            }
            LifecyclePhase::Up => {
                let document = self.run_program().await?;
                for resource in &document.resources {
                    lines.push(format!("+ {} {} created", resource.type_token, resource.name));
                }
                self.engine
                    .with_session(&self.key, |s| s.document = Some(document))?;
            }
            LifecyclePhase::Destroy => {
                let removed = self.engine.with_session(&self.key, |s| s.document.take())?;
                for resource in removed.iter().flat_map(|d| d.resources.iter()) {
                    lines.push(format!("- {} {} deleted", resource.type_token, resource.name));
                }
            }
        }

        let mut stdout = String::new();
        for line in lines {
            let line = format!("{}\n", line);
            options.emit(&line);
            stdout.push_str(&line);
        }
        Ok(LifecycleSummary::new(phase, started_at).with_output(stdout, String::new()))
    }
}

#[async_trait]
impl EngineSession for MemorySession {
    fn key(&self) -> &SessionKey {
        &self.key
    }

    async fn export_state(&self) -> Result<Deployment> {
        self.engine
            .enter(Operation::ExportState, EngineCall::ExportState)?;
        self.engine
            .with_session(&self.key, |s| s.deployment.clone())
    }

    async fn save_settings(&self, environment: &str, settings: &SessionSettings) -> Result<()> {
        self.engine.enter(
            Operation::SaveSettings,
            EngineCall::SaveSettings {
                environment: environment.to_string(),
                settings: settings.clone(),
            },
        )?;
        self.engine.with_session(&self.key, |s| {
            s.settings.insert(environment.to_string(), settings.clone());
        })
    }

    async fn set_all_config(&self, config: &BTreeMap<String, ConfigValue>) -> Result<()> {
        self.engine.enter(
            Operation::SetAllConfig,
            EngineCall::SetAllConfig {
                config: config.clone(),
            },
        )?;
        self.engine.with_session(&self.key, |s| {
            s.config
                .extend(config.iter().map(|(k, v)| (k.clone(), v.clone())));
        })
    }

    async fn refresh(&self, options: &LifecycleOptions) -> Result<LifecycleSummary> {
        self.lifecycle(LifecyclePhase::Refresh, options).await
    }

    async fn preview(&self, options: &LifecycleOptions) -> Result<LifecycleSummary> {
        self.lifecycle(LifecyclePhase::Preview, options).await
    }

    async fn up(&self, options: &LifecycleOptions) -> Result<LifecycleSummary> {
        self.lifecycle(LifecyclePhase::Up, options).await
    }

    async fn destroy(&self, options: &LifecycleOptions) -> Result<LifecycleSummary> {
        self.lifecycle(LifecyclePhase::Destroy, options).await
    }

    async fn outputs(&self) -> Result<BTreeMap<String, OutputValue>> {
        self.engine.enter(Operation::Outputs, EngineCall::Outputs)?;
        let document = self.engine.with_session(&self.key, |s| s.document.clone())?;
        let secrets = self.engine.state.lock().unwrap().secret_outputs.clone();

        Ok(document
            .map(|d| d.outputs)
            .unwrap_or_default()
            .into_iter()
            .map(|(name, value)| {
                let secret = secrets.contains(&name);
                (name, OutputValue { value, secret })
            })
            .collect())
    }
}

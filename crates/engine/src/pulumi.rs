use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use stackrun_core::{LifecyclePhase, SessionKey};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::project_file::{self, PROJECT_FILE};
use crate::traits::{
    ConfigValue, Deployment, EngineSession, LifecycleOptions, LifecycleSummary, OutputValue,
    ProgramRunner, ProjectSettings, ProvisioningEngine, SessionRequest, SessionSettings,
};

const SECRET_SENTINEL: &str = "[secret]";

/// Engine backed by the `pulumi` command line.
///
/// Each project gets its own directory under `work_dir` holding the
/// generated `Pulumi.yaml` and per-environment settings files.
#[derive(Debug, Clone)]
pub struct PulumiCli {
    work_dir: PathBuf,
    binary: PathBuf,
    backend_url: Option<String>,
}

impl PulumiCli {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            binary: PathBuf::from("pulumi"),
            backend_url: None,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = Some(url.into());
        self
    }

    pub fn project_dir(&self, project_name: &str) -> PathBuf {
        self.work_dir.join(project_name)
    }
}

#[async_trait]
impl ProvisioningEngine for PulumiCli {
    fn name(&self) -> &'static str {
        "pulumi"
    }

    async fn create_or_select_session(
        &self,
        request: SessionRequest,
    ) -> Result<Box<dyn EngineSession>> {
        let dir = self.project_dir(&request.project_name);
        tokio::fs::create_dir_all(&dir).await?;

        let session = PulumiSession {
            key: request.key(),
            dir,
            binary: self.binary.clone(),
            backend_url: self.backend_url.clone(),
            project: request.project_settings,
            program: request.program,
        };

        session.write_project(None).await?;
        session
            .run(&["stack", "select", "--create", session.key.session_name.as_str()])
            .await?;

        info!(session = %session.key, "Pulumi stack selected");
        Ok(Box::new(session))
    }
}

pub struct PulumiSession {
    key: SessionKey,
    dir: PathBuf,
    binary: PathBuf,
    backend_url: Option<String>,
    project: ProjectSettings,
    program: ProgramRunner,
}

impl PulumiSession {
    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .arg("--non-interactive")
            .current_dir(&self.dir)
            .env("PULUMI_SKIP_UPDATE_CHECK", "true")
            .kill_on_drop(true);
        if let Some(url) = &self.backend_url {
            cmd.env("PULUMI_BACKEND_URL", url);
        }
        cmd
    }

    fn spawn_error(&self, e: std::io::Error) -> EngineError {
        if e.kind() == std::io::ErrorKind::NotFound {
            EngineError::CommandNotFound(self.binary.display().to_string())
        } else {
            EngineError::Io(e)
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!("Running pulumi {:?} in {:?}", args, self.dir);

        let output = self
            .command(args)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(EngineError::CommandFailed {
                command: format!("pulumi {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run a long operation, forwarding stdout to the sink line by line.
    async fn stream(&self, args: &[&str], options: &LifecycleOptions) -> Result<(String, String)> {
        debug!("Streaming pulumi {:?} in {:?}", args, self.dir);

        let mut child = self
            .command(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (stdout, stderr) = tokio::join!(
            read_lines(stdout, Some(options)),
            read_lines(stderr, None)
        );
        let status = child.wait().await?;
        let (stdout, stderr) = (stdout?, stderr?);

        if !status.success() {
            return Err(EngineError::CommandFailed {
                command: format!("pulumi {}", args.join(" ")),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok((stdout, stderr))
    }

    async fn write_project(&self, program: Option<&stackrun_core::ProgramDocument>) -> Result<()> {
        let document = project_file::render(&self.project, program);
        write_json(&self.dir.join(PROJECT_FILE), &document).await
    }

    async fn render_program(&self) -> Result<()> {
        let document = (self.program)().await.map_err(EngineError::Program)?;
        debug!(
            session = %self.key,
            resources = document.resources.len(),
            "Program rendered"
        );
        self.write_project(Some(&document)).await
    }

    async fn lifecycle(
        &self,
        phase: LifecyclePhase,
        options: &LifecycleOptions,
    ) -> Result<LifecycleSummary> {
        let started_at = Utc::now();

        if matches!(phase, LifecyclePhase::Preview | LifecyclePhase::Up) {
            self.render_program().await?;
        }

        let mut args = vec![phase.as_str()];
        match phase {
            LifecyclePhase::Preview => {
                if options.diff {
                    args.push("--diff");
                }
            }
            LifecyclePhase::Refresh | LifecyclePhase::Up | LifecyclePhase::Destroy => {
                args.extend(["--yes", "--skip-preview"]);
            }
        }
        args.extend([
            "--stack",
            self.key.session_name.as_str(),
            "--color",
            options.color.as_str(),
        ]);

        let (stdout, stderr) = self.stream(&args, options).await?;
        Ok(LifecycleSummary::new(phase, started_at).with_output(stdout, stderr))
    }

    async fn stack_outputs(&self, show_secrets: bool) -> Result<Map<String, Value>> {
        let mut args = vec![
            "stack",
            "output",
            "--json",
            "--stack",
            self.key.session_name.as_str(),
        ];
        if show_secrets {
            args.push("--show-secrets");
        }
        let raw = self.run(&args).await?;
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }
}

#[async_trait]
impl EngineSession for PulumiSession {
    fn key(&self) -> &SessionKey {
        &self.key
    }

    async fn export_state(&self) -> Result<Deployment> {
        let raw = self
            .run(&["stack", "export", "--stack", self.key.session_name.as_str()])
            .await?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn save_settings(&self, environment: &str, settings: &SessionSettings) -> Result<()> {
        let path = self.dir.join(project_file::settings_file(environment));
        write_json(&path, &serde_json::to_value(settings)?).await
    }

    async fn set_all_config(&self, config: &BTreeMap<String, ConfigValue>) -> Result<()> {
        if config.is_empty() {
            return Ok(());
        }

        let pairs: Vec<(&str, String)> = config
            .iter()
            .map(|(key, value)| {
                let flag = if value.secret { "--secret" } else { "--plaintext" };
                (flag, format!("{}={}", key, value.value))
            })
            .collect();

        let mut args = vec!["config", "set-all", "--stack", self.key.session_name.as_str()];
        for (flag, pair) in &pairs {
            args.push(*flag);
            args.push(pair.as_str());
        }
        self.run(&args).await.map(|_| ())
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
        let masked = self.stack_outputs(false).await?;
        let revealed = self.stack_outputs(true).await?;
        Ok(merge_outputs(&masked, revealed))
    }
}

/// Combine masked and revealed output listings: a value shown as
/// `[secret]` in the masked listing is a secret.
fn merge_outputs(masked: &Map<String, Value>, revealed: Map<String, Value>) -> BTreeMap<String, OutputValue> {
    revealed
        .into_iter()
        .map(|(key, value)| {
            let secret = masked.get(&key).and_then(Value::as_str) == Some(SECRET_SENTINEL);
            (key, OutputValue { value, secret })
        })
        .collect()
}

async fn read_lines<R>(reader: Option<R>, forward: Option<&LifecycleOptions>) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(String::new());
    };

    let mut collected = String::new();
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        collected.push_str(&line);
        collected.push('\n');
        if let Some(options) = forward {
            options.emit(&format!("{}\n", line));
        }
    }
    Ok(collected)
}

async fn write_json(path: &Path, value: &Value) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, content).await?;
    Ok(())
}

mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use engine::{InMemoryEngine, ProvisioningEngine, PulumiCli};
use orchestrator::{stdout_sink, CommandRunner, Invocation, OrchestratorConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

const CONFIG_FILE: &str = "stackrun.toml";
const DEFAULT_WORK_DIR: &str = ".stackrun";
const DEFAULT_BINARY: &str = "pulumi";

#[derive(Parser)]
#[command(name = "stackrun")]
#[command(about = "Preview, deploy or destroy an infrastructure stack", long_about = None)]
#[command(version)]
struct Cli {
    /// Stack module path or name, e.g. `stacks/sample`
    stack: Option<String>,

    /// Target environment
    env: Option<String>,

    /// preview, up or down
    command: Option<String>,

    /// Refresh the stack before running the command
    #[arg(short, long)]
    refresh: bool,

    /// Configuration file
    #[arg(long, default_value = CONFIG_FILE)]
    config: PathBuf,
}

impl Cli {
    fn invocation(&self) -> Invocation {
        let positionals = [&self.stack, &self.env, &self.command]
            .into_iter()
            .map_while(|arg| arg.clone());
        Invocation::new(positionals).with_refresh(self.refresh)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum EngineKind {
    #[default]
    Pulumi,
    Memory,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
struct EngineConfig {
    kind: EngineKind,
    work_dir: PathBuf,
    binary: String,
    backend_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::Pulumi,
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            binary: DEFAULT_BINARY.to_string(),
            backend_url: None,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct StackrunConfig {
    log_level: Option<String>,
    engine: EngineConfig,
    orchestrator: OrchestratorConfig,
}

impl StackrunConfig {
    async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    fn engine(&self) -> Arc<dyn ProvisioningEngine> {
        match self.engine.kind {
            EngineKind::Memory => Arc::new(InMemoryEngine::new()),
            EngineKind::Pulumi => {
                let mut engine = PulumiCli::new(&self.engine.work_dir).with_binary(&self.engine.binary);
                if let Some(url) = &self.engine.backend_url {
                    engine = engine.with_backend_url(url);
                }
                Arc::new(engine)
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = StackrunConfig::load(&cli.config).await?;

    let level = logging::resolve_level(
        config.log_level.as_deref(),
        std::env::var(logging::LOG_LEVEL_ENV).ok(),
    );
    logging::init_tracing(&level);

    let engine = config.engine();
    tracing::debug!(engine = engine.name(), "Using provisioning engine");

    let runner = CommandRunner::new(stacks::registry(), engine)
        .with_config(config.orchestrator)
        .with_output(stdout_sink());
    let report = runner.run(cli.invocation()).await;

    if report.outcome.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

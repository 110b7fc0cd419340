use async_trait::async_trait;
use engine::{EngineCall, Fault, InMemoryEngine, Operation};
use orchestrator::{CommandRunner, Invocation, RunOutcome, StackRegistry};
use serde_json::{json, Value};
use stackrun_core::{
    Command, LifecyclePhase, Outputs, ProgramArgs, ProgramContext, ProviderArgs, ResourceSpec,
    RunState, StackDefinition, StackProgram,
};
use std::io;
use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;

/// Minimal stack: one provider and one instance.
struct InstanceStack;

#[async_trait]
impl StackProgram for InstanceStack {
    async fn config(&self, _env: &str) -> anyhow::Result<Value> {
        Ok(json!({ "instance_type": "t4g.nano" }))
    }

    async fn program(
        &self,
        args: &ProgramArgs,
        config: Value,
        ctx: &ProgramContext,
    ) -> anyhow::Result<Outputs> {
        let provider = ctx.provider(ProviderArgs::default());
        let instance = ctx.register(
            ResourceSpec::new(args.name.as_str(), "aws:ec2:Instance")
                .property("instanceType", config["instance_type"].clone())
                .property("tags", json!(args.tags))
                .provider(&provider),
        )?;
        Ok(Outputs::from([("publicIp".to_string(), instance.attr("publicIp"))]))
    }
}

impl StackDefinition for InstanceStack {
    fn name(&self) -> &str {
        "instance"
    }

    fn envs(&self) -> &[&str] {
        &["common"]
    }
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

fn capture_logs() -> (LogBuffer, DefaultGuard) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (buffer, guard)
}

fn setup() -> (CommandRunner, InMemoryEngine) {
    let engine = InMemoryEngine::new();
    let registry = StackRegistry::new().with(Arc::new(InstanceStack));
    let runner = CommandRunner::new(registry, Arc::new(engine.clone()));
    (runner, engine)
}

fn lifecycle_calls(engine: &InMemoryEngine) -> Vec<LifecyclePhase> {
    engine
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            EngineCall::Lifecycle { phase, .. } => Some(phase),
            _ => None,
        })
        .collect()
}

mod arguments {
    use super::*;

    #[tokio::test]
    async fn test_missing_env_and_command_prints_usage() {
        let (logs, _guard) = capture_logs();
        let (runner, engine) = setup();

        let report = runner.run(Invocation::new(["stacks/instance"])).await;

        assert!(matches!(report.outcome, RunOutcome::Usage { .. }));
        assert!(logs.contents().contains("Usage:"));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_env_prints_usage() {
        let (logs, _guard) = capture_logs();
        let (runner, engine) = setup();

        let report = runner
            .run(Invocation::new(["stacks/instance", "invalid-env", "preview"]))
            .await;

        let logs = logs.contents();
        assert!(logs.contains("Invalid env: invalid-env"));
        assert!(logs.contains("Usage: stackrun instance <common> <preview|up|down> [options]"));
        assert!(logs.contains("-r, --refresh"));
        assert!(matches!(report.outcome, RunOutcome::Usage { .. }));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_command_prints_usage() {
        let (logs, _guard) = capture_logs();
        let (runner, engine) = setup();

        let report = runner
            .run(Invocation::new(["stacks/instance", "common", "invalid-cmd"]))
            .await;

        let logs = logs.contents();
        assert!(logs.contains("Invalid command: invalid-cmd"));
        assert!(logs.contains("Usage:"));
        assert_eq!(report.state, RunState::Failed);
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_no_positionals() {
        let (logs, _guard) = capture_logs();
        let (runner, _engine) = setup();

        let report = runner.run(Invocation::default()).await;

        assert_eq!(report.outcome, RunOutcome::MissingArguments);
        assert!(logs.contents().contains("stack argument is required"));
        assert_eq!(report.history, vec![RunState::Idle, RunState::Failed]);
    }

    #[tokio::test]
    async fn test_unknown_stack() {
        let (logs, _guard) = capture_logs();
        let (runner, engine) = setup();

        let report = runner
            .run(Invocation::new(["stacks/nope", "common", "up"]))
            .await;

        assert_eq!(
            report.outcome,
            RunOutcome::UnknownStack {
                path: "stacks/nope".to_string()
            }
        );
        assert!(logs.contents().contains("Stack not found: stacks/nope"));
        assert_eq!(report.history, vec![RunState::Idle, RunState::Parsed, RunState::Failed]);
        assert!(engine.calls().is_empty());
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn test_structured_construction_error() {
        let (logs, _guard) = capture_logs();
        let (runner, engine) = setup();
        engine.fail_on(Operation::CreateOrSelect, Fault::Rejected("boom".to_string()));

        let report = runner
            .run(Invocation::new(["stacks/instance", "common", "preview"]))
            .await;

        let RunOutcome::ConstructionFailed { message } = &report.outcome else {
            panic!("expected construction failure, got {:?}", report.outcome);
        };
        assert!(message.contains("boom"));
        assert!(!message.contains("\"boom\""));
        assert!(message.starts_with("Failed to configure stack."));
        assert!(logs.contents().contains(message.as_str()));
        assert_eq!(report.state, RunState::Failed);
    }

    #[tokio::test]
    async fn test_raw_payload_construction_error() {
        let (runner, engine) = setup();
        engine.fail_on(Operation::CreateOrSelect, Fault::Payload(json!("boom")));

        let report = runner
            .run(Invocation::new(["stacks/instance", "common", "preview"]))
            .await;

        let message = report.outcome.message().unwrap();
        assert!(message.contains("\"boom\""));
    }

    #[tokio::test]
    async fn test_execution_error() {
        let (logs, _guard) = capture_logs();
        let (runner, engine) = setup();
        engine.fail_on(
            Operation::Lifecycle(LifecyclePhase::Preview),
            Fault::Payload(json!({ "code": 255 })),
        );

        let report = runner
            .run(Invocation::new(["stacks/instance", "common", "preview"]))
            .await;

        assert_eq!(
            report.outcome,
            RunOutcome::ExecutionFailed {
                message: "Failed to run stack. Check the Pulumi logs. ({\"code\":255})".to_string()
            }
        );
        assert!(logs.contents().contains("Failed to run stack."));
        assert_eq!(engine.lifecycle_count(LifecyclePhase::Preview), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_skips_command() {
        let (runner, engine) = setup();
        engine.fail_on(
            Operation::Lifecycle(LifecyclePhase::Refresh),
            Fault::Rejected("state locked".to_string()),
        );

        let report = runner
            .run(Invocation::new(["stacks/instance", "common", "up"]).with_refresh(true))
            .await;

        assert!(matches!(report.outcome, RunOutcome::ExecutionFailed { .. }));
        assert_eq!(lifecycle_calls(&engine), vec![LifecyclePhase::Refresh]);
    }
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn test_refresh_runs_once_before_command() {
        let (logs, _guard) = capture_logs();
        let (runner, engine) = setup();

        let report = runner
            .run(Invocation::new(["stacks/instance", "common", "preview"]).with_refresh(true))
            .await;

        assert_eq!(report.outcome, RunOutcome::Completed(Command::Preview));
        assert_eq!(
            lifecycle_calls(&engine),
            vec![LifecyclePhase::Refresh, LifecyclePhase::Preview]
        );
        assert!(report.history.contains(&RunState::Refreshed));
        let logs = logs.contents();
        let refresh_at = logs.find("refresh stack").unwrap();
        let preview_at = logs.find("preview stack").unwrap();
        assert!(refresh_at < preview_at);
    }

    #[tokio::test]
    async fn test_no_refresh_without_flag() {
        let (runner, engine) = setup();

        let report = runner
            .run(Invocation::new(["stacks/instance", "common", "preview"]))
            .await;

        assert!(report.outcome.is_success());
        assert_eq!(engine.lifecycle_count(LifecyclePhase::Refresh), 0);
        assert_eq!(
            report.history,
            vec![
                RunState::Idle,
                RunState::Parsed,
                RunState::ModuleLoaded,
                RunState::Validated,
                RunState::SessionConstructed,
                RunState::CommandExecuted,
            ]
        );
    }

    #[tokio::test]
    async fn test_up_then_down() {
        let (runner, engine) = setup();
        let key = stackrun_core::SessionKey::new("instance", "common");

        let report = runner
            .run(Invocation::new(["stacks/instance", "common", "up"]))
            .await;
        assert_eq!(report.outcome, RunOutcome::Completed(Command::Up));

        let deployed = engine.deployed(&key).unwrap();
        let instance = deployed.resource("instance").unwrap();
        assert_eq!(instance.get("instanceType"), Some(&json!("t4g.nano")));
        assert_eq!(instance.options.provider.as_deref(), Some("default-ap-northeast-2"));
        assert!(deployed.resource("default-ap-northeast-2").is_some());
        assert_eq!(deployed.outputs["publicIp"], json!("${instance.publicIp}"));

        let report = runner
            .run(Invocation::new(["instance", "common", "down"]))
            .await;
        assert_eq!(report.outcome, RunOutcome::Completed(Command::Down));
        assert!(engine.deployed(&key).is_none());
        assert_eq!(engine.lifecycle_count(LifecyclePhase::Up), 1);
        assert_eq!(engine.lifecycle_count(LifecyclePhase::Destroy), 1);
    }

    #[tokio::test]
    async fn test_provider_cache_shared_across_runs() {
        let (runner, _engine) = setup();

        for command in ["preview", "up"] {
            let report = runner
                .run(Invocation::new(["stacks/instance", "common", command]))
                .await;
            assert!(report.outcome.is_success());
        }

        assert_eq!(runner.providers().len(), 1);
        assert!(runner
            .providers()
            .contains("instance:common:default-ap-northeast-2"));
    }
}

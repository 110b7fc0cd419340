pub mod error;
pub mod memory;
pub mod project_file;
pub mod pulumi;
pub mod traits;

pub use error::{EngineError, Result};
pub use memory::{EngineCall, Fault, InMemoryEngine, Operation};
pub use pulumi::PulumiCli;
pub use traits::{
    ColorMode, ConfigValue, Deployment, EngineSession, LifecycleOptions, LifecycleSummary,
    OutputSink, OutputValue, ProgramRunner, ProjectSettings, ProvisioningEngine, SessionRequest,
    SessionSettings,
};

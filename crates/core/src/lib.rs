pub mod domain;
pub mod error;
pub mod naming;
pub mod program;
pub mod provider;
pub mod stack;

pub use domain::{Command, LifecyclePhase, RunState, SessionKey};
pub use error::{CoreError, Result};
pub use naming::{resolve, ProgramArgs, IAC_MARKER, NO_PREFIX_ENVS};
pub use program::{
    InvokeRef, InvokeSpec, Outputs, ProgramContext, ProgramDocument, ResourceOptions, ResourceRef,
    ResourceSpec,
};
pub use provider::{ProviderArgs, ProviderCache, ProviderRef, DEFAULT_PROFILE, DEFAULT_REGION};
pub use stack::{StackDefinition, StackProgram};

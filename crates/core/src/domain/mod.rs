pub mod run;
pub mod session;

pub use run::RunState;
pub use session::{Command, LifecyclePhase, SessionKey};

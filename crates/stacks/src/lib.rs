pub mod conventions;
pub mod demo;
pub mod sample;

use orchestrator::StackRegistry;
use std::sync::Arc;

pub use demo::DemoStack;
pub use sample::{SampleConfig, SampleStack};

/// Every stack linked into the binary.
pub fn registry() -> StackRegistry {
    StackRegistry::new()
        .with(Arc::new(SampleStack::new()))
        .with(Arc::new(DemoStack))
}

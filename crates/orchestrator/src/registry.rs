use stackrun_core::{CoreError, StackDefinition};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Stack definitions linked into the binary, looked up by name or path.
#[derive(Clone, Default)]
pub struct StackRegistry {
    stacks: BTreeMap<String, Arc<dyn StackDefinition>>,
}

impl StackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, stack: Arc<dyn StackDefinition>) {
        self.stacks.insert(stack.name().to_string(), stack);
    }

    pub fn with(mut self, stack: Arc<dyn StackDefinition>) -> Self {
        self.register(stack);
        self
    }

    /// Look up a stack by its module path (`stacks/network`, `./stacks/network/`)
    /// or bare name. Only the last path segment is significant.
    pub fn get(&self, path: &str) -> stackrun_core::Result<Arc<dyn StackDefinition>> {
        let name = path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();
        self.stacks
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::StackNotFound(path.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.stacks.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }
}

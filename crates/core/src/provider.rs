//! Memoized cloud provider handles.
//!
//! Stacks that need a region or profile other than the session default ask
//! the cache for a provider instead of declaring one. Handles are keyed by
//! project, stack, profile and region so that several stacks created in one
//! process do not share providers.

use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::program::{ProgramContext, ResourceSpec};

pub const DEFAULT_REGION: &str = "ap-northeast-2";
pub const DEFAULT_PROFILE: &str = "default";

const PROVIDER_TYPE: &str = "pulumi:providers:aws";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderArgs {
    pub region: Option<String>,
    pub profile: Option<String>,
}

impl ProviderArgs {
    pub fn region(region: impl Into<String>) -> Self {
        Self {
            region: Some(region.into()),
            profile: None,
        }
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }
}

/// Handle to a provider resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRef {
    name: String,
    region: String,
    profile: String,
}

impl ProviderRef {
    fn new(region: String, profile: String) -> Self {
        Self {
            name: format!("{}-{}", profile, region),
            region,
            profile,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    fn spec(&self) -> ResourceSpec {
        ResourceSpec::new(self.name.clone(), PROVIDER_TYPE)
            .properties(json!({ "region": self.region, "profile": self.profile }))
            .alias(self.region.clone())
    }
}

/// Process-lifetime provider registry. Entries are never evicted.
#[derive(Clone, Default)]
pub struct ProviderCache {
    providers: Arc<RwLock<HashMap<String, ProviderRef>>>,
}

impl ProviderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the provider for `args`, creating it on first use, and make
    /// sure its resource is declared in the program being built.
    pub fn get(&self, ctx: &ProgramContext, args: ProviderArgs) -> ProviderRef {
        let region = args.region.unwrap_or_else(|| DEFAULT_REGION.to_string());
        let profile = args.profile.unwrap_or_else(|| DEFAULT_PROFILE.to_string());
        let key = format!("{}:{}:{}-{}", ctx.project(), ctx.stack(), profile, region);

        let provider = self.get_or_insert(key, region, profile);
        ctx.ensure(provider.spec());
        provider
    }

    pub fn len(&self) -> usize {
        self.providers.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.providers.read().unwrap().contains_key(key)
    }

    fn get_or_insert(&self, key: String, region: String, profile: String) -> ProviderRef {
        {
            let providers = self.providers.read().unwrap();
            if let Some(provider) = providers.get(&key) {
                return provider.clone();
            }
        }

        let mut providers = self.providers.write().unwrap();
        providers
            .entry(key)
            .or_insert_with_key(|key| {
                debug!(key = %key, "Creating provider");
                ProviderRef::new(region, profile)
            })
            .clone()
    }
}

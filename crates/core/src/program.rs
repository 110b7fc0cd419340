//! Declarative program documents.
//!
//! A stack program does not talk to the cloud. It registers resources and
//! data-source invocations on a [`ProgramContext`] and returns its outputs;
//! the engine receives the resulting [`ProgramDocument`] and reconciles it.
//! Cross-resource references are interpolation strings (`${name.attr}`)
//! resolved by the engine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::error::{CoreError, Result};
use crate::provider::{ProviderArgs, ProviderCache, ProviderRef};

/// Stack outputs keyed by output name.
pub type Outputs = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Alias {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceOptions {
    /// Name of the explicit provider resource, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<Alias>,
}

impl ResourceOptions {
    pub fn is_empty(&self) -> bool {
        self.provider.is_none() && self.aliases.is_empty()
    }
}

/// One declared resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub type_token: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "ResourceOptions::is_empty")]
    pub options: ResourceOptions,
}

impl ResourceSpec {
    pub fn new(name: impl Into<String>, type_token: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_token: type_token.into(),
            properties: Map::new(),
            options: ResourceOptions::default(),
        }
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Merge every field of a JSON object into the properties.
    /// Non-object values are ignored.
    pub fn properties(mut self, value: Value) -> Self {
        if let Value::Object(map) = value {
            self.properties.extend(map);
        }
        self
    }

    pub fn provider(mut self, provider: &ProviderRef) -> Self {
        self.options.provider = Some(provider.name().to_string());
        self
    }

    pub fn alias(mut self, name: impl Into<String>) -> Self {
        self.options.aliases.push(Alias { name: name.into() });
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// A data-source call whose result is bound to a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeSpec {
    pub name: String,
    pub function: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub arguments: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl InvokeSpec {
    pub fn new(name: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            function: function.into(),
            arguments: Map::new(),
            provider: None,
        }
    }

    pub fn arguments(mut self, value: Value) -> Self {
        if let Value::Object(map) = value {
            self.arguments.extend(map);
        }
        self
    }

    pub fn provider(mut self, provider: &ProviderRef) -> Self {
        self.provider = Some(provider.name().to_string());
        self
    }
}

/// Handle to a registered resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    name: String,
}

impl ResourceRef {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Interpolation referencing an attribute of this resource.
    pub fn attr(&self, attribute: &str) -> Value {
        Value::String(format!("${{{}.{}}}", self.name, attribute))
    }

    pub fn id(&self) -> Value {
        self.attr("id")
    }
}

/// Handle to an invoke result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeRef {
    name: String,
}

impl InvokeRef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self, path: &str) -> Value {
        Value::String(format!("${{{}.{}}}", self.name, path))
    }
}

/// Everything one program run declared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramDocument {
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
    #[serde(default)]
    pub invokes: Vec<InvokeSpec>,
    #[serde(default)]
    pub outputs: Outputs,
}

impl ProgramDocument {
    pub fn resource(&self, name: &str) -> Option<&ResourceSpec> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn resources_of_type<'a>(
        &'a self,
        type_token: &'a str,
    ) -> impl Iterator<Item = &'a ResourceSpec> + 'a {
        self.resources
            .iter()
            .filter(move |r| r.type_token == type_token)
    }
}

#[derive(Default)]
struct DocumentState {
    resources: Vec<ResourceSpec>,
    invokes: Vec<InvokeSpec>,
}

/// Registration surface handed to a stack program for one run.
pub struct ProgramContext {
    project: String,
    stack: String,
    providers: Arc<ProviderCache>,
    state: RwLock<DocumentState>,
}

impl ProgramContext {
    pub fn new(
        project: impl Into<String>,
        stack: impl Into<String>,
        providers: Arc<ProviderCache>,
    ) -> Self {
        Self {
            project: project.into(),
            stack: stack.into(),
            providers,
            state: RwLock::new(DocumentState::default()),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }

    pub fn providers(&self) -> &Arc<ProviderCache> {
        &self.providers
    }

    /// Shorthand for looking up a provider in the shared cache.
    pub fn provider(&self, args: ProviderArgs) -> ProviderRef {
        self.providers.get(self, args)
    }

    pub fn register(&self, spec: ResourceSpec) -> Result<ResourceRef> {
        let mut state = self.state.write().unwrap();
        if Self::is_taken(&state, &spec.name) {
            return Err(CoreError::DuplicateResource(spec.name));
        }
        let name = spec.name.clone();
        state.resources.push(spec);
        Ok(ResourceRef { name })
    }

    /// Register `spec` unless a resource with the same name already exists.
    pub fn ensure(&self, spec: ResourceSpec) -> ResourceRef {
        let mut state = self.state.write().unwrap();
        let name = spec.name.clone();
        if !state.resources.iter().any(|r| r.name == name) {
            state.resources.push(spec);
        }
        ResourceRef { name }
    }

    pub fn invoke(&self, spec: InvokeSpec) -> Result<InvokeRef> {
        let mut state = self.state.write().unwrap();
        if Self::is_taken(&state, &spec.name) {
            return Err(CoreError::DuplicateResource(spec.name));
        }
        let name = spec.name.clone();
        state.invokes.push(spec);
        Ok(InvokeRef { name })
    }

    pub fn resource_count(&self) -> usize {
        self.state.read().unwrap().resources.len()
    }

    pub fn into_document(self, outputs: Outputs) -> ProgramDocument {
        let state = self.state.into_inner().unwrap_or_else(|e| e.into_inner());
        ProgramDocument {
            resources: state.resources,
            invokes: state.invokes,
            outputs,
        }
    }

    fn is_taken(state: &DocumentState, name: &str) -> bool {
        state.resources.iter().any(|r| r.name == name) || state.invokes.iter().any(|i| i.name == name)
    }
}

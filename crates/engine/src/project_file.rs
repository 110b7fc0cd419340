//! Rendering of Pulumi YAML project files.
//!
//! Pulumi parses project and stack files as YAML, and JSON is valid YAML, so
//! documents are written with `serde_json`.

use serde_json::{json, Map, Value};
use stackrun_core::{InvokeSpec, ProgramDocument, ResourceSpec};

use crate::traits::ProjectSettings;

pub const PROJECT_FILE: &str = "Pulumi.yaml";

pub fn settings_file(environment: &str) -> String {
    format!("Pulumi.{}.yaml", environment)
}

/// Render the project file, with the program body when one is known.
pub fn render(settings: &ProjectSettings, program: Option<&ProgramDocument>) -> Value {
    let mut root = Map::new();
    root.insert("name".to_string(), json!(settings.name));
    root.insert("runtime".to_string(), json!(settings.runtime));

    let Some(program) = program else {
        return Value::Object(root);
    };

    if !program.resources.is_empty() {
        let resources: Map<String, Value> = program
            .resources
            .iter()
            .map(|r| (r.name.clone(), render_resource(r)))
            .collect();
        root.insert("resources".to_string(), Value::Object(resources));
    }

    if !program.invokes.is_empty() {
        let variables: Map<String, Value> = program
            .invokes
            .iter()
            .map(|i| (i.name.clone(), render_invoke(i)))
            .collect();
        root.insert("variables".to_string(), Value::Object(variables));
    }

    if !program.outputs.is_empty() {
        let outputs: Map<String, Value> = program
            .outputs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        root.insert("outputs".to_string(), Value::Object(outputs));
    }

    Value::Object(root)
}

fn reference(name: &str) -> Value {
    Value::String(format!("${{{}}}", name))
}

fn render_resource(resource: &ResourceSpec) -> Value {
    let mut body = Map::new();
    body.insert("type".to_string(), json!(resource.type_token));
    if !resource.properties.is_empty() {
        body.insert(
            "properties".to_string(),
            Value::Object(resource.properties.clone()),
        );
    }

    let mut options = Map::new();
    if let Some(provider) = &resource.options.provider {
        options.insert("provider".to_string(), reference(provider));
    }
    if !resource.options.aliases.is_empty() {
        options.insert("aliases".to_string(), json!(resource.options.aliases));
    }
    if !options.is_empty() {
        body.insert("options".to_string(), Value::Object(options));
    }

    Value::Object(body)
}

fn render_invoke(invoke: &InvokeSpec) -> Value {
    let mut call = Map::new();
    call.insert("function".to_string(), json!(invoke.function));
    if !invoke.arguments.is_empty() {
        call.insert(
            "arguments".to_string(),
            Value::Object(invoke.arguments.clone()),
        );
    }
    if let Some(provider) = &invoke.provider {
        call.insert("options".to_string(), json!({ "provider": reference(provider) }));
    }
    json!({ "fn::invoke": call })
}

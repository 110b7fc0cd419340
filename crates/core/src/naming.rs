//! Naming and tagging conventions derived from a (stack, environment) pair.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Environments whose resources carry the bare stack name.
pub const NO_PREFIX_ENVS: [&str; 2] = ["common", "sandbox"];

/// Value of the `iac` tag stamped on every resource.
pub const IAC_MARKER: &str = "pulumi";

/// Arguments handed to a stack program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramArgs {
    /// Resource name prefix for this stack in this environment.
    pub name: String,
    pub env: String,
    pub tags: BTreeMap<String, String>,
}

/// Derive program arguments for `stack` deployed to `env`.
///
/// Total over its inputs: environment legality is checked by the caller.
pub fn resolve(stack: &str, env: &str) -> ProgramArgs {
    let prefix = if NO_PREFIX_ENVS.contains(&env) {
        String::new()
    } else {
        format!("{}-", env)
    };
    let name = format!("{}{}", prefix, stack);

    let tags = BTreeMap::from([
        ("iac".to_string(), IAC_MARKER.to_string()),
        ("stack".to_string(), stack.to_string()),
        ("env".to_string(), env.to_string()),
        ("Name".to_string(), name.clone()),
    ]);

    ProgramArgs {
        name,
        env: env.to_string(),
        tags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_prefixed_env() {
        assert_eq!(
            resolve("network", "dev"),
            ProgramArgs {
                name: "dev-network".to_string(),
                env: "dev".to_string(),
                tags: tags(&[
                    ("iac", "pulumi"),
                    ("stack", "network"),
                    ("env", "dev"),
                    ("Name", "dev-network"),
                ]),
            }
        );
    }

    #[test]
    fn test_no_prefix_envs_keep_stack_name() {
        for env in NO_PREFIX_ENVS {
            let args = resolve("network", env);
            assert_eq!(args.name, "network");
            assert_eq!(args.tags["Name"], "network");
            assert_eq!(args.tags["env"], env);
        }
    }

    #[test]
    fn test_arbitrary_env_is_prefixed() {
        let args = resolve("asdf", "test");
        assert_eq!(args.name, "test-asdf");
        assert_eq!(args.tags.len(), 4);
        assert_eq!(args.tags["stack"], "asdf");
        assert_eq!(args.tags["iac"], IAC_MARKER);
    }

    #[test]
    fn test_empty_env_still_prefixes() {
        let args = resolve("network", "");
        assert_eq!(args.name, "-network");
    }
}

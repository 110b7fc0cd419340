use engine::ColorMode;
use serde::{Deserialize, Serialize};
use stackrun_core::DEFAULT_REGION;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Baseline `aws:region` set on every session.
    pub default_region: String,
    /// Fail session construction when the backend holds no secrets key.
    pub require_encryption_key: bool,
    pub color: ColorMode,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_region: DEFAULT_REGION.to_string(),
            require_encryption_key: false,
            color: ColorMode::Always,
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_region(mut self, region: impl Into<String>) -> Self {
        self.default_region = region.into();
        self
    }

    pub fn with_required_encryption_key(mut self, require: bool) -> Self {
        self.require_encryption_key = require;
        self
    }

    pub fn with_color(mut self, color: ColorMode) -> Self {
        self.color = color;
        self
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a remote provisioning session.
///
/// The project is the stack name and the session is the environment, so
/// `network` deployed to `dev` lives at `network/dev` on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub project_name: String,
    pub session_name: String,
}

impl SessionKey {
    pub fn new(project_name: impl Into<String>, session_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            session_name: session_name.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project_name, self.session_name)
    }
}

/// The four operations a session supports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Refresh,
    Preview,
    Up,
    Destroy,
}

impl LifecyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Refresh => "refresh",
            Self::Preview => "preview",
            Self::Up => "up",
            Self::Destroy => "destroy",
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commands a user may request from the command line.
///
/// `refresh` is not a command on its own; it is requested with a flag and
/// always runs before one of these.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Preview,
    Up,
    Down,
}

impl Command {
    pub const ALL: [Command; 3] = [Command::Preview, Command::Up, Command::Down];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preview => "preview",
            Self::Up => "up",
            Self::Down => "down",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "preview" => Some(Self::Preview),
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            _ => None,
        }
    }

    /// The session operation this command maps to.
    pub fn phase(&self) -> LifecyclePhase {
        match self {
            Self::Preview => LifecyclePhase::Preview,
            Self::Up => LifecyclePhase::Up,
            Self::Down => LifecyclePhase::Destroy,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_display() {
        let key = SessionKey::new("network", "dev");
        assert_eq!(key.to_string(), "network/dev");
    }

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse("preview"), Some(Command::Preview));
        assert_eq!(Command::parse("down"), Some(Command::Down));
        assert_eq!(Command::parse("destroy"), None);
        assert_eq!(Command::parse("refresh"), None);
    }

    #[test]
    fn test_down_maps_to_destroy() {
        assert_eq!(Command::Down.phase(), LifecyclePhase::Destroy);
        assert_eq!(Command::Up.phase(), LifecyclePhase::Up);
    }

    #[test]
    fn test_lifecycle_phase_serialization() {
        let json = serde_json::to_string(&LifecyclePhase::Destroy).unwrap();
        assert_eq!(json, "\"destroy\"");
    }
}

use serde::{Deserialize, Serialize};

/// Capability family of an agent. Messages are routed by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentCategory {
    Content,
    Social,
    Email,
    Seo,
    Analytics,
    Orchestrator,
}

impl AgentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Social => "social",
            Self::Email => "email",
            Self::Seo => "seo",
            Self::Analytics => "analytics",
            Self::Orchestrator => "orchestrator",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "content" => Some(Self::Content),
            "social" => Some(Self::Social),
            "email" => Some(Self::Email),
            "seo" => Some(Self::Seo),
            "analytics" => Some(Self::Analytics),
            "orchestrator" => Some(Self::Orchestrator),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Error,
    Completed,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Error => "error",
            Self::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "idle" => Some(Self::Idle),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "error" => Some(Self::Error),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Serializable identity of a registered agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub id: String,
    pub name: String,
    pub category: AgentCategory,
    pub status: AgentStatus,
    pub description: String,
}

impl AgentInfo {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: AgentCategory,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            status: AgentStatus::Idle,
            description: description.into(),
        }
    }
}

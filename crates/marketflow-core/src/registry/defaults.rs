//! The marketing agents every orchestrator starts with.

use crate::models::{AgentCategory, AgentInfo};
use crate::tools::builtin::{content_tools, email_tools, social_tools};

use super::AgentEntry;

pub(super) fn default_agents() -> Vec<AgentEntry> {
    let specs = [
        (
            AgentInfo::new(
                "content_agent",
                "Content Writer Agent",
                AgentCategory::Content,
                "Generates marketing content",
            ),
            content_tools(),
        ),
        (
            AgentInfo::new(
                "social_agent",
                "Social Media Agent",
                AgentCategory::Social,
                "Manages social media",
            ),
            social_tools(),
        ),
        (
            AgentInfo::new(
                "email_agent",
                "Email Agent",
                AgentCategory::Email,
                "Handles email campaigns",
            ),
            email_tools(),
        ),
    ];

    specs
        .into_iter()
        .filter_map(|(info, tools)| match AgentEntry::new(info, tools) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::error!("[Registry] Invalid built-in agent: {}", e);
                None
            }
        })
        .collect()
}

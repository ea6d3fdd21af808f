//! Built-in marketing tools for the default content, social and email agents.
//!
//! These stand in for LLM-backed generation: outputs are deterministic so
//! workflows can be exercised end to end without a model provider.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::{json, Value};

use super::{str_param, FnTool, ParamSpec, ParamType, Tool, ToolDefinition};

const BASE_HASHTAGS: &[&str] = &["Marketing", "Business", "AI", "Innovation"];

pub fn content_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(FnTool::new(
            ToolDefinition::new("generate_post", "Generate a social media post")
                .param("platform", ParamSpec::required(ParamType::String))
                .param("topic", ParamSpec::optional(ParamType::String))
                .param("tone", ParamSpec::optional(ParamType::String)),
            |params, state| async move {
                let platform = str_param(&params, "platform").to_string();
                let topic = str_param(&params, "topic").to_string();
                state.increment("posts_generated", 1).await;
                if !topic.is_empty() {
                    state.set("last_topic", json!(topic)).await;
                }
                Ok(json!({
                    "content": format!("Generated post for {}", platform),
                    "status": "success",
                    "hashtags": hashtags(&topic, &platform),
                }))
            },
        )),
        Arc::new(FnTool::new(
            ToolDefinition::new("optimize_seo", "Optimize content for SEO")
                .param("content", ParamSpec::required(ParamType::String))
                .param("keywords", ParamSpec::optional(ParamType::Array)),
            |params, _state| async move {
                let content = str_param(&params, "content").to_string();
                let keywords: Vec<String> = params
                    .get("keywords")
                    .and_then(Value::as_array)
                    .map(|ks| ks.iter().filter_map(|k| k.as_str().map(String::from)).collect())
                    .unwrap_or_default();
                Ok(json!({
                    "optimized_content": content,
                    "seo_score": seo_score(&content, &keywords),
                }))
            },
        )),
        Arc::new(FnTool::new(
            ToolDefinition::new("analyze_readability", "Score content readability")
                .param("content", ParamSpec::required(ParamType::String)),
            |params, _state| async move {
                let (score, suggestions) = readability(str_param(&params, "content"));
                Ok(json!({ "score": score, "suggestions": suggestions }))
            },
        )),
    ]
}

pub fn social_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(FnTool::new(
            ToolDefinition::new("schedule_post", "Schedule a social media post")
                .param("post_id", ParamSpec::required(ParamType::String))
                .param("scheduled_at", ParamSpec::required(ParamType::String)),
            |params, state| async move {
                let scheduled_at = str_param(&params, "scheduled_at").to_string();
                state.increment("scheduled_posts", 1).await;
                Ok(json!({ "scheduled": true, "scheduled_at": scheduled_at }))
            },
        )),
        Arc::new(FnTool::new(
            ToolDefinition::new("analyze_engagement", "Analyze post engagement")
                .param("post_id", ParamSpec::required(ParamType::String)),
            |_params, _state| async move {
                Ok(json!({ "engagement_rate": 4.5, "impressions": 12000 }))
            },
        )),
    ]
}

pub fn email_tools() -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(FnTool::new(
        ToolDefinition::new("send_campaign", "Send an email campaign")
            .param("campaign_id", ParamSpec::required(ParamType::String))
            .param("audience_id", ParamSpec::required(ParamType::String)),
        |params, state| async move {
            state.increment("campaigns_sent", 1).await;
            state
                .set("last_campaign_id", json!(str_param(&params, "campaign_id")))
                .await;
            Ok(json!({ "sent": true, "recipients": 1500 }))
        },
    ))]
}

/// Base tags plus up to three capitalized topic words. Instagram keeps up
/// to 30 tags, every other platform 5.
fn hashtags(topic: &str, platform: &str) -> Vec<String> {
    let mut tags: Vec<String> = BASE_HASHTAGS.iter().map(|t| t.to_string()).collect();
    tags.extend(topic.to_lowercase().split_whitespace().take(3).map(|w| {
        let mut chars = w.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    }));
    let limit = if platform == "instagram" { 30 } else { 5 };
    tags.truncate(limit);
    tags
}

fn seo_score(content: &str, keywords: &[String]) -> u32 {
    let haystack = content.to_lowercase();
    let hits = keywords
        .iter()
        .filter(|k| haystack.contains(&k.to_lowercase()))
        .count() as u32;
    (70 + hits * 5).min(100)
}

fn readability(content: &str) -> (i64, Vec<String>) {
    let words = content.split_whitespace().count().max(1);
    static SENTENCE_END: OnceLock<Regex> = OnceLock::new();
    let sentence_re = SENTENCE_END.get_or_init(|| Regex::new(r"[.!?]+").expect("valid sentence regex"));
    let sentences = sentence_re.split(content).count().max(1);
    let avg_words = words as f64 / sentences as f64;

    let mut score = 100;
    let mut suggestions = Vec::new();
    if avg_words > 20.0 {
        score -= 20;
        suggestions.push("Consider shorter sentences for better readability".to_string());
    }
    if words > 2000 {
        score -= 10;
    }
    (score, suggestions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::AgentState;

    fn find(tools: &[Arc<dyn Tool>], name: &str) -> Arc<dyn Tool> {
        tools.iter().find(|t| t.name() == name).cloned().unwrap()
    }

    #[test]
    fn test_hashtags_limits() {
        let tags = hashtags("growth hacking for startups today", "twitter");
        assert_eq!(tags, vec!["Marketing", "Business", "AI", "Innovation", "Growth"]);

        let tags = hashtags("growth hacking for startups", "instagram");
        assert_eq!(tags.len(), 7);
        assert_eq!(tags[6], "For");
    }

    #[test]
    fn test_seo_score_caps_at_100() {
        let keywords: Vec<String> = (0..10).map(|i| format!("k{}", i)).collect();
        let content = keywords.join(" ");
        assert_eq!(seo_score(&content, &keywords), 100);
        assert_eq!(seo_score("AI tools", &["ai".to_string(), "crm".to_string()]), 75);
    }

    #[test]
    fn test_readability_penalizes_long_sentences() {
        let long = vec!["word"; 30].join(" ");
        let (score, suggestions) = readability(&long);
        assert_eq!(score, 80);
        assert_eq!(suggestions.len(), 1);

        let (score, suggestions) = readability("Short one. Another short one.");
        assert_eq!(score, 100);
        assert!(suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_send_campaign_updates_own_state() {
        let state = AgentState::new();
        let tool = find(&email_tools(), "send_campaign");
        let out = tool
            .execute(json!({ "campaign_id": "c1", "audience_id": "a1" }), &state)
            .await
            .unwrap();
        assert_eq!(out, json!({ "sent": true, "recipients": 1500 }));
        assert_eq!(state.get("campaigns_sent").await, Some(json!(1)));
        assert_eq!(state.get("last_campaign_id").await, Some(json!("c1")));
    }

    #[tokio::test]
    async fn test_generate_post_output() {
        let state = AgentState::new();
        let tool = find(&content_tools(), "generate_post");
        let out = tool
            .execute(json!({ "tool": "generate_post", "platform": "linkedin", "topic": "ai" }), &state)
            .await
            .unwrap();
        assert_eq!(out["content"], "Generated post for linkedin");
        assert_eq!(out["status"], "success");
        assert_eq!(state.get("last_topic").await, Some(json!("ai")));
    }
}

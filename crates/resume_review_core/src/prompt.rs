//! crates/resume_review_core/src/prompt.rs
//!
//! Builds the message list sent to the chat-completion API for a résumé
//! conversation.

use serde_json::Value;

use crate::domain::{ChatRole, ChatTurn, PromptMessage};

pub const SYSTEM_PROMPT: &str = "You are a helpful resume assistant. Analyze the resume structure and suggest improvements \
based on job-fit, skill gaps, and clarity. Your output should be UI-friendly.";

/// How many earlier turns are replayed to the model.
pub const HISTORY_WINDOW: usize = 8;

const MISSING: &str = "N/A";

/// Condenses a parsed résumé into the handful of fields the assistant needs.
pub fn resume_digest(parsed: &Value) -> String {
    let name = parsed
        .pointer("/contact_info/full_name")
        .and_then(Value::as_str)
        .unwrap_or(MISSING);
    let summary = parsed
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or(MISSING);
    let positions = collect_names(parsed.get("work_experience"), "position");
    let skills = collect_names(
        parsed.pointer("/technical_skills/programming_languages"),
        "name",
    );

    format!(
        "Name: {}\nSummary: {}\nExperience: {}\nSkills: {}",
        name,
        summary,
        join_or_missing(&positions),
        join_or_missing(&skills)
    )
}

/// Assembles the full prompt: system instruction, the most recent turns of
/// `history`, then the new user message with the résumé digest appended.
pub fn build_chat_prompt(
    history: &[ChatTurn],
    parsed: &Value,
    user_message: &str,
) -> Vec<PromptMessage> {
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    let mut messages = Vec::with_capacity(history.len() - start + 2);
    messages.push(PromptMessage::system(SYSTEM_PROMPT));

    for turn in &history[start..] {
        messages.push(match turn.role {
            ChatRole::User => PromptMessage::user(turn.content.clone()),
            ChatRole::Assistant => PromptMessage::assistant(turn.content.clone()),
        });
    }

    messages.push(PromptMessage::user(format!(
        "{}\n\nResume Summary:\n{}",
        user_message,
        resume_digest(parsed)
    )));
    messages
}

fn collect_names(list: Option<&Value>, field: &str) -> Vec<String> {
    list.and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(field).and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn join_or_missing(values: &[String]) -> String {
    if values.is_empty() {
        MISSING.to_string()
    } else {
        values.join(", ")
    }
}

// SPDX-FileCopyrightText: 2026 Kai Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt and tool profiles.
//!
//! A profile fixes the system prompt, the tools offered to the model and
//! the classification fallback. Kai channels get the assistant profile;
//! every other channel gets the task/event detector.

use kai_config::model::{AgentConfig, PromptsConfig};
use kai_core::KaiError;
use tracing::info;

use crate::classifier::Heuristic;

/// Tools offered to the assistant profile.
pub const KAI_TOOLS: &[&str] = &[
    "create_task",
    "create_event",
    "get_tasks",
    "get_events",
    "fetch_group_conversation",
    "fetch_user_conversations",
];

const DEFAULT_KAI_PROMPT: &str = "You are {name}, a helpful workplace assistant inside a team chat. \
Answer concisely. Use the tools to create tasks and events, to list the user's tasks and events, \
and to read recent conversations when the user asks about them. Resolve people by the names the user \
mentions. When you create a task or event, confirm what you created in one or two sentences.";

const DEFAULT_DETECTOR_PROMPT: &str = "You read a single chat message and decide whether it asks for a task \
or an event. Reply with JSON only, no prose. For a task reply \
{\"type\":\"task\",\"title\":...,\"description\":...,\"priority\":\"low|medium|high|urgent\",\"dueDate\":...,\"assignees\":[...]}. \
For an event reply {\"type\":\"event\",\"title\":...,\"startDate\":...,\"endDate\":...,\"location\":...,\"attendees\":[...],\"reminder\":15}. \
Otherwise reply {\"type\":\"none\"}. Omit fields you cannot fill.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    /// The conversational assistant with tools.
    Kai,
    /// Single-shot task/event detection on group messages.
    Detector,
}

#[derive(Debug, Clone)]
pub struct Profile {
    pub kind: ProfileKind,
    pub system_prompt: String,
    /// Tool names offered to the model. Empty means none.
    pub tools: &'static [&'static str],
    pub heuristic: Heuristic,
}

/// Both profiles plus the routing rule between them.
#[derive(Debug, Clone)]
pub struct Profiles {
    kai: Profile,
    detector: Profile,
    kai_channel_prefix: String,
}

impl Profiles {
    /// Loads prompts with priority file > inline > built-in default.
    ///
    /// An unreadable prompt file is a configuration error.
    pub fn from_config(agent: &AgentConfig, prompts: &PromptsConfig) -> Result<Self, KaiError> {
        let kai_prompt = load_prompt(
            prompts.kai_prompt_file.as_deref(),
            prompts.kai_prompt.as_deref(),
            &DEFAULT_KAI_PROMPT.replace("{name}", &agent.name),
        )?;
        let detector_prompt = load_prompt(
            prompts.detector_prompt_file.as_deref(),
            prompts.detector_prompt.as_deref(),
            DEFAULT_DETECTOR_PROMPT,
        )?;

        Ok(Self {
            kai: Profile {
                kind: ProfileKind::Kai,
                system_prompt: kai_prompt,
                tools: KAI_TOOLS,
                heuristic: Heuristic::Keywords,
            },
            detector: Profile {
                kind: ProfileKind::Detector,
                system_prompt: detector_prompt,
                tools: &[],
                heuristic: Heuristic::BinaryOne,
            },
            kai_channel_prefix: agent.kai_channel_prefix.clone(),
        })
    }

    /// The profile serving `channel_id`.
    pub fn select(&self, channel_id: &str) -> &Profile {
        if !self.kai_channel_prefix.is_empty() && channel_id.starts_with(&self.kai_channel_prefix) {
            &self.kai
        } else {
            &self.detector
        }
    }

    pub fn kai(&self) -> &Profile {
        &self.kai
    }

    pub fn detector(&self) -> &Profile {
        &self.detector
    }
}

fn load_prompt(file: Option<&str>, inline: Option<&str>, default: &str) -> Result<String, KaiError> {
    if let Some(path) = file {
        let content = std::fs::read_to_string(path)
            .map_err(|e| KaiError::Config(format!("cannot read prompt file {path}: {e}")))?;
        let trimmed = content.trim();
        if !trimmed.is_empty() {
            info!(path, "loaded system prompt from file");
            return Ok(trimmed.to_string());
        }
    }
    if let Some(prompt) = inline
        && !prompt.trim().is_empty()
    {
        return Ok(prompt.trim().to_string());
    }
    Ok(default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn channel_prefix_routes_to_kai() {
        let profiles = Profiles::from_config(&AgentConfig::default(), &PromptsConfig::default()).unwrap();
        assert_eq!(profiles.select("kai-u1").kind, ProfileKind::Kai);
        assert_eq!(profiles.select("team-general").kind, ProfileKind::Detector);
        assert!(profiles.select("team-general").tools.is_empty());
        assert_eq!(profiles.kai().tools.len(), 6);
        assert!(profiles.kai().system_prompt.starts_with("You are kai,"));
    }

    #[test]
    fn prompt_file_beats_inline() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  from file  ").unwrap();
        let prompts = PromptsConfig {
            kai_prompt: Some("inline".into()),
            kai_prompt_file: Some(file.path().display().to_string()),
            detector_prompt: Some("detect inline".into()),
            detector_prompt_file: None,
        };
        let profiles = Profiles::from_config(&AgentConfig::default(), &prompts).unwrap();
        assert_eq!(profiles.kai().system_prompt, "from file");
        assert_eq!(profiles.detector().system_prompt, "detect inline");
    }

    #[test]
    fn missing_prompt_file_is_config_error() {
        let prompts = PromptsConfig {
            detector_prompt_file: Some("/nonexistent/kai/prompt.txt".into()),
            ..PromptsConfig::default()
        };
        let err = Profiles::from_config(&AgentConfig::default(), &prompts).unwrap_err();
        assert!(matches!(err, KaiError::Config(_)));
    }
}

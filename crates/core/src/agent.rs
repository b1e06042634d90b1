//! Agent roles and workflow phases that context elements are scheduled for.

use crate::error::UnknownVariant;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The agent a prompt is being assembled for.
///
/// Serialized as a plain string; any name that is not one of the built-in
/// roles becomes [`AgentRole::Custom`] and is rendered with generic sections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentRole {
    /// Drafts plot outlines and chapters.
    Writer,
    /// Speaks or reasons as a single character.
    Character,
    /// Scores drafts against evaluation criteria.
    Rater,
    /// Revises drafts for consistency and style.
    Editor,
    /// Develops the setting in conversation with the user.
    Worldbuilding,
    /// Any other agent name.
    Custom(String),
}

impl AgentRole {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Writer => "writer",
            Self::Character => "character",
            Self::Rater => "rater",
            Self::Editor => "editor",
            Self::Worldbuilding => "worldbuilding",
            Self::Custom(name) => name,
        }
    }
}

impl From<String> for AgentRole {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "writer" => Self::Writer,
            "character" => Self::Character,
            "rater" => Self::Rater,
            "editor" => Self::Editor,
            "worldbuilding" => Self::Worldbuilding,
            _ => Self::Custom(value),
        }
    }
}

impl From<&str> for AgentRole {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<AgentRole> for String {
    fn from(role: AgentRole) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A step of the story-generation workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    PlotOutline,
    ChapterWriting,
    Evaluation,
    Revision,
    Worldbuilding,
}

impl Phase {
    /// Every phase, in workflow order.
    pub const ALL: [Phase; 5] = [
        Phase::PlotOutline,
        Phase::ChapterWriting,
        Phase::Evaluation,
        Phase::Revision,
        Phase::Worldbuilding,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlotOutline => "plot_outline",
            Self::ChapterWriting => "chapter_writing",
            Self::Evaluation => "evaluation",
            Self::Revision => "revision",
            Self::Worldbuilding => "worldbuilding",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| UnknownVariant::new("phase", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_roles_parse_case_insensitively() {
        assert_eq!(AgentRole::from("Writer"), AgentRole::Writer);
        assert_eq!(AgentRole::from("RATER"), AgentRole::Rater);
        assert_eq!(
            AgentRole::from("narrator"),
            AgentRole::Custom("narrator".into())
        );
    }

    #[test]
    fn role_serializes_as_plain_string() {
        let json = serde_json::to_string(&AgentRole::Editor).unwrap();
        assert_eq!(json, "\"editor\"");
        let parsed: AgentRole = serde_json::from_str("\"archivist\"").unwrap();
        assert_eq!(parsed, AgentRole::Custom("archivist".into()));
    }

    #[test]
    fn phase_parses_dashes_and_underscores() {
        assert_eq!("chapter-writing".parse::<Phase>().unwrap(), Phase::ChapterWriting);
        assert_eq!("plot_outline".parse::<Phase>().unwrap(), Phase::PlotOutline);
        assert!("epilogue".parse::<Phase>().is_err());
    }
}

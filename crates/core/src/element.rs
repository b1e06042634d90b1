//! Context elements — the discrete units of story state a prompt is built from.
//!
//! Every element carries scheduling metadata ([`ContextMetadata`]) that
//! decides who sees it, when, how important it is, and how it may be
//! shortened under budget pressure.

use crate::agent::{AgentRole, Phase};
use crate::error::ContextError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Heuristic token estimate: 1 token ≈ 4 characters, rounded down.
///
/// Monotonic in the character count of `text`.
pub fn estimate_tokens_heuristic(text: &str) -> usize {
    text.chars().count() / 4
}

// ── Variants ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryFactKind {
    WorldBuilding,
    Theme,
    Summary,
    PlotOutline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserSignalKind {
    Feedback,
    Instruction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseRecordKind {
    Output,
    Instruction,
}

/// Structured description of a character, rendered compactly by formatters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterProfile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_state: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goals: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traits: Vec<String>,
    /// Other character name → nature of the relationship.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, String>,
}

impl CharacterProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.current_state = Some(state.into());
        self
    }

    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goals.push(goal.into());
        self
    }

    pub fn with_trait(mut self, t: impl Into<String>) -> Self {
        self.traits.push(t.into());
        self
    }

    pub fn with_relationship(mut self, other: impl Into<String>, nature: impl Into<String>) -> Self {
        self.relationships.insert(other.into(), nature.into());
        self
    }

    /// Whether any of the structured fields beyond the name are populated.
    pub fn has_structured_fields(&self) -> bool {
        self.current_state.is_some()
            || !self.goals.is_empty()
            || !self.traits.is_empty()
            || !self.relationships.is_empty()
    }

    /// `Name — State: …; Goals: …; Traits: …; Relationships: …`, omitting
    /// empty fields.
    pub fn render(&self) -> String {
        let mut fields = Vec::new();
        if let Some(state) = &self.current_state {
            fields.push(format!("State: {state}"));
        }
        if !self.goals.is_empty() {
            fields.push(format!("Goals: {}", self.goals.join(", ")));
        }
        if !self.traits.is_empty() {
            fields.push(format!("Traits: {}", self.traits.join(", ")));
        }
        if !self.relationships.is_empty() {
            let relationships: Vec<String> = self
                .relationships
                .iter()
                .map(|(other, nature)| format!("{other} ({nature})"))
                .collect();
            fields.push(format!("Relationships: {}", relationships.join(", ")));
        }
        format!("{} — {}", self.name, fields.join("; "))
    }
}

/// What an element is. Closed set; formatters match on it exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementKind {
    SystemInstruction,
    StoryFact {
        category: StoryFactKind,
    },
    CharacterFact {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        profile: Option<CharacterProfile>,
    },
    UserSignal {
        signal: UserSignalKind,
    },
    PhaseRecord {
        record: PhaseRecordKind,
    },
    ConversationRecord,
}

impl ElementKind {
    /// The payload-free discriminant of this kind.
    pub fn variant(&self) -> ElementVariant {
        match self {
            Self::SystemInstruction => ElementVariant::SystemInstruction,
            Self::StoryFact { .. } => ElementVariant::StoryFact,
            Self::CharacterFact { .. } => ElementVariant::CharacterFact,
            Self::UserSignal { .. } => ElementVariant::UserSignal,
            Self::PhaseRecord { .. } => ElementVariant::PhaseRecord,
            Self::ConversationRecord => ElementVariant::ConversationRecord,
        }
    }
}

/// Discriminant of [`ElementKind`], used by filters and generic formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementVariant {
    SystemInstruction,
    StoryFact,
    CharacterFact,
    UserSignal,
    PhaseRecord,
    ConversationRecord,
}

impl ElementVariant {
    pub const ALL: [ElementVariant; 6] = [
        ElementVariant::SystemInstruction,
        ElementVariant::StoryFact,
        ElementVariant::CharacterFact,
        ElementVariant::UserSignal,
        ElementVariant::PhaseRecord,
        ElementVariant::ConversationRecord,
    ];

    /// Human-readable name, used as a section title for unknown agents.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::SystemInstruction => "System Instructions",
            Self::StoryFact => "Story Facts",
            Self::CharacterFact => "Characters",
            Self::UserSignal => "User Signals",
            Self::PhaseRecord => "Phase Records",
            Self::ConversationRecord => "Conversation",
        }
    }
}

impl fmt::Display for ElementVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

// ── Metadata ──────────────────────────────────────────────────────────────

/// How an element may be shortened when the prompt is over budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarizationRule {
    /// Never shortened and never dropped by trimming.
    PreserveFull,
    /// Truncated with an ellipsis marker.
    #[default]
    AllowCompression,
    /// Reduced to its first and last sentence.
    ExtractKeyPoints,
}

/// Scheduling metadata attached to every element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMetadata {
    /// Importance in `0.0..=1.0`; higher survives trimming longer.
    #[serde(default = "default_priority")]
    pub priority: f64,

    #[serde(default)]
    pub summarization_rule: SummarizationRule,

    /// Agents that should see this element.
    #[serde(default = "default_target_agents")]
    pub target_agents: BTreeSet<AgentRole>,

    /// Phases in which this element is relevant.
    #[serde(default = "default_relevant_phases")]
    pub relevant_phases: BTreeSet<Phase>,

    /// Explicit token count; when unset the estimator computes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_tokens: Option<usize>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,

    /// Expired elements are dropped silently during filtering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

fn default_priority() -> f64 {
    0.5
}

fn default_target_agents() -> BTreeSet<AgentRole> {
    BTreeSet::from([AgentRole::Writer])
}

fn default_relevant_phases() -> BTreeSet<Phase> {
    Phase::ALL.into_iter().collect()
}

impl Default for ContextMetadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            priority: default_priority(),
            summarization_rule: SummarizationRule::default(),
            target_agents: default_target_agents(),
            relevant_phases: default_relevant_phases(),
            estimated_tokens: None,
            created_at: now,
            updated_at: now,
            expires_at: None,
            tags: BTreeSet::new(),
        }
    }
}

impl ContextMetadata {
    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_rule(mut self, rule: SummarizationRule) -> Self {
        self.summarization_rule = rule;
        self
    }

    /// Replace the target agent set.
    pub fn for_agents(mut self, agents: impl IntoIterator<Item = AgentRole>) -> Self {
        self.target_agents = agents.into_iter().collect();
        self
    }

    /// Restrict the element to the given phases.
    pub fn in_phases(mut self, phases: impl IntoIterator<Item = Phase>) -> Self {
        self.relevant_phases = phases.into_iter().collect();
        self
    }

    pub fn with_estimated_tokens(mut self, tokens: usize) -> Self {
        self.estimated_tokens = Some(tokens);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = at;
        self
    }

    pub fn expiring_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

// ── Element ───────────────────────────────────────────────────────────────

/// One candidate unit of prompt context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextElement {
    /// Unique within its container.
    pub id: String,
    pub content: String,
    pub kind: ElementKind,
    #[serde(default)]
    pub metadata: ContextMetadata,
}

impl ContextElement {
    pub fn new(id: impl Into<String>, kind: ElementKind, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            kind,
            metadata: ContextMetadata::default(),
        }
    }

    /// Create an element with a freshly generated UUID id.
    pub fn with_generated_id(kind: ElementKind, content: impl Into<String>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), kind, content)
    }

    pub fn system_instruction(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(id, ElementKind::SystemInstruction, content)
    }

    pub fn story_fact(
        id: impl Into<String>,
        category: StoryFactKind,
        content: impl Into<String>,
    ) -> Self {
        Self::new(id, ElementKind::StoryFact { category }, content)
    }

    pub fn character(
        id: impl Into<String>,
        content: impl Into<String>,
        profile: Option<CharacterProfile>,
    ) -> Self {
        Self::new(id, ElementKind::CharacterFact { profile }, content)
    }

    pub fn user_signal(
        id: impl Into<String>,
        signal: UserSignalKind,
        content: impl Into<String>,
    ) -> Self {
        Self::new(id, ElementKind::UserSignal { signal }, content)
    }

    pub fn phase_record(
        id: impl Into<String>,
        record: PhaseRecordKind,
        content: impl Into<String>,
    ) -> Self {
        Self::new(id, ElementKind::PhaseRecord { record }, content)
    }

    pub fn conversation(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(id, ElementKind::ConversationRecord, content)
    }

    pub fn with_metadata(mut self, metadata: ContextMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn variant(&self) -> ElementVariant {
        self.kind.variant()
    }

    pub fn rule(&self) -> SummarizationRule {
        self.metadata.summarization_rule
    }

    /// The text this element contributes to a prompt. Characters with a
    /// structured profile render the profile instead of `content`; token
    /// estimates and compression both work on this text.
    pub fn prompt_text(&self) -> Cow<'_, str> {
        match &self.kind {
            ElementKind::CharacterFact {
                profile: Some(profile),
            } if profile.has_structured_fields() => Cow::Owned(profile.render()),
            _ => Cow::Borrowed(self.content.trim()),
        }
    }

    /// Replace the prompt text with `content`, dropping any structured
    /// profile so the new text is what gets rendered.
    pub fn set_prompt_text(&mut self, content: String) {
        if let ElementKind::CharacterFact { profile } = &mut self.kind {
            *profile = None;
        }
        self.content = content;
    }

    /// Check the element-local invariants: a non-empty id and a priority in range.
    pub fn validate(&self) -> Result<(), ContextError> {
        if self.id.trim().is_empty() {
            return Err(ContextError::EmptyId);
        }
        let p = self.metadata.priority;
        if !p.is_finite() || !(0.0..=1.0).contains(&p) {
            return Err(ContextError::InvalidPriority {
                id: self.id.clone(),
                priority: p,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn heuristic_counts_chars_not_bytes() {
        assert_eq!(estimate_tokens_heuristic(""), 0);
        assert_eq!(estimate_tokens_heuristic("abc"), 0);
        assert_eq!(estimate_tokens_heuristic("abcd"), 1);
        // 8 multi-byte chars → 2 tokens
        assert_eq!(estimate_tokens_heuristic("éééééééé"), 2);
    }

    #[test]
    fn prompt_text_prefers_structured_profile() {
        let profile = CharacterProfile::new("Mara")
            .with_state("soaked")
            .with_relationship("Oren", "brother");
        let mut el = ContextElement::character("mara", "  Mara, ferrywoman.  ", Some(profile));
        assert_eq!(el.prompt_text(), "Mara — State: soaked; Relationships: Oren (brother)");

        el.set_prompt_text("Mara...".into());
        assert_eq!(el.kind, ElementKind::CharacterFact { profile: None });
        assert_eq!(el.prompt_text(), "Mara...");

        let bare = ContextElement::character("oren", " Oren. ", Some(CharacterProfile::new("Oren")));
        assert_eq!(bare.prompt_text(), "Oren.");
    }

    #[test]
    fn metadata_defaults() {
        let meta = ContextMetadata::default();
        assert!((meta.priority - 0.5).abs() < f64::EPSILON);
        assert_eq!(meta.summarization_rule, SummarizationRule::AllowCompression);
        assert!(meta.target_agents.contains(&AgentRole::Writer));
        assert_eq!(meta.target_agents.len(), 1);
        assert_eq!(meta.relevant_phases.len(), Phase::ALL.len());
        assert!(meta.estimated_tokens.is_none());
    }

    #[test]
    fn expiry_is_inclusive_of_now() {
        let now = Utc::now();
        let meta = ContextMetadata::default().expiring_at(now);
        assert!(meta.is_expired(now));
        assert!(!meta.is_expired(now - Duration::seconds(1)));
    }

    #[test]
    fn out_of_range_priority_rejected() {
        let el = ContextElement::system_instruction("sys", "Be concise.")
            .with_metadata(ContextMetadata::default().with_priority(1.2));
        assert!(matches!(
            el.validate(),
            Err(ContextError::InvalidPriority { .. })
        ));

        let nan = ContextElement::system_instruction("sys", "x")
            .with_metadata(ContextMetadata::default().with_priority(f64::NAN));
        assert!(nan.validate().is_err());
    }

    #[test]
    fn blank_id_rejected() {
        let el = ContextElement::conversation("  ", "hello");
        assert_eq!(el.validate(), Err(ContextError::EmptyId));
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = ContextElement::with_generated_id(ElementKind::ConversationRecord, "a");
        let b = ContextElement::with_generated_id(ElementKind::ConversationRecord, "b");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn element_json_uses_type_tag() {
        let el = ContextElement::story_fact("world", StoryFactKind::WorldBuilding, "Two moons.");
        let json = serde_json::to_value(&el).unwrap();
        assert_eq!(json["kind"]["type"], "story_fact");
        assert_eq!(json["kind"]["category"], "world_building");
    }

    #[test]
    fn element_json_fills_metadata_defaults() {
        let json = r#"{
            "id": "mira",
            "content": "Mira is a cartographer.",
            "kind": { "type": "character_fact", "profile": { "name": "Mira", "goals": ["map the rift"] } },
            "metadata": { "priority": 0.8, "tags": ["main_cast"] }
        }"#;
        let el: ContextElement = serde_json::from_str(json).unwrap();
        assert_eq!(el.variant(), ElementVariant::CharacterFact);
        assert!((el.metadata.priority - 0.8).abs() < f64::EPSILON);
        assert!(el.metadata.has_tag("main_cast"));
        assert!(el.metadata.target_agents.contains(&AgentRole::Writer));
        match el.kind {
            ElementKind::CharacterFact { profile: Some(p) } => {
                assert_eq!(p.name, "Mira");
                assert!(p.has_structured_fields());
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }
}

//! Agent-specific prompt rendering.
//!
//! Each built-in agent has a fixed section order; every element kind is
//! routed to exactly one of its sections. Custom agents get one section per
//! element variant present. Sections render as a `[Title]` header followed
//! by one `- ` line per element, and empty sections are omitted.

use storyweave_core::{
    AgentRole, ContextElement, ElementKind, ElementVariant, PhaseRecordKind, StoryFactKind,
    UserSignalKind,
};

const WRITER_SECTIONS: &[&str] = &[
    "System Instructions",
    "Plot/Story Context",
    "Characters",
    "User Guidance",
];
const CHARACTER_SECTIONS: &[&str] = &["Character Context", "Story Background"];
const RATER_SECTIONS: &[&str] = &["Evaluation Criteria", "Story Context For Evaluation"];
const EDITOR_SECTIONS: &[&str] = &["Editorial Guidelines", "Consistency Context"];
const WORLDBUILDING_SECTIONS: &[&str] = &["Current Worldbuilding", "Story Context"];

/// A rendered prompt and the titles of the sections it contains, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormattedContext {
    pub text: String,
    pub sections: Vec<String>,
}

struct Section {
    title: String,
    lines: Vec<String>,
}

impl Section {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            lines: Vec::new(),
        }
    }

    fn render(&self) -> String {
        format!("[{}]\n{}", self.title, self.lines.join("\n"))
    }
}

/// Render `elements` (already in priority order) for `agent`.
pub fn format_for_agent(agent: &AgentRole, elements: &[ContextElement]) -> FormattedContext {
    let mut sections = match section_titles(agent) {
        Some(titles) => {
            let mut sections: Vec<Section> = titles.iter().map(|t| Section::new(*t)).collect();
            for element in elements {
                // Built-in agents always route.
                if let Some(slot) = route(agent, &element.kind) {
                    sections[slot].lines.push(render_line(element));
                }
            }
            sections
        }
        None => generic_sections(elements),
    };
    sections.retain(|s| !s.lines.is_empty());

    tracing::debug!(
        agent = %agent,
        elements = elements.len(),
        sections = sections.len(),
        "Formatted context"
    );

    FormattedContext {
        text: sections
            .iter()
            .map(Section::render)
            .collect::<Vec<_>>()
            .join("\n\n"),
        sections: sections.into_iter().map(|s| s.title).collect(),
    }
}

fn section_titles(agent: &AgentRole) -> Option<&'static [&'static str]> {
    match agent {
        AgentRole::Writer => Some(WRITER_SECTIONS),
        AgentRole::Character => Some(CHARACTER_SECTIONS),
        AgentRole::Rater => Some(RATER_SECTIONS),
        AgentRole::Editor => Some(EDITOR_SECTIONS),
        AgentRole::Worldbuilding => Some(WORLDBUILDING_SECTIONS),
        AgentRole::Custom(_) => None,
    }
}

/// Index into the agent's section list for an element kind.
fn route(agent: &AgentRole, kind: &ElementKind) -> Option<usize> {
    use ElementKind as K;

    let slot = match agent {
        AgentRole::Writer => match kind {
            K::SystemInstruction
            | K::PhaseRecord {
                record: PhaseRecordKind::Instruction,
            } => 0,
            K::StoryFact { .. }
            | K::PhaseRecord {
                record: PhaseRecordKind::Output,
            }
            | K::ConversationRecord => 1,
            K::CharacterFact { .. } => 2,
            K::UserSignal { .. } => 3,
        },
        AgentRole::Character => match kind {
            K::CharacterFact { .. } => 0,
            K::SystemInstruction
            | K::StoryFact { .. }
            | K::UserSignal { .. }
            | K::PhaseRecord { .. }
            | K::ConversationRecord => 1,
        },
        AgentRole::Rater => match kind {
            K::SystemInstruction
            | K::UserSignal {
                signal: UserSignalKind::Instruction,
            }
            | K::PhaseRecord {
                record: PhaseRecordKind::Instruction,
            } => 0,
            K::StoryFact { .. }
            | K::CharacterFact { .. }
            | K::UserSignal {
                signal: UserSignalKind::Feedback,
            }
            | K::PhaseRecord {
                record: PhaseRecordKind::Output,
            }
            | K::ConversationRecord => 1,
        },
        AgentRole::Editor => match kind {
            K::SystemInstruction
            | K::UserSignal { .. }
            | K::PhaseRecord {
                record: PhaseRecordKind::Instruction,
            } => 0,
            K::StoryFact { .. }
            | K::CharacterFact { .. }
            | K::PhaseRecord {
                record: PhaseRecordKind::Output,
            }
            | K::ConversationRecord => 1,
        },
        AgentRole::Worldbuilding => match kind {
            K::StoryFact {
                category: StoryFactKind::WorldBuilding,
            }
            | K::ConversationRecord => 0,
            K::SystemInstruction
            | K::StoryFact {
                category: StoryFactKind::Theme | StoryFactKind::Summary | StoryFactKind::PlotOutline,
            }
            | K::CharacterFact { .. }
            | K::UserSignal { .. }
            | K::PhaseRecord { .. } => 1,
        },
        AgentRole::Custom(_) => return None,
    };
    Some(slot)
}

fn generic_sections(elements: &[ContextElement]) -> Vec<Section> {
    ElementVariant::ALL
        .iter()
        .map(|variant| {
            let mut section = Section::new(variant.display_name());
            section.lines = elements
                .iter()
                .filter(|e| e.variant() == *variant)
                .map(render_line)
                .collect();
            section
        })
        .collect()
}

fn render_line(element: &ContextElement) -> String {
    format!("- {}", element.prompt_text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyweave_core::CharacterProfile;

    fn pool() -> Vec<ContextElement> {
        vec![
            ContextElement::system_instruction("sys", "Write in second person."),
            ContextElement::story_fact("world", StoryFactKind::WorldBuilding, "Vell floods each spring."),
            ContextElement::story_fact("theme", StoryFactKind::Theme, "Grief and tides."),
            ContextElement::character(
                "mara",
                "Mara is a ferrywoman.",
                Some(
                    CharacterProfile::new("Mara")
                        .with_state("exhausted")
                        .with_goal("find her brother")
                        .with_goal("keep the ferry")
                        .with_trait("stubborn")
                        .with_relationship("Oren", "brother"),
                ),
            ),
            ContextElement::user_signal("fb", UserSignalKind::Feedback, "Slow the pacing."),
            ContextElement::user_signal("ask", UserSignalKind::Instruction, "Score dialogue harshly."),
            ContextElement::phase_record("out", PhaseRecordKind::Output, "Chapter one draft."),
            ContextElement::phase_record("rule", PhaseRecordKind::Instruction, "Keep chapters short."),
            ContextElement::conversation("chat", "User: more storms please"),
        ]
    }

    #[test]
    fn writer_section_order() {
        let out = format_for_agent(&AgentRole::Writer, &pool());
        assert_eq!(out.sections, WRITER_SECTIONS);
        let sys = out.text.find("[System Instructions]").unwrap();
        let plot = out.text.find("[Plot/Story Context]").unwrap();
        let chars = out.text.find("[Characters]").unwrap();
        let guidance = out.text.find("[User Guidance]").unwrap();
        assert!(sys < plot && plot < chars && chars < guidance);
        assert!(out.text.contains("[System Instructions]\n- Write in second person.\n- Keep chapters short."));
    }

    #[test]
    fn character_renders_structured_line() {
        let out = format_for_agent(&AgentRole::Character, &pool());
        assert_eq!(out.sections, CHARACTER_SECTIONS);
        assert!(out.text.contains(
            "- Mara — State: exhausted; Goals: find her brother, keep the ferry; \
             Traits: stubborn; Relationships: Oren (brother)"
        ));
        assert!(!out.text.contains("Mara is a ferrywoman."));
    }

    #[test]
    fn character_without_profile_uses_content() {
        let elements = vec![
            ContextElement::character("a", "Oren keeps the lighthouse.", None),
            ContextElement::character("b", "Ilse hums.", Some(CharacterProfile::new("Ilse"))),
        ];
        let out = format_for_agent(&AgentRole::Writer, &elements);
        assert_eq!(out.text, "[Characters]\n- Oren keeps the lighthouse.\n- Ilse hums.");
    }

    #[test]
    fn rater_splits_instructions_from_story() {
        let out = format_for_agent(&AgentRole::Rater, &pool());
        assert_eq!(out.sections, RATER_SECTIONS);
        let (criteria, story) = out.text.split_once("\n\n").unwrap();
        assert!(criteria.contains("Score dialogue harshly."));
        assert!(criteria.contains("Keep chapters short."));
        assert!(story.contains("Slow the pacing."));
        assert!(story.contains("Chapter one draft."));
    }

    #[test]
    fn editor_and_worldbuilding_layouts() {
        let editor = format_for_agent(&AgentRole::Editor, &pool());
        assert_eq!(editor.sections, EDITOR_SECTIONS);

        let world = format_for_agent(&AgentRole::Worldbuilding, &pool());
        assert_eq!(world.sections, WORLDBUILDING_SECTIONS);
        let (current, _) = world.text.split_once("\n\n").unwrap();
        assert!(current.contains("Vell floods each spring."));
        assert!(!current.contains("Grief and tides."));
    }

    #[test]
    fn empty_sections_omitted() {
        let elements = vec![ContextElement::user_signal("fb", UserSignalKind::Feedback, "Shorter.")];
        let out = format_for_agent(&AgentRole::Writer, &elements);
        assert_eq!(out.sections, vec!["User Guidance"]);
        assert_eq!(out.text, "[User Guidance]\n- Shorter.");
    }

    #[test]
    fn custom_agent_gets_generic_sections() {
        let agent = AgentRole::from("narrator");
        let out = format_for_agent(&agent, &pool());
        let expected: Vec<&str> = ElementVariant::ALL.iter().map(|v| v.display_name()).collect();
        assert_eq!(out.sections, expected);
    }

    #[test]
    fn no_elements_no_text() {
        let out = format_for_agent(&AgentRole::Editor, &[]);
        assert!(out.text.is_empty());
        assert!(out.sections.is_empty());
    }
}

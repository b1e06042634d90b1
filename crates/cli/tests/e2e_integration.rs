//! End-to-end tests across the Storyweave crates.
//!
//! These exercise the path a story service takes per agent call: load
//! configuration, reserve layer budget from the shared allocator, and
//! assemble the prompt within whatever budget was granted.

use std::sync::Arc;

use chrono::Utc;
use storyweave_allocator::LayerTokenAllocator;
use storyweave_config::{AllocatorConfig, EngineConfig};
use storyweave_context::{
    CompressionOutcome, ContextAssembler, TokenEstimator, compress, filter,
};
use storyweave_core::{
    AgentRole, AllocationRequest, CharacterProfile, ContextContainer, ContextElement,
    ContextError, ContextMetadata, CustomFilters, MemoryLayer, OverflowStrategy, Phase,
    ProcessingConfig, StoryFactKind, SummarizationRule, UserSignalKind,
};

// ── Fixtures ─────────────────────────────────────────────────────────────

const CONTAINER_JSON: &str = r#"{
  "version": "1.0",
  "metadata": { "story_id": "drowned-city", "chapter": 3 },
  "elements": [
    { "id": "e1", "content": "The city of Vell sinks a hand's width every winter.",
      "kind": { "type": "story_fact", "category": "world_building" },
      "metadata": { "priority": 0.9, "estimated_tokens": 10 } },
    { "id": "e2", "content": "Chapter two ended with Mara losing the ferry to the tide.",
      "kind": { "type": "story_fact", "category": "summary" },
      "metadata": { "priority": 0.8, "estimated_tokens": 15 } },
    { "id": "e3", "content": "Oren keeps the lighthouse and refuses to leave.",
      "kind": { "type": "character_fact" },
      "metadata": { "priority": 0.7, "estimated_tokens": 12 } },
    { "id": "e4", "content": "Readers want more of the harbor master.",
      "kind": { "type": "user_signal", "signal": "feedback" },
      "metadata": { "priority": 0.6, "estimated_tokens": 8 } },
    { "id": "e5", "content": "User: what happened to the bells?",
      "kind": { "type": "conversation_record" },
      "metadata": { "priority": 0.5, "estimated_tokens": 10 } }
  ]
}"#;

fn load_container() -> ContextContainer {
    ContextContainer::from_json(CONTAINER_JSON).unwrap()
}

fn sized(id: &str, tokens: usize, priority: f64) -> ContextElement {
    ContextElement::story_fact(id, StoryFactKind::Summary, "~".repeat(tokens * 4)).with_metadata(
        ContextMetadata::default()
            .with_priority(priority)
            .with_estimated_tokens(tokens),
    )
}

// ── Concrete scenarios ───────────────────────────────────────────────────

#[test]
fn over_budget_container_keeps_only_high_priority() {
    let container = load_container();
    assert_eq!(container.estimated_tokens(), 55);

    let config = ProcessingConfig::for_agent(AgentRole::Writer).with_max_tokens(30);
    let out = ContextAssembler::default().assemble(&container, &config).unwrap();

    assert!(out.metadata.was_summarized);
    assert!(out.metadata.total_tokens <= 30);
    assert!(out.elements.iter().all(|e| e.metadata.priority >= 0.7));
    assert_eq!(out.metadata.original_element_count, 5);
    assert_eq!(out.metadata.filtered_element_count, 5);
    assert_eq!(out.metadata.final_element_count, out.elements.len());
}

#[tokio::test]
async fn reject_strategy_names_overflow() {
    let allocator = LayerTokenAllocator::new(
        AllocatorConfig::new(1000, 100).with_strategy(OverflowStrategy::Reject),
    )
    .unwrap();
    let result = allocator
        .allocate(AllocationRequest::new(MemoryLayer::Episodic, 2000))
        .await;
    assert!(!result.success);
    assert!(result.error_message.unwrap().contains("overflow"));
}

#[tokio::test]
async fn truncate_strategy_grants_available() {
    let allocator = LayerTokenAllocator::new(
        AllocatorConfig::new(1000, 100).with_strategy(OverflowStrategy::Truncate),
    )
    .unwrap();
    let result = allocator
        .allocate(AllocationRequest::new(MemoryLayer::Episodic, 2000))
        .await;
    assert!(result.success);
    assert!(result.truncated);
    assert_eq!(result.granted_tokens, 900);
}

#[test]
fn required_tag_filter_selects_one() {
    let container = ContextContainer::from_elements(vec![
        sized("a", 5, 0.5),
        sized("b", 5, 0.5).with_metadata(ContextMetadata::default().with_tag("important")),
        sized("c", 5, 0.5),
    ])
    .unwrap();
    let config = ProcessingConfig::for_agent(AgentRole::Writer)
        .with_filters(CustomFilters::default().require_tag("important"));

    let selected = filter::select(container.elements(), &config, Utc::now());
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].id, "b");
}

#[test]
fn preserve_full_survives_compression() {
    let element = sized("canon", 50, 0.9).with_metadata(
        ContextMetadata::default()
            .with_rule(SummarizationRule::PreserveFull)
            .with_estimated_tokens(50),
    );
    let out = compress(&element, 10, &TokenEstimator::heuristic());
    assert_eq!(out.outcome, CompressionOutcome::Unchanged);
    assert_eq!(out.element.content, element.content);
    assert_eq!(out.element.metadata.estimated_tokens, Some(50));
}

// ── Cross-crate flows ────────────────────────────────────────────────────

#[test]
fn unbounded_config_keeps_long_character_profiles_whole() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[assembly]\nmax_tokens = 0\n").unwrap();
    let config = EngineConfig::load_from(&path).unwrap();

    let goal = "outlast the flood ".repeat(40);
    let container = ContextContainer::from_elements(vec![ContextElement::character(
        "mara",
        "Mara.",
        Some(CharacterProfile::new("Mara").with_goal(goal.trim())),
    )])
    .unwrap();
    let est = TokenEstimator::heuristic();

    let unbounded = ContextAssembler::default()
        .assemble(&container, &config.assembly.processing_config(AgentRole::Writer))
        .unwrap();
    assert_eq!(unbounded.metadata.max_tokens, None);
    assert!(!unbounded.metadata.was_summarized);
    assert!(unbounded.text.contains("Goals: outlast the flood"));
    assert_eq!(unbounded.metadata.total_tokens, est.total_tokens(container.elements()));

    let bounded = ContextAssembler::default()
        .assemble(
            &container,
            &ProcessingConfig::for_agent(AgentRole::Writer).with_max_tokens(100),
        )
        .unwrap();
    let rendered: usize = bounded
        .text
        .lines()
        .filter_map(|line| line.strip_prefix("- "))
        .map(|line| est.estimate(line))
        .sum();
    assert!(rendered <= 100, "rendered {rendered} tokens");
}

#[tokio::test]
async fn allocator_grant_bounds_assembly() {
    let config: EngineConfig = toml_config(
        r#"
[allocator]
max_tokens = 400
buffer_tokens = 100
overflow_strategy = "truncate"

[assembly]
max_tokens = 2000
"#,
    );
    let allocator = Arc::new(LayerTokenAllocator::new(config.allocator.clone()).unwrap());

    // Working memory takes most of the pool; episodic gets what is left.
    allocator
        .allocate(AllocationRequest::new(MemoryLayer::Working, 270).with_priority(6))
        .await;
    let grant = allocator
        .allocate(AllocationRequest::new(MemoryLayer::Episodic, 200).with_priority(4))
        .await;
    assert!(grant.truncated);
    assert_eq!(grant.granted_tokens, 30);

    let mut processing = config.assembly.processing_config(AgentRole::Writer);
    processing.max_tokens = Some(grant.granted_tokens);

    let out = ContextAssembler::default()
        .assemble(&load_container(), &processing)
        .unwrap();
    assert!(out.metadata.total_tokens <= grant.granted_tokens);
    assert_eq!(out.metadata.max_tokens, Some(30));
}

#[test]
fn config_file_drives_assembly_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[assembly]\nmax_tokens = 30\nsummarization_threshold = 0.5\nprioritize_recent = false\n",
    )
    .unwrap();
    let config = EngineConfig::load_from(&path).unwrap();

    let processing = config.assembly.processing_config(AgentRole::Writer);
    let out = ContextAssembler::default()
        .assemble(&load_container(), &processing)
        .unwrap();
    assert!(out.metadata.total_tokens <= 30);
    assert!(out.metadata.was_summarized);
}

#[test]
fn duplicate_ids_rejected_on_load() {
    let json = r#"{ "elements": [
        { "id": "x", "content": "one", "kind": { "type": "system_instruction" } },
        { "id": "x", "content": "two", "kind": { "type": "system_instruction" } }
    ] }"#;
    let err = serde_json::from_str::<ContextContainer>(json).unwrap_err();
    assert!(err.to_string().contains("x"));

    let err = ContextContainer::from_elements(vec![
        ContextElement::conversation("dup", "a"),
        ContextElement::conversation("dup", "b"),
    ])
    .unwrap_err();
    assert_eq!(err, ContextError::DuplicateId("dup".into()));
}

#[test]
fn each_agent_sees_its_own_prompt() {
    let everyone = [
        AgentRole::Writer,
        AgentRole::Character,
        AgentRole::Rater,
        AgentRole::Editor,
        AgentRole::Worldbuilding,
    ];
    let container = ContextContainer::from_elements(vec![
        ContextElement::system_instruction("sys", "Keep the tone melancholy.")
            .with_metadata(ContextMetadata::default().for_agents(everyone.clone())),
        ContextElement::character(
            "mara",
            "Mara, ferrywoman.",
            Some(CharacterProfile::new("Mara").with_state("soaked").with_trait("stubborn")),
        )
        .with_metadata(ContextMetadata::default().for_agents(everyone.clone())),
        ContextElement::user_signal("fb", UserSignalKind::Instruction, "Grade pacing strictly.")
            .with_metadata(
                ContextMetadata::default()
                    .for_agents([AgentRole::Rater])
                    .in_phases([Phase::Evaluation]),
            ),
    ])
    .unwrap();
    let assembler = ContextAssembler::default();

    let writer = assembler
        .assemble(&container, &ProcessingConfig::for_agent(AgentRole::Writer))
        .unwrap();
    assert!(writer.text.starts_with("[System Instructions]"));
    assert!(writer.text.contains("- Mara — State: soaked; Traits: stubborn"));
    assert!(!writer.text.contains("Grade pacing"));

    let rater = assembler
        .assemble(
            &container,
            &ProcessingConfig::for_agent(AgentRole::Rater).in_phase(Phase::Evaluation),
        )
        .unwrap();
    assert_eq!(
        rater.metadata.sections,
        vec!["Evaluation Criteria", "Story Context For Evaluation"]
    );
    assert!(rater.text.contains("Grade pacing strictly."));

    let character = assembler
        .assemble(&container, &ProcessingConfig::for_agent(AgentRole::Character))
        .unwrap();
    assert!(character.text.starts_with("[Character Context]"));
}

#[tokio::test]
async fn parallel_assembly_is_deterministic() {
    let assembler = Arc::new(ContextAssembler::default());
    let container = Arc::new(
        ContextContainer::from_elements(
            (0..30).map(|i| sized(&format!("s{i}"), 3 + i % 7, (i % 10) as f64 / 10.0)),
        )
        .unwrap(),
    );
    let now = Utc::now();
    let config = ProcessingConfig::for_agent(AgentRole::Writer).with_max_tokens(60);

    let tasks = (0..16).map(|_| {
        let assembler = Arc::clone(&assembler);
        let container = Arc::clone(&container);
        let config = config.clone();
        tokio::spawn(async move { assembler.assemble_at(&container, &config, now).unwrap() })
    });
    let outputs: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let first = &outputs[0];
    assert!(first.metadata.total_tokens <= 60);
    for out in &outputs[1..] {
        assert_eq!(out.text, first.text);
        assert_eq!(out.metadata, first.metadata);
    }
}

#[tokio::test]
async fn shared_allocator_conserves_under_contention() {
    let allocator = Arc::new(
        LayerTokenAllocator::new(
            AllocatorConfig::new(5000, 1000).with_strategy(OverflowStrategy::Borrow),
        )
        .unwrap(),
    );

    let tasks = (0..40).map(|i| {
        let allocator = Arc::clone(&allocator);
        tokio::spawn(async move {
            let layer = MemoryLayer::ALL[i % 4];
            let result = allocator
                .allocate(AllocationRequest::new(layer, 150).with_priority(1 + (i % 10) as u8))
                .await;
            if i % 3 == 0 {
                allocator.release(layer, 50).await;
            }
            result
        })
    });
    for result in futures::future::join_all(tasks).await {
        assert!(result.unwrap().success);
    }

    let usage = allocator.layer_usage().await;
    let allocated: usize = usage.values().map(|u| u.allocated).sum();
    let borrowed: usize = usage.values().map(|u| u.borrowed).sum();
    assert!(allocated <= allocator.available() + borrowed);
    assert_eq!(allocator.stats().await.total_requests, 40);
}

fn toml_config(raw: &str) -> EngineConfig {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, raw).unwrap();
    EngineConfig::load_from(&path).unwrap()
}

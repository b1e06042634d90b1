//! `storyweave assemble` — Build an agent prompt from a container file.

use std::path::Path;
use storyweave_config::EngineConfig;
use storyweave_context::{ContextAssembler, TokenEstimator};
use storyweave_core::{AgentRole, ContextContainer, Phase, ProcessingConfig};
#[cfg(not(feature = "hf-tokenizer"))]
use storyweave_core::TokenizerError;

pub async fn run(
    config: &EngineConfig,
    container_path: &Path,
    agent: &str,
    phase: Option<&str>,
    max_tokens: Option<usize>,
    tokenizer: Option<&Path>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let raw = tokio::fs::read_to_string(container_path)
        .await
        .map_err(|e| format!("Failed to read {}: {e}", container_path.display()))?;
    let container = ContextContainer::from_json(&raw)
        .map_err(|e| format!("Invalid container {}: {e}", container_path.display()))?;

    let processing = processing_config(config, agent, phase, max_tokens)?;
    let assembler = ContextAssembler::new(build_estimator(tokenizer)?);
    let assembled = assembler.assemble(&container, &processing)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&assembled.metadata)?);
        return Ok(());
    }

    println!("{}", assembled.text);

    let meta = &assembled.metadata;
    eprintln!();
    eprintln!("📋 Assembly summary");
    eprintln!("─────────────────────────────────────");
    eprintln!("  Agent:      {}", meta.target_agent);
    if let Some(phase) = meta.current_phase {
        eprintln!("  Phase:      {phase}");
    }
    eprintln!(
        "  Elements:   {} → {} → {}",
        meta.original_element_count, meta.filtered_element_count, meta.final_element_count
    );
    match meta.max_tokens {
        Some(max) => eprintln!("  Tokens:     {} / {max}", meta.total_tokens),
        None => eprintln!("  Tokens:     {} (unbounded)", meta.total_tokens),
    }
    if meta.was_summarized {
        eprintln!(
            "  Budget:     {} compressed, {} dropped",
            meta.compressed_ids.len(),
            meta.dropped_ids.len()
        );
    }
    if meta.preserved_over_budget {
        eprintln!("  ⚠️  Preserved elements alone exceed the token budget");
    }

    Ok(())
}

/// Config defaults for `agent`, with the command-line overrides applied.
fn processing_config(
    config: &EngineConfig,
    agent: &str,
    phase: Option<&str>,
    max_tokens: Option<usize>,
) -> storyweave_core::Result<ProcessingConfig> {
    let mut processing = config.assembly.processing_config(AgentRole::from(agent));
    if let Some(phase) = phase {
        processing = processing.in_phase(phase.parse::<Phase>()?);
    }
    if max_tokens.is_some() {
        processing.max_tokens = max_tokens;
    }
    processing.validate()?;
    Ok(processing)
}

fn build_estimator(tokenizer: Option<&Path>) -> storyweave_core::Result<TokenEstimator> {
    match tokenizer {
        None => Ok(TokenEstimator::heuristic()),
        #[cfg(feature = "hf-tokenizer")]
        Some(path) => {
            let tokenizer = storyweave_context::HfTokenizer::from_file(path)?;
            Ok(TokenEstimator::with_tokenizer(std::sync::Arc::new(tokenizer)))
        }
        #[cfg(not(feature = "hf-tokenizer"))]
        Some(_) => Err(TokenizerError::LoadFailed(
            "--tokenizer requires building with the `hf-tokenizer` feature".into(),
        )
        .into()),
    }
}

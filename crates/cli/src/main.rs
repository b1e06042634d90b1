//! Storyweave CLI — diagnostics for the context budgeting engine.
//!
//! Commands:
//! - `assemble` — Build an agent prompt from a container file
//! - `allocate` — Simulate layer token allocations
//! - `config`   — Show, locate or validate the configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "storyweave",
    about = "Storyweave — context budgeting for multi-agent story writing",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of ~/.storyweave/config.toml
    #[arg(long, global = true, env = "STORYWEAVE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble the prompt for one agent from a JSON context container
    Assemble {
        /// Path to the container JSON file
        #[arg(short, long)]
        container: PathBuf,

        /// Target agent (writer, character, rater, editor, worldbuilding or any custom name)
        #[arg(short, long, default_value = "writer")]
        agent: String,

        /// Current workflow phase (e.g. chapter_writing)
        #[arg(short, long)]
        phase: Option<String>,

        /// Override the prompt token ceiling
        #[arg(long)]
        max_tokens: Option<usize>,

        /// Path to a tokenizer.json for exact token counts
        #[arg(long)]
        tokenizer: Option<PathBuf>,

        /// Print assembly metadata as JSON instead of the prompt
        #[arg(long)]
        json: bool,
    },

    /// Run a batch of concurrent allocation requests against the configured allocator
    Allocate {
        /// Memory layer (working, episodic, semantic, long_term)
        #[arg(short, long)]
        layer: String,

        /// Tokens per request
        #[arg(short, long)]
        tokens: usize,

        /// Request priority, 1 (lowest) to 10 (highest)
        #[arg(short, long, default_value_t = 5)]
        priority: u8,

        /// Number of identical requests to issue
        #[arg(short, long, default_value_t = 1)]
        repeat: usize,

        /// Override the configured overflow strategy
        #[arg(long)]
        strategy: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the default config file location
    Path,
    /// Load and validate the configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let loaded = commands::load_config(cli.config.as_deref())?;
    commands::init_tracing(cli.verbose, &loaded.config.logging);
    loaded.log_source();
    let config = loaded.config;

    match cli.command {
        Commands::Assemble {
            container,
            agent,
            phase,
            max_tokens,
            tokenizer,
            json,
        } => {
            commands::assemble::run(
                &config,
                &container,
                &agent,
                phase.as_deref(),
                max_tokens,
                tokenizer.as_deref(),
                json,
            )
            .await?
        }
        Commands::Allocate {
            layer,
            tokens,
            priority,
            repeat,
            strategy,
        } => {
            commands::allocate::run(&config, &layer, tokens, priority, repeat, strategy.as_deref())
                .await?
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(&config).await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Validate => commands::config_cmd::validate(&config).await?,
        },
    }

    Ok(())
}

//! `storyweave allocate` — Simulate allocations against the configured ledger.

use std::sync::Arc;
use storyweave_allocator::LayerTokenAllocator;
use storyweave_config::EngineConfig;
use storyweave_core::{AllocationRequest, MemoryLayer, OverflowStrategy};

pub async fn run(
    config: &EngineConfig,
    layer: &str,
    tokens: usize,
    priority: u8,
    repeat: usize,
    strategy: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let layer: MemoryLayer = layer.parse()?;

    let mut allocator_config = config.allocator.clone();
    if let Some(strategy) = strategy {
        allocator_config.overflow_strategy = strategy.parse::<OverflowStrategy>()?;
    }
    let allocator = Arc::new(LayerTokenAllocator::new(allocator_config)?);

    let requests = (0..repeat.max(1)).map(|_| {
        let allocator = Arc::clone(&allocator);
        let request = AllocationRequest::new(layer, tokens).with_priority(priority);
        async move { allocator.allocate(request).await }
    });
    let results = futures::future::join_all(requests).await;

    println!(
        "🧮 Allocating {tokens} tokens × {} on {layer} (strategy: {})",
        results.len(),
        allocator.config().overflow_strategy
    );
    println!("─────────────────────────────────────");
    for (i, result) in results.iter().enumerate() {
        let status = match (result.success, result.truncated, result.borrowed_tokens) {
            (false, _, _) => "❌ rejected",
            (true, true, _) => "✂️  truncated",
            (true, false, b) if b > 0 => "🔁 borrowed",
            _ => "✅ granted",
        };
        print!("  #{:<3} {status:<14} {:>6} tokens", i + 1, result.granted_tokens);
        if result.borrowed_tokens > 0 {
            print!(" ({} borrowed)", result.borrowed_tokens);
        }
        if let Some(message) = &result.error_message {
            print!(" — {message}");
        }
        println!();
    }

    let stats = allocator.stats().await;
    println!();
    println!("  Available:  {}", allocator.available());
    println!("  Remaining:  {}", allocator.remaining().await);
    println!(
        "  Requests:   {} total, {} successful ({:.0}%)",
        stats.total_requests,
        stats.successful_requests,
        stats.success_rate() * 100.0
    );
    println!("  Granted:    {}", stats.tokens_granted);
    if stats.tokens_borrowed > 0 {
        println!("  Borrowed:   {}", stats.tokens_borrowed);
    }

    Ok(())
}

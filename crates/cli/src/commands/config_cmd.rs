//! `storyweave config` — Configuration management commands.

use storyweave_config::EngineConfig;

pub async fn show(config: &EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", config.to_toml()?);
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", EngineConfig::default_path().display());
    Ok(())
}

/// The config was already loaded and validated at startup; this reports
/// what it resolved to.
pub async fn validate(config: &EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    println!("🔍 Validating configuration...");
    println!("   ✅ Config parsed successfully");

    let allocator = &config.allocator;
    println!();
    println!(
        "   Pool:       {} tokens ({} buffer, {} available)",
        allocator.max_tokens,
        allocator.buffer_tokens,
        allocator.available()
    );
    println!("   Mode:       {:?}", allocator.allocation_mode);
    println!("   Overflow:   {}", allocator.overflow_strategy);
    for (layer, cap) in allocator.layer_caps()? {
        println!("   Cap:        {layer} ≤ {cap}");
    }
    match config.assembly.max_tokens {
        Some(max) => println!("   Prompt:     {max} tokens"),
        None => println!("   Prompt:     unbounded"),
    }
    println!("   Logging:    {}", config.logging.level);
    Ok(())
}

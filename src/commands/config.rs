//! Config command handler.

use crmsync::config::CrmSyncConfig;
use crmsync::services::IndexWeights;

/// Config command.
pub fn cmd_config(config: &CrmSyncConfig, show: bool) -> anyhow::Result<()> {
    if !show {
        println!("Use --show to display configuration");
        return Ok(());
    }

    println!("Current Configuration");
    println!("=====================");
    println!();

    println!("Window:");
    println!("  Max Size: {}", config.window.max_size);
    println!("  Overshoot: {}", config.window.overshoot);
    println!("  Page Size: {}", config.window.page_size);
    println!();

    println!("Scroll:");
    println!("  Threshold: {} items", config.scroll.threshold);
    println!("  Item Height: {}px", config.scroll.item_height_px);
    println!("  Viewport Items: {}", config.scroll.viewport_items);
    println!();

    println!("Logging:");
    println!(
        "  Format: {}",
        config.logging.format.as_deref().unwrap_or("pretty")
    );
    println!(
        "  Level: {}",
        config.logging.level.as_deref().unwrap_or("(default)")
    );
    match &config.logging.file {
        Some(path) => println!("  File: {}", path.display()),
        None => println!("  File: (stderr)"),
    }
    println!();

    let weights = IndexWeights::standard();
    println!("Similarity Weights (fixed):");
    for index in ["email", "phone", "name"] {
        println!("  {index}: {:.1}", weights.weight(index)?);
    }

    Ok(())
}

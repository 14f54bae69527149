use anyhow::Result;

use gazette_core::AppConfig;

pub fn run(config: &AppConfig) -> Result<()> {
    let sources = config.source_descriptors()?;

    if sources.is_empty() {
        println!("No sources configured.");
        println!("\nAdd [[sources]] entries to {}", AppConfig::config_path().display());
        return Ok(());
    }

    println!("Sources ({}):\n", sources.len());
    for source in &sources {
        println!("  {}", source.name);
        println!("    URL: {}", source.feed_url);
    }

    Ok(())
}

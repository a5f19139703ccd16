// src/cli/init.rs — Write a starter config file

use std::path::Path;

use crate::infra::config::Config;
use crate::infra::paths;

/// Create the config and data directories and write a default config.
pub async fn run_init(config_path: &Path, force: bool) -> anyhow::Result<()> {
    println!("genbot setup");
    println!();

    eprint!("  Creating directories... ");
    paths::ensure_dirs().await?;
    if let Some(parent) = config_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    eprintln!("done");

    if config_path.exists() && !force {
        println!("  Config: {} (already exists)", config_path.display());
    } else {
        eprint!("  Writing default config... ");
        tokio::fs::write(config_path, default_config_toml()?).await?;
        eprintln!("done");
        println!("  Config: {}", config_path.display());
    }

    println!();
    println!("Next steps:");
    println!("  1. Set telegram.token in the config file");
    println!("  2. Enable backends under [backends.*]");
    println!("  3. genbot check-config");
    println!("  4. genbot run");

    Ok(())
}

pub fn default_config_toml() -> anyhow::Result<String> {
    Ok(toml::to_string_pretty(&Config::default())?)
}

// src/cli/check.rs — Validate configuration and print a summary

use crate::backend::Backends;
use crate::infra::config::Config;
use crate::session::BackendKind;

pub fn run_check(config: &Config) -> anyhow::Result<()> {
    config.validate()?;
    let backends = Backends::from_config(config)?;

    println!("Configuration OK");
    println!();
    println!(
        "  Telegram token:  {}",
        if config.telegram.token.is_empty() {
            "missing"
        } else {
            "set"
        }
    );
    println!(
        "  Queue:           capacity {}, {} workers, overload at {}",
        config.queue.capacity,
        config.queue.workers,
        config.queue.overload_threshold()
    );
    println!("  Backends:");
    for kind in BackendKind::ALL {
        let state = if backends.for_kind(kind).is_some() {
            "enabled"
        } else {
            "disabled"
        };
        println!(
            "    {:<12} {:<9} limit {} job(s), timeout {}s",
            kind.label(),
            state,
            config.limits.for_kind(kind),
            config.backends.timeout_for(kind).as_secs()
        );
    }
    println!("  Stats file:      {}", config.stats.path().display());
    println!("  Blocklist file:  {}", config.blocklist.path().display());
    match &config.log.file {
        Some(path) => println!("  Log file:        {}", path.display()),
        None => println!("  Log file:        stderr"),
    }

    Ok(())
}

//! tally-replay: deterministic replay of reward engine scripts.
//!
//! Loads an engine configuration (TOML) and an event script (JSON), applies
//! every event against a fresh booster, controller and staking vault, and
//! prints a JSON report to stdout.
//!
//! Usage:
//!   tally-replay [--config engine.toml] script.json
//!
//! Without `--config`, the `TALLY_CONFIG` environment variable is consulted;
//! with neither, built-in defaults apply.

mod config;
mod engine;
mod script;

use std::path::PathBuf;

use anyhow::Context;
use tracing::info;

use crate::config::EngineConfig;
use crate::engine::Engine;

struct Args {
    config: Option<PathBuf>,
    script: PathBuf,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut config = None;
    let mut script = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().context("--config needs a path")?;
                config = Some(PathBuf::from(path));
            }
            other if other.starts_with('-') => anyhow::bail!("unknown flag {other}"),
            other => script = Some(PathBuf::from(other)),
        }
    }
    Ok(Args {
        config,
        script: script.context("usage: tally-replay [--config engine.toml] script.json")?,
    })
}

fn main() -> anyhow::Result<()> {
    let args = parse_args()?;
    let config = EngineConfig::load(args.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("tally={}", config.advanced.log_level).parse()?),
        )
        .init();

    let text = std::fs::read_to_string(&args.script)
        .with_context(|| format!("reading {}", args.script.display()))?;
    let script = script::parse(&text).context("parsing script")?;
    info!(events = script.events.len(), "tally-replay starting");

    let pretty = config.advanced.pretty_report;
    let mut engine = Engine::new(config, script.admin)?;
    engine.run(&script)?;
    let report = engine.report();

    let json = if pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{json}");
    Ok(())
}

//! Gridsync - run collaborative spreadsheet sessions from a script

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use gridsync_core::{Session, parse_script};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "gridsync", version)]
#[command(about = "Run a collaborative spreadsheet session script")]
struct Args {
    /// Session script to run
    script: PathBuf,

    /// Write `show` output to a markdown file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Deliver pending writes after every step
    #[arg(long)]
    auto_sync: bool,

    /// Config file (default: <config dir>/gridsync/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `gridsync_core=debug`
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let (config, warnings) = config::load_config(args.config.as_deref());
    setup_tracing(args.log_level.as_deref().unwrap_or(&config.log.level));
    for warning in warnings {
        warn!("{}", warning);
    }

    let mut options = config.session_options();
    options.auto_sync |= args.auto_sync;

    let content = std::fs::read_to_string(&args.script)
        .with_context(|| format!("Failed to read {}", args.script.display()))?;
    let steps = parse_script(&content)?;
    info!(steps = steps.len(), auto_sync = options.auto_sync, "running session");

    let output = Session::new(options).run(&steps)?;
    let rendered = output.join("\n");

    if let Some(path) = args.output {
        let document = format!("# Session\n\n{}", rendered);
        std::fs::write(&path, document)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Exported to {}", path.display());
    } else if !rendered.is_empty() {
        print!("{}", rendered);
    }
    Ok(())
}

fn setup_tracing(filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

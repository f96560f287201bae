//! Command-line front end: runs one prompt through a Claude CLI session and
//! prints every output line, then the files the CLI modified.

use anyhow::Context;
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::time::Duration;

use claude_session::{CancellationToken, SessionConfig, SessionError, SessionManager};

#[derive(Parser, Debug)]
#[command(name = "claude-session", version, about = "Run a prompt through a long-lived Claude CLI session")]
struct Args {
    /// Prompt to send
    #[arg(required = true)]
    prompt: Vec<String>,

    /// Working directory for the CLI (defaults to the current directory)
    #[arg(long, env = "CLAUDE_SESSION_CWD")]
    cwd: Option<PathBuf>,

    /// Config file (defaults to <config dir>/claude-session/config.toml)
    #[arg(long, env = "CLAUDE_SESSION_CONFIG")]
    config: Option<PathBuf>,

    /// Executable to launch instead of `claude`
    #[arg(long, env = "CLAUDE_SESSION_COMMAND")]
    command: Option<String>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    claude_session::logging::init(args.verbose);

    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SessionConfig::load_default()?,
    };
    if let Some(command) = args.command {
        config = config.with_command(command);
    }
    if let Some(secs) = args.timeout_secs {
        config = config.with_request_timeout(Duration::from_secs(secs));
    }
    config.validate()?;

    let manager = SessionManager::new(config);
    let cancel = CancellationToken::new();

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, cancelling run");
            ctrl_c.cancel();
        }
    });

    let prompt = args.prompt.join(" ");
    let result = manager
        .run(
            &prompt,
            args.cwd.as_deref(),
            |line| {
                println!("{}", line);
                Ok(())
            },
            cancel,
        )
        .await;

    match &result {
        Ok(outcome) => info!(
            "Run {} finished in {:.1}s ({} lines)",
            outcome.run_id,
            outcome.duration.as_secs_f64(),
            outcome.lines
        ),
        Err(SessionError::Cancelled) => println!("[Canceled]"),
        Err(e @ SessionError::Timeout(_)) => println!("[Timeout]: {}", e),
        Err(e) => println!("[Error]: {}", e),
    }

    let modified = manager.resolved_modified_files();
    if modified.is_empty() {
        println!("No files modified");
    } else {
        println!("Modified files:");
        for path in &modified {
            println!("  {}", path.display());
        }
    }

    manager.dispose().await;

    match result {
        Ok(_) | Err(SessionError::Cancelled) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

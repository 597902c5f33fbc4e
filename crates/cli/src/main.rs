//! marionette - stdio host for the remote-value protocol
//!
//! Reads one script per line on stdin, executes each against a single
//! session, and writes report frames to stdout. Logs go to stderr so the
//! frame stream stays clean; filter with `RUST_LOG`.

use std::io::{BufRead, Write};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use marionette_engine::{FnSink, Session};
use marionette_protocol::Value;
use marionette_script_host::ScriptConfig;

#[derive(Debug, Parser)]
#[command(name = "marionette", version, about = "Run remote-authored scripts against a handle table")]
struct Args {
    /// Name the capability surface is bound to inside scripts
    #[arg(long, default_value = "_w")]
    bound_name: String,

    /// Evaluation step budget per script
    #[arg(long, default_value_t = 100_000)]
    max_steps: u64,

    /// Extension bag entry as KEY=JSON; repeatable
    #[arg(long = "extension", value_name = "KEY=JSON")]
    extensions: Vec<String>,

    /// Silence logs below the error level, overriding RUST_LOG
    #[arg(long)]
    quiet: bool,
}

fn log_filter(quiet: bool) -> EnvFilter {
    if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::from_default_env()
    }
}

fn parse_extension(raw: &str) -> Result<(String, Value)> {
    let Some((key, json)) = raw.split_once('=') else {
        bail!("extension `{raw}` is not KEY=JSON");
    };
    let value: Value = serde_json::from_str(json)
        .with_context(|| format!("extension `{key}` has invalid JSON"))?;
    Ok((key.to_string(), value))
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(args.quiet))
        .with_writer(std::io::stderr)
        .init();

    let config = ScriptConfig {
        bound_name: args.bound_name,
        max_steps: args.max_steps,
        ..ScriptConfig::default()
    };

    let mut session = Session::with_config(
        FnSink(|frame: &str| {
            let mut out = std::io::stdout().lock();
            if writeln!(out, "{frame}").is_err() {
                tracing::warn!("stdout gone; dropping report frame");
            }
        }),
        config,
    );
    for raw in &args.extensions {
        let (key, value) = parse_extension(raw)?;
        session = session.extension(key, value);
    }

    // Stdout is ready from the start; this still exercises the
    // queued-then-flushed path for anything sent during setup.
    session
        .channel_open()
        .context("failed to open the outbound channel")?;

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        // Failures are already logged and isolated per message.
        let _ = session.handle_incoming(&line);
    }

    tracing::debug!(handles = session.handle_count(), "input closed, shutting down");
    Ok(())
}

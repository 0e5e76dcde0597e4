//! Mender CLI - binary entry point.
//!
//! Three front ends over one [`Session`]:
//!
//! ```text
//! mender tool <name> --input <json>     one dispatch, ToolResult JSON on stdout
//! mender session                        JSON lines in, ToolResult JSON lines out
//! mender apply <file> <edits-file>      one file's SEARCH/REPLACE text
//! ```
//!
//! Logs never go to stdout, which carries only JSON.

mod session_loop;

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mender_config::MenderConfig;
use mender_tools::{Session, SessionSettings};
use mender_types::ToolResult;
use serde_json::{Value, json};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Parser)]
#[command(name = "mender", version, about = "Apply SEARCH/REPLACE edits and run sandboxed tools")]
struct Cli {
    /// Directory tool paths are resolved against.
    #[arg(short = 'C', long, global = true)]
    working_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Dispatch a single tool call.
    Tool {
        name: String,
        /// Tool input as inline JSON.
        #[arg(long, conflicts_with = "input_file")]
        input: Option<String>,
        /// Read tool input JSON from a file.
        #[arg(long)]
        input_file: Option<PathBuf>,
    },
    /// Read `{"name", "input"}` lines from stdin and answer each one.
    Session,
    /// Apply the SEARCH/REPLACE blocks in `edits` to `file`.
    Apply { file: String, edits: PathBuf },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // No writable log file: stderr keeps stdout clean for JSON.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.mender/logs/mender.log
    if let Some(config_path) = MenderConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("mender.log"));
    }

    candidates.push(PathBuf::from(".mender").join("logs").join("mender.log"));
    candidates
}

fn load_settings() -> SessionSettings {
    match MenderConfig::load() {
        Ok(Some(config)) => config.session_settings(),
        Ok(None) => SessionSettings::default(),
        Err(err) => {
            tracing::warn!(path = %err.path().display(), "Using default settings: {err}");
            SessionSettings::default()
        }
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_tool_input(input: Option<String>, input_file: Option<PathBuf>) -> Result<Value> {
    let raw = match (input, input_file) {
        (Some(inline), _) => inline,
        (None, Some(path)) => fs::read_to_string(&path)
            .with_context(|| format!("reading tool input from {}", path.display()))?,
        (None, None) => return Ok(json!({})),
    };
    serde_json::from_str(&raw).context("tool input is not valid JSON")
}

const fn exit_code(is_error: bool) -> ExitCode {
    if is_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn run_tool(session: &Session, name: &str, input: &Value) -> Result<ExitCode> {
    let result = session.dispatch(name, input).await;
    print_json(&result)?;
    Ok(exit_code(result.is_error))
}

async fn run_apply(session: &Session, file: String, edits: PathBuf) -> Result<ExitCode> {
    let instructions = fs::read_to_string(&edits)
        .with_context(|| format!("reading edits from {}", edits.display()))?;
    let input = json!({"files": {"path": file, "instructions": instructions}});
    let result: ToolResult = session.dispatch("edit_and_apply_multiple", &input).await;

    if let Some(console) = &result.console_output {
        eprintln!("{console}");
    }
    match result.content.get(0) {
        Some(outcome) => print_json(outcome)?,
        None => print_json(&result)?,
    }
    Ok(exit_code(result.is_error))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing();

    let working_dir = match cli.working_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("resolving the current directory")?,
    };
    let session = Session::new(working_dir, load_settings())?;

    match cli.command {
        Command::Tool {
            name,
            input,
            input_file,
        } => {
            let input = read_tool_input(input, input_file)?;
            run_tool(&session, &name, &input).await
        }
        Command::Session => {
            session_loop::run(&session, tokio::io::stdin(), tokio::io::stdout()).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Apply { file, edits } => run_apply(&session, file, edits).await,
    }
}

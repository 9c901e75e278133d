//! Offline front-end for spaniel over captured accessibility tree snapshots.
//!
//! Every command loads a desktop snapshot (JSON, as written by `spaniel dump
//! --format json`) into the in-memory provider and works against it with all
//! delays zeroed.
//!
//! # Usage
//!
//! ```bash
//! # Print the tree
//! spaniel -d desktop.json dump
//!
//! # Print only the subtree a search path leads to
//! spaniel -d desktop.json dump '.application("gedit").window("Untitled")'
//!
//! # List every push button
//! spaniel -d desktop.json find --role "push button"
//!
//! # Resolve a path and print the absolute path of the node it finds
//! spaniel -d desktop.json path '.application("gedit").button("OK")'
//!
//! # Run a script, saving the resulting tree
//! spaniel -d desktop.json run test.spaniel --save after.json
//!
//! # Turn a JSONL input log into a script
//! spaniel -d desktop.json record-convert input.jsonl
//!
//! # Shell completions
//! spaniel completions bash > /etc/bash_completion.d/spaniel
//! ```

mod convert;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde_json::json;
use spaniel_core::config::Config;
use spaniel_core::dump::{dump, snapshot};
use spaniel_core::engine::Engine;
use spaniel_core::error::SpanielError;
use spaniel_core::logging;
use spaniel_core::memory::{MemoryDesktop, RecordingInput};
use spaniel_core::node::Node;
use spaniel_core::predicate::{GenericPredicate, Predicate};
use spaniel_core::root::Root;
use spaniel_core::script::{parse_search_path, ScriptError, ScriptRunner};
use spaniel_core::search::FindOptions;
use tracing::info;

use crate::convert::EventLogConverter;

/// Offline front-end for spaniel accessibility tree snapshots and scripts.
#[derive(Parser)]
#[command(name = "spaniel")]
#[command(about = "Inspect accessibility tree snapshots and run spaniel scripts against them")]
#[command(version)]
struct Cli {
    /// Desktop snapshot to load
    #[arg(short, long, env = "SPANIEL_DESKTOP")]
    desktop: Option<PathBuf>,

    /// Config file (defaults to ~/.spaniel/config.json)
    #[arg(short, long, env = "SPANIEL_CONFIG")]
    config: Option<PathBuf>,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Print the tree, or the subtree a search path leads to
    Dump {
        /// Search path in script syntax, e.g. '.application("gedit")'
        path: Option<String>,
    },

    /// List the nodes matching a predicate
    Find {
        /// Node name
        #[arg(short, long)]
        name: Option<String>,
        /// Role name, e.g. "push button"
        #[arg(short, long)]
        role: Option<String>,
        /// Node description
        #[arg(long)]
        description: Option<String>,
        /// Name of the node's label
        #[arg(short, long)]
        label: Option<String>,
        /// Only search direct children of the root
        #[arg(long)]
        shallow: bool,
        /// Also list nodes that are not showing
        #[arg(long)]
        all: bool,
    },

    /// Resolve a search path and print the absolute path of the node found
    Path {
        /// Search path in script syntax
        path: String,
    },

    /// Run a script against the snapshot
    Run {
        /// Script file
        script: PathBuf,
        /// Write the resulting tree to this file as JSON
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Convert a JSONL input event log into a script
    RecordConvert {
        /// Path to the JSONL log file (reads from stdin if omitted)
        log: Option<PathBuf>,
    },

    /// Print shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = load_config(&cli);
    let _guard = logging::init(&config, "warn");

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

#[derive(Debug)]
enum CliError {
    Usage(String),
    Load(String),
    Failed(SpanielError),
    Script(ScriptError),
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Failed(_) => ExitCode::from(1),
            CliError::Usage(_) => ExitCode::from(2),
            CliError::Load(_) => ExitCode::from(4),
            CliError::Script(e) => ExitCode::from(e.exit_code() as u8),
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Usage(msg) => write!(f, "{}", msg),
            CliError::Load(msg) => write!(f, "Load error: {}", msg),
            CliError::Failed(e) => write!(f, "{}", e),
            CliError::Script(e) => write!(f, "Script error: {}", e),
        }
    }
}

impl From<SpanielError> for CliError {
    fn from(e: SpanielError) -> Self {
        CliError::Failed(e)
    }
}

impl From<ScriptError> for CliError {
    fn from(e: ScriptError) -> Self {
        CliError::Script(e)
    }
}

fn load_config(cli: &Cli) -> Config {
    match &cli.config {
        Some(path) => Config::load_from(path).unwrap_or_else(|e| {
            eprintln!("Warning: ignoring {}: {}", path.display(), e);
            Config::default()
        }),
        None => Config::load(),
    }
}

/// `config` adjusted for working against a snapshot: nothing is animated,
/// so every delay is zeroed and a search gets a single attempt.
pub(crate) fn offline_config(mut config: Config) -> Config {
    config.default_delay = 0.0;
    config.action_delay = 0.0;
    config.typing_delay = 0.0;
    config.double_click_delay = 0.0;
    config.search_backoff_duration = 0.0;
    config.search_cutoff_count = 1;
    config.check_for_a11y = false;
    config
}

fn load_desktop(cli: &Cli) -> Result<MemoryDesktop, CliError> {
    let path = cli.desktop.as_ref().ok_or_else(|| {
        CliError::Usage("no desktop snapshot given (use --desktop or SPANIEL_DESKTOP)".to_string())
    })?;
    MemoryDesktop::load(path).map_err(|e| CliError::Load(format!("{}: {}", path.display(), e)))
}

async fn open(cli: &Cli, config: &Config) -> Result<(MemoryDesktop, Root), CliError> {
    let desktop = load_desktop(cli)?;
    let engine = Engine::with_config(
        Arc::new(desktop.clone()),
        Arc::new(RecordingInput::new()),
        offline_config(config.clone()),
    );
    let root = engine.root().await?;
    Ok((desktop, root))
}

async fn resolve(root: &Root, text: &str) -> Result<Node, CliError> {
    let path = parse_search_path(text)?;
    Ok(root.apply_search_path(&path).await?)
}

async fn describe(node: &Node) -> Result<serde_json::Value, CliError> {
    let path = node.absolute_search_path().await?;
    Ok(json!({
        "name": node.name().await?,
        "role": node.role_name().await?,
        "description": node.description().await?,
        "path": path.make_script_method_call(),
    }))
}

async fn run(cli: Cli, config: Config) -> Result<(), CliError> {
    match &cli.command {
        Command::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(*shell, &mut command, "spaniel", &mut io::stdout());
            Ok(())
        }
        Command::Dump { path } => {
            let (_, root) = open(&cli, &config).await?;
            let node = match path {
                Some(text) => resolve(&root, text).await?,
                None => root.node().clone(),
            };
            match cli.format {
                OutputFormat::Text => print!("{}", dump(&node).await?),
                OutputFormat::Json => println!("{}", snapshot(&node).await?.to_json()?),
            }
            Ok(())
        }
        Command::Find {
            name,
            role,
            description,
            label,
            shallow,
            all,
        } => {
            let mut predicate = GenericPredicate::new();
            if let Some(name) = name {
                predicate = predicate.name(name.as_str());
            }
            if let Some(role) = role {
                predicate = predicate.role_name(role.as_str());
            }
            if let Some(description) = description {
                predicate = predicate.description(description.as_str());
            }
            if let Some(label) = label {
                predicate = predicate.label(label.as_str());
            }
            if predicate.is_empty() {
                return Err(CliError::Usage(
                    "find needs at least one of --name, --role, --description, --label".to_string(),
                ));
            }
            let (_, root) = open(&cli, &config).await?;
            let options = FindOptions::default()
                .recursive(!shallow)
                .showing_only(!all);
            let found = root
                .find_children_with(&Predicate::Generic(predicate), options)
                .await?;
            info!(count = found.len(), "find finished");
            match cli.format {
                OutputFormat::Text => {
                    for node in &found {
                        println!("{}", node.log_string().await);
                    }
                }
                OutputFormat::Json => {
                    let mut nodes = Vec::with_capacity(found.len());
                    for node in &found {
                        nodes.push(describe(node).await?);
                    }
                    println!("{}", json!(nodes));
                }
            }
            Ok(())
        }
        Command::Path { path } => {
            let (_, root) = open(&cli, &config).await?;
            let node = resolve(&root, path).await?;
            match cli.format {
                OutputFormat::Text => {
                    let absolute = node.absolute_search_path().await?;
                    println!("{}", node.log_string().await);
                    println!("{}", absolute.make_script_method_call());
                }
                OutputFormat::Json => println!("{}", describe(&node).await?),
            }
            Ok(())
        }
        Command::Run { script, save } => {
            let source = std::fs::read_to_string(script)
                .map_err(|e| CliError::Load(format!("{}: {}", script.display(), e)))?;
            let (desktop, root) = open(&cli, &config).await?;
            let mut runner = ScriptRunner::new(root.clone());
            runner.run_source(&source).await?;
            for (id, action) in desktop.invocations() {
                println!("{} {}", action, id);
            }
            if let Some(out) = save {
                let json = snapshot(root.node()).await?.to_json()?;
                std::fs::write(out, json)
                    .map_err(|e| CliError::Load(format!("{}: {}", out.display(), e)))?;
            }
            Ok(())
        }
        Command::RecordConvert { log } => {
            let converter = EventLogConverter::new(load_desktop(&cli)?, offline_config(config));
            let script = match log {
                Some(path) => converter.convert_file(path).await?,
                None => converter.convert_stdin().await?,
            };
            print!("{}", script);
            Ok(())
        }
    }
}

mod config;
mod llm;
mod sandbox;
mod tutor;

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::sandbox::SafeCodeExecutor;
use crate::tutor::{Catalog, ConsoleParser, InMemoryStore, LearnerEvent, Tutor, TutorRuntime};

/// Capacity of the console → runtime and runtime → console channels.
const CHANNEL_CAPACITY: usize = 32;

fn print_help() {
    println!(
        "\
codementor v{}

A programming tutor: runs your Python in a sandbox and answers with a
question, a hint, a review or a concept explanation.

USAGE:
    codementor [OPTIONS] [CONFIG_PATH]

ARGUMENTS:
    CONFIG_PATH    Path to TOML configuration file [default: config/tutor.toml]

OPTIONS:
    -h, --help       Print this help message and exit
    -V, --version    Print version and exit

ENVIRONMENT VARIABLES:
    Variables are referenced in the config file via ${{VAR_NAME}} syntax.

    RUST_LOG              Log level filter for tracing
                          (e.g. debug, codementor=debug,warn)
    ANTHROPIC_API_KEY     API key for Anthropic Claude models
                          (from https://console.anthropic.com/)

CONSOLE:
    Type a question, or submit code between /code and /end.
    /help lists all commands.

EXAMPLES:
    codementor                           # uses config/tutor.toml
    codementor ~/tutor.toml              # custom config path
    RUST_LOG=debug codementor            # with debug logging",
        env!("CARGO_PKG_VERSION"),
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --help / --version before anything else
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("codementor v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {}
        }
    }

    // Logs go to stderr, the transcript stays on stdout
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("codementor=info")),
        )
        .init();

    println!(
        r#"
   ____          _      __  __            _
  / ___|___   __| | ___|  \/  | ___ _ __ | |_ ___  _ __
 | |   / _ \ / _` |/ _ \ |\/| |/ _ \ '_ \| __/ _ \| '__|
 | |__| (_) | (_| |  __/ |  | |  __/ | | | || (_) | |
  \____\___/ \__,_|\___|_|  |_|\___|_| |_|\__\___/|_|   v{}
"#,
        env!("CARGO_PKG_VERSION")
    );

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/tutor.toml".to_string());

    info!("Loading configuration from {config_path}");
    let config = Config::load(&config_path).map_err(|e| {
        error!("Cannot load {config_path}: {e:#}");
        e
    })?;

    info!("Tutor: {}", config.tutor.name);
    info!("LLM: {}", config.llm.description());
    info!(
        "Sandbox: {} ({}s timeout, {} MiB, {} builtins)",
        config.sandbox.interpreter,
        config.sandbox.timeout_secs,
        config.sandbox.memory_limit_mb,
        config.sandbox.allowed_builtins.len()
    );

    let llm = llm::create_client(&config.llm)?;
    let executor = SafeCodeExecutor::new(config.sandbox.clone());
    if !executor.is_available().await {
        warn!(
            "Interpreter '{}' not found, every submission will fail",
            config.sandbox.interpreter
        );
    }

    let catalog = Catalog::with_custom(&config.problems);
    info!("Problems: {} available", catalog.problems().len());

    let tutor = Tutor::new(
        llm,
        Arc::new(executor),
        Arc::new(InMemoryStore::new()),
        config.tutor.max_history,
    );
    let runtime = TutorRuntime::new(
        config.tutor.name.clone(),
        tutor,
        catalog,
        config.tutor.problem.clone(),
    );

    let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (reply_tx, mut reply_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);

    tokio::spawn(read_console(event_tx));
    let printer = tokio::spawn(async move {
        while let Some(reply) = reply_rx.recv().await {
            println!("{reply}\n");
        }
    });

    tokio::select! {
        result = runtime.run(event_rx, reply_tx) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, exiting");
            return Ok(());
        }
    }

    // Runtime finished (end of input): let the last replies print
    let _ = printer.await;
    Ok(())
}

/// Reads stdin line by line and forwards parsed events to the runtime.
/// An open code block is submitted when input ends.
async fn read_console(event_tx: mpsc::Sender<LearnerEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut parser = ConsoleParser::new();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(event) = parser.feed(&line) {
                    if event_tx.send(event).await.is_err() {
                        break;
                    }
                }
            }
            Ok(None) => {
                if let Some(event) = parser.finish() {
                    let _ = event_tx.send(event).await;
                }
                info!("End of input");
                break;
            }
            Err(e) => {
                error!("Failed to read console input: {e}");
                break;
            }
        }
    }
}

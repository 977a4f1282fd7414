//! Parla CLI - language tutor in the terminal.

#![allow(clippy::print_stdout)] // CLI program intentionally uses stdout

use clap::{Args, Parser, Subcommand};
use parla::prelude::{Level as TutorLevel, Tutor};
use parla_bot::error::{BotError, Result};
use parla_bot::prelude::*;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Parla - practice a language by chatting with a tutor
#[derive(Parser)]
#[command(name = "parla-bot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long, env = "PARLA_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init(InitArgs),

    /// Start an interactive tutoring session
    Chat(ChatArgs),

    /// Show configuration and environment status
    Status,

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for the init command
#[derive(Args)]
struct InitArgs {
    /// Force overwrite existing configuration
    #[arg(short, long)]
    force: bool,
}

/// Arguments for the chat command
#[derive(Args)]
struct ChatArgs {
    /// Conversation topic (overrides config)
    #[arg(short, long)]
    topic: Option<String>,

    /// Learner level: beginner, intermediate or advanced
    #[arg(short, long)]
    level: Option<TutorLevel>,

    /// Target language (overrides config)
    #[arg(short = 'L', long)]
    language: Option<String>,

    /// Model to use (overrides config)
    #[arg(short = 'M', long)]
    model: Option<String>,

    /// Session id (random when omitted)
    #[arg(short, long)]
    session: Option<String>,

    /// First message to send before reading stdin
    #[arg(short, long)]
    message: Option<String>,

    /// Use the built-in offline tutor instead of a backend
    #[arg(long)]
    offline: bool,

    /// Print a summary after each turn
    #[arg(long)]
    summary: bool,

    /// Hide evaluations of your messages
    #[arg(long)]
    no_feedback: bool,
}

/// Arguments for the config command
#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Show configuration file path
    Path,
    /// Validate configuration
    Validate,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("failed to create tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging with the given verbosity level.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "parla_bot={level},parla={level},{}",
            if verbosity >= 3 { "debug" } else { "warn" }
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let config_file = cli.config.unwrap_or_else(config_path);
    match cli.command {
        Commands::Init(args) => cmd_init(args, config_file).await,
        Commands::Chat(args) => cmd_chat(args, config_file).await,
        Commands::Status => cmd_status(config_file).await,
        Commands::Config(args) => cmd_config(args, config_file).await,
    }
}

/// Initialize configuration.
async fn cmd_init(args: InitArgs, config_file: PathBuf) -> Result<()> {
    if config_file.exists() && !args.force {
        println!("Configuration already exists at: {}", config_file.display());
        println!("Use --force to overwrite.");
        return Ok(());
    }

    init_config(&config_file)
        .await
        .context("failed to initialize config")?;

    println!("Configuration created: {}", config_file.display());
    println!();
    println!("Next steps:");
    println!("  1. export OPENAI_API_KEY=<key>");
    println!("  2. parla-bot chat --topic travel --level beginner");

    Ok(())
}

/// Start interactive chat.
async fn cmd_chat(args: ChatArgs, config_file: PathBuf) -> Result<()> {
    let mut config = load_config(&config_file)
        .await
        .context("failed to load config")?;

    if let Some(topic) = args.topic {
        config.tutor.topic = topic;
    }
    if let Some(level) = args.level {
        config.tutor.level = level;
    }
    if let Some(language) = args.language {
        config.tutor.language = language;
    }
    if let Some(model) = args.model {
        config.tutor.model = model;
    }

    let issues = config.validate();
    for issue in issues.iter().filter(|i| !args.offline || i.field != "provider.api_key") {
        tracing::warn!("{issue}");
    }
    if has_errors(&issues) {
        return Err(BotError::config("configuration has errors; see 'parla-bot config validate'"));
    }

    let tutor = if args.offline {
        Tutor::new(offline_client())
    } else {
        Tutor::new(Arc::new(config.build_client()?))
    };

    let options = ChatOptions {
        show_summary: args.summary,
        show_evaluations: !args.no_feedback,
    };
    let mut repl = ChatRepl::new(tutor, config.tutor.to_agent_config(), args.session, options).await;
    tracing::info!(session_id = %repl.session_id().await, offline = args.offline, "Chat started");

    if let Some(message) = args.message {
        println!("you> {message}");
        repl.turn(&message).await?;
        println!();
    }

    repl.run().await
}

/// Show status.
async fn cmd_status(config_file: PathBuf) -> Result<()> {
    println!("Parla Status\n");

    println!("Configuration:");
    println!("  Path:   {}", config_file.display());
    println!(
        "  Exists: {}",
        if config_file.exists() { "yes" } else { "no" }
    );

    match load_config(&config_file).await {
        Ok(config) => {
            let errors = has_errors(&config.validate());
            println!("  Valid:  {}", if errors { "no" } else { "yes" });
            println!();
            println!("Tutor:");
            println!("  Topic:    {}", config.tutor.topic);
            println!("  Level:    {}", config.tutor.level);
            println!("  Language: {}", config.tutor.language);
            println!("  Model:    {}", config.tutor.model);
            println!("  Window:   {} turns", config.tutor.history_window);
            println!();
            println!("Provider:");
            println!("  Base URL: {}", config.provider.base_url);
        }
        Err(e) => {
            println!("  Valid:  no ({e})");
        }
    }

    println!();
    println!("Environment:");
    print_env_status("OPENAI_API_KEY");
    print_env_status("OPENAI_BASE_URL");
    print_env_status("PARLA_MODEL");
    print_env_status("PARLA_CONFIG");

    Ok(())
}

/// Configuration management.
async fn cmd_config(args: ConfigArgs, config_file: PathBuf) -> Result<()> {
    match args.command {
        ConfigCommands::Path => {
            println!("{}", config_file.display());
        }
        ConfigCommands::Show => {
            if config_file.exists() {
                let content = tokio::fs::read_to_string(&config_file)
                    .await
                    .context("failed to read config")?;
                println!("{content}");
            } else {
                println!("Configuration file does not exist.");
                println!("Run 'parla-bot init' to create one.");
            }
        }
        ConfigCommands::Validate => {
            if !config_file.exists() {
                println!("note: configuration file does not exist; checking defaults");
            }

            let mut config = match read_config(&config_file).await {
                Ok(config) => config,
                Err(ConfigError::Io(_)) => BotConfig::default(),
                Err(e) => {
                    println!("error: {e}");
                    return Ok(());
                }
            };
            config.apply_env();

            let issues = config.validate();
            for issue in &issues {
                println!("{issue}");
            }
            if issues.is_empty() {
                println!("Configuration is valid");
            }
        }
    }

    Ok(())
}

/// Print environment variable status.
fn print_env_status(name: &str) {
    let status = if std::env::var(name).is_ok() {
        "set"
    } else {
        "-"
    };
    println!("  {name}: {status}");
}

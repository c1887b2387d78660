use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sqlquorum::cli::commands::{self, ask::AskOptions};

/// Parse output format from string
fn parse_format(s: &str) -> Result<String, String> {
    match s.to_lowercase().as_str() {
        f @ ("text" | "json") => Ok(f.to_string()),
        _ => Err(format!("Invalid format '{}'. Valid values: text, json", s)),
    }
}

#[derive(Parser)]
#[command(name = "sqlquorum")]
#[command(
    version,
    about = "Natural-language questions to SQL, decided by candidate consensus"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question about the database
    Ask {
        #[arg(help = "Question in natural language")]
        question: String,
        #[arg(long, short, help = "Conversation thread id (generated when omitted)")]
        thread: Option<String>,
        #[arg(long, help = "SQLite database to query (overrides database.path)")]
        db: Option<PathBuf>,
        #[arg(short = 'f', long, default_value = "text", value_parser = parse_format, help = "Output format: text, json")]
        format: String,
    },

    /// Answer the follow-up question of a paused turn
    Resume {
        #[arg(help = "Thread id printed with the follow-up question")]
        thread: String,
        #[arg(help = "Reply to the follow-up question")]
        reply: String,
        #[arg(short = 'f', long, default_value = "text", value_parser = parse_format, help = "Output format: text, json")]
        format: String,
    },

    /// Drop a paused turn
    Discard {
        #[arg(help = "Thread id", required_unless_present = "list")]
        thread: Option<String>,
        #[arg(long, help = "List paused turns instead")]
        list: bool,
        #[arg(short = 'f', long, default_value = "text", value_parser = parse_format, help = "Output format for --list: text, json")]
        format: String,
    },

    /// Check provider health and database reachability
    Check {
        #[arg(long, help = "SQLite database to check")]
        db: Option<PathBuf>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(short = 'g', long, help = "Show global config file only")]
        global: bool,
        #[arg(
            short = 'f',
            long,
            default_value = "toml",
            help = "Output format: toml, json, yaml"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Write a default project configuration
    Init {
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31msqlquorum encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Backtrace when RUST_BACKTRACE=1
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns false when the command ran but its outcome was a failure
fn run_cli() -> anyhow::Result<bool> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let ok = match cli.command {
        Commands::Ask {
            question,
            thread,
            db,
            format,
        } => {
            let outcome = commands::ask::run(AskOptions {
                question,
                thread,
                database: db,
                format,
                quiet: cli.quiet,
            })?;
            !matches!(outcome, sqlquorum::TurnOutcome::Failure { .. })
        }
        Commands::Resume {
            thread,
            reply,
            format,
        } => {
            let outcome = commands::resume::run(&thread, &reply, &format, cli.quiet)?;
            !matches!(outcome, sqlquorum::TurnOutcome::Failure { .. })
        }
        Commands::Discard {
            thread,
            list,
            format,
        } => {
            match thread {
                Some(thread) if !list => commands::discard::run(&thread)?,
                _ => commands::discard::list(&format)?,
            }
            true
        }
        Commands::Check { db } => commands::check::run(db)?,
        Commands::Config { action } => {
            match action {
                ConfigAction::Show { global, format } => {
                    commands::config::show(global, &format)?;
                }
                ConfigAction::Path => {
                    commands::config::path()?;
                }
                ConfigAction::Init { force } => {
                    commands::config::init_project(force)?;
                }
            }
            true
        }
    };

    Ok(ok)
}

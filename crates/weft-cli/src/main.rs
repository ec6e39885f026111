//! Weft CLI — drive multi-role workflows from the command line.
//!
//! Thin wrapper over weft-core: runs the built-in graphs, resumes
//! interrupted threads with an approval decision, and inspects
//! checkpoint history.

mod commands;

use clap::{Parser, Subcommand};

/// Weft CLI — workflow orchestration engine
#[derive(Parser)]
#[command(name = "weft", version, about = "Weft — workflow orchestration engine")]
struct Cli {
    /// Path to the SQLite checkpoint database
    #[arg(long, env = "WEFT_DB_PATH", default_value = "weft.db")]
    db: String,

    /// Directory holding skill source files
    #[arg(long, env = "WEFT_SKILLS_DIR")]
    skills_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow until it completes or suspends for approval
    Run {
        /// Thread ID for the run (checkpoints are keyed by it)
        #[arg(long, default_value = "default")]
        thread: String,
        /// Use the orchestrated (plan-routed) graph instead of the
        /// fixed review loop
        #[arg(long)]
        orchestrated: bool,
    },

    /// Resume an interrupted thread with an approval decision
    Resume {
        /// Thread ID to resume
        #[arg(long, default_value = "default")]
        thread: String,
        /// Approve the pending action
        #[arg(long, conflicts_with = "deny")]
        approve: bool,
        /// Deny the pending action
        #[arg(long)]
        deny: bool,
        /// Use the orchestrated graph (must match the original run)
        #[arg(long)]
        orchestrated: bool,
    },

    /// Show the latest checkpoint for a thread
    Status {
        #[arg(long, default_value = "default")]
        thread: String,
    },

    /// List the full checkpoint history for a thread
    History {
        #[arg(long, default_value = "default")]
        thread: String,
    },

    /// Delete all checkpoints for a thread
    Purge {
        #[arg(long, default_value = "default")]
        thread: String,
    },

    /// Manage skills
    Skill {
        #[command(subcommand)]
        action: SkillAction,
    },
}

#[derive(Subcommand)]
enum SkillAction {
    /// List registered skills and their versions
    List,
    /// Reload a skill from its source file
    Reload {
        /// Skill name
        name: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weft_core=warn,weft_cli=info".into()),
        )
        .init();

    let result = match cli.command {
        Commands::Run {
            thread,
            orchestrated,
        } => commands::run::invoke(&cli.db, cli.skills_dir.as_deref(), &thread, orchestrated).await,

        Commands::Resume {
            thread,
            approve,
            deny,
            orchestrated,
        } => {
            if !approve && !deny {
                eprintln!("Resume requires --approve or --deny.");
                std::process::exit(2);
            }
            commands::run::resume(&cli.db, cli.skills_dir.as_deref(), &thread, approve, orchestrated)
                .await
        }

        Commands::Status { thread } => commands::inspect::status(&cli.db, &thread).await,
        Commands::History { thread } => commands::inspect::history(&cli.db, &thread).await,
        Commands::Purge { thread } => commands::inspect::purge(&cli.db, &thread).await,

        Commands::Skill { action } => match action {
            SkillAction::List => commands::skill::list(cli.skills_dir.as_deref()),
            SkillAction::Reload { name } => commands::skill::reload(cli.skills_dir.as_deref(), &name),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        if e.is_retryable() {
            eprintln!("The thread can be retried by re-running the same command.");
        }
        std::process::exit(1);
    }
}

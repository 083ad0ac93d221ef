mod commands;

use anyhow::Result;
use arena_common::types::Language;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "arena-cli")]
#[command(about = "Arena CLI - Synthesize harnesses, reconcile output and run solutions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the harness program generated for a solution
    Synth {
        /// Problem document (JSON)
        #[arg(short, long)]
        problem: PathBuf,

        /// Target language (python, java, cpp, javascript)
        #[arg(short, long)]
        language: Language,

        /// File holding the user's solution
        #[arg(short, long)]
        source: PathBuf,

        /// Include hidden test cases, as a submission would
        #[arg(long, default_value = "false")]
        all: bool,

        /// Write the program here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Turn captured console output into per-case results
    Reconcile {
        /// Problem document (JSON)
        #[arg(short, long)]
        problem: PathBuf,

        /// File holding the program's stdout
        #[arg(long)]
        stdout: PathBuf,

        /// Include hidden test cases, as a submission would
        #[arg(long, default_value = "false")]
        all: bool,

        /// Trust only markers stamped with this token (printed by `synth -o`)
        #[arg(long)]
        run_token: Option<String>,

        /// Total sandbox time in milliseconds
        #[arg(long, default_value = "0")]
        time_ms: f64,

        /// Peak sandbox memory in KB
        #[arg(long, default_value = "0")]
        memory_kb: u64,
    },

    /// Show the inferred type and detected signature of input literals
    Infer {
        /// Literals to classify (use \n for multi-line input)
        #[arg(required = true)]
        literals: Vec<String>,

        /// Declared signature, e.g. "int[] twoSum(int[] nums, int target)"
        #[arg(short, long)]
        declared: Option<String>,
    },

    /// Execute a solution in the sandbox configured through the environment
    Run {
        /// Problem document (JSON)
        #[arg(short, long)]
        problem: PathBuf,

        /// Target language (python, java, cpp, javascript)
        #[arg(short, long)]
        language: Language,

        /// File holding the user's solution
        #[arg(short, long)]
        source: PathBuf,

        /// Evaluate every case instead of the public ones
        #[arg(long, default_value = "false")]
        submit: bool,

        /// User recorded on an accepted submission
        #[arg(short, long, default_value = "cli")]
        user_id: String,
    },

    /// List configured languages
    Languages {
        /// Language config path
        #[arg(short, long, default_value = "config/languages.json")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Synth {
            problem,
            language,
            source,
            all,
            output,
        } => {
            commands::synth(&problem, language, &source, all, output.as_deref())?;
        }
        Commands::Reconcile {
            problem,
            stdout,
            all,
            run_token,
            time_ms,
            memory_kb,
        } => {
            commands::reconcile(&problem, &stdout, all, run_token.as_deref(), time_ms, memory_kb)?;
        }
        Commands::Infer { literals, declared } => {
            commands::infer(&literals, declared.as_deref())?;
        }
        Commands::Run {
            problem,
            language,
            source,
            submit,
            user_id,
        } => {
            commands::run(&problem, language, &source, submit, &user_id).await?;
        }
        Commands::Languages { config } => {
            commands::list_languages(&config)?;
        }
    }

    Ok(())
}

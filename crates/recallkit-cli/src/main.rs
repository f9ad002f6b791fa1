//! recallkit CLI: word lists, validation and scoring of recall trials.

use std::path::PathBuf;
use std::process;

use clap::{ArgGroup, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "recallkit", version, about = "Verbal recall test scoring")]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter config and word bank
    Init,

    /// Draw a word list from the word bank
    Generate {
        /// Number of words
        #[arg(long, default_value = "10")]
        count: usize,

        /// Words that must not be drawn (comma-separated)
        #[arg(long)]
        exclude: Option<String>,

        /// Word bank file, overriding the config
        #[arg(long)]
        word_bank: Option<PathBuf>,

        /// Seed for a reproducible draw
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Check a word list or a transcription for problems
    #[command(group(ArgGroup::new("input").required(true).args(["word_list", "transcription"])))]
    Validate {
        /// Newline-separated word list
        #[arg(long)]
        word_list: Option<PathBuf>,

        /// Transcription file or directory
        #[arg(long)]
        transcription: Option<PathBuf>,

        /// Learning cycles in the trial, overriding the config
        #[arg(long)]
        learning_cycles: Option<u8>,
    },

    /// Score a transcription against word lists on disk
    Score {
        /// Target word list
        #[arg(long)]
        targets: PathBuf,

        /// Transcription file or directory
        #[arg(long)]
        transcription: PathBuf,

        /// Interference word list
        #[arg(long)]
        interference: Option<PathBuf>,

        /// Matching strategy: independent, exclusive
        #[arg(long)]
        strategy: Option<String>,

        /// Output format: table, json, markdown
        #[arg(long, default_value = "table")]
        format: String,

        /// Also save the score as JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Score every completed trial in the data directory
    Batch {
        /// Data directory, overriding the config
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Rescore trials that already have a score
        #[arg(long)]
        force: bool,

        /// Max trials scored concurrently
        #[arg(long)]
        parallelism: Option<usize>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("recallkit=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Commands::Init => commands::init::execute(),
        Commands::Generate {
            count,
            exclude,
            word_bank,
            seed,
        } => commands::generate::execute(count, exclude, word_bank, seed, config),
        Commands::Validate {
            word_list,
            transcription,
            learning_cycles,
        } => commands::validate::execute(word_list, transcription, learning_cycles, config),
        Commands::Score {
            targets,
            transcription,
            interference,
            strategy,
            format,
            output,
        } => commands::score::execute(
            targets,
            transcription,
            interference,
            strategy,
            format,
            output,
            config,
        ),
        Commands::Batch {
            data_dir,
            force,
            parallelism,
        } => commands::batch::execute(data_dir, force, parallelism, config).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

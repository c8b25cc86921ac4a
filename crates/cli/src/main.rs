mod builtin;
mod command;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "codeindex", version)]
#[command(about = "Incremental symbol index for source trees")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// More log output (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which directories need (re)indexing and why
    Plan {
        /// Project root
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Bring the index up to date
    Index {
        /// Project root
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Compilation database providing per-file compiler flags
        #[arg(long)]
        compile_commands: Option<PathBuf>,
    },
    /// Fuzzy search symbol names
    Search {
        /// Query, optionally prefixed by a kind: `func parse`, `struct Conf`
        query: String,

        /// Project root
        #[arg(short, long, default_value = ".")]
        path: PathBuf,

        /// Maximum number of results (0 = all)
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve an exact symbol key to its definition or declaration
    Lookup {
        /// Symbol key, e.g. `config::parse`
        key: String,

        /// Project root
        #[arg(short, long, default_value = ".")]
        path: PathBuf,

        /// Print the symbol as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep the index current while files change
    Watch {
        /// Project root
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Compilation database providing per-file compiler flags
        #[arg(long)]
        compile_commands: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stderr)
        .init();

    match cli.command {
        Commands::Plan { path } => command::plan(&path).await,
        Commands::Index {
            path,
            compile_commands,
        } => command::index(&path, compile_commands.as_deref()).await,
        Commands::Search {
            query,
            path,
            limit,
            json,
        } => command::search(&path, &query, limit, json).await,
        Commands::Lookup { key, path, json } => command::lookup(&path, &key, json).await,
        Commands::Watch {
            path,
            compile_commands,
        } => command::watch(&path, compile_commands.as_deref()).await,
    }
}

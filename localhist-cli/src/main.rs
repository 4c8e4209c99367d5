use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::{commit, delete, diff, files, log, record, rename, restore, show, start};

#[derive(Parser)]
#[command(name = "localhist")]
#[command(version, about = "Per-file local history for a workspace", long_about = None)]
struct Cli {
    /// Workspace root (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the workspace and serve the history API
    Start {
        /// Port for the API server
        #[arg(short, long, default_value = "3030")]
        port: u16,
    },

    /// List files that have a history
    Files,

    /// Show the commits and patches of a file
    Log {
        file: PathBuf,

        /// Print the raw history record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a file as it was at a point of its history
    Show {
        file: PathBuf,

        /// Commit index (defaults to the active commit)
        #[arg(short, long)]
        commit: Option<usize>,

        /// Patch index (defaults to the commit's active patch)
        #[arg(short, long)]
        patch: Option<usize>,
    },

    /// Show the change a patch recorded
    Diff {
        file: PathBuf,

        /// Commit index (defaults to the active commit)
        #[arg(short, long)]
        commit: Option<usize>,

        /// Patch index (defaults to the commit's active patch)
        #[arg(short, long)]
        patch: Option<usize>,
    },

    /// Snapshot the current content of a file as a new commit
    Commit {
        file: PathBuf,

        /// Commit name
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Record the current content of a file as a save
    Record { file: PathBuf },

    /// Restore a file to a commit, or to a patch of a commit
    Restore {
        file: PathBuf,

        /// Commit index (defaults to the active commit when --patch is given)
        #[arg(short, long, required_unless_present = "patch")]
        commit: Option<usize>,

        /// Patch index
        #[arg(short, long)]
        patch: Option<usize>,
    },

    /// Delete a commit from a file's history
    Delete {
        file: PathBuf,

        commit: usize,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Rename a commit
    Rename {
        file: PathBuf,

        commit: usize,

        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let root = cli.root;

    match cli.command {
        Commands::Start { port } => {
            start::run(root, port).await?;
        }
        Commands::Files => {
            files::run(root)?;
        }
        Commands::Log { file, json } => {
            log::run(root, file, json)?;
        }
        Commands::Show {
            file,
            commit,
            patch,
        } => {
            show::run(root, file, commit, patch)?;
        }
        Commands::Diff {
            file,
            commit,
            patch,
        } => {
            diff::run(root, file, commit, patch)?;
        }
        Commands::Commit { file, name } => {
            commit::run(root, file, name)?;
        }
        Commands::Record { file } => {
            record::run(root, file)?;
        }
        Commands::Restore {
            file,
            commit,
            patch,
        } => {
            restore::run(root, file, commit, patch)?;
        }
        Commands::Delete { file, commit, yes } => {
            delete::run(root, file, commit, yes)?;
        }
        Commands::Rename { file, commit, name } => {
            rename::run(root, file, commit, name)?;
        }
    }

    Ok(())
}

//! CLI for the rfetch download manager.

mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use commands::{run_add, run_pause, run_remove, run_resume, run_run, run_serve, run_status};

/// Top-level CLI for the rfetch download manager.
#[derive(Debug, Parser)]
#[command(name = "rfetch")]
#[command(about = "rfetch: multi-threaded segmented download manager", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Register a new download.
    Add {
        /// Direct HTTP/HTTPS URL to download.
        url: String,
        /// Directory where the file will be saved (default: the configured save directory).
        #[arg(long, value_name = "DIR")]
        download_dir: Option<PathBuf>,
        /// Override the filename derived from the URL / Content-Disposition.
        #[arg(long)]
        filename: Option<String>,
        /// Number of worker threads to use for this download.
        #[arg(long, value_name = "N")]
        threads: Option<usize>,
        /// Route segments through the configured SOCKS proxy pool.
        #[arg(long)]
        use_proxy: bool,
        /// Start the download immediately after registering it.
        #[arg(long)]
        start: bool,
    },

    /// Start (or resume) every registered download and report progress until all finish.
    Run,

    /// Run the local HTTP intake endpoint in the foreground (for a browser helper).
    Serve,

    /// Show status of all registered downloads.
    Status,

    /// Pause a running download by ID.
    Pause {
        /// Task identifier, as printed by `add` or `status`.
        id: String,
    },

    /// Resume a paused download by ID.
    Resume {
        /// Task identifier, as printed by `add` or `status`.
        id: String,
    },

    /// Cancel and deregister a download by ID, deleting its partial file and checkpoint.
    Remove {
        /// Task identifier, as printed by `add` or `status`.
        id: String,
    },

    /// Print a shell completion script to stdout.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },

    /// Print a man page to stdout.
    Man,
}

impl CliCommand {
    pub fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Completions { shell } => {
                clap_complete::generate(shell, &mut Cli::command(), "rfetch", &mut std::io::stdout());
            }
            CliCommand::Man => {
                let man = clap_mangen::Man::new(Cli::command());
                man.render(&mut std::io::stdout())?;
            }
            other => {
                let manager = rfetch_core::manager::DownloadManager::load()?;
                manager.scan_unfinished()?;

                match other {
                    CliCommand::Add {
                        url,
                        download_dir,
                        filename,
                        threads,
                        use_proxy,
                        start,
                    } => run_add(&manager, url, filename, threads, download_dir, use_proxy, start)?,
                    CliCommand::Run => run_run(&manager)?,
                    CliCommand::Serve => run_serve(&manager)?,
                    CliCommand::Status => run_status(&manager)?,
                    CliCommand::Pause { id } => run_pause(&manager, &id)?,
                    CliCommand::Resume { id } => run_resume(&manager, &id)?,
                    CliCommand::Remove { id } => run_remove(&manager, &id)?,
                    CliCommand::Completions { .. } | CliCommand::Man => unreachable!(),
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;

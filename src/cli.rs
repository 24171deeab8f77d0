use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;

use crate::commands::capture::CaptureOptions;
use crate::commands::import::ImportArgs;
use crate::commands::{self, CommandReport};

#[derive(Parser)]
#[command(name = "trail")]
#[command(about = "Sync coding-assistant transcripts to a session-tracking service", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse one transcript and sync it as a session
    Capture {
        /// Path to the transcript (.jsonl)
        transcript: PathBuf,

        /// Keep only the last N prompt/response exchanges (0 keeps all)
        #[arg(long)]
        last: Option<usize>,

        /// Destination project name (defaults to the session's cwd name)
        #[arg(long)]
        project: Option<String>,

        /// Parse and report without contacting the service
        #[arg(long)]
        dry_run: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Capture the transcript named by a hook event read from stdin
    Hook {
        /// Destination project name
        #[arg(long)]
        project: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Sync every transcript in a project directory (prints JSON)
    Import {
        /// Transcript directory (defaults to the one for the current directory)
        dir: Option<PathBuf>,

        /// Destination project name
        #[arg(long)]
        project: Option<String>,

        /// Keep only the last N exchanges of each transcript
        #[arg(long)]
        last: Option<usize>,

        /// Parse every file without contacting the service
        #[arg(long)]
        dry_run: bool,
    },

    /// Show resolved paths, config, credential and quota
    Status {
        /// Skip the remote credential and quota checks
        #[arg(long)]
        offline: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!(
        "{}: {}",
        report.command,
        if report.ok { "ok" } else { "issues found" }
    );
    for detail in &report.details {
        println!("  {detail}");
    }
    for issue in &report.issues {
        println!("  ! {issue}");
    }
    Ok(())
}

fn finish(report: CommandReport, json: bool) -> Result<()> {
    print_report(&report, json)?;
    if !report.ok {
        anyhow::bail!("{} reported {} issue(s)", report.command, report.issues.len());
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Capture {
            transcript,
            last,
            project,
            dry_run,
            json,
        } => {
            let opts = CaptureOptions {
                transcript,
                last,
                project,
                dry_run,
            };
            finish(commands::capture::run(&opts)?, json)
        }
        Commands::Hook { project, json } => {
            // Hook issues are shown but never fail the host's hook chain.
            let report = commands::hook::run(io::stdin().lock(), project)?;
            print_report(&report, json)
        }
        Commands::Import {
            dir,
            project,
            last,
            dry_run,
        } => {
            let args = ImportArgs {
                dir,
                project,
                last,
                dry_run,
            };
            let outcome = commands::import::run(&args)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            commands::import::outcome_result(&outcome)
        }
        Commands::Status { offline, json } => finish(commands::status::run(offline)?, json),
    }
}

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};

#[derive(Debug, Parser)]
#[command(
    name = "sl-chatlog-merge",
    version,
    about = "Merge Second Life chat logs from every installed viewer and a zip archive"
)]
struct Cli {
    /// Print the command report as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Merge every chat log and write the result back.
    Merge(MergeArgs),
    /// Show configuration, detected viewers and accounts.
    Status,
}

#[derive(Debug, Args)]
struct MergeArgs {
    /// Archive file name.
    #[arg(long)]
    archive: Option<PathBuf>,
    /// Don't replace existing chat log files, archive only.
    #[arg(long)]
    archive_only: bool,
    /// Number of logs merged in parallel.
    #[arg(long)]
    jobs: Option<usize>,
    /// Read and merge without writing anything.
    #[arg(long)]
    dry_run: bool,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let report = match cli.command {
        Command::Merge(args) => commands::merge::run(&commands::merge::MergeOptions {
            archive: args.archive,
            archive_only: args.archive_only,
            jobs: args.jobs,
            dry_run: args.dry_run,
        })?,
        Command::Status => commands::status::run()?,
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        anyhow::bail!("{} reported {} issue(s)", report.command, report.issues.len());
    }
    Ok(())
}

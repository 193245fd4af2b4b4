use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use std::io::{self, BufRead, Write};

use crate::commands::{self, CommandReport};
use crate::digest::config::{env_or_bool, load_config};
use crate::digest::paths::resolve_paths;
use crate::digest::pipeline::RunOptions;
use crate::logging;

#[derive(Debug, Parser)]
#[command(
    name = "exdigest",
    version,
    about = "Fold daily exception exports into the running summary workbook"
)]
struct Cli {
    /// Print the command report as JSON
    #[arg(long, global = true)]
    json: bool,
    /// Wait for Enter before exiting when the command fails
    #[arg(long, global = true)]
    pause_on_error: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Aggregate today's sources, merge them into the store and archive resolved rows
    Run(RunArgs),
    /// Show resolved paths, configured sources and the last run
    Status,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Observation column to write instead of today's date
    #[arg(long, value_name = "MM/DD")]
    date: Option<String>,
    /// Do everything except writing the store, backup and state
    #[arg(long)]
    dry_run: bool,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let status = if report.ok { "ok" } else { "failed" };
    println!("{}: {status}", report.command);
    for detail in &report.details {
        println!("  {detail}");
    }
    for issue in &report.issues {
        println!("  issue: {issue}");
    }
    Ok(())
}

fn pause_requested(flag: bool) -> bool {
    if flag {
        return true;
    }
    match resolve_paths().and_then(|paths| load_config(&paths)) {
        Ok(cfg) => cfg.run.pause_on_error,
        Err(_) => env_or_bool("EXDIGEST_PAUSE_ON_ERROR", false),
    }
}

fn wait_for_enter() {
    eprint!("press Enter to exit...");
    let _ = io::stderr().flush();
    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);
}

fn dispatch(cli: &Cli) -> Result<()> {
    let report = match &cli.command {
        Command::Run(args) => commands::run::run(&RunOptions {
            date: args.date.clone(),
            dry_run: args.dry_run,
        })?,
        Command::Status => commands::status::run()?,
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        bail!("{} reported {} issue(s)", report.command, report.issues.len());
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init();

    let result = dispatch(&cli);
    if let Err(err) = &result {
        if pause_requested(cli.pause_on_error) {
            eprintln!("error: {err:#}");
            wait_for_enter();
            std::process::exit(1);
        }
    }
    result
}

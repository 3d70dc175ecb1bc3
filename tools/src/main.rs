//! etl-runner: loads one month of budget exports into the database.
//!
//! Usage:
//!   etl-runner --month 2024-03
//!   etl-runner --config etl.json --db data/db.db --source data/export --month 2024-03 --json
//!
//! Exit codes: 0 run completed, 1 run failed (recorded on the job),
//! 2 the run could not be started.

use anyhow::Result;
use budget_etl_core::{
    config::EtlConfig,
    engine::{EtlEngine, RunOutcome, RunReport},
    source::CsvDirectory,
    store::EtlStore,
    types::Month,
};
use std::env;
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            log::error!("etl-runner aborted: {e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().collect();
    let json = args.iter().any(|a| a == "--json");

    let mut config = match arg_value(&args, "--config") {
        Some(path) => EtlConfig::load(path)?,
        None => EtlConfig::default(),
    };
    if let Some(db) = arg_value(&args, "--db") {
        config.database = db.to_string();
    }
    if let Some(dir) = arg_value(&args, "--source") {
        config.source_dir = dir.to_string();
    }
    let month = match arg_value(&args, "--month") {
        Some(m) => m.parse::<Month>()?,
        None => Month::current(),
    };

    if !json {
        println!("budget-etl etl-runner");
        println!("  month:     {month}");
        println!("  db:        {}", config.database);
        println!("  source:    {}", config.source_dir);
        println!();
    }

    let store = EtlStore::open(&config.database)?;
    let applied = match &config.migrations_dir {
        Some(dir) => store.migrate_with_dir(Path::new(dir))?,
        None => store.migrate()?,
    };
    log::debug!("{applied} migration(s) applied");

    let source = CsvDirectory::from_config(&config)?;
    let engine = EtlEngine::new(store);
    let report = engine.run(&source, month)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    if let Some(message) = report.failure_message() {
        eprintln!("run failed (job {}): {message}", report.job_id);
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_summary(report: &RunReport) {
    println!("=== RUN SUMMARY ===");
    println!("  job:            {}", report.job_id);
    println!("  month:          {}", report.month);
    match &report.outcome {
        RunOutcome::Complete(summary) => {
            println!("  status:         complete");
            for d in &summary.dimensions {
                println!(
                    "  {:<15} staged {:>5} | written {:>5}",
                    format!("{:?}:", d.dimension).to_lowercase(),
                    d.staged,
                    d.upserted
                );
            }
            println!("  raw txns:       {}", summary.raw_transactions);
            println!("  cleaned txns:   {}", summary.cleaned_transactions);
            for (reason, count) in &summary.dropped {
                println!("    dropped {reason:?}: {count}");
            }
            println!("  inserted:       {}", summary.consolidation.inserted);
            println!("  pruned:         {}", summary.consolidation.pruned);
            println!("  unchanged:      {}", summary.consolidation.unchanged);
        }
        RunOutcome::Failed { phase, message } => {
            println!("  status:         failed during {phase:?}");
            println!("  message:        {message}");
        }
    }
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

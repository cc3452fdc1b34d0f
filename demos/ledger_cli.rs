use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ledger_consolidator::*;
use std::path::PathBuf;

/// Clean bank exports and file them into a month-indexed master ledger.
#[derive(Parser, Debug)]
struct Args {
    /// JSON config overriding column names, noise tokens and labels
    #[clap(long)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a one-sheet cleaned report for a single export
    Report {
        input: PathBuf,
        /// Surname used in the report file name
        #[clap(long)]
        surname: Option<String>,
        /// Directory the report is written to
        #[clap(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Merge an export into the master ledger
    Merge {
        master: PathBuf,
        input: PathBuf,
        /// Name the export was uploaded under, used when its rows carry no dates
        #[clap(long)]
        original_name: Option<String>,
    },

    /// Print the JSON schema of the config file
    Schema,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => LedgerConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => LedgerConfig::default(),
    };

    match args.command {
        Command::Report {
            input,
            surname,
            out_dir,
        } => {
            let output = out_dir.join(report_filename(&config, surname.as_deref()));
            let cleaned = process_report(&input, &output, &config)?;
            println!("{}", output.display());
            for (category, sum) in cleaned.aggregate.iter() {
                println!("  {:<30} {:>12.2}", category, sum);
            }
            println!("  {:<30} {:>12.2}", config.total_label, cleaned.total);
        }
        Command::Merge {
            master,
            input,
            original_name,
        } => {
            let original_name = original_name.unwrap_or_else(|| {
                input
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            let engine = LedgerEngine::new(config);
            let outcome = engine
                .merge_file(&master, &input, &original_name)
                .with_context(|| format!("failed to merge {}", input.display()))?;
            if outcome.resolution.two_digit_year {
                eprintln!("note: a two-digit year was read as {}", outcome.resolution.label.year());
            }
            println!(
                "{} -> {} ({} new, {} total)",
                master.display(),
                outcome.label(),
                outcome.rows_added,
                outcome.rows_total
            );
        }
        Command::Schema => {
            println!("{}", LedgerConfig::schema_as_json()?);
        }
    }
    Ok(())
}

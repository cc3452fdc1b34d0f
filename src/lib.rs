//! # Ledger Consolidator
//!
//! A library for turning raw bank transaction exports (`.xlsx`) into cleaned,
//! categorised spending reports and for consolidating them into a month-indexed
//! master ledger workbook.
//!
//! ## Core Concepts
//!
//! - **Cleaning**: Identifying columns are dropped, city/country boilerplate is stripped
//!   from descriptions, and rows without a category or amount are skipped
//! - **Aggregation**: Amounts are summed per category; the total expenses figure excludes
//!   the investment-transfer category
//! - **Month Labels**: Every batch is filed under an `MM.YYYY` sheet, inferred from its
//!   date column, then its file name, then the `01.1970` fallback
//! - **Idempotent Merge**: Re-submitting rows already on a month sheet does not grow it
//!
//! ## Example
//!
//! ```rust,ignore
//! use ledger_consolidator::*;
//! use std::path::Path;
//!
//! let config = LedgerConfig::default();
//!
//! // One-off report for a single upload.
//! let cleaned = process_report(Path::new("upload.xlsx"), Path::new("report.xlsx"), &config)?;
//! println!("Total expenses: {:.2}", cleaned.total);
//!
//! // File the same upload into the user's master ledger.
//! let engine = LedgerEngine::new(config);
//! let outcome = engine.merge_file(
//!     Path::new("master.xlsx"),
//!     Path::new("upload.xlsx"),
//!     "выписка 12 марта 2024.xlsx",
//! )?;
//! println!("Filed under {}", outcome.label());
//! ```

pub mod cleaner;
pub mod engine;
pub mod error;
pub mod ingestion;
pub mod label;
pub mod record;
pub mod registry;
pub mod render;
pub mod schema;
pub mod utils;
pub mod workbook;

pub use cleaner::{clean, clean_batch, CategoryAggregate, CleanedBatch};
pub use engine::{LedgerEngine, MergeOutcome};
pub use error::{LedgerError, Result};
pub use ingestion::{read_input_table, Formulas, Grid, SheetCells};
pub use label::{label_from_filename, resolve_label, LabelResolution, LabelSource, MonthLabel};
pub use record::{Batch, CellValue, RawTable, TransactionRow};
pub use registry::{report_filename, JsonLinesRegistry, LedgerRegistry, UserId, UserRecord};
pub use render::{layout_sheet, render_sheet, SheetLayout};
pub use schema::LedgerConfig;
pub use workbook::{LedgerSheet, LedgerWorkbook, SheetContent};

use log::info;
use std::path::Path;

pub struct ReportProcessor;

impl ReportProcessor {
    /// Cleans one upload and writes it as a one-sheet report.
    pub fn process(input: &Path, output: &Path, config: &LedgerConfig) -> Result<CleanedBatch> {
        let table = read_input_table(input, config)?;
        let cleaned = clean(&table, config)?;
        info!(
            "Writing report for {} ({} row(s), {} categories) to {}",
            input.display(),
            cleaned.batch.len(),
            cleaned.aggregate.len(),
            output.display()
        );

        let mut workbook = LedgerWorkbook::new();
        workbook.upsert(config.report_sheet_name.as_str(), cleaned.clone());
        workbook.save(output, config)?;
        Ok(cleaned)
    }

    /// Merges one upload into the master ledger and returns the month label
    /// it was filed under. The upload's own file name drives month inference
    /// when its rows carry no dates.
    pub fn update_master(master: &Path, input: &Path, config: &LedgerConfig) -> Result<MonthLabel> {
        let filename = input
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let engine = LedgerEngine::new(config.clone());
        let outcome = engine.merge_file(master, input, &filename)?;
        Ok(outcome.resolution.label)
    }
}

pub fn process_report(input: &Path, output: &Path, config: &LedgerConfig) -> Result<CleanedBatch> {
    ReportProcessor::process(input, output, config)
}

pub fn update_master_workbook(master: &Path, input: &Path, config: &LedgerConfig) -> Result<MonthLabel> {
    ReportProcessor::update_master(master, input, config)
}

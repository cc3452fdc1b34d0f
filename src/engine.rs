use crate::cleaner::{clean, clean_batch};
use crate::error::Result;
use crate::ingestion::read_input_table;
use crate::label::{resolve_label, LabelResolution};
use crate::record::RawTable;
use crate::schema::LedgerConfig;
use crate::workbook::LedgerWorkbook;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What a merge did to the master ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub resolution: LabelResolution,
    /// Rows of the batch that were not already on the sheet.
    pub rows_added: usize,
    /// Rows on the label sheet after the merge.
    pub rows_total: usize,
    pub created_workbook: bool,
    pub created_sheet: bool,
}

impl MergeOutcome {
    pub fn label(&self) -> String {
        self.resolution.label.to_string()
    }
}

pub struct LedgerEngine {
    config: LedgerConfig,
}

impl LedgerEngine {
    pub fn new(config: LedgerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Reads `input_path` and merges it into `master_path`. `original_filename`
    /// is the name the file was submitted under and is used for month
    /// inference when the rows carry no dates.
    pub fn merge_file(
        &self,
        master_path: &Path,
        input_path: &Path,
        original_filename: &str,
    ) -> Result<MergeOutcome> {
        let table = read_input_table(input_path, &self.config)?;
        self.merge(master_path, &table, original_filename)
    }

    /// Merges one batch into the master ledger under its month label.
    ///
    /// The existing sheet for that label, if any, becomes the deduplicated
    /// union of its rows and the batch. Sheets are then re-sorted and the
    /// workbook is written back atomically. A schema error leaves the master
    /// untouched.
    pub fn merge(&self, master_path: &Path, table: &RawTable, filename: &str) -> Result<MergeOutcome> {
        info!(
            "Merging {} row(s) from '{}' into {}",
            table.rows.len(),
            filename,
            master_path.display()
        );
        let incoming = clean(table, &self.config)?;
        let resolution = resolve_label(&incoming.batch, filename, &self.config);
        let label = resolution.label;
        let sheet_name = label.to_string();

        let created_workbook = !master_path.exists();
        let mut workbook = if created_workbook {
            info!("Creating master ledger {}", master_path.display());
            LedgerWorkbook::new()
        } else {
            LedgerWorkbook::load(master_path)?
        };

        let existing = match workbook.ledger_batch(label, &self.config) {
            None => None,
            Some(Ok(batch)) => Some(batch),
            Some(Err(err)) => {
                warn!("Discarding sheet '{}' and starting it over: {}", sheet_name, err);
                None
            }
        };
        let created_sheet = existing.is_none();

        let (merged, rows_added) = match existing {
            None => {
                let mut batch = incoming.batch;
                let duplicates = batch.dedup();
                let added = batch.len();
                debug!("New sheet '{}': {} row(s), {} duplicate(s) dropped", sheet_name, added, duplicates);
                (clean_batch(batch, &self.config), added)
            }
            Some(current) => {
                let before = current.len();
                let mut union = current.concat(incoming.batch);
                let duplicates = union.dedup();
                let added = union.len() - before;
                debug!(
                    "Sheet '{}': {} existing, {} added, {} duplicate(s) dropped",
                    sheet_name, before, added, duplicates
                );
                (clean_batch(union, &self.config), added)
            }
        };
        let rows_total = merged.batch.len();

        workbook.upsert(sheet_name.as_str(), merged);
        workbook.sort_sheets();
        workbook.save(master_path, &self.config)?;

        info!(
            "Merged into sheet '{}' ({} new row(s), {} total)",
            sheet_name, rows_added, rows_total
        );
        Ok(MergeOutcome {
            resolution,
            rows_added,
            rows_total,
            created_workbook,
            created_sheet,
        })
    }
}

//! In-memory master ledger. A merge loads the whole file, edits this model
//! and writes it back; nothing is kept between calls.

use crate::cleaner::{clean_batch, CleanedBatch};
use crate::error::{LedgerError, Result};
use crate::ingestion::{read_workbook_sheets, Grid, SheetCells};
use crate::label::MonthLabel;
use crate::record::{Batch, TransactionRow};
use crate::render::{render_cells, render_sheet};
use crate::schema::LedgerConfig;
use log::debug;
use rust_xlsxwriter::Workbook;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

#[derive(Debug, Clone, PartialEq)]
pub enum SheetContent {
    /// A cleaned batch the engine renders itself.
    Ledger(CleanedBatch),
    /// Values and formulas read from disk and not touched since.
    Cells(SheetCells),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSheet {
    pub name: String,
    pub content: SheetContent,
}

impl LedgerSheet {
    /// The month this sheet holds, if its name is a `MM.YYYY` label.
    pub fn label(&self) -> Option<MonthLabel> {
        self.name.parse().ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerWorkbook {
    sheets: Vec<LedgerSheet>,
}

impl LedgerWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let sheets = read_workbook_sheets(path)?
            .into_iter()
            .map(|(name, cells)| LedgerSheet {
                name,
                content: SheetContent::Cells(cells),
            })
            .collect::<Vec<_>>();
        debug!("Loaded {} sheet(s) from {}", sheets.len(), path.display());
        Ok(Self { sheets })
    }

    pub fn sheets(&self) -> &[LedgerSheet] {
        &self.sheets
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&LedgerSheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// Rows currently stored under `label`. `None` when there is no such
    /// sheet, an error when the sheet exists but is not a ledger table.
    pub fn ledger_batch(&self, label: MonthLabel, config: &LedgerConfig) -> Option<Result<Batch>> {
        let name = label.to_string();
        let sheet = self.get(&name)?;
        Some(match &sheet.content {
            SheetContent::Ledger(cleaned) => Ok(cleaned.batch.clone()),
            SheetContent::Cells(cells) => ledger_table_from_grid(&name, &cells.grid, config),
        })
    }

    /// Replaces the sheet called `name` in place, or appends it.
    pub fn upsert(&mut self, name: impl Into<String>, cleaned: CleanedBatch) {
        let name = name.into();
        let content = SheetContent::Ledger(cleaned);
        match self.sheets.iter_mut().find(|s| s.name == name) {
            Some(sheet) => sheet.content = content,
            None => self.sheets.push(LedgerSheet { name, content }),
        }
    }

    /// Label sheets by `(year, month)`, then every other sheet in its current
    /// relative order.
    pub fn sort_sheets(&mut self) {
        self.sheets.sort_by_key(|sheet| {
            let label = sheet.label();
            (label.is_none(), label)
        });
    }

    pub fn to_bytes(&self, config: &LedgerConfig) -> Result<Vec<u8>> {
        let mut workbook = Workbook::new();
        for sheet in &self.sheets {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(sheet.name.as_str())?;
            match &sheet.content {
                SheetContent::Ledger(cleaned) => {
                    render_sheet(worksheet, &sheet.name, cleaned, config)?;
                }
                SheetContent::Cells(cells) => match sheet.label() {
                    Some(_) => match ledger_table_from_grid(&sheet.name, &cells.grid, config) {
                        Ok(batch) => {
                            render_sheet(worksheet, &sheet.name, &clean_batch(batch, config), config)?
                        }
                        Err(err) => {
                            debug!("Keeping cell values of '{}': {}", sheet.name, err);
                            render_cells(worksheet, cells)?;
                        }
                    },
                    None => render_cells(worksheet, cells)?,
                },
            }
        }
        Ok(workbook.save_to_buffer()?)
    }

    /// Writes the workbook to `path` atomically.
    pub fn save(&self, path: &Path, config: &LedgerConfig) -> Result<()> {
        let bytes = self.to_bytes(config)?;
        write_atomically(path, &bytes)?;
        debug!(
            "Saved {} sheet(s), {} bytes to {}",
            self.sheets.len(),
            bytes.len(),
            path.display()
        );
        Ok(())
    }
}

/// Writes into a temporary file next to `path`, then renames it over `path`.
/// Readers see either the old content or the new one.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}

/// Reads the cleaned table of a rendered ledger sheet back into rows.
///
/// The table is the header row up to its first blank cell. Rows without a
/// category or a numeric amount are dropped.
pub fn ledger_table_from_grid(sheet: &str, grid: &Grid, config: &LedgerConfig) -> Result<Batch> {
    let unreadable = |reason: String| LedgerError::UnreadableSheet {
        sheet: sheet.to_string(),
        reason,
    };

    let header = grid
        .first()
        .ok_or_else(|| unreadable("sheet is empty".to_string()))?;
    let columns: Vec<String> = header
        .iter()
        .take_while(|cell| !cell.is_empty())
        .map(|cell| cell.display().trim().to_string())
        .collect();

    let position = |name: &str| {
        columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| unreadable(format!("no '{}' column in {:?}", name, columns)))
    };
    let category_idx = position(&config.category_column)?;
    let amount_idx = position(&config.amount_column)?;

    let mut rows = Vec::new();
    for cells in grid.iter().skip(1) {
        let cell = |idx: usize| cells.get(idx).cloned().unwrap_or_default();
        let category = cell(category_idx);
        let amount = match cell(amount_idx).as_number() {
            Some(amount) if !category.is_empty() => amount,
            _ => continue,
        };

        let mut row = TransactionRow::new(category.display(), amount);
        for (idx, column) in columns.iter().enumerate() {
            if idx != category_idx && idx != amount_idx {
                row.set_field(column.clone(), cell(idx));
            }
        }
        rows.push(row);
    }

    Ok(Batch {
        columns,
        category_column: config.category_column.clone(),
        amount_column: config.amount_column.clone(),
        rows,
    })
}

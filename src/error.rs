use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Required column '{column}' is missing (available columns: {available:?})")]
    MissingColumn {
        column: String,
        available: Vec<String>,
    },

    #[error("Input sheet has no header row: {0}")]
    EmptyInput(String),

    #[error("Sheet '{sheet}' cannot be read as a ledger table: {reason}")]
    UnreadableSheet { sheet: String, reason: String },

    #[error("Invalid month label '{0}': expected MM.YYYY")]
    InvalidMonthLabel(String),

    #[error("Spreadsheet read error: {0}")]
    SpreadsheetRead(#[from] calamine::XlsxError),

    #[error("Spreadsheet write error: {0}")]
    SpreadsheetWrite(#[from] rust_xlsxwriter::XlsxError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    /// Errors a front end should turn into a plain-language retry prompt.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            LedgerError::MissingColumn { .. }
                | LedgerError::EmptyInput(_)
                | LedgerError::SpreadsheetRead(_)
                | LedgerError::SpreadsheetWrite(_)
                | LedgerError::Io(_)
        )
    }
}

impl From<tempfile::PersistError> for LedgerError {
    fn from(err: tempfile::PersistError) -> Self {
        LedgerError::Io(err.error)
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

use crate::utils::{format_datetime, parse_amount_text};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::hash::{Hash, Hasher};

/// A single spreadsheet cell as seen by the cleaner and the renderer.
///
/// Numbers compare by bit pattern (with `-0.0` folded into `0.0`) so that rows
/// can be used as set members during deduplication.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value)
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Numeric view of the cell. Text is accepted when it parses as an amount.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => parse_amount_text(s),
            _ => None,
        }
    }

    /// The cell as it would be shown in a plain-text column.
    pub fn display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => format!("{}", n),
            CellValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            CellValue::DateTime(dt) => format_datetime(dt),
        }
    }
}

fn number_bits(value: f64) -> u64 {
    if value == 0.0 {
        0.0f64.to_bits()
    } else {
        value.to_bits()
    }
}

impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CellValue::Empty, CellValue::Empty) => true,
            (CellValue::Text(a), CellValue::Text(b)) => a == b,
            (CellValue::Number(a), CellValue::Number(b)) => number_bits(*a) == number_bits(*b),
            (CellValue::Bool(a), CellValue::Bool(b)) => a == b,
            (CellValue::DateTime(a), CellValue::DateTime(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for CellValue {}

impl Hash for CellValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            CellValue::Empty => {}
            CellValue::Text(s) => s.hash(state),
            CellValue::Number(n) => number_bits(*n).hash(state),
            CellValue::Bool(b) => b.hash(state),
            CellValue::DateTime(dt) => dt.hash(state),
        }
    }
}

/// Untyped rows exactly as read from a spreadsheet, before the cleaner has
/// validated them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, CellValue::Empty);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// One transaction after cleaning.
///
/// `fields` holds every retained column other than category and amount. Empty
/// cells are never stored, so an empty cell and a missing column are the same
/// thing for equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRow {
    pub category: String,
    pub amount: f64,
    pub fields: BTreeMap<String, CellValue>,
}

impl TransactionRow {
    pub fn new(category: impl Into<String>, amount: f64) -> Self {
        Self {
            category: category.into(),
            amount,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, column: impl Into<String>, value: CellValue) -> Self {
        self.set_field(column, value);
        self
    }

    pub fn set_field(&mut self, column: impl Into<String>, value: CellValue) {
        let column = column.into();
        if value.is_empty() {
            self.fields.remove(&column);
        } else {
            self.fields.insert(column, value);
        }
    }

    pub fn field(&self, column: &str) -> Option<&CellValue> {
        self.fields.get(column)
    }
}

impl PartialEq for TransactionRow {
    fn eq(&self, other: &Self) -> bool {
        self.category == other.category
            && number_bits(self.amount) == number_bits(other.amount)
            && self.fields == other.fields
    }
}

impl Eq for TransactionRow {}

impl Hash for TransactionRow {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.category.hash(state);
        number_bits(self.amount).hash(state);
        self.fields.hash(state);
    }
}

/// An ordered set of columns plus the rows that fill them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub columns: Vec<String>,
    pub category_column: String,
    pub amount_column: String,
    pub rows: Vec<TransactionRow>,
}

impl Batch {
    pub fn cell(&self, row: &TransactionRow, column: &str) -> CellValue {
        if column == self.category_column {
            CellValue::text(row.category.clone())
        } else if column == self.amount_column {
            CellValue::Number(row.amount)
        } else {
            row.field(column).cloned().unwrap_or_default()
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends `other` after `self`. Columns are the union, ours first.
    pub fn concat(mut self, other: Batch) -> Batch {
        for column in other.columns {
            if !self.columns.contains(&column) {
                self.columns.push(column);
            }
        }
        self.rows.extend(other.rows);
        self
    }

    /// Drops rows equal to an earlier row. Returns how many were removed.
    pub fn dedup(&mut self) -> usize {
        let before = self.rows.len();
        let mut seen = HashSet::new();
        self.rows.retain(|row| seen.insert(row.clone()));
        before - self.rows.len()
    }
}

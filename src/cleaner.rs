use crate::error::{LedgerError, Result};
use crate::record::{Batch, CellValue, RawTable, TransactionRow};
use crate::schema::LedgerConfig;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Per-category sums in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryAggregate {
    entries: Vec<(String, f64)>,
}

impl CategoryAggregate {
    /// Groups by the exact category string. No case-folding or trimming.
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a TransactionRow>) -> Self {
        let mut entries: Vec<(String, f64)> = Vec::new();
        for row in rows {
            match entries.iter_mut().find(|(name, _)| *name == row.category) {
                Some((_, sum)) => *sum += row.amount,
                None => entries.push((row.category.clone(), row.amount)),
            }
        }
        Self { entries }
    }

    pub fn get(&self, category: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, sum)| *sum)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(name, sum)| (name.as_str(), *sum))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn grand_total(&self) -> f64 {
        self.entries.iter().map(|(_, sum)| sum).sum()
    }
}

/// Output of one cleaning pass: the rows, their category sums and the total
/// expenses excluding the investment category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedBatch {
    pub batch: Batch,
    pub aggregate: CategoryAggregate,
    pub total: f64,
}

/// Validates raw rows and turns them into a cleaned, aggregated batch.
pub fn clean(table: &RawTable, config: &LedgerConfig) -> Result<CleanedBatch> {
    let category_idx = require_column(table, &config.category_column)?;
    let amount_idx = require_column(table, &config.amount_column)?;

    let columns: Vec<String> = table
        .columns
        .iter()
        .filter(|c| !config.is_dropped_column(c))
        .cloned()
        .collect();

    let mut rows = Vec::with_capacity(table.rows.len());
    let mut skipped = 0usize;
    for cells in &table.rows {
        if cells.iter().all(CellValue::is_empty) {
            continue;
        }
        // Rows may be shorter than the header when built without `RawTable::new`.
        let cell = |idx: usize| cells.get(idx).cloned().unwrap_or_default();
        let category = cell(category_idx);
        let amount = match cell(amount_idx).as_number() {
            Some(amount) if !category.is_empty() => amount,
            _ => {
                skipped += 1;
                continue;
            }
        };

        let mut row = TransactionRow::new(category.display(), amount);
        for (idx, column) in table.columns.iter().enumerate() {
            if idx == category_idx || idx == amount_idx || config.is_dropped_column(column) {
                continue;
            }
            row.set_field(column.clone(), cell(idx));
        }
        rows.push(row);
    }

    if skipped > 0 {
        warn!(
            "Skipped {} row(s) without a category or a numeric amount",
            skipped
        );
    }

    let batch = Batch {
        columns,
        category_column: config.category_column.clone(),
        amount_column: config.amount_column.clone(),
        rows,
    };
    Ok(clean_batch(batch, config))
}

/// Cleans an already-typed batch. Running it twice gives the same result.
pub fn clean_batch(mut batch: Batch, config: &LedgerConfig) -> CleanedBatch {
    batch.columns.retain(|c| !config.is_dropped_column(c));
    for row in &mut batch.rows {
        row.fields.retain(|column, _| !config.is_dropped_column(column));
        let cleaned = match row.fields.get(&config.description_column) {
            Some(CellValue::Text(description)) => strip_noise(description, &config.noise_tokens),
            _ => continue,
        };
        row.set_field(config.description_column.clone(), CellValue::text(cleaned));
    }

    let aggregate = CategoryAggregate::from_rows(&batch.rows);
    let total = total_excluding(&batch.rows, &config.investment_category);
    debug!(
        "Cleaned {} row(s) into {} categories, total {:.2}",
        batch.len(),
        aggregate.len(),
        total
    );

    CleanedBatch {
        batch,
        aggregate,
        total,
    }
}

pub fn strip_noise(text: &str, tokens: &[String]) -> String {
    let mut text = text.to_string();
    for token in tokens {
        text = text.replace(token.as_str(), "").trim().to_string();
    }
    text
}

pub fn total_excluding(rows: &[TransactionRow], excluded_category: &str) -> f64 {
    rows.iter()
        .filter(|row| row.category != excluded_category)
        .map(|row| row.amount)
        .sum()
}

fn require_column(table: &RawTable, column: &str) -> Result<usize> {
    table
        .column_index(column)
        .ok_or_else(|| LedgerError::MissingColumn {
            column: column.to_string(),
            available: table.columns.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn sample_table() -> RawTable {
        RawTable::new(
            vec![
                "Номер".into(),
                "Дата операции".into(),
                "Категория".into(),
                "Сумма в рублях".into(),
                "Валюта".into(),
                "Описание".into(),
            ],
            vec![
                vec![
                    CellValue::Number(1.0),
                    text("01.03.2024"),
                    text("Еда"),
                    CellValue::Number(100.0),
                    text("RUB"),
                    text("PYATEROCHKA N.NOVGOROD RUS"),
                ],
                vec![
                    CellValue::Number(2.0),
                    text("02.03.2024"),
                    text("На инвестиции"),
                    CellValue::Number(500.0),
                    text("RUB"),
                    CellValue::Empty,
                ],
                vec![
                    CellValue::Number(3.0),
                    text("03.03.2024"),
                    text("еда"),
                    text("-20,5"),
                    text("RUB"),
                    text("  Lavka NIZHNIY NOVG "),
                ],
            ],
        )
    }

    #[test]
    fn test_clean_drops_columns_and_noise() {
        let cleaned = clean(&sample_table(), &LedgerConfig::default()).unwrap();

        assert_eq!(
            cleaned.batch.columns,
            vec!["Дата операции", "Категория", "Сумма в рублях", "Описание"]
        );
        let first = &cleaned.batch.rows[0];
        assert_eq!(first.field("Описание"), Some(&text("PYATEROCHKA")));
        assert!(first.field("Номер").is_none());
        assert!(first.field("Валюта").is_none());
        assert_eq!(cleaned.batch.rows[2].field("Описание"), Some(&text("Lavka")));
        assert!(cleaned.batch.rows[1].field("Описание").is_none());
    }

    #[test]
    fn test_aggregate_is_case_sensitive_and_ordered() {
        let cleaned = clean(&sample_table(), &LedgerConfig::default()).unwrap();
        let entries: Vec<(&str, f64)> = cleaned.aggregate.iter().collect();
        assert_eq!(
            entries,
            vec![("Еда", 100.0), ("На инвестиции", 500.0), ("еда", -20.5)]
        );
    }

    #[test]
    fn test_total_excludes_investment_category() {
        let cleaned = clean(&sample_table(), &LedgerConfig::default()).unwrap();
        assert!((cleaned.total - 79.5).abs() < 1e-9);
        let investment = cleaned.aggregate.get("На инвестиции").unwrap();
        assert!((cleaned.aggregate.grand_total() - investment - cleaned.total).abs() < 1e-9);
    }

    #[test]
    fn test_missing_required_column_is_schema_error() {
        let table = RawTable::new(
            vec!["Категория".into(), "Описание".into()],
            vec![vec![text("Еда"), text("x")]],
        );
        let err = clean(&table, &LedgerConfig::default()).unwrap_err();
        match err {
            LedgerError::MissingColumn { column, available } => {
                assert_eq!(column, "Сумма в рублях");
                assert_eq!(available, vec!["Категория", "Описание"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_rows_without_category_or_amount_are_skipped() {
        let table = RawTable::new(
            vec!["Категория".into(), "Сумма в рублях".into()],
            vec![
                vec![text("Еда"), CellValue::Number(1.0)],
                vec![CellValue::Empty, CellValue::Number(2.0)],
                vec![text("Кафе"), text("n/a")],
                vec![CellValue::Empty, CellValue::Empty],
            ],
        );
        let cleaned = clean(&table, &LedgerConfig::default()).unwrap();
        assert_eq!(cleaned.batch.len(), 1);
    }

    #[test]
    fn test_short_rows_read_as_empty_cells() {
        let table = RawTable {
            columns: vec!["Категория".into(), "Сумма в рублях".into(), "Описание".into()],
            rows: vec![
                vec![text("Еда"), CellValue::Number(5.0)],
                vec![text("Кафе")],
                vec![],
            ],
        };
        let cleaned = clean(&table, &LedgerConfig::default()).unwrap();
        assert_eq!(cleaned.batch.rows, vec![TransactionRow::new("Еда", 5.0)]);
        assert_eq!(cleaned.total, 5.0);
    }

    #[test]
    fn test_clean_batch_is_idempotent() {
        let config = LedgerConfig::default();
        let once = clean(&sample_table(), &config).unwrap();
        let twice = clean_batch(once.batch.clone(), &config);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_zero_and_negative_categories_are_kept() {
        let rows = vec![
            TransactionRow::new("Возврат", -50.0),
            TransactionRow::new("Ноль", 10.0),
            TransactionRow::new("Ноль", -10.0),
        ];
        let aggregate = CategoryAggregate::from_rows(&rows);
        assert_eq!(aggregate.get("Возврат"), Some(-50.0));
        assert_eq!(aggregate.get("Ноль"), Some(0.0));
    }
}

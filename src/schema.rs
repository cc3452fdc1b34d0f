use crate::error::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct LedgerConfig {
    #[schemars(description = "Name of the sheet holding transaction rows in an uploaded export. The first sheet is used when it is missing.")]
    pub input_sheet: String,

    #[schemars(description = "Header of the column holding the spending category. Required in every input.")]
    pub category_column: String,

    #[schemars(description = "Header of the column holding the amount in the base currency. Required in every input.")]
    pub amount_column: String,

    #[schemars(description = "Header of the free-text description column that gets noise tokens stripped.")]
    pub description_column: String,

    #[schemars(description = "Columns removed from every batch when present (operation id, operation type, raw amount, currency, status, source account).")]
    pub dropped_columns: Vec<String>,

    #[schemars(description = "Substrings removed from descriptions, applied in order, trimming after each one.")]
    pub noise_tokens: Vec<String>,

    #[schemars(description = "Category excluded from the total-expenses figure.")]
    pub investment_category: String,

    #[schemars(description = "Case-insensitive substrings marking a column as date-bearing for month inference.")]
    pub date_column_tokens: Vec<String>,

    #[schemars(description = "Sheet name of a single-submission report.")]
    pub report_sheet_name: String,

    #[schemars(description = "Bold title written above the category summary table.")]
    pub summary_title: String,

    #[schemars(description = "Bold label written next to the total-expenses value.")]
    pub total_label: String,

    #[schemars(description = "Title of the chart's category axis.")]
    pub chart_x_axis_title: String,

    #[schemars(description = "Title of the chart's value axis.")]
    pub chart_y_axis_title: String,

    #[schemars(description = "Prefix of personalised single report file names.")]
    pub report_file_prefix: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            input_sheet: "data".to_string(),
            category_column: "Категория".to_string(),
            amount_column: "Сумма в рублях".to_string(),
            description_column: "Описание".to_string(),
            dropped_columns: [
                "Номер",
                "Тип операции",
                "Сумма",
                "Валюта",
                "Состояние",
                "Номер счета/карты списания",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            noise_tokens: [
                "N.NOVGOROD",
                "RUS",
                "Nizhniy Novg",
                "NIZJNIY NOVG",
                "NIZHNIY NOVG",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            investment_category: "На инвестиции".to_string(),
            date_column_tokens: vec!["дата".to_string(), "date".to_string()],
            report_sheet_name: "Очищенные данные".to_string(),
            summary_title: "Суммы по категориям".to_string(),
            total_label: "Итого расходы (без \"На инвестиции\"):".to_string(),
            chart_x_axis_title: "Категории".to_string(),
            chart_y_axis_title: "Сумма".to_string(),
            report_file_prefix: "finance_report_".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Loads a config from JSON. Fields missing from the file keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn is_dropped_column(&self, column: &str) -> bool {
        self.dropped_columns.iter().any(|c| c == column)
    }

    pub fn is_date_column(&self, column: &str) -> bool {
        let lowered = column.to_lowercase();
        self.date_column_tokens
            .iter()
            .any(|token| lowered.contains(&token.to_lowercase()))
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(LedgerConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

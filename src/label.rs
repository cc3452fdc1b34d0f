use crate::error::LedgerError;
use crate::record::{Batch, CellValue};
use crate::schema::LedgerConfig;
use crate::utils::{expand_two_digit_year, file_stem};
use chrono::{Datelike, NaiveDate};
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Month names by prefix, matched against the longest prefix a token starts
/// with. Genitive forms all start with a listed stem except `мая`.
const MONTH_PREFIXES: &[(&str, u32)] = &[
    ("янв", 1),
    ("январ", 1),
    ("январь", 1),
    ("фев", 2),
    ("феврал", 2),
    ("февраль", 2),
    ("мар", 3),
    ("март", 3),
    ("апр", 4),
    ("апрел", 4),
    ("апрель", 4),
    ("май", 5),
    ("мая", 5),
    ("июн", 6),
    ("июнь", 6),
    ("июл", 7),
    ("июль", 7),
    ("авг", 8),
    ("август", 8),
    ("сен", 9),
    ("сент", 9),
    ("сентябр", 9),
    ("сентябрь", 9),
    ("окт", 10),
    ("октябр", 10),
    ("октябрь", 10),
    ("ноя", 11),
    ("нояб", 11),
    ("ноябрь", 11),
    ("дек", 12),
    ("декабр", 12),
    ("декабрь", 12),
];

/// Calendar month key of a ledger sheet, written as `MM.YYYY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonthLabel {
    year: i32,
    month: u32,
}

impl MonthLabel {
    /// Used when neither the rows nor the filename carry a date.
    pub const SENTINEL: MonthLabel = MonthLabel {
        year: 1970,
        month: 1,
    };

    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) && (0..=9999).contains(&year) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }
}

impl fmt::Display for MonthLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}.{:04}", self.month, self.year)
    }
}

impl FromStr for MonthLabel {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LedgerError::InvalidMonthLabel(s.to_string());
        let (month, year) = s.split_once('.').ok_or_else(invalid)?;
        if month.len() != 2
            || year.len() != 4
            || !month.bytes().all(|b| b.is_ascii_digit())
            || !year.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        let month: u32 = month.parse().map_err(|_| invalid())?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        MonthLabel::new(year, month).ok_or_else(invalid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelSource {
    Data,
    Filename,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelResolution {
    pub label: MonthLabel,
    pub source: LabelSource,
    /// A two-digit year was read as 20YY. Callers may want to flag this.
    pub two_digit_year: bool,
}

impl fmt::Display for LabelResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ParsedDate {
    date: NaiveDate,
    two_digit_year: bool,
}

fn numeric_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{1,2})[./-](\d{1,2})[./-](\d{2,4})").expect("invalid numeric date regex")
    })
}

fn textual_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{1,2})\s+([а-яё.]+)\s+(\d{2,4})").expect("invalid textual date regex")
    })
}

fn filename_split_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\s,_-]+").expect("invalid filename split regex"))
}

/// Month number for a (possibly abbreviated) Russian month name.
pub fn month_from_name(raw: &str) -> Option<u32> {
    let name: String = raw.to_lowercase().chars().filter(|c| *c != '.').collect();
    MONTH_PREFIXES
        .iter()
        .filter(|(prefix, _)| name.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.chars().count())
        .map(|(_, month)| *month)
}

fn normalize(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .replace('\u{a0}', " ")
        .replace(',', " ")
}

fn capture_number(caps: &regex::Captures<'_>, idx: usize) -> Option<i32> {
    caps.get(idx)?.as_str().parse().ok()
}

/// Parses one date-column value. The numeric form is tried first; if it is
/// present but not a real calendar date the value is rejected outright.
fn parse_date_text(text: &str) -> Option<ParsedDate> {
    let s = normalize(text);

    if let Some(caps) = numeric_date_re().captures(&s) {
        let day = capture_number(&caps, 1)?;
        let month = capture_number(&caps, 2)?;
        let (year, two_digit_year) = expand_two_digit_year(capture_number(&caps, 3)?);
        let date = NaiveDate::from_ymd_opt(year, month as u32, day as u32)?;
        return Some(ParsedDate {
            date,
            two_digit_year,
        });
    }

    let caps = textual_date_re().captures(&s)?;
    let day = capture_number(&caps, 1)?;
    let month = month_from_name(caps.get(2)?.as_str())?;
    let (year, two_digit_year) = expand_two_digit_year(capture_number(&caps, 3)?);
    let date = NaiveDate::from_ymd_opt(year, month, day as u32)?;
    Some(ParsedDate {
        date,
        two_digit_year,
    })
}

fn parse_date_cell(cell: &CellValue) -> Option<ParsedDate> {
    match cell {
        CellValue::DateTime(dt) => Some(ParsedDate {
            date: dt.date(),
            two_digit_year: false,
        }),
        CellValue::Text(text) => parse_date_text(text),
        _ => None,
    }
}

/// Most frequent month among the parsed dates. Ties go to the earliest month.
fn modal_month(dates: &[ParsedDate]) -> Option<MonthLabel> {
    let mut counts: BTreeMap<MonthLabel, usize> = BTreeMap::new();
    for parsed in dates {
        *counts.entry(MonthLabel::from_date(parsed.date)).or_default() += 1;
    }
    let mut best: Option<(MonthLabel, usize)> = None;
    for (label, count) in counts {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((label, count));
        }
    }
    best.map(|(label, _)| label)
}

fn label_from_rows(batch: &Batch, config: &LedgerConfig) -> Option<LabelResolution> {
    let column = batch.columns.iter().find(|c| config.is_date_column(c))?;
    let parsed: Vec<ParsedDate> = batch
        .rows
        .iter()
        .filter_map(|row| parse_date_cell(&batch.cell(row, column)))
        .collect();
    debug!(
        "Parsed {} of {} value(s) in date column '{}'",
        parsed.len(),
        batch.len(),
        column
    );

    let label = modal_month(&parsed)?;
    let two_digit_year = parsed
        .iter()
        .any(|p| p.two_digit_year && MonthLabel::from_date(p.date) == label);
    Some(LabelResolution {
        label,
        source: LabelSource::Data,
        two_digit_year,
    })
}

/// Looks for a date in a file name, e.g. `выписка_12_марта_2024.xlsx`.
pub fn label_from_filename(filename: &str) -> Option<LabelResolution> {
    let joined = filename_split_re()
        .split(file_stem(filename))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    if let Some(caps) = textual_date_re().captures(&joined) {
        if let Some(month) = caps.get(2).and_then(|m| month_from_name(m.as_str())) {
            if let Some(year) = capture_number(&caps, 3) {
                let (year, two_digit_year) = expand_two_digit_year(year);
                if let Some(label) = MonthLabel::new(year, month) {
                    return Some(LabelResolution {
                        label,
                        source: LabelSource::Filename,
                        two_digit_year,
                    });
                }
            }
        }
    }

    let caps = numeric_date_re().captures(&joined)?;
    let month = capture_number(&caps, 2)?;
    let (year, two_digit_year) = expand_two_digit_year(capture_number(&caps, 3)?);
    let label = MonthLabel::new(year, u32::try_from(month).ok()?)?;
    Some(LabelResolution {
        label,
        source: LabelSource::Filename,
        two_digit_year,
    })
}

/// Picks the month a batch belongs to: the modal month of its date column,
/// else a date in the file name, else [`MonthLabel::SENTINEL`].
pub fn resolve_label(batch: &Batch, filename: &str, config: &LedgerConfig) -> LabelResolution {
    let resolution = label_from_rows(batch, config)
        .or_else(|| label_from_filename(filename))
        .unwrap_or(LabelResolution {
            label: MonthLabel::SENTINEL,
            source: LabelSource::Fallback,
            two_digit_year: false,
        });

    if resolution.two_digit_year {
        warn!(
            "Two-digit year read as {} for '{}'; dates before 2000 or after 2099 will be mislabelled",
            resolution.label.year(),
            filename
        );
    }
    info!(
        "Resolved month label {} from {:?} for '{}'",
        resolution.label, resolution.source, filename
    );
    resolution
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TransactionRow;

    fn dated_batch(column: &str, dates: &[CellValue]) -> Batch {
        Batch {
            columns: vec![column.into(), "Категория".into(), "Сумма в рублях".into()],
            category_column: "Категория".into(),
            amount_column: "Сумма в рублях".into(),
            rows: dates
                .iter()
                .map(|d| TransactionRow::new("Еда", 1.0).with_field(column, d.clone()))
                .collect(),
        }
    }

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_month_label_format_and_parse() {
        let label = MonthLabel::new(2024, 3).unwrap();
        assert_eq!(label.to_string(), "03.2024");
        assert_eq!("03.2024".parse::<MonthLabel>().unwrap(), label);
        assert_eq!(MonthLabel::SENTINEL.to_string(), "01.1970");
        assert!("3.2024".parse::<MonthLabel>().is_err());
        assert!("13.2024".parse::<MonthLabel>().is_err());
        assert!("Лист1".parse::<MonthLabel>().is_err());
        assert!("03.2024x".parse::<MonthLabel>().is_err());
    }

    #[test]
    fn test_month_label_ordering() {
        let mut labels: Vec<MonthLabel> = ["03.2024", "01.2023", "12.2023"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        labels.sort();
        let names: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        assert_eq!(names, vec!["01.2023", "12.2023", "03.2024"]);
    }

    #[test]
    fn test_month_from_name_longest_prefix() {
        assert_eq!(month_from_name("марта"), Some(3));
        assert_eq!(month_from_name("мая"), Some(5));
        assert_eq!(month_from_name("сент."), Some(9));
        assert_eq!(month_from_name("Декабря"), Some(12));
        assert_eq!(month_from_name("ма"), None);
        assert_eq!(month_from_name("foo"), None);
    }

    #[test]
    fn test_parse_date_text_variants() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        assert_eq!(parse_date_text("01.03.2024").unwrap().date, d(2024, 3, 1));
        assert_eq!(parse_date_text("15/11/23").unwrap().date, d(2023, 11, 15));
        assert!(parse_date_text("15/11/23").unwrap().two_digit_year);
        assert_eq!(parse_date_text("05-06-2024 12:30").unwrap().date, d(2024, 6, 5));
        assert_eq!(parse_date_text("12 мар. 2024").unwrap().date, d(2024, 3, 12));
        assert_eq!(parse_date_text("1\u{a0}июня,\u{a0}2024").unwrap().date, d(2024, 6, 1));
        assert!(parse_date_text("31.02.2024").is_none());
        assert!(parse_date_text("вчера").is_none());
    }

    #[test]
    fn test_resolve_from_single_month_column_ignores_filename() {
        let batch = dated_batch(
            "Дата операции",
            &[text("01.03.2024"), text("15.03.2024"), text("31.03.2024")],
        );
        let resolution = resolve_label(&batch, "выписка 1 января 2020.xlsx", &LedgerConfig::default());
        assert_eq!(resolution.label.to_string(), "03.2024");
        assert_eq!(resolution.source, LabelSource::Data);
    }

    #[test]
    fn test_resolve_takes_modal_month() {
        let batch = dated_batch(
            "Date",
            &[
                text("28.02.2024"),
                text("01.03.2024"),
                text("02.03.2024"),
                text("garbage"),
            ],
        );
        let resolution = resolve_label(&batch, "x.xlsx", &LedgerConfig::default());
        assert_eq!(resolution.label.to_string(), "03.2024");
    }

    #[test]
    fn test_modal_tie_picks_earliest_month() {
        let batch = dated_batch("Дата", &[text("01.04.2024"), text("01.03.2024")]);
        let resolution = resolve_label(&batch, "x.xlsx", &LedgerConfig::default());
        assert_eq!(resolution.label.to_string(), "03.2024");
    }

    #[test]
    fn test_native_date_cells_are_used() {
        let dt = NaiveDate::from_ymd_opt(2023, 12, 5)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let batch = dated_batch("Дата платежа", &[CellValue::DateTime(dt)]);
        let resolution = resolve_label(&batch, "x.xlsx", &LedgerConfig::default());
        assert_eq!(resolution.label.to_string(), "12.2023");
    }

    #[test]
    fn test_filename_fallback_prefers_textual_pattern() {
        let resolution = label_from_filename("/tmp/выписка_12_марта_2024_01.02.2023.xlsx").unwrap();
        assert_eq!(resolution.label.to_string(), "03.2024");
        assert_eq!(resolution.source, LabelSource::Filename);

        let resolution = label_from_filename("report 05.11.24.xlsx").unwrap();
        assert_eq!(resolution.label.to_string(), "11.2024");
        assert!(resolution.two_digit_year);
    }

    #[test]
    fn test_filename_hyphens_are_separators() {
        assert!(label_from_filename("statement-01-03-2024.xlsx").is_none());
        assert!(label_from_filename("report 01.13.2024.xlsx").is_none());
    }

    #[test]
    fn test_resolve_falls_back_to_sentinel() {
        let batch = dated_batch("Категория2", &[text("01.03.2024")]);
        let resolution = resolve_label(&batch, "export.xlsx", &LedgerConfig::default());
        assert_eq!(resolution.label, MonthLabel::SENTINEL);
        assert_eq!(resolution.source, LabelSource::Fallback);
    }

    #[test]
    fn test_unparseable_date_column_falls_through_to_filename() {
        let batch = dated_batch("Дата", &[text("n/a")]);
        let resolution = resolve_label(&batch, "выписка 3 мая 2025.xlsx", &LedgerConfig::default());
        assert_eq!(resolution.label.to_string(), "05.2025");
        assert_eq!(resolution.source, LabelSource::Filename);
    }
}

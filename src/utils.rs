use chrono::{NaiveDate, NaiveDateTime, TimeDelta, Timelike};

const SECONDS_PER_DAY: f64 = 86_400.0;

fn excel_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Converts an Excel serial date (1900 date system) to a timestamp rounded to
/// whole seconds. Rounding keeps values stable across write/read cycles.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let seconds = (serial * SECONDS_PER_DAY).round() as i64;
    excel_epoch().checked_add_signed(TimeDelta::try_seconds(seconds)?)
}

pub fn datetime_to_excel_serial(datetime: &NaiveDateTime) -> f64 {
    let seconds = (*datetime - excel_epoch()).num_seconds();
    seconds as f64 / SECONDS_PER_DAY
}

pub fn has_time_component(datetime: &NaiveDateTime) -> bool {
    datetime.num_seconds_from_midnight() != 0
}

pub fn format_datetime(datetime: &NaiveDateTime) -> String {
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Parses amounts exported as text, e.g. `"1 234,50"` or `"-99.9"`.
pub fn parse_amount_text(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Years written with two digits are taken to be in the 2000s.
pub fn expand_two_digit_year(year: i32) -> (i32, bool) {
    if year < 100 {
        (year + 2000, true)
    } else {
        (year, false)
    }
}

/// Final path component without its extension.
pub fn file_stem(filename: &str) -> &str {
    let base = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename);
    match base.rfind('.') {
        Some(idx) if idx > 0 => &base[..idx],
        _ => base,
    }
}

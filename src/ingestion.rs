use crate::error::{LedgerError, Result};
use crate::record::{CellValue, RawTable};
use crate::schema::LedgerConfig;
use crate::utils::excel_serial_to_datetime;
use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::path::Path;

/// A sheet's cells, row-major, anchored at A1.
pub type Grid = Vec<Vec<CellValue>>;

pub fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => match excel_serial_to_datetime(dt.as_f64()) {
            Some(datetime) => CellValue::DateTime(datetime),
            None => CellValue::Number(dt.as_f64()),
        },
        other => CellValue::text(other.to_string()),
    }
}

/// Converts a calamine range into a grid whose (0, 0) is cell A1, so that
/// positions match what the renderer wrote.
pub fn grid_from_range(range: &Range<Data>) -> Grid {
    let Some((start_row, start_col)) = range.start() else {
        return Vec::new();
    };
    let (height, width) = range.get_size();
    let total_width = start_col as usize + width;

    let mut grid: Grid = vec![vec![CellValue::Empty; total_width]; start_row as usize];
    for row in range.rows() {
        let mut cells = vec![CellValue::Empty; start_col as usize];
        cells.extend(row.iter().map(cell_from_data));
        grid.push(cells);
    }
    debug_assert_eq!(grid.len(), start_row as usize + height);
    grid
}

fn row_is_blank(row: &[CellValue]) -> bool {
    row.iter().all(CellValue::is_empty)
}

/// Treats the first non-blank row as the header. Blank header cells are
/// named `Unnamed: <index>`.
pub fn table_from_grid(grid: &Grid) -> Option<RawTable> {
    let header_idx = grid.iter().position(|row| !row_is_blank(row))?;
    let width = grid[header_idx..]
        .iter()
        .map(|row| {
            row.iter()
                .rposition(|cell| !cell.is_empty())
                .map_or(0, |idx| idx + 1)
        })
        .max()
        .unwrap_or(0);

    let columns: Vec<String> = (0..width)
        .map(|idx| match grid[header_idx].get(idx) {
            Some(cell) if !cell.is_empty() => cell.display().trim().to_string(),
            _ => format!("Unnamed: {}", idx),
        })
        .collect();

    let rows = grid[header_idx + 1..]
        .iter()
        .filter(|row| !row_is_blank(row))
        .map(|row| row.iter().take(width).cloned().collect())
        .collect();

    Some(RawTable::new(columns, rows))
}

/// Formula text keyed by A1-anchored `(row, col)`, without the leading `=`.
pub type Formulas = BTreeMap<(u32, u16), String>;

/// One sheet of an existing workbook: cached values plus any formulas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetCells {
    pub grid: Grid,
    pub formulas: Formulas,
}

pub fn formulas_from_range(range: &Range<String>) -> Formulas {
    let Some((start_row, start_col)) = range.start() else {
        return Formulas::new();
    };
    range
        .used_cells()
        .filter(|(_, _, formula)| !formula.is_empty())
        .filter_map(|(row, col, formula)| {
            let col = u16::try_from(start_col as usize + col).ok()?;
            Some(((start_row + row as u32, col), formula.clone()))
        })
        .collect()
}

pub fn read_workbook_sheets(path: &Path) -> Result<Vec<(String, SheetCells)>> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let grid = grid_from_range(&workbook.worksheet_range(&name)?);
        let formulas = formulas_from_range(&workbook.worksheet_formula(&name)?);
        if !formulas.is_empty() {
            debug!("Sheet '{}' carries {} formula(s)", name, formulas.len());
        }
        sheets.push((name, SheetCells { grid, formulas }));
    }
    Ok(sheets)
}

/// Reads the transaction rows of an uploaded export.
pub fn read_input_table(path: &Path, config: &LedgerConfig) -> Result<RawTable> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let names = workbook.sheet_names();
    let sheet = if names.iter().any(|n| *n == config.input_sheet) {
        config.input_sheet.clone()
    } else {
        let first = names.first().cloned().ok_or_else(|| {
            LedgerError::EmptyInput(format!("{} contains no sheets", path.display()))
        })?;
        warn!(
            "Sheet '{}' not found in {}, reading '{}' instead",
            config.input_sheet,
            path.display(),
            first
        );
        first
    };

    let range = workbook.worksheet_range(&sheet)?;
    let table = table_from_grid(&grid_from_range(&range)).ok_or_else(|| {
        LedgerError::EmptyInput(format!("sheet '{}' in {}", sheet, path.display()))
    })?;
    debug!(
        "Read {} row(s) and {} column(s) from sheet '{}'",
        table.rows.len(),
        table.columns.len(),
        sheet
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_table_from_grid_names_blank_headers() {
        let grid = vec![
            vec![text("Категория"), CellValue::Empty, text("Сумма в рублях")],
            vec![text("Еда"), text("x"), CellValue::Number(10.0)],
        ];
        let table = table_from_grid(&grid).unwrap();
        assert_eq!(table.columns, vec!["Категория", "Unnamed: 1", "Сумма в рублях"]);
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn test_table_from_grid_skips_blank_rows() {
        let grid = vec![
            vec![CellValue::Empty, CellValue::Empty],
            vec![text("A"), text("B")],
            vec![CellValue::Empty, CellValue::Empty],
            vec![text("1"), CellValue::Number(2.0)],
        ];
        let table = table_from_grid(&grid).unwrap();
        assert_eq!(table.columns, vec!["A", "B"]);
        assert_eq!(table.rows, vec![vec![text("1"), CellValue::Number(2.0)]]);
    }

    #[test]
    fn test_table_from_empty_grid() {
        assert!(table_from_grid(&Vec::new()).is_none());
    }

    #[test]
    fn test_formulas_are_anchored_at_a1() {
        let mut range: Range<String> = Range::new((2, 1), (3, 2));
        range.set_value((2, 2), "B3*2".to_string());
        range.set_value((3, 1), String::new());

        let formulas = formulas_from_range(&range);
        assert_eq!(formulas.len(), 1);
        assert_eq!(formulas.get(&(2, 2)).map(String::as_str), Some("B3*2"));
    }

    #[test]
    fn test_cell_from_data() {
        assert_eq!(cell_from_data(&Data::Int(3)), CellValue::Number(3.0));
        assert_eq!(cell_from_data(&Data::String(String::new())), CellValue::Empty);
        assert_eq!(cell_from_data(&Data::Bool(true)), CellValue::Bool(true));
    }
}

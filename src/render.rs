//! Lays out one ledger worksheet: the cleaned table on the left, the
//! category summary on the right, the total-expenses line under it and a
//! column chart of the category sums.

use crate::cleaner::CleanedBatch;
use crate::error::Result;
use crate::ingestion::SheetCells;
use crate::record::CellValue;
use crate::schema::LedgerConfig;
use crate::utils::{datetime_to_excel_serial, has_time_component};
use log::debug;
use rust_xlsxwriter::{
    Chart, ChartType, Color, Format, FormatAlign, FormatBorder, Formula, Worksheet,
};
use std::collections::{BTreeMap, HashMap};

pub const HEADER_FILL: u32 = 0xE5F1FB;
pub const CURRENCY_FORMAT: &str = "#,##0.00";
pub const DATE_FORMAT: &str = "dd.mm.yyyy";
pub const DATETIME_FORMAT: &str = "dd.mm.yyyy hh:mm:ss";
pub const MIN_COLUMN_WIDTH: f64 = 10.0;
pub const MAX_COLUMN_WIDTH: f64 = 60.0;
const CHART_STYLE: u8 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum NumberStyle {
    #[default]
    General,
    Currency,
    Date,
    DateTime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CellStyle {
    pub bold: bool,
    pub header_fill: bool,
    pub centered: bool,
    pub right_aligned: bool,
    pub number: NumberStyle,
    pub border_top: bool,
    pub border_bottom: bool,
    pub border_left: bool,
    pub border_right: bool,
}

impl CellStyle {
    fn is_default(&self) -> bool {
        *self == CellStyle::default()
    }

    fn to_format(self) -> Format {
        let mut format = Format::new();
        if self.bold {
            format = format.set_bold();
        }
        if self.header_fill {
            format = format.set_background_color(Color::RGB(HEADER_FILL));
        }
        if self.centered {
            format = format.set_align(FormatAlign::Center);
        }
        if self.right_aligned {
            format = format.set_align(FormatAlign::Right);
        }
        format = match self.number {
            NumberStyle::General => format,
            NumberStyle::Currency => format.set_num_format(CURRENCY_FORMAT),
            NumberStyle::Date => format.set_num_format(DATE_FORMAT),
            NumberStyle::DateTime => format.set_num_format(DATETIME_FORMAT),
        };
        if self.border_top {
            format = format.set_border_top(FormatBorder::Thick);
        }
        if self.border_bottom {
            format = format.set_border_bottom(FormatBorder::Thick);
        }
        if self.border_left {
            format = format.set_border_left(FormatBorder::Thick);
        }
        if self.border_right {
            format = format.set_border_right(FormatBorder::Thick);
        }
        format
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaidCell {
    pub value: CellValue,
    pub style: CellStyle,
}

/// Cell ranges are `(first_row, last_row, column)`, inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartPlacement {
    pub anchor_row: u32,
    pub anchor_col: u16,
    pub series_name: String,
    pub categories: (u32, u32, u16),
    pub values: (u32, u32, u16),
}

/// Everything that ends up on a ledger sheet, positioned but not yet written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetLayout {
    pub cells: BTreeMap<(u32, u16), LaidCell>,
    pub column_widths: BTreeMap<u16, f64>,
    pub chart: Option<ChartPlacement>,
    pub summary_col: u16,
    pub total_row: u32,
}

impl SheetLayout {
    pub fn cell(&self, row: u32, col: u16) -> Option<&LaidCell> {
        self.cells.get(&(row, col))
    }

    fn put(&mut self, row: u32, col: u16, value: CellValue) -> &mut CellStyle {
        let cell = self.cells.entry((row, col)).or_default();
        cell.value = value;
        &mut cell.style
    }

    fn style_mut(&mut self, row: u32, col: u16) -> &mut CellStyle {
        &mut self.cells.entry((row, col)).or_default().style
    }

    fn autosize(&mut self, col: u16, header: &str, values: impl Iterator<Item = String>) {
        let longest = values
            .map(|v| v.chars().count())
            .chain(std::iter::once(header.chars().count()))
            .max()
            .unwrap_or(0);
        let width = (longest + 2) as f64;
        self.column_widths
            .insert(col, width.clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH));
    }

    fn currency_column(&mut self, col: u16, first_row: u32, last_row: u32) {
        for row in first_row..=last_row {
            let style = self.style_mut(row, col);
            style.number = NumberStyle::Currency;
            style.right_aligned = true;
        }
    }

    fn thick_frame(&mut self, first_row: u32, last_row: u32, first_col: u16, last_col: u16) {
        for row in first_row..=last_row {
            for col in first_col..=last_col {
                let style = self.style_mut(row, col);
                style.border_top |= row == first_row;
                style.border_bottom |= row == last_row;
                style.border_left |= col == first_col;
                style.border_right |= col == last_col;
            }
        }
    }
}

fn col_index(idx: usize) -> u16 {
    u16::try_from(idx).unwrap_or(u16::MAX)
}

fn row_index(idx: usize) -> u32 {
    u32::try_from(idx).unwrap_or(u32::MAX)
}

/// Computes the full sheet layout for a cleaned batch.
pub fn layout_sheet(cleaned: &CleanedBatch, config: &LedgerConfig) -> SheetLayout {
    let batch = &cleaned.batch;
    let mut layout = SheetLayout::default();

    // Cleaned table at A1.
    for (c, column) in batch.columns.iter().enumerate() {
        let col = col_index(c);
        layout.put(0, col, CellValue::text(column.clone()));
        for (r, row) in batch.rows.iter().enumerate() {
            let value = batch.cell(row, column);
            let number = match &value {
                CellValue::DateTime(dt) if has_time_component(dt) => NumberStyle::DateTime,
                CellValue::DateTime(_) => NumberStyle::Date,
                _ => NumberStyle::General,
            };
            layout.put(row_index(r + 1), col, value).number = number;
        }
        layout.autosize(
            col,
            column,
            batch.rows.iter().map(|row| batch.cell(row, column).display()),
        );
    }
    let main_last_row = row_index(batch.len());
    let main_last_col = col_index(batch.columns.len().saturating_sub(1));
    if let Some(amount_idx) = batch.columns.iter().position(|c| *c == batch.amount_column) {
        if !batch.is_empty() {
            layout.currency_column(col_index(amount_idx), 1, main_last_row);
        }
    }
    layout.thick_frame(0, main_last_row, 0, main_last_col);

    // Category summary, one blank column to the right of the cleaned table.
    let cat_col = col_index(batch.columns.len() + 1);
    let sum_col = cat_col + 1;
    let categories = cleaned.aggregate.len();
    layout.summary_col = cat_col;

    layout.put(0, cat_col, CellValue::text(config.summary_title.clone())).bold = true;
    for (col, header) in [(cat_col, &config.category_column), (sum_col, &config.amount_column)] {
        let style = layout.put(1, col, CellValue::text(header.clone()));
        style.bold = true;
        style.header_fill = true;
        style.centered = true;
    }
    for (i, (category, sum)) in cleaned.aggregate.iter().enumerate() {
        let row = row_index(i + 2);
        layout.put(row, cat_col, CellValue::text(category));
        layout.put(row, sum_col, CellValue::Number(sum));
    }
    layout.autosize(
        cat_col,
        &config.category_column,
        cleaned.aggregate.iter().map(|(name, _)| name.to_string()),
    );
    layout.autosize(
        sum_col,
        &config.amount_column,
        cleaned
            .aggregate
            .iter()
            .map(|(_, sum)| CellValue::Number(sum).display()),
    );

    let cat_last_row = row_index(categories + 1);
    let total_row = cat_last_row + 2;
    layout.total_row = total_row;
    layout
        .put(total_row, cat_col, CellValue::text(config.total_label.clone()))
        .bold = true;
    layout.put(total_row, sum_col, CellValue::Number(cleaned.total));

    if categories > 0 {
        layout.currency_column(sum_col, 2, cat_last_row);
        layout.thick_frame(1, cat_last_row, cat_col, sum_col);
        layout.chart = Some(ChartPlacement {
            anchor_row: total_row + 2,
            anchor_col: cat_col,
            series_name: config.amount_column.clone(),
            categories: (2, cat_last_row, cat_col),
            values: (2, cat_last_row, sum_col),
        });
    }

    layout
}

fn write_cell(worksheet: &mut Worksheet, row: u32, col: u16, cell: &LaidCell, format: &Format) -> Result<()> {
    match &cell.value {
        CellValue::Empty => {
            if !cell.style.is_default() {
                worksheet.write_blank(row, col, format)?;
            }
        }
        CellValue::Text(s) => {
            worksheet.write_string_with_format(row, col, s, format)?;
        }
        CellValue::Number(n) => {
            worksheet.write_number_with_format(row, col, *n, format)?;
        }
        CellValue::Bool(b) => {
            worksheet.write_boolean_with_format(row, col, *b, format)?;
        }
        CellValue::DateTime(dt) => {
            worksheet.write_number_with_format(row, col, datetime_to_excel_serial(dt), format)?;
        }
    }
    Ok(())
}

fn insert_chart(
    worksheet: &mut Worksheet,
    sheet_name: &str,
    placement: &ChartPlacement,
    config: &LedgerConfig,
) -> Result<()> {
    let (cat_first, cat_last, cat_col) = placement.categories;
    let (val_first, val_last, val_col) = placement.values;

    let mut chart = Chart::new(ChartType::Column);
    chart.set_style(CHART_STYLE);
    chart
        .add_series()
        .set_name(placement.series_name.as_str())
        .set_categories((sheet_name, cat_first, cat_col, cat_last, cat_col))
        .set_values((sheet_name, val_first, val_col, val_last, val_col));
    chart.x_axis().set_name(config.chart_x_axis_title.as_str());
    chart.y_axis().set_name(config.chart_y_axis_title.as_str());

    worksheet.insert_chart(placement.anchor_row, placement.anchor_col, &chart)?;
    Ok(())
}

/// Writes a cleaned batch onto `worksheet`, which must be empty and already
/// carry `sheet_name` (the chart refers to its own cells by sheet name).
pub fn render_sheet(
    worksheet: &mut Worksheet,
    sheet_name: &str,
    cleaned: &CleanedBatch,
    config: &LedgerConfig,
) -> Result<()> {
    render_layout(worksheet, sheet_name, &layout_sheet(cleaned, config), config)
}

/// Writes a computed layout. A chart that cannot be built is skipped, never
/// reported.
pub fn render_layout(
    worksheet: &mut Worksheet,
    sheet_name: &str,
    layout: &SheetLayout,
    config: &LedgerConfig,
) -> Result<()> {
    let mut formats: HashMap<CellStyle, Format> = HashMap::new();
    for (&(row, col), cell) in &layout.cells {
        let format = formats
            .entry(cell.style)
            .or_insert_with(|| cell.style.to_format());
        write_cell(worksheet, row, col, cell, format)?;
    }
    for (&col, &width) in &layout.column_widths {
        worksheet.set_column_width(col, width)?;
    }

    if let Some(placement) = &layout.chart {
        if let Err(err) = insert_chart(worksheet, sheet_name, placement, config) {
            debug!("Skipping chart on sheet '{}': {}", sheet_name, err);
        }
    }
    Ok(())
}

/// Writes cell values and formulas, keeping dates readable. Used for sheets
/// the engine keeps but does not own. Formulas carry their cached value as
/// the result.
pub fn render_cells(worksheet: &mut Worksheet, cells: &SheetCells) -> Result<()> {
    let plain = Format::new();
    let date = CellStyle {
        number: NumberStyle::Date,
        ..CellStyle::default()
    }
    .to_format();
    let datetime = CellStyle {
        number: NumberStyle::DateTime,
        ..CellStyle::default()
    }
    .to_format();

    for (r, row) in cells.grid.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            let (row, col) = (row_index(r), col_index(c));
            if cells.formulas.contains_key(&(row, col)) {
                continue;
            }
            let format = match value {
                CellValue::DateTime(dt) if has_time_component(dt) => &datetime,
                CellValue::DateTime(_) => &date,
                _ => &plain,
            };
            let cell = LaidCell {
                value: value.clone(),
                style: CellStyle::default(),
            };
            write_cell(worksheet, row, col, &cell, format)?;
        }
    }

    for (&(row, col), text) in &cells.formulas {
        let cached = cells
            .grid
            .get(row as usize)
            .and_then(|cells| cells.get(col as usize))
            .map(CellValue::display)
            .unwrap_or_default();
        let mut formula = Formula::new(text.as_str());
        if !cached.is_empty() {
            formula = formula.set_result(cached);
        }
        worksheet.write_formula(row, col, formula)?;
    }
    Ok(())
}

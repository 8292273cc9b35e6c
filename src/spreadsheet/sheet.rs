use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::IngestOptions;
use crate::spreadsheet::SpreadsheetError;
use crate::table::Column;
use crate::table::ColumnType;
use crate::table::Table;
use crate::table::Value;
use log::debug;
use log::warn;
use std::collections::HashSet;

/// Cells collected from one sheet (or one CSV document) before typing.
pub(crate) struct Sheet {
    /// Sheet name
    pub(crate) name: String,
    /// Non-empty cells in row-major order
    pub(crate) cells: Vec<Cell>,
    /// Field count of each CSV record, indexed by row; empty for workbooks
    pub(crate) record_widths: Vec<usize>,
    /// Actual data range (determined from cell data)
    pub(crate) row_lower_bound: Option<usize>,
    pub(crate) row_upper_bound: Option<usize>,
    pub(crate) col_lower_bound: Option<usize>,
    pub(crate) col_upper_bound: Option<usize>,
}

/// One grid row: its sheet row index and one slot per column between the column bounds.
type GridRow<'a> = (usize, Vec<Option<&'a Cell>>);

impl Sheet {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            cells: Vec::new(),
            record_widths: Vec::new(),
            row_lower_bound: None,
            row_upper_bound: None,
            col_lower_bound: None,
            col_upper_bound: None,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Adds a cell to the sheet, updating the data range.
    pub(crate) fn push(&mut self, cell: Cell) {
        self.update_bound(cell.row, cell.col);
        self.cells.push(cell);
    }

    fn update_bound(&mut self, row: usize, col: usize) {
        if self.row_lower_bound.map(|lower| row < lower).unwrap_or(true) {
            self.row_lower_bound = Some(row);
        }
        if self.row_upper_bound.map(|upper| upper < row).unwrap_or(true) {
            self.row_upper_bound = Some(row);
        }
        if self.col_lower_bound.map(|lower| col < lower).unwrap_or(true) {
            self.col_lower_bound = Some(col);
        }
        if self.col_upper_bound.map(|upper| upper < col).unwrap_or(true) {
            self.col_upper_bound = Some(col);
        }
    }

    /// Sorts the cells into row-major order; a later cell at the same position wins.
    pub(crate) fn finish(&mut self) {
        self.cells.sort_by_key(|cell| (cell.row, cell.col));
        let mut deduplicated: Vec<Cell> = Vec::with_capacity(self.cells.len());
        for cell in self.cells.drain(..) {
            match deduplicated.last_mut() {
                Some(last) if last.row == cell.row && last.col == cell.col => *last = cell,
                _ => deduplicated.push(cell),
            }
        }
        self.cells = deduplicated;
    }

    /// Every row between the row bounds as a dense slice of optional cells.
    fn grid(&self) -> Vec<GridRow<'_>> {
        let (Some(row_lower), Some(row_upper), Some(col_lower), Some(col_upper)) = (
            self.row_lower_bound,
            self.row_upper_bound,
            self.col_lower_bound,
            self.col_upper_bound,
        ) else {
            return Vec::new();
        };

        let width = col_upper - col_lower + 1;
        let mut grid: Vec<GridRow> = (row_lower..=row_upper)
            .map(|row| (row, vec![None; width]))
            .collect();
        for cell in &self.cells {
            grid[cell.row - row_lower].1[cell.col - col_lower] = Some(cell);
        }
        grid
    }

    /// Converts the collected cells into the bronze table.
    ///
    /// The header row is located first (see [`IngestOptions::header_hint`]); rows
    /// above it are ignored. Column types are merged from the cell types of each
    /// column; a column mixing kinds becomes varchar.
    pub(crate) fn to_table(&self, options: &IngestOptions) -> Result<Table, SpreadsheetError> {
        let grid = self.grid();
        if grid.is_empty() {
            return Err(SpreadsheetError::EmptySheet(self.name.to_owned()));
        }

        let header_position = self.header_position(&grid, &options.header_hint)?;
        let (header_row, header) = &grid[header_position];
        let col_lower = self.col_lower_bound.unwrap_or_default();
        let body: Vec<&GridRow> = grid[header_position + 1..]
            .iter()
            .filter(|(_, cells)| !options.skip_empty_rows || cells.iter().any(Option::is_some))
            .collect();

        if let Some(expected) = self.record_widths.get(*header_row) {
            for (row, cells) in &body {
                let found = self.record_widths.get(*row).copied().unwrap_or_default();
                if found != *expected && cells.iter().any(Option::is_some) {
                    return Err(SpreadsheetError::RaggedRecord {
                        record: row + 1,
                        expected: *expected,
                        found,
                    });
                }
            }
        }

        let mut names = Vec::with_capacity(header.len());
        let mut used = HashSet::with_capacity(header.len());
        let mut columns = Vec::with_capacity(header.len());
        let mut positions = Vec::with_capacity(header.len());
        for (position, header_cell) in header.iter().enumerate() {
            let title = match header_cell {
                Some(cell) => Some(self.cell_text(cell)?).filter(|text| !text.trim().is_empty()),
                None => None,
            };
            let has_data = body.iter().any(|(_, cells)| cells[position].is_some());
            if title.is_none() && !has_data {
                debug!("Drop empty column {} of sheet '{}'", col_lower + position + 1, self.name);
                continue;
            }

            let base = title.unwrap_or_else(|| format!("column{}", col_lower + position + 1));
            let mut name = base.to_owned();
            let mut suffix = 0usize;
            while used.contains(&name) {
                suffix += 1;
                name = format!("{base}.{suffix}");
            }
            used.insert(name.to_owned());
            names.push(name);
            positions.push(position);
        }

        for (name, position) in names.into_iter().zip(&positions) {
            let kind = ColumnType::detect(
                body.iter()
                    .map(|(_, cells)| cells[*position].and_then(Cell::column_type)),
            );
            columns.push(Column::new(name, kind));
        }

        let mut rows = Vec::with_capacity(body.len());
        for (_, cells) in &body {
            let mut record = Vec::with_capacity(columns.len());
            for (column, position) in columns.iter().zip(&positions) {
                let value = match cells[*position] {
                    Some(cell) => cell.to_value(column.kind).map_err(|message| {
                        SpreadsheetError::CellValueError(self.name.to_owned(), cell.reference(), message)
                    })?,
                    None => Value::Null,
                };
                record.push(value);
            }
            rows.push(record);
        }

        Ok(Table::new(columns, rows)?)
    }

    /// Index into `grid` of the header row.
    fn header_position(&self, grid: &[GridRow], hints: &[String]) -> Result<usize, SpreadsheetError> {
        let first_non_empty = grid
            .iter()
            .position(|(_, cells)| cells.iter().any(Option::is_some))
            .unwrap_or_default();
        if hints.is_empty() {
            return Ok(first_non_empty);
        }

        let wanted: Vec<&str> = hints.iter().map(|hint| hint.trim()).collect();
        for (position, (_, cells)) in grid.iter().enumerate() {
            let mut texts = HashSet::new();
            for cell in cells.iter().flatten() {
                texts.insert(self.cell_text(cell)?.trim().to_owned());
            }
            if wanted.iter().all(|hint| texts.contains(*hint)) {
                debug!("Header of sheet '{}' found at row {}", self.name, grid[position].0 + 1);
                return Ok(position);
            }
        }

        warn!(
            "No row of sheet '{}' contains all header hints {:?}; using row {}",
            self.name,
            wanted,
            grid[first_non_empty].0 + 1
        );
        Ok(first_non_empty)
    }

    fn cell_text(&self, cell: &Cell) -> Result<String, SpreadsheetError> {
        cell.to_text()
            .map_err(|message| SpreadsheetError::CellValueError(self.name.to_owned(), cell.reference(), message))
    }
}

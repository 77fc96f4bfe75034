use crate::spreadsheet::cell::Cell;
use std::collections::HashMap;

/// A loaded worksheet: the non-empty cells plus a position index.
///
/// The grid size follows the last used row and column, counted from 0, so a
/// sheet whose only cell is `C5` has 5 rows and 3 columns.
#[derive(Debug, Clone)]
pub struct Sheet {
    name: String,
    cells: Vec<Cell>,
    indexes: HashMap<(usize, usize), usize>,
    nrows: usize,
    ncols: usize,
}

impl Sheet {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            cells: Vec::new(),
            indexes: HashMap::new(),
            nrows: 0,
            ncols: 0,
        }
    }

    /// Adds a cell. A later cell at the same position replaces the earlier one.
    pub(crate) fn push(&mut self, cell: Cell) {
        self.nrows = self.nrows.max(cell.row + 1);
        self.ncols = self.ncols.max(cell.col + 1);
        match self.indexes.get(&(cell.row, cell.col)) {
            Some(index) => self.cells[*index] = cell,
            None => {
                self.indexes.insert((cell.row, cell.col), self.cells.len());
                self.cells.push(cell);
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cells in file order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.indexes.get(&(row, col)).map(|index| &self.cells[*index])
    }

    /// The rendered value at a position; positions without a cell, including
    /// those outside the grid, read as an empty string.
    pub fn cell_value(&self, row: usize, col: usize) -> String {
        self.cell(row, col).map(|cell| cell.to_string()).unwrap_or_default()
    }

    /// Rendered values of one row over `0..ncols`.
    pub fn row_values(&self, row: usize) -> Vec<String> {
        (0..self.ncols).map(|col| self.cell_value(row, col)).collect()
    }

    /// Rendered values of one column over `rows`; rows past the grid read as empty.
    pub fn col_values(&self, col: usize, rows: std::ops::RangeInclusive<usize>) -> Vec<String> {
        rows.map(|row| self.cell_value(row, col)).collect()
    }
}

use super::cell::Cell;
use super::utils::fold_text;

/// Unprocessed 2-D grid of cells, one `Vec` per spreadsheet row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSheet {
    pub rows: Vec<Vec<Cell>>,
}

impl RawSheet {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    /// Convenience for fixtures: every non-empty string becomes a text cell.
    pub fn from_strings<R, S>(rows: R) -> Self
    where
        R: IntoIterator<Item = Vec<S>>,
        S: AsRef<str>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|r| r.iter().map(|s| Cell::from(s.as_ref())).collect())
                .collect(),
        }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.width() == 0
    }

    pub fn row(&self, idx: usize) -> Option<&[Cell]> {
        self.rows.get(idx).map(Vec::as_slice)
    }

    /// Discard the first `n` physical rows, blank or not.
    pub fn skip_leading_rows(mut self, n: usize) -> Self {
        self.rows.drain(..n.min(self.rows.len()));
        self
    }

    /// Drop rows that are blank across every column, then columns that are
    /// blank across every remaining row. Ragged rows are padded first so
    /// every row of the result has the same width.
    pub fn prune(&self) -> RawSheet {
        let width = self.width();

        let rows: Vec<Vec<Cell>> = self
            .rows
            .iter()
            .filter(|r| !r.iter().all(Cell::is_blank))
            .map(|r| {
                let mut r = r.clone();
                r.resize(width, Cell::Empty);
                r
            })
            .collect();

        let keep: Vec<usize> = (0..width)
            .filter(|&c| rows.iter().any(|r| !r[c].is_blank()))
            .collect();

        RawSheet {
            rows: rows
                .into_iter()
                .map(|r| keep.iter().map(|&c| r[c].clone()).collect())
                .collect(),
        }
    }

    /// Index of the first row whose first cell contains `marker`,
    /// ignoring case and diacritics.
    pub fn find_row(&self, marker: &str) -> Option<usize> {
        let needle = fold_text(marker);
        self.rows.iter().position(|r| {
            r.first()
                .map(|c| fold_text(&c.to_text()).contains(&needle))
                .unwrap_or(false)
        })
    }
}

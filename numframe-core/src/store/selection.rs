//! Named row/column selections and their extraction

use tracing::{debug, warn};

use super::DataStore;
use crate::block::Element;
use crate::error::{Error, Result, Status};
use crate::interval::{Interval, IntervalSet};
use crate::schema::Order;

/// A named pair of row and column index sets
///
/// An empty half means "every index" of that dimension when the selection is
/// extracted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Selected rows
    pub rows: IntervalSet,

    /// Selected columns
    pub cols: IntervalSet,
}

impl DataStore {
    fn full_rows(&self) -> Result<Interval> {
        Interval::with_len(0, self.rows)
            .map_err(|_| Error::InvalidArgument("the table has no rows".into()))
    }

    fn full_cols(&self) -> Result<Interval> {
        Interval::with_len(0, self.cols)
            .map_err(|_| Error::InvalidArgument("the table has no columns".into()))
    }

    fn check_rows_interval(&self, rows: Interval) -> Result<()> {
        if rows.fits(self.rows) {
            Ok(())
        } else {
            Err(Error::IndexOutOfBounds {
                index: rows.upper(),
                dimension: "rows",
                len: self.rows,
            })
        }
    }

    fn check_cols_interval(&self, cols: Interval) -> Result<()> {
        if cols.fits(self.cols) {
            Ok(())
        } else {
            Err(Error::IndexOutOfBounds {
                index: cols.upper(),
                dimension: "columns",
                len: self.cols,
            })
        }
    }

    /// Add `rows` to the selection `key`, creating it if needed
    pub fn select_rows(&mut self, key: &str, rows: Interval) -> Result<()> {
        self.check_complete()?;
        self.check_rows_interval(rows)?;
        self.selections.entry(key.to_string()).or_default().rows.insert(rows);
        Ok(())
    }

    /// Add `cols` to the selection `key`, creating it if needed
    pub fn select_columns(&mut self, key: &str, cols: Interval) -> Result<()> {
        self.check_complete()?;
        self.check_cols_interval(cols)?;
        self.selections.entry(key.to_string()).or_default().cols.insert(cols);
        Ok(())
    }

    /// Add both `rows` and `cols` to the selection `key`
    ///
    /// Either both halves are extended or neither is.
    pub fn select_slice(&mut self, key: &str, rows: Interval, cols: Interval) -> Result<()> {
        self.check_complete()?;
        let previous = self.selections.get(key).cloned();
        let outcome = self
            .select_rows(key, rows)
            .and_then(|()| self.select_columns(key, cols));
        if outcome.is_err() {
            match previous {
                Some(selection) => {
                    self.selections.insert(key.to_string(), selection);
                }
                None => {
                    self.selections.remove(key);
                }
            }
        }
        outcome
    }

    /// Remove `rows` from the selection `key`
    pub fn remove_rows_from_selection(&mut self, key: &str, rows: Interval) -> Result<Status> {
        self.check_complete()?;
        match self.selections.get_mut(key) {
            Some(selection) => {
                selection.rows.erase(rows);
                Ok(Status::Success)
            }
            None => {
                warn!(selection = key, "cannot remove rows from an unknown selection");
                Ok(Status::UnknownSelection)
            }
        }
    }

    /// Remove `cols` from the selection `key`
    pub fn remove_columns_from_selection(&mut self, key: &str, cols: Interval) -> Result<Status> {
        self.check_complete()?;
        match self.selections.get_mut(key) {
            Some(selection) => {
                selection.cols.erase(cols);
                Ok(Status::Success)
            }
            None => {
                warn!(selection = key, "cannot remove columns from an unknown selection");
                Ok(Status::UnknownSelection)
            }
        }
    }

    /// Drop the selection `key`
    pub fn remove_selection(&mut self, key: &str) -> Status {
        if self.selections.remove(key).is_some() {
            Status::Success
        } else {
            warn!(selection = key, "cannot remove an unknown selection");
            Status::UnknownSelection
        }
    }

    /// The selection `key`, if defined
    pub fn selection(&self, key: &str) -> Option<&Selection> {
        self.selections.get(key)
    }

    /// Whether a selection named `key` exists
    pub fn selection_exists(&self, key: &str) -> bool {
        self.selections.contains_key(key)
    }

    /// Remove from the selection `key` every row holding a missing value
    ///
    /// With `full_rows` every column of the table is inspected, otherwise only
    /// the selection's columns (all columns when it selects none). The
    /// selection is created with every row when it does not exist yet.
    pub fn select_non_missing(&mut self, key: &str, full_rows: bool) -> Result<()> {
        self.check_complete()?;
        let all_rows = self.full_rows()?;
        let all_cols = self.full_cols()?;
        let mut selection = self.selections.get(key).cloned().unwrap_or_default();

        let mut inspected = IntervalSet::new();
        if full_rows || selection.cols.is_empty() {
            inspected.insert(all_cols);
        } else {
            inspected = selection.cols.clone();
        }

        let mut valid = vec![true; self.rows];
        for cols in inspected.iter() {
            for (iv, &head) in self.column_map.range(*cols) {
                let Some(part) = iv.intersect(cols) else { continue };
                let mut first_row = 0;
                for node in self.chain(head) {
                    let block = &self.blocks[node.block];
                    let local_rows = Interval::with_len(0, block.rows())?;
                    let local_cols =
                        Interval::new(part.lower() - node.offset, part.upper() - node.offset)?;
                    block.missing_rows(
                        &mut valid[first_row..first_row + block.rows()],
                        local_rows,
                        local_cols,
                    )?;
                    first_row += block.rows();
                }
            }
        }

        if selection.rows.is_empty() {
            selection.rows.insert(all_rows);
        }
        let mut removed = 0;
        let mut run_start = None;
        for (row, &ok) in valid.iter().chain(std::iter::once(&true)).enumerate() {
            match (ok, run_start) {
                (false, None) => run_start = Some(row),
                (true, Some(start)) => {
                    selection.rows.erase(Interval::new(start, row - 1)?);
                    removed += row - start;
                    run_start = None;
                }
                _ => {}
            }
        }
        debug!(selection = key, removed, "filtered rows with missing values");
        self.selections.insert(key.to_string(), selection);
        Ok(())
    }

    /// Copy the selection `key` into `out` in the requested `order`
    ///
    /// `ld` is the leading dimension of `out`: at least the number of selected
    /// rows for column-major output, or of selected columns for row-major
    /// output. When no selection exists at all the whole table is extracted
    /// and [`Status::FullExtraction`] is returned.
    pub fn extract_selection<T: Element>(
        &self,
        key: &str,
        order: Order,
        ld: usize,
        out: &mut [T],
    ) -> Result<Status> {
        self.check_complete()?;
        let mut status = Status::Success;
        let mut selection = if self.selections.is_empty() {
            warn!(selection = key, "no selection defined, extracting the whole table");
            status = Status::FullExtraction;
            Selection::default()
        } else {
            self.selections
                .get(key)
                .cloned()
                .ok_or_else(|| Error::InvalidArgument(format!("unknown selection '{key}'")))?
        };
        if selection.rows.is_empty() {
            selection.rows.insert(self.full_rows()?);
        }
        if selection.cols.is_empty() {
            selection.cols.insert(self.full_cols()?);
        }

        let nrows = selection.rows.index_count();
        let ncols = selection.cols.index_count();
        let (min_ld, other) = match order {
            Order::ColumnMajor => (nrows, ncols),
            Order::RowMajor => (ncols, nrows),
        };
        if ld < min_ld {
            return Err(Error::InvalidArgument(format!(
                "leading dimension {ld} is smaller than {min_ld}"
            )));
        }
        let needed = ld * (other - 1) + min_ld;
        if out.len() < needed {
            return Err(Error::InvalidArgument(format!(
                "output buffer holds {} elements, {needed} needed",
                out.len()
            )));
        }

        match order {
            Order::ColumnMajor => self.extract_selection_column_major(&selection, ld, out)?,
            Order::RowMajor => {
                let mut scratch = vec![T::default(); nrows * ncols];
                self.extract_selection_column_major(&selection, nrows, &mut scratch)?;
                for (j, column) in scratch.chunks_exact(nrows).enumerate() {
                    for (i, value) in column.iter().enumerate() {
                        out[i * ld + j] = value.clone();
                    }
                }
            }
        }
        Ok(status)
    }

    fn extract_selection_column_major<T: Element>(
        &self,
        selection: &Selection,
        ld: usize,
        out: &mut [T],
    ) -> Result<()> {
        let mut col_offset = 0;
        for cols in selection.cols.iter() {
            let mut at = col_offset * ld;
            for rows in selection.rows.iter() {
                self.extract_slice(*rows, *cols, ld, at, out)?;
                at += rows.len();
            }
            col_offset += cols.len();
        }
        Ok(())
    }
}

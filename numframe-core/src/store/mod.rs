//! Block-structured heterogeneous table
//!
//! A [`DataStore`] is a two dimensional table assembled from independently
//! owned [`Block`]s. Every contiguous column range added with
//! [`DataStore::concatenate_columns`] becomes a *chain*: its head block holds
//! the first rows and each later row block is linked behind it. The column
//! map associates every column range with the head node of its chain.
//!
//! Blocks and chain nodes live in arenas and refer to each other by index, so
//! a row block spanning several chains is stored once and reached from a
//! separate node in each chain.
//!
//! ```text
//!  columns   [0, 1]      [2, 3, 4]
//!  head      node 0      node 1          <- concatenate_columns
//!              |           |
//!  rows      node 2 ---- node 3          <- one row block over both chains
//! ```

mod selection;

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use crate::block::{Block, Element};
use crate::buffer::BlockInput;
use crate::error::{Error, Result};
use crate::interval::{Interval, IntervalMap};
use crate::schema::{Order, ScalarType};

pub use selection::Selection;

type NodeId = usize;

/// Position of a block inside one column chain
#[derive(Debug, Clone, Copy)]
struct ChainNode {
    /// Index of the block in the block arena
    block: usize,

    /// Table column holding the block's first column
    offset: usize,

    /// Node holding the same columns for the following rows
    next: Option<NodeId>,

    /// Node created for the leftmost chain when the block spans several chains
    left_parent: Option<NodeId>,
}

/// Rows added to only part of the table so far
#[derive(Debug, Clone, Copy)]
struct PendingRows {
    /// First column still waiting for data
    next_col: usize,

    /// Row count of the pending row blocks
    rows: usize,
}

/// Heterogeneous table built from typed blocks
#[derive(Debug, Default)]
pub struct DataStore {
    /// Total number of rows
    rows: usize,

    /// Total number of columns
    cols: usize,

    /// Block arena
    blocks: Vec<Block>,

    /// Chain node arena
    nodes: Vec<ChainNode>,

    /// Column range to chain head
    column_map: IntervalMap<NodeId>,

    /// Set while a row concatenation has not yet covered every column
    pending: Option<PendingRows>,

    /// Named selections
    selections: HashMap<String, Selection>,

    /// Column label to index
    label_index: HashMap<String, usize>,

    /// Column index to label
    labels: Vec<Option<String>>,
}

impl DataStore {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows
    pub fn n_rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    pub fn n_cols(&self) -> usize {
        self.cols
    }

    /// Whether the table holds no block
    pub fn is_empty(&self) -> bool {
        self.cols == 0
    }

    /// Whether a row concatenation is waiting for the remaining columns
    pub fn is_row_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn check_complete(&self) -> Result<()> {
        match self.pending {
            Some(pending) => Err(Error::MissingBlock {
                pending: pending.next_col,
            }),
            None => Ok(()),
        }
    }

    fn check_col(&self, idx: usize) -> Result<()> {
        if idx >= self.cols {
            return Err(Error::IndexOutOfBounds {
                index: idx,
                dimension: "columns",
                len: self.cols,
            });
        }
        Ok(())
    }

    fn check_row(&self, idx: usize) -> Result<()> {
        if idx >= self.rows {
            return Err(Error::IndexOutOfBounds {
                index: idx,
                dimension: "rows",
                len: self.rows,
            });
        }
        Ok(())
    }

    /// Head node of the chain holding column `idx`
    fn head(&self, idx: usize) -> Result<(Interval, NodeId)> {
        self.column_map
            .find(idx)
            .map(|(iv, &node)| (iv, node))
            .ok_or_else(|| Error::Internal(format!("column {idx} is not in the column map")))
    }

    /// Nodes of a chain from head to tail
    fn chain(&self, head: NodeId) -> impl Iterator<Item = &ChainNode> + '_ {
        std::iter::successors(self.nodes.get(head), move |node| {
            node.next.and_then(|next| self.nodes.get(next))
        })
    }

    fn chain_type(&self, head: NodeId) -> Result<ScalarType> {
        let node = self
            .nodes
            .get(head)
            .ok_or_else(|| Error::Internal(format!("dangling chain node {head}")))?;
        Ok(self.blocks[node.block].scalar_type())
    }

    /// Element type of column `idx`
    pub fn column_type(&self, idx: usize) -> Result<ScalarType> {
        self.check_col(idx)?;
        let (_, head) = self.head(idx)?;
        self.chain_type(head)
    }

    /// Number of row blocks linked behind column `idx`, head included
    pub fn chain_len(&self, idx: usize) -> Result<usize> {
        self.check_col(idx)?;
        let (_, head) = self.head(idx)?;
        Ok(self.chain(head).count())
    }

    /// Append `cols` new columns holding `rows` rows
    ///
    /// Once the table has rows, `rows` must match the current row count.
    pub fn concatenate_columns<T: Element>(
        &mut self,
        rows: usize,
        cols: usize,
        input: BlockInput<'_, T>,
        order: Order,
    ) -> Result<()> {
        self.check_complete()?;
        if self.cols > 0 && rows != self.rows {
            return Err(Error::DimensionMismatch {
                expected: self.rows,
                found: rows,
            });
        }
        let block = Block::new(rows, cols, order, input)?;
        let span = Interval::with_len(self.cols, cols)?;

        let node = self.nodes.len();
        self.column_map.insert(span, node)?;
        self.nodes.push(ChainNode {
            block: self.blocks.len(),
            offset: self.cols,
            next: None,
            left_parent: None,
        });
        self.blocks.push(block);

        self.rows = rows;
        self.cols += cols;
        self.labels.resize(self.cols, None);
        debug!(columns = %span, rows, element = %T::SCALAR, "added column block");
        Ok(())
    }

    /// Append `rows` new rows covering `cols` columns
    ///
    /// The block starts at column 0, or at the first column still missing data
    /// after a previous partial row concatenation. It must cover whole column
    /// chains of the same element type. Until the full width has received rows
    /// the table stays row-pending and rejects every other operation.
    pub fn concatenate_rows<T: Element>(
        &mut self,
        rows: usize,
        cols: usize,
        input: BlockInput<'_, T>,
        order: Order,
    ) -> Result<()> {
        if self.is_empty() {
            return self.concatenate_columns(rows, cols, input, order);
        }
        let start = self.pending.map_or(0, |p| p.next_col);
        if let Some(pending) = self.pending {
            if rows != pending.rows {
                return Err(Error::DimensionMismatch {
                    expected: pending.rows,
                    found: rows,
                });
            }
        }
        let span = Interval::with_len(start, cols)?;
        if !span.fits(self.cols) {
            return Err(Error::InvalidArgument(format!(
                "row block over columns {span} exceeds the {} columns of the table",
                self.cols
            )));
        }

        // Plan every link before touching the table so a rejected block leaves
        // all chains as they were.
        let mut tails = Vec::new();
        for (iv, &head) in self.column_map.range(span) {
            if iv.lower() < span.lower() || iv.upper() > span.upper() {
                return Err(Error::InvalidArgument(format!(
                    "row block over columns {span} would split the column block {iv}"
                )));
            }
            let found = self.chain_type(head)?;
            if found != T::SCALAR {
                return Err(Error::TypeMismatch(format!(
                    "columns {iv} hold {found}, row block holds {}",
                    T::SCALAR
                )));
            }
            let tail = self
                .chain_tail(head)
                .ok_or_else(|| Error::Internal(format!("chain {head} has no tail")))?;
            tails.push(tail);
        }
        let block = Block::new(rows, cols, order, input)?;

        let block_id = self.blocks.len();
        self.blocks.push(block);
        let mut left_parent = None;
        for tail in tails {
            let node = self.nodes.len();
            self.nodes.push(ChainNode {
                block: block_id,
                offset: start,
                next: None,
                left_parent,
            });
            self.nodes[tail].next = Some(node);
            left_parent.get_or_insert(node);
        }

        if self.pending.is_none() {
            self.rows += rows;
        }
        self.pending = (span.upper() + 1 < self.cols).then_some(PendingRows {
            next_col: span.upper() + 1,
            rows,
        });
        debug!(columns = %span, rows, pending = self.pending.is_some(), "added row block");
        Ok(())
    }

    fn chain_tail(&self, head: NodeId) -> Option<NodeId> {
        let mut current = head;
        while let Some(next) = self.nodes.get(current)?.next {
            current = next;
        }
        Some(current)
    }

    /// Move every column of `other` to the right of this table
    ///
    /// Both tables must have the same number of rows and neither may be
    /// row-pending. `other` is left empty; its column labels move along, its
    /// selections are dropped.
    pub fn horizontal_concat(&mut self, other: &mut DataStore) -> Result<()> {
        self.check_complete()?;
        other.check_complete()?;
        if other.is_empty() {
            return Ok(());
        }
        if !self.is_empty() && self.rows != other.rows {
            return Err(Error::DimensionMismatch {
                expected: self.rows,
                found: other.rows,
            });
        }

        let shift = self.cols;
        let block_base = self.blocks.len();
        let node_base = self.nodes.len();
        let taken = std::mem::take(other);

        for (iv, &head) in taken.column_map.iter() {
            self.column_map.insert(iv.shifted(shift), head + node_base)?;
        }
        self.blocks.extend(taken.blocks);
        self.nodes.extend(taken.nodes.into_iter().map(|node| ChainNode {
            block: node.block + block_base,
            offset: node.offset + shift,
            next: node.next.map(|n| n + node_base),
            left_parent: node.left_parent.map(|n| n + node_base),
        }));

        self.rows = taken.rows;
        self.cols += taken.cols;
        self.labels.resize(self.cols, None);
        for (idx, label) in taken.labels.into_iter().enumerate() {
            if let Some(name) = label {
                if self.label_index.contains_key(&name) {
                    warn!(label = %name, "column label already used, dropping it from the merged columns");
                    continue;
                }
                self.label_index.insert(name.clone(), idx + shift);
                self.labels[idx + shift] = Some(name);
            }
        }
        debug!(added = taken.cols, total = self.cols, "merged tables horizontally");
        Ok(())
    }

    /// Copy column `idx` into `out`
    ///
    /// `expected_rows` must equal the row count of the table; the error reports
    /// the actual count otherwise.
    pub fn extract_column<T: Element>(
        &self,
        idx: usize,
        expected_rows: usize,
        out: &mut [T],
    ) -> Result<()> {
        self.check_complete()?;
        self.check_col(idx)?;
        if expected_rows != self.rows {
            return Err(Error::DimensionMismatch {
                expected: self.rows,
                found: expected_rows,
            });
        }
        if out.len() < self.rows {
            return Err(Error::InvalidArgument(format!(
                "output buffer holds {} elements, {} needed",
                out.len(),
                self.rows
            )));
        }
        let (_, head) = self.head(idx)?;
        let mut first_row = 0;
        for node in self.chain(head) {
            let block = self.blocks[node.block].typed::<T>()?;
            let col = Interval::point(idx - node.offset);
            let rows = Interval::with_len(0, block.rows())?;
            block.copy_rect(rows, col, block.rows(), out, first_row)?;
            first_row += block.rows();
        }
        Ok(())
    }

    /// Copy the rectangle `rows x cols` column-major into `out`, starting at
    /// `start` with leading dimension `ld`
    pub fn extract_slice<T: Element>(
        &self,
        rows: Interval,
        cols: Interval,
        ld: usize,
        start: usize,
        out: &mut [T],
    ) -> Result<()> {
        self.check_complete()?;
        self.check_row(rows.upper())?;
        self.check_col(cols.upper())?;
        if ld < rows.len() {
            return Err(Error::InvalidArgument(format!(
                "leading dimension {ld} is smaller than the {} rows extracted",
                rows.len()
            )));
        }
        for (iv, &head) in self.column_map.range(cols) {
            let found = self.chain_type(head)?;
            if found != T::SCALAR {
                return Err(Error::TypeMismatch(format!(
                    "columns {iv} hold {found}, requested {}",
                    T::SCALAR
                )));
            }
        }

        for (iv, &head) in self.column_map.range(cols) {
            let Some(part) = iv.intersect(&cols) else { continue };
            let mut first_row = 0;
            for node in self.chain(head) {
                let block = self.blocks[node.block].typed::<T>()?;
                let covered = Interval::with_len(first_row, block.rows())?;
                if let Some(hit) = covered.intersect(&rows) {
                    let local_rows = Interval::new(hit.lower() - first_row, hit.upper() - first_row)?;
                    let local_cols =
                        Interval::new(part.lower() - node.offset, part.upper() - node.offset)?;
                    let at = start + (part.lower() - cols.lower()) * ld + (hit.lower() - rows.lower());
                    trace!(
                        rows = %hit,
                        cols = %part,
                        at,
                        shared = node.left_parent.is_some(),
                        "copying block rectangle"
                    );
                    block.copy_rect(local_rows, local_cols, ld, out, at)?;
                }
                first_row += block.rows();
            }
        }
        Ok(())
    }

    /// Locate the block holding `(row, col)` and the cell inside it
    fn locate(&self, row: usize, col: usize) -> Result<(usize, usize, usize)> {
        self.check_complete()?;
        self.check_row(row)?;
        self.check_col(col)?;
        let (_, head) = self.head(col)?;
        let mut first_row = 0;
        for node in self.chain(head) {
            let block_rows = self.blocks[node.block].rows();
            if row < first_row + block_rows {
                return Ok((node.block, row - first_row, col - node.offset));
            }
            first_row += block_rows;
        }
        Err(Error::Internal(format!(
            "row {row} of column {col} is not covered by its chain"
        )))
    }

    /// Read the element at `(row, col)`
    pub fn get_element<T: Element>(&self, row: usize, col: usize) -> Result<T> {
        let (block, row, col) = self.locate(row, col)?;
        self.blocks[block].typed::<T>()?.get(row, col)
    }

    /// Overwrite the element at `(row, col)`
    pub fn set_element<T: Element>(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        let (block, row, col) = self.locate(row, col)?;
        self.blocks[block].typed_mut::<T>()?.set(row, col, value)
    }

    /// Attach `name` to column `idx`
    ///
    /// A column carries at most one label and a label names at most one
    /// column; relabeling drops the previous association on either side.
    pub fn label_column(&mut self, name: &str, idx: usize) -> Result<()> {
        self.check_complete()?;
        self.check_col(idx)?;
        if let Some(previous) = self.label_index.remove(name) {
            self.labels[previous] = None;
        }
        if let Some(old) = self.labels[idx].take() {
            self.label_index.remove(&old);
        }
        self.label_index.insert(name.to_string(), idx);
        self.labels[idx] = Some(name.to_string());
        Ok(())
    }

    /// Column index carrying `name`
    pub fn get_idx_from_label(&self, name: &str) -> Result<usize> {
        self.label_index
            .get(name)
            .copied()
            .ok_or_else(|| Error::InvalidArgument(format!("no column labeled '{name}'")))
    }

    /// Label of column `idx`; unlabeled columns report an empty name
    pub fn get_col_label(&self, idx: usize) -> Result<&str> {
        self.check_col(idx)?;
        Ok(self.labels[idx].as_deref().unwrap_or(""))
    }
}

//! Block cursors — the bidirectional seekable iterator and its
//! metrics-recording decorator.
//!
//! # Cursor model
//!
//! A [`BlockIterator`] tracks the byte offset of the current entry, the
//! restart region that offset falls in, and the 0-based count of entries
//! decoded since that region's restart point. Keys are materialized into
//! a reused buffer: each step truncates the buffer to the entry's shared
//! prefix length and appends the stored suffix. Values are never copied;
//! `value()` borrows directly from the block bytes.
//!
//! Positioning cost:
//!
//! - `next()` — one entry decode.
//! - `seek(target)` — binary search over restart points (decoding one
//!   full key per probe) plus a scan of at most one restart region.
//! - `prev()` — rewind to the nearest restart point before the current
//!   entry, then re-parse forward; bounded by the restart stride.
//!
//! # Error and empty cursors
//!
//! A cursor over a corrupt or empty block is the same type in a
//! permanently-invalid state: the error cursor carries a sticky
//! corruption status, the empty cursor reports status ok. Corruption
//! found mid-iteration (bad varint, truncated entry, impossible shared
//! prefix) also latches: the cursor becomes permanently invalid and all
//! later positioning calls return immediately.

use std::cmp::Ordering;
use std::ops::Range;

use tracing::warn;

use crate::comparator::Comparator;

use super::{decode_entry, BlockError, BlockMetrics, RESTART_ENTRY_SIZE};

// ------------------------------------------------------------------------------------------------
// Block Iterator
// ------------------------------------------------------------------------------------------------

/// Bidirectional, seekable cursor over one block's entries.
pub struct BlockIterator<'a, C: Comparator> {
    /// Key ordering; must match the order the block was written in.
    comparator: C,

    /// The full block bytes.
    data: &'a [u8],

    /// Offset of the restart array; entries end here.
    restarts: usize,

    /// Number of slots in the restart array.
    num_restarts: u32,

    /// Offset of the current entry; `>= restarts` when invalid.
    current: usize,

    /// Restart region containing `current`; `num_restarts` when invalid.
    restart_index: u32,

    /// Entries decoded since the region's restart point, 0-based.
    /// Transiently `u32::MAX` right after `seek_to_restart_point` so the
    /// next parse wraps it to 0.
    restart_offset: u32,

    /// Reconstructed key for the current entry.
    key: Vec<u8>,

    /// Byte range of the current value within `data`.
    value: Range<usize>,

    /// Sticky: once corruption is recorded the cursor never recovers.
    status: Result<(), BlockError>,
}

impl<'a, C: Comparator> BlockIterator<'a, C> {
    /// Fresh unpositioned cursor. Callers must seek before reading.
    pub(crate) fn new(
        data: &'a [u8],
        restarts: usize,
        num_restarts: u32,
        comparator: C,
    ) -> Self {
        debug_assert!(num_restarts > 0);
        BlockIterator {
            comparator,
            data,
            restarts,
            num_restarts,
            current: restarts,
            restart_index: num_restarts,
            restart_offset: 0,
            key: Vec::new(),
            value: 0..0,
            status: Ok(()),
        }
    }

    /// Cursor over a block with no entries: never valid, status ok.
    pub(crate) fn empty(comparator: C) -> Self {
        BlockIterator {
            comparator,
            data: &[],
            restarts: 0,
            num_restarts: 0,
            current: 0,
            restart_index: 0,
            restart_offset: 0,
            key: Vec::new(),
            value: 0..0,
            status: Ok(()),
        }
    }

    /// Cursor reporting construction-time corruption: never valid.
    pub(crate) fn corrupt(comparator: C, message: &str) -> Self {
        let mut iter = Self::empty(comparator);
        iter.status = Err(BlockError::Corruption(message.to_string()));
        iter
    }

    /// Whether the cursor is positioned on an entry.
    pub fn valid(&self) -> bool {
        self.current < self.restarts
    }

    /// Sticky status: `Ok` or the first corruption observed.
    pub fn status(&self) -> Result<(), BlockError> {
        self.status.clone()
    }

    /// Key of the current entry. Requires `valid()`.
    pub fn key(&self) -> &[u8] {
        debug_assert!(self.valid());
        &self.key
    }

    /// Value of the current entry. Requires `valid()`.
    pub fn value(&self) -> &[u8] {
        debug_assert!(self.valid());
        &self.data[self.value.clone()]
    }

    /// Advance to the next entry. Requires `valid()`; the cursor becomes
    /// invalid when the last entry is passed.
    pub fn next(&mut self) {
        debug_assert!(self.valid());
        if !self.valid() {
            return;
        }
        self.parse_next_entry();
    }

    /// Step back to the previous entry. Requires `valid()`; the cursor
    /// becomes invalid when called on the first entry.
    ///
    /// Keys are forward-delta encoded, so the cursor rewinds to the
    /// nearest restart point before the current entry and re-parses
    /// forward until the entry ending where the current one began.
    pub fn prev(&mut self) {
        debug_assert!(self.valid());
        if !self.valid() {
            return;
        }

        let original = self.current;
        while self.restart_point(self.restart_index) as usize >= original {
            if self.restart_index == 0 {
                // Already on the first entry; no predecessor.
                self.mark_exhausted();
                return;
            }
            self.restart_index -= 1;
        }

        self.seek_to_restart_point(self.restart_index);
        while self.parse_next_entry() && self.next_entry_offset() < original {}
    }

    /// Position on the first entry with key `>= target`, or become
    /// invalid if every key is smaller.
    pub fn seek(&mut self, target: &[u8]) {
        if self.status.is_err() || self.num_restarts == 0 {
            return;
        }

        // Largest restart index whose first key is < target. Restart
        // keys are stored in full (shared == 0), so each probe decodes
        // without any carried key state.
        let mut left: u32 = 0;
        let mut right: u32 = self.num_restarts - 1;
        while left < right {
            let mid = (left + right + 1) / 2;
            let region_offset = self.restart_point(mid) as usize;
            if region_offset > self.restarts {
                self.corruption_error();
                return;
            }
            let header = match decode_entry(&self.data[region_offset..self.restarts]) {
                Some(header) if header.shared == 0 => header,
                _ => {
                    self.corruption_error();
                    return;
                }
            };
            let key_start = region_offset + header.header_len;
            let mid_key = &self.data[key_start..key_start + header.non_shared as usize];
            if self.comparator.compare(mid_key, target) == Ordering::Less {
                // Everything before mid is smaller still.
                left = mid;
            } else {
                right = mid - 1;
            }
        }

        self.seek_to_restart_point(left);
        loop {
            if !self.parse_next_entry() {
                return;
            }
            if self.comparator.compare(&self.key, target) != Ordering::Less {
                return;
            }
        }
    }

    /// Position on the first entry of the block.
    pub fn seek_to_first(&mut self) {
        if self.status.is_err() || self.num_restarts == 0 {
            return;
        }
        self.seek_to_restart_point(0);
        self.parse_next_entry();
    }

    /// Position on the last entry of the block.
    pub fn seek_to_last(&mut self) {
        if self.status.is_err() || self.num_restarts == 0 {
            return;
        }
        self.seek_to_restart_point(self.num_restarts - 1);
        while self.parse_next_entry() && self.next_entry_offset() < self.restarts {}
    }

    /// Restart region the current entry falls in.
    pub(crate) fn restart_index(&self) -> u32 {
        self.restart_index
    }

    /// Entries decoded since that region's restart point.
    pub(crate) fn restart_offset(&self) -> u32 {
        self.restart_offset
    }

    pub(crate) fn data(&self) -> &[u8] {
        self.data
    }

    /// Offset just past the current entry's value — where the next
    /// entry starts.
    fn next_entry_offset(&self) -> usize {
        self.value.end
    }

    /// Read restart slot `index` from the trailer array.
    fn restart_point(&self, index: u32) -> u32 {
        debug_assert!(index < self.num_restarts);
        let offset = self.restarts + index as usize * RESTART_ENTRY_SIZE;
        let mut raw = [0u8; RESTART_ENTRY_SIZE];
        raw.copy_from_slice(&self.data[offset..offset + RESTART_ENTRY_SIZE]);
        u32::from_le_bytes(raw)
    }

    /// Reset parsing state to restart slot `index`. The next
    /// `parse_next_entry` decodes that region's first entry.
    fn seek_to_restart_point(&mut self, index: u32) {
        self.key.clear();
        self.restart_index = index;
        self.restart_offset = u32::MAX;
        // parse_next_entry derives the entry offset from the end of the
        // previous value; an empty range plants it at the restart point.
        let offset = self.restart_point(index) as usize;
        self.value = offset..offset;
    }

    /// Decode the entry beginning where the current value ends.
    ///
    /// Returns `false` at end of block (status untouched) or on
    /// corruption (status latched).
    fn parse_next_entry(&mut self) -> bool {
        self.current = self.next_entry_offset();
        self.restart_offset = self.restart_offset.wrapping_add(1);

        if self.current >= self.restarts {
            self.mark_exhausted();
            return false;
        }

        let header = match decode_entry(&self.data[self.current..self.restarts]) {
            Some(header) => header,
            None => {
                self.corruption_error();
                return false;
            }
        };
        if header.shared as usize > self.key.len() {
            self.corruption_error();
            return false;
        }

        let delta_start = self.current + header.header_len;
        let delta_end = delta_start + header.non_shared as usize;
        self.key.truncate(header.shared as usize);
        self.key.extend_from_slice(&self.data[delta_start..delta_end]);
        self.value = delta_end..delta_end + header.value_len as usize;

        // A seek can land the parse several regions past the recorded
        // restart_index; walk it forward so the (region, slot) pair
        // always matches the entry the cursor is on.
        while self.restart_index + 1 < self.num_restarts
            && (self.restart_point(self.restart_index + 1) as usize) < self.current
        {
            self.restart_index += 1;
            self.restart_offset = 0;
        }

        true
    }

    /// Past-the-end: invalid position, status untouched.
    fn mark_exhausted(&mut self) {
        self.current = self.restarts;
        self.restart_index = self.num_restarts;
        self.restart_offset = 0;
    }

    /// Latch corruption: permanently invalid, no partial entry exposed.
    fn corruption_error(&mut self) {
        warn!(offset = self.current, "corrupt entry in block");
        self.current = self.restarts;
        self.restart_index = self.num_restarts;
        self.restart_offset = 0;
        self.key.clear();
        self.value = 0..0;
        self.status = Err(BlockError::Corruption("bad entry in block".to_string()));
    }
}

// ------------------------------------------------------------------------------------------------
// Metrics-recording iterator
// ------------------------------------------------------------------------------------------------

/// A [`BlockIterator`] that records every entry it lands on into a
/// [`BlockMetrics`].
///
/// Created by [`Block::metrics_iter`](super::Block::metrics_iter). The
/// decorator owns its metrics (detached — `None` — for the error and
/// empty cases) and hands them back through [`MetricsIterator::metrics`]
/// or [`MetricsIterator::into_metrics`]. Recording happens after each
/// successful positioning call; invalid transitions and corruption
/// record nothing.
pub struct MetricsIterator<'a, C: Comparator> {
    inner: BlockIterator<'a, C>,
    metrics: Option<BlockMetrics>,
}

impl<'a, C: Comparator> MetricsIterator<'a, C> {
    pub(crate) fn new(inner: BlockIterator<'a, C>, metrics: BlockMetrics) -> Self {
        MetricsIterator {
            inner,
            metrics: Some(metrics),
        }
    }

    /// Decorator around an error or empty cursor; nothing to record.
    pub(crate) fn detached(inner: BlockIterator<'a, C>) -> Self {
        MetricsIterator {
            inner,
            metrics: None,
        }
    }

    /// Whether the cursor is positioned on an entry.
    pub fn valid(&self) -> bool {
        self.inner.valid()
    }

    /// Sticky status of the underlying cursor.
    pub fn status(&self) -> Result<(), BlockError> {
        self.inner.status()
    }

    /// Key of the current entry. Requires `valid()`.
    pub fn key(&self) -> &[u8] {
        self.inner.key()
    }

    /// Value of the current entry. Requires `valid()`.
    pub fn value(&self) -> &[u8] {
        self.inner.value()
    }

    /// [`BlockIterator::next`], recording the new position.
    pub fn next(&mut self) {
        self.inner.next();
        self.record_access();
    }

    /// [`BlockIterator::prev`], recording the new position.
    pub fn prev(&mut self) {
        self.inner.prev();
        self.record_access();
    }

    /// [`BlockIterator::seek`], recording the new position.
    pub fn seek(&mut self, target: &[u8]) {
        self.inner.seek(target);
        self.record_access();
    }

    /// [`BlockIterator::seek_to_first`], recording the new position.
    pub fn seek_to_first(&mut self) {
        self.inner.seek_to_first();
        self.record_access();
    }

    /// [`BlockIterator::seek_to_last`], recording the new position.
    pub fn seek_to_last(&mut self) {
        self.inner.seek_to_last();
        self.record_access();
    }

    /// The undecorated cursor.
    pub fn base(&self) -> &BlockIterator<'a, C> {
        &self.inner
    }

    /// The metrics recorded so far; `None` for error and empty cursors.
    pub fn metrics(&self) -> Option<&BlockMetrics> {
        self.metrics.as_ref()
    }

    /// Consume the decorator, releasing the recorded metrics to the
    /// layer that persists them.
    pub fn into_metrics(self) -> Option<BlockMetrics> {
        self.metrics
    }

    fn record_access(&mut self) {
        if !self.inner.valid() {
            return;
        }
        if let Some(metrics) = self.metrics.as_mut() {
            metrics.record_access(self.inner.restart_index(), self.inner.restart_offset());
        }
    }
}

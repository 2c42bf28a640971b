//! Sorted Block Module
//!
//! This module implements the **read path** for a single data block: an
//! immutable byte region produced by the table writer, packing a sorted
//! sequence of key-value entries with **prefix-compressed** keys.
//!
//! ## Design Overview
//!
//! Consecutive keys in a sorted run share long prefixes, so each entry
//! stores only the suffix that differs from the previous key. Every `K`
//! entries the full key is written verbatim — a **restart point** — and
//! the offsets of all restart points are collected in a trailer array.
//! Restart points bound the cost of two operations that pure delta
//! encoding would otherwise make linear in the block size:
//!
//! - `seek(target)` binary-searches the restart array, then scans at
//!   most one restart region.
//! - `prev()` rewinds to the nearest restart point at or before the
//!   current entry and re-parses forward (keys are forward-delta
//!   encoded, so there is no way to step backwards directly).
//!
//! # On-disk layout
//!
//! ```text
//! [ENTRY 0][ENTRY 1]…[ENTRY N-1]
//! [RESTART_0 u32 LE][RESTART_1 u32 LE]…[RESTART_R-1 u32 LE]
//! [NUM_RESTARTS u32 LE]
//!
//! ENTRY := shared (varint32) | non_shared (varint32) | value_len (varint32)
//!          | key_delta (non_shared bytes) | value (value_len bytes)
//! ```
//!
//! - `shared` — prefix length reused from the previous key; always 0 at
//!   a restart point.
//! - `key_delta` — the suffix appended after the shared prefix.
//! - Restart offsets are strictly increasing, first entry 0.
//!
//! # Access metrics
//!
//! A block can hand out a metrics-recording iterator that marks one bit
//! per `(restart region, intra-region slot)` touched — see
//! [`BlockMetrics`]. The bitmap is serializable to a key/value pair for
//! persistence alongside the database, mergeable across snapshots, and
//! queryable to classify entries as *hot*.
//!
//! # Concurrency model
//!
//! - A [`Block`] is immutable after construction; any number of threads
//!   may read it and create independent iterators.
//! - A [`BlockIterator`] is a mutable cursor and must not be shared
//!   between threads.
//! - A [`BlockMetrics`] is mutated through `record_access` and `join`
//!   only; concurrent writers need external mutual exclusion.
//!
//! # Corruption handling
//!
//! Trailer validation failures put the block into an error-marker state
//! detected lazily at iterator construction (the factory returns a
//! perpetual error iterator). Corruption found mid-iteration — bad
//! varints, truncated entries, a `shared` count exceeding the
//! reconstructed key, a non-zero `shared` at a restart point — makes the
//! iterator permanently invalid with a sticky corruption status. No
//! partial key or value is ever exposed, and nothing is retried; the
//! enclosing table reader decides whether to reread or surface the error.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

mod iterator;
mod metrics;

pub use iterator::{BlockIterator, MetricsIterator};
pub use metrics::BlockMetrics;

use std::borrow::Cow;

use thiserror::Error;
use tracing::warn;

use crate::comparator::Comparator;
use crate::encoding;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Size in bytes of one restart array slot (and of the trailer count).
pub(crate) const RESTART_ENTRY_SIZE: usize = std::mem::size_of::<u32>();

/// Smallest byte length a decodable block can have: the trailer count
/// plus one restart slot.
const MIN_BLOCK_SIZE: usize = 2 * RESTART_ENTRY_SIZE;

/// Metrics bytes reserved per restart region.
///
/// The writer's restart stride is 16 entries, so one bit per slot fits
/// in two bytes. [`Block::metrics_iter_with_bytes_per_restart`] accepts
/// other widths for persisted-format flexibility.
pub const BYTES_PER_RESTART: u32 = 2;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors reported by block iterators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockError {
    /// The block bytes are structurally invalid.
    #[error("block corruption: {0}")]
    Corruption(String),
}

// ------------------------------------------------------------------------------------------------
// Entry codec
// ------------------------------------------------------------------------------------------------

/// Decoded header of one block entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntryHeader {
    /// Prefix length reused from the previous key.
    pub shared: u32,

    /// Length of the key suffix stored in this entry.
    pub non_shared: u32,

    /// Length of the value bytes.
    pub value_len: u32,

    /// Encoded header length; the key delta starts here.
    pub header_len: usize,
}

/// Decode the entry header at the start of `buf`, where `buf` spans from
/// the entry offset to the end of the entry region.
///
/// Returns `None` if fewer than 3 bytes remain, a varint is malformed,
/// or the buffer cannot hold `non_shared + value_len` payload bytes
/// after the header. Pure; no side effects.
pub(crate) fn decode_entry(buf: &[u8]) -> Option<EntryHeader> {
    if buf.len() < 3 {
        return None;
    }

    let mut shared = u32::from(buf[0]);
    let mut non_shared = u32::from(buf[1]);
    let mut value_len = u32::from(buf[2]);
    let mut header_len = 3;

    if shared | non_shared | value_len >= 128 {
        // At least one length needs a multi-byte varint.
        let (s, n0) = encoding::decode_varint32(buf).ok()?;
        let (ns, n1) = encoding::decode_varint32(&buf[n0..]).ok()?;
        let (vl, n2) = encoding::decode_varint32(&buf[n0 + n1..]).ok()?;
        shared = s;
        non_shared = ns;
        value_len = vl;
        header_len = n0 + n1 + n2;
    }

    // Summed in u64 so a crafted header cannot wrap past the bound check.
    let payload = u64::from(non_shared) + u64::from(value_len);
    if ((buf.len() - header_len) as u64) < payload {
        return None;
    }

    Some(EntryHeader {
        shared,
        non_shared,
        value_len,
        header_len,
    })
}

// ------------------------------------------------------------------------------------------------
// Block handle
// ------------------------------------------------------------------------------------------------

/// An immutable, decoded handle over one block's bytes.
///
/// The handle owns or borrows its buffer (`Cow`), validates the trailer
/// geometry once at construction, and acts as the factory for iterators.
/// A malformed trailer does not fail construction; the block enters an
/// error-marker state and [`Block::iter`] returns a perpetual error
/// iterator, matching the lazy corruption reporting of the surrounding
/// table reader.
pub struct Block<'a> {
    /// Block bytes, owned or borrowed for the handle's lifetime.
    data: Cow<'a, [u8]>,

    /// Usable byte length; 0 is the error marker.
    size: usize,

    /// Offset of the restart array within `data`.
    restart_offset: usize,

    /// Number of restart points, cached from the trailer.
    num_restarts: u32,
}

impl<'a> Block<'a> {
    /// Wrap `contents` and validate the trailer.
    ///
    /// Accepts owned (`Vec<u8>`) or borrowed (`&[u8]`) bytes. Geometry
    /// violations — buffer shorter than the trailer, or a restart count
    /// the buffer cannot hold — set the error marker; the failure
    /// surfaces when an iterator is created.
    pub fn new(contents: impl Into<Cow<'a, [u8]>>) -> Self {
        let data = contents.into();
        let mut size = data.len();
        let mut restart_offset = 0;
        let mut num_restarts = 0;

        if size < RESTART_ENTRY_SIZE {
            size = 0;
        } else {
            num_restarts = match encoding::decode_fixed32(&data[size - RESTART_ENTRY_SIZE..]) {
                Ok(n) => n,
                Err(_) => 0,
            };
            let trailer_len = (num_restarts as usize + 1).checked_mul(RESTART_ENTRY_SIZE);
            match trailer_len.and_then(|len| size.checked_sub(len)) {
                Some(offset) => restart_offset = offset,
                None => {
                    warn!(
                        size,
                        num_restarts, "block trailer claims more restarts than the buffer holds"
                    );
                    size = 0;
                    num_restarts = 0;
                }
            }
        }

        Block {
            data,
            size,
            restart_offset,
            num_restarts,
        }
    }

    /// Number of restart points recorded in the trailer.
    pub fn num_restarts(&self) -> u32 {
        self.num_restarts
    }

    /// Offset of the restart array; the entry region ends here.
    pub fn restart_array_offset(&self) -> usize {
        self.restart_offset
    }

    /// Raw block bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Create a cursor over this block's entries.
    ///
    /// Returns an **error iterator** (sticky corruption status, never
    /// valid) if the block failed trailer validation, an **empty
    /// iterator** (never valid, status ok) if the block holds no restart
    /// points, and a fresh unpositioned cursor otherwise.
    pub fn iter<C: Comparator>(&self, comparator: C) -> BlockIterator<'_, C> {
        if self.size < MIN_BLOCK_SIZE {
            return BlockIterator::corrupt(comparator, "bad block contents");
        }
        if self.num_restarts == 0 {
            return BlockIterator::empty(comparator);
        }
        BlockIterator::new(
            &self.data,
            self.restart_offset,
            self.num_restarts,
            comparator,
        )
    }

    /// Create a cursor that records every touched entry into a
    /// [`BlockMetrics`] keyed by `(file_number, block_offset)`.
    ///
    /// The error and empty cases behave as in [`Block::iter`] and carry
    /// no metrics. Uses the module-wide [`BYTES_PER_RESTART`] width.
    pub fn metrics_iter<C: Comparator>(
        &self,
        comparator: C,
        file_number: u64,
        block_offset: u64,
    ) -> MetricsIterator<'_, C> {
        self.metrics_iter_with_bytes_per_restart(
            comparator,
            file_number,
            block_offset,
            BYTES_PER_RESTART,
        )
    }

    /// [`Block::metrics_iter`] with an explicit per-restart bitmap width.
    pub fn metrics_iter_with_bytes_per_restart<C: Comparator>(
        &self,
        comparator: C,
        file_number: u64,
        block_offset: u64,
        bytes_per_restart: u32,
    ) -> MetricsIterator<'_, C> {
        if self.size < MIN_BLOCK_SIZE {
            return MetricsIterator::detached(BlockIterator::corrupt(
                comparator,
                "bad block contents",
            ));
        }
        if self.num_restarts == 0 {
            return MetricsIterator::detached(BlockIterator::empty(comparator));
        }
        let metrics = BlockMetrics::new(
            file_number,
            block_offset,
            self.num_restarts,
            bytes_per_restart,
        );
        MetricsIterator::new(
            BlockIterator::new(
                &self.data,
                self.restart_offset,
                self.num_restarts,
                comparator,
            ),
            metrics,
        )
    }

    /// Whether the entry `iter` is positioned on has been recorded in
    /// `metrics`.
    ///
    /// Preconditions: `iter` was created by this block, is valid, and
    /// `metrics` was sized for this block's restart count.
    pub fn is_hot<C: Comparator>(&self, iter: &BlockIterator<'_, C>, metrics: &BlockMetrics) -> bool {
        debug_assert!(std::ptr::eq(iter.data().as_ptr(), self.data.as_ptr()));
        debug_assert!(iter.valid());
        debug_assert_eq!(metrics.num_restarts(), self.num_restarts);

        metrics.is_hot(iter.restart_index(), iter.restart_offset())
    }

    /// Iterate every (key, value) pair in order.
    ///
    /// Convenience adapter over [`Block::iter`] for whole-block scans;
    /// pairs are copied out since the cursor reuses its key buffer.
    /// Stops at the first corrupt entry.
    pub fn entries<C: Comparator>(&self, comparator: C) -> Entries<'_, C> {
        Entries {
            iter: self.iter(comparator),
            started: false,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Whole-block scan adapter
// ------------------------------------------------------------------------------------------------

/// Owning iterator over all entries of a block, created by
/// [`Block::entries`].
pub struct Entries<'a, C: Comparator> {
    iter: BlockIterator<'a, C>,
    started: bool,
}

impl<C: Comparator> Iterator for Entries<'_, C> {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.started = true;
            self.iter.seek_to_first();
        } else if self.iter.valid() {
            self.iter.next();
        } else {
            return None;
        }

        if self.iter.valid() {
            Some((self.iter.key().to_vec(), self.iter.value().to_vec()))
        } else {
            None
        }
    }
}

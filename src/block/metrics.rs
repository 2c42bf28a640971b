//! Per-block access metrics.
//!
//! A [`BlockMetrics`] records which entries of one block have been
//! touched since its creation, at the granularity the iterator already
//! tracks for free: the restart region and the 0-based slot within it.
//! One bit per `(region, slot mod window)` keeps the table bounded —
//! `bytes_per_restart` bytes per region — at the cost of deliberate
//! collisions when a region holds more entries than the window has bits.
//!
//! # Persistence
//!
//! Metrics round-trip through an external key-value store:
//!
//! ```text
//! key   := fixed64_le(file_number) | fixed64_le(block_offset)     (16 bytes)
//! value := varint32(num_restarts) | varint32(bytes_per_restart) | bitmap
//! ```
//!
//! Parsing is forgiving: a malformed key or value yields `None`, which
//! callers treat as "no metrics available". Snapshots taken at
//! different times over the same block are combined with
//! [`BlockMetrics::join`] (bitwise OR), building longer observation
//! windows out of compatible instances.
//!
//! Hotness carries no threshold or decay semantics — a set bit means
//! the slot was accessed at least once while this instance (or one
//! joined into it) was recording.

use tracing::debug;

use crate::encoding;

/// Serialized metrics key length: two fixed64 fields.
const DB_KEY_SIZE: usize = 16;

/// Bit-packed per-(restart, slot) access table for one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMetrics {
    /// Table file the block belongs to.
    file_number: u64,

    /// Offset of the block within that file.
    block_offset: u64,

    /// Restart count of the block this table was sized for.
    num_restarts: u32,

    /// Bitmap bytes reserved per restart region.
    bytes_per_restart: u32,

    /// `num_restarts * bytes_per_restart` bytes, zero-initialized.
    bitmap: Vec<u8>,
}

impl BlockMetrics {
    /// Zeroed metrics for a block with `num_restarts` regions.
    pub fn new(
        file_number: u64,
        block_offset: u64,
        num_restarts: u32,
        bytes_per_restart: u32,
    ) -> Self {
        debug_assert!(bytes_per_restart > 0);
        BlockMetrics {
            file_number,
            block_offset,
            num_restarts,
            bytes_per_restart,
            bitmap: vec![0; num_restarts as usize * bytes_per_restart as usize],
        }
    }

    /// Table file this instance records for.
    pub fn file_number(&self) -> u64 {
        self.file_number
    }

    /// Block offset this instance records for.
    pub fn block_offset(&self) -> u64 {
        self.block_offset
    }

    /// Restart count the bitmap was sized for.
    pub fn num_restarts(&self) -> u32 {
        self.num_restarts
    }

    /// Bitmap bytes per restart region.
    pub fn bytes_per_restart(&self) -> u32 {
        self.bytes_per_restart
    }

    /// Raw bitmap bytes.
    pub fn bitmap(&self) -> &[u8] {
        &self.bitmap
    }

    /// Byte index and bit mask for a `(region, slot)` pair. Slots fold
    /// onto the region's window modulo its bit width.
    fn bit_position(&self, restart_index: u32, restart_offset: u32) -> (usize, u8) {
        let window_bits = self.bytes_per_restart * 8;
        let bit = restart_offset % window_bits;
        let byte = restart_index as usize * self.bytes_per_restart as usize + (bit / 8) as usize;
        (byte, 1 << (bit % 8))
    }

    /// Mark the entry at `(restart_index, restart_offset)` as accessed.
    pub fn record_access(&mut self, restart_index: u32, restart_offset: u32) {
        debug_assert!(restart_index < self.num_restarts);
        let (byte, mask) = self.bit_position(restart_index, restart_offset);
        self.bitmap[byte] |= mask;
    }

    /// Whether the entry at `(restart_index, restart_offset)` has been
    /// accessed since this instance started recording.
    pub fn is_hot(&self, restart_index: u32, restart_offset: u32) -> bool {
        debug_assert!(restart_index < self.num_restarts);
        let (byte, mask) = self.bit_position(restart_index, restart_offset);
        self.bitmap[byte] & mask != 0
    }

    /// Whether `other` records the same block with the same geometry,
    /// making the two bitmaps mergeable.
    pub fn is_compatible(&self, other: &BlockMetrics) -> bool {
        self.file_number == other.file_number
            && self.block_offset == other.block_offset
            && self.num_restarts == other.num_restarts
            && self.bytes_per_restart == other.bytes_per_restart
    }

    /// Merge `other`'s accesses into this instance (bitwise OR).
    /// Requires [`BlockMetrics::is_compatible`].
    pub fn join(&mut self, other: &BlockMetrics) {
        debug_assert!(self.is_compatible(other));
        for (dst, src) in self.bitmap.iter_mut().zip(&other.bitmap) {
            *dst |= src;
        }
    }

    /// Storage key identifying this block's metrics:
    /// `fixed64_le(file_number) | fixed64_le(block_offset)`.
    pub fn db_key(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(DB_KEY_SIZE);
        encoding::encode_fixed64(&mut key, self.file_number);
        encoding::encode_fixed64(&mut key, self.block_offset);
        key
    }

    /// Storage value: geometry varints followed by the raw bitmap.
    pub fn db_value(&self) -> Vec<u8> {
        let mut value = Vec::with_capacity(2 * encoding::MAX_VARINT32_LEN + self.bitmap.len());
        encoding::encode_varint32(&mut value, self.num_restarts);
        encoding::encode_varint32(&mut value, self.bytes_per_restart);
        value.extend_from_slice(&self.bitmap);
        value
    }

    /// Reconstruct metrics from a stored key/value pair.
    ///
    /// Returns `None` — "no metrics available" — when the key is not
    /// exactly two fixed64 fields or the value fails
    /// [`BlockMetrics::from_db_value`].
    pub fn from_db_kv(db_key: &[u8], db_value: &[u8]) -> Option<BlockMetrics> {
        if db_key.len() != DB_KEY_SIZE {
            debug!(len = db_key.len(), "metrics key has wrong length");
            return None;
        }
        let file_number = encoding::decode_fixed64(db_key).ok()?;
        let block_offset = encoding::decode_fixed64(&db_key[8..]).ok()?;
        Self::from_db_value(file_number, block_offset, db_value)
    }

    /// Reconstruct metrics for a known block from a stored value.
    ///
    /// Returns `None` when the geometry varints are malformed, the
    /// window width is zero, or the remaining bytes do not match
    /// `num_restarts * bytes_per_restart`.
    pub fn from_db_value(
        file_number: u64,
        block_offset: u64,
        db_value: &[u8],
    ) -> Option<BlockMetrics> {
        let (num_restarts, n0) = encoding::decode_varint32(db_value).ok()?;
        let (bytes_per_restart, n1) = encoding::decode_varint32(&db_value[n0..]).ok()?;
        if bytes_per_restart == 0 {
            debug!("metrics value claims a zero-width window");
            return None;
        }
        let bitmap = &db_value[n0 + n1..];
        if bitmap.len() as u64 != u64::from(num_restarts) * u64::from(bytes_per_restart) {
            debug!(
                have = bitmap.len(),
                num_restarts, bytes_per_restart, "metrics bitmap length mismatch"
            );
            return None;
        }
        Some(BlockMetrics {
            file_number,
            block_offset,
            num_restarts,
            bytes_per_restart,
            bitmap: bitmap.to_vec(),
        })
    }
}

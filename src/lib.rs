//! # StrataDB — sorted block reader
//!
//! The read path for the smallest on-disk unit of an LSM storage engine:
//! a **block** packing a sorted run of key-value pairs with
//! prefix-compressed keys. Every `K` entries the full key is stored
//! verbatim — a **restart point** — so that lookups can binary-search the
//! restart array and reverse scans can rewind without decoding the whole
//! block.
//!
//! ## Block layout
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ entry 0 │ entry 1 │ … │ entry N-1             │  entry region
//! ├───────────────────────────────────────────────┤
//! │ restart[0] │ restart[1] │ … │ restart[R-1]    │  u32 LE offsets
//! ├───────────────────────────────────────────────┤
//! │ num_restarts (u32 LE)                         │  trailer
//! └───────────────────────────────────────────────┘
//!
//! entry := shared (varint32) | non_shared (varint32) | value_len (varint32)
//!          | key_delta (non_shared bytes) | value (value_len bytes)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`block`] | Block handle, bidirectional seekable iterator, access metrics |
//! | [`comparator`] | Total ordering over raw key bytes |
//! | [`encoding`] | Varint32 and fixed-width little-endian codecs |
//!
//! ## Quick start
//!
//! ```rust
//! use stratadb::block::Block;
//! use stratadb::comparator::BytewiseComparator;
//!
//! // Hand-assemble a one-restart block holding ("apple", "red") and
//! // ("applet", "juice"); real blocks come from the table writer.
//! let mut bytes = Vec::new();
//! for (shared, delta, value) in [
//!     (0u8, &b"apple"[..], &b"red"[..]),
//!     (5, &b"t"[..], &b"juice"[..]),
//! ] {
//!     bytes.push(shared);
//!     bytes.push(delta.len() as u8);
//!     bytes.push(value.len() as u8);
//!     bytes.extend_from_slice(delta);
//!     bytes.extend_from_slice(value);
//! }
//! bytes.extend_from_slice(&0u32.to_le_bytes()); // restart[0]
//! bytes.extend_from_slice(&1u32.to_le_bytes()); // num_restarts
//!
//! let block = Block::new(bytes);
//! let mut iter = block.iter(BytewiseComparator);
//! iter.seek(b"applet");
//! assert!(iter.valid());
//! assert_eq!(iter.key(), b"applet");
//! assert_eq!(iter.value(), b"juice");
//! ```

pub mod block;
pub mod comparator;
pub mod encoding;

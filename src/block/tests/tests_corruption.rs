//! Mid-iteration corruption tests: malformed entry headers, impossible
//! shared prefixes, truncated entries, and corrupt restart slots.
//!
//! Every scenario checks the same contract: the cursor becomes
//! permanently invalid, `status()` reports corruption, no partial entry
//! is exposed, and later positioning calls stay inert.
//!
//! ## See also
//! - [`tests_block`] — trailer-level geometry failures

use super::helpers::init_tracing;
use crate::block::{Block, BlockError};
use crate::comparator::BytewiseComparator;
use crate::encoding;

/// Assemble a block from raw entry bytes plus a restart array.
fn raw_block(entries: &[u8], restarts: &[u32]) -> Vec<u8> {
    let mut bytes = entries.to_vec();
    for &offset in restarts {
        encoding::encode_fixed32(&mut bytes, offset);
    }
    encoding::encode_fixed32(&mut bytes, restarts.len() as u32);
    bytes
}

fn assert_corrupt<C: crate::comparator::Comparator>(iter: &crate::block::BlockIterator<'_, C>) {
    assert!(!iter.valid());
    assert!(matches!(iter.status(), Err(BlockError::Corruption(_))));
}

// ------------------------------------------------------------------------------------------------
// Impossible shared prefix
// ------------------------------------------------------------------------------------------------

/// # Scenario
/// The second entry claims a 99-byte shared prefix against a 3-byte
/// first key.
///
/// # Actions
/// `seek_to_first` (succeeds), then `next`.
///
/// # Expected behavior
/// `next` invalidates with sticky corruption; re-seeking does not
/// resurrect the cursor.
#[test]
fn shared_prefix_exceeding_previous_key() {
    init_tracing();

    // entry 0: "abc" -> "1"; entry 1: shared=99, delta "d", value "2".
    let entries = [
        &[0, 3, 1][..],
        b"abc",
        b"1",
        &[99, 1, 1][..],
        b"d",
        b"2",
    ]
    .concat();
    let block = Block::new(raw_block(&entries, &[0]));
    let mut iter = block.iter(BytewiseComparator);

    iter.seek_to_first();
    assert!(iter.valid());
    assert_eq!(iter.key(), b"abc");

    iter.next();
    assert_corrupt(&iter);

    // Corruption latches: positioning is inert from here on.
    iter.seek_to_first();
    assert_corrupt(&iter);
    iter.seek(b"abc");
    assert_corrupt(&iter);
    iter.seek_to_last();
    assert_corrupt(&iter);
}

/// # Scenario
/// The very first entry of a region carries a non-zero shared prefix;
/// there is no previous key to share with.
#[test]
fn nonzero_shared_on_first_entry() {
    let entries = [&[2, 1, 1][..], b"a", b"1"].concat();
    let block = Block::new(raw_block(&entries, &[0]));
    let mut iter = block.iter(BytewiseComparator);

    iter.seek_to_first();
    assert_corrupt(&iter);
}

// ------------------------------------------------------------------------------------------------
// Truncated and oversized entries
// ------------------------------------------------------------------------------------------------

/// # Scenario
/// Two stray bytes sit between the last complete entry and the restart
/// array — not enough for an entry header.
#[test]
fn truncated_header_after_last_entry() {
    init_tracing();

    let entries = [&[0, 1, 1][..], b"a", b"1", &[0, 5][..]].concat();
    let block = Block::new(raw_block(&entries, &[0]));
    let mut iter = block.iter(BytewiseComparator);

    iter.seek_to_first();
    assert!(iter.valid());

    iter.next();
    assert_corrupt(&iter);
}

/// # Scenario
/// An entry header promises a 100-byte value the block cannot hold.
#[test]
fn value_length_past_entry_region() {
    let entries = [&[0, 1, 1][..], b"a", b"1", &[0, 1, 100][..], b"b"].concat();
    let block = Block::new(raw_block(&entries, &[0]));
    let mut iter = block.iter(BytewiseComparator);

    iter.seek_to_first();
    assert!(iter.valid());

    iter.next();
    assert_corrupt(&iter);
}

/// # Scenario
/// An entry header starts with an unterminated varint (five bytes of
/// continuation bits).
#[test]
fn unterminated_varint_in_header() {
    let entries = [
        &[0, 1, 1][..],
        b"a",
        b"1",
        &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF][..],
    ]
    .concat();
    let block = Block::new(raw_block(&entries, &[0]));
    let mut iter = block.iter(BytewiseComparator);

    iter.seek_to_first();
    assert!(iter.valid());

    iter.next();
    assert_corrupt(&iter);
}

// ------------------------------------------------------------------------------------------------
// Corrupt restart slots during seek
// ------------------------------------------------------------------------------------------------

/// # Scenario
/// The second restart slot points far outside the entry region; the
/// seek binary search probes it.
///
/// # Expected behavior
/// Corruption is reported without leaving the cursor on a spurious
/// position.
#[test]
fn restart_slot_beyond_entry_region() {
    init_tracing();

    let entries = [&[0, 1, 1][..], b"a", b"1"].concat();
    let block = Block::new(raw_block(&entries, &[0, 1000]));
    let mut iter = block.iter(BytewiseComparator);

    iter.seek(b"a");
    assert_corrupt(&iter);
}

/// # Scenario
/// A restart slot points at an entry whose `shared != 0` — restart
/// anchors must store the full key.
#[test]
fn restart_slot_with_shared_prefix() {
    // entry 0: "a" -> "1" (5 bytes); entry 1: "ab" -> "2" via shared=1.
    // The restart array wrongly lists entry 1 as an anchor.
    let entries = [&[0, 1, 1][..], b"a", b"1", &[1, 1, 1][..], b"b", b"2"].concat();
    let block = Block::new(raw_block(&entries, &[0, 5]));
    let mut iter = block.iter(BytewiseComparator);

    // Probe large enough to make the binary search decode slot 1.
    iter.seek(b"zz");
    assert_corrupt(&iter);
}

// ------------------------------------------------------------------------------------------------
// Error iterator
// ------------------------------------------------------------------------------------------------

/// # Scenario
/// An error-marker block hands out a perpetual error iterator; every
/// operation is inert and the corruption status never clears.
#[test]
fn error_iterator_is_inert() {
    let block = Block::new(vec![0u8; 3]);
    let mut iter = block.iter(BytewiseComparator);
    assert_corrupt(&iter);

    iter.seek_to_first();
    iter.seek_to_last();
    iter.seek(b"k");
    assert_corrupt(&iter);
}

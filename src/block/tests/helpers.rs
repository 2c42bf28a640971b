//! Shared helpers for block tests: tracing setup and a minimal writer
//! producing the prefix-compressed block format the reader consumes.

use crate::encoding;
use tracing::Level;
use tracing_subscriber::fmt::Subscriber;

pub fn init_tracing() {
    let _ = Subscriber::builder()
        .with_max_level(Level::TRACE)
        .try_init();
}

/// Test-only block writer.
///
/// Mirrors the table writer's format: keys are prefix-compressed against
/// the previous key, and every `restart_interval` entries the full key
/// is stored and its offset appended to the restart array.
pub struct BlockBuilder {
    buffer: Vec<u8>,
    restarts: Vec<u32>,
    counter: usize,
    restart_interval: usize,
    last_key: Vec<u8>,
}

impl BlockBuilder {
    pub fn new(restart_interval: usize) -> Self {
        assert!(restart_interval >= 1);
        BlockBuilder {
            buffer: Vec::new(),
            restarts: vec![0],
            counter: 0,
            restart_interval,
            last_key: Vec::new(),
        }
    }

    /// Append an entry. Keys must arrive in sorted order.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        let mut shared = 0;
        if self.counter < self.restart_interval {
            let min_len = self.last_key.len().min(key.len());
            while shared < min_len && self.last_key[shared] == key[shared] {
                shared += 1;
            }
        } else {
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
        }

        encoding::encode_varint32(&mut self.buffer, shared as u32);
        encoding::encode_varint32(&mut self.buffer, (key.len() - shared) as u32);
        encoding::encode_varint32(&mut self.buffer, value.len() as u32);
        self.buffer.extend_from_slice(&key[shared..]);
        self.buffer.extend_from_slice(value);

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.counter += 1;
    }

    /// Append the restart array and trailer, returning the block bytes.
    pub fn finish(mut self) -> Vec<u8> {
        let num_restarts = self.restarts.len() as u32;
        for &offset in &self.restarts {
            encoding::encode_fixed32(&mut self.buffer, offset);
        }
        encoding::encode_fixed32(&mut self.buffer, num_restarts);
        self.buffer
    }
}

/// Build a block holding `pairs` with the given restart stride.
pub fn build_block(restart_interval: usize, pairs: &[(&[u8], &[u8])]) -> Vec<u8> {
    let mut builder = BlockBuilder::new(restart_interval);
    for (key, value) in pairs {
        builder.add(key, value);
    }
    builder.finish()
}

/// `n` sorted key-value pairs: `key000 -> val0`, `key001 -> val1`, …
pub fn numbered_pairs(n: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..n)
        .map(|i| {
            (
                format!("key{i:03}").into_bytes(),
                format!("val{i}").into_bytes(),
            )
        })
        .collect()
}

/// Build a block from owned pairs.
pub fn build_block_owned(restart_interval: usize, pairs: &[(Vec<u8>, Vec<u8>)]) -> Vec<u8> {
    let mut builder = BlockBuilder::new(restart_interval);
    for (key, value) in pairs {
        builder.add(key, value);
    }
    builder.finish()
}

/// The five-key, two-restart block used by the seek and reverse-scan
/// scenarios: `k01 k02 k03` in restart 0, `k10 k11` in restart 1.
pub fn two_restart_block() -> Vec<u8> {
    build_block(
        3,
        &[
            (b"k01", b"v01"),
            (b"k02", b"v02"),
            (b"k03", b"v03"),
            (b"k10", b"v10"),
            (b"k11", b"v11"),
        ],
    )
}

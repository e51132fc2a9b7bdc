//! Proof-of-work sealing. Difficulty is the number of leading `'0'` hex
//! characters a sealed block hash must have. Demo scale, not a security
//! parameter.

use crate::models::Block;

pub const DIFFICULTY: usize = 3;

/// Highest difficulty a chain accepts. Each step multiplies mining cost by 16.
pub const MAX_DIFFICULTY: usize = 8;

pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

/// Increments the nonce until the hash satisfies `difficulty`. Runs to
/// completion; there is no cancellation.
pub fn mine(block: &mut Block, difficulty: usize) {
    let mut nonce = block.nonce;
    while !meets_difficulty(&block.hash, difficulty) {
        nonce += 1;
        block.reseal(nonce);
    }
}

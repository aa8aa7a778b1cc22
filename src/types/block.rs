//! Block container.
//!
//! A block is simply an ordered batch of transactions stamped with a
//! timestamp; the engine commits it to the store atomically (§4.5/§4.6).
//! Unlike a typical chain block, `id` is not self-derived from the
//! block's own contents here; it is supplied by whatever assembles
//! blocks (consensus, a test harness) and is opaque to the engine, which
//! only uses it as the version-store's rollback key.

use serde::{Deserialize, Serialize};

use super::tx::Transaction;
use super::Hash256;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub id: Hash256,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(id: Hash256, timestamp: u64, transactions: Vec<Transaction>) -> Self {
        Block {
            id,
            timestamp,
            transactions,
        }
    }

    pub fn total_fees(&self) -> u64 {
        self.transactions.iter().map(Transaction::fee).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::h;

    #[test]
    fn total_fees_sums_across_transaction_kinds() {
        let block = Block::new(h(b"block-1"), 1_700_000_000, vec![]);
        assert_eq!(block.total_fees(), 0);
    }
}

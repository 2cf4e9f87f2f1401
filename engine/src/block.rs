//! Blocks.
//!
//! ```text
//! [height: u64]
//! [parent_id: 32]
//! [timestamp: i64]       milliseconds
//! [tx_count: u32] [tx: u32 len + bytes]*
//! ```
//!
//! `id = sha256(bytes)`. Genesis is height 0 with an all-zero parent.

use tokenvm_primitives::codec::{self, Reader};
use tokenvm_primitives::crypto::hash_sha256;
use tokenvm_primitives::{BlockId, CodecError, MAX_BLOCK_SIZE, ZERO_ID};

use crate::registry::Registry;
use crate::transaction::Transaction;

/// height + parent + timestamp + count
const HEADER_SIZE: usize = 8 + 32 + 8 + 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    height: u64,
    parent_id: BlockId,
    timestamp: i64,
    txs: Vec<Transaction>,
    bytes: Vec<u8>,
    id: BlockId,
}

impl Block {
    pub fn new(parent_id: BlockId, height: u64, timestamp: i64, txs: Vec<Transaction>) -> Self {
        let body: usize = txs.iter().map(|tx| 4 + tx.size()).sum();
        let mut bytes = Vec::with_capacity(HEADER_SIZE + body);
        codec::write_u64(&mut bytes, height);
        codec::write_id(&mut bytes, &parent_id);
        codec::write_i64(&mut bytes, timestamp);
        codec::write_u32(&mut bytes, txs.len() as u32);
        for tx in &txs {
            codec::write_var_bytes(&mut bytes, tx.bytes());
        }
        let id = hash_sha256(&bytes);
        Self { height, parent_id, timestamp, txs, bytes, id }
    }

    pub fn genesis(timestamp: i64) -> Self {
        Self::new(ZERO_ID, 0, timestamp, Vec::new())
    }

    pub fn decode(data: &[u8], registry: &Registry) -> Result<Self, CodecError> {
        if data.len() > MAX_BLOCK_SIZE {
            return Err(CodecError::TooLarge { field: "block", size: data.len(), max: MAX_BLOCK_SIZE });
        }
        let mut r = Reader::new(data);
        let height = r.read_u64()?;
        let parent_id = r.read_id()?;
        let timestamp = r.read_i64()?;
        let count = r.read_count(4)?;
        let mut txs = Vec::with_capacity(count);
        for _ in 0..count {
            let raw = r.read_var_bytes("transaction", MAX_BLOCK_SIZE)?;
            txs.push(Transaction::decode(&raw, registry)?);
        }
        r.finish()?;
        Ok(Self {
            height,
            parent_id,
            timestamp,
            txs,
            bytes: data.to_vec(),
            id: hash_sha256(data),
        })
    }

    /// Read the timestamp from encoded block bytes without decoding the
    /// transactions.
    pub fn timestamp_of(data: &[u8]) -> Result<i64, CodecError> {
        let mut r = Reader::new(data);
        r.read_bytes(8 + 32)?;
        r.read_i64()
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn parent_id(&self) -> BlockId {
        self.parent_id
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn txs(&self) -> &[Transaction] {
        &self.txs
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Encoded size of a block header plus `tx_bytes` of transactions.
    pub fn size_with(tx_count: usize, tx_bytes: usize) -> usize {
        HEADER_SIZE + tx_count * 4 + tx_bytes
    }
}

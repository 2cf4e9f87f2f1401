//! State key layout and typed record access.
//!
//! ```text
//! 0x00 | address | asset          → balance (u64)
//! 0x01 | asset                    → AssetRecord
//! 0x02 | order id                 → OrderRecord
//! 0x03 | asset | destination      → outstanding loan (u64)
//! 0x04 | source chain | msg id    → incoming warp marker
//! 0x05 | tx id                    → outgoing warp message bytes
//! 0x06 | tx id                    → TxRecord
//! 0x07 | height                   → block bytes
//! 0x08 | height                   → encoded results
//! 0x09                            → last accepted (height, id)
//! 0x0a | height                   → block id
//! ```
//!
//! All integers big-endian. Each key is prefix-distinct so that a prefix
//! scan never crosses record types.

use tokenvm_primitives::codec::{self, Reader};
use tokenvm_primitives::{Address, AssetId, BlockId, ChainId, CodecError, Id, TxId};
use tokenvm_store::StateReader;

use crate::block::Block;
use crate::error::{ActionError, StateError};
use crate::state::StagedState;

const BALANCE_PREFIX: u8 = 0x00;
const ASSET_PREFIX: u8 = 0x01;
const ORDER_PREFIX: u8 = 0x02;
const LOAN_PREFIX: u8 = 0x03;
const INCOMING_WARP_PREFIX: u8 = 0x04;
const OUTGOING_WARP_PREFIX: u8 = 0x05;
const TX_PREFIX: u8 = 0x06;
const BLOCK_PREFIX: u8 = 0x07;
const RESULTS_PREFIX: u8 = 0x08;
const LAST_ACCEPTED_PREFIX: u8 = 0x09;
const BLOCK_ID_PREFIX: u8 = 0x0a;

pub const MAX_SYMBOL_SIZE: usize = 8;
pub const MAX_DECIMALS: u8 = 9;
pub const MAX_METADATA_SIZE: usize = 256;

fn key(prefix: u8, parts: &[&[u8]]) -> Vec<u8> {
    let len = 1 + parts.iter().map(|p| p.len()).sum::<usize>();
    let mut k = Vec::with_capacity(len);
    k.push(prefix);
    for part in parts {
        k.extend_from_slice(part);
    }
    k
}

pub fn balance_key(addr: &Address, asset: &AssetId) -> Vec<u8> {
    key(BALANCE_PREFIX, &[addr, asset])
}

pub fn asset_key(asset: &AssetId) -> Vec<u8> {
    key(ASSET_PREFIX, &[asset])
}

pub fn order_key(order: &Id) -> Vec<u8> {
    key(ORDER_PREFIX, &[order])
}

pub fn loan_key(asset: &AssetId, destination: &ChainId) -> Vec<u8> {
    key(LOAN_PREFIX, &[asset, destination])
}

pub fn incoming_warp_key(source: &ChainId, msg_id: &Id) -> Vec<u8> {
    key(INCOMING_WARP_PREFIX, &[source, msg_id])
}

pub fn outgoing_warp_key(tx_id: &TxId) -> Vec<u8> {
    key(OUTGOING_WARP_PREFIX, &[tx_id])
}

pub fn tx_key(tx_id: &TxId) -> Vec<u8> {
    key(TX_PREFIX, &[tx_id])
}

pub fn block_key(height: u64) -> Vec<u8> {
    key(BLOCK_PREFIX, &[&height.to_be_bytes()])
}

pub fn results_key(height: u64) -> Vec<u8> {
    key(RESULTS_PREFIX, &[&height.to_be_bytes()])
}

pub fn last_accepted_key() -> Vec<u8> {
    vec![LAST_ACCEPTED_PREFIX]
}

pub fn block_id_key(height: u64) -> Vec<u8> {
    key(BLOCK_ID_PREFIX, &[&height.to_be_bytes()])
}

fn corrupt(key: &[u8], source: CodecError) -> StateError {
    StateError::Corrupt { key: hex::encode(key), source }
}

fn decode_u64(key: &[u8], bytes: &[u8]) -> Result<u64, StateError> {
    let mut r = Reader::new(bytes);
    let v = r.read_u64().map_err(|e| corrupt(key, e))?;
    r.finish().map_err(|e| corrupt(key, e))?;
    Ok(v)
}

// ── Balances ──

pub fn get_balance(state: &StagedState, addr: &Address, asset: &AssetId) -> Result<u64, StateError> {
    let k = balance_key(addr, asset);
    match state.get(&k)? {
        Some(bytes) => decode_u64(&k, &bytes),
        None => Ok(0),
    }
}

/// Zero balances are deleted rather than stored.
pub fn set_balance(
    state: &mut StagedState,
    addr: &Address,
    asset: &AssetId,
    balance: u64,
) -> Result<(), StateError> {
    let k = balance_key(addr, asset);
    if balance == 0 {
        state.delete(k)
    } else {
        state.put(k, balance.to_be_bytes().to_vec())
    }
}

pub fn add_balance(
    state: &mut StagedState,
    addr: &Address,
    asset: &AssetId,
    amount: u64,
) -> Result<(), ActionError> {
    let current = get_balance(state, addr, asset)?;
    let next = current.checked_add(amount).ok_or(ActionError::Overflow)?;
    set_balance(state, addr, asset, next)?;
    Ok(())
}

pub fn sub_balance(
    state: &mut StagedState,
    addr: &Address,
    asset: &AssetId,
    amount: u64,
) -> Result<(), ActionError> {
    let current = get_balance(state, addr, asset)?;
    let next = current
        .checked_sub(amount)
        .ok_or(ActionError::InsufficientBalance { available: current, required: amount })?;
    set_balance(state, addr, asset, next)?;
    Ok(())
}

// ── Assets ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    pub symbol: Vec<u8>,
    pub decimals: u8,
    pub metadata: Vec<u8>,
    pub supply: u64,
    /// Zero for imported assets, which nobody may mint.
    pub owner: Address,
    /// Source chain and asset for imported assets.
    pub origin: Option<(ChainId, AssetId)>,
}

impl AssetRecord {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128);
        codec::write_var_bytes(&mut buf, &self.symbol);
        codec::write_u8(&mut buf, self.decimals);
        codec::write_var_bytes(&mut buf, &self.metadata);
        codec::write_u64(&mut buf, self.supply);
        codec::write_id(&mut buf, &self.owner);
        match &self.origin {
            Some((chain, asset)) => {
                codec::write_bool(&mut buf, true);
                codec::write_id(&mut buf, chain);
                codec::write_id(&mut buf, asset);
            }
            None => codec::write_bool(&mut buf, false),
        }
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let symbol = r.read_var_bytes("symbol", MAX_SYMBOL_SIZE)?;
        let decimals = r.read_u8()?;
        let metadata = r.read_var_bytes("metadata", MAX_METADATA_SIZE)?;
        let supply = r.read_u64()?;
        let owner = r.read_id()?;
        let origin = if r.read_bool()? {
            Some((r.read_id()?, r.read_id()?))
        } else {
            None
        };
        r.finish()?;
        Ok(Self { symbol, decimals, metadata, supply, owner, origin })
    }
}

pub fn get_asset(state: &StagedState, asset: &AssetId) -> Result<Option<AssetRecord>, StateError> {
    let k = asset_key(asset);
    state
        .get(&k)?
        .map(|bytes| AssetRecord::decode(&bytes).map_err(|e| corrupt(&k, e)))
        .transpose()
}

pub fn set_asset(state: &mut StagedState, asset: &AssetId, record: &AssetRecord) -> Result<(), StateError> {
    state.put(asset_key(asset), record.encode())
}

pub fn delete_asset(state: &mut StagedState, asset: &AssetId) -> Result<(), StateError> {
    state.delete(asset_key(asset))
}

// ── Orders ──

/// A standing offer: `in_tick` units of `in_asset` for `out_tick` units of
/// `out_asset`. `remaining` is denominated in `in_asset` and held in escrow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRecord {
    pub in_asset: AssetId,
    pub in_tick: u64,
    pub out_asset: AssetId,
    pub out_tick: u64,
    pub remaining: u64,
    pub owner: Address,
}

impl OrderRecord {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32 * 3 + 8 * 3);
        codec::write_id(&mut buf, &self.in_asset);
        codec::write_u64(&mut buf, self.in_tick);
        codec::write_id(&mut buf, &self.out_asset);
        codec::write_u64(&mut buf, self.out_tick);
        codec::write_u64(&mut buf, self.remaining);
        codec::write_id(&mut buf, &self.owner);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let record = Self {
            in_asset: r.read_id()?,
            in_tick: r.read_u64()?,
            out_asset: r.read_id()?,
            out_tick: r.read_u64()?,
            remaining: r.read_u64()?,
            owner: r.read_id()?,
        };
        r.finish()?;
        Ok(record)
    }
}

pub fn get_order(state: &StagedState, order: &Id) -> Result<Option<OrderRecord>, StateError> {
    let k = order_key(order);
    state
        .get(&k)?
        .map(|bytes| OrderRecord::decode(&bytes).map_err(|e| corrupt(&k, e)))
        .transpose()
}

pub fn set_order(state: &mut StagedState, order: &Id, record: &OrderRecord) -> Result<(), StateError> {
    state.put(order_key(order), record.encode())
}

pub fn delete_order(state: &mut StagedState, order: &Id) -> Result<(), StateError> {
    state.delete(order_key(order))
}

// ── Warp ──

pub fn get_loan(state: &StagedState, asset: &AssetId, destination: &ChainId) -> Result<u64, StateError> {
    let k = loan_key(asset, destination);
    match state.get(&k)? {
        Some(bytes) => decode_u64(&k, &bytes),
        None => Ok(0),
    }
}

pub fn set_loan(
    state: &mut StagedState,
    asset: &AssetId,
    destination: &ChainId,
    amount: u64,
) -> Result<(), StateError> {
    let k = loan_key(asset, destination);
    if amount == 0 {
        state.delete(k)
    } else {
        state.put(k, amount.to_be_bytes().to_vec())
    }
}

// ── Transaction records ──

/// Inclusion record for an accepted transaction. Its presence marks the
/// id as used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxRecord {
    pub timestamp: i64,
    pub success: bool,
    pub units: u64,
}

impl TxRecord {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(17);
        codec::write_i64(&mut buf, self.timestamp);
        codec::write_bool(&mut buf, self.success);
        codec::write_u64(&mut buf, self.units);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let record = Self {
            timestamp: r.read_i64()?,
            success: r.read_bool()?,
            units: r.read_u64()?,
        };
        r.finish()?;
        Ok(record)
    }
}

pub fn has_transaction(state: &StagedState, tx_id: &TxId) -> Result<bool, StateError> {
    state.contains(&tx_key(tx_id))
}

pub fn store_transaction(state: &mut StagedState, tx_id: &TxId, record: &TxRecord) -> Result<(), StateError> {
    state.put(tx_key(tx_id), record.encode())
}

pub fn get_transaction(reader: &dyn StateReader, tx_id: &TxId) -> Result<Option<TxRecord>, StateError> {
    let k = tx_key(tx_id);
    reader
        .get(&k)?
        .map(|bytes| TxRecord::decode(&bytes).map_err(|e| corrupt(&k, e)))
        .transpose()
}

// ── Chain metadata ──

pub fn encode_last_accepted(height: u64, id: &BlockId) -> Vec<u8> {
    let mut buf = Vec::with_capacity(40);
    codec::write_u64(&mut buf, height);
    codec::write_id(&mut buf, id);
    buf
}

pub fn get_last_accepted(reader: &dyn StateReader) -> Result<Option<(u64, BlockId)>, StateError> {
    let k = last_accepted_key();
    let Some(bytes) = reader.get(&k)? else {
        return Ok(None);
    };
    let mut r = Reader::new(&bytes);
    let height = r.read_u64().map_err(|e| corrupt(&k, e))?;
    let id = r.read_id().map_err(|e| corrupt(&k, e))?;
    r.finish().map_err(|e| corrupt(&k, e))?;
    Ok(Some((height, id)))
}

pub fn get_block_id(reader: &dyn StateReader, height: u64) -> Result<Option<BlockId>, StateError> {
    let k = block_id_key(height);
    let Some(bytes) = reader.get(&k)? else {
        return Ok(None);
    };
    let mut r = Reader::new(&bytes);
    let id = r.read_id().map_err(|e| corrupt(&k, e))?;
    r.finish().map_err(|e| corrupt(&k, e))?;
    Ok(Some(id))
}

pub fn get_block_bytes(reader: &dyn StateReader, height: u64) -> Result<Option<Vec<u8>>, StateError> {
    Ok(reader.get(&block_key(height))?)
}

pub fn get_block_timestamp(reader: &dyn StateReader, height: u64) -> Result<Option<i64>, StateError> {
    let k = block_key(height);
    let Some(bytes) = reader.get(&k)? else {
        return Ok(None);
    };
    Block::timestamp_of(&bytes).map(Some).map_err(|e| corrupt(&k, e))
}

pub fn get_results_bytes(reader: &dyn StateReader, height: u64) -> Result<Option<Vec<u8>>, StateError> {
    Ok(reader.get(&results_key(height))?)
}

pub fn get_outgoing_warp(reader: &dyn StateReader, tx_id: &TxId) -> Result<Option<Vec<u8>>, StateError> {
    Ok(reader.get(&outgoing_warp_key(tx_id))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokenvm_store::{MemStore, StateStore};

    fn empty_state() -> StagedState {
        StagedState::new(MemStore::new().snapshot())
    }

    #[test]
    fn test_keys_are_prefix_distinct() {
        let id = [1u8; 32];
        let keys = [
            balance_key(&id, &id),
            asset_key(&id),
            order_key(&id),
            loan_key(&id, &id),
            incoming_warp_key(&id, &id),
            outgoing_warp_key(&id),
            tx_key(&id),
            block_key(1),
            results_key(1),
            last_accepted_key(),
            block_id_key(1),
        ];
        let prefixes: std::collections::BTreeSet<u8> = keys.iter().map(|k| k[0]).collect();
        assert_eq!(prefixes.len(), keys.len());
    }

    #[test]
    fn test_balance_arithmetic() {
        let mut state = empty_state();
        let (alice, asset) = ([1u8; 32], [2u8; 32]);
        add_balance(&mut state, &alice, &asset, 100).unwrap();
        sub_balance(&mut state, &alice, &asset, 40).unwrap();
        assert_eq!(get_balance(&state, &alice, &asset).unwrap(), 60);

        let err = sub_balance(&mut state, &alice, &asset, 61).unwrap_err();
        assert_eq!(err, ActionError::InsufficientBalance { available: 60, required: 61 });

        add_balance(&mut state, &alice, &asset, u64::MAX - 60).unwrap();
        assert_eq!(add_balance(&mut state, &alice, &asset, 1).unwrap_err(), ActionError::Overflow);
    }

    #[test]
    fn test_zero_balance_deleted() {
        let mut state = empty_state();
        let (alice, asset) = ([1u8; 32], [2u8; 32]);
        add_balance(&mut state, &alice, &asset, 5).unwrap();
        sub_balance(&mut state, &alice, &asset, 5).unwrap();
        assert!(!state.contains(&balance_key(&alice, &asset)).unwrap());
    }

    #[test]
    fn test_asset_record_encoding() {
        let record = AssetRecord {
            symbol: b"GOLD".to_vec(),
            decimals: 2,
            metadata: b"bars".to_vec(),
            supply: 1_000,
            owner: [3u8; 32],
            origin: Some(([4u8; 32], [5u8; 32])),
        };
        assert_eq!(AssetRecord::decode(&record.encode()).unwrap(), record);
    }

    #[test]
    fn test_corrupt_balance_surfaces() {
        let mut state = empty_state();
        let (alice, asset) = ([1u8; 32], [2u8; 32]);
        state.put(balance_key(&alice, &asset), vec![1, 2, 3]).unwrap();
        assert!(matches!(
            get_balance(&state, &alice, &asset),
            Err(StateError::Corrupt { .. })
        ));
    }
}

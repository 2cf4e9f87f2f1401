//! The closed set of tokenvm actions.
//!
//! Each variant declares, before execution:
//! - the state keys it may touch ([`Action::state_keys`])
//! - its fixed compute-unit cost ([`Action::max_units`])
//! - the timestamps at which it is valid ([`Action::valid_range`])
//!
//! Adding a variant forces every `match` over `Action` (processing,
//! metrics, order book side effects) to handle it.

use tokenvm_primitives::codec::{self, Reader};
use tokenvm_primitives::crypto::hash_blake3;
use tokenvm_primitives::{Address, AssetId, ChainId, CodecError, Id, TxId, WarpMessage};

use crate::rules::Rules;
use crate::storage::{
    asset_key, balance_key, incoming_warp_key, loan_key, order_key, outgoing_warp_key,
    MAX_METADATA_SIZE, MAX_SYMBOL_SIZE,
};

pub const MAX_MEMO_SIZE: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateAsset {
    pub symbol: Vec<u8>,
    pub decimals: u8,
    pub metadata: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintAsset {
    pub to: Address,
    pub asset: AssetId,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurnAsset {
    pub asset: AssetId,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyAsset {
    pub asset: AssetId,
    /// New owner. Pass the current owner to keep it.
    pub owner: Address,
    pub symbol: Vec<u8>,
    pub decimals: u8,
    pub metadata: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub to: Address,
    pub asset: AssetId,
    pub value: u64,
    pub memo: Vec<u8>,
}

/// Offer `supply` units of `in_asset` at `in_tick` per `out_tick` units of
/// `out_asset`. The supply moves into escrow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrder {
    pub in_asset: AssetId,
    pub in_tick: u64,
    pub out_asset: AssetId,
    pub out_tick: u64,
    pub supply: u64,
}

/// Take `value` units of the order's `in_asset`, paying
/// `floor(value * out_tick / in_tick)` units of `out_asset` to the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillOrder {
    pub order: Id,
    pub owner: Address,
    pub in_asset: AssetId,
    pub out_asset: AssetId,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseOrder {
    pub order: Id,
    pub in_asset: AssetId,
}

/// Import the transfer carried by the transaction's warp message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportAsset;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportAsset {
    pub to: Address,
    pub asset: AssetId,
    pub value: u64,
    /// Send an imported asset back to the chain it came from.
    pub return_: bool,
    /// Paid on the destination chain to whoever submits the import.
    pub reward: u64,
    pub destination: ChainId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    CreateAsset(CreateAsset),
    MintAsset(MintAsset),
    BurnAsset(BurnAsset),
    ModifyAsset(ModifyAsset),
    Transfer(Transfer),
    CreateOrder(CreateOrder),
    FillOrder(FillOrder),
    CloseOrder(CloseOrder),
    ImportAsset(ImportAsset),
    ExportAsset(ExportAsset),
}

impl Action {
    pub const CREATE_ASSET: u8 = 0;
    pub const MINT_ASSET: u8 = 1;
    pub const BURN_ASSET: u8 = 2;
    pub const MODIFY_ASSET: u8 = 3;
    pub const TRANSFER: u8 = 4;
    pub const CREATE_ORDER: u8 = 5;
    pub const FILL_ORDER: u8 = 6;
    pub const CLOSE_ORDER: u8 = 7;
    pub const IMPORT_ASSET: u8 = 8;
    pub const EXPORT_ASSET: u8 = 9;

    pub fn type_id(&self) -> u8 {
        match self {
            Self::CreateAsset(_) => Self::CREATE_ASSET,
            Self::MintAsset(_) => Self::MINT_ASSET,
            Self::BurnAsset(_) => Self::BURN_ASSET,
            Self::ModifyAsset(_) => Self::MODIFY_ASSET,
            Self::Transfer(_) => Self::TRANSFER,
            Self::CreateOrder(_) => Self::CREATE_ORDER,
            Self::FillOrder(_) => Self::FILL_ORDER,
            Self::CloseOrder(_) => Self::CLOSE_ORDER,
            Self::ImportAsset(_) => Self::IMPORT_ASSET,
            Self::ExportAsset(_) => Self::EXPORT_ASSET,
        }
    }

    /// Label used in logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateAsset(_) => "create_asset",
            Self::MintAsset(_) => "mint_asset",
            Self::BurnAsset(_) => "burn_asset",
            Self::ModifyAsset(_) => "modify_asset",
            Self::Transfer(_) => "transfer",
            Self::CreateOrder(_) => "create_order",
            Self::FillOrder(_) => "fill_order",
            Self::CloseOrder(_) => "close_order",
            Self::ImportAsset(_) => "import_asset",
            Self::ExportAsset(_) => "export_asset",
        }
    }

    /// Compute units charged for the action body.
    pub fn max_units(&self) -> u64 {
        match self {
            Self::CreateAsset(_)
            | Self::MintAsset(_)
            | Self::BurnAsset(_)
            | Self::ModifyAsset(_)
            | Self::Transfer(_) => 1,
            Self::CreateOrder(_) | Self::FillOrder(_) | Self::CloseOrder(_) => 5,
            Self::ImportAsset(_) | Self::ExportAsset(_) => 10,
        }
    }

    /// Inclusive `(start, end)` timestamps; `-1` means unbounded.
    pub fn valid_range(&self, rules: &Rules) -> (i64, i64) {
        match self {
            Self::ImportAsset(_) | Self::ExportAsset(_) => (rules.warp_activation, -1),
            _ => (-1, -1),
        }
    }

    pub fn requires_warp(&self) -> bool {
        matches!(self, Self::ImportAsset(_))
    }

    /// Every key the action may read or write.
    pub fn state_keys(&self, actor: &Address, tx_id: &TxId, warp: Option<&WarpMessage>) -> Vec<Vec<u8>> {
        match self {
            Self::CreateAsset(_) => vec![asset_key(tx_id)],
            Self::MintAsset(a) => vec![asset_key(&a.asset), balance_key(&a.to, &a.asset)],
            Self::BurnAsset(a) => vec![asset_key(&a.asset), balance_key(actor, &a.asset)],
            Self::ModifyAsset(a) => vec![asset_key(&a.asset)],
            Self::Transfer(a) => vec![balance_key(actor, &a.asset), balance_key(&a.to, &a.asset)],
            Self::CreateOrder(a) => vec![order_key(tx_id), balance_key(actor, &a.in_asset)],
            Self::FillOrder(a) => vec![
                order_key(&a.order),
                balance_key(&a.owner, &a.out_asset),
                balance_key(actor, &a.out_asset),
                balance_key(actor, &a.in_asset),
            ],
            Self::CloseOrder(a) => vec![order_key(&a.order), balance_key(actor, &a.in_asset)],
            Self::ImportAsset(_) => {
                let Some(msg) = warp else {
                    return Vec::new();
                };
                let mut keys = vec![incoming_warp_key(&msg.source_chain_id, &msg.id())];
                let Ok(transfer) = WarpTransfer::decode(&msg.payload) else {
                    return keys;
                };
                let asset = if transfer.return_ {
                    keys.push(loan_key(&transfer.asset, &msg.source_chain_id));
                    transfer.asset
                } else {
                    imported_asset_id(&msg.source_chain_id, &transfer.asset)
                };
                keys.push(asset_key(&asset));
                keys.push(balance_key(&transfer.to, &asset));
                keys.push(balance_key(actor, &asset));
                keys
            }
            Self::ExportAsset(a) => {
                let mut keys = vec![
                    asset_key(&a.asset),
                    outgoing_warp_key(tx_id),
                    balance_key(actor, &a.asset),
                ];
                if !a.return_ {
                    keys.push(loan_key(&a.asset, &a.destination));
                }
                keys
            }
        }
    }

    /// Encode the action body (without its type tag).
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Self::CreateAsset(a) => {
                codec::write_var_bytes(buf, &a.symbol);
                codec::write_u8(buf, a.decimals);
                codec::write_var_bytes(buf, &a.metadata);
            }
            Self::MintAsset(a) => {
                codec::write_id(buf, &a.to);
                codec::write_id(buf, &a.asset);
                codec::write_u64(buf, a.value);
            }
            Self::BurnAsset(a) => {
                codec::write_id(buf, &a.asset);
                codec::write_u64(buf, a.value);
            }
            Self::ModifyAsset(a) => {
                codec::write_id(buf, &a.asset);
                codec::write_id(buf, &a.owner);
                codec::write_var_bytes(buf, &a.symbol);
                codec::write_u8(buf, a.decimals);
                codec::write_var_bytes(buf, &a.metadata);
            }
            Self::Transfer(a) => {
                codec::write_id(buf, &a.to);
                codec::write_id(buf, &a.asset);
                codec::write_u64(buf, a.value);
                codec::write_var_bytes(buf, &a.memo);
            }
            Self::CreateOrder(a) => {
                codec::write_id(buf, &a.in_asset);
                codec::write_u64(buf, a.in_tick);
                codec::write_id(buf, &a.out_asset);
                codec::write_u64(buf, a.out_tick);
                codec::write_u64(buf, a.supply);
            }
            Self::FillOrder(a) => {
                codec::write_id(buf, &a.order);
                codec::write_id(buf, &a.owner);
                codec::write_id(buf, &a.in_asset);
                codec::write_id(buf, &a.out_asset);
                codec::write_u64(buf, a.value);
            }
            Self::CloseOrder(a) => {
                codec::write_id(buf, &a.order);
                codec::write_id(buf, &a.in_asset);
            }
            Self::ImportAsset(_) => {}
            Self::ExportAsset(a) => {
                codec::write_id(buf, &a.to);
                codec::write_id(buf, &a.asset);
                codec::write_u64(buf, a.value);
                codec::write_bool(buf, a.return_);
                codec::write_u64(buf, a.reward);
                codec::write_id(buf, &a.destination);
            }
        }
    }
}

// ── Decoders, registered by tag in `Registry::tokenvm` ──

impl CreateAsset {
    pub fn decode(r: &mut Reader<'_>) -> Result<Action, CodecError> {
        Ok(Action::CreateAsset(Self {
            symbol: r.read_var_bytes("symbol", MAX_SYMBOL_SIZE)?,
            decimals: r.read_u8()?,
            metadata: r.read_var_bytes("metadata", MAX_METADATA_SIZE)?,
        }))
    }
}

impl MintAsset {
    pub fn decode(r: &mut Reader<'_>) -> Result<Action, CodecError> {
        Ok(Action::MintAsset(Self {
            to: r.read_id()?,
            asset: r.read_id()?,
            value: r.read_u64()?,
        }))
    }
}

impl BurnAsset {
    pub fn decode(r: &mut Reader<'_>) -> Result<Action, CodecError> {
        Ok(Action::BurnAsset(Self {
            asset: r.read_id()?,
            value: r.read_u64()?,
        }))
    }
}

impl ModifyAsset {
    pub fn decode(r: &mut Reader<'_>) -> Result<Action, CodecError> {
        Ok(Action::ModifyAsset(Self {
            asset: r.read_id()?,
            owner: r.read_id()?,
            symbol: r.read_var_bytes("symbol", MAX_SYMBOL_SIZE)?,
            decimals: r.read_u8()?,
            metadata: r.read_var_bytes("metadata", MAX_METADATA_SIZE)?,
        }))
    }
}

impl Transfer {
    pub fn decode(r: &mut Reader<'_>) -> Result<Action, CodecError> {
        Ok(Action::Transfer(Self {
            to: r.read_id()?,
            asset: r.read_id()?,
            value: r.read_u64()?,
            memo: r.read_var_bytes("memo", MAX_MEMO_SIZE)?,
        }))
    }
}

impl CreateOrder {
    pub fn decode(r: &mut Reader<'_>) -> Result<Action, CodecError> {
        Ok(Action::CreateOrder(Self {
            in_asset: r.read_id()?,
            in_tick: r.read_u64()?,
            out_asset: r.read_id()?,
            out_tick: r.read_u64()?,
            supply: r.read_u64()?,
        }))
    }
}

impl FillOrder {
    pub fn decode(r: &mut Reader<'_>) -> Result<Action, CodecError> {
        Ok(Action::FillOrder(Self {
            order: r.read_id()?,
            owner: r.read_id()?,
            in_asset: r.read_id()?,
            out_asset: r.read_id()?,
            value: r.read_u64()?,
        }))
    }
}

impl CloseOrder {
    pub fn decode(r: &mut Reader<'_>) -> Result<Action, CodecError> {
        Ok(Action::CloseOrder(Self {
            order: r.read_id()?,
            in_asset: r.read_id()?,
        }))
    }
}

impl ImportAsset {
    pub fn decode(_r: &mut Reader<'_>) -> Result<Action, CodecError> {
        Ok(Action::ImportAsset(Self))
    }
}

impl ExportAsset {
    pub fn decode(r: &mut Reader<'_>) -> Result<Action, CodecError> {
        Ok(Action::ExportAsset(Self {
            to: r.read_id()?,
            asset: r.read_id()?,
            value: r.read_u64()?,
            return_: r.read_bool()?,
            reward: r.read_u64()?,
            destination: r.read_id()?,
        }))
    }
}

/// Output of a successful fill, stored as the result output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderResult {
    /// `in_asset` received by the filler.
    pub in_amount: u64,
    /// `out_asset` paid to the owner.
    pub out_amount: u64,
    pub remaining: u64,
}

impl OrderResult {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(24);
        codec::write_u64(&mut buf, self.in_amount);
        codec::write_u64(&mut buf, self.out_amount);
        codec::write_u64(&mut buf, self.remaining);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let result = Self {
            in_amount: r.read_u64()?,
            out_amount: r.read_u64()?,
            remaining: r.read_u64()?,
        };
        r.finish()?;
        Ok(result)
    }
}

/// Warp payload produced by `ExportAsset` and consumed by `ImportAsset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarpTransfer {
    pub to: Address,
    /// Asset id on the chain that will credit it.
    pub asset: AssetId,
    pub value: u64,
    pub return_: bool,
    pub reward: u64,
    /// Export transaction id.
    pub tx_id: TxId,
    pub destination: ChainId,
}

impl WarpTransfer {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32 * 4 + 17);
        codec::write_id(&mut buf, &self.to);
        codec::write_id(&mut buf, &self.asset);
        codec::write_u64(&mut buf, self.value);
        codec::write_bool(&mut buf, self.return_);
        codec::write_u64(&mut buf, self.reward);
        codec::write_id(&mut buf, &self.tx_id);
        codec::write_id(&mut buf, &self.destination);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let transfer = Self {
            to: r.read_id()?,
            asset: r.read_id()?,
            value: r.read_u64()?,
            return_: r.read_bool()?,
            reward: r.read_u64()?,
            tx_id: r.read_id()?,
            destination: r.read_id()?,
        };
        r.finish()?;
        Ok(transfer)
    }
}

/// Local id of an asset imported from `source`.
pub fn imported_asset_id(source: &ChainId, asset: &AssetId) -> AssetId {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(source);
    buf.extend_from_slice(asset);
    hash_blake3(&buf)
}

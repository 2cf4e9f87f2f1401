//! Action semantics.
//!
//! Every function here runs with the state scoped to the action's declared
//! keys. Returning an [`ActionError`] makes the executor roll the action
//! back and record a failed result; the fee stays charged.

use tokenvm_primitives::{Address, TxId, WarpMessage, NATIVE_ASSET, ZERO_ID};

use crate::action::{
    imported_asset_id, Action, BurnAsset, CloseOrder, CreateAsset, CreateOrder, ExportAsset,
    FillOrder, MintAsset, ModifyAsset, OrderResult, Transfer, WarpTransfer,
};
use crate::error::ActionError;
use crate::rules::Rules;
use crate::state::StagedState;
use crate::storage::{
    add_balance, delete_asset, delete_order, get_asset, get_loan, get_order, incoming_warp_key,
    outgoing_warp_key, set_asset, set_loan, set_order, sub_balance, AssetRecord, OrderRecord,
    MAX_DECIMALS,
};

/// Inputs an action may depend on besides state.
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    pub rules: &'a Rules,
    pub actor: Address,
    pub tx_id: TxId,
    pub warp_message: Option<&'a WarpMessage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutput {
    pub output: Vec<u8>,
    pub warp_message: Option<WarpMessage>,
}

impl ActionOutput {
    fn empty() -> Self {
        Self::default()
    }

    fn bytes(output: Vec<u8>) -> Self {
        Self { output, warp_message: None }
    }
}

pub fn process(
    action: &Action,
    state: &mut StagedState,
    ctx: &ActionContext<'_>,
) -> Result<ActionOutput, ActionError> {
    match action {
        Action::CreateAsset(a) => create_asset(a, state, ctx),
        Action::MintAsset(a) => mint_asset(a, state, ctx),
        Action::BurnAsset(a) => burn_asset(a, state, ctx),
        Action::ModifyAsset(a) => modify_asset(a, state, ctx),
        Action::Transfer(a) => transfer(a, state, ctx),
        Action::CreateOrder(a) => create_order(a, state, ctx),
        Action::FillOrder(a) => fill_order(a, state, ctx),
        Action::CloseOrder(a) => close_order(a, state, ctx),
        Action::ImportAsset(_) => import_asset(state, ctx),
        Action::ExportAsset(a) => export_asset(a, state, ctx),
    }
}

fn create_asset(a: &CreateAsset, state: &mut StagedState, ctx: &ActionContext<'_>) -> Result<ActionOutput, ActionError> {
    if a.decimals > MAX_DECIMALS {
        return Err(ActionError::FieldTooLarge { field: "decimals" });
    }
    if get_asset(state, &ctx.tx_id)?.is_some() {
        return Err(ActionError::AssetExists);
    }
    let record = AssetRecord {
        symbol: a.symbol.clone(),
        decimals: a.decimals,
        metadata: a.metadata.clone(),
        supply: 0,
        owner: ctx.actor,
        origin: None,
    };
    set_asset(state, &ctx.tx_id, &record)?;
    Ok(ActionOutput::empty())
}

fn mint_asset(a: &MintAsset, state: &mut StagedState, ctx: &ActionContext<'_>) -> Result<ActionOutput, ActionError> {
    if a.asset == NATIVE_ASSET {
        return Err(ActionError::NativeAsset("minted"));
    }
    if a.value == 0 {
        return Err(ActionError::ZeroValue);
    }
    let mut record = get_asset(state, &a.asset)?.ok_or(ActionError::AssetMissing)?;
    if record.owner != ctx.actor {
        return Err(ActionError::NotOwner);
    }
    record.supply = record.supply.checked_add(a.value).ok_or(ActionError::Overflow)?;
    set_asset(state, &a.asset, &record)?;
    add_balance(state, &a.to, &a.asset, a.value)?;
    Ok(ActionOutput::empty())
}

fn burn_asset(a: &BurnAsset, state: &mut StagedState, ctx: &ActionContext<'_>) -> Result<ActionOutput, ActionError> {
    if a.value == 0 {
        return Err(ActionError::ZeroValue);
    }
    let mut record = get_asset(state, &a.asset)?.ok_or(ActionError::AssetMissing)?;
    sub_balance(state, &ctx.actor, &a.asset, a.value)?;
    record.supply = record.supply.checked_sub(a.value).ok_or(ActionError::Overflow)?;
    set_asset(state, &a.asset, &record)?;
    Ok(ActionOutput::empty())
}

fn modify_asset(a: &ModifyAsset, state: &mut StagedState, ctx: &ActionContext<'_>) -> Result<ActionOutput, ActionError> {
    if a.asset == NATIVE_ASSET {
        return Err(ActionError::NativeAsset("modified"));
    }
    if a.decimals > MAX_DECIMALS {
        return Err(ActionError::FieldTooLarge { field: "decimals" });
    }
    let mut record = get_asset(state, &a.asset)?.ok_or(ActionError::AssetMissing)?;
    if record.owner != ctx.actor {
        return Err(ActionError::NotOwner);
    }
    record.owner = a.owner;
    record.symbol = a.symbol.clone();
    record.decimals = a.decimals;
    record.metadata = a.metadata.clone();
    set_asset(state, &a.asset, &record)?;
    Ok(ActionOutput::empty())
}

fn transfer(a: &Transfer, state: &mut StagedState, ctx: &ActionContext<'_>) -> Result<ActionOutput, ActionError> {
    if a.value == 0 {
        return Err(ActionError::ZeroValue);
    }
    sub_balance(state, &ctx.actor, &a.asset, a.value)?;
    add_balance(state, &a.to, &a.asset, a.value)?;
    Ok(ActionOutput::empty())
}

fn create_order(a: &CreateOrder, state: &mut StagedState, ctx: &ActionContext<'_>) -> Result<ActionOutput, ActionError> {
    if a.in_asset == a.out_asset {
        return Err(ActionError::SameAsset);
    }
    if a.in_tick == 0 || a.out_tick == 0 || a.supply == 0 {
        return Err(ActionError::ZeroValue);
    }
    sub_balance(state, &ctx.actor, &a.in_asset, a.supply)?;
    let record = OrderRecord {
        in_asset: a.in_asset,
        in_tick: a.in_tick,
        out_asset: a.out_asset,
        out_tick: a.out_tick,
        remaining: a.supply,
        owner: ctx.actor,
    };
    set_order(state, &ctx.tx_id, &record)?;
    Ok(ActionOutput::empty())
}

/// `floor(value * out_tick / in_tick)`, computed without intermediate
/// overflow. `None` if the quotient does not fit in a u64.
pub fn fill_output(value: u64, in_tick: u64, out_tick: u64) -> Option<u64> {
    if in_tick == 0 {
        return None;
    }
    let out = u128::from(value) * u128::from(out_tick) / u128::from(in_tick);
    u64::try_from(out).ok()
}

fn fill_order(a: &FillOrder, state: &mut StagedState, ctx: &ActionContext<'_>) -> Result<ActionOutput, ActionError> {
    if a.value == 0 {
        return Err(ActionError::ZeroValue);
    }
    let mut order = get_order(state, &a.order)?.ok_or(ActionError::OrderMissing)?;
    if order.owner != a.owner {
        return Err(ActionError::OrderMismatch("owner"));
    }
    if order.in_asset != a.in_asset {
        return Err(ActionError::OrderMismatch("in asset"));
    }
    if order.out_asset != a.out_asset {
        return Err(ActionError::OrderMismatch("out asset"));
    }
    if a.value > order.remaining {
        return Err(ActionError::FillTooLarge { value: a.value, remaining: order.remaining });
    }
    let out = fill_output(a.value, order.in_tick, order.out_tick).ok_or(ActionError::Overflow)?;
    if out == 0 {
        return Err(ActionError::FillOutputZero);
    }

    sub_balance(state, &ctx.actor, &order.out_asset, out)?;
    add_balance(state, &order.owner, &order.out_asset, out)?;
    add_balance(state, &ctx.actor, &order.in_asset, a.value)?;

    order.remaining -= a.value;
    if order.remaining == 0 {
        delete_order(state, &a.order)?;
    } else {
        set_order(state, &a.order, &order)?;
    }
    let result = OrderResult { in_amount: a.value, out_amount: out, remaining: order.remaining };
    Ok(ActionOutput::bytes(result.encode()))
}

fn close_order(a: &CloseOrder, state: &mut StagedState, ctx: &ActionContext<'_>) -> Result<ActionOutput, ActionError> {
    let order = get_order(state, &a.order)?.ok_or(ActionError::OrderMissing)?;
    if order.owner != ctx.actor {
        return Err(ActionError::NotOwner);
    }
    if order.in_asset != a.in_asset {
        return Err(ActionError::OrderMismatch("in asset"));
    }
    delete_order(state, &a.order)?;
    add_balance(state, &ctx.actor, &order.in_asset, order.remaining)?;
    Ok(ActionOutput::empty())
}

fn import_asset(state: &mut StagedState, ctx: &ActionContext<'_>) -> Result<ActionOutput, ActionError> {
    let msg = ctx.warp_message.ok_or(ActionError::WarpMissing)?;
    let transfer = WarpTransfer::decode(&msg.payload).map_err(ActionError::WarpPayload)?;
    if transfer.destination != ctx.rules.chain_id {
        return Err(ActionError::WarpWrongDestination);
    }
    let marker = incoming_warp_key(&msg.source_chain_id, &msg.id());
    if state.contains(&marker)? {
        return Err(ActionError::WarpReplay);
    }
    state.put(marker, vec![1])?;

    let total = transfer.value.checked_add(transfer.reward).ok_or(ActionError::Overflow)?;
    let asset = if transfer.return_ {
        // Our own asset coming home: release it from the outstanding loan.
        let loan = get_loan(state, &transfer.asset, &msg.source_chain_id)?;
        if loan < total {
            return Err(ActionError::LoanTooSmall { available: loan, required: total });
        }
        set_loan(state, &transfer.asset, &msg.source_chain_id, loan - total)?;
        transfer.asset
    } else {
        let local = imported_asset_id(&msg.source_chain_id, &transfer.asset);
        let mut record = get_asset(state, &local)?.unwrap_or_else(|| AssetRecord {
            symbol: b"WARP".to_vec(),
            decimals: 0,
            metadata: transfer.asset.to_vec(),
            supply: 0,
            owner: ZERO_ID,
            origin: Some((msg.source_chain_id, transfer.asset)),
        });
        record.supply = record.supply.checked_add(total).ok_or(ActionError::Overflow)?;
        set_asset(state, &local, &record)?;
        local
    };

    add_balance(state, &transfer.to, &asset, transfer.value)?;
    if transfer.reward > 0 {
        add_balance(state, &ctx.actor, &asset, transfer.reward)?;
    }
    Ok(ActionOutput::empty())
}

fn export_asset(a: &ExportAsset, state: &mut StagedState, ctx: &ActionContext<'_>) -> Result<ActionOutput, ActionError> {
    if a.value == 0 {
        return Err(ActionError::ZeroValue);
    }
    if a.destination == ctx.rules.chain_id {
        return Err(ActionError::WarpWrongDestination);
    }
    let total = a.value.checked_add(a.reward).ok_or(ActionError::Overflow)?;
    sub_balance(state, &ctx.actor, &a.asset, total)?;

    let payload_asset = if a.return_ {
        let mut record = get_asset(state, &a.asset)?.ok_or(ActionError::AssetMissing)?;
        let origin_asset = match record.origin {
            Some((chain, origin_asset)) if chain == a.destination => origin_asset,
            _ => return Err(ActionError::WrongReturnChain),
        };
        record.supply = record.supply.checked_sub(total).ok_or(ActionError::Overflow)?;
        if record.supply == 0 {
            delete_asset(state, &a.asset)?;
        } else {
            set_asset(state, &a.asset, &record)?;
        }
        origin_asset
    } else {
        let loan = get_loan(state, &a.asset, &a.destination)?;
        let next = loan.checked_add(total).ok_or(ActionError::Overflow)?;
        set_loan(state, &a.asset, &a.destination, next)?;
        a.asset
    };

    let transfer = WarpTransfer {
        to: a.to,
        asset: payload_asset,
        value: a.value,
        return_: a.return_,
        reward: a.reward,
        tx_id: ctx.tx_id,
        destination: a.destination,
    };
    let msg = WarpMessage::new(ctx.rules.network_id, ctx.rules.chain_id, transfer.encode());
    state.put(outgoing_warp_key(&ctx.tx_id), msg.bytes())?;
    Ok(ActionOutput { output: Vec::new(), warp_message: Some(msg) })
}

//! In-memory order index.
//!
//! Orders live in state; this book mirrors the ones on tracked pairs so
//! clients can find fill candidates. It is updated only after a block
//! commits. There is no crossing engine: orders change solely through
//! `FillOrder` and `CloseOrder` transactions.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use parking_lot::RwLock;
use tokenvm_primitives::types::id_to_hex;
use tokenvm_primitives::{Address, AssetId, Id};
use tracing::trace;

use crate::config::parse_id;
use crate::error::{ConfigError, OrderBookError};

/// Trading pair with its two assets in canonical order, so both trade
/// directions share one book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairId(AssetId, AssetId);

impl PairId {
    pub fn new(a: AssetId, b: AssetId) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    pub fn assets(&self) -> (AssetId, AssetId) {
        (self.0, self.1)
    }
}

impl fmt::Display for PairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", id_to_hex(&self.0), id_to_hex(&self.1))
    }
}

impl FromStr for PairId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s
            .split_once('-')
            .ok_or_else(|| ConfigError::InvalidPair(s.to_string()))?;
        Ok(Self::new(parse_id("track_pairs", a)?, parse_id("track_pairs", b)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackedPairs {
    All,
    Only(BTreeSet<PairId>),
}

impl TrackedPairs {
    pub fn contains(&self, pair: &PairId) -> bool {
        match self {
            Self::All => true,
            Self::Only(pairs) => pairs.contains(pair),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Id of the `CreateOrder` transaction.
    pub id: Id,
    pub owner: Address,
    pub in_asset: AssetId,
    pub in_tick: u64,
    pub out_asset: AssetId,
    pub out_tick: u64,
    pub remaining: u64,
}

impl Order {
    pub fn pair(&self) -> PairId {
        PairId::new(self.in_asset, self.out_asset)
    }

    /// Compare by price (`out_tick / in_tick`), cheapest first.
    fn cmp_price(&self, other: &Self) -> Ordering {
        let lhs = u128::from(self.out_tick) * u128::from(other.in_tick);
        let rhs = u128::from(other.out_tick) * u128::from(self.in_tick);
        lhs.cmp(&rhs).then_with(|| self.id.cmp(&other.id))
    }
}

#[derive(Default)]
struct Books {
    pairs: HashMap<PairId, HashMap<Id, Order>>,
    index: HashMap<Id, PairId>,
}

pub struct OrderBook {
    tracked: TrackedPairs,
    books: RwLock<Books>,
}

impl OrderBook {
    pub fn new(tracked: TrackedPairs) -> Self {
        Self { tracked, books: RwLock::new(Books::default()) }
    }

    /// Insert an order. Returns `false` if its pair is not tracked.
    pub fn add(&self, order: Order) -> bool {
        let pair = order.pair();
        if !self.tracked.contains(&pair) {
            return false;
        }
        trace!(order = %id_to_hex(&order.id), %pair, remaining = order.remaining, "order added");
        let mut books = self.books.write();
        books.index.insert(order.id, pair);
        books.pairs.entry(pair).or_default().insert(order.id, order);
        true
    }

    pub fn update_remaining(&self, id: &Id, remaining: u64) -> Result<(), OrderBookError> {
        let mut books = self.books.write();
        let pair = *books.index.get(id).ok_or(OrderBookError::Missing(*id))?;
        let order = books
            .pairs
            .get_mut(&pair)
            .and_then(|orders| orders.get_mut(id))
            .ok_or(OrderBookError::Missing(*id))?;
        if remaining > order.remaining {
            return Err(OrderBookError::Increase { current: order.remaining, new: remaining });
        }
        order.remaining = remaining;
        Ok(())
    }

    pub fn remove(&self, id: &Id) -> Option<Order> {
        let mut books = self.books.write();
        let pair = books.index.remove(id)?;
        let orders = books.pairs.get_mut(&pair)?;
        let order = orders.remove(id);
        if orders.is_empty() {
            books.pairs.remove(&pair);
        }
        order
    }

    pub fn get(&self, id: &Id) -> Option<Order> {
        let books = self.books.read();
        let pair = books.index.get(id)?;
        books.pairs.get(pair)?.get(id).cloned()
    }

    /// Up to `limit` orders on `pair`, cheapest first.
    pub fn orders(&self, pair: &PairId, limit: usize) -> Vec<Order> {
        let books = self.books.read();
        let Some(orders) = books.pairs.get(pair) else {
            return Vec::new();
        };
        let mut out: Vec<Order> = orders.values().cloned().collect();
        out.sort_by(Order::cmp_price);
        out.truncate(limit);
        out
    }

    pub fn len(&self) -> usize {
        self.books.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

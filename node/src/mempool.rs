//! Pending transaction pool.
//!
//! Entries are ordered by fee density (fee per encoded byte, highest
//! first) and then by insertion sequence. Densities are compared by
//! cross-multiplying in u128, so no precision is lost. Everything sits
//! behind one mutex; `snapshot` copies out so gossip never holds the lock
//! while sending.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use parking_lot::Mutex;
use tokenvm_engine::{Rules, Transaction};
use tokenvm_primitives::types::short_id;
use tokenvm_primitives::{Address, TxId};
use tracing::trace;

use crate::error::MempoolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Priority {
    fee: u64,
    size: u64,
    seq: u64,
}

impl Priority {
    fn cmp_density(&self, other: &Self) -> Ordering {
        let lhs = u128::from(self.fee) * u128::from(other.size);
        let rhs = u128::from(other.fee) * u128::from(self.size);
        lhs.cmp(&rhs)
    }
}

impl Ord for Priority {
    /// Densest first, then oldest first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.cmp_density(self).then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Entry {
    tx: Transaction,
    payer: Address,
    units: u64,
    priority: Priority,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<TxId, Entry>,
    queue: BTreeSet<(Priority, TxId)>,
    per_payer: HashMap<Address, usize>,
    next_seq: u64,
    min_timestamp: i64,
}

impl Inner {
    fn remove(&mut self, id: &TxId) -> Option<Entry> {
        let entry = self.entries.remove(id)?;
        self.queue.remove(&(entry.priority, *id));
        if let Some(count) = self.per_payer.get_mut(&entry.payer) {
            *count -= 1;
            if *count == 0 {
                self.per_payer.remove(&entry.payer);
            }
        }
        Some(entry)
    }
}

pub struct Mempool {
    rules: Rules,
    capacity: usize,
    payer_capacity: usize,
    exempt: BTreeSet<Address>,
    inner: Mutex<Inner>,
}

impl Mempool {
    pub fn new(rules: Rules, capacity: usize, payer_capacity: usize, exempt: BTreeSet<Address>) -> Self {
        Self {
            rules,
            capacity,
            payer_capacity,
            exempt,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn add(&self, tx: Transaction) -> Result<(), MempoolError> {
        let id = tx.id();
        let payer = tx.payer();
        let mut inner = self.inner.lock();

        if inner.entries.contains_key(&id) {
            return Err(MempoolError::Duplicate);
        }
        if tx.timestamp() < inner.min_timestamp {
            return Err(MempoolError::Expired { timestamp: tx.timestamp(), min: inner.min_timestamp });
        }
        if !self.exempt.contains(&payer)
            && inner.per_payer.get(&payer).copied().unwrap_or(0) >= self.payer_capacity
        {
            return Err(MempoolError::PayerLimit { payer, limit: self.payer_capacity });
        }

        let priority = Priority {
            fee: tx.fee(&self.rules).unwrap_or(u64::MAX),
            size: tx.size() as u64,
            seq: inner.next_seq,
        };
        if inner.entries.len() >= self.capacity {
            let Some(&(lowest, lowest_id)) = inner.queue.last() else {
                return Err(MempoolError::Full { capacity: self.capacity });
            };
            if priority.cmp_density(&lowest) != Ordering::Greater {
                return Err(MempoolError::Full { capacity: self.capacity });
            }
            trace!(evicted = %short_id(&lowest_id), "mempool full, evicting cheapest");
            inner.remove(&lowest_id);
        }

        inner.next_seq += 1;
        *inner.per_payer.entry(payer).or_insert(0) += 1;
        inner.queue.insert((priority, id));
        let units = tx.max_units(&self.rules);
        inner.entries.insert(id, Entry { tx, payer, units, priority });
        Ok(())
    }

    /// Highest-priority transactions whose summed units fit `max_units`.
    /// Entries stay in the pool.
    pub fn peek(&self, max_units: u64) -> Vec<Transaction> {
        let inner = self.inner.lock();
        let mut used = 0u64;
        let mut out = Vec::new();
        for (_, id) in &inner.queue {
            let Some(entry) = inner.entries.get(id) else { continue };
            match used.checked_add(entry.units) {
                Some(next) if next <= max_units => {
                    used = next;
                    out.push(entry.tx.clone());
                }
                _ => break,
            }
        }
        out
    }

    /// Copy of up to `max_bytes` of transactions in priority order.
    pub fn snapshot(&self, max_bytes: usize) -> Vec<Transaction> {
        let inner = self.inner.lock();
        let mut size = 0usize;
        let mut out = Vec::new();
        for (_, id) in &inner.queue {
            let Some(entry) = inner.entries.get(id) else { continue };
            if size.saturating_add(entry.tx.size()) > max_bytes {
                break;
            }
            size += entry.tx.size();
            out.push(entry.tx.clone());
        }
        out
    }

    /// Returns how many of `ids` were present.
    pub fn remove(&self, ids: &[TxId]) -> usize {
        let mut inner = self.inner.lock();
        ids.iter().filter(|id| inner.remove(id).is_some()).count()
    }

    /// Drop entries that expire before `timestamp` and refuse them from now
    /// on. Returns the dropped ids.
    pub fn set_min_timestamp(&self, timestamp: i64) -> Vec<TxId> {
        let mut inner = self.inner.lock();
        inner.min_timestamp = inner.min_timestamp.max(timestamp);
        let min = inner.min_timestamp;
        let expired: Vec<TxId> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.tx.timestamp() < min)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            inner.remove(id);
        }
        if !expired.is_empty() {
            trace!(count = expired.len(), min, "expired mempool entries");
        }
        expired
    }

    pub fn contains(&self, id: &TxId) -> bool {
        self.inner.lock().entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn payer_count(&self, payer: &Address) -> usize {
        self.inner.lock().per_payer.get(payer).copied().unwrap_or(0)
    }
}

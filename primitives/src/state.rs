//! Journaled write overlay.
//!
//! Writes made while executing a block sit here, over a read-only
//! snapshot, until the block is committed. Each mutation also pushes the
//! entry it displaced onto an undo journal; rolling back to a
//! [`Checkpoint`] replays that journal backwards. The executor takes a
//! checkpoint after charging the fee, so a failed action loses its own
//! writes and nothing else.

use std::collections::BTreeMap;

/// Journal length at the time it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Value(Vec<u8>),
    /// Deleted in this overlay; the snapshot value is hidden.
    Tombstone,
    /// Untouched; read through to the snapshot.
    Absent,
}

type Entry = Option<Vec<u8>>;

#[derive(Debug, Clone, Default)]
pub struct StateOverlay {
    /// `None` marks a delete. Sorted so every node drains the same batch.
    entries: BTreeMap<Vec<u8>, Entry>,
    /// `(key, displaced)`; `displaced == None` means the key was new.
    undo: Vec<(Vec<u8>, Option<Entry>)>,
}

impl StateOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, key: Vec<u8>, entry: Entry) {
        let displaced = self.entries.insert(key.clone(), entry);
        self.undo.push((key, displaced));
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.record(key, Some(value));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.record(key, None);
    }

    pub fn lookup(&self, key: &[u8]) -> Lookup {
        match self.entries.get(key) {
            Some(Some(v)) => Lookup::Value(v.clone()),
            Some(None) => Lookup::Tombstone,
            None => Lookup::Absent,
        }
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.undo.len())
    }

    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        let keep = checkpoint.0.min(self.undo.len());
        for (key, displaced) in self.undo.drain(keep..).rev() {
            match displaced {
                Some(entry) => self.entries.insert(key, entry),
                None => self.entries.remove(&key),
            };
        }
    }

    /// Distinct keys written or deleted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_writes(self) -> BTreeMap<Vec<u8>, Entry> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlay(pairs: &[(&[u8], Option<&[u8]>)]) -> StateOverlay {
        let mut o = StateOverlay::new();
        for (k, v) in pairs {
            match v {
                Some(v) => o.put(k.to_vec(), v.to_vec()),
                None => o.delete(k.to_vec()),
            }
        }
        o
    }

    #[test]
    fn test_lookup_states() {
        let o = overlay(&[(b"bal", Some(b"5")), (b"order", None)]);
        assert_eq!(o.lookup(b"bal"), Lookup::Value(b"5".to_vec()));
        assert_eq!(o.lookup(b"order"), Lookup::Tombstone);
        assert_eq!(o.lookup(b"asset"), Lookup::Absent);
    }

    #[test]
    fn test_failed_action_keeps_fee_write() {
        let mut o = overlay(&[(b"payer", Some(b"90"))]);
        let cp = o.checkpoint();
        o.put(b"payer".to_vec(), b"40".to_vec());
        o.put(b"to".to_vec(), b"50".to_vec());
        o.delete(b"order".to_vec());
        o.rollback(cp);

        assert_eq!(o.lookup(b"payer"), Lookup::Value(b"90".to_vec()));
        assert_eq!(o.lookup(b"to"), Lookup::Absent);
        assert_eq!(o.lookup(b"order"), Lookup::Absent);
        assert_eq!(o.len(), 1);
    }

    #[test]
    fn test_rollback_is_stack_ordered() {
        let mut o = StateOverlay::new();
        let first = o.checkpoint();
        o.put(b"k".to_vec(), b"1".to_vec());
        let second = o.checkpoint();
        o.put(b"k".to_vec(), b"2".to_vec());
        o.put(b"k".to_vec(), b"3".to_vec());

        o.rollback(second);
        assert_eq!(o.lookup(b"k"), Lookup::Value(b"1".to_vec()));
        o.rollback(first);
        assert!(o.is_empty());
        // Stale checkpoints past the journal end are harmless.
        o.rollback(second);
        assert!(o.is_empty());
    }

    #[test]
    fn test_writes_drain_sorted() {
        let o = overlay(&[(b"z", Some(b"1")), (b"a", None), (b"m", Some(b"2"))]);
        let writes = o.into_writes();
        let keys: Vec<_> = writes.keys().cloned().collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"m".to_vec(), b"z".to_vec()]);
        assert_eq!(writes[b"a".as_slice()], None);
    }
}

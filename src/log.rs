//! Log entries, the `LogStore` collaborator, and the view used by roles

use serde::{Deserialize, Serialize};

use crate::error::{ReplicaError, Result};
use crate::{LogIndex, Term};

/// Type of log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Client command (write or delete).
    Command,
    /// Empty entry appended by a new leader to commit its term.
    NoOp,
    /// Cluster configuration entry.
    Config,
}

/// A single entry in the replicated log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Log index (1-based, strictly increasing, no gaps).
    pub index: LogIndex,
    /// Term in which the entry was created.
    pub term: Term,
    /// Entry key.
    pub key: Vec<u8>,
    /// Entry payload.
    pub entry: Vec<u8>,
    /// Entry type.
    pub kind: EntryKind,
}

impl LogEntry {
    /// Creates a command entry.
    pub fn command(index: LogIndex, term: Term, key: Vec<u8>, entry: Vec<u8>) -> Self {
        Self {
            index,
            term,
            key,
            entry,
            kind: EntryKind::Command,
        }
    }

    /// Creates a no-op entry.
    pub fn noop(index: LogIndex, term: Term) -> Self {
        Self {
            index,
            term,
            key: Vec::new(),
            entry: Vec::new(),
            kind: EntryKind::NoOp,
        }
    }
}

/// Persistent log storage collaborator.
///
/// Implementations own durability: any index returned from [`append`]
/// must be recoverable after a crash before the call returns. All calls
/// are made from the replica's context thread.
///
/// [`append`]: LogStore::append
pub trait LogStore: Send {
    /// Opens the store. Idempotent.
    fn open(&mut self) -> Result<()>;

    /// Closes the store. Idempotent.
    fn close(&mut self) -> Result<()>;

    /// Appends an entry, assigning it the next index.
    fn append(&mut self, term: Term, key: &[u8], entry: &[u8], kind: EntryKind)
        -> Result<LogIndex>;

    /// Removes all entries with `index >= from`.
    fn truncate_suffix(&mut self, from: LogIndex) -> Result<()>;

    /// Returns entries in the inclusive range `[from, to]`.
    fn entries(&self, from: LogIndex, to: LogIndex) -> Result<Vec<LogEntry>>;

    /// Returns the term of the entry at `index`, or 0 if absent.
    fn term_at(&self, index: LogIndex) -> Term;

    /// Index of the first retained entry, or 0 if the log is empty.
    fn first_index(&self) -> LogIndex;

    /// Index of the last entry, or 0 if the log is empty.
    fn last_index(&self) -> LogIndex;
}

/// In-memory log store for tests and embedders that manage durability
/// elsewhere.
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    entries: Vec<LogEntry>,
    open: bool,
}

impl MemoryLogStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogStore for MemoryLogStore {
    fn open(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn append(
        &mut self,
        term: Term,
        key: &[u8],
        entry: &[u8],
        kind: EntryKind,
    ) -> Result<LogIndex> {
        let index = self.last_index() + 1;
        self.entries.push(LogEntry {
            index,
            term,
            key: key.to_vec(),
            entry: entry.to_vec(),
            kind,
        });
        Ok(index)
    }

    fn truncate_suffix(&mut self, from: LogIndex) -> Result<()> {
        self.entries.retain(|e| e.index < from);
        Ok(())
    }

    fn entries(&self, from: LogIndex, to: LogIndex) -> Result<Vec<LogEntry>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.index >= from && e.index <= to)
            .cloned()
            .collect())
    }

    fn term_at(&self, index: LogIndex) -> Term {
        self.entries
            .iter()
            .find(|e| e.index == index)
            .map(|e| e.term)
            .unwrap_or(0)
    }

    fn first_index(&self) -> LogIndex {
        self.entries.first().map(|e| e.index).unwrap_or(0)
    }

    fn last_index(&self) -> LogIndex {
        self.entries.last().map(|e| e.index).unwrap_or(0)
    }
}

/// Thin adapter over the external [`LogStore`] giving roles exactly the
/// operations they need, all synchronous on the context thread.
pub struct LogView {
    store: Box<dyn LogStore>,
}

impl LogView {
    pub(crate) fn new(store: Box<dyn LogStore>) -> Self {
        Self { store }
    }

    pub(crate) fn open(&mut self) -> Result<()> {
        self.store.open()
    }

    pub(crate) fn close(&mut self) -> Result<()> {
        self.store.close()
    }

    pub(crate) fn append(
        &mut self,
        term: Term,
        key: &[u8],
        entry: &[u8],
        kind: EntryKind,
    ) -> Result<LogIndex> {
        self.store.append(term, key, entry, kind)
    }

    pub(crate) fn truncate_suffix(&mut self, from: LogIndex) -> Result<()> {
        self.store.truncate_suffix(from)
    }

    pub(crate) fn entries(&self, from: LogIndex, to: LogIndex) -> Result<Vec<LogEntry>> {
        self.store.entries(from, to)
    }

    pub(crate) fn entry(&self, index: LogIndex) -> Result<LogEntry> {
        self.store
            .entries(index, index)?
            .into_iter()
            .next()
            .ok_or_else(|| ReplicaError::storage(format!("missing log entry at index {}", index)))
    }

    pub(crate) fn term_at(&self, index: LogIndex) -> Term {
        if index == 0 {
            return 0;
        }
        self.store.term_at(index)
    }

    pub(crate) fn first_index(&self) -> LogIndex {
        self.store.first_index()
    }

    pub(crate) fn last_index(&self) -> LogIndex {
        self.store.last_index()
    }

    pub(crate) fn last_term(&self) -> Term {
        self.term_at(self.last_index())
    }
}

impl std::fmt::Debug for LogView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogView")
            .field("first_index", &self.first_index())
            .field("last_index", &self.last_index())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(n: u64, term: Term) -> MemoryLogStore {
        let mut store = MemoryLogStore::new();
        for i in 0..n {
            store
                .append(term, format!("k{}", i).as_bytes(), b"v", EntryKind::Command)
                .unwrap();
        }
        store
    }

    #[test]
    fn test_empty_log() {
        let store = MemoryLogStore::new();
        assert_eq!(store.first_index(), 0);
        assert_eq!(store.last_index(), 0);
        assert_eq!(store.term_at(1), 0);
    }

    #[test]
    fn test_append_then_read_back() {
        let mut store = MemoryLogStore::new();
        let index = store.append(3, b"key", b"value", EntryKind::Command).unwrap();
        assert_eq!(index, 1);

        let read = store.entries(index, index).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].index, 1);
        assert_eq!(read[0].term, 3);
        assert_eq!(read[0].key, b"key");
        assert_eq!(read[0].entry, b"value");
    }

    #[test]
    fn test_truncate_suffix_then_last_index() {
        let mut store = store_with(5, 1);
        store.truncate_suffix(3).unwrap();
        assert_eq!(store.last_index(), 2);
        assert_eq!(store.term_at(3), 0);
    }

    #[test]
    fn test_entries_range_is_inclusive() {
        let store = store_with(5, 2);
        let entries = store.entries(2, 4).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].index, 2);
        assert_eq!(entries[2].index, 4);
    }

    #[test]
    fn test_view_entry_lookup() {
        let view = LogView::new(Box::new(store_with(3, 1)));
        let entry = view.entry(2).unwrap();
        assert_eq!(entry.index, 2);
        assert!(view.entry(9).is_err());
    }

    #[test]
    fn test_view_last_term() {
        let mut store = MemoryLogStore::new();
        store.append(1, b"a", b"1", EntryKind::Command).unwrap();
        store.append(4, b"b", b"2", EntryKind::Command).unwrap();
        let view = LogView::new(Box::new(store));
        assert_eq!(view.last_term(), 4);
        assert_eq!(view.term_at(0), 0);
    }
}

//! Process-wide string interning.

use dashmap::{mapref::entry::Entry, DashMap};

/// An append-only, content-keyed string table shared by concurrently compiled methods.
///
/// Interning the same content twice returns the same id, no matter which thread got there
/// first: the id is assigned while holding the shard lock of the key, and the backing
/// storage only ever grows, so ids stay valid for the lifetime of the table.
///
/// ```rust
/// use cilaot::emit::StringTable;
///
/// let table = StringTable::new();
/// let a = table.intern("_ZN4Math3MaxEii_i");
/// assert_eq!(table.intern("_ZN4Math3MaxEii_i"), a);
/// assert_eq!(table.get(a), Some("_ZN4Math3MaxEii_i"));
/// ```
#[derive(Debug)]
pub struct StringTable {
    index: DashMap<String, usize>,
    strings: boxcar::Vec<String>,
}

impl Default for StringTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StringTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            index: DashMap::new(),
            strings: boxcar::Vec::new(),
        }
    }

    /// Returns the id of `value`, appending it if it is new.
    ///
    /// Ids are the storage slots, dense from 0 in interning order.
    pub fn intern(&self, value: &str) -> usize {
        if let Some(id) = self.index.get(value) {
            return *id;
        }
        match self.index.entry(value.to_string()) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let id = self.strings.push(value.to_string());
                entry.insert(id);
                id
            }
        }
    }

    /// The id of `value`, if interned.
    #[must_use]
    pub fn lookup(&self, value: &str) -> Option<usize> {
        self.index.get(value).map(|id| *id)
    }

    /// The string behind `id`.
    #[must_use]
    pub fn get(&self, id: usize) -> Option<&str> {
        self.strings.get(id).map(String::as_str)
    }

    /// Number of interned strings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strings.count()
    }

    /// Returns `true` if nothing was interned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strings.count() == 0
    }

    /// Interned strings in id order.
    #[must_use]
    pub fn strings(&self) -> Vec<String> {
        self.strings.iter().map(|(_, s)| s.clone()).collect()
    }
}

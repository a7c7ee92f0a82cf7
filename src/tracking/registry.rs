use crate::types::TrackedSymbol;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Symbols currently under observation, keyed by pair identifier.
///
/// The lock is only held inside these methods; nothing here awaits.
#[derive(Debug, Default)]
pub struct Registry {
    symbols: RwLock<HashMap<String, TrackedSymbol>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, TrackedSymbol>> {
        self.symbols.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, TrackedSymbol>> {
        self.symbols.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_tracked(&self, symbol: &str) -> bool {
        self.read().contains_key(symbol)
    }

    pub fn get(&self, symbol: &str) -> Option<TrackedSymbol> {
        self.read().get(symbol).cloned()
    }

    /// Stores the record as given. Merging with an existing entry is the caller's job.
    pub fn upsert(&self, symbol: TrackedSymbol) {
        debug!("Updated {}", symbol.symbol);
        self.write().insert(symbol.symbol.clone(), symbol);
    }

    /// Inserts only when the key is free; an existing record is left as is.
    /// Returns true if the record was inserted.
    pub fn insert_if_absent(&self, symbol: TrackedSymbol) -> bool {
        let mut symbols = self.write();
        if symbols.contains_key(&symbol.symbol) {
            return false;
        }
        debug!("Tracking {}", symbol.symbol);
        symbols.insert(symbol.symbol.clone(), symbol);
        true
    }

    pub fn remove(&self, symbol: &str) {
        if self.write().remove(symbol).is_some() {
            debug!("Stopped tracking {}", symbol);
        }
    }

    /// Full copy of the current contents.
    pub fn snapshot(&self) -> HashMap<String, TrackedSymbol> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

//! Record store: create/read/update by primary key.
//!
//! The ledger, the signing coordinator, and the lifecycle each persist their
//! records through a [`RecordStore`]. The trait is object-safe so a database
//! backend can be swapped in behind `Arc<dyn RecordStore<K, V>>`.
//!
//! ## Atomicity
//!
//! [`RecordStore::update_all`] is the conditional batch update the
//! reservation manager relies on: the closure sees every named record, and
//! either all modified records are written back or none are. The in-memory
//! implementation runs the whole read-check-write under one write lock, so
//! concurrent `update_all` calls over overlapping keys serialize.
//! [`RecordStore::upsert_with`] gives the same guarantee to insert-or-merge.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{PoisonError, RwLock},
};

use dlcplaza_types::{
    ContractId, DlcContract, DlcError, DraftId, OutPoint, Result, Transaction, Utxo,
};

/// Keyed persistence for one record type.
pub trait RecordStore<K, V>: Send + Sync {
    /// # Errors
    /// The store's not-found error if `key` is absent.
    fn get(&self, key: &K) -> Result<V>;

    fn try_get(&self, key: &K) -> Result<Option<V>>;

    /// Insert a record that must not exist yet.
    fn create(&self, key: K, value: V) -> Result<()>;

    /// Insert or overwrite.
    fn upsert(&self, key: K, value: V) -> Result<()>;

    /// Insert `value` if `key` is absent, otherwise apply `merge` to the
    /// stored record. Both paths run in one critical section. Returns the
    /// stored record and whether it was inserted.
    fn upsert_with(
        &self,
        key: K,
        value: V,
        merge: &mut dyn FnMut(&mut V) -> Result<()>,
    ) -> Result<(V, bool)>;

    /// Delete a record, returning it if it existed.
    fn remove(&self, key: &K) -> Result<Option<V>>;

    /// Apply `f` to one record and write it back if `f` succeeds.
    fn update(&self, key: &K, f: &mut dyn FnMut(&mut V) -> Result<()>) -> Result<V>;

    /// Apply `f` to all named records at once; write back all or nothing.
    fn update_all(&self, keys: &[K], f: &mut dyn FnMut(&mut [V]) -> Result<()>)
    -> Result<Vec<V>>;

    /// Apply `f` to every record matching `pred`. Returns how many matched.
    fn update_matching(
        &self,
        pred: &dyn Fn(&V) -> bool,
        f: &mut dyn FnMut(&mut V),
    ) -> Result<usize>;

    /// Every record matching `pred`, in key order.
    fn scan(&self, pred: &dyn Fn(&V) -> bool) -> Result<Vec<V>>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn poisoned<T>(_: PoisonError<T>) -> DlcError {
    DlcError::Internal("record store lock poisoned".into())
}

/// In-memory [`RecordStore`] over a `BTreeMap` behind a `RwLock`.
pub struct MemoryStore<K, V> {
    records: RwLock<BTreeMap<K, V>>,
    not_found: fn(&K) -> DlcError,
    duplicate: fn(&K) -> DlcError,
}

impl<K, V> MemoryStore<K, V> {
    #[must_use]
    pub fn new(not_found: fn(&K) -> DlcError, duplicate: fn(&K) -> DlcError) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            not_found,
            duplicate,
        }
    }
}

impl<K, V> fmt::Debug for MemoryStore<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.records.read().map_or(0, |r| r.len());
        f.debug_struct("MemoryStore").field("len", &len).finish()
    }
}

impl MemoryStore<OutPoint, Utxo> {
    #[must_use]
    pub fn for_utxos() -> Self {
        Self::new(
            |op| DlcError::UtxoNotFound(*op),
            |op| DlcError::InvalidUtxo {
                reason: format!("{op} already recorded"),
            },
        )
    }
}

impl MemoryStore<DraftId, Transaction> {
    #[must_use]
    pub fn for_transactions() -> Self {
        Self::new(
            |draft| DlcError::TransactionNotFound(*draft),
            |draft| DlcError::InvalidTransaction {
                reason: format!("{draft} already registered"),
            },
        )
    }
}

impl MemoryStore<ContractId, DlcContract> {
    #[must_use]
    pub fn for_contracts() -> Self {
        Self::new(
            |id| DlcError::ContractNotFound(*id),
            |id| DlcError::DuplicateContract(*id),
        )
    }
}

impl<K, V> RecordStore<K, V> for MemoryStore<K, V>
where
    K: Ord + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Result<V> {
        self.try_get(key)?.ok_or_else(|| (self.not_found)(key))
    }

    fn try_get(&self, key: &K) -> Result<Option<V>> {
        Ok(self.records.read().map_err(poisoned)?.get(key).cloned())
    }

    fn create(&self, key: K, value: V) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        if records.contains_key(&key) {
            return Err((self.duplicate)(&key));
        }
        records.insert(key, value);
        Ok(())
    }

    fn upsert(&self, key: K, value: V) -> Result<()> {
        self.records.write().map_err(poisoned)?.insert(key, value);
        Ok(())
    }

    fn upsert_with(
        &self,
        key: K,
        value: V,
        merge: &mut dyn FnMut(&mut V) -> Result<()>,
    ) -> Result<(V, bool)> {
        let mut records = self.records.write().map_err(poisoned)?;
        let Some(slot) = records.get_mut(&key) else {
            records.insert(key, value.clone());
            return Ok((value, true));
        };
        let mut draft = slot.clone();
        merge(&mut draft)?;
        *slot = draft.clone();
        Ok((draft, false))
    }

    fn remove(&self, key: &K) -> Result<Option<V>> {
        Ok(self.records.write().map_err(poisoned)?.remove(key))
    }

    fn update(&self, key: &K, f: &mut dyn FnMut(&mut V) -> Result<()>) -> Result<V> {
        let mut records = self.records.write().map_err(poisoned)?;
        let slot = records.get_mut(key).ok_or_else(|| (self.not_found)(key))?;
        let mut draft = slot.clone();
        f(&mut draft)?;
        *slot = draft.clone();
        Ok(draft)
    }

    fn update_all(
        &self,
        keys: &[K],
        f: &mut dyn FnMut(&mut [V]) -> Result<()>,
    ) -> Result<Vec<V>> {
        let mut records = self.records.write().map_err(poisoned)?;
        let mut drafts = keys
            .iter()
            .map(|k| records.get(k).cloned().ok_or_else(|| (self.not_found)(k)))
            .collect::<Result<Vec<V>>>()?;

        f(&mut drafts)?;

        for (key, value) in keys.iter().zip(&drafts) {
            records.insert(key.clone(), value.clone());
        }
        Ok(drafts)
    }

    fn update_matching(
        &self,
        pred: &dyn Fn(&V) -> bool,
        f: &mut dyn FnMut(&mut V),
    ) -> Result<usize> {
        let mut records = self.records.write().map_err(poisoned)?;
        let mut touched = 0;
        for value in records.values_mut().filter(|v| pred(v)) {
            f(value);
            touched += 1;
        }
        Ok(touched)
    }

    fn scan(&self, pred: &dyn Fn(&V) -> bool) -> Result<Vec<V>> {
        Ok(self
            .records
            .read()
            .map_err(poisoned)?
            .values()
            .filter(|v| pred(v))
            .cloned()
            .collect())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.records.read().map_err(poisoned)?.len())
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! In-process transactional ledger store.
//!
//! Each account row carries two locks:
//! - `lock`, held exclusively by an atomic unit for its whole lifetime, which
//!   serializes read-modify-write on the row
//! - `state`, a reader/writer lock taken only briefly, so readers see the last
//!   committed state without waiting for in-flight units
//!
//! Units stage their writes privately. On commit the store reserves external
//! references in a [`DashMap`] index (the unique constraint), then appends the
//! records and publishes row state while holding the log write lock, so a
//! reader never sees a balance without the records explaining it.

use crate::account::{Account, AccountData};
use crate::base::{AccountId, Coins, ExternalRef, TransactionId};
use crate::config::EngineConfig;
use crate::error::{LedgerError, StoreError};
use crate::store::{AtomicUnit, LedgerStore};
use crate::transaction::{NewTransaction, Transaction};
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Constraint tying each row's balance change to the records staged with it.
const LEDGER_CONSTRAINT: &str = "transactions_sum_matches_balance_delta";

#[derive(Debug)]
struct AccountRow {
    lock: Mutex<()>,
    state: RwLock<AccountData>,
}

impl AccountRow {
    fn new(id: AccountId) -> Self {
        Self {
            lock: Mutex::new(()),
            state: RwLock::new(AccountData::new(id)),
        }
    }
}

/// Append-only transaction log with its secondary indexes.
#[derive(Debug, Default)]
struct Log {
    entries: Vec<Transaction>,
    by_account: HashMap<AccountId, Vec<usize>>,
    by_id: HashMap<TransactionId, usize>,
    by_reference: HashMap<TransactionId, usize>,
}

impl Log {
    fn push(&mut self, transaction: Transaction) {
        let index = self.entries.len();
        self.by_account
            .entry(transaction.account_id)
            .or_default()
            .push(index);
        self.by_id.insert(transaction.id, index);
        if let Some(reference) = transaction.reference {
            self.by_reference.entry(reference).or_insert(index);
        }
        self.entries.push(transaction);
    }

    fn get(&self, id: TransactionId) -> Option<&Transaction> {
        self.by_id.get(&id).map(|&index| &self.entries[index])
    }

    fn referencing(&self, id: TransactionId) -> Option<&Transaction> {
        self.by_reference.get(&id).map(|&index| &self.entries[index])
    }
}

/// A thread-safe, in-memory [`LedgerStore`].
///
/// Accounts live in a [`DashMap`] so units touching disjoint accounts never
/// contend beyond a shard lookup.
#[derive(Debug)]
pub struct MemoryStore {
    accounts: DashMap<AccountId, Arc<AccountRow>>,
    /// Unique index over external references.
    external_refs: DashMap<ExternalRef, TransactionId>,
    log: RwLock<Log>,
    next_id: AtomicU64,
    lock_timeout: Duration,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            accounts: DashMap::new(),
            external_refs: DashMap::new(),
            log: RwLock::new(Log::default()),
            next_id: AtomicU64::new(1),
            lock_timeout: config.lock_timeout,
            offline: AtomicBool::new(false),
        }
    }

    /// Simulates an outage: every call fails with
    /// [`StoreError::Unavailable`] until [`MemoryStore::bring_online`].
    pub fn take_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn bring_online(&self) {
        self.offline.store(false, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), LedgerError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".into()).into());
        }
        Ok(())
    }

    fn row(&self, id: AccountId) -> Option<Arc<AccountRow>> {
        self.accounts.get(&id).map(|row| Arc::clone(row.value()))
    }

    /// Reserves every staged external reference, or none of them.
    fn reserve_external_refs(
        &self,
        pending: &[(TransactionId, NewTransaction)],
    ) -> Result<(), LedgerError> {
        let mut reserved: Vec<&ExternalRef> = Vec::new();
        for (id, entry) in pending {
            let Some(external_ref) = &entry.external_ref else {
                continue;
            };
            // The entry guard must be gone before rolling back below.
            let inserted = match self.external_refs.entry(external_ref.clone()) {
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    slot.insert(*id);
                    true
                }
            };
            if !inserted {
                for taken in reserved {
                    self.external_refs.remove(taken);
                }
                warn!(external_ref = %external_ref, "external reference already recorded");
                return Err(StoreError::UniqueViolation {
                    constraint: StoreError::EXTERNAL_REF_CONSTRAINT,
                }
                .into());
            }
            reserved.push(external_ref);
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

struct LockedRow<'a> {
    row: &'a AccountRow,
    _guard: MutexGuard<'a, ()>,
    committed_balance: Coins,
    staged: AccountData,
    dirty: bool,
}

struct MemoryUnit<'a> {
    store: &'a MemoryStore,
    /// Every id the unit asked to lock, including ones with no row yet.
    requested: Vec<AccountId>,
    rows: Vec<LockedRow<'a>>,
    pending: Vec<(TransactionId, NewTransaction)>,
}

impl MemoryUnit<'_> {
    fn locked(&self, id: AccountId) -> Result<usize, LedgerError> {
        match self.rows.iter().position(|row| row.staged.id() == id) {
            Some(index) => Ok(index),
            // Missing when the unit started, even if opened since.
            None if self.requested.contains(&id) => Err(LedgerError::AccountNotFound),
            None if self.store.accounts.contains_key(&id) => Err(StoreError::NotLocked(id).into()),
            None => Err(LedgerError::AccountNotFound),
        }
    }

    fn commit(self) -> Result<(), LedgerError> {
        for row in &self.rows {
            let id = row.staged.id();
            let logged: Coins = self
                .pending
                .iter()
                .filter(|(_, entry)| entry.account_id == id)
                .map(|(_, entry)| entry.amount)
                .sum();
            if row.staged.balance() - row.committed_balance != logged {
                return Err(StoreError::CheckViolation {
                    constraint: LEDGER_CONSTRAINT,
                }
                .into());
            }
        }

        self.store.reserve_external_refs(&self.pending)?;

        let records = self.pending.len();
        let mut log = self.store.log.write();
        // Timestamps never go backwards in log order.
        let now = Utc::now();
        let created_at = log
            .entries
            .last()
            .map_or(now, |last| last.created_at.max(now));
        for (id, entry) in self.pending {
            log.push(entry.into_transaction(id, created_at));
        }
        for row in self.rows {
            if row.dirty {
                *row.row.state.write() = row.staged;
            }
        }
        drop(log);

        debug!(records, "atomic unit committed");
        Ok(())
    }
}

impl AtomicUnit for MemoryUnit<'_> {
    fn account(&self, id: AccountId) -> Result<AccountData, LedgerError> {
        let index = self.locked(id)?;
        Ok(self.rows[index].staged.clone())
    }

    fn set_balance(&mut self, id: AccountId, balance: Coins) -> Result<(), LedgerError> {
        if balance < 0 {
            return Err(StoreError::CheckViolation {
                constraint: StoreError::BALANCE_CONSTRAINT,
            }
            .into());
        }
        let index = self.locked(id)?;
        let row = &mut self.rows[index];
        row.staged.set_balance(balance);
        row.dirty = true;
        Ok(())
    }

    fn set_payout_account(
        &mut self,
        id: AccountId,
        payout_account: Option<String>,
    ) -> Result<(), LedgerError> {
        let index = self.locked(id)?;
        let row = &mut self.rows[index];
        row.staged.set_payout_account(payout_account);
        row.dirty = true;
        Ok(())
    }

    fn append(&mut self, entry: NewTransaction) -> Result<TransactionId, LedgerError> {
        self.locked(entry.account_id)?;
        let id = TransactionId(self.store.next_id.fetch_add(1, Ordering::Relaxed));
        self.pending.push((id, entry));
        Ok(id)
    }

    fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>, LedgerError> {
        if self.pending.iter().any(|(staged, _)| *staged == id) {
            // Staged records have no timestamp until commit; units only
            // look up committed history.
            return Ok(None);
        }
        Ok(self.store.log.read().get(id).cloned())
    }

    fn transaction_by_external_ref(
        &self,
        external_ref: &ExternalRef,
    ) -> Result<Option<Transaction>, LedgerError> {
        LedgerStore::transaction_by_external_ref(self.store, external_ref)
    }

    fn transaction_referencing(
        &self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, LedgerError> {
        Ok(self.store.log.read().referencing(id).cloned())
    }
}

impl LedgerStore for MemoryStore {
    fn atomic<T, F>(&self, lock: &[AccountId], work: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut dyn AtomicUnit) -> Result<T, LedgerError>,
    {
        self.ensure_online()?;

        let mut ids = lock.to_vec();
        ids.sort_unstable();
        ids.dedup();

        // Row handles are cloned out of the map so no shard lock is held
        // while waiting on a row.
        let rows: Vec<Arc<AccountRow>> = ids.iter().filter_map(|id| self.row(*id)).collect();

        let mut locked = Vec::with_capacity(rows.len());
        for row in &rows {
            let Some(guard) = row.lock.try_lock_for(self.lock_timeout) else {
                warn!(
                    account = %row.state.read().id(),
                    timeout_ms = self.lock_timeout.as_millis() as u64,
                    "timed out waiting for account lock"
                );
                return Err(LedgerError::Busy);
            };
            let staged = row.state.read().clone();
            locked.push(LockedRow {
                row: row.as_ref(),
                _guard: guard,
                committed_balance: staged.balance(),
                staged,
                dirty: false,
            });
        }

        let mut unit = MemoryUnit {
            store: self,
            requested: ids,
            rows: locked,
            pending: Vec::new(),
        };
        let value = work(&mut unit)?;
        unit.commit()?;
        Ok(value)
    }

    fn create_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.ensure_online()?;
        match self.accounts.entry(id) {
            Entry::Occupied(_) => Err(LedgerError::AccountExists),
            Entry::Vacant(slot) => {
                let row = Arc::new(AccountRow::new(id));
                let account = row.state.read().snapshot();
                slot.insert(row);
                Ok(account)
            }
        }
    }

    fn account(&self, id: AccountId) -> Result<Option<Account>, LedgerError> {
        self.ensure_online()?;
        Ok(self.row(id).map(|row| row.state.read().snapshot()))
    }

    fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>, LedgerError> {
        self.ensure_online()?;
        Ok(self.log.read().get(id).cloned())
    }

    fn transaction_by_external_ref(
        &self,
        external_ref: &ExternalRef,
    ) -> Result<Option<Transaction>, LedgerError> {
        self.ensure_online()?;
        let Some(id) = self.external_refs.get(external_ref).map(|id| *id.value()) else {
            return Ok(None);
        };
        // A reserved reference whose unit has not published yet reads as absent.
        Ok(self.log.read().get(id).cloned())
    }

    fn accounts(&self) -> Result<Vec<Account>, LedgerError> {
        self.ensure_online()?;
        let rows: Vec<Arc<AccountRow>> = self
            .accounts
            .iter()
            .map(|row| Arc::clone(row.value()))
            .collect();
        let mut accounts: Vec<Account> = rows.iter().map(|row| row.state.read().snapshot()).collect();
        accounts.sort_by_key(|account| account.id);
        Ok(accounts)
    }

    fn count_transactions(&self, account_id: AccountId) -> Result<u64, LedgerError> {
        self.ensure_online()?;
        let log = self.log.read();
        Ok(log
            .by_account
            .get(&account_id)
            .map_or(0, |indices| indices.len() as u64))
    }

    fn transactions_newest_first(
        &self,
        account_id: AccountId,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<Transaction>, u64), LedgerError> {
        self.ensure_online()?;
        let log = self.log.read();
        let Some(indices) = log.by_account.get(&account_id) else {
            return Ok((Vec::new(), 0));
        };
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let page = indices
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .map(|&index| log.entries[index].clone())
            .collect();
        Ok((page, indices.len() as u64))
    }
}

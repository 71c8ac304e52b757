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

//! Repository interface to the ledger store.
//!
//! The store holds account rows and the transaction log. Every balance
//! change runs inside [`LedgerStore::atomic`]: the store locks the named
//! account rows, hands the work an [`AtomicUnit`], and commits all of the
//! unit's writes together only if the work returns `Ok`. Any `Err` discards
//! them.
//!
//! A conforming store must:
//! - acquire row locks in ascending [`AccountId`] order, waiting no longer
//!   than its configured timeout (then [`LedgerError::Busy`])
//! - reject a commit whose records reuse an external reference
//!   ([`StoreError::UniqueViolation`] on [`StoreError::EXTERNAL_REF_CONSTRAINT`])
//! - reject a negative balance write ([`StoreError::CheckViolation`])
//! - release every lock on every exit path
//!
//! [`StoreError::UniqueViolation`]: crate::StoreError::UniqueViolation
//! [`StoreError::CheckViolation`]: crate::StoreError::CheckViolation
//! [`StoreError::EXTERNAL_REF_CONSTRAINT`]: crate::StoreError::EXTERNAL_REF_CONSTRAINT

use crate::account::{Account, AccountData};
use crate::base::{AccountId, Coins, ExternalRef, TransactionId};
use crate::error::LedgerError;
use crate::transaction::{NewTransaction, Transaction};

/// Reads and staged writes available to work running inside an atomic unit.
///
/// Reads observe the unit's own staged writes.
pub trait AtomicUnit {
    /// Returns the state of a locked account row. Rows that do not exist
    /// yield [`LedgerError::AccountNotFound`].
    fn account(&self, id: AccountId) -> Result<AccountData, LedgerError>;

    fn set_balance(&mut self, id: AccountId, balance: Coins) -> Result<(), LedgerError>;

    fn set_payout_account(
        &mut self,
        id: AccountId,
        payout_account: Option<String>,
    ) -> Result<(), LedgerError>;

    /// Stages a record and returns the identity it will commit under.
    fn append(&mut self, entry: NewTransaction) -> Result<TransactionId, LedgerError>;

    fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>, LedgerError>;

    fn transaction_by_external_ref(
        &self,
        external_ref: &ExternalRef,
    ) -> Result<Option<Transaction>, LedgerError>;

    /// Returns the first record whose `reference` names `id`.
    fn transaction_referencing(
        &self,
        id: TransactionId,
    ) -> Result<Option<Transaction>, LedgerError>;
}

/// A transactional store of accounts and their transaction logs.
pub trait LedgerStore: Send + Sync {
    /// Runs `work` as one atomic unit holding exclusive locks on `lock`.
    ///
    /// Identifiers in `lock` that name no account are skipped; the work sees
    /// them as [`LedgerError::AccountNotFound`].
    fn atomic<T, F>(&self, lock: &[AccountId], work: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut dyn AtomicUnit) -> Result<T, LedgerError>;

    /// Inserts a new account with a zero balance.
    fn create_account(&self, id: AccountId) -> Result<Account, LedgerError>;

    /// Committed account state.
    fn account(&self, id: AccountId) -> Result<Option<Account>, LedgerError>;

    fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>, LedgerError>;

    fn transaction_by_external_ref(
        &self,
        external_ref: &ExternalRef,
    ) -> Result<Option<Transaction>, LedgerError>;

    /// Committed accounts in ascending identifier order.
    fn accounts(&self) -> Result<Vec<Account>, LedgerError>;

    fn count_transactions(&self, account_id: AccountId) -> Result<u64, LedgerError>;

    /// Committed records of an account, newest first, skipping `offset`,
    /// together with the account's total record count read in the same
    /// snapshot.
    fn transactions_newest_first(
        &self,
        account_id: AccountId,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<Transaction>, u64), LedgerError>;
}

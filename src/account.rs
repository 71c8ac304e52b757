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

//! Wallet accounts.
//!
//! [`AccountData`] is the mutable row state the store keeps behind a lock.
//! [`Account`] is the committed snapshot handed to readers.
//!
//! # Example
//!
//! ```
//! use coin_ledger::{AccountData, AccountId};
//!
//! let mut data = AccountData::new(AccountId(1));
//! assert_eq!(data.credit(100).unwrap(), 100);
//! assert_eq!(data.debit(40).unwrap(), 60);
//! ```

use crate::base::{AccountId, Coins};
use crate::error::LedgerError;
use serde::{Deserialize, Serialize};

/// Committed view of an account row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub balance: Coins,
    /// Reference to an account at the payout provider, used by cashouts.
    pub payout_account: Option<String>,
}

/// Row state of an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountData {
    id: AccountId,
    balance: Coins,
    payout_account: Option<String>,
}

impl AccountData {
    pub fn new(id: AccountId) -> Self {
        Self {
            id,
            balance: 0,
            payout_account: None,
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.balance >= 0,
            "Invariant violated: balance of account {} went negative: {}",
            self.id,
            self.balance
        );
    }

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn balance(&self) -> Coins {
        self.balance
    }

    pub fn payout_account(&self) -> Option<&str> {
        self.payout_account.as_deref()
    }

    pub fn set_payout_account(&mut self, payout_account: Option<String>) {
        self.payout_account = payout_account;
    }

    /// Overwrites the balance. Stores call this when applying a staged write
    /// that has already passed their check constraint.
    pub(crate) fn set_balance(&mut self, balance: Coins) {
        self.balance = balance;
        self.assert_invariants();
    }

    /// Increases the balance, returning the new balance.
    pub fn credit(&mut self, amount: Coins) -> Result<Coins, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount);
        }
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow)?;
        self.assert_invariants();
        Ok(self.balance)
    }

    /// Decreases the balance, returning the new balance.
    pub fn debit(&mut self, amount: Coins) -> Result<Coins, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if self.balance < amount {
            return Err(LedgerError::InsufficientFunds);
        }
        self.balance -= amount;
        self.assert_invariants();
        Ok(self.balance)
    }

    pub fn snapshot(&self) -> Account {
        Account {
            id: self.id,
            balance: self.balance,
            payout_account: self.payout_account.clone(),
        }
    }
}

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

//! Caller-facing wallet operations.
//!
//! Every operation first resolves the caller through the [`IdentityGate`]
//! and then acts on the resolved account only. A front end (HTTP or
//! otherwise) maps these calls and their errors onto its own wire format.

use crate::account::Account;
use crate::base::{AccountId, Coins, TransactionId};
use crate::catalog::{CoinCatalog, CoinPackage};
use crate::engine::{Engine, Receipt, RefundReceipt, TransferReceipt};
use crate::error::LedgerError;
use crate::gate::IdentityGate;
use crate::history::{PageRequest, TransactionPage};
use crate::memory::MemoryStore;
use crate::store::LedgerStore;
use std::sync::Arc;
use tracing::warn;

pub struct Wallet<G, C, S = MemoryStore> {
    engine: Arc<Engine<S>>,
    gate: G,
    catalog: C,
}

impl<G, C, S> Wallet<G, C, S>
where
    G: IdentityGate,
    C: CoinCatalog,
    S: LedgerStore,
{
    pub fn new(engine: Arc<Engine<S>>, gate: G, catalog: C) -> Self {
        Self {
            engine,
            gate,
            catalog,
        }
    }

    pub fn engine(&self) -> &Arc<Engine<S>> {
        &self.engine
    }

    fn caller(&self, credential: Option<&str>) -> Result<AccountId, LedgerError> {
        self.gate.resolve(credential).map_err(|failure| {
            warn!(reason = %failure, "caller not authenticated");
            LedgerError::from(failure)
        })
    }

    pub fn balance(&self, credential: Option<&str>) -> Result<Coins, LedgerError> {
        let account_id = self.caller(credential)?;
        self.engine.balance(account_id)
    }

    pub fn account(&self, credential: Option<&str>) -> Result<Account, LedgerError> {
        let account_id = self.caller(credential)?;
        self.engine.account(account_id)
    }

    pub fn spend(&self, credential: Option<&str>, amount: Coins) -> Result<Receipt, LedgerError> {
        let account_id = self.caller(credential)?;
        self.engine.spend(account_id, amount)
    }

    pub fn transfer(
        &self,
        credential: Option<&str>,
        recipient: AccountId,
        amount: Coins,
    ) -> Result<TransferReceipt, LedgerError> {
        let sender = self.caller(credential)?;
        self.engine.transfer(sender, recipient, amount)
    }

    pub fn transactions(
        &self,
        credential: Option<&str>,
        request: PageRequest,
    ) -> Result<TransactionPage, LedgerError> {
        let account_id = self.caller(credential)?;
        self.engine.list_transactions(account_id, request)
    }

    pub fn refund(
        &self,
        credential: Option<&str>,
        transaction_id: TransactionId,
    ) -> Result<RefundReceipt, LedgerError> {
        let account_id = self.caller(credential)?;
        self.engine.refund(account_id, transaction_id)
    }

    pub fn cashout(&self, credential: Option<&str>, amount: Coins) -> Result<Receipt, LedgerError> {
        let account_id = self.caller(credential)?;
        self.engine.cashout(account_id, amount)
    }

    pub fn set_payout_account(
        &self,
        credential: Option<&str>,
        payout_account: Option<String>,
    ) -> Result<Account, LedgerError> {
        let account_id = self.caller(credential)?;
        self.engine.set_payout_account(account_id, payout_account)
    }

    /// Public catalog; no credential needed.
    pub fn coin_packages(&self) -> Result<Vec<CoinPackage>, LedgerError> {
        self.catalog.packages()
    }
}

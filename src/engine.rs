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

//! Balance engine.
//!
//! The [`Engine`] applies every balance-changing operation as one atomic unit
//! against a [`LedgerStore`]: the affected rows are locked, the precondition
//! is checked against the locked state, and the new balance is written
//! together with the records that explain it.
//!
//! # Operations
//!
//! - **Credit**: adds coins; idempotent when an external reference is given.
//! - **Debit**: removes coins; fails rather than going below zero.
//! - **Transfer**: debit and credit of two accounts in one unit.
//! - **Refund**: reverses a purchase, capped at the current balance.
//!
//! # Thread Safety
//!
//! Operations on the same account serialize on its row lock. Multi-account
//! operations lock rows in ascending [`AccountId`] order, so concurrent
//! transfers in opposite directions cannot deadlock.

use crate::account::Account;
use crate::base::{AccountId, Coins, ExternalRef, TransactionId};
use crate::config::EngineConfig;
use crate::error::LedgerError;
use crate::memory::MemoryStore;
use crate::store::LedgerStore;
use crate::transaction::{NewTransaction, TransactionKind};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Result of a credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CreditOutcome {
    Applied {
        balance: Coins,
        transaction_id: TransactionId,
    },
    /// The external reference was already recorded; nothing changed.
    Replayed {
        balance: Coins,
        transaction_id: Option<TransactionId>,
    },
}

impl CreditOutcome {
    pub fn balance(&self) -> Coins {
        match self {
            Self::Applied { balance, .. } | Self::Replayed { balance, .. } => *balance,
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, Self::Replayed { .. })
    }
}

/// Result of a debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub balance: Coins,
    pub transaction_id: TransactionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransferReceipt {
    pub sender_balance: Coins,
    pub recipient_balance: Coins,
    pub debit_id: TransactionId,
    pub credit_id: TransactionId,
}

/// Result of a refund. `refunded` may be less than the purchase amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefundReceipt {
    pub refunded: Coins,
    pub balance: Coins,
    pub transaction_id: TransactionId,
}

/// Balance engine over a ledger store.
///
/// # Invariants
///
/// - A balance is never negative.
/// - A balance always equals the sum of its account's record amounts.
/// - An external reference is carried by at most one record, ever.
pub struct Engine<S = MemoryStore> {
    store: S,
    pub(crate) config: EngineConfig,
}

impl Engine<MemoryStore> {
    /// Creates an engine over a fresh in-memory store.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            store: MemoryStore::new(&config),
            config,
        }
    }
}

impl Default for Engine<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: LedgerStore> Engine<S> {
    pub fn with_store(store: S, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Opens an account with a zero balance.
    pub fn open_account(&self, account_id: AccountId) -> Result<Account, LedgerError> {
        let account = self.store.create_account(account_id)?;
        info!(account = %account_id, "account opened");
        Ok(account)
    }

    pub fn account(&self, account_id: AccountId) -> Result<Account, LedgerError> {
        self.store
            .account(account_id)?
            .ok_or(LedgerError::AccountNotFound)
    }

    /// Last committed balance.
    pub fn balance(&self, account_id: AccountId) -> Result<Coins, LedgerError> {
        self.account(account_id).map(|account| account.balance)
    }

    /// Adds `amount` coins to an account.
    ///
    /// When `external_ref` is already recorded the call succeeds with
    /// [`CreditOutcome::Replayed`] and changes nothing, whether the earlier
    /// record was found up front or a concurrent unit claimed the reference
    /// first and the store's unique constraint rejected this one.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::WrongKind`] - `kind` is not a credit kind
    ///   ([`TransactionKind::is_credit`]).
    /// - [`LedgerError::InvalidAmount`] - `amount` is not positive.
    /// - [`LedgerError::AccountNotFound`] - no such account.
    /// - [`LedgerError::BalanceOverflow`] - the balance cannot hold the sum.
    pub fn credit(
        &self,
        account_id: AccountId,
        amount: Coins,
        kind: TransactionKind,
        description: impl Into<String>,
        external_ref: Option<ExternalRef>,
    ) -> Result<CreditOutcome, LedgerError> {
        if !kind.is_credit() {
            return Err(LedgerError::WrongKind(kind));
        }
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let description = description.into();

        let result = self.store.atomic(&[account_id], |unit| {
            if let Some(external_ref) = &external_ref {
                if let Some(existing) = unit.transaction_by_external_ref(external_ref)? {
                    let balance = unit.account(account_id)?.balance();
                    return Ok(CreditOutcome::Replayed {
                        balance,
                        transaction_id: Some(existing.id),
                    });
                }
            }

            let mut row = unit.account(account_id)?;
            let balance = row.credit(amount)?;
            unit.set_balance(account_id, balance)?;
            let transaction_id = unit.append(
                NewTransaction::new(account_id, kind, amount, description)
                    .with_external_ref(external_ref.clone()),
            )?;
            Ok(CreditOutcome::Applied {
                balance,
                transaction_id,
            })
        });

        let outcome = match result {
            Err(LedgerError::Storage(fault)) if fault.is_external_ref_violation() => {
                // A concurrent unit recorded the same reference first.
                let existing = match &external_ref {
                    Some(external_ref) => self.store.transaction_by_external_ref(external_ref)?,
                    None => None,
                };
                CreditOutcome::Replayed {
                    balance: self.balance(account_id)?,
                    transaction_id: existing.map(|tx| tx.id),
                }
            }
            other => other?,
        };

        match outcome {
            CreditOutcome::Applied { balance, .. } => {
                info!(account = %account_id, %kind, amount, balance, "credit applied");
            }
            CreditOutcome::Replayed { transaction_id, .. } => {
                debug!(
                    account = %account_id,
                    external_ref = ?external_ref,
                    existing = ?transaction_id,
                    "credit replay ignored"
                );
            }
        }
        Ok(outcome)
    }

    /// Removes `amount` coins from an account.
    ///
    /// The balance check and the write happen under the account's row lock,
    /// so of two concurrent debits that together exceed the balance exactly
    /// one fails.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::WrongKind`] - `kind` is a credit kind.
    /// - [`LedgerError::InvalidAmount`] - `amount` is not positive.
    /// - [`LedgerError::AccountNotFound`] - no such account.
    /// - [`LedgerError::InsufficientFunds`] - the balance is below `amount`.
    pub fn debit(
        &self,
        account_id: AccountId,
        amount: Coins,
        kind: TransactionKind,
        description: impl Into<String>,
    ) -> Result<Receipt, LedgerError> {
        if kind.is_credit() {
            return Err(LedgerError::WrongKind(kind));
        }
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let description = description.into();

        let result = self.store.atomic(&[account_id], |unit| {
            let mut row = unit.account(account_id)?;
            let balance = row.debit(amount)?;
            unit.set_balance(account_id, balance)?;
            let transaction_id =
                unit.append(NewTransaction::new(account_id, kind, -amount, description))?;
            Ok(Receipt {
                balance,
                transaction_id,
            })
        });

        match &result {
            Ok(receipt) => {
                info!(account = %account_id, %kind, amount, balance = receipt.balance, "debit applied");
            }
            Err(err) => {
                info!(account = %account_id, %kind, amount, error = %err, "debit rejected");
            }
        }
        result
    }

    /// Spends coins, recording a SPEND.
    pub fn spend(&self, account_id: AccountId, amount: Coins) -> Result<Receipt, LedgerError> {
        self.debit(
            account_id,
            amount,
            TransactionKind::Spend,
            format!("Spent {amount} coins"),
        )
    }

    /// Grants coins outside of a purchase, recording a REWARD.
    pub fn reward(
        &self,
        account_id: AccountId,
        amount: Coins,
        description: impl Into<String>,
    ) -> Result<CreditOutcome, LedgerError> {
        self.credit(account_id, amount, TransactionKind::Reward, description, None)
    }

    /// Credits a completed purchase exactly once per external reference.
    pub fn purchase(
        &self,
        account_id: AccountId,
        amount: Coins,
        external_ref: ExternalRef,
    ) -> Result<CreditOutcome, LedgerError> {
        self.credit(
            account_id,
            amount,
            TransactionKind::Purchase,
            format!("Purchased {amount} coins"),
            Some(external_ref),
        )
    }

    /// Moves coins between two accounts.
    ///
    /// Both rows are locked in ascending identifier order. Either both
    /// balances change and both records (TRANSFER_OUT on the sender,
    /// TRANSFER_IN on the recipient, linked to each other) are written, or
    /// nothing changes.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - `amount` is not positive.
    /// - [`LedgerError::SameAccount`] - sender and recipient are the same.
    /// - [`LedgerError::AccountNotFound`] - either account is missing.
    /// - [`LedgerError::InsufficientFunds`] - the sender cannot cover `amount`.
    pub fn transfer(
        &self,
        sender: AccountId,
        recipient: AccountId,
        amount: Coins,
    ) -> Result<TransferReceipt, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if sender == recipient {
            return Err(LedgerError::SameAccount);
        }

        let result = self.store.atomic(&[sender, recipient], |unit| {
            let mut from = unit.account(sender)?;
            let mut to = unit.account(recipient)?;

            let sender_balance = from.debit(amount)?;
            let recipient_balance = to.credit(amount)?;
            unit.set_balance(sender, sender_balance)?;
            unit.set_balance(recipient, recipient_balance)?;

            let debit_id = unit.append(
                NewTransaction::new(
                    sender,
                    TransactionKind::TransferOut,
                    -amount,
                    format!("Transfer to user {recipient}"),
                )
                .with_counterparty(recipient),
            )?;
            let credit_id = unit.append(
                NewTransaction::new(
                    recipient,
                    TransactionKind::TransferIn,
                    amount,
                    format!("Transfer from user {sender}"),
                )
                .with_counterparty(sender)
                .with_reference(debit_id),
            )?;

            Ok(TransferReceipt {
                sender_balance,
                recipient_balance,
                debit_id,
                credit_id,
            })
        });

        match &result {
            Ok(_) => info!(%sender, %recipient, amount, "transfer applied"),
            Err(err) => info!(%sender, %recipient, amount, error = %err, "transfer rejected"),
        }
        result
    }

    /// Refunds a purchase.
    ///
    /// The refunded amount is `min(purchase amount, current balance)`; a
    /// refund never takes the balance below zero and callers must not assume
    /// full restitution. The REFUND record references the purchase.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AccountNotFound`] - no such account.
    /// - [`LedgerError::TransactionNotFound`] - no such transaction on this account.
    /// - [`LedgerError::NotRefundable`] - the transaction is not a purchase.
    /// - [`LedgerError::AlreadyRefunded`] - the purchase was refunded before.
    /// - [`LedgerError::InsufficientFunds`] - the balance is zero.
    pub fn refund(
        &self,
        account_id: AccountId,
        transaction_id: TransactionId,
    ) -> Result<RefundReceipt, LedgerError> {
        let result = self.store.atomic(&[account_id], |unit| {
            let mut row = unit.account(account_id)?;
            let purchase = unit
                .transaction(transaction_id)?
                .filter(|tx| tx.account_id == account_id)
                .ok_or(LedgerError::TransactionNotFound)?;

            match purchase.kind {
                TransactionKind::Purchase => {}
                TransactionKind::Spend
                | TransactionKind::TransferOut
                | TransactionKind::TransferIn
                | TransactionKind::Refund
                | TransactionKind::Reward
                | TransactionKind::Cashout => return Err(LedgerError::NotRefundable),
            }

            if unit
                .transaction_referencing(purchase.id)?
                .is_some_and(|tx| tx.kind == TransactionKind::Refund)
            {
                return Err(LedgerError::AlreadyRefunded);
            }

            let refunded = purchase.amount.min(row.balance());
            if refunded <= 0 {
                return Err(LedgerError::InsufficientFunds);
            }
            let balance = row.debit(refunded)?;
            unit.set_balance(account_id, balance)?;
            let refund_id = unit.append(
                NewTransaction::new(
                    account_id,
                    TransactionKind::Refund,
                    -refunded,
                    format!("Refund for transaction {transaction_id}"),
                )
                .with_reference(purchase.id),
            )?;

            if refunded < purchase.amount {
                warn!(
                    account = %account_id,
                    purchase = %transaction_id,
                    purchased = purchase.amount,
                    refunded,
                    "refund capped at current balance"
                );
            }
            Ok(RefundReceipt {
                refunded,
                balance,
                transaction_id: refund_id,
            })
        });

        match &result {
            Ok(receipt) => info!(
                account = %account_id,
                purchase = %transaction_id,
                refunded = receipt.refunded,
                "refund applied"
            ),
            Err(err) => info!(
                account = %account_id,
                purchase = %transaction_id,
                error = %err,
                "refund rejected"
            ),
        }
        result
    }

    /// Pays coins out to the account's payout reference, recording a CASHOUT.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NoPayoutAccount`] - no payout reference on file.
    /// - plus the errors of [`Engine::debit`].
    pub fn cashout(&self, account_id: AccountId, amount: Coins) -> Result<Receipt, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let result = self.store.atomic(&[account_id], |unit| {
            let mut row = unit.account(account_id)?;
            let payout = row
                .payout_account()
                .map(str::to_owned)
                .ok_or(LedgerError::NoPayoutAccount)?;
            let balance = row.debit(amount)?;
            unit.set_balance(account_id, balance)?;
            let transaction_id = unit.append(NewTransaction::new(
                account_id,
                TransactionKind::Cashout,
                -amount,
                format!("Cashout of {amount} coins to {payout}"),
            ))?;
            Ok(Receipt {
                balance,
                transaction_id,
            })
        });

        match &result {
            Ok(receipt) => info!(account = %account_id, amount, balance = receipt.balance, "cashout applied"),
            Err(err) => info!(account = %account_id, amount, error = %err, "cashout rejected"),
        }
        result
    }

    /// Sets or clears the payout reference. Writes no record; the balance
    /// does not change.
    pub fn set_payout_account(
        &self,
        account_id: AccountId,
        payout_account: Option<String>,
    ) -> Result<Account, LedgerError> {
        let account = self.store.atomic(&[account_id], |unit| {
            unit.set_payout_account(account_id, payout_account)?;
            Ok(unit.account(account_id)?.snapshot())
        })?;
        info!(
            account = %account_id,
            linked = account.payout_account.is_some(),
            "payout account updated"
        );
        Ok(account)
    }
}

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

//! Ledger transaction records.
//!
//! Records are append-only. Every balance change is explained by one or more
//! records whose signed amounts sum to the change:
//! - credits ([`Purchase`], [`TransferIn`], [`Reward`]) carry positive amounts
//! - debits ([`Spend`], [`TransferOut`], [`Refund`], [`Cashout`]) carry negative amounts
//!
//! [`Purchase`]: TransactionKind::Purchase
//! [`TransferIn`]: TransactionKind::TransferIn
//! [`Reward`]: TransactionKind::Reward
//! [`Spend`]: TransactionKind::Spend
//! [`TransferOut`]: TransactionKind::TransferOut
//! [`Refund`]: TransactionKind::Refund
//! [`Cashout`]: TransactionKind::Cashout

use crate::base::{AccountId, Coins, ExternalRef, TransactionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Purchase,
    Spend,
    TransferOut,
    TransferIn,
    Refund,
    Reward,
    Cashout,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "PURCHASE",
            Self::Spend => "SPEND",
            Self::TransferOut => "TRANSFER_OUT",
            Self::TransferIn => "TRANSFER_IN",
            Self::Refund => "REFUND",
            Self::Reward => "REWARD",
            Self::Cashout => "CASHOUT",
        }
    }

    /// Whether records of this kind add coins to the owning account.
    pub fn is_credit(&self) -> bool {
        match self {
            Self::Purchase | Self::TransferIn | Self::Reward => true,
            Self::Spend | Self::TransferOut | Self::Refund | Self::Cashout => false,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable, committed ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub kind: TransactionKind,
    /// Signed balance delta this record explains.
    pub amount: Coins,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub external_ref: Option<ExternalRef>,
    /// Other side of a transfer.
    pub counterparty: Option<AccountId>,
    /// Record this one answers: the TRANSFER_OUT of a TRANSFER_IN, or the
    /// PURCHASE of a REFUND.
    pub reference: Option<TransactionId>,
}

/// A record staged inside an atomic unit, before the store assigns its
/// timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub account_id: AccountId,
    pub kind: TransactionKind,
    pub amount: Coins,
    pub description: String,
    pub external_ref: Option<ExternalRef>,
    pub counterparty: Option<AccountId>,
    pub reference: Option<TransactionId>,
}

impl NewTransaction {
    pub fn new(
        account_id: AccountId,
        kind: TransactionKind,
        amount: Coins,
        description: impl Into<String>,
    ) -> Self {
        Self {
            account_id,
            kind,
            amount,
            description: description.into(),
            external_ref: None,
            counterparty: None,
            reference: None,
        }
    }

    pub fn with_external_ref(mut self, external_ref: Option<ExternalRef>) -> Self {
        self.external_ref = external_ref;
        self
    }

    pub fn with_counterparty(mut self, counterparty: AccountId) -> Self {
        self.counterparty = Some(counterparty);
        self
    }

    pub fn with_reference(mut self, reference: TransactionId) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Seals the record with the identity and timestamp assigned by the store.
    pub fn into_transaction(self, id: TransactionId, created_at: DateTime<Utc>) -> Transaction {
        Transaction {
            id,
            account_id: self.account_id,
            kind: self.kind,
            amount: self.amount,
            description: self.description,
            created_at,
            external_ref: self.external_ref,
            counterparty: self.counterparty,
            reference: self.reference,
        }
    }
}

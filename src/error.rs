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

//! Error types for ledger operations.

use crate::base::AccountId;
use crate::transaction::TransactionKind;
use thiserror::Error;

/// Why the identity gate refused a credential.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("credential missing")]
    Missing,

    #[error("credential expired")]
    Expired,

    #[error("credential invalid")]
    Invalid,
}

/// Faults raised by the ledger store itself.
///
/// Callers see these as opaque internal failures. The engine only looks
/// inside to turn a unique violation on the external reference index into an
/// idempotent replay.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the commit.
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: &'static str },

    /// A check constraint rejected a write.
    #[error("check constraint violated: {constraint}")]
    CheckViolation { constraint: &'static str },

    /// A unit tried to touch an account row it does not hold a lock on.
    #[error("account {0} is not locked by this unit")]
    NotLocked(AccountId),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub const EXTERNAL_REF_CONSTRAINT: &'static str = "transactions_external_ref_key";
    pub const BALANCE_CONSTRAINT: &'static str = "accounts_balance_non_negative";

    pub fn is_external_ref_violation(&self) -> bool {
        matches!(
            self,
            Self::UniqueViolation { constraint } if *constraint == Self::EXTERNAL_REF_CONSTRAINT
        )
    }
}

/// Ledger operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Amount is zero or negative
    #[error("invalid amount (must be positive)")]
    InvalidAmount,

    /// Debit would take the balance below zero
    #[error("insufficient coins")]
    InsufficientFunds,

    #[error("account not found")]
    AccountNotFound,

    #[error("account already exists")]
    AccountExists,

    /// Kind has the wrong sign for the operation, e.g. a SPEND credit
    #[error("{0} records cannot be written by this operation")]
    WrongKind(TransactionKind),

    /// Referenced transaction does not exist or belongs to another account
    #[error("transaction not found")]
    TransactionNotFound,

    /// Only purchases can be refunded
    #[error("only purchases can be refunded")]
    NotRefundable,

    #[error("transaction already refunded")]
    AlreadyRefunded,

    #[error("cannot transfer to the same account")]
    SameAccount,

    #[error("no payout account on file")]
    NoPayoutAccount,

    /// Credit would overflow the balance column
    #[error("balance overflow")]
    BalanceOverflow,

    #[error("unauthenticated: {0}")]
    Unauthenticated(AuthFailure),

    #[error("unauthorized: {0}")]
    Unauthorized(AuthFailure),

    /// Lock wait timed out; safe to retry
    #[error("account busy, retry later")]
    Busy,

    #[error("internal storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl LedgerError {
    /// Whether a caller may retry the same operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy | Self::Storage(StoreError::Unavailable(_)))
    }
}

impl From<AuthFailure> for LedgerError {
    fn from(failure: AuthFailure) -> Self {
        match failure {
            AuthFailure::Missing => Self::Unauthenticated(failure),
            AuthFailure::Expired | AuthFailure::Invalid => Self::Unauthorized(failure),
        }
    }
}

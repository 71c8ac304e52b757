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

//! Payment event reconciliation.
//!
//! Applies purchase-completed events from the payment processor exactly once
//! per external reference.
//!
//! Per event:
//!
//! ```text
//!   Unseen ──purchase_completed──► Applied
//!                                     │
//!                                     └──redelivery──► Applied (no-op)
//! ```
//!
//! An acknowledgement is only produced once the credit has committed or has
//! been deterministically rejected. Storage faults and lock timeouts produce
//! no acknowledgement, so the source redelivers and the retry is absorbed by
//! the external reference.

use crate::base::{AccountId, Coins, ExternalRef, TransactionId};
use crate::engine::{CreditOutcome, Engine};
use crate::error::LedgerError;
use crate::memory::MemoryStore;
use crate::store::LedgerStore;
use crossbeam::channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Events emitted by the payment processor. Fields are camelCase on the
/// wire; snake_case spellings are accepted too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PaymentEvent {
    PurchaseCompleted {
        #[serde(default, alias = "account_id")]
        account_id: Option<AccountId>,
        #[serde(default, alias = "coin_amount")]
        coin_amount: Coins,
        #[serde(default, alias = "external_ref")]
        external_ref: ExternalRef,
    },
    /// Any kind this ledger does not handle.
    #[serde(other)]
    Unknown,
}

/// Why an event was acknowledged without being applied.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Rejection {
    #[error("event has no account")]
    MissingAccount,

    #[error("event has no external reference")]
    MissingExternalRef,

    #[error("coin amount must be positive")]
    InvalidAmount,

    #[error("account not found")]
    AccountNotFound,

    #[error("balance overflow")]
    BalanceOverflow,

    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// What the event source is told once the outcome is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Acknowledgement {
    Applied {
        account_id: AccountId,
        balance: Coins,
        transaction_id: TransactionId,
    },
    /// Redelivery of an event that was already applied.
    Duplicate {
        account_id: AccountId,
        balance: Coins,
    },
    Rejected {
        reason: Rejection,
    },
    /// Event kind not handled here.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventState {
    Unseen,
    Applied,
}

/// A raw event awaiting application. The acknowledgement, or the error that
/// prevented one, is sent on `reply`.
#[derive(Debug)]
pub struct Delivery {
    pub payload: Vec<u8>,
    pub reply: Sender<Result<Acknowledgement, LedgerError>>,
}

pub struct Reconciler<S = MemoryStore> {
    engine: Arc<Engine<S>>,
}

impl<S: LedgerStore> Reconciler<S> {
    pub fn new(engine: Arc<Engine<S>>) -> Self {
        Self { engine }
    }

    /// Applies one event.
    ///
    /// Returns `Err` only when the outcome is unknown or retryable (storage
    /// fault, lock timeout); the event must then not be acknowledged.
    pub fn handle(&self, event: PaymentEvent) -> Result<Acknowledgement, LedgerError> {
        let (account_id, coin_amount, external_ref) = match event {
            PaymentEvent::PurchaseCompleted {
                account_id,
                coin_amount,
                external_ref,
            } => (account_id, coin_amount, external_ref),
            PaymentEvent::Unknown => {
                info!("ignoring unhandled payment event kind");
                return Ok(Acknowledgement::Ignored);
            }
        };

        if external_ref.as_str().trim().is_empty() {
            warn!(?account_id, coin_amount, "purchase event without external reference discarded");
            return Ok(Acknowledgement::Rejected {
                reason: Rejection::MissingExternalRef,
            });
        }
        let Some(account_id) = account_id else {
            warn!(%external_ref, "purchase event without account discarded");
            return Ok(Acknowledgement::Rejected {
                reason: Rejection::MissingAccount,
            });
        };
        if coin_amount <= 0 {
            warn!(%external_ref, %account_id, coin_amount, "purchase event with invalid amount discarded");
            return Ok(Acknowledgement::Rejected {
                reason: Rejection::InvalidAmount,
            });
        }

        let outcome = self
            .engine
            .purchase(account_id, coin_amount, external_ref.clone());
        let rejection = match outcome {
            Ok(CreditOutcome::Applied {
                balance,
                transaction_id,
            }) => {
                info!(%external_ref, %account_id, coin_amount, "purchase applied");
                return Ok(Acknowledgement::Applied {
                    account_id,
                    balance,
                    transaction_id,
                });
            }
            Ok(CreditOutcome::Replayed { balance, .. }) => {
                info!(%external_ref, %account_id, "duplicate purchase event acknowledged");
                return Ok(Acknowledgement::Duplicate {
                    account_id,
                    balance,
                });
            }
            Err(LedgerError::InvalidAmount) => Rejection::InvalidAmount,
            Err(LedgerError::AccountNotFound) => Rejection::AccountNotFound,
            Err(LedgerError::BalanceOverflow) => Rejection::BalanceOverflow,
            Err(err) => {
                error!(%external_ref, %account_id, error = %err, "purchase event not applied; withholding acknowledgement");
                return Err(err);
            }
        };

        warn!(%external_ref, %account_id, reason = %rejection, "purchase event rejected");
        Ok(Acknowledgement::Rejected { reason: rejection })
    }

    /// Decodes a JSON event and applies it. Undecodable payloads are
    /// acknowledged as rejected; the source would only resend the same bytes.
    pub fn handle_payload(&self, payload: &[u8]) -> Result<Acknowledgement, LedgerError> {
        match serde_json::from_slice::<PaymentEvent>(payload) {
            Ok(event) => self.handle(event),
            Err(err) => {
                warn!(error = %err, "malformed payment event discarded");
                Ok(Acknowledgement::Rejected {
                    reason: Rejection::Malformed(err.to_string()),
                })
            }
        }
    }

    pub fn state(&self, external_ref: &ExternalRef) -> Result<EventState, LedgerError> {
        Ok(
            match self.engine.store().transaction_by_external_ref(external_ref)? {
                Some(_) => EventState::Applied,
                None => EventState::Unseen,
            },
        )
    }

    /// Drains deliveries until every sender is dropped. Returns the number of
    /// deliveries handled.
    pub fn run(&self, deliveries: Receiver<Delivery>) -> usize {
        let mut handled = 0;
        for delivery in deliveries {
            let result = self.handle_payload(&delivery.payload);
            if delivery.reply.send(result).is_err() {
                warn!("event source went away before acknowledgement");
            }
            handled += 1;
        }
        info!(handled, "payment event channel closed");
        handled
    }
}

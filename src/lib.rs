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

//! # Coin Ledger
//!
//! This library keeps virtual-coin wallets consistent under concurrent
//! access: users spend coins, transfer them to each other, buy them through
//! an external payment processor and get purchases refunded.
//!
//! ## Core Components
//!
//! - [`Engine`]: applies credits, debits, transfers and refunds as atomic units
//! - [`Reconciler`]: applies payment events exactly once per external reference
//! - [`LedgerStore`]: repository interface to the transactional store, with
//!   [`MemoryStore`] as the in-process implementation
//! - [`Wallet`]: caller-facing operations behind an [`IdentityGate`]
//! - [`LedgerError`]: distinguishable failure outcomes
//!
//! ## Example
//!
//! ```
//! use coin_ledger::{AccountId, Engine, ExternalRef, LedgerError};
//!
//! let engine = Engine::new();
//! engine.open_account(AccountId(1)).unwrap();
//! engine.open_account(AccountId(2)).unwrap();
//!
//! // Credit a completed purchase; a redelivery is a no-op
//! engine.purchase(AccountId(1), 100, ExternalRef::new("cs_1")).unwrap();
//! engine.purchase(AccountId(1), 100, ExternalRef::new("cs_1")).unwrap();
//! assert_eq!(engine.balance(AccountId(1)).unwrap(), 100);
//!
//! engine.transfer(AccountId(1), AccountId(2), 30).unwrap();
//! assert_eq!(
//!     engine.spend(AccountId(2), 31),
//!     Err(LedgerError::InsufficientFunds)
//! );
//! ```
//!
//! ## Invariants
//!
//! - No balance is ever negative.
//! - Every balance equals the sum of its account's transaction amounts.
//! - An external reference is recorded by at most one transaction.

pub mod account;
mod base;
pub mod catalog;
pub mod config;
mod engine;
pub mod error;
pub mod gate;
mod history;
mod memory;
pub mod reconciler;
pub mod store;
mod transaction;
pub mod wallet;

pub use account::{Account, AccountData};
pub use base::{AccountId, Coins, ExternalRef, TransactionId};
pub use catalog::{CoinCatalog, CoinPackage, StaticCatalog};
pub use config::EngineConfig;
pub use engine::{CreditOutcome, Engine, Receipt, RefundReceipt, TransferReceipt};
pub use error::{AuthFailure, LedgerError, StoreError};
pub use gate::IdentityGate;
pub use history::{PageRequest, TransactionPage};
pub use memory::MemoryStore;
pub use reconciler::{Acknowledgement, Delivery, EventState, PaymentEvent, Reconciler, Rejection};
pub use store::{AtomicUnit, LedgerStore};
pub use transaction::{NewTransaction, Transaction, TransactionKind};
pub use wallet::Wallet;

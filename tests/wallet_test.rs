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

//! Caller-facing wallet operations behind the identity gate.

use coin_ledger::{
    AccountId, AuthFailure, CoinPackage, Engine, ExternalRef, LedgerError,
    LedgerStore, PageRequest, StaticCatalog, TransactionKind, Wallet,
};
use std::sync::Arc;
use std::thread;

// === Helper Functions ===

/// Tokens are `user-<id>`; `stale` is an expired token.
fn token_gate(credential: Option<&str>) -> Result<AccountId, AuthFailure> {
    let token = credential.ok_or(AuthFailure::Missing)?;
    if token == "stale" {
        return Err(AuthFailure::Expired);
    }
    token
        .strip_prefix("user-")
        .and_then(|id| id.parse().ok())
        .map(AccountId)
        .ok_or(AuthFailure::Invalid)
}

type Gate = fn(Option<&str>) -> Result<AccountId, AuthFailure>;
type TestWallet = Wallet<Gate, StaticCatalog>;

fn catalog() -> StaticCatalog {
    StaticCatalog::new(vec![
        CoinPackage {
            id: "small".into(),
            name: "100 coins".into(),
            coin_amount: 100,
            price_ref: "price_small".into(),
        },
        CoinPackage {
            id: "large".into(),
            name: "1000 coins".into(),
            coin_amount: 1_000,
            price_ref: "price_large".into(),
        },
    ])
}

fn wallet() -> TestWallet {
    let engine = Arc::new(Engine::new());
    for id in [1, 2] {
        engine.open_account(AccountId(id)).unwrap();
    }
    engine
        .purchase(AccountId(1), 100, ExternalRef::new("cs_seed"))
        .unwrap();
    Wallet::new(engine, token_gate as Gate, catalog())
}

// === Authentication ===

#[test]
fn missing_credential_is_unauthenticated() {
    let wallet = wallet();
    assert_eq!(
        wallet.balance(None),
        Err(LedgerError::Unauthenticated(AuthFailure::Missing))
    );
}

#[test]
fn expired_credential_is_unauthorized() {
    let wallet = wallet();
    assert_eq!(
        wallet.spend(Some("stale"), 10),
        Err(LedgerError::Unauthorized(AuthFailure::Expired))
    );
    assert_eq!(wallet.engine().balance(AccountId(1)).unwrap(), 100);
}

#[test]
fn invalid_credential_is_unauthorized() {
    let wallet = wallet();
    assert_eq!(
        wallet.transfer(Some("garbage"), AccountId(2), 10),
        Err(LedgerError::Unauthorized(AuthFailure::Invalid))
    );
}

// === Operations ===

#[test]
fn operations_act_on_resolved_account() {
    let wallet = wallet();
    assert_eq!(wallet.balance(Some("user-1")).unwrap(), 100);
    assert_eq!(wallet.balance(Some("user-2")).unwrap(), 0);

    let receipt = wallet.spend(Some("user-1"), 40).unwrap();
    assert_eq!(receipt.balance, 60);

    let receipt = wallet.transfer(Some("user-1"), AccountId(2), 20).unwrap();
    assert_eq!(receipt.sender_balance, 40);
    assert_eq!(wallet.balance(Some("user-2")).unwrap(), 20);
}

#[test]
fn unknown_caller_account() {
    let wallet = wallet();
    assert_eq!(
        wallet.balance(Some("user-77")),
        Err(LedgerError::AccountNotFound)
    );
}

#[test]
fn transactions_page_for_caller() {
    let wallet = wallet();
    wallet.spend(Some("user-1"), 5).unwrap();

    let page = wallet
        .transactions(Some("user-1"), PageRequest::default())
        .unwrap();
    assert_eq!(page.total_count, 2);
    assert_eq!(page.transactions[0].kind, TransactionKind::Spend);
    assert_eq!(page.transactions[1].kind, TransactionKind::Purchase);

    let page = wallet
        .transactions(Some("user-2"), PageRequest::default())
        .unwrap();
    assert_eq!(page.total_count, 0);
}

#[test]
fn refund_only_own_purchase() {
    let wallet = wallet();
    let purchase = wallet
        .engine()
        .store()
        .transaction_by_external_ref(&ExternalRef::new("cs_seed"))
        .unwrap()
        .expect("seed purchase recorded")
        .id;

    assert_eq!(
        wallet.refund(Some("user-2"), purchase),
        Err(LedgerError::TransactionNotFound)
    );
    let receipt = wallet.refund(Some("user-1"), purchase).unwrap();
    assert_eq!(receipt.refunded, 100);
    assert_eq!(wallet.balance(Some("user-1")).unwrap(), 0);
}

#[test]
fn cashout_needs_payout_account() {
    let wallet = wallet();
    assert_eq!(
        wallet.cashout(Some("user-1"), 10),
        Err(LedgerError::NoPayoutAccount)
    );

    let account = wallet
        .set_payout_account(Some("user-1"), Some("acct_123".into()))
        .unwrap();
    assert_eq!(account.payout_account.as_deref(), Some("acct_123"));
    assert_eq!(account.balance, 100);

    let receipt = wallet.cashout(Some("user-1"), 10).unwrap();
    assert_eq!(receipt.balance, 90);

    let account = wallet.set_payout_account(Some("user-1"), None).unwrap();
    assert_eq!(account.payout_account, None);
    assert_eq!(
        wallet.cashout(Some("user-1"), 10),
        Err(LedgerError::NoPayoutAccount)
    );
}

#[test]
fn coin_packages_need_no_credential() {
    let wallet = wallet();
    let packages = wallet.coin_packages().unwrap();
    assert_eq!(packages.len(), 2);
    assert_eq!(packages[0].coin_amount, 100);
    assert_eq!(packages[1].id, "large");
}

#[test]
fn wallet_shared_across_threads() {
    let wallet = Arc::new(wallet());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let wallet = Arc::clone(&wallet);
            thread::spawn(move || {
                for _ in 0..10 {
                    let _ = wallet.transfer(Some("user-1"), AccountId(2), 1);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    assert_eq!(wallet.balance(Some("user-1")).unwrap(), 60);
    assert_eq!(wallet.balance(Some("user-2")).unwrap(), 40);
}

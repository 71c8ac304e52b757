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

//! Paginated transaction history.

use crate::base::AccountId;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::LedgerError;
use crate::store::LedgerStore;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};

/// Requested page. Missing or zero values fall back to page 1 and the
/// configured default page size; sizes above the configured maximum are
/// clamped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: Some(page),
            page_size: Some(page_size),
        }
    }

    /// Effective `(page, page_size)`.
    pub fn resolve(&self, config: &EngineConfig) -> (u32, u32) {
        let page = self.page.filter(|page| *page >= 1).unwrap_or(1);
        let page_size = self
            .page_size
            .filter(|size| *size >= 1)
            .unwrap_or(config.default_page_size)
            .clamp(1, config.max_page_size.max(1));
        (page, page_size)
    }
}

/// One page of an account's history, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionPage {
    pub transactions: Vec<Transaction>,
    pub page: u32,
    pub page_size: u32,
    pub total_count: u64,
    pub total_pages: u64,
}

impl<S: LedgerStore> Engine<S> {
    /// Lists an account's transactions, newest first.
    ///
    /// A page past the end is empty, not an error.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AccountNotFound`] - no such account.
    pub fn list_transactions(
        &self,
        account_id: AccountId,
        request: PageRequest,
    ) -> Result<TransactionPage, LedgerError> {
        if self.store().account(account_id)?.is_none() {
            return Err(LedgerError::AccountNotFound);
        }

        let (page, page_size) = request.resolve(&self.config);
        let offset = u64::from(page - 1) * u64::from(page_size);
        let (transactions, total_count) =
            self.store()
                .transactions_newest_first(account_id, offset, u64::from(page_size))?;

        Ok(TransactionPage {
            transactions,
            page,
            page_size,
            total_count,
            total_pages: total_count.div_ceil(u64::from(page_size)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_values() {
        let config = EngineConfig::default();
        assert_eq!(PageRequest::default().resolve(&config), (1, 10));
        assert_eq!(
            PageRequest {
                page: Some(0),
                page_size: Some(0)
            }
            .resolve(&config),
            (1, 10)
        );
    }

    #[test]
    fn page_size_clamped_to_maximum() {
        let config = EngineConfig::default();
        assert_eq!(PageRequest::new(3, 500).resolve(&config), (3, 100));
    }

    #[test]
    fn deserializes_query_parameters() {
        let request: PageRequest = serde_json::from_str(r#"{"page": 2}"#).unwrap();
        assert_eq!(request.page, Some(2));
        assert_eq!(request.page_size, None);
    }

    #[test]
    fn empty_account_has_no_pages() {
        let engine = Engine::new();
        engine.open_account(AccountId(1)).unwrap();
        let page = engine
            .list_transactions(AccountId(1), PageRequest::default())
            .unwrap();
        assert!(page.transactions.is_empty());
        assert_eq!(page.total_count, 0);
        assert_eq!(page.total_pages, 0);
    }
}

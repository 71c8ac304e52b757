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

//! Coin packages offered for purchase. Read-only.

use crate::base::Coins;
use crate::error::LedgerError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinPackage {
    pub id: String,
    pub name: String,
    pub coin_amount: Coins,
    /// Price identifier at the payment processor.
    pub price_ref: String,
}

pub trait CoinCatalog: Send + Sync {
    fn packages(&self) -> Result<Vec<CoinPackage>, LedgerError>;
}

/// A fixed list of packages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticCatalog(pub Vec<CoinPackage>);

impl StaticCatalog {
    pub fn new(packages: Vec<CoinPackage>) -> Self {
        Self(packages)
    }
}

impl CoinCatalog for StaticCatalog {
    fn packages(&self) -> Result<Vec<CoinPackage>, LedgerError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(id: &str, coins: Coins) -> CoinPackage {
        CoinPackage {
            id: id.into(),
            name: format!("{coins} coins"),
            coin_amount: coins,
            price_ref: format!("price_{id}"),
        }
    }

    #[test]
    fn packages_in_listed_order() {
        let catalog = StaticCatalog::new(vec![package("small", 100), package("large", 1_000)]);
        let packages = catalog.packages().unwrap();
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[1].coin_amount, 1_000);
        assert_eq!(packages[1].price_ref, "price_large");
    }

    #[test]
    fn loads_from_json_array() {
        let catalog: StaticCatalog = serde_json::from_str(
            r#"[{"id":"s","name":"Starter","coin_amount":50,"price_ref":"price_s"}]"#,
        )
        .unwrap();
        assert_eq!(catalog.packages().unwrap().len(), 1);
    }
}

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

//! Identity gate seam.
//!
//! Token issuance and verification live outside the ledger. The ledger only
//! asks a gate to turn the inbound credential into an account identity and
//! trusts the answer.

use crate::base::AccountId;
use crate::error::AuthFailure;

pub trait IdentityGate: Send + Sync {
    /// Resolves a credential (e.g. a bearer token) to an account.
    fn resolve(&self, credential: Option<&str>) -> Result<AccountId, AuthFailure>;
}

impl<F> IdentityGate for F
where
    F: Fn(Option<&str>) -> Result<AccountId, AuthFailure> + Send + Sync,
{
    fn resolve(&self, credential: Option<&str>) -> Result<AccountId, AuthFailure> {
        self(credential)
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_gates() {
        let gate = |credential: Option<&str>| match credential {
            Some("alice") => Ok(AccountId(1)),
            Some(_) => Err(AuthFailure::Invalid),
            None => Err(AuthFailure::Missing),
        };
        assert_eq!(gate.resolve(Some("alice")), Ok(AccountId(1)));
        assert_eq!(gate.resolve(Some("mallory")), Err(AuthFailure::Invalid));
        assert_eq!(gate.resolve(None), Err(AuthFailure::Missing));
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(Some("Bearer ")), None);
        assert_eq!(bearer_token(Some("Basic abc")), None);
        assert_eq!(bearer_token(None), None);
    }
}

//! In-memory stores backed by [`DashMap`].
//!
//! DashMap takes a write lock on the shard holding a key for the duration
//! of a `get_mut` guard. Every state transition below happens while that
//! guard is held, which gives per-key single-writer semantics without a
//! global lock. Guards are always dropped before touching the map again.

use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::code::{AuthorizationCode, CodeState, IssuedTokens, Redemption};
use crate::storage::{CodeStore, RefreshTokenStore, RevokedTokenStore};
use crate::types::{MintedAccessToken, RefreshToken};

// =============================================================================
// Authorization codes
// =============================================================================

#[derive(Debug)]
struct CodeEntry {
    code: AuthorizationCode,
    state: CodeState,
    issued: Option<IssuedTokens>,
    retain_until: OffsetDateTime,
}

/// In-memory [`CodeStore`].
#[derive(Debug, Default)]
pub struct MemoryCodeStore {
    codes: DashMap<String, CodeEntry>,
}

impl MemoryCodeStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Returns `true` if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Current state of a code, if the store still knows it.
    #[must_use]
    pub fn state_of(&self, code_hash: &str) -> Option<CodeState> {
        self.codes.get(code_hash).map(|e| e.state)
    }
}

#[async_trait]
impl CodeStore for MemoryCodeStore {
    async fn insert(&self, code: AuthorizationCode) -> AuthResult<()> {
        use dashmap::mapref::entry::Entry;

        match self.codes.entry(code.code_hash.clone()) {
            Entry::Occupied(_) => Err(AuthError::storage("authorization code collision")),
            Entry::Vacant(slot) => {
                let retain_until = code.expires_at;
                slot.insert(CodeEntry {
                    code,
                    state: CodeState::CodeIssued,
                    issued: None,
                    retain_until,
                });
                Ok(())
            }
        }
    }

    async fn redeem(&self, code_hash: &str) -> AuthResult<Redemption> {
        let outcome = {
            let Some(mut entry) = self.codes.get_mut(code_hash) else {
                return Ok(Redemption::Unknown);
            };
            match entry.state {
                CodeState::CodeIssued if entry.code.is_expired() => Redemption::Expired,
                CodeState::CodeIssued => {
                    entry.state = CodeState::Redeemed;
                    Redemption::Redeemed(entry.code.clone())
                }
                CodeState::Redeemed | CodeState::TokensIssued => Redemption::Replayed {
                    client_id: entry.code.client_id.clone(),
                    issued: entry.issued.clone(),
                },
            }
        };

        if matches!(outcome, Redemption::Expired) {
            self.codes.remove_if(code_hash, |_, entry| {
                entry.state == CodeState::CodeIssued && entry.code.is_expired()
            });
        }
        Ok(outcome)
    }

    async fn record_issued(&self, code_hash: &str, issued: IssuedTokens) -> AuthResult<()> {
        let mut entry = self
            .codes
            .get_mut(code_hash)
            .ok_or_else(|| AuthError::storage("redeemed authorization code vanished"))?;

        entry.retain_until = entry
            .code
            .expires_at
            .max(issued.access_token_expires_at)
            .max(issued.refresh_token_expires_at.unwrap_or(entry.code.expires_at));
        entry.state = CodeState::TokensIssued;
        entry.issued = Some(issued);
        Ok(())
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let now = OffsetDateTime::now_utc();
        let before = self.codes.len();
        self.codes.retain(|_, entry| entry.retain_until > now);
        Ok(before.saturating_sub(self.codes.len()) as u64)
    }
}

// =============================================================================
// Refresh tokens
// =============================================================================

/// In-memory [`RefreshTokenStore`].
#[derive(Debug, Default)]
pub struct MemoryRefreshTokenStore {
    tokens: DashMap<String, RefreshToken>,
}

impl MemoryRefreshTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records, revoked ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns `true` if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn insert(&self, token: RefreshToken) -> AuthResult<()> {
        self.tokens.insert(token.token_hash.clone(), token);
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>> {
        Ok(self.tokens.get(token_hash).map(|t| t.clone()))
    }

    async fn rotate(&self, old_hash: &str, replacement: RefreshToken) -> AuthResult<RefreshToken> {
        let previous = {
            let mut old = self
                .tokens
                .get_mut(old_hash)
                .ok_or_else(|| AuthError::invalid_grant("unknown refresh token"))?;
            if old.is_revoked() {
                return Err(AuthError::invalid_grant("refresh token has been revoked"));
            }
            if old.is_expired() {
                return Err(AuthError::invalid_grant("refresh token has expired"));
            }
            old.revoked_at = Some(OffsetDateTime::now_utc());
            old.clone()
        };

        self.tokens
            .insert(replacement.token_hash.clone(), replacement);
        Ok(previous)
    }

    async fn revoke(&self, token_hash: &str) -> AuthResult<bool> {
        match self.tokens.get_mut(token_hash) {
            Some(mut token) => {
                if token.revoked_at.is_none() {
                    token.revoked_at = Some(OffsetDateTime::now_utc());
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_access_token(
        &self,
        token_hash: &str,
        minted: MintedAccessToken,
    ) -> AuthResult<()> {
        let mut token = self
            .tokens
            .get_mut(token_hash)
            .ok_or_else(|| AuthError::storage("refresh token record vanished"))?;
        let now = OffsetDateTime::now_utc();
        token.access_tokens.retain(|t| t.expires_at > now);
        token.access_tokens.push(minted);
        Ok(())
    }

    async fn revoke_lineage(&self, lineage: &str) -> AuthResult<Vec<RefreshToken>> {
        let now = OffsetDateTime::now_utc();
        let mut family = Vec::new();
        for mut token in self.tokens.iter_mut() {
            if token.lineage.as_deref() != Some(lineage) {
                continue;
            }
            if token.revoked_at.is_none() {
                token.revoked_at = Some(now);
            }
            family.push(token.clone());
        }
        Ok(family)
    }

    async fn revoke_by_client(&self, client_id: &str) -> AuthResult<u64> {
        let now = OffsetDateTime::now_utc();
        let mut count = 0;
        for mut token in self.tokens.iter_mut() {
            if token.client_id == client_id && token.revoked_at.is_none() {
                token.revoked_at = Some(now);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let before = self.tokens.len();
        self.tokens.retain(|_, token| !token.is_expired());
        Ok(before.saturating_sub(self.tokens.len()) as u64)
    }
}

// =============================================================================
// Revoked access tokens
// =============================================================================

/// In-memory [`RevokedTokenStore`].
#[derive(Debug, Default)]
pub struct MemoryRevokedTokenStore {
    revoked: DashMap<String, OffsetDateTime>,
}

impl MemoryRevokedTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevokedTokenStore for MemoryRevokedTokenStore {
    async fn revoke(&self, jti: &str, expires_at: OffsetDateTime) -> AuthResult<()> {
        self.revoked.insert(jti.to_string(), expires_at);
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> AuthResult<bool> {
        Ok(self.revoked.contains_key(jti))
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let now = OffsetDateTime::now_utc();
        let before = self.revoked.len();
        self.revoked.retain(|_, expires_at| *expires_at > now);
        Ok(before.saturating_sub(self.revoked.len()) as u64)
    }
}

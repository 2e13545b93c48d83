//! Background reaping of expired codes, refresh tokens, revocation entries
//! and retired signing keys.
//!
//! Expired records are already rejected on lookup. The sweep only reclaims
//! memory, so a failing pass is logged and the next tick tries again.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::storage::{CodeStore, RefreshTokenStore, RevokedTokenStore};
use crate::token::KeyStore;

/// Counts of records removed by one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Codes and tombstones deleted.
    pub codes: u64,
    /// Refresh token records deleted.
    pub refresh_tokens: u64,
    /// Revocation list entries deleted.
    pub revoked_tokens: u64,
    /// Retired verification keys dropped from the JWKS.
    pub retired_keys: usize,
}

impl SweepReport {
    /// Total number of records removed.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.codes + self.refresh_tokens + self.revoked_tokens + self.retired_keys as u64
    }
}

/// Periodically deletes state that can no longer be used.
pub struct ExpirySweeper {
    codes: Arc<dyn CodeStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    revoked_tokens: Arc<dyn RevokedTokenStore>,
    keys: Arc<KeyStore>,
}

impl ExpirySweeper {
    /// Creates a sweeper over the given stores.
    pub fn new(
        codes: Arc<dyn CodeStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        revoked_tokens: Arc<dyn RevokedTokenStore>,
        keys: Arc<KeyStore>,
    ) -> Self {
        Self {
            codes,
            refresh_tokens,
            revoked_tokens,
            keys,
        }
    }

    /// Runs a single pass. Store failures are logged and counted as zero.
    pub async fn run_once(&self) -> SweepReport {
        let mut report = SweepReport::default();

        match self.codes.cleanup_expired().await {
            Ok(n) => report.codes = n,
            Err(e) => tracing::warn!(error = %e, "Authorization code sweep failed"),
        }
        match self.refresh_tokens.cleanup_expired().await {
            Ok(n) => report.refresh_tokens = n,
            Err(e) => tracing::warn!(error = %e, "Refresh token sweep failed"),
        }
        match self.revoked_tokens.cleanup_expired().await {
            Ok(n) => report.revoked_tokens = n,
            Err(e) => tracing::warn!(error = %e, "Revocation list sweep failed"),
        }
        report.retired_keys = self.keys.prune_retired();

        report
    }

    /// Spawns a task that sweeps every `period` until aborted.
    pub fn start(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                let report = self.run_once().await;
                if report.total() > 0 {
                    tracing::debug!(
                        codes = report.codes,
                        refresh_tokens = report.refresh_tokens,
                        revoked_tokens = report.revoked_tokens,
                        retired_keys = report.retired_keys,
                        "Expiry sweep completed"
                    );
                }
            }
        })
    }
}

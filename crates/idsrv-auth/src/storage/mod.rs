//! Storage for state the grant engine owns while it is in flight.
//!
//! - Authorization codes (single-use, redeemed atomically)
//! - Refresh tokens (hashed, rotated atomically)
//! - Revoked access token ids
//!
//! The in-memory implementations in [`memory`] are the only backend.

pub mod code;
pub mod memory;
pub mod refresh_token;
pub mod revoked_token;
pub mod sweep;

pub use code::CodeStore;
pub use memory::{MemoryCodeStore, MemoryRefreshTokenStore, MemoryRevokedTokenStore};
pub use refresh_token::RefreshTokenStore;
pub use revoked_token::RevokedTokenStore;
pub use sweep::{ExpirySweeper, SweepReport};

//! Domain types shared by the registry, grant engine and token issuer.

pub mod client;
pub mod refresh_token;
pub mod resource;
pub mod user;

pub use client::{Client, ClientValidationError, GrantType};
pub use refresh_token::{MintedAccessToken, RefreshToken};
pub use resource::{ApiResource, IdentityResource, OFFLINE_ACCESS, OPENID, Resources};
pub use user::User;

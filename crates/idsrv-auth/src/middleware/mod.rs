//! HTTP plumbing shared by the endpoint handlers.
//!
//! - [`bearer`] - `BearerAuth` extractor for this server's protected endpoints
//! - [`error`] - `IntoResponse` for [`AuthError`](crate::error::AuthError)

pub mod bearer;
pub mod error;

pub use bearer::{BearerAuth, extract_bearer};
pub use error::status_for;

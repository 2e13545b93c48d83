pub mod api;
pub mod discover;
pub mod grants;

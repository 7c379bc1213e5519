//! Registry access: reading origin images and writing them to the cache

mod auth;
mod client;
mod default;
mod keychain;

pub use auth::Access;
pub use client::*;
pub use default::*;
pub use keychain::*;

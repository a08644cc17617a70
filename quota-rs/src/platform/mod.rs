//! Social platforms and their stored credentials
//!
//! Posts target one of five platforms. Provider tokens are kept as a typed
//! [`PlatformCredential`] record per user and platform.

pub mod store;
pub mod types;

pub use store::CredentialStore;
pub use types::{Platform, PlatformCredential};

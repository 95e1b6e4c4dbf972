//! Router Module
//!
//! Credential pools and the provider fallback chain.

pub mod fallback;
pub mod key_pool;

pub use fallback::Router;
pub use key_pool::{CredentialStatus, KeyPool, KeyPools, PoolStatus};

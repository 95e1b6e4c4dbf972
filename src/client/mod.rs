//! Client Module
//!
//! Shared HTTP transport for provider adapters.

pub mod http;

pub use http::HttpClient;

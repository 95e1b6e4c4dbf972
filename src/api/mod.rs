//! API Module
//!
//! Request and result types exchanged with the gateway.

pub mod generation;

pub use generation::{GenerationMode, GenerationOptions, GenerationRequest, GenerationResult};

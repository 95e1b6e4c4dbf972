//! Configuration Module
//!
//! Provider catalog, gateway tunables and layered config loading.

pub mod loader;
pub mod profile;

pub use loader::ConfigLoader;
pub use profile::{
    BreakerOverride, BreakerSettings, CooldownSettings, CouncilSettings, GatewayConfig,
    ProviderKind, ProviderProfile, ProviderTier,
};

//! Provider declarations consumed by the strategy factory.
//!
//! `key` exposes the validated identifiers (`ProviderKey` for the declared
//! provider, `StrategyKey` for the `"<key>_oauth"` registry entry derived from
//! it). `config` holds the per-provider credentials, wire-client options, and
//! the identity-source switch that decides what the user resolver receives.

pub mod config;
pub mod key;

pub use config::*;
pub use key::*;

//! SessionKit Infrastructure - Adapters and implementations
//!
//! This crate provides concrete implementations of the ports
//! defined in the application layer, plus settings loading.

pub mod adapters;
pub mod persistence;
pub mod serialization;
pub mod settings;

pub use adapters::{DEFAULT_TIMEOUT, ReqwestHttpClient, SystemClock};
pub use persistence::{FileKeyValueStore, MemoryKeyValueStore};
pub use serialization::{SerializationError, from_json_bytes, to_json_stable, to_json_stable_bytes};
pub use settings::{ENV_PREFIX, SettingsError, SettingsLoader, load_settings};

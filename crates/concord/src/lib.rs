//! # Concord
//!
//! Cluster-wide consistency checks for secure settings.
//!
//! Each node holds its own copy of every secure setting. The elected
//! coordinator publishes salted PBKDF2 hashes of its copies into cluster
//! metadata, and any node can verify its local copies against them without
//! the secrets ever leaving the node.
//!
//! ## Modules
//! - `hash` - Salted hash derivation and the published wire format
//! - `settings` - Declarations, node settings, template expansion
//! - `cluster` - Cluster state traits, in-process cluster, hash publisher
//! - `consistency` - Hash computation and the consistency check

pub mod cluster;
pub mod consistency;
pub mod hash;
pub mod settings;

pub use consistency::{ConsistentSettingsService, SettingVerdict};

//! Who is online
//!
//! Tracks open realtime connections per principal and notifies subscribers
//! when a principal comes online or goes offline.

mod registry;

pub use registry::{PresenceGuard, PresenceRegistry, StatusChanged, DEFAULT_CHANNEL_CAPACITY};

//! Wicket - session, permission and presence core
//!
//! Wicket issues short-lived access tokens and rotating refresh tokens,
//! revokes them through a per-principal token version, resolves what a
//! principal may do from its roles, and tracks who is online.
//!
//! ## Services
//!
//! - **Sessions**: login, refresh rotation, logout, access-token checks
//! - **Permissions**: principal → roles → permissions, batched per hop
//! - **Presence**: connection counts with online/offline notifications
//! - **Gateway**: `/ws` realtime feed of presence changes
//! - **Audit**: non-blocking trail of auth events and API requests

pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod presence;
pub mod routes;
pub mod server;
pub mod store;
pub mod types;

pub use config::Args;
pub use server::{run, serve, AppState};
pub use types::{Result, WicketError};

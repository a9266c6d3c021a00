//! Database layer for Wicket
//!
//! MongoDB storage for principals, the role graph and the audit trail.

pub mod mongo;
pub mod schemas;
mod store;

pub use mongo::{MongoClient, MongoCollection};
pub use schemas::{AuditLogDoc, Metadata, PrincipalDoc};
pub use store::MongoStore;

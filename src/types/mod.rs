//! Shared types for Wicket

mod error;

pub use error::{FieldError, Result, WicketError};

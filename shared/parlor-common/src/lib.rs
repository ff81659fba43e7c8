//! Parlor Common Library
//!
//! Shared types and the error taxonomy used by both the sync core and the
//! presentation layer.

pub mod error;
pub mod id;
pub mod types;

pub use error::{Error, Result};
pub use id::{ChatId, MessageId, UserId};
pub use types::*;

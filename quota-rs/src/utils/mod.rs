//! Utility modules
//!
//! - [`time`]: RFC 3339 timestamp storage format
//! - [`validation`]: Input validation for identifiers and post content

pub mod time;
pub mod validation;

pub use time::{format_timestamp, parse_timestamp};
pub use validation::{validate_content, validate_user_id};

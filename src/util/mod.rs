//! Utility functions shared across modules.
//!
//! - **URL validation**: Security-focused validation of subscribe arguments
//! - **Text processing**: HTML escaping for Telegram's HTML parse mode

mod text;
mod url_validator;

pub use text::{escape_html, escape_truncated};
pub use url_validator::{validate_url, UrlValidationError};

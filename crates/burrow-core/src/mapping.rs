use crate::shortcode::ShortCode;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// A short code together with the URL it points to.
///
/// Mappings are created once by the registry and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlMapping {
    pub code: ShortCode,
    pub original_url: String,
    pub created_at: Timestamp,
}

impl UrlMapping {
    /// Builds a mapping stamped with the current time.
    pub fn new(code: ShortCode, original_url: impl Into<String>) -> Self {
        Self {
            code,
            original_url: original_url.into(),
            created_at: Timestamp::now(),
        }
    }
}

use crate::codes::Code;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Language/format selector of a code's content
///
/// The wrapped value is what gets sent to the catalog's language control
/// (e.g. `zh_TW`); the human label lives in configuration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variant(String);

impl Variant {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Last error seen for one (code, variant) pair
///
/// A record exists only while the variant has not completed successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub code: Code,
    pub variant: Variant,
    pub error_message: String,
    pub updated_at: DateTime<Utc>,
}

impl FailureRecord {
    pub fn new(code: Code, variant: Variant, error_message: impl Into<String>) -> Self {
        Self {
            code,
            variant,
            error_message: error_message.into(),
            updated_at: Utc::now(),
        }
    }
}

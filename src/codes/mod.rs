//! Work list handling
//!
//! A work list is a plain-text file of lecture codes, one per line. This module
//! turns it into a sorted, deduplicated [`CodeList`] that both scan workers walk,
//! one from each end.

mod loader;

pub use loader::{load_codes, parse_codes, CodeRules};

use crate::crawler::ScanDirection;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier for one unit of work
///
/// Codes are the primary key of every store, and their ordering defines the
/// scan order of both workers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Code(String);

impl Code {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Code {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Code {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Sorted, deduplicated list of codes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeList {
    codes: Vec<Code>,
}

impl CodeList {
    /// Builds a list from arbitrary codes, sorting and deduplicating them
    pub fn from_codes<I>(codes: I) -> Self
    where
        I: IntoIterator<Item = Code>,
    {
        let mut codes: Vec<Code> = codes.into_iter().collect();
        codes.sort();
        codes.dedup();
        Self { codes }
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn as_slice(&self) -> &[Code] {
        &self.codes
    }

    pub fn contains(&self, code: &Code) -> bool {
        self.codes.binary_search(code).is_ok()
    }

    /// Iterates the list in the order a worker with the given direction scans it
    pub fn iter_direction(
        &self,
        direction: ScanDirection,
    ) -> Box<dyn Iterator<Item = &Code> + '_> {
        match direction {
            ScanDirection::Forward => Box::new(self.codes.iter()),
            ScanDirection::Backward => Box::new(self.codes.iter().rev()),
        }
    }
}

impl<'a> IntoIterator for &'a CodeList {
    type Item = &'a Code;
    type IntoIter = std::slice::Iter<'a, Code>;

    fn into_iter(self) -> Self::IntoIter {
        self.codes.iter()
    }
}

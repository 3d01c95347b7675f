use crate::codes::{Code, CodeList};
use crate::config::ScanConfig;
use crate::Result;
use std::path::Path;

/// Line filtering rules for a work list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeRules {
    /// Minimum number of non-empty dash-separated segments
    pub min_segments: usize,
}

impl Default for CodeRules {
    fn default() -> Self {
        Self { min_segments: 1 }
    }
}

impl From<&ScanConfig> for CodeRules {
    fn from(config: &ScanConfig) -> Self {
        Self {
            min_segments: config.min_segments,
        }
    }
}

/// Parses work-list text into a sorted, deduplicated code list
///
/// Blank lines, `#` comments and markdown code fences are ignored, and a
/// trailing ` # note` annotation is stripped from a code line. Lines with an
/// empty dash segment or too few segments are rejected and logged.
pub fn parse_codes(text: &str, rules: &CodeRules) -> CodeList {
    CodeList::from_codes(text.lines().filter_map(|line| match parse_line(line, rules)? {
        Ok(code) => Some(code),
        Err(rejected) => {
            tracing::warn!(
                "Skipping malformed code line {:?} (need {} non-empty dash segments)",
                rejected,
                rules.min_segments
            );
            None
        }
    }))
}

/// `None` for ignorable lines, `Some(Err(_))` for a rejected candidate
fn parse_line<'a>(line: &'a str, rules: &CodeRules) -> Option<std::result::Result<Code, &'a str>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with("```") {
        return None;
    }

    let candidate = match line.find(" #") {
        Some(idx) => line[..idx].trim_end(),
        None => line,
    };

    let segments = candidate.split('-').collect::<Vec<_>>();
    if segments.len() < rules.min_segments || segments.iter().any(|s| s.trim().is_empty()) {
        return Some(Err(candidate));
    }

    Some(Ok(Code::new(candidate)))
}

/// Reads a work list from disk
///
/// # Arguments
///
/// * `path` - Path to the newline-delimited code file
/// * `rules` - Filtering rules applied to every line
///
/// # Returns
///
/// * `Ok(CodeList)` - The sorted, deduplicated codes (possibly empty)
/// * `Err(HarvestError)` - The file could not be read
pub fn load_codes(path: &Path, rules: &CodeRules) -> Result<CodeList> {
    let text = std::fs::read_to_string(path)?;
    let codes = parse_codes(&text, rules);

    let candidate_lines = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with("```"))
        .count();

    tracing::info!(
        "Loaded {} codes from {} ({} lines skipped or duplicated)",
        codes.len(),
        path.display(),
        candidate_lines.saturating_sub(codes.len())
    );

    Ok(codes)
}

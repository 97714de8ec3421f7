//! Case references embedded in test titles.
//!
//! A test title references TestRail cases with tokens such as `C123` or
//! `TC123`. Every token found in the title contributes one case id.

use once_cell::sync::Lazy;
use regex::Regex;

static CASE_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bT?C(\d+)\b").expect("case id pattern is valid"));

/// Extract all case ids referenced by a test title, in order of appearance.
pub fn title_to_case_ids(title: &str) -> Vec<u64> {
    CASE_ID_PATTERN
        .captures_iter(title)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

/// Whether the title already carries at least one case reference.
pub fn has_case_reference(title: &str) -> bool {
    CASE_ID_PATTERN.is_match(title)
}

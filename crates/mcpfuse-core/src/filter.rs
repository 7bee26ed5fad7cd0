//! Glob-to-regex compilation for `include_tools`/`ignore_tools`.
//!
//! Only `*` is special, matching idiomatic usage of the `regex` crate
//! elsewhere in the corpus for glob-style filtering: the pattern is escaped
//! with [`regex::escape`] and `*` re-expanded to `.*`, then anchored and
//! compiled case-insensitive.

use regex::Regex;

use crate::error::{AggregatorError, AggregatorResult};

/// A compiled include/ignore filter for one upstream's tool catalogue.
#[derive(Debug, Clone)]
pub struct ToolFilter {
    include: Vec<Regex>,
    ignore: Vec<Regex>,
}

fn compile_glob(pattern: &str) -> AggregatorResult<Regex> {
    let escaped = regex::escape(pattern).replace("\\*", ".*");
    let anchored = format!("(?i)^{escaped}$");
    Regex::new(&anchored).map_err(|source| AggregatorError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

impl ToolFilter {
    pub fn compile(include: &[String], ignore: &[String]) -> AggregatorResult<Self> {
        Ok(Self {
            include: include.iter().map(|p| compile_glob(p)).collect::<AggregatorResult<_>>()?,
            ignore: ignore.iter().map(|p| compile_glob(p)).collect::<AggregatorResult<_>>()?,
        })
    }

    /// A tool passes when the include list is empty or the name matches
    /// some include pattern, and the name matches no ignore pattern.
    pub fn allows(&self, tool_name: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|re| re.is_match(tool_name));
        let ignored = self.ignore.iter().any(|re| re.is_match(tool_name));
        included && !ignored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_include_allows_everything_not_ignored() {
        let filter = ToolFilter::compile(&[], &[]).unwrap();
        assert!(filter.allows("anything"));
    }

    #[test]
    fn include_glob_restricts_to_matches() {
        let filter = ToolFilter::compile(&["fs_*".to_string()], &[]).unwrap();
        assert!(filter.allows("fs_read"));
        assert!(!filter.allows("net_fetch"));
    }

    #[test]
    fn ignore_glob_excludes_matches_even_if_included() {
        let filter = ToolFilter::compile(&["fs_*".to_string()], &["fs_delete".to_string()]).unwrap();
        assert!(filter.allows("fs_read"));
        assert!(!filter.allows("fs_delete"));
    }

    #[test]
    fn matching_is_case_insensitive_and_anchored() {
        let filter = ToolFilter::compile(&["Fs_*".to_string()], &[]).unwrap();
        assert!(filter.allows("fs_read"));
        assert!(!filter.allows("prefix_fs_read"));
    }
}

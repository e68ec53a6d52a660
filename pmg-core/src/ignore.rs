//! Ignore rules applied by the change detector.
//!
//! A working-tree-relative path is ignored when it is the internal state
//! directory, equals a pattern, sits under a directory named by a pattern,
//! or has any path component equal to a pattern.

use crate::error::Result;
use crate::workspace::STATE_DIR;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    patterns: Vec<String>,
}

impl IgnoreRules {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .filter_map(|p| normalize_pattern(p.as_ref()))
            .collect();
        Self { patterns }
    }

    /// Parse ignore-file contents: one pattern per line, `#` starts a comment line.
    pub fn parse(contents: &str) -> Self {
        Self::new(
            contents
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#')),
        )
    }

    /// Load rules from an ignore file. A missing file yields no patterns.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether a `/`-separated working-tree-relative path is ignored.
    pub fn is_ignored(&self, rel_path: &str) -> bool {
        let path = rel_path.trim_start_matches("./").trim_end_matches('/');
        if path.is_empty() {
            return false;
        }
        if path.split('/').next() == Some(STATE_DIR) {
            return true;
        }
        self.patterns.iter().any(|pattern| {
            path == pattern
                || path
                    .strip_prefix(pattern.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
                || path.split('/').any(|c| c == pattern)
        })
    }
}

fn normalize_pattern(raw: &str) -> Option<String> {
    let p = raw.trim().trim_start_matches("./").trim_end_matches('/');
    if p.is_empty() {
        None
    } else {
        Some(p.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_state_dir_always_ignored() {
        let rules = IgnoreRules::default();
        assert!(rules.is_ignored(".pmg"));
        assert!(rules.is_ignored(".pmg/vcs.db"));
        assert!(!rules.is_ignored("src/.pmgx"));
    }

    #[test]
    fn test_exact_match() {
        let rules = IgnoreRules::new(["secret.env"]);
        assert!(rules.is_ignored("secret.env"));
        assert!(!rules.is_ignored("secret.env.bak"));
    }

    #[test]
    fn test_directory_prefix() {
        let rules = IgnoreRules::new(["build/"]);
        assert!(rules.is_ignored("build/out.o"));
        assert!(rules.is_ignored("build/nested/deep.o"));
        assert!(!rules.is_ignored("buildscript.sh"));
    }

    #[test]
    fn test_component_match_at_any_depth() {
        let rules = IgnoreRules::new(["node_modules"]);
        assert!(rules.is_ignored("web/node_modules/pkg/index.js"));
        assert!(rules.is_ignored("node_modules"));
        assert!(!rules.is_ignored("web/node_modules_backup/a.js"));
    }

    #[test]
    fn test_multi_component_pattern_is_prefix_only() {
        let rules = IgnoreRules::new(["docs/drafts"]);
        assert!(rules.is_ignored("docs/drafts/a.md"));
        assert!(!rules.is_ignored("other/docs/drafts/a.md"));
    }

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let rules = IgnoreRules::parse("# comment\n\n./target/\n  *.log  \n");
        assert_eq!(rules.patterns(), &["target".to_string(), "*.log".to_string()]);
    }

    #[test]
    fn test_load_missing_file() {
        let tmp = TempDir::new().unwrap();
        let rules = IgnoreRules::load(&tmp.path().join(".pmgignore")).unwrap();
        assert!(rules.patterns().is_empty());
    }
}

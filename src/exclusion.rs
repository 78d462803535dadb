use glob::{MatchOptions, Pattern};
use std::path::Path;
use tracing::error;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Compiled exclusion patterns for one scan pass.
///
/// Patterns use glob syntax where both `*` and `%` match any run of
/// characters (separators included) and `?` matches one character.
/// Brackets are taken literally. Matching is case-insensitive and runs
/// against the whole path.
#[derive(Debug, Default, Clone)]
pub struct ExclusionMatcher {
    patterns: Vec<Pattern>,
}

impl ExclusionMatcher {
    /// Patterns that fail to compile are logged and dropped so that a bad
    /// row never blocks traversal.
    pub fn new<S: AsRef<str>>(raw_patterns: &[S]) -> Self {
        let patterns = raw_patterns
            .iter()
            .map(|raw| raw.as_ref().trim())
            .filter(|raw| !raw.is_empty())
            .filter_map(|raw| match Pattern::new(&translate(raw)) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    error!("Invalid exclusion pattern '{}': {}", raw, e);
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        let candidate = path.to_string_lossy();
        self.patterns
            .iter()
            .any(|pattern| pattern.matches_with(&candidate, MATCH_OPTIONS))
    }
}

/// One-shot form of [`ExclusionMatcher::is_excluded`].
pub fn is_excluded<S: AsRef<str>>(path: &Path, patterns: &[S]) -> bool {
    ExclusionMatcher::new(patterns).is_excluded(path)
}

/// Rewrites a stored pattern into glob syntax. A run of `%`/`*` becomes a
/// single `*`, since glob only accepts `**` as a whole path component.
fn translate(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' | '*' if out.ends_with('*') => {}
            '%' | '*' => out.push('*'),
            '[' => out.push_str("[[]"),
            ']' => out.push_str("[]]"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_and_percent_are_equivalent() {
        let star = ExclusionMatcher::new(&["*/B"]);
        let percent = ExclusionMatcher::new(&["%/B"]);
        for matcher in [&star, &percent] {
            assert!(matcher.is_excluded(Path::new("/share/root/B")));
            assert!(!matcher.is_excluded(Path::new("/share/root/A")));
            assert!(!matcher.is_excluded(Path::new("/share/root/B/child")));
        }
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let matcher = ExclusionMatcher::new(&["*/$RECYCLE.BIN*", "*/system volume information"]);
        assert!(matcher.is_excluded(Path::new("/share/$Recycle.Bin")));
        assert!(matcher.is_excluded(Path::new("/share/System Volume Information")));
    }

    #[test]
    fn test_wildcard_crosses_separators() {
        let matcher = ExclusionMatcher::new(&["/share/archive%"]);
        assert!(matcher.is_excluded(Path::new("/share/archive")));
        assert!(matcher.is_excluded(Path::new("/share/archive/2019/q1")));
        assert!(!matcher.is_excluded(Path::new("/share/current/archive")));
    }

    #[test]
    fn test_brackets_are_literal() {
        let matcher = ExclusionMatcher::new(&["*/[old]*"]);
        assert!(matcher.is_excluded(Path::new("/share/[old] reports")));
        assert!(!matcher.is_excluded(Path::new("/share/o")));
    }

    #[test]
    fn test_blank_patterns_ignored() {
        let matcher = ExclusionMatcher::new(&["", "   "]);
        assert!(matcher.is_empty());
        assert!(!matcher.is_excluded(Path::new("/anything")));
        assert!(!is_excluded(Path::new("/anything"), &Vec::<String>::new()));
    }

    #[test]
    fn test_adjacent_wildcards_collapse() {
        let matcher = ExclusionMatcher::new(&["*%", "/fs/T%%", "%a*%"]);
        assert_eq!(matcher.len(), 3);
        assert!(matcher.is_excluded(Path::new("/fs/T/deep/down")));
        assert!(matcher.is_excluded(Path::new("/srv/data")));
        assert_eq!(translate("/fs/T%%"), "/fs/T*");
        assert_eq!(translate("%a*%"), "*a*");
    }

    #[test]
    fn test_one_shot_helper() {
        assert!(is_excluded(Path::new("/data/tmp"), &["*/TMP".to_string()]));
    }
}

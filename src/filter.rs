//! Name patterns and path prefix filters
//!
//! `NamePattern` is checked against file names while the index is built, so
//! non-matching files are never kept. `PathFilter` runs on resolved paths as
//! they leave the resolver.

use crate::error::Result;
use regex::{Regex, RegexBuilder};

/// Case-insensitive file name predicate
#[derive(Debug, Clone)]
pub struct NamePattern {
    regex: Regex,
}

impl NamePattern {
    /// Compile a regular expression (unanchored, like `Regex::is_match`)
    pub fn regex(pattern: &str) -> Result<Self> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self { regex })
    }

    /// Compile a wildcard pattern where `*` matches any run and `?` one char.
    /// The whole name must match.
    pub fn glob(pattern: &str) -> Result<Self> {
        let mut source = String::with_capacity(pattern.len() * 2 + 2);
        source.push('^');
        for c in pattern.chars() {
            match c {
                '*' => source.push_str(".*"),
                '?' => source.push('.'),
                c => source.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
            }
        }
        source.push('$');
        Self::regex(&source)
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// Case-insensitive prefix filter over full paths. Empty passes everything.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    prefixes: Vec<String>,
}

impl PathFilter {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    pub fn matches(&self, path: &str) -> bool {
        if self.prefixes.is_empty() {
            return true;
        }
        let lower = path.to_lowercase();
        self.prefixes.iter().any(|prefix| lower.starts_with(prefix.as_str()))
    }
}

/// Lazily drop every path the filter rejects
pub fn filter_paths<'f, I>(paths: I, filter: &'f PathFilter) -> impl Iterator<Item = String> + 'f
where
    I: IntoIterator<Item = String>,
    I::IntoIter: 'f,
{
    paths.into_iter().filter(move |path| filter.matches(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_prefix_match_ignores_case() {
        let filter = PathFilter::new([r"C:\Shows", r"d:\MOVIES\"]);
        assert!(filter.matches(r"c:\shows\s01e01.mkv"));
        assert!(filter.matches(r"D:\Movies\heat.mkv"));
        assert!(!filter.matches(r"C:\Windows\notepad.exe"));
    }

    #[test]
    fn test_empty_filter_passes_everything() {
        let filter = PathFilter::new(Vec::<String>::new());
        assert!(filter.is_empty());
        assert!(filter.matches(r"C:\anything"));

        // blank prefixes do not count as constraints
        assert!(PathFilter::new([""]).is_empty());
    }

    #[test]
    fn test_glob_pattern() {
        let pattern = NamePattern::glob("*.MKV").unwrap();
        assert!(pattern.is_match("s01e01.mkv"));
        assert!(!pattern.is_match("s01e01.mkv.part"));

        let pattern = NamePattern::glob("s0?e01.(1).srt").unwrap();
        assert!(pattern.is_match("S01E01.(1).srt"));
        assert!(!pattern.is_match("s01e01x(1).srt"));
    }

    #[test]
    fn test_regex_pattern() {
        let pattern = NamePattern::regex(r"s\d{2}e\d{2}").unwrap();
        assert!(pattern.is_match("Show.S02E10.720p.mkv"));
        assert!(NamePattern::regex("(unclosed").is_err());
    }

    #[test]
    fn test_filter_paths_is_lazy_sequence() {
        let filter = PathFilter::new([r"C:\Shows"]);
        let paths = vec![r"C:\Shows\a.mkv".to_string(), r"C:\Other\b.mkv".to_string()];
        let kept: Vec<_> = filter_paths(paths, &filter).collect();
        assert_eq!(kept, [r"C:\Shows\a.mkv"]);
    }

    proptest! {
        #[test]
        fn prop_filter_is_idempotent(
            paths in prop::collection::vec(r"[A-Da-d]:\\[A-Za-z\\]{0,12}", 0..30),
            prefixes in prop::collection::vec(r"[A-Da-d]:\\[A-Za-z]{0,3}", 0..4),
        ) {
            let filter = PathFilter::new(&prefixes);
            let once: Vec<_> = filter_paths(paths, &filter).collect();
            let twice: Vec<_> = filter_paths(once.clone(), &filter).collect();
            prop_assert_eq!(once, twice);
        }
    }
}

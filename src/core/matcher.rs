//! Glob pattern matching for file paths.
//!
//! Patterns use shell-style syntax: `*` and `?` stay inside one path
//! component, `**` crosses directories, `[...]` is a character class and
//! `{a,b}` expands to alternatives. A pattern without a `/` is matched
//! against the file name only, so `*.md` also matches `docs/readme.md`.

use crate::core::error::{Error, Result};
use globset::{GlobBuilder, GlobMatcher};

/// Options that affect how a pattern is compiled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchOptions {
    /// Match regardless of ASCII/Unicode case.
    pub case_insensitive: bool,
}

/// A compiled glob pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    matcher: GlobMatcher,
    basename_only: bool,
}

impl Pattern {
    /// Compiles a case-sensitive pattern.
    pub fn new(glob: &str) -> Result<Self> {
        Self::with_options(glob, MatchOptions::default())
    }

    /// Compiles a pattern with explicit options.
    pub fn with_options(glob: &str, options: MatchOptions) -> Result<Self> {
        if glob.trim().is_empty() {
            return Err(Error::invalid_pattern(glob, "pattern is empty"));
        }

        let matcher = GlobBuilder::new(glob)
            .literal_separator(true)
            .backslash_escape(true)
            .case_insensitive(options.case_insensitive)
            .build()
            .map_err(|e| Error::invalid_pattern(glob, e.kind().to_string()))?
            .compile_matcher();

        Ok(Self {
            source: glob.to_string(),
            matcher,
            basename_only: !glob.contains('/'),
        })
    }

    /// Returns the pattern as written in the configuration.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Tests a path that has already gone through [`normalize_path`].
    #[must_use]
    pub fn is_match(&self, path: &str) -> bool {
        if self.basename_only {
            let name = path.rsplit('/').next().unwrap_or(path);
            self.matcher.is_match(name)
        } else {
            self.matcher.is_match(path)
        }
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

/// Normalizes a path to forward slashes with no `.` or empty segments.
///
/// `.\src\\lib.rs` and `./src/lib.rs` both become `src/lib.rs`. A leading
/// `/` is kept so absolute paths stay absolute.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let absolute = unified.starts_with('/');

    let joined = unified
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/");

    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("*.md", "a.md", true)]
    #[case("*.md", "docs/a.md", true)]
    #[case("*.md", "a.mdx", false)]
    #[case("*.md", "a.MD", false)]
    #[case("**/*.{md,mdx}", "docs/readme.md", true)]
    #[case("**/*.{md,mdx}", "docs/guide.mdx", true)]
    #[case("**/*.{md,mdx}", "readme.md", true)]
    #[case("**/*.{md,mdx}", "src/index.ts", false)]
    #[case("src/*.ts", "src/index.ts", true)]
    #[case("src/*.ts", "src/nested/index.ts", false)]
    #[case("src/**/*.ts", "src/nested/deep/index.ts", true)]
    #[case("*.{js,ts}", "packages/a/b.ts", true)]
    #[case("?.py", "a.py", true)]
    #[case("?.py", "ab.py", false)]
    #[case("[ab].txt", "b.txt", true)]
    #[case("[ab].txt", "c.txt", false)]
    #[case("docs/*", "docs/a/b.md", false)]
    fn test_pattern_matching(#[case] glob: &str, #[case] path: &str, #[case] expected: bool) {
        let pattern = Pattern::new(glob).expect("valid pattern");
        assert_eq!(
            pattern.is_match(path),
            expected,
            "{glob} against {path}"
        );
    }

    #[test]
    fn test_case_insensitive_option() {
        let pattern = Pattern::with_options(
            "*.md",
            MatchOptions {
                case_insensitive: true,
            },
        )
        .expect("valid pattern");
        assert!(pattern.is_match("README.MD"));
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("*.{md")]
    #[case("[abc")]
    fn test_invalid_patterns(#[case] glob: &str) {
        let err = Pattern::new(glob).expect_err("should fail");
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }

    #[test]
    fn test_display_is_source() {
        let pattern = Pattern::new("**/*.{md,mdx}").expect("valid pattern");
        assert_eq!(pattern.to_string(), "**/*.{md,mdx}");
        assert_eq!(pattern.as_str(), "**/*.{md,mdx}");
    }

    #[rstest]
    #[case("src/lib.rs", "src/lib.rs")]
    #[case("./src/lib.rs", "src/lib.rs")]
    #[case(".\\src\\lib.rs", "src/lib.rs")]
    #[case("src//nested///a.md", "src/nested/a.md")]
    #[case("/abs/path.md", "/abs/path.md")]
    #[case("a.md", "a.md")]
    fn test_normalize_path(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_path(input), expected);
    }

    #[test]
    fn test_separator_convention_does_not_change_match() {
        let pattern = Pattern::new("src/**/*.ts").expect("valid pattern");
        assert_eq!(
            pattern.is_match(&normalize_path("src\\app\\main.ts")),
            pattern.is_match(&normalize_path("src/app/main.ts"))
        );
    }
}

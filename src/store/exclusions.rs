/// Exclusion patterns for captured sandbox trees
///
/// File patterns match a file's name only. Path patterns are matched against
/// the path relative to the sandbox root, anchored on the right: a pattern
/// with `k` components matches the last `k` components of the path. A
/// directory matching a path pattern is excluded together with its subtree.
use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use std::path::Path;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    files: Vec<Pattern>,
    paths: Vec<Vec<Pattern>>,
}

impl Exclusions {
    /// Compile file-name and path glob lists.
    pub fn new<F, P>(ignore_files: &[F], ignore_paths: &[P]) -> Result<Self>
    where
        F: AsRef<str>,
        P: AsRef<str>,
    {
        let files = ignore_files
            .iter()
            .map(|p| p.as_ref())
            .filter(|p| !p.is_empty())
            .map(|p| Pattern::new(p).with_context(|| format!("Invalid file pattern: {p}")))
            .collect::<Result<Vec<_>>>()?;

        let mut paths = Vec::new();
        for raw in ignore_paths.iter().map(|p| p.as_ref()) {
            let trimmed = raw.trim_end_matches('/');
            if trimmed.is_empty() {
                continue;
            }
            let components = trimmed
                .split('/')
                .filter(|c| !c.is_empty())
                .map(|c| Pattern::new(c).with_context(|| format!("Invalid path pattern: {raw}")))
                .collect::<Result<Vec<_>>>()?;
            paths.push(components);
        }

        Ok(Self { files, paths })
    }

    /// Nothing excluded
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.paths.is_empty()
    }

    /// True if a file named `name` is excluded by a file pattern.
    pub fn excludes_file_name(&self, name: &str) -> bool {
        self.files
            .iter()
            .any(|pattern| pattern.matches_with(name, MATCH_OPTIONS))
    }

    /// True if `rel_path` is excluded by a path pattern.
    pub fn excludes_path(&self, rel_path: &Path) -> bool {
        let components: Vec<String> = rel_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if components.is_empty() {
            return false;
        }

        self.paths.iter().any(|pattern| {
            pattern.len() <= components.len()
                && pattern
                    .iter()
                    .rev()
                    .zip(components.iter().rev())
                    .all(|(p, c)| p.matches_with(c, MATCH_OPTIONS))
        })
    }

    /// True if the file at `rel_path` must not be captured.
    pub fn excludes(&self, rel_path: &Path) -> bool {
        let name_excluded = rel_path
            .file_name()
            .is_some_and(|name| self.excludes_file_name(&name.to_string_lossy()));
        name_excluded || self.excludes_path(rel_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: [&str; 0] = [];

    #[test]
    fn test_file_patterns_match_names_only() {
        let ex = Exclusions::new(&["_submit.sh", "file?.txt"], &NONE).unwrap();
        assert!(ex.excludes(Path::new("_submit.sh")));
        assert!(ex.excludes(Path::new("file1.txt")));
        assert!(ex.excludes(Path::new("my/subfolder/file3.txt")));
        assert!(!ex.excludes(Path::new("file10.txt")));
        assert!(!ex.excludes(Path::new("diff.out")));
    }

    #[test]
    fn test_path_patterns_are_right_anchored() {
        let ex = Exclusions::new(&NONE, &["my/subfolder"]).unwrap();
        assert!(ex.excludes_path(Path::new("my/subfolder")));
        assert!(ex.excludes_path(Path::new("outer/my/subfolder")));
        assert!(!ex.excludes_path(Path::new("my")));
        assert!(!ex.excludes_path(Path::new("my/subfolder/file3.txt")));
    }

    #[test]
    fn test_star_matches_everything() {
        let ex = Exclusions::new(&NONE, &["*"]).unwrap();
        assert!(ex.excludes_path(Path::new("_submit.sh")));
        assert!(ex.excludes_path(Path::new("my")));
        assert!(ex.excludes_path(Path::new("my/subfolder/file3.txt")));
    }

    #[test]
    fn test_trailing_slash_is_ignored() {
        let ex = Exclusions::new(&NONE, &["my/"]).unwrap();
        assert!(ex.excludes_path(Path::new("my")));
        assert!(!ex.excludes_path(Path::new("file1.txt")));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        assert!(Exclusions::new(&["[unclosed"], &NONE).is_err());
        assert!(Exclusions::new(&NONE, &["a/[b"]).is_err());
    }

    #[test]
    fn test_empty_patterns_are_skipped() {
        let ex = Exclusions::new(&[""], &["", "/"]).unwrap();
        assert!(ex.is_empty());
        assert!(!ex.excludes(Path::new("anything")));
    }
}

//! Filesystem glob resolution
//!
//! Implements [`PathLister`] over the real filesystem. A pattern is split
//! into its literal directory prefix and a glob remainder; the prefix
//! directory is walked (bounded by the remainder's depth unless it contains
//! `**`) and relative paths are matched with `globset`. Results come back
//! sorted by path.
//!
//! As in the shell, wildcards do not match a leading `.`: hidden entries
//! are only found by a pattern component that itself starts with `.`.
//! Dangling symlinks are entries like any other; they never abort a walk.

use globset::GlobBuilder;
use slurmer_sweep::PathLister;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Characters that make a path component a glob.
const GLOB_META: &[char] = &['*', '?', '[', '{'];

/// Path lister backed by the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FsPaths {
    /// Directory relative patterns are evaluated in (default: current dir)
    base: Option<PathBuf>,
}

impl FsPaths {
    /// Lister evaluating relative patterns in the current directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lister evaluating relative patterns in `base`.
    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }

    /// Whether at least one entry matches `pattern`.
    pub fn any_match(&self, pattern: &str) -> io::Result<bool> {
        Ok(!self.list(pattern, None)?.is_empty())
    }

    fn resolve_root(&self, root_dir: Option<&str>) -> PathBuf {
        let base = self.base.clone().unwrap_or_else(|| PathBuf::from("."));
        match root_dir {
            Some(dir) => base.join(expand_home(dir)),
            None => base,
        }
    }
}

/// Whether a pattern contains glob metacharacters.
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(GLOB_META)
}

/// Expand a leading `~` to `$HOME`.
pub fn expand_home(path: &str) -> String {
    let home = match std::env::var("HOME") {
        Ok(home) => home,
        Err(_) => return path.to_string(),
    };
    if path == "~" {
        home
    } else if let Some(rest) = path.strip_prefix("~/") {
        format!("{}/{}", home.trim_end_matches('/'), rest)
    } else {
        path.to_string()
    }
}

impl PathLister for FsPaths {
    fn list(&self, pattern: &str, root_dir: Option<&str>) -> io::Result<Vec<String>> {
        let pattern = expand_home(pattern);
        let root = self.resolve_root(root_dir);

        if !is_glob(&pattern) {
            let exists = root.join(&pattern).symlink_metadata().is_ok();
            return Ok(if exists { vec![pattern] } else { Vec::new() });
        }

        let parts: Vec<&str> = pattern.split('/').collect();
        let literal_len = parts.iter().take_while(|p| !is_glob(p)).count();
        let mut prefix = parts[..literal_len].join("/");
        if prefix.is_empty() && pattern.starts_with('/') {
            prefix = "/".to_string();
        }
        let rest = parts[literal_len..].join("/");

        let dir = if prefix.is_empty() {
            root.clone()
        } else {
            root.join(&prefix)
        };
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let matcher = GlobBuilder::new(&rest)
            .literal_separator(true)
            .build()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?
            .compile_matcher();

        let mut walker = WalkDir::new(&dir)
            .min_depth(1)
            .follow_links(true)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()));
        if !rest.contains("**") {
            walker = walker.max_depth(parts.len() - literal_len);
        }

        let components: Vec<&str> = rest.split('/').collect();
        let mut matches = Vec::new();
        for entry in walker {
            let path = match entry {
                Ok(entry) => entry.into_path(),
                Err(err) => broken_link(err)?,
            };
            let rel = match path.strip_prefix(&dir) {
                Ok(rel) => to_slash(rel),
                Err(_) => continue,
            };
            if !matcher.is_match(&rel) || !hidden_allowed(&rel, &components) {
                continue;
            }
            matches.push(match prefix.as_str() {
                "" => rel,
                "/" => format!("/{}", rel),
                p => format!("{}/{}", p, rel),
            });
        }

        matches.sort();
        log::trace!("glob '{}' matched {} path(s)", pattern, matches.len());
        Ok(matches)
    }
}

/// Path of a symlink the walker could not follow; other errors pass through.
fn broken_link(err: walkdir::Error) -> io::Result<PathBuf> {
    let link = err
        .path()
        .filter(|p| p.symlink_metadata().map_or(false, |meta| meta.file_type().is_symlink()))
        .map(Path::to_path_buf);
    match link {
        Some(path) => {
            log::debug!("not following broken link {}", path.display());
            Ok(path)
        }
        None => Err(io::Error::from(err)),
    }
}

/// Whether every hidden component of `rel` is matched by a pattern
/// component starting with `.`.
///
/// Components before a `**` align from the front, those after it from the
/// back. `**` itself never matches a hidden component.
fn hidden_allowed(rel: &str, pattern: &[&str]) -> bool {
    let parts: Vec<&str> = rel.split('/').collect();
    let recursive = pattern.iter().position(|c| *c == "**");

    parts.iter().enumerate().all(|(i, part)| {
        if !part.starts_with('.') {
            return true;
        }
        let aligned = match recursive {
            None => pattern.get(i),
            Some(k) if i < k => pattern.get(i),
            Some(k) => {
                let from_end = parts.len() - 1 - i;
                let tail = pattern.len() - 1 - k;
                if from_end < tail {
                    pattern.get(pattern.len() - 1 - from_end)
                } else {
                    None
                }
            }
        };
        aligned.map_or(false, |c| c.starts_with('.'))
    })
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tree(files: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for f in files {
            let path = dir.path().join(f);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"").unwrap();
        }
        dir
    }

    #[test]
    fn test_literal_path() {
        let dir = tree(&["a.done"]);
        let paths = FsPaths::with_base(dir.path());
        assert_eq!(paths.list("a.done", None).unwrap(), vec!["a.done"]);
        assert!(paths.list("b.done", None).unwrap().is_empty());
    }

    #[test]
    fn test_glob_in_subdirectory() {
        let dir = tree(&["data/b.csv", "data/a.csv", "data/c.txt", "data/nested/d.csv"]);
        let paths = FsPaths::with_base(dir.path());
        assert_eq!(
            paths.list("data/*.csv", None).unwrap(),
            vec!["data/a.csv", "data/b.csv"]
        );
    }

    #[test]
    fn test_recursive_glob() {
        let dir = tree(&["data/a.csv", "data/nested/d.csv"]);
        let paths = FsPaths::with_base(dir.path());
        assert_eq!(
            paths.list("data/**/*.csv", None).unwrap(),
            vec!["data/a.csv", "data/nested/d.csv"]
        );
    }

    #[test]
    fn test_root_dir_results_are_relative() {
        let dir = tree(&["proj/runs/x.cfg", "proj/runs/y.cfg"]);
        let paths = FsPaths::with_base(dir.path());
        assert_eq!(
            paths.list("runs/*.cfg", Some("proj")).unwrap(),
            vec!["runs/x.cfg", "runs/y.cfg"]
        );
    }

    #[test]
    fn test_absolute_pattern() {
        let dir = tree(&["out/1.done"]);
        let pattern = format!("{}/out/*.done", dir.path().display());
        let found = FsPaths::new().list(&pattern, None).unwrap();
        assert_eq!(found, vec![format!("{}/out/1.done", dir.path().display())]);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tree(&[]);
        let paths = FsPaths::with_base(dir.path());
        assert!(paths.list("nope/*.csv", None).unwrap().is_empty());
        assert!(!paths.any_match("nope/*").unwrap());
    }

    #[test]
    fn test_invalid_glob_is_error() {
        let dir = tree(&["x"]);
        let paths = FsPaths::with_base(dir.path());
        assert!(paths.list("[a", None).is_err());
    }

    #[test]
    fn test_wildcards_skip_hidden_entries() {
        let dir = tree(&["data/a.csv", "data/.x.csv", "data/.cache/b.csv", "data/sub/c.csv"]);
        let paths = FsPaths::with_base(dir.path());
        assert_eq!(paths.list("data/*.csv", None).unwrap(), vec!["data/a.csv"]);
        assert_eq!(paths.list("data/.*.csv", None).unwrap(), vec!["data/.x.csv"]);
        assert_eq!(
            paths.list("data/**/*.csv", None).unwrap(),
            vec!["data/a.csv", "data/sub/c.csv"]
        );
        assert_eq!(paths.list("data/.cache/*.csv", None).unwrap(), vec!["data/.cache/b.csv"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_does_not_abort_walk() {
        let dir = tree(&["out/1.done"]);
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("out/stale.lnk")).unwrap();
        let paths = FsPaths::with_base(dir.path());

        assert_eq!(paths.list("out/*.done", None).unwrap(), vec!["out/1.done"]);
        assert_eq!(paths.list("out/*.lnk", None).unwrap(), vec!["out/stale.lnk"]);
        assert_eq!(paths.list("out/stale.lnk", None).unwrap(), vec!["out/stale.lnk"]);
    }

    #[test]
    fn test_expand_home() {
        if let Ok(home) = std::env::var("HOME") {
            assert_eq!(expand_home("~"), home);
            assert!(expand_home("~/x").ends_with("/x"));
        }
        assert_eq!(expand_home("/abs/~"), "/abs/~");
    }
}

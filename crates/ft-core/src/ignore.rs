//! Persisted set of applications excluded from tracking.
//!
//! The file is line oriented: blank lines and lines starting with `#` are
//! comments, every other trimmed line is one application identifier.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

const HEADER: &str = "\
# Ignored applications
# One application identifier (WM class) per line
# Lines starting with # are comments
";

/// Ignore-list persistence errors.
#[derive(Debug, Error)]
pub enum IgnoreListError {
    #[error("failed to read ignore list {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write ignore list {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Application identifiers that never produce sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreList {
    path: Option<PathBuf>,
    apps: BTreeSet<String>,
}

impl IgnoreList {
    /// An in-memory list that is never written to disk.
    pub fn in_memory<I, S>(apps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: None,
            apps: apps.into_iter().map(Into::into).collect(),
        }
    }

    /// Loads the list stored at `path`.
    ///
    /// A missing file yields an empty list bound to `path`.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, IgnoreListError> {
        let path = path.into();
        let apps = match fs::read_to_string(&path) {
            Ok(content) => parse(&content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeSet::new(),
            Err(source) => return Err(IgnoreListError::Read { path, source }),
        };
        tracing::debug!(path = %path.display(), count = apps.len(), "loaded ignore list");
        Ok(Self {
            path: Some(path),
            apps,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn contains(&self, application_id: &str) -> bool {
        self.apps.contains(application_id)
    }

    /// Adds an identifier. Returns `false` if it was already present.
    pub fn insert(&mut self, application_id: impl Into<String>) -> bool {
        self.apps.insert(application_id.into())
    }

    /// Removes an identifier. Returns `false` if it was not present.
    pub fn remove(&mut self, application_id: &str) -> bool {
        self.apps.remove(application_id)
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// Identifiers in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.apps.iter().map(String::as_str)
    }

    /// File contents for the current set: header, blank line, one id per line.
    pub fn render(&self) -> String {
        let mut out = String::from(HEADER);
        out.push('\n');
        for app in &self.apps {
            out.push_str(app);
            out.push('\n');
        }
        out
    }

    /// Writes the list to its backing file. In-memory lists are a no-op.
    pub fn save(&self) -> Result<(), IgnoreListError> {
        match &self.path {
            Some(path) => write_rendered(path, &self.render()),
            None => Ok(()),
        }
    }
}

/// Writes already rendered contents, creating the parent directory.
///
/// Contents go to a sibling temp file first and are renamed into place, so
/// a concurrent reader never sees a half-written list.
pub fn write_rendered(path: &Path, contents: &str) -> Result<(), IgnoreListError> {
    let write = || -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, path)
    };
    write().map_err(|source| IgnoreListError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn parse(content: &str) -> BTreeSet<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ignore");
        let list = IgnoreList::load(&path).unwrap();
        assert!(list.is_empty());
        assert_eq!(list.path(), Some(path.as_path()));
    }

    #[test]
    fn load_skips_comments_and_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ignore");
        fs::write(
            &path,
            "# header\n\n  steam  \n#not-an-app\nspotify\n\n   \nsteam\n",
        )
        .unwrap();

        let list = IgnoreList::load(&path).unwrap();
        assert_eq!(list.iter().collect::<Vec<_>>(), vec!["spotify", "steam"]);
        assert!(list.contains("steam"));
        assert!(!list.contains("#not-an-app"));
    }

    #[test]
    fn render_writes_header_then_sorted_ids() {
        let list = IgnoreList::in_memory(["zoom", "Steam", "discord"]);
        assert_snapshot!(list.render(), @r"
        # Ignored applications
        # One application identifier (WM class) per line
        # Lines starting with # are comments

        Steam
        discord
        zoom
        ");
    }

    #[test]
    fn save_then_load_preserves_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ignore");

        let mut list = IgnoreList::load(&path).unwrap();
        assert!(list.insert("steam"));
        assert!(!list.insert("steam"));
        assert!(list.insert("spotify"));
        list.save().unwrap();

        let reloaded = IgnoreList::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains("steam"));
        assert!(reloaded.contains("spotify"));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn remove_reports_presence() {
        let mut list = IgnoreList::in_memory(["steam"]);
        assert!(list.remove("steam"));
        assert!(!list.remove("steam"));
        assert!(list.is_empty());
    }

    #[test]
    fn in_memory_save_is_noop() {
        let list = IgnoreList::in_memory(["steam"]);
        list.save().unwrap();
        assert!(list.path().is_none());
    }
}

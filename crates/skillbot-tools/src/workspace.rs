//! The directory tree tools are confined to.

use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::ToolError;

/// Chained dangling links followed before giving up.
const MAX_LINK_DEPTH: usize = 8;

/// A canonical root directory. Every path a tool touches is resolved
/// against it and must stay inside it.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// `root` must exist; it is canonicalized once here.
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref().canonicalize()?;
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", root.display()),
            ));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a tool-supplied path relative to the root.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        self.resolve_from(&self.root, path)
    }

    /// Resolve `path` relative to `base` (itself inside the root).
    ///
    /// `..` is applied lexically first; the deepest existing entry is
    /// then canonicalized so symlinks cannot lead outside the root. A
    /// dangling symlink is followed through its target, which must itself
    /// resolve inside the root.
    pub fn resolve_from(&self, base: &Path, path: &str) -> Result<PathBuf, ToolError> {
        self.resolve_within(base, Path::new(path), path, 0)
    }

    fn resolve_within(
        &self,
        base: &Path,
        path: &Path,
        requested: &str,
        depth: usize,
    ) -> Result<PathBuf, ToolError> {
        if depth > MAX_LINK_DEPTH {
            return Err(ToolError::Io(format!("{requested}: too many levels of symbolic links")));
        }
        let candidate = self.contain_path(base, path, requested)?;

        // symlink_metadata does not follow links, so a dangling link stops the walk.
        let mut existing = candidate.as_path();
        let mut rest = Vec::new();
        while std::fs::symlink_metadata(existing).is_err() {
            match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    rest.push(name.to_os_string());
                    existing = parent;
                }
                _ => break,
            }
        }

        let mut real = match existing.canonicalize() {
            Ok(real) => real,
            Err(_) if is_symlink(existing) => {
                let target = std::fs::read_link(existing)
                    .map_err(|e| ToolError::Io(format!("{}: {e}", existing.display())))?;
                let parent = existing
                    .parent()
                    .unwrap_or(self.root.as_path())
                    .canonicalize()
                    .map_err(|e| ToolError::Io(format!("{}: {e}", existing.display())))?;
                if !parent.starts_with(&self.root) {
                    return Err(ToolError::PathEscape(requested.to_string()));
                }
                self.resolve_within(&parent, &target, requested, depth + 1)?
            }
            Err(e) => return Err(ToolError::Io(format!("{}: {e}", existing.display()))),
        };
        if !real.starts_with(&self.root) {
            return Err(ToolError::PathEscape(requested.to_string()));
        }
        for name in rest.into_iter().rev() {
            real.push(name);
        }
        Ok(real)
    }

    /// Purely lexical containment check, for paths that may never exist
    /// on disk (such as shell arguments).
    pub fn contain(&self, base: &Path, path: &str) -> Result<PathBuf, ToolError> {
        self.contain_path(base, Path::new(path), path)
    }

    fn contain_path(&self, base: &Path, path: &Path, requested: &str) -> Result<PathBuf, ToolError> {
        let joined = normalize(&base.join(path));
        if joined.starts_with(&self.root) {
            Ok(joined)
        } else {
            Err(ToolError::PathEscape(requested.to_string()))
        }
    }

    /// Root-relative display form of an absolute path inside the root.
    pub fn display(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Ok(rel) => rel.display().to_string(),
            Err(_) => path.display().to_string(),
        }
    }
}

fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

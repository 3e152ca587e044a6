//! Workspace root
//!
//! Every file-system tool resolves its paths through a [`Workspace`]. A path
//! resolves only if it stays under the root, lexically and after following
//! symlinks on the part that already exists.

use std::path::{Component, Path, PathBuf};

use crate::error::{Result, ToolError};

#[derive(Clone, Debug)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Open a workspace. The root must exist and be a directory.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let given = root.as_ref();
        let root = std::fs::canonicalize(given)
            .map_err(|_| ToolError::NotFound(given.display().to_string()))?;
        if !root.is_dir() {
            return Err(ToolError::NotADirectory(root.display().to_string()));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a user-supplied path (relative to the root, or absolute
    /// inside it) to an absolute path under the root.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let candidate = Path::new(path.trim());
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };

        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(ToolError::OutsideWorkspace(path.to_string()));
                    }
                }
                other => normalized.push(other),
            }
        }

        if !normalized.starts_with(&self.root) {
            return Err(ToolError::OutsideWorkspace(path.to_string()));
        }

        // Symlinks may still point outside; check the deepest existing ancestor
        let mut existing = normalized.as_path();
        while !existing.exists() {
            match existing.parent() {
                Some(parent) => existing = parent,
                None => break,
            }
        }
        let real = std::fs::canonicalize(existing)?;
        if !real.starts_with(&self.root) {
            return Err(ToolError::OutsideWorkspace(path.to_string()));
        }

        Ok(normalized)
    }

    /// Path relative to the root, for display
    pub fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        if rel.as_os_str().is_empty() {
            ".".to_string()
        } else {
            rel.display().to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();

        let path = ws.resolve("notes/today.md").unwrap();
        assert!(path.starts_with(ws.root()));
        assert_eq!(ws.relative(&path), "notes/today.md");

        let root = ws.resolve(".").unwrap();
        assert_eq!(ws.relative(&root), ".");

        // Dot-dot that stays inside is fine
        let back = ws.resolve("a/../b.txt").unwrap();
        assert_eq!(ws.relative(&back), "b.txt");
    }

    #[test]
    fn test_rejects_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();

        assert!(matches!(ws.resolve("../etc/passwd"), Err(ToolError::OutsideWorkspace(_))));
        assert!(matches!(ws.resolve("/etc/passwd"), Err(ToolError::OutsideWorkspace(_))));
        assert!(matches!(ws.resolve("a/../../x"), Err(ToolError::OutsideWorkspace(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_rejects_symlink_escape() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let ws = Workspace::open(dir.path()).unwrap();
        assert!(matches!(ws.resolve("link/secret"), Err(ToolError::OutsideWorkspace(_))));
    }

    #[test]
    fn test_root_must_be_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, "x").unwrap();

        assert!(matches!(Workspace::open(&file), Err(ToolError::NotADirectory(_))));
        assert!(matches!(Workspace::open(dir.path().join("missing")), Err(ToolError::NotFound(_))));
    }
}

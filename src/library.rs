//! Library session and path sandboxing
//!
//! Every path accepted from or handed back to the front-end must resolve to a
//! location inside the library root the user chose. `Library` owns that root
//! and is passed explicitly to every operation that touches the filesystem.

use crate::CommandError;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Session object holding the current library root.
///
/// Clones share the same root, so the copy registered as Tauri state and the
/// copies moved into blocking tasks always agree.
#[derive(Debug, Clone, Default)]
pub struct Library {
    root: Arc<RwLock<Option<PathBuf>>>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current root, if one has been chosen.
    pub fn root(&self) -> Option<PathBuf> {
        self.root
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the root. The path must be an existing directory.
    pub fn set_root(&self, path: &Path) -> Result<PathBuf, CommandError> {
        if !path.is_dir() {
            return Err(CommandError::InvalidPath(format!(
                "Library root is not a directory: {}",
                path.display()
            )));
        }
        let normalized = normalize(path)?;
        *self.root.write().unwrap_or_else(|e| e.into_inner()) = Some(normalized.clone());
        info!(root = %normalized.display(), "Library root set");
        Ok(normalized)
    }

    /// Normalize `candidate` and check it lies inside the root.
    pub fn guard(&self, candidate: &Path) -> Result<PathBuf, CommandError> {
        let root = self.root().ok_or(CommandError::NoLibrary)?;
        let normalized = normalize(candidate)?;
        if !is_inside(&root, &normalized) {
            warn!(
                root = %root.display(),
                candidate = %candidate.display(),
                "Rejected path outside library"
            );
            return Err(CommandError::PathOutsideLibrary(candidate.display().to_string()));
        }
        Ok(normalized)
    }

    /// Guard a listing parent, adopting it as the root when none is set yet.
    ///
    /// A restarted front-end restores its last root from client storage and
    /// lists it straight away, before any picker has run.
    pub fn adopt_or_check(&self, parent: &Path) -> Result<PathBuf, CommandError> {
        if self.root().is_none() {
            warn!(parent = %parent.display(), "No library root yet, adopting listing parent");
            return self.set_root(parent);
        }
        self.guard(parent)
    }
}

/// Make `path` absolute and resolve `.`/`..` and symlinks as far as the
/// filesystem allows.
///
/// Existing paths are canonicalized. For a path that does not exist yet the
/// nearest existing ancestor is canonicalized and the rest is re-appended.
pub fn normalize(path: &Path) -> Result<PathBuf, CommandError> {
    let absolute = std::path::absolute(path)
        .map_err(|e| CommandError::InvalidPath(format!("Failed to resolve path: {}", e)))?;
    let lexical = collapse(&absolute);

    if lexical.exists() {
        return lexical
            .canonicalize()
            .map(strip_verbatim)
            .map_err(|e| CommandError::InvalidPath(format!("Failed to resolve path: {}", e)));
    }

    let mut tail = Vec::new();
    let mut current = lexical.as_path();
    while let Some(parent) = current.parent() {
        if let Some(name) = current.file_name() {
            tail.push(name.to_os_string());
        }
        if parent.exists() {
            let mut resolved = parent
                .canonicalize()
                .map(strip_verbatim)
                .map_err(|e| CommandError::InvalidPath(format!("Failed to resolve path: {}", e)))?;
            for name in tail.iter().rev() {
                resolved.push(name);
            }
            return Ok(resolved);
        }
        current = parent;
    }

    // No existing ancestor (e.g. an unmounted drive); fall back to lexical form
    Ok(lexical)
}

/// True when `candidate` is `root` itself or a descendant of it.
pub fn is_inside(root: &Path, candidate: &Path) -> bool {
    let root = comparable(root);
    let candidate = comparable(candidate);
    if candidate == root {
        return true;
    }
    let mut prefix = root;
    if !prefix.ends_with(std::path::MAIN_SEPARATOR) {
        prefix.push(std::path::MAIN_SEPARATOR);
    }
    candidate.starts_with(&prefix)
}

fn comparable(path: &Path) -> String {
    let text = path.to_string_lossy().into_owned();
    if cfg!(any(windows, target_os = "macos")) {
        text.to_lowercase()
    } else {
        text
    }
}

fn collapse(path: &Path) -> PathBuf {
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

#[cfg(windows)]
fn strip_verbatim(path: PathBuf) -> PathBuf {
    let text = path.to_string_lossy();
    match text.strip_prefix(r"\\?\") {
        Some(rest) if !rest.starts_with("UNC\\") => PathBuf::from(rest),
        _ => path,
    }
}

#[cfg(not(windows))]
fn strip_verbatim(path: PathBuf) -> PathBuf {
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn library_in(tmp: &TempDir) -> (Library, PathBuf) {
        let root = tmp.path().join("lib");
        fs::create_dir_all(&root).unwrap();
        let library = Library::new();
        let root = library.set_root(&root).unwrap();
        (library, root)
    }

    #[test]
    fn test_is_inside_root_and_descendants() {
        let root = Path::new("/lib");
        assert!(is_inside(root, Path::new("/lib")));
        assert!(is_inside(root, Path::new("/lib/Grade3")));
        assert!(is_inside(root, Path::new("/lib/Grade3/Etude_No1.pdf")));
    }

    #[test]
    fn test_is_inside_rejects_siblings_and_parents() {
        let root = Path::new("/lib");
        assert!(!is_inside(root, Path::new("/lib2")));
        assert!(!is_inside(root, Path::new("/library/Grade3")));
        assert!(!is_inside(root, Path::new("/")));
        assert!(!is_inside(root, Path::new("/other/lib")));
    }

    #[cfg(any(windows, target_os = "macos"))]
    #[test]
    fn test_is_inside_ignores_case_on_case_insensitive_platforms() {
        assert!(is_inside(Path::new("/Lib"), Path::new("/lib/grade3")));
    }

    #[cfg(not(any(windows, target_os = "macos")))]
    #[test]
    fn test_is_inside_respects_case_on_linux() {
        assert!(!is_inside(Path::new("/Lib"), Path::new("/lib/grade3")));
    }

    #[test]
    fn test_normalize_collapses_parent_components() {
        let tmp = TempDir::new().unwrap();
        let (_library, root) = library_in(&tmp);
        fs::create_dir(root.join("Grade3")).unwrap();

        let dotted = root.join("Grade3").join("..").join("Grade3");
        assert_eq!(normalize(&dotted).unwrap(), root.join("Grade3"));
    }

    #[test]
    fn test_normalize_missing_path_keeps_tail() {
        let tmp = TempDir::new().unwrap();
        let (_library, root) = library_in(&tmp);

        let missing = root.join("NewSet").join("score.pdf");
        assert_eq!(normalize(&missing).unwrap(), root.join("NewSet").join("score.pdf"));
    }

    #[test]
    fn test_guard_without_root_fails() {
        let library = Library::new();
        let result = library.guard(Path::new("/anything"));
        assert!(matches!(result.unwrap_err(), CommandError::NoLibrary));
    }

    #[test]
    fn test_guard_rejects_traversal_out_of_root() {
        let tmp = TempDir::new().unwrap();
        let (library, root) = library_in(&tmp);
        fs::write(tmp.path().join("secret.pdf"), "x").unwrap();

        let escape = root.join("..").join("secret.pdf");
        let result = library.guard(&escape);
        assert!(matches!(result.unwrap_err(), CommandError::PathOutsideLibrary(_)));
    }

    #[test]
    fn test_guard_rejects_sibling_with_shared_prefix() {
        let tmp = TempDir::new().unwrap();
        let (library, _root) = library_in(&tmp);
        let sibling = tmp.path().join("lib2");
        fs::create_dir(&sibling).unwrap();

        assert!(library.guard(&sibling).is_err());
    }

    #[test]
    fn test_guard_accepts_file_inside_root() {
        let tmp = TempDir::new().unwrap();
        let (library, root) = library_in(&tmp);
        fs::create_dir(root.join("Grade3")).unwrap();
        fs::write(root.join("Grade3").join("Etude.pdf"), "x").unwrap();

        let guarded = library.guard(&root.join("Grade3").join("Etude.pdf")).unwrap();
        assert_eq!(guarded, root.join("Grade3").join("Etude.pdf"));
    }

    #[test]
    fn test_set_root_rejects_files() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("not_a_dir.txt");
        fs::write(&file, "x").unwrap();

        let library = Library::new();
        assert!(matches!(library.set_root(&file).unwrap_err(), CommandError::InvalidPath(_)));
        assert!(library.root().is_none());
    }

    #[test]
    fn test_adopt_or_check_adopts_first_parent() {
        let tmp = TempDir::new().unwrap();
        let library = Library::new();

        let adopted = library.adopt_or_check(tmp.path()).unwrap();
        assert_eq!(library.root(), Some(adopted));
    }

    #[test]
    fn test_adopt_or_check_rejects_other_parent_once_rooted() {
        let tmp = TempDir::new().unwrap();
        let (library, root) = library_in(&tmp);
        let other = tmp.path().join("elsewhere");
        fs::create_dir(&other).unwrap();

        assert!(library.adopt_or_check(&other).is_err());
        assert_eq!(library.root(), Some(root));
    }

    #[test]
    fn test_clones_share_root() {
        let tmp = TempDir::new().unwrap();
        let library = Library::new();
        let copy = library.clone();

        copy.set_root(tmp.path()).unwrap();
        assert!(library.root().is_some());
    }
}

//! One-level directory listings: sets (subfolders) and PDF scores

use crate::library::Library;
use crate::CommandError;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::debug;

pub const NO_SUB_FOLDERS: &str = "No sub folders found.";
pub const NO_FILES: &str = "No files found.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderEntry {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdfFile {
    pub name: String,
    pub path: String,
}

/// Outcome of a listing that ran without error.
///
/// Serializes as `{"status": "items", "items": [...]}` or
/// `{"status": "empty", "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Listing<T> {
    Items { items: Vec<T> },
    Empty { message: String },
}

impl<T> Listing<T> {
    fn from_items(items: Vec<T>, empty_message: &str) -> Self {
        if items.is_empty() {
            Listing::Empty {
                message: empty_message.to_string(),
            }
        } else {
            Listing::Items { items }
        }
    }

    #[cfg(test)]
    pub fn items(&self) -> &[T] {
        match self {
            Listing::Items { items } => items,
            Listing::Empty { .. } => &[],
        }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        matches!(self, Listing::Empty { .. })
    }
}

/// List the immediate subdirectories of `parent`, sorted by name.
pub fn list_subfolders(library: &Library, parent: &Path) -> Result<Listing<FolderEntry>, CommandError> {
    let dir = library.adopt_or_check(parent)?;
    let mut folders: Vec<FolderEntry> = visible_entries(library, &dir)?
        .filter(|(_, path)| path.is_dir())
        .map(|(name, path)| FolderEntry {
            name,
            path: path.to_string_lossy().to_string(),
        })
        .collect();

    folders.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(dir = %dir.display(), count = folders.len(), "Listed sub folders");
    Ok(Listing::from_items(folders, NO_SUB_FOLDERS))
}

/// List the PDF files directly inside `root/subfolder` (or `root`), sorted by name.
pub fn list_pdf_files(
    library: &Library,
    root: &Path,
    subfolder: Option<&str>,
) -> Result<Listing<PdfFile>, CommandError> {
    let target = match subfolder {
        Some(name) if !name.trim().is_empty() => root.join(name),
        _ => root.to_path_buf(),
    };
    let dir = library.guard(&target)?;
    if !dir.is_dir() {
        return Err(CommandError::InvalidPath(format!(
            "Path is not a directory: {}",
            target.display()
        )));
    }

    let mut files: Vec<PdfFile> = visible_entries(library, &dir)?
        .filter(|(_, path)| path.is_file() && has_pdf_extension(path))
        .map(|(name, path)| PdfFile {
            name,
            path: path.to_string_lossy().to_string(),
        })
        .collect();

    files.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(dir = %dir.display(), count = files.len(), "Listed pdf files");
    Ok(Listing::from_items(files, NO_FILES))
}

pub fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Non-hidden entries of `dir` as (name, full path) pairs.
///
/// Entries that resolve outside the library, such as symlinks pointing
/// elsewhere on disk, are skipped.
fn visible_entries<'a>(
    library: &'a Library,
    dir: &Path,
) -> Result<impl Iterator<Item = (String, std::path::PathBuf)> + 'a, CommandError> {
    let entries = fs::read_dir(dir)?;
    Ok(entries.filter_map(|entry| entry.ok()).filter_map(move |entry| {
        let name = entry.file_name().to_str()?.to_string();
        if name.starts_with('.') {
            return None;
        }
        let path = entry.path();
        if let Err(e) = library.guard(&path) {
            debug!(path = %path.display(), error = %e, "Skipping entry outside library");
            return None;
        }
        Some((name, path))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn library_at(tmp: &TempDir) -> (Library, std::path::PathBuf) {
        let library = Library::new();
        let root = library.set_root(tmp.path()).unwrap();
        (library, root)
    }

    #[test]
    fn test_list_subfolders_returns_sorted_dirs_only() {
        let tmp = TempDir::new().unwrap();
        let (library, root) = library_at(&tmp);
        fs::create_dir(root.join("Zebra")).unwrap();
        fs::create_dir(root.join("Alpha")).unwrap();
        fs::create_dir(root.join("Middle")).unwrap();
        fs::write(root.join("readme.txt"), "hello").unwrap();

        let listing = list_subfolders(&library, &root).unwrap();
        let names: Vec<&str> = listing.items().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Middle", "Zebra"]);
        assert_eq!(listing.items()[0].path, root.join("Alpha").to_string_lossy());
    }

    #[test]
    fn test_list_subfolders_empty_is_tagged() {
        let tmp = TempDir::new().unwrap();
        let (library, root) = library_at(&tmp);
        fs::write(root.join("loose.pdf"), "x").unwrap();

        let listing = list_subfolders(&library, &root).unwrap();
        assert_eq!(
            listing,
            Listing::Empty {
                message: NO_SUB_FOLDERS.to_string()
            }
        );
    }

    #[test]
    fn test_list_subfolders_skips_hidden() {
        let tmp = TempDir::new().unwrap();
        let (library, root) = library_at(&tmp);
        fs::create_dir(root.join(".git")).unwrap();
        fs::create_dir(root.join("Grade1")).unwrap();

        let listing = list_subfolders(&library, &root).unwrap();
        assert_eq!(listing.items().len(), 1);
        assert_eq!(listing.items()[0].name, "Grade1");
    }

    #[test]
    fn test_list_subfolders_nonexistent_parent_is_error() {
        let tmp = TempDir::new().unwrap();
        let (library, root) = library_at(&tmp);

        let result = list_subfolders(&library, &root.join("missing"));
        assert!(result.is_err());
    }

    #[test]
    fn test_list_pdf_files_matches_example_scenario() {
        let tmp = TempDir::new().unwrap();
        let (library, root) = library_at(&tmp);
        fs::create_dir(root.join("Grade3")).unwrap();
        fs::write(root.join("Grade3").join("Etude_No1.pdf"), "%PDF").unwrap();
        fs::write(root.join("Grade3").join("notes.txt"), "notes").unwrap();

        let listing = list_pdf_files(&library, &root, Some("Grade3")).unwrap();
        assert_eq!(
            listing.items(),
            &[PdfFile {
                name: "Etude_No1.pdf".to_string(),
                path: root.join("Grade3").join("Etude_No1.pdf").to_string_lossy().to_string(),
            }]
        );
    }

    #[test]
    fn test_list_pdf_files_counts_only_matches() {
        let tmp = TempDir::new().unwrap();
        let (library, root) = library_at(&tmp);
        let set = root.join("Set");
        fs::create_dir(&set).unwrap();
        for name in ["c.pdf", "a.PDF", "b.Pdf"] {
            fs::write(set.join(name), "%PDF").unwrap();
        }
        for name in ["cover.jpg", "pdf", "notes.pdf.txt"] {
            fs::write(set.join(name), "x").unwrap();
        }
        fs::create_dir(set.join("folder.pdf")).unwrap();

        let listing = list_pdf_files(&library, &root, Some("Set")).unwrap();
        let names: Vec<&str> = listing.items().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.PDF", "b.Pdf", "c.pdf"]);
    }

    #[test]
    fn test_list_pdf_files_empty_is_tagged() {
        let tmp = TempDir::new().unwrap();
        let (library, root) = library_at(&tmp);
        fs::create_dir(root.join("Empty")).unwrap();
        fs::write(root.join("Empty").join("notes.txt"), "x").unwrap();

        let listing = list_pdf_files(&library, &root, Some("Empty")).unwrap();
        assert!(listing.is_empty());
        assert_eq!(
            listing,
            Listing::Empty {
                message: NO_FILES.to_string()
            }
        );
    }

    #[test]
    fn test_list_pdf_files_without_subfolder_lists_root() {
        let tmp = TempDir::new().unwrap();
        let (library, root) = library_at(&tmp);
        fs::write(root.join("Top.pdf"), "%PDF").unwrap();

        let listing = list_pdf_files(&library, &root, None).unwrap();
        assert_eq!(listing.items().len(), 1);
    }

    #[test]
    fn test_list_pdf_files_rejects_escaping_subfolder() {
        let tmp = TempDir::new().unwrap();
        let library = Library::new();
        let root = tmp.path().join("lib");
        fs::create_dir(&root).unwrap();
        let root = library.set_root(&root).unwrap();
        fs::create_dir(tmp.path().join("outside")).unwrap();

        let result = list_pdf_files(&library, &root, Some("../outside"));
        assert!(matches!(result.unwrap_err(), CommandError::PathOutsideLibrary(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_listings_skip_symlinks_leaving_library() {
        use std::os::unix::fs::symlink;

        let tmp = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let (library, root) = library_at(&tmp);
        fs::create_dir(outside.path().join("Private")).unwrap();
        fs::write(outside.path().join("secret.pdf"), "%PDF").unwrap();

        let set = root.join("Set");
        fs::create_dir(&set).unwrap();
        fs::write(set.join("Real.pdf"), "%PDF").unwrap();
        symlink(outside.path().join("secret.pdf"), set.join("Linked.pdf")).unwrap();
        symlink(outside.path().join("Private"), root.join("Escape")).unwrap();

        let folders = list_subfolders(&library, &root).unwrap();
        let names: Vec<&str> = folders.items().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Set"]);

        let files = list_pdf_files(&library, &root, Some("Set")).unwrap();
        let names: Vec<&str> = files.items().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Real.pdf"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_listings_keep_symlinks_within_library() {
        use std::os::unix::fs::symlink;

        let tmp = TempDir::new().unwrap();
        let (library, root) = library_at(&tmp);
        fs::create_dir(root.join("Grade1")).unwrap();
        fs::write(root.join("Grade1").join("Minuet.pdf"), "%PDF").unwrap();
        fs::create_dir(root.join("Recital")).unwrap();
        symlink(root.join("Grade1").join("Minuet.pdf"), root.join("Recital").join("Minuet.pdf")).unwrap();

        let files = list_pdf_files(&library, &root, Some("Recital")).unwrap();
        assert_eq!(files.items().len(), 1);
    }

    #[test]
    fn test_listing_serializes_with_status_tag() {
        let listing: Listing<PdfFile> = Listing::Empty {
            message: NO_FILES.to_string(),
        };
        let json = serde_json::to_value(&listing).unwrap();
        assert_eq!(json["status"], "empty");
        assert_eq!(json["message"], NO_FILES);
    }
}

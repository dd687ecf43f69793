//! Single-file operations on scores: rename, delete to trash, read bytes,
//! plus the helpers that turn a score file name into a search link.

use crate::library::{self, Library};
use crate::listing::{has_pdf_extension, PdfFile};
use crate::CommandError;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::info;
use url::Url;

const INVALID_NAME_CHARS: [char; 7] = ['<', '>', ':', '"', '|', '?', '*'];
const YOUTUBE_RESULTS_URL: &str = "https://www.youtube.com/results";

/// Yes/no question put to the user before a destructive or external write.
pub trait Confirm {
    fn confirm(&self, message: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, message: &str) -> bool {
        self(message)
    }
}

/// A score the front-end asks to delete.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteTarget {
    pub display_name: String,
    pub path: String,
}

/// Rename a file in place, keeping its extension.
///
/// `new_name` is the new base name without extension.
pub fn rename_file(library: &Library, file_path: &str, new_name: &str) -> Result<PdfFile, CommandError> {
    let source = library.guard(Path::new(file_path))?;
    validate_base_name(new_name)?;

    if !source.exists() {
        return Err(CommandError::FileNotFound(file_path.to_string()));
    }
    if !source.is_file() {
        return Err(CommandError::InvalidPath(format!("Path is not a file: {}", file_path)));
    }

    let parent = source
        .parent()
        .ok_or_else(|| CommandError::InvalidPath("Cannot determine parent directory".to_string()))?;
    let file_name = match source.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}.{}", new_name.trim(), ext),
        None => new_name.trim().to_string(),
    };
    let new_path = parent.join(&file_name);

    // On case-insensitive volumes a case-only rename resolves to the source itself
    if new_path.exists() && library::normalize(&new_path).map_or(true, |p| p != source) {
        return Err(CommandError::DuplicateExists(file_name));
    }

    fs::rename(&source, &new_path)?;

    info!(from = %source.display(), to = %new_path.display(), "File renamed");
    Ok(PdfFile {
        name: file_name,
        path: new_path.to_string_lossy().to_string(),
    })
}

/// Move a file to the system trash once the user confirms.
///
/// Returns `Ok(false)` when the user declines.
pub fn delete_file(library: &Library, target: &DeleteTarget, confirm: &dyn Confirm) -> Result<bool, CommandError> {
    delete_file_with(library, target, confirm, |path| {
        trash::delete(path)
            .map_err(|e| CommandError::IoError(format!("Failed to move to recycle bin: {}", e)))
    })
}

/// `delete_file` with the removal step supplied by the caller.
pub fn delete_file_with<F>(
    library: &Library,
    target: &DeleteTarget,
    confirm: &dyn Confirm,
    remove: F,
) -> Result<bool, CommandError>
where
    F: FnOnce(&Path) -> Result<(), CommandError>,
{
    let path = library.guard(Path::new(&target.path))?;
    if !path.exists() {
        return Err(CommandError::FileNotFound(target.path.clone()));
    }
    if !path.is_file() {
        return Err(CommandError::InvalidPath(format!("Path is not a file: {}", target.path)));
    }

    if !confirm.confirm(&format!("Delete \"{}\"?", target.display_name)) {
        info!(path = %path.display(), "Delete cancelled");
        return Ok(false);
    }

    remove(&path)?;
    info!(path = %path.display(), "File sent to recycle bin");
    Ok(true)
}

/// Read a score's bytes for the embedded viewer.
pub fn read_pdf_file(library: &Library, file_path: &str) -> Result<Vec<u8>, CommandError> {
    let path = library.guard(Path::new(file_path))?;
    if !path.is_file() {
        return Err(CommandError::FileNotFound(file_path.to_string()));
    }
    if !has_pdf_extension(&path) {
        return Err(CommandError::InvalidPath(format!("Not a PDF file: {}", file_path)));
    }
    Ok(fs::read(&path)?)
}

/// Turn a PDF file name into a human-friendly score title.
pub fn to_score_title(file_name: &str) -> String {
    let split = file_name.len().checked_sub(4);
    let stem = match split.and_then(|at| file_name.get(at..).map(|ext| (at, ext))) {
        Some((at, ext)) if ext.eq_ignore_ascii_case(".pdf") => &file_name[..at],
        _ => file_name,
    };
    stem.replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn youtube_search_url(query: &str) -> Result<Url, CommandError> {
    Url::parse_with_params(YOUTUBE_RESULTS_URL, &[("search_query", query)])
        .map_err(|e| CommandError::InvalidUrl(e.to_string()))
}

/// Accept only http(s) links for the system browser.
pub fn validate_external_url(raw: &str) -> Result<Url, CommandError> {
    let parsed = Url::parse(raw).map_err(|e| CommandError::InvalidUrl(format!("{}: {}", raw, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(CommandError::UnsupportedScheme(scheme.to_string())),
    }
}

fn validate_base_name(new_name: &str) -> Result<(), CommandError> {
    if new_name.contains("..") {
        return Err(CommandError::PathTraversal);
    }
    if new_name.contains('/') || new_name.contains('\\') {
        return Err(CommandError::InvalidPath("New name cannot contain path separators".to_string()));
    }
    if new_name.chars().any(|c| INVALID_NAME_CHARS.contains(&c)) {
        return Err(CommandError::InvalidPath("New name contains invalid characters".to_string()));
    }
    if new_name.trim().is_empty() {
        return Err(CommandError::InvalidPath("New name cannot be empty".to_string()));
    }
    Ok(())
}

//! Read-only `app-pdf://` scheme for the embedded viewer
//!
//! `app-pdf://local/?path=/absolute/path/to/score.pdf`

use crate::library::Library;
use crate::listing::has_pdf_extension;
use crate::CommandError;
use std::path::Path;
use tauri::http::{header::CONTENT_TYPE, Response, StatusCode};
use tracing::warn;
use url::Url;

pub const SCHEME: &str = "app-pdf";

/// Build the response for one scheme request.
pub fn respond(library: &Library, uri: &str) -> Response<Vec<u8>> {
    let Some(file_path) = requested_path(uri) else {
        return text(StatusCode::BAD_REQUEST, "Missing path");
    };

    let path = match library.guard(Path::new(&file_path)) {
        Ok(path) => path,
        Err(CommandError::NoLibrary) | Err(CommandError::PathOutsideLibrary(_)) => {
            return text(StatusCode::FORBIDDEN, "Forbidden");
        }
        Err(_) => return text(StatusCode::NOT_FOUND, "Not found"),
    };

    if !has_pdf_extension(&path) || !path.is_file() {
        return text(StatusCode::NOT_FOUND, "Not found");
    }

    match std::fs::read(&path) {
        Ok(bytes) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "application/pdf")
            .body(bytes)
            .unwrap_or_default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to serve pdf");
            text(StatusCode::INTERNAL_SERVER_ERROR, "Read failed")
        }
    }
}

/// Serve one request on the blocking pool so file reads stay off the
/// main thread.
pub async fn respond_off_thread(library: Library, uri: String) -> Response<Vec<u8>> {
    tauri::async_runtime::spawn_blocking(move || respond(&library, &uri))
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "Scheme worker failed");
            text(StatusCode::INTERNAL_SERVER_ERROR, "Read failed")
        })
}

fn requested_path(uri: &str) -> Option<String> {
    let url = Url::parse(uri).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "path")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

fn text(status: StatusCode, body: &str) -> Response<Vec<u8>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain")
        .body(body.as_bytes().to_vec())
        .unwrap_or_default()
}

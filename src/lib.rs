// Modules
mod config; // .env loading and persisted settings
mod db; // Users database gateway
mod file_ops; // Rename, trash, read
mod latest; // Latest-wins request guard
mod library; // Library root and path sandbox
mod listing; // Set and score listings
mod pdf_protocol; // app-pdf:// scheme

use config::{DbConfig, Settings};
use db::{DbError, Gateway, User, UserLastPlayed};
use file_ops::{Confirm, DeleteTarget};
use latest::LatestWins;
use library::Library;
use listing::{FolderEntry, Listing, PdfFile};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tauri::{AppHandle, Emitter, Manager, State, Window};
use tauri_plugin_dialog::{DialogExt, FilePath, MessageDialogButtons, MessageDialogKind};
use tauri_plugin_opener::OpenerExt;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DB_FILE_NAME: &str = "sheet_library.db";
const EVENT_MAXIMIZE: &str = "window:on-maximize";
const EVENT_UNMAXIMIZE: &str = "window:on-unmaximize";

// Last maximized state reported to the front-end
static WINDOW_MAXIMIZED: AtomicBool = AtomicBool::new(false);

/// Typed errors for Tauri commands, allowing frontend to distinguish error types
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "message")]
pub enum CommandError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File already exists: {0}")]
    DuplicateExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("File is in use: {0}")]
    FileInUse(String),

    #[error("Path traversal not allowed")]
    PathTraversal,

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("No library folder chosen")]
    NoLibrary,

    #[error("Path is outside the library: {0}")]
    PathOutsideLibrary(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Superseded by a newer request")]
    Superseded,

    #[error("Could not open: {0}")]
    OpenFailed(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for CommandError {
    fn from(err: std::io::Error) -> Self {
        let msg = err.to_string().to_lowercase();
        if msg.contains("permission denied") || msg.contains("access denied") {
            CommandError::PermissionDenied(err.to_string())
        } else if msg.contains("used by another process") || msg.contains("being used") {
            CommandError::FileInUse(err.to_string())
        } else if msg.contains("not found") || msg.contains("cannot find") {
            CommandError::FileNotFound(err.to_string())
        } else {
            CommandError::IoError(err.to_string())
        }
    }
}

// Tauri automatically converts Serialize types to InvokeError via serde_json
// The #[serde(tag = "type", content = "message")] attribute ensures errors
// serialize to JSON like: {"type": "PathOutsideLibrary", "message": "/etc/passwd"}

/// Directories resolved once at startup
struct AppPaths {
    config_dir: PathBuf,
}

/// Asks the user through a native yes/no dialog.
///
/// Blocks until answered, so only call it off the main thread.
struct DialogConfirm {
    app: AppHandle,
}

impl Confirm for DialogConfirm {
    fn confirm(&self, message: &str) -> bool {
        self.app
            .dialog()
            .message(message)
            .title("Confirm")
            .kind(MessageDialogKind::Warning)
            .buttons(MessageDialogButtons::OkCancelCustom("Yes".to_string(), "No".to_string()))
            .blocking_show()
    }
}

fn join_error(err: tauri::Error) -> CommandError {
    CommandError::IoError(format!("Background task failed: {}", err))
}

/// Run blocking work off the async runtime, dropping the result when a newer
/// call of the same command started meanwhile.
async fn run_latest<T, F>(latest: &LatestWins, site: &'static str, work: F) -> Result<T, CommandError>
where
    F: FnOnce() -> Result<T, CommandError> + Send + 'static,
    T: Send + 'static,
{
    let handle = tauri::async_runtime::spawn_blocking(work);
    match latest.run(site, handle).await {
        Some(joined) => joined.map_err(join_error)?,
        None => {
            info!(site, "Dropping superseded result");
            Err(CommandError::Superseded)
        }
    }
}

fn persist_root(paths: &AppPaths, root: &Path) {
    let settings = Settings {
        library_root: Some(root.to_string_lossy().to_string()),
    };
    if let Err(e) = settings.save(&paths.config_dir) {
        warn!(error = %e, "Failed to persist library root");
    }
}

// ============================================================
// LIBRARY COMMANDS
// ============================================================

/// Open the native folder picker and make the choice the library root
///
/// Called from frontend with: invoke('choose_directory')
#[tauri::command]
async fn choose_directory(
    app: AppHandle,
    library: State<'_, Library>,
    paths: State<'_, AppPaths>,
) -> Result<Option<String>, CommandError> {
    let (sender, receiver) = tokio::sync::oneshot::channel();

    app.dialog().file().pick_folder(move |folder| {
        let _ = sender.send(folder);
    });

    let picked = receiver
        .await
        .map_err(|e| CommandError::IoError(format!("Folder picker closed unexpectedly: {}", e)))?;

    let Some(picked) = picked else {
        info!("Library picker cancelled");
        return Ok(None);
    };
    let path = match picked {
        FilePath::Path(p) => p,
        FilePath::Url(url) => url
            .to_file_path()
            .map_err(|_| CommandError::InvalidPath(url.to_string()))?,
    };

    let root = library.set_root(&path)?;
    persist_root(&paths, &root);
    Ok(Some(root.to_string_lossy().to_string()))
}

#[tauri::command]
fn get_library_root(library: State<'_, Library>) -> Option<String> {
    library.root().map(|p| p.to_string_lossy().to_string())
}

/// Restore a root remembered by the frontend
///
/// Called from frontend with: invoke('set_library_root', { path: '...' })
#[tauri::command]
fn set_library_root(
    path: String,
    library: State<'_, Library>,
    paths: State<'_, AppPaths>,
) -> Result<String, CommandError> {
    let root = library.set_root(Path::new(&path))?;
    persist_root(&paths, &root);
    Ok(root.to_string_lossy().to_string())
}

/// List the sets (immediate subfolders) of the library
///
/// Called from frontend with: invoke('get_sub_directories', { parent: '...' })
#[tauri::command]
async fn get_sub_directories(
    parent: String,
    library: State<'_, Library>,
    latest: State<'_, LatestWins>,
) -> Result<Listing<FolderEntry>, CommandError> {
    info!(parent = %parent, "get_sub_directories");
    let library = library.inner().clone();
    run_latest(&latest, "get_sub_directories", move || {
        listing::list_subfolders(&library, Path::new(&parent))
    })
    .await
}

/// List the scores in a set
///
/// Called from frontend with: invoke('get_pdf_files', { root: '...', subfolder: '...' })
#[tauri::command]
async fn get_pdf_files(
    root: String,
    subfolder: Option<String>,
    library: State<'_, Library>,
    latest: State<'_, LatestWins>,
) -> Result<Listing<PdfFile>, CommandError> {
    info!(root = %root, subfolder = ?subfolder, "get_pdf_files");
    let library = library.inner().clone();
    run_latest(&latest, "get_pdf_files", move || {
        listing::list_pdf_files(&library, Path::new(&root), subfolder.as_deref())
    })
    .await
}

/// Read a score's bytes for the embedded viewer
#[tauri::command]
async fn read_pdf_file(
    file_path: String,
    library: State<'_, Library>,
    latest: State<'_, LatestWins>,
) -> Result<tauri::ipc::Response, CommandError> {
    let library = library.inner().clone();
    let bytes = run_latest(&latest, "read_pdf_file", move || {
        file_ops::read_pdf_file(&library, &file_path)
    })
    .await?;
    Ok(tauri::ipc::Response::new(bytes))
}

// ============================================================
// FILE COMMANDS
// ============================================================

/// Rename a score in place, keeping its extension
///
/// Called from frontend with: invoke('rename_file', { filePath: '...', newName: '...' })
#[tauri::command]
fn rename_file(
    file_path: String,
    new_name: String,
    library: State<'_, Library>,
) -> Result<PdfFile, CommandError> {
    info!(file_path = %file_path, new_name = %new_name, "rename_file");
    file_ops::rename_file(&library, &file_path, &new_name)
}

/// Send a score to the recycle bin after confirmation
///
/// Called from frontend with: invoke('delete_file', { target: { displayName: '...', path: '...' } })
#[tauri::command]
async fn delete_file(
    app: AppHandle,
    target: DeleteTarget,
    library: State<'_, Library>,
) -> Result<bool, CommandError> {
    info!(path = %target.path, "delete_file");
    let library = library.inner().clone();
    tauri::async_runtime::spawn_blocking(move || {
        file_ops::delete_file(&library, &target, &DialogConfirm { app })
    })
    .await
    .map_err(join_error)?
}

/// Open an http(s) link in the system browser
#[tauri::command]
fn open_external(app: AppHandle, url: String) -> Result<(), CommandError> {
    let url = file_ops::validate_external_url(&url)?;
    app.opener()
        .open_url(url.as_str(), None::<&str>)
        .map_err(|e| CommandError::OpenFailed(e.to_string()))
}

/// Search YouTube for the title of a score
#[tauri::command]
fn search_youtube(
    app: AppHandle,
    file_path: String,
    library: State<'_, Library>,
) -> Result<(), CommandError> {
    let path = library.guard(Path::new(&file_path))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CommandError::InvalidPath(file_path.clone()))?;
    let url = file_ops::youtube_search_url(&file_ops::to_score_title(file_name))?;

    info!(url = %url, "search_youtube");
    app.opener()
        .open_url(url.as_str(), None::<&str>)
        .map_err(|e| CommandError::OpenFailed(e.to_string()))
}

/// Open a score with the OS default viewer
#[tauri::command]
fn open_file(app: AppHandle, file_path: String, library: State<'_, Library>) -> Result<(), CommandError> {
    let path = library.guard(Path::new(&file_path))?;
    if !path.is_file() {
        return Err(CommandError::FileNotFound(file_path));
    }
    app.opener()
        .open_path(path.to_string_lossy(), None::<&str>)
        .map_err(|e| CommandError::OpenFailed(e.to_string()))
}

/// Show a score in the OS file browser
#[tauri::command]
fn reveal_in_folder(app: AppHandle, file_path: String, library: State<'_, Library>) -> Result<(), CommandError> {
    let path = library.guard(Path::new(&file_path))?;
    if !path.exists() {
        return Err(CommandError::FileNotFound(file_path));
    }
    app.opener()
        .reveal_item_in_dir(&path)
        .map_err(|e| CommandError::OpenFailed(e.to_string()))
}

// ============================================================
// DATABASE COMMANDS
// ============================================================

fn db_join_error(err: tauri::Error) -> DbError {
    DbError::QueryFailed(format!("Background task failed: {}", err))
}

#[tauri::command]
async fn db_get_users(gateway: State<'_, Gateway>) -> Result<Vec<User>, DbError> {
    let gateway = gateway.inner().clone();
    tauri::async_runtime::spawn_blocking(move || gateway.get_users())
        .await
        .map_err(db_join_error)?
}

#[tauri::command]
async fn db_get_user_last_played(
    user_id: i64,
    gateway: State<'_, Gateway>,
) -> Result<Option<UserLastPlayed>, DbError> {
    let gateway = gateway.inner().clone();
    tauri::async_runtime::spawn_blocking(move || gateway.get_user_last_played(user_id))
        .await
        .map_err(db_join_error)?
}

/// Record the last played score for a user once confirmed
#[tauri::command]
async fn db_save_user_last_played(
    app: AppHandle,
    user_id: i64,
    last_played: String,
    gateway: State<'_, Gateway>,
) -> Result<bool, DbError> {
    let gateway = gateway.inner().clone();
    tauri::async_runtime::spawn_blocking(move || {
        save_last_played_confirmed(&gateway, user_id, &last_played, &DialogConfirm { app })
    })
    .await
    .map_err(db_join_error)?
}

/// Validate, ask, then save. An invalid title never reaches the prompt.
fn save_last_played_confirmed(
    gateway: &Gateway,
    user_id: i64,
    last_played: &str,
    confirm: &dyn Confirm,
) -> Result<bool, DbError> {
    db::validate_last_played(last_played)?;
    if !confirm.confirm(&format!("Save \"{}\" as last played?", last_played)) {
        return Ok(false);
    }
    gateway.save_user_last_played(user_id, last_played)?;
    Ok(true)
}

// ============================================================
// WINDOW COMMANDS
// ============================================================

#[tauri::command]
fn window_minimize(window: Window) {
    if let Err(e) = window.minimize() {
        warn!(error = %e, "Failed to minimize window");
    }
}

#[tauri::command]
fn window_toggle_maximize(window: Window) {
    let result = if window.is_maximized().unwrap_or(false) {
        window.unmaximize()
    } else {
        window.maximize()
    };
    if let Err(e) = result {
        warn!(error = %e, "Failed to toggle maximize");
    }
}

#[tauri::command]
async fn window_close(window: Window) {
    let app = window.app_handle().clone();
    let confirmed = tauri::async_runtime::spawn_blocking(move || {
        DialogConfirm { app }.confirm("Are you sure you want to quit?")
    })
    .await
    .unwrap_or(false);

    if confirmed {
        if let Err(e) = window.close() {
            warn!(error = %e, "Failed to close window");
        }
    }
}

#[tauri::command]
fn window_is_maximized(window: Window) -> bool {
    window.is_maximized().unwrap_or(false)
}

fn report_maximize_change(window: &Window) {
    let maximized = window.is_maximized().unwrap_or(false);
    if WINDOW_MAXIMIZED.swap(maximized, Ordering::SeqCst) == maximized {
        return;
    }
    let event = if maximized { EVENT_MAXIMIZE } else { EVENT_UNMAXIMIZE };
    if let Err(e) = window.emit(event, ()) {
        warn!(event, error = %e, "Failed to emit window event");
    }
}

// ============================================================
// BRIDGE SURFACE
// ============================================================

macro_rules! bridge_command_idents {
    ($callback:ident) => {
        $callback!(
            choose_directory,
            get_library_root,
            set_library_root,
            get_sub_directories,
            get_pdf_files,
            read_pdf_file,
            rename_file,
            delete_file,
            open_external,
            search_youtube,
            open_file,
            reveal_in_folder,
            db_get_users,
            db_get_user_last_played,
            db_save_user_last_played,
            window_minimize,
            window_toggle_maximize,
            window_close,
            window_is_maximized
        )
    };
}

macro_rules! as_generate_handler {
    ($($command:ident),* $(,)?) => {
        tauri::generate_handler![$($command),*]
    };
}

macro_rules! as_command_name_slice {
    ($($command:ident),* $(,)?) => {
        &[$(stringify!($command)),*]
    };
}

const BRIDGE_COMMAND_NAMES: &[&str] = bridge_command_idents!(as_command_name_slice);
const BRIDGE_EVENT_NAMES: &[&str] = &[EVENT_MAXIMIZE, EVENT_UNMAXIMIZE];

/// Filter from `RUST_LOG` directives, falling back to `info`.
fn tracing_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn init_tracing() {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = tracing_filter(directives.as_deref());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

/// Restore the persisted library root, ignoring roots that no longer exist
fn restore_library_root(library: &Library, config_dir: &Path) {
    let Some(saved) = Settings::load(config_dir).library_root else {
        return;
    };
    match library.set_root(Path::new(&saved)) {
        Ok(root) => info!(root = %root.display(), "Restored library root"),
        Err(e) => warn!(root = %saved, error = %e, "Saved library root unavailable"),
    }
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    // Load environment variables from .env file (development only)
    #[cfg(debug_assertions)]
    dotenv::dotenv().ok();

    let result = tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_dialog::init())
        .manage(Library::new())
        .manage(LatestWins::new())
        .register_asynchronous_uri_scheme_protocol(pdf_protocol::SCHEME, |ctx, request, responder| {
            let library = ctx.app_handle().state::<Library>().inner().clone();
            let uri = request.uri().to_string();
            tauri::async_runtime::spawn(async move {
                responder.respond(pdf_protocol::respond_off_thread(library, uri).await);
            });
        })
        .setup(|app| {
            let config_dir = app.path().app_config_dir()?;
            let data_dir = app.path().app_data_dir()?;

            // RUST_LOG may come from the per-user .env, so the subscriber starts after it
            let env_loaded = config::load_runtime_env(&config_dir, !cfg!(debug_assertions));
            init_tracing();
            info!(
                command_count = BRIDGE_COMMAND_NAMES.len(),
                event_count = BRIDGE_EVENT_NAMES.len(),
                "Starting sheet library bridge"
            );
            if let Err(e) = env_loaded {
                warn!(error = %e, "Failed to load runtime env");
            }

            let db_config = DbConfig::from_env(data_dir.join(DB_FILE_NAME));
            info!(path = %db_config.path.display(), "Using users database");
            let gateway = Gateway::new(db_config.path);
            if let Err(e) = gateway.ensure_schema() {
                // Don't fail app startup - database commands report their own errors
                warn!(error = %e, "Failed to prepare users database");
            }
            app.manage(gateway);

            restore_library_root(&app.state::<Library>(), &config_dir);
            app.manage(AppPaths { config_dir });

            if let Some(window) = app.get_webview_window("main") {
                WINDOW_MAXIMIZED.store(window.is_maximized().unwrap_or(false), Ordering::SeqCst);
            }
            Ok(())
        })
        .on_window_event(|window, event| {
            if let tauri::WindowEvent::Resized(_) = event {
                report_maximize_change(window);
            }
        })
        .invoke_handler(bridge_command_idents!(as_generate_handler))
        .run(tauri::generate_context!());

    if let Err(e) = result {
        warn!(error = %e, "tauri runtime failed");
        panic!("error while running tauri application: {e}");
    }
}

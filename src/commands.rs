use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use log::{info, warn};
use serde::Serialize;
use tauri::{AppHandle, Emitter, Manager, State};

use crate::dead_links::{filter_dead_links, DeadLinkReport, HttpProbe, ProbeProgress};
use crate::session::{DedupeOutcome, Session};
use crate::storage::FileStore;
use crate::tree::{ItemSummary, SortOrder};
use crate::{load_settings, save_settings, Settings};

pub struct AppState {
    pub settings: RwLock<Settings>,
    pub settings_path: PathBuf,
    pub session: Mutex<Session<FileStore>>,
    pub cancel_check: AtomicBool,
}

// Current folder as shown by the frontend
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderListing {
    pub breadcrumbs: Vec<String>,
    pub items: Vec<ItemSummary>,
    pub can_go_back: bool,
    pub can_restore: bool,
    pub busy: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLinkSummary {
    pub checked: usize,
    pub removed: usize,
    pub cancelled: bool,
}

fn listing(session: &mut Session<FileStore>, order: SortOrder) -> FolderListing {
    let items = session.view(order);
    FolderListing {
        breadcrumbs: session.breadcrumbs(),
        items,
        can_go_back: !session.path().is_empty(),
        can_restore: session.has_snapshot(),
        busy: session.is_busy(),
    }
}

// TAURI COMMANDS

#[tauri::command]
async fn import_bookmarks(path: String, state: State<'_, AppState>) -> Result<usize, String> {
    let bytes = tokio::fs::read(&path).await.map_err(|e| e.to_string())?;
    let mut session = state.session.lock().expect("session mutex");
    session.import_bytes(&bytes).map_err(|e| e.to_string())
}

#[tauri::command]
fn list_items(order: Option<SortOrder>, state: State<AppState>) -> FolderListing {
    let mut session = state.session.lock().expect("session mutex");
    listing(&mut session, order.unwrap_or_default())
}

#[tauri::command]
fn open_folder(index: usize, state: State<AppState>) -> FolderListing {
    let mut session = state.session.lock().expect("session mutex");
    session.enter(index);
    listing(&mut session, SortOrder::Default)
}

#[tauri::command]
fn go_back(state: State<AppState>) -> FolderListing {
    let mut session = state.session.lock().expect("session mutex");
    session.back();
    listing(&mut session, SortOrder::Default)
}

#[tauri::command]
fn group_by_site(state: State<AppState>) -> Result<FolderListing, String> {
    let mut session = state.session.lock().expect("session mutex");
    session.group_by_site().map_err(|e| e.to_string())?;
    Ok(listing(&mut session, SortOrder::Default))
}

#[tauri::command]
fn restore_structure(state: State<AppState>) -> Result<bool, String> {
    let mut session = state.session.lock().expect("session mutex");
    session.restore_snapshot().map_err(|e| e.to_string())
}

/// Number of removed duplicates, 0 when none were found.
#[tauri::command]
fn delete_duplicates(state: State<AppState>) -> Result<usize, String> {
    let mut session = state.session.lock().expect("session mutex");
    match session.dedupe().map_err(|e| e.to_string())? {
        DedupeOutcome::NoneFound => Ok(0),
        DedupeOutcome::Removed(count) => Ok(count),
    }
}

#[tauri::command]
async fn delete_dead_links(
    app: AppHandle,
    state: State<'_, AppState>,
) -> Result<DeadLinkSummary, String> {
    let (bookmarks, pace, timeout) = {
        let mut session = state.session.lock().expect("session mutex");
        let bookmarks = session.begin_dead_link_check().map_err(|e| e.to_string())?;
        let settings = state.settings.read().expect("settings read lock");
        (bookmarks, settings.probe_pace(), settings.probe_timeout())
    };
    state.cancel_check.store(false, Ordering::Relaxed);

    let probe = match HttpProbe::new(timeout) {
        Ok(probe) => probe,
        Err(e) => {
            let aborted = DeadLinkReport {
                cancelled: true,
                ..DeadLinkReport::default()
            };
            let mut session = state.session.lock().expect("session mutex");
            let _ = session.finish_dead_link_check(aborted);
            return Err(e.to_string());
        }
    };

    let report = filter_dead_links(
        bookmarks,
        &probe,
        pace,
        |progress: &ProbeProgress| {
            let _ = app.emit("dead-link-progress", progress.clone());
        },
        &state.cancel_check,
    )
    .await;

    let summary = DeadLinkSummary {
        checked: report.checked(),
        removed: report.broken.len(),
        cancelled: report.cancelled,
    };
    let mut session = state.session.lock().expect("session mutex");
    if let Err(e) = session.finish_dead_link_check(report) {
        warn!(
            "Dead-link result ({} checked, {} removed) not saved: {}",
            summary.checked, summary.removed, e
        );
        return Err(e.to_string());
    }
    Ok(summary)
}

#[tauri::command]
fn cancel_dead_link_check(state: State<AppState>) {
    state.cancel_check.store(true, Ordering::Relaxed);
}

#[tauri::command]
fn clear_bookmarks(state: State<AppState>) -> Result<(), String> {
    let mut session = state.session.lock().expect("session mutex");
    session.clear().map_err(|e| e.to_string())
}

#[tauri::command]
fn get_settings(state: State<AppState>) -> Settings {
    state.settings.read().expect("settings read lock").clone()
}

#[tauri::command]
fn update_settings(new_settings: Settings, state: State<AppState>) -> Result<(), String> {
    let mut session = state.session.lock().expect("session mutex");
    let key_changed =
        state.settings.read().expect("settings read lock").storage_key != new_settings.storage_key;
    if key_changed && session.is_busy() {
        return Err("Cannot switch collections during a dead-link check".to_string());
    }

    save_settings(&state.settings_path, &new_settings).map_err(|e| e.to_string())?;
    if key_changed {
        let store = session.store().clone();
        *session = Session::open(store, new_settings.storage_key.clone());
    }
    *state.settings.write().expect("settings write lock") = new_settings;
    Ok(())
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_dialog::init())
        .setup(|app| {
            let app_data = app.path().app_data_dir()?;
            std::fs::create_dir_all(&app_data)?;

            let settings_path = app_data.join("settings.json");
            let settings = load_settings(&settings_path);
            let store = FileStore::new(app_data.join("store"));
            let session = Session::open(store, settings.storage_key.clone());
            info!("Data directory: {}", app_data.display());

            app.manage(AppState {
                settings: RwLock::new(settings),
                settings_path,
                session: Mutex::new(session),
                cancel_check: AtomicBool::new(false),
            });
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            import_bookmarks,
            list_items,
            open_folder,
            go_back,
            group_by_site,
            restore_structure,
            delete_duplicates,
            delete_dead_links,
            cancel_dead_link_check,
            clear_bookmarks,
            get_settings,
            update_settings,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}

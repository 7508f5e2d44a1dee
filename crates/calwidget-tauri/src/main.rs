mod account;
mod cli;
mod keymap;
mod mock;

use std::process::ExitCode;
use std::sync::Arc;

use chrono::{Local, Utc};
use clap::Parser;
use tauri::{Emitter, Manager};
use tokio::sync::watch;
use tracing::{error, info, warn};

use calwidget_core::{
    EventDetail, Navigation, TracingConfig, WeekWindow, init_tracing, next_tick_delay, week_rollover,
};
use calwidget_google::google::GoogleProvider;
use calwidget_google::{ErrorProvider, ProviderError, WidgetProvider};
use calwidget_sync::{
    Banner, DiskCache, Scheduler, SchedulerHandle, SyncError, Syncer, WidgetConfig, WidgetView,
};

use crate::cli::{Cli, Command};
use crate::keymap::KeyAction;
use crate::mock::DemoProvider;

const EVENT_DATA_UPDATED: &str = "data-updated";
const EVENT_TICK: &str = "tick";

const TRAY_ID: &str = "calwidget-tray";
const MENU_ID_TOGGLE: &str = "toggle-window";
const MENU_ID_REFRESH: &str = "refresh";
const MENU_ID_QUIT: &str = "quit-app";

struct AppState {
    syncer: Arc<Syncer>,
    scheduler: SchedulerHandle,
}

#[tauri::command]
async fn get_week_view(state: tauri::State<'_, AppState>) -> Result<WidgetView, String> {
    Ok(state.syncer.view(&Local::now()).await)
}

#[tauri::command]
async fn refresh(state: tauri::State<'_, AppState>) -> Result<(), String> {
    state
        .scheduler
        .refresh(true)
        .await
        .map_err(|err| err.to_string())
}

#[tauri::command]
async fn navigate_week(
    direction: Navigation,
    state: tauri::State<'_, AppState>,
) -> Result<WidgetView, String> {
    navigate(&state, direction).await;
    Ok(state.syncer.view(&Local::now()).await)
}

#[tauri::command]
async fn complete_task(
    tasklist_id: String,
    task_id: String,
    state: tauri::State<'_, AppState>,
) -> Result<(), String> {
    state
        .syncer
        .complete_task(&tasklist_id, &task_id)
        .await
        .map(|_| ())
        .map_err(|err| err.to_string())
}

#[tauri::command]
async fn get_event_detail(
    calendar_id: String,
    event_id: String,
    state: tauri::State<'_, AppState>,
) -> Result<EventDetail, String> {
    state
        .syncer
        .event_detail(&calendar_id, &event_id, &Local)
        .await
        .map_err(|err| err.to_string())
}

#[tauri::command]
async fn open_event(
    calendar_id: String,
    event_id: String,
    state: tauri::State<'_, AppState>,
) -> Result<(), String> {
    let link = state
        .syncer
        .event_link(&calendar_id, &event_id)
        .await
        .map_err(|err| err.to_string())?
        .ok_or_else(|| "event has no calendar link".to_string())?;
    open::that(&link).map_err(|err| err.to_string())
}

#[tauri::command]
async fn reauthenticate(state: tauri::State<'_, AppState>) -> Result<(), String> {
    state
        .syncer
        .reauthenticate()
        .await
        .map_err(|err| err.to_string())?;
    spawn_refresh(state.syncer.clone());
    Ok(())
}

/// Applies a keyboard shortcut. Returns false when the key is not bound.
#[tauri::command]
async fn handle_key(
    key: String,
    ctrl: bool,
    app: tauri::AppHandle,
    state: tauri::State<'_, AppState>,
) -> Result<bool, String> {
    let Some(action) = KeyAction::from_key(&key, ctrl) else {
        return Ok(false);
    };
    match action {
        KeyAction::Navigate(direction) => navigate(&state, direction).await,
        KeyAction::Refresh => state
            .scheduler
            .refresh(true)
            .await
            .map_err(|err| err.to_string())?,
        KeyAction::Close => app.exit(0),
    }
    Ok(true)
}

#[tauri::command]
fn start_drag(window: tauri::WebviewWindow) -> Result<(), String> {
    window.start_dragging().map_err(|err| err.to_string())
}

#[tauri::command]
fn close_widget(app: tauri::AppHandle) -> Result<(), String> {
    app.exit(0);
    Ok(())
}

async fn navigate(state: &AppState, direction: Navigation) {
    state
        .syncer
        .navigate(direction, Local::now().date_naive())
        .await;
    spawn_refresh(state.syncer.clone());
}

/// Fetches the visible week outside the scheduler.
///
/// A refresh that is already running re-fetches on its own when the week
/// changed, so this never queues a second request.
fn spawn_refresh(syncer: Arc<Syncer>) {
    tauri::async_runtime::spawn(async move {
        if let Err(err) = syncer.refresh().await {
            warn!(error = %err, "refresh failed");
        }
    });
}

async fn forward_updates(app: tauri::AppHandle, mut revisions: watch::Receiver<u64>) {
    while revisions.changed().await.is_ok() {
        let revision = *revisions.borrow_and_update();
        if let Err(err) = app.emit(EVENT_DATA_UPDATED, revision) {
            warn!(error = %err, "failed to notify the webview");
        }
    }
}

/// Redraws the current-time indicator every minute and follows the calendar
/// into a new week at local midnight on Monday.
async fn run_clock(app: tauri::AppHandle, syncer: Arc<Syncer>) {
    let mut rollover = week_rollover(WeekWindow::current(&Local::now()), &Local);
    loop {
        tokio::time::sleep(next_tick_delay(Utc::now())).await;

        if Utc::now() >= rollover {
            let now = Local::now();
            rollover = week_rollover(WeekWindow::current(&now), &Local);
            if syncer.follow_current_week(now.date_naive()).await {
                spawn_refresh(syncer.clone());
            }
        }
        let _ = app.emit(EVENT_TICK, ());
    }
}

/// Shows or hides the widget. Polling pauses while it is hidden.
fn toggle_main_window<R: tauri::Runtime>(app: &tauri::AppHandle<R>) -> tauri::Result<()> {
    let Some(window) = app.get_webview_window("main") else {
        return Ok(());
    };
    let visible = !window.is_visible()?;
    if visible {
        window.show()?;
        window.unminimize()?;
        window.set_focus()?;
    } else {
        window.hide()?;
    }

    if let Some(state) = app.try_state::<AppState>() {
        let scheduler = state.scheduler.clone();
        tauri::async_runtime::spawn(async move {
            let sent = if visible {
                scheduler.resume().await
            } else {
                scheduler.pause().await
            };
            if let Err(err) = sent {
                warn!(error = %err, "scheduler is not running");
            }
        });
    }
    Ok(())
}

fn setup_tray(app: &mut tauri::App<tauri::Wry>) -> tauri::Result<()> {
    let toggle_item =
        tauri::menu::MenuItem::with_id(app, MENU_ID_TOGGLE, "Show/hide widget", true, None::<&str>)?;
    let refresh_item =
        tauri::menu::MenuItem::with_id(app, MENU_ID_REFRESH, "Refresh", true, None::<&str>)?;
    let quit_item = tauri::menu::MenuItem::with_id(app, MENU_ID_QUIT, "Quit", true, None::<&str>)?;
    let tray_menu = tauri::menu::Menu::with_items(app, &[&toggle_item, &refresh_item, &quit_item])?;

    let mut tray_builder = tauri::tray::TrayIconBuilder::with_id(TRAY_ID)
        .menu(&tray_menu)
        .tooltip("calwidget")
        .show_menu_on_left_click(false)
        .on_tray_icon_event(|tray, event| {
            if let tauri::tray::TrayIconEvent::Click {
                button: tauri::tray::MouseButton::Left,
                button_state: tauri::tray::MouseButtonState::Up,
                ..
            } = event
            {
                let _ = toggle_main_window(tray.app_handle());
            }
        })
        .on_menu_event(|app, event| match event.id().as_ref() {
            MENU_ID_TOGGLE => {
                let _ = toggle_main_window(app);
            }
            MENU_ID_REFRESH => {
                if let Some(state) = app.try_state::<AppState>() {
                    let scheduler = state.scheduler.clone();
                    tauri::async_runtime::spawn(async move {
                        let _ = scheduler.refresh(true).await;
                    });
                }
            }
            MENU_ID_QUIT => app.exit(0),
            _ => {}
        });

    if let Some(icon) = app.default_window_icon().cloned() {
        tray_builder = tray_builder.icon(icon);
    }
    let _tray = tray_builder.build(app)?;
    Ok(())
}

/// Picks the data source. A Google setup problem does not stop the widget;
/// it starts with an error banner instead.
fn build_provider(config: &WidgetConfig, mock: bool) -> (Arc<dyn WidgetProvider>, Option<Banner>) {
    if mock {
        info!("using demo data");
        return (Arc::new(DemoProvider::new(Local::now().date_naive())), None);
    }

    let provider = config
        .to_google_config()
        .and_then(|google| GoogleProvider::new(google).map_err(SyncError::from));
    match provider {
        Ok(provider) => (Arc::new(provider), None),
        Err(err) => {
            error!(error = %err, "Google is not configured");
            let err = ProviderError::configuration(err.to_string());
            let banner = Banner::for_error(&err);
            (Arc::new(ErrorProvider::new("google", err)), Some(banner))
        }
    }
}

fn run_widget(cli: &Cli, config: WidgetConfig, config_error: Option<String>) -> ExitCode {
    let (provider, mut banner) = build_provider(&config, cli.mock);
    if let Some(message) = config_error {
        banner = Some(Banner::Error { message });
    }

    let cache = (!cli.mock).then(|| DiskCache::new(config.cache_path()));
    let window = WeekWindow::current(&Local::now());
    let syncer = Arc::new(Syncer::new(provider, cache, window));

    let scheduler = Scheduler::new(config.scheduler_config());
    let scheduler_handle = scheduler.handle();
    let always_on_top = config.window.always_on_top;

    let setup_syncer = syncer.clone();
    let result = tauri::Builder::default()
        .plugin(tauri_plugin_window_state::Builder::default().build())
        .manage(AppState {
            syncer,
            scheduler: scheduler_handle,
        })
        .invoke_handler(tauri::generate_handler![
            get_week_view,
            refresh,
            navigate_week,
            complete_task,
            get_event_detail,
            open_event,
            reauthenticate,
            handle_key,
            start_drag,
            close_widget
        ])
        .setup(move |app| {
            setup_tray(app)?;
            if always_on_top && let Some(window) = app.get_webview_window("main") {
                window.set_always_on_top(true)?;
            }

            let handle = app.handle().clone();
            let syncer = setup_syncer;
            tauri::async_runtime::spawn(forward_updates(handle.clone(), syncer.subscribe()));
            tauri::async_runtime::spawn(run_clock(handle, syncer.clone()));
            tauri::async_runtime::spawn(async move {
                if banner.is_some() {
                    syncer.set_notice(banner).await;
                }
                syncer.load_cold_start().await;
                scheduler
                    .run(move || {
                        let syncer = syncer.clone();
                        async move {
                            syncer
                                .refresh()
                                .await
                                .map(|_| ())
                                .map_err(|err| err.to_string())
                        }
                    })
                    .await;
            });
            Ok(())
        })
        .run(tauri::generate_context!());

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: failed to run calwidget: {err}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> (WidgetConfig, Option<String>) {
    let loaded = match &cli.config {
        Some(path) => WidgetConfig::load_from(path),
        None => WidgetConfig::load(),
    };
    match loaded {
        Ok(config) => (config, None),
        Err(err) => (WidgetConfig::default(), Some(err.to_string())),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let (config, config_error) = load_config(&cli);

    let mut tracing_config = if cli.debug || config.debug {
        TracingConfig::debug()
    } else {
        TracingConfig::default()
    };
    if let Some(path) = &config.log.file {
        tracing_config = tracing_config.with_log_file(path);
    }
    if let Err(err) = init_tracing(tracing_config) {
        eprintln!("warning: failed to initialize logging: {err}");
    }

    let result = match cli.command {
        Some(Command::Auth { force }) => {
            tauri::async_runtime::block_on(account::auth(&config, force))
        }
        Some(Command::Logout) => account::logout(&config),
        Some(Command::Paths) => {
            let config_path = cli.config.clone().unwrap_or_else(WidgetConfig::default_path);
            account::paths(&config, &config_path);
            Ok(())
        }
        None => return run_widget(&cli, config, config_error),
    };

    // subcommands must not silently run with a broken config file
    if let Some(message) = config_error {
        eprintln!("warning: {message}");
    }
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

use crate::application::bootstrap::{bootstrap_workspace, Workspace};
use crate::application::oauth::{CredentialManager, OAuthConfig};
use crate::application::presenter::{render_text, short_labels, TracingPresenter};
use crate::application::scheduler::{CalendarView, SchedulerConfig, SyncScheduler};
use crate::application::task_store::{TaskStore, TaskSync};
use crate::domain::calendar_grid::{compute_grid, normalize_month, status_glyph};
use crate::domain::models::{RecurrenceRequest, TaskStatus};
use crate::error::CoreError;
use crate::infrastructure::client_secret::load_client_secret;
use crate::infrastructure::clock::LocalCalendar;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::connectivity::{ConnectivityProbe, TcpConnectivityProbe};
use crate::infrastructure::consent::{AuthorizationPrompt, LoopbackAuthorizationPrompt};
use crate::infrastructure::credential_store::ConfiguredCredentialStore;
use crate::infrastructure::change_signal::{ChangeSignalWatcher, FileChangeSignal};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::google_tasks_client::ReqwestGoogleTasksClient;
use crate::infrastructure::oauth_client::ReqwestOAuthClient;
use chrono::{DateTime, Datelike, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

pub type Credentials = CredentialManager<ConfiguredCredentialStore, ReqwestOAuthClient>;
pub type Store = TaskStore<Credentials, ReqwestGoogleTasksClient>;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Setup(#[from] InfraError),
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl CommandError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Setup(_) => "setup",
            Self::Core(error) => error.kind(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthStatus {
    pub signed_in: bool,
    pub token_valid: bool,
    pub can_refresh: bool,
    pub expiry: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}

pub struct AppState {
    workspace: Workspace,
    config: AppConfig,
    calendar: LocalCalendar,
    credentials: Arc<Credentials>,
    store: Arc<Store>,
    signal_path: PathBuf,
}

impl AppState {
    pub fn new(workspace_root: &Path) -> Result<Self, CommandError> {
        let bootstrap = bootstrap_workspace(workspace_root)?;
        let workspace = bootstrap.workspace;
        let config = bootstrap.config;

        let secret_path = config.client_secret_path(&workspace.config_dir);
        let secret = load_client_secret(&secret_path).map_err(CoreError::auth)?;
        let oauth_config =
            OAuthConfig::from_client_secret(&secret, config.scopes.clone(), config.auth_timeout());

        let credential_store = Arc::new(ConfiguredCredentialStore::new(
            config.credential_store,
            workspace.token_path(),
        ));
        let oauth_client = Arc::new(ReqwestOAuthClient::new(config.request_timeout())?);
        let prompt: Arc<dyn AuthorizationPrompt> = Arc::new(LoopbackAuthorizationPrompt::default());
        let probe: Arc<dyn ConnectivityProbe> = Arc::new(TcpConnectivityProbe::new(
            config.connectivity_probe_address.clone(),
            PROBE_TIMEOUT,
        ));
        let credentials = Arc::new(CredentialManager::new(
            oauth_config,
            credential_store,
            oauth_client,
            prompt,
            probe,
        ));

        let signal = FileChangeSignal::in_state_dir(&workspace.state_dir);
        let signal_path = signal.path().to_path_buf();
        let tasks_client = Arc::new(ReqwestGoogleTasksClient::new(config.request_timeout())?);
        let store = Arc::new(TaskStore::new(
            config.task_list_name.clone(),
            Arc::clone(&credentials),
            tasks_client,
            Arc::new(signal),
        ));
        let calendar = LocalCalendar::from_name(config.timezone.as_deref());

        Ok(Self {
            workspace,
            config,
            calendar,
            credentials,
            store,
            signal_path,
        })
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn command_error(&self, command: &str, error: &CommandError) -> String {
        error!(command, kind = error.kind(), %error, "command failed");
        error.to_string()
    }
}

/// Runs the scheduler until ctrl-c, relaying the data-changed signal file
/// into it.
pub async fn run_daemon_impl(state: &AppState) -> Result<(), CommandError> {
    let scheduler = SyncScheduler::new(
        Arc::clone(&state.store),
        Arc::new(TracingPresenter),
        SchedulerConfig::from_app_config(&state.config),
        state.calendar,
    );
    let running = scheduler.spawn();
    let handle = running.handle();

    let mut watcher = ChangeSignalWatcher::start(&state.signal_path)?;
    let relay = tokio::spawn(async move {
        while watcher.changed().await.is_some() {
            handle.data_changed();
        }
    });

    info!(
        root = %state.workspace.root.display(),
        list = state.store.list_name(),
        "daemon started"
    );
    let stopped = tokio::signal::ctrl_c().await.map_err(InfraError::from);

    relay.abort();
    running.shutdown().await;
    info!("daemon stopped");
    stopped.map_err(CommandError::from)
}

/// One-shot sync of a month rendered as text. Defaults to the current month.
pub async fn show_month_impl(
    state: &AppState,
    year: Option<i32>,
    month: Option<u32>,
) -> Result<String, CommandError> {
    let today = state.calendar.today(Utc::now());
    let requested_month = month.map_or(today.month() as i32, |value| {
        i32::try_from(value).unwrap_or(i32::MAX)
    });
    let (year, month) = normalize_month(year.unwrap_or(today.year()), requested_month);

    let grid = compute_grid(year, month, today);
    let (start, end) = grid.range();
    let bucket = state.store.sync(start, end).await?;

    let view = CalendarView {
        month,
        year,
        grid,
        bucket: Arc::new(bucket),
        today,
        is_current_month: year == today.year() && month == today.month(),
        last_error: None,
        status: status_glyph(today, &state.config.weekday_labels),
        revision: 0,
    };
    Ok(render_text(&view, &short_labels()))
}

pub async fn add_task_impl(
    state: &AppState,
    request: &RecurrenceRequest,
) -> Result<Vec<String>, CommandError> {
    Ok(state.store.create_recurring(request).await?)
}

pub async fn set_status_impl(
    state: &AppState,
    task_id: &str,
    status: TaskStatus,
) -> Result<(), CommandError> {
    Ok(state.store.set_status(task_id, status).await?)
}

pub async fn toggle_status_impl(state: &AppState, task_id: &str) -> Result<TaskStatus, CommandError> {
    Ok(state.store.toggle_status(task_id).await?)
}

pub async fn rename_task_impl(
    state: &AppState,
    task_id: &str,
    title: &str,
    notes: &str,
) -> Result<(), CommandError> {
    Ok(state.store.rename(task_id, title, notes).await?)
}

pub async fn remove_task_impl(state: &AppState, task_id: &str) -> Result<(), CommandError> {
    Ok(state.store.remove(task_id).await?)
}

pub async fn auth_login_impl(state: &AppState) -> Result<AuthStatus, CommandError> {
    state.credentials.authorize_interactively().await?;
    auth_status_impl(state).await
}

pub async fn auth_logout_impl(state: &AppState) -> Result<(), CommandError> {
    Ok(state.credentials.sign_out().await?)
}

pub async fn auth_status_impl(state: &AppState) -> Result<AuthStatus, CommandError> {
    let status = match state.credentials.stored_token().await? {
        Some(token) => AuthStatus {
            signed_in: true,
            token_valid: state.credentials.is_token_valid(&token),
            can_refresh: token.can_refresh(),
            expiry: Some(token.expiry),
            scopes: token.scopes,
        },
        None => AuthStatus {
            signed_in: false,
            token_valid: false,
            can_refresh: false,
            expiry: None,
            scopes: Vec::new(),
        },
    };
    Ok(status)
}

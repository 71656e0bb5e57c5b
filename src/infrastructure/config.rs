use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_JSON: &str = "app.json";
const SCHEMA_VERSION: u64 = 1;

pub const TASKS_SCOPE: &str = "https://www.googleapis.com/auth/tasks";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CredentialBackend {
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub schema: u64,
    pub task_list_name: String,
    pub client_secret_path: String,
    pub credential_store: CredentialBackend,
    pub scopes: Vec<String>,
    pub timezone: Option<String>,
    pub heartbeat_seconds: u64,
    pub auth_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
    pub wake_check_seconds: u64,
    pub wake_jump_threshold_seconds: u64,
    pub connectivity_probe_address: String,
    pub weekday_labels: [String; 7],
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema: SCHEMA_VERSION,
            task_list_name: "My List".to_string(),
            client_secret_path: "client_secret.json".to_string(),
            credential_store: CredentialBackend::File,
            scopes: vec![TASKS_SCOPE.to_string()],
            timezone: None,
            heartbeat_seconds: 60,
            auth_timeout_seconds: 60,
            request_timeout_seconds: 30,
            wake_check_seconds: 15,
            wake_jump_threshold_seconds: 60,
            connectivity_probe_address: "www.google.com:80".to_string(),
            weekday_labels: ["Thứ 2", "Thứ 3", "Thứ 4", "Thứ 5", "Thứ 6", "Thứ 7", "Chủ Nhật"]
                .map(String::from),
        }
    }
}

impl AppConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_seconds.max(1))
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_seconds.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.max(1))
    }

    pub fn wake_check_interval(&self) -> Duration {
        Duration::from_secs(self.wake_check_seconds.max(1))
    }

    pub fn wake_jump_threshold(&self) -> Duration {
        Duration::from_secs(self.wake_jump_threshold_seconds)
    }

    pub fn client_secret_path(&self, config_dir: &Path) -> PathBuf {
        let path = PathBuf::from(self.client_secret_path.trim());
        if path.is_absolute() {
            path
        } else {
            config_dir.join(path)
        }
    }

    fn validate(&self) -> Result<(), InfraError> {
        if self.task_list_name.trim().is_empty() {
            return Err(InfraError::InvalidConfig(
                "taskListName must not be empty".to_string(),
            ));
        }
        if self.scopes.iter().all(|scope| scope.trim().is_empty()) {
            return Err(InfraError::InvalidConfig(
                "at least one scope is required".to_string(),
            ));
        }
        if let Some(timezone) = self.timezone.as_deref() {
            timezone.parse::<chrono_tz::Tz>().map_err(|error| {
                InfraError::InvalidConfig(format!("unknown timezone '{timezone}': {error}"))
            })?;
        }
        Ok(())
    }
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&AppConfig::default())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SCHEMA_VERSION {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_app_config(config_dir: &Path) -> Result<AppConfig, InfraError> {
    let path = config_dir.join(APP_JSON);
    let config: AppConfig = serde_json::from_value(read_config(&path)?)?;
    config.validate()?;
    Ok(config)
}

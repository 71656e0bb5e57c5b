use crate::infrastructure::config::{ensure_default_configs, load_app_config, AppConfig};
use crate::infrastructure::error::InfraError;
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "taskcal";
const TOKEN_FILE_NAME: &str = "token.json";

#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub config_dir: PathBuf,
    pub state_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl Workspace {
    pub fn at(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            config_dir: root.join("config"),
            state_dir: root.join("state"),
            logs_dir: root.join("logs"),
        }
    }

    pub fn token_path(&self) -> PathBuf {
        self.state_dir.join(TOKEN_FILE_NAME)
    }
}

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace: Workspace,
    pub config: AppConfig,
}

/// `<platform config dir>/taskcal`, or the working directory when the
/// platform reports none.
pub fn default_workspace_root() -> Result<PathBuf, InfraError> {
    match dirs::config_dir() {
        Some(dir) => Ok(dir.join(APP_DIR_NAME)),
        None => Ok(std::env::current_dir()?.join(APP_DIR_NAME)),
    }
}

pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let workspace = Workspace::at(workspace_root);

    fs::create_dir_all(&workspace.config_dir)?;
    fs::create_dir_all(&workspace.state_dir)?;
    fs::create_dir_all(&workspace.logs_dir)?;

    ensure_default_configs(&workspace.config_dir)?;
    let config = load_app_config(&workspace.config_dir)?;

    Ok(BootstrapResult { workspace, config })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn bootstrap_creates_layout_and_default_config() {
        let temp = tempdir().expect("temp dir");
        let root = temp.path().join("ws");

        let result = bootstrap_workspace(&root).expect("bootstrap");

        assert!(result.workspace.config_dir.join("app.json").is_file());
        assert!(result.workspace.state_dir.is_dir());
        assert!(result.workspace.logs_dir.is_dir());
        assert_eq!(result.workspace.token_path(), root.join("state").join("token.json"));
        assert_eq!(result.config, AppConfig::default());
    }

    #[test]
    fn bootstrap_keeps_existing_config() {
        let temp = tempdir().expect("temp dir");
        let config_dir = temp.path().join("config");
        fs::create_dir_all(&config_dir).expect("config dir");
        fs::write(
            config_dir.join("app.json"),
            r#"{"schema":1,"taskListName":"Errands","heartbeatSeconds":120}"#,
        )
        .expect("write config");

        let result = bootstrap_workspace(temp.path()).expect("bootstrap");

        assert_eq!(result.config.task_list_name, "Errands");
        assert_eq!(result.config.heartbeat_seconds, 120);
        assert_eq!(result.config.auth_timeout_seconds, 60);
    }
}

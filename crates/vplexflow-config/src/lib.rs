pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use vplexflow_engine::{FailurePolicy, OrchestratorConfig, WaitConfig};

/// Environment variable naming a settings file; it bypasses discovery
pub const CONFIG_ENV: &str = "VPLEXFLOW_CONFIG";

const CANDIDATES: [&str; 4] = [
    "vplexflow.local.yaml",
    ".vplexflow.local.yaml",
    "vplexflow.yaml",
    ".vplexflow.yaml",
];

/// Connection fields; any of them can be overridden on the command line
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    /// Never written back out
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub verify_cert: Option<bool>,
    /// PEM bundle, required once `verify_cert` is on
    pub ssl_ca_cert: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

/// Default clusters for provision and teardown
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterSettings {
    pub source: Option<String>,
    /// Second cluster of a metro pair
    pub target: Option<String>,
}

/// How long to wait for device rebuilds
///
/// Unset fields fall back to [`WaitConfig::default`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WaitSettings {
    /// Polls before the wait times out
    pub max_retries: Option<u32>,
    pub delay_secs: Option<u64>,
}

/// Contents of a vplexflow.yaml file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub connection: ConnectionSettings,
    pub clusters: ClusterSettings,
    pub wait: WaitSettings,
    pub concurrency: Option<usize>,
    pub failure_policy: Option<FailurePolicy>,
}

impl Settings {
    /// Read and validate a settings file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        debug!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Load the discovered settings file, or defaults when there is none
    pub fn discover() -> Result<(Option<PathBuf>, Self)> {
        match find_settings_file() {
            Ok(path) => {
                let settings = Self::load(&path)?;
                Ok((Some(path), settings))
            }
            Err(ConfigError::SettingsFileNotFound) => Ok((None, Self::default())),
            Err(e) => Err(e),
        }
    }

    /// `concurrency` and `wait.max_retries` must be at least 1 when set
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == Some(0) {
            return Err(ConfigError::Invalid(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.wait.max_retries == Some(0) {
            return Err(ConfigError::Invalid(
                "wait.max_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn wait_config(&self) -> WaitConfig {
        let defaults = WaitConfig::default();
        WaitConfig::new(
            self.wait.max_retries.unwrap_or(defaults.max_retries),
            self.wait
                .delay_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.delay),
        )
    }

    /// Orchestrator tuning, defaults filled in
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let defaults = OrchestratorConfig::default();
        OrchestratorConfig {
            concurrency: self.concurrency.unwrap_or(defaults.concurrency),
            wait: self.wait_config(),
            failure_policy: self.failure_policy.unwrap_or(defaults.failure_policy),
        }
    }
}

/// `~/.config/vplexflow/vplexflow.yaml`, if a config directory exists
pub fn global_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("vplexflow").join("vplexflow.yaml"))
}

/// Locate the settings file
///
/// Search order:
/// 1. `VPLEXFLOW_CONFIG` (direct path)
/// 2. current directory: vplexflow.local.yaml, .vplexflow.local.yaml, vplexflow.yaml, .vplexflow.yaml
/// 3. `./.vplexflow/`, same order
/// 4. `~/.config/vplexflow/vplexflow.yaml`
pub fn find_settings_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::ExplicitPathMissing(path));
    }

    let current_dir = std::env::current_dir()?;
    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let local_dir = current_dir.join(".vplexflow");
    if local_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = local_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(global) = global_settings_path() {
        if global.exists() {
            return Ok(global);
        }
    }

    Err(ConfigError::SettingsFileNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    const SAMPLE: &str = r#"
connection:
  host: 10.0.0.5
  user: service
  verify_cert: false
clusters:
  source: cluster-1
  target: cluster-2
wait:
  max_retries: 20
  delay_secs: 10
concurrency: 2
failure_policy: best-effort-rollback
"#;

    /// Run `f` inside `dir` with no explicit path and an empty home
    fn in_dir<R>(dir: &Path, f: impl FnOnce() -> R) -> R {
        let home = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir).unwrap();
        let result = temp_env::with_vars(
            [
                (CONFIG_ENV, None),
                ("HOME", Some(home.path().as_os_str())),
                ("XDG_CONFIG_HOME", Some(home.path().join(".config").as_os_str())),
            ],
            f,
        );
        std::env::set_current_dir(original_dir).unwrap();
        result
    }

    #[test]
    fn test_parse_sample() {
        let settings: Settings = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(settings.connection.host.as_deref(), Some("10.0.0.5"));
        assert_eq!(settings.clusters.target.as_deref(), Some("cluster-2"));

        let config = settings.orchestrator_config();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.failure_policy, FailurePolicy::BestEffortRollback);
        assert_eq!(config.wait.max_retries, 20);
        assert_eq!(config.wait.delay, Duration::from_secs(10));
    }

    #[test]
    fn test_defaults_when_empty() {
        let settings: Settings = serde_yaml::from_str("{}").unwrap();
        assert_eq!(settings, Settings::default());
        let config = settings.orchestrator_config();
        assert_eq!(config.wait, WaitConfig::default());
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("vplexflow.yaml");
        fs::write(&path, "concurrancy: 2\n").unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("vplexflow.yaml");
        fs::write(&path, "concurrency: 0\n").unwrap();
        assert!(matches!(Settings::load(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    #[serial]
    fn test_find_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("vplexflow.yaml"), SAMPLE).unwrap();

        let found = in_dir(temp_dir.path(), find_settings_file).unwrap();
        assert!(found.ends_with("vplexflow.yaml"));
    }

    #[test]
    #[serial]
    fn test_local_file_takes_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("vplexflow.yaml"), "{}").unwrap();
        fs::write(temp_dir.path().join(".vplexflow.local.yaml"), "{}").unwrap();

        let found = in_dir(temp_dir.path(), find_settings_file).unwrap();
        assert!(found.ends_with(".vplexflow.local.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_in_project_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let project_dir = temp_dir.path().join(".vplexflow");
        fs::create_dir(&project_dir).unwrap();
        fs::write(project_dir.join("vplexflow.yaml"), "{}").unwrap();

        let found = in_dir(temp_dir.path(), find_settings_file).unwrap();
        assert!(found.ends_with(".vplexflow/vplexflow.yaml"));
    }

    #[test]
    #[serial]
    fn test_env_var_wins() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, SAMPLE).unwrap();

        let found = temp_env::with_var(CONFIG_ENV, Some(config_path.as_os_str()), || {
            find_settings_file().unwrap()
        });
        assert_eq!(found, config_path);
    }

    #[test]
    #[serial]
    fn test_env_var_pointing_nowhere() {
        let result = temp_env::with_var(CONFIG_ENV, Some("/nonexistent/vplexflow.yaml"), || {
            find_settings_file()
        });
        assert!(matches!(result, Err(ConfigError::ExplicitPathMissing(_))));
    }

    #[test]
    #[serial]
    fn test_not_found_falls_back_to_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();

        let result = in_dir(temp_dir.path(), find_settings_file);
        assert!(matches!(result, Err(ConfigError::SettingsFileNotFound)));

        let (path, settings) = in_dir(temp_dir.path(), Settings::discover).unwrap();
        assert!(path.is_none());
        assert_eq!(settings, Settings::default());
    }
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Input configuration for one workflow run.
///
/// `repo_path`, `org_id` and `project_id` are required; the init phase turns
/// each missing one into its own validation error. `repo_url` is optional and
/// is discovered from the repository itself when absent. `skip_approval`
/// presets the approval gate so the run never suspends.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub repo_path: PathBuf,
    pub repo_url: Option<String>,
    pub org_id: String,
    pub project_id: String,
    pub skip_approval: bool,
}

impl RunConfig {
    pub fn new(repo_path: impl Into<PathBuf>, org_id: &str, project_id: &str) -> Self {
        Self {
            repo_path: repo_path.into(),
            repo_url: None,
            org_id: org_id.to_string(),
            project_id: project_id.to_string(),
            skip_approval: false,
        }
    }

    pub fn with_repo_url(mut self, url: Option<String>) -> Self {
        self.repo_url = url;
        self
    }

    pub fn with_skip_approval(mut self, skip: bool) -> Self {
        self.skip_approval = skip;
        self
    }

    /// Names of required fields that are missing, in declaration order.
    ///
    /// Empty means the config is valid. Each entry becomes one
    /// `"<field> is required"` validation error during init.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.repo_path.as_os_str().is_empty() {
            missing.push("repo_path");
        }
        if self.org_id.is_empty() {
            missing.push("org_id");
        }
        if self.project_id.is_empty() {
            missing.push("project_id");
        }
        missing
    }
}

/// On-disk settings file format (`pipewright.toml`), all fields optional.
#[derive(Debug, Clone, Default, Deserialize)]
struct SettingsFile {
    state_dir: Option<PathBuf>,
    platform_api_url: Option<String>,
}

/// Resolved runtime settings.
///
/// Layering, lowest to highest precedence: built-in defaults,
/// `pipewright.toml` in the project directory, environment variables
/// (`PLATFORM_API_URL`, `PLATFORM_API_KEY`), CLI flags (applied by the
/// caller).
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory holding checkpoints, one JSON document per workflow id.
    pub state_dir: PathBuf,
    /// Base URL of the delivery platform API; absent means the capability
    /// registry runs in degraded (empty) mode.
    pub platform_api_url: Option<String>,
    /// API key for the platform, taken from the environment only.
    pub platform_api_key: Option<String>,
}

impl Settings {
    pub const SETTINGS_FILE: &'static str = "pipewright.toml";
    pub const DEFAULT_STATE_DIR: &'static str = ".pipewright";

    /// Load settings for a project directory.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let file = Self::read_settings_file(project_dir)?;

        let state_dir = file
            .state_dir
            .map(|dir| {
                if dir.is_absolute() {
                    dir
                } else {
                    project_dir.join(dir)
                }
            })
            .unwrap_or_else(|| project_dir.join(Self::DEFAULT_STATE_DIR));

        let platform_api_url = std::env::var("PLATFORM_API_URL")
            .ok()
            .filter(|url| !url.is_empty())
            .or(file.platform_api_url);
        let platform_api_key = std::env::var("PLATFORM_API_KEY")
            .ok()
            .filter(|key| !key.is_empty());

        Ok(Self {
            state_dir,
            platform_api_url,
            platform_api_key,
        })
    }

    fn read_settings_file(project_dir: &Path) -> Result<SettingsFile> {
        let path = project_dir.join(Self::SETTINGS_FILE);
        if !path.exists() {
            return Ok(SettingsFile::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    pub fn ensure_state_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.state_dir).with_context(|| {
            format!(
                "Failed to create state directory: {}",
                self.state_dir.display()
            )
        })
    }
}

//! Layered configuration system
//!
//! Config is loaded with three layers of precedence (highest wins):
//! 1. Environment variables: `NOVAFORGE_{PROVIDER}_API_KEY`
//! 2. Project-local: `.novaforge/config.toml`
//! 3. Global: `~/.novaforge/config.toml`
//!
//! The resolved [`ForgeConfig`] is immutable. It is built once at process
//! start and handed to each component explicitly.

use nova_core::{NovaError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Provider name of the prompt classifier (reasoning service)
pub const REASONING: &str = "reasoning";
/// Provider name of the concept image generator
pub const FLUX: &str = "flux";
/// Provider name of the mesh generator
pub const MESHY: &str = "meshy";

const PROVIDER_NAMES: [&str; 3] = [REASONING, FLUX, MESHY];

const DEFAULT_CLASSIFIER_TIMEOUT_SECS: u64 = 20;
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 60;

const DEFAULT_LORE: &str = "You are the art director of NovaForge, a studio that builds \
stylized real-time 3D worlds. Assets must read clearly at game-camera distance, favor bold \
silhouettes and physically plausible proportions, and fit a cohesive science-fantasy setting.";

/// Provider-specific configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
    /// Secondary endpoint (Meshy image-to-3d)
    #[serde(default)]
    pub image_api_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Whether a CloudMesh dispatch waits for the mesh before responding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudMeshMode {
    #[default]
    Background,
    Blocking,
}

/// Pipeline behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Inline lore/context preamble for the classifier
    #[serde(default)]
    pub lore: Option<String>,
    /// Path to a file holding the lore preamble
    #[serde(default)]
    pub lore_file: Option<String>,
    /// Time the caller is willing to wait for a dispatch response
    #[serde(default = "default_response_budget")]
    pub response_budget_secs: u64,
    #[serde(default)]
    pub cloud_mesh_mode: CloudMeshMode,
    /// Object-store prefix under which results are written
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,
    /// Root directory for the job store and local object storage
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Wire local mock providers instead of the remote services
    #[serde(default)]
    pub use_mock_providers: bool,
    /// CloudMesh jobs untouched this long in generating/processing are
    /// treated as orphaned by a dead process and failed at startup
    #[serde(default = "default_abandoned_task_secs")]
    pub abandoned_task_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lore: None,
            lore_file: None,
            response_budget_secs: default_response_budget(),
            cloud_mesh_mode: CloudMeshMode::default(),
            output_prefix: default_output_prefix(),
            data_dir: default_data_dir(),
            use_mock_providers: false,
            abandoned_task_secs: default_abandoned_task_secs(),
        }
    }
}

fn default_response_budget() -> u64 {
    30
}
fn default_abandoned_task_secs() -> u64 {
    3600
}
fn default_output_prefix() -> String {
    "outputs".to_string()
}
fn default_data_dir() -> String {
    ".novaforge/data".to_string()
}

/// A registered caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub api_key: String,
}

/// HTTP interface settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

/// Top-level config file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForgeConfigFile {
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub accounts: HashMap<String, AccountConfig>,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Resolved configuration with environment variable overrides applied
#[derive(Debug, Clone)]
pub struct ForgeConfig {
    pub providers: HashMap<String, ProviderConfig>,
    pub pipeline: PipelineConfig,
    pub accounts: HashMap<String, AccountConfig>,
    pub server: ServerConfig,
    lore: String,
}

impl ForgeConfig {
    /// Load config with layered precedence: global < project < env vars
    pub fn load() -> Result<Self> {
        let mut config = ForgeConfigFile::default();

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                let global = Self::load_file(&global_path)?;
                Self::merge_into(&mut config, global);
            }
        }

        let local_path = PathBuf::from(".novaforge/config.toml");
        if local_path.exists() {
            let local = Self::load_file(&local_path)?;
            Self::merge_into(&mut config, local);
        }

        Self::apply_env_overrides(&mut config);
        Self::resolve(config)
    }

    /// Load config from a specific file path only
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let mut config = Self::load_file(path)?;
        Self::apply_env_overrides(&mut config);
        Self::resolve(config)
    }

    /// Resolve a parsed file into the runtime config, validating it
    pub fn resolve(file: ForgeConfigFile) -> Result<Self> {
        let lore = match (&file.pipeline.lore, &file.pipeline.lore_file) {
            (Some(inline), _) => inline.clone(),
            (None, Some(path)) => std::fs::read_to_string(path).map_err(|e| {
                NovaError::Config(format!("Failed to read lore file {}: {}", path, e))
            })?,
            (None, None) => DEFAULT_LORE.to_string(),
        };

        let config = ForgeConfig {
            providers: file.providers,
            pipeline: file.pipeline,
            accounts: file.accounts,
            server: file.server,
            lore,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        // Classifier must answer inside the response budget
        if self.classifier_timeout() > self.response_budget() {
            return Err(NovaError::Config(format!(
                "Classifier timeout ({}s) exceeds response budget ({}s)",
                self.classifier_timeout().as_secs(),
                self.pipeline.response_budget_secs
            )));
        }
        if self.pipeline.abandoned_task_secs == 0 {
            return Err(NovaError::Config(
                "pipeline.abandoned_task_secs must be positive".to_string(),
            ));
        }
        if self.pipeline.output_prefix.trim_matches('/').is_empty() {
            return Err(NovaError::Config(
                "pipeline.output_prefix must not be empty".to_string(),
            ));
        }
        for (name, account) in &self.accounts {
            if account.api_key.trim().is_empty() {
                return Err(NovaError::Config(format!(
                    "Account '{}' has an empty api_key",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Get API key for a provider
    pub fn api_key(&self, provider_name: &str) -> Option<&str> {
        self.providers
            .get(provider_name)
            .and_then(|p| p.api_key.as_deref())
            .filter(|k| !k.is_empty())
    }

    /// Get API URL override for a provider
    pub fn api_url(&self, provider_name: &str) -> Option<&str> {
        self.providers
            .get(provider_name)
            .and_then(|p| p.api_url.as_deref())
    }

    pub fn image_api_url(&self, provider_name: &str) -> Option<&str> {
        self.providers
            .get(provider_name)
            .and_then(|p| p.image_api_url.as_deref())
    }

    pub fn model(&self, provider_name: &str) -> Option<&str> {
        self.providers
            .get(provider_name)
            .and_then(|p| p.model.as_deref())
    }

    /// Check if a provider is enabled
    pub fn is_enabled(&self, provider_name: &str) -> bool {
        self.providers
            .get(provider_name)
            .map(|p| p.enabled)
            .unwrap_or(true)
    }

    /// Per-request timeout for a provider
    pub fn timeout(&self, provider_name: &str) -> Duration {
        let default = if provider_name == REASONING {
            DEFAULT_CLASSIFIER_TIMEOUT_SECS
        } else {
            DEFAULT_PROVIDER_TIMEOUT_SECS
        };
        let secs = self
            .providers
            .get(provider_name)
            .and_then(|p| p.timeout_secs)
            .unwrap_or(default);
        Duration::from_secs(secs)
    }

    pub fn classifier_timeout(&self) -> Duration {
        self.timeout(REASONING)
    }

    pub fn response_budget(&self) -> Duration {
        Duration::from_secs(self.pipeline.response_budget_secs)
    }

    /// Lore/context preamble sent with every classification
    pub fn lore(&self) -> &str {
        &self.lore
    }

    pub fn cloud_mesh_mode(&self) -> CloudMeshMode {
        self.pipeline.cloud_mesh_mode
    }

    pub fn abandoned_task_age(&self) -> Duration {
        Duration::from_secs(self.pipeline.abandoned_task_secs)
    }

    pub fn output_prefix(&self) -> &str {
        self.pipeline.output_prefix.trim_matches('/')
    }

    /// Directory holding the `.job.toml` records
    pub fn jobs_dir(&self) -> PathBuf {
        Path::new(&self.pipeline.data_dir).join("jobs")
    }

    /// Directory backing the local object store
    pub fn objects_dir(&self) -> PathBuf {
        Path::new(&self.pipeline.data_dir).join("objects")
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".novaforge").join("config.toml"))
    }

    fn load_file(path: &Path) -> Result<ForgeConfigFile> {
        let content = std::fs::read_to_string(path)?;
        let config: ForgeConfigFile = toml::from_str(&content).map_err(|e| {
            NovaError::Config(format!("Failed to parse config {}: {}", path.display(), e))
        })?;
        Ok(config)
    }

    fn merge_into(base: &mut ForgeConfigFile, overlay: ForgeConfigFile) {
        for (name, provider) in overlay.providers {
            let entry = base.providers.entry(name).or_default();
            if provider.api_key.is_some() {
                entry.api_key = provider.api_key;
            }
            if provider.api_url.is_some() {
                entry.api_url = provider.api_url;
            }
            if provider.image_api_url.is_some() {
                entry.image_api_url = provider.image_api_url;
            }
            if provider.model.is_some() {
                entry.model = provider.model;
            }
            if provider.timeout_secs.is_some() {
                entry.timeout_secs = provider.timeout_secs;
            }
            entry.enabled = provider.enabled;
        }

        let defaults = PipelineConfig::default();
        let pipeline = overlay.pipeline;
        if pipeline.lore.is_some() {
            base.pipeline.lore = pipeline.lore;
        }
        if pipeline.lore_file.is_some() {
            base.pipeline.lore_file = pipeline.lore_file;
        }
        if pipeline.response_budget_secs != defaults.response_budget_secs {
            base.pipeline.response_budget_secs = pipeline.response_budget_secs;
        }
        if pipeline.cloud_mesh_mode != defaults.cloud_mesh_mode {
            base.pipeline.cloud_mesh_mode = pipeline.cloud_mesh_mode;
        }
        if pipeline.output_prefix != defaults.output_prefix {
            base.pipeline.output_prefix = pipeline.output_prefix;
        }
        if pipeline.data_dir != defaults.data_dir {
            base.pipeline.data_dir = pipeline.data_dir;
        }
        if pipeline.use_mock_providers {
            base.pipeline.use_mock_providers = true;
        }
        if pipeline.abandoned_task_secs != defaults.abandoned_task_secs {
            base.pipeline.abandoned_task_secs = pipeline.abandoned_task_secs;
        }

        base.accounts.extend(overlay.accounts);

        if overlay.server != ServerConfig::default() {
            base.server = overlay.server;
        }
    }

    fn apply_env_overrides(config: &mut ForgeConfigFile) {
        for name in &PROVIDER_NAMES {
            let env_key = format!("NOVAFORGE_{}_API_KEY", name.to_uppercase());
            if let Ok(key) = std::env::var(&env_key) {
                let entry = config.providers.entry(name.to_string()).or_default();
                entry.api_key = Some(key);
            }
        }
    }
}

impl Default for ForgeConfig {
    fn default() -> Self {
        ForgeConfig {
            providers: HashMap::new(),
            pipeline: PipelineConfig::default(),
            accounts: HashMap::new(),
            server: ServerConfig::default(),
            lore: DEFAULT_LORE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[providers.flux]
api_key = "fal-test"
api_url = "https://queue.example.com/flux"

[providers.meshy]
enabled = false
timeout_secs = 90

[pipeline]
lore = "Desert planet, brass and sandstone."
response_budget_secs = 45
cloud_mesh_mode = "blocking"
output_prefix = "/renders/"

[accounts.commander]
api_key = "nf_live_test"

[server]
bind = "127.0.0.1:9000"
"#,
        );

        let config = ForgeConfig::load_from_file(&path).unwrap();
        assert_eq!(config.api_url(FLUX), Some("https://queue.example.com/flux"));
        assert!(!config.is_enabled(MESHY));
        assert_eq!(config.timeout(MESHY), Duration::from_secs(90));
        assert_eq!(config.lore(), "Desert planet, brass and sandstone.");
        assert_eq!(config.cloud_mesh_mode(), CloudMeshMode::Blocking);
        assert_eq!(config.output_prefix(), "renders");
        assert_eq!(config.accounts["commander"].api_key, "nf_live_test");
        assert_eq!(config.server.bind, "127.0.0.1:9000");
    }

    #[test]
    fn test_env_var_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[providers.reasoning]
api_key = "file-key"
"#,
        );

        std::env::set_var("NOVAFORGE_REASONING_API_KEY", "env-key-override");
        let config = ForgeConfig::load_from_file(&path).unwrap();
        std::env::remove_var("NOVAFORGE_REASONING_API_KEY");

        assert_eq!(config.api_key(REASONING), Some("env-key-override"));
    }

    #[test]
    fn test_lore_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let lore_path = dir.path().join("lore.txt");
        std::fs::write(&lore_path, "Frozen moon colony.").unwrap();

        let mut file = ForgeConfigFile::default();
        file.pipeline.lore_file = Some(lore_path.to_string_lossy().to_string());
        let config = ForgeConfig::resolve(file).unwrap();
        assert_eq!(config.lore(), "Frozen moon colony.");
    }

    #[test]
    fn test_classifier_timeout_must_fit_budget() {
        let mut file = ForgeConfigFile::default();
        file.pipeline.response_budget_secs = 5;
        file.providers.insert(
            REASONING.to_string(),
            ProviderConfig {
                timeout_secs: Some(10),
                enabled: true,
                ..Default::default()
            },
        );
        let err = ForgeConfig::resolve(file).unwrap_err();
        assert!(matches!(err, NovaError::Config(_)));
    }

    #[test]
    fn test_empty_account_key_rejected() {
        let mut file = ForgeConfigFile::default();
        file.accounts.insert(
            "ghost".to_string(),
            AccountConfig {
                api_key: "  ".to_string(),
            },
        );
        assert!(ForgeConfig::resolve(file).is_err());
    }

    #[test]
    fn test_merge_overlay_wins() {
        let mut base: ForgeConfigFile = toml::from_str(
            r#"
[providers.meshy]
api_key = "global-key"
api_url = "https://global.example.com"

[pipeline]
response_budget_secs = 60
"#,
        )
        .unwrap();
        let overlay: ForgeConfigFile = toml::from_str(
            r#"
[providers.meshy]
api_key = "project-key"

[pipeline]
use_mock_providers = true
"#,
        )
        .unwrap();

        ForgeConfig::merge_into(&mut base, overlay);
        let meshy = &base.providers[MESHY];
        assert_eq!(meshy.api_key.as_deref(), Some("project-key"));
        assert_eq!(meshy.api_url.as_deref(), Some("https://global.example.com"));
        assert_eq!(base.pipeline.response_budget_secs, 60);
        assert!(base.pipeline.use_mock_providers);
    }

    #[test]
    fn test_defaults() {
        let config = ForgeConfig::default();
        assert_eq!(config.api_key("nonexistent"), None);
        assert!(config.is_enabled("nonexistent"));
        assert_eq!(config.classifier_timeout(), Duration::from_secs(20));
        assert!(config.classifier_timeout() <= config.response_budget());
        assert_eq!(config.jobs_dir(), Path::new(".novaforge/data/jobs"));
        assert_eq!(config.output_prefix(), "outputs");
        assert_eq!(config.abandoned_task_age(), Duration::from_secs(3600));
    }
}

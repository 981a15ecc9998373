//! Worker configuration file support.
//!
//! Configuration precedence (later wins):
//! 1. Defaults
//! 2. Global config file (~/.booth/config.toml)
//! 3. Local config file (./.boothrc)
//! 4. Explicit `--config` file
//! 5. Environment variables

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default region for S3-compatible buckets that do not name one.
pub const DEFAULT_REGION: &str = "weur";

/// Worker configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Directory holding one scratch directory per job
    pub scratch_root: PathBuf,

    /// Remove downloaded inputs and extracted datasets after each job
    pub cleanup: bool,

    /// Log level
    pub log_level: Option<String>,

    /// External training entry point
    pub trainer: CommandConfig,

    /// External inference entry point
    pub predictor: CommandConfig,

    /// Device diagnostics printed after training
    pub diagnostics: DiagnosticsConfig,

    /// Object storage defaults
    pub storage: StorageConfig,
}

/// A program plus leading arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Command to run after training; empty disables diagnostics.
    pub command: Vec<String>,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self { command: vec!["nvidia-smi".to_string()] }
    }
}

/// Fallbacks for fields a job's `s3Config` leaves out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub default_region: String,
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            default_region: DEFAULT_REGION.to_string(),
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scratch_root: std::env::temp_dir().join("booth"),
            cleanup: true,
            log_level: None,
            trainer: CommandConfig {
                program: "python3".to_string(),
                args: vec!["-m".to_string(), "dreambooth".to_string()],
            },
            predictor: CommandConfig {
                program: "python3".to_string(),
                args: vec!["-m".to_string(), "infer".to_string()],
            },
            diagnostics: DiagnosticsConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Overlay `overlay` onto `base`, recursing into tables.
fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn read_layer(path: &Path) -> ConfigResult<toml::Value> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.display().to_string()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

    toml::from_str(&content).map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
}

impl WorkerConfig {
    /// Load configuration from a single TOML file over the defaults.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        Self::from_layers(vec![read_layer(path)?])
    }

    fn from_layers(layers: Vec<toml::Value>) -> ConfigResult<Self> {
        let mut merged = toml::Value::try_from(Self::default())
            .map_err(|e| ConfigError::ParseError(format!("Failed to serialize defaults: {}", e)))?;
        for layer in layers {
            merge_toml(&mut merged, layer);
        }
        merged.try_into().map_err(|e: toml::de::Error| ConfigError::ParseError(e.to_string()))
    }

    /// Get default global configuration file path.
    pub fn default_global_path() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".booth")
            .join("config.toml")
    }

    /// Get default local configuration file path.
    pub fn default_local_path() -> PathBuf {
        PathBuf::from(".boothrc")
    }

    /// Discover and load configuration files, then apply environment overrides.
    ///
    /// Missing global or local files are skipped; an explicit path must exist.
    pub fn discover_and_load(explicit: Option<&Path>) -> ConfigResult<Self> {
        let mut layers = Vec::new();
        for path in [Self::default_global_path(), Self::default_local_path()] {
            match read_layer(&path) {
                Ok(layer) => layers.push(layer),
                Err(ConfigError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if let Some(path) = explicit {
            layers.push(read_layer(path)?);
        }

        let mut config = Self::from_layers(layers)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(root) = lookup("BOOTH_SCRATCH_ROOT") {
            self.scratch_root = PathBuf::from(root);
        }
        if let Some(program) = lookup("BOOTH_TRAINER_PROGRAM") {
            self.trainer.program = program;
        }
        if let Some(program) = lookup("BOOTH_PREDICTOR_PROGRAM") {
            self.predictor.program = program;
        }
        if let Some(level) = lookup("BOOTH_LOG_LEVEL") {
            self.log_level = Some(level);
        }
        if let Some(endpoint) = lookup("BUCKET_ENDPOINT_URL") {
            self.storage.endpoint_url = Some(endpoint);
        }
        if let Some(key) = lookup("BUCKET_ACCESS_KEY_ID") {
            self.storage.access_key_id = Some(key);
        }
        if let Some(secret) = lookup("BUCKET_SECRET_ACCESS_KEY") {
            self.storage.secret_access_key = Some(secret);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert!(config.cleanup);
        assert_eq!(config.storage.default_region, "weur");
        assert_eq!(config.diagnostics.command, vec!["nvidia-smi"]);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
scratch_root = "/data/jobs"

[trainer]
program = "/opt/train.sh"

[storage]
default_region = "auto"
"#,
        )
        .unwrap();

        let config = WorkerConfig::load_from_file(&path).unwrap();
        assert_eq!(config.scratch_root, PathBuf::from("/data/jobs"));
        assert_eq!(config.trainer.program, "/opt/train.sh");
        assert_eq!(config.trainer.args, vec!["-m", "dreambooth"]);
        assert_eq!(config.predictor, WorkerConfig::default().predictor);
        assert_eq!(config.storage.default_region, "auto");
        assert!(config.cleanup);
    }

    #[test]
    fn test_load_missing_file() {
        let err = WorkerConfig::load_from_file(Path::new("/nonexistent/booth.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_invalid_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "cleanup = [").unwrap();
        assert!(matches!(WorkerConfig::load_from_file(&path), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_apply_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("BOOTH_SCRATCH_ROOT", "/scratch"),
            ("BUCKET_ENDPOINT_URL", "https://r2.example.com"),
            ("BUCKET_ACCESS_KEY_ID", "key"),
            ("BUCKET_SECRET_ACCESS_KEY", "secret"),
        ]);

        let mut config = WorkerConfig::default();
        config.apply_env(|k| env.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.scratch_root, PathBuf::from("/scratch"));
        assert_eq!(config.storage.endpoint_url.as_deref(), Some("https://r2.example.com"));
        assert_eq!(config.storage.access_key_id.as_deref(), Some("key"));
        assert_eq!(config.storage.secret_access_key.as_deref(), Some("secret"));
        assert_eq!(config.trainer, WorkerConfig::default().trainer);
    }
}

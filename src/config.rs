//! Configuration for ytbundle.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (YTBUNDLE_HOME, YTBUNDLE_SILENCE_DB, YTBUNDLE_VALIDATOR)
//! 2. Config file (.ytbundle/config.yaml)
//! 3. Defaults (~/.ytbundle)
//!
//! Config file discovery:
//! - Searches current directory and parents for .ytbundle/config.yaml
//! - Paths in config file are relative to the directory containing .ytbundle/
//!
//! The resolved configuration is handed to each component at construction
//! time; nothing here is cached globally.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::domain::MediaKind;

/// Default ceiling for all embedded payloads of one container (200 MiB)
pub const DEFAULT_MAX_EMBEDDED_BYTES: u64 = 200 * 1024 * 1024;

/// Default bound on auto-fix passes
pub const DEFAULT_MAX_FIX_ATTEMPTS: u32 = 3;

/// Mean level (dBFS) under which audio counts as silent
pub const DEFAULT_SILENCE_THRESHOLD_DB: f64 = -50.0;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub build: Option<BuildConfig>,
    #[serde(default)]
    pub validator: Option<ValidatorConfig>,
    #[serde(default)]
    pub media: Option<MediaConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Registry root (relative to the directory containing .ytbundle/)
    pub root: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    pub max_embedded_bytes: Option<u64>,
    pub required_media: Option<Vec<MediaKind>>,
    pub missing_media_tolerance: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorConfig {
    pub backend: Option<BackendChoice>,
    pub max_fix_attempts: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    pub silence_threshold_db: Option<f64>,
}

/// Which validation backend to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendChoice {
    /// Strict when compiled in, heuristic otherwise
    #[default]
    Auto,
    Strict,
    Heuristic,
}

impl std::str::FromStr for BackendChoice {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(BackendChoice::Auto),
            "strict" => Ok(BackendChoice::Strict),
            "heuristic" => Ok(BackendChoice::Heuristic),
            _ => anyhow::bail!("Unknown validator backend: {}", s),
        }
    }
}

/// Limits applied by the container builder
#[derive(Debug, Clone)]
pub struct BuildLimits {
    /// Ceiling for the combined size of all embedded payloads (base64 bytes)
    pub max_embedded_bytes: u64,
    /// Media kinds a build is expected to carry
    pub required_media: Vec<MediaKind>,
    /// How many required kinds may be absent before the build fails
    pub missing_media_tolerance: usize,
}

impl Default for BuildLimits {
    fn default() -> Self {
        Self {
            max_embedded_bytes: DEFAULT_MAX_EMBEDDED_BYTES,
            required_media: vec![MediaKind::Video, MediaKind::Audio],
            missing_media_tolerance: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidatorSettings {
    pub backend: BackendChoice,
    pub max_fix_attempts: u32,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            backend: BackendChoice::Auto,
            max_fix_attempts: DEFAULT_MAX_FIX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MediaSettings {
    pub silence_threshold_db: f64,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            silence_threshold_db: DEFAULT_SILENCE_THRESHOLD_DB,
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Registry root; projects live under `<root>/projects`
    pub root: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub build: BuildLimits,
    pub validator: ValidatorSettings,
    pub media: MediaSettings,
}

impl ResolvedConfig {
    /// Defaults rooted at an explicit directory (tests, embedding callers)
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config_file: None,
            build: BuildLimits::default(),
            validator: ValidatorSettings::default(),
            media: MediaSettings::default(),
        }
    }

    /// Load configuration from all sources
    pub fn load() -> Result<Self> {
        let mut config = match find_config_file() {
            Some(path) => from_config_file(&path)?,
            None => {
                let default_root = dirs::home_dir()
                    .context("Failed to determine home directory")?
                    .join(".ytbundle");
                Self::with_root(default_root)
            }
        };

        apply_env_overrides(&mut config)?;
        Ok(config)
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".ytbundle").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

fn from_config_file(config_path: &Path) -> Result<ResolvedConfig> {
    let file = load_config_file(config_path)?;

    // Base directory is the parent of .ytbundle/ (i.e., grandparent of config.yaml)
    let base_dir = config_path
        .parent()
        .and_then(|p| p.parent())
        .unwrap_or(Path::new("."));

    let root = match file.paths.root {
        Some(ref root) => resolve_path(base_dir, root),
        None => base_dir.join("output"),
    };

    let mut config = ResolvedConfig::with_root(root);
    config.config_file = Some(config_path.to_path_buf());

    if let Some(build) = file.build {
        if let Some(max) = build.max_embedded_bytes {
            config.build.max_embedded_bytes = max;
        }
        if let Some(required) = build.required_media {
            config.build.required_media = required;
        }
        if let Some(tolerance) = build.missing_media_tolerance {
            config.build.missing_media_tolerance = tolerance;
        }
    }

    if let Some(validator) = file.validator {
        if let Some(backend) = validator.backend {
            config.validator.backend = backend;
        }
        if let Some(attempts) = validator.max_fix_attempts {
            config.validator.max_fix_attempts = attempts;
        }
    }

    if let Some(threshold) = file.media.and_then(|m| m.silence_threshold_db) {
        config.media.silence_threshold_db = threshold;
    }

    Ok(config)
}

fn apply_env_overrides(config: &mut ResolvedConfig) -> Result<()> {
    if let Ok(root) = std::env::var("YTBUNDLE_HOME") {
        config.root = PathBuf::from(root);
    }

    if let Ok(raw) = std::env::var("YTBUNDLE_SILENCE_DB") {
        config.media.silence_threshold_db = raw
            .trim()
            .parse()
            .with_context(|| format!("YTBUNDLE_SILENCE_DB is not a number: {}", raw))?;
    }

    if let Ok(raw) = std::env::var("YTBUNDLE_VALIDATOR") {
        config.validator.backend = raw.parse()?;
    }

    Ok(())
}

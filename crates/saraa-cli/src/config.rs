use anyhow::{Context, Result};
use saraa_core::{
    Capability, ClassifierConfig, ContextConfig, DispatcherConfig, EngineConfig, StudentProfile,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaraaConfig {
    #[serde(default)]
    pub classifier: ClassifierSection,
    #[serde(default)]
    pub dispatcher: DispatcherSection,
    #[serde(default)]
    pub context: ContextSection,
    #[serde(default)]
    pub lexicon: LexiconSection,
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<Capability>,
}

impl Default for SaraaConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierSection::default(),
            dispatcher: DispatcherSection::default(),
            context: ContextSection::default(),
            lexicon: LexiconSection::default(),
            capabilities: default_capabilities(),
        }
    }
}

fn default_capabilities() -> Vec<Capability> {
    saraa_core::demo_capabilities()
}

// ── Classifier ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierSection {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Distinct trigger hits that count as full confidence
    #[serde(default = "default_trigger_saturation")]
    pub trigger_saturation: f64,
    #[serde(default = "default_entity_bonus")]
    pub entity_bonus: f64,
}

fn default_threshold() -> f64 {
    ClassifierConfig::default().threshold
}
fn default_trigger_saturation() -> f64 {
    ClassifierConfig::default().trigger_saturation
}
fn default_entity_bonus() -> f64 {
    ClassifierConfig::default().entity_bonus
}

impl Default for ClassifierSection {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            trigger_saturation: default_trigger_saturation(),
            entity_bonus: default_entity_bonus(),
        }
    }
}

// ── Dispatcher ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherSection {
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    #[serde(default = "default_turn_overhead_ms")]
    pub turn_overhead_ms: u64,
}

fn default_call_timeout_ms() -> u64 {
    2000
}
fn default_turn_overhead_ms() -> u64 {
    250
}

impl Default for DispatcherSection {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
            turn_overhead_ms: default_turn_overhead_ms(),
        }
    }
}

// ── Context ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSection {
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// How often idle sessions are swept during `chat`
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_history_size() -> usize {
    5
}
fn default_ttl_secs() -> u64 {
    30 * 60
}
fn default_max_sessions() -> usize {
    1000
}
fn default_lock_timeout_ms() -> u64 {
    500
}
fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            history_size: default_history_size(),
            ttl_secs: default_ttl_secs(),
            max_sessions: default_max_sessions(),
            lock_timeout_ms: default_lock_timeout_ms(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

// ── Lexicon ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LexiconSection {
    /// YAML or TOML lexicon file; the built-in lexicon is used when unset
    #[serde(default)]
    pub path: Option<String>,
    /// Reload the lexicon when the file changes
    #[serde(default)]
    pub watch: bool,
}

impl LexiconSection {
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.path.as_deref().map(expand_home)
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".saraa")
}

fn expand_home(s: &str) -> PathBuf {
    match s.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(s)),
        None => PathBuf::from(s),
    }
}

impl SaraaConfig {
    /// Load from `custom_path` or `~/.saraa/config.toml`.
    ///
    /// A missing default file yields the defaults; a missing custom file is
    /// an error.
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = match custom_path {
            Some(path) => path.clone(),
            None => {
                let path = config_dir().join("config.toml");
                if !path.exists() {
                    warn!(
                        "No config at {}, using defaults. Run `saraa init` to create one.",
                        path.display()
                    );
                    return Ok(Self::default());
                }
                path
            }
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;

        // Expand environment variables before parsing
        let expanded = expand_env_vars(&content);

        let config: Self = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;

        config
            .to_engine_config()
            .classifier
            .validate()
            .with_context(|| format!("Invalid config at {}", path.display()))?;

        if config.lexicon.watch && config.lexicon.path.is_none() {
            warn!("lexicon.watch is set but lexicon.path is not; nothing to watch");
        }
        if config.capabilities.is_empty() {
            warn!("No capabilities configured; every query will get a clarification");
        }

        Ok(config)
    }

    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            classifier: ClassifierConfig {
                threshold: self.classifier.threshold,
                trigger_saturation: self.classifier.trigger_saturation,
                entity_bonus: self.classifier.entity_bonus,
            },
            dispatcher: DispatcherConfig {
                call_timeout: Duration::from_millis(self.dispatcher.call_timeout_ms),
                turn_overhead: Duration::from_millis(self.dispatcher.turn_overhead_ms),
            },
            context: ContextConfig {
                history_size: self.context.history_size,
                ttl: Duration::from_secs(self.context.ttl_secs),
                max_sessions: self.context.max_sessions,
                lock_timeout: Duration::from_millis(self.context.lock_timeout_ms),
            },
        }
    }
}

/// Load a student profile from a TOML file
pub fn load_profile(path: &Path) -> Result<StudentProfile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read profile at {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse profile at {}", path.display()))
}

/// Allowlist of environment variable names that may be expanded in config files.
const ALLOWED_ENV_VARS: &[&str] = &["SARAA_HOME", "SARAA_LEXICON", "HOME", "USER"];

fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while pos < result.len() {
        let Some(start) = result[pos..].find("${") else {
            break;
        };
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();

        if !ALLOWED_ENV_VARS.contains(&var_name.as_str()) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            pos = abs_start + end + 1;
            continue;
        }

        let value = std::env::var(&var_name).unwrap_or_default();
        result = format!(
            "{}{}{}",
            &result[..abs_start],
            value,
            &result[abs_start + end + 1..]
        );
        // skip past the expanded value
        pos = abs_start + value.len();
    }
    result
}

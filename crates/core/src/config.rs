use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    profiled_env_opt(profile, key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

/// Debounce window applied to filesystem events when nothing is configured.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1000;

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub templates: TemplatesConfig,
    pub watch: WatchConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `STENCIL_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("STENCIL_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            templates: TemplatesConfig::from_env_profiled(p),
            watch: WatchConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  templates:   dir={}", self.templates.dir.display());
        tracing::info!(
            "  temp:        dir={}",
            self.templates
                .temp_dir
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(system default)".to_string())
        );
        tracing::info!(
            "  watch:       debounce={}ms, include_hidden={}",
            self.watch.debounce_ms,
            self.watch.include_hidden
        );
    }
}

// ── Templates ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// Root directory holding template sources.
    pub dir: PathBuf,
    /// Scratch directory handed to the engine instead of the system temp dir.
    pub temp_dir: Option<PathBuf>,
}

impl TemplatesConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            dir: PathBuf::from(profiled_env_or(p, "STENCIL_TEMPLATES_DIR", "templates")),
            temp_dir: profiled_env_opt(p, "STENCIL_TEMP_DIR").map(PathBuf::from),
        }
    }
}

// ── Watch ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    pub debounce_ms: u64,
    /// Whether dotfiles take part in scans and reloads.
    pub include_hidden: bool,
}

impl WatchConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            debounce_ms: profiled_env_u64(p, "STENCIL_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS),
            include_hidden: profiled_env_bool(p, "STENCIL_WATCH_HIDDEN", false),
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            include_hidden: false,
        }
    }
}

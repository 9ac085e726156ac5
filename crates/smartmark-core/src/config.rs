//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/smartmark/config.toml)
//! 3. Environment variables (SMARTMARK_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix
const ENV_PREFIX: &str = "SMARTMARK";

/// Path the OAuth provider returns to
pub const CALLBACK_PATH: &str = "/auth/callback";

/// Where to go after a successful code exchange when `next` is absent
pub const DEFAULT_NEXT: &str = "/dashboard";

/// Where to go when the code exchange fails
pub const AUTH_ERROR_PATH: &str = "/auth/auth-code-error";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for the persisted session and logs
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Project URL of the hosted backend
    #[serde(default)]
    pub supabase_url: Option<String>,

    /// Public anon key of the hosted backend
    #[serde(default)]
    pub supabase_anon_key: Option<String>,

    /// Origin used to build the OAuth redirect
    #[serde(default = "default_site_url")]
    pub site_url: String,

    /// Whether to subscribe to the realtime change feed
    #[serde(default = "default_realtime_enabled")]
    pub realtime_enabled: bool,

    /// Debug log destination (defaults to `{data_dir}/debug.log`)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

/// Connection details for the hosted backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            supabase_url: None,
            supabase_anon_key: None,
            site_url: default_site_url(),
            realtime_enabled: default_realtime_enabled(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (SMARTMARK_SUPABASE_URL, SMARTMARK_DATA_DIR, ...)
    /// 2. Config file (~/.config/smartmark/config.toml or SMARTMARK_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_SUPABASE_URL", ENV_PREFIX)) {
            self.supabase_url = non_empty(val);
        }

        if let Ok(val) = std::env::var(format!("{}_SUPABASE_ANON_KEY", ENV_PREFIX)) {
            self.supabase_anon_key = non_empty(val);
        }

        if let Ok(val) = std::env::var(format!("{}_SITE_URL", ENV_PREFIX)) {
            if !val.is_empty() {
                self.site_url = val;
            }
        }

        if let Ok(val) = std::env::var(format!("{}_REALTIME_ENABLED", ENV_PREFIX)) {
            self.realtime_enabled = val.eq_ignore_ascii_case("true") || val == "1";
        }
    }

    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Set a key from its string form, as `config set` does
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "data_dir" => self.data_dir = PathBuf::from(value),
            "supabase_url" => self.supabase_url = non_empty(value.to_string()),
            "supabase_anon_key" => self.supabase_anon_key = non_empty(value.to_string()),
            "site_url" => {
                url::Url::parse(value).with_context(|| format!("Invalid site URL: {}", value))?;
                self.site_url = value.trim_end_matches('/').to_string();
            }
            "realtime_enabled" => {
                self.realtime_enabled = value
                    .parse()
                    .with_context(|| format!("Expected true or false, got '{}'", value))?;
            }
            "log_file" => {
                self.log_file = non_empty(value.to_string()).map(PathBuf::from);
            }
            _ => bail!(
                "Unknown config key: {}. Valid keys: data_dir, supabase_url, \
                 supabase_anon_key, site_url, realtime_enabled, log_file",
                key
            ),
        }
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with SMARTMARK_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("smartmark")
            .join("config.toml")
    }

    /// Backend connection details
    ///
    /// Fails when either the project URL or the anon key is missing.
    pub fn backend(&self) -> Result<BackendConfig> {
        match (&self.supabase_url, &self.supabase_anon_key) {
            (Some(url), Some(anon_key)) => {
                url::Url::parse(url).with_context(|| format!("Invalid backend URL: {}", url))?;
                Ok(BackendConfig {
                    url: url.trim_end_matches('/').to_string(),
                    anon_key: anon_key.clone(),
                })
            }
            _ => bail!(
                "Supabase environment variables are missing. Set supabase_url and \
                 supabase_anon_key (or SMARTMARK_SUPABASE_URL and SMARTMARK_SUPABASE_ANON_KEY)"
            ),
        }
    }

    /// Get the path to the persisted session
    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join("session.json")
    }

    /// Get the debug log path
    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("debug.log"))
    }

    /// OAuth return address
    pub fn redirect_to(&self) -> String {
        format!("{}{}", self.site_url.trim_end_matches('/'), CALLBACK_PATH)
    }
}

fn non_empty(val: String) -> Option<String> {
    if val.is_empty() {
        None
    } else {
        Some(val)
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("smartmark")
}

fn default_site_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_realtime_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Serializes tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "SMARTMARK_DATA_DIR",
        "SMARTMARK_SUPABASE_URL",
        "SMARTMARK_SUPABASE_ANON_KEY",
        "SMARTMARK_SITE_URL",
        "SMARTMARK_REALTIME_ENABLED",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.realtime_enabled);
        assert!(config.supabase_url.is_none());
        assert_eq!(config.site_url, "http://localhost:3000");
        assert!(config.data_dir.ends_with("smartmark"));
    }

    #[test]
    fn test_derived_paths() {
        let config = Config {
            data_dir: PathBuf::from("/data/smartmark"),
            ..Config::default()
        };
        assert_eq!(config.session_path(), PathBuf::from("/data/smartmark/session.json"));
        assert_eq!(config.log_path(), PathBuf::from("/data/smartmark/debug.log"));

        let config = Config {
            log_file: Some(PathBuf::from("/tmp/sm.log")),
            ..config
        };
        assert_eq!(config.log_path(), PathBuf::from("/tmp/sm.log"));
    }

    #[test]
    fn test_redirect_to() {
        let mut config = Config::default();
        assert_eq!(config.redirect_to(), "http://localhost:3000/auth/callback");

        config.site_url = "https://marks.example.com/".to_string();
        assert_eq!(config.redirect_to(), "https://marks.example.com/auth/callback");
    }

    #[test]
    fn test_backend_requires_url_and_key() {
        let mut config = Config::default();
        let err = config.backend().unwrap_err();
        assert!(err.to_string().contains("missing"));

        config.supabase_url = Some("https://abc.supabase.co/".to_string());
        assert!(config.backend().is_err());

        config.supabase_anon_key = Some("anon".to_string());
        let backend = config.backend().unwrap();
        assert_eq!(backend.url, "https://abc.supabase.co");
        assert_eq!(backend.anon_key, "anon");
    }

    #[test]
    fn test_env_override_backend() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("SMARTMARK_SUPABASE_URL", "https://xyz.supabase.co");
        env::set_var("SMARTMARK_SUPABASE_ANON_KEY", "key");
        config.apply_env_overrides();
        assert_eq!(config.supabase_url.as_deref(), Some("https://xyz.supabase.co"));
        assert_eq!(config.supabase_anon_key.as_deref(), Some("key"));

        // Empty string clears it
        env::set_var("SMARTMARK_SUPABASE_URL", "");
        config.apply_env_overrides();
        assert!(config.supabase_url.is_none());
    }

    #[test]
    fn test_env_override_realtime_enabled() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("SMARTMARK_REALTIME_ENABLED", "false");
        config.apply_env_overrides();
        assert!(!config.realtime_enabled);

        env::set_var("SMARTMARK_REALTIME_ENABLED", "1");
        config.apply_env_overrides();
        assert!(config.realtime_enabled);
    }

    #[test]
    fn test_env_override_data_dir_and_site() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("SMARTMARK_DATA_DIR", "/tmp/smartmark-test");
        env::set_var("SMARTMARK_SITE_URL", "https://example.org");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/smartmark-test"));
        assert_eq!(config.site_url, "https://example.org");
    }

    #[test]
    fn test_set_value() {
        let mut config = Config::default();
        config.set_value("supabase_url", "https://abc.supabase.co").unwrap();
        config.set_value("realtime_enabled", "false").unwrap();
        config.set_value("site_url", "https://marks.dev/").unwrap();

        assert_eq!(config.supabase_url.as_deref(), Some("https://abc.supabase.co"));
        assert!(!config.realtime_enabled);
        assert_eq!(config.site_url, "https://marks.dev");

        assert!(config.set_value("realtime_enabled", "maybe").is_err());
        assert!(config.set_value("site_url", "not a url").is_err());
        assert!(config.set_value("favorite_color", "blue").is_err());
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            supabase_url = "https://abc.supabase.co"
            supabase_anon_key = "anon"
            realtime_enabled = false
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.supabase_url.as_deref(), Some("https://abc.supabase.co"));
        assert!(!config.realtime_enabled);
        assert_eq!(config.site_url, "http://localhost:3000");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let config = Config {
            data_dir: temp.path().join("data"),
            supabase_url: Some("https://abc.supabase.co".to_string()),
            supabase_anon_key: Some("anon".to_string()),
            ..Config::default()
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.supabase_url, config.supabase_url);
        assert_eq!(loaded.data_dir, config.data_dir);
        assert!(loaded.data_dir.exists());
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp = tempfile::TempDir::new().unwrap();
        env::set_var("SMARTMARK_DATA_DIR", temp.path().join("data"));

        let config = Config::load_from_path(&temp.path().join("nope.toml")).unwrap();
        assert!(config.realtime_enabled);
        assert!(config.supabase_url.is_none());
    }
}

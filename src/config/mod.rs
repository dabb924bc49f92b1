//! Configuration management for gemtrail.
//!
//! Configuration is read from `~/.config/gemtrail/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.

use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fetcher::RedirectPolicy;

/// Settings the navigation core reads at render time.
pub trait SettingsProvider {
    fn inline_images_enabled(&self) -> bool;
    /// Token emitted into the stylesheet reference; not interpreted further.
    fn theme(&self) -> String;
    fn save_visited_history(&self) -> bool;
}

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserConfig,
    pub network: NetworkConfig,
    pub images: ImageConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Page opened when no URL is given
    pub home: String,
    pub theme: String,
    pub inline_images: bool,
    pub save_history: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            home: "about:home".to_string(),
            theme: "light".to_string(),
            inline_images: true,
            save_history: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub timeout_secs: u64,
    pub redirects: RedirectPolicy,
    pub allow_ipv6: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            redirects: RedirectPolicy::SameHost,
            allow_ipv6: true,
        }
    }
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Longest side of an inlined preview, in pixels
    pub preview_max_px: u32,
    pub fetch_attempts: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            preview_max_px: 512,
            fetch_attempts: 4,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Overrides the platform cache directory
    pub dir: Option<PathBuf>,
}

impl SettingsProvider for Config {
    fn inline_images_enabled(&self) -> bool {
        self.browser.inline_images
    }

    fn theme(&self) -> String {
        self.browser.theme.clone()
    }

    fn save_visited_history(&self) -> bool {
        self.browser.save_history
    }
}

impl Config {
    /// Load configuration from `path`, or from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// If the config file exists but is invalid, returns an error.
    /// Missing fields in the config file will use default values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path()?,
        };

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).map_err(|e| ConfigError::Io {
            path: config_path.clone(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path,
            source: e,
        })?;

        Ok(config)
    }

    /// Get the default config file path: `~/.config/gemtrail/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("gemtrail").join("config.toml"))
    }

    /// Cache root: the configured override or `<cache dir>/gemtrail`.
    pub fn cache_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.cache.dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(cache_dir.join("gemtrail"))
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# gemtrail configuration

[browser]
# Page opened by `gemtrail open` without a URL
home = "about:home"

# Stylesheet token written into rendered pages (theme-<name>.css)
theme = "light"

# Fetch and embed images linked from gemtext pages
inline_images = true

# Record visited pages in the history database
save_history = true

[network]
# Per-request timeout in seconds
timeout_secs = 15

# Which redirects to follow: "never", "same-host" or "always"
redirects = "same-host"

# Allow connecting over IPv6
allow_ipv6 = true

[images]
# Longest side of an inline image preview, in pixels
preview_max_px = 512

# Attempts per image before falling back to a plain link
fetch_attempts = 4

[cache]
# Cache directory (defaults to the platform cache directory)
# dir = "/tmp/gemtrail"
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_deserializes() {
        let content = Config::default_config_content();
        let config: Config = toml::from_str(&content).expect("Default config should be valid TOML");

        assert_eq!(config.browser.home, "about:home");
        assert_eq!(config.network.redirects, RedirectPolicy::SameHost);
        assert_eq!(config.images.preview_max_px, 512);
        assert!(config.cache.dir.is_none());
    }

    #[test]
    fn test_partial_config() {
        let content = r##"
[browser]
theme = "dark"
inline_images = false
"##;
        let config: Config = toml::from_str(content).expect("Partial config should work");

        assert_eq!(config.theme(), "dark");
        assert!(!config.inline_images_enabled());
        // Defaults for the rest
        assert!(config.save_visited_history());
        assert_eq!(config.network.timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_empty_config() {
        let config: Config = toml::from_str("").expect("Empty config should work");
        assert_eq!(config.theme(), "light");
        assert_eq!(config.images.fetch_attempts, 4);
    }

    #[test]
    fn test_redirect_policy_names() {
        let config: Config = toml::from_str("[network]\nredirects = \"never\"").unwrap();
        assert_eq!(config.network.redirects, RedirectPolicy::Never);

        let config: Config = toml::from_str("[network]\nredirects = \"always\"").unwrap();
        assert_eq!(config.network.redirects, RedirectPolicy::Always);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.browser.theme, "light");

        // Second load parses the file that was just written
        let reloaded = Config::load(Some(&path)).unwrap();
        assert_eq!(reloaded.network.redirects, RedirectPolicy::SameHost);
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[browser\ntheme =").unwrap();

        assert!(matches!(
            Config::load(Some(&path)),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_cache_dir_override() {
        let config: Config = toml::from_str("[cache]\ndir = \"/tmp/gt\"").unwrap();
        assert_eq!(config.cache_dir().unwrap(), PathBuf::from("/tmp/gt"));
    }
}

use anyhow::{Result, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::fs;
use tracing::{info, debug, error};

/// Environment variable that overrides the configured cookie string
pub const COOKIE_ENV: &str = "HARVESTER_COOKIE";

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct HarvesterConfig {
    pub credentials: CredentialSettings,
    pub crawler: CrawlerSettings,
    pub browser: BrowserSettings,
    pub signer: SignerSettings,
    pub api: ApiSettings,
}

/// Session credentials for the note API
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CredentialSettings {
    /// Full cookie header value; `a1` and `web_session` are read out of it
    pub cookie: String,
}

/// Crawl loop settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CrawlerSettings {
    /// Directory whose subdirectories are the categories to crawl
    pub input_root: PathBuf,
    /// Directory that receives one subdirectory of records per category
    pub output_root: PathBuf,
    /// Attempts per note before it is abandoned
    pub retry_count: u32,
    pub pacing: PacingSettings,
}

/// Randomized delay before each fetch attempt, in seconds
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PacingSettings {
    pub min_secs: f64,
    pub max_secs: f64,
}

/// Browser settings for the signing session
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BrowserSettings {
    pub webdriver_url: String,
    pub headless: bool,
    /// Page that exposes the site's signing function
    pub home_url: String,
    /// Domain the `a1` cookie is injected on
    pub cookie_domain: String,
    /// Script evaluated with `arguments[0] = uri` and `arguments[1] = payload`
    pub sign_script: String,
    /// Optional script installed before every document load
    pub stealth_script_path: Option<PathBuf>,
    /// Attempts the browser signer makes before giving up
    pub sign_attempts: u32,
    /// Wait after reloading with the injected cookie, in milliseconds
    pub settle_millis: u64,
    pub page_load_timeout_secs: u64,
}

/// Which signer implementation the client uses
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SignerMode {
    Browser,
    Remote,
}

/// Signer selection
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SignerSettings {
    pub mode: SignerMode,
    /// Base URL of the sign service when `mode` is `remote`
    pub service_url: String,
}

/// Note API settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from("input"),
            output_root: PathBuf::from("output"),
            retry_count: 3,
            pacing: PacingSettings::default(),
        }
    }
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            min_secs: 5.0,
            max_secs: 15.0,
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".to_string(),
            headless: true,
            home_url: "https://www.xiaohongshu.com".to_string(),
            cookie_domain: ".xiaohongshu.com".to_string(),
            sign_script: "return window._webmsxyw(arguments[0], arguments[1]);".to_string(),
            stealth_script_path: None,
            sign_attempts: 10,
            settle_millis: 1000,
            page_load_timeout_secs: 30,
        }
    }
}

impl Default for SignerSettings {
    fn default() -> Self {
        Self {
            mode: SignerMode::Browser,
            service_url: "http://localhost:5005".to_string(),
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://edith.xiaohongshu.com".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            timeout_secs: 30,
        }
    }
}

impl HarvesterConfig {
    /// Get the path to the config directory
    fn config_dir() -> PathBuf {
        let mut path = if let Some(proj_dirs) = directories::ProjectDirs::from("com", "note-harvester", "note-harvester") {
            proj_dirs.config_dir().to_path_buf()
        } else {
            PathBuf::from("./config")
        };

        path.push("profiles");
        if !path.exists() {
            if let Err(e) = fs::create_dir_all(&path) {
                error!("Failed to create config directory: {}", e);
            }
        }

        path.pop();
        path
    }

    /// Load the default configuration, creating it on first use
    pub fn load_default() -> Result<Self> {
        let config_path = Self::config_dir().join("default.yaml");

        let config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            info!("Default configuration not found. Creating...");
            let config = Self::default();
            config.save_to_file(&config_path)?;
            config
        };

        Ok(config.with_env_overrides())
    }

    /// Load a named configuration profile
    pub fn load_profile(profile: &str) -> Result<Self> {
        let profile_path = Self::config_dir().join("profiles").join(format!("{}.yaml", profile));

        if profile_path.exists() {
            Ok(Self::load_from_file(&profile_path)?.with_env_overrides())
        } else {
            anyhow::bail!("Profile '{}' not found", profile)
        }
    }

    /// Load an explicit configuration file
    pub fn load_path(path: &Path) -> Result<Self> {
        Ok(Self::load_from_file(path)?.with_env_overrides())
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read configuration file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .context(format!("Failed to parse configuration file: {}", path.display()))
    }

    /// Parse a configuration from YAML; missing sections take their defaults
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents)?;
        Ok(config)
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(cookie) = std::env::var(COOKIE_ENV) {
            if !cookie.trim().is_empty() {
                debug!("Using cookie from {}", COOKIE_ENV);
                self.credentials.cookie = cookie;
            }
        }
        self
    }

    /// Save the configuration as a named profile
    pub fn save_as_profile(&self, profile: &str) -> Result<PathBuf> {
        let profile_path = Self::config_dir().join("profiles").join(format!("{}.yaml", profile));
        self.save_to_file(&profile_path)?;
        Ok(profile_path)
    }

    /// Save the configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        debug!("Saving configuration to: {}", path.display());

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let contents = serde_yaml::to_string(self)
            .context("Failed to serialize configuration")?;

        fs::write(path, contents)
            .context(format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }

    /// List all available profiles
    pub fn list_profiles() -> Result<Vec<String>> {
        let profiles_dir = Self::config_dir().join("profiles");

        if !profiles_dir.exists() {
            return Ok(vec![]);
        }

        let mut profiles = Vec::new();

        for entry in fs::read_dir(profiles_dir)? {
            let path = entry?.path();

            if path.is_file() && path.extension().map_or(false, |ext| ext == "yaml") {
                if let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) {
                    profiles.push(name.to_string());
                }
            }
        }

        profiles.sort();
        Ok(profiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HarvesterConfig::default();

        assert_eq!(config.crawler.retry_count, 3);
        assert_eq!(config.crawler.pacing, PacingSettings { min_secs: 5.0, max_secs: 15.0 });
        assert_eq!(config.browser.sign_attempts, 10);
        assert!(config.browser.headless);
        assert_eq!(config.signer.mode, SignerMode::Browser);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
credentials:
  cookie: "a1=abc; web_session=xyz"
crawler:
  retry_count: 10
signer:
  mode: remote
"#;
        let config = HarvesterConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.credentials.cookie, "a1=abc; web_session=xyz");
        assert_eq!(config.crawler.retry_count, 10);
        assert_eq!(config.crawler.input_root, PathBuf::from("input"));
        assert_eq!(config.signer.mode, SignerMode::Remote);
        assert_eq!(config.signer.service_url, "http://localhost:5005");
        assert_eq!(config.api.base_url, "https://edith.xiaohongshu.com");
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("harvester.yaml");

        let mut config = HarvesterConfig::default();
        config.crawler.output_root = PathBuf::from("/data/notes");
        config.browser.headless = false;
        config.save_to_file(&path).unwrap();

        let loaded = HarvesterConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.crawler.output_root, PathBuf::from("/data/notes"));
        assert!(!loaded.browser.headless);
    }
}

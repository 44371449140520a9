//! Configuration file and environment overrides.
//!
//! Configuration lives in `~/.config/macprov/config.toml` (or wherever
//! `--config` points). Every field has a default, so a missing file is not an
//! error and a partial file only overrides what it names.

use crate::error::ConfigError;
use crate::preferences::PreferenceValue;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvisionConfig {
    /// Run-wide settings
    pub general: GeneralConfig,
    /// HTTP download behavior
    pub download: DownloadConfig,
    /// Bootable installer media
    pub usb: UsbConfig,
    /// Erase and reinstall
    pub reinstall: ReinstallConfig,
    /// Developer tools and Homebrew
    pub bootstrap: BootstrapConfig,
    /// Security defaults
    pub harden: HardenConfig,
    /// UI preferences
    pub personalize: PersonalizeConfig,
    /// Browser bootstrap
    pub browser: BrowserConfig,
}

/// Run-wide settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneralConfig {
    /// Where run logs and recovery keys are written (default: Desktop)
    pub log_dir: Option<PathBuf>,
    /// Label of the login agent
    pub launch_agent_label: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            launch_agent_label: "local.macprov.personalize".to_string(),
        }
    }
}

/// HTTP download behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownloadConfig {
    /// Attempts per artifact, including the first
    pub retries: u32,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            timeout_secs: 600,
        }
    }
}

/// Bootable installer media
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UsbConfig {
    /// Installer application to use instead of searching /Applications
    pub installer_app: Option<PathBuf>,
    /// Volume name when none is given on the command line
    pub default_volume_name: String,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            installer_app: None,
            default_volume_name: "MacInstaller".to_string(),
        }
    }
}

/// Erase and reinstall
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReinstallConfig {
    /// Name of the freshly created system volume
    pub new_volume_name: String,
}

impl Default for ReinstallConfig {
    fn default() -> Self {
        Self {
            new_volume_name: "Macintosh HD".to_string(),
        }
    }
}

/// Developer tools and Homebrew
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootstrapConfig {
    /// Homebrew formulae to install
    pub formulae: Vec<String>,
    /// Homebrew casks to install
    pub casks: Vec<String>,
    /// Homebrew install script
    pub homebrew_install_url: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            formulae: vec!["git".to_string(), "jq".to_string()],
            casks: Vec::new(),
            homebrew_install_url:
                "https://raw.githubusercontent.com/Homebrew/install/HEAD/install.sh".to_string(),
        }
    }
}

/// Security defaults
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HardenConfig {
    /// Turn on FileVault at next login when it is off
    pub enable_filevault: bool,
    /// Ignore ICMP probes and closed-port connection attempts
    pub stealth_mode: bool,
    /// Turn off SSH and remote Apple events
    pub disable_remote_login: bool,
}

impl Default for HardenConfig {
    fn default() -> Self {
        Self {
            enable_filevault: true,
            stealth_mode: true,
            disable_remote_login: true,
        }
    }
}

/// UI preferences
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PersonalizeConfig {
    /// Additional preference writes applied after the built-in set
    pub extra: Vec<ExtraPreference>,
}

/// A user-defined preference write
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtraPreference {
    /// Domain, e.g. `com.apple.dock`
    pub domain: String,
    /// Key within the domain
    pub key: String,
    /// Literal value; TOML type selects the `defaults` type
    pub value: PreferenceValue,
    /// Write to the ByHost domain
    #[serde(default)]
    pub current_host: bool,
}

/// Browser bootstrap
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrowserConfig {
    /// Display name, used in messages and AppleScript
    pub name: String,
    /// Application bundle name inside the disk image and `applications_dir`
    pub app_name: String,
    /// Where the application bundle is installed
    pub applications_dir: PathBuf,
    /// Executable name for `pgrep -x`
    pub process_name: String,
    /// Directory holding `profiles.ini`, relative to the home directory
    pub profiles_root: PathBuf,
    /// Disk image download URL
    pub download_url: String,
    /// Optional pinned SHA-256 of the disk image
    pub sha256: Option<String>,
    /// Extensions placed in the default profile
    pub extensions: Vec<ExtensionConfig>,
    /// Entries written to `user.js`
    pub prefs: BTreeMap<String, PreferenceValue>,
}

/// One browser extension
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtensionConfig {
    /// Extension id; the package must be stored as `<id>.xpi`
    pub id: String,
    /// Download URL
    pub url: String,
    /// Optional pinned SHA-256
    #[serde(default)]
    pub sha256: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        let prefs = [
            ("browser.startup.homepage", PreferenceValue::from("about:blank")),
            ("browser.newtabpage.enabled", PreferenceValue::Bool(false)),
            ("datareporting.healthreport.uploadEnabled", PreferenceValue::Bool(false)),
            ("toolkit.telemetry.enabled", PreferenceValue::Bool(false)),
            ("privacy.trackingprotection.enabled", PreferenceValue::Bool(true)),
            ("dom.security.https_only_mode", PreferenceValue::Bool(true)),
            ("signon.rememberSignons", PreferenceValue::Bool(false)),
            ("extensions.autoDisableScopes", PreferenceValue::Int(0)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            name: "Firefox".to_string(),
            app_name: "Firefox.app".to_string(),
            applications_dir: PathBuf::from("/Applications"),
            process_name: "firefox".to_string(),
            profiles_root: PathBuf::from("Library/Application Support/Firefox"),
            download_url:
                "https://download.mozilla.org/?product=firefox-latest-ssl&os=osx&lang=en-US"
                    .to_string(),
            sha256: None,
            extensions: vec![
                ExtensionConfig {
                    id: "uBlock0@raymondhill.net".to_string(),
                    url: "https://addons.mozilla.org/firefox/downloads/latest/ublock-origin/latest.xpi"
                        .to_string(),
                    sha256: None,
                },
                ExtensionConfig {
                    id: "jid1-MnnxcxisBPnSXQ@jetpack".to_string(),
                    url: "https://addons.mozilla.org/firefox/downloads/latest/privacy-badger17/latest.xpi"
                        .to_string(),
                    sha256: None,
                },
                ExtensionConfig {
                    id: "{446900e4-71c2-419f-a6a7-df9c091e268b}".to_string(),
                    url: "https://addons.mozilla.org/firefox/downloads/latest/bitwarden-password-manager/latest.xpi"
                        .to_string(),
                    sha256: None,
                },
            ],
            prefs,
        }
    }
}

impl ProvisionConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("macprov").join("config.toml"))
    }

    /// Load from `path`, falling back to defaults when the file is absent,
    /// then apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);

        let mut config = match path {
            Some(path) if path.exists() => {
                let contents =
                    std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                        path: path.clone(),
                        source,
                    })?;
                log::debug!("Loaded configuration from {}", path.display());
                Self::from_toml(&contents).map_err(|source| ConfigError::Parse { path, source })?
            }
            Some(path) => {
                log::debug!("No configuration at {}, using defaults", path.display());
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML text
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Parse a numeric environment variable, clamped to `max`
    fn parse_env<T>(var_name: &str, max: T) -> Option<T>
    where
        T: std::str::FromStr + Ord,
    {
        std::env::var(var_name)
            .ok()
            .and_then(|s| s.trim().parse::<T>().ok())
            .map(|v| v.min(max))
    }

    /// Apply `MACPROV_*` environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("MACPROV_LOG_DIR")
            && !dir.is_empty()
        {
            self.general.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(retries) = Self::parse_env("MACPROV_DOWNLOAD_RETRIES", 10u32) {
            self.download.retries = retries;
        }
        if let Some(timeout) = Self::parse_env("MACPROV_DOWNLOAD_TIMEOUT", 3600u64) {
            self.download.timeout_secs = timeout;
        }
    }

    /// Reject values that would only fail later, mid-run
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| Err(ConfigError::Invalid { reason });

        if self.download.retries == 0 {
            return invalid("download.retries must be at least 1".to_string());
        }
        if self.download.retries > 10 {
            return invalid(format!(
                "download.retries too high: {} (max: 10)",
                self.download.retries
            ));
        }
        if url::Url::parse(&self.browser.download_url).is_err() {
            return invalid(format!(
                "browser.download_url is not a valid URL: '{}'",
                self.browser.download_url
            ));
        }
        if !self.browser.app_name.ends_with(".app") {
            return invalid(format!(
                "browser.app_name must end in .app: '{}'",
                self.browser.app_name
            ));
        }
        for ext in &self.browser.extensions {
            if ext.id.is_empty() || ext.id.contains('/') {
                return invalid(format!("invalid extension id '{}'", ext.id));
            }
            if url::Url::parse(&ext.url).is_err() {
                return invalid(format!("extension '{}' has an invalid URL", ext.id));
            }
        }
        if self.general.launch_agent_label.is_empty() {
            return invalid("general.launch_agent_label must not be empty".to_string());
        }
        Ok(())
    }

    /// Directory for run logs and recovery keys; defaults to `<home>/Desktop`
    pub fn log_dir(&self, home: &Path) -> PathBuf {
        self.general
            .log_dir
            .clone()
            .unwrap_or_else(|| home.join("Desktop"))
    }
}

//! Provisioning settings
//!
//! Built-in defaults target a Google Colab host. An optional TOML file can
//! override any of them; command-line flags are applied on top by the binary.
//!
//! ```toml
//! runtime_prefix = "/opt/miniforge3"
//! env_prefix = "/opt/qiime2_env"
//! downloader = "curl"
//! plugin = "empress"
//!
//! [markers]
//! env_release = "QIIME 2 release:"
//! ```

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use super::version::url_filename;

pub const DEFAULT_RUNTIME_PREFIX: &str = "/content/miniforge3";
pub const DEFAULT_ENV_PREFIX: &str = "/content/qiime2_env";
pub const DEFAULT_RUNTIME_INSTALLER_URL: &str =
    "https://github.com/conda-forge/miniforge/releases/latest/download/Miniforge3-Linux-x86_64.sh";
pub const DEFAULT_PACKAGE_MANAGER: &str = "mamba";
pub const DEFAULT_PLUGIN: &str = "empress";
pub const DEFAULT_LIBRARY: &str = "qiime2";
pub const DEFAULT_ENV_EXECUTABLE: &str = "qiime";

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = "q2-provision";

/// External tool used to fetch installers and manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Downloader {
    #[default]
    Wget,
    Curl,
}

impl Downloader {
    /// Command line that fetches `url` into `dest`.
    pub fn argv(self, url: &str, dest: &Path) -> Vec<String> {
        let dest = dest.display().to_string();
        match self {
            Downloader::Wget => vec!["wget".into(), "-nv".into(), url.into(), "-O".into(), dest],
            Downloader::Curl => vec!["curl".into(), "-fsSL".into(), "-o".into(), dest, url.into()],
        }
    }
}

impl fmt::Display for Downloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Downloader::Wget => f.write_str("wget"),
            Downloader::Curl => f.write_str("curl"),
        }
    }
}

/// Output substrings that mark a command as successful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
    /// `conda info` on a working runtime
    pub runtime_probe: String,
    /// Miniforge installer completion
    pub runtime_install: String,
    /// `qiime info` on a working environment
    pub env_release: String,
    /// `mamba env create` transaction completion
    pub env_transaction: String,
    /// `pip show <plugin>` on an installed plugin
    pub plugin_probe: String,
    /// `pip install`; the plugin name is appended
    pub plugin_install: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            runtime_probe: "conda version".to_string(),
            runtime_install: "installation finished.".to_string(),
            env_release: "QIIME 2 release:".to_string(),
            env_transaction: "Verifying transaction: ...working... done".to_string(),
            plugin_probe: "Name:".to_string(),
            plugin_install: "Successfully installed".to_string(),
        }
    }
}

/// Everything about the host layout and external tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub runtime_prefix: PathBuf,
    pub env_prefix: PathBuf,
    /// Where transient downloads are written
    pub work_dir: PathBuf,
    pub runtime_installer_url: String,
    pub downloader: Downloader,
    /// Executable under `<runtime_prefix>/bin` that creates environments
    pub package_manager: String,
    /// Extra flags for `env create`
    pub manager_flags: Vec<String>,
    /// Executable under `<env_prefix>/bin` used for verification
    pub env_executable: String,
    /// Module imported by the advisory import check
    pub library: String,
    pub plugin: Option<String>,
    pub markers: Markers,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            runtime_prefix: PathBuf::from(DEFAULT_RUNTIME_PREFIX),
            env_prefix: PathBuf::from(DEFAULT_ENV_PREFIX),
            work_dir: PathBuf::from("."),
            runtime_installer_url: DEFAULT_RUNTIME_INSTALLER_URL.to_string(),
            downloader: Downloader::default(),
            package_manager: DEFAULT_PACKAGE_MANAGER.to_string(),
            manager_flags: vec!["-vvv".to_string()],
            env_executable: DEFAULT_ENV_EXECUTABLE.to_string(),
            library: DEFAULT_LIBRARY.to_string(),
            plugin: Some(DEFAULT_PLUGIN.to_string()),
            markers: Markers::default(),
        }
    }
}

impl Settings {
    /// Defaults overlaid with the settings file, if any.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = Self::default();
        if let Some(path) = path {
            settings.apply(SettingsToml::read(path)?);
        }
        Ok(settings)
    }

    /// `$XDG_CONFIG_HOME/q2-provision/config.toml`, if it exists.
    pub fn default_path() -> Option<PathBuf> {
        let path = dirs::config_dir()?.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
        path.is_file().then_some(path)
    }

    fn apply(&mut self, file: SettingsToml) {
        if let Some(v) = file.runtime_prefix {
            self.runtime_prefix = v;
        }
        if let Some(v) = file.env_prefix {
            self.env_prefix = v;
        }
        if let Some(v) = file.work_dir {
            self.work_dir = v;
        }
        if let Some(v) = file.runtime_installer_url {
            self.runtime_installer_url = v;
        }
        if let Some(v) = file.downloader {
            self.downloader = v;
        }
        if let Some(v) = file.package_manager {
            self.package_manager = v;
        }
        if let Some(v) = file.manager_flags {
            self.manager_flags = v;
        }
        if let Some(v) = file.env_executable {
            self.env_executable = v;
        }
        if let Some(v) = file.library {
            self.library = v;
        }
        if let Some(v) = file.plugin {
            self.set_plugin(Some(v));
        }
        if let Some(m) = file.markers {
            m.apply(&mut self.markers);
        }
    }

    /// Set the plugin to install. A blank name disables the plugin stage.
    pub fn set_plugin(&mut self, plugin: Option<String>) {
        self.plugin = plugin.filter(|name| !name.trim().is_empty());
    }

    pub fn runtime_bin(&self, name: &str) -> PathBuf {
        self.runtime_prefix.join("bin").join(name)
    }

    pub fn env_bin(&self, name: &str) -> PathBuf {
        self.env_prefix.join("bin").join(name)
    }

    /// Local path of the downloaded runtime installer.
    pub fn installer_path(&self) -> PathBuf {
        self.work_dir.join(url_filename(&self.runtime_installer_url))
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SettingsToml {
    runtime_prefix: Option<PathBuf>,
    env_prefix: Option<PathBuf>,
    work_dir: Option<PathBuf>,
    runtime_installer_url: Option<String>,
    downloader: Option<Downloader>,
    package_manager: Option<String>,
    manager_flags: Option<Vec<String>>,
    env_executable: Option<String>,
    library: Option<String>,
    plugin: Option<String>,
    markers: Option<MarkersToml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MarkersToml {
    runtime_probe: Option<String>,
    runtime_install: Option<String>,
    env_release: Option<String>,
    env_transaction: Option<String>,
    plugin_probe: Option<String>,
    plugin_install: Option<String>,
}

impl SettingsToml {
    fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid settings file: {}", path.display()))
    }

    fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

impl MarkersToml {
    fn apply(self, markers: &mut Markers) {
        if let Some(v) = self.runtime_probe {
            markers.runtime_probe = v;
        }
        if let Some(v) = self.runtime_install {
            markers.runtime_install = v;
        }
        if let Some(v) = self.env_release {
            markers.env_release = v;
        }
        if let Some(v) = self.env_transaction {
            markers.env_transaction = v;
        }
        if let Some(v) = self.plugin_probe {
            markers.plugin_probe = v;
        }
        if let Some(v) = self.plugin_install {
            markers.plugin_install = v;
        }
    }
}

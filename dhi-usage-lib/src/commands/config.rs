use crate::Result;
use camino::{Utf8Path, Utf8PathBuf};
use core::time::Duration;
use directories::ProjectDirs;
use ohno::{IntoAppError, app_err};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;

/// The default configuration TOML content, embedded from `default_config.toml`
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../../default_config.toml");

/// Name of the configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "dhi-usage.toml";

const DATABASE_FILE: &str = "catalog.db";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Catalog database location; the platform data directory when unset
    #[serde(default)]
    pub database_path: Option<Utf8PathBuf>,

    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Cron expression with a leading seconds field
    #[serde(default = "default_refresh_schedule")]
    pub refresh_schedule: String,

    #[serde(default = "default_run_timeout", with = "humantime_serde")]
    pub run_timeout: Duration,

    #[serde(default = "default_stale_after", with = "humantime_serde")]
    pub stale_after: Duration,

    #[serde(default = "default_search_page_delay", with = "humantime_serde")]
    pub search_page_delay: Duration,

    #[serde(default = "default_repo_delay", with = "humantime_serde")]
    pub repo_delay: Duration,

    #[serde(default = "default_rate_limit_cooldown", with = "humantime_serde")]
    pub rate_limit_cooldown: Duration,

    #[serde(default = "default_max_search_rate_limit_retries")]
    pub max_search_rate_limit_retries: u32,
}

fn default_listen_address() -> String {
    "127.0.0.1:8080".into()
}

fn default_api_base_url() -> String {
    crate::github::DEFAULT_API_BASE_URL.into()
}

fn default_api_version() -> String {
    crate::github::DEFAULT_API_VERSION.into()
}

const fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_refresh_schedule() -> String {
    "0 0 6 * * *".into()
}

const fn default_run_timeout() -> Duration {
    Duration::from_secs(10 * 60)
}

const fn default_stale_after() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

const fn default_search_page_delay() -> Duration {
    Duration::from_secs(6)
}

const fn default_repo_delay() -> Duration {
    Duration::from_secs(1)
}

const fn default_rate_limit_cooldown() -> Duration {
    Duration::from_secs(60)
}

const fn default_max_search_rate_limit_retries() -> u32 {
    3
}

impl Config {
    /// Load configuration from `config_path`, or from `dhi-usage.toml` in the working
    /// directory if present, or fall back to defaults.
    pub fn load(config_path: Option<&Utf8Path>) -> Result<Self> {
        let (final_path, text) = if let Some(path) = config_path {
            let text = fs::read_to_string(path).into_app_err_with(|| format!("reading configuration file '{path}'"))?;
            (path.to_path_buf(), text)
        } else {
            let path = Utf8PathBuf::from(DEFAULT_CONFIG_FILE);
            match fs::read_to_string(&path) {
                Ok(text) => (path, text),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
                Err(e) => return Err(e).into_app_err_with(|| format!("reading configuration file '{path}'")),
            }
        };

        let config: Self = toml::from_str(&text).into_app_err_with(|| format!("parsing configuration file '{final_path}'"))?;
        config.validate()?;

        Ok(config)
    }

    /// Save the default configuration to a TOML file
    pub fn save_default(output_path: &Utf8Path) -> Result<()> {
        fs::write(output_path, DEFAULT_CONFIG_TOML).into_app_err_with(|| format!("writing default configuration to {output_path}"))?;
        Ok(())
    }

    /// The configured database path, or `catalog.db` under the platform data directory
    pub fn resolve_database_path(&self) -> Result<Utf8PathBuf> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }

        let dirs = ProjectDirs::from("", "", "dhi-usage").ok_or_else(|| app_err!("unable to determine the data directory"))?;
        let dir = Utf8PathBuf::from_path_buf(dirs.data_dir().to_path_buf())
            .map_err(|p| app_err!("data directory '{}' is not valid UTF-8", p.display()))?;

        Ok(dir.join(DATABASE_FILE))
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("request_timeout", self.request_timeout),
            ("run_timeout", self.run_timeout),
            ("stale_after", self.stale_after),
        ] {
            if value.is_zero() {
                return Err(app_err!("{name} must be greater than zero"));
            }
        }

        if self.refresh_schedule.trim().is_empty() {
            return Err(app_err!("refresh_schedule must not be empty"));
        }

        if self.api_base_url.trim().is_empty() {
            return Err(app_err!("api_base_url must not be empty"));
        }

        if self.listen_address.trim().is_empty() {
            return Err(app_err!("listen_address must not be empty"));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG_TOML).expect("default_config.toml should be valid TOML that deserializes to Config")
    }
}

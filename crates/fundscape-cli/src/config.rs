//! Configuration loading from TOML files

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use fundscape_core::BreadthCaps;
use fundscape_openalex::{CollectScope, DEFAULT_BASE_URL, FundingPredicate};
use serde::Deserialize;

/// Global configuration for fundscape
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub openalex: OpenAlexConfig,
    pub collect: CollectConfig,
    pub http: HttpSettings,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// `.parquet` selects Parquet, anything else CSV
    pub table_path: PathBuf,
    pub compression_level: i32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            table_path: PathBuf::from("data/usa_research_data.csv"),
            compression_level: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAlexConfig {
    pub base_url: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub mailto: Option<String>,
}

impl Default for OpenAlexConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            mailto: std::env::var("OPENALEX_MAILTO").ok(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
    pub country_code: String,
    pub start_year: u16,
    pub end_year: u16,
    pub funding: FundingPredicate,
    pub subfields: usize,
    pub funders: usize,
    pub topics: usize,
}

impl Default for CollectConfig {
    fn default() -> Self {
        let scope = CollectScope::default();
        let caps = BreadthCaps::default();
        Self {
            country_code: scope.country_code,
            start_year: scope.start_year,
            end_year: scope.end_year,
            funding: scope.funding,
            subfields: caps.subfields,
            funders: caps.funders,
            topics: caps.topics,
        }
    }
}

impl CollectConfig {
    pub fn scope(&self) -> CollectScope {
        CollectScope {
            country_code: self.country_code.clone(),
            start_year: self.start_year,
            end_year: self.end_year,
            funding: self.funding,
        }
    }

    pub fn caps(&self) -> BreadthCaps {
        BreadthCaps {
            subfields: self.subfields,
            funders: self.funders,
            topics: self.topics,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Whole-request timeout in seconds
    pub read_timeout: u64,
    pub max_retries: u32,
    /// Request budget: `max_requests` per `per_seconds`
    pub max_requests: u32,
    pub per_seconds: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            read_timeout: 30,
            max_retries: 3,
            max_requests: 8,
            per_seconds: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 5000)),
        }
    }
}

/// Deserialize a string that may reference environment variables as `${VAR}`
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand every `${VAR}` in `s`. `None` if any referenced variable is unset.
fn expand_env_var(s: &str) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let name = &rest[start + 2..start + 2 + len];
        out.push_str(&std::env::var(name).ok()?);
        rest = &rest[start + 3 + len..];
    }
    out.push_str(rest);
    Some(out)
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./fundscape.toml (current directory)
    /// 2. ~/.config/fundscape/config.toml (platform config dir)
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("fundscape.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "fundscape") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let c = &self.collect;
        if c.start_year > c.end_year {
            anyhow::bail!(
                "collect.start_year ({}) is after collect.end_year ({})",
                c.start_year,
                c.end_year
            );
        }
        if c.country_code.trim().is_empty() {
            anyhow::bail!("collect.country_code must not be empty");
        }
        Ok(())
    }

    /// Collection run settings
    pub fn openalex(&self) -> fundscape_openalex::Config {
        fundscape_openalex::Config {
            table_path: self.output.table_path.clone(),
            compression_level: self.output.compression_level,
            base_url: self.openalex.base_url.clone(),
            mailto: self.openalex.mailto.clone(),
            scope: self.collect.scope(),
            caps: self.collect.caps(),
            max_requests: self.http.max_requests,
            per: Duration::from_secs(self.http.per_seconds),
        }
    }
}

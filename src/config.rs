use chrono::FixedOffset;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::constants;
use crate::error::{LinesError, Result};
use crate::types::SourceId;

pub const DEFAULT_CONFIG_PATH: &str = "cbb_lines.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http: HttpConfig,
    pub schedule: ScheduleConfig,
    pub registry: RegistryConfig,
    pub odds_api: OddsApiConfig,
    pub sources: SourcesConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 20,
            user_agent: constants::DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Which source defines the slate, and how loosely other sources' dates may
/// line up with it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub authoritative: SourceId,
    /// Local clock used for date buckets, in whole hours east of UTC
    pub utc_offset_hours: i32,
    /// Calendar days a date bucket may differ by and still match
    pub date_tolerance_days: i64,
    /// Start instants this close match even across a date boundary
    pub time_drift_hours: i64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            authoritative: SourceId::OddsApi,
            utc_offset_hours: -5,
            date_tolerance_days: 0,
            time_drift_hours: 6,
        }
    }
}

impl ScheduleConfig {
    pub fn utc_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).ok_or_else(|| {
            LinesError::Config(format!("utc_offset_hours {} out of range", self.utc_offset_hours))
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub crosswalk_path: PathBuf,
    pub canonical_column: String,
    pub persisted_dir: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            crosswalk_path: PathBuf::from("crosswalk.csv"),
            canonical_column: constants::DEFAULT_CANONICAL_COLUMN.to_string(),
            persisted_dir: PathBuf::from("data/registry"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OddsApiConfig {
    pub base_url: String,
    pub sport: String,
    pub regions: String,
    pub markets: String,
    /// Read from the environment, never from the file
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for OddsApiConfig {
    fn default() -> Self {
        Self {
            base_url: constants::ODDS_API_BASE_URL.to_string(),
            sport: constants::ODDS_API_SPORT.to_string(),
            regions: constants::ODDS_API_REGIONS.to_string(),
            markets: constants::ODDS_API_MARKETS.to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub enabled: Vec<SourceId>,
    pub barttorvik_url: String,
    pub dratings_url: String,
    pub massey_url: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            enabled: SourceId::all().to_vec(),
            barttorvik_url: constants::BARTTORVIK_URL.to_string(),
            dratings_url: constants::DRATINGS_URL.to_string(),
            massey_url: constants::MASSEY_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration. An explicit path must exist; otherwise
    /// `cbb_lines.toml` is used when present and built-in defaults when not.
    /// The odds API key comes from `ODDS_API_KEY` (a `.env` file is honoured).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|e| {
                    LinesError::Config(format!(
                        "Failed to read config file '{}': {}",
                        path.display(),
                        e
                    ))
                })?;
                info!("Loaded config from {}", path.display());
                Self::from_toml_str(&text)?
            }
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                let text = fs::read_to_string(DEFAULT_CONFIG_PATH)?;
                info!("Loaded config from {}", DEFAULT_CONFIG_PATH);
                Self::from_toml_str(&text)?
            }
            None => {
                debug!("No config file, using defaults");
                Config::default()
            }
        };

        let _ = dotenv::dotenv();
        config.odds_api.api_key = std::env::var(constants::ODDS_API_KEY_ENV)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.schedule.utc_offset()?;
        if self.schedule.date_tolerance_days < 0 || self.schedule.time_drift_hours < 0 {
            return Err(LinesError::Config("schedule tolerances must not be negative".into()));
        }
        if self.http.timeout_seconds == 0 {
            return Err(LinesError::Config("http.timeout_seconds must be positive".into()));
        }
        Ok(())
    }

    /// Where to fetch a source's payload from
    pub fn url_for(&self, source: SourceId) -> Result<String> {
        match source {
            SourceId::OddsApi => {
                let key = self.odds_api.api_key.as_deref().ok_or_else(|| {
                    LinesError::Config(format!("{} not set", constants::ODDS_API_KEY_ENV))
                })?;
                Ok(format!(
                    "{}/v4/sports/{}/odds/?apiKey={}&regions={}&markets={}&oddsFormat=american",
                    self.odds_api.base_url.trim_end_matches('/'),
                    self.odds_api.sport,
                    key,
                    self.odds_api.regions,
                    self.odds_api.markets
                ))
            }
            SourceId::Barttorvik => Ok(self.sources.barttorvik_url.clone()),
            SourceId::DRatings => Ok(self.sources.dratings_url.clone()),
            SourceId::Massey => Ok(self.sources.massey_url.clone()),
        }
    }

    /// Enabled sources with the authoritative one always included
    pub fn active_sources(&self) -> Vec<SourceId> {
        let mut sources = self.sources.enabled.clone();
        if !sources.contains(&self.schedule.authoritative) {
            sources.insert(0, self.schedule.authoritative);
        }
        sources.sort();
        sources.dedup();
        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = Config::from_toml_str("[http]\ntimeout_seconds = 5\n").unwrap();
        assert_eq!(config.http.timeout_seconds, 5);
        assert_eq!(config.schedule.authoritative, SourceId::OddsApi);
        assert_eq!(config.schedule.utc_offset().unwrap().local_minus_utc(), -5 * 3600);
        assert_eq!(config.registry.canonical_column, "API");
    }

    #[test]
    fn test_authoritative_source_is_pluggable() {
        let config = Config::from_toml_str(
            "[schedule]\nauthoritative = \"dratings\"\n[sources]\nenabled = [\"massey\"]\n",
        )
        .unwrap();
        assert_eq!(config.schedule.authoritative, SourceId::DRatings);
        assert_eq!(config.active_sources(), vec![SourceId::DRatings, SourceId::Massey]);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Config::from_toml_str("[schedule]\nutc_offset_hours = 40\n").is_err());
        assert!(Config::from_toml_str("[schedule]\nauthoritative = \"kenpom\"\n").is_err());
        assert!(Config::from_toml_str("[http]\ntimeout_seconds = 0\n").is_err());
    }

    #[test]
    fn test_odds_url_requires_key() {
        let mut config = Config::default();
        assert!(config.url_for(SourceId::OddsApi).is_err());
        config.odds_api.api_key = Some("secret".into());
        let url = config.url_for(SourceId::OddsApi).unwrap();
        assert!(url.contains("/v4/sports/basketball_ncaab/odds/"));
        assert!(url.contains("apiKey=secret"));
        assert_eq!(config.url_for(SourceId::Massey).unwrap(), constants::MASSEY_URL);
    }
}

use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::PathBuf};

use crate::{aggregator::FailurePolicy, model::DEFAULT_DAY_COUNT, provider::ProviderId};

/// Environment variable pointing at an alternative config file.
pub const CONFIG_PATH_ENV: &str = "WEATHER_CONFIG";

/// Configuration for a single provider (e.g., API key).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Overrides the provider's public endpoint, mostly for testing against a stub.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub default_days: u32,
    pub max_days: u32,
    pub failure_policy: FailurePolicy,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            default_days: DEFAULT_DAY_COUNT,
            max_days: 5,
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub forecast: ForecastConfig,

    /// Every entry is an enabled provider. Example TOML:
    /// [providers.openweather]
    /// api_key = "..."
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl Default for Config {
    /// Out of the box only Open-Meteo is enabled, since it needs no credentials.
    fn default() -> Self {
        let mut providers = BTreeMap::new();
        providers.insert(ProviderId::OpenMeteo.as_str().to_string(), ProviderConfig::default());

        Self { server: ServerConfig::default(), forecast: ForecastConfig::default(), providers }
    }
}

impl Config {
    pub fn has_provider(&self, id: ProviderId) -> bool {
        self.providers.contains_key(id.as_str())
    }

    pub fn provider_config(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers.get(id.as_str())
    }

    /// Enabled providers as strongly-typed ids, failing on unknown names.
    pub fn enabled_providers(&self) -> Result<Vec<ProviderId>> {
        self.providers
            .keys()
            .map(|name| ProviderId::try_from(name.as_str()))
            .collect::<Result<Vec<_>>>()
            .context("Invalid [providers] section in configuration")
    }

    /// Load config from disk, or return the default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;
        self.save_to(&path)?;
        Ok(())
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file, honouring `WEATHER_CONFIG`.
    pub fn config_file_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let dirs = ProjectDirs::from("dev", "weather-task", "weather-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Layer environment values over the file: `WEATHER_HOST`, `WEATHER_PORT` and
    /// `<PROVIDER>_API_KEY` for providers already enabled in the file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("WEATHER_HOST") {
            self.server.host = host;
        }

        if let Some(port) = lookup("WEATHER_PORT") {
            self.server.port =
                port.parse().with_context(|| format!("Invalid WEATHER_PORT value '{port}'"))?;
        }

        for id in ProviderId::all() {
            if let Some(cfg) = self.providers.get_mut(id.as_str()) {
                if let Some(key) = lookup(id.api_key_env()) {
                    cfg.api_key = Some(key);
                }
            }
        }

        Ok(())
    }

    /// Convenience helper: enable a provider and set/replace its API key.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        self.providers.entry(provider_id.as_str().to_string()).or_default().api_key = Some(api_key);
    }

    /// Enable a provider that needs no credentials.
    pub fn enable_provider(&mut self, provider_id: ProviderId) {
        self.providers.entry(provider_id.as_str().to_string()).or_default();
    }

    /// Returns API key for a provider, if present and non-blank.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.providers
            .get(provider_id.as_str())
            .and_then(|cfg| cfg.api_key.as_deref())
            .filter(|key| !key.trim().is_empty())
    }

    pub fn is_provider_configured(&self, provider_id: ProviderId) -> bool {
        self.has_provider(provider_id)
            && (!provider_id.requires_api_key() || self.provider_api_key(provider_id).is_some())
    }

    fn validate(&self) -> Result<()> {
        let f = &self.forecast;
        if f.max_days == 0 {
            return Err(anyhow!("forecast.max_days must be at least 1"));
        }
        if f.default_days == 0 || f.default_days > f.max_days {
            return Err(anyhow!(
                "forecast.default_days must be between 1 and forecast.max_days ({}), got {}",
                f.max_days,
                f.default_days
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderId;
    use std::collections::HashMap;

    #[test]
    fn default_enables_open_meteo_only() {
        let cfg = Config::default();

        assert_eq!(cfg.enabled_providers().unwrap(), vec![ProviderId::OpenMeteo]);
        assert!(cfg.is_provider_configured(ProviderId::OpenMeteo));
        assert!(!cfg.is_provider_configured(ProviderId::OpenWeather));
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.forecast.default_days, 5);
        assert_eq!(cfg.forecast.failure_policy, FailurePolicy::Placeholder);
    }

    #[test]
    fn set_api_key_for_provider() {
        let mut cfg = Config::default();

        cfg.upsert_provider_api_key(ProviderId::OpenWeather, "OPEN_KEY".into());

        let key = cfg.provider_api_key(ProviderId::OpenWeather);
        assert_eq!(key, Some("OPEN_KEY"));
        assert!(cfg.is_provider_configured(ProviderId::OpenWeather));
    }

    #[test]
    fn upsert_replaces_existing_key() {
        let mut cfg = Config::default();

        cfg.upsert_provider_api_key(ProviderId::WeatherApi, "OLD".into());
        cfg.upsert_provider_api_key(ProviderId::WeatherApi, "NEW".into());

        assert_eq!(cfg.provider_api_key(ProviderId::WeatherApi), Some("NEW"));
        assert_eq!(cfg.providers.len(), 2);
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let mut cfg = Config::default();
        cfg.upsert_provider_api_key(ProviderId::OpenWeather, "  ".into());

        assert!(cfg.has_provider(ProviderId::OpenWeather));
        assert_eq!(cfg.provider_api_key(ProviderId::OpenWeather), None);
        assert!(!cfg.is_provider_configured(ProviderId::OpenWeather));
    }

    #[test]
    fn parses_full_toml() {
        let cfg = Config::from_toml(
            r#"
            [server]
            port = 9090

            [forecast]
            default_days = 3
            max_days = 14
            failure_policy = "omit"

            [providers.open-meteo]

            [providers.weatherapi]
            api_key = "WA_KEY"
            base_url = "http://localhost:1234/v1/forecast.json"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.forecast.max_days, 14);
        assert_eq!(cfg.forecast.failure_policy, FailurePolicy::Omit);
        assert_eq!(
            cfg.enabled_providers().unwrap(),
            vec![ProviderId::OpenMeteo, ProviderId::WeatherApi]
        );
        assert_eq!(
            cfg.provider_config(ProviderId::WeatherApi).unwrap().base_url.as_deref(),
            Some("http://localhost:1234/v1/forecast.json")
        );
    }

    #[test]
    fn rejects_default_days_above_max() {
        let err = Config::from_toml("[forecast]\ndefault_days = 7\nmax_days = 5\n").unwrap_err();
        assert!(err.to_string().contains("default_days"));
    }

    #[test]
    fn unknown_provider_section_is_reported() {
        let cfg = Config::from_toml("[providers.darksky]\napi_key = \"x\"\n").unwrap();
        let err = cfg.enabled_providers().unwrap_err();
        assert!(format!("{err:#}").contains("Unknown provider 'darksky'"));
    }

    #[test]
    fn env_overrides_apply_to_enabled_providers() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("WEATHER_PORT", "3000"),
            ("OPENWEATHER_API_KEY", "FROM_ENV"),
            ("WEATHERAPI_API_KEY", "IGNORED"),
        ]);

        let mut cfg = Config::default();
        cfg.upsert_provider_api_key(ProviderId::OpenWeather, "FROM_FILE".into());
        cfg.apply_env_overrides(|k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.provider_api_key(ProviderId::OpenWeather), Some("FROM_ENV"));
        assert!(!cfg.has_provider(ProviderId::WeatherApi));
    }

    #[test]
    fn invalid_port_override_fails() {
        let mut cfg = Config::default();
        let err = cfg
            .apply_env_overrides(|k| (k == "WEATHER_PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("WEATHER_PORT"));
    }

    #[test]
    fn save_and_load_roundtrip_through_file() {
        let path = std::env::temp_dir()
            .join(format!("weather-core-config-{}", std::process::id()))
            .join("config.toml");

        let mut cfg = Config::default();
        cfg.upsert_provider_api_key(ProviderId::OpenWeather, "KEY".into());
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, cfg);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn missing_file_loads_defaults() {
        let path = std::env::temp_dir().join("weather-core-definitely-missing.toml");
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());
    }
}

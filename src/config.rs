use serde::Deserialize;
use std::path::Path;

/// Endpoint coordinates for one LLM provider. A provider with an empty
/// `api_key` is absent from the router's active set.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub source: String,
    pub url: String,
}

/// Top-level config loaded from `radar.toml`, then overridden by environment
/// variables (the env name is the TOML key uppercased).
#[derive(Debug, Clone, Deserialize)]
pub struct RadarConfig {
    /// Minimum `value_score` a signal needs to be persisted (1-5).
    #[serde(default = "default_push_threshold")]
    pub push_threshold: u8,
    #[serde(default = "default_seen_retention_days")]
    pub seen_retention_days: u32,
    /// Provider order the router tries, e.g. `["zhipu_glm", "gemini"]`.
    #[serde(default = "default_provider_order")]
    pub llm_providers: Vec<String>,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default = "default_timeout_summarize")]
    pub llm_timeout_summarize_ms: u64,
    #[serde(default = "default_timeout_daily")]
    pub llm_timeout_daily_ms: u64,
    #[serde(default = "default_timeout_weekly")]
    pub llm_timeout_weekly_ms: u64,
    #[serde(default = "default_true")]
    pub daily_llm_enabled: bool,
    #[serde(default = "default_daily_max_signals")]
    pub daily_max_signals_for_llm: usize,
    #[serde(default = "default_prompt_version")]
    pub prompt_version: String,
    #[serde(default = "default_kv_path")]
    pub kv_path: String,
    #[serde(default)]
    pub chat_webhook_url: Option<String>,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

fn default_push_threshold() -> u8 {
    3
}

fn default_seen_retention_days() -> u32 {
    14
}

fn default_provider_order() -> Vec<String> {
    vec!["zhipu_glm".to_string(), "gemini".to_string()]
}

fn default_timeout_summarize() -> u64 {
    30_000
}

fn default_timeout_daily() -> u64 {
    120_000
}

fn default_timeout_weekly() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_daily_max_signals() -> usize {
    10
}

fn default_prompt_version() -> String {
    "2.0.0".to_string()
}

fn default_kv_path() -> String {
    "./radar_kv.db".to_string()
}

impl Default for RadarConfig {
    fn default() -> Self {
        // An empty TOML document yields every serde default.
        toml::from_str("").expect("defaults deserialize")
    }
}

impl RadarConfig {
    /// Load config from a TOML file, apply env overrides. Returns defaults
    /// if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: RadarConfig = toml::from_str(&contents)?;
            tracing::info!("loaded config from {}", path.display());
            config
        } else {
            tracing::info!("config file not found at {}, using defaults", path.display());
            RadarConfig::default()
        };
        config.apply_env();
        config.push_threshold = config.push_threshold.clamp(1, 5);
        Ok(config)
    }

    fn apply_env(&mut self) {
        env_parse("PUSH_THRESHOLD", &mut self.push_threshold);
        env_parse("SEEN_RETENTION_DAYS", &mut self.seen_retention_days);
        env_parse("LLM_TIMEOUT_SUMMARIZE_MS", &mut self.llm_timeout_summarize_ms);
        env_parse("LLM_TIMEOUT_DAILY_MS", &mut self.llm_timeout_daily_ms);
        env_parse("LLM_TIMEOUT_WEEKLY_MS", &mut self.llm_timeout_weekly_ms);
        env_parse("DAILY_LLM_ENABLED", &mut self.daily_llm_enabled);
        env_parse("DAILY_MAX_SIGNALS_FOR_LLM", &mut self.daily_max_signals_for_llm);
        if let Ok(v) = std::env::var("PROMPT_VERSION") {
            self.prompt_version = v;
        }
        if let Ok(v) = std::env::var("RADAR_KV_PATH") {
            self.kv_path = v;
        }
        if let Ok(v) = std::env::var("CHAT_WEBHOOK_URL") {
            if !v.trim().is_empty() {
                self.chat_webhook_url = Some(v);
            }
        }
        if let Ok(v) = std::env::var("LLM_PROVIDERS") {
            self.llm_providers = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        // `FEED_URLS=hacker_news=https://...,product_hunt=https://...`
        if let Ok(v) = std::env::var("FEED_URLS") {
            self.feeds = v
                .split(',')
                .filter_map(|pair| {
                    let (source, url) = pair.split_once('=')?;
                    Some(FeedConfig {
                        source: source.trim().to_string(),
                        url: url.trim().to_string(),
                    })
                })
                .collect();
        }
        for name in ["zhipu_glm", "gemini"] {
            self.merge_provider_env(name);
        }
    }

    /// Fold `ZHIPU_API_KEY` / `GEMINI_MODEL` style variables into the
    /// provider table, creating the entry if the TOML didn't declare one.
    fn merge_provider_env(&mut self, name: &str) {
        let prefix = match name {
            "zhipu_glm" => "ZHIPU",
            "gemini" => "GEMINI",
            _ => return,
        };
        let api_key = std::env::var(format!("{prefix}_API_KEY")).ok();
        let api_url = std::env::var(format!("{prefix}_API_URL")).ok();
        let model = std::env::var(format!("{prefix}_MODEL")).ok();
        if api_key.is_none() && api_url.is_none() && model.is_none() {
            return;
        }
        let entry = match self.providers.iter_mut().find(|p| p.name == name) {
            Some(entry) => entry,
            None => {
                self.providers.push(ProviderConfig {
                    name: name.to_string(),
                    ..Default::default()
                });
                self.providers.last_mut().unwrap()
            }
        };
        if let Some(v) = api_key {
            entry.api_key = v;
        }
        if let Some(v) = api_url {
            entry.api_url = v;
        }
        if let Some(v) = model {
            entry.model = v;
        }
    }

    /// Providers in router order, keyless entries dropped.
    pub fn active_providers(&self) -> Vec<&ProviderConfig> {
        self.llm_providers
            .iter()
            .filter_map(|name| {
                self.providers
                    .iter()
                    .find(|p| &p.name == name && !p.api_key.trim().is_empty())
            })
            .collect()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, target: &mut T) {
    if let Ok(v) = std::env::var(name) {
        match v.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!("ignoring unparsable env var {name}={v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = RadarConfig::default();
        assert_eq!(config.push_threshold, 3);
        assert_eq!(config.seen_retention_days, 14);
        assert_eq!(config.llm_timeout_summarize_ms, 30_000);
        assert_eq!(config.llm_timeout_daily_ms, 120_000);
        assert_eq!(config.llm_timeout_weekly_ms, 30_000);
        assert!(config.daily_llm_enabled);
        assert_eq!(config.daily_max_signals_for_llm, 10);
        assert_eq!(config.prompt_version, "2.0.0");
        assert_eq!(config.llm_providers, vec!["zhipu_glm", "gemini"]);
    }

    #[test]
    fn toml_overrides_defaults() {
        let config: RadarConfig = toml::from_str(
            r#"
            push_threshold = 4
            daily_llm_enabled = false

            [[providers]]
            name = "gemini"
            api_key = "k"
            "#,
        )
        .unwrap();
        assert_eq!(config.push_threshold, 4);
        assert!(!config.daily_llm_enabled);
        let active = config.active_providers();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "gemini");
    }

    #[test]
    fn keyless_provider_is_not_active() {
        let config: RadarConfig = toml::from_str(
            r#"
            [[providers]]
            name = "zhipu_glm"
            model = "glm-4-flash"
            "#,
        )
        .unwrap();
        assert!(config.active_providers().is_empty());
    }

    #[test]
    fn active_providers_follow_router_order() {
        let config: RadarConfig = toml::from_str(
            r#"
            llm_providers = ["gemini", "zhipu_glm"]

            [[providers]]
            name = "zhipu_glm"
            api_key = "a"

            [[providers]]
            name = "gemini"
            api_key = "b"
            "#,
        )
        .unwrap();
        let names: Vec<&str> = config
            .active_providers()
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["gemini", "zhipu_glm"]);
    }
}

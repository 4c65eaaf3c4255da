use std::{env, net::SocketAddr, path::Path};

use clap::Parser;
use config::{builder::DefaultState, ConfigBuilder, ConfigError, File};
use serde::{Deserialize, Serialize};

const DEFAULT_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_LLM_URL: &str = "https://api.openai.com/v1";
const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini-2024-07-18";
const DEFAULT_CATALOG_URL: &str = "https://www.shyaway.com/graphql";
const DEFAULT_CATALOG_HOST: &str = "www.shyaway.com";
const DEFAULT_PAGE_SIZE: i64 = 20;
const DEFAULT_DISPLAY_COUNT: i64 = 4;
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CATALOG_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SESSION_IDLE_SECS: u64 = 1800;
const API_KEY_VAR: &str = "OPENAI_API_KEY";

#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    /// Path to the local configuration TOML file.
    #[arg(short, value_name = "CONFIG_PATH")]
    pub config: std::path::PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Web {
    #[serde(deserialize_with = "deserialize_socket_addr")]
    pub address: SocketAddr,
    /// Sessions untouched for this long are dropped.
    pub session_idle_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    OpenAi,
    Ollama,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LlmSettings {
    pub backend: Backend,
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
    pub stream: bool,
    /// Whether earlier turns are replayed to the model.
    pub retain_history: bool,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSettings {
    pub graphql_url: String,
    pub host: String,
    pub page_size: i64,
    pub display_count: usize,
    pub sort_by: String,
    pub sort_direction: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub sample_seed: Option<u64>,
    pub timeout_secs: u64,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            graphql_url: DEFAULT_CATALOG_URL.to_string(),
            host: DEFAULT_CATALOG_HOST.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            display_count: DEFAULT_DISPLAY_COUNT as usize,
            sort_by: "position".to_string(),
            sort_direction: "asc".to_string(),
            token: None,
            sample_seed: None,
            timeout_secs: DEFAULT_CATALOG_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Settings {
    pub web: Web,
    pub llm: LlmSettings,
    pub catalog: CatalogSettings,
}

impl Settings {
    /// Load settings from the given TOML file, with sane defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let builder = ConfigBuilder::<DefaultState>::default()
            .set_default("web.address", DEFAULT_ADDR)?
            .set_default("web.session_idle_secs", DEFAULT_SESSION_IDLE_SECS)?
            .set_default("llm.backend", "openai")?
            .set_default("llm.url", DEFAULT_LLM_URL)?
            .set_default("llm.model", DEFAULT_LLM_MODEL)?
            .set_default("llm.stream", false)?
            .set_default("llm.retain_history", false)?
            .set_default("llm.timeout_secs", DEFAULT_LLM_TIMEOUT_SECS)?
            .set_default("catalog.graphql_url", DEFAULT_CATALOG_URL)?
            .set_default("catalog.host", DEFAULT_CATALOG_HOST)?
            .set_default("catalog.page_size", DEFAULT_PAGE_SIZE)?
            .set_default("catalog.display_count", DEFAULT_DISPLAY_COUNT)?
            .set_default("catalog.sort_by", "position")?
            .set_default("catalog.sort_direction", "asc")?
            .set_default("catalog.timeout_secs", DEFAULT_CATALOG_TIMEOUT_SECS)?;

        let cfg = builder.add_source(File::from(path)).build()?;

        let mut settings: Self = cfg.try_deserialize()?;
        if settings.llm.api_key.is_none() {
            settings.llm.api_key = env::var(API_KEY_VAR).ok().filter(|key| !key.is_empty());
        }
        Ok(settings)
    }
}

fn deserialize_socket_addr<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn empty_file_yields_defaults() {
        let file = write_config("");
        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.web.address, DEFAULT_ADDR.parse().unwrap());
        assert_eq!(settings.llm.backend, Backend::OpenAi);
        assert_eq!(settings.llm.model, DEFAULT_LLM_MODEL);
        assert!(!settings.llm.stream);
        assert_eq!(settings.catalog.page_size, 20);
        assert_eq!(settings.catalog.display_count, 4);
        assert_eq!(settings.catalog.sort_by, "position");
        assert_eq!(settings.catalog.host, "www.shyaway.com");
        assert!(settings.catalog.sample_seed.is_none());
        assert_eq!(settings.llm.timeout_secs, 60);
        assert_eq!(settings.catalog.timeout_secs, 30);
        assert_eq!(settings.web.session_idle_secs, 1800);
    }

    #[test]
    fn file_values_override_defaults() {
        let file = write_config(
            r#"
            [web]
            address = "0.0.0.0:9000"

            [llm]
            backend = "ollama"
            url = "http://127.0.0.1:11434"
            model = "llama3.2"
            api_key = "secret"

            [catalog]
            host = "shop.example.com"
            display_count = 6
            sample_seed = 11
            timeout_secs = 5
            "#,
        );
        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.web.address.port(), 9000);
        assert_eq!(settings.llm.backend, Backend::Ollama);
        assert_eq!(settings.llm.api_key.as_deref(), Some("secret"));
        assert_eq!(settings.catalog.host, "shop.example.com");
        assert_eq!(settings.catalog.display_count, 6);
        assert_eq!(settings.catalog.sample_seed, Some(11));
        assert_eq!(settings.catalog.page_size, 20);
        assert_eq!(settings.catalog.timeout_secs, 5);
        assert_eq!(settings.llm.timeout_secs, 60);
    }

    #[test]
    fn bad_address_is_rejected() {
        let file = write_config("[web]\naddress = \"not-an-address\"\n");
        assert!(Settings::from_file(file.path()).is_err());
    }

    #[test]
    fn default_catalog_settings_match_file_defaults() {
        let file = write_config("");
        let settings = Settings::from_file(file.path()).unwrap();
        let defaults = CatalogSettings::default();
        assert_eq!(settings.catalog.graphql_url, defaults.graphql_url);
        assert_eq!(settings.catalog.page_size, defaults.page_size);
        assert_eq!(settings.catalog.display_count, defaults.display_count);
        assert_eq!(settings.catalog.timeout_secs, defaults.timeout_secs);
    }
}

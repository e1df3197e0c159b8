use crawl::client::DEFAULT_CRAWLER_URL;
use crawl::CrawlerConfig;
use extract::filter::{DEFAULT_NEGATIVE_KEYWORDS, DEFAULT_PLACEHOLDER};
use extract::llm::{DEFAULT_GEMINI_MODEL, DEFAULT_GEMINI_URL};
use extract::{GeminiConfig, NegativityFilter};
use graph::{Neo4jConfig, WriteMode};
use orchestrator::OrchestratorConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphBackendKind {
    Neo4j,
    Memory,
}

impl FromStr for GraphBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "neo4j" => Ok(GraphBackendKind::Neo4j),
            "memory" => Ok(GraphBackendKind::Memory),
            other => Err(format!("expected `neo4j` or `memory`, got `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub keywords: Vec<String>,
    pub placeholder: String,
}

impl FilterConfig {
    pub fn build(&self) -> NegativityFilter {
        NegativityFilter::new(self.keywords.clone(), self.placeholder.clone())
    }
}

/// Everything the service needs, read once at startup and handed to each
/// client constructor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub gemini: GeminiConfig,
    pub crawler: CrawlerConfig,
    pub graph_backend: GraphBackendKind,
    pub neo4j: Neo4jConfig,
    pub orchestrator: OrchestratorConfig,
    pub cache: CacheConfig,
    /// Runs whose status and result stay retrievable by id
    pub registry_max_entries: usize,
    pub filter: FilterConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            gemini: GeminiConfig {
                api_key: String::new(),
                model: DEFAULT_GEMINI_MODEL.to_string(),
                base_url: DEFAULT_GEMINI_URL.to_string(),
            },
            crawler: CrawlerConfig {
                api_key: String::new(),
                base_url: DEFAULT_CRAWLER_URL.to_string(),
            },
            graph_backend: GraphBackendKind::Neo4j,
            neo4j: Neo4jConfig {
                uri: "bolt://localhost:7687".to_string(),
                username: "neo4j".to_string(),
                password: String::new(),
                write_mode: WriteMode::CreateOnly,
            },
            orchestrator: OrchestratorConfig::default(),
            cache: CacheConfig {
                enabled: true,
                max_entries: 1000,
            },
            registry_max_entries: 1000,
            filter: FilterConfig {
                keywords: DEFAULT_NEGATIVE_KEYWORDS.iter().map(|k| k.to_string()).collect(),
                placeholder: DEFAULT_PLACEHOLDER.to_string(),
            },
        }
    }
}

impl ServiceConfig {
    /// Read from the process environment, after loading `.env` if present
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    /// Build from any key lookup. Unset or empty keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(addr) = var("BIND_ADDR") {
            config.bind_addr = addr;
        }

        if let Some(key) = var("GEMINI_API_KEY") {
            config.gemini.api_key = key;
        }
        if let Some(model) = var("GEMINI_MODEL") {
            config.gemini.model = model;
        }
        if let Some(url) = var("GEMINI_BASE_URL") {
            config.gemini.base_url = url;
        }

        if let Some(key) = var("CRAWLER_API_KEY") {
            config.crawler.api_key = key;
        }
        if let Some(url) = var("CRAWLER_BASE_URL") {
            config.crawler.base_url = url;
        }

        if let Some(uri) = var("NEO4J_URI") {
            config.neo4j.uri = uri;
        }
        if let Some(username) = var("NEO4J_USERNAME") {
            config.neo4j.username = username;
        }
        if let Some(password) = var("NEO4J_PASSWORD") {
            config.neo4j.password = password;
        }
        if let Some(backend) = var("GRAPH_BACKEND") {
            config.graph_backend =
                parse_with("GRAPH_BACKEND", &backend, GraphBackendKind::from_str)?;
        }
        if let Some(mode) = var("GRAPH_WRITE_MODE") {
            config.neo4j.write_mode = parse_with("GRAPH_WRITE_MODE", &mode, WriteMode::from_str)?;
        }

        if let Some(max) = var("MAX_ENTITIES_PER_PAGE") {
            config.orchestrator.max_entities_per_page =
                parse_number("MAX_ENTITIES_PER_PAGE", &max)?;
        }
        if let Some(concurrency) = var("GRAPH_WRITE_CONCURRENCY") {
            config.orchestrator.write_concurrency =
                parse_number("GRAPH_WRITE_CONCURRENCY", &concurrency)?;
        }

        if let Some(enabled) = var("CACHE_ENABLED") {
            config.cache.enabled = parse_with("CACHE_ENABLED", &enabled, parse_flag)?;
        }
        if let Some(max) = var("CACHE_MAX_ENTRIES") {
            config.cache.max_entries = parse_number("CACHE_MAX_ENTRIES", &max)?;
        }
        if let Some(max) = var("REGISTRY_MAX_ENTRIES") {
            config.registry_max_entries = parse_number("REGISTRY_MAX_ENTRIES", &max)?;
        }

        if let Some(keywords) = var("NEGATIVE_KEYWORDS") {
            config.filter.keywords = keywords
                .split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gemini.api_key.is_empty() {
            return Err(ConfigError::Missing("GEMINI_API_KEY"));
        }
        if self.crawler.api_key.is_empty() {
            return Err(ConfigError::Missing("CRAWLER_API_KEY"));
        }
        if self.graph_backend == GraphBackendKind::Neo4j && self.neo4j.password.is_empty() {
            return Err(ConfigError::Missing("NEO4J_PASSWORD"));
        }
        if self.orchestrator.write_concurrency == 0 {
            return Err(ConfigError::Invalid {
                name: "GRAPH_WRITE_CONCURRENCY",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid {
                name: "CACHE_MAX_ENTRIES",
                value: "0".to_string(),
                reason: "must be at least 1 while the cache is enabled".to_string(),
            });
        }
        if self.registry_max_entries == 0 {
            return Err(ConfigError::Invalid {
                name: "REGISTRY_MAX_ENTRIES",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_with<T>(
    name: &'static str,
    value: &str,
    parse: impl Fn(&str) -> Result<T, String>,
) -> Result<T, ConfigError> {
    parse(value).map_err(|reason| ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason,
    })
}

fn parse_number(name: &'static str, value: &str) -> Result<usize, ConfigError> {
    parse_with(name, value, |v| v.parse::<usize>().map_err(|e| e.to_string()))
}

fn parse_flag(value: &str) -> Result<bool, String> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("expected a boolean, got `{other}`")),
    }
}

//! Carga y gestión de configuración de la aplicación (UMLS + caché + grafo + Neo4j).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};

pub const DEFAULT_AUTH_URL: &str = "https://utslogin.nlm.nih.gov/cas/v1/api-key";
pub const DEFAULT_API_BASE: &str = "https://uts-ws.nlm.nih.gov/rest";
pub const DEFAULT_SERVICE: &str = "http://umlsks.nlm.nih.gov";

/// Parámetros del servicio de terminología UMLS (UTS).
#[derive(Clone, Debug)]
pub struct UmlsConfig {
    pub api_key: Option<String>,
    pub auth_url: String,
    pub api_base: String,
    pub service: String,
    /// Fuente preferida para definiciones y átomos (ej: "MSH").
    pub preferred_source: String,
    /// Pausa antes de cada lectura remota. Cero desactiva el ritmo.
    pub request_delay: Duration,
}

impl UmlsConfig {
    /// La clave sólo es obligatoria cuando de verdad hay que consultar el servicio.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow!("Falta UMLS_API_KEY en el entorno"))
    }
}

impl Default for UmlsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            auth_url: DEFAULT_AUTH_URL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            service: DEFAULT_SERVICE.to_string(),
            preferred_source: "MSH".to_string(),
            request_delay: Duration::ZERO,
        }
    }
}

/// Credenciales de Neo4j para la exportación opcional del grafo.
#[derive(Clone, Debug)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub umls: UmlsConfig,

    pub cache_path: PathBuf,
    pub dataset_dir: PathBuf,
    pub vocab_dir: PathBuf,

    pub graph_path: PathBuf,
    pub graph_rebuild: bool,
    pub graph_include_ancestors: bool,
    pub graph_include_siblings: bool,
    pub closure_max_passes: usize,

    pub neo4j: Option<Neo4jConfig>,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let umls = UmlsConfig {
            api_key: env::var("UMLS_API_KEY").ok(),
            auth_url: env::var("UMLS_AUTH_URL").unwrap_or_else(|_| DEFAULT_AUTH_URL.to_string()),
            api_base: env::var("UMLS_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            service: env::var("UMLS_SERVICE").unwrap_or_else(|_| DEFAULT_SERVICE.to_string()),
            preferred_source: env::var("UMLS_PREFERRED_SOURCE")
                .unwrap_or_else(|_| "MSH".to_string()),
            request_delay: Duration::from_millis(parse_var("UMLS_REQUEST_DELAY_MS", 0u64)?),
        };

        let cache_path = env::var("CACHE_PATH")
            .unwrap_or_else(|_| "data/umls/cui_metadata_cache.jsonl".to_string())
            .into();
        let dataset_dir = env::var("DATASET_DIR").unwrap_or_else(|_| "cache".to_string()).into();
        let vocab_dir = env::var("VOCAB_DIR").unwrap_or_else(|_| "data/vocab".to_string()).into();
        let graph_path = env::var("GRAPH_PATH")
            .unwrap_or_else(|_| "data/graph/ontology_graph.json".to_string())
            .into();

        let neo4j = match env::var("NEO4J_URI") {
            Ok(uri) => Some(Neo4jConfig {
                uri,
                user: env::var("NEO4J_USER")
                    .map_err(|_| anyhow!("Falta NEO4J_USER en el entorno"))?,
                password: env::var("NEO4J_PASSWORD")
                    .map_err(|_| anyhow!("Falta NEO4J_PASSWORD en el entorno"))?,
            }),
            Err(_) => None,
        };

        Ok(Self {
            umls,
            cache_path,
            dataset_dir,
            vocab_dir,
            graph_path,
            graph_rebuild: parse_flag("GRAPH_REBUILD")?,
            graph_include_ancestors: parse_flag("GRAPH_INCLUDE_ANCESTORS")?,
            graph_include_siblings: parse_flag("GRAPH_INCLUDE_SIBLINGS")?,
            closure_max_passes: parse_var("CLOSURE_MAX_PASSES", 64usize)?,
            neo4j,
        })
    }
}

fn parse_flag(name: &str) -> Result<bool> {
    match env::var(name) {
        Ok(v) => parse_bool(&v).ok_or_else(|| anyhow!("Valor booleano no válido en {name}: {v}")),
        Err(_) => Ok(false),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| anyhow!("Valor numérico no válido en {name}: {v}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_boolean_flags() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" on "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool(""), Some(false));
        assert_eq!(parse_bool("quizás"), None);
    }

    #[test]
    fn api_key_is_required_only_on_demand() {
        let mut cfg = UmlsConfig::default();
        assert!(cfg.require_api_key().is_err());

        cfg.api_key = Some("   ".to_string());
        assert!(cfg.require_api_key().is_err());

        cfg.api_key = Some("abc-123".to_string());
        assert_eq!(cfg.require_api_key().unwrap(), "abc-123");
    }
}

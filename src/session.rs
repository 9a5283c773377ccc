//! Sesión autenticada contra el servicio de terminología UMLS (UTS).
//!
//! El protocolo tiene dos niveles de credencial:
//!   - un *grant* (TGT) de larga duración, obtenido una sola vez por proceso
//!     a partir de la API key;
//!   - un *ticket* de servicio de un solo uso, que se pide inmediatamente
//!     antes de cada lectura remota y nunca se reutiliza.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::LOCATION, Client, StatusCode};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

use crate::config::UmlsConfig;
use crate::error::{EnrichError, Result};

/// Los cuatro endpoints lógicos del servicio remoto. El de concepto-por-id es
/// un `fetch` más sobre una URL construida por el resolvedor.
#[async_trait]
pub trait UtsApi: Send + Sync {
    /// API key → grant. Cualquier fallo es `EnrichError::Auth`.
    async fn issue_grant(&self, api_key: &str) -> Result<String>;

    /// Grant → ticket de un solo uso. Cualquier fallo es `EnrichError::Session`.
    async fn issue_ticket(&self, grant: &str) -> Result<String>;

    /// Lectura genérica de un recurso JSON autenticada con `ticket`.
    async fn fetch(&self, url: &Url, ticket: &str) -> Result<Value>;
}

/// Implementación real sobre HTTP con `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpUtsApi {
    client: Client,
    auth_url: String,
    service: String,
}

impl HttpUtsApi {
    pub fn from_config(cfg: &UmlsConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("umls_ontology_graph/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| EnrichError::Session(format!("no se pudo crear el cliente HTTP: {e}")))?;

        Ok(Self {
            client,
            auth_url: cfg.auth_url.trim_end_matches('/').to_string(),
            service: cfg.service.clone(),
        })
    }
}

#[async_trait]
impl UtsApi for HttpUtsApi {
    async fn issue_grant(&self, api_key: &str) -> Result<String> {
        let resp = self
            .client
            .post(&self.auth_url)
            .form(&[("apikey", api_key)])
            .send()
            .await
            .map_err(|e| EnrichError::Auth(e.to_string()))?;

        if resp.status() != StatusCode::CREATED {
            return Err(EnrichError::Auth(format!(
                "estado HTTP {} al pedir el grant",
                resp.status()
            )));
        }

        resp.headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|loc| loc.rsplit('/').next())
            .filter(|grant| !grant.is_empty())
            .map(str::to_string)
            .ok_or_else(|| EnrichError::Auth("respuesta sin cabecera Location".to_string()))
    }

    async fn issue_ticket(&self, grant: &str) -> Result<String> {
        let resp = self
            .client
            .post(format!("{}/{}", self.auth_url, grant))
            .form(&[("service", self.service.as_str())])
            .send()
            .await
            .map_err(|e| EnrichError::Session(e.to_string()))?;

        if resp.status() != StatusCode::OK {
            return Err(EnrichError::Session(format!("estado HTTP {}", resp.status())));
        }

        let ticket = resp
            .text()
            .await
            .map_err(|e| EnrichError::Session(e.to_string()))?;
        let ticket = ticket.trim();
        if ticket.is_empty() {
            return Err(EnrichError::Session("ticket vacío".to_string()));
        }
        Ok(ticket.to_string())
    }

    async fn fetch(&self, url: &Url, ticket: &str) -> Result<Value> {
        let mut authed = url.clone();
        authed.query_pairs_mut().append_pair("ticket", ticket);

        let resp = self
            .client
            .get(authed)
            .send()
            .await
            .map_err(|e| EnrichError::fetch(url.as_str(), e))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(EnrichError::not_found(url.as_str()));
        }
        if !status.is_success() {
            return Err(EnrichError::fetch(url.as_str(), format!("estado HTTP {status}")));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| EnrichError::fetch(url.as_str(), e))
    }
}

/// Gestor de sesión: un grant por proceso y un ticket nuevo por lectura.
pub struct SessionManager<A: UtsApi> {
    api: A,
    api_key: String,
    grant: OnceCell<String>,
    request_delay: Duration,
}

impl<A: UtsApi> SessionManager<A> {
    pub fn new(api: A, api_key: impl Into<String>) -> Self {
        Self {
            api,
            api_key: api_key.into(),
            grant: OnceCell::new(),
            request_delay: Duration::ZERO,
        }
    }

    /// Pausa antes de cada lectura remota para no saturar el servicio.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Devuelve el grant, pidiéndolo la primera vez que hace falta. Un fallo
    /// aquí es fatal: una API key inválida no se arregla reintentando.
    pub async fn grant(&self) -> Result<&str> {
        let grant = self
            .grant
            .get_or_try_init(|| async {
                let grant = self.api.issue_grant(&self.api_key).await?;
                info!("Sesión UMLS establecida (grant obtenido).");
                Ok::<_, EnrichError>(grant)
            })
            .await?;
        Ok(grant.as_str())
    }

    pub async fn new_ephemeral_ticket(&self) -> Result<String> {
        let grant = self.grant().await?;
        self.api.issue_ticket(grant).await
    }

    /// Lectura remota autenticada: ticket nuevo y, a continuación, la petición.
    pub async fn get(&self, url: &Url) -> Result<Value> {
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
        let ticket = self.new_ephemeral_ticket().await?;
        debug!("GET {url}");
        self.api.fetch(url, &ticket).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedApi;
    use serde_json::json;

    #[tokio::test]
    async fn grant_is_obtained_once_and_tickets_are_never_reused() {
        let api = ScriptedApi::new();
        let url = Url::parse("https://uts.test/rest/content/current/CUI/C1").unwrap();
        api.respond(url.as_str(), json!({"result": {"name": "x"}}));

        let session = SessionManager::new(api.clone(), "key");
        session.get(&url).await.unwrap();
        session.get(&url).await.unwrap();
        let _ = session.new_ephemeral_ticket().await.unwrap();

        assert_eq!(api.grants_issued(), 1);
        assert_eq!(api.tickets_issued(), 3);
        let used = api.tickets_used();
        assert_eq!(used.len(), 2);
        assert_ne!(used[0], used[1]);
    }

    #[tokio::test]
    async fn no_remote_call_until_first_read() {
        let api = ScriptedApi::new();
        let _session = SessionManager::new(api.clone(), "key");
        assert_eq!(api.grants_issued(), 0);
        assert_eq!(api.tickets_issued(), 0);
    }

    #[tokio::test]
    async fn grant_failure_is_auth_error() {
        let api = ScriptedApi::new().failing_grant();
        let session = SessionManager::new(api, "bad-key");
        let err = session.new_ephemeral_ticket().await.unwrap_err();
        assert!(matches!(err, EnrichError::Auth(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn ticket_failure_is_session_error() {
        let api = ScriptedApi::new().failing_tickets();
        let session = SessionManager::new(api.clone(), "key");
        let url = Url::parse("https://uts.test/rest/content/current/CUI/C1").unwrap();
        let err = session.get(&url).await.unwrap_err();
        assert!(matches!(err, EnrichError::Session(_)));
        assert!(api.fetched_urls().is_empty());
    }
}

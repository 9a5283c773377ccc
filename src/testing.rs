//! Dobles de prueba: un `UtsApi` en memoria con respuestas guionizadas.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::error::{EnrichError, Result};
use crate::session::UtsApi;

#[derive(Default)]
struct State {
    responses: HashMap<String, Value>,
    failing: HashSet<String>,
    grants: usize,
    tickets: usize,
    used_tickets: Vec<String>,
    fetched: Vec<String>,
}

#[derive(Clone, Default)]
pub struct ScriptedApi {
    state: Arc<Mutex<State>>,
    fail_grant: bool,
    fail_tickets: bool,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_grant(mut self) -> Self {
        self.fail_grant = true;
        self
    }

    pub fn failing_tickets(mut self) -> Self {
        self.fail_tickets = true;
        self
    }

    pub fn respond(&self, url: &str, body: Value) {
        self.state
            .lock()
            .unwrap()
            .responses
            .insert(url.to_string(), body);
    }

    /// La URL responde con un error de servidor en cada lectura.
    pub fn fail(&self, url: &str) {
        self.state.lock().unwrap().failing.insert(url.to_string());
    }

    pub fn grants_issued(&self) -> usize {
        self.state.lock().unwrap().grants
    }

    pub fn tickets_issued(&self) -> usize {
        self.state.lock().unwrap().tickets
    }

    pub fn tickets_used(&self) -> Vec<String> {
        self.state.lock().unwrap().used_tickets.clone()
    }

    pub fn fetched_urls(&self) -> Vec<String> {
        self.state.lock().unwrap().fetched.clone()
    }
}

#[async_trait]
impl UtsApi for ScriptedApi {
    async fn issue_grant(&self, _api_key: &str) -> Result<String> {
        if self.fail_grant {
            return Err(EnrichError::Auth("estado HTTP 401".into()));
        }
        self.state.lock().unwrap().grants += 1;
        Ok("TGT-test".to_string())
    }

    async fn issue_ticket(&self, grant: &str) -> Result<String> {
        if self.fail_tickets {
            return Err(EnrichError::Session("estado HTTP 500".into()));
        }
        let mut state = self.state.lock().unwrap();
        state.tickets += 1;
        Ok(format!("ST-{}-{}", state.tickets, grant))
    }

    async fn fetch(&self, url: &Url, ticket: &str) -> Result<Value> {
        let mut state = self.state.lock().unwrap();
        if state.used_tickets.iter().any(|t| t == ticket) {
            return Err(EnrichError::fetch(url.as_str(), "ticket reutilizado"));
        }
        state.used_tickets.push(ticket.to_string());
        state.fetched.push(url.to_string());
        if state.failing.contains(url.as_str()) {
            return Err(EnrichError::fetch(url.as_str(), "estado HTTP 500"));
        }
        // Sin respuesta guionizada: el servicio real contesta 404.
        state
            .responses
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| EnrichError::not_found(url.as_str()))
    }
}

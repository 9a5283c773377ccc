//! Resolución de un CUI a `ConceptMetadata` contra UMLS.
//!
//! Flujo (cada paso consume un ticket nuevo):
//!   1. Concepto por CUI → nombre y tipos semánticos.
//!   2. Definiciones → la de la fuente preferida, o la primera.
//!   3. Átomos → un único `sourceDescriptor` por orden de precedencia fijo.
//!   4. Padres y descendientes del descriptor, normalizados a CUIs.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::{EnrichError, Result};
use crate::models::{
    looks_like_cui, ConceptMetadata, ConceptReference, DEFAULT_DEFINITION, NOT_AVAILABLE,
    UNKNOWN_NAME,
};
use crate::session::{SessionManager, UtsApi};

/// Marcador que UTS usa para sub-recursos y resultados inexistentes.
const NONE_MARKER: &str = "NONE";

/// Cualquier cosa capaz de producir los metadatos de un CUI. El bucle de
/// cierre y el vocabulario dependen sólo de esto.
#[async_trait]
pub trait ConceptSource: Send + Sync {
    async fn resolve(&self, cui: &str) -> Result<ConceptMetadata>;
}

pub struct ConceptResolver<A: UtsApi> {
    session: SessionManager<A>,
    api_base: String,
    preferred_source: String,
}

impl<A: UtsApi> ConceptResolver<A> {
    pub fn new(session: SessionManager<A>, api_base: &str, preferred_source: &str) -> Self {
        Self {
            session,
            api_base: api_base.trim_end_matches('/').to_string(),
            preferred_source: preferred_source.to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let raw = format!("{}/{}", self.api_base, path);
        Url::parse(&raw).map_err(|e| EnrichError::fetch(raw, e))
    }

    pub async fn resolve_concept(&self, cui: &str) -> Result<ConceptMetadata> {
        // 1) Concepto
        let concept_url = self.endpoint(&format!("content/current/CUI/{cui}"))?;
        let body = self.session.get(&concept_url).await?;
        let concept = body
            .get("result")
            .filter(|r| r.is_object())
            .ok_or_else(|| EnrichError::fetch(cui, "respuesta de concepto sin 'result'"))?;

        let mut meta = ConceptMetadata::new(cui, str_field(concept, "name", UNKNOWN_NAME));
        meta.semantic_type = join_semantic_types(concept);

        // 2) Definiciones
        if let Some(def_url) = resource_ref(concept, "definitions") {
            let defs = self.fetch_list(def_url).await?;
            meta.definition = select_definition(&defs, &self.preferred_source);
        }

        // 3) Átomos → sourceDescriptor
        let descriptor = match resource_ref(concept, "atoms") {
            Some(atoms_url) => {
                let atoms = self.fetch_list(atoms_url).await?;
                select_source_descriptor(&atoms, &self.preferred_source)
            }
            None => None,
        };

        // 4) Padres y descendientes
        match descriptor {
            Some(sd) => match self.fetch_hierarchy(&sd).await {
                Ok((parents, descendants)) => {
                    meta.parents = parents;
                    meta.descendants = descendants;
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!("No se pudieron obtener padres/descendientes de {cui}: {err}");
                }
            },
            None => debug!("{cui} no tiene sourceDescriptor utilizable; se omite la jerarquía."),
        }

        Ok(meta)
    }

    async fn fetch_hierarchy(
        &self,
        descriptor: &str,
    ) -> Result<(Vec<ConceptReference>, Vec<ConceptReference>)> {
        let parent_entries = self.fetch_list(&format!("{descriptor}/parents")).await?;
        let descendant_entries = self.fetch_list(&format!("{descriptor}/descendants")).await?;

        let mut parents = Vec::with_capacity(parent_entries.len());
        for entry in &parent_entries {
            parents.push(self.resolve_reference(entry).await?);
        }
        let mut descendants = Vec::with_capacity(descendant_entries.len());
        for entry in &descendant_entries {
            descendants.push(self.resolve_reference(entry).await?);
        }
        Ok((parents, descendants))
    }

    /// Normaliza una entrada de jerarquía al espacio de CUIs. Los endpoints de
    /// jerarquía devuelven identificadores nativos de la fuente (ej: D006331 de
    /// MeSH), que hay que volver a buscar para obtener el CUI.
    pub async fn resolve_reference(&self, raw: &Value) -> Result<ConceptReference> {
        let ui = str_field(raw, "ui", NOT_AVAILABLE);
        let name = str_field(raw, "name", NOT_AVAILABLE);

        if looks_like_cui(ui) {
            return Ok(ConceptReference::new(name, ui));
        }
        if ui == NOT_AVAILABLE {
            return Ok(ConceptReference::new(name, NOT_AVAILABLE));
        }

        let sabs = str_field(raw, "rootSource", NOT_AVAILABLE);
        let mut search_url = self.endpoint("search/current")?;
        search_url
            .query_pairs_mut()
            .append_pair("string", ui)
            .append_pair("inputType", "sourceUi")
            .append_pair("sabs", sabs)
            .append_pair("searchType", "exact");

        let body = self.session.get(&search_url).await?;
        let first_hit = body
            .pointer("/result/results")
            .and_then(Value::as_array)
            .and_then(|hits| hits.first())
            .filter(|hit| str_field(hit, "ui", NONE_MARKER) != NONE_MARKER);

        Ok(match first_hit {
            Some(hit) => ConceptReference::new(
                str_field(hit, "name", name),
                str_field(hit, "ui", NOT_AVAILABLE),
            ),
            None => {
                debug!("Sin resultados para {ui} ({sabs}); se marca como {NOT_AVAILABLE}.");
                ConceptReference::new(name, NOT_AVAILABLE)
            }
        })
    }

    /// Lista `result` de un sub-recurso. UTS contesta 404 cuando la lista está
    /// vacía (un descriptor hoja no tiene descendientes, una raíz no tiene
    /// padres), así que un 404 aquí es una lista vacía y no un fallo.
    async fn fetch_list(&self, raw_url: &str) -> Result<Vec<Value>> {
        let url = Url::parse(raw_url).map_err(|e| EnrichError::fetch(raw_url, e))?;
        let body = match self.session.get(&url).await {
            Ok(body) => body,
            Err(EnrichError::NotFound { .. }) => {
                debug!("{raw_url} sin resultados (404).");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };
        Ok(body
            .get("result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl<A: UtsApi> ConceptSource for ConceptResolver<A> {
    async fn resolve(&self, cui: &str) -> Result<ConceptMetadata> {
        self.resolve_concept(cui).await
    }
}

fn str_field<'a>(value: &'a Value, key: &str, default: &'a str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or(default)
}

/// URL de un sub-recurso, salvo que falte o sea el marcador "NONE".
fn resource_ref<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty() && *v != NONE_MARKER)
}

fn join_semantic_types(concept: &Value) -> String {
    concept
        .get("semanticTypes")
        .and_then(Value::as_array)
        .map(|types| {
            types
                .iter()
                .map(|t| str_field(t, "name", ""))
                .collect::<Vec<_>>()
                .join("; ")
        })
        .unwrap_or_default()
}

fn select_definition(defs: &[Value], preferred_source: &str) -> String {
    defs.iter()
        .find(|d| str_field(d, "rootSource", "") == preferred_source)
        .or_else(|| defs.first())
        .map(|d| str_field(d, "value", DEFAULT_DEFINITION).to_string())
        .unwrap_or_else(|| DEFAULT_DEFINITION.to_string())
}

fn is_obsolete(atom: &Value) -> bool {
    match atom.get("obsolete") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Precedencia fija: (a) átomo inglés, vigente y de la fuente preferida;
/// (b) primer átomo vigente con descriptor; (c) ninguno.
fn select_source_descriptor(atoms: &[Value], preferred_source: &str) -> Option<String> {
    let usable =
        |atom: &&Value| !is_obsolete(atom) && resource_ref(atom, "sourceDescriptor").is_some();

    atoms
        .iter()
        .filter(usable)
        .find(|atom| {
            str_field(atom, "rootSource", "") == preferred_source
                && str_field(atom, "language", "") == "ENG"
        })
        .or_else(|| atoms.iter().find(usable))
        .and_then(|atom| resource_ref(atom, "sourceDescriptor"))
        .map(str::to_string)
}

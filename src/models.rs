//! Modelos de dominio: metadatos de conceptos UMLS, referencias jerárquicas
//! y entradas de vocabulario.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identificador centinela para referencias que no se pudieron mapear a un CUI.
pub const NOT_AVAILABLE: &str = "N/A";
pub const UNKNOWN_NAME: &str = "unknown";
pub const DEFAULT_DEFINITION: &str = "No description provided";

/// Los CUIs de UMLS empiezan siempre por esta letra (ej: C0018800).
pub const CUI_MARKER: char = 'C';

pub fn looks_like_cui(ui: &str) -> bool {
    ui.starts_with(CUI_MARKER)
}

/// Par (nombre, identificador) que apunta a otro concepto, esté o no en caché.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptReference {
    pub name: String,
    pub id: String,
}

impl ConceptReference {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.id != NOT_AVAILABLE
    }
}

impl fmt::Display for ConceptReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{({}), {}}}", self.name, self.id)
    }
}

/// Metadatos de un concepto. Una vez escritos en caché no se modifican.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptMetadata {
    pub id: String,
    pub name: String,
    pub definition: String,
    #[serde(default)]
    pub semantic_type: String,
    #[serde(default)]
    pub parents: Vec<ConceptReference>,
    #[serde(default)]
    pub descendants: Vec<ConceptReference>,
    /// Ancestros inferidos por un enriquecimiento externo; la caché no los escribe.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ancestors: Vec<ConceptReference>,
}

impl ConceptMetadata {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            definition: DEFAULT_DEFINITION.to_string(),
            semantic_type: String::new(),
            parents: Vec::new(),
            descendants: Vec::new(),
            ancestors: Vec::new(),
        }
    }

    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.id)
    }

    /// Ids de padres resolubles (sin el centinela "N/A").
    pub fn parent_ids(&self) -> impl Iterator<Item = &str> {
        self.parents
            .iter()
            .filter(|p| p.is_available())
            .map(|p| p.id.as_str())
    }
}

/// (CUI, número de filas que lo referencian, dataset de origen).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub id: String,
    pub count: usize,
    pub source: String,
}

/// Fila del vocabulario exportado: metadatos + frecuencia + origen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularyRow {
    #[serde(flatten)]
    pub metadata: ConceptMetadata,
    pub count: usize,
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_displays_like_cache_entries() {
        let r = ConceptReference::new("Heart Diseases", "C0018799");
        assert_eq!(r.to_string(), "{(Heart Diseases), C0018799}");
        assert!(r.is_available());
        assert!(!ConceptReference::new("x", NOT_AVAILABLE).is_available());
    }

    #[test]
    fn metadata_uses_camel_case_and_omits_empty_ancestors() {
        let mut meta = ConceptMetadata::new("C0018800", "Cardiomegaly");
        meta.semantic_type = "Finding".into();
        meta.parents.push(ConceptReference::new("Heart Diseases", "C0018799"));

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["semanticType"], "Finding");
        assert_eq!(json["parents"][0]["id"], "C0018799");
        assert!(json.get("ancestors").is_none());

        let back: ConceptMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn parent_ids_skip_sentinel() {
        let mut meta = ConceptMetadata::new("C1", "x");
        meta.parents = vec![
            ConceptReference::new("a", "C2"),
            ConceptReference::new("b", NOT_AVAILABLE),
        ];
        assert_eq!(meta.parent_ids().collect::<Vec<_>>(), vec!["C2"]);
    }
}

//! Taxonomía de errores del motor de enriquecimiento y del constructor del grafo.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrichError {
    /// El intercambio API key → grant falló. Aborta toda la ejecución.
    #[error("Autenticación con UMLS fallida: {0}")]
    Auth(String),

    /// No se pudo obtener un ticket efímero. Sólo afecta al concepto en curso.
    #[error("No se pudo obtener un ticket de servicio: {0}")]
    Session(String),

    #[error("Error consultando {target}: {reason}")]
    Fetch { target: String, reason: String },

    /// El servicio respondió 404. En las listas de jerarquía equivale a una
    /// lista vacía; en el concepto en sí, a un CUI inexistente.
    #[error("{target} no existe en el servicio remoto")]
    NotFound { target: String },

    #[error("Caché de metadatos corrupta (línea {line}): {reason}")]
    CacheCorruption { line: usize, reason: String },

    #[error("No se construyó ninguna arista a partir de la caché")]
    EmptyGraph,

    #[error("Error de E/S: {0}")]
    Io(#[from] std::io::Error),

    #[error("Error serializando artefacto: {0}")]
    Artifact(#[from] serde_json::Error),

    #[error("Artefacto del grafo inconsistente: {0}")]
    InvalidArtifact(String),
}

impl EnrichError {
    pub fn fetch(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn not_found(target: impl Into<String>) -> Self {
        Self::NotFound {
            target: target.into(),
        }
    }

    /// Errores que impiden continuar la ejecución completa, frente a los que
    /// sólo dejan un concepto sin resolver.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Auth(_) | Self::CacheCorruption { .. } | Self::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EnrichError>;

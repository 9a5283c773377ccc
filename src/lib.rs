//! Enriquecimiento de CUIs de UMLS y construcción del grafo ontológico.
//!
//! Flujo: datasets → vocabulario → resolución contra UTS → caché persistente
//! → cierre sobre la jerarquía de padres → grafo ontológico.

pub mod cache;
pub mod config;
pub mod enrich;
pub mod error;
pub mod graph;
pub mod models;
pub mod neo4j_client;
pub mod resolver;
pub mod session;
pub mod vocab;

#[cfg(test)]
mod testing;

pub use cache::MetadataCache;
pub use enrich::{enrich_closure, ClosureSummary};
pub use error::EnrichError;
pub use graph::{build_graph, OntologyGraph, RelationKind};
pub use models::{ConceptMetadata, ConceptReference, VocabularyEntry};
pub use resolver::{ConceptResolver, ConceptSource};
pub use session::{HttpUtsApi, SessionManager, UtsApi};

//! Construcción del grafo ontológico denso a partir de la caché de metadatos.
//!
//! Aristas generadas:
//!   - padre → hijo (`parent_of`), desde `parents` y, en sentido inverso,
//!     desde `descendants`;
//!   - ancestro → concepto (`ancestor_of`), si se piden y la entrada los trae;
//!   - hermanos (`sibling`), en ambos sentidos para cada par que comparte padre.
//!
//! Las multiplicidades no se deduplican: un mismo par puede acumular varias aristas.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EnrichError, Result};
use crate::models::{ConceptMetadata, ConceptReference, UNKNOWN_NAME};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    ParentOf,
    AncestorOf,
    Sibling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: usize,
    pub target: usize,
    pub kind: RelationKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OntologyGraph {
    pub nodes: Vec<String>,
    pub edges: Vec<GraphEdge>,
    pub node_labels: Vec<String>,
    pub node_colors: Vec<usize>,
    /// Leyenda de colores: `semantic_types[color]`.
    pub semantic_types: Vec<String>,
    pub built_at: DateTime<Utc>,
}

impl OntologyGraph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_index(&self) -> HashMap<&str, usize> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect()
    }

    /// Aristas en formato COO `[orígenes, destinos]`, como las espera una GNN.
    pub fn edge_index(&self) -> [Vec<usize>; 2] {
        let sources = self.edges.iter().map(|e| e.source).collect();
        let targets = self.edges.iter().map(|e| e.target).collect();
        [sources, targets]
    }

    pub fn edges_of_kind(&self, kind: RelationKind) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter().filter(move |e| e.kind == kind)
    }

    /// Sustituye el artefacto completo: escribe en un temporal y renombra.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(self)?)?;
        fs::rename(&tmp, path)?;
        info!(
            "[✓] Grafo ontológico guardado en {} ({} nodos, {} aristas).",
            path.display(),
            self.node_count(),
            self.edges.len()
        );
        Ok(())
    }

    /// Carga un artefacto guardado y comprueba que sus índices son coherentes.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let graph: Self = serde_json::from_slice(&bytes)?;
        graph.validate()?;
        Ok(graph)
    }

    fn validate(&self) -> Result<()> {
        let n = self.nodes.len();
        if self.node_labels.len() != n || self.node_colors.len() != n {
            return Err(EnrichError::InvalidArtifact(format!(
                "{n} nodos, {} etiquetas, {} colores",
                self.node_labels.len(),
                self.node_colors.len()
            )));
        }
        if let Some(color) = self.node_colors.iter().find(|&&c| c >= self.semantic_types.len()) {
            return Err(EnrichError::InvalidArtifact(format!(
                "color {color} fuera de la leyenda ({} tipos)",
                self.semantic_types.len()
            )));
        }
        if let Some(edge) = self.edges.iter().find(|e| e.source >= n || e.target >= n) {
            return Err(EnrichError::InvalidArtifact(format!(
                "arista {} → {} fuera de rango ({n} nodos)",
                edge.source, edge.target
            )));
        }
        Ok(())
    }
}

/// Construye el grafo a partir de una instantánea de la caché (o de un
/// subconjunto de vocabulario). El orden de la instantánea fija los índices.
pub fn build_graph(
    snapshot: &[ConceptMetadata],
    include_ancestors: bool,
    include_siblings: bool,
) -> Result<OntologyGraph> {
    let index: HashMap<&str, usize> = snapshot
        .iter()
        .enumerate()
        .map(|(i, meta)| (meta.id.as_str(), i))
        .collect();
    let lookup = |r: &ConceptReference| index.get(r.id.as_str()).copied();

    let mut edges = Vec::new();
    let push = |edges: &mut Vec<GraphEdge>, source, target, kind| {
        edges.push(GraphEdge { source, target, kind })
    };

    for (idx, meta) in snapshot.iter().enumerate() {
        for parent in meta.parents.iter().filter_map(lookup) {
            push(&mut edges, parent, idx, RelationKind::ParentOf);
        }
        if include_ancestors {
            for ancestor in meta.ancestors.iter().filter_map(lookup) {
                push(&mut edges, ancestor, idx, RelationKind::AncestorOf);
            }
        }
        for descendant in meta.descendants.iter().filter_map(lookup) {
            push(&mut edges, idx, descendant, RelationKind::ParentOf);
        }
    }

    if include_siblings {
        // Grupos de hijos por padre, en orden de aparición.
        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut group_of: HashMap<usize, usize> = HashMap::new();
        for (idx, meta) in snapshot.iter().enumerate() {
            for parent in meta.parents.iter().filter_map(lookup) {
                let g = *group_of.entry(parent).or_insert_with(|| {
                    groups.push(Vec::new());
                    groups.len() - 1
                });
                // Un padre repetido no convierte al hijo en su propio hermano.
                if groups[g].last() != Some(&idx) {
                    groups[g].push(idx);
                }
            }
        }

        // Clique completa por grupo: O(n²) a propósito, los consumidores
        // esperan adyacencia directa entre hermanos.
        for siblings in &groups {
            for i in 0..siblings.len() {
                for j in (i + 1)..siblings.len() {
                    push(&mut edges, siblings[i], siblings[j], RelationKind::Sibling);
                    push(&mut edges, siblings[j], siblings[i], RelationKind::Sibling);
                }
            }
        }
    }

    if edges.is_empty() {
        return Err(EnrichError::EmptyGraph);
    }

    let mut semantic_types: Vec<String> = Vec::new();
    let mut color_of: HashMap<String, usize> = HashMap::new();
    let node_colors: Vec<usize> = snapshot
        .iter()
        .map(|meta| {
            let stype = if meta.semantic_type.trim().is_empty() {
                UNKNOWN_NAME.to_string()
            } else {
                meta.semantic_type.clone()
            };
            *color_of.entry(stype.clone()).or_insert_with(|| {
                semantic_types.push(stype);
                semantic_types.len() - 1
            })
        })
        .collect();

    info!(
        "Grafo construido: {} nodos, {} aristas, {} tipos semánticos.",
        snapshot.len(),
        edges.len(),
        semantic_types.len()
    );

    Ok(OntologyGraph {
        nodes: snapshot.iter().map(|m| m.id.clone()).collect(),
        edges,
        node_labels: snapshot.iter().map(ConceptMetadata::label).collect(),
        node_colors,
        semantic_types,
        built_at: Utc::now(),
    })
}

//! Exportación opcional del grafo ontológico a Neo4j.
//!
//! Nodos `(:Concept {id, name, label, color, semantic_type})` y una relación
//! por arista (`PARENT_OF`, `ANCESTOR_OF`, `SIBLING_OF`). Las relaciones
//! anteriores se borran en la misma transacción: el grafo se reemplaza entero.

use anyhow::{Context, Result};
use neo4rs::{query, Graph};
use tracing::info;
use url::Url;

use crate::config::Neo4jConfig;
use crate::graph::{OntologyGraph, RelationKind};

pub async fn connect_from_config(cfg: &Neo4jConfig) -> Result<Graph> {
    let url = Url::parse(&cfg.uri)?;
    let host = url.host_str().unwrap_or("localhost");
    let port = url.port().unwrap_or(7687);
    let addr = format!("{host}:{port}");

    info!("Conectando a Neo4j en {addr}...");
    let graph = Graph::new(&addr, &cfg.user, &cfg.password).await?;
    info!("Conexión a Neo4j OK");
    Ok(graph)
}

/// Concept.id único.
pub async fn ensure_schema(graph: &Graph) -> Result<()> {
    graph
        .run(query(
            "CREATE CONSTRAINT concept_id IF NOT EXISTS
             FOR (c:Concept)
             REQUIRE c.id IS UNIQUE",
        ))
        .await?;

    info!("Esquema de Neo4j asegurado (constraint :Concept(id)).");
    Ok(())
}

pub fn relationship_type(kind: RelationKind) -> &'static str {
    match kind {
        RelationKind::ParentOf => "PARENT_OF",
        RelationKind::AncestorOf => "ANCESTOR_OF",
        RelationKind::Sibling => "SIBLING_OF",
    }
}

/// Nombre visible a partir de la etiqueta `"{name} ({id})"`.
fn display_name<'a>(label: &'a str, id: &str) -> &'a str {
    label
        .strip_suffix(&format!(" ({id})"))
        .unwrap_or(label)
}

pub async fn export_graph(graph: &Graph, ontology: &OntologyGraph) -> Result<()> {
    let tx = graph.start_txn().await?;

    // 1) Nodos
    for (i, id) in ontology.nodes.iter().enumerate() {
        let label = ontology
            .node_labels
            .get(i)
            .with_context(|| format!("El nodo {id} no tiene etiqueta"))?;
        let color = *ontology
            .node_colors
            .get(i)
            .with_context(|| format!("El nodo {id} no tiene color"))?;
        let semantic_type = ontology
            .semantic_types
            .get(color)
            .cloned()
            .unwrap_or_default();

        tx.run(
            query(
                "MERGE (c:Concept {id: $id})
                 SET c.name = $name, c.label = $label, c.color = $color,
                     c.semantic_type = $semantic_type",
            )
            .param("id", id.clone())
            .param("name", display_name(label, id).to_string())
            .param("label", label.clone())
            .param("color", color as i64)
            .param("semantic_type", semantic_type),
        )
        .await
        .with_context(|| format!("Error exportando el concepto {id}"))?;
    }

    // 2) Limpiar relaciones de una exportación anterior
    tx.run(query(
        "MATCH (:Concept)-[r:PARENT_OF|ANCESTOR_OF|SIBLING_OF]->(:Concept) DELETE r",
    ))
    .await?;

    // 3) Una relación por arista, sin MERGE: las multiplicidades se conservan
    for edge in &ontology.edges {
        let endpoint = |i: usize| {
            ontology
                .nodes
                .get(i)
                .cloned()
                .with_context(|| format!("Arista con nodo {i} fuera de rango"))
        };
        let (source, target) = (endpoint(edge.source)?, endpoint(edge.target)?);
        let cypher = format!(
            "MATCH (s:Concept {{id: $source}}), (t:Concept {{id: $target}}) CREATE (s)-[:{}]->(t)",
            relationship_type(edge.kind)
        );
        tx.run(
            query(&cypher)
                .param("source", source)
                .param("target", target),
        )
        .await?;
    }

    tx.commit().await?;

    info!(
        "Grafo exportado a Neo4j: {} conceptos, {} relaciones.",
        ontology.node_count(),
        ontology.edges.len()
    );
    Ok(())
}

//! Pipeline completo sin red: vocabulario → caché → cierre → grafo.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use umls_ontology_graph::error::Result;
use umls_ontology_graph::vocab::{build_vocabulary, enrich_vocabulary, DatasetRecord};
use umls_ontology_graph::{
    build_graph, enrich_closure, ConceptMetadata, ConceptReference, ConceptSource, EnrichError,
    MetadataCache, RelationKind,
};

/// Ontología en memoria que cuenta las consultas y puede "caerse" tras N.
struct StubUts {
    concepts: HashMap<String, ConceptMetadata>,
    calls: Mutex<Vec<String>>,
    crash_after: Option<usize>,
}

impl StubUts {
    fn new(concepts: Vec<ConceptMetadata>) -> Self {
        Self {
            concepts: concepts.into_iter().map(|c| (c.id.clone(), c)).collect(),
            calls: Mutex::new(Vec::new()),
            crash_after: None,
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConceptSource for StubUts {
    async fn resolve(&self, cui: &str) -> Result<ConceptMetadata> {
        let mut calls = self.calls.lock().unwrap();
        if self.crash_after.is_some_and(|n| calls.len() >= n) {
            // Simula un proceso interrumpido: error fatal que aborta el bucle.
            return Err(EnrichError::Io(std::io::Error::other("proceso interrumpido")));
        }
        calls.push(cui.to_string());
        self.concepts
            .get(cui)
            .cloned()
            .ok_or_else(|| EnrichError::not_found(cui))
    }
}

fn concept(id: &str, name: &str, stype: &str, parents: &[(&str, &str)]) -> ConceptMetadata {
    let mut meta = ConceptMetadata::new(id, name);
    meta.semantic_type = stype.to_string();
    meta.parents = parents
        .iter()
        .map(|(n, p)| ConceptReference::new(*n, *p))
        .collect();
    meta
}

fn dataset(rows: &[&[&str]]) -> Vec<DatasetRecord> {
    rows.iter()
        .enumerate()
        .map(|(i, concepts)| {
            serde_json::from_value(serde_json::json!({
                "id": format!("img_{i}.png"),
                "concepts": concepts,
            }))
            .unwrap()
        })
        .collect()
}

#[tokio::test]
async fn two_concept_vocabulary_builds_a_single_parent_edge() {
    let dir = tempfile::tempdir().unwrap();
    let stub = StubUts::new(vec![
        concept("C0018800", "Cardiomegaly", "Finding", &[("Normal", "C0205307")]),
        concept("C0205307", "Normal", "Qualitative Concept", &[]),
    ]);

    let records = dataset(&[&["C0018800"], &["C0018800", "C0205307"], &["C0018800"]]);
    let vocab = build_vocabulary(&records, "padchest");
    assert_eq!(vocab[0].count, 3);
    assert_eq!(vocab[1].count, 1);

    let mut cache = MetadataCache::load(dir.path().join("cache.jsonl")).unwrap();
    enrich_vocabulary(&vocab, &mut cache, &stub).await.unwrap();
    assert_eq!(cache.len(), 2);

    let summary = enrich_closure(&mut cache, &stub, 16).await.unwrap();
    assert!(summary.converged);
    assert_eq!(summary.added, 0);
    assert_eq!(stub.calls().len(), 2);

    let graph = build_graph(&cache.snapshot(), true, true).unwrap();
    assert_eq!(graph.node_count(), 2);
    let index = graph.node_index();
    let parent_edges: Vec<_> = graph.edges_of_kind(RelationKind::ParentOf).collect();
    assert_eq!(parent_edges.len(), 1);
    assert_eq!(parent_edges[0].source, index["C0205307"]);
    assert_eq!(parent_edges[0].target, index["C0018800"]);
    assert_ne!(graph.node_colors[0], graph.node_colors[1]);
}

#[tokio::test]
async fn interrupted_closure_resumes_with_only_the_remaining_parents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.jsonl");

    let hierarchy = vec![
        concept("C0000100", "Root", "T", &[]),
        concept("C0000201", "A", "T", &[("Root", "C0000100")]),
        concept("C0000202", "B", "T", &[("Root", "C0000100")]),
        concept("C0000203", "C", "T", &[("Root", "C0000100")]),
    ];

    {
        let mut cache = MetadataCache::load(&path).unwrap();
        cache
            .put(concept(
                "C0000001",
                "Leaf",
                "T",
                &[("A", "C0000201"), ("B", "C0000202"), ("C", "C0000203")],
            ))
            .unwrap();

        let mut crashing = StubUts::new(hierarchy.clone());
        crashing.crash_after = Some(2);
        let err = enrich_closure(&mut cache, &crashing, 16).await.unwrap_err();
        assert!(err.is_fatal());
    }

    // Fichero: cabecera + hoja + los 2 padres completados.
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 4);

    let mut cache = MetadataCache::load(&path).unwrap();
    assert_eq!(cache.len(), 3);
    let remaining: Vec<_> = cache.missing_parents().into_iter().collect();
    assert_eq!(remaining, vec!["C0000100", "C0000203"]);

    let stub = StubUts::new(hierarchy);
    let summary = enrich_closure(&mut cache, &stub, 16).await.unwrap();
    assert!(summary.converged);
    assert_eq!(stub.calls(), vec!["C0000100", "C0000203"]);
    assert_eq!(cache.len(), 5);
}

#[test]
fn rerun_over_closed_cache_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.jsonl");
    let mut cache = MetadataCache::load(&path).unwrap();
    cache.put(concept("C1", "child", "T", &[("parent", "C2"), ("lost", "N/A")])).unwrap();
    cache.put(concept("C2", "parent", "T", &[])).unwrap();
    let before = std::fs::read(&path).unwrap();

    let stub = StubUts::new(Vec::new());
    let summary = tokio_test::block_on(enrich_closure(&mut cache, &stub, 16)).unwrap();

    assert!(summary.converged);
    assert!(stub.calls().is_empty());
    assert_eq!(std::fs::read(&path).unwrap(), before);
}

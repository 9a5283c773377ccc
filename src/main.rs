use anyhow::{anyhow, Context, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use umls_ontology_graph::{
    build_graph,
    config::{AppConfig, UmlsConfig},
    enrich_closure, neo4j_client, vocab, ConceptResolver, HttpUtsApi, MetadataCache,
    OntologyGraph, SessionManager,
};

type Resolver = ConceptResolver<HttpUtsApi>;

#[tokio::main]
async fn main() {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run().await {
        error!("❌ {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // 2. Cargar configuración
    let cfg = AppConfig::from_env().context("Error al cargar la configuración")?;

    // 3. Cargar la caché de metadatos (una caché corrupta es fatal)
    let mut cache = MetadataCache::load(&cfg.cache_path)
        .with_context(|| format!("Error cargando la caché {}", cfg.cache_path.display()))?;

    // El resolvedor no hace ninguna llamada hasta la primera lectura.
    let resolver = cfg
        .umls
        .require_api_key()
        .ok()
        .map(|_| build_resolver(&cfg.umls))
        .transpose()?;

    // 4. Vocabulario por dataset
    let datasets = vocab::discover_datasets(&cfg.dataset_dir);
    if datasets.is_empty() {
        info!("No se encontraron datasets en {}.", cfg.dataset_dir.display());
    }
    for (source, path) in &datasets {
        let records = vocab::read_dataset(path)?;
        let entries = vocab::build_vocabulary(&records, source);
        let missing = entries.iter().filter(|e| !cache.has(&e.id)).count();
        info!(
            "[→] Dataset '{source}': {} filas, {} CUIs únicos, {missing} sin metadatos.",
            records.len(),
            entries.len()
        );

        if missing > 0 {
            let resolver = require(&resolver)?;
            vocab::enrich_vocabulary(&entries, &mut cache, resolver).await?;
        }
        vocab::write_vocabulary(&cfg.vocab_dir, source, &entries, &cache)?;
    }

    // 5. Cierre sobre la jerarquía de padres
    if cache.missing_parents().is_empty() {
        info!("[✓] La caché ya está cerrada; no hay nada que consultar.");
    } else {
        let resolver = require(&resolver)?;
        let summary = enrich_closure(&mut cache, resolver, cfg.closure_max_passes).await?;
        info!("{summary}");
    }

    // 6. Grafo ontológico
    let graph = if cfg.graph_path.exists() && !cfg.graph_rebuild {
        let graph = OntologyGraph::load(&cfg.graph_path)?;
        info!("[✓] Grafo ontológico cargado desde {}", cfg.graph_path.display());
        graph
    } else {
        let graph = build_graph(
            &cache.snapshot(),
            cfg.graph_include_ancestors,
            cfg.graph_include_siblings,
        )?;
        graph.save(&cfg.graph_path)?;
        graph
    };

    // 7. Exportación opcional a Neo4j
    if let Some(neo4j) = &cfg.neo4j {
        let db = neo4j_client::connect_from_config(neo4j)
            .await
            .context("Error conectando a Neo4j")?;
        neo4j_client::ensure_schema(&db)
            .await
            .context("Error asegurando el esquema de Neo4j")?;
        neo4j_client::export_graph(&db, &graph).await?;
    }

    info!(
        "✅ Listo: {} conceptos en caché, grafo con {} nodos y {} aristas.",
        cache.len(),
        graph.node_count(),
        graph.edges.len()
    );
    Ok(())
}

fn build_resolver(cfg: &UmlsConfig) -> Result<Resolver> {
    let api_key = cfg.require_api_key()?;
    let api = HttpUtsApi::from_config(cfg)?;
    let session = SessionManager::new(api, api_key).with_request_delay(cfg.request_delay);
    Ok(ConceptResolver::new(session, &cfg.api_base, &cfg.preferred_source))
}

fn require(resolver: &Option<Resolver>) -> Result<&Resolver> {
    resolver
        .as_ref()
        .ok_or_else(|| anyhow!("Hay CUIs por consultar pero falta UMLS_API_KEY en el entorno"))
}

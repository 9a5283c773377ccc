//! Vocabulario de CUIs por dataset: extracción desde las listas de conceptos,
//! resolución de los que faltan en caché y exportación enriquecida.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::cache::MetadataCache;
use crate::enrich::fetch_into_cache;
use crate::models::{ConceptMetadata, VocabularyEntry, VocabularyRow};
use crate::resolver::ConceptSource;

const DATASET_SUFFIX: &str = "-meta.jsonl";

/// Fila de un dataset ya procesado por su parser específico.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetRecord {
    /// Ruta de la imagen; este módulo no la usa.
    #[serde(default, alias = "image_path")]
    pub id: String,
    #[serde(default)]
    pub concepts: Vec<String>,
    #[serde(default)]
    pub report: Option<String>,
}

/// Busca ficheros `<fuente>-meta.jsonl` bajo `dir`, ordenados por nombre.
pub fn discover_datasets(dir: &Path) -> Vec<(String, PathBuf)> {
    let mut found: Vec<(String, PathBuf)> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            let source = name.strip_suffix(DATASET_SUFFIX)?.to_string();
            (!source.is_empty()).then(|| (source, e.into_path()))
        })
        .collect();
    found.sort();
    found
}

pub fn read_dataset(path: &Path) -> Result<Vec<DatasetRecord>> {
    let file = File::open(path).with_context(|| format!("No se pudo abrir {}", path.display()))?;
    let mut records = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: DatasetRecord = serde_json::from_str(&line)
            .with_context(|| format!("Fila {} no válida en {}", i + 1, path.display()))?;
        records.push(record);
    }
    Ok(records)
}

/// CUIs únicos (ordenados) con el número de filas que los referencian.
pub fn build_vocabulary(records: &[DatasetRecord], source: &str) -> Vec<VocabularyEntry> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in records {
        let unique: BTreeSet<&str> = record
            .concepts
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect();
        for cui in unique {
            *counts.entry(cui).or_default() += 1;
        }
    }

    counts
        .into_iter()
        .map(|(id, count)| VocabularyEntry {
            id: id.to_string(),
            count,
            source: source.to_string(),
        })
        .collect()
}

/// Resuelve y persiste cada CUI del vocabulario que aún no está en caché.
/// Devuelve cuántos conceptos se añadieron.
pub async fn enrich_vocabulary<S: ConceptSource + ?Sized>(
    entries: &[VocabularyEntry],
    cache: &mut MetadataCache,
    source: &S,
) -> crate::error::Result<usize> {
    let mut added = 0;
    for (i, entry) in entries.iter().enumerate() {
        if !cache.has(&entry.id) && fetch_into_cache(cache, source, &entry.id).await? {
            added += 1;
        }
        if (i + 1) % 10 == 0 {
            info!("  ...procesados {}/{}", i + 1, entries.len());
        }
    }
    Ok(added)
}

/// Escribe `<dir>/<fuente>_vocab.jsonl`. Los CUIs sin metadatos se omiten.
pub fn write_vocabulary(
    dir: &Path,
    source: &str,
    entries: &[VocabularyEntry],
    cache: &MetadataCache,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{source}_vocab.jsonl"));
    let mut out = BufWriter::new(File::create(&path)?);

    let mut written = 0;
    for entry in entries {
        let Some(meta) = cache.get(&entry.id) else {
            warn!("{} no tiene metadatos en caché; se omite del vocabulario.", entry.id);
            continue;
        };
        let row = VocabularyRow {
            metadata: meta.clone(),
            count: entry.count,
            source: entry.source.clone(),
        };
        serde_json::to_writer(&mut out, &row)?;
        out.write_all(b"\n")?;
        written += 1;
    }
    out.flush()?;

    info!("[✓] Vocabulario de '{source}' guardado en {} ({written} CUIs).", path.display());
    Ok(path)
}

/// Lee un vocabulario exportado como instantánea para el constructor del grafo.
pub fn load_vocabulary_snapshot(path: &Path) -> Result<Vec<ConceptMetadata>> {
    let file = File::open(path).with_context(|| format!("No se pudo abrir {}", path.display()))?;
    let mut snapshot = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row: VocabularyRow = serde_json::from_str(&line)
            .with_context(|| format!("Fila de vocabulario no válida en {}", path.display()))?;
        snapshot.push(row.metadata);
    }
    Ok(snapshot)
}

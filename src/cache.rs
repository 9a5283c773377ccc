//! Caché de metadatos de conceptos respaldada por un fichero JSON Lines de
//! sólo-anexado.
//!
//! Formato:
//!   - línea 1: cabecera `{"format":"cui-metadata","version":1,"columns":[...]}`,
//!     escrita una única vez al crear el fichero;
//!   - resto: un `ConceptMetadata` por línea.
//!
//! Cada `put` se escribe y sincroniza antes de devolver, de modo que una
//! interrupción pierde como mucho el registro en curso.

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{EnrichError, Result};
use crate::models::ConceptMetadata;

const FORMAT: &str = "cui-metadata";
const VERSION: u32 = 1;
const COLUMNS: [&str; 6] = ["id", "name", "definition", "semanticType", "parents", "descendants"];

#[derive(Debug, Serialize, Deserialize)]
struct CacheHeader {
    format: String,
    version: u32,
    columns: Vec<String>,
}

impl CacheHeader {
    fn current() -> Self {
        Self {
            format: FORMAT.to_string(),
            version: VERSION,
            columns: COLUMNS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[derive(Debug)]
pub struct MetadataCache {
    path: PathBuf,
    records: HashMap<String, ConceptMetadata>,
    order: Vec<String>,
    writer: Option<File>,
    /// El fichero termina sin salto de línea tras un registro válido.
    needs_newline: bool,
}

impl MetadataCache {
    /// Carga todos los registros. Un fichero inexistente es una caché vacía.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut cache = Self {
            path,
            records: HashMap::new(),
            order: Vec::new(),
            writer: None,
            needs_newline: false,
        };

        if !cache.path.exists() {
            info!("No existe caché en {}; se parte de cero.", cache.path.display());
            return Ok(cache);
        }

        let bytes = fs::read(&cache.path)?;
        let text = String::from_utf8(bytes).map_err(|e| EnrichError::CacheCorruption {
            line: 0,
            reason: format!("contenido no UTF-8: {e}"),
        })?;

        let segments: Vec<&str> = text.split('\n').collect();
        let last = segments.len() - 1;
        let mut offset = 0usize;
        let mut torn_at = None;

        for (i, segment) in segments.iter().enumerate() {
            let line = i + 1;
            let unterminated = i == last && !segment.is_empty();

            if segment.trim().is_empty() {
                offset += segment.len() + 1;
                continue;
            }

            let parsed = if line == 1 {
                parse_header(segment).map(|_| None)
            } else {
                serde_json::from_str::<ConceptMetadata>(segment)
                    .map(Some)
                    .map_err(|e| e.to_string())
            };

            match parsed {
                Ok(Some(meta)) => {
                    if meta.id.trim().is_empty() {
                        return Err(EnrichError::CacheCorruption {
                            line,
                            reason: "registro sin id".to_string(),
                        });
                    }
                    cache.insert_loaded(meta);
                }
                Ok(None) => {}
                Err(_) if unterminated => {
                    warn!(
                        "Última línea de {} incompleta (escritura interrumpida); se descarta.",
                        cache.path.display()
                    );
                    torn_at = Some(offset);
                    break;
                }
                Err(reason) => return Err(EnrichError::CacheCorruption { line, reason }),
            }

            if unterminated {
                cache.needs_newline = true;
            }
            offset += segment.len() + 1;
        }

        if let Some(len) = torn_at {
            OpenOptions::new()
                .write(true)
                .open(&cache.path)?
                .set_len(len as u64)?;
        }

        info!(
            "Caché cargada desde {}: {} conceptos.",
            cache.path.display(),
            cache.len()
        );
        Ok(cache)
    }

    fn insert_loaded(&mut self, meta: ConceptMetadata) {
        if self.records.contains_key(&meta.id) {
            warn!("CUI duplicado en caché ({}); se conserva el primero.", meta.id);
            return;
        }
        self.order.push(meta.id.clone());
        self.records.insert(meta.id.clone(), meta);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&ConceptMetadata> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Registros en orden de inserción.
    pub fn iter(&self) -> impl Iterator<Item = &ConceptMetadata> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    pub fn snapshot(&self) -> Vec<ConceptMetadata> {
        self.iter().cloned().collect()
    }

    /// Ids de padres referenciados que todavía no son claves de la caché.
    pub fn missing_parents(&self) -> BTreeSet<String> {
        self.iter()
            .flat_map(|meta| meta.parent_ids())
            .filter(|id| !self.has(id))
            .map(str::to_string)
            .collect()
    }

    /// Añade un registro nuevo y lo persiste de inmediato. Nunca sobrescribe:
    /// si el id ya existe devuelve `false` sin tocar el fichero.
    pub fn put(&mut self, meta: ConceptMetadata) -> Result<bool> {
        if meta.id.trim().is_empty() {
            return Err(io::Error::new(ErrorKind::InvalidInput, "registro sin id").into());
        }
        if self.has(&meta.id) {
            return Ok(false);
        }

        let mut line = serde_json::to_string(&meta)?;
        line.push('\n');

        let writer = self.writer()?;
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        writer.sync_data()?;

        self.order.push(meta.id.clone());
        self.records.insert(meta.id.clone(), meta);
        Ok(true)
    }

    fn writer(&mut self) -> Result<&mut File> {
        if self.writer.is_none() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;

            if file.metadata()?.len() == 0 {
                let mut header = serde_json::to_string(&CacheHeader::current())?;
                header.push('\n');
                file.write_all(header.as_bytes())?;
            } else if self.needs_newline {
                file.write_all(b"\n")?;
            }
            self.needs_newline = false;
            self.writer = Some(file);
        }

        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::other("fichero de caché no abierto").into())
    }
}

fn parse_header(line: &str) -> std::result::Result<(), String> {
    let header: CacheHeader =
        serde_json::from_str(line).map_err(|e| format!("cabecera no válida: {e}"))?;
    if header.format != FORMAT {
        return Err(format!("formato desconocido '{}'", header.format));
    }
    if header.version != VERSION {
        return Err(format!("versión {} no soportada", header.version));
    }
    Ok(())
}

//! Bucle de cierre: amplía la caché hasta que todo padre referenciado sea a
//! su vez una clave de la caché.

use std::fmt;

use tracing::{info, warn};

use crate::cache::MetadataCache;
use crate::error::Result;
use crate::resolver::ConceptSource;

/// Resumen de una ejecución del bucle de cierre.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClosureSummary {
    pub passes: usize,
    pub added: usize,
    pub failed: usize,
    /// Frontera pendiente si el bucle se detuvo antes del punto fijo.
    pub unresolved: Vec<String>,
    pub converged: bool,
}

impl fmt::Display for ClosureSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cierre: {} pasadas, {} conceptos añadidos, {} fallos, {} pendientes ({}).",
            self.passes,
            self.added,
            self.failed,
            self.unresolved.len(),
            if self.converged { "punto fijo alcanzado" } else { "detenido sin converger" }
        )
    }
}

/// Resuelve `cui` y lo persiste. Los fallos locales al concepto se registran
/// y devuelven `Ok(false)`; sólo los fatales (auth, E/S) se propagan.
pub async fn fetch_into_cache<S: ConceptSource + ?Sized>(
    cache: &mut MetadataCache,
    source: &S,
    cui: &str,
) -> Result<bool> {
    match source.resolve(cui).await {
        Ok(meta) => cache.put(meta),
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            warn!("[!] No se pudieron obtener los metadatos de {cui}: {err}");
            Ok(false)
        }
    }
}

/// Itera hasta el punto fijo. Cada pasada procesa la frontera en orden
/// lexicográfico. Se detiene también tras `max_passes` pasadas o cuando una
/// pasada no añade nada, porque repetirla daría exactamente el mismo resultado.
pub async fn enrich_closure<S: ConceptSource + ?Sized>(
    cache: &mut MetadataCache,
    source: &S,
    max_passes: usize,
) -> Result<ClosureSummary> {
    let mut summary = ClosureSummary::default();

    loop {
        let frontier = cache.missing_parents();
        if frontier.is_empty() {
            info!("[✓] No hay CUIs padre nuevos. Enriquecimiento de la caché completo.");
            summary.converged = true;
            break;
        }
        if summary.passes >= max_passes {
            warn!(
                "Se alcanzó el máximo de {max_passes} pasadas con {} CUIs pendientes.",
                frontier.len()
            );
            summary.unresolved = frontier.into_iter().collect();
            break;
        }

        summary.passes += 1;
        info!(
            "[→] Pasada {}: {} CUIs padre nuevos. Obteniendo metadatos...",
            summary.passes,
            frontier.len()
        );

        let mut added_this_pass = 0;
        for cui in &frontier {
            if cache.has(cui) {
                continue;
            }
            if fetch_into_cache(cache, source, cui).await? {
                added_this_pass += 1;
            } else {
                summary.failed += 1;
            }
        }
        summary.added += added_this_pass;

        if added_this_pass == 0 {
            warn!(
                "La pasada {} no añadió ningún concepto; se detiene el cierre.",
                summary.passes
            );
            summary.unresolved = cache.missing_parents().into_iter().collect();
            break;
        }
    }

    Ok(summary)
}

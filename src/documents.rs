//! Resolves the PDF set that gets uploaded into the remote vector store.

use std::fs;
use std::path::{Path, PathBuf};

/// Statewide ordinance that takes precedence over every other document
pub const STATEWIDE_ORDINANCE: &str = "ADUHandbookUpdate.pdf";

/// Build the ordered document set: statewide ordinance first (when present),
/// then the remaining ordinances, then the letters.
///
/// A missing folder contributes nothing. Order within a folder is whatever the
/// directory listing yields.
pub fn resolve_document_set(
    letters_dir: &Path,
    ordinances_dir: &Path,
    statewide_name: &str,
) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    let statewide = ordinances_dir.join(statewide_name);
    if statewide.is_file() {
        paths.push(statewide);
    }

    paths.extend(
        pdfs_in(ordinances_dir)
            .into_iter()
            .filter(|p| p.file_name().and_then(|n| n.to_str()) != Some(statewide_name)),
    );
    paths.extend(pdfs_in(letters_dir));

    tracing::debug!(count = paths.len(), "Resolved document set");
    paths
}

fn pdfs_in(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("Skipping document folder {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_pdf(path))
        .collect()
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

//! Corpus ingestion from files and directories.

use crate::retrieval::Retriever;
use crate::types::IngestStats;
use consilium_core::{AppError, AppResult, Domain};
use std::path::Path;
use std::time::Instant;
use walkdir::WalkDir;

/// Extensions read as plain text.
const TEXT_EXTENSIONS: &[&str] = &["md", "markdown", "txt", "rst"];

/// Whether `path` looks like a text document worth ingesting.
pub fn is_text_document(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl Retriever {
    /// Ingest a file, or every text document under a directory, into `domain`.
    ///
    /// Files that cannot be read or embedded are skipped and counted.
    pub async fn ingest_path(&self, domain: &Domain, path: &Path) -> AppResult<IngestStats> {
        let start = Instant::now();

        if !path.exists() {
            return Err(AppError::Knowledge(format!(
                "Corpus path does not exist: {:?}",
                path
            )));
        }

        tracing::info!("Ingesting corpus {:?} into '{}'", path, domain);

        let files: Vec<_> = if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            let mut files: Vec<_> = WalkDir::new(path)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file() && is_text_document(e.path()))
                .map(|e| e.into_path())
                .collect();
            files.sort();
            files
        };

        let mut stats = IngestStats::default();

        for file in files {
            let text = match std::fs::read_to_string(&file) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("Skipping unreadable file {:?}: {}", file, e);
                    stats.skipped_count += 1;
                    continue;
                }
            };

            if text.trim().is_empty() {
                tracing::debug!("Skipping empty file {:?}", file);
                stats.skipped_count += 1;
                continue;
            }

            let source_id = file.to_string_lossy().to_string();
            let metadata = serde_json::json!({ "path": source_id });

            match self.ingest_chunked(domain, &source_id, &text, metadata).await {
                Ok(ids) => {
                    stats.sources_count += 1;
                    stats.snippets_count += ids.len() as u32;
                    stats.bytes_processed += text.len() as u64;
                }
                Err(e) if matches!(e, AppError::Knowledge(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!("Skipping {:?}: {}", file, e);
                    stats.skipped_count += 1;
                }
            }
        }

        stats.duration_secs = start.elapsed().as_secs_f64();

        tracing::info!(
            "Ingest completed: {} sources, {} snippets, {} skipped, {} bytes in {:.2}s",
            stats.sources_count,
            stats.snippets_count,
            stats.skipped_count,
            stats.bytes_processed,
            stats.duration_secs
        );

        Ok(stats)
    }
}

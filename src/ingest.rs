//! Ingest pipeline - submit tag documents produced by an external indexer
//!
//! Every document replaces one file inside its own transaction. Workers each
//! hold their own connection and report back to the coordinator over a
//! channel; a broken document fails alone and never touches other files.

use std::path::{Path, PathBuf};
use crossbeam::channel;
use crate::storage::{ReplaceSummary, SqliteStore};
use crate::tags::FileTags;
use crate::{Error, IngestMessage, Result};

/// Totals for one ingest run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Files written
    pub files: usize,
    /// Files that already existed and were replaced
    pub replaced: usize,
    /// Rows written across all four symbol tables
    pub symbols: usize,
    /// (document, error) for every document that was rolled back
    pub failures: Vec<(String, String)>,
}

impl IngestReport {
    fn record(&mut self, message: &IngestMessage) {
        match message {
            IngestMessage::Processed { summary, .. } => {
                self.files += 1;
                self.symbols += summary.total_symbols();
                if summary.replaced {
                    self.replaced += 1;
                }
            }
            IngestMessage::Error(document, error) => {
                self.failures.push((document.clone(), error.clone()));
            }
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Read one tag document and replace its file in the store.
pub fn ingest_document(store: &mut SqliteStore, document: &Path) -> Result<ReplaceSummary> {
    let tags = FileTags::from_path(document)?;
    store.replace_file(&tags)
}

/// Ingest many documents with up to `jobs` workers.
///
/// File-backed stores get one connection per worker; an in-memory store is
/// processed on the calling thread. `on_message` sees every outcome as it
/// arrives.
pub fn ingest_documents(
    store: &mut SqliteStore,
    documents: &[PathBuf],
    jobs: usize,
    mut on_message: impl FnMut(&IngestMessage),
) -> Result<IngestReport> {
    let mut report = IngestReport::default();
    if documents.is_empty() {
        return Ok(report);
    }

    if store.path().is_none() || jobs <= 1 {
        for document in documents {
            let message = process(store, document);
            on_message(&message);
            report.record(&message);
        }
        return Ok(report);
    }

    let jobs = jobs.min(documents.len());
    let workers = (0..jobs)
        .map(|_| store.try_clone())
        .collect::<Result<Vec<_>>>()?;
    tracing::debug!("Ingesting {} documents with {} workers", documents.len(), jobs);

    let (work_tx, work_rx) = channel::unbounded::<PathBuf>();
    for document in documents {
        // The receiver lives until the scope below ends.
        let _ = work_tx.send(document.clone());
    }
    drop(work_tx);

    let (msg_tx, msg_rx) = channel::unbounded::<IngestMessage>();
    crossbeam::scope(|scope| {
        for mut worker in workers {
            let work_rx = work_rx.clone();
            let msg_tx = msg_tx.clone();
            scope.spawn(move |_| {
                for document in work_rx {
                    if msg_tx.send(process(&mut worker, &document)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(msg_tx);

        for message in msg_rx {
            on_message(&message);
            report.record(&message);
        }
    })
    .map_err(|_| Error::Worker("an ingest worker panicked".to_string()))?;

    tracing::info!(
        "Ingested {} files ({} replaced, {} symbols, {} failed)",
        report.files,
        report.replaced,
        report.symbols,
        report.failures.len()
    );
    Ok(report)
}

fn process(store: &mut SqliteStore, document: &Path) -> IngestMessage {
    let name = document.display().to_string();
    match ingest_document(store, document) {
        Ok(summary) => IngestMessage::Processed { document: name, summary },
        Err(e) => {
            tracing::warn!("Skipping {}: {}", name, e);
            IngestMessage::Error(name, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_document(dir: &Path, name: &str, path: &str, refs: usize) -> PathBuf {
        let references: Vec<String> = (0..refs)
            .map(|i| format!(r#"{{"name": "f", "kind": "call", "position": {{"row": {}, "column": 0}}}}"#, i))
            .collect();
        let json = format!(
            r#"{{
                "path": "{}",
                "local_definitions": [
                    {{"position": {{"row": 0, "column": 4}}, "length": 1,
                      "references": [{{"position": {{"row": 1, "column": 0}}, "length": 1}}]}}
                ],
                "definitions": [
                    {{"name": "f", "kind": "function",
                      "start": {{"row": 0, "column": 0}}, "end": {{"row": 2, "column": 0}},
                      "name_start": {{"row": 0, "column": 4}}}}
                ],
                "references": [{}]
            }}"#,
            path,
            references.join(",")
        );
        let file = dir.join(name);
        fs::write(&file, json).unwrap();
        file
    }

    #[test]
    fn test_parallel_ingest() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SqliteStore::open(&dir.path().join("tags.db")).unwrap();
        let documents = vec![
            write_document(dir.path(), "a.json", "src/a.js", 2),
            write_document(dir.path(), "b.json", "src/b.js", 3),
            write_document(dir.path(), "c.json", "src/c.js", 0),
        ];
        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        let mut all = documents.clone();
        all.push(broken);

        let mut seen = 0;
        let report = ingest_documents(&mut store, &all, 3, |_| seen += 1).unwrap();

        assert_eq!(seen, 4);
        assert_eq!(report.files, 3);
        assert_eq!(report.replaced, 0);
        assert_eq!(report.symbols, 3 * 3 + 5);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].0.ends_with("broken.json"));

        let stats = store.stats().unwrap();
        assert_eq!(stats.files, 3);
        assert_eq!(stats.references, 5);
        assert_eq!(store.lookup_definitions_by_name("f").unwrap().len(), 3);

        // A second run replaces instead of duplicating.
        let again = ingest_documents(&mut store, &documents, 2, |_| {}).unwrap();
        assert!(again.is_clean());
        assert_eq!(again.replaced, 3);
        assert_eq!(store.stats().unwrap(), stats);
    }

    #[test]
    fn test_in_memory_ingest_runs_inline() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SqliteStore::open_in_memory().unwrap();
        let documents = vec![write_document(dir.path(), "a.json", "a.js", 1)];

        let report = ingest_documents(&mut store, &documents, 8, |_| {}).unwrap();
        assert_eq!(report.files, 1);
        assert_eq!(store.stats().unwrap().references, 1);
    }

    #[test]
    fn test_duplicate_positions_fail_document() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SqliteStore::open_in_memory().unwrap();
        let doc = dir.path().join("dup.json");
        fs::write(
            &doc,
            r#"{"path": "d.js", "references": [
                {"name": "a", "position": {"row": 0, "column": 0}},
                {"name": "b", "position": {"row": 0, "column": 0}}
            ]}"#,
        )
        .unwrap();

        let err = ingest_document(&mut store, &doc).unwrap_err();
        assert!(matches!(err, Error::UniquenessViolation(_)));
        assert_eq!(store.stats().unwrap().files, 0);
    }

    #[test]
    fn test_no_documents() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let report = ingest_documents(&mut store, &[], 4, |_| {}).unwrap();
        assert_eq!(report, IngestReport::default());
    }
}

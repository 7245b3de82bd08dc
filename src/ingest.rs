//! Ingestion: segment documents, append them to the corpus, and rebuild.
//!
//! Every successful ingest publishes a new index generation over the whole
//! accumulated corpus. New chunks join the accumulated corpus only once that
//! rebuild succeeds. A failed or cancelled ingest leaves the corpus and the
//! serving generation untouched.
//!
//! [`scan_directory`] walks `[corpus].root` using the same include/exclude
//! glob rules for the startup load and for `rag ingest <dir>`.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use walkdir::WalkDir;

use fusion_rag_core::capability::Segmenter;
use fusion_rag_core::chunk::MarkdownSegmenter;
use fusion_rag_core::{Chunk, HybridRetriever, Metadata, MetadataValue};

use crate::config::{Config, CorpusConfig};
use crate::models::{IngestReport, SourceDocument};
use crate::service::RagService;

pub struct IngestionPipeline {
    retriever: Arc<HybridRetriever>,
    segmenter: MarkdownSegmenter,
    corpus: Mutex<Vec<Chunk>>,
}

impl IngestionPipeline {
    pub fn new(retriever: Arc<HybridRetriever>, segmenter: MarkdownSegmenter) -> Self {
        Self {
            retriever,
            segmenter,
            corpus: Mutex::new(Vec::new()),
        }
    }

    pub fn segmenter(&self) -> &MarkdownSegmenter {
        &self.segmenter
    }

    /// Chunks in the generation queries currently read.
    pub fn total_chunks(&self) -> usize {
        self.retriever.snapshot().map(|g| g.len()).unwrap_or(0)
    }

    /// Segment one document and commit it.
    pub async fn ingest_document(
        &self,
        text: &str,
        filename: &str,
        doc_type: &str,
    ) -> Result<IngestReport> {
        if text.trim().is_empty() {
            return Err(fusion_rag_core::Error::InvalidParameter {
                name: "text",
                reason: "document text is empty".to_string(),
            }
            .into());
        }
        let chunks = self.segment(&SourceDocument {
            filename: filename.to_string(),
            doc_type: doc_type.to_string(),
            text: text.to_string(),
        })?;
        self.commit(chunks).await
    }

    /// Segment every document and commit them with a single rebuild.
    ///
    /// Documents that produce no chunks are skipped.
    pub async fn ingest_batch(&self, documents: &[SourceDocument]) -> Result<IngestReport> {
        let mut chunks = Vec::new();
        for doc in documents {
            let segmented = self.segment(doc)?;
            if segmented.is_empty() {
                warn!(filename = %doc.filename, "document produced no chunks; skipped");
            }
            chunks.extend(segmented);
        }
        self.commit(chunks).await
    }

    fn segment(&self, doc: &SourceDocument) -> Result<Vec<Chunk>> {
        let mut metadata = Metadata::new();
        metadata.insert(
            fusion_rag_core::models::SOURCE_KEY.to_string(),
            MetadataValue::from(doc.filename.as_str()),
        );
        metadata.insert("doc_type".to_string(), doc.doc_type.as_str().into());
        metadata.insert(
            "ingested_at".to_string(),
            chrono::Utc::now().to_rfc3339().into(),
        );
        self.segmenter
            .segment(&doc.text, &metadata)
            .with_context(|| format!("Failed to segment {}", doc.filename))
    }

    async fn commit(&self, chunks: Vec<Chunk>) -> Result<IngestReport> {
        let mut corpus = self.corpus.lock().await;
        let created = chunks.len();
        let mut next = corpus.clone();
        next.extend(chunks);

        let generation = self.retriever.build_indices(next.clone()).await?;
        *corpus = next;
        info!(
            chunks_created = created,
            total_chunks = corpus.len(),
            generation,
            "ingested"
        );
        Ok(IngestReport {
            chunks_created: created,
            total_chunks: corpus.len(),
            generation,
        })
    }
}

/// Read every file under `corpus.root` that matches the include globs.
///
/// Paths are reported relative to the root and sorted.
pub fn scan_directory(corpus: &CorpusConfig, doc_type: &str) -> Result<Vec<SourceDocument>> {
    let root = corpus
        .root
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("corpus.root not configured"))?;
    if !root.exists() {
        bail!("Corpus root does not exist: {}", root.display());
    }

    let include_set = build_globset(&corpus.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(corpus.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut documents = Vec::new();

    for entry in WalkDir::new(root).follow_links(corpus.follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        documents.push(SourceDocument {
            filename: rel_str,
            doc_type: doc_type.to_string(),
            text: read_text(path)?,
        });
    }

    documents.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(documents)
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// `rag ingest`: index files or directories and print per-file chunk counts.
pub async fn run_ingest(config: &Config, paths: &[std::path::PathBuf], doc_type: &str) -> Result<()> {
    let documents = collect_documents(config, paths, doc_type)?;
    if documents.is_empty() {
        println!("No documents matched.");
        return Ok(());
    }

    let service = RagService::from_config(config)?;
    let segmenter = service.ingestion().segmenter();
    for doc in &documents {
        println!(
            "  {:<50} {:>5} chunks",
            doc.filename,
            segmenter.split(&doc.text).len()
        );
    }
    let report = service.ingestion().ingest_batch(&documents).await?;

    println!();
    println!("Ingest complete:");
    println!("  documents:  {}", documents.len());
    println!("  chunks:     {}", report.chunks_created);
    println!("  generation: {}", report.generation);
    Ok(())
}

/// Expand CLI paths into documents. Directories are scanned with the
/// `[corpus]` glob rules; with no paths, `[corpus].root` is scanned.
pub fn collect_documents(
    config: &Config,
    paths: &[std::path::PathBuf],
    doc_type: &str,
) -> Result<Vec<SourceDocument>> {
    if paths.is_empty() {
        return scan_directory(&config.corpus, doc_type);
    }

    let mut documents = Vec::new();
    for path in paths {
        if path.is_dir() {
            let corpus = CorpusConfig {
                root: Some(path.clone()),
                ..config.corpus.clone()
            };
            documents.extend(scan_directory(&corpus, doc_type)?);
        } else {
            documents.push(SourceDocument {
                filename: path.to_string_lossy().to_string(),
                doc_type: doc_type.to_string(),
                text: read_text(path)?,
            });
        }
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fusion_rag_core::embedding::{EmbeddingProvider, HashingEmbedder};
    use fusion_rag_core::RetrieverOptions;
    use std::time::Duration;

    fn pipeline() -> IngestionPipeline {
        pipeline_with(Arc::new(HashingEmbedder::new(64)))
    }

    fn pipeline_with(embedder: Arc<dyn EmbeddingProvider>) -> IngestionPipeline {
        let retriever = Arc::new(HybridRetriever::new(embedder, RetrieverOptions::default()));
        IngestionPipeline::new(retriever, MarkdownSegmenter::new(200, 20).unwrap())
    }

    /// Hangs on batches containing "stall" and fails on batches containing "broken".
    struct TripwireEmbedder {
        inner: HashingEmbedder,
    }

    #[async_trait]
    impl EmbeddingProvider for TripwireEmbedder {
        fn model_name(&self) -> &str {
            "tripwire"
        }

        fn dims(&self) -> usize {
            self.inner.dims()
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t.contains("stall")) {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            if texts.iter().any(|t| t.contains("broken")) {
                bail!("embedding backend unavailable");
            }
            self.inner.embed_batch(texts).await
        }
    }

    fn tripwire_pipeline() -> IngestionPipeline {
        pipeline_with(Arc::new(TripwireEmbedder {
            inner: HashingEmbedder::new(64),
        }))
    }

    #[tokio::test]
    async fn test_ingest_document_records_metadata() {
        let p = pipeline();
        let report = p
            .ingest_document("# Guide\n\nLangGraph builds agents.", "guide.md", "manual")
            .await
            .unwrap();
        assert_eq!(report.chunks_created, 1);
        assert_eq!(report.total_chunks, 1);

        let snapshot = p.retriever.snapshot().unwrap();
        let chunk = &snapshot.corpus().chunks()[0];
        assert_eq!(chunk.source(), Some("guide.md"));
        assert_eq!(chunk.metadata["doc_type"].as_str(), Some("manual"));
        assert_eq!(chunk.metadata["header_1"].as_str(), Some("Guide"));
        assert!(chunk.metadata.contains_key("ingested_at"));
    }

    #[tokio::test]
    async fn test_ingest_accumulates_and_bumps_generation() {
        let p = pipeline();
        let first = p.ingest_document("alpha beta", "a.txt", "general").await.unwrap();
        let second = p.ingest_document("gamma delta", "b.txt", "general").await.unwrap();
        assert_eq!(second.total_chunks, 2);
        assert!(second.generation > first.generation);
        assert_eq!(p.total_chunks(), 2);
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let p = pipeline();
        let err = p.ingest_document("   ", "a.txt", "general").await.unwrap_err();
        let core = err.downcast_ref::<fusion_rag_core::Error>().unwrap();
        assert!(core.is_invalid_parameter());
        assert_eq!(p.total_chunks(), 0);
    }

    #[tokio::test]
    async fn test_total_chunks_counts_published_generation() {
        let p = pipeline();
        assert_eq!(p.total_chunks(), 0);
        p.ingest_document("alpha beta", "a.txt", "general").await.unwrap();
        assert_eq!(p.total_chunks(), 1);
        assert_eq!(p.total_chunks(), p.retriever.snapshot().unwrap().len());
    }

    #[tokio::test]
    async fn test_total_chunks_does_not_wait_for_ingest() {
        let p = Arc::new(tripwire_pipeline());
        p.ingest_document("alpha beta", "a.txt", "general").await.unwrap();

        let slow = {
            let p = p.clone();
            tokio::spawn(async move { p.ingest_document("stall here", "s.txt", "general").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The slow ingest holds the corpus lock; the count still reads the
        // serving generation.
        assert_eq!(p.total_chunks(), 1);
        slow.abort();
    }

    #[tokio::test]
    async fn test_failed_ingest_leaves_corpus_unchanged() {
        let p = tripwire_pipeline();
        p.ingest_document("alpha beta", "a.txt", "general").await.unwrap();
        let before = p.retriever.current_generation();

        assert!(p.ingest_document("broken input", "b.txt", "general").await.is_err());
        assert_eq!(p.retriever.current_generation(), before);
        assert_eq!(p.total_chunks(), 1);

        let report = p.ingest_document("gamma delta", "c.txt", "general").await.unwrap();
        assert_eq!(report.total_chunks, 2);
    }

    #[tokio::test]
    async fn test_cancelled_ingest_is_not_committed() {
        let p = tripwire_pipeline();
        p.ingest_document("alpha beta", "a.txt", "general").await.unwrap();

        let dropped = tokio::time::timeout(
            Duration::from_millis(50),
            p.ingest_document("stall here", "s.txt", "general"),
        )
        .await;
        assert!(dropped.is_err());

        // A stalled chunk left in the corpus would hang this rebuild too.
        let report = tokio::time::timeout(
            Duration::from_secs(5),
            p.ingest_document("gamma delta", "c.txt", "general"),
        )
        .await
        .expect("rebuild included the cancelled chunk")
        .unwrap();
        assert_eq!(report.chunks_created, 1);
        assert_eq!(report.total_chunks, 2);

        let snapshot = p.retriever.snapshot().unwrap();
        let sources: Vec<_> = snapshot.corpus().chunks().iter().map(|c| c.source()).collect();
        assert_eq!(sources, vec![Some("a.txt"), Some("c.txt")]);
    }

    #[test]
    fn test_scan_directory_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        std::fs::write(dir.path().join("b.md"), "bee").unwrap();
        std::fs::write(dir.path().join("a.txt"), "ay").unwrap();
        std::fs::write(dir.path().join("sub/c.md"), "sea").unwrap();
        std::fs::write(dir.path().join("image.png"), "binary").unwrap();
        std::fs::write(dir.path().join("node_modules/pkg/d.md"), "dee").unwrap();

        let corpus = CorpusConfig {
            root: Some(dir.path().to_path_buf()),
            ..CorpusConfig::default()
        };
        let docs = scan_directory(&corpus, "general").unwrap();
        let names: Vec<&str> = docs.iter().map(|d| d.filename.as_str()).collect();
        let expected_sub = Path::new("sub").join("c.md").to_string_lossy().to_string();
        assert_eq!(names, vec!["a.txt", "b.md", expected_sub.as_str()]);
        assert_eq!(docs[1].text, "bee");
    }

    #[test]
    fn test_scan_directory_user_excludes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("keep.md"), "keep").unwrap();
        std::fs::write(dir.path().join("DRAFT.md"), "drop").unwrap();
        let corpus = CorpusConfig {
            root: Some(dir.path().to_path_buf()),
            exclude_globs: vec!["DRAFT.md".to_string()],
            ..CorpusConfig::default()
        };
        let docs = scan_directory(&corpus, "general").unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].filename, "keep.md");
    }

    #[test]
    fn test_scan_directory_missing_root() {
        let corpus = CorpusConfig {
            root: Some("/definitely/not/here".into()),
            ..CorpusConfig::default()
        };
        assert!(scan_directory(&corpus, "general").is_err());
        assert!(scan_directory(&CorpusConfig::default(), "general").is_err());
    }
}

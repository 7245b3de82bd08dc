//! `rag search` and `rag ask`.
//!
//! Both commands index the given paths (or `[corpus].root`) in memory and
//! then query that generation.

use anyhow::{bail, Result};
use std::path::PathBuf;

use fusion_rag_core::ScoredCandidate;

use crate::config::Config;
use crate::ingest::collect_documents;
use crate::service::RagService;

const EXCERPT_CHARS: usize = 200;

pub(crate) async fn load_service(config: &Config, paths: &[PathBuf]) -> Result<RagService> {
    if paths.is_empty() && config.corpus.root.is_none() {
        bail!("No corpus to search: pass paths or set [corpus].root");
    }
    let documents = collect_documents(config, paths, "general")?;
    let service = RagService::from_config(config)?;
    service.ingestion().ingest_batch(&documents).await?;
    Ok(service)
}

pub async fn run_search(
    config: &Config,
    query: &str,
    paths: &[PathBuf],
    k: Option<usize>,
    alpha: Option<f64>,
    explain: bool,
) -> Result<()> {
    let service = load_service(config, paths).await?;
    let results = service.hybrid_search(query, k, alpha).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        print_result(i + 1, result, explain);
    }
    Ok(())
}

fn print_result(rank: usize, result: &ScoredCandidate, explain: bool) {
    println!(
        "{}. [{:.3}] {}",
        rank,
        result.score,
        result.chunk.source().unwrap_or("(unknown)")
    );
    if explain {
        println!("    matched: {}", result.source);
        println!("    dense:   {}", fmt_component(result.dense_similarity));
        println!("    lexical: {}", fmt_component(result.sparse_score));
        println!("    ordinal: {}", result.chunk.ordinal_id);
    }
    println!("    excerpt: \"{}\"", excerpt(&result.chunk.content));
    println!();
}

fn fmt_component(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.3}", v))
        .unwrap_or_else(|| "-".to_string())
}

fn excerpt(content: &str) -> String {
    let flat = content.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= EXCERPT_CHARS {
        return flat.to_string();
    }
    let cut: String = flat.chars().take(EXCERPT_CHARS).collect();
    format!("{}…", cut.trim_end())
}

/// `rag ask`: run the full pipeline and print the answer with its sources.
pub async fn run_ask(config: &Config, question: &str, paths: &[PathBuf]) -> Result<()> {
    let service = load_service(config, paths).await?;
    let output = service.run_pipeline(question).await?;

    println!("{}", output.answer.trim());
    println!();
    println!("Sources:");
    for (i, doc) in output.documents.iter().enumerate() {
        println!("  {}. {}", i + 1, doc.source().unwrap_or("(unknown)"));
    }
    println!("request: {}", output.request_id);
    Ok(())
}

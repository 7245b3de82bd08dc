use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn rag_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("rag");
    path
}

fn write_corpus(dir: &Path) {
    fs::create_dir_all(dir.join("nested")).unwrap();
    fs::write(
        dir.join("alpha.md"),
        "# Alpha Document\n\nThis is the alpha document about Rust programming.\n\n\
         It covers cargo, crates, and the borrow checker.",
    )
    .unwrap();
    fs::write(
        dir.join("beta.md"),
        "# Beta Document\n\nPython packaging with pip and virtual environments.",
    )
    .unwrap();
    fs::write(
        dir.join("nested/notes.txt"),
        "Meeting notes: the deployment moved to Thursday.",
    )
    .unwrap();
    fs::write(dir.join("diagram.png"), "not text").unwrap();
}

/// Temp dir with `files/` and a config whose `[corpus].root` points at it.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let files_dir = root.join("files");
    write_corpus(&files_dir);

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_path = config_dir.join("rag.toml");
    fs::write(
        &config_path,
        format!(
            "[chunking]\nchunk_size = 200\nchunk_overlap = 20\n\n[corpus]\nroot = {:?}\n",
            files_dir.to_string_lossy()
        ),
    )
    .unwrap();

    (tmp, config_path)
}

fn run_rag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(rag_binary())
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env("RAG_LOG", "warn")
        .output()
        .expect("failed to run rag binary");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

#[test]
fn test_ingest_reports_counts() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, ok) = run_rag(&config, &["ingest"]);
    assert!(ok, "ingest failed: {}", stderr);
    assert!(stdout.contains("alpha.md"));
    assert!(stdout.contains("beta.md"));
    assert!(stdout.contains("notes.txt"));
    assert!(!stdout.contains("diagram.png"));
    assert!(stdout.contains("documents:  3"));
}

#[test]
fn test_search_ranks_matching_document_first() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, ok) = run_rag(&config, &["search", "rust cargo crates"]);
    assert!(ok, "search failed: {}", stderr);
    let first = stdout.lines().next().unwrap_or_default();
    assert!(first.starts_with("1. ["), "unexpected output: {}", stdout);
    assert!(first.contains("alpha.md"), "unexpected output: {}", stdout);
}

#[test]
fn test_search_explain_shows_components() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, ok) = run_rag(&config, &["search", "deployment", "--explain"]);
    assert!(ok);
    assert!(stdout.contains("matched:"));
    assert!(stdout.contains("dense:"));
    assert!(stdout.contains("lexical:"));
}

#[test]
fn test_search_deterministic() {
    let (_tmp, config) = setup_test_env();
    let (first, _, ok1) = run_rag(&config, &["search", "document", "--k", "3"]);
    let (second, _, ok2) = run_rag(&config, &["search", "document", "--k", "3"]);
    assert!(ok1 && ok2);
    assert_eq!(first, second);
}

#[test]
fn test_search_k_limits_results() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, ok) = run_rag(&config, &["search", "document", "--k", "1"]);
    assert!(ok);
    assert!(stdout.contains("1. ["));
    assert!(!stdout.contains("2. ["));
}

#[test]
fn test_search_rejects_alpha_out_of_range() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, ok) = run_rag(&config, &["search", "rust", "--alpha", "1.5"]);
    assert!(!ok);
    assert!(stderr.contains("alpha"), "stderr: {}", stderr);
}

#[test]
fn test_search_explicit_paths_without_config() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let missing_config = tmp.path().join("missing.toml");
    let files = tmp.path().to_string_lossy().to_string();

    let (stdout, stderr, ok) = run_rag(&missing_config, &["search", "python pip", &files]);
    assert!(ok, "search failed: {}", stderr);
    assert!(stdout.lines().next().unwrap_or_default().contains("beta.md"));
}

#[test]
fn test_search_without_corpus_errors() {
    let tmp = TempDir::new().unwrap();
    let missing_config = tmp.path().join("missing.toml");
    let (_, stderr, ok) = run_rag(&missing_config, &["search", "anything"]);
    assert!(!ok);
    assert!(stderr.contains("No corpus"));
}

#[test]
fn test_ask_without_generator_fails_at_generate() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, ok) = run_rag(&config, &["ask", "What does the alpha document cover?"]);
    assert!(!ok);
    assert!(stderr.contains("generate stage failed"), "stderr: {}", stderr);
}

#[test]
fn test_invalid_config_errors() {
    let (_tmp, config) = setup_test_env();
    fs::write(&config, "[retrieval]\ntop_k_rerank = 50\n").unwrap();
    let (_, stderr, ok) = run_rag(&config, &["ingest"]);
    assert!(!ok);
    assert!(stderr.contains("retrieval"), "stderr: {}", stderr);
}

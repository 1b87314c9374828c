//! End-to-end tests for the `agentic-rag` binary.
//!
//! These exercise everything that happens before the first model call:
//! argument parsing, configuration, corpus loading and question validation.

use assert_cmd::Command;
use predicates::prelude::*;

fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("agentic-rag").unwrap_or_else(|e| unreachable!("{e}"));
    for var in [
        "OPENAI_API_KEY",
        "RAG_API_KEY",
        "RAG_PROVIDER",
        "RAG_CORPUS",
        "RAG_PROMPT_DIR",
        "RAG_CATEGORY_GUIDE",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn corpus(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("corpus.json");
    std::fs::write(
        &path,
        r#"[{"id": "d1", "content": "Revenue grew 12% in 2023.", "source_file": "report.pdf", "source_pages": 4}]"#,
    )
    .unwrap_or_else(|_| unreachable!());
    path
}

#[test]
fn test_help_lists_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("research"))
        .stdout(predicate::str::contains("init-prompts"));
}

#[test]
fn test_init_prompts_writes_templates() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
    cmd()
        .args(["init-prompts", "--dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 5 prompt template(s)"));

    assert!(dir.path().join("planner_keyword.md").exists());
    assert!(dir.path().join("synthesizer.md").exists());
}

#[test]
fn test_init_prompts_json() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
    cmd()
        .args(["--format", "json", "init-prompts", "--dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"count\": 5"));
}

#[test]
fn test_ask_without_api_key_fails() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
    cmd()
        .args(["ask", "What is the revenue?", "--corpus"])
        .arg(corpus(&dir))
        .assert()
        .failure()
        .stderr(predicate::str::contains("API key"));
}

#[test]
fn test_ask_rejects_empty_question() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
    cmd()
        .env("OPENAI_API_KEY", "test")
        .args(["ask", "   ", "--corpus"])
        .arg(corpus(&dir))
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid question"));
}

#[test]
fn test_research_rejects_empty_question() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
    cmd()
        .env("OPENAI_API_KEY", "test")
        .args(["research", "", "--corpus"])
        .arg(corpus(&dir))
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid question"));
}

#[test]
fn test_missing_corpus_file_fails() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
    cmd()
        .env("OPENAI_API_KEY", "test")
        .args(["ask", "What is the revenue?", "--corpus"])
        .arg(dir.path().join("absent.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("absent.json"));
}

#[test]
fn test_bad_category_guide_fails() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
    let guide = dir.path().join("guide.json");
    std::fs::write(&guide, "not json").unwrap_or_else(|_| unreachable!());
    cmd()
        .env("OPENAI_API_KEY", "test")
        .args(["ask", "What is the revenue?", "--corpus"])
        .arg(corpus(&dir))
        .arg("--category-guide")
        .arg(&guide)
        .assert()
        .failure()
        .stderr(predicate::str::contains("category guide"));
}

#[test]
fn test_unknown_mode_rejected() {
    cmd()
        .args(["ask", "q", "--mode", "fuzzy"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

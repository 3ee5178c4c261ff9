use assert_cmd::Command;
use axum::{routing::post, Json, Router};
use predicates::str::contains;
use std::net::SocketAddr;

const DOC: &str = "Chapter 1.\n\nThe quick   brown fox jumps over\nthe lazy dog. It was tired after the long run.\n";

fn gloss() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("gloss"));
    cmd.env("GLOSS_CACHE", "off")
        .env_remove("GLOSS_ENV_FILE")
        .env_remove("GLOSS_LLM_PROVIDER")
        .env_remove("GLOSS_OPENAI_COMPAT_BASE_URL")
        .env_remove("GLOSS_OLLAMA_ENABLE");
    cmd
}

fn write_doc(dir: &tempfile::TempDir, name: &str, body: &[u8]) -> std::path::PathBuf {
    let p = dir.path().join(name);
    std::fs::write(&p, body).expect("write doc");
    p
}

#[test]
fn locate_finds_highlight_across_line_breaks() {
    let dir = tempfile::tempdir().unwrap();
    let doc = write_doc(&dir, "paper.txt", DOC.as_bytes());

    let out = gloss()
        .args(["locate", "--highlight", "jumps over the LAZY dog", "--file"])
        .arg(&doc)
        .output()
        .expect("run gloss locate");
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse locate json");
    assert_eq!(v["engine"].as_str(), Some("text"));
    assert_eq!(v["extract_source"].as_str(), Some("extractor"));
    assert_eq!(v["window"]["found"].as_bool(), Some(true));
    assert_eq!(v["window"]["outcome"].as_str(), Some("exact"));
    assert!(v["window"]["text"]
        .as_str()
        .unwrap_or("")
        .contains("jumps over\nthe lazy dog"));
}

#[test]
fn locate_miss_falls_back_to_document_opening() {
    let dir = tempfile::tempdir().unwrap();
    let doc = write_doc(&dir, "paper.txt", DOC.as_bytes());

    let out = gloss()
        .args(["locate", "--highlight", "a sentence that is not there", "--file"])
        .arg(&doc)
        .output()
        .expect("run gloss locate");
    assert!(out.status.success());

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["window"]["found"].as_bool(), Some(false));
    assert_eq!(v["window"]["outcome"].as_str(), Some("no_match"));
    assert_eq!(v["window"]["text"].as_str(), Some(DOC));
}

#[test]
fn locate_text_output_prints_only_the_window() {
    let dir = tempfile::tempdir().unwrap();
    let doc = write_doc(&dir, "paper.txt", DOC.as_bytes());

    gloss()
        .args(["locate", "--output", "text", "--highlight", "xyz", "--file"])
        .arg(&doc)
        .assert()
        .success()
        .stdout(contains("Chapter 1."));
}

#[test]
fn extract_json_reports_engine_and_text() {
    let dir = tempfile::tempdir().unwrap();
    let doc = write_doc(&dir, "notes.md", DOC.as_bytes());

    let out = gloss()
        .args(["extract", "--output", "json", "--file"])
        .arg(&doc)
        .output()
        .expect("run gloss extract");
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["engine"].as_str(), Some("text"));
    assert_eq!(v["truncated"].as_bool(), Some(false));
    assert_eq!(v["text_chars"].as_u64(), Some(DOC.chars().count() as u64));
    assert_eq!(v["text"].as_str(), Some(DOC));
}

#[test]
fn extract_rejects_binary_uploads() {
    let dir = tempfile::tempdir().unwrap();
    let doc = write_doc(&dir, "blob.bin", &[0u8, 159, 146, 150, 0, 1, 2, 3, 255, 254]);

    gloss()
        .args(["extract", "--file"])
        .arg(&doc)
        .assert()
        .failure()
        .stderr(contains("extraction failed"));
}

#[test]
fn explain_without_provider_is_not_configured() {
    let dir = tempfile::tempdir().unwrap();
    let doc = write_doc(&dir, "paper.txt", DOC.as_bytes());

    gloss()
        .args(["explain", "--highlight", "the lazy dog", "--file"])
        .arg(&doc)
        .assert()
        .failure()
        .stderr(contains("no LLM provider configured"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn explain_calls_openai_compatible_provider() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|Json(body): Json<serde_json::Value>| async move {
            let user = body["messages"][1]["content"].as_str().unwrap_or("");
            let grounded = user.contains("It was tired after the long run.");
            Json(serde_json::json!({
                "choices": [{"message": {"role": "assistant",
                    "content": format!("grounded={grounded}")}}]
            }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let dir = tempfile::tempdir().unwrap();
    let doc = write_doc(&dir, "paper.txt", DOC.as_bytes());

    let out = tokio::task::spawn_blocking(move || {
        gloss()
            .env("GLOSS_OPENAI_COMPAT_BASE_URL", format!("http://{addr}"))
            .env("GLOSS_OPENAI_COMPAT_MODEL", "fixture")
            .args([
                "explain",
                "--output",
                "json",
                "--mode",
                "example",
                "--level",
                "middle",
                "--highlight",
                "the lazy dog",
                "--file",
            ])
            .arg(&doc)
            .output()
            .expect("run gloss explain")
    })
    .await
    .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["output"].as_str(), Some("grounded=true"));
    assert_eq!(v["found"].as_bool(), Some(true));
    assert_eq!(v["mode"].as_str(), Some("example"));
    assert_eq!(v["level"].as_str(), Some("middle"));
    assert_eq!(v["provider"].as_str(), Some("openai_compat"));
    assert_eq!(v["model"].as_str(), Some("fixture"));
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gloss_core::{ExtractRequest, Mode, ReadingLevel, TextExtractor};
use gloss_local::explain::ExplainInput;
use gloss_local::{extract::ExtractLimits, shellout, LocalExtractor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "gloss")]
#[command(about = "Explain highlighted PDF passages, grounded in the surrounding text", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server (`/health`, `/api/explain`, `/api/locate`).
    Serve(ServeCmd),
    /// Find a highlight in a document and print its context window (json).
    Locate(LocateCmd),
    /// Extract a document's text.
    Extract(ExtractCmd),
    /// Explain a highlight in one shot (requires an LLM provider).
    Explain(ExplainCmd),
    /// Diagnose configuration/tooling issues (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct ServeCmd {
    #[arg(long, env = "GLOSS_HOST", default_value = "127.0.0.1")]
    host: String,
    #[arg(long, env = "GLOSS_PORT", default_value_t = 8787)]
    port: u16,
    /// LLM provider. Allowed: auto, openai_compat, ollama
    #[arg(long, env = "GLOSS_LLM_PROVIDER")]
    provider: Option<String>,
}

#[derive(clap::Args, Debug)]
struct DocumentArgs {
    /// PDF or plain-text file.
    #[arg(long)]
    file: PathBuf,
    /// Override the content type (default: guessed from the file extension).
    #[arg(long)]
    content_type: Option<String>,
}

#[derive(clap::Args, Debug)]
struct LocateCmd {
    #[command(flatten)]
    doc: DocumentArgs,
    #[arg(long)]
    highlight: String,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct ExtractCmd {
    #[command(flatten)]
    doc: DocumentArgs,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "text")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct ExplainCmd {
    #[command(flatten)]
    doc: DocumentArgs,
    #[arg(long)]
    highlight: String,
    /// Allowed: quick, breakdown, example, assumptions
    #[arg(long, default_value = "quick")]
    mode: Mode,
    /// Allowed: middle, high, college, expert
    #[arg(long, default_value = "college")]
    level: ReadingLevel,
    /// LLM provider. Allowed: auto, openai_compat, ollama
    #[arg(long, env = "GLOSS_LLM_PROVIDER")]
    provider: Option<String>,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "text")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

fn setup_logging(default_filter: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();
}

/// Opt-in env file (`GLOSS_ENV_FILE`). Never overrides the process environment; never logs values.
fn load_env_file() {
    let Ok(p) = std::env::var("GLOSS_ENV_FILE") else {
        return;
    };
    let p = p.trim();
    if p.is_empty() {
        return;
    }
    let Ok(txt) = std::fs::read_to_string(p) else {
        return;
    };
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        let v = v.trim().trim_matches('"');
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v);
        }
    }
}

fn guess_content_type(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let ct = match ext.as_str() {
        "pdf" => "application/pdf",
        "txt" | "text" | "md" | "markdown" => "text/plain",
        _ => return None,
    };
    Some(ct.to_string())
}

fn read_document(args: &DocumentArgs) -> Result<ExtractRequest> {
    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("read {}", args.file.display()))?;
    Ok(ExtractRequest {
        bytes,
        content_type: args
            .content_type
            .clone()
            .or_else(|| guess_content_type(&args.file)),
        filename: args
            .file
            .file_name()
            .map(|s| s.to_string_lossy().to_string()),
    })
}

fn is_text_output(output: &str) -> bool {
    output.eq_ignore_ascii_case("text")
}

fn doctor_payload(t0: std::time::Instant) -> serde_json::Value {
    fn has_env(k: &str) -> bool {
        std::env::var(k).ok().is_some_and(|v| !v.trim().is_empty())
    }

    let cache_dir = gloss_local::cache_dir_from_env();
    let mut checks: Vec<serde_json::Value> = Vec::new();

    // Check: cache dir is creatable + writable (skipped when caching is off).
    let cache_ok = match &cache_dir {
        None => true,
        Some(dir) => (|| -> anyhow::Result<()> {
            std::fs::create_dir_all(dir)?;
            let probe = dir.join(format!("gloss-doctor-{}.probe", std::process::id()));
            std::fs::write(&probe, b"ok")?;
            let _ = std::fs::remove_file(&probe);
            Ok(())
        })()
        .is_ok(),
    };
    checks.push(serde_json::json!({
        "name": "cache_dir_writable",
        "ok": cache_ok,
        "skipped": cache_dir.is_none(),
        "message": if cache_dir.is_none() {
            "extraction cache disabled"
        } else if cache_ok {
            "cache dir is writable"
        } else {
            "cache dir is not writable"
        },
        "hint": if cache_ok { "" } else { "Set GLOSS_CACHE_DIR to a writable directory, or GLOSS_CACHE=off." },
    }));

    let limits = ExtractLimits::from_env();
    for tool in ["pdftotext", "mutool"] {
        let found = shellout::has(tool);
        checks.push(serde_json::json!({
            "name": format!("{tool}_available"),
            // Optional tools: absence degrades extraction, it doesn't break it.
            "ok": true,
            "found": found,
            "message": if found { format!("{tool} found on PATH") } else { format!("{tool} not found on PATH") },
            "hint": if found { "" } else { "Install poppler-utils (pdftotext) or mupdf-tools (mutool) for PDFs pdf-extract can't read." },
        }));
    }

    let openai_compat = gloss_local::openai_compat::openai_compat_configured();
    let ollama = gloss_local::ollama::ollama_enabled();
    let llm_ok = openai_compat || ollama;
    checks.push(serde_json::json!({
        "name": "llm_configured",
        "ok": llm_ok,
        "message": if llm_ok { "an LLM provider is configured" } else { "no LLM provider configured" },
        "hint": if llm_ok { "" } else { gloss_local::explain::NO_PROVIDER_HINT },
    }));

    let locator = gloss_local::locator_config_from_env();
    let ok = checks.iter().all(|c| c["ok"].as_bool().unwrap_or(false));
    serde_json::json!({
        "schema_version": 1,
        "kind": "doctor",
        "ok": ok,
        "name": "gloss",
        "version": env!("CARGO_PKG_VERSION"),
        "platform": {
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        },
        "elapsed_ms": t0.elapsed().as_millis(),
        "configured": {
            "llm": {
                "provider": std::env::var("GLOSS_LLM_PROVIDER").ok().filter(|s| !s.trim().is_empty()),
                "openai_compat": openai_compat,
                "openai_compat_api_key": has_env("GLOSS_OPENAI_COMPAT_API_KEY"),
                "openai_compat_model": has_env("GLOSS_OPENAI_COMPAT_MODEL"),
                "ollama": ollama,
            },
            "extract": {
                "max_chars": limits.max_chars,
                "pdf_shellout": limits.shellout.as_str(),
                "shellout_max_pages": limits.shellout_max_pages,
                "shellout_timeout_ms": limits.shellout_timeout_ms,
            },
            "locator": locator,
            "max_upload_bytes": gloss_local::max_upload_bytes_from_env(),
            "cache_dir": cache_dir.map(|p| p.to_string_lossy().to_string()),
        },
        "checks": checks,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file();

    let cli = Cli::parse();
    setup_logging(match cli.command {
        Commands::Serve(_) => "info",
        _ => "warn",
    });

    match cli.command {
        Commands::Serve(args) => {
            let explainer = gloss_cli::explainer_from_env(args.provider.as_deref())?;
            let state = gloss_cli::server::AppState {
                explainer: Arc::new(explainer),
                max_upload_bytes: gloss_local::max_upload_bytes_from_env(),
            };
            let app = gloss_cli::server::create_router(state);
            let addr = format!("{}:{}", args.host, args.port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("bind {addr}"))?;
            tracing::info!(%addr, "gloss listening");
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                    tracing::info!("shutting down");
                })
                .await?;
        }
        Commands::Locate(args) => {
            let document = read_document(&args.doc)?;
            let explainer = gloss_local::explain::Explainer::new(
                Arc::new(LocalExtractor::from_env()),
                None,
                gloss_local::locator_config_from_env(),
            );
            let out = explainer.locate(&document, &args.highlight).await?;
            if is_text_output(&args.output) {
                println!("{}", out.window.text);
            } else {
                println!("{}", serde_json::to_string_pretty(&out)?);
            }
        }
        Commands::Extract(args) => {
            let document = read_document(&args.doc)?;
            let out = LocalExtractor::from_env().extract(&document).await?;
            if is_text_output(&args.output) {
                println!("{}", out.text);
            } else {
                println!(
                    "{}",
                    serde_json::json!({
                        "engine": out.engine,
                        "source": out.source,
                        "text_chars": out.text.chars().count(),
                        "truncated": out.truncated,
                        "warnings": out.warnings,
                        "text": out.text,
                    })
                );
            }
        }
        Commands::Explain(args) => {
            let explainer = gloss_cli::explainer_from_env(args.provider.as_deref())?;
            let input = ExplainInput {
                document: read_document(&args.doc)?,
                highlight: args.highlight,
                mode: args.mode,
                level: args.level,
            };
            let out = explainer.explain(&input).await?;
            if is_text_output(&args.output) {
                if !out.found {
                    eprintln!(
                        "note: highlight not located ({}); explained from the document opening",
                        out.outcome.as_str()
                    );
                }
                println!("{}", out.output);
            } else {
                println!("{}", serde_json::to_string_pretty(&out)?);
            }
        }
        Commands::Doctor(args) => {
            let payload = doctor_payload(std::time::Instant::now());
            if is_text_output(&args.output) {
                println!(
                    "gloss {} (ok={})",
                    env!("CARGO_PKG_VERSION"),
                    payload["ok"].as_bool().unwrap_or(false)
                );
                if let Some(checks) = payload["checks"].as_array() {
                    for c in checks {
                        println!(
                            "{}: {}",
                            c["name"].as_str().unwrap_or(""),
                            c["message"].as_str().unwrap_or("")
                        );
                    }
                }
            } else {
                println!("{payload}");
            }
        }
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "gloss",
                "version": env!("CARGO_PKG_VERSION"),
            });
            if is_text_output(&args.output) {
                println!("gloss {}", env!("CARGO_PKG_VERSION"));
            } else {
                println!("{v}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_is_guessed_from_extension() {
        assert_eq!(
            guess_content_type(Path::new("paper.PDF")).as_deref(),
            Some("application/pdf")
        );
        assert_eq!(
            guess_content_type(Path::new("notes.md")).as_deref(),
            Some("text/plain")
        );
        assert_eq!(guess_content_type(Path::new("blob.bin")), None);
        assert_eq!(guess_content_type(Path::new("noext")), None);
    }

    #[test]
    fn cli_parses_mode_and_level() {
        let cli = Cli::try_parse_from([
            "gloss",
            "explain",
            "--file",
            "a.pdf",
            "--highlight",
            "the lazy dog",
            "--mode",
            "Breakdown",
            "--level",
            "expert",
        ])
        .unwrap();
        match cli.command {
            Commands::Explain(a) => {
                assert_eq!(a.mode, Mode::Breakdown);
                assert_eq!(a.level, ReadingLevel::Expert);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(Cli::try_parse_from([
            "gloss", "explain", "--file", "a.pdf", "--highlight", "x", "--mode", "poem"
        ])
        .is_err());
    }
}

use gloss_core::{
    Error, ExplanationGenerator, ExtractRequest, ExtractSource, ExtractedText, LocatorConfig,
    Result, TextExtractor,
};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod explain;
pub mod extract;
pub mod ollama;
pub mod openai_compat;
pub mod prompt;
pub mod shellout;

use extract::ExtractLimits;
use shellout::{env, env_usize};

pub fn llm_timeout_ms_from_env() -> u64 {
    shellout::timeout_from_env_ms("GLOSS_LLM_TIMEOUT_MS", 60_000).as_millis() as u64
}

/// Upload ceiling in bytes (default 25 MiB).
pub fn max_upload_bytes_from_env() -> usize {
    env_usize("GLOSS_MAX_UPLOAD_BYTES", 25 * 1024 * 1024).clamp(1_024, 512 * 1024 * 1024)
}

pub fn locator_config_from_env() -> LocatorConfig {
    let d = LocatorConfig::default();
    LocatorConfig {
        min_highlight_chars: env_usize("GLOSS_MIN_HIGHLIGHT_CHARS", d.min_highlight_chars),
        probe_chars: env_usize("GLOSS_PROBE_CHARS", d.probe_chars),
        anchor_prefix_chars: d.anchor_prefix_chars,
        radius_chars: env_usize("GLOSS_WINDOW_RADIUS_CHARS", d.radius_chars),
        max_window_chars: env_usize("GLOSS_MAX_WINDOW_CHARS", d.max_window_chars),
        fallback_chars: env_usize("GLOSS_FALLBACK_CHARS", d.fallback_chars),
    }
    .sanitized()
}

pub fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("gloss-cache")
}

/// Cache dir from env: `GLOSS_CACHE=off` disables, `GLOSS_CACHE_DIR` overrides the location.
pub fn cache_dir_from_env() -> Option<PathBuf> {
    if matches!(
        env("GLOSS_CACHE").unwrap_or_default().to_ascii_lowercase().as_str(),
        "off" | "0" | "false" | "no"
    ) {
        return None;
    }
    Some(
        env("GLOSS_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_cache_dir),
    )
}

/// Filesystem cache of extracted text, keyed by the upload (bytes plus the content-type and
/// filename hints that pick the extraction path) and the extraction knobs.
#[derive(Debug, Clone)]
pub struct TextCache {
    root: PathBuf,
}

impl TextCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn key_for(req: &ExtractRequest, limits: &ExtractLimits) -> String {
        let txt_name = req
            .filename
            .as_deref()
            .is_some_and(|n| n.to_ascii_lowercase().ends_with(".txt"));
        let mut h = Sha256::new();
        h.update(b"gloss-extract-v2\n");
        h.update(limits.fingerprint().as_bytes());
        h.update(b"\nct:");
        h.update(extract::content_type_lc(req.content_type.as_deref()).as_bytes());
        h.update(if txt_name { b"\ntxt:1" } else { b"\ntxt:0" });
        h.update(b"\nbytes:");
        h.update(&req.bytes);
        hex::encode(h.finalize())
    }

    fn paths(&self, key: &str) -> (PathBuf, PathBuf) {
        let dir = self.root.join(&key[0..2]).join(&key[2..4]);
        let meta = dir.join(format!("{key}.json"));
        let body = dir.join(format!("{key}.txt"));
        (meta, body)
    }

    pub fn get(&self, req: &ExtractRequest, limits: &ExtractLimits) -> Result<Option<ExtractedText>> {
        let key = Self::key_for(req, limits);
        let (meta_p, body_p) = self.paths(&key);
        if !meta_p.exists() || !body_p.exists() {
            return Ok(None);
        }
        let meta_bytes = fs::read(&meta_p).map_err(|e| Error::Cache(e.to_string()))?;
        let text = fs::read_to_string(&body_p).map_err(|e| Error::Cache(e.to_string()))?;
        let meta: serde_json::Value =
            serde_json::from_slice(&meta_bytes).map_err(|e| Error::Cache(e.to_string()))?;

        let engine = meta
            .get("engine")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let truncated = meta
            .get("truncated")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let warnings = meta
            .get("warnings")
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|w| w.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(ExtractedText {
            engine,
            text,
            truncated,
            warnings,
            source: ExtractSource::Cache,
        }))
    }

    pub fn put(&self, req: &ExtractRequest, limits: &ExtractLimits, out: &ExtractedText) -> Result<()> {
        let key = Self::key_for(req, limits);
        let (meta_p, body_p) = self.paths(&key);
        if let Some(parent) = meta_p.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Cache(e.to_string()))?;
        }
        let now_s = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_secs();
        let meta = serde_json::json!({
            "schema_version": 1,
            "extracted_at_epoch_s": now_s,
            "engine": out.engine,
            "truncated": out.truncated,
            "warnings": out.warnings,
            "text_chars": out.text.chars().count(),
        });
        // Body first: a reader only trusts entries whose meta exists.
        fs::write(&body_p, out.text.as_bytes()).map_err(|e| Error::Cache(e.to_string()))?;
        fs::write(
            &meta_p,
            serde_json::to_vec(&meta).map_err(|e| Error::Cache(e.to_string()))?,
        )
        .map_err(|e| Error::Cache(e.to_string()))?;
        Ok(())
    }
}

/// PDF/plain-text extractor backed by `pdf-extract` and local shellout tools.
#[derive(Debug, Clone)]
pub struct LocalExtractor {
    cache: Option<TextCache>,
    limits: ExtractLimits,
}

impl LocalExtractor {
    pub fn new(cache_dir: Option<PathBuf>, limits: ExtractLimits) -> Self {
        Self {
            cache: cache_dir.map(TextCache::new),
            limits,
        }
    }

    pub fn from_env() -> Self {
        Self::new(cache_dir_from_env(), ExtractLimits::from_env())
    }
}

#[async_trait::async_trait]
impl TextExtractor for LocalExtractor {
    async fn extract(&self, req: &ExtractRequest) -> Result<ExtractedText> {
        let req = Arc::new(req.clone());

        if let Some(cache) = self.cache.clone() {
            let (r, limits) = (req.clone(), self.limits.clone());
            let hit = tokio::task::spawn_blocking(move || cache.get(&r, &limits))
                .await
                .map_err(|e| Error::Cache(format!("cache get join failed: {e}")));
            match hit {
                Ok(Ok(Some(hit))) => {
                    tracing::debug!(engine = %hit.engine, "extraction cache hit");
                    return Ok(hit);
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) | Err(e) => tracing::warn!(error = %e, "extraction cache read failed"),
            }
        }

        let (r, limits) = (req.clone(), self.limits.clone());
        let doc = tokio::task::spawn_blocking(move || {
            extract::extract_document_text(
                &r.bytes,
                r.content_type.as_deref(),
                r.filename.as_deref(),
                &limits,
            )
        })
        .await
        .map_err(|e| Error::Extraction(format!("extract join failed: {e}")))?
        .map_err(Error::Extraction)?;

        tracing::info!(
            engine = doc.engine,
            chars = doc.text_chars,
            truncated = doc.truncated,
            "extracted document text"
        );

        let mut out = ExtractedText {
            engine: doc.engine.to_string(),
            text: doc.text,
            truncated: doc.truncated,
            warnings: doc.warnings.iter().map(|w| w.to_string()).collect(),
            source: ExtractSource::Extractor,
        };

        if let Some(cache) = self.cache.clone() {
            let (r, limits, out2) = (req, self.limits.clone(), out.clone());
            let put = tokio::task::spawn_blocking(move || cache.put(&r, &limits, &out2))
                .await
                .map_err(|e| Error::Cache(format!("cache put join failed: {e}")));
            if let Ok(Err(e)) | Err(e) = put {
                tracing::warn!(error = %e, "extraction cache write failed");
                out.warnings.push("cache_put_failed".to_string());
            }
        }

        Ok(out)
    }
}

/// Pick an explanation generator.
///
/// `provider` (or `GLOSS_LLM_PROVIDER`): `auto` | `openai_compat` | `ollama`.
/// `auto` prefers an OpenAI-compatible endpoint, then an opted-in Ollama.
pub fn generator_from_env(
    client: reqwest::Client,
    provider: Option<&str>,
) -> Result<Arc<dyn ExplanationGenerator>> {
    let provider = provider
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .or_else(|| env("GLOSS_LLM_PROVIDER").map(|s| s.to_ascii_lowercase()))
        .unwrap_or_else(|| "auto".to_string());

    match provider.as_str() {
        "openai_compat" | "openai" => Ok(Arc::new(openai_compat::OpenAiCompatClient::from_env(
            client, None,
        )?)),
        "ollama" => Ok(Arc::new(ollama::OllamaClient::from_env(client)?)),
        "auto" => {
            if openai_compat::openai_compat_configured() {
                Ok(Arc::new(openai_compat::OpenAiCompatClient::from_env(
                    client, None,
                )?))
            } else if ollama::ollama_enabled() {
                Ok(Arc::new(ollama::OllamaClient::from_env(client)?))
            } else {
                Err(Error::NotConfigured(explain::NO_PROVIDER_HINT.to_string()))
            }
        }
        other => Err(Error::InvalidInput(format!(
            "unknown llm provider: {other:?} (allowed: auto, openai_compat, ollama)"
        ))),
    }
}

pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent("gloss-local/0.1")
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| Error::Llm(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use crate::shellout::ShelloutMode;
    use std::sync::Mutex;

    // Env vars are process-global; serialize tests that mutate them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn text_req(s: &str) -> ExtractRequest {
        ExtractRequest {
            bytes: s.as_bytes().to_vec(),
            content_type: Some("text/plain".to_string()),
            filename: Some("doc.txt".to_string()),
        }
    }

    fn limits() -> ExtractLimits {
        ExtractLimits {
            shellout: ShelloutMode::Off,
            ..ExtractLimits::default()
        }
    }

    #[tokio::test]
    async fn local_extractor_hits_cache_on_second_call() {
        let tmp = tempfile::tempdir().unwrap();
        let ex = LocalExtractor::new(Some(tmp.path().to_path_buf()), limits());

        let a = ex.extract(&text_req("hello cache")).await.unwrap();
        assert_eq!(a.source, ExtractSource::Extractor);
        assert_eq!(a.text, "hello cache");

        let b = ex.extract(&text_req("hello cache")).await.unwrap();
        assert_eq!(b.source, ExtractSource::Cache);
        assert_eq!(b.text, "hello cache");
        assert_eq!(b.engine, "text");

        let c = ex.extract(&text_req("other bytes")).await.unwrap();
        assert_eq!(c.source, ExtractSource::Extractor);
    }

    #[tokio::test]
    async fn cache_key_includes_extraction_limits() {
        let tmp = tempfile::tempdir().unwrap();
        let full = LocalExtractor::new(Some(tmp.path().to_path_buf()), limits());
        let clipped = LocalExtractor::new(
            Some(tmp.path().to_path_buf()),
            ExtractLimits {
                max_chars: 3,
                ..limits()
            },
        );
        full.extract(&text_req("abcdef")).await.unwrap();
        let out = clipped.extract(&text_req("abcdef")).await.unwrap();
        assert_eq!(out.source, ExtractSource::Extractor);
        assert_eq!(out.text, "abc");
        assert!(out.truncated);
    }

    #[tokio::test]
    async fn cache_key_includes_upload_hints() {
        let tmp = tempfile::tempdir().unwrap();
        let ex = LocalExtractor::new(Some(tmp.path().to_path_buf()), limits());
        // Not UTF-8 and not a PDF: only a text/* hint routes it to the text path.
        let bytes = b"caf\xe9 au lait".to_vec();

        let hinted = ex
            .extract(&ExtractRequest {
                bytes: bytes.clone(),
                content_type: Some("text/plain".to_string()),
                filename: None,
            })
            .await
            .unwrap();
        assert_eq!(hinted.engine, "text");

        let bare = ex
            .extract(&ExtractRequest {
                bytes: bytes.clone(),
                content_type: None,
                filename: None,
            })
            .await;
        assert!(matches!(bare, Err(Error::Extraction(_))));

        let named = ex
            .extract(&ExtractRequest {
                bytes,
                content_type: Some("application/octet-stream".to_string()),
                filename: Some("NOTES.TXT".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(named.source, ExtractSource::Extractor);
    }

    #[tokio::test]
    async fn extractor_without_cache_reports_errors() {
        let ex = LocalExtractor::new(None, limits());
        let err = ex
            .extract(&ExtractRequest {
                bytes: b"%PDF-1.4 garbage".to_vec(),
                content_type: Some("application/pdf".to_string()),
                filename: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[test]
    fn locator_config_reads_env_and_sanitizes() {
        let _g = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("GLOSS_MAX_WINDOW_CHARS", "100");
        std::env::set_var("GLOSS_FALLBACK_CHARS", "5000");
        std::env::set_var("GLOSS_MIN_HIGHLIGHT_CHARS", "not-a-number");
        let c = locator_config_from_env();
        std::env::remove_var("GLOSS_MAX_WINDOW_CHARS");
        std::env::remove_var("GLOSS_FALLBACK_CHARS");
        std::env::remove_var("GLOSS_MIN_HIGHLIGHT_CHARS");
        assert_eq!(c.max_window_chars, 100);
        assert_eq!(c.fallback_chars, 100);
        assert_eq!(c.min_highlight_chars, 8);
    }

    #[test]
    fn cache_dir_can_be_disabled() {
        let _g = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("GLOSS_CACHE", "off");
        assert!(cache_dir_from_env().is_none());
        std::env::set_var("GLOSS_CACHE", "on");
        std::env::set_var("GLOSS_CACHE_DIR", "/tmp/gloss-test-cache");
        assert_eq!(
            cache_dir_from_env(),
            Some(PathBuf::from("/tmp/gloss-test-cache"))
        );
        std::env::remove_var("GLOSS_CACHE");
        std::env::remove_var("GLOSS_CACHE_DIR");
    }

    #[test]
    fn generator_selection_respects_provider_and_env() {
        let _g = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        for k in [
            "GLOSS_LLM_PROVIDER",
            "GLOSS_OPENAI_COMPAT_BASE_URL",
            "GLOSS_OPENAI_COMPAT_MODEL",
            "GLOSS_OLLAMA_ENABLE",
        ] {
            std::env::remove_var(k);
        }
        let client = reqwest::Client::new();

        assert!(matches!(
            generator_from_env(client.clone(), None),
            Err(Error::NotConfigured(_))
        ));
        assert!(matches!(
            generator_from_env(client.clone(), Some("bard")),
            Err(Error::InvalidInput(_))
        ));

        std::env::set_var("GLOSS_OLLAMA_ENABLE", "1");
        let g = generator_from_env(client.clone(), None).unwrap();
        assert_eq!(g.name(), "ollama");

        std::env::set_var("GLOSS_OPENAI_COMPAT_BASE_URL", "http://127.0.0.1:9");
        // Base URL without a model is still a configuration error.
        assert!(matches!(
            generator_from_env(client.clone(), None),
            Err(Error::NotConfigured(_))
        ));
        std::env::set_var("GLOSS_OPENAI_COMPAT_MODEL", "m");
        let g = generator_from_env(client.clone(), None).unwrap();
        assert_eq!(g.name(), "openai_compat");
        let g = generator_from_env(client, Some("ollama")).unwrap();
        assert_eq!(g.name(), "ollama");

        for k in [
            "GLOSS_OPENAI_COMPAT_BASE_URL",
            "GLOSS_OPENAI_COMPAT_MODEL",
            "GLOSS_OLLAMA_ENABLE",
        ] {
            std::env::remove_var(k);
        }
    }

    proptest! {
        #[test]
        fn cache_key_is_hex_and_paths_never_panic(
            bytes in prop::collection::vec(any::<u8>(), 0..256),
            content_type in proptest::option::of("[a-zA-Z/;= -]{0,30}"),
            filename in proptest::option::of("[a-zA-Z._]{0,12}"),
            max_chars in 1usize..10_000_000,
        ) {
            let limits = ExtractLimits { max_chars, ..ExtractLimits::default() };
            let req = ExtractRequest { bytes, content_type, filename };
            let k = TextCache::key_for(&req, &limits);
            prop_assert_eq!(k.len(), 64);
            prop_assert!(k.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
            let cache = TextCache::new(std::env::temp_dir().join("gloss-proptest-cache"));
            let (_meta, _body) = cache.paths(&k);
        }
    }
}

use crate::shellout::{self, ShelloutMode};
use serde::Serialize;
use std::process::Command;

fn has_any_text(s: &str) -> bool {
    s.chars().any(|c| !c.is_whitespace())
}

/// Bounds applied to one extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractLimits {
    /// Hard cap on extracted chars.
    pub max_chars: usize,
    /// Page cap for shellout tools that support it.
    pub shellout_max_pages: usize,
    pub shellout_timeout_ms: u64,
    pub shellout: ShelloutMode,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            max_chars: 2_000_000,
            shellout_max_pages: 500,
            shellout_timeout_ms: 30_000,
            shellout: ShelloutMode::Auto,
        }
    }
}

impl ExtractLimits {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_chars: shellout::env_usize("GLOSS_EXTRACT_MAX_CHARS", d.max_chars)
                .clamp(1_000, 20_000_000),
            shellout_max_pages: shellout::env_usize(
                "GLOSS_PDF_SHELLOUT_MAX_PAGES",
                d.shellout_max_pages,
            )
            .clamp(1, 5_000),
            shellout_timeout_ms: shellout::timeout_from_env_ms(
                "GLOSS_PDF_SHELLOUT_TIMEOUT_MS",
                d.shellout_timeout_ms,
            )
            .as_millis() as u64,
            shellout: shellout::pdf_shellout_mode_from_env(),
        }
    }

    /// Stable fingerprint of the knobs that change extraction output (for cache keys).
    pub fn fingerprint(&self) -> String {
        format!(
            "max_chars={};pages={};shellout={}",
            self.max_chars,
            self.shellout_max_pages,
            self.shellout.as_str()
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractedDoc {
    pub engine: &'static str,
    pub text: String,
    pub text_chars: usize,
    pub truncated: bool,
    pub warnings: Vec<&'static str>,
}

/// Extract text from a PDF body (in-memory bytes) with the pure-Rust `pdf-extract`.
///
/// Quality varies by PDF (text layer vs scanned images).
pub fn pdf_to_text(bytes: &[u8]) -> Result<String, String> {
    // Some malformed PDFs make pdf-extract panic; treat that as an ordinary failure.
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(r) => r.map_err(|e| e.to_string()),
        Err(_) => Err("pdf-extract panicked".to_string()),
    }
}

fn pdf_to_text_shellout(
    bytes: &[u8],
    limits: &ExtractLimits,
) -> Result<(&'static str, String), &'static str> {
    if limits.shellout == ShelloutMode::Off {
        return Err("pdf_shellout_disabled");
    }

    let tmp = shellout::write_temp_file(bytes, ".pdf")?;
    let path = tmp.path().to_string_lossy().to_string();
    let timeout = std::time::Duration::from_millis(limits.shellout_timeout_ms);
    let max_stdout_bytes = limits.max_chars.saturating_mul(4).clamp(1_000, 80_000_000);

    let run = |bin: &str, args: &[&str]| -> Result<String, &'static str> {
        let mut cmd = Command::new(bin);
        cmd.args(args);
        let out = shellout::run_stdout_bounded(cmd, timeout, max_stdout_bytes)?;
        let s = String::from_utf8_lossy(&out).to_string();
        if !has_any_text(&s) {
            return Err("pdf_shellout_empty_output");
        }
        Ok(s)
    };

    let mut last_err = "pdf_shellout_failed";

    if matches!(limits.shellout, ShelloutMode::Auto | ShelloutMode::Pdftotext) {
        let last_page = limits.shellout_max_pages.to_string();
        match run(
            "pdftotext",
            &[
                "-f", "1", "-l", &last_page, "-nopgbrk", "-enc", "UTF-8", &path, "-",
            ],
        ) {
            Ok(s) => return Ok(("pdf-pdftotext", s)),
            Err(e) => last_err = e,
        }
        if limits.shellout == ShelloutMode::Pdftotext {
            return Err(last_err);
        }
    }

    if matches!(limits.shellout, ShelloutMode::Auto | ShelloutMode::Mutool) {
        match run("mutool", &["draw", "-F", "text", "-o", "-", &path]) {
            Ok(s) => return Ok(("pdf-mutool", s)),
            Err(e) => last_err = e,
        }
    }

    Err(last_err)
}

/// Best-effort sniff for PDF bytes (magic header, allowing leading junk some writers emit).
pub fn bytes_look_like_pdf(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(1024)];
    head.windows(5).any(|w| w == b"%PDF-")
}

/// Plain text we can pass straight through: valid UTF-8 with no NULs.
pub fn bytes_look_like_text(bytes: &[u8]) -> bool {
    !bytes.contains(&0) && std::str::from_utf8(bytes).is_ok()
}

pub(crate) fn content_type_lc(ct: Option<&str>) -> String {
    ct.unwrap_or("")
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

fn truncate_chars(mut s: String, max_chars: usize) -> (String, usize, bool) {
    let cut = s.char_indices().nth(max_chars).map(|(b, _)| b);
    match cut {
        Some(b) => {
            s.truncate(b);
            (s, max_chars, true)
        }
        None => {
            let n = s.chars().count();
            (s, n, false)
        }
    }
}

/// Extract document text from an upload.
///
/// - PDF (declared or sniffed): `pdf-extract`, then bounded `pdftotext`/`mutool` shellout when
///   that fails or yields no text.
/// - Plain text: passed through.
/// - Anything else: error.
pub fn extract_document_text(
    bytes: &[u8],
    content_type: Option<&str>,
    filename: Option<&str>,
    limits: &ExtractLimits,
) -> Result<ExtractedDoc, String> {
    if bytes.is_empty() {
        return Err("empty upload".to_string());
    }
    let ct = content_type_lc(content_type);
    let name_lc = filename.unwrap_or("").to_ascii_lowercase();
    let mut warnings: Vec<&'static str> = Vec::new();

    let is_pdf = bytes_look_like_pdf(bytes);
    if ct == "application/pdf" && !is_pdf {
        warnings.push("declared_pdf_missing_magic");
    }

    if !is_pdf && (ct.starts_with("text/") || name_lc.ends_with(".txt") || bytes_look_like_text(bytes))
    {
        let text = String::from_utf8_lossy(bytes).to_string();
        let (text, text_chars, truncated) = truncate_chars(text, limits.max_chars);
        if truncated {
            warnings.push("text_truncated");
        }
        return Ok(ExtractedDoc {
            engine: "text",
            text,
            text_chars,
            truncated,
            warnings,
        });
    }

    if !is_pdf {
        return Err(format!(
            "unsupported upload (content-type {:?}); expected a PDF",
            if ct.is_empty() { "unknown" } else { ct.as_str() }
        ));
    }

    let (engine, text) = match pdf_to_text(bytes) {
        Ok(t) if has_any_text(&t) => ("pdf-extract", t),
        other => {
            warnings.push(if other.is_ok() {
                "pdf_extract_empty"
            } else {
                "pdf_extract_failed"
            });
            match pdf_to_text_shellout(bytes, limits) {
                Ok((engine, t)) => {
                    warnings.push("pdf_shellout_used");
                    (engine, t)
                }
                Err(code) => {
                    warnings.push(code);
                    let detail = match other {
                        Err(e) => e,
                        Ok(_) => "no embedded text layer".to_string(),
                    };
                    return Err(format!(
                        "could not extract text from PDF: {detail} (shellout: {code})"
                    ));
                }
            }
        }
    };

    let (text, text_chars, truncated) = truncate_chars(text, limits.max_chars);
    if truncated {
        warnings.push("text_truncated");
    }
    Ok(ExtractedDoc {
        engine,
        text,
        text_chars,
        truncated,
        warnings,
    })
}

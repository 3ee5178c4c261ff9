//! Bounded shellouts to local PDF tools (`pdftotext`, `mutool`).
//!
//! - **Opportunistic**: used only when present on PATH.
//! - **Bounded**: timeouts + output caps.
//! - **Deterministic preference order**: `pdftotext` first, then `mutool`.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

pub(crate) fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub(crate) fn env_usize(key: &str, default: usize) -> usize {
    env(key)
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_bool(key: &str) -> bool {
    matches!(
        env(key).unwrap_or_default().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub fn timeout_from_env_ms(key: &str, default_ms: u64) -> Duration {
    let ms = env(key)
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default_ms)
        .clamp(50, 300_000);
    Duration::from_millis(ms)
}

pub fn which(bin: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let cand = dir.join(bin);
        if cand.is_file() {
            return Some(cand);
        }
        if cfg!(windows) {
            let cand = dir.join(format!("{bin}.exe"));
            if cand.is_file() {
                return Some(cand);
            }
        }
    }
    None
}

pub fn has(bin: &str) -> bool {
    which(bin).is_some()
}

/// Run a command and capture stdout (bounded) with a coarse timeout.
///
/// Does not stream; fine for one-shot converters like `pdftotext`.
pub fn run_stdout_bounded(
    mut cmd: Command,
    timeout: Duration,
    max_stdout_bytes: usize,
) -> Result<Vec<u8>, &'static str> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            "pdf_shellout_tool_not_found"
        } else {
            "pdf_shellout_spawn_failed"
        }
    })?;

    // Drain stdout on a thread so a chatty child can't block on a full pipe.
    let reader = child.stdout.take().map(|s| {
        std::thread::spawn(move || {
            use std::io::Read;
            let mut out = Vec::new();
            let r = s.take(max_stdout_bytes as u64).read_to_end(&mut out);
            r.map(|_| out)
        })
    });

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().map_err(|_| "pdf_shellout_wait_failed")? {
            if !status.success() {
                return Err("pdf_shellout_nonzero_exit");
            }
            break;
        }
        if start.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err("pdf_shellout_timeout");
        }
        std::thread::sleep(Duration::from_millis(25));
    }

    match reader {
        Some(h) => h
            .join()
            .map_err(|_| "pdf_shellout_read_failed")?
            .map_err(|_| "pdf_shellout_read_failed"),
        None => Ok(Vec::new()),
    }
}

pub fn write_temp_file(
    bytes: &[u8],
    suffix: &str,
) -> Result<tempfile::NamedTempFile, &'static str> {
    let mut tmp = tempfile::Builder::new()
        .prefix("gloss-")
        .suffix(suffix)
        .tempfile()
        .map_err(|_| "pdf_shellout_tempfile_failed")?;
    use std::io::Write;
    tmp.write_all(bytes)
        .map_err(|_| "pdf_shellout_tempfile_write_failed")?;
    Ok(tmp)
}

/// Which shellout tools may be tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShelloutMode {
    Off,
    Auto,
    Pdftotext,
    Mutool,
}

impl ShelloutMode {
    pub fn parse(s: Option<&str>) -> Self {
        match s.map(|s| s.to_ascii_lowercase()).as_deref() {
            Some("off") | Some("0") | Some("false") => ShelloutMode::Off,
            Some("pdftotext") => ShelloutMode::Pdftotext,
            Some("mutool") => ShelloutMode::Mutool,
            // Unknown value: treat as auto.
            _ => ShelloutMode::Auto,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShelloutMode::Off => "off",
            ShelloutMode::Auto => "auto",
            ShelloutMode::Pdftotext => "pdftotext",
            ShelloutMode::Mutool => "mutool",
        }
    }
}

pub fn pdf_shellout_mode_from_env() -> ShelloutMode {
    ShelloutMode::parse(env("GLOSS_PDF_SHELLOUT").as_deref())
}

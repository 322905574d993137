//! HTTP exchange log
//!
//! When `XYZ_HTTP_LOG` is set to a truthy value every hub request is appended,
//! together with its response or transport error, to
//! `.xyzcli-log/http_requests.log` in the working directory. Credentials in
//! headers are masked and large bodies truncated.

use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use chrono::Local;
use tracing::warn;

const ENV_HTTP_LOG: &str = "XYZ_HTTP_LOG";

const LOG_DIR: &str = ".xyzcli-log";
const LOG_FILE: &str = "http_requests.log";

/// Bodies longer than this many bytes are cut
const BODY_LIMIT: usize = 10_000;

const MASKED_HEADERS: [&str; 6] = [
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
    "x-auth-token",
];

/// Serialises appends from concurrent chunk uploads
static WRITE_LOCK: Mutex<()> = Mutex::new(());

/// Whether exchanges are being logged; read from the environment once
pub fn is_enabled() -> bool {
    static FLAG: OnceLock<bool> = OnceLock::new();
    *FLAG.get_or_init(|| match std::env::var(ENV_HTTP_LOG) {
        Ok(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    })
}

/// Request body as it should appear in the log
pub enum LoggedBody<'a> {
    Text(&'a str),
    /// Compressed bodies are summarised, not dumped
    Gzip { compressed: usize, original: usize },
}

/// Outgoing side of an exchange
pub struct HttpRequestLog<'a> {
    pub method: &'a str,
    pub url: &'a str,
    pub headers: Vec<(String, String)>,
    pub body: Option<LoggedBody<'a>>,
}

/// Incoming side of an exchange
pub struct HttpResponseLog<'a> {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<&'a str>,
}

/// Append one exchange to the log file. Does nothing unless enabled.
pub fn log_request(
    request: &HttpRequestLog<'_>,
    response: Option<&HttpResponseLog<'_>>,
    duration_ms: u64,
    error: Option<&str>,
) {
    if !is_enabled() {
        return;
    }

    let entry = render_entry(request, response, duration_ms, error);
    if let Err(e) = append(&entry) {
        warn!("Could not write {}/{}: {}", LOG_DIR, LOG_FILE, e);
    }
}

/// Render one exchange as a text block
pub fn render_entry(
    request: &HttpRequestLog<'_>,
    response: Option<&HttpResponseLog<'_>>,
    duration_ms: u64,
    error: Option<&str>,
) -> String {
    let rule = "=".repeat(80);
    let mut out = String::new();

    // Writing into a String cannot fail
    let _ = writeln!(out, "\n{rule}");
    let _ = writeln!(
        out,
        "[{}] {} {}",
        Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
        request.method,
        request.url
    );
    let _ = writeln!(out, "{rule}");

    write_headers(&mut out, "Request Headers", &request.headers);
    match &request.body {
        Some(LoggedBody::Text(text)) => write_section(&mut out, "Request Body", &pretty_body(text)),
        Some(LoggedBody::Gzip {
            compressed,
            original,
        }) => write_section(
            &mut out,
            "Request Body",
            &format!("<gzip: {compressed} bytes, {original} bytes uncompressed>"),
        ),
        None => {}
    }

    if let Some(response) = response {
        write_section(
            &mut out,
            &format!("Response ({duration_ms}ms)"),
            &format!("Status: {}", response.status),
        );
        write_headers(&mut out, "Response Headers", &response.headers);
        if let Some(body) = response.body {
            write_section(&mut out, "Response Body", &pretty_body(body));
        }
    }

    if let Some(error) = error {
        write_section(&mut out, &format!("Error ({duration_ms}ms)"), error);
    }

    let _ = writeln!(out, "\n{rule}");
    out
}

fn write_section(out: &mut String, title: &str, content: &str) {
    let _ = writeln!(out, "\n--- {title} ---");
    let _ = writeln!(out, "{content}");
}

fn write_headers(out: &mut String, title: &str, headers: &[(String, String)]) {
    let _ = writeln!(out, "\n--- {title} ---");
    for (name, value) in headers {
        if is_sensitive_header(name) {
            let _ = writeln!(out, "{}: {}", name, mask_token(value));
        } else {
            let _ = writeln!(out, "{name}: {value}");
        }
    }
}

fn append(entry: &str) -> std::io::Result<()> {
    let _guard = WRITE_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    let dir = PathBuf::from(LOG_DIR);
    fs::create_dir_all(&dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE))?
        .write_all(entry.as_bytes())
}

/// Whether a header carries credentials
pub fn is_sensitive_header(name: &str) -> bool {
    MASKED_HEADERS
        .iter()
        .any(|masked| masked.eq_ignore_ascii_case(name))
}

/// Mask a credential, keeping the first and last four characters of long values
pub fn mask_token(value: &str) -> String {
    let (prefix, token) = match value.strip_prefix("Bearer ") {
        Some(token) => ("Bearer ", token),
        None => ("", value),
    };

    let chars: Vec<char> = token.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}{}...{}", prefix, head, tail)
    } else {
        format!("{}****", prefix)
    }
}

/// JSON bodies are pretty-printed; everything is capped at the body limit
fn pretty_body(body: &str) -> String {
    let rendered = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| serde_json::to_string_pretty(&json).ok());
    truncate_utf8_safe(rendered.as_deref().unwrap_or(body), BODY_LIMIT)
}

/// Cut `s` to at most `max_len` bytes without splitting a character
pub fn truncate_utf8_safe(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }

    let cut = (0..=max_len)
        .rev()
        .find(|&i| s.is_char_boundary(i))
        .unwrap_or(0);
    format!("{}...\n[truncated, total {} bytes]", &s[..cut], s.len())
}

/// Response headers as printable pairs
pub fn extract_response_headers(response: &reqwest::Response) -> Vec<(String, String)> {
    response
        .headers()
        .iter()
        .map(|(name, value)| {
            let value = value.to_str().unwrap_or("<binary>");
            (name.as_str().to_string(), value.to_string())
        })
        .collect()
}

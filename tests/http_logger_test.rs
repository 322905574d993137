//! Tests for the HTTP request logger helpers

use xyzmaps::http_logger::{
    is_sensitive_header, mask_token, render_entry, truncate_utf8_safe, HttpRequestLog,
    HttpResponseLog, LoggedBody,
};

#[test]
fn test_is_sensitive_header() {
    assert!(is_sensitive_header("Authorization"));
    assert!(is_sensitive_header("COOKIE"));
    assert!(is_sensitive_header("x-api-key"));
    assert!(!is_sensitive_header("Content-Type"));
    assert!(!is_sensitive_header("x-request-id"));
}

#[test]
fn test_mask_token() {
    assert_eq!(mask_token("Bearer abcdefghijkl"), "Bearer abcd...ijkl");
    assert_eq!(mask_token("Bearer short"), "Bearer ****");
    assert_eq!(mask_token("0123456789"), "0123...6789");
    assert_eq!(mask_token("tiny"), "****");
}

#[test]
fn test_truncate_utf8_safe() {
    assert_eq!(truncate_utf8_safe("hello", 10), "hello");

    // 'é' is two bytes; cutting at 2 would split it
    let truncated = truncate_utf8_safe("aébc", 2);
    assert!(truncated.starts_with("a..."));
    assert!(truncated.contains("total 5 bytes"));
}

#[test]
fn test_render_entry_with_response() {
    let request = HttpRequestLog {
        method: "PUT",
        url: "http://hub/spaces/s1/features",
        headers: vec![
            ("Authorization".to_string(), "Bearer secret-token-value".to_string()),
            ("Content-Type".to_string(), "application/geo+json".to_string()),
        ],
        body: Some(LoggedBody::Gzip {
            compressed: 120,
            original: 900,
        }),
    };
    let response = HttpResponseLog {
        status: 413,
        headers: vec![("content-type".to_string(), "text/plain".to_string())],
        body: Some("Request Entity Too Large"),
    };

    let entry = render_entry(&request, Some(&response), 42, None);

    assert!(entry.contains("PUT http://hub/spaces/s1/features"));
    assert!(entry.contains("Authorization: Bearer secr...alue"));
    assert!(!entry.contains("secret-token-value"));
    assert!(entry.contains("<gzip: 120 bytes, 900 bytes uncompressed>"));
    assert!(entry.contains("--- Response (42ms) ---"));
    assert!(entry.contains("Status: 413"));
    assert!(entry.contains("Request Entity Too Large"));
    assert!(!entry.contains("--- Error"));
}

#[test]
fn test_render_entry_with_error() {
    let request = HttpRequestLog {
        method: "GET",
        url: "http://hub/spaces",
        headers: Vec::new(),
        body: None,
    };

    let entry = render_entry(&request, None, 7, Some("connection refused"));

    assert!(entry.contains("GET http://hub/spaces"));
    assert!(!entry.contains("--- Request Body ---"));
    assert!(!entry.contains("--- Response"));
    assert!(entry.contains("--- Error (7ms) ---"));
    assert!(entry.contains("connection refused"));
}

#[test]
fn test_render_entry_pretty_prints_json_body() {
    let request = HttpRequestLog {
        method: "POST",
        url: "http://hub/spaces",
        headers: Vec::new(),
        body: Some(LoggedBody::Text("{\"title\":\"roads\"}")),
    };

    let entry = render_entry(&request, None, 0, None);

    assert!(entry.contains("\"title\": \"roads\""));
}

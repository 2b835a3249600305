use super::*;
use axum::http::HeaderValue;

fn headers(value: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(v) = value {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(v).unwrap());
    }
    headers
}

#[test]
fn bearer_token_must_match() {
    assert!(is_authorized(&headers(Some("Bearer secret")), "secret"));
    assert!(!is_authorized(&headers(Some("Bearer other")), "secret"));
}

#[test]
fn missing_or_malformed_header_is_rejected() {
    assert!(!is_authorized(&headers(None), "secret"));
    assert!(!is_authorized(&headers(Some("secret")), "secret"));
    assert!(!is_authorized(&headers(Some("Basic secret")), "secret"));
}

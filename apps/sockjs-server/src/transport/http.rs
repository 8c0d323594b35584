//! Header policy shared by every SockJS HTTP endpoint: caching, CORS and
//! the sticky-session cookie.

use axum::extract::Request;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, ACCESS_CONTROL_REQUEST_HEADERS,
    CACHE_CONTROL, COOKIE, EXPIRES, ORIGIN, SET_COOKIE,
};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

pub const NO_CACHE: &str = "no-store, no-cache, no-transform, must-revalidate, max-age=0";

/// One year, in seconds.
pub const CACHE_MAX_AGE: i64 = 31_536_000;

pub const CACHE_PUBLIC: &str = "public, max-age=31536000";

pub const PLAIN_TEXT: &str = "text/plain; charset=UTF-8";

const COOKIE_NAME: &str = "JSESSIONID";

/// HTTP date one year from now, for `Expires`.
pub fn expires_in_a_year() -> String {
    (chrono::Utc::now() + chrono::Duration::seconds(CACHE_MAX_AGE))
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Answer a CORS preflight for an endpoint serving `methods`.
pub fn preflight(methods: &'static str) -> Response {
    (
        StatusCode::NO_CONTENT,
        [
            (CACHE_CONTROL, CACHE_PUBLIC.to_string()),
            (EXPIRES, expires_in_a_year()),
            (ACCESS_CONTROL_ALLOW_METHODS, methods.to_string()),
            (ACCESS_CONTROL_MAX_AGE, CACHE_MAX_AGE.to_string()),
        ],
    )
        .into_response()
}

/// Add CORS headers the handler did not set itself.
pub async fn cors(req: Request, next: Next) -> Response {
    let origin = req.headers().get(ORIGIN).cloned();
    let requested_headers = req
        .headers()
        .get(ACCESS_CONTROL_REQUEST_HEADERS)
        .filter(|v| !v.is_empty())
        .cloned();

    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();
    if !headers.contains_key(ACCESS_CONTROL_ALLOW_ORIGIN) {
        match origin {
            Some(origin) => {
                headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
                headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
            }
            None => {
                headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
            }
        }
    }
    if let Some(requested) = requested_headers {
        if !headers.contains_key(ACCESS_CONTROL_ALLOW_HEADERS) {
            headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, requested);
        }
    }
    resp
}

/// Set `JSESSIONID` on session responses, echoing the client's value when
/// it sent one.
pub async fn jsessionid(req: Request, next: Next) -> Response {
    let value = cookie_value(req.headers(), COOKIE_NAME).unwrap_or_else(|| "dummy".to_string());
    let mut resp = next.run(req).await;
    match HeaderValue::from_str(&format!("{COOKIE_NAME}={value}; path=/")) {
        Ok(cookie) => {
            resp.headers_mut().insert(SET_COOKIE, cookie);
        }
        Err(err) => tracing::debug!(%err, "unusable JSESSIONID value"),
    }
    resp
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("a=1; JSESSIONID=abcdef; b=2"));
        assert_eq!(cookie_value(&headers, "JSESSIONID").as_deref(), Some("abcdef"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn preflight_is_cacheable() {
        let resp = preflight("OPTIONS, POST");
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        let headers = resp.headers();
        assert_eq!(headers[CACHE_CONTROL], CACHE_PUBLIC);
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_METHODS], "OPTIONS, POST");
        assert_eq!(headers[ACCESS_CONTROL_MAX_AGE], "31536000");
        assert!(headers[EXPIRES].to_str().unwrap().ends_with(" GMT"));
    }
}

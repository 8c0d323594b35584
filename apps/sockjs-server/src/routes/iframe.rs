//! The hidden iframe page used by iframe-based transports on the client.

use axum::extract::{Path, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, EXPIRES, IF_NONE_MATCH};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use sha2::{Digest, Sha256};

use crate::transport::http::{expires_in_a_year, preflight, CACHE_PUBLIC};
use crate::ServiceState;

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta http-equiv="X-UA-Compatible" content="IE=edge" />
  <meta http-equiv="Content-Type" content="text/html; charset=UTF-8" />
  <script src="{{ sockjs_url }}"></script>
  <script>
    document.domain = document.domain;
    SockJS.bootstrap_iframe();
  </script>
</head>
<body>
  <h2>Don't panic!</h2>
  <p>This is a SockJS hidden iframe. It's used for cross domain magic.</p>
</body>
</html>"#;

/// Rendered iframe page and its entity tag.
#[derive(Debug, Clone)]
pub struct IframePage {
    html: String,
    etag: String,
}

impl IframePage {
    pub fn new(library_url: &str) -> Self {
        let html = TEMPLATE.replace("{{ sockjs_url }}", library_url);
        let digest = Sha256::digest(html.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        Self {
            html,
            etag: format!("\"{hex}\""),
        }
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn etag(&self) -> &str {
        &self.etag
    }
}

/// `iframe.html` or a versioned `iframe-<anything>.html`.
fn is_iframe_name(name: &str) -> bool {
    name == "iframe.html" || (name.starts_with("iframe-") && name.ends_with(".html"))
}

pub fn router() -> Router<ServiceState> {
    // The router allows one parameter name per position, shared with the
    // session routes.
    Router::new().route(
        "/{server_id}",
        get(page).options(|Path(name): Path<String>| async move {
            if is_iframe_name(&name) {
                preflight("OPTIONS, GET")
            } else {
                StatusCode::NOT_FOUND.into_response()
            }
        }),
    )
}

async fn page(
    State(state): State<ServiceState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !is_iframe_name(&name) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let iframe = &state.iframe;
    let cached = headers
        .get(IF_NONE_MATCH)
        .is_some_and(|v| v.as_bytes() == iframe.etag().as_bytes());
    if cached {
        return StatusCode::NOT_MODIFIED.into_response();
    }

    (
        [
            (CONTENT_TYPE, "text/html; charset=UTF-8".to_string()),
            (CACHE_CONTROL, CACHE_PUBLIC.to_string()),
            (EXPIRES, expires_in_a_year()),
            (ETAG, iframe.etag().to_string()),
        ],
        iframe.html().to_string(),
    )
        .into_response()
}

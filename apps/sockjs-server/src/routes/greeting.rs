use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;

use crate::transport::http::PLAIN_TEXT;

pub const GREETING: &str = "Welcome to SockJS!\n";

pub async fn greeting() -> impl IntoResponse {
    ([(CONTENT_TYPE, PLAIN_TEXT)], GREETING)
}

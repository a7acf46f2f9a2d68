//! Static assets for the viewer page.
//!
//! Files come from the configured directory through `ServeDir`. When that
//! directory has no `index.html`, the page bundled into the binary is served
//! at `/`.

use axum::{
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
};

const BUNDLED_INDEX: &str = include_str!("../static/index.html");

/// Fallback for the asset directory when it has no matching file.
pub async fn bundled_index(uri: Uri) -> Response {
    match uri.path() {
        "/" | "/index.html" => (
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            BUNDLED_INDEX,
        )
            .into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

mod middleware;
mod public;

pub use public::{HttpState, build_router};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

async fn health() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

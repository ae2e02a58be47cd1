mod health;
mod items;

use axum::{http::StatusCode, Router};
use theday_core::Error;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/health", health::router())
        .nest("/items", items::router())
}

/// Map a core error onto a response; store failures are logged and reported generically
fn error_response(e: Error) -> (StatusCode, String) {
    let status = match &e {
        Error::ItemNotFound(_) => StatusCode::NOT_FOUND,
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        _ => {
            tracing::error!(error = %e, "Request failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error".to_string(),
            );
        }
    };
    (status, e.to_string())
}

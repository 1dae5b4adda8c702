use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use chrono::Utc;

use crate::auth::oauth::{issue_token, TokenRequest};
use crate::AppState;

/// `POST /oauth/token`
pub async fn token(State(state): State<AppState>, Form(request): Form<TokenRequest>) -> Response {
    let issued = issue_token(
        state.store.as_ref(),
        request,
        state.config.token_ttl_secs,
        Utc::now(),
    )
    .await;
    match issued {
        Ok(token) => Json(token).into_response(),
        Err(err) => {
            tracing::info!("Token request rejected: {}", err.error);
            (err.status(), Json(err)).into_response()
        }
    }
}

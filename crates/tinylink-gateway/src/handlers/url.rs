use crate::error::{AppError, Result};
use crate::model::{BatchRequestItem, BatchResponseItem, ShortenRequest, ShortenResponse, UserUrl};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Extension, Json};
use serde::de::DeserializeOwned;
use tinylink_core::{Resolution, ShortCode, Shortened, UserId};
use tracing::debug;

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("malformed JSON: {e}")))
}

/// 201 for a new code, 409 when the url was already shortened.
fn creation_status(shortened: &Shortened) -> StatusCode {
    if shortened.is_existing() {
        StatusCode::CONFLICT
    } else {
        StatusCode::CREATED
    }
}

pub async fn redirect_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response> {
    // A malformed code can never have been issued.
    let code = ShortCode::new(code).map_err(|_| AppError::NotFound)?;

    match state.shortener().resolve(&code).await? {
        Resolution::Active(original_url) => {
            debug!(code = %code, "redirecting");
            Ok(Redirect::temporary(&original_url).into_response())
        }
        Resolution::Deleted => Ok(StatusCode::GONE.into_response()),
        Resolution::Missing => Err(AppError::NotFound),
    }
}

/// `POST /` with the url as the raw body; answers with the short url as text.
pub async fn create_plain_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    body: String,
) -> Result<Response> {
    let original_url = body.trim();
    if original_url.is_empty() {
        return Err(AppError::BadRequest("empty body".to_string()));
    }

    let shortened = state.shortener().shorten(&user, original_url).await?;
    Ok((
        creation_status(&shortened),
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.short_url(shortened.code()),
    )
        .into_response())
}

pub async fn create_json_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    body: Bytes,
) -> Result<Response> {
    let request: ShortenRequest = parse_json(&body)?;

    let shortened = state.shortener().shorten(&user, request.url.trim()).await?;
    let response = ShortenResponse {
        result: state.short_url(shortened.code()),
    };
    Ok((creation_status(&shortened), Json(response)).into_response())
}

pub async fn create_batch_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    body: Bytes,
) -> Result<Response> {
    let items: Vec<BatchRequestItem> = parse_json(&body)?;
    let urls: Vec<String> = items
        .iter()
        .map(|item| item.original_url.trim().to_string())
        .collect();

    let codes = state.shortener().shorten_batch(&user, &urls).await?;
    let response: Vec<BatchResponseItem> = items
        .into_iter()
        .zip(codes)
        .map(|(item, code)| BatchResponseItem {
            correlation_id: item.correlation_id,
            short_url: state.short_url(&code),
        })
        .collect();

    Ok((StatusCode::CREATED, Json(response)).into_response())
}

pub async fn list_urls_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
) -> Result<Response> {
    let urls = state.shortener().list(&user).await?;
    if urls.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let response: Vec<UserUrl> = urls
        .into_iter()
        .map(|(code, original_url)| UserUrl {
            short_url: state.short_url(&code),
            original_url,
        })
        .collect();
    Ok(Json(response).into_response())
}

/// Queues soft deletion and answers before it is applied.
pub async fn delete_urls_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserId>,
    body: Bytes,
) -> Result<StatusCode> {
    let raw: Vec<String> = parse_json(&body)?;
    let codes = raw
        .into_iter()
        .map(ShortCode::new)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    state.shortener().delete(&user, codes).await?;
    Ok(StatusCode::ACCEPTED)
}

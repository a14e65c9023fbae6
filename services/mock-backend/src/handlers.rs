use axum::{
    extract::{Multipart, Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{AuthorizeRequest, UserCreate};
use crate::service::{self, ServiceError};
use crate::state::{AppState, JobKind, Upload, UploadedFile};

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

pub async fn readyz() -> StatusCode {
    StatusCode::OK
}

fn respond<T: Serialize>(result: Result<T, ServiceError>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(err) => (err.status, Json(err.body)).into_response(),
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ServiceError> {
    let bad_request = |err: axum::extract::multipart::MultipartError| {
        ServiceError::new(
            StatusCode::BAD_REQUEST,
            "invalid_multipart",
            format!("failed to read multipart body: {err}"),
        )
    };

    let mut upload = Upload::default();
    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "conversation" => {
                upload.conversation = Some(field.text().await.map_err(bad_request)?);
            }
            "app_bundle" => {
                upload.app_bundle = Some(field.text().await.map_err(bad_request)?);
            }
            "files" | "file" | "image" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(bad_request)?.to_vec();
                tracing::debug!(
                    field = %name,
                    filename = %filename,
                    size_bytes = data.len(),
                    "received file"
                );
                upload.files.push(UploadedFile {
                    field: name.clone(),
                    filename,
                    content_type,
                    data,
                });
            }
            other => tracing::debug!(field = %other, "ignoring multipart field"),
        }
    }
    Ok(upload)
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<UserCreate>,
) -> Response {
    respond(service::register_user(&state, payload).await)
}

pub async fn authorize_user(
    State(state): State<AppState>,
    Json(payload): Json<AuthorizeRequest>,
) -> Response {
    respond(service::authorize_user(&state, payload.user_id).await)
}

pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> Response {
    respond(service::current_user(&state, bearer(&headers)).await)
}

pub async fn create_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let result = match read_upload(multipart).await {
        Ok(upload) => {
            service::create_analysis(&state, bearer(&headers), JobKind::Analysis, upload).await
        }
        Err(err) => Err(err),
    };
    respond(result)
}

pub async fn create_place_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let result = match read_upload(multipart).await {
        Ok(upload) => {
            service::create_analysis(&state, bearer(&headers), JobKind::Place, upload).await
        }
        Err(err) => Err(err),
    };
    respond(result)
}

pub async fn get_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Response {
    respond(service::get_analysis(&state, bearer(&headers), id).await)
}

pub async fn create_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let result = match read_upload(multipart).await {
        Ok(upload) => service::create_search(&state, bearer(&headers), upload).await,
        Err(err) => Err(err),
    };
    respond(result)
}

pub async fn get_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Response {
    respond(service::get_search(&state, bearer(&headers), id).await)
}

//! HTTP handlers for file and image uploads and their metadata.
//! Multipart bodies are read field by field and capped at the upload
//! ceiling; the actual pipeline lives in `IngestService`.

use crate::{
    errors::AppError,
    models::resource::{ResourceType, UploadedResource},
    services::ingest::{IngestError, IngestOutcome, IngestRequest, MAX_UPLOAD_BYTES},
    state::AppState,
};
use axum::{
    Json,
    extract::{
        Path, Query, State,
        multipart::{Field, Multipart, MultipartError, MultipartRejection},
        rejection::QueryRejection,
    },
    http::StatusCode,
};
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

const DEFAULT_LIST_LIMIT: i64 = 20;
const MAX_LIST_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct ListFilesQuery {
    pub limit: Option<i64>,
}

/// Entry of `/api/files/list`.
#[derive(Debug, Serialize)]
pub struct FileSummary {
    pub resource_type: ResourceType,
    pub resource_key: String,
    pub original_name: String,
    pub file_size: i64,
    pub md5_hash: String,
    pub upload_time: String,
}

/// Body of `/api/files/{resource_key}`.
#[derive(Debug, Serialize)]
pub struct FileDetail {
    pub resource_type: ResourceType,
    pub resource_key: String,
    pub original_name: String,
    pub file_size: i64,
    pub md5_hash: String,
    pub sha256_hash: String,
    pub upload_time: String,
    pub upload_user_id: Option<String>,
    pub api_response: String,
}

impl From<UploadedResource> for FileSummary {
    fn from(r: UploadedResource) -> Self {
        let upload_time = format_time(&r);
        Self {
            resource_type: r.resource_type,
            resource_key: r.resource_key,
            original_name: r.original_name.unwrap_or_default(),
            file_size: r.file_size.unwrap_or_default(),
            md5_hash: r.md5_hash.unwrap_or_default(),
            upload_time,
        }
    }
}

impl From<UploadedResource> for FileDetail {
    fn from(r: UploadedResource) -> Self {
        let upload_time = format_time(&r);
        Self {
            resource_type: r.resource_type,
            resource_key: r.resource_key,
            original_name: r.original_name.unwrap_or_default(),
            file_size: r.file_size.unwrap_or_default(),
            md5_hash: r.md5_hash.unwrap_or_default(),
            sha256_hash: r.sha256_hash.unwrap_or_default(),
            upload_time,
            upload_user_id: r.upload_user_id,
            api_response: r.feishu_api_response.unwrap_or_default(),
        }
    }
}

fn format_time(r: &UploadedResource) -> String {
    r.upload_time.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// `POST /api/files/upload`: multipart field `file`, optional `duration`
/// (milliseconds) and `upload_user_id`.
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, AppError> {
    upload(state, multipart, ResourceType::File, "file").await
}

/// `POST /api/files/upload-image`: multipart field `image`.
pub async fn upload_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, AppError> {
    upload(state, multipart, ResourceType::Image, "image").await
}

async fn upload(
    state: AppState,
    multipart: Result<Multipart, MultipartRejection>,
    resource_type: ResourceType,
    file_field: &'static str,
) -> Result<Json<Value>, AppError> {
    let multipart = multipart.map_err(|rej| IngestError::BadRequest(rej.body_text()))?;
    let form = read_upload_form(multipart, file_field)
        .await
        .inspect_err(|err| warn!("{} upload rejected: {}", resource_type, err))?;

    info!(
        filename = %form.filename,
        size = form.payload.len(),
        "received {} upload",
        resource_type
    );

    let outcome = state
        .ingest
        .ingest(IngestRequest {
            resource_type,
            filename: form.filename,
            payload: form.payload,
            duration_ms: form.duration_ms,
            upload_user_id: form.upload_user_id,
        })
        .await?;
    if let Some(category) = outcome.category {
        debug!(resource_key = %outcome.resource_key, %category, "stored file");
    }

    Ok(Json(upload_response(&outcome)))
}

fn upload_response(outcome: &IngestOutcome) -> Value {
    let mut data = Map::new();
    data.insert(
        outcome.resource_type.key_field().to_string(),
        Value::String(outcome.resource_key.clone()),
    );
    data.insert("md5".into(), Value::String(outcome.fingerprint.md5.clone()));
    data.insert(
        "sha256".into(),
        Value::String(outcome.fingerprint.sha256.clone()),
    );
    json!({ "success": true, "data": data })
}

struct UploadForm {
    filename: String,
    payload: Bytes,
    duration_ms: Option<u32>,
    upload_user_id: Option<String>,
}

async fn read_upload_form(
    mut multipart: Multipart,
    file_field: &'static str,
) -> Result<UploadForm, IngestError> {
    let mut file = None;
    let mut duration_ms = None;
    let mut upload_user_id = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            n if n == file_field => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let payload = read_capped(field, MAX_UPLOAD_BYTES).await?;
                file = Some((filename, payload));
            }
            "duration" => {
                let text = field.text().await.map_err(multipart_error)?;
                let text = text.trim();
                if !text.is_empty() {
                    let ms = text.parse::<u32>().map_err(|_| {
                        IngestError::BadRequest(format!("invalid duration `{}`", text))
                    })?;
                    duration_ms = Some(ms);
                }
            }
            "upload_user_id" => {
                let text = field.text().await.map_err(multipart_error)?;
                let text = text.trim();
                if !text.is_empty() {
                    upload_user_id = Some(text.to_string());
                }
            }
            _ => {}
        }
    }

    let (filename, payload) = file.ok_or(IngestError::MissingField(file_field))?;
    Ok(UploadForm {
        filename,
        payload,
        duration_ms,
        upload_user_id,
    })
}

/// Buffer one field, giving up as soon as it grows past `limit`.
async fn read_capped(mut field: Field<'_>, limit: usize) -> Result<Bytes, IngestError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if buf.len() + chunk.len() > limit {
            return Err(IngestError::TooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

fn multipart_error(err: MultipartError) -> IngestError {
    let status = err.status();
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        IngestError::TooLarge {
            limit: MAX_UPLOAD_BYTES,
        }
    } else if status.is_client_error() {
        IngestError::BadRequest(err.body_text())
    } else {
        IngestError::Read(err.body_text())
    }
}

/// `GET /api/files/list?limit=N`
pub async fn list_files(
    State(state): State<AppState>,
    query: Result<Query<ListFilesQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let Query(q) = query?;
    let limit = q.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);

    let files: Vec<FileSummary> = state
        .store
        .list_recent(limit)
        .await?
        .into_iter()
        .map(FileSummary::from)
        .collect();

    Ok(Json(json!({ "success": true, "data": files })))
}

/// `GET /api/files/{resource_key}`
pub async fn get_file(
    State(state): State<AppState>,
    Path(resource_key): Path<String>,
) -> Result<Json<Value>, AppError> {
    let detail = FileDetail::from(state.store.find_by_key(&resource_key).await?);
    Ok(Json(json!({ "success": true, "data": detail })))
}

/// `GET /api/files/{resource_key}/view`
///
/// Feishu has no public URL for uploaded images; they can only be viewed by
/// sending them in a message or inside the Feishu client.
pub async fn view_image(Path(image_key): Path<String>) -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "Feishu does not expose a direct URL for uploaded images. View them by:",
        "methods": [
            "1. sending an image message to a chat",
            "2. opening the uploaded image in the Feishu client"
        ],
        "image_key": image_key,
    }))
}

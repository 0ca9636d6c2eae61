use std::io::ErrorKind;

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{
        multipart::{Multipart, MultipartRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use iachat_contract::{UploadAck, UploadErrorCode, UploadFailure, UploadedFile, UPLOAD_FIELD};
use iachat_storage::UploadRecord;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::{internal_error, write_log, AppState};
use crate::summary::summarize_upload;

#[derive(Debug, Deserialize)]
pub(crate) struct FilesQuery {
    limit: Option<i64>,
}

struct IncomingFile {
    file_name: String,
    bytes: Bytes,
}

fn rejection(
    status: StatusCode,
    code: UploadErrorCode,
    detail: Option<String>,
) -> (StatusCode, Json<Value>) {
    let body = serde_json::to_value(UploadFailure::new(code, detail))
        .unwrap_or_else(|_| json!({ "ok": false }));
    (status, Json(body))
}

fn to_uploaded_file(record: UploadRecord, summary: Option<String>) -> UploadedFile {
    UploadedFile {
        upload_id: record.upload_id,
        file_name: record.file_name,
        stored_name: record.stored_name,
        size_bytes: u64::try_from(record.size_bytes).unwrap_or(0),
        media_type: record.media_type,
        uploaded_at: record.uploaded_at,
        summary,
    }
}

/// `POST /upload`: every multipart part named `file` is one file. Answers
/// with JSON whatever happens, so the drop client can always parse it.
pub(crate) async fn post_upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let mut multipart = multipart.map_err(|rejected| {
        rejection(
            rejected.status(),
            UploadErrorCode::InvalidMultipart,
            Some(rejected.body_text()),
        )
    })?;

    let mut incoming = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                write_log(&state, "warn", &format!("malformed upload: {}", err.body_text())).await;
                return Err(rejection(
                    err.status(),
                    UploadErrorCode::InvalidMultipart,
                    Some(err.body_text()),
                ));
            }
        };

        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or("file").to_string();
        let bytes = field.bytes().await.map_err(|err| {
            rejection(
                err.status(),
                UploadErrorCode::InvalidMultipart,
                Some(err.body_text()),
            )
        })?;
        incoming.push(IncomingFile { file_name, bytes });
    }

    if incoming.is_empty() {
        write_log(&state, "warn", "upload without files rejected").await;
        return Err(rejection(
            StatusCode::BAD_REQUEST,
            UploadErrorCode::NoFiles,
            None,
        ));
    }

    let mut files = Vec::with_capacity(incoming.len());
    for file in incoming {
        let record = match state.store.save_upload(&file.file_name, &file.bytes).await {
            Ok(record) => record,
            Err(err) => {
                let detail = format!("could not store {}: {}", file.file_name, err.root_cause());
                write_log(&state, "error", &format!("upload failed: {err:#}")).await;
                return Err(rejection(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    UploadErrorCode::InternalError,
                    Some(detail),
                ));
            }
        };

        write_log(
            &state,
            "info",
            &format!("saved {} as {}", record.file_name, record.stored_name),
        )
        .await;

        let summary = summarize_upload(
            state.model.as_ref(),
            &state.settings.default_model,
            &record.file_name,
            &file.bytes,
        )
        .await;
        files.push(to_uploaded_file(record, Some(summary)));
    }

    Ok((StatusCode::OK, Json(UploadAck::new(files))))
}

/// `GET /api/files`: most recent uploads first.
pub(crate) async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<FilesQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let limit = query.limit.unwrap_or(100);
    let records = state.store.list_uploads(limit).await.map_err(internal_error)?;
    let files: Vec<UploadedFile> = records
        .into_iter()
        .map(|record| to_uploaded_file(record, None))
        .collect();
    Ok((StatusCode::OK, Json(json!({ "files": files }))))
}

fn file_not_found(stored_name: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "file_not_found", "detail": stored_name })),
    )
}

async fn find_stored(
    state: &AppState,
    stored_name: &str,
) -> Result<UploadRecord, (StatusCode, Json<Value>)> {
    state
        .store
        .find_by_stored_name(stored_name)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| file_not_found(stored_name))
}

/// `GET /api/files/{stored_name}`: the stored bytes as an attachment.
pub(crate) async fn download_file(
    State(state): State<AppState>,
    Path(stored_name): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let record = find_stored(&state, &stored_name).await?;
    let path = state.store.stored_path(&record);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Err(file_not_found(&stored_name)),
        Err(err) => {
            return Err(internal_error(
                anyhow::Error::new(err).context(format!("read {}", path.display())),
            ))
        }
    };

    let disposition = format!("attachment; filename=\"{}\"", record.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, record.media_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

/// `POST /api/files/{stored_name}/delete`: drops the row and the stored file.
pub(crate) async fn delete_file(
    State(state): State<AppState>,
    Path(stored_name): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    let record = find_stored(&state, &stored_name).await?;
    state
        .store
        .delete_upload(&record)
        .await
        .context("delete upload")
        .map_err(internal_error)?;

    write_log(&state, "info", &format!("deleted {}", record.stored_name)).await;
    Ok((
        StatusCode::OK,
        Json(json!({ "ok": true, "stored_name": record.stored_name })),
    ))
}

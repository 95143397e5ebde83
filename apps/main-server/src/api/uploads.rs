//! File upload API endpoints.

use std::path::Path;
use std::sync::Arc;

use api_protocol::{ApiResponse, ProjectUploadResponse, ServerEvent, TaskUploadResponse};
use axum::{
    Extension, Json,
    extract::{Multipart, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use entities::Attachment;
use rand::Rng;
use task_store::TaskStore;
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use crate::extract::{AppMultipart, AppPath};
use crate::middleware::AuthenticatedUser;
use crate::services::storage::{FileStorage, is_safe_name};
use crate::state::AppState;

/// Maximum number of files per upload request.
pub const MAX_FILES: usize = 5;

/// Multipart field carrying the files.
const FILES_FIELD: &str = "files";

const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "text/plain",
    "text/csv",
    "application/zip",
    "application/x-rar-compressed",
];

const INVALID_TYPE: &str = "Invalid file type. Only images, documents, and archives are allowed.";
const FILE_NOT_FOUND: &str = "File not found";
const DELETE_DENIED: &str = "You do not have permission to delete this file";

/// One file read from the request, not yet stored.
struct Upload {
    original_name: String,
    mime_type: String,
    bytes: Vec<u8>,
}

fn human_size(bytes: usize) -> String {
    const KIB: usize = 1024;
    const MIB: usize = 1024 * 1024;
    if bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else if bytes % KIB == 0 {
        format!("{}KB", bytes / KIB)
    } else {
        format!("{bytes} bytes")
    }
}

/// `files-<millis>-<random><.ext>`, keeping the client's extension when it
/// is plain alphanumeric.
fn storage_name(original_name: &str) -> String {
    let extension = Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    let random: u32 = rand::rng().random_range(0..1_000_000_000);
    format!(
        "{FILES_FIELD}-{}-{random}{extension}",
        Utc::now().timestamp_millis()
    )
}

/// Reads every file of the `files` field, enforcing type, size and count.
async fn read_uploads(mut multipart: Multipart, max_file_size: usize) -> ServerResult<Vec<Upload>> {
    let mut uploads = Vec::new();

    while let Some(mut field) = multipart.next_field().await? {
        let Some(original_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if field.name() != Some(FILES_FIELD) {
            return Err(ServerError::invalid_field("files", "Unexpected file field."));
        }
        if uploads.len() == MAX_FILES {
            return Err(ServerError::invalid_field(
                "files",
                format!("Too many files. Maximum {MAX_FILES} files per upload."),
            ));
        }

        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        if !ALLOWED_MIME_TYPES.contains(&mime_type.as_str()) {
            return Err(ServerError::invalid_field("files", INVALID_TYPE));
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await? {
            if bytes.len() + chunk.len() > max_file_size {
                return Err(ServerError::invalid_field(
                    "files",
                    format!(
                        "File too large. Maximum file size is {}.",
                        human_size(max_file_size)
                    ),
                ));
            }
            bytes.extend_from_slice(&chunk);
        }

        uploads.push(Upload {
            original_name,
            mime_type,
            bytes,
        });
    }

    if uploads.is_empty() {
        return Err(ServerError::invalid_field("files", "No files uploaded"));
    }
    Ok(uploads)
}

/// Best-effort removal of files whose upload did not complete.
async fn discard(storage: &dyn FileStorage, files: &[Attachment]) {
    for file in files {
        if let Err(e) = storage.delete(&file.filename).await {
            tracing::warn!(filename = %file.filename, error = %e, "Failed to discard upload");
        }
    }
}

/// Writes the uploads to storage. Nothing is left behind on failure.
async fn store_uploads(
    storage: &dyn FileStorage,
    uploaded_by: Uuid,
    uploads: Vec<Upload>,
) -> ServerResult<Vec<Attachment>> {
    let mut stored = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let filename = storage_name(&upload.original_name);
        match storage.save(&filename, &upload.bytes).await {
            Ok(path) => stored.push(Attachment {
                filename,
                original_name: upload.original_name,
                path,
                size: upload.bytes.len() as u64,
                mime_type: upload.mime_type,
                uploaded_by,
                uploaded_at: Utc::now(),
            }),
            Err(e) => {
                discard(storage, &stored).await;
                return Err(e.into());
            }
        }
    }
    Ok(stored)
}

/// Tells the project room about each new file.
async fn announce<S: TaskStore>(
    state: &AppState<S>,
    project_id: Uuid,
    task_id: Option<Uuid>,
    user: &AuthenticatedUser,
    files: &[Attachment],
) {
    let timestamp = Utc::now();
    for file in files {
        let file = match serde_json::to_value(file) {
            Ok(file) => file,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode attachment");
                continue;
            }
        };
        state
            .relay
            .emit_to_project(
                project_id,
                ServerEvent::FileUploaded {
                    task_id,
                    file,
                    uploaded_by: user.actor(),
                    timestamp,
                },
            )
            .await;
    }
}

/// Uploads files to a task.
pub async fn upload_task_files<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    AppPath(task_id): AppPath<Uuid>,
    AppMultipart(multipart): AppMultipart,
) -> ServerResult<Json<ApiResponse<TaskUploadResponse>>> {
    let access = state.access().check_task_access(task_id, user.id).await?;

    let uploads = read_uploads(multipart, state.config.max_file_size).await?;
    let files = store_uploads(state.storage.as_ref(), user.id, uploads).await?;
    let task = match state.store.add_task_attachments(task_id, files.clone()).await {
        Ok(task) => task,
        Err(e) => {
            discard(state.storage.as_ref(), &files).await;
            return Err(e.into());
        }
    };

    announce(&state, access.project.id, Some(task_id), &user, &files).await;
    tracing::info!(
        task_id = %task_id,
        user_id = %user.id,
        count = files.len(),
        "Files uploaded to task"
    );

    Ok(Json(
        ApiResponse::ok(TaskUploadResponse { files, task })
            .with_message("Files uploaded successfully"),
    ))
}

/// Uploads files to a project.
pub async fn upload_project_files<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    AppPath(project_id): AppPath<Uuid>,
    AppMultipart(multipart): AppMultipart,
) -> ServerResult<Json<ApiResponse<ProjectUploadResponse>>> {
    state.access().check_project_access(project_id, user.id).await?;

    let uploads = read_uploads(multipart, state.config.max_file_size).await?;
    let files = store_uploads(state.storage.as_ref(), user.id, uploads).await?;
    let project = match state
        .store
        .add_project_attachments(project_id, files.clone())
        .await
    {
        Ok(project) => project,
        Err(e) => {
            discard(state.storage.as_ref(), &files).await;
            return Err(e.into());
        }
    };

    announce(&state, project_id, None, &user, &files).await;
    tracing::info!(
        project_id = %project_id,
        user_id = %user.id,
        count = files.len(),
        "Files uploaded to project"
    );

    Ok(Json(
        ApiResponse::ok(ProjectUploadResponse { files, project })
            .with_message("Files uploaded successfully"),
    ))
}

/// Deletes a task attachment. Allowed for the uploader, the task creator and
/// the assignee.
pub async fn delete_task_file<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    AppPath((task_id, filename)): AppPath<(Uuid, String)>,
) -> ServerResult<Json<ApiResponse<()>>> {
    let access = state.access().check_task_access(task_id, user.id).await?;
    let task = &access.task;

    let attachment = task
        .attachments
        .iter()
        .find(|a| a.filename == filename)
        .ok_or_else(|| ServerError::NotFound(FILE_NOT_FOUND.to_string()))?;
    let can_delete = attachment.uploaded_by == user.id
        || task.created_by_id == user.id
        || task.assigned_to_id == Some(user.id);
    if !can_delete {
        return Err(ServerError::AccessDenied(DELETE_DENIED.to_string()));
    }

    state.storage.delete(&filename).await?;
    state
        .store
        .remove_task_attachment(task_id, &filename)
        .await?
        .ok_or_else(|| ServerError::NotFound(FILE_NOT_FOUND.to_string()))?;

    tracing::info!(task_id = %task_id, filename = %filename, "Task file deleted");

    Ok(Json(ApiResponse::message("File deleted successfully")))
}

/// Deletes a project attachment. Allowed for the uploader, the owner and
/// managers.
pub async fn delete_project_file<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    Extension(user): Extension<AuthenticatedUser>,
    AppPath((project_id, filename)): AppPath<(Uuid, String)>,
) -> ServerResult<Json<ApiResponse<()>>> {
    let access = state
        .access()
        .check_project_access(project_id, user.id)
        .await?;

    let attachment = access
        .project
        .attachments
        .iter()
        .find(|a| a.filename == filename)
        .ok_or_else(|| ServerError::NotFound(FILE_NOT_FOUND.to_string()))?;
    let can_delete = attachment.uploaded_by == user.id
        || access.project.owner_id == user.id
        || access.role.can_edit();
    if !can_delete {
        return Err(ServerError::AccessDenied(DELETE_DENIED.to_string()));
    }

    state.storage.delete(&filename).await?;
    state
        .store
        .remove_project_attachment(project_id, &filename)
        .await?
        .ok_or_else(|| ServerError::NotFound(FILE_NOT_FOUND.to_string()))?;

    tracing::info!(project_id = %project_id, filename = %filename, "Project file deleted");

    Ok(Json(ApiResponse::message("File deleted successfully")))
}

/// Streams a stored file back as a download.
pub async fn download_file<S: TaskStore>(
    State(state): State<Arc<AppState<S>>>,
    AppPath(filename): AppPath<String>,
) -> ServerResult<Response> {
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .ok()
        .filter(|_| is_safe_name(&filename) && !filename.contains('"'))
        .ok_or_else(|| ServerError::NotFound(FILE_NOT_FOUND.to_string()))?;

    let bytes = state
        .storage
        .read(&filename)
        .await?
        .ok_or_else(|| ServerError::NotFound(FILE_NOT_FOUND.to_string()))?;

    Ok((
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_name() {
        let name = storage_name("Quarterly Plan.PDF");
        assert!(name.starts_with("files-"));
        assert!(name.ends_with(".PDF"));
        assert!(is_safe_name(&name));

        let name = storage_name("archive");
        assert!(!name.contains('.'));

        let name = storage_name("evil.p/../df");
        assert!(is_safe_name(&name));
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(10 * 1024 * 1024), "10MB");
        assert_eq!(human_size(512 * 1024), "512KB");
        assert_eq!(human_size(64), "64 bytes");
    }

    #[test]
    fn test_allowed_types() {
        assert!(ALLOWED_MIME_TYPES.contains(&"application/pdf"));
        assert!(ALLOWED_MIME_TYPES.contains(&"text/csv"));
        assert!(!ALLOWED_MIME_TYPES.contains(&"text/html"));
        assert!(!ALLOWED_MIME_TYPES.contains(&"application/x-msdownload"));
    }
}

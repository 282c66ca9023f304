//! File and user endpoints (`SPEC_FULL.md` §4.M): the out-of-core
//! collaborators `spec.md` §6 names at the middleware boundary but leaves
//! external. Request bodies reach these handlers already decrypted by
//! [`crate::middleware::crypto`]; response bodies leave as plain bytes for
//! that same middleware to re-encrypt for the wire.
//!
//! Grounded on `original_source/.../api/routes/files.py` and
//! `.../api/routes/users.py` for the operation shapes. Path resolution
//! follows the teacher's defensive style of rejecting anything that could
//! escape a sandboxed root rather than trusting the client.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path as UrlPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::auth::credentials::AuthenticatedUser;
use crate::error::{ApiError, ApiResult};
use crate::users::{UserRecord, UserStore};

#[derive(Clone)]
pub struct FilesState {
    vault_folder: PathBuf,
    users: Arc<dyn UserStore>,
}

impl FilesState {
    pub fn new(vault_folder: PathBuf, users: Arc<dyn UserStore>) -> Self {
        Self { vault_folder, users }
    }

    fn user_root(&self, username: &str) -> PathBuf {
        self.vault_folder.join(username)
    }
}

/// Resolves a client-supplied, `/`-separated path against `root`, rejecting
/// any segment that could escape it.
fn resolve(root: &Path, raw: &str) -> ApiResult<PathBuf> {
    let mut resolved = root.to_path_buf();
    for segment in raw.split('/').filter(|s| !s.is_empty()) {
        if segment == ".." || segment == "." {
            return Err(ApiError::Forbidden("path escapes vault".into()));
        }
        resolved.push(segment);
    }
    Ok(resolved)
}

#[derive(Serialize)]
pub struct FileEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

#[derive(Deserialize)]
pub struct UploadParams {
    pub name: String,
    #[serde(default)]
    pub force: bool,
}

#[derive(Deserialize)]
pub struct MkdirRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct RenameRequest {
    pub new_name: String,
}

pub async fn list(
    State(state): State<FilesState>,
    Extension(user): Extension<AuthenticatedUser>,
    UrlPath(path): UrlPath<String>,
) -> ApiResult<Json<Vec<FileEntry>>> {
    let dir = resolve(&state.user_root(&user.username), &path)?;
    let mut read_dir = tokio::fs::read_dir(&dir)
        .await
        .map_err(|_| ApiError::NotFound("directory not found".into()))?;

    let mut entries = Vec::new();
    while let Some(entry) = read_dir.next_entry().await.map_err(anyhow::Error::from)? {
        let metadata = entry.metadata().await.map_err(anyhow::Error::from)?;
        entries.push(FileEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: metadata.is_dir(),
            size: metadata.len(),
        });
    }
    Ok(Json(entries))
}

pub async fn mkdir(
    State(state): State<FilesState>,
    Extension(user): Extension<AuthenticatedUser>,
    UrlPath(path): UrlPath<String>,
    Json(body): Json<MkdirRequest>,
) -> ApiResult<StatusCode> {
    let parent = resolve(&state.user_root(&user.username), &path)?;
    let target = parent.join(&body.name);
    tokio::fs::create_dir_all(&target).await.map_err(anyhow::Error::from)?;
    Ok(StatusCode::CREATED)
}

pub async fn upload(
    State(state): State<FilesState>,
    Extension(user): Extension<AuthenticatedUser>,
    UrlPath(path): UrlPath<String>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let dir = resolve(&state.user_root(&user.username), &path)?;
    tokio::fs::create_dir_all(&dir).await.map_err(anyhow::Error::from)?;
    let target = dir.join(&params.name);

    if !params.force && tokio::fs::try_exists(&target).await.unwrap_or(false) {
        return Err(ApiError::Conflict("file already exists".into()));
    }

    tokio::fs::write(&target, &body).await.map_err(anyhow::Error::from)?;
    Ok(StatusCode::CREATED)
}

pub async fn download(
    State(state): State<FilesState>,
    Extension(user): Extension<AuthenticatedUser>,
    UrlPath(path): UrlPath<String>,
) -> ApiResult<Response> {
    let target = resolve(&state.user_root(&user.username), &path)?;
    let bytes = tokio::fs::read(&target).await.map_err(|_| ApiError::NotFound("file not found".into()))?;
    Ok((StatusCode::OK, bytes).into_response())
}

pub async fn delete(
    State(state): State<FilesState>,
    Extension(user): Extension<AuthenticatedUser>,
    UrlPath(path): UrlPath<String>,
) -> ApiResult<StatusCode> {
    let target = resolve(&state.user_root(&user.username), &path)?;
    let metadata = tokio::fs::metadata(&target).await.map_err(|_| ApiError::NotFound("file not found".into()))?;
    if metadata.is_dir() {
        tokio::fs::remove_dir_all(&target).await.map_err(anyhow::Error::from)?;
    } else {
        tokio::fs::remove_file(&target).await.map_err(anyhow::Error::from)?;
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn rename(
    State(state): State<FilesState>,
    Extension(user): Extension<AuthenticatedUser>,
    UrlPath(path): UrlPath<String>,
    Json(body): Json<RenameRequest>,
) -> ApiResult<StatusCode> {
    let root = state.user_root(&user.username);
    let source = resolve(&root, &path)?;
    let destination = source
        .parent()
        .map(|p| p.join(&body.new_name))
        .ok_or_else(|| ApiError::Forbidden("invalid path".into()))?;
    tokio::fs::rename(&source, &destination).await.map_err(|_| ApiError::NotFound("file not found".into()))?;
    Ok(StatusCode::OK)
}

pub async fn check(
    State(state): State<FilesState>,
    Extension(user): Extension<AuthenticatedUser>,
    UrlPath(path): UrlPath<String>,
) -> Response {
    let root = state.user_root(&user.username);
    let target = match resolve(&root, &path) {
        Ok(p) => p,
        Err(_) => return StatusCode::FORBIDDEN.into_response(),
    };
    match tokio::fs::metadata(&target).await {
        Ok(meta) if meta.is_dir() => StatusCode::ACCEPTED.into_response(),
        Ok(_) => StatusCode::OK.into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

// ─── User directory endpoints ───────────────────────────────────────────

#[derive(Deserialize)]
pub struct AddUserRequest {
    pub auk_salt: String,
    pub srp_salt: String,
    pub verifier: String,
}

/// `POST /api/users/add/{username}`: unauthenticated (the body is
/// encrypted client-side under an out-of-band account-creation key the
/// core never sees — spec.md §6).
pub async fn add_user(
    State(state): State<FilesState>,
    UrlPath(username): UrlPath<String>,
    Json(body): Json<AddUserRequest>,
) -> ApiResult<StatusCode> {
    if state.users.get_user(&username).await?.is_some() {
        return Err(ApiError::Conflict("user already exists".into()));
    }

    let auk_salt = hex::decode(&body.auk_salt).map_err(|e| ApiError::ProtocolFault(e.to_string()))?;
    let srp_salt = hex::decode(&body.srp_salt).map_err(|e| ApiError::ProtocolFault(e.to_string()))?;
    let verifier = hex::decode(&body.verifier).map_err(|e| ApiError::ProtocolFault(e.to_string()))?;

    state
        .users
        .add_user(UserRecord {
            username,
            auk_salt,
            srp_salt,
            verifier: BigUint::from_bytes_be(&verifier),
            key_enc: None,
        })
        .await?;

    Ok(StatusCode::CREATED)
}

/// `GET /api/users/vault/{username}`: returns the user's encrypted vault
/// key, re-encrypted for transport by the response-encryption middleware.
pub async fn get_vault_key(
    State(state): State<FilesState>,
    UrlPath(username): UrlPath<String>,
) -> ApiResult<Response> {
    let record = state.users.get_user(&username).await?.ok_or_else(|| ApiError::NotFound("unknown user".into()))?;
    let key_enc = record.key_enc.ok_or_else(|| ApiError::NotFound("vault key not set".into()))?;
    Ok((StatusCode::OK, key_enc).into_response())
}

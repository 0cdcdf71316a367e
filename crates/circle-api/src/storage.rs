use std::fmt;
use std::path::{Component, Path as FsPath, PathBuf};
use std::str::FromStr;

use axum::{
    Extension, Json,
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use tokio::fs;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};
use uuid::Uuid;

use circle_types::api::{Claims, UploadQuery, UploadResponse};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::views;

/// 5 MB upload limit for images
pub const MAX_UPLOAD_SIZE: usize = 5 * 1024 * 1024;

const IMAGE_TYPES: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Avatars,
    Posts,
}

impl Bucket {
    pub const ALL: [Bucket; 2] = [Bucket::Avatars, Bucket::Posts];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Avatars => "avatars",
            Self::Posts => "posts",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bucket {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "avatars" => Ok(Self::Avatars),
            "posts" => Ok(Self::Posts),
            other => Err(StorageError::UnknownBucket(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unknown bucket '{0}'")]
    UnknownBucket(String),

    #[error("invalid object path '{0}'")]
    InvalidPath(String),

    #[error("unsupported file type '{0}'")]
    UnsupportedType(String),

    #[error("upload is empty")]
    Empty,

    #[error("upload exceeds {} bytes", MAX_UPLOAD_SIZE)]
    TooLarge,

    #[error("object not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::UnknownBucket(_)
            | StorageError::InvalidPath(_)
            | StorageError::UnsupportedType(_)
            | StorageError::Empty => ApiError::BadRequest(err.to_string()),
            StorageError::TooLarge => ApiError::PayloadTooLarge(err.to_string()),
            StorageError::NotFound(_) => ApiError::NotFound(err.to_string()),
            StorageError::Io(e) => ApiError::Internal(format!("storage I/O: {}", e)),
        }
    }
}

/// Local-disk object storage.
///
/// Objects live at `{root}/{bucket}/{uuid}.{ext}` and are served publicly at
/// `{public_base}/{bucket}/{uuid}.{ext}`.
pub struct Storage {
    root: PathBuf,
    public_base: String,
}

impl Storage {
    pub async fn new(root: PathBuf, public_base: &str) -> anyhow::Result<Self> {
        for bucket in Bucket::ALL {
            fs::create_dir_all(root.join(bucket.as_str())).await?;
        }
        info!("Object storage directory: {}", root.display());
        Ok(Self {
            root,
            public_base: public_base.trim_end_matches('/').to_string(),
        })
    }

    /// Resolve an object path inside a bucket. Anything other than a single
    /// plain file name is rejected.
    pub fn object_path(&self, bucket: Bucket, path: &str) -> Result<PathBuf, StorageError> {
        let mut components = FsPath::new(path).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) if !path.contains(['/', '\\']) => {
                Ok(self.root.join(bucket.as_str()).join(name))
            }
            _ => Err(StorageError::InvalidPath(path.to_string())),
        }
    }

    /// Store `bytes` under a fresh random name carrying the original
    /// extension. Returns the object path within the bucket.
    pub async fn upload(&self, bucket: Bucket, original_name: &str, bytes: &[u8]) -> Result<String, StorageError> {
        if bytes.is_empty() {
            return Err(StorageError::Empty);
        }
        if bytes.len() > MAX_UPLOAD_SIZE {
            return Err(StorageError::TooLarge);
        }

        let ext = image_extension(original_name)?;
        let path = format!("{}.{}", Uuid::new_v4(), ext);
        fs::write(self.object_path(bucket, &path)?, bytes).await?;

        info!("Stored {}/{} ({} bytes)", bucket, path, bytes.len());
        Ok(path)
    }

    /// Delete an object. A missing object is not an error.
    pub async fn remove(&self, bucket: Bucket, path: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.object_path(bucket, path)?).await {
            Ok(()) => {
                info!("Deleted {}/{}", bucket, path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Object {}/{} already gone", bucket, path);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn public_url(&self, bucket: Bucket, path: &str) -> String {
        format!("{}/{}/{}", self.public_base, bucket, path)
    }

    /// Reverse of `public_url`, for URLs that point into this storage.
    pub fn locate(&self, url: &str) -> Option<(Bucket, String)> {
        let rest = url.strip_prefix(&self.public_base)?.strip_prefix('/')?;
        let (bucket, path) = rest.split_once('/')?;
        let bucket = bucket.parse().ok()?;
        self.object_path(bucket, path).ok()?;
        Some((bucket, path.to_string()))
    }
}

fn image_extension(name: &str) -> Result<String, StorageError> {
    let ext = FsPath::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or_else(|| StorageError::UnsupportedType(name.to_string()))?;

    if content_type(&ext).is_none() {
        return Err(StorageError::UnsupportedType(ext));
    }
    Ok(ext)
}

fn content_type(ext: &str) -> Option<&'static str> {
    IMAGE_TYPES.iter().find(|(e, _)| *e == ext).map(|(_, ct)| *ct)
}

// -- Handlers --

async fn upload_to(
    state: &AppState,
    bucket: Bucket,
    owner: Uuid,
    query: &UploadQuery,
    bytes: &Bytes,
) -> ApiResult<UploadResponse> {
    let path = state.storage.upload(bucket, &query.filename, bytes).await?;

    let stored = path.clone();
    let recorded = state
        .db_call(move |db| db.record_upload(bucket.as_str(), &stored, &owner.to_string()))
        .await;
    if let Err(e) = recorded {
        state.storage.remove(bucket, &path).await?;
        return Err(e);
    }

    Ok(UploadResponse {
        bucket: bucket.to_string(),
        url: state.storage.public_url(bucket, &path),
        path,
    })
}

async fn local_owner(state: &AppState, bucket: Bucket, path: &str) -> ApiResult<Option<Uuid>> {
    let path = path.to_string();
    let owner = state
        .db_call(move |db| db.upload_owner(bucket.as_str(), &path))
        .await?;
    Ok(owner.and_then(|id| id.parse().ok()))
}

/// Refuse URLs into local storage unless `owner` uploaded the object.
/// External URLs are accepted as-is.
pub(crate) async fn check_attachable(state: &AppState, url: Option<&str>, owner: Uuid) -> ApiResult<()> {
    let Some((bucket, path)) = url.and_then(|u| state.storage.locate(u)) else {
        return Ok(());
    };
    if local_owner(state, bucket, &path).await? != Some(owner) {
        return Err(ApiError::forbidden("image must be one of your own uploads"));
    }
    Ok(())
}

/// Best-effort removal of an object referenced by URL. Foreign URLs and
/// objects stored by someone other than `owner` are left alone.
pub(crate) async fn remove_owned(state: &AppState, url: &str, owner: Uuid) {
    let Some((bucket, path)) = state.storage.locate(url) else {
        return;
    };

    match local_owner(state, bucket, &path).await {
        Ok(Some(stored_by)) if stored_by == owner => {}
        Ok(_) => {
            warn!("Not removing {}: not uploaded by {}", url, owner);
            return;
        }
        Err(e) => {
            warn!("Failed to look up owner of {}: {}", url, e);
            return;
        }
    }

    if let Err(e) = state.storage.remove(bucket, &path).await {
        warn!("Failed to remove {}: {}", url, e);
        return;
    }
    let forget = path.clone();
    if let Err(e) = state
        .db_call(move |db| db.forget_upload(bucket.as_str(), &forget))
        .await
    {
        warn!("Failed to forget upload {}/{}: {}", bucket, path, e);
    }
}

/// POST /posts/images?filename=..: raw image bytes for a post attachment.
pub async fn upload_post_image(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<UploadQuery>,
    bytes: Bytes,
) -> ApiResult<impl IntoResponse> {
    let uploaded = upload_to(&state, Bucket::Posts, claims.sub, &query, &bytes).await?;
    Ok((StatusCode::CREATED, Json(uploaded)))
}

/// POST /users/me/avatar?filename=..: stores the image and points the
/// caller's profile at it. The previous avatar is removed.
pub async fn upload_avatar(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<UploadQuery>,
    bytes: Bytes,
) -> ApiResult<impl IntoResponse> {
    let uploaded = upload_to(&state, Bucket::Avatars, claims.sub, &query, &bytes).await?;

    let uid = claims.sub.to_string();
    let previous = state
        .db_call(move |db| db.get_user_by_id(&uid))
        .await?
        .and_then(|user| user.avatar_url);

    let uid = claims.sub.to_string();
    let url = uploaded.url.clone();
    let updated = state
        .db_call(move |db| db.update_profile(&uid, None, None, Some(&url)))
        .await;

    let user = match updated {
        Ok(user) => user,
        Err(e) => {
            remove_owned(&state, &uploaded.url, claims.sub).await;
            return Err(e);
        }
    };

    if let Some(previous) = previous.filter(|p| *p != uploaded.url) {
        remove_owned(&state, &previous, claims.sub).await;
    }

    Ok(Json(views::user_profile(user, true)))
}

/// GET /storage/{bucket}/{path}: streams a stored object.
pub async fn serve_object(
    State(state): State<AppState>,
    Path((bucket, path)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let bucket: Bucket = bucket.parse()?;
    let file_path = state.storage.object_path(bucket, &path)?;

    let mime = FsPath::new(&path)
        .extension()
        .and_then(|e| e.to_str())
        .and_then(|e| content_type(&e.to_ascii_lowercase()))
        .unwrap_or("application/octet-stream");

    let file = match fs::File::open(&file_path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StorageError::NotFound(format!("{}/{}", bucket, path)).into());
        }
        Err(e) => return Err(StorageError::from(e).into()),
    };
    let len = file.metadata().await.map_err(StorageError::from)?.len();

    Ok((
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (header::CONTENT_LENGTH, len.to_string()),
        ],
        Body::from_stream(ReaderStream::new(file)),
    ))
}

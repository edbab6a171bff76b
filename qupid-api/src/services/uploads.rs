use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use qupid_shared::errors::{AppError, AppResult, ErrorCode};

const VOICE_EXTENSIONS: &[&str] = &[".mp3", ".wav", ".ogg", ".m4a", ".mp4"];
const VOICE_MIME_TYPES: &[&str] = &["audio/mpeg", "audio/wav", "audio/ogg", "audio/mp4"];
const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp"];
const IMAGE_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadKind {
    Voice,
    Image,
    Avatar,
}

impl UploadKind {
    pub const ALL: [UploadKind; 3] = [UploadKind::Voice, UploadKind::Image, UploadKind::Avatar];

    pub fn parse(segment: &str) -> AppResult<Self> {
        match segment {
            "voice" => Ok(UploadKind::Voice),
            "image" => Ok(UploadKind::Image),
            "avatar" => Ok(UploadKind::Avatar),
            other => Err(AppError::not_found(format!("unknown upload kind: {other}"))),
        }
    }

    pub fn directory(&self) -> &'static str {
        match self {
            UploadKind::Voice => "voice",
            UploadKind::Image => "images",
            UploadKind::Avatar => "avatars",
        }
    }

    fn extensions(&self) -> &'static [&'static str] {
        match self {
            UploadKind::Voice => VOICE_EXTENSIONS,
            UploadKind::Image | UploadKind::Avatar => IMAGE_EXTENSIONS,
        }
    }

    fn mime_types(&self) -> &'static [&'static str] {
        match self {
            UploadKind::Voice => VOICE_MIME_TYPES,
            UploadKind::Image | UploadKind::Avatar => IMAGE_MIME_TYPES,
        }
    }
}

/// Lowercased extension including the dot, e.g. `.png`.
pub fn extension_of(filename: &str) -> Option<String> {
    let name = Path::new(filename).file_name()?.to_str()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(format!(".{}", ext.to_lowercase()))
}

/// Filename, extension and MIME checks, in that order. Returns the extension.
pub fn validate_upload(kind: UploadKind, filename: Option<&str>, content_type: Option<&str>) -> AppResult<String> {
    let filename = filename
        .filter(|f| !f.trim().is_empty())
        .ok_or_else(|| AppError::new(ErrorCode::InvalidFileType, "file name is required"))?;

    let ext = extension_of(filename)
        .filter(|ext| kind.extensions().contains(&ext.as_str()))
        .ok_or_else(|| {
            AppError::with_details(
                ErrorCode::InvalidFileType,
                "file extension is not allowed",
                serde_json::json!({ "allowed": kind.extensions() }),
            )
        })?;

    let mime = content_type
        .map(|c| c.split(';').next().unwrap_or("").trim().to_lowercase())
        .unwrap_or_default();
    if !kind.mime_types().contains(&mime.as_str()) {
        return Err(AppError::with_details(
            ErrorCode::InvalidFileType,
            "content type is not allowed",
            serde_json::json!({ "allowed": kind.mime_types() }),
        ));
    }

    Ok(ext)
}

pub fn ensure_size(len: usize, max_bytes: usize) -> AppResult<()> {
    if len > max_bytes {
        return Err(AppError::with_details(
            ErrorCode::PayloadTooLarge,
            "file is too large",
            serde_json::json!({ "max_bytes": max_bytes }),
        ));
    }
    if len == 0 {
        return Err(AppError::new(ErrorCode::EmptyFile, "file is empty"));
    }
    Ok(())
}

/// Stored names carry the owner id so ownership can be checked from the path.
pub fn stored_name(owner: Uuid, ext: &str) -> String {
    format!("{owner}_{}{ext}", Uuid::new_v4().simple())
}

pub fn is_owned_by(relative: &str, owner: Uuid) -> bool {
    Path::new(relative)
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(&format!("{owner}_")))
}

/// Resolves a client supplied relative path inside `root`. Absolute paths and
/// any `..` or root component are refused.
pub fn resolve_relative(root: &Path, relative: &str) -> AppResult<PathBuf> {
    let trimmed = relative.trim_start_matches('/');
    let forbidden = || AppError::new(ErrorCode::InvalidFilePath, "access to this path is not allowed");

    if trimmed.is_empty() || trimmed.contains('\\') || trimmed.contains('\0') {
        return Err(forbidden());
    }

    let path = Path::new(trimmed);
    let mut resolved = root.to_path_buf();
    for component in path.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return Err(forbidden()),
        }
    }

    let top = path
        .components()
        .find_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .unwrap_or("");
    if !UploadKind::ALL.iter().any(|k| k.directory() == top) {
        return Err(forbidden());
    }

    Ok(resolved)
}

#[derive(Debug, Serialize)]
pub struct StoredFile {
    pub file_path: String,
    pub file_size: u64,
}

/// Local filesystem storage rooted at the configured upload directory.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        for kind in UploadKind::ALL {
            tokio::fs::create_dir_all(self.root.join(kind.directory())).await?;
        }
        Ok(())
    }

    pub async fn save(&self, kind: UploadKind, owner: Uuid, ext: &str, bytes: &[u8]) -> AppResult<StoredFile> {
        let name = stored_name(owner, ext);
        let relative = format!("{}/{}", kind.directory(), name);
        let full = self.root.join(kind.directory()).join(&name);

        tokio::fs::create_dir_all(self.root.join(kind.directory()))
            .await
            .map_err(|e| AppError::internal(format!("failed to prepare upload directory: {e}")))?;
        tokio::fs::write(&full, bytes)
            .await
            .map_err(|e| AppError::internal(format!("failed to store file: {e}")))?;

        tracing::debug!(path = %relative, size = bytes.len(), "file stored");
        Ok(StoredFile { file_path: relative, file_size: bytes.len() as u64 })
    }

    pub fn resolve(&self, relative: &str) -> AppResult<PathBuf> {
        resolve_relative(&self.root, relative)
    }

    pub async fn read(&self, relative: &str) -> AppResult<Vec<u8>> {
        let path = self.resolve(relative)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::new(ErrorCode::FileNotFound, "file not found"))
            }
            Err(e) => Err(AppError::internal(format!("failed to read file: {e}"))),
        }
    }

    pub async fn remove(&self, relative: &str) -> AppResult<()> {
        let path = self.resolve(relative)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::new(ErrorCode::FileNotFound, "file not found"))
            }
            Err(e) => Err(AppError::internal(format!("failed to delete file: {e}"))),
        }
    }

    pub async fn exists(&self, relative: &str) -> bool {
        match self.resolve(relative) {
            Ok(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn accepts_allowed_image() {
        let ext = validate_upload(UploadKind::Image, Some("cat.PNG"), Some("image/png")).unwrap();
        assert_eq!(ext, ".png");
    }

    #[test]
    fn rejects_executable() {
        let err = validate_upload(UploadKind::Image, Some("run.exe"), Some("image/png")).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn rejects_mismatched_mime() {
        let err = validate_upload(UploadKind::Voice, Some("memo.mp3"), Some("text/plain")).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(validate_upload(UploadKind::Voice, Some("memo.mp3"), Some("audio/mpeg; codecs=mp3")).is_ok());
    }

    #[test]
    fn missing_filename() {
        assert!(validate_upload(UploadKind::Avatar, None, Some("image/png")).is_err());
        assert!(validate_upload(UploadKind::Avatar, Some(".png"), Some("image/png")).is_err());
    }

    #[test]
    fn size_limits() {
        let max = 10 * 1024 * 1024;
        let err = ensure_size(15 * 1024 * 1024, max).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(ensure_size(0, max).unwrap_err().status_code(), StatusCode::BAD_REQUEST);
        assert!(ensure_size(max, max).is_ok());
    }

    #[test]
    fn traversal_is_forbidden() {
        let root = Path::new("/srv/uploads");
        for bad in ["../etc/passwd", "images/../../secret", "", "etc/passwd", "images\\..\\x"] {
            let err = resolve_relative(root, bad).unwrap_err();
            assert_eq!(err.status_code(), StatusCode::FORBIDDEN, "{bad}");
        }
        let ok = resolve_relative(root, "/images/a.png").unwrap();
        assert_eq!(ok, PathBuf::from("/srv/uploads/images/a.png"));
    }

    #[test]
    fn ownership_from_name() {
        let owner = Uuid::new_v4();
        let name = stored_name(owner, ".jpg");
        assert!(is_owned_by(&format!("avatars/{name}"), owner));
        assert!(!is_owned_by(&format!("avatars/{name}"), Uuid::new_v4()));
        assert!(name.ends_with(".jpg"));
    }

    #[tokio::test]
    async fn store_read_remove() {
        let root = std::env::temp_dir().join(format!("qupid-uploads-{}", Uuid::new_v4()));
        let store = UploadStore::new(&root);
        store.ensure_dirs().await.unwrap();

        let owner = Uuid::new_v4();
        let stored = store.save(UploadKind::Voice, owner, ".ogg", b"OggS").await.unwrap();
        assert!(stored.file_path.starts_with("voice/"));
        assert_eq!(stored.file_size, 4);
        assert_eq!(store.read(&stored.file_path).await.unwrap(), b"OggS");

        store.remove(&stored.file_path).await.unwrap();
        let err = store.read(&stored.file_path).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let _ = tokio::fs::remove_dir_all(root).await;
    }
}

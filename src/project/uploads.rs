use std::path::{Component, Path, PathBuf};

use chrono::Utc;

use crate::error::{AppError, AppResult};
use crate::project::forms::{FileField, UploadedFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    HeadImage,
    Attachment,
}

impl UploadKind {
    fn prefix(self) -> &'static str {
        match self {
            UploadKind::HeadImage => "project/images",
            UploadKind::Attachment => "project/files",
        }
    }
}

/// Keep only the final path component of a client-supplied name and drop
/// characters that are awkward in URLs.
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Write an upload below `media_root` and return its media-relative path.
pub async fn store(media_root: &Path, kind: UploadKind, file: &UploadedFile) -> AppResult<String> {
    let dir = format!("{}/{}", kind.prefix(), Utc::now().format("%Y/%m/%d"));
    tokio::fs::create_dir_all(media_root.join(&dir)).await?;

    let name = sanitize_file_name(&file.file_name);
    let mut relative = format!("{dir}/{name}");
    if tokio::fs::try_exists(media_root.join(&relative)).await? {
        let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(7).collect();
        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (name.as_str(), None),
        };
        relative = match ext {
            Some(ext) => format!("{dir}/{stem}_{suffix}.{ext}"),
            None => format!("{dir}/{stem}_{suffix}"),
        };
    }

    tokio::fs::write(media_root.join(&relative), &file.bytes).await?;
    tracing::info!(path = %relative, bytes = file.bytes.len(), "Stored upload");
    Ok(relative)
}

/// Resolve a submitted file field against the current stored value.
pub async fn apply(
    media_root: &Path,
    kind: UploadKind,
    field: &FileField,
    current: Option<String>,
) -> AppResult<Option<String>> {
    match field {
        FileField::Keep => Ok(current),
        FileField::Clear => Ok(None),
        FileField::Replace(file) => Ok(Some(store(media_root, kind, file).await?)),
    }
}

/// The stored path when `field` wrote a new file, None when it kept or
/// cleared the old value.
pub fn fresh<'a>(field: &FileField, stored: &'a Option<String>) -> Option<&'a str> {
    match field {
        FileField::Replace(_) => stored.as_deref(),
        FileField::Keep | FileField::Clear => None,
    }
}

/// Pass `result` through, deleting the newly stored files when it is an
/// error so a failed write leaves nothing behind under the media root.
pub async fn commit_or_discard<T>(
    media_root: &Path,
    fresh: &[&str],
    result: AppResult<T>,
) -> AppResult<T> {
    if result.is_err() {
        for relative in fresh {
            let Some(path) = resolve_media_path(media_root, relative) else {
                continue;
            };
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::info!(path = %relative, "Discarded upload"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %relative, error = %e, "Failed to discard upload"),
            }
        }
    }
    result
}

/// Map a request path onto the media root, refusing anything that could
/// escape it.
pub fn resolve_media_path(media_root: &Path, requested: &str) -> Option<PathBuf> {
    let relative = Path::new(requested);
    if requested.is_empty()
        || !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(media_root.join(relative))
}

/// File name shown for an attachment link.
pub fn display_name(stored: &str) -> &str {
    stored.rsplit('/').next().unwrap_or(stored)
}

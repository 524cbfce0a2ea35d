use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use tokio::fs;
use tracing::warn;

use crate::infra::errors::{AppError, AppResult};

/// Resolves client-supplied filenames against the trusted media root.
///
/// Only plain relative paths are accepted, and the canonical result must
/// stay under the canonical root, so symlinks cannot point outside it.
#[derive(Debug, Clone)]
pub struct MediaPathResolver {
    root: PathBuf,
}

impl MediaPathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn resolve(&self, filename: &str) -> AppResult<PathBuf> {
        if filename.trim().is_empty() {
            return Err(AppError::bad_request("filename is required"));
        }

        let segments = normalise_relative_path(filename)?;
        if segments.is_empty() {
            return Err(AppError::bad_request("filename must name a file"));
        }

        let root = canonicalize_media_root(&self.root).await.map_err(|err| {
            warn!(root = %self.root.display(), "media root is not accessible: {}", err);
            AppError::internal("Media root is not accessible")
        })?;

        let mut candidate = root.clone();
        for segment in &segments {
            candidate.push(segment);
        }

        let resolved = match fs::canonicalize(&candidate).await {
            Ok(path) => path,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(AppError::not_found(format!(
                    "'{filename}' does not exist within the media root"
                )));
            }
            Err(err) => {
                return Err(AppError::internal(format!(
                    "Failed to resolve '{filename}': {err}"
                )));
            }
        };

        if !resolved.starts_with(&root) {
            warn!(
                filename,
                resolved = %resolved.display(),
                "rejected path escaping the media root"
            );
            return Err(AppError::bad_request(
                "Only paths within the media root are allowed",
            ));
        }

        let metadata = fs::metadata(&resolved).await.map_err(|err| {
            AppError::internal(format!("Failed to read '{filename}': {err}"))
        })?;
        if !metadata.is_file() {
            return Err(AppError::bad_request(format!(
                "'{filename}' is not a file"
            )));
        }

        Ok(resolved)
    }
}

async fn canonicalize_media_root(root: &Path) -> std::io::Result<PathBuf> {
    if root.is_absolute() {
        fs::canonicalize(root).await
    } else {
        fs::canonicalize(std::env::current_dir()?.join(root)).await
    }
}

fn normalise_relative_path(raw: &str) -> AppResult<Vec<String>> {
    let mut segments = Vec::new();
    for component in Path::new(raw.trim()).components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => {
                segments.push(part.to_string_lossy().into_owned());
            }
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(AppError::bad_request(
                    "Only relative paths within the media root are allowed",
                ));
            }
        }
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn media_tree() -> (tempfile::TempDir, MediaPathResolver) {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("media");
        std::fs::create_dir_all(media.join("films")).unwrap();
        std::fs::write(media.join("films/night.mkv"), b"x").unwrap();
        std::fs::write(dir.path().join("secret.txt"), b"x").unwrap();
        (dir, MediaPathResolver::new(media))
    }

    #[tokio::test]
    async fn resolves_nested_files() {
        let (_dir, resolver) = media_tree();
        let path = resolver.resolve("films/night.mkv").await.unwrap();
        assert!(path.ends_with("films/night.mkv"));
        assert!(path.is_absolute());
    }

    #[tokio::test]
    async fn rejects_blank_absolute_and_parent_paths() {
        let (_dir, resolver) = media_tree();
        for input in ["", "   ", "/etc/passwd", "../secret.txt", "films/../../secret.txt"] {
            let err = resolver.resolve(input).await.unwrap_err();
            assert_eq!(err.status, StatusCode::BAD_REQUEST, "input {input:?}");
        }
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let (_dir, resolver) = media_tree();
        let err = resolver.resolve("films/absent.mkv").await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn directories_are_rejected() {
        let (_dir, resolver) = media_tree();
        let err = resolver.resolve("films").await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_escape_is_rejected() {
        let (dir, resolver) = media_tree();
        std::os::unix::fs::symlink(
            dir.path().join("secret.txt"),
            resolver.root().join("films/link.mkv"),
        )
        .unwrap();

        let err = resolver.resolve("films/link.mkv").await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}

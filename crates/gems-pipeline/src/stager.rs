use std::path::{Path, PathBuf};

use reqwest::Url;
use tracing::debug;

use crate::error::StageError;

const FILE_SCHEME: &str = "file://";
const CONTENT_SCHEME: &str = "content://";

/// Maps a `content://` reference to a readable file.
pub trait ContentResolver: Send + Sync {
    fn resolve(&self, authority: &str, path: &str) -> Result<PathBuf, StageError>;
}

/// Resolves `content://<authority>/<path>` to `<root>/<authority>/<path>`.
#[derive(Clone, Debug)]
pub struct MountedContentResolver {
    root: PathBuf,
}

impl MountedContentResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ContentResolver for MountedContentResolver {
    fn resolve(&self, authority: &str, path: &str) -> Result<PathBuf, StageError> {
        let refused = || StageError::Unsupported(format!("{CONTENT_SCHEME}{authority}/{path}"));
        if !is_plain_segment(authority) {
            return Err(refused());
        }
        let mut resolved = self.root.join(authority);
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if !is_plain_segment(segment) {
                return Err(refused());
            }
            resolved.push(segment);
        }
        Ok(resolved)
    }
}

/// A single path component that cannot leave its parent directory.
fn is_plain_segment(segment: &str) -> bool {
    !matches!(segment, "" | "." | "..") && !segment.contains(['/', '\\'])
}

#[derive(Debug, PartialEq, Eq)]
pub enum ImageSource<'a> {
    File(PathBuf),
    Content { authority: &'a str, path: &'a str },
    Other(&'a str),
}

/// Sorts a reference by scheme. `file://` URIs are decoded, so
/// `file:///a/My%20Photo.jpg` names `/a/My Photo.jpg`; a `file://` URI with a
/// remote host is `Other`.
pub fn classify(reference: &str) -> ImageSource<'_> {
    if reference.starts_with(FILE_SCHEME) {
        match Url::parse(reference).ok().and_then(|url| url.to_file_path().ok()) {
            Some(path) => ImageSource::File(path),
            None => ImageSource::Other(reference),
        }
    } else if let Some(rest) = reference.strip_prefix(CONTENT_SCHEME) {
        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        ImageSource::Content { authority, path }
    } else if reference.contains("://") {
        ImageSource::Other(reference)
    } else {
        ImageSource::File(PathBuf::from(reference))
    }
}

/// A local image ready to be read and uploaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagedImage {
    pub reference: String,
    pub path: PathBuf,
    /// Copy made by the stager; removed by [`ImageStager::release`].
    pub temporary: bool,
}

pub struct ImageStager {
    staging_dir: PathBuf,
    resolver: Option<Box<dyn ContentResolver>>,
}

impl ImageStager {
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            resolver: None,
        }
    }

    pub fn with_resolver(mut self, resolver: impl ContentResolver + 'static) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub async fn stage(&self, reference: &str) -> Result<StagedImage, StageError> {
        match classify(reference) {
            ImageSource::File(path) => {
                ensure_exists(&path).await?;
                Ok(StagedImage {
                    reference: reference.to_string(),
                    path,
                    temporary: false,
                })
            }
            ImageSource::Content { authority, path } => {
                let resolver = self
                    .resolver
                    .as_deref()
                    .ok_or_else(|| StageError::Unsupported(reference.to_string()))?;
                let source = resolver.resolve(authority, path)?;
                ensure_exists(&source).await?;
                let staged = self.copy_in(reference, &source).await?;
                debug!(from = %reference, to = %staged.path.display(), "staged content image");
                Ok(staged)
            }
            ImageSource::Other(r) => Err(StageError::Unsupported(r.to_string())),
        }
    }

    async fn copy_in(&self, reference: &str, source: &Path) -> Result<StagedImage, StageError> {
        let copy_err = |source| StageError::Copy {
            from: reference.to_string(),
            source,
        };
        tokio::fs::create_dir_all(&self.staging_dir).await.map_err(copy_err)?;
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .unwrap_or("jpg");
        let target = self
            .staging_dir
            .join(format!("upload_{}.{}", gems_core::unique_name(), ext));
        tokio::fs::copy(source, &target).await.map_err(copy_err)?;
        let reference = Url::from_file_path(&target)
            .map(String::from)
            .unwrap_or_else(|_| format!("{FILE_SCHEME}{}", target.display()));
        Ok(StagedImage {
            reference,
            path: target,
            temporary: true,
        })
    }

    /// Deletes the staged copy of a `content://` image. Pass-through files are
    /// never touched.
    pub async fn release(&self, image: &StagedImage) {
        if !image.temporary {
            return;
        }
        if let Err(err) = tokio::fs::remove_file(&image.path).await {
            debug!(path = %image.path.display(), error = %err, "could not remove staged copy");
        }
    }
}

async fn ensure_exists(path: &Path) -> Result<(), StageError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(StageError::Missing(path.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_references() {
        assert_eq!(classify("file:///data/a.jpg"), ImageSource::File(PathBuf::from("/data/a.jpg")));
        assert_eq!(classify("/data/a.jpg"), ImageSource::File(PathBuf::from("/data/a.jpg")));
        assert_eq!(
            classify("content://media/external/images/7"),
            ImageSource::Content {
                authority: "media",
                path: "external/images/7"
            }
        );
        assert_eq!(classify("ph://asset/1"), ImageSource::Other("ph://asset/1"));
    }

    #[tokio::test]
    async fn file_reference_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("img1.jpg");
        std::fs::write(&img, b"jpeg").unwrap();
        let reference = format!("file://{}", img.display());

        let stager = ImageStager::new(dir.path().join("staging"));
        let staged = stager.stage(&reference).await.unwrap();
        assert_eq!(staged.reference, reference);
        assert_eq!(staged.path, img);
        assert!(!dir.path().join("staging").exists());
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let stager = ImageStager::new(dir.path());
        let err = stager.stage("file:///definitely/not/here.jpg").await.unwrap_err();
        assert!(matches!(err, StageError::Missing(_)));
    }

    #[tokio::test]
    async fn content_reference_is_copied_into_staging() {
        let mounts = tempfile::tempdir().unwrap();
        let src_dir = mounts.path().join("media/external/images");
        std::fs::create_dir_all(&src_dir).unwrap();
        std::fs::write(src_dir.join("42.png"), b"png-bytes").unwrap();
        let staging = tempfile::tempdir().unwrap();

        let stager = ImageStager::new(staging.path()).with_resolver(MountedContentResolver::new(mounts.path()));
        let staged = stager.stage("content://media/external/images/42.png").await.unwrap();

        assert!(staged.reference.starts_with("file://"));
        assert!(staged.path.starts_with(staging.path()));
        let name = staged.path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("upload_") && name.ends_with(".png"));
        assert_eq!(std::fs::read(&staged.path).unwrap(), b"png-bytes");

        assert!(staged.temporary);

        let again = stager.stage(&staged.reference).await.unwrap();
        assert_eq!(again.reference, staged.reference);
        assert_eq!(again.path, staged.path);
        assert!(!again.temporary);

        stager.release(&again).await;
        assert!(staged.path.exists());
        stager.release(&staged).await;
        assert!(!staged.path.exists());
    }

    #[tokio::test]
    async fn percent_encoded_file_uri_is_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("My Photo.jpg");
        std::fs::write(&img, b"jpeg").unwrap();
        let reference = format!("file://{}/My%20Photo.jpg", dir.path().display());

        let stager = ImageStager::new(dir.path().join("staging"));
        let staged = stager.stage(&reference).await.unwrap();
        assert_eq!(staged.reference, reference);
        assert_eq!(staged.path, img);
        assert!(!staged.temporary);
    }

    #[test]
    fn localhost_file_uri_is_local_and_remote_host_is_not() {
        assert_eq!(
            classify("file://localhost/data/a.jpg"),
            ImageSource::File(PathBuf::from("/data/a.jpg"))
        );
        assert_eq!(
            classify("file://nas.local/data/a.jpg"),
            ImageSource::Other("file://nas.local/data/a.jpg")
        );
    }

    #[tokio::test]
    async fn content_authority_cannot_escape_root() {
        let base = tempfile::tempdir().unwrap();
        let mounts = base.path().join("mounts");
        std::fs::create_dir_all(&mounts).unwrap();
        std::fs::write(base.path().join("secret.jpg"), b"secret").unwrap();
        let staging = base.path().join("staging");

        let stager = ImageStager::new(&staging).with_resolver(MountedContentResolver::new(&mounts));
        let err = stager.stage("content://../secret.jpg").await.unwrap_err();
        assert!(matches!(err, StageError::Unsupported(_)));
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn content_without_resolver_is_unsupported() {
        let stager = ImageStager::new(std::env::temp_dir());
        let err = stager.stage("content://media/1").await.unwrap_err();
        assert!(matches!(err, StageError::Unsupported(_)));
    }

    #[test]
    fn resolver_refuses_parent_segments() {
        let resolver = MountedContentResolver::new("/mnt");
        assert!(resolver.resolve("media", "../etc/passwd").is_err());
        assert!(resolver.resolve("..", "etc/passwd").is_err());
        assert!(resolver.resolve(".", "1.jpg").is_err());
        assert!(resolver.resolve("", "1.jpg").is_err());
        assert!(resolver.resolve("media\\..", "1.jpg").is_err());
        assert_eq!(
            resolver.resolve("media", "external/1.jpg").unwrap(),
            PathBuf::from("/mnt/media/external/1.jpg")
        );
    }
}

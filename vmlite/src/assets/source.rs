//! Places an artifact can be fetched from.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use vmlite_shared::errors::{VmliteError, VmliteResult};

use crate::util::remove_file_if_exists;

/// A single candidate location for an artifact.
///
/// Implementations write the artifact to `dest` only once it is complete;
/// a failed fetch leaves nothing at `dest`.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Human-readable name used in logs and errors.
    fn describe(&self) -> String;

    async fn fetch(&self, dest: &Path) -> VmliteResult<()>;
}

/// Download over HTTP(S) with a bounded timeout.
#[derive(Debug, Clone)]
pub struct HttpSource {
    url: String,
    sha256: Option<String>,
    timeout: Duration,
}

impl HttpSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            sha256: None,
            timeout,
        }
    }

    /// Require the downloaded bytes to hash to `hex_digest`.
    pub fn with_sha256(mut self, hex_digest: impl Into<String>) -> Self {
        self.sha256 = Some(hex_digest.into().to_lowercase());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn download_to(&self, part: &Path) -> VmliteResult<String> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| VmliteError::Internal(format!("failed to build HTTP client: {}", e)))?;

        let response = client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| VmliteError::AssetUnavailable(format!("{}: {}", self.url, e)))?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(VmliteError::AssetUnavailable(format!(
                "{}: HTTP {}",
                self.url,
                response.status().as_u16()
            )));
        }

        let mut file = tokio::fs::File::create(part).await.map_err(|e| {
            VmliteError::Storage(format!("failed to create {}: {}", part.display(), e))
        })?;

        let mut hasher = Sha256::new();
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| VmliteError::AssetUnavailable(format!("{}: {}", self.url, e)))?;
            hasher.update(&chunk);
            written += chunk.len() as u64;
            file.write_all(&chunk).await.map_err(|e| {
                VmliteError::Storage(format!("failed to write {}: {}", part.display(), e))
            })?;
        }
        file.flush().await.map_err(|e| {
            VmliteError::Storage(format!("failed to flush {}: {}", part.display(), e))
        })?;

        if written == 0 {
            return Err(VmliteError::AssetUnavailable(format!(
                "{}: empty response body",
                self.url
            )));
        }

        tracing::debug!(url = %self.url, bytes = written, "Download complete");
        Ok(hex::encode(hasher.finalize()))
    }
}

#[async_trait]
impl ArtifactSource for HttpSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn fetch(&self, dest: &Path) -> VmliteResult<()> {
        let part = part_path(dest);
        let result: VmliteResult<()> = async {
            let digest = self.download_to(&part).await?;
            match &self.sha256 {
                Some(expected) if *expected != digest => {
                    return Err(VmliteError::AssetUnavailable(format!(
                        "{}: sha256 mismatch (expected {}, got {})",
                        self.url, expected, digest
                    )));
                }
                _ => {}
            }
            std::fs::rename(&part, dest).map_err(|e| {
                VmliteError::Storage(format!(
                    "failed to move {} into place: {}",
                    dest.display(),
                    e
                ))
            })
        }
        .await;

        if result.is_err() {
            let _ = remove_file_if_exists(&part);
        }
        result
    }
}

/// Copy from a file already on the host.
#[derive(Debug, Clone)]
pub struct LocalSource {
    path: PathBuf,
}

impl LocalSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ArtifactSource for LocalSource {
    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }

    async fn fetch(&self, dest: &Path) -> VmliteResult<()> {
        if !crate::util::is_non_empty_file(&self.path) {
            return Err(VmliteError::AssetUnavailable(format!(
                "{} is missing or empty",
                self.path.display()
            )));
        }
        let part = part_path(dest);
        let result: VmliteResult<()> = async {
            tokio::fs::copy(&self.path, &part).await.map_err(|e| {
                VmliteError::Storage(format!(
                    "failed to copy {} to {}: {}",
                    self.path.display(),
                    part.display(),
                    e
                ))
            })?;
            tokio::fs::rename(&part, dest).await.map_err(|e| {
                VmliteError::Storage(format!(
                    "failed to move {} into place: {}",
                    dest.display(),
                    e
                ))
            })
        }
        .await;

        if result.is_err() {
            let _ = remove_file_if_exists(&part);
        }
        result
    }
}

/// Build a source from a location string: `http(s)://` URLs download,
/// anything else (optionally `file://`) is a local path.
pub fn source_from_location(
    location: &str,
    sha256: Option<&str>,
    timeout: Duration,
) -> Box<dyn ArtifactSource> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let mut source = HttpSource::new(location, timeout);
        if let Some(digest) = sha256 {
            source = source.with_sha256(digest);
        }
        Box::new(source)
    } else {
        let path = location.strip_prefix("file://").unwrap_or(location);
        Box::new(LocalSource::new(path))
    }
}

/// Sibling path a fetch writes to before the final rename.
pub(crate) fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vmlite_test_utils::StaticServer;

    #[test]
    fn test_part_path_is_sibling() {
        assert_eq!(
            part_path(Path::new("/w/vmlinux")),
            PathBuf::from("/w/vmlinux.part")
        );
    }

    #[test]
    fn test_source_from_location() {
        let timeout = Duration::from_secs(1);
        let http = source_from_location("https://example.com/vmlinux", None, timeout);
        assert_eq!(http.describe(), "https://example.com/vmlinux");

        let local = source_from_location("file:///opt/vmlinux", None, timeout);
        assert_eq!(local.describe(), "file:///opt/vmlinux");
    }

    #[tokio::test]
    async fn test_local_source_copies() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src.bin");
        std::fs::write(&src, b"kernel").unwrap();
        let dest = temp.path().join("vmlinux");

        LocalSource::new(&src).fetch(&dest).await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"kernel");
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_local_source_rejects_empty() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("empty");
        std::fs::write(&src, b"").unwrap();
        let dest = temp.path().join("vmlinux");

        let err = LocalSource::new(&src).fetch(&dest).await.unwrap_err();
        assert!(matches!(err, VmliteError::AssetUnavailable(_)));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_http_source_unreachable() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("vmlinux");
        // Port 9 (discard) on localhost is closed in test environments.
        let source = HttpSource::new("http://127.0.0.1:9/vmlinux", Duration::from_secs(2));

        let err = source.fetch(&dest).await.unwrap_err();
        assert!(matches!(err, VmliteError::AssetUnavailable(_)));
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_local_source_cleans_part_on_failure() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src.bin");
        std::fs::write(&src, b"kernel").unwrap();
        // A non-empty directory at the destination makes the final move fail.
        let dest = temp.path().join("vmlinux");
        std::fs::create_dir(&dest).unwrap();
        std::fs::write(dest.join("keep"), b"x").unwrap();

        let err = LocalSource::new(&src).fetch(&dest).await.unwrap_err();
        assert!(matches!(err, VmliteError::Storage(_)), "got {err}");
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_http_source_downloads() {
        let server = StaticServer::start([("/vmlinux", 200, b"kernel".to_vec())]);
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("vmlinux");
        let digest = hex::encode(Sha256::digest(b"kernel"));

        HttpSource::new(server.url("/vmlinux"), Duration::from_secs(5))
            .with_sha256(digest.to_uppercase())
            .fetch(&dest)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"kernel");
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_http_source_rejects_empty_body() {
        let server = StaticServer::start([("/vmlinux", 200, Vec::new())]);
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("vmlinux");

        let err = HttpSource::new(server.url("/vmlinux"), Duration::from_secs(5))
            .fetch(&dest)
            .await
            .unwrap_err();

        match err {
            VmliteError::AssetUnavailable(message) => assert!(message.contains("empty")),
            other => panic!("expected AssetUnavailable, got {other}"),
        }
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_http_source_rejects_digest_mismatch() {
        let server = StaticServer::start([("/vmlinux", 200, b"kernel".to_vec())]);
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("vmlinux");

        let err = HttpSource::new(server.url("/vmlinux"), Duration::from_secs(5))
            .with_sha256("00".repeat(32))
            .fetch(&dest)
            .await
            .unwrap_err();

        match err {
            VmliteError::AssetUnavailable(message) => assert!(message.contains("sha256 mismatch")),
            other => panic!("expected AssetUnavailable, got {other}"),
        }
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }
}

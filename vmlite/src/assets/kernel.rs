use std::path::{Path, PathBuf};

use async_trait::async_trait;
use vmlite_shared::errors::{VmliteError, VmliteResult};

use super::first_success;
use super::source::ArtifactSource;

/// How the kernel image at [`KernelAsset::path`] came to exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelOrigin {
    /// Left over from an earlier run.
    Existing,
    Downloaded { source: String },
    Built,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelAsset {
    pub path: PathBuf,
    pub origin: KernelOrigin,
}

/// Produces a kernel image when no source can.
#[async_trait]
pub trait KernelBuilder: Send + Sync {
    async fn build(&self, dest: &Path) -> VmliteResult<()>;
}

/// Resolves the guest kernel: reuse, then ordered sources, then build.
pub struct KernelResolver {
    sources: Vec<Box<dyn ArtifactSource>>,
    builder: Option<Box<dyn KernelBuilder>>,
}

impl KernelResolver {
    pub fn new(sources: Vec<Box<dyn ArtifactSource>>) -> Self {
        Self {
            sources,
            builder: None,
        }
    }

    pub fn with_builder(mut self, builder: Box<dyn KernelBuilder>) -> Self {
        self.builder = Some(builder);
        self
    }

    pub async fn resolve(&self, dest: &Path) -> VmliteResult<KernelAsset> {
        if crate::util::is_non_empty_file(dest) {
            tracing::info!(kernel = %dest.display(), "Reusing existing kernel image");
            return Ok(KernelAsset {
                path: dest.to_path_buf(),
                origin: KernelOrigin::Existing,
            });
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                VmliteError::Storage(format!(
                    "failed to create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let download_err = if self.sources.is_empty() {
            None
        } else {
            match first_success(&self.sources, |s| s.describe(), |s| s.fetch(dest)).await {
                Ok((index, ())) => {
                    let source = self.sources[index].describe();
                    tracing::info!(kernel = %dest.display(), source = %source, "✅ Kernel downloaded");
                    return Ok(KernelAsset {
                        path: dest.to_path_buf(),
                        origin: KernelOrigin::Downloaded { source },
                    });
                }
                Err(e) => Some(e),
            }
        };

        let Some(builder) = &self.builder else {
            return Err(match download_err {
                Some(e) => e,
                None => VmliteError::AssetUnavailable(
                    "no kernel sources and no build fallback configured".to_string(),
                ),
            });
        };

        if download_err.is_some() {
            tracing::warn!("All kernel sources failed, falling back to building from source");
        } else {
            tracing::info!("No kernel sources configured, building from source");
        }

        builder.build(dest).await.map_err(|e| match e {
            VmliteError::BuildFailure(_) => e,
            other => VmliteError::BuildFailure(other.to_string()),
        })?;

        if !crate::util::is_non_empty_file(dest) {
            return Err(VmliteError::BuildFailure(format!(
                "build finished but {} is missing or empty",
                dest.display()
            )));
        }

        Ok(KernelAsset {
            path: dest.to_path_buf(),
            origin: KernelOrigin::Built,
        })
    }
}

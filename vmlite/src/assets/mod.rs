//! Kernel acquisition: ordered download candidates with a build fallback.

mod build;
mod kernel;
mod source;

pub use build::{BuildStep, KernelBuildOptions, ProcessRunner, SourceBuild, StepRunner};
pub use kernel::{KernelAsset, KernelBuilder, KernelOrigin, KernelResolver};
pub(crate) use source::part_path;
pub use source::{ArtifactSource, HttpSource, LocalSource, source_from_location};

use std::future::Future;

use vmlite_shared::errors::{VmliteError, VmliteResult};

/// Try `attempt` on each candidate in order and return the first success.
///
/// Each failure is logged as a warning and the next candidate is tried.
/// Candidates after the first success are never attempted. When all fail,
/// the error lists every candidate with its failure.
pub async fn first_success<'a, C, T, F, Fut>(
    candidates: &'a [C],
    describe: impl Fn(&C) -> String,
    mut attempt: F,
) -> VmliteResult<(usize, T)>
where
    F: FnMut(&'a C) -> Fut,
    Fut: Future<Output = VmliteResult<T>>,
{
    let mut failures = Vec::with_capacity(candidates.len());

    for (index, candidate) in candidates.iter().enumerate() {
        let name = describe(candidate);
        match attempt(candidate).await {
            Ok(value) => return Ok((index, value)),
            Err(e) => {
                tracing::warn!(
                    candidate = %name,
                    remaining = candidates.len() - index - 1,
                    error = %e,
                    "Candidate failed, trying next"
                );
                failures.push(format!("{}: {}", name, e));
            }
        }
    }

    if failures.is_empty() {
        return Err(VmliteError::AssetUnavailable(
            "no candidates configured".to_string(),
        ));
    }
    Err(VmliteError::AssetUnavailable(failures.join("; ")))
}

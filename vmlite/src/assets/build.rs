//! From-source kernel build, the terminal fallback of kernel resolution.
//!
//! The build is a fixed sequence of [`BuildStep`]s executed by a
//! [`StepRunner`]. The default runner spawns real processes; tests substitute
//! their own.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vmlite_shared::constants::kernel as kernel_defaults;
use vmlite_shared::errors::{VmliteError, VmliteResult};

use super::kernel::KernelBuilder;
use super::source::part_path;

/// Where the kernel source comes from and how it is configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelBuildOptions {
    pub git_url: String,
    pub branch: String,
    /// `make` target that produces the base `.config`.
    pub defconfig: String,
    /// Kernel options forced on after the preset (without the `CONFIG_` prefix).
    pub enable: Vec<String>,
    /// Packages installed with apt before building. Empty skips the stage.
    pub packages: Vec<String>,
    /// Parallel compile jobs. `None` uses the host's available parallelism.
    pub jobs: Option<usize>,
}

impl Default for KernelBuildOptions {
    fn default() -> Self {
        Self {
            git_url: kernel_defaults::DEFAULT_GIT_URL.to_string(),
            branch: kernel_defaults::DEFAULT_GIT_BRANCH.to_string(),
            defconfig: kernel_defaults::DEFAULT_DEFCONFIG.to_string(),
            enable: kernel_defaults::REQUIRED_OPTIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            packages: kernel_defaults::BUILD_PACKAGES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            jobs: None,
        }
    }
}

/// One external command of the build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStep {
    /// Stage name reported on failure.
    pub stage: &'static str,
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl BuildStep {
    fn new(stage: &'static str, program: &str, args: &[&str]) -> Self {
        Self {
            stage,
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            cwd: None,
        }
    }

    fn in_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Executes build steps.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Run one step. A non-zero exit is an error.
    async fn run(&self, step: &BuildStep) -> VmliteResult<()>;
}

/// Runs steps as child processes.
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

/// Lines of stderr kept in a failure message.
const STDERR_TAIL_LINES: usize = 20;

#[async_trait]
impl StepRunner for ProcessRunner {
    async fn run(&self, step: &BuildStep) -> VmliteResult<()> {
        tracing::info!(stage = step.stage, command = %step.command_line(), "Running build step");

        let mut cmd = tokio::process::Command::new(&step.program);
        cmd.args(&step.args).stdin(std::process::Stdio::null());
        if let Some(dir) = &step.cwd {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await.map_err(|e| {
            VmliteError::BuildFailure(format!(
                "stage '{}': failed to spawn `{}`: {}",
                step.stage, step.program, e
            ))
        })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<&str> = stderr.lines().collect();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
        Err(VmliteError::BuildFailure(format!(
            "stage '{}': `{}` exited with {}\n{}",
            step.stage,
            step.program,
            output.status.code().unwrap_or(-1),
            tail
        )))
    }
}

/// Builds `vmlinux` from a git checkout.
pub struct SourceBuild {
    options: KernelBuildOptions,
    build_dir: PathBuf,
    runner: Box<dyn StepRunner>,
}

impl SourceBuild {
    /// `build_dir` holds the checkout; it is reused by later builds.
    pub fn new(options: KernelBuildOptions, build_dir: impl Into<PathBuf>) -> Self {
        Self {
            options,
            build_dir: build_dir.into(),
            runner: Box::new(ProcessRunner),
        }
    }

    pub fn with_runner(mut self, runner: Box<dyn StepRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn source_dir(&self) -> PathBuf {
        self.build_dir.join("linux")
    }

    /// Every step of the build, in execution order.
    pub fn plan(&self) -> Vec<BuildStep> {
        let src = self.source_dir();
        let opts = &self.options;
        let mut steps = Vec::new();

        if !opts.packages.is_empty() {
            let mut args = vec!["install", "-y"];
            args.extend(opts.packages.iter().map(String::as_str));
            steps.push(BuildStep::new("install-deps", "apt-get", &args));
        }

        if !src.join(".git").exists() {
            let src_str = src.to_string_lossy().into_owned();
            steps.push(BuildStep::new(
                "clone",
                "git",
                &[
                    "clone",
                    "--depth",
                    "1",
                    "--branch",
                    opts.branch.as_str(),
                    opts.git_url.as_str(),
                    src_str.as_str(),
                ],
            ));
        }

        steps.push(BuildStep::new("configure", "make", &[opts.defconfig.as_str()]).in_dir(&src));
        if !opts.enable.is_empty() {
            let mut args = Vec::with_capacity(opts.enable.len() * 2);
            for option in &opts.enable {
                args.push("--enable");
                args.push(option.as_str());
            }
            let script = src.join("scripts/config");
            steps.push(
                BuildStep::new("configure", &script.to_string_lossy(), &args).in_dir(&src),
            );
        }
        steps.push(BuildStep::new("configure", "make", &["olddefconfig"]).in_dir(&src));

        let jobs = format!("-j{}", self.jobs());
        steps.push(BuildStep::new("compile", "make", &[jobs.as_str(), "vmlinux"]).in_dir(&src));
        steps
    }

    fn jobs(&self) -> usize {
        self.options.jobs.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

#[async_trait]
impl KernelBuilder for SourceBuild {
    async fn build(&self, dest: &Path) -> VmliteResult<()> {
        std::fs::create_dir_all(&self.build_dir).map_err(|e| {
            VmliteError::BuildFailure(format!(
                "stage 'prepare': cannot create {}: {}",
                self.build_dir.display(),
                e
            ))
        })?;

        for step in self.plan() {
            self.runner.run(&step).await?;
        }

        let image = self.source_dir().join("vmlinux");
        if !crate::util::is_non_empty_file(&image) {
            return Err(VmliteError::BuildFailure(format!(
                "stage 'install': {} was not produced",
                image.display()
            )));
        }

        let part = part_path(dest);
        std::fs::copy(&image, &part)
            .and_then(|_| std::fs::rename(&part, dest))
            .map_err(|e| {
                let _ = std::fs::remove_file(&part);
                VmliteError::BuildFailure(format!(
                    "stage 'install': cannot copy {} to {}: {}",
                    image.display(),
                    dest.display(),
                    e
                ))
            })?;

        tracing::info!(image = %dest.display(), "✅ Kernel built from source");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Records steps; fails the first step of `fail_stage`, or writes a fake
    /// `vmlinux` on compile.
    struct ScriptedRunner {
        seen: Arc<Mutex<Vec<BuildStep>>>,
        fail_stage: Option<&'static str>,
    }

    #[async_trait]
    impl StepRunner for ScriptedRunner {
        async fn run(&self, step: &BuildStep) -> VmliteResult<()> {
            self.seen.lock().unwrap().push(step.clone());
            if self.fail_stage == Some(step.stage) {
                return Err(VmliteError::BuildFailure(format!("stage '{}'", step.stage)));
            }
            if step.stage == "compile" {
                let dir = step.cwd.as_ref().unwrap();
                std::fs::create_dir_all(dir).unwrap();
                std::fs::write(dir.join("vmlinux"), b"ELF").unwrap();
            }
            Ok(())
        }
    }

    fn options() -> KernelBuildOptions {
        KernelBuildOptions {
            jobs: Some(4),
            ..Default::default()
        }
    }

    #[test]
    fn test_plan_order() {
        let temp = TempDir::new().unwrap();
        let build = SourceBuild::new(options(), temp.path());
        let steps = build.plan();

        let stages: Vec<_> = steps.iter().map(|s| s.stage).collect();
        assert_eq!(
            stages,
            vec![
                "install-deps",
                "clone",
                "configure",
                "configure",
                "configure",
                "compile"
            ]
        );
        assert!(steps[1].args.contains(&"--depth".to_string()));
        assert!(steps[3].command_line().contains("--enable PVH"));
        assert_eq!(steps[5].args, vec!["-j4", "vmlinux"]);
    }

    #[test]
    fn test_plan_skips_clone_when_checkout_exists() {
        let temp = TempDir::new().unwrap();
        let build = SourceBuild::new(
            KernelBuildOptions {
                packages: vec![],
                ..options()
            },
            temp.path(),
        );
        std::fs::create_dir_all(build.source_dir().join(".git")).unwrap();

        let stages: Vec<_> = build.plan().iter().map(|s| s.stage).collect();
        assert!(!stages.contains(&"clone"));
        assert!(!stages.contains(&"install-deps"));
    }

    #[tokio::test]
    async fn test_build_installs_image() {
        let temp = TempDir::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let build = SourceBuild::new(options(), temp.path().join("build")).with_runner(
            Box::new(ScriptedRunner {
                seen: seen.clone(),
                fail_stage: None,
            }),
        );
        let dest = temp.path().join("vmlinux");

        build.build(&dest).await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"ELF");
        assert_eq!(seen.lock().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_build_stops_at_failed_stage() {
        let temp = TempDir::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let build = SourceBuild::new(options(), temp.path().join("build")).with_runner(
            Box::new(ScriptedRunner {
                seen: seen.clone(),
                fail_stage: Some("clone"),
            }),
        );
        let dest = temp.path().join("vmlinux");

        let err = build.build(&dest).await.unwrap_err();

        assert!(matches!(err, VmliteError::BuildFailure(_)));
        assert!(err.to_string().contains("clone"));
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_process_runner_reports_exit_code() {
        let step = BuildStep::new("compile", "sh", &["-c", "echo boom >&2; exit 3"]);
        let err = ProcessRunner.run(&step).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exited with 3"));
        assert!(msg.contains("boom"));
    }
}

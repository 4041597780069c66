//! Compilation Engine: turns rendered LaTeX into a PDF with an external compiler.
//!
//! # Job lifecycle
//! `Preparing` (locate compiler, reset workspace) → attempt 1 → on failure,
//! toolchain repair + attempt 2 → artifact check → optional relocation.
//!
//! - Every attempt runs the compiler twice so cross-references resolve.
//! - Each invocation is bounded by the configured timeout; a timeout on pass 1
//!   fails the attempt without starting pass 2.
//! - Exactly one retry, and only when the repair utility exists.
//! - A process killed through [`CompilationEngine::kill_compilation`] ends the
//!   job as `Cancelled` and is never retried.
//!
//! At most one compiler process is live per engine. Jobs are serialised by an
//! internal lock so the workspace is only ever used by one job.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::time;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::pipeline::cancel::CancelFlag;

pub mod diagnostics;
pub mod handlers;
pub mod toolchain;
pub mod workspace;

use diagnostics::{collect_diagnostics, extract_diagnostics};
use toolchain::{search_path, Toolchain};
use workspace::Workspace;

/// Compiler runs per attempt.
const PASSES_PER_ATTEMPT: u8 = 2;
/// Reference per-invocation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// How long to wait for stderr to drain after the compiler has been stopped.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);
/// File-name database refresh, then font-map rebuild.
const REPAIR_STEPS: [&str; 2] = ["--update-fndb", "--mkmaps"];

const UNKNOWN_ERROR: &str = "PDF not generated (unknown LaTeX error).";

// ────────────────────────────────────────────────────────────────────────────
// Errors and outcomes
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CompileError {
    /// Terminal. Carries the untouched source so callers can offer an external
    /// compile service instead.
    #[error("{guidance}")]
    ToolchainMissing {
        guidance: String,
        source_text: String,
    },

    #[error("Compilation timed out ({}s)", .timeout.as_secs())]
    Timeout { timeout: Duration },

    #[error("LaTeX Compilation Failed:\n{diagnostics}")]
    Failed { diagnostics: String },

    #[error("Compilation cancelled")]
    Cancelled,

    #[error("Workspace I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CompileError {
    pub fn is_missing_toolchain(&self) -> bool {
        matches!(self, CompileError::ToolchainMissing { .. })
    }
}

/// Why a single attempt failed. Only some of these are eligible for the retry.
#[derive(Debug, Error)]
enum AttemptError {
    #[error("compiler exited with status {code:?}")]
    Exit { code: Option<i32>, stderr: String },

    #[error("pass {pass} timed out")]
    Timeout { pass: u8 },

    #[error("killed")]
    Cancelled,

    #[error("failed to run compiler: {0}")]
    Spawn(io::Error),
}

/// A finished PDF.
#[derive(Debug, Clone, Serialize)]
pub struct CompiledArtifact {
    pub job_id: Uuid,
    /// Relocated copy when an output directory is configured, else the workspace file.
    pub pdf_path: PathBuf,
    /// Valid until the next job resets the workspace.
    pub workspace_pdf_path: PathBuf,
    pub attempts: u32,
    pub compiled_at: DateTime<Utc>,
}

impl CompiledArtifact {
    pub async fn to_base64(&self) -> io::Result<String> {
        let bytes = tokio::fs::read(&self.pdf_path).await?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

/// Flat, serializable summary of a compile call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompilationOutcome {
    Success {
        artifact_path: PathBuf,
    },
    Failure {
        diagnostic_text: String,
        is_missing_toolchain: bool,
    },
}

impl CompilationOutcome {
    pub fn from_result(result: &Result<CompiledArtifact, CompileError>) -> Self {
        match result {
            Ok(artifact) => CompilationOutcome::Success {
                artifact_path: artifact.pdf_path.clone(),
            },
            Err(e) => CompilationOutcome::Failure {
                diagnostic_text: e.to_string(),
                is_missing_toolchain: e.is_missing_toolchain(),
            },
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Engine
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub toolchain: Toolchain,
    /// The workspace lives at `<work_root>/build`.
    pub work_root: PathBuf,
    pub timeout: Duration,
    pub output_dir: Option<PathBuf>,
}

/// Per-call bookkeeping.
#[derive(Debug)]
struct CompilationJob {
    id: Uuid,
    attempt_count: u32,
    timeout: Duration,
}

/// Handle to the live compiler process. Sending on `kill` terminates it.
struct RunningProcess {
    token: u64,
    kill: oneshot::Sender<()>,
}

enum PassEnd {
    Exited(io::Result<std::process::ExitStatus>),
    TimedOut,
    Killed,
}

pub struct CompilationEngine {
    config: EngineConfig,
    workspace: Workspace,
    running: Mutex<Option<RunningProcess>>,
    next_token: AtomicU64,
    job_lock: tokio::sync::Mutex<()>,
    cancel: CancelFlag,
}

impl CompilationEngine {
    pub fn new(config: EngineConfig, cancel: CancelFlag) -> Self {
        let workspace = Workspace::new(&config.work_root);
        Self {
            config,
            workspace,
            running: Mutex::new(None),
            next_token: AtomicU64::new(0),
            job_lock: tokio::sync::Mutex::new(()),
            cancel,
        }
    }

    pub fn workspace_dir(&self) -> &Path {
        self.workspace.dir()
    }

    /// Compiles `source_text` into a PDF.
    pub async fn compile(&self, source_text: &str) -> Result<CompiledArtifact, CompileError> {
        let _job_guard = self.job_lock.lock().await;
        let mut job = CompilationJob {
            id: Uuid::new_v4(),
            attempt_count: 0,
            timeout: self.config.timeout,
        };
        info!(job_id = %job.id, "Starting PDF compilation");

        if self.cancel.is_cancelled() {
            return Err(CompileError::Cancelled);
        }

        let Some(compiler) = self.config.toolchain.locate_compiler() else {
            error!(job_id = %job.id, "{} not found", self.config.toolchain.compiler);
            return Err(CompileError::ToolchainMissing {
                guidance: missing_toolchain_guidance(&self.config.toolchain.compiler),
                source_text: source_text.to_string(),
            });
        };

        self.workspace.reset(source_text).await?;
        debug!(job_id = %job.id, workspace = %self.workspace.dir().display(), "Workspace ready");

        let result = match self.run_attempt(&compiler, &mut job).await {
            Ok(()) => Ok(()),
            Err(e @ (AttemptError::Cancelled | AttemptError::Spawn(_))) => Err(e),
            Err(first) => match self.config.toolchain.locate_repair_tool() {
                Some(repair) => {
                    warn!(
                        job_id = %job.id,
                        "Compilation failed ({first}). Attempting toolchain database refresh..."
                    );
                    self.run_repair(&repair).await?;
                    self.run_attempt(&compiler, &mut job).await
                }
                None => {
                    debug!(job_id = %job.id, "No repair utility available; not retrying");
                    Err(first)
                }
            },
        };

        match result {
            Ok(()) => self.finish(&job).await,
            Err(e) => Err(self.terminal_failure(&job, e).await),
        }
    }

    /// Terminates the live compiler process, if any. Returns whether one was running.
    pub fn kill_compilation(&self) -> bool {
        let process = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match process {
            Some(process) => {
                info!("Killing running compilation");
                process.kill.send(()).is_ok()
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    async fn run_attempt(
        &self,
        compiler: &Path,
        job: &mut CompilationJob,
    ) -> Result<(), AttemptError> {
        job.attempt_count += 1;
        info!(job_id = %job.id, attempt = job.attempt_count, "Compiling");
        for pass in 1..=PASSES_PER_ATTEMPT {
            self.run_pass(compiler, job, pass).await?;
        }
        Ok(())
    }

    async fn run_pass(
        &self,
        compiler: &Path,
        job: &CompilationJob,
        pass: u8,
    ) -> Result<(), AttemptError> {
        if self.cancel.is_cancelled() {
            return Err(AttemptError::Cancelled);
        }

        let mut command = Command::new(compiler);
        command
            .args([
                "-interaction=nonstopmode",
                "-halt-on-error",
                "-file-line-error",
                "-output-directory",
            ])
            .arg(self.workspace.dir())
            .arg(self.workspace.source_path())
            .current_dir(self.workspace.dir())
            .env("PATH", search_path())
            .stdin(Stdio::null())
            // Everything useful ends up in the log file.
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(job_id = %job.id, pass, "Executing {}", compiler.display());
        let mut child = command.spawn().map_err(AttemptError::Spawn)?;
        let (token, mut kill_rx) = self.register_process();

        let stderr_pipe = child.stderr.take();
        let mut stderr_task = tokio::spawn(async move {
            let mut buffer = Vec::new();
            if let Some(mut pipe) = stderr_pipe {
                let _ = pipe.read_to_end(&mut buffer).await;
            }
            buffer
        });

        // A cancel that landed between the checkpoint and registration had no
        // process to kill.
        let end = if self.cancel.is_cancelled() {
            PassEnd::Killed
        } else {
            tokio::select! {
                status = child.wait() => PassEnd::Exited(status),
                _ = time::sleep(job.timeout) => PassEnd::TimedOut,
                Ok(()) = &mut kill_rx => PassEnd::Killed,
            }
        };
        self.clear_process(token);

        if !matches!(end, PassEnd::Exited(_)) {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }

        let stderr = match time::timeout(STDERR_DRAIN_TIMEOUT, &mut stderr_task).await {
            Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            _ => {
                stderr_task.abort();
                String::new()
            }
        };

        match end {
            PassEnd::Exited(Ok(status)) if status.success() => {
                debug!(job_id = %job.id, pass, "Pass complete");
                Ok(())
            }
            PassEnd::Exited(Ok(status)) => {
                error!(job_id = %job.id, pass, "Compiler returned code {:?}", status.code());
                Err(AttemptError::Exit {
                    code: status.code(),
                    stderr,
                })
            }
            PassEnd::Exited(Err(e)) => Err(AttemptError::Spawn(e)),
            PassEnd::TimedOut => {
                error!(job_id = %job.id, pass, "Compilation timed out after {:?}", job.timeout);
                Err(AttemptError::Timeout { pass })
            }
            PassEnd::Killed => {
                info!(job_id = %job.id, pass, "Compilation killed");
                Err(AttemptError::Cancelled)
            }
        }
    }

    /// Rebuilds the toolchain's file-name database and font maps. The outcome
    /// of each step is ignored; the retry decides whether it helped.
    async fn run_repair(&self, repair: &Path) -> Result<(), CompileError> {
        for step in REPAIR_STEPS {
            if self.cancel.is_cancelled() {
                return Err(CompileError::Cancelled);
            }

            let mut command = Command::new(repair);
            command
                .arg(step)
                .env("PATH", search_path())
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true);

            tokio::select! {
                result = time::timeout(self.config.timeout, command.status()) => match result {
                    Ok(Ok(status)) => debug!("{} {step} exited with {status}", repair.display()),
                    Ok(Err(e)) => warn!("Failed to run {} {step}: {e}", repair.display()),
                    Err(_) => warn!("{} {step} timed out", repair.display()),
                },
                _ = self.cancel.cancelled() => return Err(CompileError::Cancelled),
            }
        }
        Ok(())
    }

    async fn finish(&self, job: &CompilationJob) -> Result<CompiledArtifact, CompileError> {
        let workspace_pdf_path = self.workspace.artifact_path();

        // Compilers can exit 0 without writing output.
        if !tokio::fs::try_exists(&workspace_pdf_path)
            .await
            .unwrap_or(false)
        {
            error!(job_id = %job.id, "Compiler reported success but produced no PDF");
            let mut diagnostics = UNKNOWN_ERROR.to_string();
            if let Ok(log) = tokio::fs::read(self.workspace.log_path()).await {
                diagnostics.push_str("\nLog tail:\n");
                diagnostics.push_str(&extract_diagnostics(&String::from_utf8_lossy(&log)));
            }
            return Err(CompileError::Failed { diagnostics });
        }

        let pdf_path = match &self.config.output_dir {
            Some(output_dir) => self.workspace.relocate_artifact(output_dir).await?,
            None => workspace_pdf_path.clone(),
        };

        info!(
            job_id = %job.id,
            attempts = job.attempt_count,
            "PDF compiled: {}",
            pdf_path.display()
        );

        Ok(CompiledArtifact {
            job_id: job.id,
            pdf_path,
            workspace_pdf_path,
            attempts: job.attempt_count,
            compiled_at: Utc::now(),
        })
    }

    async fn terminal_failure(&self, job: &CompilationJob, failure: AttemptError) -> CompileError {
        let err = match failure {
            AttemptError::Cancelled => CompileError::Cancelled,
            AttemptError::Spawn(e) => CompileError::Io(e),
            AttemptError::Timeout { .. } => CompileError::Timeout {
                timeout: job.timeout,
            },
            AttemptError::Exit { stderr, .. } => CompileError::Failed {
                diagnostics: collect_diagnostics(&self.workspace.log_path(), &stderr).await,
            },
        };
        if !matches!(err, CompileError::Cancelled) {
            error!(
                job_id = %job.id,
                attempts = job.attempt_count,
                "Compilation failed: {err}"
            );
        }
        err
    }

    fn register_process(&self) -> (u64, oneshot::Receiver<()>) {
        let (kill, kill_rx) = oneshot::channel();
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        *self.running.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(RunningProcess { token, kill });
        (token, kill_rx)
    }

    /// Clears the slot only if it still holds this pass's process.
    fn clear_process(&self, token: u64) {
        let mut slot = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|p| p.token == token) {
            *slot = None;
        }
    }
}

fn missing_toolchain_guidance(compiler: &str) -> String {
    format!(
        "{compiler} not found.\n\
         Install MiKTeX (https://miktex.org) or TeX Live.\n\
         Alternatively, download the .tex file and compile on Overleaf."
    )
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

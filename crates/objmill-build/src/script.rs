//! Pre-build task execution
//!
//! Manifest entries may carry shell commands that must run before their file
//! is compiled (code generators, mostly). They run once per build, after flag
//! resolution has settled, in the order the files were queued.

use crate::compiler::CompileTask;
use crate::error::{BuildError, BuildResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of a single task command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub file: PathBuf,
    pub command: String,
    pub exit_code: i32,
    pub duration: Duration,
}

impl TaskResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Totals for one task phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskReport {
    pub executed: usize,
    pub failed: usize,
}

/// Runs pre-build commands through the platform shell
#[derive(Debug, Clone)]
pub struct TaskRunner {
    working_dir: PathBuf,
    build_type: String,
    fail_on_error: bool,
}

impl TaskRunner {
    pub fn new(working_dir: impl Into<PathBuf>, build_type: impl Into<String>) -> Self {
        Self {
            working_dir: working_dir.into(),
            build_type: build_type.into(),
            fail_on_error: false,
        }
    }

    /// Treat a nonzero exit as fatal instead of logging it
    pub fn with_fail_on_error(mut self, fail_on_error: bool) -> Self {
        self.fail_on_error = fail_on_error;
        self
    }

    /// Variables exported to every task
    pub fn environment(&self, file: &Path) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert(
            "OBJMILL_ROOT".to_string(),
            self.working_dir.display().to_string(),
        );
        env.insert("OBJMILL_BUILD_TYPE".to_string(), self.build_type.clone());
        env.insert("OBJMILL_SOURCE".to_string(), file.display().to_string());
        env
    }

    /// Run the tasks of every queued file, in queue order
    pub fn run_all(&self, tasks: &[CompileTask]) -> BuildResult<TaskReport> {
        let mut report = TaskReport::default();
        for task in tasks {
            for command in &task.pre_build_tasks {
                let result = self.run(&task.source, command)?;
                report.executed += 1;
                if !result.success() {
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Run one command for `file`
    pub fn run(&self, file: &Path, command: &str) -> BuildResult<TaskResult> {
        info!("Running task for {}: {}", file.display(), command);
        let start = Instant::now();

        let status = shell(command)
            .current_dir(&self.working_dir)
            .envs(self.environment(file))
            .status()
            .map_err(|e| BuildError::spawn(command, e))?;

        let result = TaskResult {
            file: file.to_path_buf(),
            command: command.to_string(),
            exit_code: status.code().unwrap_or(1),
            duration: start.elapsed(),
        };

        if result.success() {
            debug!(
                "Task finished in {:.2}s: {}",
                result.duration.as_secs_f64(),
                command
            );
        } else if self.fail_on_error {
            return Err(BuildError::TaskFailed {
                file: result.file,
                command: result.command,
                exit_code: result.exit_code,
            });
        } else {
            warn!(
                "Task for {} exited with code {}; continuing: {}",
                file.display(),
                result.exit_code,
                command
            );
        }

        Ok(result)
    }
}

#[cfg(not(windows))]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

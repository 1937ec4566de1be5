//! Parallel compilation of queued files
//!
//! Without a job limit every task gets its own compiler process at once and
//! the control thread then waits on each child in submission order, so all
//! bookkeeping stays on one thread. With a limit the tasks run on a rayon
//! pool of that many workers. Either way a failing task never cancels its
//! siblings, and failures are reported in submission order.

use crate::cache::StaleReason;
use crate::error::{BuildError, BuildResult};
use crate::flags::FlagSet;
use rayon::prelude::*;
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command};
use tracing::{error, info};

/// One file to compile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileTask {
    /// Source path as written in the manifest
    pub source: PathBuf,
    /// Raw per-file compiler arguments
    pub extra_args: Vec<String>,
    pub include_paths: Vec<PathBuf>,
    /// Cached object path to produce
    pub object: PathBuf,
    /// Commands to run before compiling
    pub pre_build_tasks: Vec<String>,
    pub reason: StaleReason,
}

impl CompileTask {
    /// Compiler arguments: flags, source, extra args, `-c -o <object>`, then `-I` paths
    pub fn arguments(&self, flags: &FlagSet) -> Vec<String> {
        let mut args: Vec<String> = flags
            .tokens()
            .iter()
            .flat_map(|t| t.split_whitespace())
            .map(str::to_string)
            .collect();
        args.push(self.source.to_string_lossy().into_owned());
        args.extend(
            self.extra_args
                .iter()
                .flat_map(|a| a.split_whitespace())
                .map(str::to_string),
        );
        args.push("-c".to_string());
        args.push("-o".to_string());
        args.push(self.object.to_string_lossy().into_owned());
        args.extend(
            self.include_paths
                .iter()
                .map(|p| format!("-I{}", p.display())),
        );
        args
    }
}

/// Aggregate result of a compile phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileReport {
    /// Tasks that ran to completion, successfully or not
    pub completed: usize,
    /// Sources whose compilation failed, in submission order
    pub failures: Vec<PathBuf>,
}

impl CompileReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.completed - self.failures.len()
    }

    fn record(&mut self, task: &CompileTask, success: bool) {
        self.completed += 1;
        if !success {
            error!("Failed to compile: {}", task.source.display());
            self.failures.push(task.source.clone());
        }
    }
}

/// Spawns one compiler process per task
#[derive(Debug, Clone)]
pub struct ParallelCompiler {
    program: String,
    working_dir: PathBuf,
    jobs: Option<usize>,
}

impl ParallelCompiler {
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            working_dir: working_dir.into(),
            jobs: None,
        }
    }

    /// Cap the number of concurrent compiler processes; `None` is unbounded
    pub fn with_jobs(mut self, jobs: Option<usize>) -> Self {
        self.jobs = jobs.filter(|&n| n > 0);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Compile every task and wait for all of them
    pub fn compile(&self, flags: &FlagSet, tasks: &[CompileTask]) -> BuildResult<CompileReport> {
        match self.jobs {
            _ if tasks.is_empty() => Ok(CompileReport::default()),
            None => Ok(self.compile_unbounded(flags, tasks)),
            Some(jobs) => self.compile_pooled(jobs, flags, tasks),
        }
    }

    fn compile_unbounded(&self, flags: &FlagSet, tasks: &[CompileTask]) -> CompileReport {
        let children: Vec<io::Result<Child>> = tasks
            .iter()
            .map(|task| self.command(flags, task).spawn())
            .collect();

        let mut report = CompileReport::default();
        for (task, child) in tasks.iter().zip(children) {
            let success = match child {
                Ok(mut child) => self.wait(task, child.wait()),
                Err(e) => self.spawn_failed(task, e),
            };
            report.record(task, success);
        }
        report
    }

    fn compile_pooled(
        &self,
        jobs: usize,
        flags: &FlagSet,
        tasks: &[CompileTask],
    ) -> BuildResult<CompileReport> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .map_err(|e| {
                BuildError::spawn("compile worker pool", io::Error::other(e.to_string()))
            })?;

        let outcomes: Vec<bool> = pool.install(|| {
            tasks
                .par_iter()
                .map(|task| match self.command(flags, task).status() {
                    Ok(status) => self.wait(task, Ok(status)),
                    Err(e) => self.spawn_failed(task, e),
                })
                .collect()
        });

        let mut report = CompileReport::default();
        for (task, success) in tasks.iter().zip(outcomes) {
            report.record(task, success);
        }
        Ok(report)
    }

    fn command(&self, flags: &FlagSet, task: &CompileTask) -> Command {
        let args = task.arguments(flags);
        info!("{} {}", self.program, args.join(" "));

        let mut command = Command::new(&self.program);
        command.args(&args).current_dir(&self.working_dir);
        command
    }

    fn wait(&self, task: &CompileTask, status: io::Result<std::process::ExitStatus>) -> bool {
        match status {
            Ok(status) => status.success(),
            Err(e) => {
                error!("Lost track of compiler for {}: {}", task.source.display(), e);
                false
            }
        }
    }

    fn spawn_failed(&self, task: &CompileTask, e: io::Error) -> bool {
        error!(
            "Could not start '{}' for {}: {}",
            self.program,
            task.source.display(),
            e
        );
        false
    }
}
